use serde::{Deserialize, Serialize};

use crate::ledger::{AccountId, Amount, Balance, Payout};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    Deposit {
        account: AccountId,
        amount: Amount,
    },
    Reward {
        amount: Amount,
    },
    Withdraw {
        account: AccountId,
        principal: Amount,
        reward: Balance,
        total: Balance,
    },
}

impl PoolEvent {
    pub fn withdraw(account: AccountId, payout: Payout) -> Self {
        PoolEvent::Withdraw {
            account,
            principal: payout.principal,
            reward: payout.reward,
            total: payout.total,
        }
    }

    /// The payout carried by a `Withdraw` event.
    pub fn payout(&self) -> Option<Payout> {
        match *self {
            PoolEvent::Withdraw {
                principal,
                reward,
                total,
                ..
            } => Some(Payout {
                principal,
                reward,
                total,
            }),
            _ => None,
        }
    }
}

/// Receives events after the ledger has committed the change they describe.
pub trait EventSink {
    fn emit(&mut self, event: &PoolEvent);
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordingSink {
    pub events: Vec<PoolEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &PoolEvent) {
        self.events.push(event.clone());
    }
}

/// Writes every event as a structured `tracing` record under the `pool_event` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: &PoolEvent) {
        match event {
            PoolEvent::Deposit { account, amount } => {
                tracing::info!(target: "pool_event", %account, amount, "Deposit");
            }
            PoolEvent::Reward { amount } => {
                tracing::info!(target: "pool_event", amount, "Reward");
            }
            PoolEvent::Withdraw {
                account,
                principal,
                reward,
                total,
            } => {
                tracing::info!(
                    target: "pool_event",
                    %account,
                    principal,
                    reward,
                    total,
                    "Withdraw"
                );
            }
        }
    }
}

/// Fans one event out to two sinks, in order.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &PoolEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}
