use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::PoolEvent;

pub mod math;
mod snapshot;

pub use math::{mul_div_floor, U256, SCALE};
pub use snapshot::{LedgerSnapshot, SnapshotError};

pub type AccountId = String;
pub type Amount = u64;
/// Reward and payout values. Lifetime reward can outgrow any single [`Amount`].
pub type Balance = u128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("no participants to receive reward")]
    NoStake,
    #[error("nothing to withdraw for account {account}")]
    NoBalance { account: AccountId },
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

/// Per-participant stake record. A zero account is the same as a missing one.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Account {
    pub principal: Amount,
    /// Sum of `stake * acc_reward_per_share` over every deposit in the current
    /// window, unscaled. Never exceeds `principal * acc_reward_per_share`.
    pub reward_debt: U256,
}

impl Account {
    /// Unscaled reward earned since each unit of stake entered.
    fn unsettled(&self, acc_reward_per_share: u128) -> Option<U256> {
        U256::mul_wide(self.principal as u128, acc_reward_per_share)
            .checked_sub(self.reward_debt)
    }

    fn pending(&self, acc_reward_per_share: u128) -> Result<Balance, LedgerError> {
        self.unsettled(acc_reward_per_share)
            .ok_or(LedgerError::Overflow("reward debt exceeds accrual"))?
            .div_floor(SCALE)
            .ok_or(LedgerError::Overflow("pending reward"))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PoolState {
    pub total_staked: Amount,
    /// Cumulative reward per unit of stake, scaled by [`SCALE`].
    pub acc_reward_per_share: u128,
}

/// Lifetime value flows through the pool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PoolTotals {
    pub deposited: u128,
    pub rewarded: u128,
    /// Principal plus reward paid out by withdrawals.
    pub withdrawn: u128,
}

impl PoolTotals {
    /// Value the pool is holding on behalf of participants.
    pub fn held(&self) -> u128 {
        self.deposited
            .saturating_add(self.rewarded)
            .saturating_sub(self.withdrawn)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Number of committed mutations.
    pub height: u64,
    /// Number of accepted rewards; the next reward must be authorized for this value.
    pub reward_sequence: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payout {
    pub principal: Amount,
    pub reward: Balance,
    pub total: Balance,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountView {
    pub account: AccountId,
    pub staked: Amount,
    pub pending_reward: Balance,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerOp {
    Deposit { account: AccountId, amount: Amount },
    DistributeReward { amount: Amount },
    Withdraw { account: AccountId },
}

/// Snapshot-and-delta reward accounting. Every operation is O(1) in the
/// number of participants and either commits fully or leaves state untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewardLedger {
    meta: SnapshotMetadata,
    pool: PoolState,
    totals: PoolTotals,
    accounts: BTreeMap<AccountId, Account>,
}

impl RewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single entry point used by the pool façade; returns the event to emit.
    pub fn apply(&mut self, op: LedgerOp) -> Result<PoolEvent, LedgerError> {
        match op {
            LedgerOp::Deposit { account, amount } => {
                self.deposit(&account, amount)?;
                Ok(PoolEvent::Deposit { account, amount })
            }
            LedgerOp::DistributeReward { amount } => {
                self.distribute_reward(amount)?;
                Ok(PoolEvent::Reward { amount })
            }
            LedgerOp::Withdraw { account } => {
                let payout = self.withdraw(&account)?;
                Ok(PoolEvent::withdraw(account, payout))
            }
        }
    }

    pub fn deposit(&mut self, account: &str, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let current = self.account(account);
        let acc = self.pool.acc_reward_per_share;

        // Only the new stake is snapshotted, so reward already accrued on the
        // existing principal stays pending. Debt is kept unscaled; rounding
        // happens once, when pending is read.
        let next = Account {
            principal: current
                .principal
                .checked_add(amount)
                .ok_or(LedgerError::Overflow("principal"))?,
            reward_debt: current
                .reward_debt
                .checked_add(U256::mul_wide(amount as u128, acc))
                .ok_or(LedgerError::Overflow("reward debt"))?,
        };
        let total_staked = self
            .pool
            .total_staked
            .checked_add(amount)
            .ok_or(LedgerError::Overflow("total staked"))?;
        let deposited = self
            .totals
            .deposited
            .checked_add(amount as u128)
            .ok_or(LedgerError::Overflow("total deposited"))?;

        self.accounts.insert(account.to_string(), next);
        self.pool.total_staked = total_staked;
        self.totals.deposited = deposited;
        self.meta.height += 1;
        Ok(())
    }

    pub fn distribute_reward(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.pool.total_staked == 0 {
            return Err(LedgerError::NoStake);
        }
        let delta = mul_div_floor(amount as u128, SCALE, self.pool.total_staked as u128)
            .ok_or(LedgerError::Overflow("reward per share"))?;
        let acc = self
            .pool
            .acc_reward_per_share
            .checked_add(delta)
            .ok_or(LedgerError::Overflow("accumulator"))?;
        let rewarded = self
            .totals
            .rewarded
            .checked_add(amount as u128)
            .ok_or(LedgerError::Overflow("total rewarded"))?;

        self.pool.acc_reward_per_share = acc;
        self.totals.rewarded = rewarded;
        self.meta.reward_sequence += 1;
        self.meta.height += 1;
        Ok(())
    }

    pub fn withdraw(&mut self, account: &str) -> Result<Payout, LedgerError> {
        let current = self.account(account);
        if current.principal == 0 {
            return Err(LedgerError::NoBalance {
                account: account.to_string(),
            });
        }
        let reward = current.pending(self.pool.acc_reward_per_share)?;
        let total = (current.principal as Balance)
            .checked_add(reward)
            .ok_or(LedgerError::Overflow("withdraw total"))?;
        let total_staked = self
            .pool
            .total_staked
            .checked_sub(current.principal)
            .ok_or(LedgerError::Overflow("total staked"))?;
        let withdrawn = self
            .totals
            .withdrawn
            .checked_add(total)
            .ok_or(LedgerError::Overflow("total withdrawn"))?;

        self.accounts.remove(account);
        self.pool.total_staked = total_staked;
        self.totals.withdrawn = withdrawn;
        self.meta.height += 1;
        Ok(Payout {
            principal: current.principal,
            reward,
            total,
        })
    }

    pub fn staked_balance(&self, account: &str) -> Amount {
        self.accounts.get(account).map_or(0, |a| a.principal)
    }

    pub fn pending_reward(&self, account: &str) -> Result<Balance, LedgerError> {
        match self.accounts.get(account) {
            Some(a) => a.pending(self.pool.acc_reward_per_share),
            None => Ok(0),
        }
    }

    /// Stored record for `account`, zero-valued if it has no stake.
    pub fn account(&self, account: &str) -> Account {
        self.accounts.get(account).cloned().unwrap_or_default()
    }

    pub fn accounts(&self) -> Result<Vec<AccountView>, LedgerError> {
        self.accounts
            .iter()
            .map(|(id, a)| {
                Ok(AccountView {
                    account: id.clone(),
                    staked: a.principal,
                    pending_reward: a.pending(self.pool.acc_reward_per_share)?,
                })
            })
            .collect()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn pool(&self) -> &PoolState {
        &self.pool
    }

    pub fn totals(&self) -> &PoolTotals {
        &self.totals
    }

    pub fn meta(&self) -> &SnapshotMetadata {
        &self.meta
    }

    /// Value held but not claimable by anyone. Walks every account; audit use only.
    pub fn unallocated_slack(&self) -> Result<u128, LedgerError> {
        let mut claimable = 0u128;
        for account in self.accounts.values() {
            let pending = account.pending(self.pool.acc_reward_per_share)?;
            claimable = claimable
                .checked_add(account.principal as u128 + pending)
                .ok_or(LedgerError::Overflow("claimable"))?;
        }
        self.totals
            .held()
            .checked_sub(claimable)
            .ok_or(LedgerError::Overflow("claimable exceeds held value"))
    }
}
