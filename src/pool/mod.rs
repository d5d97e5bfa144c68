//! Thread-safe front for the reward ledger.
//!
//! One mutex guards the ledger and its event sink together. Events are emitted
//! under that lock after the ledger commits, so sink order matches ledger order.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::access::{AuthError, OperatorKey, RewardAuthorization};
use crate::events::{EventSink, PoolEvent};
use crate::ledger::{
    AccountView, Amount, Balance, LedgerError, LedgerOp, LedgerSnapshot, Payout, PoolTotals,
    RewardLedger,
};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("caller is not the operator: {0}")]
    Unauthorized(#[from] AuthError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("reward authorization is for {authorized}, requested {requested}")]
    AmountMismatch { authorized: Amount, requested: Amount },
    #[error("pool state lock poisoned")]
    Poisoned,
    #[error("ledger answered a withdraw with {0:?}")]
    UnexpectedEvent(PoolEvent),
}

struct PoolInner<S> {
    ledger: RewardLedger,
    sink: S,
}

pub struct StakingPool<S> {
    operator: OperatorKey,
    inner: Mutex<PoolInner<S>>,
}

impl<S: EventSink> StakingPool<S> {
    pub fn new(operator: OperatorKey, sink: S) -> Self {
        Self::from_ledger(operator, RewardLedger::new(), sink)
    }

    pub fn from_ledger(operator: OperatorKey, ledger: RewardLedger, sink: S) -> Self {
        Self {
            operator,
            inner: Mutex::new(PoolInner { ledger, sink }),
        }
    }

    pub fn operator(&self) -> &OperatorKey {
        &self.operator
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolInner<S>>, PoolError> {
        self.inner.lock().map_err(|_| PoolError::Poisoned)
    }

    fn commit(&self, inner: &mut PoolInner<S>, op: LedgerOp) -> Result<PoolEvent, PoolError> {
        match inner.ledger.apply(op) {
            Ok(event) => {
                inner.sink.emit(&event);
                Ok(event)
            }
            Err(err) => {
                warn!(error = %err, "ledger rejected operation");
                Err(err.into())
            }
        }
    }

    pub fn deposit(&self, account: &str, amount: Amount) -> Result<(), PoolError> {
        let mut inner = self.lock()?;
        self.commit(
            &mut inner,
            LedgerOp::Deposit {
                account: account.to_string(),
                amount,
            },
        )?;
        info!(
            %account,
            amount,
            total_staked = inner.ledger.pool().total_staked,
            "deposit committed"
        );
        Ok(())
    }

    /// Distributes `auth.amount` across current stakers once `auth` verifies
    /// against the operator key for the pool's current reward sequence.
    pub fn distribute_reward(&self, auth: &RewardAuthorization) -> Result<(), PoolError> {
        let mut inner = self.lock()?;
        let sequence = inner.ledger.meta().reward_sequence;
        if let Err(err) = self.operator.verify(auth, sequence) {
            warn!(error = %err, sequence, "reward authorization refused");
            return Err(err.into());
        }
        self.commit(
            &mut inner,
            LedgerOp::DistributeReward {
                amount: auth.amount,
            },
        )?;
        debug!(
            acc_reward_per_share = inner.ledger.pool().acc_reward_per_share,
            "accumulator advanced"
        );
        info!(amount = auth.amount, sequence, "reward committed");
        Ok(())
    }

    /// Like [`Self::distribute_reward`], but also pins the amount the caller
    /// expects the authorization to cover.
    pub fn distribute_exact(
        &self,
        amount: Amount,
        auth: &RewardAuthorization,
    ) -> Result<(), PoolError> {
        if auth.amount != amount {
            return Err(PoolError::AmountMismatch {
                authorized: auth.amount,
                requested: amount,
            });
        }
        self.distribute_reward(auth)
    }

    pub fn withdraw(&self, account: &str) -> Result<Payout, PoolError> {
        let mut inner = self.lock()?;
        let event = self.commit(
            &mut inner,
            LedgerOp::Withdraw {
                account: account.to_string(),
            },
        )?;
        let payout = event
            .payout()
            .ok_or_else(|| PoolError::UnexpectedEvent(event.clone()))?;
        info!(
            %account,
            principal = payout.principal,
            reward = payout.reward,
            "withdraw committed"
        );
        Ok(payout)
    }

    pub fn staked_balance(&self, account: &str) -> Result<Amount, PoolError> {
        Ok(self.lock()?.ledger.staked_balance(account))
    }

    pub fn pending_reward(&self, account: &str) -> Result<Balance, PoolError> {
        Ok(self.lock()?.ledger.pending_reward(account)?)
    }

    pub fn reward_sequence(&self) -> Result<u64, PoolError> {
        Ok(self.lock()?.ledger.meta().reward_sequence)
    }

    pub fn accounts(&self) -> Result<Vec<AccountView>, PoolError> {
        Ok(self.lock()?.ledger.accounts()?)
    }

    pub fn totals(&self) -> Result<PoolTotals, PoolError> {
        Ok(self.lock()?.ledger.totals().clone())
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot, PoolError> {
        Ok(self.lock()?.ledger.snapshot())
    }

    /// Runs `f` against the sink while holding the pool lock.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R, PoolError> {
        let mut inner = self.lock()?;
        Ok(f(&mut inner.sink))
    }

    pub fn into_parts(self) -> Result<(RewardLedger, S), PoolError> {
        let inner = self.inner.into_inner().map_err(|_| PoolError::Poisoned)?;
        Ok((inner.ledger, inner.sink))
    }
}
