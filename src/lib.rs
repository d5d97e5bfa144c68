//! Pooled staking ledger.
//!
//! Participants deposit a balance, an operator injects rewards, and each
//! participant withdraws principal plus their share of every reward issued
//! while they were staked. The accounting lives in [`ledger`] and never walks
//! the participant set:
//!
//! * [`ledger`]: the reward-per-share state machine, snapshots and state roots.
//! * [`events`]: `Deposit`/`Reward`/`Withdraw` events and the sinks receiving them.
//! * [`access`]: ed25519 operator keys and signed reward authorizations.
//! * [`pool`]: the mutex-guarded façade tying the three together.
//! * [`config`] and [`store`]: the JSON config and state files used by the CLI.

pub mod access;
pub mod config;
pub mod events;
pub mod ledger;
pub mod pool;
pub mod store;

pub use access::{AuthError, OperatorKey, RewardAuthorization};
pub use events::{EventSink, PoolEvent, RecordingSink, TracingSink};
pub use ledger::{Amount, Balance, LedgerError, Payout, RewardLedger, SCALE};
pub use pool::{PoolError, StakingPool};
