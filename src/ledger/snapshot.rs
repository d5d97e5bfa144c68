use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Account, AccountId, PoolState, PoolTotals, RewardLedger, SnapshotMetadata};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("state root mismatch: recorded {recorded}, computed {computed}")]
    RootMismatch { recorded: String, computed: String },
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(&'static str),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub pool: PoolState,
    pub totals: PoolTotals,
    pub accounts: BTreeMap<AccountId, Account>,
    #[serde(with = "hex_root")]
    pub state_root: [u8; 32],
}

impl RewardLedger {
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            pool: self.pool.clone(),
            totals: self.totals.clone(),
            accounts: self.accounts.clone(),
            state_root: self.state_root(),
        }
    }

    pub fn state_root(&self) -> [u8; 32] {
        compute_state_root(&self.meta, &self.pool, &self.totals, &self.accounts)
    }

    /// Rebuild a ledger, refusing snapshots whose root or stake sum do not check out.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, SnapshotError> {
        let computed = compute_state_root(
            &snapshot.meta,
            &snapshot.pool,
            &snapshot.totals,
            &snapshot.accounts,
        );
        if computed != snapshot.state_root {
            return Err(SnapshotError::RootMismatch {
                recorded: hex::encode(snapshot.state_root),
                computed: hex::encode(computed),
            });
        }

        let mut staked = 0u128;
        for account in snapshot.accounts.values() {
            if account.principal == 0 {
                return Err(SnapshotError::Inconsistent("zero-principal account"));
            }
            if account.unsettled(snapshot.pool.acc_reward_per_share).is_none() {
                return Err(SnapshotError::Inconsistent("reward debt exceeds accrual"));
            }
            staked += account.principal as u128;
        }
        if staked != snapshot.pool.total_staked as u128 {
            return Err(SnapshotError::Inconsistent("total_staked != sum of principals"));
        }
        let inflows = snapshot
            .totals
            .deposited
            .saturating_add(snapshot.totals.rewarded);
        if snapshot.totals.withdrawn > inflows {
            return Err(SnapshotError::Inconsistent("withdrawn exceeds inflows"));
        }

        Ok(Self {
            meta: snapshot.meta,
            pool: snapshot.pool,
            totals: snapshot.totals,
            accounts: snapshot.accounts,
        })
    }
}

fn compute_state_root(
    meta: &SnapshotMetadata,
    pool: &PoolState,
    totals: &PoolTotals,
    accounts: &BTreeMap<AccountId, Account>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(accounts.len() + 1);

    let mut hasher = Sha256::new();
    hasher.update(b"pool-ledger/pool");
    hasher.update(meta.height.to_le_bytes());
    hasher.update(meta.reward_sequence.to_le_bytes());
    hasher.update(pool.total_staked.to_le_bytes());
    hasher.update(pool.acc_reward_per_share.to_le_bytes());
    hasher.update(totals.deposited.to_le_bytes());
    hasher.update(totals.rewarded.to_le_bytes());
    hasher.update(totals.withdrawn.to_le_bytes());
    leaves.push(hasher.finalize().into());

    for (id, account) in accounts {
        let mut hasher = Sha256::new();
        hasher.update(b"pool-ledger/account");
        hasher.update((id.len() as u64).to_le_bytes());
        hasher.update(id.as_bytes());
        hasher.update(account.principal.to_le_bytes());
        hasher.update(account.reward_debt.to_be_bytes());
        leaves.push(hasher.finalize().into());
    }
    merkle_root(leaves)
}

/// Pairwise sha256 tree. An unpaired trailing node is promoted to the next
/// level unchanged, so `[a, b, c]` and `[a, b, c, c]` hash differently.
fn merkle_root(leaves: Vec<[u8; 32]>) -> [u8; 32] {
    let mut level = leaves;
    loop {
        match level.as_slice() {
            [] => return Sha256::digest(b"pool-ledger/empty").into(),
            [root] => return *root,
            _ => {}
        }
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut hasher = Sha256::new();
                    hasher.update(b"pool-ledger/branch");
                    hasher.update(left);
                    hasher.update(right);
                    hasher.finalize().into()
                }
                _ => pair[0],
            })
            .collect();
    }
}

mod hex_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("state root must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::U256;

    fn busy_ledger() -> RewardLedger {
        let mut ledger = RewardLedger::new();
        ledger.deposit("alice", 100).unwrap();
        ledger.deposit("bob", 300).unwrap();
        ledger.distribute_reward(200).unwrap();
        ledger.deposit("carol", 50).unwrap();
        ledger
    }

    #[test]
    fn state_root_is_deterministic() {
        let ledger = busy_ledger();
        assert_eq!(ledger.snapshot().state_root, ledger.snapshot().state_root);
        assert_ne!(ledger.state_root(), RewardLedger::new().state_root());
    }

    #[test]
    fn snapshot_survives_json() {
        let ledger = busy_ledger();
        let json = serde_json::to_string_pretty(&ledger.snapshot()).unwrap();
        let decoded: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        let restored = RewardLedger::from_snapshot(decoded).unwrap();
        assert_eq!(restored, ledger);
        assert_eq!(restored.pending_reward("bob").unwrap(), 150);
    }

    #[test]
    fn tampered_snapshot_is_rejected() {
        let mut snapshot = busy_ledger().snapshot();
        snapshot.accounts.get_mut("carol").unwrap().principal = 5_000;
        match RewardLedger::from_snapshot(snapshot) {
            Err(SnapshotError::RootMismatch { .. }) => {}
            other => panic!("expected root mismatch, got {other:?}"),
        }
    }

    #[test]
    fn inconsistent_stake_is_rejected_even_with_fresh_root() {
        let mut snapshot = busy_ledger().snapshot();
        snapshot.pool.total_staked += 1;
        snapshot.state_root = compute_state_root(
            &snapshot.meta,
            &snapshot.pool,
            &snapshot.totals,
            &snapshot.accounts,
        );
        assert!(matches!(
            RewardLedger::from_snapshot(snapshot),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn rewound_reward_sequence_is_rejected() {
        let mut snapshot = busy_ledger().snapshot();
        assert_eq!(snapshot.meta.reward_sequence, 1);
        snapshot.meta.reward_sequence = 0;
        assert!(matches!(
            RewardLedger::from_snapshot(snapshot),
            Err(SnapshotError::RootMismatch { .. })
        ));
    }

    #[test]
    fn rewound_height_is_rejected() {
        let mut snapshot = busy_ledger().snapshot();
        snapshot.meta.height -= 1;
        assert!(matches!(
            RewardLedger::from_snapshot(snapshot),
            Err(SnapshotError::RootMismatch { .. })
        ));
    }

    #[test]
    fn odd_leaf_is_not_duplicated() {
        let (a, b, c) = ([1u8; 32], [2u8; 32], [3u8; 32]);
        assert_ne!(merkle_root(vec![a, b, c]), merkle_root(vec![a, b, c, c]));
        assert_eq!(merkle_root(vec![a]), a);
    }

    #[test]
    fn debt_above_accrual_is_rejected() {
        let mut snapshot = busy_ledger().snapshot();
        let acc = snapshot.pool.acc_reward_per_share;
        let carol = snapshot.accounts.get_mut("carol").unwrap();
        carol.reward_debt = U256::mul_wide(carol.principal as u128 + 1, acc);
        snapshot.state_root = compute_state_root(
            &snapshot.meta,
            &snapshot.pool,
            &snapshot.totals,
            &snapshot.accounts,
        );
        assert!(matches!(
            RewardLedger::from_snapshot(snapshot),
            Err(SnapshotError::Inconsistent(_))
        ));
    }
}
