//! Operator authorization for reward distribution.
//!
//! The pool operator is identified by an ed25519 key fixed when the pool is
//! created. Each reward must carry a signature over the amount and the pool's
//! current reward sequence, so a signed reward can be applied at most once.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ledger::Amount;

const REWARD_DOMAIN: &[u8] = b"pool-ledger/reward/v1";

pub fn reward_digest(amount: Amount, sequence: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(REWARD_DOMAIN);
    hasher.update(amount.to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.finalize().into()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardAuthorization {
    pub amount: Amount,
    pub sequence: u64,
    #[serde(with = "crate::access::serde_bytes")]
    pub signature: Vec<u8>,
}

impl RewardAuthorization {
    pub fn sign(key: &SigningKey, amount: Amount, sequence: u64) -> Self {
        let signature = key.sign(&reward_digest(amount, sequence));
        Self {
            amount,
            sequence,
            signature: signature.to_bytes().to_vec(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed operator key: {0}")]
    MalformedKey(String),
    #[error("malformed reward signature")]
    MalformedSignature,
    #[error("reward signature does not verify against the operator key")]
    InvalidSignature,
    #[error("reward authorized for sequence {actual}, pool is at {expected}")]
    StaleSequence { expected: u64, actual: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorKey {
    key: VerifyingKey,
}

impl OperatorKey {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    pub fn from_hex(encoded: &str) -> Result<Self, AuthError> {
        let bytes =
            hex::decode(encoded.trim()).map_err(|e| AuthError::MalformedKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AuthError::MalformedKey("expected 32 bytes".into()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| AuthError::MalformedKey(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key.as_bytes())
    }

    /// Accepts `auth` only if it is signed by the operator for `expected_sequence`.
    pub fn verify(
        &self,
        auth: &RewardAuthorization,
        expected_sequence: u64,
    ) -> Result<(), AuthError> {
        if auth.sequence != expected_sequence {
            return Err(AuthError::StaleSequence {
                expected: expected_sequence,
                actual: auth.sequence,
            });
        }
        let signature =
            Signature::from_slice(&auth.signature).map_err(|_| AuthError::MalformedSignature)?;
        self.key
            .verify_strict(&reward_digest(auth.amount, auth.sequence), &signature)
            .map_err(|_| AuthError::InvalidSignature)
    }
}

/// Parses a 32-byte ed25519 secret key from hex.
pub fn signing_key_from_hex(encoded: &str) -> Result<SigningKey, AuthError> {
    let bytes =
        hex::decode(encoded.trim()).map_err(|e| AuthError::MalformedKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AuthError::MalformedKey("secret key must be 32 bytes".into()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
