//! Fixed-point helpers for the reward-per-share accumulator.
//!
//! Products of a stake and the accumulator routinely exceed `u128`, so they are
//! kept as full 256-bit values and only quotients have to fit.

use std::fmt;

use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

/// Accumulator scale: one unit of stake holding `SCALE` accumulator units has
/// earned one unit of reward.
pub const SCALE: u128 = 1_000_000_000_000_000_000;

const LOW_MASK: u128 = u64::MAX as u128;

/// Unsigned 256-bit integer as `(hi, lo)` words. Only the operations the
/// ledger needs: widening multiply, checked add/sub, division by a `u128`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct U256 {
    hi: u128,
    lo: u128,
}

impl U256 {
    pub const ZERO: U256 = U256 { hi: 0, lo: 0 };

    /// Full product `a * b`; never overflows.
    pub fn mul_wide(a: u128, b: u128) -> Self {
        let a_lo = a & LOW_MASK;
        let a_hi = a >> 64;
        let b_lo = b & LOW_MASK;
        let b_hi = b >> 64;

        let p0 = a_lo * b_lo;
        let p1 = a_lo * b_hi;
        let p2 = a_hi * b_lo;
        let p3 = a_hi * b_hi;

        let mid = (p0 >> 64) + (p1 & LOW_MASK) + (p2 & LOW_MASK);
        let lo = (p0 & LOW_MASK) | (mid << 64);
        let hi = p3 + (p1 >> 64) + (p2 >> 64) + (mid >> 64);
        U256 { hi, lo }
    }

    pub fn checked_add(self, rhs: U256) -> Option<U256> {
        let (lo, carry) = self.lo.overflowing_add(rhs.lo);
        let hi = self.hi.checked_add(rhs.hi)?.checked_add(carry as u128)?;
        Some(U256 { hi, lo })
    }

    pub fn checked_sub(self, rhs: U256) -> Option<U256> {
        let (lo, borrow) = self.lo.overflowing_sub(rhs.lo);
        let hi = self.hi.checked_sub(rhs.hi)?.checked_sub(borrow as u128)?;
        Some(U256 { hi, lo })
    }

    /// `floor(self / denom)`, or `None` if `denom == 0` or the quotient does not
    /// fit in `u128`.
    pub fn div_floor(self, denom: u128) -> Option<u128> {
        if denom == 0 || self.hi >= denom {
            return None;
        }
        if self.hi == 0 {
            return Some(self.lo / denom);
        }

        // Schoolbook shift-subtract over the low word; `rem` stays below `denom`.
        let mut rem = self.hi;
        let mut quotient = 0u128;
        for bit in (0..128).rev() {
            let carry = rem >> 127;
            rem = (rem << 1) | ((self.lo >> bit) & 1);
            if carry == 1 || rem >= denom {
                rem = rem.wrapping_sub(denom);
                quotient |= 1u128 << bit;
            }
        }
        Some(quotient)
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&self.hi.to_be_bytes());
        out[16..].copy_from_slice(&self.lo.to_be_bytes());
        out
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut hi = [0u8; 16];
        let mut lo = [0u8; 16];
        hi.copy_from_slice(&bytes[..16]);
        lo.copy_from_slice(&bytes[16..]);
        U256 {
            hi: u128::from_be_bytes(hi),
            lo: u128::from_be_bytes(lo),
        }
    }
}

impl From<u128> for U256 {
    fn from(lo: u128) -> Self {
        U256 { hi: 0, lo }
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hi == 0 {
            write!(f, "U256({})", self.lo)
        } else {
            write!(f, "U256(0x{})", hex::encode(self.to_be_bytes()))
        }
    }
}

/// Stored as 64 big-endian hex chars.
impl Serialize for U256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_be_bytes()))
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("256-bit value must be 32 bytes"))?;
        Ok(U256::from_be_bytes(bytes))
    }
}

/// `floor(a * b / denom)`, or `None` if `denom == 0` or the quotient does not
/// fit in `u128`.
pub fn mul_div_floor(a: u128, b: u128, denom: u128) -> Option<u128> {
    if denom == 0 {
        return None;
    }
    match a.checked_mul(b) {
        Some(product) => Some(product / denom),
        None => U256::mul_wide(a, b).div_floor(denom),
    }
}
