//! Cliff + linear vesting over a participant's total entitlement.
//!
//! Time model: UNIX seconds (u64) supplied by the backend clock. One global
//! schedule applies to every participant:
//! - before `cliff_start`: nothing claimable (claims are rejected);
//! - `[cliff_start, cliff_start + duration)`: `total * elapsed / duration`, floored;
//! - from `cliff_start + duration`: `total`.
//!
//! All math is integer; the product `total * elapsed` is computed in 256 bits so
//! large token amounts never overflow mid-formula.

use serde::{Deserialize, Serialize};

use crate::{error::SaleError, Balance};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingSchedule {
    /// First second at which tokens may be claimed.
    pub cliff_start: u64,
    /// Linear release duration in seconds. 0 => everything at `cliff_start`.
    pub duration: u64,
}

impl VestingSchedule {
    /// Schedule anchored `cliff` seconds after `anchor` (the last stage end).
    pub fn anchored(anchor: u64, cliff: u64, duration: u64) -> Result<Self, SaleError> {
        let cliff_start = anchor.checked_add(cliff).ok_or(SaleError::MathOverflow)?;
        cliff_start.checked_add(duration).ok_or(SaleError::MathOverflow)?;
        Ok(Self { cliff_start, duration })
    }

    pub fn has_started(&self, now: u64) -> bool {
        now >= self.cliff_start
    }

    pub fn end(&self) -> u64 {
        self.cliff_start.saturating_add(self.duration)
    }

    /// Vested portion of `total` at `now`. Monotonic in `now`, never above `total`.
    pub fn vested_at(&self, total: Balance, now: u64) -> Result<Balance, SaleError> {
        if !self.has_started(now) {
            return Ok(0);
        }
        if self.duration == 0 || now >= self.end() {
            return Ok(total);
        }
        let elapsed = (now - self.cliff_start) as u128;
        mul_div_u128(total, elapsed, self.duration as u128)
    }

    /// Vested minus already claimed.
    pub fn releasable_at(&self, total: Balance, claimed: Balance, now: u64) -> Result<Balance, SaleError> {
        Ok(self.vested_at(total, now)?.saturating_sub(claimed))
    }
}

/// floor(a * b / d) with a 256-bit intermediate product.
/// Errors on `d == 0` or when the quotient does not fit in u128.
pub fn mul_div_u128(a: u128, b: u128, d: u128) -> Result<u128, SaleError> {
    if d == 0 {
        return Err(SaleError::MathOverflow);
    }
    let (hi, lo) = mul_wide(a, b);
    if hi == 0 {
        return Ok(lo / d);
    }
    if hi >= d {
        return Err(SaleError::MathOverflow);
    }
    Ok(div_wide(hi, lo, d))
}

/// Full 256-bit product as (hi, lo) limbs.
#[inline]
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a1, a0) = (a >> 64, a & MASK);
    let (b1, b0) = (b >> 64, b & MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    // each term < 2^64, the sum fits comfortably
    let mid = (p00 >> 64) + (p01 & MASK) + (p10 & MASK);
    let lo = (p00 & MASK) | (mid << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

/// Restoring long division of (hi:lo) by d. Requires hi < d so the quotient fits.
fn div_wide(hi: u128, lo: u128, d: u128) -> u128 {
    let mut rem = hi;
    let mut q = 0u128;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        q <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            q |= 1;
        }
    }
    q
}

/* ---------------------------------- TESTS ---------------------------------- */
