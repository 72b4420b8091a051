//! Referral credit: both parties of a referred purchase receive `amount / rate`.
//!
//! Credit is kept per stage so that credit earned on purchases of a failed stage
//! can be left out of the vesting entitlement.

use std::collections::HashMap;

use crate::{error::SaleError, Address, Balance, STAGE_COUNT};

/// Default divisor: 5% bonus to each party.
pub const DEFAULT_REFERRAL_RATE: Balance = 20;

#[derive(Clone, Debug)]
pub struct ReferralLedger {
    rate: Balance,
    credits: HashMap<Address, [Balance; STAGE_COUNT]>,
    total_issued: Balance,
}

impl Default for ReferralLedger {
    fn default() -> Self {
        Self { rate: DEFAULT_REFERRAL_RATE, credits: HashMap::new(), total_issued: 0 }
    }
}

impl ReferralLedger {
    pub fn with_rate(rate: Balance) -> Result<Self, SaleError> {
        let mut l = Self::default();
        l.set_rate(rate)?;
        Ok(l)
    }

    pub fn rate(&self) -> Balance {
        self.rate
    }

    pub fn set_rate(&mut self, rate: Balance) -> Result<(), SaleError> {
        if rate == 0 {
            return Err(SaleError::InvalidConfig("referral rate must be > 0".into()));
        }
        self.rate = rate;
        Ok(())
    }

    /// Bonus each party receives for a referred purchase of `amount` (floored).
    pub fn bonus_for(&self, amount: Balance) -> Balance {
        amount / self.rate
    }

    /// Sum of all credit ever issued.
    pub fn total_issued(&self) -> Balance {
        self.total_issued
    }

    pub fn credit_of(&self, who: Address) -> Balance {
        self.credits
            .get(&who)
            .map_or(0, |c| c.iter().fold(0, |acc, v| acc.saturating_add(*v)))
    }

    pub fn credit_in_stage(&self, who: Address, stage: usize) -> Balance {
        self.credits.get(&who).map_or(0, |c| c[stage])
    }

    /// Credit `bonus` to both parties. All sums are checked before anything is written.
    pub fn credit(
        &mut self,
        referrer: Address,
        referee: Address,
        stage: usize,
        bonus: Balance,
    ) -> Result<(), SaleError> {
        if referrer == referee {
            return Err(SaleError::SelfReferral);
        }
        let referrer_new = self
            .credit_in_stage(referrer, stage)
            .checked_add(bonus)
            .ok_or(SaleError::MathOverflow)?;
        let referee_new = self
            .credit_in_stage(referee, stage)
            .checked_add(bonus)
            .ok_or(SaleError::MathOverflow)?;
        let total_new = bonus
            .checked_mul(2)
            .and_then(|b| self.total_issued.checked_add(b))
            .ok_or(SaleError::MathOverflow)?;

        self.credits.entry(referrer).or_default()[stage] = referrer_new;
        self.credits.entry(referee).or_default()[stage] = referee_new;
        self.total_issued = total_new;
        Ok(())
    }
}
