//! Purchase, refund and claim bookkeeping per participant.

use std::collections::HashMap;

use crate::{error::SaleError, Address, Balance, STAGE_COUNT};

/// Per-stage record of one participant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageEntry {
    /// Tokens bought in this stage. Never decreased.
    pub purchased: Balance,
    /// Base currency paid in this stage and not yet refunded.
    pub refundable: Balance,
}

/// Contribution record of one participant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerEntry {
    pub stages: [StageEntry; STAGE_COUNT],
    /// Tokens already released through vesting.
    pub claimed: Balance,
}

impl LedgerEntry {
    pub fn has_purchased(&self) -> bool {
        self.stages.iter().any(|s| s.purchased > 0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Ledger {
    entries: HashMap<Address, LedgerEntry>,
}

impl Ledger {
    pub fn get(&self, who: Address) -> LedgerEntry {
        self.entries.get(&who).copied().unwrap_or_default()
    }

    pub fn purchased(&self, who: Address, stage: usize) -> Balance {
        self.entries.get(&who).map_or(0, |e| e.stages[stage].purchased)
    }

    pub fn refundable(&self, who: Address, stage: usize) -> Balance {
        self.entries.get(&who).map_or(0, |e| e.stages[stage].refundable)
    }

    pub fn claimed(&self, who: Address) -> Balance {
        self.entries.get(&who).map_or(0, |e| e.claimed)
    }

    pub fn has_purchased(&self, who: Address) -> bool {
        self.entries.get(&who).is_some_and(LedgerEntry::has_purchased)
    }

    pub fn participants(&self) -> usize {
        self.entries.len()
    }

    /// Add a purchase and its payment. Both sums are checked before either is written.
    pub fn record_purchase(
        &mut self,
        who: Address,
        stage: usize,
        tokens: Balance,
        paid: Balance,
    ) -> Result<(), SaleError> {
        let current = self.get(who).stages[stage];
        let purchased = current.purchased.checked_add(tokens).ok_or(SaleError::MathOverflow)?;
        let refundable = current.refundable.checked_add(paid).ok_or(SaleError::MathOverflow)?;
        let slot = &mut self.entries.entry(who).or_default().stages[stage];
        slot.purchased = purchased;
        slot.refundable = refundable;
        Ok(())
    }

    /// Zero the refund record and return what it held.
    pub fn take_refund(&mut self, who: Address, stage: usize) -> Balance {
        match self.entries.get_mut(&who) {
            Some(e) => std::mem::take(&mut e.stages[stage].refundable),
            None => 0,
        }
    }

    /// Put a taken refund back (payout failed).
    pub fn restore_refund(&mut self, who: Address, stage: usize, amount: Balance) {
        self.entries.entry(who).or_default().stages[stage].refundable = amount;
    }

    pub fn add_claimed(&mut self, who: Address, amount: Balance) -> Result<(), SaleError> {
        let e = self.entries.entry(who).or_default();
        e.claimed = e.claimed.checked_add(amount).ok_or(SaleError::MathOverflow)?;
        Ok(())
    }

    /// Undo `add_claimed` (transfer failed).
    pub fn revert_claimed(&mut self, who: Address, amount: Balance) {
        if let Some(e) = self.entries.get_mut(&who) {
            e.claimed = e.claimed.saturating_sub(amount);
        }
    }
}
