//! Whitelist registry: identity -> eligibility.

use std::collections::BTreeSet;

use crate::{error::SaleError, Address};

/// Set of identities allowed to buy, refer and claim. Absent means not eligible.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Whitelist {
    eligible: BTreeSet<Address>,
}

impl Whitelist {
    /// Registry with `owner` pre-approved.
    pub fn with_owner(owner: Address) -> Self {
        let mut eligible = BTreeSet::new();
        eligible.insert(owner);
        Self { eligible }
    }

    pub fn is_eligible(&self, who: Address) -> bool {
        self.eligible.contains(&who)
    }

    pub fn set(&mut self, who: Address, eligible: bool) {
        if eligible {
            self.eligible.insert(who);
        } else {
            self.eligible.remove(&who);
        }
    }

    /// Batch overwrite. Validates lengths before touching anything.
    pub fn apply_batch(&mut self, addresses: &[Address], flags: &[bool]) -> Result<(), SaleError> {
        if addresses.len() != flags.len() {
            return Err(SaleError::LengthMismatch { addresses: addresses.len(), flags: flags.len() });
        }
        for (who, flag) in addresses.iter().zip(flags) {
            self.set(*who, *flag);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.eligible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty()
    }
}
