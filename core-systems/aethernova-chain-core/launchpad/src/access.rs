//! Owner / manager roles and the pause switch.

use crate::{error::SaleError, Address};

/// Authorization and pause state of one sale.
///
/// The owner controls every administrative call; the manager may only maintain
/// the whitelist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessControl {
    owner: Address,
    manager: Option<Address>,
    paused: bool,
}

impl AccessControl {
    pub fn new(owner: Address, manager: Option<Address>) -> Self {
        Self { owner, manager, paused: false }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn manager(&self) -> Option<Address> {
        self.manager
    }

    pub fn is_owner(&self, who: Address) -> bool {
        self.owner == who
    }

    pub fn is_manager(&self, who: Address) -> bool {
        self.manager == Some(who)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn require_owner(&self, who: Address) -> Result<(), SaleError> {
        if !self.is_owner(who) {
            return Err(SaleError::NotOwner);
        }
        Ok(())
    }

    /// Owner or manager.
    pub fn require_manager(&self, who: Address) -> Result<(), SaleError> {
        if !self.is_owner(who) && !self.is_manager(who) {
            return Err(SaleError::NotManager);
        }
        Ok(())
    }

    pub fn require_not_paused(&self) -> Result<(), SaleError> {
        if self.paused {
            return Err(SaleError::Paused);
        }
        Ok(())
    }

    pub(crate) fn set_manager(&mut self, manager: Option<Address>) {
        self.manager = manager;
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn set_owner(&mut self, owner: Address) {
        self.owner = owner;
    }
}
