//! In-memory backend for tests: settable clock, token and currency balances,
//! failure injection for outbound transfers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::{backend::SaleBackend, error::BackendError, Address, Balance};

pub(crate) fn addr(x: u8) -> Address {
    let mut a = [0u8; 20];
    a[0] = x;
    Address(a)
}

#[derive(Default)]
pub(crate) struct MockBackend {
    now: AtomicU64,
    escrow: Address,
    tokens: RwLock<HashMap<Address, Balance>>,
    currency: RwLock<HashMap<Address, Balance>>,
    burned: RwLock<Balance>,
    fail_token_out: AtomicBool,
    fail_payment_out: AtomicBool,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        let mut b = Self::default();
        b.escrow = addr(0xEE);
        b
    }

    pub(crate) fn set_now(&self, t: u64) {
        self.now.store(t, Ordering::SeqCst);
    }

    pub(crate) fn escrow(&self) -> Address {
        self.escrow
    }

    pub(crate) fn mint_tokens(&self, to: Address, amount: Balance) {
        *self.tokens.write().entry(to).or_default() += amount;
    }

    pub(crate) fn fund(&self, who: Address, amount: Balance) {
        *self.currency.write().entry(who).or_default() += amount;
    }

    pub(crate) fn tokens_of(&self, who: Address) -> Balance {
        *self.tokens.read().get(&who).unwrap_or(&0)
    }

    pub(crate) fn currency_of(&self, who: Address) -> Balance {
        *self.currency.read().get(&who).unwrap_or(&0)
    }

    pub(crate) fn burned(&self) -> Balance {
        *self.burned.read()
    }

    pub(crate) fn fail_token_transfers(&self, on: bool) {
        self.fail_token_out.store(on, Ordering::SeqCst);
    }

    pub(crate) fn fail_payouts(&self, on: bool) {
        self.fail_payment_out.store(on, Ordering::SeqCst);
    }

    fn move_between(
        book: &RwLock<HashMap<Address, Balance>>,
        from: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), BackendError> {
        let mut m = book.write();
        let available = *m.get(&from).unwrap_or(&0);
        if available < amount {
            return Err(BackendError::Insufficient { needed: amount, available });
        }
        m.insert(from, available - amount);
        *m.entry(to).or_default() += amount;
        Ok(())
    }
}

impl SaleBackend for MockBackend {
    fn now_unix(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn escrow_address(&self) -> Address {
        self.escrow
    }

    fn transfer_tokens(&self, to: Address, amount: Balance) -> Result<(), BackendError> {
        if self.fail_token_out.load(Ordering::SeqCst) {
            return Err(BackendError::Other("token ledger offline".into()));
        }
        Self::move_between(&self.tokens, self.escrow, to, amount)
    }

    fn token_balance(&self, who: Address) -> Result<Balance, BackendError> {
        Ok(self.tokens_of(who))
    }

    fn burn_tokens(&self, amount: Balance) -> Result<(), BackendError> {
        if self.fail_token_out.load(Ordering::SeqCst) {
            return Err(BackendError::Other("token ledger offline".into()));
        }
        let mut m = self.tokens.write();
        let held = m.entry(self.escrow).or_default();
        if *held < amount {
            return Err(BackendError::Insufficient { needed: amount, available: *held });
        }
        *held -= amount;
        *self.burned.write() += amount;
        Ok(())
    }

    fn collect_payment(&self, from: Address, amount: Balance) -> Result<(), BackendError> {
        Self::move_between(&self.currency, from, self.escrow, amount)
    }

    fn send_payment(&self, to: Address, amount: Balance) -> Result<(), BackendError> {
        if self.fail_payment_out.load(Ordering::SeqCst) {
            return Err(BackendError::Other("payment channel offline".into()));
        }
        Self::move_between(&self.currency, self.escrow, to, amount)
    }
}
