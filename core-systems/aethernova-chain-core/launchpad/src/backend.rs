//! Collaborator boundary: time, token ledger and currency ledger.

use crate::{error::BackendError, Address, Balance};

/// Backend for value transfer and time.
/// All monetary side-effects go through this trait.
///
/// Every method is assumed atomic and immediately consistent. The engine calls
/// outbound transfers only after its own bookkeeping for the call is in place and
/// undoes that bookkeeping if the transfer fails.
pub trait SaleBackend: Send + Sync + 'static {
    /// Current UNIX time (seconds).
    fn now_unix(&self) -> u64;

    /// Account holding the sale supply and escrowed payments.
    fn escrow_address(&self) -> Address;

    /// Move `amount` sale tokens from the engine's holdings to `to`.
    fn transfer_tokens(&self, to: Address, amount: Balance) -> Result<(), BackendError>;

    /// Token balance of `who`.
    fn token_balance(&self, who: Address) -> Result<Balance, BackendError>;

    /// Destroy `amount` sale tokens from the engine's holdings.
    fn burn_tokens(&self, amount: Balance) -> Result<(), BackendError>;

    /// Pull a purchase payment from `from` into the engine's escrow.
    fn collect_payment(&self, from: Address, amount: Balance) -> Result<(), BackendError>;

    /// Push base currency from escrow to `to` (refunds, proceeds).
    fn send_payment(&self, to: Address, amount: Balance) -> Result<(), BackendError>;
}
