//! Aethernova Launchpad — staged token sale core
//! Features:
//! - Three sequential sale stages, each with its own price, supply cap, window and raise threshold
//! - Whitelist-gated purchases with exact-payment semantics (payment = tokens / price, no remainder)
//! - Per-stage settlement: success returns unsold supply, failure returns the whole stage supply
//!   and opens refunds for that stage
//! - Referral credit for both referrer and referee (`amount / referral_rate`)
//! - Vesting: one global cliff anchored at the last stage end, then linear release
//! - Reclamation (burn) of unsold supply once every window has elapsed
//! - Concurrency: parking_lot RwLock over state + execute mutex serializing writers
//! - Events: tokio::broadcast
//! - Config: layered file/env loader (`config`, `humantime-serde`, `dotenvy`)
//! - Logging: `tracing` events, optional `tracing-subscriber` bootstrap
//! - Tests: mock backend with clock, token and currency balances
//!
//! Notes:
//! - `Address` is a placeholder; integrate with chain primitives in your node.
//! - `SaleBackend` abstracts the token ledger, the currency ledger and time.
//!
//! (c) Aethernova

#![forbid(unsafe_code)]
#![allow(clippy::too_many_arguments)]

use std::{fmt, str::FromStr};

pub mod access;
pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod referral;
pub mod sale;
pub mod stage;
pub mod telemetry;
pub mod vesting;
pub mod whitelist;

#[cfg(test)]
pub(crate) mod mock;

pub use access::AccessControl;
pub use backend::SaleBackend;
pub use error::{BackendError, SaleError};
pub use events::SaleEvent;
pub use sale::{PurchaseReceipt, SaleConfig, SaleSnapshot, TokenSale};
pub use stage::{Stage, StageParams, StagePhase};

// ---------- Primitives ----------

/// 20-byte address placeholder; replace with chain primitive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    /// Accepts 40 hex chars with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let mut out = [0u8; 20];
        hex::decode_to_slice(raw, &mut out)?;
        Ok(Address(out))
    }
}

/// Smallest unit balance (tokens and base currency alike).
pub type Balance = u128;

/// Number of sale stages.
pub const STAGE_COUNT: usize = 3;

/// Stage identifier, 1-based (1..=3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct StageId(pub u8);

impl StageId {
    /// All stages in settlement order.
    pub const ALL: [StageId; STAGE_COUNT] = [StageId(1), StageId(2), StageId(3)];

    /// Zero-based slot in the stage array, `None` for an unknown id.
    pub fn index(self) -> Option<usize> {
        match self.0 {
            1..=3 => Some(self.0 as usize - 1),
            _ => None,
        }
    }

    pub(crate) fn from_index(i: usize) -> StageId {
        StageId(i as u8 + 1)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.0)
    }
}
