//! Error kinds surfaced by the sale engine and its collaborators.

use thiserror::Error;

use crate::{Balance, StageId};

/// Failures reported by the token/currency ledger behind `SaleBackend`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("insufficient balance: need {needed}, have {available}")]
    Insufficient { needed: Balance, available: Balance },
    #[error("backend failure: {0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaleError {
    // authorization
    #[error("caller is not the owner")]
    NotOwner,
    #[error("caller is neither owner nor manager")]
    NotManager,

    // preconditions / state
    #[error("sale is paused")]
    Paused,
    #[error("unknown stage {0}")]
    UnknownStage(StageId),
    #[error("{0} is not active")]
    SaleNotActive(StageId),
    #[error("address not whitelisted")]
    NotEligible,
    #[error("amount must be > 0")]
    ZeroAmount,
    #[error("amount below minimum purchase of {min}")]
    BelowMinimumPurchase { min: Balance },
    #[error("wrong payment: expected {expected}, got {got}")]
    WrongPayment { expected: Balance, got: Balance },
    #[error("insufficient remaining supply: {remaining} left")]
    SaleSupplyExceeded { remaining: Balance },
    #[error("referrer not whitelisted")]
    ReferralNotEligible,
    #[error("referrer has never purchased")]
    ReferralNeverPurchased,
    #[error("buyer cannot refer themselves")]
    SelfReferral,
    #[error("{0} already settled")]
    AlreadySettled(StageId),
    #[error("{0} not ended yet")]
    NotYetEnded(StageId),
    #[error("{0} must be settled first")]
    PriorStageNotSettled(StageId),
    #[error("claim period not started")]
    ClaimNotStarted,
    #[error("no claimable tokens")]
    NothingClaimable,
    #[error("refund not active for {0}")]
    RefundNotActive(StageId),
    #[error("nothing to refund")]
    NothingToRefund,
    #[error("array length mismatch: {addresses} addresses, {flags} flags")]
    LengthMismatch { addresses: usize, flags: usize },
    #[error("no proceeds available for {0}")]
    ProceedsUnavailable(StageId),
    #[error("sale still running")]
    SaleStillRunning,
    #[error("no unsold supply left to reclaim")]
    NothingToReclaim,
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    // defects
    #[error("arithmetic overflow")]
    MathOverflow,

    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_name_the_stage() {
        assert_eq!(SaleError::UnknownStage(StageId(4)).to_string(), "unknown stage stage-4");
        assert_eq!(SaleError::AlreadySettled(StageId(2)).to_string(), "stage-2 already settled");
        assert_eq!(
            SaleError::from(BackendError::Insufficient { needed: 5, available: 3 }).to_string(),
            "backend: insufficient balance: need 5, have 3"
        );
    }
}
