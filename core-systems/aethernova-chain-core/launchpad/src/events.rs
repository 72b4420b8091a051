// ---------- Events ----------

use crate::{Address, Balance, StageId};

/// Append-only audit records broadcast to subscribers. Never consumed internally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaleEvent {
    TokensPurchased { buyer: Address, stage: StageId, token_amount: Balance, paid: Balance },
    ReferralCredited { referrer: Address, referee: Address, stage: StageId, bonus: Balance },
    SaleSettled { stage: StageId, success: bool },
    ProceedsForwarded { stage: StageId, to: Address, amount: Balance },
    TokensClaimed { beneficiary: Address, amount: Balance },
    Refunded { buyer: Address, stage: StageId, amount: Balance },
    UnsoldTokensBurned { amount: Balance },
    EligibilityUpdated { addr: Address, eligible: bool },
    ManagerChanged { manager: Option<Address> },
    ReferralRateChanged { rate: Balance },
    PauseChanged { paused: bool },
    OwnershipTransferred { from: Address, to: Address },
}
