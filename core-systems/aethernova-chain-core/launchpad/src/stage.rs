//! Sale stage parameters, counters and phase derivation.

use serde::{Deserialize, Serialize};

use crate::{error::SaleError, Balance};

/// Immutable pricing and window parameters of one stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageParams {
    /// Tokens granted per unit of base currency.
    pub price: Balance,
    /// Tokens allocated to this stage.
    pub token_supply: Balance,
    /// Minimum tokens per single purchase.
    pub min_purchase: Balance,
    /// Window is `[start_time, end_time)`, UNIX seconds.
    pub start_time: u64,
    pub end_time: u64,
    /// Stage succeeds iff `tokens_sold >= min_tokens_sold` at settlement.
    pub min_tokens_sold: Balance,
}

impl StageParams {
    pub fn validate(&self) -> Result<(), SaleError> {
        if self.price == 0 {
            return Err(SaleError::InvalidConfig("price must be > 0".into()));
        }
        if self.token_supply == 0 {
            return Err(SaleError::InvalidConfig("token_supply must be > 0".into()));
        }
        if self.end_time <= self.start_time {
            return Err(SaleError::InvalidConfig("end_time <= start_time".into()));
        }
        if self.min_tokens_sold > self.token_supply {
            return Err(SaleError::InvalidConfig("min_tokens_sold > token_supply".into()));
        }
        if self.min_purchase > self.token_supply {
            return Err(SaleError::InvalidConfig("min_purchase > token_supply".into()));
        }
        Ok(())
    }
}

/// Derived stage phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagePhase {
    Pending,
    Active,
    /// Window closed, not settled yet.
    Settling,
    SettledSuccess,
    SettledFailure,
}

/// One stage: parameters plus mutable counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub params: StageParams,
    pub tokens_sold: Balance,
    /// Base currency collected in this stage.
    pub raised: Balance,
    pub ended: bool,
    pub failed: bool,
    /// Unsold remainder already left the engine (returned or burned).
    pub surplus_released: bool,
    /// Raised currency already sent to the owner.
    pub proceeds_withdrawn: bool,
}

impl Stage {
    pub fn new(params: StageParams) -> Self {
        Self {
            params,
            tokens_sold: 0,
            raised: 0,
            ended: false,
            failed: false,
            surplus_released: false,
            proceeds_withdrawn: false,
        }
    }

    pub fn phase(&self, now: u64) -> StagePhase {
        if self.ended {
            return if self.failed { StagePhase::SettledFailure } else { StagePhase::SettledSuccess };
        }
        if now < self.params.start_time {
            StagePhase::Pending
        } else if now < self.params.end_time {
            StagePhase::Active
        } else {
            StagePhase::Settling
        }
    }

    pub fn is_active(&self, now: u64) -> bool {
        self.phase(now) == StagePhase::Active
    }

    pub fn window_closed(&self, now: u64) -> bool {
        now >= self.params.end_time
    }

    pub fn remaining(&self) -> Balance {
        self.params.token_supply.saturating_sub(self.tokens_sold)
    }

    pub fn threshold_met(&self) -> bool {
        self.tokens_sold >= self.params.min_tokens_sold
    }

    /// Whether purchases in this stage are deliverable. Before settlement the
    /// outcome is read from the threshold, which is final once the window closed.
    pub fn delivers(&self) -> bool {
        if self.ended {
            !self.failed
        } else {
            self.threshold_met()
        }
    }

    /// Exact payment: `amount` divisible by price and `payment == amount / price`.
    pub fn check_payment(&self, amount: Balance, payment: Balance) -> Result<(), SaleError> {
        let price = self.params.price;
        let expected = amount / price;
        if amount % price != 0 || payment != expected {
            return Err(SaleError::WrongPayment { expected, got: payment });
        }
        Ok(())
    }

    /// Tokens still held by the engine that settlement hands back to the owner.
    pub fn settlement_return(&self, success: bool) -> Balance {
        match (success, self.surplus_released) {
            (true, false) => self.remaining(),
            (true, true) => 0,
            (false, false) => self.params.token_supply,
            (false, true) => self.tokens_sold,
        }
    }
}
