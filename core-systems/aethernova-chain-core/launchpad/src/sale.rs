//! Sale engine: the single owner of every ledger of one three-stage sale.
//!
//! Writers hold the execute mutex for the whole call and the state write lock
//! while they mutate; readers only take the read lock. Outbound transfers run
//! last, after bookkeeping, and a failed transfer restores the bookkeeping of
//! that call before the error is returned.

use std::{fmt, sync::Arc};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::{
    access::AccessControl,
    backend::SaleBackend,
    error::{BackendError, SaleError},
    events::SaleEvent,
    ledger::Ledger,
    referral::ReferralLedger,
    stage::{Stage, StageParams, StagePhase},
    vesting::VestingSchedule,
    whitelist::Whitelist,
    Address, Balance, StageId, STAGE_COUNT,
};

// ---------- Config ----------

/// Core sale parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleConfig {
    pub owner: Address,
    pub manager: Option<Address>,
    pub stages: [StageParams; STAGE_COUNT],
    /// Cliff after the last stage end (seconds).
    pub cliff_seconds: u64,
    /// Linear vesting duration after the cliff (seconds).
    pub vesting_seconds: u64,
    /// Referral divisor: each party is credited `amount / referral_rate`.
    pub referral_rate: Balance,
}

impl SaleConfig {
    pub fn validate(&self) -> Result<(), SaleError> {
        for (i, p) in self.stages.iter().enumerate() {
            p.validate().map_err(|e| match e {
                SaleError::InvalidConfig(msg) => {
                    SaleError::InvalidConfig(format!("{}: {msg}", StageId::from_index(i)))
                }
                other => other,
            })?;
        }
        for pair in self.stages.windows(2) {
            if pair[1].start_time < pair[0].end_time {
                return Err(SaleError::InvalidConfig("stage windows overlap or are out of order".into()));
            }
        }
        if self.referral_rate == 0 {
            return Err(SaleError::InvalidConfig("referral rate must be > 0".into()));
        }
        self.vesting_schedule()?;
        Ok(())
    }

    /// Global schedule: cliff counted from the end of the last stage.
    pub fn vesting_schedule(&self) -> Result<VestingSchedule, SaleError> {
        let last_end = self.stages[STAGE_COUNT - 1].end_time;
        VestingSchedule::anchored(last_end, self.cliff_seconds, self.vesting_seconds)
    }
}

// ---------- Read models ----------

/// Outcome of an accepted purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub stage: StageId,
    pub token_amount: Balance,
    pub paid: Balance,
    /// Credited to both buyer and referrer; 0 without referrer.
    pub referral_bonus: Balance,
}

/// Read-only snapshot of the sale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleSnapshot {
    pub stages: [Stage; STAGE_COUNT],
    pub phases: [StagePhase; STAGE_COUNT],
    pub owner: Address,
    pub manager: Option<Address>,
    pub paused: bool,
    pub referral_rate: Balance,
    pub total_referral_tokens: Balance,
    pub burned: Balance,
    pub participants: usize,
    pub vesting: VestingSchedule,
}

// ---------- State ----------

struct SaleState {
    access: AccessControl,
    whitelist: Whitelist,
    stages: [Stage; STAGE_COUNT],
    ledger: Ledger,
    referrals: ReferralLedger,
    vesting: VestingSchedule,
    burned: Balance,
}

impl SaleState {
    fn stage_index(id: StageId) -> Result<usize, SaleError> {
        id.index().ok_or(SaleError::UnknownStage(id))
    }

    /// Purchases plus referral credit, counting only stages that deliver.
    fn entitlement(&self, who: Address) -> Result<Balance, SaleError> {
        let mut total: Balance = 0;
        for (i, stage) in self.stages.iter().enumerate() {
            if !stage.delivers() {
                continue;
            }
            total = total
                .checked_add(self.ledger.purchased(who, i))
                .and_then(|t| t.checked_add(self.referrals.credit_in_stage(who, i)))
                .ok_or(SaleError::MathOverflow)?;
        }
        Ok(total)
    }

    fn active_stage(&self, now: u64) -> Option<StageId> {
        self.stages.iter().position(|s| s.is_active(now)).map(StageId::from_index)
    }

    /// Stage `buy` targets: the active one, else the next to open, else the last.
    fn resolve_stage(&self, now: u64) -> StageId {
        let i = self
            .stages
            .iter()
            .position(|s| !s.window_closed(now))
            .unwrap_or(STAGE_COUNT - 1);
        StageId::from_index(i)
    }
}

// ---------- Engine ----------

pub struct TokenSale<B: SaleBackend> {
    backend: Arc<B>,
    exec: Mutex<()>,
    state: RwLock<SaleState>,
    events_tx: broadcast::Sender<SaleEvent>,
}

impl<B: SaleBackend> fmt::Debug for TokenSale<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.read();
        f.debug_struct("TokenSale")
            .field("owner", &st.access.owner())
            .field("participants", &st.ledger.participants())
            .field("paused", &st.access.is_paused())
            .finish()
    }
}

impl<B: SaleBackend> TokenSale<B> {
    pub fn new(backend: Arc<B>, cfg: SaleConfig, event_capacity: usize) -> Result<Arc<Self>, SaleError> {
        cfg.validate()?;
        if event_capacity == 0 {
            return Err(SaleError::InvalidConfig("event capacity must be > 0".into()));
        }
        let vesting = cfg.vesting_schedule()?;
        let (tx, _) = broadcast::channel(event_capacity);
        let state = SaleState {
            access: AccessControl::new(cfg.owner, cfg.manager),
            whitelist: Whitelist::with_owner(cfg.owner),
            stages: cfg.stages.map(Stage::new),
            ledger: Ledger::default(),
            referrals: ReferralLedger::with_rate(cfg.referral_rate)?,
            vesting,
            burned: 0,
        };
        info!(owner = %cfg.owner, cliff_start = vesting.cliff_start, vesting_end = vesting.end(), "token sale created");
        Ok(Arc::new(Self {
            backend,
            exec: Mutex::new(()),
            state: RwLock::new(state),
            events_tx: tx,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaleEvent> {
        self.events_tx.subscribe()
    }

    fn now(&self) -> u64 {
        self.backend.now_unix()
    }

    fn emit(&self, ev: SaleEvent) {
        let _ = self.events_tx.send(ev);
    }

    // ----- administration -----

    /// Batch whitelist update. Owner or manager.
    pub fn set_eligibility(&self, caller: Address, addresses: &[Address], flags: &[bool]) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.require_manager(caller)?;
        st.whitelist.apply_batch(addresses, flags)?;
        info!(%caller, count = addresses.len(), "whitelist updated");
        for (addr, eligible) in addresses.iter().zip(flags) {
            self.emit(SaleEvent::EligibilityUpdated { addr: *addr, eligible: *eligible });
        }
        Ok(())
    }

    pub fn set_manager(&self, caller: Address, manager: Option<Address>) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.require_owner(caller)?;
        st.access.set_manager(manager);
        info!(?manager, "manager changed");
        self.emit(SaleEvent::ManagerChanged { manager });
        Ok(())
    }

    pub fn set_referral_rate(&self, caller: Address, rate: Balance) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.require_owner(caller)?;
        st.referrals.set_rate(rate)?;
        info!(rate, "referral rate changed");
        self.emit(SaleEvent::ReferralRateChanged { rate });
        Ok(())
    }

    pub fn set_paused(&self, caller: Address, paused: bool) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.require_owner(caller)?;
        st.access.set_paused(paused);
        info!(paused, "pause switched");
        self.emit(SaleEvent::PauseChanged { paused });
        Ok(())
    }

    /// Hand the owner role over. The new owner is whitelisted.
    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.require_owner(caller)?;
        st.access.set_owner(new_owner);
        st.whitelist.set(new_owner, true);
        info!(from = %caller, to = %new_owner, "ownership transferred");
        self.emit(SaleEvent::OwnershipTransferred { from: caller, to: new_owner });
        Ok(())
    }

    // ----- purchases -----

    /// Buy `token_amount` in `stage`, paying exactly `token_amount / price`.
    pub fn purchase(
        &self,
        buyer: Address,
        stage: StageId,
        token_amount: Balance,
        payment: Balance,
        referrer: Option<Address>,
    ) -> Result<PurchaseReceipt, SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        self.purchase_locked(&mut st, buyer, stage, token_amount, payment, referrer)
    }

    /// Like `purchase`, targeting whichever stage is currently open.
    pub fn buy(
        &self,
        buyer: Address,
        token_amount: Balance,
        payment: Balance,
        referrer: Option<Address>,
    ) -> Result<PurchaseReceipt, SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        let stage = st.resolve_stage(self.now());
        self.purchase_locked(&mut st, buyer, stage, token_amount, payment, referrer)
    }

    fn purchase_locked(
        &self,
        st: &mut SaleState,
        buyer: Address,
        stage: StageId,
        token_amount: Balance,
        payment: Balance,
        referrer: Option<Address>,
    ) -> Result<PurchaseReceipt, SaleError> {
        st.access.require_not_paused()?;
        let idx = SaleState::stage_index(stage)?;
        let now = self.now();
        if !st.stages[idx].is_active(now) {
            return Err(SaleError::SaleNotActive(stage));
        }
        if !st.whitelist.is_eligible(buyer) {
            return Err(SaleError::NotEligible);
        }
        if token_amount == 0 {
            return Err(SaleError::ZeroAmount);
        }

        let s = &st.stages[idx];
        let remaining = s.remaining();
        if token_amount > remaining {
            return Err(SaleError::SaleSupplyExceeded { remaining });
        }
        if token_amount < s.params.min_purchase {
            return Err(SaleError::BelowMinimumPurchase { min: s.params.min_purchase });
        }
        s.check_payment(token_amount, payment)?;

        let bonus = match referrer {
            Some(r) => {
                if r == buyer {
                    return Err(SaleError::SelfReferral);
                }
                if !st.whitelist.is_eligible(r) {
                    return Err(SaleError::ReferralNotEligible);
                }
                if !st.ledger.has_purchased(r) {
                    return Err(SaleError::ReferralNeverPurchased);
                }
                st.referrals.bonus_for(token_amount)
            }
            None => 0,
        };

        let sold = s.tokens_sold.checked_add(token_amount).ok_or(SaleError::MathOverflow)?;
        let raised = s.raised.checked_add(payment).ok_or(SaleError::MathOverflow)?;
        bonus
            .checked_mul(2)
            .and_then(|b| st.referrals.total_issued().checked_add(b))
            .ok_or(SaleError::MathOverflow)?;

        // A failed pull leaves no trace: nothing has been written yet.
        self.backend.collect_payment(buyer, payment)?;

        // Per-participant sums are bounded by the stage and referral totals checked above.
        if let (Some(r), true) = (referrer, bonus > 0) {
            st.referrals.credit(r, buyer, idx, bonus)?;
        }
        st.ledger.record_purchase(buyer, idx, token_amount, payment)?;
        let s = &mut st.stages[idx];
        s.tokens_sold = sold;
        s.raised = raised;

        debug!(%buyer, %stage, token_amount, payment, bonus, "tokens purchased");
        self.emit(SaleEvent::TokensPurchased { buyer, stage, token_amount, paid: payment });
        if let (Some(r), true) = (referrer, bonus > 0) {
            self.emit(SaleEvent::ReferralCredited { referrer: r, referee: buyer, stage, bonus });
        }
        Ok(PurchaseReceipt { stage, token_amount, paid: payment, referral_bonus: bonus })
    }

    // ----- settlement -----

    /// Close `stage` as success or failure and hand its surplus back to the owner.
    /// Returns `true` on success.
    #[instrument(level = "debug", skip(self))]
    pub fn settle(&self, caller: Address, stage: StageId) -> Result<bool, SaleError> {
        let _ex = self.exec.lock();
        let mut guard = self.state.write();
        let st = &mut *guard;

        st.access.require_owner(caller)?;
        st.access.require_not_paused()?;
        let idx = SaleState::stage_index(stage)?;
        if st.stages[idx].ended {
            return Err(SaleError::AlreadySettled(stage));
        }
        if let Some(prior) = st.stages[..idx].iter().position(|s| !s.ended) {
            return Err(SaleError::PriorStageNotSettled(StageId::from_index(prior)));
        }
        if !st.stages[idx].window_closed(self.now()) {
            return Err(SaleError::NotYetEnded(stage));
        }

        let before = st.stages[idx].clone();
        let success = before.threshold_met();
        let returned = before.settlement_return(success);
        let owner = st.access.owner();
        {
            let s = &mut st.stages[idx];
            s.ended = true;
            s.failed = !success;
            s.surplus_released = true;
        }

        if returned > 0 {
            if let Err(e) = self.backend.transfer_tokens(owner, returned) {
                warn!(%stage, error = %e, "token return failed, settlement rolled back");
                st.stages[idx] = before;
                return Err(e.into());
            }
        }

        info!(%stage, success, tokens_sold = before.tokens_sold, returned, "stage settled");
        self.emit(SaleEvent::SaleSettled { stage, success });

        // The token return above cannot be undone, so a failed payout leaves the
        // stage settled with proceeds pending for `withdraw_proceeds`.
        if success && st.stages[idx].raised > 0 {
            if let Err(e) = self.forward_proceeds(st, idx, owner) {
                warn!(%stage, error = %e, "proceeds payout failed, left pending");
            }
        }
        Ok(success)
    }

    /// Retry forwarding the currency of a successful stage whose payout failed
    /// during `settle`.
    pub fn withdraw_proceeds(&self, caller: Address, stage: StageId) -> Result<Balance, SaleError> {
        let _ex = self.exec.lock();
        let mut guard = self.state.write();
        let st = &mut *guard;

        st.access.require_owner(caller)?;
        st.access.require_not_paused()?;
        let idx = SaleState::stage_index(stage)?;
        let s = &st.stages[idx];
        if !s.ended || s.failed || s.proceeds_withdrawn || s.raised == 0 {
            return Err(SaleError::ProceedsUnavailable(stage));
        }
        let owner = st.access.owner();
        self.forward_proceeds(st, idx, owner).map_err(|e| {
            warn!(%stage, error = %e, "proceeds payout failed again");
            e
        })
    }

    fn forward_proceeds(&self, st: &mut SaleState, idx: usize, owner: Address) -> Result<Balance, SaleError> {
        let stage = StageId::from_index(idx);
        let amount = st.stages[idx].raised;

        st.stages[idx].proceeds_withdrawn = true;
        if let Err(e) = self.backend.send_payment(owner, amount) {
            st.stages[idx].proceeds_withdrawn = false;
            return Err(e.into());
        }

        info!(%stage, amount, "proceeds forwarded");
        self.emit(SaleEvent::ProceedsForwarded { stage, to: owner, amount });
        Ok(amount)
    }

    // ----- vesting -----

    /// Release whatever has vested for `beneficiary` and not been claimed yet.
    pub fn claim(&self, beneficiary: Address) -> Result<Balance, SaleError> {
        let _ex = self.exec.lock();
        let mut guard = self.state.write();
        let st = &mut *guard;

        st.access.require_not_paused()?;
        if !st.whitelist.is_eligible(beneficiary) {
            return Err(SaleError::NotEligible);
        }
        let now = self.now();
        if !st.vesting.has_started(now) {
            return Err(SaleError::ClaimNotStarted);
        }
        let total = st.entitlement(beneficiary)?;
        let claimable = st.vesting.releasable_at(total, st.ledger.claimed(beneficiary), now)?;
        if claimable == 0 {
            return Err(SaleError::NothingClaimable);
        }

        st.ledger.add_claimed(beneficiary, claimable)?;
        if let Err(e) = self.backend.transfer_tokens(beneficiary, claimable) {
            warn!(%beneficiary, error = %e, "token transfer failed, claim rolled back");
            st.ledger.revert_claimed(beneficiary, claimable);
            return Err(e.into());
        }

        debug!(%beneficiary, claimable, total, "tokens claimed");
        self.emit(SaleEvent::TokensClaimed { beneficiary, amount: claimable });
        Ok(claimable)
    }

    // ----- refunds -----

    /// Pay back what `buyer` paid in a failed stage. Zeroes the record before paying.
    pub fn claim_refund(&self, buyer: Address, stage: StageId) -> Result<Balance, SaleError> {
        let _ex = self.exec.lock();
        let mut guard = self.state.write();
        let st = &mut *guard;

        st.access.require_not_paused()?;
        let idx = SaleState::stage_index(stage)?;
        if !st.stages[idx].failed {
            return Err(SaleError::RefundNotActive(stage));
        }
        let amount = st.ledger.take_refund(buyer, idx);
        if amount == 0 {
            return Err(SaleError::NothingToRefund);
        }

        if let Err(e) = self.backend.send_payment(buyer, amount) {
            warn!(%buyer, %stage, error = %e, "refund payout failed, record restored");
            st.ledger.restore_refund(buyer, idx, amount);
            return Err(e.into());
        }

        debug!(%buyer, %stage, amount, "refunded");
        self.emit(SaleEvent::Refunded { buyer, stage, amount });
        Ok(amount)
    }

    // ----- reclamation -----

    /// Burn the unsold supply still held once every window has elapsed.
    /// Settlement is not required; each stage's surplus is burned at most once.
    #[instrument(level = "debug", skip(self))]
    pub fn reclaim_unsold(&self, caller: Address) -> Result<Balance, SaleError> {
        let _ex = self.exec.lock();
        let mut guard = self.state.write();
        let st = &mut *guard;

        st.access.require_owner(caller)?;
        st.access.require_not_paused()?;
        let now = self.now();
        if st.stages.iter().any(|s| !s.window_closed(now)) {
            return Err(SaleError::SaleStillRunning);
        }

        let mut amount: Balance = 0;
        for s in st.stages.iter().filter(|s| !s.surplus_released) {
            amount = amount.checked_add(s.remaining()).ok_or(SaleError::MathOverflow)?;
        }
        if amount == 0 {
            return Err(SaleError::NothingToReclaim);
        }
        let burned = st.burned.checked_add(amount).ok_or(SaleError::MathOverflow)?;

        let held = self.backend.token_balance(self.backend.escrow_address())?;
        if held < amount {
            return Err(BackendError::Insufficient { needed: amount, available: held }.into());
        }

        let released_before: [bool; STAGE_COUNT] = std::array::from_fn(|i| st.stages[i].surplus_released);
        for s in st.stages.iter_mut() {
            s.surplus_released = true;
        }
        if let Err(e) = self.backend.burn_tokens(amount) {
            warn!(amount, error = %e, "burn failed, reclamation rolled back");
            for (s, was) in st.stages.iter_mut().zip(released_before) {
                s.surplus_released = was;
            }
            return Err(e.into());
        }
        st.burned = burned;

        info!(amount, total_burned = burned, "unsold tokens burned");
        self.emit(SaleEvent::UnsoldTokensBurned { amount });
        Ok(amount)
    }

    // ----- reads -----

    pub fn snapshot(&self) -> SaleSnapshot {
        let now = self.now();
        let st = self.state.read();
        SaleSnapshot {
            stages: st.stages.clone(),
            phases: std::array::from_fn(|i| st.stages[i].phase(now)),
            owner: st.access.owner(),
            manager: st.access.manager(),
            paused: st.access.is_paused(),
            referral_rate: st.referrals.rate(),
            total_referral_tokens: st.referrals.total_issued(),
            burned: st.burned,
            participants: st.ledger.participants(),
            vesting: st.vesting,
        }
    }

    pub fn stage(&self, stage: StageId) -> Result<Stage, SaleError> {
        let idx = SaleState::stage_index(stage)?;
        Ok(self.state.read().stages[idx].clone())
    }

    pub fn stage_phase(&self, stage: StageId) -> Result<StagePhase, SaleError> {
        let idx = SaleState::stage_index(stage)?;
        let now = self.now();
        Ok(self.state.read().stages[idx].phase(now))
    }

    pub fn active_stage(&self) -> Option<StageId> {
        let now = self.now();
        self.state.read().active_stage(now)
    }

    pub fn is_eligible(&self, who: Address) -> bool {
        self.state.read().whitelist.is_eligible(who)
    }

    pub fn owner(&self) -> Address {
        self.state.read().access.owner()
    }

    pub fn is_paused(&self) -> bool {
        self.state.read().access.is_paused()
    }

    pub fn purchased(&self, who: Address, stage: StageId) -> Result<Balance, SaleError> {
        let idx = SaleState::stage_index(stage)?;
        Ok(self.state.read().ledger.purchased(who, idx))
    }

    pub fn refundable(&self, who: Address, stage: StageId) -> Result<Balance, SaleError> {
        let idx = SaleState::stage_index(stage)?;
        Ok(self.state.read().ledger.refundable(who, idx))
    }

    pub fn referral_credit(&self, who: Address) -> Balance {
        self.state.read().referrals.credit_of(who)
    }

    pub fn total_referral_tokens(&self) -> Balance {
        self.state.read().referrals.total_issued()
    }

    pub fn claimed(&self, who: Address) -> Balance {
        self.state.read().ledger.claimed(who)
    }

    pub fn entitlement(&self, who: Address) -> Result<Balance, SaleError> {
        self.state.read().entitlement(who)
    }

    /// What `claim` would release right now; 0 before the cliff.
    pub fn claimable(&self, who: Address) -> Result<Balance, SaleError> {
        let now = self.now();
        let st = self.state.read();
        let total = st.entitlement(who)?;
        st.vesting.releasable_at(total, st.ledger.claimed(who), now)
    }

    pub fn cliff_start(&self) -> u64 {
        self.state.read().vesting.cliff_start
    }
}

// ---------- Tests ----------
