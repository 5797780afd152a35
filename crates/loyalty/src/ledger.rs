//! Admin ledger operations: cashback accrual, point deduction, plain visit
//! recording, and achievement claims.
//!
//! Each operation reads the account, computes the new counters and the visit
//! record, re-evaluates achievements over the resulting ledger, and submits
//! everything as a single [`LedgerCommit`]. A failed or conflicting commit
//! leaves no partial state behind.

use crate::accounts::AccessPolicy;
use crate::achievements::{self, AchievementEvaluator, Evaluation};
use crate::deduction::DeductionPolicy;
use crate::inflight::InFlight;
use crate::tier::{tier_progress, CashbackTier, TierProgress};
use chrono::{DateTime, Utc};
use lounge_core::config::AppConfig;
use lounge_core::event_bus::{make_event, LedgerEventSink, LedgerEventType};
use lounge_core::types::{
    Account, AccountId, AchievementId, AchievementProgress, Principal, VisitKind, VisitRecord,
};
use lounge_core::{LoungeError, LoungeResult};
use lounge_store::{LedgerCommit, LedgerStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Preview of what an order would earn or allow, shown before committing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerQuote {
    pub account_id: AccountId,
    pub order_amount: u64,
    pub tier: CashbackTier,
    pub percent: u64,
    pub cashback: u64,
    pub max_deductible: u64,
    /// `min(max_deductible, balance)`.
    pub suggested_deduction: u64,
    pub balance: u64,
    pub progress: TierProgress,
}

/// Outcome of a committed ledger operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub account: Account,
    pub visit: VisitRecord,
    /// Tier the accrual was computed at (before this visit was counted).
    pub tier: CashbackTier,
    pub newly_unlocked: Vec<AchievementId>,
}

pub struct LedgerService<S: LedgerStore> {
    store: Arc<S>,
    policy: DeductionPolicy,
    evaluator: AchievementEvaluator,
    access: AccessPolicy,
    inflight: InFlight,
    events: Arc<dyn LedgerEventSink>,
    venue_name: String,
    bonus_venue_name: String,
}

impl<S: LedgerStore> LedgerService<S> {
    pub fn new(store: Arc<S>, config: &AppConfig, events: Arc<dyn LedgerEventSink>) -> Self {
        info!(
            venue = %config.ledger.venue_name,
            max_deduction_percent = config.ledger.max_deduction_percent,
            utc_offset_minutes = config.ledger.utc_offset_minutes,
            "Ledger service initialized"
        );
        Self {
            store,
            policy: DeductionPolicy::from_config(&config.ledger),
            evaluator: AchievementEvaluator::new(config.ledger.utc_offset_minutes),
            access: AccessPolicy::new(config.accounts.admin_email.clone()),
            inflight: InFlight::new(),
            events,
            venue_name: config.ledger.venue_name.clone(),
            bonus_venue_name: config.ledger.bonus_venue_name.clone(),
        }
    }

    pub fn policy(&self) -> &DeductionPolicy {
        &self.policy
    }

    pub fn evaluator(&self) -> &AchievementEvaluator {
        &self.evaluator
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub fn quote(
        &self,
        principal: &Principal,
        account_id: &AccountId,
        order_amount: u64,
    ) -> LoungeResult<LedgerQuote> {
        self.access.require_admin(self.store.as_ref(), principal)?;
        let account = self.load_live(account_id)?;

        let tier = CashbackTier::for_counters(account.visits, account.total_spent);
        Ok(LedgerQuote {
            account_id: account.id.clone(),
            order_amount,
            tier,
            percent: tier.percent(),
            cashback: tier.cashback_for(order_amount),
            max_deductible: self.policy.max_deductible(order_amount),
            suggested_deduction: self.policy.suggested_deduction(order_amount, account.cashback),
            balance: account.cashback,
            progress: tier_progress(account.visits, account.total_spent),
        })
    }

    /// Visit history, newest first.
    pub fn visit_history(
        &self,
        principal: &Principal,
        account_id: &AccountId,
    ) -> LoungeResult<Vec<VisitRecord>> {
        self.access
            .require_owner_or_admin(self.store.as_ref(), principal, account_id)?;
        self.load_live(account_id)?;

        let mut visits = self.store.visits_for(account_id)?;
        visits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(visits)
    }

    /// Current achievement view, computed from the ledger without writing.
    pub fn achievements(
        &self,
        principal: &Principal,
        account_id: &AccountId,
    ) -> LoungeResult<Vec<AchievementProgress>> {
        self.access
            .require_owner_or_admin(self.store.as_ref(), principal, account_id)?;
        let account = self.load_live(account_id)?;
        let visits = self.store.visits_for(account_id)?;
        let existing = self.store.achievements_for(account_id)?;
        Ok(self
            .evaluator
            .evaluate(&account, &visits, &existing, Utc::now())
            .progress)
    }

    // ─── Ledger operations ──────────────────────────────────────────────────

    /// Credit cashback for an order at the account's current tier.
    pub fn accrue(
        &self,
        principal: &Principal,
        account_id: &AccountId,
        order_amount: u64,
    ) -> LoungeResult<LedgerReceipt> {
        self.access.require_admin(self.store.as_ref(), principal)?;
        let _guard = self.inflight.try_acquire(account_id)?;
        let account = self.load_live(account_id)?;

        if order_amount == 0 {
            return Err(self.reject(
                account_id,
                LoungeError::Validation("order amount is required".into()),
            ));
        }

        let tier = CashbackTier::for_counters(account.visits, account.total_spent);
        let earned = tier.cashback_for(order_amount);
        let delta = signed(earned)?;
        debug!(
            account_id = %account_id,
            tier = ?tier,
            percent = tier.percent(),
            earned = earned,
            "Cashback computed"
        );

        let mut updated = account.clone();
        updated.cashback = updated.cashback.saturating_add(earned);
        updated.visits = updated.visits.saturating_add(1);
        updated.total_spent = updated.total_spent.saturating_add(order_amount);

        let visit = self.visit(&account, order_amount, delta, VisitKind::Accrual, Utc::now());
        let receipt = self.commit_visit(account, updated, visit, tier)?;

        metrics::counter!("loyalty.cashback_accrued").increment(earned);
        self.events.emit(make_event(
            LedgerEventType::CashbackAccrued,
            account_id,
            Some(delta),
            None,
        ));
        info!(
            account_id = %account_id,
            order_amount = order_amount,
            earned = earned,
            balance = receipt.account.cashback,
            visits = receipt.account.visits,
            "Cashback accrued"
        );
        Ok(receipt)
    }

    /// Pay part of an order with points. No cashback accrues on this order.
    pub fn deduct(
        &self,
        principal: &Principal,
        account_id: &AccountId,
        deduct_amount: i64,
        order_amount: u64,
    ) -> LoungeResult<LedgerReceipt> {
        self.access.require_admin(self.store.as_ref(), principal)?;
        let _guard = self.inflight.try_acquire(account_id)?;
        let account = self.load_live(account_id)?;

        let amount = self
            .policy
            .validate(deduct_amount, order_amount, account.cashback)
            .map_err(|e| self.reject(account_id, e))?;
        let delta = signed(amount)?;
        let tier = CashbackTier::for_counters(account.visits, account.total_spent);

        let mut updated = account.clone();
        updated.cashback -= amount;
        updated.visits = updated.visits.saturating_add(1);

        let visit = self.visit(&account, order_amount, -delta, VisitKind::Deduction, Utc::now());
        let receipt = self.commit_visit(account, updated, visit, tier)?;

        metrics::counter!("loyalty.cashback_deducted").increment(amount);
        self.events.emit(make_event(
            LedgerEventType::CashbackDeducted,
            account_id,
            Some(-delta),
            None,
        ));
        info!(
            account_id = %account_id,
            order_amount = order_amount,
            deducted = amount,
            balance = receipt.account.cashback,
            "Points deducted"
        );
        Ok(receipt)
    }

    /// Count a visit without touching the balance.
    pub fn record_visit(
        &self,
        principal: &Principal,
        account_id: &AccountId,
        order_amount: Option<u64>,
    ) -> LoungeResult<LedgerReceipt> {
        self.access.require_admin(self.store.as_ref(), principal)?;
        let _guard = self.inflight.try_acquire(account_id)?;
        let account = self.load_live(account_id)?;

        let order_amount = order_amount.unwrap_or(0);
        let tier = CashbackTier::for_counters(account.visits, account.total_spent);

        let mut updated = account.clone();
        updated.visits = updated.visits.saturating_add(1);
        updated.total_spent = updated.total_spent.saturating_add(order_amount);

        let visit = self.visit(&account, order_amount, 0, VisitKind::VisitOnly, Utc::now());
        let receipt = self.commit_visit(account, updated, visit, tier)?;

        self.events.emit(make_event(
            LedgerEventType::VisitRecorded,
            account_id,
            None,
            None,
        ));
        info!(
            account_id = %account_id,
            order_amount = order_amount,
            visits = receipt.account.visits,
            "Visit recorded"
        );
        Ok(receipt)
    }

    /// Re-run achievement evaluation and persist the result.
    pub fn evaluate_achievements(
        &self,
        principal: &Principal,
        account_id: &AccountId,
    ) -> LoungeResult<Vec<AchievementProgress>> {
        self.access
            .require_owner_or_admin(self.store.as_ref(), principal, account_id)?;
        let _guard = self.inflight.try_acquire(account_id)?;
        let account = self.load_live(account_id)?;

        let visits = self.store.visits_for(account_id)?;
        let evaluation = self.evaluate(&account, &visits, Utc::now())?;
        let progress = evaluation.progress.clone();

        self.store.commit(LedgerCommit {
            achievements: evaluation.progress,
            ..LedgerCommit::account_only(account)
        })?;
        self.announce_unlocks(account_id, &evaluation.newly_unlocked);
        Ok(progress)
    }

    /// Member claims an unlocked achievement. The reward is credited to the
    /// balance with a zero-amount bonus record, and the claim is stored, in
    /// one commit. A second claim of the same achievement fails. Only a
    /// member with a verified email can claim.
    pub fn claim_achievement(
        &self,
        principal: &Principal,
        achievement: AchievementId,
    ) -> LoungeResult<LedgerReceipt> {
        let account_id = &principal.account_id;
        if !principal.email_verified {
            return Err(self.reject(
                account_id,
                LoungeError::PermissionDenied("email is not verified".into()),
            ));
        }
        let _guard = self.inflight.try_acquire(account_id)?;
        let account = self.load_live(account_id)?;
        let now = Utc::now();

        let visits = self.store.visits_for(account_id)?;
        let mut evaluation = self.evaluate(&account, &visits, now)?;
        let progress = evaluation.get_mut(achievement).ok_or_else(|| {
            LoungeError::NotFound(format!("achievement {achievement}"))
        })?;
        let reward = achievements::claim(progress, now).map_err(|e| self.reject(account_id, e))?;
        let delta = signed(reward)?;

        let mut updated = account.clone();
        updated.cashback = updated.cashback.saturating_add(reward);

        let visit = VisitRecord {
            venue: self.bonus_venue_name.clone(),
            ..self.visit(&account, 0, delta, VisitKind::Bonus, now)
        };
        let tier = CashbackTier::for_counters(account.visits, account.total_spent);
        let expected_revision = account.revision;
        let committed = self.store.commit(LedgerCommit {
            account: updated,
            expected_revision,
            visit: Some(visit.clone()),
            achievements: evaluation.progress,
        })?;

        self.announce_unlocks(account_id, &evaluation.newly_unlocked);
        metrics::counter!("loyalty.achievements_claimed").increment(1);
        self.events.emit(make_event(
            LedgerEventType::AchievementClaimed,
            account_id,
            Some(delta),
            Some(achievement),
        ));
        info!(
            account_id = %account_id,
            achievement = %achievement,
            reward = reward,
            balance = committed.cashback,
            "Achievement claimed"
        );

        Ok(LedgerReceipt {
            account: committed,
            visit,
            tier,
            newly_unlocked: evaluation.newly_unlocked,
        })
    }

    /// Administrative reset of one achievement: progress zeroed, unlock and
    /// claim cleared.
    pub fn reset_achievement(
        &self,
        principal: &Principal,
        account_id: &AccountId,
        achievement: AchievementId,
    ) -> LoungeResult<AchievementProgress> {
        self.access.require_admin(self.store.as_ref(), principal)?;
        let _guard = self.inflight.try_acquire(account_id)?;
        let account = self.load_live(account_id)?;

        let def = achievements::definition(achievement);
        let mut progress = self
            .store
            .achievements_for(account_id)?
            .into_iter()
            .find(|p| p.achievement == achievement)
            .unwrap_or_else(|| AchievementProgress {
                account_id: account_id.clone(),
                achievement,
                progress: 0,
                target: def.target,
                reward: def.reward,
                unlocked: false,
                claimed: false,
                unlocked_at: None,
                claimed_at: None,
            });
        achievements::reset(&mut progress);

        self.store.commit(LedgerCommit {
            achievements: vec![progress.clone()],
            ..LedgerCommit::account_only(account)
        })?;

        self.events.emit(make_event(
            LedgerEventType::AchievementReset,
            account_id,
            None,
            Some(achievement),
        ));
        warn!(account_id = %account_id, achievement = %achievement, "Achievement reset");
        Ok(progress)
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn load_live(&self, id: &AccountId) -> LoungeResult<Account> {
        match self.store.account(id)? {
            Some(account) if !account.status.is_deleted() => Ok(account),
            _ => Err(LoungeError::NotFound(format!("account {id}"))),
        }
    }

    fn visit(
        &self,
        account: &Account,
        order_amount: u64,
        cashback: i64,
        kind: VisitKind,
        timestamp: DateTime<Utc>,
    ) -> VisitRecord {
        VisitRecord {
            id: Uuid::new_v4(),
            account_id: account.id.clone(),
            timestamp,
            order_amount,
            cashback,
            is_deduction: kind == VisitKind::Deduction,
            venue: self.venue_name.clone(),
            kind,
        }
    }

    fn evaluate(
        &self,
        account: &Account,
        visits: &[VisitRecord],
        now: DateTime<Utc>,
    ) -> LoungeResult<Evaluation> {
        let existing = self.store.achievements_for(&account.id)?;
        Ok(self.evaluator.evaluate(account, visits, &existing, now))
    }

    /// Commit counters + visit + re-evaluated achievements as one write.
    fn commit_visit(
        &self,
        original: Account,
        updated: Account,
        visit: VisitRecord,
        tier: CashbackTier,
    ) -> LoungeResult<LedgerReceipt> {
        let mut visits = self.store.visits_for(&original.id)?;
        visits.push(visit.clone());
        let evaluation = self.evaluate(&updated, &visits, visit.timestamp)?;

        let committed = self.store.commit(LedgerCommit {
            account: updated,
            expected_revision: original.revision,
            visit: Some(visit.clone()),
            achievements: evaluation.progress,
        })?;

        metrics::counter!("loyalty.visits_recorded").increment(1);
        self.announce_unlocks(&committed.id, &evaluation.newly_unlocked);

        Ok(LedgerReceipt {
            account: committed,
            visit,
            tier,
            newly_unlocked: evaluation.newly_unlocked,
        })
    }

    fn announce_unlocks(&self, account_id: &AccountId, unlocked: &[AchievementId]) {
        for id in unlocked {
            metrics::counter!("loyalty.achievements_unlocked").increment(1);
            self.events.emit(make_event(
                LedgerEventType::AchievementUnlocked,
                account_id,
                None,
                Some(*id),
            ));
            info!(account_id = %account_id, achievement = %id, "Achievement unlocked");
        }
    }

    fn reject(&self, account_id: &AccountId, err: LoungeError) -> LoungeError {
        metrics::counter!("loyalty.ledger_rejected").increment(1);
        warn!(account_id = %account_id, error = %err, "Ledger operation rejected");
        err
    }
}

fn signed(amount: u64) -> LoungeResult<i64> {
    i64::try_from(amount)
        .map_err(|_| LoungeError::Validation(format!("amount {amount} is out of range")))
}
