//! Achievement catalogue and evaluation.
//!
//! Progress is recomputed from the visit ledger on every evaluation. Once an
//! achievement reaches its target it stays unlocked, and a claim is permanent;
//! only an explicit reset clears either flag.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};
use lounge_core::types::{Account, AchievementId, AchievementProgress, VisitRecord};
use lounge_core::{LoungeError, LoungeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Streaks are counted up to this many days.
pub const STREAK_CAP: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    /// Lifetime visit counter.
    VisitMilestone,
    /// Visits in the current calendar month.
    Monthly,
    /// Consecutive calendar days.
    Streak,
}

#[derive(Debug, Clone, Copy)]
pub struct AchievementDefinition {
    pub id: AchievementId,
    pub title: &'static str,
    pub description: &'static str,
    pub kind: AchievementKind,
    pub target: u32,
    pub reward: u64,
}

pub const CATALOGUE: [AchievementDefinition; 4] = [
    AchievementDefinition {
        id: AchievementId::MasterRelax,
        title: "Мастер релакса",
        description: "20 visits",
        kind: AchievementKind::VisitMilestone,
        target: 20,
        reward: 250,
    },
    AchievementDefinition {
        id: AchievementId::GuruComfort,
        title: "Гуру комфорта",
        description: "50 visits",
        kind: AchievementKind::VisitMilestone,
        target: 50,
        reward: 550,
    },
    AchievementDefinition {
        id: AchievementId::SmokyDischarge,
        title: "Дымный разряд",
        description: "15 visits in the current month",
        kind: AchievementKind::Monthly,
        target: 15,
        reward: 300,
    },
    AchievementDefinition {
        id: AchievementId::NoBreak,
        title: "Без перерыва",
        description: "5 days in a row",
        kind: AchievementKind::Streak,
        target: STREAK_CAP,
        reward: 250,
    },
];

pub fn definition(id: AchievementId) -> &'static AchievementDefinition {
    match id {
        AchievementId::MasterRelax => &CATALOGUE[0],
        AchievementId::GuruComfort => &CATALOGUE[1],
        AchievementId::SmokyDischarge => &CATALOGUE[2],
        AchievementId::NoBreak => &CATALOGUE[3],
    }
}

fn local_date(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// Length of the run of consecutive local dates starting at the earliest
/// visit date, capped at [`STREAK_CAP`]. Multiple visits on one day count once.
pub fn consecutive_day_streak<I>(timestamps: I, offset: FixedOffset) -> u32
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let dates: BTreeSet<NaiveDate> = timestamps
        .into_iter()
        .map(|ts| local_date(ts, offset))
        .collect();

    let mut streak = 0u32;
    let mut prev: Option<NaiveDate> = None;
    for date in dates {
        match prev {
            None => streak = 1,
            Some(p) if p.succ_opt() == Some(date) => streak += 1,
            Some(_) => break,
        }
        if streak >= STREAK_CAP {
            break;
        }
        prev = Some(date);
    }
    streak.min(STREAK_CAP)
}

/// Visits whose local date falls in the same month and year as `now`.
pub fn monthly_visits<I>(timestamps: I, now: DateTime<Utc>, offset: FixedOffset) -> u32
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let today = local_date(now, offset);
    let count = timestamps
        .into_iter()
        .map(|ts| local_date(ts, offset))
        .filter(|d| d.year() == today.year() && d.month() == today.month())
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Result of re-running the catalogue over an account's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// One record per catalogue entry.
    pub progress: Vec<AchievementProgress>,
    pub newly_unlocked: Vec<AchievementId>,
}

impl Evaluation {
    pub fn get(&self, id: AchievementId) -> Option<&AchievementProgress> {
        self.progress.iter().find(|p| p.achievement == id)
    }

    pub fn get_mut(&mut self, id: AchievementId) -> Option<&mut AchievementProgress> {
        self.progress.iter_mut().find(|p| p.achievement == id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AchievementEvaluator {
    offset: FixedOffset,
}

impl AchievementEvaluator {
    /// Out-of-range offsets fall back to UTC.
    pub fn new(utc_offset_minutes: i32) -> Self {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Raw progress toward `def`, before capping at the target.
    /// Reward records are not attendance and are ignored.
    pub fn measure(
        &self,
        def: &AchievementDefinition,
        account: &Account,
        visits: &[VisitRecord],
        now: DateTime<Utc>,
    ) -> u32 {
        let attended = visits
            .iter()
            .filter(|v| v.kind.is_attendance())
            .map(|v| v.timestamp);

        match def.kind {
            AchievementKind::VisitMilestone => account.visits,
            AchievementKind::Monthly => monthly_visits(attended, now, self.offset),
            AchievementKind::Streak => consecutive_day_streak(attended, self.offset),
        }
    }

    pub fn evaluate(
        &self,
        account: &Account,
        visits: &[VisitRecord],
        existing: &[AchievementProgress],
        now: DateTime<Utc>,
    ) -> Evaluation {
        let mut progress = Vec::with_capacity(CATALOGUE.len());
        let mut newly_unlocked = Vec::new();

        for def in &CATALOGUE {
            let current = self.measure(def, account, visits, now).min(def.target);
            let reached = current >= def.target;
            let prev = existing.iter().find(|p| p.achievement == def.id);

            let was_unlocked = prev.map(|p| p.unlocked).unwrap_or(false);
            if reached && !was_unlocked {
                newly_unlocked.push(def.id);
            }

            progress.push(AchievementProgress {
                account_id: account.id.clone(),
                achievement: def.id,
                progress: current,
                target: def.target,
                reward: def.reward,
                unlocked: was_unlocked || reached,
                claimed: prev.map(|p| p.claimed).unwrap_or(false),
                unlocked_at: prev
                    .and_then(|p| p.unlocked_at)
                    .or(if reached { Some(now) } else { None }),
                claimed_at: prev.and_then(|p| p.claimed_at),
            });
        }

        Evaluation {
            progress,
            newly_unlocked,
        }
    }
}

/// Mark an unlocked achievement as claimed and return its reward.
pub fn claim(progress: &mut AchievementProgress, now: DateTime<Utc>) -> LoungeResult<u64> {
    if progress.claimed {
        return Err(LoungeError::AlreadyClaimed(progress.achievement.to_string()));
    }
    if !progress.is_claimable() {
        return Err(LoungeError::NotUnlocked(format!(
            "{} ({}/{})",
            progress.achievement, progress.progress, progress.target
        )));
    }
    progress.claimed = true;
    progress.claimed_at = Some(now);
    Ok(progress.reward)
}

/// Administrative reset: clears progress and both flags.
pub fn reset(progress: &mut AchievementProgress) {
    progress.progress = 0;
    progress.unlocked = false;
    progress.claimed = false;
    progress.unlocked_at = None;
    progress.claimed_at = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use lounge_core::types::{AccountCode, AccountId, AccountStatus, VisitKind};
    use uuid::Uuid;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn test_account(visits: u32) -> Account {
        Account {
            id: AccountId::from("acc-1"),
            code: AccountCode::parse("ABC123").unwrap(),
            name: "Test".into(),
            email: "test@example.com".into(),
            date_of_birth: None,
            status: AccountStatus::Active,
            email_verified: true,
            qr_code: String::new(),
            cashback: 0,
            visits,
            total_spent: 0,
            created_at: Utc::now(),
            revision: 0,
        }
    }

    fn visit_at(ts: DateTime<Utc>, kind: VisitKind) -> VisitRecord {
        VisitRecord {
            id: Uuid::new_v4(),
            account_id: AccountId::from("acc-1"),
            timestamp: ts,
            order_amount: 500,
            cashback: 0,
            is_deduction: false,
            venue: "Paradise Lounge".into(),
            kind,
        }
    }

    fn daily(start: DateTime<Utc>, days: i64) -> Vec<DateTime<Utc>> {
        (0..days).map(|i| start + Duration::days(i)).collect()
    }

    #[test]
    fn test_streak_three_days() {
        let start = at(2026, 3, 10, 12);
        assert_eq!(consecutive_day_streak(daily(start, 3), utc()), 3);
    }

    #[test]
    fn test_streak_capped_at_five() {
        let start = at(2026, 3, 10, 12);
        assert_eq!(consecutive_day_streak(daily(start, 5), utc()), 5);
        assert_eq!(consecutive_day_streak(daily(start, 9), utc()), 5);
    }

    #[test]
    fn test_streak_same_day_counts_once() {
        let ts = vec![at(2026, 3, 10, 10), at(2026, 3, 10, 22), at(2026, 3, 11, 9)];
        assert_eq!(consecutive_day_streak(ts, utc()), 2);
    }

    #[test]
    fn test_streak_stops_at_first_gap() {
        let mut ts = daily(at(2026, 3, 1, 12), 2);
        ts.extend(daily(at(2026, 3, 10, 12), 5));
        assert_eq!(consecutive_day_streak(ts, utc()), 2);
    }

    #[test]
    fn test_streak_empty() {
        assert_eq!(consecutive_day_streak(Vec::new(), utc()), 0);
    }

    #[test]
    fn test_streak_uses_local_dates() {
        // Late evening UTC is already the next day in UTC+3.
        let ts = vec![at(2026, 3, 10, 22), at(2026, 3, 11, 21)];
        let msk = FixedOffset::east_opt(3 * 3600).unwrap();
        assert_eq!(consecutive_day_streak(ts.clone(), msk), 2);
        assert_eq!(consecutive_day_streak(ts, utc()), 2);

        let split = vec![at(2026, 3, 10, 20), at(2026, 3, 10, 22)];
        assert_eq!(consecutive_day_streak(split.clone(), utc()), 1);
        assert_eq!(consecutive_day_streak(split, msk), 2);
    }

    #[test]
    fn test_monthly_visits_current_month_only() {
        let now = at(2026, 5, 20, 12);
        let ts = vec![
            at(2026, 5, 1, 12),
            at(2026, 5, 19, 12),
            at(2026, 4, 30, 12),
            at(2025, 5, 10, 12),
        ];
        assert_eq!(monthly_visits(ts, now, utc()), 2);
    }

    #[test]
    fn test_monthly_unlock_at_fifteen() {
        let evaluator = AchievementEvaluator::new(0);
        let now = at(2026, 5, 20, 12);
        let account = test_account(15);

        let fourteen: Vec<_> = (1..=14)
            .map(|d| visit_at(at(2026, 5, d, 12), VisitKind::Accrual))
            .collect();
        let eval = evaluator.evaluate(&account, &fourteen, &[], now);
        let monthly = eval.get(AchievementId::SmokyDischarge).unwrap();
        assert_eq!(monthly.progress, 14);
        assert_eq!(monthly.target, 15);
        assert!(!monthly.unlocked);

        let mut fifteen = fourteen.clone();
        fifteen.push(visit_at(at(2026, 5, 15, 12), VisitKind::VisitOnly));
        let eval = evaluator.evaluate(&account, &fifteen, &[], now);
        assert!(eval.get(AchievementId::SmokyDischarge).unwrap().unlocked);
        assert!(eval.newly_unlocked.contains(&AchievementId::SmokyDischarge));
    }

    #[test]
    fn test_bonus_records_do_not_count() {
        let evaluator = AchievementEvaluator::new(0);
        let now = at(2026, 5, 20, 12);
        let visits: Vec<_> = (1..=15)
            .map(|d| visit_at(at(2026, 5, d, 12), VisitKind::Bonus))
            .collect();
        let eval = evaluator.evaluate(&test_account(0), &visits, &[], now);
        assert_eq!(eval.get(AchievementId::SmokyDischarge).unwrap().progress, 0);
        assert_eq!(eval.get(AchievementId::NoBreak).unwrap().progress, 0);
    }

    #[test]
    fn test_streak_achievement_unlock() {
        let evaluator = AchievementEvaluator::new(0);
        let start = at(2026, 3, 10, 12);
        let account = test_account(5);

        let three: Vec<_> = daily(start, 3)
            .into_iter()
            .map(|ts| visit_at(ts, VisitKind::Accrual))
            .collect();
        let eval = evaluator.evaluate(&account, &three, &[], start);
        let streak = eval.get(AchievementId::NoBreak).unwrap();
        assert_eq!(streak.progress, 3);
        assert!(!streak.unlocked);

        let five: Vec<_> = daily(start, 5)
            .into_iter()
            .map(|ts| visit_at(ts, VisitKind::Accrual))
            .collect();
        let eval = evaluator.evaluate(&account, &five, &[], start);
        let streak = eval.get(AchievementId::NoBreak).unwrap();
        assert_eq!(streak.progress, 5);
        assert!(streak.unlocked);
    }

    #[test]
    fn test_milestones_follow_visit_counter() {
        let evaluator = AchievementEvaluator::new(0);
        let now = at(2026, 5, 20, 12);

        let eval = evaluator.evaluate(&test_account(19), &[], &[], now);
        assert!(!eval.get(AchievementId::MasterRelax).unwrap().unlocked);
        assert_eq!(eval.get(AchievementId::MasterRelax).unwrap().progress, 19);

        let eval = evaluator.evaluate(&test_account(20), &[], &[], now);
        assert!(eval.get(AchievementId::MasterRelax).unwrap().unlocked);
        assert!(!eval.get(AchievementId::GuruComfort).unwrap().unlocked);
        assert_eq!(eval.newly_unlocked, vec![AchievementId::MasterRelax]);
    }

    #[test]
    fn test_unlock_and_claim_survive_regression() {
        let evaluator = AchievementEvaluator::new(0);
        let start = at(2026, 3, 10, 12);
        let account = test_account(5);
        let five: Vec<_> = daily(start, 5)
            .into_iter()
            .map(|ts| visit_at(ts, VisitKind::Accrual))
            .collect();

        let mut eval = evaluator.evaluate(&account, &five, &[], start);
        let streak = eval.get_mut(AchievementId::NoBreak).unwrap();
        assert_eq!(claim(streak, start).unwrap(), 250);

        // The earliest day no longer opens a streak once an older isolated
        // visit appears; the claim stays.
        let mut regressed = five.clone();
        regressed.push(visit_at(at(2026, 2, 1, 12), VisitKind::Accrual));
        let again = evaluator.evaluate(&account, &regressed, &eval.progress, start);
        let streak = again.get(AchievementId::NoBreak).unwrap();
        assert_eq!(streak.progress, 1);
        assert!(streak.unlocked);
        assert!(streak.claimed);
        assert!(again.newly_unlocked.is_empty());
    }

    #[test]
    fn test_claim_twice_rejected() {
        let evaluator = AchievementEvaluator::new(0);
        let now = at(2026, 5, 20, 12);
        let mut eval = evaluator.evaluate(&test_account(20), &[], &[], now);
        let master = eval.get_mut(AchievementId::MasterRelax).unwrap();

        assert_eq!(claim(master, now).unwrap(), 250);
        assert!(matches!(
            claim(master, now),
            Err(LoungeError::AlreadyClaimed(_))
        ));
    }

    #[test]
    fn test_claim_locked_rejected() {
        let evaluator = AchievementEvaluator::new(0);
        let now = at(2026, 5, 20, 12);
        let mut eval = evaluator.evaluate(&test_account(3), &[], &[], now);
        let guru = eval.get_mut(AchievementId::GuruComfort).unwrap();
        assert!(matches!(claim(guru, now), Err(LoungeError::NotUnlocked(_))));
        assert!(!guru.claimed);
    }

    #[test]
    fn test_reset_clears_flags() {
        let evaluator = AchievementEvaluator::new(0);
        let now = at(2026, 5, 20, 12);
        let mut eval = evaluator.evaluate(&test_account(20), &[], &[], now);
        let master = eval.get_mut(AchievementId::MasterRelax).unwrap();
        claim(master, now).unwrap();

        reset(master);
        assert_eq!(master.progress, 0);
        assert!(!master.unlocked);
        assert!(!master.claimed);
    }

    #[test]
    fn test_configured_offset_is_venue_time() {
        let config = lounge_core::config::LedgerConfig::default();
        let evaluator = AchievementEvaluator::new(config.utc_offset_minutes);
        assert_eq!(evaluator.offset().local_minus_utc(), 180 * 60);
    }

    #[test]
    fn test_definition_lookup_matches_catalogue() {
        for def in &CATALOGUE {
            assert_eq!(definition(def.id).id, def.id);
        }
        assert_eq!(definition(AchievementId::GuruComfort).reward, 550);
    }
}
