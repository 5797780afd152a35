//! Loyalty domain documents: accounts, visit ledger entries, and
//! per-account achievement progress.
//!
//! Currency and points are whole units (`u64`). A visit's `cashback` is the
//! signed delta it applied to the balance.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ─── Identity ───────────────────────────────────────────────────────────────

/// Opaque account identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Short human-readable code printed on the member's QR card.
/// Always stored upper case so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountCode(String);

impl AccountCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated caller as reported by the identity provider. Passed into
/// every operation instead of being looked up from a session singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub account_id: AccountId,
    pub email: String,
    pub email_verified: bool,
}

// ─── Account ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Registered, email not yet verified.
    Pending,
    Active,
    Admin,
    /// Soft-deleted. Kept for ledger history.
    Deleted,
}

impl AccountStatus {
    pub fn is_deleted(&self) -> bool {
        matches!(self, AccountStatus::Deleted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub code: AccountCode,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    pub status: AccountStatus,
    pub email_verified: bool,
    /// Rendered QR payload for `code`.
    #[serde(default)]
    pub qr_code: String,
    /// Redeemable points balance.
    pub cashback: u64,
    pub visits: u32,
    /// Cumulative order amount across all visits.
    pub total_spent: u64,
    pub created_at: DateTime<Utc>,
    /// Bumped on every committed write; used to detect concurrent edits.
    #[serde(default)]
    pub revision: u64,
}

// ─── Visit Ledger ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VisitKind {
    Accrual,
    Deduction,
    VisitOnly,
    /// Achievement reward credit. Not an attendance.
    Bonus,
}

impl VisitKind {
    /// Whether the record represents the member actually being at the venue.
    pub fn is_attendance(&self) -> bool {
        !matches!(self, VisitKind::Bonus)
    }
}

/// Immutable ledger entry. Written once by a ledger operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: Uuid,
    pub account_id: AccountId,
    pub timestamp: DateTime<Utc>,
    pub order_amount: u64,
    /// Signed balance delta: positive accrual, negative deduction.
    pub cashback: i64,
    pub is_deduction: bool,
    pub venue: String,
    pub kind: VisitKind,
}

// ─── Achievements ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AchievementId {
    /// 20 visits.
    MasterRelax,
    /// 50 visits.
    GuruComfort,
    /// 15 visits within the current calendar month.
    SmokyDischarge,
    /// Five consecutive days.
    NoBreak,
}

impl AchievementId {
    pub const ALL: &'static [AchievementId] = &[
        AchievementId::MasterRelax,
        AchievementId::GuruComfort,
        AchievementId::SmokyDischarge,
        AchievementId::NoBreak,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementId::MasterRelax => "master_relax",
            AchievementId::GuruComfort => "guru_comfort",
            AchievementId::SmokyDischarge => "smoky_discharge",
            AchievementId::NoBreak => "no_break",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for AchievementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-account progress record for one achievement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementProgress {
    pub account_id: AccountId,
    pub achievement: AchievementId,
    pub progress: u32,
    pub target: u32,
    /// Points credited on claim.
    pub reward: u64,
    pub unlocked: bool,
    pub claimed: bool,
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl AchievementProgress {
    pub fn is_claimable(&self) -> bool {
        self.unlocked && !self.claimed
    }
}
