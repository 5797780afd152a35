//! Document-store seam for the loyalty ledger.
//!
//! Three collections: accounts, visits, achievements. Reads are plain
//! lookups; every ledger write goes through [`LedgerStore::commit`], which
//! applies the account update, the visit append, and the achievement upserts
//! as one unit guarded by the account's revision.

use lounge_core::types::{Account, AccountCode, AccountId, AchievementProgress, VisitRecord};
use lounge_core::LoungeResult;

/// One atomic ledger write.
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    /// New account state. Its `revision` field is ignored; the store
    /// assigns `expected_revision + 1`.
    pub account: Account,
    /// Revision the caller read before computing `account`.
    pub expected_revision: u64,
    pub visit: Option<VisitRecord>,
    /// Upserted by `(account_id, achievement)`.
    pub achievements: Vec<AchievementProgress>,
}

impl LedgerCommit {
    pub fn account_only(account: Account) -> Self {
        let expected_revision = account.revision;
        Self {
            account,
            expected_revision,
            visit: None,
            achievements: Vec::new(),
        }
    }
}

pub trait LedgerStore: Send + Sync {
    /// Create a new account document. Fails with `Conflict` when the id, the
    /// code, or (among live accounts) the email is already taken.
    fn insert_account(&self, account: Account) -> LoungeResult<()>;

    fn account(&self, id: &AccountId) -> LoungeResult<Option<Account>>;

    fn account_by_code(&self, code: &AccountCode) -> LoungeResult<Option<Account>>;

    /// Live (not deleted) account registered with `email`, compared
    /// case-insensitively.
    fn account_by_email(&self, email: &str) -> LoungeResult<Option<Account>>;

    /// All visit records for an account, oldest first.
    fn visits_for(&self, id: &AccountId) -> LoungeResult<Vec<VisitRecord>>;

    fn achievements_for(&self, id: &AccountId) -> LoungeResult<Vec<AchievementProgress>>;

    /// Apply a ledger write all-or-nothing and return the stored account.
    /// Fails with `Conflict` if the account changed since it was read.
    fn commit(&self, commit: LedgerCommit) -> LoungeResult<Account>;
}
