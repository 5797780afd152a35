//! In-process document store. All collections sit behind one `RwLock` so a
//! [`LedgerCommit`] is applied atomically. State can be persisted to and
//! restored from a JSON snapshot file.

use crate::store::{LedgerCommit, LedgerStore};
use lounge_core::types::{Account, AccountCode, AccountId, AchievementProgress, VisitRecord};
use lounge_core::{LoungeError, LoungeResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Collections {
    accounts: BTreeMap<AccountId, Account>,
    visits: Vec<VisitRecord>,
    achievements: Vec<AchievementProgress>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from a snapshot. A missing file yields an empty store.
    pub fn load_snapshot(path: impl AsRef<Path>) -> LoungeResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path)?;
        let collections: Collections = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            accounts = collections.accounts.len(),
            visits = collections.visits.len(),
            "Snapshot loaded"
        );
        Ok(Self {
            inner: RwLock::new(collections),
        })
    }

    /// Write the full store to `path`. Written to a sibling temp file first
    /// and renamed into place.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> LoungeResult<()> {
        let path = path.as_ref();
        let json = {
            let guard = self.inner.read();
            serde_json::to_string_pretty(&*guard)?
        };

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Snapshot saved");
        Ok(())
    }

    pub fn account_count(&self) -> usize {
        self.inner.read().accounts.len()
    }

    pub fn visit_count(&self) -> usize {
        self.inner.read().visits.len()
    }
}

impl LedgerStore for MemoryStore {
    fn insert_account(&self, account: Account) -> LoungeResult<()> {
        let mut guard = self.inner.write();

        if guard.accounts.contains_key(&account.id) {
            return Err(LoungeError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }
        for existing in guard.accounts.values() {
            if existing.code == account.code {
                return Err(LoungeError::Conflict(format!(
                    "code {} already issued",
                    account.code
                )));
            }
            if !existing.status.is_deleted() && existing.email.eq_ignore_ascii_case(&account.email)
            {
                return Err(LoungeError::Conflict(format!(
                    "email {} already registered",
                    account.email
                )));
            }
        }

        guard.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    fn account(&self, id: &AccountId) -> LoungeResult<Option<Account>> {
        Ok(self.inner.read().accounts.get(id).cloned())
    }

    fn account_by_code(&self, code: &AccountCode) -> LoungeResult<Option<Account>> {
        Ok(self
            .inner
            .read()
            .accounts
            .values()
            .find(|a| &a.code == code)
            .cloned())
    }

    fn account_by_email(&self, email: &str) -> LoungeResult<Option<Account>> {
        let email = email.trim();
        Ok(self
            .inner
            .read()
            .accounts
            .values()
            .find(|a| !a.status.is_deleted() && a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn visits_for(&self, id: &AccountId) -> LoungeResult<Vec<VisitRecord>> {
        Ok(self
            .inner
            .read()
            .visits
            .iter()
            .filter(|v| &v.account_id == id)
            .cloned()
            .collect())
    }

    fn achievements_for(&self, id: &AccountId) -> LoungeResult<Vec<AchievementProgress>> {
        Ok(self
            .inner
            .read()
            .achievements
            .iter()
            .filter(|a| &a.account_id == id)
            .cloned()
            .collect())
    }

    fn commit(&self, commit: LedgerCommit) -> LoungeResult<Account> {
        let LedgerCommit {
            mut account,
            expected_revision,
            visit,
            achievements,
        } = commit;

        // Validate everything before touching state.
        if let Some(v) = &visit {
            if v.account_id != account.id {
                return Err(LoungeError::Validation(format!(
                    "visit {} belongs to {}, not {}",
                    v.id, v.account_id, account.id
                )));
            }
        }
        if let Some(a) = achievements.iter().find(|a| a.account_id != account.id) {
            return Err(LoungeError::Validation(format!(
                "achievement {} belongs to {}, not {}",
                a.achievement, a.account_id, account.id
            )));
        }

        let mut guard = self.inner.write();

        let stored = guard
            .accounts
            .get(&account.id)
            .ok_or_else(|| LoungeError::NotFound(format!("account {}", account.id)))?;
        if stored.revision != expected_revision {
            return Err(LoungeError::Conflict(format!(
                "account {} is at revision {}, expected {}",
                account.id, stored.revision, expected_revision
            )));
        }

        account.revision = expected_revision + 1;
        guard.accounts.insert(account.id.clone(), account.clone());

        if let Some(v) = visit {
            guard.visits.push(v);
        }

        for progress in achievements {
            let existing = guard.achievements.iter().position(|a| {
                a.account_id == progress.account_id && a.achievement == progress.achievement
            });
            match existing {
                Some(idx) => guard.achievements[idx] = progress,
                None => guard.achievements.push(progress),
            }
        }

        debug!(account_id = %account.id, revision = account.revision, "Ledger commit applied");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lounge_core::types::{AccountStatus, AchievementId, VisitKind};
    use uuid::Uuid;

    fn test_account(id: &str, code: &str, email: &str) -> Account {
        Account {
            id: AccountId::from(id),
            code: AccountCode::parse(code).unwrap(),
            name: "Test".into(),
            email: email.into(),
            date_of_birth: None,
            status: AccountStatus::Active,
            email_verified: true,
            qr_code: String::new(),
            cashback: 100,
            visits: 0,
            total_spent: 0,
            created_at: Utc::now(),
            revision: 0,
        }
    }

    fn test_visit(account: &Account, cashback: i64) -> VisitRecord {
        VisitRecord {
            id: Uuid::new_v4(),
            account_id: account.id.clone(),
            timestamp: Utc::now(),
            order_amount: 1000,
            cashback,
            is_deduction: false,
            venue: "Paradise Lounge".into(),
            kind: VisitKind::Accrual,
        }
    }

    fn test_progress(account: &Account, claimed: bool) -> AchievementProgress {
        AchievementProgress {
            account_id: account.id.clone(),
            achievement: AchievementId::MasterRelax,
            progress: 20,
            target: 20,
            reward: 250,
            unlocked: true,
            claimed,
            unlocked_at: None,
            claimed_at: None,
        }
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let store = MemoryStore::new();
        store
            .insert_account(test_account("a1", "AAA111", "one@example.com"))
            .unwrap();

        let dup_code = store.insert_account(test_account("a2", "aaa111", "two@example.com"));
        assert!(matches!(dup_code, Err(LoungeError::Conflict(_))));

        let dup_email = store.insert_account(test_account("a3", "BBB222", "ONE@example.com"));
        assert!(matches!(dup_email, Err(LoungeError::Conflict(_))));

        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn test_lookup_by_code_and_email() {
        let store = MemoryStore::new();
        store
            .insert_account(test_account("a1", "AAA111", "one@example.com"))
            .unwrap();

        let code = AccountCode::parse("aaa111").unwrap();
        assert!(store.account_by_code(&code).unwrap().is_some());
        assert!(store.account_by_email(" One@Example.com ").unwrap().is_some());
        assert!(store.account_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_commit_applies_all_documents() {
        let store = MemoryStore::new();
        let account = test_account("a1", "AAA111", "one@example.com");
        store.insert_account(account.clone()).unwrap();

        let mut updated = account.clone();
        updated.cashback += 50;
        updated.visits += 1;

        let committed = store
            .commit(LedgerCommit {
                visit: Some(test_visit(&account, 50)),
                achievements: vec![test_progress(&account, false)],
                ..LedgerCommit::account_only(updated)
            })
            .unwrap();

        assert_eq!(committed.revision, 1);
        assert_eq!(committed.cashback, 150);
        assert_eq!(store.visits_for(&account.id).unwrap().len(), 1);
        assert_eq!(store.achievements_for(&account.id).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_upserts_achievement() {
        let store = MemoryStore::new();
        let account = test_account("a1", "AAA111", "one@example.com");
        store.insert_account(account.clone()).unwrap();

        let first = store
            .commit(LedgerCommit {
                achievements: vec![test_progress(&account, false)],
                ..LedgerCommit::account_only(account.clone())
            })
            .unwrap();
        store
            .commit(LedgerCommit {
                achievements: vec![test_progress(&account, true)],
                ..LedgerCommit::account_only(first)
            })
            .unwrap();

        let stored = store.achievements_for(&account.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].claimed);
    }

    #[test]
    fn test_stale_revision_leaves_state_untouched() {
        let store = MemoryStore::new();
        let account = test_account("a1", "AAA111", "one@example.com");
        store.insert_account(account.clone()).unwrap();

        store
            .commit(LedgerCommit::account_only(account.clone()))
            .unwrap();

        let mut stale = account.clone();
        stale.cashback = 0;
        let result = store.commit(LedgerCommit {
            visit: Some(test_visit(&account, -100)),
            ..LedgerCommit::account_only(stale)
        });

        assert!(matches!(result, Err(LoungeError::Conflict(_))));
        assert_eq!(store.account(&account.id).unwrap().unwrap().cashback, 100);
        assert_eq!(store.visit_count(), 0);
    }

    #[test]
    fn test_commit_rejects_foreign_visit() {
        let store = MemoryStore::new();
        let account = test_account("a1", "AAA111", "one@example.com");
        let other = test_account("a2", "BBB222", "two@example.com");
        store.insert_account(account.clone()).unwrap();

        let result = store.commit(LedgerCommit {
            visit: Some(test_visit(&other, 10)),
            ..LedgerCommit::account_only(account)
        });
        assert!(matches!(result, Err(LoungeError::Validation(_))));
        assert_eq!(store.visit_count(), 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let path = std::env::temp_dir().join(format!("lounge-store-{}.json", Uuid::new_v4()));
        let store = MemoryStore::new();
        let account = test_account("a1", "AAA111", "one@example.com");
        store.insert_account(account.clone()).unwrap();
        store
            .commit(LedgerCommit {
                visit: Some(test_visit(&account, 50)),
                ..LedgerCommit::account_only(account.clone())
            })
            .unwrap();

        store.save_snapshot(&path).unwrap();
        let restored = MemoryStore::load_snapshot(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(restored.account_count(), 1);
        assert_eq!(restored.visits_for(&account.id).unwrap()[0].cashback, 50);
        assert_eq!(restored.account(&account.id).unwrap().unwrap().revision, 1);
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let path = std::env::temp_dir().join(format!("lounge-missing-{}.json", Uuid::new_v4()));
        let store = MemoryStore::load_snapshot(&path).unwrap();
        assert_eq!(store.account_count(), 0);
    }
}
