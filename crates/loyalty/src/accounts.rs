//! Member account lifecycle: registration, activation after email
//! verification, admin lookup, profile edits, and soft deletion.

use crate::qr::QrRenderer;
use chrono::{NaiveDate, Utc};
use lounge_core::config::AccountsConfig;
use lounge_core::event_bus::{make_event, LedgerEventSink, LedgerEventType};
use lounge_core::types::{Account, AccountCode, AccountId, AccountStatus, Principal};
use lounge_core::{LoungeError, LoungeResult};
use lounge_store::{LedgerCommit, LedgerStore};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const CODE_ATTEMPTS: usize = 16;

// ─── Access Policy ──────────────────────────────────────────────────────────

/// Decides who may run admin operations. Only a principal with a verified
/// email can be an admin: either that email is the configured administrator
/// address, or its stored account carries the admin status.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    admin_email: String,
}

impl AccessPolicy {
    pub fn new(admin_email: impl Into<String>) -> Self {
        Self {
            admin_email: admin_email.into(),
        }
    }

    pub fn is_allowlisted(&self, email: &str) -> bool {
        !self.admin_email.is_empty() && self.admin_email.eq_ignore_ascii_case(email.trim())
    }

    pub fn is_admin(&self, principal: &Principal, stored: Option<&Account>) -> bool {
        if !principal.email_verified {
            return false;
        }
        self.is_allowlisted(&principal.email)
            || matches!(stored, Some(a) if a.status == AccountStatus::Admin)
    }

    pub fn require_admin<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        principal: &Principal,
    ) -> LoungeResult<()> {
        let stored = store.account(&principal.account_id)?;
        if self.is_admin(principal, stored.as_ref()) {
            Ok(())
        } else {
            warn!(principal = %principal.account_id, "Admin operation denied");
            Err(LoungeError::PermissionDenied(
                "administrator rights required".into(),
            ))
        }
    }

    /// Owners may act on their own account; admins on any.
    pub fn require_owner_or_admin<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        principal: &Principal,
        account_id: &AccountId,
    ) -> LoungeResult<()> {
        if &principal.account_id == account_id {
            return Ok(());
        }
        self.require_admin(store, principal)
    }
}

// ─── Registration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
}

impl RegistrationRequest {
    /// Field-level checks, run before anything touches the store.
    pub fn validate(&self, min_password_len: usize) -> LoungeResult<()> {
        if self.name.trim().is_empty() {
            return Err(LoungeError::Validation("name is required".into()));
        }
        if !looks_like_email(&self.email) {
            return Err(LoungeError::Validation("email is invalid".into()));
        }
        validate_password(&self.password, min_password_len)?;
        if self.password != self.confirm_password {
            return Err(LoungeError::Validation("passwords do not match".into()));
        }
        Ok(())
    }
}

fn looks_like_email(raw: &str) -> bool {
    let raw = raw.trim();
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !raw.chars().any(char::is_whitespace)
}

pub fn validate_password(password: &str, min_len: usize) -> LoungeResult<()> {
    if password.chars().count() < min_len {
        return Err(LoungeError::Validation(format!(
            "password must be at least {min_len} characters"
        )));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(LoungeError::Validation(
            "password needs a lowercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(LoungeError::Validation(
            "password needs an uppercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(LoungeError::Validation("password needs a digit".into()));
    }
    Ok(())
}

pub fn generate_code(len: usize) -> Option<AccountCode> {
    let raw: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len.max(1))
        .map(char::from)
        .collect();
    AccountCode::parse(&raw)
}

// ─── Service ────────────────────────────────────────────────────────────────

pub struct AccountService<S: LedgerStore> {
    store: Arc<S>,
    config: AccountsConfig,
    access: AccessPolicy,
    qr: Arc<dyn QrRenderer>,
    events: Arc<dyn LedgerEventSink>,
}

impl<S: LedgerStore> AccountService<S> {
    pub fn new(
        store: Arc<S>,
        config: &AccountsConfig,
        qr: Arc<dyn QrRenderer>,
        events: Arc<dyn LedgerEventSink>,
    ) -> Self {
        Self {
            store,
            access: AccessPolicy::new(config.admin_email.clone()),
            config: config.clone(),
            qr,
            events,
        }
    }

    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }

    /// Create the account document for a freshly created identity.
    pub fn register(&self, id: AccountId, request: &RegistrationRequest) -> LoungeResult<Account> {
        request.validate(self.config.min_password_len)?;

        let email = request.email.trim().to_string();
        if self.store.account_by_email(&email)?.is_some() {
            return Err(LoungeError::Validation("email is already registered".into()));
        }

        let code = self.unique_code()?;
        let qr_code = self.qr.render(&code)?;
        let account = Account {
            id,
            code,
            name: request.name.trim().to_string(),
            email,
            date_of_birth: request.date_of_birth,
            status: AccountStatus::Pending,
            email_verified: false,
            qr_code,
            cashback: self.config.welcome_bonus,
            visits: 0,
            total_spent: 0,
            created_at: Utc::now(),
            revision: 0,
        };
        self.store.insert_account(account.clone())?;

        let bonus = i64::try_from(account.cashback).ok();
        self.events.emit(make_event(
            LedgerEventType::AccountRegistered,
            &account.id,
            bonus,
            None,
        ));
        info!(
            account_id = %account.id,
            code = %account.code,
            "Account registered"
        );
        Ok(account)
    }

    fn unique_code(&self) -> LoungeResult<AccountCode> {
        for _ in 0..CODE_ATTEMPTS {
            let Some(code) = generate_code(self.config.code_length) else {
                continue;
            };
            if self.store.account_by_code(&code)?.is_none() {
                return Ok(code);
            }
        }
        Err(LoungeError::Store(
            "could not allocate a unique account code".into(),
        ))
    }

    /// Pending accounts become active once the identity provider reports a
    /// verified email. The administrator address is promoted to admin here,
    /// never at registration.
    pub fn activate(&self, principal: &Principal) -> LoungeResult<Account> {
        let account = self.load_live(&principal.account_id)?;
        if !principal.email_verified {
            return Err(LoungeError::PermissionDenied("email is not verified".into()));
        }
        if account.email_verified && account.status != AccountStatus::Pending {
            return Ok(account);
        }

        let mut updated = account.clone();
        updated.email_verified = true;
        if updated.status == AccountStatus::Pending {
            updated.status = if self.access.is_allowlisted(&updated.email) {
                AccountStatus::Admin
            } else {
                AccountStatus::Active
            };
        }
        let committed = self.store.commit(LedgerCommit::account_only(updated))?;

        if account.status == AccountStatus::Pending {
            self.events.emit(make_event(
                LedgerEventType::AccountActivated,
                &committed.id,
                None,
                None,
            ));
            info!(account_id = %committed.id, "Account activated");
        }
        Ok(committed)
    }

    /// Admin lookup by the code printed on the member card. Case-insensitive.
    pub fn find_by_code(&self, principal: &Principal, raw_code: &str) -> LoungeResult<Account> {
        if raw_code.trim().is_empty() {
            return Err(LoungeError::Validation("account code is required".into()));
        }
        let code = AccountCode::parse(raw_code)
            .ok_or_else(|| LoungeError::Validation(format!("malformed account code {raw_code:?}")))?;
        self.access.require_admin(self.store.as_ref(), principal)?;

        match self.store.account_by_code(&code)? {
            Some(account) if !account.status.is_deleted() => Ok(account),
            _ => Err(LoungeError::NotFound(format!("account with code {code}"))),
        }
    }

    pub fn profile(&self, principal: &Principal) -> LoungeResult<Account> {
        self.load_live(&principal.account_id)
    }

    pub fn update_profile(
        &self,
        principal: &Principal,
        name: Option<&str>,
        date_of_birth: Option<NaiveDate>,
    ) -> LoungeResult<Account> {
        let mut account = self.load_live(&principal.account_id)?;
        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(LoungeError::Validation("name is required".into()));
            }
            account.name = name.to_string();
        }
        if let Some(dob) = date_of_birth {
            if dob > Utc::now().date_naive() {
                return Err(LoungeError::Validation(
                    "date of birth is in the future".into(),
                ));
            }
            account.date_of_birth = Some(dob);
        }
        self.store.commit(LedgerCommit::account_only(account))
    }

    /// Soft delete. The ledger history stays; the account can no longer be
    /// found or transacted on, and its email may be registered again.
    pub fn delete_account(&self, principal: &Principal) -> LoungeResult<Account> {
        let mut account = self.load_live(&principal.account_id)?;
        account.status = AccountStatus::Deleted;
        let committed = self.store.commit(LedgerCommit::account_only(account))?;

        self.events.emit(make_event(
            LedgerEventType::AccountDeleted,
            &committed.id,
            None,
            None,
        ));
        info!(account_id = %committed.id, "Account deleted");
        Ok(committed)
    }

    fn load_live(&self, id: &AccountId) -> LoungeResult<Account> {
        match self.store.account(id)? {
            Some(account) if !account.status.is_deleted() => Ok(account),
            _ => Err(LoungeError::NotFound(format!("account {id}"))),
        }
    }
}
