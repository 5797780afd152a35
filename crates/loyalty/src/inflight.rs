//! Per-account in-flight registry. At most one ledger operation per account
//! runs at a time; a second caller fails fast instead of queueing.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lounge_core::types::AccountId;
use lounge_core::{LoungeError, LoungeResult};

#[derive(Default)]
pub struct InFlight {
    active: DashMap<AccountId, ()>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, account_id: &AccountId) -> LoungeResult<InFlightGuard<'_>> {
        match self.active.entry(account_id.clone()) {
            Entry::Occupied(_) => Err(LoungeError::Busy(format!(
                "account {account_id} has an operation in progress"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightGuard {
                    registry: self,
                    account_id: account_id.clone(),
                })
            }
        }
    }
}

/// Releases the account when dropped.
pub struct InFlightGuard<'a> {
    registry: &'a InFlight,
    account_id: AccountId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.active.remove(&self.account_id);
    }
}
