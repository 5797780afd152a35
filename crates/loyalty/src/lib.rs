//! Loyalty rules for the lounge: tiered cashback, capped point deduction,
//! achievement tracking, and the admin ledger operations that tie them to
//! the store.

#![warn(clippy::unwrap_used)]

pub mod accounts;
pub mod achievements;
pub mod deduction;
pub mod inflight;
pub mod ledger;
pub mod qr;
pub mod tier;

pub use accounts::{AccessPolicy, AccountService, RegistrationRequest};
pub use achievements::{AchievementEvaluator, Evaluation, CATALOGUE};
pub use deduction::DeductionPolicy;
pub use ledger::{LedgerQuote, LedgerReceipt, LedgerService};
pub use qr::{DataUriRenderer, QrRenderer};
pub use tier::{tier_percent, CashbackTier, TierProgress};
