//! Point redemption limits. A deduction may cover at most a fixed share of
//! the order and never more than the member's balance.

use crate::tier::percent_of;
use lounge_core::config::LedgerConfig;
use lounge_core::{LoungeError, LoungeResult};

#[derive(Debug, Clone, Copy)]
pub struct DeductionPolicy {
    max_percent: u64,
}

impl Default for DeductionPolicy {
    fn default() -> Self {
        Self { max_percent: 10 }
    }
}

impl DeductionPolicy {
    pub fn new(max_percent: u64) -> Self {
        Self {
            max_percent: max_percent.min(100),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.max_deduction_percent)
    }

    /// `round(order_amount * max_percent / 100)`.
    pub fn max_deductible(&self, order_amount: u64) -> u64 {
        percent_of(order_amount, self.max_percent)
    }

    pub fn effective_cap(&self, order_amount: u64, balance: u64) -> u64 {
        self.max_deductible(order_amount).min(balance)
    }

    /// Prefill for the admin deduction form: the most the member can use
    /// on this order.
    pub fn suggested_deduction(&self, order_amount: u64, balance: u64) -> u64 {
        self.effective_cap(order_amount, balance)
    }

    /// Check a requested deduction and return it as an unsigned amount.
    pub fn validate(&self, requested: i64, order_amount: u64, balance: u64) -> LoungeResult<u64> {
        if requested < 0 {
            return Err(LoungeError::Validation(
                "deduction amount cannot be negative".into(),
            ));
        }
        if requested == 0 {
            return Err(LoungeError::Validation("deduction amount is required".into()));
        }

        let requested = requested.unsigned_abs();
        if requested > balance {
            return Err(LoungeError::InsufficientBalance { requested, balance });
        }

        let cap = self.effective_cap(order_amount, balance);
        if requested > cap {
            return Err(LoungeError::DeductionExceedsCap { requested, cap });
        }

        Ok(requested)
    }
}
