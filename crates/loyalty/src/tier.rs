//! Cashback tier ladder. The tier is derived from an account's counters on
//! every use and never stored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CashbackTier {
    /// No cashback.
    Entry,
    /// 4 visits and more than 4 000 spent. 3%.
    Regular,
    /// 20 visits and more than 20 000 spent. 5%.
    Master,
    /// 50 visits and more than 50 000 spent. 10%.
    Guru,
}

impl CashbackTier {
    /// Highest first, matching evaluation order.
    const DESCENDING: [CashbackTier; 3] = [
        CashbackTier::Guru,
        CashbackTier::Master,
        CashbackTier::Regular,
    ];

    /// First tier whose visit AND spend conditions both hold.
    pub fn for_counters(visits: u32, total_spent: u64) -> Self {
        Self::DESCENDING
            .into_iter()
            .find(|tier| tier.qualifies(visits, total_spent))
            .unwrap_or(CashbackTier::Entry)
    }

    pub fn percent(&self) -> u64 {
        match self {
            CashbackTier::Entry => 0,
            CashbackTier::Regular => 3,
            CashbackTier::Master => 5,
            CashbackTier::Guru => 10,
        }
    }

    pub fn min_visits(&self) -> u32 {
        match self {
            CashbackTier::Entry => 0,
            CashbackTier::Regular => 4,
            CashbackTier::Master => 20,
            CashbackTier::Guru => 50,
        }
    }

    /// Total spend must be strictly greater than this.
    pub fn spend_floor(&self) -> u64 {
        match self {
            CashbackTier::Entry => 0,
            CashbackTier::Regular => 4_000,
            CashbackTier::Master => 20_000,
            CashbackTier::Guru => 50_000,
        }
    }

    pub fn next(&self) -> Option<CashbackTier> {
        match self {
            CashbackTier::Entry => Some(CashbackTier::Regular),
            CashbackTier::Regular => Some(CashbackTier::Master),
            CashbackTier::Master => Some(CashbackTier::Guru),
            CashbackTier::Guru => None,
        }
    }

    fn qualifies(&self, visits: u32, total_spent: u64) -> bool {
        match self {
            CashbackTier::Entry => true,
            _ => visits >= self.min_visits() && total_spent > self.spend_floor(),
        }
    }

    /// Points earned on `order_amount` at this tier, rounded half up.
    pub fn cashback_for(&self, order_amount: u64) -> u64 {
        percent_of(order_amount, self.percent())
    }
}

/// Cashback percentage for the given counters: one of 0, 3, 5, 10.
pub fn tier_percent(visits: u32, total_spent: u64) -> u64 {
    CashbackTier::for_counters(visits, total_spent).percent()
}

/// `round(amount * percent / 100)` with halves rounded up.
pub(crate) fn percent_of(amount: u64, percent: u64) -> u64 {
    amount.saturating_mul(percent).saturating_add(50) / 100
}

/// What a member still needs for the next tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierProgress {
    pub current: CashbackTier,
    pub next: Option<CashbackTier>,
    pub visits_remaining: u32,
    /// Additional spend needed to pass the next tier's floor.
    pub spend_remaining: u64,
}

pub fn tier_progress(visits: u32, total_spent: u64) -> TierProgress {
    let current = CashbackTier::for_counters(visits, total_spent);
    match current.next() {
        Some(next) => TierProgress {
            current,
            next: Some(next),
            visits_remaining: next.min_visits().saturating_sub(visits),
            spend_remaining: (next.spend_floor() + 1).saturating_sub(total_spent),
        },
        None => TierProgress {
            current,
            next: None,
            visits_remaining: 0,
            spend_remaining: 0,
        },
    }
}
