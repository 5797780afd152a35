//! Ledger event bus: trait for publishing loyalty notifications.
//!
//! Services accept an `Arc<dyn LedgerEventSink>` and emit one event per
//! committed fact. Front-ends turn these into member/admin notifications.

use crate::types::{AccountId, AchievementId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventType {
    AccountRegistered,
    AccountActivated,
    AccountDeleted,
    CashbackAccrued,
    CashbackDeducted,
    VisitRecorded,
    AchievementUnlocked,
    AchievementClaimed,
    AchievementReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_id: Uuid,
    pub event_type: LedgerEventType,
    pub account_id: AccountId,
    /// Points moved by the event (signed), if any.
    pub points: Option<i64>,
    pub achievement: Option<AchievementId>,
    pub timestamp: DateTime<Utc>,
}

/// Sink for ledger events. Implementations forward to a notification
/// channel, a message bus, or a test buffer.
pub trait LedgerEventSink: Send + Sync {
    fn emit(&self, event: LedgerEvent);
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: LedgerEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl LedgerEventSink for CaptureSink {
    fn emit(&self, event: LedgerEvent) {
        self.events.lock().push(event);
    }
}

pub fn make_event(
    event_type: LedgerEventType,
    account_id: &AccountId,
    points: Option<i64>,
    achievement: Option<AchievementId>,
) -> LedgerEvent {
    LedgerEvent {
        event_id: Uuid::new_v4(),
        event_type,
        account_id: account_id.clone(),
        points,
        achievement,
        timestamp: Utc::now(),
    }
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        let account = AccountId::from("acc-1");
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(
            LedgerEventType::CashbackAccrued,
            &account,
            Some(50),
            None,
        ));
        sink.emit(make_event(
            LedgerEventType::AchievementUnlocked,
            &account,
            None,
            Some(AchievementId::MasterRelax),
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(LedgerEventType::CashbackAccrued), 1);

        let events = sink.events();
        assert_eq!(events[0].points, Some(50));
        assert_eq!(events[1].achievement, Some(AchievementId::MasterRelax));

        sink.clear();
        assert_eq!(sink.count(), 0);
    }
}
