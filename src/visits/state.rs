use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{SellerId, VisitId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackerPhase {
    /// No open visit held.
    #[default]
    Idle,
    /// Looking up the seller's open visit after an identity change.
    Reconciling,
    /// Insert for a new visit in flight.
    Starting,
    Active,
    /// Permission, GPS fix and close update in flight. The visit is still open.
    Closing,
}

/// The visit the tracker currently holds open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveVisit {
    pub visit_id: VisitId,
    pub client_id: String,
    /// Device time captured when the visit was opened.
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    pub phase: TrackerPhase,
    pub seller_id: Option<SellerId>,
    pub visit: Option<ActiveVisit>,
    /// Bumped on every identity change; results of older operations are dropped.
    #[serde(skip)]
    pub(crate) epoch: u64,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.visit.is_some()
    }

    pub fn visit_id(&self) -> Option<VisitId> {
        self.visit.as_ref().map(|visit| visit.visit_id)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.visit.as_ref().map(|visit| visit.start_time)
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> Option<u64> {
        self.start_time().map(|start| duration_seconds(start, now))
    }

    /// Drops any held visit and starts a new epoch for `seller`.
    pub(crate) fn switch_identity(&mut self, seller: Option<SellerId>) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.seller_id = seller;
        self.visit = None;
        self.phase = if seller.is_some() {
            TrackerPhase::Reconciling
        } else {
            TrackerPhase::Idle
        };
        self.epoch
    }

    pub(crate) fn adopt(&mut self, visit: ActiveVisit) {
        self.visit = Some(visit);
        self.phase = TrackerPhase::Active;
    }

    pub(crate) fn clear_visit(&mut self) {
        self.visit = None;
        self.phase = TrackerPhase::Idle;
    }
}

/// Whole seconds from `start` to `end`, rounded to nearest and clamped at zero.
pub fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    ((millis + 500) / 1000) as u64
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn ten_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 14, 10, 0, 0).unwrap()
    }

    #[test]
    fn duration_rounds_to_whole_seconds() {
        let start = ten_am();
        assert_eq!(duration_seconds(start, start + Duration::seconds(330)), 330);
        assert_eq!(duration_seconds(start, start + Duration::milliseconds(1_499)), 1);
        assert_eq!(duration_seconds(start, start + Duration::milliseconds(1_500)), 2);
    }

    #[test]
    fn duration_never_goes_negative() {
        let start = ten_am();
        assert_eq!(duration_seconds(start, start - Duration::seconds(42)), 0);
        assert_eq!(duration_seconds(start, start), 0);
    }

    #[test]
    fn identity_switch_clears_visit_and_bumps_epoch() {
        let mut state = TrackerState::new();
        let seller = SellerId::new();

        let first = state.switch_identity(Some(seller));
        assert_eq!(state.phase, TrackerPhase::Reconciling);

        state.adopt(ActiveVisit {
            visit_id: VisitId(7),
            client_id: "client-1".into(),
            start_time: ten_am(),
        });
        assert!(state.is_active());
        assert_eq!(
            state.elapsed_seconds(ten_am() + Duration::seconds(90)),
            Some(90)
        );

        let second = state.switch_identity(None);
        assert_ne!(first, second);
        assert_eq!(state.phase, TrackerPhase::Idle);
        assert!(!state.is_active());
        assert!(state.seller_id.is_none());
        assert!(state.elapsed_seconds(ten_am()).is_none());
    }

    #[test]
    fn snapshot_json_hides_epoch() {
        let mut state = TrackerState::new();
        state.switch_identity(Some(SellerId::new()));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["phase"], "reconciling");
        assert!(json.get("epoch").is_none());
    }
}
