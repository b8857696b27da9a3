//! End-to-end visit lifecycle against the SQLite store: start, reconcile on
//! another tracker, close with a GPS fix, and the cross-device race.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use chrono::{DateTime, TimeZone, Utc};

use fieldvisit_lib::{
    clock::Clock,
    db::{CloseOutcome, Database, Seller, SellerId, VisitOutcome},
    geo::GeoPoint,
    location::{FixedLocationProvider, PermissionStatus},
    visits::{TrackerError, TrackerPhase, VisitTracker},
};

struct SteppedClock(Mutex<DateTime<Utc>>);

impl SteppedClock {
    fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for SteppedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 14, h, m, s).unwrap()
}

async fn database_with_seller() -> (Database, SellerId) {
    let db = Database::open_in_memory().unwrap();
    let seller = Seller {
        id: SellerId::new(),
        name: "Carla Gimenez".into(),
        email: Some("carla@example.com".into()),
        active: true,
        created_at: Utc::now(),
    };
    db.insert_seller(&seller).await.unwrap();
    (db, seller.id)
}

fn tracker(db: &Database, location: FixedLocationProvider, clock: Arc<SteppedClock>) -> VisitTracker {
    VisitTracker::new(Arc::new(db.clone()), Arc::new(location)).with_clock(clock)
}

// ---------------------------------------------------------------------------
// Scenario: first visit of the day, closed with a sale
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_reconcile_and_close_round_trip() {
    let (db, seller) = database_with_seller().await;
    let clock = SteppedClock::starting_at(at(10, 0, 0));
    let location = FixedLocationProvider::at(-34.6037, -58.3816, Some(5.0));

    let first = tracker(&db, location.clone(), clock.clone());
    first.set_identity(Some(seller)).await;
    let active = first.start_visit("client-1").await.unwrap();

    let pending = db.find_pending_visit(seller).await.unwrap().unwrap();
    assert_eq!(pending.id, active.visit_id);
    assert_eq!(pending.client_id, "client-1");
    assert_eq!(pending.outcome, VisitOutcome::Pending);

    // App restart: a fresh tracker adopts the open row with its start time.
    let restarted = tracker(&db, location, clock.clone());
    let snapshot = restarted.set_identity(Some(seller)).await;
    assert_eq!(snapshot.state.phase, TrackerPhase::Active);
    assert_eq!(snapshot.state.visit_id(), Some(active.visit_id));
    assert_eq!(snapshot.state.start_time(), Some(at(10, 0, 0)));

    clock.set(at(10, 5, 30));
    let closed = restarted
        .end_visit(CloseOutcome::Sale, Some("  pedido semanal ".into()))
        .await
        .unwrap();
    assert_eq!(closed.id, active.visit_id);
    assert_eq!(closed.duration_seconds, Some(330));
    assert_eq!(closed.end_time, Some(at(10, 5, 30)));
    assert_eq!(closed.notes.as_deref(), Some("pedido semanal"));
    assert_eq!(closed.gps_accuracy_meters, Some(5.0));
    assert_eq!(
        closed.check_out_location,
        Some(GeoPoint::new(-58.3816, -34.6037))
    );

    assert!(db.find_pending_visit(seller).await.unwrap().is_none());
    assert!(!restarted.get_state().await.is_active());

    let reloaded = tracker(&db, FixedLocationProvider::new(), clock);
    assert!(!reloaded.set_identity(Some(seller)).await.is_active);
}

// ---------------------------------------------------------------------------
// Scenario: visit closed from another device while this one still holds it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn closing_a_visit_closed_elsewhere_is_rejected() {
    let (db, seller) = database_with_seller().await;
    let clock = SteppedClock::starting_at(at(11, 0, 0));
    let location = FixedLocationProvider::at(-31.42, -64.18, None);

    let phone = tracker(&db, location.clone(), clock.clone());
    let tablet = tracker(&db, location, clock.clone());
    phone.set_identity(Some(seller)).await;
    let active = phone.start_visit("client-2").await.unwrap();
    tablet.set_identity(Some(seller)).await;

    clock.set(at(11, 10, 0));
    tablet.end_visit(CloseOutcome::NoSale, None).await.unwrap();

    let err = phone
        .end_visit(CloseOutcome::Sale, None)
        .await
        .unwrap_err();
    assert_matches!(err, TrackerError::UpdateRejected { visit_id } if visit_id == active.visit_id);
    assert_eq!(phone.get_state().await.visit_id(), Some(active.visit_id));

    let stored = db.get_visit(active.visit_id).await.unwrap().unwrap();
    assert_eq!(stored.outcome, VisitOutcome::NoSale);
    assert_eq!(stored.duration_seconds, Some(600));
}

// ---------------------------------------------------------------------------
// Scenario: two devices start a visit for the same seller
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_device_adopts_the_first_devices_visit() {
    let (db, seller) = database_with_seller().await;
    let clock = SteppedClock::starting_at(at(12, 0, 0));

    let phone = tracker(&db, FixedLocationProvider::new(), clock.clone());
    let tablet = tracker(&db, FixedLocationProvider::new(), clock.clone());
    phone.set_identity(Some(seller)).await;
    tablet.set_identity(Some(seller)).await;

    let opened = phone.start_visit("client-3").await.unwrap();
    let err = tablet.start_visit("client-4").await.unwrap_err();
    assert_matches!(err, TrackerError::VisitAlreadyOpen { visit_id: Some(id) } if id == opened.visit_id);

    let state = tablet.get_state().await;
    assert_eq!(state.visit_id(), Some(opened.visit_id));
    assert_eq!(state.visit.unwrap().client_id, "client-3");

    let visits = db.list_visits_for_seller(seller, 10).await.unwrap();
    assert_eq!(visits.len(), 1);
}

// ---------------------------------------------------------------------------
// Scenario: permission denied, then granted on retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn denied_permission_leaves_row_pending_until_retry() {
    let (db, seller) = database_with_seller().await;
    let clock = SteppedClock::starting_at(at(15, 0, 0));

    let denied = tracker(
        &db,
        FixedLocationProvider::at(-32.95, -60.66, Some(12.0))
            .with_permission(PermissionStatus::Denied),
        clock.clone(),
    );
    denied.set_identity(Some(seller)).await;
    let active = denied.start_visit("client-5").await.unwrap();

    let err = denied
        .end_visit(CloseOutcome::ClosedStore, None)
        .await
        .unwrap_err();
    assert_matches!(err, TrackerError::LocationPermissionDenied);
    assert_eq!(denied.get_state().await.visit_id(), Some(active.visit_id));
    assert!(db.find_pending_visit(seller).await.unwrap().is_some());

    let granted = tracker(
        &db,
        FixedLocationProvider::at(-32.95, -60.66, Some(12.0)),
        clock.clone(),
    );
    granted.set_identity(Some(seller)).await;
    clock.set(at(15, 2, 0));
    let closed = granted
        .end_visit(CloseOutcome::ClosedStore, None)
        .await
        .unwrap();
    assert_eq!(closed.outcome, VisitOutcome::Closed);
    assert_eq!(closed.duration_seconds, Some(120));
}
