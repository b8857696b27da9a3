use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    clock::{Clock, SystemClock},
    db::{CloseOutcome, NewVisit, SellerId, Visit, VisitClosure, VisitId},
    location::{AccuracyTier, LocationProvider},
};

use super::{
    error::TrackerError,
    state::{duration_seconds, ActiveVisit, TrackerPhase, TrackerState},
    store::{StoreError, VisitStore},
};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub state: TrackerState,
    pub is_active: bool,
    pub elapsed_seconds: Option<u64>,
}

/// Owns the "is there an open visit for this seller" state and moves it
/// between Idle, Active and the transient phases. State only advances after
/// the store confirms the change.
#[derive(Clone)]
pub struct VisitTracker {
    state: Arc<Mutex<TrackerState>>,
    store: Arc<dyn VisitStore>,
    location: Arc<dyn LocationProvider>,
    clock: Arc<dyn Clock>,
    accuracy: AccuracyTier,
}

impl VisitTracker {
    pub fn new(store: Arc<dyn VisitStore>, location: Arc<dyn LocationProvider>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::new())),
            store,
            location,
            clock: Arc::new(SystemClock),
            accuracy: AccuracyTier::High,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_accuracy(mut self, accuracy: AccuracyTier) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub async fn get_state(&self) -> TrackerState {
        self.state.lock().await.clone()
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let guard = self.state.lock().await;
        self.snapshot_of(&guard)
    }

    fn snapshot_of(&self, state: &TrackerState) -> TrackerSnapshot {
        TrackerSnapshot {
            is_active: state.is_active(),
            elapsed_seconds: state.elapsed_seconds(self.clock.now()),
            state: state.clone(),
        }
    }

    /// Adopts a new signed-in seller (or none) and rehydrates the open visit
    /// from the store. Lookup failures are treated as "no open visit".
    pub async fn set_identity(&self, seller: Option<SellerId>) -> TrackerSnapshot {
        let (seller_id, epoch) = {
            let mut state = self.state.lock().await;
            if seller.is_some()
                && state.seller_id == seller
                && matches!(state.phase, TrackerPhase::Starting | TrackerPhase::Closing)
            {
                debug!("Identity unchanged while an operation is in flight; skipping reconciliation");
                return self.snapshot_of(&state);
            }

            let epoch = state.switch_identity(seller);
            match seller {
                Some(seller_id) => (seller_id, epoch),
                None => {
                    info!("Seller signed out; visit tracker cleared");
                    return self.snapshot_of(&state);
                }
            }
        };

        info!("Reconciling open visit for seller {seller_id}");
        let lookup = self.store.find_pending_visit(seller_id).await;

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            info!("Discarding reconciliation for seller {seller_id}: identity changed meanwhile");
            return self.snapshot_of(&state);
        }

        match lookup {
            Ok(Some(visit)) => {
                info!(
                    "Adopted open visit {} for client {} started at {}",
                    visit.id, visit.client_id, visit.start_time
                );
                state.adopt(ActiveVisit {
                    visit_id: visit.id,
                    client_id: visit.client_id,
                    start_time: visit.start_time,
                });
            }
            Ok(None) => {
                debug!("No open visit for seller {seller_id}");
                state.clear_visit();
            }
            Err(err) => {
                warn!("Reconciliation failed for seller {seller_id}, assuming no open visit: {err:#}");
                state.clear_visit();
            }
        }

        self.snapshot_of(&state)
    }

    pub async fn sign_out(&self) -> TrackerSnapshot {
        self.set_identity(None).await
    }

    pub async fn start_visit(
        &self,
        client_id: impl Into<String>,
    ) -> Result<ActiveVisit, TrackerError> {
        let client_id = client_id.into();

        let (seller_id, epoch, start_time) = {
            let mut state = self.state.lock().await;
            let seller_id = state.seller_id.ok_or(TrackerError::NotAuthenticated)?;
            match state.phase {
                TrackerPhase::Idle => {}
                TrackerPhase::Active => {
                    debug!("Start refused: visit {:?} still open", state.visit_id());
                    return Err(TrackerError::VisitAlreadyOpen {
                        visit_id: state.visit_id(),
                    });
                }
                phase => {
                    debug!("Start refused while {phase:?}");
                    return Err(TrackerError::NotReady);
                }
            }
            state.phase = TrackerPhase::Starting;
            (seller_id, state.epoch, self.clock.now())
        };

        let inserted = self
            .store
            .insert_visit(NewVisit {
                seller_id,
                client_id: client_id.clone(),
                start_time,
            })
            .await;

        match inserted {
            Ok(visit) => {
                let mut state = self.state.lock().await;
                if state.epoch != epoch {
                    info!("Visit {} created after the seller changed; not tracking it", visit.id);
                    return Err(TrackerError::SessionChanged);
                }
                let active = ActiveVisit {
                    visit_id: visit.id,
                    client_id,
                    start_time,
                };
                state.adopt(active.clone());
                info!("Visit {} started for client {}", active.visit_id, active.client_id);
                Ok(active)
            }
            Err(StoreError::PendingVisitExists) => {
                warn!("Store already holds an open visit for seller {seller_id}; adopting it");
                self.adopt_existing(seller_id, epoch).await
            }
            Err(err) => {
                warn!("Failed to insert visit for client {client_id}: {err:#}");
                let mut state = self.state.lock().await;
                if state.epoch == epoch {
                    state.clear_visit();
                }
                Err(TrackerError::StoreInsertFailed(err))
            }
        }
    }

    /// The store refused a second open visit, e.g. one opened from another
    /// device. Track that one instead so local state matches the store.
    async fn adopt_existing(
        &self,
        seller_id: SellerId,
        epoch: u64,
    ) -> Result<ActiveVisit, TrackerError> {
        let existing = self.store.find_pending_visit(seller_id).await;

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return Err(TrackerError::SessionChanged);
        }

        match existing {
            Ok(Some(visit)) => {
                let visit_id = visit.id;
                state.adopt(ActiveVisit {
                    visit_id,
                    client_id: visit.client_id,
                    start_time: visit.start_time,
                });
                Err(TrackerError::VisitAlreadyOpen {
                    visit_id: Some(visit_id),
                })
            }
            // Closed again before the lookup ran; a retry will insert cleanly.
            Ok(None) => {
                state.clear_visit();
                Err(TrackerError::StoreInsertFailed(StoreError::PendingVisitExists))
            }
            // The open row is unknown locally, so report a retryable failure
            // rather than an open visit nothing can end.
            Err(err) => {
                warn!("Could not load the conflicting visit for seller {seller_id}: {err:#}");
                state.clear_visit();
                Err(TrackerError::StoreInsertFailed(err))
            }
        }
    }

    /// Closes the held visit with a fresh GPS fix. On any failure the visit
    /// stays open locally and in the store.
    pub async fn end_visit(
        &self,
        outcome: CloseOutcome,
        notes: Option<String>,
    ) -> Result<Visit, TrackerError> {
        let (seller_id, open, epoch) = {
            let mut state = self.state.lock().await;
            let open = match (state.phase, &state.visit) {
                (TrackerPhase::Active, Some(open)) => open.clone(),
                (TrackerPhase::Idle | TrackerPhase::Active, _) => {
                    debug!("End refused: no open visit");
                    return Err(TrackerError::NoActiveVisit);
                }
                (phase, _) => {
                    debug!("End refused while {phase:?}");
                    return Err(TrackerError::NotReady);
                }
            };
            let seller_id = state.seller_id.ok_or(TrackerError::NotAuthenticated)?;
            state.phase = TrackerPhase::Closing;
            (seller_id, open, state.epoch)
        };

        let permission = self.location.request_foreground_permission().await;
        if !permission.is_granted() {
            warn!("Location permission {permission:?}; visit {} stays open", open.visit_id);
            self.resume_active(epoch).await;
            return Err(TrackerError::LocationPermissionDenied);
        }

        let position = match self.location.current_position(self.accuracy).await {
            Ok(position) => position,
            Err(err) => {
                warn!("GPS capture failed; visit {} stays open: {err}", open.visit_id);
                self.resume_active(epoch).await;
                return Err(TrackerError::LocationUnavailable(err));
            }
        };

        let end_time = self.clock.now();
        let closure = VisitClosure {
            end_time,
            duration_seconds: duration_seconds(open.start_time, end_time),
            outcome,
            notes: normalize_notes(notes),
            gps_accuracy_meters: position.accuracy,
            check_out_location: position.point(),
        };
        let duration = closure.duration_seconds;

        let updated = match self.store.close_visit(seller_id, open.visit_id, closure).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Failed to close visit {}: {err:#}", open.visit_id);
                self.resume_active(epoch).await;
                return Err(TrackerError::StoreUpdateFailed(err));
            }
        };

        let Some(closed) = updated.into_iter().next() else {
            warn!("Close of visit {} changed no rows; keeping it open", open.visit_id);
            self.resume_active(epoch).await;
            return Err(TrackerError::UpdateRejected {
                visit_id: open.visit_id,
            });
        };

        let mut state = self.state.lock().await;
        if state.epoch == epoch {
            state.clear_visit();
        } else {
            info!("Visit {} closed after the seller changed; tracker left untouched", open.visit_id);
        }
        info!(
            "Visit {} closed as {} after {duration}s",
            open.visit_id,
            outcome.label()
        );
        Ok(closed)
    }

    /// Visit id an order must be tagged with.
    pub async fn require_active_visit(&self) -> Result<VisitId, TrackerError> {
        let state = self.state.lock().await;
        match (state.phase, &state.visit) {
            (TrackerPhase::Active, Some(open)) => Ok(open.visit_id),
            (TrackerPhase::Idle | TrackerPhase::Active, _) => Err(TrackerError::NoActiveVisit),
            _ => Err(TrackerError::NotReady),
        }
    }

    async fn resume_active(&self, epoch: u64) {
        let mut state = self.state.lock().await;
        if state.epoch == epoch && state.phase == TrackerPhase::Closing {
            state.phase = TrackerPhase::Active;
        }
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
