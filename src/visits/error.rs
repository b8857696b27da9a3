use thiserror::Error;

use crate::{db::VisitId, location::LocationError};

use super::store::StoreError;

/// Why a start or end request did not go through. Tracker state is never
/// advanced when one of these is returned.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("no seller is signed in")]
    NotAuthenticated,

    /// Reconciliation or another visit operation is still running.
    #[error("visit tracker is busy")]
    NotReady,

    #[error("a visit is already open")]
    VisitAlreadyOpen { visit_id: Option<VisitId> },

    #[error("no open visit to end")]
    NoActiveVisit,

    #[error("foreground location permission denied")]
    LocationPermissionDenied,

    #[error("location unavailable: {0}")]
    LocationUnavailable(#[source] LocationError),

    #[error("failed to insert visit: {0}")]
    StoreInsertFailed(#[source] StoreError),

    #[error("failed to update visit: {0}")]
    StoreUpdateFailed(#[source] StoreError),

    /// The update call succeeded but no row changed: access policy or a
    /// concurrent close, not a network fault.
    #[error("update of visit {visit_id} affected no rows")]
    UpdateRejected { visit_id: VisitId },

    #[error("signed-in seller changed during the operation")]
    SessionChanged,
}

impl TrackerError {
    /// Stable identifier for front-end branching.
    pub fn code(&self) -> &'static str {
        match self {
            TrackerError::NotAuthenticated => "not_authenticated",
            TrackerError::NotReady => "tracker_not_ready",
            TrackerError::VisitAlreadyOpen { .. } => "visit_already_open",
            TrackerError::NoActiveVisit => "no_active_visit",
            TrackerError::LocationPermissionDenied => "location_permission_denied",
            TrackerError::LocationUnavailable(_) => "location_unavailable",
            TrackerError::StoreInsertFailed(_) => "store_insert_failed",
            TrackerError::StoreUpdateFailed(_) => "store_update_failed",
            TrackerError::UpdateRejected { .. } => "update_rejected",
            TrackerError::SessionChanged => "session_changed",
        }
    }

    /// Whether repeating the same request unchanged can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::NotReady
                | TrackerError::LocationUnavailable(_)
                | TrackerError::StoreInsertFailed(_)
                | TrackerError::StoreUpdateFailed(_)
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            TrackerError::NotAuthenticated => "Sign in before recording visits.".into(),
            TrackerError::NotReady => {
                "Still syncing your visits. Try again in a moment.".into()
            }
            TrackerError::VisitAlreadyOpen {
                visit_id: Some(visit_id),
            } => format!("Visit {visit_id} is still open. End it before starting another."),
            TrackerError::VisitAlreadyOpen { visit_id: None } => {
                "You already have an open visit. End it before starting another.".into()
            }
            TrackerError::NoActiveVisit => "There is no open visit to end.".into(),
            TrackerError::LocationPermissionDenied => {
                "Location permission is required to end a visit. Grant it and try again."
                    .into()
            }
            TrackerError::LocationUnavailable(err) => {
                format!("Could not get your location ({err}). The visit is still open; try again.")
            }
            TrackerError::StoreInsertFailed(err) => {
                format!("Could not start the visit: {err}. Try again or contact support.")
            }
            TrackerError::StoreUpdateFailed(err) => {
                format!("Could not end the visit: {err}. It is still open; try again.")
            }
            TrackerError::UpdateRejected { visit_id } => format!(
                "Visit {visit_id} was not closed: the server changed nothing. \
                 It may already be closed or you may lack access. Contact support."
            ),
            TrackerError::SessionChanged => {
                "Your session changed while the visit was being saved. Check your visits."
                    .into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_distinct_from_transport_failure() {
        let rejected = TrackerError::UpdateRejected {
            visit_id: VisitId(42),
        };
        let failed =
            TrackerError::StoreUpdateFailed(StoreError::Backend(anyhow::anyhow!("timeout")));

        assert_ne!(rejected.code(), failed.code());
        assert_ne!(rejected.user_message(), failed.user_message());
        assert!(!rejected.is_retryable());
        assert!(failed.is_retryable());
    }

    #[test]
    fn every_variant_has_its_own_message() {
        let errors = [
            TrackerError::NotAuthenticated,
            TrackerError::NotReady,
            TrackerError::VisitAlreadyOpen { visit_id: None },
            TrackerError::NoActiveVisit,
            TrackerError::LocationPermissionDenied,
            TrackerError::LocationUnavailable(LocationError::Timeout),
            TrackerError::StoreInsertFailed(StoreError::PendingVisitExists),
            TrackerError::StoreUpdateFailed(StoreError::Backend(anyhow::anyhow!("offline"))),
            TrackerError::UpdateRejected {
                visit_id: VisitId(1),
            },
            TrackerError::SessionChanged,
        ];

        let mut messages: Vec<_> = errors.iter().map(TrackerError::user_message).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), errors.len());

        let mut codes: Vec<_> = errors.iter().map(TrackerError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
