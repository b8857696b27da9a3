//! Front-end entry points. Each returns either a confirmation the shell can
//! show as-is or the tracker's user-facing error message.

use crate::{
    db::{CloseOutcome, Visit},
    visits::{TrackerSnapshot, VisitTracker},
    AppState,
};

fn tracker_from_state(state: &AppState) -> VisitTracker {
    state.tracker.clone()
}

pub async fn get_tracker_state(state: &AppState) -> TrackerSnapshot {
    let tracker = tracker_from_state(state);
    tracker.snapshot().await
}

pub async fn start_visit(state: &AppState, client_id: String) -> Result<String, String> {
    let tracker = tracker_from_state(state);
    let active = tracker
        .start_visit(client_id)
        .await
        .map_err(|e| e.user_message())?;

    Ok(format!(
        "Visit {} started for client {}.",
        active.visit_id, active.client_id
    ))
}

pub async fn end_visit(
    state: &AppState,
    outcome: CloseOutcome,
    notes: Option<String>,
) -> Result<String, String> {
    let tracker = tracker_from_state(state);
    let visit = tracker
        .end_visit(outcome, notes)
        .await
        .map_err(|e| e.user_message())?;

    Ok(closed_confirmation(&visit, outcome))
}

fn closed_confirmation(visit: &Visit, outcome: CloseOutcome) -> String {
    let duration = visit
        .duration_seconds
        .map(format_duration)
        .unwrap_or_else(|| "an unknown time".into());
    format!(
        "Visit {} with client {} closed as {} after {}.",
        visit.id,
        visit.client_id,
        outcome.label(),
        duration
    )
}

pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
