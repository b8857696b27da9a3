pub mod commands;
pub mod error;
pub mod state;
pub mod store;
pub mod tracker;

pub use error::TrackerError;
pub use state::{ActiveVisit, TrackerPhase, TrackerState};
pub use store::{StoreError, VisitStore};
pub use tracker::{TrackerSnapshot, VisitTracker};
