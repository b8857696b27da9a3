//! Visit rows and the value types that flow in and out of the `visits` table.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

use super::seller::SellerId;

/// Store-assigned visit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitId(pub i64);

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisitOutcome {
    Pending,
    Sale,
    NoSale,
    Closed,
}

impl VisitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitOutcome::Pending => "pending",
            VisitOutcome::Sale => "sale",
            VisitOutcome::NoSale => "no_sale",
            VisitOutcome::Closed => "closed",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, VisitOutcome::Pending)
    }
}

/// Terminal outcome chosen by the seller when closing a visit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    Sale,
    NoSale,
    /// The store was closed when the seller arrived.
    ClosedStore,
}

impl CloseOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CloseOutcome::Sale => "sale",
            CloseOutcome::NoSale => "no sale",
            CloseOutcome::ClosedStore => "closed store",
        }
    }
}

impl From<CloseOutcome> for VisitOutcome {
    fn from(outcome: CloseOutcome) -> Self {
        match outcome {
            CloseOutcome::Sale => VisitOutcome::Sale,
            CloseOutcome::NoSale => VisitOutcome::NoSale,
            CloseOutcome::ClosedStore => VisitOutcome::Closed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: VisitId,
    pub seller_id: SellerId,
    pub client_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
    pub outcome: VisitOutcome,
    pub notes: Option<String>,
    pub gps_accuracy_meters: Option<f64>,
    pub check_out_location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for "start visit". The outcome is always `pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVisit {
    pub seller_id: SellerId,
    pub client_id: String,
    pub start_time: DateTime<Utc>,
}

/// Update payload for "end visit". Applied once, to a pending row.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitClosure {
    pub end_time: DateTime<Utc>,
    pub duration_seconds: u64,
    pub outcome: CloseOutcome,
    pub notes: Option<String>,
    pub gps_accuracy_meters: Option<f64>,
    pub check_out_location: GeoPoint,
}
