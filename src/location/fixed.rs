use async_trait::async_trait;
use chrono::Utc;
use log::debug;

use super::{AccuracyTier, LocationError, LocationProvider, PermissionStatus, Position};

/// Provider whose answers are decided up front: by CLI flags on a workstation,
/// or by a test.
#[derive(Debug, Clone)]
pub struct FixedLocationProvider {
    permission: PermissionStatus,
    fix: Option<FixedFix>,
}

#[derive(Debug, Clone, Copy)]
struct FixedFix {
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
}

impl FixedLocationProvider {
    /// Permission granted, no fix available.
    pub fn new() -> Self {
        Self {
            permission: PermissionStatus::Granted,
            fix: None,
        }
    }

    pub fn at(latitude: f64, longitude: f64, accuracy: Option<f64>) -> Self {
        Self::new().with_fix(latitude, longitude, accuracy)
    }

    pub fn with_fix(mut self, latitude: f64, longitude: f64, accuracy: Option<f64>) -> Self {
        self.fix = Some(FixedFix {
            latitude,
            longitude,
            accuracy,
        });
        self
    }

    pub fn with_permission(mut self, permission: PermissionStatus) -> Self {
        self.permission = permission;
        self
    }
}

impl Default for FixedLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn request_foreground_permission(&self) -> PermissionStatus {
        self.permission
    }

    async fn current_position(&self, accuracy: AccuracyTier) -> Result<Position, LocationError> {
        debug!("Fixed location requested with accuracy {accuracy:?}");
        let fix = self
            .fix
            .ok_or_else(|| LocationError::Unavailable("no position fix configured".into()))?;

        Ok(Position {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            captured_at: Utc::now(),
        })
    }
}
