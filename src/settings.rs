use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use crate::{db::SellerId, location::AccuracyTier};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocationSettings {
    pub accuracy: AccuracyTier,
    /// Whether the device has granted foreground location access.
    pub permission_granted: bool,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            accuracy: AccuracyTier::High,
            permission_granted: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    signed_in_seller: Option<SellerId>,
    location: LocationSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn signed_in_seller(&self) -> Option<SellerId> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .signed_in_seller
    }

    pub fn set_signed_in_seller(&self, seller: Option<SellerId>) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.signed_in_seller = seller;
        self.persist(&guard)
    }

    pub fn location(&self) -> LocationSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .location
            .clone()
    }

    pub fn update_location(&self, settings: LocationSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.location = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("fieldvisit-settings-{}", uuid::Uuid::new_v4()))
            .join("settings.json")
    }

    #[test]
    fn persists_signed_in_seller_and_location() {
        let path = scratch_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        assert!(store.signed_in_seller().is_none());
        assert_eq!(store.location(), LocationSettings::default());

        let seller = SellerId::new();
        store.set_signed_in_seller(Some(seller)).unwrap();
        store
            .update_location(LocationSettings {
                accuracy: AccuracyTier::Balanced,
                permission_granted: false,
            })
            .unwrap();

        let reopened = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reopened.signed_in_seller(), Some(seller));
        assert_eq!(reopened.location().accuracy, AccuracyTier::Balanced);
        assert!(!reopened.location().permission_granted);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert!(store.signed_in_seller().is_none());
        assert!(store.location().permission_granted);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
