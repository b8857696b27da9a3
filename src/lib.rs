pub mod clock;
pub mod config;
pub mod db;
pub mod geo;
pub mod location;
pub mod settings;
pub mod visits;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};

use config::AppConfig;
use db::{CloseOutcome, Database, Seller, SellerId};
use location::{AccuracyTier, FixedLocationProvider, LocationProvider, PermissionStatus};
use settings::{LocationSettings, SettingsStore};
use visits::{commands, TrackerError, VisitTracker};

pub struct AppState {
    pub db: Database,
    pub tracker: VisitTracker,
    pub settings: SettingsStore,
}

impl AppState {
    pub fn new(db: Database, settings: SettingsStore, location: Arc<dyn LocationProvider>) -> Self {
        let tracker = VisitTracker::new(Arc::new(db.clone()), location)
            .with_accuracy(settings.location().accuracy);
        Self {
            db,
            tracker,
            settings,
        }
    }

    /// Rehydrates the tracker for whoever is signed in on this device.
    pub async fn reconcile(&self) -> visits::TrackerSnapshot {
        self.tracker
            .set_identity(self.settings.signed_in_seller())
            .await
    }
}

#[derive(Parser)]
#[command(name = "fieldvisit")]
#[command(author, version, about = "Track field-sales visits with GPS-anchored check-outs")]
struct Cli {
    /// Directory holding the database and settings (overrides FIELDVISIT_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage sellers
    Seller {
        #[command(subcommand)]
        action: SellerAction,
    },
    /// Sign in as a seller on this device
    Login { seller_id: SellerId },
    /// Sign out and clear the tracker
    Logout,
    /// Show the tracker state
    Status,
    /// Open a visit at a client
    Start { client_id: String },
    /// Close the open visit with a fresh location fix
    End {
        #[arg(long, value_enum)]
        outcome: OutcomeArg,

        #[arg(long)]
        notes: Option<String>,

        /// Latitude of the current fix
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude of the current fix
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Horizontal accuracy of the fix in meters
        #[arg(long, requires = "lat")]
        accuracy: Option<f64>,

        /// Answer the location permission prompt with "deny"
        #[arg(long)]
        deny_location: bool,
    },
    /// Show or change location preferences
    Location {
        /// Precision requested when capturing the check-out fix
        #[arg(long, value_enum)]
        accuracy: Option<AccuracyTier>,

        /// Whether this device has granted foreground location access
        #[arg(long, value_enum)]
        permission: Option<PermissionArg>,
    },
    /// List the signed-in seller's visits, most recent first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
enum SellerAction {
    /// Register a seller and print its id
    Add {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: Option<String>,
    },
    /// List registered sellers
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutcomeArg {
    Sale,
    NoSale,
    Closed,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PermissionArg {
    Granted,
    Denied,
}

fn apply_location_args(
    mut current: LocationSettings,
    accuracy: Option<AccuracyTier>,
    permission: Option<PermissionArg>,
) -> LocationSettings {
    if let Some(accuracy) = accuracy {
        current.accuracy = accuracy;
    }
    if let Some(permission) = permission {
        current.permission_granted = matches!(permission, PermissionArg::Granted);
    }
    current
}

impl From<OutcomeArg> for CloseOutcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Sale => CloseOutcome::Sale,
            OutcomeArg::NoSale => CloseOutcome::NoSale,
            OutcomeArg::Closed => CloseOutcome::ClosedStore,
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // RUST_LOG, when set, wins over the default level.
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();
}

pub fn run() {
    let config = AppConfig::from_env();
    init_logging(config.debug);

    let cli = Cli::parse();
    let config = config.with_data_dir(cli.data_dir.clone());

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
        .and_then(|runtime| runtime.block_on(dispatch(cli.command, config)));

    if let Err(err) = result {
        error!("Command failed: {err:#}");
        std::process::exit(1);
    }
}

fn location_for(command: &Command, settings: &SettingsStore) -> Arc<dyn LocationProvider> {
    let granted = settings.location().permission_granted;
    let provider = match command {
        Command::End {
            lat,
            lon,
            accuracy,
            deny_location,
            ..
        } => {
            let permission = if *deny_location || !granted {
                PermissionStatus::Denied
            } else {
                PermissionStatus::Granted
            };
            let provider = FixedLocationProvider::new().with_permission(permission);
            match (lat, lon) {
                (Some(lat), Some(lon)) => provider.with_fix(*lat, *lon, *accuracy),
                _ => provider,
            }
        }
        _ => FixedLocationProvider::new(),
    };
    Arc::new(provider)
}

async fn dispatch(command: Command, config: AppConfig) -> Result<()> {
    let settings = SettingsStore::new(config.settings_path())?;
    let location = location_for(&command, &settings);
    let db = Database::new(config.database_path())?;
    let state = AppState::new(db, settings, location);

    match command {
        Command::Seller { action } => match action {
            SellerAction::Add { name, email } => {
                let seller = Seller {
                    id: SellerId::new(),
                    name,
                    email,
                    active: true,
                    created_at: Utc::now(),
                };
                state.db.insert_seller(&seller).await?;
                info!("Registered seller {} ({})", seller.name, seller.id);
                println!("{}", seller.id);
            }
            SellerAction::List => {
                let sellers = state.db.list_sellers().await?;
                println!("{}", serde_json::to_string_pretty(&sellers)?);
            }
        },
        Command::Login { seller_id } => {
            let seller = state
                .db
                .get_seller(seller_id)
                .await?
                .ok_or_else(|| anyhow!("unknown seller {seller_id}"))?;
            if !seller.active {
                bail!("seller {} is disabled", seller.name);
            }

            state.settings.set_signed_in_seller(Some(seller.id))?;
            let snapshot = state.reconcile().await;
            println!("Signed in as {}.", seller.name);
            if let Some(open) = snapshot.state.visit {
                println!(
                    "Visit {} with client {} is still open.",
                    open.visit_id, open.client_id
                );
            }
        }
        Command::Logout => {
            state.settings.set_signed_in_seller(None)?;
            state.tracker.sign_out().await;
            println!("Signed out.");
        }
        Command::Status => {
            state.reconcile().await;
            let snapshot = commands::get_tracker_state(&state).await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Start { client_id } => {
            state.reconcile().await;
            let confirmation = commands::start_visit(&state, client_id)
                .await
                .map_err(anyhow::Error::msg)?;
            println!("{confirmation}");
        }
        Command::End { outcome, notes, .. } => {
            state.reconcile().await;
            let confirmation = commands::end_visit(&state, outcome.into(), notes)
                .await
                .map_err(anyhow::Error::msg)?;
            println!("{confirmation}");
        }
        Command::Location {
            accuracy,
            permission,
        } => {
            let current = state.settings.location();
            let updated = apply_location_args(current.clone(), accuracy, permission);
            if updated != current {
                state.settings.update_location(updated.clone())?;
                info!(
                    "Location settings updated: accuracy {:?}, permission granted {}",
                    updated.accuracy, updated.permission_granted
                );
            }
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        Command::History { limit } => {
            let seller_id = state
                .settings
                .signed_in_seller()
                .ok_or_else(|| anyhow!(TrackerError::NotAuthenticated.user_message()))?;
            let visits = state.db.list_visits_for_seller(seller_id, limit).await?;
            println!("{}", serde_json::to_string_pretty(&visits)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn accuracy_needs_a_position() {
        let err = Cli::try_parse_from(["fieldvisit", "end", "--outcome", "sale", "--accuracy", "5"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "fieldvisit", "end", "--outcome", "sale", "--lat", "-34.6", "--lon", "-58.4",
            "--accuracy", "5",
        ])
        .unwrap();
        assert_matches!(
            cli.command,
            Command::End {
                lat: Some(_),
                lon: Some(_),
                accuracy: Some(_),
                ..
            }
        );
    }

    #[test]
    fn location_command_updates_only_given_fields() {
        let cli = Cli::try_parse_from([
            "fieldvisit", "location", "--accuracy", "balanced", "--permission", "denied",
        ])
        .unwrap();
        let Command::Location {
            accuracy,
            permission,
        } = cli.command
        else {
            panic!("expected the location command");
        };

        let updated = apply_location_args(LocationSettings::default(), accuracy, permission);
        assert_eq!(updated.accuracy, AccuracyTier::Balanced);
        assert!(!updated.permission_granted);

        let untouched = apply_location_args(updated.clone(), None, None);
        assert_eq!(untouched, updated);
    }

    #[test]
    fn location_settings_feed_the_end_command_provider() {
        let path = std::env::temp_dir()
            .join(format!("fieldvisit-cli-{}", uuid::Uuid::new_v4()))
            .join("settings.json");
        let settings = SettingsStore::new(path.clone()).unwrap();
        settings
            .update_location(apply_location_args(
                settings.location(),
                None,
                Some(PermissionArg::Denied),
            ))
            .unwrap();

        let cli = Cli::try_parse_from([
            "fieldvisit", "end", "--outcome", "no-sale", "--lat", "1", "--lon", "2",
        ])
        .unwrap();
        let provider = location_for(&cli.command, &settings);
        let permission = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(provider.request_foreground_permission());
        assert_eq!(permission, PermissionStatus::Denied);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
