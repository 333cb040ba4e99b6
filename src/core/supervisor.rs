//! Supervisor - Config discovery and the reconciliation loop

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::app_state::{AppState, AppStatus, StartOutcome};
use super::clock::Clock;
use super::error::ConfigError;
use super::settings::Settings;
use crate::persistence::{ConfigStore, LogSink};

/// Tag used for supervisor-level failures in the app log
pub const ERROR_TAG: &str = "ERROR";

/// Explicit supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory holding one `<id>.json` per app
    pub apps_dir: PathBuf,
    /// Pause between reconciliation ticks
    pub tick_interval: Duration,
}

impl SupervisorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            apps_dir: settings.get_apps_directory(),
            tick_interval: settings.tick_interval(),
        }
    }
}

/// Owns every known app and drives each toward running whenever its
/// schedule allows.
pub struct Supervisor {
    /// Apps by id. Entries are never removed.
    apps: Arc<RwLock<BTreeMap<String, AppState>>>,
    /// Last load error reported per id, so each failure is logged once
    rejected: Mutex<HashMap<String, String>>,
    store: ConfigStore,
    log: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, log: Arc<dyn LogSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            apps: Arc::new(RwLock::new(BTreeMap::new())),
            rejected: Mutex::new(HashMap::new()),
            store: ConfigStore::new(config.apps_dir),
            log,
            clock,
            tick_interval: config.tick_interval,
        }
    }

    /// Run ticks forever, one per interval, starting immediately
    pub async fn run(&self) -> Result<()> {
        info!(
            "Supervising {:?} every {}s",
            self.store.apps_dir(),
            self.tick_interval.as_secs_f64()
        );
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick()?;
        }
    }

    /// One reconciliation pass: discover configs, then start eligible apps
    pub fn tick(&self) -> Result<()> {
        self.discover()?;
        let outcomes = self.start_pass()?;
        let started = outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, StartOutcome::Started { .. }))
            .count();
        debug!("Tick done: {} apps, {} started", outcomes.len(), started);
        Ok(())
    }

    /// Register new config ids and reload the definitions of known ones.
    ///
    /// A config that fails to load is reported once and skipped; a known
    /// app keeps its previous definition.
    pub fn discover(&self) -> Result<()> {
        let ids = match self.store.list_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to list app configs: {}", e);
                return Ok(());
            }
        };

        let mut apps = self
            .apps
            .write()
            .map_err(|e| anyhow::anyhow!("Apps lock poisoned: {}", e))?;

        for id in ids {
            match self.store.load(&id) {
                Ok(definition) => {
                    self.forget_rejection(&id);
                    if let Some(app) = apps.get_mut(&id) {
                        app.reload(definition);
                        continue;
                    }

                    let app = AppState::new(
                        definition,
                        Arc::clone(&self.log),
                        Arc::clone(&self.clock),
                    );
                    if !app.definition().enabled {
                        self.log.append("Disabled in configuration", &[app.display_name()]);
                    }
                    info!("Registered app '{}'", id);
                    apps.insert(id, app);
                }
                Err(e) => {
                    let label = apps
                        .get(&id)
                        .map(|app| app.display_name().to_string())
                        .unwrap_or_else(|| id.clone());
                    self.report_rejection(&id, &label, &e);
                }
            }
        }

        Ok(())
    }

    /// Try to start every registered app. One app's failure never stops the
    /// pass.
    pub fn start_pass(&self) -> Result<Vec<(String, StartOutcome)>> {
        let now = self.clock.now();
        let mut apps = self
            .apps
            .write()
            .map_err(|e| anyhow::anyhow!("Apps lock poisoned: {}", e))?;

        Ok(apps
            .iter_mut()
            .map(|(id, app)| (id.clone(), app.try_start(now)))
            .collect())
    }

    /// Start an app right away, ignoring its schedule and suppression
    pub fn start_now(&self, id: &str) -> Result<StartOutcome> {
        let now = self.clock.now();
        let mut apps = self
            .apps
            .write()
            .map_err(|e| anyhow::anyhow!("Apps lock poisoned: {}", e))?;
        let app = apps.get_mut(id).context("App not found")?;
        let outcome = app
            .start_now(now)
            .with_context(|| format!("Failed to start '{}'", app.display_name()))?;
        Ok(outcome)
    }

    /// Stop an app's running process
    pub fn stop(&self, id: &str, graceful: bool) -> Result<()> {
        let apps = self
            .apps
            .read()
            .map_err(|e| anyhow::anyhow!("Apps lock poisoned: {}", e))?;
        let app = apps.get(id).context("App not found")?;
        app.stop(graceful)
            .with_context(|| format!("Failed to stop '{}'", app.display_name()))?;
        info!("Stopping '{}' (graceful: {})", app.display_name(), graceful);
        Ok(())
    }

    /// Snapshot of every registered app, ordered by id
    pub fn status(&self) -> Result<Vec<AppStatus>> {
        let apps = self
            .apps
            .read()
            .map_err(|e| anyhow::anyhow!("Apps lock poisoned: {}", e))?;
        Ok(apps.values().map(AppState::status).collect())
    }

    /// Get count of registered apps
    pub fn app_count(&self) -> usize {
        self.apps.read().map(|apps| apps.len()).unwrap_or(0)
    }

    /// Get count of apps with a live process
    pub fn running_count(&self) -> usize {
        self.apps
            .read()
            .map(|apps| apps.values().filter(|app| app.is_running()).count())
            .unwrap_or(0)
    }

    fn report_rejection(&self, id: &str, label: &str, error: &ConfigError) {
        let message = error.to_string();
        let Ok(mut rejected) = self.rejected.lock() else {
            return;
        };
        if rejected.get(id) == Some(&message) {
            return;
        }
        warn!("Skipping config '{}': {}", id, message);
        self.log.append("Invalid configuration", &[label, ERROR_TAG]);
        self.log.append(&message, &[label, ERROR_TAG]);
        rejected.insert(id.to_string(), message);
    }

    fn forget_rejection(&self, id: &str) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.remove(id);
        }
    }
}
