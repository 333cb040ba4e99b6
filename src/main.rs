//! startupctl - Keep configured programs running on a weekly schedule
//!
//! Reads one JSON config per app from the data directory and starts every
//! enabled app whose schedule is open, once per tick, until interrupted.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use startupctl::core::schedule::describe_window;
use startupctl::core::{Settings, Supervisor, SupervisorConfig, SystemClock, ERROR_TAG};
use startupctl::persistence::{ConfigStore, FileLog, LogSink};
use startupctl::{wizard, APP_NAME, APP_VERSION};

#[derive(Debug, Parser)]
#[command(name = "startupctl", version, about = "Keep configured programs running on a weekly schedule")]
struct Cli {
    /// Data directory holding settings.json, apps/ and log.txt
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Seconds between reconciliation ticks
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Create a new app config interactively and exit
    #[arg(long, conflicts_with = "list")]
    create: bool,

    /// Name of the app to create
    #[arg(long, requires = "create")]
    name: Option<String>,

    /// Program of the app to create
    #[arg(long, requires = "create")]
    program: Option<PathBuf>,

    /// Print every configured app and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(Settings::default_data_directory);
    let loaded = Settings::read(&data_dir);
    let mut settings = loaded.as_ref().cloned().unwrap_or_default();
    if cli.config_dir.is_some() || settings.data_directory.is_none() {
        settings.data_directory = Some(data_dir);
    }
    if let Some(secs) = cli.interval {
        settings.tick_interval_secs = secs;
        settings.validate();
    }

    init_logging(settings.debug_logging);
    if let Err(e) = loaded {
        warn!("{:#}; using default settings", e);
    }

    let store = ConfigStore::new(settings.get_apps_directory());

    if cli.create {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        wizard::run(&store, cli.name, cli.program, &mut input, &mut output)?;
        return Ok(());
    }

    if cli.list {
        return list_apps(&store);
    }

    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    let log: Arc<dyn LogSink> = Arc::new(FileLog::new(settings.get_log_file()));
    let supervisor = Supervisor::new(
        SupervisorConfig::from_settings(&settings),
        Arc::clone(&log),
        Arc::new(SystemClock),
    );

    log.append("Starting", &[]);

    tokio::select! {
        result = supervisor.run() => {
            if let Err(e) = result {
                error!("Supervisor stopped: {:#}", e);
                log.append(&format!("{:#}", e), &[ERROR_TAG]);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

/// Initialize the logging system
fn init_logging(debug: bool) {
    let default = if debug { "startupctl=debug" } else { "startupctl=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn list_apps(store: &ConfigStore) -> Result<()> {
    let ids = store.list_ids()?;
    if ids.is_empty() {
        println!("No apps configured in {}", store.apps_dir().display());
        return Ok(());
    }

    for id in ids {
        match store.load(&id) {
            Ok(def) => println!(
                "{:<20} {:<8} {} ({})",
                id,
                if def.enabled { "enabled" } else { "disabled" },
                def.display_name(),
                describe_window(&def)
            ),
            Err(e) => println!("{:<20} invalid  {}", id, e),
        }
    }
    Ok(())
}
