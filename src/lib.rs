//! startupctl - Keep a set of configured programs running on a weekly schedule
//!
//! Each app is described by one JSON file in the apps directory. A
//! reconciliation loop starts every enabled app whose schedule is open and
//! holds an app back until the next day once its process has exited.

pub mod core;
pub mod persistence;
mod platform;
pub mod wizard;

/// Application name constant
pub const APP_NAME: &str = "startupctl";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
