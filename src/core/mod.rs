//! Core module - App definitions, scheduling, process control and supervision

mod app_state;
pub mod clock;
mod definition;
mod error;
mod process;
pub mod schedule;
pub mod settings;
mod supervisor;
mod weekday;

pub use app_state::{AppState, AppStatus, StartOutcome, Suppression, FAILED_TAG};
pub use clock::{Clock, FixedClock, SystemClock};
pub use definition::{AppDefinition, AppRecord};
pub use error::{ConfigError, ProcessError};
pub use process::{ExitHook, ProcessHandle, ProcessState};
pub use schedule::is_eligible;
pub use settings::Settings;
pub use supervisor::{Supervisor, SupervisorConfig, ERROR_TAG};
pub use weekday::DayOfWeek;
