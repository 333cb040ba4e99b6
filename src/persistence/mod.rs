//! Persistence - App config files and the shared app log

pub mod log;
pub mod store;

pub use log::{FileLog, LogSink, MemoryLog};
pub use store::{id_for_name, ConfigStore};
