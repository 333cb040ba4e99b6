//! Platform-specific process signalling

#[cfg(unix)]
mod unix;

use std::io;

use tokio::process::Child;

/// Request a graceful exit. Platforms without signals fall back to a kill.
/// A child that has already been reaped is left alone.
pub fn terminate(child: &mut Child) -> io::Result<()> {
    #[cfg(unix)]
    {
        match child.id() {
            Some(pid) => unix::terminate_process(pid),
            None => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        child.start_kill()
    }
}
