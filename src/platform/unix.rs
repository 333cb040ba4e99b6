//! Unix process signalling

use std::io;

/// Ask a process to exit (SIGTERM)
pub fn terminate_process(pid: u32) -> io::Result<()> {
    send_signal(pid, libc::SIGTERM)
}

fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    let result = unsafe { libc::kill(pid, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
