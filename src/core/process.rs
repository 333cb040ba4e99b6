//! Process management - One child process from spawn to exit

use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::definition::AppDefinition;
use super::error::ProcessError;
use crate::persistence::LogSink;
use crate::platform;

/// How long an exited process's output may keep draining before its exit
/// is reported. A grandchild holding the pipe open must not delay it.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Called exactly once with the exit code when the process is seen to exit.
///
/// Runs while the handle's lock is held: it must not call back into the
/// handle.
pub type ExitHook = Box<dyn FnOnce(Option<i32>) + Send + 'static>;

/// Lifecycle of a handle. There is no way back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Not started yet
    Idle,
    /// Spawned and no exit observed
    Running { pid: u32 },
    /// Exit observed; `code` is `None` when ended by a signal
    Exited { code: Option<i32> },
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running { .. } => "Running",
            Self::Exited { .. } => "Exited",
        }
    }
}

/// Stop request delivered to the task that owns the child
#[derive(Debug, Clone, Copy)]
enum StopRequest {
    Terminate,
    Kill,
}

struct Inner {
    state: ProcessState,
    stop_tx: Option<UnboundedSender<StopRequest>>,
    on_exit: Option<ExitHook>,
}

/// Handle to one OS process instance. Never reused: a restart needs a fresh
/// handle.
///
/// Clones share the same process. A watcher task on the tokio runtime owns
/// the child, forwards its output and awaits its exit; the exit hook fires
/// in the same critical section that publishes [`ProcessState::Exited`].
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<Mutex<Inner>>,
}

impl ProcessHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: ProcessState::Idle,
                stop_tx: None,
                on_exit: None,
            })),
        }
    }

    /// Spawn the program of `def`. Must be called within a tokio runtime.
    ///
    /// Stdout is captured only when `def.listen_output` is set, in which
    /// case each non-empty line is forwarded to `log` tagged with the app
    /// name. Returns once the process is spawned.
    pub fn start(
        &self,
        def: &AppDefinition,
        log: Arc<dyn LogSink>,
        on_exit: ExitHook,
    ) -> Result<u32, ProcessError> {
        let runtime = tokio::runtime::Handle::try_current()?;

        let (pid, child, stop_rx) = {
            let mut inner = self.lock();
            match inner.state {
                ProcessState::Running { .. } => return Err(ProcessError::AlreadyRunning),
                ProcessState::Exited { .. } => return Err(ProcessError::Finished),
                ProcessState::Idle => {}
            }

            let mut cmd = Command::new(&def.program);
            cmd.args(&def.arguments).stdin(Stdio::null());
            if def.listen_output {
                cmd.stdout(Stdio::piped());
            } else {
                cmd.stdout(Stdio::null());
            }

            let child = {
                let _guard = runtime.enter();
                cmd.spawn()
            }
            .map_err(|source| ProcessError::Spawn {
                program: def.program.clone(),
                source,
            })?;

            let pid = child.id().unwrap_or_default();
            info!("Spawned '{}' with PID {}", def.display_name(), pid);

            let (stop_tx, stop_rx) = mpsc::unbounded_channel();
            inner.state = ProcessState::Running { pid };
            inner.stop_tx = Some(stop_tx);
            inner.on_exit = Some(on_exit);
            (pid, child, stop_rx)
        };

        let handle = self.clone();
        let name = def.display_name().to_string();
        runtime.spawn(async move { watch(handle, child, stop_rx, log, name).await });

        Ok(pid)
    }

    /// Force the process to exit. Does not wait for it.
    pub fn kill(&self) -> Result<(), ProcessError> {
        self.request_stop(StopRequest::Kill)
    }

    /// Ask the process to exit. Does not wait for it.
    pub fn terminate(&self) -> Result<(), ProcessError> {
        self.request_stop(StopRequest::Terminate)
    }

    /// True while a process is held and no exit has been observed
    pub fn is_running(&self) -> bool {
        self.lock().state.is_running()
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    pub fn pid(&self) -> Option<u32> {
        match self.lock().state {
            ProcessState::Running { pid } => Some(pid),
            _ => None,
        }
    }

    fn request_stop(&self, request: StopRequest) -> Result<(), ProcessError> {
        let inner = self.lock();
        if !inner.state.is_running() {
            return Err(ProcessError::NotRunning);
        }
        // The watcher owns the child and only reaps it after leaving its
        // select loop, so a queued request never reaches a recycled pid
        let sender = inner.stop_tx.as_ref().ok_or(ProcessError::NotRunning)?;
        sender.send(request).map_err(|_| ProcessError::NotRunning)
    }

    /// Publish the exit and run the exit hook under the same lock
    fn finish(&self, code: Option<i32>) {
        let mut inner = self.lock();
        inner.state = ProcessState::Exited { code };
        inner.stop_tx = None;
        if let Some(hook) = inner.on_exit.take() {
            hook(code);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("state", &self.lock().state)
            .finish()
    }
}

/// Own the child until it exits: forward its output, apply stop requests,
/// then report the exit
async fn watch(
    handle: ProcessHandle,
    mut child: Child,
    mut stop_rx: UnboundedReceiver<StopRequest>,
    log: Arc<dyn LogSink>,
    name: String,
) {
    let output = child.stdout.take().map(|stdout| {
        let log = Arc::clone(&log);
        let name = name.clone();
        tokio::spawn(async move { forward_output(stdout, log, name).await })
    });

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(request) = stop_rx.recv() => {
                if let Err(e) = send_stop(&mut child, request) {
                    warn!("Failed to stop '{}': {}", name, e);
                }
            }
        }
    };

    if let Some(output) = output {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, output).await.is_err() {
            debug!("Output of '{}' still open after exit", name);
        }
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("Error waiting for '{}': {}", name, e);
            None
        }
    };
    handle.finish(code);
}

fn send_stop(child: &mut Child, request: StopRequest) -> Result<(), ProcessError> {
    let pid = child.id().unwrap_or_default();
    let sent = match request {
        StopRequest::Terminate => platform::terminate(child),
        StopRequest::Kill => child.start_kill(),
    };
    sent.map_err(|source| ProcessError::Signal { pid, source })
}

/// Forward stdout lines until end-of-stream
async fn forward_output(stdout: ChildStdout, log: Arc<dyn LogSink>, name: String) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\r', '\n']);
                if !line.is_empty() {
                    log.append(line, &[&name]);
                }
            }
            Err(e) => {
                debug!("Output of '{}' closed: {}", name, e);
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::persistence::MemoryLog;
    use std::sync::mpsc;
    use std::time::Instant;

    fn shell(id: &str, script: &str) -> AppDefinition {
        AppDefinition::new(id, "/bin/sh").with_arguments(vec!["-c".into(), script.into()])
    }

    fn exit_channel() -> (ExitHook, mpsc::Receiver<Option<i32>>) {
        let (tx, rx) = mpsc::channel();
        let hook: ExitHook = Box::new(move |code| {
            let _ = tx.send(code);
        });
        (hook, rx)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn new_handle_is_idle() {
        let handle = ProcessHandle::new();
        assert_eq!(handle.state(), ProcessState::Idle);
        assert!(!handle.is_running());
        assert!(matches!(handle.kill(), Err(ProcessError::NotRunning)));
        assert!(matches!(handle.terminate(), Err(ProcessError::NotRunning)));
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let log = Arc::new(MemoryLog::new());
        let (hook, _) = exit_channel();
        let handle = ProcessHandle::new();

        let err = handle.start(&shell("early", "exit 0"), log, hook).unwrap_err();
        assert!(matches!(err, ProcessError::NoRuntime(_)));
        assert_eq!(handle.state(), ProcessState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn forwards_lines_and_reports_exit() {
        let log = Arc::new(MemoryLog::new());
        let (hook, exits) = exit_channel();
        let def = shell("echo", "echo first; echo; echo second; exit 3").with_listen_output(true);

        let handle = ProcessHandle::new();
        handle.start(&def, log.clone(), hook).unwrap();

        let code = exits.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(code, Some(3));
        assert_eq!(handle.state(), ProcessState::Exited { code: Some(3) });

        let lines = log.lines();
        assert_eq!(
            lines,
            vec![
                ("first".to_string(), vec!["echo".to_string()]),
                ("second".to_string(), vec!["echo".to_string()]),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn exit_is_reported_without_output_capture() {
        let log = Arc::new(MemoryLog::new());
        let (hook, exits) = exit_channel();

        let handle = ProcessHandle::new();
        handle.start(&shell("quiet", "exit 0"), log.clone(), hook).unwrap();

        assert_eq!(exits.recv_timeout(Duration::from_secs(5)).unwrap(), Some(0));
        assert!(!handle.is_running());
        // Hook fires once only
        assert!(exits.try_recv().is_err());
        assert!(log.lines().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn closed_output_keeps_process_running() {
        let log = Arc::new(MemoryLog::new());
        let (hook, exits) = exit_channel();
        let def = shell("detached", "exec >&-; exec sleep 30").with_listen_output(true);

        let handle = ProcessHandle::new();
        handle.start(&def, log, hook).unwrap();

        // Stdout is closed at once, the process lives on until stopped
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(handle.is_running());
        assert!(exits.try_recv().is_err());

        handle.kill().unwrap();
        assert_eq!(exits.recv_timeout(Duration::from_secs(5)).unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn exit_is_visible_only_after_hook_ran() {
        let log = Arc::new(MemoryLog::new());
        let armed = Arc::new(Mutex::new(false));
        let hook_armed = Arc::clone(&armed);
        let hook: ExitHook = Box::new(move |_| {
            std::thread::sleep(Duration::from_millis(300));
            *hook_armed.lock().unwrap() = true;
        });

        let handle = ProcessHandle::new();
        handle.start(&shell("brief", "exit 1"), log, hook).unwrap();

        assert!(wait_until(|| {
            let running = handle.is_running();
            assert!(running || *armed.lock().unwrap(), "exit seen before hook finished");
            !running
        }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_start_is_rejected() {
        let log = Arc::new(MemoryLog::new());
        let (hook, _exits) = exit_channel();
        let (second_hook, _) = exit_channel();
        let def = shell("sleeper", "exec sleep 30");

        let handle = ProcessHandle::new();
        handle.start(&def, log.clone(), hook).unwrap();
        assert!(handle.is_running());
        assert!(handle.pid().is_some());
        assert!(matches!(
            handle.start(&def, log, second_hook),
            Err(ProcessError::AlreadyRunning)
        ));

        handle.kill().unwrap();
        assert!(wait_until(|| !handle.is_running()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn terminate_ends_process_and_handle_is_spent() {
        let log = Arc::new(MemoryLog::new());
        let (hook, exits) = exit_channel();
        let def = shell("sleeper", "exec sleep 30").with_listen_output(true);

        let handle = ProcessHandle::new();
        handle.start(&def, log.clone(), hook).unwrap();
        handle.terminate().unwrap();

        // Killed by a signal, so no exit code
        assert_eq!(exits.recv_timeout(Duration::from_secs(5)).unwrap(), None);
        assert!(matches!(handle.kill(), Err(ProcessError::NotRunning)));
        assert!(matches!(handle.terminate(), Err(ProcessError::NotRunning)));

        let (again, _) = exit_channel();
        assert!(matches!(
            handle.start(&def, log, again),
            Err(ProcessError::Finished)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawn_failure_leaves_handle_idle() {
        let log = Arc::new(MemoryLog::new());
        let (hook, _) = exit_channel();
        let def = AppDefinition::new("missing", "/definitely/not/here/app");

        let handle = ProcessHandle::new();
        let err = handle.start(&def, log, hook).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert_eq!(handle.state(), ProcessState::Idle);
    }
}
