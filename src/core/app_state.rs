//! App state - One app definition bound to at most one live process

use std::sync::{Arc, RwLock};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use super::clock::Clock;
use super::definition::AppDefinition;
use super::error::ProcessError;
use super::process::{ExitHook, ProcessHandle, ProcessState};
use super::schedule::{is_eligible, next_day_start};
use crate::persistence::LogSink;

/// Tag added to log lines about failed starts
pub const FAILED_TAG: &str = "FAILED";

/// "Do not start again before" marker, shared between the reconciliation
/// loop and the exit hook of the running process.
#[derive(Debug, Clone, Default)]
pub struct Suppression {
    until: Arc<RwLock<Option<NaiveDateTime>>>,
}

impl Suppression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<NaiveDateTime> {
        match self.until.read() {
            Ok(until) => *until,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, until: NaiveDateTime) {
        match self.until.write() {
            Ok(mut current) => *current = Some(until),
            Err(poisoned) => *poisoned.into_inner() = Some(until),
        }
    }

    pub fn clear(&self) {
        match self.until.write() {
            Ok(mut current) => *current = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

/// Result of asking an app to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new process was spawned
    Started { pid: u32 },
    /// A process is already running; nothing was done
    AlreadyRunning,
    /// The app is disabled in its config
    Disabled,
    /// Outside the allowed days or hours, or suppressed after an exit
    OutsideWindow,
    /// Spawning failed; the error has been logged
    Failed,
}

/// Point-in-time view of one app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStatus {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub state: &'static str,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub suppressed_until: Option<NaiveDateTime>,
}

/// A supervised app
pub struct AppState {
    definition: AppDefinition,
    process: Option<ProcessHandle>,
    suppression: Suppression,
    log: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(definition: AppDefinition, log: Arc<dyn LogSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            definition,
            process: None,
            suppression: Suppression::new(),
            log,
            clock,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &AppDefinition {
        &self.definition
    }

    pub fn display_name(&self) -> &str {
        self.definition.display_name()
    }

    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    pub fn suppressed_until(&self) -> Option<NaiveDateTime> {
        self.suppression.get()
    }

    /// Whether the current process is alive. Once this turns false the
    /// exit has already been logged and the suppression armed.
    pub fn is_running(&self) -> bool {
        self.process.as_ref().is_some_and(|p| p.is_running())
    }

    /// Replace the definition. A running process is left alone and keeps
    /// the program and arguments it was started with.
    pub fn reload(&mut self, definition: AppDefinition) -> bool {
        let changed = self.definition != definition;
        if changed {
            debug!("Reloaded config '{}'", definition.id);
        }
        self.definition = definition;
        changed
    }

    /// Start the app if it is enabled, idle and inside its schedule window.
    ///
    /// Spawn failures are logged with the app name and reported as
    /// [`StartOutcome::Failed`]; they never propagate.
    pub fn try_start(&mut self, now: NaiveDateTime) -> StartOutcome {
        match self.start(now, true) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report_failure(&e);
                StartOutcome::Failed
            }
        }
    }

    /// Start immediately, ignoring the schedule window and any suppression.
    /// Disabled apps still do not start.
    pub fn start_now(&mut self, now: NaiveDateTime) -> Result<StartOutcome, ProcessError> {
        self.start(now, false).inspect_err(|e| self.report_failure(e))
    }

    /// Stop the running process, gracefully or by force
    pub fn stop(&self, graceful: bool) -> Result<(), ProcessError> {
        let process = self.process.as_ref().ok_or(ProcessError::NotRunning)?;
        if graceful {
            process.terminate()
        } else {
            process.kill()
        }
    }

    pub fn status(&self) -> AppStatus {
        let state = self
            .process
            .as_ref()
            .map(|p| p.state())
            .unwrap_or(ProcessState::Idle);
        let (pid, exit_code) = match state {
            ProcessState::Running { pid } => (Some(pid), None),
            ProcessState::Exited { code } => (None, code),
            ProcessState::Idle => (None, None),
        };
        AppStatus {
            id: self.definition.id.clone(),
            name: self.display_name().to_string(),
            enabled: self.definition.enabled,
            state: state.label(),
            pid,
            exit_code,
            suppressed_until: self.suppression.get(),
        }
    }

    fn start(
        &mut self,
        now: NaiveDateTime,
        respect_window: bool,
    ) -> Result<StartOutcome, ProcessError> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        if !self.definition.enabled {
            return Ok(StartOutcome::Disabled);
        }
        if respect_window && !is_eligible(&self.definition, now, self.suppression.get()) {
            return Ok(StartOutcome::OutsideWindow);
        }

        // Cleared before spawning so an immediate exit can re-arm it
        self.suppression.clear();

        let handle = ProcessHandle::new();
        let pid = handle.start(&self.definition, Arc::clone(&self.log), self.exit_hook())?;
        self.process = Some(handle);

        let name = self.display_name();
        self.log.append("Running", &[name]);
        if !self.definition.listen_output {
            self.log.append("Output logging is disabled", &[name]);
        }
        Ok(StartOutcome::Started { pid })
    }

    /// Hold the app back until the next calendar day and log the exit.
    /// Runs before the handle reports the exit.
    fn exit_hook(&self) -> ExitHook {
        let log = Arc::clone(&self.log);
        let clock = Arc::clone(&self.clock);
        let suppression = self.suppression.clone();
        let name = self.display_name().to_string();

        Box::new(move |code| {
            suppression.set(next_day_start(clock.now()));
            let code = code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
            log.append(&format!("Exited with code {}", code), &[&name]);
        })
    }

    fn report_failure(&self, error: &ProcessError) {
        let name = self.display_name();
        warn!("Failed to start '{}': {}", name, error);
        self.log.append("Failed to start", &[name, FAILED_TAG]);
        self.log.append(&error.to_string(), &[name, FAILED_TAG]);
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("definition", &self.definition)
            .field("process", &self.process)
            .field("suppression", &self.suppression)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::weekday::DayOfWeek;
    use crate::persistence::MemoryLog;
    use chrono::{NaiveDate, NaiveTime};
    use std::time::{Duration, Instant};

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn shell(id: &str, script: &str) -> AppDefinition {
        AppDefinition::new(id, "/bin/sh")
            .with_name(format!("{} app", id))
            .with_arguments(vec!["-c".into(), script.into()])
    }

    fn app(def: AppDefinition, now: NaiveDateTime) -> (AppState, Arc<MemoryLog>, FixedClock) {
        let log = Arc::new(MemoryLog::new());
        let clock = FixedClock::new(now);
        let state = AppState::new(def, log.clone(), Arc::new(clock.clone()));
        (state, log, clock)
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
    fn disabled_app_never_spawns() {
        let windows = [
            (None, None),
            (NaiveTime::from_hms_opt(0, 0, 0), NaiveTime::from_hms_opt(23, 59, 59)),
            (NaiveTime::from_hms_opt(9, 0, 0), None),
        ];
        for (start, end) in windows {
            let def = shell("off", "exit 0")
                .with_enabled(false)
                .with_window(start, end);
            let (mut state, log, _) = app(def, at(19, 12, 0));
            assert_eq!(state.try_start(at(19, 12, 0)), StartOutcome::Disabled);
            assert!(state.process().is_none());
            assert!(log.lines().is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn running_app_is_not_started_twice() {
        let (mut state, log, _) = app(shell("sleeper", "exec sleep 30"), at(19, 12, 0));

        let first = state.try_start(at(19, 12, 0));
        let StartOutcome::Started { pid } = first else {
            panic!("expected a start, got {:?}", first);
        };
        assert!(log.contains("sleeper app", "Running"));
        assert!(log.contains("sleeper app", "Output logging is disabled"));

        assert_eq!(state.try_start(at(19, 12, 1)), StartOutcome::AlreadyRunning);
        assert_eq!(state.process().and_then(|p| p.pid()), Some(pid));
        assert_eq!(log.count("sleeper app", "Running"), 1);

        state.stop(false).unwrap();
        assert!(wait_until(|| !state.is_running()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reload_keeps_running_process() {
        let (mut state, _log, _) = app(shell("sleeper", "exec sleep 30"), at(19, 12, 0));
        state.try_start(at(19, 12, 0));
        let pid = state.process().and_then(|p| p.pid());
        assert!(pid.is_some());

        let changed = state.reload(
            shell("sleeper", "exec sleep 60")
                .with_days([DayOfWeek::Saturday])
                .with_enabled(false),
        );
        assert!(changed);
        assert!(!state.definition().enabled);
        assert!(state.is_running());
        assert_eq!(state.process().and_then(|p| p.pid()), pid);

        state.stop(true).unwrap();
        assert!(wait_until(|| !state.is_running()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crash_with_listener_suppresses_until_next_day() {
        let def = shell("crashy", "echo booting; exit 2").with_listen_output(true);
        let (mut state, log, clock) = app(def, at(19, 14, 0));

        assert!(matches!(state.try_start(at(19, 14, 0)), StartOutcome::Started { .. }));
        assert!(wait_until(|| log.contains("crashy app", "Exited with code 2")));
        assert_eq!(state.suppressed_until(), Some(at(20, 0, 0)));
        assert!(log.contains("crashy app", "booting"));

        clock.set(at(19, 18, 0));
        assert_eq!(state.try_start(at(19, 18, 0)), StartOutcome::OutsideWindow);

        clock.set(at(20, 0, 1));
        assert!(matches!(state.try_start(at(20, 0, 1)), StartOutcome::Started { .. }));
        assert!(wait_until(|| state.suppressed_until() == Some(at(21, 0, 0))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crash_without_listener_is_suppressed_too() {
        let (mut state, log, _) = app(shell("silent", "exit 1"), at(19, 9, 0));

        assert!(matches!(state.try_start(at(19, 9, 0)), StartOutcome::Started { .. }));
        assert!(wait_until(|| !state.is_running()));
        assert_eq!(state.suppressed_until(), Some(at(20, 0, 0)));
        assert!(log.contains("silent app", "Exited with code 1"));
        assert_eq!(state.try_start(at(19, 9, 1)), StartOutcome::OutsideWindow);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawn_failure_is_logged_and_contained() {
        let def = AppDefinition::new("ghost", "/definitely/not/here/ghost").with_name("Ghost");
        let (mut state, log, _) = app(def, at(19, 9, 0));

        assert_eq!(state.try_start(at(19, 9, 0)), StartOutcome::Failed);
        assert!(state.process().is_none());
        assert!(log.contains("Ghost", "Failed to start"));
        assert!(log
            .lines()
            .iter()
            .all(|(_, tags)| tags == &vec!["Ghost".to_string(), FAILED_TAG.to_string()]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_now_ignores_window_and_suppression() {
        let def = shell("manual", "exec sleep 30").with_days([DayOfWeek::Saturday]);
        let (mut state, _log, _) = app(def, at(19, 9, 0));
        state.suppression.set(at(20, 0, 0));

        assert_eq!(state.try_start(at(19, 9, 0)), StartOutcome::OutsideWindow);
        let outcome = state.start_now(at(19, 9, 0)).unwrap();
        assert!(matches!(outcome, StartOutcome::Started { .. }));
        assert_eq!(state.suppressed_until(), None);

        let status = state.status();
        assert_eq!(status.state, "Running");
        assert!(status.pid.is_some());

        state.stop(false).unwrap();
        assert!(wait_until(|| !state.is_running()));
        assert_eq!(state.status().state, "Exited");
    }

    #[test]
    fn stop_without_process_is_an_error() {
        let (state, _, _) = app(shell("idle", "exit 0"), at(19, 9, 0));
        assert!(matches!(state.stop(true), Err(ProcessError::NotRunning)));
    }

    /// Reads slowly on runtime worker threads, where exits are reported
    struct SlowExitClock(FixedClock);

    impl Clock for SlowExitClock {
        fn now(&self) -> NaiveDateTime {
            if std::thread::current().name() == Some("tokio-runtime-worker") {
                std::thread::sleep(Duration::from_millis(300));
            }
            self.0.now()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crash_is_not_restarted_while_exit_is_reported() {
        let now = at(19, 14, 0);
        let log = Arc::new(MemoryLog::new());
        let clock = SlowExitClock(FixedClock::new(now));
        let def = shell("racy", "echo hi; exit 2").with_listen_output(true);
        let mut state = AppState::new(def, log.clone(), Arc::new(clock));

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut starts = 0;
        while Instant::now() < deadline {
            if let StartOutcome::Started { .. } = state.try_start(now) {
                starts += 1;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(starts, 1, "crashed app restarted on the same day");
        assert!(!state.is_running());
        assert_eq!(state.suppressed_until(), Some(at(20, 0, 0)));
        assert_eq!(log.count("racy app", "Exited with code 2"), 1);
    }
}
