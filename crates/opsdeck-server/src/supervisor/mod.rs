//! Lifecycle supervision for the long-running node and wallet processes.
//!
//! One [`Supervisor`] exists per [`Role`]. It is the only owner of the OS
//! process handle for that role; every operation takes its async mutex, so
//! `start`, `stop` and `status` are serialised per role. Captured output is
//! the one exception and lives behind its own lock (see `Supervisor::tail`).

pub mod launch;
pub mod locate;
pub mod log;

pub use launch::{Exposure, LaunchError, LaunchMode, LaunchSpec, Overlay, Role};
pub use log::LogTail;

use chrono::{DateTime, Utc};
use opsdeck_core::config::SupervisorConfig;
use opsdeck_core::executor::{self, MergedOutput};
use opsdeck_core::paths;
use opsdeck_core::CommandSpec;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const TOKEN_LEN: usize = 8;
const DRAIN_WAIT: Duration = Duration::from_millis(500);
const FORCE_KILL_WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Idle,
    Starting,
    Running,
    Exited,
    Error,
}

/// Snapshot of one role's supervised process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessState {
    pub role: Role,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub exited_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub log_tail: Vec<String>,
    pub address: Option<String>,
    pub token: Option<String>,
    pub error: Option<String>,
    /// Launch command with secret values redacted.
    pub command: Option<String>,
    pub log_path: PathBuf,
}

impl ProcessState {
    fn idle(role: Role, log_path: PathBuf) -> Self {
        Self {
            role,
            status: ProcessStatus::Idle,
            pid: None,
            started_at: None,
            exited_at: None,
            exit_code: None,
            log_tail: Vec::new(),
            address: None,
            token: None,
            error: None,
            command: None,
            log_path,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.status, ProcessStatus::Starting | ProcessStatus::Running)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Spawn,
    EarlyExit,
}

/// Structured detail for a launch that never reached `running`.
#[derive(Debug, Clone, Serialize)]
pub struct StartupFailure {
    pub kind: FailureKind,
    pub message: String,
    pub log_tail: Vec<String>,
    pub log_path: PathBuf,
    pub exit_code: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("{role} is already running")]
    AlreadyRunning { role: Role, pid: Option<u32> },

    #[error("invalid launch configuration: {0}")]
    Invalid(#[from] LaunchError),

    #[error("{}", .0.message)]
    StartupFailed(Box<StartupFailure>),

    #[error("cannot create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub root: PathBuf,
    pub grace: Duration,
    pub stop_timeout: Duration,
    pub tail_capacity: usize,
    pub search_path: Vec<PathBuf>,
}

impl SupervisorSettings {
    pub fn from_config(root: &Path, config: &SupervisorConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            grace: Duration::from_millis(config.grace_ms),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
            tail_capacity: config.tail_capacity,
            search_path: config
                .search_path
                .iter()
                .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

struct ChildHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<i32>>,
}

impl ChildHandle {
    fn exited(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }
}

struct Inner {
    state: ProcessState,
    handle: Option<ChildHandle>,
    generation: u64,
}

pub struct Supervisor {
    role: Role,
    settings: Arc<SupervisorSettings>,
    log_path: PathBuf,
    inner: Arc<Mutex<Inner>>,
    /// Recent output only. Lifecycle fields (status, pid, exit code, handle)
    /// change under `inner`; the drain task appends here without it, because
    /// `start` holds `inner` across the grace window and output must keep
    /// flowing meanwhile. Snapshots copy the tail after reading `inner`, so a
    /// snapshot may include lines newer than its status but never loses any.
    tail: Arc<std::sync::Mutex<LogTail>>,
}

impl Supervisor {
    /// Create an idle supervisor, ensuring the log directory exists.
    pub fn new(role: Role, settings: Arc<SupervisorSettings>) -> Result<Self, SupervisorError> {
        let dir = paths::logs_dir(&settings.root);
        std::fs::create_dir_all(&dir).map_err(|source| SupervisorError::LogDir {
            path: dir.clone(),
            source,
        })?;
        let log_path = paths::role_log_path(&settings.root, role.as_str());
        let tail = LogTail::new(settings.tail_capacity);
        Ok(Self {
            role,
            inner: Arc::new(Mutex::new(Inner {
                state: ProcessState::idle(role, log_path.clone()),
                handle: None,
                generation: 0,
            })),
            tail: Arc::new(std::sync::Mutex::new(tail)),
            log_path,
            settings,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub async fn status(&self) -> ProcessState {
        let inner = self.inner.lock().await;
        self.snapshot(&inner)
    }

    /// Address and token of the running process, once known.
    pub async fn coordinates(&self) -> Option<(String, Option<String>)> {
        let inner = self.inner.lock().await;
        if inner.state.status != ProcessStatus::Running {
            return None;
        }
        let address = inner.state.address.clone()?;
        Some((address, inner.state.token.clone()))
    }

    /// Launch the role's process and wait out the grace window.
    pub async fn start(&self, spec: LaunchSpec) -> Result<ProcessState, SupervisorError> {
        let mut inner = self.inner.lock().await;

        if let Some(handle) = &inner.handle {
            if handle.exited().is_none() {
                return Err(SupervisorError::AlreadyRunning {
                    role: self.role,
                    pid: handle.pid,
                });
            }
        }

        spec.validate()?;
        let plan = spec.plan(self.role, || launch::generate_token(TOKEN_LEN));

        inner.generation += 1;
        let generation = inner.generation;
        inner.handle = None;
        self.tail_lock().clear();
        inner.state = ProcessState {
            status: ProcessStatus::Starting,
            started_at: Some(Utc::now()),
            address: Some(plan.address.clone()),
            token: Some(plan.token.clone()),
            command: Some(plan.display.clone()),
            ..ProcessState::idle(self.role, self.log_path.clone())
        };

        let program = match locate::locate(&plan.program, &self.settings.root, &self.settings.search_path)
        {
            Ok(p) => p,
            Err(searched) => {
                let listed = searched
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let message = format!(
                    "{} executable '{}' not found (searched PATH, {listed})",
                    self.role, plan.program
                );
                return Err(self.fail(&mut inner, FailureKind::NotFound, message, None));
            }
        };

        let marker = format!("--- launching {} ---", plan.display);
        self.record(&marker);
        info!(role = %self.role, command = %plan.display, "starting process");

        let mut argv = vec![program.display().to_string()];
        argv.extend(plan.args.iter().cloned());
        let prepared = executor::prepare(&CommandSpec::new(argv), &self.settings.root);

        let (output, stdout, stderr) = match MergedOutput::new() {
            Ok(pipe) => pipe,
            Err(e) => {
                let message = format!("cannot create output pipe for {}: {e}", self.role);
                return Err(self.fail(&mut inner, FailureKind::Spawn, message, None));
            }
        };
        let child = match Command::new(&program)
            .args(&plan.args)
            .current_dir(&prepared.cwd)
            .env_clear()
            .envs(&prepared.env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                let message = format!("failed to spawn {}: {e}", program.display());
                return Err(self.fail(&mut inner, FailureKind::Spawn, message, None));
            }
        };

        let pid = child.id();
        inner.state.pid = pid;

        let drain = self.spawn_drain(output);
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, mut exit_rx) = watch::channel(None);
        inner.handle = Some(ChildHandle {
            pid,
            kill_tx: Some(kill_tx),
            exit_rx: exit_rx.clone(),
        });
        tokio::spawn(watch_exit(
            ExitWatch {
                role: self.role,
                generation,
                inner: Arc::clone(&self.inner),
                tail: Arc::clone(&self.tail),
                marker: marker.clone(),
            },
            child,
            kill_rx,
            drain,
            exit_tx,
        ));

        if let Some(code) = wait_exit(&mut exit_rx, self.settings.grace).await {
            let hint = last_output(&self.tail_lock(), &marker)
                .map(|l| format!(": {l}"))
                .unwrap_or_default();
            let message = format!(
                "{} exited during startup with code {code}{hint}",
                self.role
            );
            inner.handle = None;
            return Err(self.fail(&mut inner, FailureKind::EarlyExit, message, Some(code)));
        }

        inner.state.status = ProcessStatus::Running;
        info!(role = %self.role, pid = ?pid, "process running");
        Ok(self.snapshot(&inner))
    }

    /// Terminate the live process: SIGTERM, then a forced kill after the stop timeout.
    pub async fn stop(&self) -> Result<ProcessState, SupervisorError> {
        let mut inner = self.inner.lock().await;
        let Some(mut handle) = inner.handle.take() else {
            return Ok(self.snapshot(&inner));
        };

        let code = match handle.exited() {
            Some(code) => code,
            None => {
                if let Some(pid) = handle.pid {
                    send_sigterm(pid).await;
                }
                match wait_exit(&mut handle.exit_rx, self.settings.stop_timeout).await {
                    Some(code) => code,
                    None => {
                        warn!(role = %self.role, pid = ?handle.pid, "graceful stop timed out; killing");
                        if let Some(tx) = handle.kill_tx.take() {
                            let _ = tx.send(());
                        }
                        wait_exit(&mut handle.exit_rx, FORCE_KILL_WAIT)
                            .await
                            .unwrap_or(-1)
                    }
                }
            }
        };

        inner.state.status = ProcessStatus::Exited;
        inner.state.exit_code = Some(code);
        inner.state.exited_at = Some(Utc::now());
        inner.state.pid = None;
        self.record(&format!("--- stopped (exit code {code}) ---"));
        info!(role = %self.role, exit_code = code, "process stopped");
        Ok(self.snapshot(&inner))
    }

    fn fail(
        &self,
        inner: &mut Inner,
        kind: FailureKind,
        message: String,
        exit_code: Option<i32>,
    ) -> SupervisorError {
        warn!(role = %self.role, error = %message, "launch failed");
        self.record(&message);
        inner.state.status = ProcessStatus::Error;
        inner.state.error = Some(message.clone());
        inner.state.exit_code = exit_code;
        inner.state.pid = None;
        if exit_code.is_some() {
            inner.state.exited_at = Some(Utc::now());
        }
        SupervisorError::StartupFailed(Box::new(StartupFailure {
            kind,
            message,
            log_tail: self.tail_lock().lines(),
            log_path: self.log_path.clone(),
            exit_code,
        }))
    }

    fn spawn_drain(&self, output: MergedOutput) -> JoinHandle<()> {
        let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
        output.forward(line_tx);

        let tail = Arc::clone(&self.tail);
        let log_path = self.log_path.clone();
        let role = self.role;
        tokio::spawn(async move {
            let mut log_failed = false;
            while let Some(line) = line_rx.recv().await {
                debug!(role = %role, line = %line, "output");
                if let Err(e) = log::append_log_line(&log_path, &line) {
                    if !log_failed {
                        warn!(role = %role, path = %log_path.display(), error = %e, "log write failed");
                        log_failed = true;
                    }
                }
                lock_tail(&tail).push(line);
            }
        })
    }

    /// Supervisor-authored line: goes to the log file and the tail, like
    /// process output.
    fn record(&self, line: &str) {
        if let Err(e) = log::append_log_line(&self.log_path, line) {
            warn!(role = %self.role, error = %e, "log write failed");
        }
        self.tail_lock().push(line.to_string());
    }

    fn snapshot(&self, inner: &Inner) -> ProcessState {
        let mut state = inner.state.clone();
        state.log_tail = self.tail_lock().lines();
        state
    }

    fn tail_lock(&self) -> std::sync::MutexGuard<'_, LogTail> {
        lock_tail(&self.tail)
    }
}

fn lock_tail(tail: &std::sync::Mutex<LogTail>) -> std::sync::MutexGuard<'_, LogTail> {
    tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Exit watcher
// ---------------------------------------------------------------------------

struct ExitWatch {
    role: Role,
    generation: u64,
    inner: Arc<Mutex<Inner>>,
    tail: Arc<std::sync::Mutex<LogTail>>,
    marker: String,
}

/// Last line the process itself printed, skipping the launch marker.
fn last_output(tail: &LogTail, marker: &str) -> Option<String> {
    tail.last().filter(|l| *l != marker).map(str::to_string)
}

/// Owns the child until it exits, publishes the exit code, then records the
/// terminal state unless `start`/`stop` already took over.
async fn watch_exit(
    ctx: ExitWatch,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    drain: JoinHandle<()>,
    exit_tx: watch::Sender<Option<i32>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = kill_rx => {
            if let Err(e) = child.start_kill() {
                warn!(role = %ctx.role, error = %e, "kill failed");
            }
            child.wait().await
        }
    };
    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!(role = %ctx.role, error = %e, "wait failed");
            -1
        }
    };

    let _ = tokio::time::timeout(DRAIN_WAIT, drain).await;
    exit_tx.send_replace(Some(code));

    let mut inner = ctx.inner.lock().await;
    if inner.generation != ctx.generation || inner.handle.is_none() {
        return;
    }
    inner.handle = None;
    inner.state.pid = None;
    inner.state.exit_code = Some(code);
    inner.state.exited_at = Some(Utc::now());
    if code == 0 {
        info!(role = %ctx.role, "process exited");
        inner.state.status = ProcessStatus::Exited;
    } else {
        let last = last_output(&lock_tail(&ctx.tail), &ctx.marker);
        warn!(role = %ctx.role, exit_code = code, "process exited with error");
        inner.state.status = ProcessStatus::Error;
        inner.state.error =
            Some(last.unwrap_or_else(|| format!("{} exited with code {code}", ctx.role)));
    }
}

/// Wait up to `limit` for the exit code; `None` on timeout.
async fn wait_exit(rx: &mut watch::Receiver<Option<i32>>, limit: Duration) -> Option<i32> {
    match tokio::time::timeout(limit, rx.wait_for(Option::is_some)).await {
        Ok(Ok(code)) => *code,
        Ok(Err(_)) => Some(-1),
        Err(_) => None,
    }
}

/// Exit code, or 128 + signal number when the process was killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}

/// Send SIGTERM (`kill -TERM {pid}`).
async fn send_sigterm(pid: u32) {
    #[cfg(unix)]
    {
        match Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(s) if s.success() => {}
            Ok(s) => debug!(pid, code = ?s.code(), "kill -TERM returned non-zero"),
            Err(e) => warn!(pid, error = %e, "kill -TERM failed"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One supervisor per role.
pub struct Supervisors {
    node: Supervisor,
    wallet: Supervisor,
}

impl Supervisors {
    pub fn new(settings: SupervisorSettings) -> Result<Self, SupervisorError> {
        let settings = Arc::new(settings);
        Ok(Self {
            node: Supervisor::new(Role::Node, Arc::clone(&settings))?,
            wallet: Supervisor::new(Role::Wallet, settings)?,
        })
    }

    pub fn get(&self, role: Role) -> &Supervisor {
        match role {
            Role::Node => &self.node,
            Role::Wallet => &self.wallet,
        }
    }

    pub async fn all(&self) -> Vec<ProcessState> {
        let mut out = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            out.push(self.get(role).status().await);
        }
        out
    }

    /// Stop every live process: wallet first, then node.
    pub async fn shutdown(&self) {
        for role in [Role::Wallet, Role::Node] {
            if let Err(e) = self.get(role).stop().await {
                warn!(role = %role, error = %e, "stop during shutdown failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
