use crate::event::{rounded_secs, EventRecord, ExecutionEvent};
use crate::types::{CommandSpec, CommandStatus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::io::PipeReader;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Command preparation
// ---------------------------------------------------------------------------

/// Fully resolved invocation: argv, working directory and complete environment.
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

/// Per-user toolchain directories prepended to `PATH` when they exist.
pub fn toolchain_dirs() -> Vec<PathBuf> {
    match home::home_dir() {
        Some(home) => vec![
            home.join(".cargo").join("bin"),
            home.join(".local").join("go").join("bin"),
        ],
        None => Vec::new(),
    }
}

/// Resolve argv, cwd (default: `root`) and env (current env, toolchain PATH
/// augmentation, then the command's own overrides, which win).
pub fn prepare(cmd: &CommandSpec, root: &Path) -> PreparedCommand {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    for dir in toolchain_dirs().iter().rev() {
        prepend_path(&mut env, dir);
    }
    for (k, v) in &cmd.env {
        env.insert(k.clone(), v.clone());
    }

    PreparedCommand {
        argv: cmd.argv.clone(),
        cwd: cmd.cwd.clone().unwrap_or_else(|| root.to_path_buf()),
        env,
    }
}

fn prepend_path(env: &mut HashMap<String, String>, dir: &Path) {
    if !dir.exists() {
        return;
    }
    let current = env.get("PATH").cloned().unwrap_or_default();
    let mut parts: Vec<PathBuf> = if current.is_empty() {
        Vec::new()
    } else {
        std::env::split_paths(&current).collect()
    };
    if parts.iter().any(|p| p == dir) {
        return;
    }
    parts.insert(0, dir.to_path_buf());
    if let Ok(joined) = std::env::join_paths(parts) {
        env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Result of running one command to completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub elapsed: Duration,
}

impl CommandOutcome {
    pub fn status(&self) -> CommandStatus {
        CommandStatus::from_exit_code(self.exit_code)
    }
}

/// Run one command of action `slug` to completion, streaming
/// `command_start`, one `command_output` per merged stdout/stderr line, and
/// exactly one `command_end` into `tx`.
///
/// The child is always waited on. A closed `tx` (the consumer went away)
/// does not stop the command: output keeps being drained until exit.
pub async fn execute(
    slug: &str,
    index: usize,
    cmd: &CommandSpec,
    root: &Path,
    tx: &mpsc::Sender<EventRecord>,
) -> CommandOutcome {
    let prepared = prepare(cmd, root);
    let started = Instant::now();

    emit(
        tx,
        ExecutionEvent::CommandStart {
            slug: slug.to_string(),
            command_index: index,
            command: cmd.render(root),
            argv: prepared.argv.clone(),
            cwd: prepared.cwd.display().to_string(),
        },
    )
    .await;

    let exit_code = match run_prepared(slug, index, &prepared, tx).await {
        Ok(code) => code,
        Err(message) => {
            warn!(slug, index, %message, "command could not be started");
            emit(
                tx,
                ExecutionEvent::CommandOutput {
                    slug: slug.to_string(),
                    command_index: index,
                    line: message,
                },
            )
            .await;
            -1
        }
    };

    let elapsed = started.elapsed();
    let outcome = CommandOutcome { exit_code, elapsed };
    emit(
        tx,
        ExecutionEvent::CommandEnd {
            slug: slug.to_string(),
            command_index: index,
            status: outcome.status(),
            exit_code,
            duration: rounded_secs(elapsed),
        },
    )
    .await;

    debug!(slug, index, exit_code, ?elapsed, "command finished");
    outcome
}

async fn run_prepared(
    slug: &str,
    index: usize,
    prepared: &PreparedCommand,
    tx: &mpsc::Sender<EventRecord>,
) -> Result<i32, String> {
    let Some((program, args)) = prepared.argv.split_first() else {
        return Err("empty command line".to_string());
    };

    let (output, stdout, stderr) =
        MergedOutput::new().map_err(|e| format!("failed to create output pipe: {e}"))?;
    let mut child = Command::new(program)
        .args(args)
        .current_dir(&prepared.cwd)
        .env_clear()
        .envs(&prepared.env)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .map_err(|e| format!("failed to spawn '{program}': {e}"))?;

    let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
    output.forward(line_tx);

    while let Some(line) = line_rx.recv().await {
        emit(
            tx,
            ExecutionEvent::CommandOutput {
                slug: slug.to_string(),
                command_index: index,
                line,
            },
        )
        .await;
    }

    match child.wait().await {
        Ok(status) => Ok(status.code().unwrap_or(-1)),
        Err(e) => {
            warn!(slug, index, error = %e, "wait failed");
            Ok(-1)
        }
    }
}

/// One pipe shared by a child's stdout and stderr.
///
/// Both descriptors refer to the same kernel buffer, so lines come out in
/// the order the child wrote them regardless of which stream they used.
pub struct MergedOutput {
    reader: PipeReader,
}

impl MergedOutput {
    /// The read half plus the `Stdio` handles for the child's stdout and
    /// stderr. The parent's copies of the write end live inside the
    /// `Command` and close when it is dropped after spawning.
    pub fn new() -> std::io::Result<(Self, Stdio, Stdio)> {
        let (reader, writer) = std::io::pipe()?;
        let err = writer.try_clone()?;
        Ok((Self { reader }, Stdio::from(writer), Stdio::from(err)))
    }

    /// Forward every line into `tx` until the last writer closes.
    #[cfg(unix)]
    pub fn forward(self, tx: mpsc::Sender<String>) -> JoinHandle<()> {
        use std::os::fd::OwnedFd;
        use tokio::net::unix::pipe;

        tokio::spawn(async move {
            match pipe::Receiver::from_owned_fd(OwnedFd::from(self.reader)) {
                Ok(rx) => forward_lines(rx, tx).await,
                Err(e) => warn!(error = %e, "cannot read child output"),
            }
        })
    }

    #[cfg(not(unix))]
    pub fn forward(self, tx: mpsc::Sender<String>) -> JoinHandle<()> {
        use std::io::BufRead;

        tokio::task::spawn_blocking(move || {
            let mut reader = std::io::BufReader::new(self.reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.blocking_send(trimmed_line(&mut buf)).is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

fn trimmed_line(buf: &mut Vec<u8>) -> String {
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    String::from_utf8_lossy(buf).into_owned()
}

/// Read `reader` line by line (lossy UTF-8, trailing `\r\n` stripped) into `tx`.
pub async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if tx.send(trimmed_line(&mut buf)).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn emit(tx: &mpsc::Sender<EventRecord>, event: ExecutionEvent) {
    // A closed receiver means the consumer disconnected; keep going.
    let _ = tx.send(EventRecord::now(event)).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn run(cmd: CommandSpec, root: &Path) -> (CommandOutcome, Vec<ExecutionEvent>) {
        let (tx, mut rx) = mpsc::channel(1024);
        let outcome = execute("t", 0, &cmd, root, &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(rec) = rx.recv().await {
            events.push(rec.event);
        }
        (outcome, events)
    }

    fn output_lines(events: &[ExecutionEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::CommandOutput { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn success_emits_start_output_end() {
        let dir = TempDir::new().unwrap();
        let (outcome, events) = run(CommandSpec::new(["sh", "-c", "echo ok"]), dir.path()).await;
        assert_eq!(outcome.exit_code, 0);
        assert!(matches!(events.first(), Some(ExecutionEvent::CommandStart { .. })));
        assert_eq!(output_lines(&events), vec!["ok"]);
        match events.last() {
            Some(ExecutionEvent::CommandEnd {
                status, exit_code, ..
            }) => {
                assert_eq!(*status, CommandStatus::Success);
                assert_eq!(*exit_code, 0);
            }
            other => panic!("expected CommandEnd, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_is_error() {
        let dir = TempDir::new().unwrap();
        let (outcome, events) = run(CommandSpec::new(["sh", "-c", "exit 3"]), dir.path()).await;
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.status(), CommandStatus::Error);
        let ends = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::CommandEnd { .. }))
            .count();
        assert_eq!(ends, 1);
    }

    #[tokio::test]
    async fn stderr_is_merged() {
        let dir = TempDir::new().unwrap();
        let (_, events) = run(
            CommandSpec::new(["sh", "-c", "echo out; echo err >&2"]),
            dir.path(),
        )
        .await;
        let lines = output_lines(&events);
        assert!(lines.contains(&"out".to_string()), "{lines:?}");
        assert!(lines.contains(&"err".to_string()), "{lines:?}");
    }

    #[tokio::test]
    async fn interleaved_stdout_and_stderr_keep_write_order() {
        let dir = TempDir::new().unwrap();
        let script = "for i in 1 2 3 4 5 6 7 8 9 10; do echo o$i; echo e$i >&2; done";
        let expected: Vec<String> = (1..=10)
            .flat_map(|i| [format!("o{i}"), format!("e{i}")])
            .collect();
        for _ in 0..10 {
            let (_, events) = run(CommandSpec::new(["sh", "-c", script]), dir.path()).await;
            assert_eq!(output_lines(&events), expected);
        }
    }

    #[tokio::test]
    async fn cwd_defaults_to_root_and_env_overrides_win() {
        let dir = TempDir::new().unwrap();
        let cmd = CommandSpec::new(["sh", "-c", "pwd; echo $OPSDECK_TEST_VAR"])
            .with_env("OPSDECK_TEST_VAR", "override");
        let (_, events) = run(cmd, dir.path()).await;
        let lines = output_lines(&events);
        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(
            Path::new(&lines[0]).canonicalize().unwrap(),
            canonical,
            "{lines:?}"
        );
        assert_eq!(lines[1], "override");
    }

    #[tokio::test]
    async fn spawn_failure_reports_error_end() {
        let dir = TempDir::new().unwrap();
        let (outcome, events) = run(
            CommandSpec::new(["__opsdeck_missing_binary__"]),
            dir.path(),
        )
        .await;
        assert_eq!(outcome.exit_code, -1);
        let lines = output_lines(&events);
        assert!(lines[0].contains("__opsdeck_missing_binary__"));
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::CommandEnd {
                status: CommandStatus::Error,
                exit_code: -1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn output_arrives_before_exit() {
        let dir = TempDir::new().unwrap();
        let cmd = CommandSpec::new(["sh", "-c", "echo first; sleep 1; echo second"]);
        let (tx, mut rx) = mpsc::channel(64);
        let root = dir.path().to_path_buf();
        let handle = tokio::spawn(async move { execute("t", 0, &cmd, &root, &tx).await });

        // command_start, then "first" well before the command exits
        let start = rx.recv().await.unwrap();
        assert!(matches!(start.event, ExecutionEvent::CommandStart { .. }));
        let first = tokio::time::timeout(Duration::from_millis(800), rx.recv())
            .await
            .expect("partial output should stream")
            .unwrap();
        assert!(matches!(first.event, ExecutionEvent::CommandOutput { ref line, .. } if line == "first"));
        assert!(!handle.is_finished());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn closed_receiver_still_waits_for_exit() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("done");
        let script = format!("echo a; echo b; touch {}", marker.display());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let outcome = execute("t", 0, &CommandSpec::new(["sh", "-c", &script]), dir.path(), &tx).await;
        assert_eq!(outcome.exit_code, 0);
        assert!(marker.exists());
    }

    #[test]
    fn prepend_path_skips_duplicates_and_missing() {
        let dir = TempDir::new().unwrap();
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        prepend_path(&mut env, dir.path());
        prepend_path(&mut env, dir.path());
        prepend_path(&mut env, Path::new("/definitely/not/here"));
        let parts: Vec<PathBuf> = std::env::split_paths(&env["PATH"]).collect();
        assert_eq!(parts, vec![dir.path().to_path_buf(), PathBuf::from("/usr/bin")]);
    }

    #[test]
    fn prepare_defaults_cwd_to_root() {
        let cmd = CommandSpec::new(["make"]);
        let prepared = prepare(&cmd, Path::new("/repo"));
        assert_eq!(prepared.cwd, PathBuf::from("/repo"));
        let cmd = cmd.in_dir("/elsewhere");
        assert_eq!(prepare(&cmd, Path::new("/repo")).cwd, PathBuf::from("/elsewhere"));
    }
}
