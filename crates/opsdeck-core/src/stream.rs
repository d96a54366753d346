use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::event::{rounded_secs, EventRecord, ExecutionEvent};
use crate::executor;
use crate::types::{Action, CommandStatus};

// ─── ActionStream ─────────────────────────────────────────────────────────

/// An async stream of [`EventRecord`]s for one run of an action.
///
/// Backed by a Tokio mpsc channel. A background task runs the action's
/// commands one after another and stops at the first failure. The stream
/// ends after `action_complete` or `action_error`.
///
/// Dropping the stream does not cancel the run: the command in flight is
/// drained and waited on, and no further commands are started.
pub struct ActionStream {
    rx: mpsc::Receiver<EventRecord>,
}

impl ActionStream {
    pub(crate) fn new(action: Action, root: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(drive(action, root, tx));
        ActionStream { rx }
    }
}

impl Stream for ActionStream {
    type Item = EventRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start running `action` with `root` as the default working directory.
pub fn run_action(action: Action, root: impl Into<PathBuf>) -> ActionStream {
    ActionStream::new(action, root.into())
}

async fn drive(action: Action, root: PathBuf, tx: mpsc::Sender<EventRecord>) {
    let started = Instant::now();
    let slug = action.slug.clone();
    info!(slug = %slug, commands = action.commands.len(), "action started");

    let _ = tx
        .send(EventRecord::now(ExecutionEvent::ActionStart {
            slug: slug.clone(),
            title: action.title.clone(),
            description: action.description.clone(),
            command_count: action.commands.len(),
        }))
        .await;

    for (index, cmd) in action.commands.iter().enumerate() {
        let outcome = executor::execute(&slug, index, cmd, &root, &tx).await;
        if outcome.status() == CommandStatus::Error {
            warn!(slug = %slug, index, exit_code = outcome.exit_code, "action aborted");
            let _ = tx
                .send(EventRecord::now(ExecutionEvent::ActionError {
                    slug,
                    command_index: index,
                    exit_code: outcome.exit_code,
                    duration: rounded_secs(started.elapsed()),
                }))
                .await;
            return;
        }
        if tx.is_closed() {
            info!(slug = %slug, index, "consumer gone; not starting remaining commands");
            return;
        }
    }

    info!(slug = %slug, elapsed = ?started.elapsed(), "action completed");
    let _ = tx
        .send(EventRecord::now(ExecutionEvent::ActionComplete {
            slug,
            duration: rounded_secs(started.elapsed()),
        }))
        .await;
}

// ─── Tests ────────────────────────────────────────────────────────────────
