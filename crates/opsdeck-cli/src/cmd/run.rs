use futures::StreamExt;
use opsdeck_core::{run_action, Action, CommandStatus, EventRecord, ExecutionEvent};
use std::io::Write;
use std::path::Path;

pub fn run(root: &Path, slug: &str, json: bool) -> anyhow::Result<()> {
    let (_, catalog) = super::load_catalog(root)?;
    let action = catalog.lookup(slug)?.clone();

    let rt = tokio::runtime::Runtime::new()?;
    let failure = rt.block_on(stream_action(&action, root, json))?;

    match failure {
        None => Ok(()),
        Some((index, exit_code)) => anyhow::bail!(
            "action '{slug}' failed: command {} exited with code {exit_code}",
            index + 1
        ),
    }
}

/// Print every event; returns the failing command's index and exit code, if any.
async fn stream_action(
    action: &Action,
    root: &Path,
    json: bool,
) -> anyhow::Result<Option<(usize, i32)>> {
    let mut stream = run_action(action.clone(), root);
    let mut failure = None;
    let stdout = std::io::stdout();

    while let Some(record) = stream.next().await {
        let mut out = stdout.lock();
        if json {
            out.write_all(record.to_ndjson_line()?.as_bytes())?;
        } else {
            render(&mut out, action, &record)?;
        }
        out.flush()?;

        if let ExecutionEvent::ActionError {
            command_index,
            exit_code,
            ..
        } = record.event
        {
            failure = Some((command_index, exit_code));
        }
    }
    Ok(failure)
}

fn render(out: &mut impl Write, action: &Action, record: &EventRecord) -> std::io::Result<()> {
    match &record.event {
        ExecutionEvent::ActionStart { title, slug, description, .. } => {
            writeln!(out, "\n=== {title} ({slug}) ===")?;
            writeln!(out, "{description}")?;
            if let Some(notes) = &action.notes {
                writeln!(out, "Notes: {notes}")?;
            }
        }
        ExecutionEvent::CommandStart { command, .. } => writeln!(out, "\n→ {command}")?,
        ExecutionEvent::CommandOutput { line, .. } => writeln!(out, "{line}")?,
        ExecutionEvent::CommandEnd { exit_code, status, .. } => {
            if *status == CommandStatus::Error {
                writeln!(out, "\nCommand failed with exit code {exit_code}")?;
            }
        }
        ExecutionEvent::ActionComplete { slug, duration } => {
            writeln!(out, "\nCompleted '{slug}' in {duration:.2}s")?;
        }
        ExecutionEvent::ActionError { .. } => writeln!(out, "Action aborted due to failure.")?,
    }
    Ok(())
}
