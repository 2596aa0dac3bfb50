//! CLI command: `flowlens replay`
//!
//! Feeds a recording (one envelope per line, `#` comments allowed) through
//! an offline session and prints the final snapshot.

use super::ScopeArgs;
use crate::settings::AppConfig;
use anyhow::{Context, Result};
use flowlens_core::{OfflineBackend, Session, SessionHandle};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

/// Run the replay subcommand.
pub async fn run(config: &AppConfig, path: &Path, scope: ScopeArgs, metrics: bool) -> Result<()> {
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let handle = Session::spawn(config.core.clone(), Arc::new(OfflineBackend));
    handle.set_current_project(scope.project_or(config)).await?;
    if let Some(workflow) = scope.workflow {
        handle.switch_workflow(Some(workflow)).await?;
    }

    let frames = feed(&handle, BufReader::new(file)).await?;
    handle.flush().await?;

    let snapshot = handle.snapshot();
    info!(
        frames,
        steps = snapshot.steps.len(),
        workflows = snapshot.groups.len(),
        errors = snapshot.status.errors,
        "Replay finished"
    );
    println!("{}", snapshot.to_json_pretty()?);
    if metrics {
        println!("{}", handle.export_prometheus());
    }

    handle.shutdown().await?;
    Ok(())
}

/// Enqueue every frame of a recording. Returns the number of frames fed.
pub async fn feed<R>(handle: &SessionHandle, reader: R) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut frames = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read recording")? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        handle.ingest_text(line).await?;
        frames += 1;
    }

    Ok(frames)
}
