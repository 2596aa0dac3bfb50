//! CLI command: `flowlens watch`
//!
//! Follows a live workflow and prints every state change until Ctrl-C or
//! until the connection gives up.

use super::{connect, ScopeArgs};
use crate::settings::AppConfig;
use anyhow::Result;
use flowlens_core::{Snapshot, StateChange};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Run the watch subcommand.
pub async fn run(
    config: &AppConfig,
    scope: ScopeArgs,
    ws_url: Option<String>,
    json: bool,
) -> Result<()> {
    let mut live = connect(config, &scope, ws_url).await?;
    let mut changes = live.handle.subscribe();
    info!("Watching; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            result = &mut live.socket => {
                match result {
                    Ok(Ok(())) => info!("Connection closed"),
                    Ok(Err(e)) => warn!(error = %e, "Connection gave up"),
                    Err(e) => warn!(error = %e, "Connection task failed"),
                }
                print_summary(&live.handle.snapshot());
                live.handle.shutdown().await?;
                return Ok(());
            }
            change = changes.recv() => match change {
                Ok(change) => print_change(&change, &live.handle.snapshot(), json)?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change stream lagged; showing current state");
                    print_summary(&live.handle.snapshot());
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    print_summary(&live.handle.snapshot());
    live.close().await
}

fn print_change(change: &StateChange, snapshot: &Snapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(change)?);
        return Ok(());
    }

    match change {
        StateChange::StepUpserted {
            workflow_id,
            step_id,
            inserted,
        } => {
            let step = snapshot.steps.iter().find(|s| &s.id == step_id);
            let title = step.map(|s| s.title.as_str()).unwrap_or_default();
            let verb = if *inserted { "+" } else { "~" };
            println!("  {} [{}] {} {}", verb, workflow_id, step_id, title);
        }
        StateChange::ProgressChanged { progress, .. } => {
            match (progress.current_step, progress.total_steps) {
                (Some(current), Some(total)) => {
                    println!("  progress {:.0}% ({}/{})", progress.progress, current, total)
                }
                _ => println!("  progress {:.0}%", progress.progress),
            }
        }
        StateChange::MessageAppended { message_id, role } => {
            if let Some(message) = snapshot.messages.iter().find(|m| &m.id == message_id) {
                println!("  {:?}: {}", role, message.content);
            }
        }
        StateChange::FollowUpsChanged { .. } => {
            for question in &snapshot.follow_up_questions {
                println!("  ? {}", question);
            }
        }
        other => println!("  {}", serde_json::to_string(other)?),
    }
    Ok(())
}

fn print_summary(snapshot: &Snapshot) {
    println!();
    println!("  Workflows");
    println!("  {}", "-".repeat(60));
    if snapshot.groups.is_empty() {
        println!("  (none)");
    }
    for group in &snapshot.groups {
        let state = match (group.is_active, group.termination) {
            (true, _) => "active".to_string(),
            (false, Some(termination)) => format!("{:?}", termination).to_lowercase(),
            (false, None) => "idle".to_string(),
        };
        println!(
            "  {:<24} {:>4} steps  {:>5.0}%  {}",
            group.workflow_id,
            group.steps.len(),
            group.progress,
            state
        );
    }
    println!("  {}", "-".repeat(60));
    let status = &snapshot.status;
    println!(
        "  messages {}  errors {}  unroutable {}  malformed {}  out-of-scope {}",
        status.messages_received,
        status.errors,
        status.unroutable,
        status.malformed,
        status.scope_dropped
    );
    println!();
}
