//! CLI command: `flowlens send`
//!
//! Connects, sends one chat message and waits for the correlated answer.

use super::{connect, ScopeArgs};
use crate::settings::AppConfig;
use anyhow::{anyhow, bail, Context, Result};
use flowlens_core::{format_error_for_cli, ChatPhase, MessageStatus, Snapshot};
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

/// How long to wait for the socket before sending
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Run the send subcommand.
pub async fn run(config: &AppConfig, text: String, scope: ScopeArgs, timeout_secs: u64) -> Result<()> {
    let live = connect(config, &scope, None).await?;
    let outcome = exchange(&live.handle, text, Duration::from_secs(timeout_secs)).await;
    live.close().await?;

    let snapshot = outcome?;
    print_answer(&snapshot);
    Ok(())
}

async fn exchange(
    handle: &flowlens_core::SessionHandle,
    text: String,
    wait: Duration,
) -> Result<Snapshot> {
    timeout(CONNECT_TIMEOUT, handle.wait_for(|s| s.connection.is_connected()))
        .await
        .context("Timed out connecting to the server")??;

    let message_id = handle
        .send_message(text)
        .await
        .map_err(|e| anyhow!(format_error_for_cli(&e)))?;
    info!(message_id = %message_id, "Message sent, waiting for the answer");

    let snapshot = timeout(
        wait,
        handle.wait_for(|s| settled(s, &message_id).is_some()),
    )
    .await
    .with_context(|| format!("No answer within {}s", wait.as_secs()))??;

    match settled(&snapshot, &message_id) {
        Some(Ok(())) => Ok(snapshot),
        Some(Err(reason)) => bail!("Chat failed: {}", reason),
        None => bail!("Chat ended without an answer"),
    }
}

/// `Some` once the exchange for `message_id` is over
fn settled(snapshot: &Snapshot, message_id: &str) -> Option<std::result::Result<(), String>> {
    let failed = snapshot
        .messages
        .iter()
        .any(|m| m.id == message_id && m.status == MessageStatus::Failed);

    match snapshot.chat.phase {
        ChatPhase::Responded => Some(Ok(())),
        ChatPhase::Errored => Some(Err(snapshot
            .chat
            .error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string()))),
        _ if failed => Some(Err("message was not delivered".to_string())),
        _ => None,
    }
}

fn print_answer(snapshot: &Snapshot) {
    if let Some(response) = &snapshot.chat.last_response {
        println!("{}", response.content);
    }
    if !snapshot.follow_up_questions.is_empty() {
        println!();
        for question in &snapshot.follow_up_questions {
            println!("  ? {}", question);
        }
    }
}
