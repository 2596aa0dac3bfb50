//! CLI module for flowlens
//!
//! Provides commands:
//! - `watch`: follow a live workflow and log state changes
//! - `replay`: feed recorded events through an offline session
//! - `send`: send one chat message and print the answer
//! - `status`: show the resolved configuration

use crate::settings::{load_config, AppConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flowlens_core::{Session, SessionHandle};
use flowlens_transport::{ConnectionManager, HttpChatBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub mod replay;
pub mod send;
pub mod status;
pub mod watch;

/// Live workflow and chat view for multi-agent AI runs
#[derive(Parser, Debug)]
#[command(name = "flowlens")]
#[command(about = "Live workflow and chat view for multi-agent AI runs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Scope shared by the session commands
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Project to focus on (overrides `project_id` in config)
    #[arg(short, long)]
    pub project: Option<String>,
    /// Workflow to attribute unlabelled steps to
    #[arg(short, long)]
    pub workflow: Option<String>,
}

impl ScopeArgs {
    /// Project from the flag, else from config
    pub fn project_or(&self, config: &AppConfig) -> Option<String> {
        self.project
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| config.project())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and log state changes until Ctrl-C
    Watch {
        #[command(flatten)]
        scope: ScopeArgs,
        /// WebSocket URL (overrides config)
        #[arg(long)]
        url: Option<String>,
        /// Print changes as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Replay recorded envelopes (one JSON object per line) offline
    Replay {
        /// Recording to replay
        file: PathBuf,
        #[command(flatten)]
        scope: ScopeArgs,
        /// Print counters in Prometheus format after the snapshot
        #[arg(long)]
        metrics: bool,
    },
    /// Send a chat message and wait for the answer
    Send {
        /// Message text
        text: String,
        #[command(flatten)]
        scope: ScopeArgs,
        /// Seconds to wait for the answer
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Show the resolved configuration
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// A session wired to the server, plus the socket that feeds it
pub struct LiveSession {
    pub handle: SessionHandle,
    pub cancel: CancellationToken,
    pub socket: JoinHandle<flowlens_transport::Result<()>>,
}

/// Start a session against the configured server and connect its socket
pub async fn connect(
    config: &AppConfig,
    scope: &ScopeArgs,
    ws_url: Option<String>,
) -> Result<LiveSession> {
    let mut transport = config.transport();
    if let Some(url) = ws_url {
        transport = transport.with_ws_url(url);
    }

    let backend = HttpChatBackend::new(transport.clone()).context("Failed to build HTTP client")?;
    let handle = Session::spawn(config.core.clone(), Arc::new(backend));

    let project = scope.project_or(config);
    handle.set_current_project(project.clone()).await?;
    if let Some(workflow) = scope.workflow.clone() {
        handle.switch_workflow(Some(workflow)).await?;
    }

    let manager = ConnectionManager::new(transport, handle.clone()).with_project(project);
    let cancel = manager.cancel_token();
    let socket = manager.spawn();

    Ok(LiveSession {
        handle,
        cancel,
        socket,
    })
}

impl LiveSession {
    /// Stop the socket and the session
    pub async fn close(self) -> Result<()> {
        self.cancel.cancel();
        match self.socket.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Connection ended with an error"),
            Err(e) => warn!(error = %e, "Connection task failed"),
        }
        self.handle.shutdown().await?;
        Ok(())
    }
}

/// Run the CLI command
pub async fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config()?;
    match command {
        Commands::Watch { scope, url, json } => watch::run(&config, scope, url, json).await,
        Commands::Replay {
            file,
            scope,
            metrics,
        } => replay::run(&config, &file, scope, metrics).await,
        Commands::Send {
            text,
            scope,
            timeout_secs,
        } => send::run(&config, text, scope, timeout_secs).await,
        Commands::Status { json } => status::run(&config, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send_with_scope() {
        let cli = Cli::try_parse_from([
            "flowlens",
            "send",
            "hello there",
            "--project",
            "p1",
            "-w",
            "w2",
            "--timeout-secs",
            "5",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Send {
                text,
                scope,
                timeout_secs,
            }) => {
                assert_eq!(text, "hello there");
                assert_eq!(scope.project.as_deref(), Some("p1"));
                assert_eq!(scope.workflow.as_deref(), Some("w2"));
                assert_eq!(timeout_secs, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_replay() {
        let cli = Cli::try_parse_from(["flowlens", "replay", "run.jsonl", "--metrics"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Replay { metrics: true, .. })
        ));
    }
}
