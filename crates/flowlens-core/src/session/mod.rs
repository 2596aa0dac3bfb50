//! Session actor
//!
//! A single tokio task owns the [`Workspace`] and applies one command per
//! turn, in arrival order. Callers talk to it through a cloneable
//! [`SessionHandle`]: commands are enqueued on the mailbox, changes are
//! broadcast on the [`ChangeBus`], and the latest [`Snapshot`] is published
//! on a watch channel after every turn.
//!
//! Network calls run in spawned tasks and report back on a separate
//! completion channel. Each carries the project it was issued under, so a
//! result that arrives after a project switch is discarded; the send guard is
//! released either way.

mod snapshot;
mod state;

pub use snapshot::Snapshot;
pub use state::Workspace;

use crate::aggregator::Termination;
use crate::bus::{ChangeBus, StateChange};
use crate::chat::{ChatBackend, ChatMessage, HistoryTicket, MessageStatus, OutgoingMessage, SendReceipt};
use crate::config::CoreConfig;
use crate::connection::ConnectionEvent;
use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::{Error, Result};
use crate::metrics::{StatusMetrics, StatusReport};
use crate::router::{Handler, Router};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

enum Command {
    Envelope(Envelope),
    Text(String),
    SetProject(Option<String>),
    SwitchWorkflow(Option<String>),
    Send {
        text: String,
        reply: oneshot::Sender<Result<String>>,
    },
    LoadHistory {
        workflow_id: String,
        reply: oneshot::Sender<bool>,
    },
    CancelWorkflow {
        reply: oneshot::Sender<Option<String>>,
    },
    ResetChat,
    Connection(ConnectionEvent),
    Register(EnvelopeKind, Handler),
    Unregister(EnvelopeKind),
    RestoreDefault(EnvelopeKind),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

enum Completion {
    Send {
        project_id: Option<String>,
        message_id: String,
        result: Result<SendReceipt>,
    },
    History {
        project_id: Option<String>,
        workflow_id: String,
        ticket: HistoryTicket,
        result: Result<Vec<ChatMessage>>,
    },
    Cancel {
        workflow_id: String,
        result: Result<()>,
    },
}

/// Posts a completion exactly once: the real result when `settle` is
/// called, otherwise a failure when the owning task ends early.
struct Settlement {
    tx: mpsc::UnboundedSender<Completion>,
    fallback: Option<Completion>,
}

impl Settlement {
    fn new(tx: mpsc::UnboundedSender<Completion>, fallback: Completion) -> Self {
        Self {
            tx,
            fallback: Some(fallback),
        }
    }

    fn settle(mut self, completion: Completion) {
        self.fallback = None;
        let _ = self.tx.send(completion);
    }
}

impl Drop for Settlement {
    fn drop(&mut self) {
        if let Some(completion) = self.fallback.take() {
            warn!("Network task ended without a result");
            let _ = self.tx.send(completion);
        }
    }
}

fn aborted() -> Error {
    Error::Backend("request ended without a result".to_string())
}

/// The session task
pub struct Session {
    workspace: Workspace,
    router: Router,
    backend: Arc<dyn ChatBackend>,
    bus: ChangeBus,
    commands: mpsc::Receiver<Command>,
    completions: mpsc::UnboundedReceiver<Completion>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    snapshot_tx: watch::Sender<Snapshot>,
    version: u64,
}

impl Session {
    /// Spawn a session task on the current runtime
    pub fn spawn(config: CoreConfig, backend: Arc<dyn ChatBackend>) -> SessionHandle {
        Self::spawn_with_router(config, backend, Router::new())
    }

    /// Spawn a session task with a preconfigured route table
    pub fn spawn_with_router(
        config: CoreConfig,
        backend: Arc<dyn ChatBackend>,
        router: Router,
    ) -> SessionHandle {
        let metrics = StatusMetrics::new();
        let workspace = Workspace::new(&config, metrics.clone());
        let bus = ChangeBus::new(config.bus_capacity);
        let (command_tx, commands) = mpsc::channel(config.mailbox_capacity.max(1));
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(workspace.snapshot(0));

        info!(backend = backend.name(), "Starting session");
        let session = Self {
            workspace,
            router,
            backend,
            bus: bus.clone(),
            commands,
            completions,
            completion_tx,
            snapshot_tx,
            version: 0,
        };
        tokio::spawn(session.run());

        SessionHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            bus,
            metrics,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    let keep_running = self.handle(command);
                    self.publish();
                    if !keep_running {
                        break;
                    }
                }
                Some(completion) = self.completions.recv() => {
                    self.complete(completion);
                    self.publish();
                }
            }
        }
        info!("Session stopped");
    }

    /// Apply one command. Requests are answered only after the snapshot
    /// reflecting them is published.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Envelope(envelope) => {
                self.router.dispatch(&mut self.workspace, &envelope);
            }
            Command::Text(text) => {
                self.router.dispatch_text(&mut self.workspace, &text);
            }
            Command::SetProject(project_id) => {
                self.workspace.set_current_project(project_id);
            }
            Command::SwitchWorkflow(workflow_id) => {
                self.workspace.switch_workflow(workflow_id);
            }
            Command::Send { text, reply } => {
                let result = self.begin_send(text);
                self.publish();
                let _ = reply.send(result);
            }
            Command::LoadHistory { workflow_id, reply } => {
                let started = self.begin_history_load(workflow_id);
                self.publish();
                let _ = reply.send(started);
            }
            Command::CancelWorkflow { reply } => {
                let cancelled = self.cancel_workflow();
                self.publish();
                let _ = reply.send(cancelled);
            }
            Command::ResetChat => self.workspace.reset_chat(),
            Command::Connection(event) => self.workspace.apply_connection_event(&event),
            Command::Register(kind, handler) => self.router.register(kind, handler),
            Command::Unregister(kind) => {
                self.router.unregister(kind);
            }
            Command::RestoreDefault(kind) => self.router.restore_default(kind),
            Command::Flush(reply) => {
                self.publish();
                let _ = reply.send(());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn begin_send(&mut self, text: String) -> Result<String> {
        if text.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        self.workspace.guard_mut().begin_send()?;

        let workflow_id = self
            .workspace
            .aggregator()
            .active_workflow()
            .map(ToString::to_string);
        if let Err(e) = self.workspace.start_chat(workflow_id.clone()) {
            self.workspace.guard_mut().finish_send();
            self.workspace.metrics().errors.inc();
            return Err(e);
        }
        self.workspace.record_guard();

        let message = ChatMessage::user(text).with_workflow(workflow_id.clone());
        let message_id = message.id.clone();
        let outgoing = OutgoingMessage {
            message_id: message_id.clone(),
            content: message.content.clone(),
            project_id: self.workspace.current_project().map(ToString::to_string),
            workflow_id,
        };
        self.workspace.push_message(message);

        let project_id = outgoing.project_id.clone();
        let settlement = Settlement::new(
            self.completion_tx.clone(),
            Completion::Send {
                project_id: project_id.clone(),
                message_id: message_id.clone(),
                result: Err(aborted()),
            },
        );
        let backend = Arc::clone(&self.backend);
        let id = message_id.clone();
        tokio::spawn(async move {
            let result = backend.send_message(outgoing).await;
            settlement.settle(Completion::Send {
                project_id,
                message_id: id,
                result,
            });
        });

        debug!(message_id = %message_id, "Message send started");
        Ok(message_id)
    }

    fn begin_history_load(&mut self, workflow_id: String) -> bool {
        let Some(ticket) = self.workspace.guard_mut().begin_history_load() else {
            return false;
        };
        self.workspace.record_guard();

        let project_id = self.workspace.current_project().map(ToString::to_string);
        let settlement = Settlement::new(
            self.completion_tx.clone(),
            Completion::History {
                project_id: project_id.clone(),
                workflow_id: workflow_id.clone(),
                ticket,
                result: Err(aborted()),
            },
        );
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let result = backend
                .load_history(project_id.as_deref(), &workflow_id)
                .await;
            settlement.settle(Completion::History {
                project_id,
                workflow_id,
                ticket,
                result,
            });
        });
        true
    }

    fn cancel_workflow(&mut self) -> Option<String> {
        let target = self
            .workspace
            .aggregator()
            .active_workflow()
            .or(self.workspace.chat().workflow_id())
            .map(ToString::to_string);
        let workflow_id =
            self.workspace
                .terminate(target.as_deref(), Termination::Cancelled, Utc::now())?;

        let project_id = self.workspace.current_project().map(ToString::to_string);
        let settlement = Settlement::new(
            self.completion_tx.clone(),
            Completion::Cancel {
                workflow_id: workflow_id.clone(),
                result: Err(aborted()),
            },
        );
        let backend = Arc::clone(&self.backend);
        let id = workflow_id.clone();
        tokio::spawn(async move {
            let result = backend.cancel_workflow(project_id.as_deref(), &id).await;
            settlement.settle(Completion::Cancel {
                workflow_id: id,
                result,
            });
        });

        info!(workflow_id = %workflow_id, "Workflow cancelled");
        Some(workflow_id)
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Send {
                project_id,
                message_id,
                result,
            } => {
                self.workspace.guard_mut().finish_send();
                self.workspace.record_guard();

                if project_id.as_deref() != self.workspace.current_project() {
                    debug!(message_id = %message_id, "Discarding send result from previous project");
                    return;
                }
                match result {
                    Ok(receipt) => {
                        self.workspace
                            .set_message_status(&message_id, MessageStatus::Sent);
                        if self.workspace.aggregator().active_workflow().is_none() {
                            self.workspace.switch_workflow(receipt.workflow_id);
                        }
                    }
                    Err(e) => {
                        self.workspace
                            .set_message_status(&message_id, MessageStatus::Failed);
                        self.workspace.apply_chat_error(e.to_string());
                    }
                }
            }
            Completion::History {
                project_id,
                workflow_id,
                ticket,
                result,
            } => {
                if project_id.as_deref() != self.workspace.current_project() {
                    debug!(workflow_id = %workflow_id, "Discarding history from previous project");
                    self.workspace.guard_mut().abandon_history(ticket);
                    self.workspace.record_guard();
                    return;
                }
                match result {
                    Ok(history) => {
                        if self.workspace.guard_mut().finish_history(ticket) {
                            self.workspace.replace_history(&workflow_id, history);
                            self.workspace.record_guard();
                        }
                    }
                    Err(e) => {
                        warn!(workflow_id = %workflow_id, error = %e, "History load failed");
                        self.workspace.metrics().errors.inc();
                        self.workspace.guard_mut().abandon_history(ticket);
                        self.workspace.record_guard();
                    }
                }
            }
            Completion::Cancel {
                workflow_id,
                result,
            } => {
                if let Err(e) = result {
                    warn!(workflow_id = %workflow_id, error = %e, "Server cancel request failed");
                }
            }
        }
    }

    fn publish(&mut self) {
        let changes = self.workspace.take_changes();
        if !changes.is_empty() {
            self.version += 1;
        }
        self.snapshot_tx
            .send_replace(self.workspace.snapshot(self.version));
        for change in changes {
            self.bus.publish(change);
        }
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    bus: ChangeBus,
    metrics: StatusMetrics,
}

impl SessionHandle {
    async fn enqueue(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(command(tx)).await?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Enqueue an inbound envelope
    pub async fn dispatch(&self, envelope: Envelope) -> Result<()> {
        self.enqueue(Command::Envelope(envelope)).await
    }

    /// Enqueue a raw text frame
    pub async fn ingest_text(&self, text: impl Into<String>) -> Result<()> {
        self.enqueue(Command::Text(text.into())).await
    }

    /// Change the project in focus
    pub async fn set_current_project(&self, project_id: Option<String>) -> Result<()> {
        self.enqueue(Command::SetProject(project_id)).await
    }

    /// Change the workflow used for attribution
    pub async fn switch_workflow(&self, workflow_id: Option<String>) -> Result<()> {
        self.enqueue(Command::SwitchWorkflow(workflow_id)).await
    }

    /// Send a chat message. Returns the local message id once the send has
    /// started; the outcome is reported through state changes.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<String> {
        let text = text.into();
        self.request(|reply| Command::Send { text, reply }).await?
    }

    /// Load the conversation of a workflow. Returns `false` when refused
    /// because a send is in flight.
    pub async fn load_history(&self, workflow_id: impl Into<String>) -> Result<bool> {
        let workflow_id = workflow_id.into();
        self.request(|reply| Command::LoadHistory { workflow_id, reply })
            .await
    }

    /// Cancel the active workflow. Returns the cancelled workflow, if any.
    pub async fn cancel_workflow(&self) -> Result<Option<String>> {
        self.request(|reply| Command::CancelWorkflow { reply }).await
    }

    /// Return the chat exchange to idle
    pub async fn reset_chat(&self) -> Result<()> {
        self.enqueue(Command::ResetChat).await
    }

    /// Report a transport lifecycle event
    pub async fn connection_event(&self, event: ConnectionEvent) -> Result<()> {
        self.enqueue(Command::Connection(event)).await
    }

    /// Override the route of a kind
    pub async fn register(&self, kind: EnvelopeKind, handler: Handler) -> Result<()> {
        self.enqueue(Command::Register(kind, handler)).await
    }

    /// Remove the route of a kind
    pub async fn unregister(&self, kind: EnvelopeKind) -> Result<()> {
        self.enqueue(Command::Unregister(kind)).await
    }

    /// Reinstate the built-in route of a kind
    pub async fn restore_default(&self, kind: EnvelopeKind) -> Result<()> {
        self.enqueue(Command::RestoreDefault(kind)).await
    }

    /// Wait until everything enqueued before this call has been applied
    pub async fn flush(&self) -> Result<()> {
        self.request(Command::Flush).await
    }

    /// Stop the session task and wait for it to exit
    pub async fn shutdown(&self) -> Result<()> {
        self.enqueue(Command::Shutdown).await?;
        self.commands.closed().await;
        Ok(())
    }

    /// Subscribe to state changes; drop the receiver to unsubscribe
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.bus.subscribe()
    }

    /// Latest published snapshot
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    #[must_use]
    pub fn watch_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for(&self, predicate: impl FnMut(&Snapshot) -> bool) -> Result<Snapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| Error::SessionClosed)?;
        Ok(snapshot.clone())
    }

    /// Current counters, read without a round trip
    #[must_use]
    pub fn status(&self) -> StatusReport {
        self.metrics.report()
    }

    /// Counters in Prometheus text format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        self.metrics.export_prometheus()
    }

    /// Whether the session task has stopped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
