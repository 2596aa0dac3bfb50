//! Inbound message envelopes
//!
//! Every frame pushed by the server is decoded into an [`Envelope`]: the
//! fields common to all events plus a typed [`EnvelopeBody`]. Decoding goes
//! through a permissive wire shape first so that unknown kinds and missing
//! payloads can be reported precisely instead of as generic parse errors.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Discriminant of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Generic workflow update (optional step and/or progress)
    WorkflowUpdate,
    /// A single step report
    WorkflowStep,
    /// Progress counters only
    ProgressUpdate,
    /// The server started processing a chat request
    ChatStarted,
    /// The chat response is available
    ChatCompleted,
    /// The chat request failed
    ChatError,
    /// Workflow finished
    WorkflowCompleted,
    /// Workflow was cancelled
    WorkflowCancelled,
    /// Workflow view should be cleared
    WorkflowCleared,
    /// Suggested follow-up questions
    FollowUpQuestions,
    /// Server keepalive
    Heartbeat,
    /// Reply to a client ping
    Pong,
    /// Generic server error
    Error,
}

impl EnvelopeKind {
    /// Every kind, in declaration order.
    pub const ALL: [EnvelopeKind; 13] = [
        Self::WorkflowUpdate,
        Self::WorkflowStep,
        Self::ProgressUpdate,
        Self::ChatStarted,
        Self::ChatCompleted,
        Self::ChatError,
        Self::WorkflowCompleted,
        Self::WorkflowCancelled,
        Self::WorkflowCleared,
        Self::FollowUpQuestions,
        Self::Heartbeat,
        Self::Pong,
        Self::Error,
    ];

    /// Wire name of the kind
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowUpdate => "workflow_update",
            Self::WorkflowStep => "workflow_step",
            Self::ProgressUpdate => "progress_update",
            Self::ChatStarted => "chat_started",
            Self::ChatCompleted => "chat_completed",
            Self::ChatError => "chat_error",
            Self::WorkflowCompleted => "workflow_completed",
            Self::WorkflowCancelled => "workflow_cancelled",
            Self::WorkflowCleared => "workflow_cleared",
            Self::FollowUpQuestions => "follow_up_questions",
            Self::Heartbeat => "heartbeat",
            Self::Pong => "pong",
            Self::Error => "error",
        }
    }

    /// Parse a wire name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic type of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// An agent was started
    AgentStart,
    /// An agent is executing
    AgentExecution,
    /// A tool was invoked
    ToolCall,
    /// Results are being combined
    Synthesis,
    /// The workflow reported completion
    Complete,
    /// Any kind this client does not know
    #[default]
    #[serde(other)]
    Unknown,
}

impl StepKind {
    /// Whether this step signals the end of its workflow
    #[must_use]
    pub fn is_completion(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// One unit of agent activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Globally unique step identifier
    pub id: String,
    /// Owning workflow (resolved on aggregation when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Ordering hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    /// Semantic type
    #[serde(default, alias = "type")]
    pub kind: StepKind,
    /// Short title
    #[serde(default)]
    pub title: String,
    /// Longer description
    #[serde(default)]
    pub description: String,
    /// Tool results, visualizations, token counts, ...
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// When the step happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Step {
    /// Create a step with the given id and kind
    #[must_use]
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            workflow_id: None,
            step_number: None,
            kind,
            title: String::new(),
            description: String::new(),
            metadata: Map::new(),
            timestamp: None,
        }
    }

    /// Set the owning workflow
    #[must_use]
    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Set the step number
    #[must_use]
    pub fn with_number(mut self, step_number: u32) -> Self {
        self.step_number = Some(step_number);
        self
    }

    /// Set the title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the timestamp
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Chat response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Server-assigned response id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Workflow the response belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Response text
    #[serde(default, alias = "message")]
    pub content: String,
    /// When the response was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Extra payload (sources, visualizations, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ChatResponse {
    /// Create a response with the given content
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            workflow_id: None,
            content: content.into(),
            timestamp: None,
            metadata: Map::new(),
        }
    }

    /// Set the response id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the workflow id
    #[must_use]
    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }
}

/// Partial progress update; absent fields leave the current value unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressDelta {
    /// Percentage (0-100)
    pub progress: Option<f64>,
    /// Index of the current step
    pub current_step: Option<u32>,
    /// Total number of steps
    pub total_steps: Option<u32>,
}

impl ProgressDelta {
    /// Whether no field is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.progress.is_none() && self.current_step.is_none() && self.total_steps.is_none()
    }
}

/// Kind-specific payload of an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    /// Generic workflow update
    WorkflowUpdate {
        /// Optional step carried by the update
        step: Option<Step>,
        /// Optional progress fields
        progress: ProgressDelta,
    },
    /// Step report
    WorkflowStep {
        /// The step
        step: Step,
    },
    /// Progress counters
    ProgressUpdate(ProgressDelta),
    /// Chat request accepted by the server
    ChatStarted,
    /// Chat response
    ChatCompleted {
        /// The response
        response: ChatResponse,
    },
    /// Chat failure
    ChatError {
        /// Error text
        error: String,
    },
    /// Workflow finished
    WorkflowCompleted,
    /// Workflow cancelled
    WorkflowCancelled,
    /// Clear the workflow view
    WorkflowCleared,
    /// Suggested follow-ups
    FollowUpQuestions {
        /// Question texts
        questions: Vec<String>,
    },
    /// Keepalive
    Heartbeat,
    /// Ping reply
    Pong,
    /// Server error
    Error {
        /// Error text
        error: String,
    },
}

impl EnvelopeBody {
    /// Discriminant of this body
    #[must_use]
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::WorkflowUpdate { .. } => EnvelopeKind::WorkflowUpdate,
            Self::WorkflowStep { .. } => EnvelopeKind::WorkflowStep,
            Self::ProgressUpdate(_) => EnvelopeKind::ProgressUpdate,
            Self::ChatStarted => EnvelopeKind::ChatStarted,
            Self::ChatCompleted { .. } => EnvelopeKind::ChatCompleted,
            Self::ChatError { .. } => EnvelopeKind::ChatError,
            Self::WorkflowCompleted => EnvelopeKind::WorkflowCompleted,
            Self::WorkflowCancelled => EnvelopeKind::WorkflowCancelled,
            Self::WorkflowCleared => EnvelopeKind::WorkflowCleared,
            Self::FollowUpQuestions { .. } => EnvelopeKind::FollowUpQuestions,
            Self::Heartbeat => EnvelopeKind::Heartbeat,
            Self::Pong => EnvelopeKind::Pong,
            Self::Error { .. } => EnvelopeKind::Error,
        }
    }

    /// Workflow named inside the payload, if any
    #[must_use]
    pub fn workflow_id(&self) -> Option<&str> {
        match self {
            Self::WorkflowUpdate { step: Some(step), .. } | Self::WorkflowStep { step } => {
                step.workflow_id.as_deref()
            }
            Self::ChatCompleted { response } => response.workflow_id.as_deref(),
            _ => None,
        }
    }
}

/// One discrete real-time event received from the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub struct Envelope {
    /// When the server emitted the event
    pub timestamp: DateTime<Utc>,
    /// Workflow the event refers to
    pub workflow_id: Option<String>,
    /// Project the event belongs to
    pub project_id: Option<String>,
    /// Kind-specific payload
    pub body: EnvelopeBody,
}

impl Envelope {
    /// Create an envelope stamped with the current time
    #[must_use]
    pub fn new(body: EnvelopeBody) -> Self {
        Self {
            timestamp: Utc::now(),
            workflow_id: None,
            project_id: None,
            body,
        }
    }

    /// Shorthand for a `workflow_step` envelope
    #[must_use]
    pub fn step(step: Step) -> Self {
        let workflow_id = step.workflow_id.clone();
        Self {
            workflow_id,
            ..Self::new(EnvelopeBody::WorkflowStep { step })
        }
    }

    /// Set the workflow id
    #[must_use]
    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Set the project id
    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Set the timestamp
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Discriminant of this envelope
    #[must_use]
    pub fn kind(&self) -> EnvelopeKind {
        self.body.kind()
    }

    /// Decode a text frame.
    ///
    /// Unknown kinds yield [`Error::Unroutable`]; anything that is not a
    /// well-formed envelope yields [`Error::Malformed`] or
    /// [`Error::MissingField`].
    pub fn from_json(text: &str) -> Result<Self> {
        let wire: WireEnvelope =
            serde_json::from_str(text).map_err(|e| Error::Malformed(e.to_string()))?;
        Self::try_from(wire)
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Flat wire shape shared by all kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(alias = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<ChatResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    follow_up_questions: Option<Vec<String>>,
}

impl WireEnvelope {
    fn set_delta(&mut self, delta: ProgressDelta) {
        self.progress = delta.progress;
        self.current_step = delta.current_step;
        self.total_steps = delta.total_steps;
    }

    fn delta(&self) -> ProgressDelta {
        ProgressDelta {
            progress: self.progress,
            current_step: self.current_step,
            total_steps: self.total_steps,
        }
    }
}

fn required<T>(value: Option<T>, kind: EnvelopeKind, field: &'static str) -> Result<T> {
    value.ok_or(Error::MissingField { kind, field })
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = Error;

    fn try_from(wire: WireEnvelope) -> Result<Self> {
        let kind = EnvelopeKind::parse(&wire.kind).ok_or_else(|| Error::Unroutable {
            kind: wire.kind.clone(),
        })?;
        let delta = wire.delta();

        let body = match kind {
            EnvelopeKind::WorkflowUpdate => EnvelopeBody::WorkflowUpdate {
                step: wire.step,
                progress: delta,
            },
            EnvelopeKind::WorkflowStep => EnvelopeBody::WorkflowStep {
                step: required(wire.step, kind, "step")?,
            },
            EnvelopeKind::ProgressUpdate => EnvelopeBody::ProgressUpdate(delta),
            EnvelopeKind::ChatStarted => EnvelopeBody::ChatStarted,
            EnvelopeKind::ChatCompleted => EnvelopeBody::ChatCompleted {
                response: required(wire.response, kind, "response")?,
            },
            EnvelopeKind::ChatError => EnvelopeBody::ChatError {
                error: wire.error.unwrap_or_else(|| "unknown error".to_string()),
            },
            EnvelopeKind::WorkflowCompleted => EnvelopeBody::WorkflowCompleted,
            EnvelopeKind::WorkflowCancelled => EnvelopeBody::WorkflowCancelled,
            EnvelopeKind::WorkflowCleared => EnvelopeBody::WorkflowCleared,
            EnvelopeKind::FollowUpQuestions => EnvelopeBody::FollowUpQuestions {
                questions: required(wire.follow_up_questions, kind, "follow_up_questions")?,
            },
            EnvelopeKind::Heartbeat => EnvelopeBody::Heartbeat,
            EnvelopeKind::Pong => EnvelopeBody::Pong,
            EnvelopeKind::Error => EnvelopeBody::Error {
                error: wire.error.unwrap_or_else(|| "unknown error".to_string()),
            },
        };

        Ok(Self {
            timestamp: wire.timestamp.unwrap_or_else(Utc::now),
            workflow_id: wire.workflow_id,
            project_id: wire.project_id,
            body,
        })
    }
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        let mut wire = WireEnvelope {
            kind: envelope.kind().as_str().to_string(),
            timestamp: Some(envelope.timestamp),
            workflow_id: envelope.workflow_id,
            project_id: envelope.project_id,
            ..Default::default()
        };

        match envelope.body {
            EnvelopeBody::WorkflowUpdate { step, progress } => {
                wire.step = step;
                wire.set_delta(progress);
            }
            EnvelopeBody::WorkflowStep { step } => wire.step = Some(step),
            EnvelopeBody::ProgressUpdate(progress) => wire.set_delta(progress),
            EnvelopeBody::ChatCompleted { response } => wire.response = Some(response),
            EnvelopeBody::ChatError { error } | EnvelopeBody::Error { error } => {
                wire.error = Some(error)
            }
            EnvelopeBody::FollowUpQuestions { questions } => {
                wire.follow_up_questions = Some(questions)
            }
            EnvelopeBody::ChatStarted
            | EnvelopeBody::WorkflowCompleted
            | EnvelopeBody::WorkflowCancelled
            | EnvelopeBody::WorkflowCleared
            | EnvelopeBody::Heartbeat
            | EnvelopeBody::Pong => {}
        }

        wire
    }
}
