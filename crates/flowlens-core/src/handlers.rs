//! Built-in envelope handlers

use crate::aggregator::Termination;
use crate::connection::ConnectionEvent;
use crate::envelope::{Envelope, EnvelopeBody};
use crate::error::Result;
use crate::session::Workspace;

/// Apply an envelope with the built-in semantics of its kind.
pub fn apply(ws: &mut Workspace, envelope: &Envelope) -> Result<()> {
    let workflow_id = envelope.workflow_id.as_deref();
    let at = envelope.timestamp;

    match &envelope.body {
        EnvelopeBody::WorkflowUpdate { step, progress } => {
            if let Some(step) = step {
                ws.apply_step(step.clone(), workflow_id, at)?;
            }
            ws.apply_progress(*progress, workflow_id);
        }
        EnvelopeBody::WorkflowStep { step } => {
            ws.apply_step(step.clone(), workflow_id, at)?;
        }
        EnvelopeBody::ProgressUpdate(delta) => ws.apply_progress(*delta, workflow_id),
        EnvelopeBody::ChatStarted => ws.acknowledge_chat(workflow_id)?,
        EnvelopeBody::ChatCompleted { response } => ws.apply_chat_response(response, workflow_id),
        EnvelopeBody::ChatError { error } => ws.apply_chat_error(error.clone()),
        EnvelopeBody::WorkflowCompleted => {
            ws.terminate(workflow_id, Termination::Completed, at);
        }
        EnvelopeBody::WorkflowCancelled => {
            ws.terminate(workflow_id, Termination::Cancelled, at);
        }
        EnvelopeBody::WorkflowCleared => ws.clear_workflows(),
        EnvelopeBody::FollowUpQuestions { questions } => ws.set_follow_ups(questions.clone()),
        EnvelopeBody::Heartbeat | EnvelopeBody::Pong => {
            ws.apply_connection_event(&ConnectionEvent::Alive { at });
        }
        EnvelopeBody::Error { error } => ws.server_error(error.clone()),
    }

    Ok(())
}
