//! Route table
//!
//! Maps envelope kinds to handlers. Every kind starts on its built-in route;
//! routes can be overridden, removed and restored at runtime. Handler failures
//! and panics stop at this boundary: they are counted and logged, and the
//! next envelope is routed normally.

use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::{Error, Result};
use crate::handlers;
use crate::metrics::Timer;
use crate::scope::{ScopeDecision, ScopeRejection};
use crate::session::Workspace;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A custom envelope handler
pub type Handler = Arc<dyn Fn(&mut Workspace, &Envelope) -> Result<()> + Send + Sync>;

/// Where an envelope kind is routed
#[derive(Clone)]
pub enum Route {
    /// The built-in handler
    Builtin,
    /// A registered override
    Custom(Handler),
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("Builtin"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// What happened to a dispatched envelope
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The handler ran to completion
    Applied,
    /// No route for the kind
    Unroutable,
    /// The frame did not decode
    Malformed(Error),
    /// Dropped by the project scope filter
    OutOfScope(ScopeRejection),
    /// The handler returned an error or panicked
    Failed(Error),
}

/// Route table plus the dispatch boundary.
#[derive(Debug, Clone)]
pub struct Router {
    routes: HashMap<EnvelopeKind, Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a table routing every kind to its built-in handler
    #[must_use]
    pub fn new() -> Self {
        let routes = EnvelopeKind::ALL
            .into_iter()
            .map(|kind| (kind, Route::Builtin))
            .collect();
        Self { routes }
    }

    /// Install a custom handler for a kind
    pub fn register(&mut self, kind: EnvelopeKind, handler: Handler) {
        debug!(kind = %kind, "Registering custom route");
        self.routes.insert(kind, Route::Custom(handler));
    }

    /// Remove the route for a kind; it becomes unroutable
    pub fn unregister(&mut self, kind: EnvelopeKind) -> bool {
        debug!(kind = %kind, "Removing route");
        self.routes.remove(&kind).is_some()
    }

    /// Reinstate the built-in handler for a kind
    pub fn restore_default(&mut self, kind: EnvelopeKind) {
        self.routes.insert(kind, Route::Builtin);
    }

    /// Current route of a kind
    #[must_use]
    pub fn route(&self, kind: EnvelopeKind) -> Option<&Route> {
        self.routes.get(&kind)
    }

    /// Whether a kind has a route
    #[must_use]
    pub fn is_routable(&self, kind: EnvelopeKind) -> bool {
        self.routes.contains_key(&kind)
    }

    /// Decode a text frame and dispatch it.
    ///
    /// Frames that do not decode are counted as unroutable or malformed and
    /// dropped.
    pub fn dispatch_text(&self, ws: &mut Workspace, text: &str) -> DispatchOutcome {
        match Envelope::from_json(text) {
            Ok(envelope) => self.dispatch(ws, &envelope),
            Err(Error::Unroutable { kind }) => {
                ws.metrics().messages.inc();
                ws.metrics().unroutable.inc();
                warn!(kind = %kind, "No route for envelope kind");
                DispatchOutcome::Unroutable
            }
            Err(e) => {
                ws.metrics().messages.inc();
                ws.metrics().malformed.inc();
                warn!(error = %e, "Dropping malformed frame");
                DispatchOutcome::Malformed(e)
            }
        }
    }

    /// Route an envelope through the scope filter to its handler
    pub fn dispatch(&self, ws: &mut Workspace, envelope: &Envelope) -> DispatchOutcome {
        let kind = envelope.kind();
        ws.metrics().messages.inc();

        let Some(route) = self.routes.get(&kind) else {
            ws.metrics().unroutable.inc();
            warn!(kind = %kind, "No route for envelope kind");
            return DispatchOutcome::Unroutable;
        };

        let decision = ws.scope().check(envelope);
        if decision.is_legacy() {
            ws.metrics().legacy_scope_matches.inc();
            debug!(
                kind = %kind,
                workflow_id = ?envelope.workflow_id,
                accepted = decision.is_accepted(),
                "Scope decided by workflow id namespace"
            );
        }
        if let ScopeDecision::Reject(reason) = decision {
            ws.metrics().scope_dropped.inc();
            debug!(
                kind = %kind,
                project_id = ?envelope.project_id,
                workflow_id = ?envelope.workflow_id,
                ?reason,
                "Dropping envelope from another project"
            );
            return DispatchOutcome::OutOfScope(reason);
        }

        let timer = Timer::start();
        let result = catch_unwind(AssertUnwindSafe(|| match route {
            Route::Builtin => handlers::apply(ws, envelope),
            Route::Custom(handler) => handler(ws, envelope),
        }));
        timer.observe_duration(&ws.metrics().handler_latency);

        match result {
            Ok(Ok(())) => DispatchOutcome::Applied,
            Ok(Err(e)) => {
                ws.metrics().errors.inc();
                warn!(kind = %kind, error = %e, "Envelope handler failed");
                DispatchOutcome::Failed(e)
            }
            Err(payload) => {
                ws.metrics().errors.inc();
                let message = panic_message(payload.as_ref());
                error!(kind = %kind, panic = %message, "Envelope handler panicked");
                DispatchOutcome::Failed(Error::Handler { kind, message })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests;
