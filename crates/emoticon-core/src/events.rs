//! ErrorReporter — out-of-band failures broadcast to any listener via tokio::broadcast.

use tokio::sync::broadcast;
use tracing::error;

use crate::types::{ActorContext, ErrorReport};

/// Failures that are not surfaced as operation results go here.
#[derive(Clone)]
pub struct ErrorReporter {
    tx: broadcast::Sender<ErrorReport>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ErrorReport> {
        self.tx.subscribe()
    }

    pub fn report(&self, err: &dyn std::fmt::Display, context: &ActorContext) -> ErrorReport {
        self.report_raw(err.to_string(), context.render())
    }

    /// Publish a report whose context is already rendered.
    pub fn report_raw(&self, error: String, context: String) -> ErrorReport {
        let report = ErrorReport {
            error,
            timestamp: chrono::Utc::now().to_rfc3339(),
            context,
        };
        error!("{} ({})", report.error, report.context);
        // No subscribers is fine.
        let _ = self.tx.send(report.clone());
        report
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
