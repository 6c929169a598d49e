//! Session-level scan errors with miette diagnostics
//!
//! Only faults that end a whole scan live here. Failures confined to one
//! component are logged and the scan carries on.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Another scan holds the coordinator
    #[error("A scan is already in progress (session {active_session})")]
    #[diagnostic(
        code(mcpaudit::scan::in_progress),
        help("Wait for the running scan to finish or cancel it first")
    )]
    ScanInProgress { active_session: String },

    #[error("Scan {session_id} was cancelled after {components_completed} component(s)")]
    #[diagnostic(code(mcpaudit::scan::cancelled))]
    Cancelled {
        session_id: String,
        components_completed: usize,
    },

    /// The scan configuration cannot be used
    #[error("Invalid scan configuration: {message}")]
    #[diagnostic(code(mcpaudit::config::invalid), help("{suggestion}"))]
    InvalidConfig { message: String, suggestion: String },
}

impl ScanError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled { .. })
    }
}

/// Cancellation observed mid-call, before the orchestrator has attached
/// session details. Travels inside `anyhow::Error`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Interrupted;

/// True when `err` (or anything in its chain) is a cancellation.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<Interrupted>().is_some()
            || cause
                .downcast_ref::<ScanError>()
                .is_some_and(ScanError::is_cancelled)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn cancellation_is_found_through_context() {
        let err: anyhow::Result<()> = Err(Interrupted).context("calling oracle");
        assert!(is_cancellation(&err.unwrap_err()));
    }

    #[test]
    fn other_errors_are_not_cancellation() {
        let err = anyhow::anyhow!("connection reset");
        assert!(!is_cancellation(&err));

        let busy = anyhow::Error::new(ScanError::ScanInProgress {
            active_session: "s1".to_string(),
        });
        assert!(!is_cancellation(&busy));
    }

    #[test]
    fn messages() {
        let err = ScanError::Cancelled {
            session_id: "abc".to_string(),
            components_completed: 2,
        };
        assert_eq!(
            err.to_string(),
            "Scan abc was cancelled after 2 component(s)"
        );
        assert!(err.is_cancelled());
    }
}
