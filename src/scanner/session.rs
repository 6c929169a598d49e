//! Scan sessions and the coordinator that keeps them exclusive
//!
//! A [`ScanCoordinator`] admits one session at a time. Admission hands back a
//! [`SessionGuard`]; dropping the guard releases the slot, so the session is
//! torn down on success, error, cancellation or panic alike.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ScanError;

use super::cancel::CancellationSignal;
use super::log::ScanLog;
use super::progress::{ProgressCallback, ProgressTracker};
use super::results::ScanReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Init,
    ToolAnalysis,
    PromptAnalysis,
    ResourceAnalysis,
    Summary,
    Done,
    Cancelled,
    Rejected,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Init => "init",
            ScanPhase::ToolAnalysis => "tool_analysis",
            ScanPhase::PromptAnalysis => "prompt_analysis",
            ScanPhase::ResourceAnalysis => "resource_analysis",
            ScanPhase::Summary => "summary",
            ScanPhase::Done => "done",
            ScanPhase::Cancelled => "cancelled",
            ScanPhase::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanPhase::Done | ScanPhase::Cancelled | ScanPhase::Rejected)
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State for one scan; lives only for the duration of a call.
#[derive(Debug)]
pub struct ScanSession {
    pub id: String,
    pub signal: CancellationSignal,
    pub log: ScanLog,
    pub progress: ProgressTracker,
    pub report: ScanReport,
    pub phase: ScanPhase,
    pub components_completed: usize,
    started: Instant,
}

impl ScanSession {
    pub fn new(
        server_name: &str,
        signal: CancellationSignal,
        log: ScanLog,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            signal,
            log,
            progress: ProgressTracker::new(progress),
            report: ScanReport::new(server_name),
            phase: ScanPhase::Init,
            components_completed: 0,
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn cancelled_error(&self) -> ScanError {
        ScanError::Cancelled {
            session_id: self.id.clone(),
            components_completed: self.components_completed,
        }
    }
}

#[derive(Debug)]
struct ActiveScan {
    session_id: String,
    signal: CancellationSignal,
}

/// Admits at most one scan session at a time.
#[derive(Debug, Clone, Default)]
pub struct ScanCoordinator {
    active: Arc<Mutex<Option<ActiveScan>>>,
}

impl ScanCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide coordinator shared by every caller that wants the
    /// one-scan-per-process guarantee.
    pub fn global() -> &'static ScanCoordinator {
        static GLOBAL: OnceLock<ScanCoordinator> = OnceLock::new();
        GLOBAL.get_or_init(ScanCoordinator::new)
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveScan>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for `session_id`, or fail with
    /// [`ScanError::ScanInProgress`] naming the current holder.
    pub fn begin(
        &self,
        session_id: &str,
        signal: CancellationSignal,
    ) -> Result<SessionGuard, ScanError> {
        let mut active = self.lock();
        if let Some(current) = active.as_ref() {
            return Err(ScanError::ScanInProgress {
                active_session: current.session_id.clone(),
            });
        }
        *active = Some(ActiveScan {
            session_id: session_id.to_string(),
            signal,
        });
        Ok(SessionGuard {
            coordinator: self.clone(),
            session_id: session_id.to_string(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.lock().is_some()
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.lock().as_ref().map(|a| a.session_id.clone())
    }

    /// Trip the active session's signal. Returns false when idle.
    pub fn cancel_active(&self) -> bool {
        match self.lock().as_ref() {
            Some(active) => {
                active.signal.cancel();
                true
            }
            None => false,
        }
    }

    fn release(&self, session_id: &str) {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|a| a.session_id == session_id) {
            *active = None;
        }
    }
}

/// Holds the coordinator slot; releases it on drop.
#[derive(Debug)]
pub struct SessionGuard {
    coordinator: ScanCoordinator,
    session_id: String,
}

impl SessionGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.coordinator.release(&self.session_id);
        tracing::debug!(session = %self.session_id, "scan session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_rejected_until_guard_drops() {
        let coordinator = ScanCoordinator::new();
        let guard = coordinator
            .begin("first", CancellationSignal::new())
            .unwrap();

        let err = coordinator
            .begin("second", CancellationSignal::new())
            .unwrap_err();
        assert_eq!(
            err,
            ScanError::ScanInProgress {
                active_session: "first".to_string()
            }
        );
        assert_eq!(coordinator.active_session_id().as_deref(), Some("first"));

        drop(guard);
        assert!(!coordinator.is_busy());
        assert!(coordinator.begin("second", CancellationSignal::new()).is_ok());
    }

    #[test]
    fn cancel_active_trips_the_session_signal() {
        let coordinator = ScanCoordinator::new();
        assert!(!coordinator.cancel_active());

        let signal = CancellationSignal::new();
        let _guard = coordinator.begin("s", signal.clone()).unwrap();
        assert!(coordinator.cancel_active());
        assert!(signal.is_cancelled());
    }

    #[test]
    fn coordinators_are_independent() {
        let a = ScanCoordinator::new();
        let b = ScanCoordinator::new();
        let _guard = a.begin("s", CancellationSignal::new()).unwrap();
        assert!(!b.is_busy());
        // clones share the slot
        assert!(a.clone().is_busy());
    }

    #[test]
    fn phase_display() {
        assert_eq!(ScanPhase::ToolAnalysis.to_string(), "tool_analysis");
        assert!(ScanPhase::Cancelled.is_terminal());
        assert!(!ScanPhase::Summary.is_terminal());
    }
}
