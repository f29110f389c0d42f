//! Detection flight bookkeeping

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The single detection request owned by an orchestrator
///
/// `seq` is compared at response time; a response whose flight is no longer
/// the recorded one is discarded.
#[derive(Debug, Clone)]
pub struct DetectionFlight {
    pub seq: u64,
    pub request_id: Uuid,
    pub session_id: String,
    pub token: CancellationToken,
}

impl DetectionFlight {
    pub fn new(seq: u64, session_id: impl Into<String>) -> Self {
        Self {
            seq,
            request_id: Uuid::new_v4(),
            session_id: session_id.into(),
            token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// How a `run_detection` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// Result installed into session state
    Committed { count: usize },
    /// A newer detection replaced this one; response dropped
    Superseded,
    /// Cancelled by the operator, a session change or a reset
    Cancelled,
    /// Caller-side timeout elapsed; handled like a cancellation
    TimedOut,
    /// Request failed; error recorded in state
    Failed,
}

impl DetectionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, DetectionOutcome::Committed { .. })
    }
}
