//! Per-call fallback escalation.
//!
//! Each call session tracks consecutive failures (low-confidence
//! classifications and synthesis unavailability). A confidently rendered
//! response resets the counter; reaching the configured maximum moves the
//! session to the terminal Escalated state and emits a transfer signal to
//! the call layer. Once Escalated, no further classification is attempted
//! for that call.

use std::collections::HashMap;
use std::sync::Mutex;

use switchboard_types::CallId;
use tokio::sync::mpsc;

/// Session state in the fallback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPhase {
    /// No recent failures.
    Normal,
    /// One or more consecutive failures, below the escalation threshold.
    Degrading,
    /// Terminal: the call is being handed to a human queue.
    Escalated,
}

impl FallbackPhase {
    /// Returns the string label used in logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Degrading => "DEGRADING",
            Self::Escalated => "ESCALATED",
        }
    }
}

/// Emitted once per call when it escalates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSignal {
    /// The escalated call.
    pub call_id: CallId,
    /// Human queue to hand the caller to.
    pub transfer_queue: String,
    /// Pinned audio key the call layer plays before transferring.
    pub transfer_audio_key: String,
}

/// Escalation tunables.
#[derive(Debug, Clone)]
pub struct EscalationSettings {
    /// Consecutive failures that trigger escalation.
    pub max_fallback_count: u32,
    /// Destination queue for escalated calls.
    pub transfer_queue: String,
    /// Audio key played before the transfer.
    pub transfer_audio_key: String,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            max_fallback_count: 3,
            transfer_queue: "default".to_string(),
            transfer_audio_key: "transfer_to_agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionState {
    failures: u32,
    phase: FallbackPhase,
}

/// The per-call fallback state machine.
#[derive(Debug)]
pub struct FallbackEscalationController {
    settings: EscalationSettings,
    sessions: Mutex<HashMap<CallId, SessionState>>,
    signals: mpsc::UnboundedSender<TransferSignal>,
}

impl FallbackEscalationController {
    /// Creates a controller and the receiver the call layer listens on
    /// for transfer signals.
    pub fn new(
        settings: EscalationSettings,
    ) -> (Self, mpsc::UnboundedReceiver<TransferSignal>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        (
            Self {
                settings,
                sessions: Mutex::new(HashMap::new()),
                signals,
            },
            receiver,
        )
    }

    /// Registers a new call session in the Normal phase.
    pub fn start_call(&self, call_id: CallId) {
        self.lock_sessions().insert(
            call_id,
            SessionState {
                failures: 0,
                phase: FallbackPhase::Normal,
            },
        );
    }

    /// Drops a finished call's state.
    pub fn end_call(&self, call_id: CallId) {
        self.lock_sessions().remove(&call_id);
    }

    /// Current phase for a call. Unknown calls read as Normal.
    pub fn phase(&self, call_id: CallId) -> FallbackPhase {
        self.lock_sessions()
            .get(&call_id)
            .map(|s| s.phase)
            .unwrap_or(FallbackPhase::Normal)
    }

    /// Whether the call layer should keep classifying utterances for this
    /// call. False once Escalated.
    pub fn classify_allowed(&self, call_id: CallId) -> bool {
        self.phase(call_id) != FallbackPhase::Escalated
    }

    /// Records one failure (a low-confidence classification or a
    /// synthesis-unavailable render) and returns the resulting phase.
    ///
    /// Reaching `max_fallback_count` consecutive failures transitions the
    /// session to Escalated and emits the transfer signal exactly once.
    pub fn record_failure(&self, call_id: CallId) -> FallbackPhase {
        let mut sessions = self.lock_sessions();
        let state = sessions.entry(call_id).or_insert(SessionState {
            failures: 0,
            phase: FallbackPhase::Normal,
        });

        if state.phase == FallbackPhase::Escalated {
            return FallbackPhase::Escalated;
        }

        state.failures += 1;
        if state.failures >= self.settings.max_fallback_count {
            state.phase = FallbackPhase::Escalated;
            tracing::warn!(
                call_id = %call_id,
                failures = state.failures,
                transfer_queue = %self.settings.transfer_queue,
                "consecutive fallback limit reached, escalating to human transfer"
            );
            // The receiver living as long as the call layer is the normal
            // case; a closed channel just means shutdown is in progress.
            let _ = self.signals.send(TransferSignal {
                call_id,
                transfer_queue: self.settings.transfer_queue.clone(),
                transfer_audio_key: self.settings.transfer_audio_key.clone(),
            });
        } else {
            state.phase = FallbackPhase::Degrading;
            tracing::debug!(
                call_id = %call_id,
                failures = state.failures,
                phase = state.phase.label(),
                "fallback recorded"
            );
        }
        state.phase
    }

    /// Records a confidently rendered response: resets the consecutive
    /// failure counter and returns the session to Normal. Escalated is
    /// terminal and is never left.
    pub fn record_success(&self, call_id: CallId) -> FallbackPhase {
        let mut sessions = self.lock_sessions();
        let state = sessions.entry(call_id).or_insert(SessionState {
            failures: 0,
            phase: FallbackPhase::Normal,
        });
        if state.phase == FallbackPhase::Escalated {
            return FallbackPhase::Escalated;
        }
        state.failures = 0;
        state.phase = FallbackPhase::Normal;
        FallbackPhase::Normal
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<CallId, SessionState>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(max: u32) -> (FallbackEscalationController, mpsc::UnboundedReceiver<TransferSignal>) {
        FallbackEscalationController::new(EscalationSettings {
            max_fallback_count: max,
            transfer_queue: "billing".to_string(),
            transfer_audio_key: "transfer_to_agent".to_string(),
        })
    }

    #[test]
    fn two_consecutive_failures_escalate_at_max_two() {
        let (controller, mut signals) = controller(2);
        let call = CallId::new();
        controller.start_call(call);

        assert_eq!(controller.record_failure(call), FallbackPhase::Degrading);
        assert_eq!(controller.record_failure(call), FallbackPhase::Escalated);
        assert!(!controller.classify_allowed(call));

        let signal = signals.try_recv().expect("transfer signal must be sent");
        assert_eq!(signal.call_id, call);
        assert_eq!(signal.transfer_queue, "billing");
    }

    #[test]
    fn confident_render_between_failures_prevents_escalation() {
        let (controller, mut signals) = controller(2);
        let call = CallId::new();
        controller.start_call(call);

        assert_eq!(controller.record_failure(call), FallbackPhase::Degrading);
        assert_eq!(controller.record_success(call), FallbackPhase::Normal);
        assert_eq!(controller.record_failure(call), FallbackPhase::Degrading);

        assert!(controller.classify_allowed(call));
        assert!(signals.try_recv().is_err(), "no transfer signal expected");
    }

    #[test]
    fn escalated_is_terminal_and_signals_once() {
        let (controller, mut signals) = controller(1);
        let call = CallId::new();
        controller.start_call(call);

        assert_eq!(controller.record_failure(call), FallbackPhase::Escalated);
        assert_eq!(controller.record_failure(call), FallbackPhase::Escalated);
        assert_eq!(controller.record_success(call), FallbackPhase::Escalated);

        assert!(signals.try_recv().is_ok());
        assert!(signals.try_recv().is_err(), "signal must be sent exactly once");
    }

    #[test]
    fn sessions_are_independent() {
        let (controller, _signals) = controller(2);
        let a = CallId::new();
        let b = CallId::new();
        controller.start_call(a);
        controller.start_call(b);

        controller.record_failure(a);
        assert_eq!(controller.phase(a), FallbackPhase::Degrading);
        assert_eq!(controller.phase(b), FallbackPhase::Normal);

        controller.end_call(a);
        assert_eq!(controller.phase(a), FallbackPhase::Normal, "ended call reads fresh");
    }
}
