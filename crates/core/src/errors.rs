use thiserror::Error;

use crate::domain::approval::ApprovalId;
use crate::phase::{Phase, PhaseTransitionError};

/// Failure classes surfaced through error UI events. The class determines how
/// the runtime reacts: transient failures abort one turn and re-arm timers,
/// actuation failures drop the outbound message, teardown failures are
/// swallowed entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    TransientCapability,
    MalformedDecision,
    Actuation,
    Teardown,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientCapability => "transient_capability_error",
            Self::MalformedDecision => "malformed_decision_output",
            Self::Actuation => "actuation_failure",
            Self::Teardown => "teardown_error",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    PhaseTransition(#[from] PhaseTransitionError),
    #[error("command `{command}` is not accepted while the session is {phase:?}")]
    CommandUnavailable { command: &'static str, phase: Phase },
    #[error("no pending approval request matches id {0:?}")]
    UnknownApprovalRequest(ApprovalId),
    #[error("session command channel is closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::FailureClass;

    #[test]
    fn failure_classes_have_stable_names() {
        assert_eq!(FailureClass::TransientCapability.as_str(), "transient_capability_error");
        assert_eq!(FailureClass::MalformedDecision.as_str(), "malformed_decision_output");
        assert_eq!(FailureClass::Actuation.as_str(), "actuation_failure");
        assert_eq!(FailureClass::Teardown.as_str(), "teardown_error");
    }
}
