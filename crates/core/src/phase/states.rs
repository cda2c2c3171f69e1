use serde::{Deserialize, Serialize};

/// Lifecycle phase of one negotiation session. Exactly one is active at a
/// time; the engine in this module is the only legal mutation path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Connecting,
    ReachingHuman,
    Negotiating,
    AwaitingApproval,
    Paused,
    Done,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Phases a paused session may be restored to.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::ReachingHuman | Self::Negotiating | Self::AwaitingApproval
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseEvent {
    StartRequested,
    ConnectionEstablished,
    HumanDetected,
    StillAutomated,
    CommitmentDetected,
    OrdinaryTurn,
    ApprovalResolved,
    PauseRequested,
    ResumeRequested { prior: Phase },
    StopRequested,
}

/// Side effects the runtime must execute when a transition is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseAction {
    NavigateToStart,
    BeginObservation,
    SendOpeningMessage,
    ExecuteDecisionAction,
    PublishApprovalRequest,
    StartStallScheduler,
    StopStallScheduler,
    SendResolutionMessage,
    ClearTimers,
    RearmWatchdog,
    ForceFreshTurn,
    ResolvePendingAsRejected,
    EmitClosingSummary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub event: PhaseEvent,
    pub actions: Vec<PhaseAction>,
}
