use thiserror::Error;

use crate::phase::states::{Phase, PhaseAction, PhaseEvent, PhaseTransition};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PhaseTransitionError {
    #[error("invalid transition from {phase:?} using event {event:?}")]
    InvalidTransition { phase: Phase, event: PhaseEvent },
    #[error("cannot pause a session that is {phase:?}")]
    PauseUnavailable { phase: Phase },
    #[error("cannot resume into non-resumable phase {prior:?}")]
    ResumeIntoInvalidPhase { prior: Phase },
}

/// Pure transition table for the negotiation lifecycle.
///
/// The runtime never assigns its phase field directly; it applies an event
/// here and executes the returned actions, so an inconsistent phase value is
/// unrepresentable rather than merely avoided.
#[derive(Clone, Debug, Default)]
pub struct PhaseEngine;

impl PhaseEngine {
    pub fn initial_phase(&self) -> Phase {
        Phase::Idle
    }

    pub fn apply(
        &self,
        current: Phase,
        event: &PhaseEvent,
    ) -> Result<PhaseTransition, PhaseTransitionError> {
        use Phase::{
            AwaitingApproval, Connecting, Done, Idle, Negotiating, Paused, ReachingHuman,
        };
        use PhaseAction::{
            BeginObservation, ClearTimers, EmitClosingSummary, ExecuteDecisionAction,
            ForceFreshTurn, NavigateToStart, PublishApprovalRequest, RearmWatchdog,
            ResolvePendingAsRejected, SendOpeningMessage, SendResolutionMessage,
            StartStallScheduler, StopStallScheduler,
        };
        use PhaseEvent::{
            ApprovalResolved, CommitmentDetected, ConnectionEstablished, HumanDetected,
            OrdinaryTurn, PauseRequested, ResumeRequested, StartRequested, StillAutomated,
            StopRequested,
        };

        let (to, actions) = match (current, event) {
            (Idle, StartRequested) => (Connecting, vec![NavigateToStart]),
            (Connecting, ConnectionEstablished) => (ReachingHuman, vec![BeginObservation]),
            (ReachingHuman, HumanDetected) => (Negotiating, vec![SendOpeningMessage]),
            (ReachingHuman, StillAutomated) => (ReachingHuman, vec![ExecuteDecisionAction]),
            (Negotiating, CommitmentDetected) => {
                (AwaitingApproval, vec![PublishApprovalRequest, StartStallScheduler])
            }
            (Negotiating, OrdinaryTurn) => (Negotiating, vec![ExecuteDecisionAction]),
            (AwaitingApproval, ApprovalResolved) => {
                (Negotiating, vec![StopStallScheduler, SendResolutionMessage])
            }
            (Idle | Done, PauseRequested) => {
                return Err(PhaseTransitionError::PauseUnavailable { phase: current });
            }
            (Connecting | ReachingHuman | Negotiating | AwaitingApproval, PauseRequested) => {
                (Paused, vec![ClearTimers])
            }
            (Paused, ResumeRequested { prior }) => {
                if !prior.is_resumable() {
                    return Err(PhaseTransitionError::ResumeIntoInvalidPhase { prior: *prior });
                }
                (*prior, vec![RearmWatchdog, ForceFreshTurn])
            }
            (Done, StopRequested) => {
                return Err(PhaseTransitionError::InvalidTransition {
                    phase: current,
                    event: event.clone(),
                });
            }
            (_, StopRequested) => {
                (Done, vec![ClearTimers, ResolvePendingAsRejected, EmitClosingSummary])
            }
            _ => {
                return Err(PhaseTransitionError::InvalidTransition {
                    phase: current,
                    event: event.clone(),
                });
            }
        };

        Ok(PhaseTransition { from: current, to, event: event.clone(), actions })
    }
}

#[cfg(test)]
mod tests {
    use crate::phase::engine::{PhaseEngine, PhaseTransitionError};
    use crate::phase::states::{Phase, PhaseAction, PhaseEvent};

    fn advance(engine: &PhaseEngine, phase: Phase, event: PhaseEvent) -> Phase {
        engine.apply(phase, &event).expect("transition should be legal").to
    }

    #[test]
    fn contact_path_reaches_negotiating_with_opening_message() {
        let engine = PhaseEngine;
        let mut phase = engine.initial_phase();

        phase = advance(&engine, phase, PhaseEvent::StartRequested);
        assert_eq!(phase, Phase::Connecting);
        phase = advance(&engine, phase, PhaseEvent::ConnectionEstablished);
        assert_eq!(phase, Phase::ReachingHuman);

        // Still talking to a bot: loops in place, executing the decision action.
        let looped = engine
            .apply(phase, &PhaseEvent::StillAutomated)
            .expect("reaching-human self transition");
        assert_eq!(looped.to, Phase::ReachingHuman);
        assert_eq!(looped.actions, vec![PhaseAction::ExecuteDecisionAction]);

        let detected =
            engine.apply(phase, &PhaseEvent::HumanDetected).expect("human detected transition");
        assert_eq!(detected.to, Phase::Negotiating);
        assert_eq!(detected.actions, vec![PhaseAction::SendOpeningMessage]);
    }

    #[test]
    fn commitment_routes_through_approval_and_back() {
        let engine = PhaseEngine;
        let commitment = engine
            .apply(Phase::Negotiating, &PhaseEvent::CommitmentDetected)
            .expect("commitment transition");
        assert_eq!(commitment.to, Phase::AwaitingApproval);
        assert_eq!(
            commitment.actions,
            vec![PhaseAction::PublishApprovalRequest, PhaseAction::StartStallScheduler]
        );

        let resolved = engine
            .apply(Phase::AwaitingApproval, &PhaseEvent::ApprovalResolved)
            .expect("approval resolution transition");
        assert_eq!(resolved.to, Phase::Negotiating);
        assert_eq!(
            resolved.actions,
            vec![PhaseAction::StopStallScheduler, PhaseAction::SendResolutionMessage]
        );
    }

    #[test]
    fn pause_is_rejected_while_idle_or_done() {
        let engine = PhaseEngine;
        for phase in [Phase::Idle, Phase::Done] {
            let error = engine
                .apply(phase, &PhaseEvent::PauseRequested)
                .expect_err("pause must be rejected");
            assert_eq!(error, PhaseTransitionError::PauseUnavailable { phase });
        }
    }

    #[test]
    fn resume_restores_the_remembered_phase() {
        let engine = PhaseEngine;
        let resumed = engine
            .apply(Phase::Paused, &PhaseEvent::ResumeRequested { prior: Phase::Negotiating })
            .expect("resume transition");
        assert_eq!(resumed.to, Phase::Negotiating);
        assert_eq!(resumed.actions, vec![PhaseAction::RearmWatchdog, PhaseAction::ForceFreshTurn]);
    }

    #[test]
    fn resume_into_idle_is_rejected() {
        let engine = PhaseEngine;
        let error = engine
            .apply(Phase::Paused, &PhaseEvent::ResumeRequested { prior: Phase::Idle })
            .expect_err("idle is not resumable");
        assert_eq!(error, PhaseTransitionError::ResumeIntoInvalidPhase { prior: Phase::Idle });
    }

    #[test]
    fn stop_is_reachable_from_every_live_phase() {
        let engine = PhaseEngine;
        for phase in [
            Phase::Idle,
            Phase::Connecting,
            Phase::ReachingHuman,
            Phase::Negotiating,
            Phase::AwaitingApproval,
            Phase::Paused,
        ] {
            let transition =
                engine.apply(phase, &PhaseEvent::StopRequested).expect("stop transition");
            assert_eq!(transition.to, Phase::Done);
            assert!(transition.actions.contains(&PhaseAction::ResolvePendingAsRejected));
        }
    }

    #[test]
    fn stop_is_not_reapplied_once_done() {
        let engine = PhaseEngine;
        assert!(engine.apply(Phase::Done, &PhaseEvent::StopRequested).is_err());
    }

    #[test]
    fn commitment_outside_negotiating_is_invalid() {
        let engine = PhaseEngine;
        let error = engine
            .apply(Phase::ReachingHuman, &PhaseEvent::CommitmentDetected)
            .expect_err("commitment requires negotiating phase");
        assert!(matches!(error, PhaseTransitionError::InvalidTransition { .. }));
    }
}
