pub mod engine;
pub mod states;

pub use engine::{PhaseEngine, PhaseTransitionError};
pub use states::{Phase, PhaseAction, PhaseEvent, PhaseTransition};
