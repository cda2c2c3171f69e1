//! Core domain model for Parley - negotiation sessions, phases, and events.
//!
//! This crate holds everything the session runtime owns exclusively: the
//! append-only conversation log, the phase lifecycle (with a pure transition
//! engine so illegal phase changes are typed errors, not bugs), approval
//! requests, and the UI event vocabulary published toward the rendering
//! layer. It depends on no async runtime; the orchestration lives in
//! `parley-agent`.

pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod phase;

pub use domain::approval::{ApprovalId, ApprovalRequest, ApprovalResolution, Recommendation};
pub use domain::message::{ConversationLog, ConversationMessage, Sender};
pub use domain::research::PriceFinding;
pub use domain::session::{NegotiationBrief, SessionContext, SessionId};
pub use errors::{FailureClass, SessionError};
pub use events::{EventSink, InMemoryEventSink, UiEvent, UiEventKind};
pub use phase::{Phase, PhaseAction, PhaseEngine, PhaseEvent, PhaseTransition};
