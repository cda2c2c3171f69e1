//! Session runtime for Parley - the turn-scheduling and negotiation state
//! machine.
//!
//! This crate coordinates several independently-firing asynchronous triggers
//! (snapshot polling, decision latency, human commands, timers) into a single
//! consistent stream of actions:
//!
//! 1. **Decision seam** (`llm`) - pluggable capability that decides what to
//!    say or do next; the runtime only decides *when* to ask
//! 2. **Turn scheduling** (`runtime`, `timers`) - debounced change events, an
//!    inactivity watchdog, typing suppression, and a single-flight guard
//!    around the decision step
//! 3. **Approval rendezvous** (`rendezvous`, `stall`) - the unbounded
//!    suspension on a binding commitment, with filler messages keeping the
//!    remote party engaged
//! 4. **Session lifecycle** (`manager`) - explicit create/destroy, commands
//!    delivered through handles, no process-wide session state
//!
//! # Safety Principle
//!
//! The decision capability proposes; the runtime disposes. A binding
//! commitment never gets a reply without an explicit human resolution, and
//! stop() always force-resolves a pending approval so no turn is left
//! suspended forever.

pub mod decisions;
pub mod llm;
pub mod manager;
pub mod prompts;
pub mod rendezvous;
pub mod research;
mod runtime;
pub mod stall;
pub mod timers;

pub use decisions::{ContactDecision, DecisionAction, ExtractionDecision, NegotiationDecision};
pub use llm::{DecisionClient, DecisionError, HttpDecisionClient, StructuredResponse, ToolSchema};
pub use manager::{SessionCommand, SessionHandle, SessionManager};
pub use rendezvous::ApprovalGate;
pub use research::{extract_price_findings, ResearchProbe};
pub use stall::StallScheduler;
pub use timers::{TimerPurpose, TimerTable};
