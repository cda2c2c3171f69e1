use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::ApprovalRequest;
use crate::domain::message::ConversationMessage;
use crate::domain::research::PriceFinding;
use crate::domain::session::SessionId;
use crate::phase::Phase;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UiEventKind {
    ConversationUpdated { messages: Vec<ConversationMessage> },
    ApprovalRequired { request: ApprovalRequest },
    ThinkingStatus { thinking: bool, detail: Option<String> },
    PhaseChanged { from: Phase, to: Phase },
    ResearchResult { query: String, findings: Vec<PriceFinding> },
    Error { class: String, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiEvent {
    pub event_id: String,
    pub session_id: SessionId,
    pub kind: UiEventKind,
    pub occurred_at: DateTime<Utc>,
}

impl UiEvent {
    pub fn new(session_id: SessionId, kind: UiEventKind) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            session_id,
            kind,
            occurred_at: Utc::now(),
        }
    }
}

/// Fire-and-forget sink for session events. Publishing must never block the
/// session runtime and must never fail into it; implementations swallow their
/// own delivery problems.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: UiEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<UiEvent>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<UiEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds_named(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| kind_name(&event.kind) == name)
            .count()
    }
}

impl EventSink for InMemoryEventSink {
    fn publish(&self, event: UiEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

pub fn kind_name(kind: &UiEventKind) -> &'static str {
    match kind {
        UiEventKind::ConversationUpdated { .. } => "conversation_updated",
        UiEventKind::ApprovalRequired { .. } => "approval_required",
        UiEventKind::ThinkingStatus { .. } => "thinking_status",
        UiEventKind::PhaseChanged { .. } => "phase_changed",
        UiEventKind::ResearchResult { .. } => "research_result",
        UiEventKind::Error { .. } => "error",
    }
}
