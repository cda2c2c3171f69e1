use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the agent is negotiating for, supplied by the human principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationBrief {
    /// One-sentence objective, e.g. "renew the plan below $50/mo".
    pub objective: String,
    /// Hard constraints the agent must not concede.
    pub constraints: Vec<String>,
    /// Free-form notes forwarded to the decision capability verbatim.
    pub notes: Option<String>,
    /// Remote-message count at or above which a freshly started session is
    /// treated as already mid-conversation and skips the opening message.
    /// Shape-matching on the log is fragile, so this stays a tunable knob.
    pub resume_threshold: usize,
}

impl Default for NegotiationBrief {
    fn default() -> Self {
        Self {
            objective: String::new(),
            constraints: Vec::new(),
            notes: None,
            resume_threshold: 2,
        }
    }
}

/// Immutable identity of one negotiation session.
///
/// Only `display_name` may change after creation; everything else is fixed
/// until the session is stopped and handed off to persistence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub start_url: String,
    pub brief: NegotiationBrief,
    pub display_name: String,
}

impl SessionContext {
    pub fn new(start_url: impl Into<String>, brief: NegotiationBrief) -> Self {
        let start_url = start_url.into();
        let display_name = default_display_name(&start_url);
        Self { session_id: SessionId::generate(), start_url, brief, display_name }
    }
}

fn default_display_name(start_url: &str) -> String {
    let trimmed = start_url.trim_start_matches("https://").trim_start_matches("http://");
    let host = trimmed.split('/').next().unwrap_or(trimmed);
    if host.is_empty() {
        "negotiation".to_owned()
    } else {
        format!("negotiation @ {host}")
    }
}

#[cfg(test)]
mod tests {
    use super::{NegotiationBrief, SessionContext};

    #[test]
    fn display_name_derives_from_host() {
        let context =
            SessionContext::new("https://support.example.com/chat", NegotiationBrief::default());
        assert_eq!(context.display_name, "negotiation @ support.example.com");
    }

    #[test]
    fn empty_url_gets_generic_name() {
        let context = SessionContext::new("", NegotiationBrief::default());
        assert_eq!(context.display_name, "negotiation");
    }
}
