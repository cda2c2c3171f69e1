use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use parley_core::{Recommendation, Sender};

use crate::llm::StructuredResponse;

/// Message senders the decision capability may report. The agent's own
/// messages are never taken from decision output; the runtime records those
/// itself when a send succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedSender {
    RemoteParty,
    System,
}

impl From<ReportedSender> for Sender {
    fn from(value: ReportedSender) -> Self {
        match value {
            ReportedSender::RemoteParty => Sender::RemoteParty,
            ReportedSender::System => Sender::System,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ReportedMessage {
    pub sender: ReportedSender,
    pub text: String,
}

/// A page interaction the decision capability wants executed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionAction {
    Click { element_ref: String },
    TypeText { element_ref: String, text: String },
    PressKey { key: String },
}

/// Outcome of a reaching-human turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ContactDecision {
    #[serde(default)]
    pub human_detected: bool,
    /// Opening message to send once a human is on the line.
    #[serde(default)]
    pub opening_message: Option<String>,
    /// Interaction to perform while still talking to an automated system.
    #[serde(default)]
    pub action: Option<DecisionAction>,
    #[serde(default)]
    pub new_messages: Vec<ReportedMessage>,
    #[serde(default)]
    pub composer_ref: Option<String>,
}

/// Outcome of a negotiating turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct NegotiationDecision {
    #[serde(default)]
    pub new_messages: Vec<ReportedMessage>,
    #[serde(default)]
    pub is_commitment: bool,
    /// Ordinary reply to send when no commitment was detected.
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub composer_ref: Option<String>,
    #[serde(default)]
    pub offer_description: Option<String>,
    #[serde(default)]
    pub remote_offer_text: Option<String>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub counter_suggestion: Option<String>,
}

/// Outcome of an extraction-only turn run while a human deliberates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ExtractionDecision {
    #[serde(default)]
    pub new_messages: Vec<ReportedMessage>,
}

/// Decodes a structured response into the expected decision shape.
///
/// Anything that does not match — free text instead of a tool call, a
/// different tool name, arguments that fail to deserialize — yields `None`:
/// "no actionable result", logged and discarded, never an error into the
/// state machine.
pub fn parse_decision<T: DeserializeOwned>(
    response: StructuredResponse,
    expected_tool: &str,
) -> Option<T> {
    match response {
        StructuredResponse::ToolCall { name, args } if name == expected_tool => {
            match serde_json::from_value(args) {
                Ok(decision) => Some(decision),
                Err(error) => {
                    warn!(tool = expected_tool, error = %error, "decision arguments malformed");
                    None
                }
            }
        }
        StructuredResponse::ToolCall { name, .. } => {
            warn!(expected = expected_tool, got = %name, "decision used an unexpected tool");
            None
        }
        StructuredResponse::Text(text) => {
            debug!(
                expected = expected_tool,
                text_len = text.len(),
                "decision returned free text instead of a tool call"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_decision, ContactDecision, DecisionAction, NegotiationDecision};
    use crate::llm::StructuredResponse;
    use parley_core::Recommendation;

    #[test]
    fn contact_decision_parses_with_action() {
        let response = StructuredResponse::ToolCall {
            name: "report_contact".to_owned(),
            args: json!({
                "human_detected": false,
                "action": {"kind": "click", "element_ref": "e7"},
                "new_messages": [{"sender": "system", "text": "Transferring you now"}],
            }),
        };

        let decision: ContactDecision =
            parse_decision(response, "report_contact").expect("parses");
        assert!(!decision.human_detected);
        assert_eq!(decision.action, Some(DecisionAction::Click { element_ref: "e7".to_owned() }));
        assert_eq!(decision.new_messages.len(), 1);
    }

    #[test]
    fn negotiation_decision_parses_commitment_payload() {
        let response = StructuredResponse::ToolCall {
            name: "report_negotiation".to_owned(),
            args: json!({
                "is_commitment": true,
                "remote_offer_text": "We can do $59/mo if you sign today",
                "recommendation": "counter",
                "counter_suggestion": "counter with $49/mo",
                "new_messages": [],
            }),
        };

        let decision: NegotiationDecision =
            parse_decision(response, "report_negotiation").expect("parses");
        assert!(decision.is_commitment);
        assert_eq!(decision.recommendation, Some(Recommendation::Counter));
        assert_eq!(decision.counter_suggestion.as_deref(), Some("counter with $49/mo"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let response = StructuredResponse::ToolCall {
            name: "report_negotiation".to_owned(),
            args: json!({"is_commitment": true}),
        };

        let decision: NegotiationDecision =
            parse_decision(response, "report_negotiation").expect("parses");
        assert!(decision.recommendation.is_none());
        assert!(decision.new_messages.is_empty());
    }

    #[test]
    fn free_text_is_no_actionable_result() {
        let response = StructuredResponse::Text("let me think about that".to_owned());
        assert!(parse_decision::<ContactDecision>(response, "report_contact").is_none());
    }

    #[test]
    fn unexpected_tool_name_is_discarded() {
        let response = StructuredResponse::ToolCall {
            name: "something_else".to_owned(),
            args: json!({}),
        };
        assert!(parse_decision::<ContactDecision>(response, "report_contact").is_none());
    }

    #[test]
    fn malformed_arguments_are_discarded() {
        let response = StructuredResponse::ToolCall {
            name: "report_contact".to_owned(),
            args: json!({"new_messages": "not-a-list"}),
        };
        assert!(parse_decision::<ContactDecision>(response, "report_contact").is_none());
    }
}
