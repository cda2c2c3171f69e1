use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Accept,
    Reject,
    Counter,
}

/// A binding commitment surfaced by the remote party, waiting on the human
/// principal. At most one exists per session, and only while the session is
/// in the awaiting-approval phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub description: String,
    pub remote_offer_text: String,
    pub recommendation: Recommendation,
    pub reasoning: String,
    pub counter_suggestion: Option<String>,
}

impl ApprovalRequest {
    /// Builds a request from a possibly-incomplete decision payload.
    ///
    /// Missing fields fall back to conservative defaults: an unspecified
    /// recommendation becomes [`Recommendation::Reject`] so the human is never
    /// nudged toward accepting an offer the decision capability did not
    /// actually endorse.
    pub fn from_decision(
        description: Option<String>,
        remote_offer_text: Option<String>,
        recommendation: Option<Recommendation>,
        reasoning: Option<String>,
        counter_suggestion: Option<String>,
    ) -> Self {
        Self {
            id: ApprovalId::generate(),
            description: description.unwrap_or_else(|| "Remote party proposed terms".to_owned()),
            remote_offer_text: remote_offer_text.unwrap_or_default(),
            recommendation: recommendation.unwrap_or(Recommendation::Reject),
            reasoning: reasoning
                .unwrap_or_else(|| "No reasoning supplied; defaulting to reject".to_owned()),
            counter_suggestion,
        }
    }
}

/// Outcome of the human side of the approval rendezvous.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalResolution {
    Approved,
    Rejected { directive: Option<String> },
}

impl ApprovalResolution {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

#[cfg(test)]
mod tests {
    use super::{ApprovalRequest, Recommendation};

    #[test]
    fn incomplete_payload_defaults_to_reject() {
        let request = ApprovalRequest::from_decision(None, None, None, None, None);

        assert_eq!(request.recommendation, Recommendation::Reject);
        assert!(!request.description.is_empty());
        assert!(!request.reasoning.is_empty());
        assert!(request.counter_suggestion.is_none());
    }

    #[test]
    fn complete_payload_is_preserved() {
        let request = ApprovalRequest::from_decision(
            Some("12-month term at $59/mo".to_owned()),
            Some("We can do $59/mo if you sign today".to_owned()),
            Some(Recommendation::Counter),
            Some("List price is $79; there is room below $59".to_owned()),
            Some("counter with $49/mo".to_owned()),
        );

        assert_eq!(request.recommendation, Recommendation::Counter);
        assert_eq!(request.counter_suggestion.as_deref(), Some("counter with $49/mo"));
    }

    #[test]
    fn generated_ids_are_unique() {
        let first = ApprovalRequest::from_decision(None, None, None, None, None);
        let second = ApprovalRequest::from_decision(None, None, None, None, None);
        assert_ne!(first.id, second.id);
    }
}
