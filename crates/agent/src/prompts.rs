use serde_json::json;

use parley_core::{ConversationLog, NegotiationBrief};

use crate::llm::ToolSchema;

/// How many trailing messages are forwarded to the decision capability.
const TAIL_MESSAGES: usize = 30;

pub const CONTACT_TOOL: &str = "report_contact";
pub const NEGOTIATION_TOOL: &str = "report_negotiation";
pub const EXTRACTION_TOOL: &str = "report_new_messages";

fn brief_section(brief: &NegotiationBrief) -> String {
    let mut section = format!("Objective: {}\n", brief.objective);
    if !brief.constraints.is_empty() {
        section.push_str("Hard constraints:\n");
        for constraint in &brief.constraints {
            section.push_str(&format!("- {constraint}\n"));
        }
    }
    if let Some(notes) = &brief.notes {
        section.push_str(&format!("Notes from the principal: {notes}\n"));
    }
    section
}

pub fn contact_prompt(brief: &NegotiationBrief) -> String {
    format!(
        "You are a negotiation assistant working a live support chat on behalf of a human \
         principal.\n{}\nYou are currently trying to reach a human representative. Examine the \
         page snapshot. If an automated system (bot, menu, queue) is still in the way, report \
         human_detected=false and choose one interaction that moves toward a human (for example \
         clicking 'talk to an agent'). If a human representative is clearly present, report \
         human_detected=true and write a short, polite opening message that states the \
         principal's request. Always report any new chat messages visible in the snapshot and \
         the element ref of the chat input box if you can identify it.",
        brief_section(brief)
    )
}

pub fn negotiation_prompt(brief: &NegotiationBrief, nudge: bool) -> String {
    let mut prompt = format!(
        "You are a negotiation assistant working a live support chat on behalf of a human \
         principal.\n{}\nExtract any new messages from the remote party visible in the snapshot, \
         then decide the next move. If the remote party has made a concrete, bindable offer \
         (a price, a contract change, anything requiring sign-off), report is_commitment=true \
         with the offer text, your recommendation (accept, reject, or counter), your reasoning, \
         and a counter suggestion when you have one. Do NOT reply to a commitment yourself; a \
         human must approve it first. Otherwise report is_commitment=false and write the next \
         reply that advances the objective. Report the chat input element ref when visible.",
        brief_section(brief)
    );
    if nudge {
        prompt.push_str(
            "\nThe conversation has gone quiet. Write one short, natural follow-up that keeps \
             the negotiation moving without repeating yourself.",
        );
    }
    prompt
}

pub fn extraction_prompt() -> String {
    "You are monitoring a live chat while a human principal considers an offer. Report any new \
     messages from the remote party or the system that are visible in the snapshot and not \
     already in the conversation log. Do not write a reply and do not take any other action."
        .to_owned()
}

pub fn acceptance_prompt(brief: &NegotiationBrief) -> String {
    format!(
        "You are a negotiation assistant.\n{}\nThe principal has APPROVED the offer currently \
         on the table. Write one short chat message accepting the offer and asking for the \
         next step to finalize it. Return only the message text.",
        brief_section(brief)
    )
}

pub fn pushback_prompt(brief: &NegotiationBrief, directive: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a negotiation assistant.\n{}\nThe principal has DECLINED the offer currently \
         on the table. Write one short, polite chat message pushing back and continuing the \
         negotiation. Return only the message text.",
        brief_section(brief)
    );
    if let Some(directive) = directive {
        prompt.push_str(&format!(
            "\nThe principal gave this instruction, follow it exactly: {directive}"
        ));
    }
    prompt
}

pub fn summary_prompt() -> String {
    "Summarize this negotiation in a few sentences for the principal's records: what was \
     discussed, any offers made, and where things were left."
        .to_owned()
}

/// Renders the conversation tail plus the current page snapshot into the
/// single user-message string every decision call receives.
pub fn conversation_tail(log: &ConversationLog, snapshot: &str) -> String {
    let messages = log.messages();
    let skip = messages.len().saturating_sub(TAIL_MESSAGES);

    let mut tail = String::from("CONVERSATION SO FAR:\n");
    if messages.is_empty() {
        tail.push_str("(no messages yet)\n");
    }
    for message in &messages[skip..] {
        let who = match message.sender {
            parley_core::Sender::RemoteParty => "remote",
            parley_core::Sender::Agent => "agent",
            parley_core::Sender::System => "system",
        };
        tail.push_str(&format!("{who}: {}\n", message.text));
    }

    tail.push_str("\nCURRENT PAGE SNAPSHOT:\n");
    tail.push_str(snapshot);
    tail
}

pub fn contact_schema() -> ToolSchema {
    ToolSchema {
        name: CONTACT_TOOL.to_owned(),
        description: "Report whether a human representative was reached and what to do next"
            .to_owned(),
        parameters: json!({
            "type": "object",
            "properties": {
                "human_detected": {"type": "boolean"},
                "opening_message": {"type": "string"},
                "action": {
                    "type": "object",
                    "properties": {
                        "kind": {"type": "string", "enum": ["click", "type_text", "press_key"]},
                        "element_ref": {"type": "string"},
                        "text": {"type": "string"},
                        "key": {"type": "string"},
                    },
                    "required": ["kind"],
                },
                "new_messages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "sender": {"type": "string", "enum": ["remote_party", "system"]},
                            "text": {"type": "string"},
                        },
                        "required": ["sender", "text"],
                    },
                },
                "composer_ref": {"type": "string"},
            },
            "required": ["human_detected"],
        }),
    }
}

pub fn negotiation_schema() -> ToolSchema {
    ToolSchema {
        name: NEGOTIATION_TOOL.to_owned(),
        description: "Report the outcome of one negotiation turn".to_owned(),
        parameters: json!({
            "type": "object",
            "properties": {
                "new_messages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "sender": {"type": "string", "enum": ["remote_party", "system"]},
                            "text": {"type": "string"},
                        },
                        "required": ["sender", "text"],
                    },
                },
                "is_commitment": {"type": "boolean"},
                "reply": {"type": "string"},
                "composer_ref": {"type": "string"},
                "offer_description": {"type": "string"},
                "remote_offer_text": {"type": "string"},
                "recommendation": {"type": "string", "enum": ["accept", "reject", "counter"]},
                "reasoning": {"type": "string"},
                "counter_suggestion": {"type": "string"},
            },
            "required": ["is_commitment"],
        }),
    }
}

pub fn extraction_schema() -> ToolSchema {
    ToolSchema {
        name: EXTRACTION_TOOL.to_owned(),
        description: "Report chat messages newly visible in the snapshot".to_owned(),
        parameters: json!({
            "type": "object",
            "properties": {
                "new_messages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "sender": {"type": "string", "enum": ["remote_party", "system"]},
                            "text": {"type": "string"},
                        },
                        "required": ["sender", "text"],
                    },
                },
            },
            "required": ["new_messages"],
        }),
    }
}

#[cfg(test)]
mod tests {
    use parley_core::{ConversationLog, NegotiationBrief, Sender};

    use super::{conversation_tail, negotiation_prompt, pushback_prompt};

    fn brief() -> NegotiationBrief {
        NegotiationBrief {
            objective: "renew below $50/mo".to_owned(),
            constraints: vec!["12-month term maximum".to_owned()],
            notes: None,
            resume_threshold: 2,
        }
    }

    #[test]
    fn tail_includes_messages_and_snapshot() {
        let mut log = ConversationLog::new();
        log.append(Sender::RemoteParty, "Hello, how can I help?");
        log.append(Sender::Agent, "I'd like to discuss my renewal.");

        let tail = conversation_tail(&log, "chat page with composer");
        assert!(tail.contains("remote: Hello, how can I help?"));
        assert!(tail.contains("agent: I'd like to discuss my renewal."));
        assert!(tail.contains("CURRENT PAGE SNAPSHOT:\nchat page with composer"));
    }

    #[test]
    fn tail_is_bounded_to_recent_messages() {
        let mut log = ConversationLog::new();
        for index in 0..40 {
            log.append(Sender::RemoteParty, format!("message {index}"));
        }

        let tail = conversation_tail(&log, "");
        assert!(!tail.contains("message 0\n"));
        assert!(tail.contains("message 39"));
    }

    #[test]
    fn nudge_flag_adds_follow_up_instruction() {
        let quiet = negotiation_prompt(&brief(), true);
        let normal = negotiation_prompt(&brief(), false);
        assert!(quiet.contains("gone quiet"));
        assert!(!normal.contains("gone quiet"));
    }

    #[test]
    fn pushback_prompt_carries_directive_verbatim() {
        let prompt = pushback_prompt(&brief(), Some("counter with $49/mo"));
        assert!(prompt.contains("counter with $49/mo"));
    }
}
