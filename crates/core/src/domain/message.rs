use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    RemoteParty,
    Agent,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(sender: Sender, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { sender, text: text.into(), timestamp }
    }
}

/// Append-only conversation log for one negotiation session.
///
/// The session runtime is the sole owner; every mutation goes through
/// [`ConversationLog::append`] or [`ConversationLog::append_batch`] so the
/// full log can be republished after each change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    messages: Vec<ConversationMessage>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, sender: Sender, text: &str) -> bool {
        self.messages.iter().any(|message| message.sender == sender && message.text == text)
    }

    /// Number of messages attributed to the remote party. Used by the
    /// mid-conversation resume heuristic (a policy knob, not a detector).
    pub fn remote_message_count(&self) -> usize {
        self.messages.iter().filter(|message| message.sender == Sender::RemoteParty).count()
    }

    pub fn append(&mut self, sender: Sender, text: impl Into<String>) -> &ConversationMessage {
        let timestamp = self.next_timestamp(Utc::now());
        self.messages.push(ConversationMessage::new(sender, text, timestamp));
        self.messages.last().expect("just pushed")
    }

    /// Appends a batch of candidate messages, dropping any whose
    /// (sender, text) pair is already present in the log.
    ///
    /// Batch entries receive strictly increasing synthetic timestamps so
    /// ordering is preserved even when the batch was extracted in the same
    /// instant. Returns the number of messages actually appended.
    pub fn append_batch(&mut self, candidates: Vec<(Sender, String)>) -> usize {
        let mut appended = 0;
        for (sender, text) in candidates {
            if self.contains(sender, &text) {
                continue;
            }
            let timestamp = self.next_timestamp(Utc::now());
            self.messages.push(ConversationMessage::new(sender, text, timestamp));
            appended += 1;
        }
        appended
    }

    fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.messages.last() {
            Some(last) if now <= last.timestamp => {
                last.timestamp + chrono::Duration::milliseconds(1)
            }
            _ => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationLog, Sender};

    #[test]
    fn append_assigns_monotonic_timestamps() {
        let mut log = ConversationLog::new();
        log.append(Sender::RemoteParty, "Hello");
        log.append(Sender::Agent, "Hi there");
        log.append(Sender::RemoteParty, "How can I help?");

        // Same-instant appends fall back to the +1ms synthetic step, so
        // ordering is strict either way.
        let messages = log.messages();
        assert!(messages[0].timestamp < messages[1].timestamp);
        assert!(messages[1].timestamp < messages[2].timestamp);
    }

    #[test]
    fn duplicate_sender_text_pairs_are_dropped() {
        let mut log = ConversationLog::new();
        log.append(Sender::RemoteParty, "Hello");

        let appended = log.append_batch(vec![
            (Sender::RemoteParty, "Hello".to_owned()),
            (Sender::RemoteParty, "We can offer $49/mo".to_owned()),
        ]);

        assert_eq!(appended, 1);
        assert_eq!(log.len(), 2);
        assert!(log.contains(Sender::RemoteParty, "We can offer $49/mo"));
    }

    #[test]
    fn same_text_from_different_sender_is_not_a_duplicate() {
        let mut log = ConversationLog::new();
        log.append(Sender::RemoteParty, "ok");

        let appended = log.append_batch(vec![(Sender::System, "ok".to_owned())]);
        assert_eq!(appended, 1);
    }

    #[test]
    fn batch_entries_keep_strict_ordering_within_one_instant() {
        let mut log = ConversationLog::new();
        log.append_batch(vec![
            (Sender::RemoteParty, "first".to_owned()),
            (Sender::RemoteParty, "second".to_owned()),
            (Sender::RemoteParty, "third".to_owned()),
        ]);

        let messages = log.messages();
        assert!(messages[0].timestamp < messages[1].timestamp);
        assert!(messages[1].timestamp < messages[2].timestamp);
    }

    #[test]
    fn remote_message_count_ignores_agent_and_system() {
        let mut log = ConversationLog::new();
        log.append(Sender::RemoteParty, "Hello");
        log.append(Sender::Agent, "Hi");
        log.append(Sender::System, "session resumed");

        assert_eq!(log.remote_message_count(), 1);
    }
}
