//! Ordered conversation state with a single in-flight assistant turn.
//!
//! Readers only ever see [`Transcript`] snapshots. Every mutation builds a
//! new snapshot and replaces the touched message with a fresh value, so a
//! snapshot taken mid-stream never changes underneath its holder.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::api::{StreamDelta, WireMessage};
use crate::core::message::{Message, Role};

/// Immutable view of the conversation at one point in time.
#[derive(Clone, Debug, Default)]
pub struct Transcript(Arc<Vec<Arc<Message>>>);

impl Transcript {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.0.get(index).map(Arc::as_ref)
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last().map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.0.iter().map(Arc::as_ref)
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.iter().cloned().collect()
    }

    fn make_mut(&mut self) -> &mut Vec<Arc<Message>> {
        Arc::make_mut(&mut self.0)
    }
}

pub struct Session {
    messages: Transcript,
    turn_open: bool,
    publisher: watch::Sender<Transcript>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            messages: Transcript::default(),
            turn_open: false,
            publisher: watch::Sender::new(Transcript::default()),
        }
    }

    /// Rebuild a session from persisted messages. No turn is open afterwards.
    /// The first system message is moved to the front and any later ones
    /// are dropped.
    pub fn restore(&mut self, messages: Vec<Message>) {
        let mut system = None;
        let mut rest = Vec::with_capacity(messages.len());
        for message in messages {
            if !message.role.is_system() {
                rest.push(Arc::new(message));
            } else if system.is_none() {
                system = Some(Arc::new(message));
            } else {
                debug!(id = %message.id, "Dropping extra system message on restore");
            }
        }
        if let Some(system) = system {
            rest.insert(0, system);
        }
        self.messages = Transcript(Arc::new(rest));
        self.turn_open = false;
        self.publish();
    }

    pub fn snapshot(&self) -> Transcript {
        self.messages.clone()
    }

    /// Observe every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.publisher.subscribe()
    }

    pub fn is_turn_open(&self) -> bool {
        self.turn_open
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> String {
        self.push(Message::user(content))
    }

    /// Insert a leading system message unless the conversation already has
    /// one. Returns whether a message was inserted.
    pub fn ensure_system_prompt(&mut self, prompt: &str) -> bool {
        if self.messages.iter().any(|message| message.role.is_system()) {
            return false;
        }
        self.messages
            .make_mut()
            .insert(0, Arc::new(Message::system(prompt)));
        self.publish();
        true
    }

    /// Append an empty assistant message and make it the mutation target.
    pub fn begin_assistant_turn(&mut self) -> String {
        let id = self.push(Message::assistant(String::new()));
        self.turn_open = true;
        id
    }

    /// Append the delta's text to the in-flight assistant message. Returns
    /// whether the transcript changed.
    pub fn apply_delta(&mut self, delta: &StreamDelta) -> bool {
        let content = delta.content.as_deref().unwrap_or_default();
        if content.is_empty() {
            return false;
        }
        self.replace_in_flight(|current| {
            let mut next = String::with_capacity(current.len() + content.len());
            next.push_str(current);
            next.push_str(content);
            next
        })
    }

    /// Fill the in-flight assistant message in one step.
    pub fn set_assistant_content(&mut self, content: &str) -> bool {
        self.replace_in_flight(|_| content.to_string())
    }

    /// Close the turn. Later deltas are ignored until the next
    /// [`Session::begin_assistant_turn`].
    pub fn end_turn(&mut self) {
        self.turn_open = false;
    }

    pub fn reset(&mut self) {
        self.messages = Transcript::default();
        self.turn_open = false;
        self.publish();
    }

    /// Request projection of the whole conversation.
    pub fn wire_messages(&self) -> Vec<WireMessage> {
        self.messages.iter().map(Message::to_wire).collect()
    }

    fn push(&mut self, message: Message) -> String {
        let id = message.id.clone();
        self.messages.make_mut().push(Arc::new(message));
        self.publish();
        id
    }

    fn replace_in_flight(&mut self, update: impl FnOnce(&str) -> String) -> bool {
        if !self.turn_open {
            return false;
        }
        let Some(last) = self.messages.last() else {
            return false;
        };
        if last.role != Role::Assistant {
            return false;
        }

        let replacement = last.with_content(update(&last.content));
        if let Some(slot) = self.messages.make_mut().last_mut() {
            *slot = Arc::new(replacement);
        }
        self.publish();
        true
    }

    fn publish(&self) {
        self.publisher.send_replace(self.messages.clone());
    }
}
