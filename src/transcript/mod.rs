//! Transcript store: the ordered, role-tagged history of one conversation.

use crate::llm::{ChatMessage, Role};

/// Append-only message history with the system message pinned at index 0.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        Self { messages: vec![ChatMessage::new(Role::System, system_prompt)] }
    }

    /// Insert a system message at the front unless one is already there.
    pub fn ensure_system(&mut self, system_prompt: &str) {
        if self.messages.first().map(|m| m.role) != Some(Role::System) {
            self.messages.insert(0, ChatMessage::new(Role::System, system_prompt));
        }
    }

    /// Append a user or assistant message. System messages only live at index 0,
    /// so a late one replaces the pinned prompt instead of being appended.
    pub fn push(&mut self, message: ChatMessage) {
        if message.role == Role::System {
            match self.messages.first_mut() {
                Some(first) if first.role == Role::System => *first = message,
                _ => self.messages.insert(0, message),
            }
            return;
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Everything the chat view shows (the system prompt is hidden).
    pub fn visible(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }

    /// Drop the conversation but keep the system prompt.
    pub fn clear(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
