use serde_json::Value;

use super::message::{Content, Message, Role};
use crate::exam::{render_system_prompt, ExamSettings, ASSISTANT_INIT_STATEMENT, USER_INIT_STATEMENT};

/// Ordered, append-only chat history.
///
/// `append` borrows the current history and returns a new one, so a history
/// that was already sent (or handed to another model pass) never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, role: Role, content: impl Into<Content>) -> Self {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.extend(self.messages.iter().cloned());
        messages.push(Message::new(role, content));
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn to_wire(&self) -> Value {
        Value::Array(self.messages.iter().map(Message::to_wire).collect())
    }
}

/// System instructions plus the scripted priming exchange for one exam.
pub fn seed_history(exam: &ExamSettings) -> Conversation {
    Conversation::new()
        .append(Role::System, render_system_prompt(exam))
        .append(Role::User, USER_INIT_STATEMENT)
        .append(Role::Assistant, ASSISTANT_INIT_STATEMENT)
}
