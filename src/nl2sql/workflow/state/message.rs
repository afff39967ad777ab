// SPDX-License-Identifier: MIT

//! Conversation turns threaded through a workflow run

use serde::{Deserialize, Serialize};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Tag for engine-produced messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Schema,
    Clarified,
    Clarification,
    SqlQuery,
    CheckResult,
    Results,
    Answer,
    Error,
    Summary,
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            kind: None,
        }
    }

    pub fn assistant(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            kind: Some(kind),
        }
    }

    pub fn system(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            kind: Some(kind),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == Some(MessageKind::Error)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Last message produced by the user
pub fn last_user_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|m| m.is_user())
}

/// Last message tagged with `kind`
pub fn last_message_of(messages: &[Message], kind: MessageKind) -> Option<&Message> {
    messages.iter().rev().find(|m| m.kind == Some(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_helpers() {
        let messages = vec![
            Message::user("first question"),
            Message::assistant(MessageKind::SqlQuery, "SELECT 1"),
            Message::user("second question"),
            Message::assistant(MessageKind::SqlQuery, "SELECT 2"),
            Message::assistant(MessageKind::Error, "no such column"),
        ];

        assert_eq!(
            last_user_message(&messages).unwrap().content,
            "second question"
        );
        assert_eq!(
            last_message_of(&messages, MessageKind::SqlQuery)
                .unwrap()
                .content,
            "SELECT 2"
        );
        assert!(last_message_of(&messages, MessageKind::Results).is_none());
        assert!(messages[4].is_error());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let msg = Message::assistant(MessageKind::SqlQuery, "SELECT 1");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "sql_query");
        assert_eq!(json["role"], "assistant");

        let user = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(user.get("kind").is_none());
    }
}
