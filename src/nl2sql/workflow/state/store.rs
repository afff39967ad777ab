// SPDX-License-Identifier: MIT

//! Runtime state threaded through one workflow run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::message::{last_message_of, last_user_message, Message, MessageKind};
use crate::nl2sql::schema::SchemaDescription;
use crate::nl2sql::sql::Row;
use crate::nl2sql::workflow::graph::types::{Outcome, Stage};

/// Result of running the validated SQL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum ExecutionResult {
    Rows(Vec<Row>),
    Failed(String),
}

impl ExecutionResult {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            ExecutionResult::Rows(rows) => Some(rows),
            ExecutionResult::Failed(_) => None,
        }
    }
}

/// The single mutable record passed from stage to stage.
///
/// `messages` is append-only: it can only grow through [`push_message`].
///
/// [`push_message`]: WorkflowState::push_message
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub run_id: Uuid,
    messages: Vec<Message>,
    pub schema: Option<Arc<SchemaDescription>>,
    pub schema_fetched_at: Option<DateTime<Utc>>,
    pub question: Option<String>,
    pub resolved_entities: BTreeMap<String, String>,
    pub candidate_sql: Option<String>,
    pub validation_error: Option<String>,
    pub validated_sql: Option<String>,
    pub fix_attempts: u32,
    pub execution_result: Option<ExecutionResult>,
    pub format_output: bool,
    pub trace: Vec<Stage>,
    pub outcome: Option<Outcome>,
}

impl WorkflowState {
    /// Fresh state for a single question
    pub fn new(question: impl Into<String>) -> Self {
        Self::from_messages(vec![Message::user(question)])
    }

    /// Fresh state seeded with prior conversation turns
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            messages,
            schema: None,
            schema_fetched_at: None,
            question: None,
            resolved_entities: BTreeMap::new(),
            candidate_sql: None,
            validation_error: None,
            validated_sql: None,
            fix_attempts: 0,
            execution_result: None,
            format_output: false,
            trace: Vec::new(),
            outcome: None,
        }
    }

    /// Pre-populate the schema from a caller-owned cache
    pub fn with_schema(mut self, schema: Arc<SchemaDescription>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Fresh state for the next question of the same conversation.
    ///
    /// Carries the message history and the loaded schema; every
    /// per-run field starts over.
    pub fn follow_up(&self, question: impl Into<String>) -> Self {
        let mut messages = self.messages.clone();
        messages.push(Message::user(question));
        let mut next = Self::from_messages(messages);
        next.schema = self.schema.clone();
        next.schema_fetched_at = self.schema_fetched_at;
        next
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a message; earlier turns are never touched
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        last_user_message(&self.messages)
    }

    pub fn last_message_of(&self, kind: MessageKind) -> Option<&Message> {
        last_message_of(&self.messages, kind)
    }

    /// The question stages should work on: the resolved one when present
    pub fn working_question(&self) -> Option<&str> {
        self.question
            .as_deref()
            .or_else(|| self.last_user_message().map(|m| m.content.as_str()))
    }

    pub fn rows(&self) -> Option<&[Row]> {
        self.execution_result.as_ref().and_then(|r| r.rows())
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Enter the terminal state. Non-success outcomes append their
    /// user-facing message; success answers were appended by the stage
    /// that produced them.
    pub fn conclude(&mut self, outcome: Outcome) {
        match &outcome {
            Outcome::Success { .. } => {}
            Outcome::ClarificationNeeded { prompt, .. } => {
                self.push_message(Message::assistant(
                    MessageKind::Clarification,
                    prompt.clone(),
                ));
            }
            Outcome::Failed { failure } => {
                self.push_message(Message::assistant(
                    MessageKind::Error,
                    failure.user_message(),
                ));
            }
        }
        self.outcome = Some(outcome);
    }
}
