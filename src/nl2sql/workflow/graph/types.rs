//! Workflow graph type definitions
//!
//! Stage identifiers, the signals a stage reports back to the router,
//! routing decisions and the terminal outcome of a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::nl2sql::sql::Row;

/// A node in the workflow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchSchema,
    ResolveEntities,
    GenerateSql,
    ValidateSql,
    FixSql,
    ExecuteSql,
    FormatAnswer,
}

impl Stage {
    /// Entry point of every run
    pub const INITIAL: Stage = Stage::FetchSchema;

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchSchema => "fetch_schema",
            Stage::ResolveEntities => "resolve_entities",
            Stage::GenerateSql => "generate_sql",
            Stage::ValidateSql => "validate_sql",
            Stage::FixSql => "fix_sql",
            Stage::ExecuteSql => "execute_sql",
            Stage::FormatAnswer => "format_answer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a fatal run outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The database could not be reached
    Connectivity,
    /// The generator or fixer itself failed
    Generation,
    /// The fix budget ran out without a valid candidate
    FixExhausted,
    /// Validated SQL failed at run time
    Execution,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Connectivity => "connectivity",
            FailureKind::Generation => "generation",
            FailureKind::FixExhausted => "fix_exhausted",
            FailureKind::Execution => "execution",
        };
        f.write_str(s)
    }
}

/// A classified fatal failure
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Text shown to the user as the final message of the run
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::FixExhausted | FailureKind::Generation => format!(
                "I could not build a valid query for your question. Last error: {}",
                self.message
            ),
            FailureKind::Execution | FailureKind::Connectivity => format!(
                "I could not run the query. Error: {}",
                self.message
            ),
        }
    }
}

/// The caller-visible answer of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    /// Rows returned as-is (formatting disabled)
    Raw { rows: Vec<Row> },
    /// Natural-language answer from the formatter
    Formatted { text: String },
    /// Formatting was requested but failed; rows are returned instead
    RawFallback { rows: Vec<Row>, reason: String },
}

impl Answer {
    pub fn is_formatted(&self) -> bool {
        matches!(self, Answer::Formatted { .. })
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Answer::Raw { rows } | Answer::RawFallback { rows, .. } => Some(rows),
            Answer::Formatted { .. } => None,
        }
    }

    /// Content of the final message for this answer
    pub fn render(&self) -> String {
        match self {
            Answer::Formatted { text } => text.clone(),
            Answer::Raw { rows } | Answer::RawFallback { rows, .. } => {
                serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }
}

/// Absorbing terminal classification of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { answer: Answer },
    ClarificationNeeded { prompt: String, mentions: Vec<String> },
    Failed { failure: Failure },
}

impl Outcome {
    pub fn success(answer: Answer) -> Self {
        Outcome::Success { answer }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Outcome::Failed {
            failure: Failure::new(kind, message),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Failed { failure } => Some(failure),
            _ => None,
        }
    }

    pub fn answer(&self) -> Option<&Answer> {
        match self {
            Outcome::Success { answer } => Some(answer),
            _ => None,
        }
    }
}

/// What a stage reports back after running
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The stage completed and stored its result in the state
    Done,
    /// The candidate SQL failed validation
    Invalid,
    /// The question is ambiguous
    Clarify { prompt: String, mentions: Vec<String> },
    /// The formatting stage finished with this answer
    Answered(Answer),
    /// A collaborator failed; already classified
    Fail(Failure),
}

/// Routing decision
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Next(Stage),
    Finish(Outcome),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::INITIAL, Stage::FetchSchema);
        assert_eq!(Stage::FixSql.to_string(), "fix_sql");
        assert_eq!(
            serde_json::to_value(Stage::ValidateSql).unwrap(),
            json!("validate_sql")
        );
    }

    #[test]
    fn test_failure_messages_are_distinguishable() {
        let fix = Failure::new(FailureKind::FixExhausted, "no such column: x").user_message();
        let exec = Failure::new(FailureKind::Execution, "disk I/O error").user_message();
        let conn = Failure::new(FailureKind::Connectivity, "unable to open").user_message();

        assert!(fix.starts_with("I could not build a valid query"));
        assert!(fix.contains("no such column: x"));
        assert!(exec.starts_with("I could not run the query"));
        assert!(conn.starts_with("I could not run the query"));
        assert_ne!(fix, exec);
    }

    #[test]
    fn test_answer_render() {
        let mut row = Row::new();
        row.insert("total".to_string(), json!(12));

        let raw = Answer::Raw {
            rows: vec![row.clone()],
        };
        assert_eq!(raw.render(), r#"[{"total":12}]"#);
        assert!(!raw.is_formatted());

        let fallback = Answer::RawFallback {
            rows: vec![row],
            reason: "timeout".to_string(),
        };
        assert_eq!(fallback.rows().unwrap().len(), 1);

        let text = Answer::Formatted {
            text: "Twaalf.".to_string(),
        };
        assert!(text.is_formatted());
        assert_eq!(text.render(), "Twaalf.");
        assert!(text.rows().is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = Outcome::failed(FailureKind::Execution, "boom");
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["failure"]["kind"], "execution");
        assert_eq!(outcome.failure().unwrap().message, "boom");
        assert!(outcome.answer().is_none());
    }
}
