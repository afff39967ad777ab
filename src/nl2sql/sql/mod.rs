// SPDX-License-Identifier: MIT

//! SQL collaborators
//!
//! Traits for the generate → validate → fix → execute pipeline. The
//! engine only sees these traits; `llm` provides model-backed generator
//! and fixer implementations and `crate::nl2sql::db` the SQLite side.

mod llm;
pub mod prompts;

pub use llm::{LlmSqlFixer, LlmSqlGenerator};

use crate::adk::error::Result;
use crate::nl2sql::examples::Example;
use crate::nl2sql::schema::{ConnectionHandle, SchemaDescription};
use crate::nl2sql::workflow::state::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A result row: column name → value, in select order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of a static validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Validation {
    Valid,
    Invalid(String),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }
}

/// Produces a candidate SQL string for a question
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// `conversation` is the prepared context of earlier turns
    async fn generate(
        &self,
        question: &str,
        schema: &SchemaDescription,
        examples: &[Example],
        conversation: &[Message],
    ) -> Result<String>;
}

/// Checks SQL against the schema without running it
#[async_trait]
pub trait SqlValidator: Send + Sync {
    async fn validate(&self, sql: &str, schema: &SchemaDescription) -> Result<Validation>;
}

/// Repairs a candidate that failed validation
#[async_trait]
pub trait SqlFixer: Send + Sync {
    async fn fix(
        &self,
        sql: &str,
        reason: &str,
        schema: &SchemaDescription,
        question: &str,
    ) -> Result<String>;
}

/// Runs validated SQL
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str, connection: &ConnectionHandle) -> Result<Vec<Row>>;
}

/// Strip markdown fences and collapse a model reply into a single-line query
pub fn clean_sql_output(raw: &str) -> String {
    let mut sql = raw.trim();
    for fence in ["```sqlite", "```sql", "```SQL", "```"] {
        if let Some(rest) = sql.strip_prefix(fence) {
            sql = rest;
            break;
        }
    }
    if let Some(rest) = sql.strip_suffix("```") {
        sql = rest;
    }
    sql.trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
