// SPDX-License-Identifier: MIT

//! Natural-language answer formatting

use crate::adk::agent::{Agent, LLMAgent};
use crate::adk::error::Result;
use crate::adk::model::Model;
use crate::nl2sql::sql::prompts::{format_request, ANSWER_FORMAT_SYSTEM_PROMPT, NO_RESULTS};
use crate::nl2sql::sql::Row;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns result rows into an answer for the user
#[async_trait]
pub trait AnswerFormatter: Send + Sync {
    async fn format(&self, question: &str, rows: &[Row]) -> Result<String>;
}

/// Formatter backed by a language model
pub struct LlmAnswerFormatter {
    agent: LLMAgent,
}

impl LlmAnswerFormatter {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            agent: LLMAgent::new(
                "answer_formatter".to_string(),
                "Answers the question from query results".to_string(),
                ANSWER_FORMAT_SYSTEM_PROMPT.to_string(),
                model,
            ),
        }
    }
}

/// One JSON object per line, or the no-results marker
pub fn render_rows(rows: &[Row]) -> String {
    if rows.is_empty() {
        return NO_RESULTS.to_string();
    }
    rows.iter()
        .map(|r| serde_json::Value::Object(r.clone()).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl AnswerFormatter for LlmAnswerFormatter {
    async fn format(&self, question: &str, rows: &[Row]) -> Result<String> {
        let answer = self
            .agent
            .run(format_request(question, &render_rows(rows)))
            .await?;
        Ok(answer.trim().to_string())
    }
}
