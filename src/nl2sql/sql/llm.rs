// SPDX-License-Identifier: MIT

//! Model-backed SQL generator and fixer

use super::prompts::{
    fix_request, generation_request, SQL_FIXING_SYSTEM_PROMPT, SQL_GENERATION_SYSTEM_PROMPT,
};
use super::{clean_sql_output, SqlFixer, SqlGenerator};
use crate::adk::agent::{Agent, LLMAgent};
use crate::adk::error::{ModelError, Result};
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::nl2sql::examples::Example;
use crate::nl2sql::memory::render_transcript;
use crate::nl2sql::schema::SchemaDescription;
use crate::nl2sql::workflow::state::Message;
use async_trait::async_trait;
use std::sync::Arc;

fn sql_config() -> GenerationConfig {
    GenerationConfig {
        temperature: Some(0.0),
        ..Default::default()
    }
}

/// Generates SQL with few-shot examples as prior user/model turns
pub struct LlmSqlGenerator {
    agent: LLMAgent,
}

impl LlmSqlGenerator {
    pub fn new(model: Arc<dyn Model>) -> Self {
        let agent = LLMAgent::new(
            "sql_generator".to_string(),
            "Writes SQLite queries for natural language questions".to_string(),
            SQL_GENERATION_SYSTEM_PROMPT.to_string(),
            model,
        )
        .with_config(sql_config());
        Self { agent }
    }
}

#[async_trait]
impl SqlGenerator for LlmSqlGenerator {
    async fn generate(
        &self,
        question: &str,
        schema: &SchemaDescription,
        examples: &[Example],
        conversation: &[Message],
    ) -> Result<String> {
        let mut turns = Vec::with_capacity(examples.len() * 2 + 1);
        for ex in examples {
            turns.push(Content::user(ex.natural_language_query.clone()));
            turns.push(Content::model(ex.query.clone()));
        }
        turns.push(Content::user(generation_request(
            question,
            &render_transcript(conversation),
            &schema.render(),
        )));

        log::info!("Generating SQL for: {}", question);
        let sql = clean_sql_output(&self.agent.run_turns(turns).await?);
        if sql.is_empty() {
            return Err(ModelError::EmptyResponse.into());
        }
        log::info!("Generated SQL: {}", sql);
        Ok(sql)
    }
}

/// Repairs invalid SQL from the validation error
pub struct LlmSqlFixer {
    agent: LLMAgent,
}

impl LlmSqlFixer {
    pub fn new(model: Arc<dyn Model>) -> Self {
        let agent = LLMAgent::new(
            "sql_fixer".to_string(),
            "Repairs invalid SQLite queries".to_string(),
            SQL_FIXING_SYSTEM_PROMPT.to_string(),
            model,
        )
        .with_config(sql_config());
        Self { agent }
    }
}

#[async_trait]
impl SqlFixer for LlmSqlFixer {
    async fn fix(
        &self,
        sql: &str,
        reason: &str,
        schema: &SchemaDescription,
        question: &str,
    ) -> Result<String> {
        log::warn!("Attempting to fix SQL: {} (error: {})", sql, reason);
        let reply = self
            .agent
            .run(fix_request(&schema.render(), question, sql, reason))
            .await?;
        let fixed = clean_sql_output(&reply);
        if fixed.is_empty() {
            return Err(ModelError::EmptyResponse.into());
        }
        log::info!("Proposed fixed SQL: {}", fixed);
        Ok(fixed)
    }
}
