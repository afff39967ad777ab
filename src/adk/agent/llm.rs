// SPDX-License-Identifier: MIT

//! LLM Agent - a system instruction bound to a model
//!
//! The agent prepends its instruction to the supplied turns, sends one
//! request and returns the text of the reply.

use super::Agent;
use crate::adk::error::{ModelError, Result};
use crate::adk::model::{Content, GenerationConfig, Model};
use async_trait::async_trait;
use std::sync::Arc;

/// Standard single-request LLM agent
pub struct LLMAgent {
    pub name: String,
    pub description: String,
    pub instruction: String,
    pub model: Arc<dyn Model>,
    pub config: GenerationConfig,
}

impl LLMAgent {
    pub fn new(
        name: String,
        description: String,
        instruction: String,
        model: Arc<dyn Model>,
    ) -> Self {
        Self {
            name,
            description,
            instruction,
            model,
            config: GenerationConfig::default(),
        }
    }

    /// Override the generation config (temperature etc.)
    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl Agent for LLMAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_turns(&self, turns: Vec<Content>) -> Result<String> {
        let mut history = Vec::with_capacity(turns.len() + 1);
        if !self.instruction.is_empty() {
            history.push(Content::system(self.instruction.clone()));
        }
        history.extend(turns);

        log::info!(
            "Agent {} sending {} turns to model",
            self.name,
            history.len()
        );
        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;

        let text = response.text_content();
        if text.trim().is_empty() {
            log::warn!("Agent {} received empty response", self.name);
            return Err(ModelError::EmptyResponse.into());
        }

        log::info!(
            "Agent {} returning text response (length: {}, preview: '{}')",
            self.name,
            text.len(),
            text.chars().take(100).collect::<String>()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock model that records the history it received
    struct RecordingModel {
        reply: String,
        seen: Mutex<Vec<Content>>,
    }

    #[async_trait]
    impl Model for RecordingModel {
        async fn generate_content(
            &self,
            history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content> {
            *self.seen.lock().unwrap() = history.to_vec();
            Ok(Content::model(self.reply.clone()))
        }
    }

    #[tokio::test]
    async fn test_instruction_prepended() {
        let model = Arc::new(RecordingModel {
            reply: "SELECT 1".to_string(),
            seen: Mutex::new(vec![]),
        });
        let agent = LLMAgent::new(
            "sql".to_string(),
            "writes sql".to_string(),
            "You write SQLite".to_string(),
            model.clone(),
        );

        let out = agent.run("count players".to_string()).await.unwrap();
        assert_eq!(out, "SELECT 1");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].role, "system");
        assert_eq!(seen[0].text_content(), "You write SQLite");
        assert_eq!(seen[1].text_content(), "count players");
    }

    #[tokio::test]
    async fn test_empty_reply_is_error() {
        let model = Arc::new(RecordingModel {
            reply: "   ".to_string(),
            seen: Mutex::new(vec![]),
        });
        let agent = LLMAgent::new(String::new(), String::new(), String::new(), model);
        assert!(agent.run("x".to_string()).await.is_err());
    }
}
