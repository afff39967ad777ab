// SPDX-License-Identifier: MIT

//! Model module - defines LLM model trait and implementations
//!
//! This module provides the core Model trait and shared types.
//! Model implementations are in their own submodules:
//! - [gemini] - Google's Gemini API
//! - [openai] - OpenAI's chat completions API (and compatible endpoints)

pub mod gemini;
pub mod openai;

use crate::adk::error::{ModelError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text("system", text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text("user", text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::text("model", text)
    }

    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, ignoring thinking output
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models
    Thinking(String),
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content>;
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    /// Infer the provider from a model name
    pub fn infer(model_name: &str) -> Self {
        if model_name.starts_with("gemini") {
            Provider::Gemini
        } else {
            Provider::OpenAI
        }
    }
}

impl FromStr for Provider {
    type Err = ModelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(ModelError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAI => write!(f, "openai"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Credentials and model selection for an LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCredentials {
    pub provider: Provider,
    pub model_name: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: Option<String>,
}

/// Build a model for the given credentials
pub fn create_model(credentials: &LlmCredentials) -> Result<Arc<dyn Model>> {
    if credentials.api_key.trim().is_empty() {
        return Err(ModelError::ApiKeyMissing(credentials.provider.to_string()).into());
    }

    log::info!(
        "Using provider: {} with model: {}",
        credentials.provider,
        credentials.model_name
    );

    let model: Arc<dyn Model> = match credentials.provider {
        Provider::OpenAI => Arc::new(openai::OpenAIModel::new(
            credentials.model_name.clone(),
            credentials.api_key.clone(),
            credentials.base_url.clone(),
        )),
        Provider::Gemini => Arc::new(gemini::GeminiModel::new(
            credentials.model_name.clone(),
            credentials.api_key.clone(),
            credentials.base_url.clone(),
        )),
    };
    Ok(model)
}
