// SPDX-License-Identifier: MIT

//! Application configuration
//!
//! `Config` is built once, either from the environment or in code, and
//! handed to the workflow builder. Stage logic only ever sees the
//! `EngineSettings` and `ContextSettings` subsets.

use crate::adk::error::{Nl2SqlError, Result};
use crate::adk::model::{LlmCredentials, Provider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_SQL_FIX_ATTEMPTS: u32 = 1;
pub const DEFAULT_RECENT_MESSAGES_KEPT: usize = 15;
pub const DEFAULT_OLDER_MESSAGES_CHAR_THRESHOLD: usize = 3000;

/// Routing-relevant options fixed at engine construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub max_sql_fix_attempts: u32,
    pub format_output: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_sql_fix_attempts: DEFAULT_MAX_SQL_FIX_ATTEMPTS,
            format_output: false,
        }
    }
}

/// Limits for condensing conversation history before LLM stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    pub recent_kept: usize,
    pub older_char_threshold: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            recent_kept: DEFAULT_RECENT_MESSAGES_KEPT,
            older_char_threshold: DEFAULT_OLDER_MESSAGES_CHAR_THRESHOLD,
        }
    }
}

/// A table/column pair holding canonical entity names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameColumn {
    pub table: String,
    pub column: String,
}

impl NameColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

fn default_name_columns() -> Vec<NameColumn> {
    vec![
        NameColumn::new("players", "playerName"),
        NameColumn::new("clubs", "clubName"),
    ]
}

/// Full application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub llm: LlmCredentials,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub examples_file: Option<PathBuf>,
    #[serde(default = "default_name_columns")]
    pub name_columns: Vec<NameColumn>,
}

impl Config {
    /// Configuration with defaults for everything but the essentials
    pub fn new(database_url: impl Into<String>, llm: LlmCredentials) -> Self {
        Self {
            database_url: database_url.into(),
            llm,
            engine: EngineSettings::default(),
            context: ContextSettings::default(),
            examples_file: None,
            name_columns: default_name_columns(),
        }
    }

    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Only the database URL, for tools that never talk to the model
    pub fn database_url_from_env() -> Result<String> {
        Self::database_url_from_lookup(|key| std::env::var(key).ok())
    }

    pub fn database_url_from_lookup<F>(lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("NL2SQL_DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Nl2SqlError::config("NL2SQL_DATABASE_URL is not set"))
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("NL2SQL_DATABASE_URL").unwrap_or_default();
        let model_name = var("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let provider = match var("LLM_PROVIDER") {
            Some(p) => p.parse::<Provider>()?,
            None => Provider::infer(&model_name),
        };
        let fallback_key = match provider {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Gemini => "GOOGLE_API_KEY",
        };
        let api_key = var("LLM_API_KEY")
            .or_else(|| var(fallback_key))
            .unwrap_or_default();

        let engine = EngineSettings {
            max_sql_fix_attempts: parse_var(&var, "MAX_SQL_FIX_ATTEMPTS")?
                .unwrap_or(DEFAULT_MAX_SQL_FIX_ATTEMPTS),
            format_output: parse_bool(&var, "FORMAT_OUTPUT")?.unwrap_or(false),
        };
        let context = ContextSettings {
            recent_kept: parse_var(&var, "CONTEXT_RECENT_MESSAGES_KEPT")?
                .unwrap_or(DEFAULT_RECENT_MESSAGES_KEPT),
            older_char_threshold: parse_var(&var, "CONTEXT_OLDER_MESSAGES_CHAR_THRESHOLD")?
                .unwrap_or(DEFAULT_OLDER_MESSAGES_CHAR_THRESHOLD),
        };

        let config = Self {
            database_url,
            llm: LlmCredentials {
                provider,
                model_name,
                api_key,
                base_url: var("LLM_BASE_URL"),
            },
            engine,
            context,
            examples_file: var("EXAMPLES_FILE").map(PathBuf::from),
            name_columns: default_name_columns(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Nl2SqlError::config("NL2SQL_DATABASE_URL is not set"));
        }
        if self.llm.api_key.trim().is_empty() {
            return Err(Nl2SqlError::config(format!(
                "no API key configured for provider '{}' (set LLM_API_KEY)",
                self.llm.provider
            )));
        }
        if self.context.recent_kept == 0 {
            return Err(Nl2SqlError::config(
                "CONTEXT_RECENT_MESSAGES_KEPT must be at least 1",
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Nl2SqlError::config(format!("invalid value for {}: '{}'", key, raw))),
        None => Ok(None),
    }
}

fn parse_bool<F>(var: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(Nl2SqlError::config(format!(
                "invalid boolean for {}: '{}'",
                key, raw
            ))),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("NL2SQL_DATABASE_URL", "sqlite:///feyod.sqlite"),
            ("LLM_API_KEY", "sk-test"),
        ]))
        .unwrap();

        assert_eq!(config.llm.model_name, DEFAULT_MODEL);
        assert_eq!(config.llm.provider, Provider::OpenAI);
        assert_eq!(config.engine.max_sql_fix_attempts, 1);
        assert!(!config.engine.format_output);
        assert_eq!(config.context.recent_kept, 15);
        assert_eq!(config.context.older_char_threshold, 3000);
        assert!(config.examples_file.is_none());
        assert_eq!(config.name_columns.len(), 2);
    }

    #[test]
    fn test_provider_inferred_and_fallback_key() {
        let config = Config::from_lookup(lookup(&[
            ("NL2SQL_DATABASE_URL", "db.sqlite"),
            ("LLM_MODEL", "gemini-2.0-flash"),
            ("GOOGLE_API_KEY", "g-key"),
        ]))
        .unwrap();

        assert_eq!(config.llm.provider, Provider::Gemini);
        assert_eq!(config.llm.api_key, "g-key");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("NL2SQL_DATABASE_URL", "db.sqlite"),
            ("LLM_API_KEY", "k"),
            ("LLM_PROVIDER", "google"),
            ("MAX_SQL_FIX_ATTEMPTS", "3"),
            ("FORMAT_OUTPUT", "true"),
            ("EXAMPLES_FILE", "examples.yaml"),
        ]))
        .unwrap();

        assert_eq!(config.llm.provider, Provider::Gemini);
        assert_eq!(config.engine.max_sql_fix_attempts, 3);
        assert!(config.engine.format_output);
        assert_eq!(config.examples_file, Some(PathBuf::from("examples.yaml")));
    }

    #[test]
    fn test_missing_database_url_rejected() {
        let err = Config::from_lookup(lookup(&[("LLM_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, Nl2SqlError::Config(_)));
    }

    #[test]
    fn test_database_url_loads_without_api_key() {
        let url = Config::database_url_from_lookup(lookup(&[(
            "NL2SQL_DATABASE_URL",
            "sqlite:///feyod.sqlite",
        )]))
        .unwrap();
        assert_eq!(url, "sqlite:///feyod.sqlite");

        let err = Config::database_url_from_lookup(lookup(&[("NL2SQL_DATABASE_URL", "  ")]))
            .unwrap_err();
        assert!(matches!(err, Nl2SqlError::Config(_)));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let err = Config::from_lookup(lookup(&[("NL2SQL_DATABASE_URL", "db")])).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("NL2SQL_DATABASE_URL", "db"),
            ("LLM_API_KEY", "k"),
            ("MAX_SQL_FIX_ATTEMPTS", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MAX_SQL_FIX_ATTEMPTS"));

        let err = Config::from_lookup(lookup(&[
            ("NL2SQL_DATABASE_URL", "db"),
            ("LLM_API_KEY", "k"),
            ("FORMAT_OUTPUT", "maybe"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("FORMAT_OUTPUT"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("NL2SQL_DATABASE_URL", "db"),
            ("LLM_API_KEY", "k"),
            ("LLM_PROVIDER", "anthropic"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Nl2SqlError::Model(_)));
    }
}
