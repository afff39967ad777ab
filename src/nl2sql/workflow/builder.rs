// SPDX-License-Identifier: MIT

//! Workflow builder - wires a production engine from `Config`
//!
//! The SQLite database serves as schema provider, validator, executor
//! and name source; one model backs the generator, fixer, formatter and
//! the conversation summarizer.

use crate::adk::agent::LLMAgent;
use crate::adk::error::Result;
use crate::adk::model::create_model;
use crate::nl2sql::config::Config;
use crate::nl2sql::db::SqliteDatabase;
use crate::nl2sql::examples::{ExampleStore, DEFAULT_EXAMPLE_COUNT};
use crate::nl2sql::formatter::{AnswerFormatter, LlmAnswerFormatter};
use crate::nl2sql::memory::ContextPreparer;
use crate::nl2sql::resolver::FuzzyEntityResolver;
use crate::nl2sql::schema::{ConnectionHandle, SchemaCache};
use crate::nl2sql::sql::{LlmSqlFixer, LlmSqlGenerator};
use crate::nl2sql::workflow::graph::{Collaborators, WorkflowEngine};

use std::sync::Arc;

/// High-level builder for constructing the workflow engine
pub struct Builder {
    config: Config,
    schema_cache: Option<Arc<SchemaCache>>,
}

impl Builder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            schema_cache: None,
        }
    }

    /// Reuse a schema cache owned by the caller
    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schema_cache = Some(cache);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The SQLite collaborator for the configured database
    pub fn database(&self) -> SqliteDatabase {
        SqliteDatabase::new(ConnectionHandle::new(self.config.database_url.clone()))
    }

    /// Build the engine
    pub fn build(&self) -> Result<WorkflowEngine> {
        self.config.validate()?;
        let model = create_model(&self.config.llm)?;
        let db = Arc::new(self.database());
        let connection = db.connection().clone();

        let formatter: Option<Arc<dyn AnswerFormatter>> = if self.config.engine.format_output {
            Some(Arc::new(LlmAnswerFormatter::new(model.clone())))
        } else {
            None
        };

        let collaborators = Collaborators {
            schema_provider: db.clone(),
            resolver: Arc::new(FuzzyEntityResolver::new(
                db.clone(),
                self.config.name_columns.clone(),
            )),
            generator: Arc::new(LlmSqlGenerator::new(model.clone())),
            validator: db.clone(),
            fixer: Arc::new(LlmSqlFixer::new(model.clone())),
            executor: db,
            formatter,
        };

        let summarizer = LLMAgent::new(
            "summarizer".to_string(),
            "Summarizes older conversation turns".to_string(),
            String::new(),
            model,
        );
        let context =
            ContextPreparer::new(self.config.context).with_summarizer(Arc::new(summarizer));
        let examples = ExampleStore::load(self.config.examples_file.as_deref());

        let mut engine = WorkflowEngine::new(connection, self.config.engine, collaborators)?
            .with_examples(examples, DEFAULT_EXAMPLE_COUNT)
            .with_context(context);
        if let Some(cache) = &self.schema_cache {
            engine = engine.with_schema_cache(cache.clone());
        }

        log::info!(
            "Built workflow engine for {} (model: {}, max fix attempts: {}, format output: {})",
            self.config.database_url,
            self.config.llm.model_name,
            self.config.engine.max_sql_fix_attempts,
            self.config.engine.format_output
        );
        Ok(engine)
    }
}
