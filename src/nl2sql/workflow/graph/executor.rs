//! Workflow engine
//!
//! Drives a `WorkflowState` through the stages until the router returns
//! a terminal outcome. Each stage calls one collaborator, classifies any
//! failure it reports and writes the result into the state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::router::route;
use super::types::{Answer, Failure, FailureKind, Signal, Stage, Transition};
use crate::adk::error::{Nl2SqlError, Result, WorkflowError};
use crate::nl2sql::config::EngineSettings;
use crate::nl2sql::examples::{ExampleStore, DEFAULT_EXAMPLE_COUNT};
use crate::nl2sql::formatter::AnswerFormatter;
use crate::nl2sql::memory::ContextPreparer;
use crate::nl2sql::resolver::{EntityResolver, Resolution};
use crate::nl2sql::schema::{ConnectionHandle, SchemaCache, SchemaDescription, SchemaProvider};
use crate::nl2sql::sql::{SqlExecutor, SqlFixer, SqlGenerator, SqlValidator, Validation};
use crate::nl2sql::workflow::state::{ExecutionResult, Message, MessageKind, WorkflowState};

/// External collaborators invoked by the stages
#[derive(Clone)]
pub struct Collaborators {
    pub schema_provider: Arc<dyn SchemaProvider>,
    pub resolver: Arc<dyn EntityResolver>,
    pub generator: Arc<dyn SqlGenerator>,
    pub validator: Arc<dyn SqlValidator>,
    pub fixer: Arc<dyn SqlFixer>,
    pub executor: Arc<dyn SqlExecutor>,
    pub formatter: Option<Arc<dyn AnswerFormatter>>,
}

/// State-machine driver for NL→SQL runs
pub struct WorkflowEngine {
    connection: ConnectionHandle,
    settings: EngineSettings,
    collaborators: Collaborators,
    examples: ExampleStore,
    example_count: usize,
    context: ContextPreparer,
    schema_cache: Arc<SchemaCache>,
}

impl WorkflowEngine {
    /// Create an engine. Fails when formatting is enabled without a formatter.
    pub fn new(
        connection: ConnectionHandle,
        settings: EngineSettings,
        collaborators: Collaborators,
    ) -> Result<Self> {
        if settings.format_output && collaborators.formatter.is_none() {
            return Err(WorkflowError::MissingFormatter.into());
        }
        Ok(Self {
            connection,
            settings,
            collaborators,
            examples: ExampleStore::default(),
            example_count: DEFAULT_EXAMPLE_COUNT,
            context: ContextPreparer::default(),
            schema_cache: Arc::new(SchemaCache::new()),
        })
    }

    /// Few-shot examples offered to the generator
    pub fn with_examples(mut self, examples: ExampleStore, count: usize) -> Self {
        self.examples = examples;
        self.example_count = count;
        self
    }

    /// Context preparation applied before generation
    pub fn with_context(mut self, context: ContextPreparer) -> Self {
        self.context = context;
        self
    }

    /// Share a schema cache with other engines
    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schema_cache = cache;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schema_cache
    }

    /// Answer a single question
    pub async fn ask(&self, question: impl Into<String>) -> Result<WorkflowState> {
        self.run(WorkflowState::new(question)).await
    }

    /// Drive `initial` to a terminal state.
    ///
    /// Returns `Err` only when the state has no user message or carries a
    /// follow-up question after its outcome; every collaborator failure
    /// ends up in `outcome` instead. A concluded state is returned as-is.
    pub async fn run(&self, initial: WorkflowState) -> Result<WorkflowState> {
        if initial.last_user_message().is_none() {
            return Err(WorkflowError::MissingUserMessage.into());
        }
        let mut state = initial;
        if state.is_terminal() {
            if state.last_message().is_some_and(|m| m.is_user()) {
                return Err(WorkflowError::AlreadyConcluded.into());
            }
            return Ok(state);
        }
        state.format_output = self.settings.format_output;

        log::info!(
            "[{}] Starting workflow run (max fix attempts: {}, format output: {})",
            state.run_id,
            self.settings.max_sql_fix_attempts,
            self.settings.format_output
        );

        let mut stage = Stage::INITIAL;
        loop {
            state.trace.push(stage);
            log::info!("[{}] Stage: {}", state.run_id, stage);

            let signal = self.execute_stage(stage, &mut state).await;
            match route(stage, signal, &state, &self.settings) {
                Transition::Next(next) => {
                    log::debug!("[{}] {} -> {}", state.run_id, stage, next);
                    stage = next;
                }
                Transition::Finish(outcome) => {
                    match outcome.failure() {
                        Some(failure) => {
                            log::warn!("[{}] Run failed at {}: {}", state.run_id, stage, failure)
                        }
                        None => log::info!("[{}] Run finished at {}", state.run_id, stage),
                    }
                    state.conclude(outcome);
                    return Ok(state);
                }
            }
        }
    }

    /// Run with a caller-supplied deadline covering the whole run
    pub async fn run_with_timeout(
        &self,
        initial: WorkflowState,
        deadline: Duration,
    ) -> Result<WorkflowState> {
        tokio::time::timeout(deadline, self.run(initial))
            .await
            .map_err(|_| Nl2SqlError::Timeout(deadline))?
    }

    async fn execute_stage(&self, stage: Stage, state: &mut WorkflowState) -> Signal {
        match stage {
            Stage::FetchSchema => self.fetch_schema(state).await,
            Stage::ResolveEntities => self.resolve_entities(state).await,
            Stage::GenerateSql => self.generate_sql(state).await,
            Stage::ValidateSql => self.validate_sql(state).await,
            Stage::FixSql => self.fix_sql(state).await,
            Stage::ExecuteSql => self.execute_sql(state).await,
            Stage::FormatAnswer => self.format_answer(state).await,
        }
    }

    async fn fetch_schema(&self, state: &mut WorkflowState) -> Signal {
        if state.schema.is_some() {
            log::debug!("[{}] Schema already present", state.run_id);
            return Signal::Done;
        }
        let provider = self.collaborators.schema_provider.as_ref();
        match self.schema_cache.get_or_fetch(&self.connection, provider).await {
            Ok(schema) => {
                state.schema = Some(schema);
                state.schema_fetched_at = Some(Utc::now());
                state.push_message(Message::assistant(MessageKind::Schema, "Schema loaded."));
                Signal::Done
            }
            Err(e) => {
                log::error!("[{}] Error getting schema: {}", state.run_id, e);
                fail(FailureKind::Connectivity, e)
            }
        }
    }

    async fn resolve_entities(&self, state: &mut WorkflowState) -> Signal {
        let schema = match require_schema(state) {
            Ok(s) => s,
            Err(signal) => return signal,
        };
        let raw = state
            .last_user_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        match self.collaborators.resolver.resolve(&raw, &schema).await {
            Ok(Resolution::Resolved { question, entities }) => {
                state.resolved_entities.extend(entities);
                state.question = Some(question);
                state.push_message(Message::assistant(
                    MessageKind::Clarified,
                    "Entities clarified.",
                ));
                Signal::Done
            }
            Ok(Resolution::ClarificationNeeded { prompt, mentions }) => {
                log::info!("[{}] Clarification needed for {:?}", state.run_id, mentions);
                Signal::Clarify { prompt, mentions }
            }
            Err(e) => {
                log::warn!(
                    "[{}] Entity resolution failed, continuing with the raw question: {}",
                    state.run_id,
                    e
                );
                state.question = Some(raw);
                Signal::Done
            }
        }
    }

    async fn generate_sql(&self, state: &mut WorkflowState) -> Signal {
        let schema = match require_schema(state) {
            Ok(s) => s,
            Err(signal) => return signal,
        };
        let question = state.working_question().unwrap_or_default().to_string();
        let conversation = self.context.prepare(state.messages()).await;
        let examples = self.examples.select(&question, self.example_count);

        match self
            .collaborators
            .generator
            .generate(&question, &schema, &examples, &conversation)
            .await
        {
            Ok(sql) => {
                state.candidate_sql = Some(sql.clone());
                state.validation_error = None;
                state.validated_sql = None;
                state.push_message(Message::assistant(MessageKind::SqlQuery, sql));
                Signal::Done
            }
            Err(e) => {
                log::error!("[{}] Error generating SQL: {}", state.run_id, e);
                fail(FailureKind::Generation, e)
            }
        }
    }

    async fn validate_sql(&self, state: &mut WorkflowState) -> Signal {
        let schema = match require_schema(state) {
            Ok(s) => s,
            Err(signal) => return signal,
        };
        let Some(sql) = state.candidate_sql.clone() else {
            return fail(FailureKind::Generation, "no SQL query to check");
        };

        let verdict = match self.collaborators.validator.validate(&sql, &schema).await {
            Ok(v) => v,
            Err(e) if e.is_connectivity() => {
                log::error!("[{}] Database unreachable during validation: {}", state.run_id, e);
                return fail(FailureKind::Connectivity, e);
            }
            Err(e) => Validation::Invalid(format!("Error checking SQL: {}", e)),
        };

        match verdict {
            Validation::Valid => {
                state.validation_error = None;
                state.validated_sql = Some(sql);
                state.push_message(Message::assistant(MessageKind::CheckResult, "Syntax check OK"));
                Signal::Done
            }
            Validation::Invalid(reason) => {
                log::warn!("[{}] SQL failed validation: {}", state.run_id, reason);
                state.validation_error = Some(reason.clone());
                state.validated_sql = None;
                state.push_message(Message::assistant(MessageKind::Error, reason));
                Signal::Invalid
            }
        }
    }

    async fn fix_sql(&self, state: &mut WorkflowState) -> Signal {
        let schema = match require_schema(state) {
            Ok(s) => s,
            Err(signal) => return signal,
        };
        let (Some(sql), Some(reason)) = (state.candidate_sql.clone(), state.validation_error.clone())
        else {
            return fail(FailureKind::Generation, "cannot fix query: missing context");
        };
        let question = state.working_question().unwrap_or_default().to_string();

        state.fix_attempts += 1;
        log::warn!(
            "[{}] Fix attempt {}/{}",
            state.run_id,
            state.fix_attempts,
            self.settings.max_sql_fix_attempts
        );

        match self
            .collaborators
            .fixer
            .fix(&sql, &reason, &schema, &question)
            .await
        {
            Ok(fixed) => {
                state.candidate_sql = Some(fixed.clone());
                state.push_message(Message::assistant(MessageKind::SqlQuery, fixed));
                Signal::Done
            }
            Err(e) => {
                log::error!("[{}] Failed to attempt fix: {}", state.run_id, e);
                fail(FailureKind::Generation, e)
            }
        }
    }

    async fn execute_sql(&self, state: &mut WorkflowState) -> Signal {
        // Only the candidate that passed validation may run
        let sql = match (&state.validated_sql, &state.validation_error) {
            (Some(sql), None) if state.candidate_sql.as_ref() == Some(sql) => sql.clone(),
            _ => return fail(FailureKind::Execution, "refusing to run unvalidated SQL"),
        };

        match self.collaborators.executor.execute(&sql, &self.connection).await {
            Ok(rows) => {
                let body = serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string());
                state.push_message(Message::assistant(MessageKind::Results, body));
                state.execution_result = Some(ExecutionResult::Rows(rows));
                Signal::Done
            }
            Err(e) => {
                log::error!("[{}] Error executing query: {}", state.run_id, e);
                state.execution_result = Some(ExecutionResult::Failed(e.to_string()));
                let kind = if e.is_connectivity() {
                    FailureKind::Connectivity
                } else {
                    FailureKind::Execution
                };
                fail(kind, e)
            }
        }
    }

    async fn format_answer(&self, state: &mut WorkflowState) -> Signal {
        let rows = state.rows().map(<[_]>::to_vec).unwrap_or_default();
        let question = state
            .last_user_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let answer = match &self.collaborators.formatter {
            Some(formatter) => match formatter.format(&question, &rows).await {
                Ok(text) => Answer::Formatted { text },
                Err(e) => {
                    log::warn!(
                        "[{}] Formatting failed, returning raw results: {}",
                        state.run_id,
                        e
                    );
                    Answer::RawFallback {
                        rows,
                        reason: e.to_string(),
                    }
                }
            },
            None => Answer::RawFallback {
                rows,
                reason: "no formatter configured".to_string(),
            },
        };

        state.push_message(Message::assistant(MessageKind::Answer, answer.render()));
        Signal::Answered(answer)
    }
}

fn fail(kind: FailureKind, message: impl ToString) -> Signal {
    Signal::Fail(Failure::new(kind, message.to_string()))
}

fn require_schema(state: &WorkflowState) -> std::result::Result<Arc<SchemaDescription>, Signal> {
    state
        .schema
        .clone()
        .ok_or_else(|| fail(FailureKind::Connectivity, "schema not loaded"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nl2sql::examples::Example;
    use crate::nl2sql::resolver::PassthroughResolver;
    use crate::nl2sql::sql::Row;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneTable;

    #[async_trait]
    impl SchemaProvider for OneTable {
        async fn fetch(&self, _c: &ConnectionHandle) -> Result<SchemaDescription> {
            Ok(SchemaDescription::new().with_table("t", vec![]))
        }
    }

    struct FixedSql(&'static str);

    #[async_trait]
    impl SqlGenerator for FixedSql {
        async fn generate(
            &self,
            _q: &str,
            _s: &SchemaDescription,
            _e: &[Example],
            _c: &[Message],
        ) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[async_trait]
    impl SqlFixer for FixedSql {
        async fn fix(&self, _sql: &str, _r: &str, _s: &SchemaDescription, _q: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Accepts only queries starting with SELECT
    struct PrefixValidator;

    #[async_trait]
    impl SqlValidator for PrefixValidator {
        async fn validate(&self, sql: &str, _s: &SchemaDescription) -> Result<Validation> {
            Ok(if sql.starts_with("SELECT") {
                Validation::Valid
            } else {
                Validation::Invalid(format!("near \"{}\": syntax error", sql))
            })
        }
    }

    struct CountingExecutor(AtomicUsize);

    #[async_trait]
    impl SqlExecutor for CountingExecutor {
        async fn execute(&self, _sql: &str, _c: &ConnectionHandle) -> Result<Vec<Row>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            let mut row = Row::new();
            row.insert("n".to_string(), serde_json::json!(1));
            Ok(vec![row])
        }
    }

    fn engine(generated: &'static str, fixed: &'static str, max: u32) -> WorkflowEngine {
        let collaborators = Collaborators {
            schema_provider: Arc::new(OneTable),
            resolver: Arc::new(PassthroughResolver),
            generator: Arc::new(FixedSql(generated)),
            validator: Arc::new(PrefixValidator),
            fixer: Arc::new(FixedSql(fixed)),
            executor: Arc::new(CountingExecutor(AtomicUsize::new(0))),
            formatter: None,
        };
        WorkflowEngine::new(
            ConnectionHandle::new("test"),
            EngineSettings {
                max_sql_fix_attempts: max,
                format_output: false,
            },
            collaborators,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_trace() {
        let state = engine("SELECT 1", "SELECT 1", 1).ask("q").await.unwrap();
        assert_eq!(
            state.trace,
            vec![
                Stage::FetchSchema,
                Stage::ResolveEntities,
                Stage::GenerateSql,
                Stage::ValidateSql,
                Stage::ExecuteSql
            ]
        );
        assert!(state.outcome.as_ref().unwrap().is_success());
        assert_eq!(state.last_message().unwrap().content, r#"[{"n":1}]"#);
        assert!(state.schema_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_repair_cycle_trace() {
        let state = engine("SELEC 1", "SELECT 1", 1).ask("q").await.unwrap();
        assert_eq!(state.fix_attempts, 1);
        assert_eq!(
            &state.trace[2..],
            &[
                Stage::GenerateSql,
                Stage::ValidateSql,
                Stage::FixSql,
                Stage::ValidateSql,
                Stage::ExecuteSql
            ]
        );
        assert_eq!(state.validated_sql.as_deref(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn test_missing_user_message_is_error() {
        let err = engine("SELECT 1", "SELECT 1", 1)
            .run(WorkflowState::from_messages(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Nl2SqlError::Workflow(WorkflowError::MissingUserMessage)
        ));
    }

    #[tokio::test]
    async fn test_format_without_formatter_rejected() {
        let collaborators = Collaborators {
            schema_provider: Arc::new(OneTable),
            resolver: Arc::new(PassthroughResolver),
            generator: Arc::new(FixedSql("SELECT 1")),
            validator: Arc::new(PrefixValidator),
            fixer: Arc::new(FixedSql("SELECT 1")),
            executor: Arc::new(CountingExecutor(AtomicUsize::new(0))),
            formatter: None,
        };
        let result = WorkflowEngine::new(
            ConnectionHandle::new("test"),
            EngineSettings {
                max_sql_fix_attempts: 1,
                format_output: true,
            },
            collaborators,
        );
        assert!(matches!(
            result,
            Err(Nl2SqlError::Workflow(WorkflowError::MissingFormatter))
        ));
    }

    #[tokio::test]
    async fn test_follow_up_on_concluded_state_rejected() {
        let engine = engine("SELECT 1", "SELECT 1", 1);
        let mut first = engine.ask("q").await.unwrap();
        first.push_message(Message::user("and last season?"));

        let err = engine.run(first.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            Nl2SqlError::Workflow(WorkflowError::AlreadyConcluded)
        ));

        let next = engine.run(first.follow_up("and last season?")).await.unwrap();
        assert!(next.outcome.as_ref().unwrap().is_success());
        assert_eq!(next.last_user_message().unwrap().content, "and last season?");
    }

    #[tokio::test]
    async fn test_terminal_state_is_absorbing() {
        let engine = engine("SELECT 1", "SELECT 1", 1);
        let first = engine.ask("q").await.unwrap();
        let messages = first.messages().len();
        let again = engine.run(first).await.unwrap();
        assert_eq!(again.messages().len(), messages);
        assert_eq!(again.trace.len(), 5);
    }
}
