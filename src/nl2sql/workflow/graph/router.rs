//! Transition function of the workflow graph
//!
//! Routing depends only on the finished stage, its signal, the state and
//! the engine settings. `fix_attempts` is the only counter consulted.

use super::types::{Answer, FailureKind, Outcome, Signal, Stage, Transition};
use crate::nl2sql::config::EngineSettings;
use crate::nl2sql::workflow::state::WorkflowState;

/// Decide where a run goes after `stage` reported `signal`
pub fn route(
    stage: Stage,
    signal: Signal,
    state: &WorkflowState,
    settings: &EngineSettings,
) -> Transition {
    match (stage, signal) {
        (_, Signal::Fail(failure)) => Transition::Finish(Outcome::Failed { failure }),
        (_, Signal::Clarify { prompt, mentions }) => {
            Transition::Finish(Outcome::ClarificationNeeded { prompt, mentions })
        }
        (Stage::FetchSchema, Signal::Done) => Transition::Next(Stage::ResolveEntities),
        (Stage::ResolveEntities, Signal::Done) => Transition::Next(Stage::GenerateSql),
        (Stage::GenerateSql, Signal::Done) => Transition::Next(Stage::ValidateSql),
        (Stage::ValidateSql, Signal::Done) => Transition::Next(Stage::ExecuteSql),
        (Stage::ValidateSql, Signal::Invalid) => {
            if state.fix_attempts < settings.max_sql_fix_attempts {
                Transition::Next(Stage::FixSql)
            } else {
                log::error!(
                    "[{}] Exceeded max fix attempts ({})",
                    state.run_id,
                    settings.max_sql_fix_attempts
                );
                let reason = state
                    .validation_error
                    .clone()
                    .unwrap_or_else(|| "invalid SQL".to_string());
                Transition::Finish(Outcome::failed(FailureKind::FixExhausted, reason))
            }
        }
        (Stage::FixSql, Signal::Done) => Transition::Next(Stage::ValidateSql),
        (Stage::ExecuteSql, Signal::Done) => match state.rows() {
            Some(_) if settings.format_output => Transition::Next(Stage::FormatAnswer),
            Some(rows) => Transition::Finish(Outcome::success(Answer::Raw {
                rows: rows.to_vec(),
            })),
            None => Transition::Finish(Outcome::failed(
                FailureKind::Execution,
                "query produced no result",
            )),
        },
        (Stage::FormatAnswer, Signal::Answered(answer)) => {
            Transition::Finish(Outcome::success(answer))
        }
        (stage, signal) => {
            log::error!(
                "[{}] Unexpected signal {:?} from stage {}",
                state.run_id,
                signal,
                stage
            );
            Transition::Finish(Outcome::failed(
                FailureKind::Generation,
                format!("unexpected signal from stage {}", stage),
            ))
        }
    }
}
