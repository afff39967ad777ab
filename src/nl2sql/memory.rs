// SPDX-License-Identifier: MIT

//! Conversation context preparation for the LLM stages
//!
//! Long histories are cut to a recent window; verbose older turns are
//! summarized through an optional agent, with runs of error messages
//! collapsed first.

use crate::adk::agent::Agent;
use crate::nl2sql::config::ContextSettings;
use crate::nl2sql::sql::prompts::{CLARIFICATION_HINT, SUMMARY_SYSTEM_PROMPT};
use crate::nl2sql::workflow::state::{Message, MessageKind, Role};
use std::sync::Arc;

/// Condenses message history before it is handed to a model
#[derive(Clone, Default)]
pub struct ContextPreparer {
    settings: ContextSettings,
    summarizer: Option<Arc<dyn Agent>>,
}

impl ContextPreparer {
    pub fn new(settings: ContextSettings) -> Self {
        Self {
            settings,
            summarizer: None,
        }
    }

    /// Agent used to summarize older messages
    pub fn with_summarizer(mut self, agent: Arc<dyn Agent>) -> Self {
        self.summarizer = Some(agent);
        self
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Build the context window for `messages`
    pub async fn prepare(&self, messages: &[Message]) -> Vec<Message> {
        if messages.is_empty() {
            return Vec::new();
        }

        let keep = self.settings.recent_kept.max(1);
        let split = messages.len().saturating_sub(keep);
        let (older, mut recent) = (&messages[..split], &messages[split..]);

        let error_count = recent.iter().filter(|m| m.is_error()).count();
        let clarification_needed = keep > 1 && error_count >= keep - 1;
        if clarification_needed {
            log::warn!(
                "{} of the last {} messages are errors, adding clarification hint",
                error_count,
                recent.len()
            );
            recent = &recent[recent.len().saturating_sub(keep - 1)..];
        }

        let older_chars: usize = older.iter().map(|m| m.content.chars().count()).sum();
        log::debug!(
            "Preparing context: {} older ({} chars), {} recent",
            older.len(),
            older_chars,
            recent.len()
        );

        let mut context = Vec::with_capacity(messages.len() + 1);

        if !older.is_empty() && older_chars > self.settings.older_char_threshold {
            log::info!(
                "Summarizing {} older messages ({} chars)",
                older.len(),
                older_chars
            );
            match self.summarize(older).await {
                Some(summary) => {
                    context.push(Message::system(MessageKind::Summary, summary));
                    context.extend_from_slice(recent);
                    return context;
                }
                None => {
                    if clarification_needed {
                        context.push(clarification_hint());
                    }
                    context.extend_from_slice(recent);
                    return context;
                }
            }
        }

        if clarification_needed {
            context.push(clarification_hint());
        }
        context.extend_from_slice(older);
        context.extend_from_slice(recent);
        context
    }

    async fn summarize(&self, older: &[Message]) -> Option<String> {
        let agent = self.summarizer.as_ref()?;
        let body = collapse_errors(older)
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{}\nHere is the conversation history to summarize:\n{}",
            SUMMARY_SYSTEM_PROMPT, body
        );
        match agent.run(prompt).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                log::error!("Summarization failed, truncating to recent messages: {}", e);
                None
            }
        }
    }
}

fn clarification_hint() -> Message {
    Message::system(MessageKind::Clarification, CLARIFICATION_HINT)
}

fn omitted(count: usize) -> Message {
    let text = if count == 1 {
        "(1 error omitted)".to_string()
    } else {
        format!("({} errors omitted)", count)
    };
    Message::system(MessageKind::Summary, text)
}

/// Replace each run of error messages with a single "(N errors omitted)" line
pub fn collapse_errors(messages: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    let mut run = 0;
    for m in messages {
        if m.is_error() {
            run += 1;
            continue;
        }
        if run > 0 {
            out.push(omitted(run));
            run = 0;
        }
        out.push(m.clone());
    }
    if run > 0 {
        out.push(omitted(run));
    }
    out
}

/// Render messages as a "- Human: …" / "- AI: …" transcript
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let who = match m.role {
                Role::User => "Human",
                Role::Assistant => "AI",
                Role::System => "System",
            };
            format!("- {}: {}", who, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
