// SPDX-License-Identifier: MIT

//! Agent module - defines agent types for LLM-backed stages
//!
//! This module provides the core Agent trait and the `LLMAgent`
//! implementation used by the SQL generator, fixer, formatter and the
//! conversation summarizer.

mod llm;

pub use llm::LLMAgent;

use crate::adk::error::Result;
use crate::adk::model::Content;
use async_trait::async_trait;

/// Core agent trait for all agent types
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the agent name
    fn name(&self) -> &str;

    /// Run the agent on prior conversation turns and return its text reply
    async fn run_turns(&self, turns: Vec<Content>) -> Result<String>;

    /// Run the agent with the given input
    async fn run(&self, input: String) -> Result<String> {
        self.run_turns(vec![Content::user(input)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::Part;

    /// A simple mock agent that echoes the last turn (used in tests)
    pub struct EchoAgent {
        name: String,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run_turns(&self, turns: Vec<Content>) -> Result<String> {
            let last = turns.last().map(|c| c.text_content()).unwrap_or_default();
            Ok(format!("{}-echo", last))
        }
    }

    #[tokio::test]
    async fn test_default_run_wraps_input_as_user_turn() {
        let agent = EchoAgent {
            name: "echo".to_string(),
        };
        assert_eq!(agent.name(), "echo");

        let result = agent.run("input".to_string()).await.unwrap();
        assert_eq!(result, "input-echo");
    }

    #[test]
    fn test_user_content_shape() {
        let content = Content::user("hi");
        assert_eq!(content.role, "user");
        assert!(matches!(&content.parts[0], Part::Text(t) if t == "hi"));
    }
}
