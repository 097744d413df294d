//! Multi-agent group chat driven through the kernel pipeline.
//!
//! A chat holds a shared message history and a set of agents, each backed by
//! a kernel function. Every turn selects one agent, invokes its function
//! through `Kernel::invoke` (so registered filters apply to agent turns like
//! any other invocation), appends the response to the history, and asks the
//! termination strategy whether the conversation is complete.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::args::KernelArguments;
use crate::error::{KernelError, Result};
use crate::function::KernelFunction;
use crate::kernel::Kernel;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    System,
    User,
    Assistant,
}

/// One entry in the chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: AuthorRole,
    /// Agent name, for assistant messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: AuthorRole::System,
            name: None,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: AuthorRole::User,
            name: None,
            content: content.into(),
        }
    }

    pub fn assistant(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: AuthorRole::Assistant,
            name: Some(name.into()),
            content: content.into(),
        }
    }
}

type TerminationHandler = Arc<dyn Fn(&ChatMessage, &[ChatMessage]) -> bool + Send + Sync>;
type SelectionHandler = Arc<dyn Fn(&[String], &[ChatMessage]) -> Option<String> + Send + Sync>;

/// Decides, after each turn, whether the conversation is complete.
#[derive(Clone)]
pub struct TerminationFn(TerminationHandler);

impl TerminationFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ChatMessage, &[ChatMessage]) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn should_terminate(&self, last: &ChatMessage, history: &[ChatMessage]) -> bool {
        (self.0)(last, history)
    }
}

/// Picks which agent (by name) speaks next. Returning `None` ends the chat.
#[derive(Clone)]
pub struct SelectionFn(SelectionHandler);

impl SelectionFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[String], &[ChatMessage]) -> Option<String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn select(&self, agents: &[String], history: &[ChatMessage]) -> Option<String> {
        (self.0)(agents, history)
    }
}

/// Ready-made termination and selection strategies.
pub mod strategies {
    use super::*;

    /// Terminate once an assistant message contains `needle`.
    pub fn content_contains(needle: impl Into<String>) -> TerminationFn {
        let needle = needle.into();
        TerminationFn::new(move |last, _| last.content.contains(&needle))
    }

    /// Terminate after `limit` assistant messages have accumulated.
    pub fn max_assistant_messages(limit: usize) -> TerminationFn {
        TerminationFn::new(move |_, history| {
            history
                .iter()
                .filter(|m| m.role == AuthorRole::Assistant)
                .count()
                >= limit
        })
    }

    /// Cycle through agents in registration order, one per assistant turn.
    pub fn round_robin() -> SelectionFn {
        SelectionFn::new(|agents, history| {
            if agents.is_empty() {
                return None;
            }
            let turns = history
                .iter()
                .filter(|m| m.role == AuthorRole::Assistant)
                .count();
            Some(agents[turns % agents.len()].clone())
        })
    }

    /// Always select the named agent.
    pub fn fixed(name: impl Into<String>) -> SelectionFn {
        let name = name.into();
        SelectionFn::new(move |_, _| Some(name.clone()))
    }
}

/// Default number of agent turns per [`AgentGroupChat::invoke`] call.
pub const DEFAULT_MAXIMUM_ITERATIONS: usize = 1;

/// Tuning knobs for a group-chat run.
#[derive(Clone)]
pub struct ChatExecutionSettings {
    pub maximum_iterations: usize,
    pub termination_strategy: Option<TerminationFn>,
    pub selection_strategy: Option<SelectionFn>,
}

impl Default for ChatExecutionSettings {
    fn default() -> Self {
        Self {
            maximum_iterations: DEFAULT_MAXIMUM_ITERATIONS,
            termination_strategy: None,
            selection_strategy: None,
        }
    }
}

impl ChatExecutionSettings {
    pub fn maximum_iterations(mut self, iterations: usize) -> Self {
        self.maximum_iterations = iterations;
        self
    }

    pub fn termination_strategy(mut self, strategy: TerminationFn) -> Self {
        self.termination_strategy = Some(strategy);
        self
    }

    pub fn selection_strategy(mut self, strategy: SelectionFn) -> Self {
        self.selection_strategy = Some(strategy);
        self
    }
}

/// A named participant backed by a kernel function.
#[derive(Clone)]
pub struct ChatAgent {
    name: String,
    function: Arc<KernelFunction>,
}

impl ChatAgent {
    pub fn new(name: impl Into<String>, function: Arc<KernelFunction>) -> Self {
        Self {
            name: name.into(),
            function,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A conversation among agents with a shared history.
pub struct AgentGroupChat {
    agents: Vec<ChatAgent>,
    history: Vec<ChatMessage>,
    settings: ChatExecutionSettings,
}

impl AgentGroupChat {
    pub fn new(settings: ChatExecutionSettings) -> Self {
        Self {
            agents: Vec::new(),
            history: Vec::new(),
            settings,
        }
    }

    pub fn add_agent(&mut self, agent: ChatAgent) {
        self.agents.push(agent);
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// Run up to `maximum_iterations` agent turns, invoking each selected
    /// agent's function through the kernel. Returns the assistant messages
    /// produced by this call, in order.
    pub async fn invoke(&mut self, kernel: &Kernel, input: impl Into<String>) -> Result<Vec<ChatMessage>> {
        self.history.push(ChatMessage::user(input));

        let agent_names: Vec<String> = self.agents.iter().map(|a| a.name.clone()).collect();
        let mut responses = Vec::new();

        for turn in 0..self.settings.maximum_iterations {
            let agent = match &self.settings.selection_strategy {
                Some(strategy) => match strategy.select(&agent_names, &self.history) {
                    Some(name) => self
                        .agents
                        .iter()
                        .find(|a| a.name == name)
                        .cloned()
                        .ok_or_else(|| {
                            KernelError::Other(format!("selected unknown agent: {name}"))
                        })?,
                    None => break,
                },
                None => {
                    if self.agents.is_empty() {
                        break;
                    }
                    self.agents[turn % self.agents.len()].clone()
                }
            };
            debug!(agent = %agent.name, turn, "group chat turn");

            let last_content = self
                .history
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            let arguments = KernelArguments::new()
                .with("history", serde_json::to_value(&self.history)?)
                .with("input", last_content);

            let result = kernel.invoke(Arc::clone(&agent.function), arguments).await?;
            let content = match result.as_scalar() {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };

            let message = ChatMessage::assistant(agent.name.clone(), content);
            self.history.push(message.clone());

            let terminate = self
                .settings
                .termination_strategy
                .as_ref()
                .map(|strategy| strategy.should_terminate(&message, &self.history))
                .unwrap_or(false);
            responses.push(message);

            if terminate {
                debug!(agent = %agent.name, turn, "termination strategy ended chat");
                break;
            }
        }

        Ok(responses)
    }
}
