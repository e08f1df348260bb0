use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agents::Agent;
use crate::llm::{CompletionModel, CompletionRequest, Message, ModelError};

pub const DEFAULT_MAX_TURNS: u32 = 10;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("agent `{agent}` called unknown tool `{tool}`")]
    UnknownTool { agent: String, tool: String },
    #[error("run exceeded {0} model turns without a final answer")]
    MaxTurnsExceeded(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    pub final_output: String,
    pub last_agent: String,
    pub input: Vec<Message>,
    pub new_items: Vec<Message>,
}

impl RunResult {
    /// The input transcript followed by everything this run produced, ready to
    /// feed into the next run.
    pub fn into_input_list(self) -> Vec<Message> {
        let mut items = self.input;
        items.extend(self.new_items);
        items
    }
}

/// Drives one user turn: asks the model, follows handoffs, executes tool calls,
/// and stops at the first response without tool calls.
pub struct AgentRuntime {
    model: Arc<dyn CompletionModel>,
    max_turns: u32,
}

impl AgentRuntime {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model, max_turns: DEFAULT_MAX_TURNS }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn run(
        &self,
        start: &Arc<Agent>,
        input: Vec<Message>,
    ) -> Result<RunResult, RunError> {
        let mut current = Arc::clone(start);
        let mut transcript = input.clone();
        let input_len = input.len();

        for turn in 0..self.max_turns {
            let specs = current.tool_specs();
            let response = self
                .model
                .complete(CompletionRequest {
                    agent: current.name(),
                    instructions: current.instructions(),
                    messages: &transcript,
                    tools: &specs,
                })
                .await?;

            if response.tool_calls.is_empty() {
                let final_output = response.content.unwrap_or_default();
                transcript.push(Message::assistant_text(final_output.clone()));
                info!(
                    event_name = "agent.run.completed",
                    agent = current.name(),
                    turns = turn + 1,
                    "run produced final output"
                );
                return Ok(RunResult {
                    final_output,
                    last_agent: current.name().to_string(),
                    new_items: transcript.split_off(input_len),
                    input,
                });
            }

            transcript.push(Message::Assistant {
                content: response.content.clone(),
                tool_calls: response.tool_calls.clone(),
            });

            let mut next_agent: Option<Arc<Agent>> = None;
            for call in &response.tool_calls {
                if let Some(target) = current.handoff_target(&call.name) {
                    let output = if next_agent.is_none() {
                        info!(
                            event_name = "agent.run.handoff",
                            from = current.name(),
                            to = target.name(),
                            "handing off conversation"
                        );
                        next_agent = Some(Arc::clone(target));
                        json!({"assistant": target.name()}).to_string()
                    } else {
                        "Multiple handoffs detected, ignoring this one.".to_string()
                    };
                    transcript.push(Message::tool_result(call.id.clone(), output));
                    continue;
                }

                let Some(tool) = current.tools().get(&call.name) else {
                    return Err(RunError::UnknownTool {
                        agent: current.name().to_string(),
                        tool: call.name.clone(),
                    });
                };

                debug!(
                    event_name = "agent.tool.called",
                    agent = current.name(),
                    tool = tool.name(),
                    arguments = %call.arguments,
                    "invoking tool"
                );
                let output = match tool.call(call.arguments.clone()).await {
                    Ok(output) => output,
                    Err(error) => {
                        warn!(
                            event_name = "agent.tool.failed",
                            agent = current.name(),
                            tool = tool.name(),
                            error = %error,
                            "tool call failed"
                        );
                        format!(
                            "An error occurred while running the tool. Please try again. Error: {error}"
                        )
                    }
                };
                transcript.push(Message::tool_result(call.id.clone(), output));
            }

            if let Some(next) = next_agent {
                current = next;
            }
        }

        Err(RunError::MaxTurnsExceeded(self.max_turns))
    }
}
