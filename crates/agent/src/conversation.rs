use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::agents::Agent;
use crate::llm::Message;
use crate::runtime::{AgentRuntime, RunError, RunResult};

pub const PROMPT: &str = "Enter your todo request (or 'quit' to exit): ";
pub const QUIT_KEYWORD: &str = "quit";
pub const REPLY_PREFIX: &str = "Assistant: ";

/// Bounds how much history is replayed to the model on each turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistoryPolicy {
    pub max_messages: Option<usize>,
}

impl HistoryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn window(max_messages: usize) -> Self {
        Self { max_messages: Some(max_messages.max(1)) }
    }
}

/// The accumulated conversation, including tool calls and tool results.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    policy: HistoryPolicy,
}

impl Transcript {
    pub fn new(policy: HistoryPolicy) -> Self {
        Self { messages: Vec::new(), policy }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Replaces the history with `messages`, trimming to the policy window. A
    /// trimmed window always starts at a user message so no tool result is
    /// left without its call.
    pub fn replace(&mut self, mut messages: Vec<Message>) {
        if let Some(limit) = self.policy.max_messages {
            if messages.len() > limit {
                let earliest = messages.len() - limit;
                let start = messages
                    .iter()
                    .enumerate()
                    .skip(earliest)
                    .find(|(_, message)| matches!(message, Message::User { .. }))
                    .map(|(index, _)| index)
                    .or_else(|| {
                        messages
                            .iter()
                            .rposition(|message| matches!(message, Message::User { .. }))
                    })
                    .unwrap_or(0);
                messages.drain(..start);
            }
        }
        self.messages = messages;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Processing,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub turns: usize,
}

/// Interactive read-eval loop over one transcript, always entering at the
/// triage agent.
pub struct ConversationLoop {
    runtime: AgentRuntime,
    entry: Arc<Agent>,
    transcript: Transcript,
    state: LoopState,
}

impl ConversationLoop {
    pub fn new(runtime: AgentRuntime, entry: Arc<Agent>, policy: HistoryPolicy) -> Self {
        Self { runtime, entry, transcript: Transcript::new(policy), state: LoopState::AwaitingInput }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs one user turn. On failure the transcript is left exactly as it
    /// was before the turn.
    pub async fn turn(&mut self, input: &str) -> Result<RunResult, RunError> {
        self.state = LoopState::Processing;
        let mut messages = self.transcript.messages().to_vec();
        messages.push(Message::user(input));

        let outcome = self.runtime.run(&self.entry, messages).await;
        if let Ok(result) = &outcome {
            self.transcript.replace(result.clone().into_input_list());
        }
        self.state = LoopState::AwaitingInput;
        outcome
    }

    /// Prompts, reads a line, and answers until `quit` or end of input.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<LoopSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut summary = LoopSummary::default();

        loop {
            writer.write_all(PROMPT.as_bytes()).await?;
            writer.flush().await?;

            let Some(line) = lines.next_line().await? else {
                writer.write_all(b"\n").await?;
                break;
            };
            let input = line.trim_end_matches(|character| matches!(character, '\r' | '\n'));
            if input.eq_ignore_ascii_case(QUIT_KEYWORD) {
                break;
            }

            summary.turns += 1;
            let reply = match self.turn(input).await {
                Ok(result) => result.final_output,
                Err(error) => {
                    warn!(
                        event_name = "chat.turn.failed",
                        turn = summary.turns,
                        error = %error,
                        "turn failed; transcript left unchanged"
                    );
                    format!("Sorry, I couldn't complete that request: {error}")
                }
            };
            writer.write_all(format!("{REPLY_PREFIX}{reply}\n").as_bytes()).await?;
        }

        writer.flush().await?;
        info!(event_name = "chat.loop.finished", turns = summary.turns, "conversation ended");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tidy_db::InMemoryTodoStore;

    use super::{ConversationLoop, HistoryPolicy, LoopState, Transcript, PROMPT};
    use crate::agents::todo_agents;
    use crate::llm::{
        CompletionModel, CompletionRequest, Message, ModelError, ModelResponse,
    };
    use crate::runtime::AgentRuntime;

    /// Answers from a script and records how many messages each request carried.
    struct ScriptedModel {
        responses: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
        request_sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<ModelResponse, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                request_sizes: Mutex::new(Vec::new()),
            })
        }

        fn request_sizes(&self) -> Vec<usize> {
            self.request_sizes.lock().map(|sizes| sizes.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest<'_>,
        ) -> Result<ModelResponse, ModelError> {
            if let Ok(mut sizes) = self.request_sizes.lock() {
                sizes.push(request.messages.len());
            }
            self.responses
                .lock()
                .ok()
                .and_then(|mut responses| responses.pop_front())
                .unwrap_or_else(|| Err(ModelError::Decode("script exhausted".to_string())))
        }
    }

    fn chat(model: Arc<ScriptedModel>, policy: HistoryPolicy) -> ConversationLoop {
        let triage = todo_agents(Arc::new(InMemoryTodoStore::default()));
        ConversationLoop::new(AgentRuntime::new(model), triage, policy)
    }

    #[tokio::test]
    async fn quit_first_never_calls_the_model() {
        let model = ScriptedModel::new(Vec::new());
        let mut conversation = chat(model.clone(), HistoryPolicy::unbounded());
        let mut output = Vec::new();

        let summary = conversation.run(&b"QUIT\n"[..], &mut output).await.expect("loop");

        assert_eq!(summary.turns, 0);
        assert!(model.request_sizes().is_empty());
        assert_eq!(String::from_utf8(output).expect("utf8"), PROMPT);
    }

    #[tokio::test]
    async fn history_accumulates_across_turns() {
        let model = ScriptedModel::new(vec![
            Ok(ModelResponse::text("first answer")),
            Ok(ModelResponse::text("second answer")),
        ]);
        let mut conversation = chat(model.clone(), HistoryPolicy::unbounded());
        let mut output = Vec::new();

        let summary = conversation
            .run(&b"hello\r\nagain\nquit\n"[..], &mut output)
            .await
            .expect("loop");

        assert_eq!(summary.turns, 2);
        assert_eq!(model.request_sizes(), vec![1, 3]);
        assert_eq!(
            conversation.transcript().messages(),
            &[
                Message::user("hello"),
                Message::assistant_text("first answer"),
                Message::user("again"),
                Message::assistant_text("second answer"),
            ]
        );
        let printed = String::from_utf8(output).expect("utf8");
        assert!(printed.contains("Assistant: first answer\n"));
        assert!(printed.contains("Assistant: second answer\n"));
        assert_eq!(conversation.state(), LoopState::AwaitingInput);
    }

    #[tokio::test]
    async fn failed_turns_are_reported_and_leave_history_untouched() {
        let model = ScriptedModel::new(vec![
            Ok(ModelResponse::text("ok")),
            Err(ModelError::Network("connection reset".to_string())),
            Ok(ModelResponse::text("back again")),
        ]);
        let mut conversation = chat(model.clone(), HistoryPolicy::unbounded());
        let mut output = Vec::new();

        conversation.run(&b"one\ntwo\nthree\n"[..], &mut output).await.expect("loop");

        let printed = String::from_utf8(output).expect("utf8");
        assert!(printed.contains(
            "Assistant: Sorry, I couldn't complete that request: completion request failed: connection reset"
        ));
        assert_eq!(model.request_sizes(), vec![1, 3, 3]);
        assert_eq!(conversation.transcript().len(), 4);
    }

    #[tokio::test]
    async fn end_of_input_ends_the_loop() {
        let model = ScriptedModel::new(vec![Ok(ModelResponse::text("noted"))]);
        let mut conversation = chat(model, HistoryPolicy::unbounded());
        let mut output = Vec::new();

        let summary = conversation.run(&b"hi"[..], &mut output).await.expect("loop");
        assert_eq!(summary.turns, 1);
    }

    #[test]
    fn windowed_transcript_starts_at_a_user_message() {
        let mut transcript = Transcript::new(HistoryPolicy::window(3));
        transcript.replace(vec![
            Message::user("a"),
            Message::assistant_text("b"),
            Message::user("c"),
            Message::Assistant {
                content: None,
                tool_calls: vec![crate::llm::ToolCall {
                    id: "1".to_string(),
                    name: "read_todos".to_string(),
                    arguments: serde_json::json!({}),
                }],
            },
            Message::tool_result("1", "{}"),
            Message::assistant_text("d"),
        ]);

        assert_eq!(transcript.messages()[0], Message::user("c"));
        assert_eq!(transcript.len(), 4);
    }

    #[test]
    fn unbounded_transcript_keeps_everything() {
        let mut transcript = Transcript::new(HistoryPolicy::unbounded());
        transcript.replace(vec![Message::user("a"); 50]);
        assert_eq!(transcript.len(), 50);
    }
}
