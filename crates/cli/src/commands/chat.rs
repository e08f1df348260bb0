use anyhow::Context;
use tidy_agent::{ConversationLoop, HistoryPolicy, LoopSummary};
use tidy_core::config::{AppConfig, LoadOptions};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::bootstrap::bootstrap_with_config;
use crate::commands::CommandResult;
use crate::logging::init_logging;

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        run_session(config, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
    });

    session_result(result)
}

/// The conversation already wrote everything on stdout, so a finished session
/// has no payload of its own.
fn session_result(result: anyhow::Result<LoopSummary>) -> CommandResult {
    match result {
        Ok(_) => CommandResult { exit_code: 0, output: String::new() },
        Err(error) => CommandResult::failure("chat", "session", format!("{error:#}"), 4),
    }
}

/// Reports store connectivity, then runs the conversation loop until `quit`
/// or end of input.
pub async fn run_session<R, W>(
    config: AppConfig,
    reader: R,
    mut writer: W,
) -> anyhow::Result<LoopSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let app = bootstrap_with_config(config).await.context("failed to start the todo assistant")?;

    writer
        .write_all(format!("{}\n", app.connectivity_report()).as_bytes())
        .await
        .context("failed to write connectivity report")?;

    let policy = HistoryPolicy { max_messages: app.config.history.max_messages };
    let mut conversation = ConversationLoop::new(app.agent_runtime, app.triage, policy);
    conversation.run(reader, &mut writer).await.context("conversation loop failed")
}
