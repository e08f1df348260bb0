use tidy_agent::conversation::PROMPT;
use tidy_cli::bootstrap::CONNECTED_MESSAGE;
use tidy_cli::commands::chat::run_session;
use tidy_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};

fn keyword_config() -> AppConfig {
    AppConfig::load(LoadOptions {
        overrides: ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            llm_provider: Some(LlmProvider::Keyword),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    })
    .expect("config")
}

#[tokio::test]
async fn session_reports_connectivity_then_converses() {
    let input = b"add Buy milk - semi skimmed\nshow my todos\nQUIT\n";
    let mut output = Vec::new();

    let summary = run_session(keyword_config(), &input[..], &mut output).await.expect("session");

    assert_eq!(summary.turns, 2);
    let printed = String::from_utf8(output).expect("utf8");
    assert!(printed.starts_with(&format!("{CONNECTED_MESSAGE}\n{PROMPT}")));
    assert!(printed.contains("Assistant: Todo created with ID: "));
    assert!(printed.contains("1. [ ] Buy milk - semi skimmed (id: "));
}

#[tokio::test]
async fn quit_first_ends_without_a_turn() {
    let mut output = Vec::new();

    let summary = run_session(keyword_config(), &b"quit\n"[..], &mut output).await.expect("session");

    assert_eq!(summary.turns, 0);
    assert_eq!(
        String::from_utf8(output).expect("utf8"),
        format!("{CONNECTED_MESSAGE}\n{PROMPT}")
    );
}
