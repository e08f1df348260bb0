use std::sync::Arc;

use tidy_agent::conversation::{ConversationLoop, HistoryPolicy, PROMPT};
use tidy_agent::{todo_agents, AgentRuntime, KeywordModel};
use tidy_db::{connect_with_settings, migrations, SqlTodoStore, TodoStore};

async fn sql_store() -> Arc<SqlTodoStore> {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    Arc::new(SqlTodoStore::new(pool))
}

async fn session(store: Arc<SqlTodoStore>, input: &str) -> (usize, String) {
    let runtime = AgentRuntime::new(Arc::new(KeywordModel::new()));
    let mut conversation =
        ConversationLoop::new(runtime, todo_agents(store), HistoryPolicy::unbounded());
    let mut output = Vec::new();
    let summary = conversation.run(input.as_bytes(), &mut output).await.expect("session");
    (summary.turns, String::from_utf8(output).expect("utf8"))
}

#[tokio::test]
async fn quit_as_first_input_touches_nothing() {
    let store = sql_store().await;

    let (turns, printed) = session(store.clone(), "Quit\nadd never reached\n").await;

    assert_eq!(turns, 0);
    assert_eq!(printed, PROMPT);
    assert_eq!(store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn crud_round_trip_through_triage_and_specialists() {
    let store = sql_store().await;
    let script = [
        "add Buy Milk - two litres",
        "add \"Task A\"",
        "add \"Task B\"",
        "add Other",
        "mark \"Task\" as done",
        "delete milk",
        "show my todos",
        "quit",
    ]
    .join("\n");

    let (turns, printed) = session(store.clone(), &script).await;

    assert_eq!(turns, 7);
    assert_eq!(printed.matches("Assistant: Todo created with ID: ").count(), 4);
    assert!(printed.contains("Assistant: Updated 2 todos matching 'Task'."));
    assert!(printed.contains("Assistant: Deleted 1 todo item(s) matching title 'milk'"));
    assert!(printed.contains("You have 3 todo(s):"));

    let todos = store.find_all().await.expect("read");
    let summary = todos
        .iter()
        .map(|todo| (todo.title.as_str(), todo.completed))
        .collect::<Vec<_>>();
    assert_eq!(summary, vec![("Task A", true), ("Task B", true), ("Other", false)]);
}

#[tokio::test]
async fn unclear_requests_get_a_clarifying_answer() {
    let store = sql_store().await;

    let (turns, printed) = session(store.clone(), "what's the weather like?\n").await;

    assert_eq!(turns, 1);
    assert!(printed.contains(&format!("Assistant: {}", tidy_agent::keyword::CLARIFY_INTENT)));
    assert_eq!(store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn delete_all_clears_the_store() {
    let store = sql_store().await;

    let (_, printed) =
        session(store.clone(), "add walk dog\nadd \"Pay rent\"\nclear everything\n").await;

    assert!(printed.contains("Assistant: Deleted 2 todo item(s)."));
    assert!(store.find_all().await.expect("read").is_empty());
}
