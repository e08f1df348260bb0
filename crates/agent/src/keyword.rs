//! Deterministic, offline stand-in for the completion endpoint.
//!
//! Routing and argument extraction are plain keyword rules, which keeps the
//! whole pipeline runnable without network access or an API key.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tidy_core::TodoList;
use uuid::Uuid;

use crate::agents::{CREATE_AGENT, DELETE_AGENT, READ_AGENT, UPDATE_AGENT};
use crate::llm::{
    CompletionModel, CompletionRequest, Message, ModelError, ModelResponse, ToolCall,
};
use crate::tools::{CREATE_TODO, DELETE_TODO, READ_TODOS, UPDATE_TODO};

pub const CLARIFY_INTENT: &str =
    "I can add, list, update or delete todos for you. What would you like to do?";
const MISSING_TITLE: &str = "What should the new todo be called?";

const CREATE_WORDS: &[&str] = &["create", "add", "new", "make", "generate"];
const READ_WORDS: &[&str] = &["list", "show", "view", "read", "display", "see"];
const UPDATE_WORDS: &[&str] =
    &["update", "edit", "modify", "change", "rename", "mark", "complete", "finish", "set"];
const DELETE_WORDS: &[&str] = &["delete", "remove", "clear", "erase"];

const ALL_WORDS: &[&str] = &["all", "everything"];
const DONE_WORDS: &[&str] = &["done", "complete", "completed", "finished", "finish"];
const UNDONE_WORDS: &[&str] =
    &["incomplete", "undone", "pending", "unfinished", "uncomplete", "not", "open"];

const CREATE_LEADING: &[&str] = &[
    "please", "can", "could", "you", "create", "add", "new", "make", "generate", "a", "an",
    "the", "todo", "task", "item", "reminder", "called", "named", "titled", "to", "for", "me",
];
const CREATE_TRAILING: &[&str] = &["to", "my", "list", "todos", "todo", "please", "the"];
const UPDATE_LEADING: &[&str] = &[
    "please", "update", "edit", "modify", "mark", "set", "complete", "finish", "the", "my",
    "todo", "task", "item", "called", "named",
];
const UPDATE_TRAILING: &[&str] = &[
    "as", "done", "complete", "completed", "finished", "incomplete", "undone", "pending",
    "unfinished", "not", "todo", "task", "item", "please", "to",
];
const DELETE_LEADING: &[&str] = &[
    "please", "delete", "remove", "clear", "erase", "the", "my", "a", "an", "todo", "todos",
    "task", "tasks", "item", "called", "named",
];
const DELETE_TRAILING: &[&str] =
    &["todo", "todos", "task", "tasks", "item", "from", "my", "list", "please"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Intent {
    Create,
    Read,
    Update,
    Delete,
}

impl Intent {
    fn agent(self) -> &'static str {
        match self {
            Self::Create => CREATE_AGENT,
            Self::Read => READ_AGENT,
            Self::Update => UPDATE_AGENT,
            Self::Delete => DELETE_AGENT,
        }
    }

    fn of(token: &str) -> Option<Self> {
        if CREATE_WORDS.contains(&token) {
            Some(Self::Create)
        } else if READ_WORDS.contains(&token) {
            Some(Self::Read)
        } else if UPDATE_WORDS.contains(&token) {
            Some(Self::Update)
        } else if DELETE_WORDS.contains(&token) {
            Some(Self::Delete)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct KeywordModel;

impl KeywordModel {
    pub fn new() -> Self {
        Self
    }

    fn route(&self, request: &CompletionRequest<'_>) -> ModelResponse {
        let text = last_user_text(request.messages).unwrap_or_default();
        let intent = [unquoted(text), text.to_string()].iter().find_map(|candidate| {
            tokenize(&normalize_text(candidate)).iter().find_map(|token| Intent::of(token))
        });
        let Some(intent) = intent else {
            return ModelResponse::text(CLARIFY_INTENT);
        };

        let handoff = request
            .tools
            .iter()
            .find(|spec| spec.name.ends_with(&format!("_{}", handoff_suffix(intent.agent()))));
        match handoff {
            Some(spec) => ModelResponse::call(tool_call(&spec.name, json!({}))),
            None => ModelResponse::text(CLARIFY_INTENT),
        }
    }

    fn act(&self, tool: &str, messages: &[Message]) -> ModelResponse {
        if let Some(output) = own_tool_output(tool, messages) {
            return ModelResponse::text(relay(tool, output));
        }

        let text = last_user_text(messages).unwrap_or_default();
        match tool {
            CREATE_TODO => match create_arguments(text) {
                Some(arguments) => ModelResponse::call(tool_call(tool, arguments)),
                None => ModelResponse::text(MISSING_TITLE),
            },
            READ_TODOS => ModelResponse::call(tool_call(tool, json!({}))),
            UPDATE_TODO => ModelResponse::call(tool_call(tool, update_arguments(text))),
            DELETE_TODO => ModelResponse::call(tool_call(tool, delete_arguments(text))),
            other => ModelResponse::text(format!("I don't know how to use `{other}`.")),
        }
    }
}

#[async_trait]
impl CompletionModel for KeywordModel {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ModelResponse, ModelError> {
        if request.tools.iter().any(|spec| spec.name.starts_with("transfer_to_")) {
            return Ok(self.route(&request));
        }

        match request.tools.first() {
            Some(spec) => Ok(self.act(&spec.name, request.messages)),
            None => Ok(ModelResponse::text(CLARIFY_INTENT)),
        }
    }
}

fn handoff_suffix(agent: &str) -> String {
    agent.trim_end_matches("Agent").to_ascii_lowercase() + "_agent"
}

fn tool_call(name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: format!("call_{}", Uuid::new_v4().simple()),
        name: name.to_string(),
        arguments,
    }
}

fn last_user_text(messages: &[Message]) -> Option<&str> {
    messages.iter().rev().find_map(|message| match message {
        Message::User { content } => Some(content.as_str()),
        _ => None,
    })
}

/// Output of `tool` if it is the most recent message, i.e. the call this model
/// issued has just been answered.
fn own_tool_output<'a>(tool: &str, messages: &'a [Message]) -> Option<&'a str> {
    let Some(Message::Tool { tool_call_id, content }) = messages.last() else {
        return None;
    };
    let issued_here = messages.iter().rev().any(|message| match message {
        Message::Assistant { tool_calls, .. } => {
            tool_calls.iter().any(|call| &call.id == tool_call_id && call.name == tool)
        }
        _ => false,
    });
    issued_here.then_some(content.as_str())
}

fn relay(tool: &str, output: &str) -> String {
    if tool != READ_TODOS {
        return output.to_string();
    }
    match serde_json::from_str::<TodoList>(output) {
        Ok(list) => format_list(&list),
        Err(_) => output.to_string(),
    }
}

fn format_list(list: &TodoList) -> String {
    if list.is_empty() {
        return "Your todo list is empty.".to_string();
    }

    let mut lines = vec![format!("You have {} todo(s):", list.len())];
    for (index, todo) in list.todos.iter().enumerate() {
        let mark = if todo.completed { "x" } else { " " };
        let mut line = format!("{}. [{mark}] {}", index + 1, todo.title);
        if !todo.description.is_empty() {
            line.push_str(&format!(" - {}", todo.description));
        }
        line.push_str(&format!(" (id: {})", todo.id));
        lines.push(line);
    }
    lines.join("\n")
}

fn create_arguments(text: &str) -> Option<Value> {
    let quoted = quoted_phrases(text);
    let (title, description) = match quoted.as_slice() {
        [title, description, ..] => (title.clone(), description.clone()),
        [title] => (title.clone(), String::new()),
        [] => {
            let remainder = strip_filler(text, CREATE_LEADING, CREATE_TRAILING);
            match remainder.split_once(" - ") {
                Some((title, description)) => {
                    (title.trim().to_string(), description.trim().to_string())
                }
                None => (remainder, String::new()),
            }
        }
    };

    if title.is_empty() {
        return None;
    }
    Some(json!({"title": title, "description": description}))
}

fn update_arguments(text: &str) -> Value {
    let tokens = tokenize(&normalize_text(&unquoted(text)));
    let mut arguments = Map::new();

    if let Some(status) = completion_status(&tokens) {
        arguments.insert("completed".to_string(), json!(status));
    }

    if let Some(id) = find_uuid(text) {
        arguments.insert("id".to_string(), json!(id));
        return Value::Object(arguments);
    }
    if has_any(&tokens, ALL_WORDS) {
        arguments.insert("mark_all".to_string(), json!(true));
        return Value::Object(arguments);
    }

    let quoted = quoted_phrases(text);
    if let [current, renamed, ..] = quoted.as_slice() {
        arguments.insert("match_title".to_string(), json!(current));
        arguments.insert("new_title".to_string(), json!(renamed));
        return Value::Object(arguments);
    }
    if let Some((current, renamed)) = rename_parts(text) {
        arguments.insert("match_title".to_string(), json!(current));
        arguments.insert("new_title".to_string(), json!(renamed));
        return Value::Object(arguments);
    }

    let target = match quoted.first() {
        Some(title) => title.clone(),
        None => strip_filler(text, UPDATE_LEADING, UPDATE_TRAILING),
    };
    if !target.is_empty() {
        arguments.insert("match_title".to_string(), json!(target));
    }
    Value::Object(arguments)
}

fn delete_arguments(text: &str) -> Value {
    let tokens = tokenize(&normalize_text(&unquoted(text)));

    if let Some(id) = find_uuid(text) {
        return json!({"id": id});
    }
    if has_any(&tokens, ALL_WORDS) {
        return json!({"delete_all": true});
    }

    let title = match quoted_phrases(text).into_iter().next() {
        Some(title) => title,
        None => strip_filler(text, DELETE_LEADING, DELETE_TRAILING),
    };
    if title.is_empty() {
        json!({})
    } else {
        json!({"title": title})
    }
}

fn completion_status(tokens: &[String]) -> Option<bool> {
    if has_any(tokens, UNDONE_WORDS) {
        Some(false)
    } else if has_any(tokens, DONE_WORDS) {
        Some(true)
    } else {
        None
    }
}

/// `rename X to Y` / `change X to Y`, keeping the user's casing.
fn rename_parts(text: &str) -> Option<(String, String)> {
    let words = text.split_whitespace().collect::<Vec<_>>();
    let verb = words
        .iter()
        .position(|word| matches!(bare(word).as_str(), "rename" | "change" | "retitle"))?;
    let to = words.iter().skip(verb + 1).position(|word| bare(word) == "to")? + verb + 1;

    let current = strip_filler(&words[verb + 1..to].join(" "), UPDATE_LEADING, &["title", "of"]);
    let renamed = words[to + 1..].join(" ");
    let renamed = renamed.trim_matches(|character: char| matches!(character, '.' | '!' | '?'));
    if current.is_empty() || renamed.is_empty() {
        return None;
    }
    Some((current, renamed.to_string()))
}

/// Drops filler words from both ends while preserving the middle verbatim.
fn strip_filler(text: &str, leading: &[&str], trailing: &[&str]) -> String {
    let words = text.split_whitespace().collect::<Vec<_>>();
    let mut start = 0;
    let mut end = words.len();
    while start < end && leading.contains(&bare(words[start]).as_str()) {
        start += 1;
    }
    while end > start && trailing.contains(&bare(words[end - 1]).as_str()) {
        end -= 1;
    }
    words[start..end]
        .join(" ")
        .trim_matches(|character: char| matches!(character, '.' | '!' | '?' | ',' | ':'))
        .trim()
        .to_string()
}

/// Splits on quote characters. Odd segments are quoted; an unbalanced trailing
/// quote does not open a phrase.
fn quote_segments(text: &str) -> (Vec<&str>, usize) {
    let segments = text
        .split(|character: char| matches!(character, '"' | '\u{201c}' | '\u{201d}'))
        .collect::<Vec<_>>();
    let closed = if segments.len() % 2 == 0 { segments.len() - 1 } else { segments.len() };
    (segments, closed)
}

fn quoted_phrases(text: &str) -> Vec<String> {
    let (segments, closed) = quote_segments(text);
    segments[..closed]
        .iter()
        .skip(1)
        .step_by(2)
        .map(|phrase| phrase.trim())
        .filter(|phrase| !phrase.is_empty())
        .map(str::to_string)
        .collect()
}

/// The text with every quoted phrase removed, so words inside a quoted title
/// never act as keywords.
fn unquoted(text: &str) -> String {
    let (segments, closed) = quote_segments(text);
    segments
        .iter()
        .enumerate()
        .filter(|(index, _)| index % 2 == 0 || *index >= closed)
        .map(|(_, segment)| *segment)
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_uuid(text: &str) -> Option<String> {
    text.split(|character: char| !(character.is_ascii_hexdigit() || character == '-'))
        .find_map(|candidate| Uuid::parse_str(candidate).ok())
        .map(|id| id.hyphenated().to_string())
}

fn has_any(tokens: &[String], words: &[&str]) -> bool {
    tokens.iter().any(|token| words.contains(&token.as_str()))
}

fn bare(word: &str) -> String {
    normalize_text(word.trim_matches(|character: char| !character.is_alphanumeric()))
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || character == '-' {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}
