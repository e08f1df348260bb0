use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use tidy_core::domain::todo::{NewTodo, TodoId, TodoList, TodoPatch, TodoSelector};
use tidy_core::errors::DomainError;
use tidy_db::{RepositoryError, TodoStore};

use crate::llm::ToolSpec;

pub const CREATE_TODO: &str = "create_todo";
pub const READ_TODOS: &str = "read_todos";
pub const UPDATE_TODO: &str = "update_todo";
pub const DELETE_TODO: &str = "delete_todo";

pub const NO_UPDATE_FIELDS: &str = "No update fields provided (new_title, description, or completed)";
pub const UPDATE_GUIDANCE: &str = "Please provide an ID, match_title, or set mark_all=true.";
pub const DELETE_GUIDANCE: &str = "Please provide an ID, title, or set delete_all=true.";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: &'static str, message: String },
    #[error("Error reading todos: {0}")]
    Read(#[source] RepositoryError),
    #[error(transparent)]
    Store(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("could not encode result of `{tool}`: {message}")]
    Encode { tool: &'static str, message: String },
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema of the argument object.
    fn parameters(&self) -> Value;
    async fn call(&self, input: Value) -> Result<String, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Tools in registration order; registering a name twice replaces the first
/// tool in place.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let tool: Box<dyn Tool> = Box::new(tool);
        match self.tools.iter_mut().find(|existing| existing.name() == tool.name()) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|tool| tool.name() == name).map(|tool| tool.as_ref())
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn decode_args<T>(tool: &'static str, input: Value) -> Result<T, ToolError>
where
    T: DeserializeOwned,
{
    // Some providers send `null` for zero-argument calls.
    let input = if input.is_null() { Value::Object(Default::default()) } else { input };
    serde_json::from_value(input)
        .map_err(|error| ToolError::InvalidArguments { tool, message: error.to_string() })
}

/// Filter arguments: blank means "not provided".
fn provided(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub struct CreateTodoTool {
    store: Arc<dyn TodoStore>,
}

impl CreateTodoTool {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct CreateTodoArgs {
    title: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl Tool for CreateTodoTool {
    fn name(&self) -> &'static str {
        CREATE_TODO
    }

    fn description(&self) -> &'static str {
        "Create a new todo item with the given title and description."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short title of the todo"},
                "description": {"type": "string", "description": "Longer free-text details; may be empty"}
            },
            "required": ["title", "description"]
        })
    }

    async fn call(&self, input: Value) -> Result<String, ToolError> {
        let args: CreateTodoArgs = decode_args(CREATE_TODO, input)?;
        let todo = self.store.insert(NewTodo::new(args.title, args.description)).await?;
        Ok(format!("Todo created with ID: {}", todo.id))
    }
}

pub struct ReadTodosTool {
    store: Arc<dyn TodoStore>,
}

impl ReadTodosTool {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self { store }
    }

    pub async fn read(&self) -> Result<TodoList, ToolError> {
        let todos = self.store.find_all().await.map_err(ToolError::Read)?;
        Ok(TodoList { todos })
    }
}

#[async_trait]
impl Tool for ReadTodosTool {
    fn name(&self) -> &'static str {
        READ_TODOS
    }

    fn description(&self) -> &'static str {
        "Fetch every todo item with its id, title, description and completion status."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _input: Value) -> Result<String, ToolError> {
        let list = self.read().await?;
        serde_json::to_string(&list)
            .map_err(|error| ToolError::Encode { tool: READ_TODOS, message: error.to_string() })
    }
}

pub struct UpdateTodoTool {
    store: Arc<dyn TodoStore>,
}

impl UpdateTodoTool {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTodoArgs {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub new_title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub match_title: Option<String>,
    #[serde(default)]
    pub mark_all: Option<bool>,
}

impl UpdateTodoTool {
    pub async fn apply(&self, args: UpdateTodoArgs) -> Result<String, ToolError> {
        let patch = TodoPatch {
            title: args.new_title,
            description: args.description,
            completed: args.completed,
        };
        if patch.is_empty() {
            return Ok(NO_UPDATE_FIELDS.to_string());
        }

        if args.mark_all.unwrap_or(false) {
            let affected = self.store.update(&TodoSelector::All, &patch).await?;
            return Ok(format!("Updated {affected} todos."));
        }

        if let Some(raw_id) = provided(args.id) {
            let id = TodoId::parse(&raw_id)?;
            let affected = self.store.update(&TodoSelector::Id(id.clone()), &patch).await?;
            return Ok(format!("Updated {affected} todo(s) with ID {id}."));
        }

        if let Some(match_title) = provided(args.match_title) {
            let selector = TodoSelector::TitleContains(match_title.clone());
            let affected = self.store.update(&selector, &patch).await?;
            return Ok(format!("Updated {affected} todos matching '{match_title}'."));
        }

        Ok(UPDATE_GUIDANCE.to_string())
    }
}

#[async_trait]
impl Tool for UpdateTodoTool {
    fn name(&self) -> &'static str {
        UPDATE_TODO
    }

    fn description(&self) -> &'static str {
        "Update todo item(s). Target one todo by id, every todo whose title contains \
         match_title, or all todos with mark_all. Omit a field to leave it unchanged."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "ID of a specific todo to update"},
                "new_title": {"type": "string", "description": "New title to set; omit to keep the current title"},
                "description": {"type": "string", "description": "New description to set; omit to keep the current description"},
                "completed": {"type": "boolean", "description": "New completion status; omit to keep it"},
                "match_title": {"type": "string", "description": "Case-insensitive text contained in the current title of the todos to update"},
                "mark_all": {"type": "boolean", "description": "Apply the update to every todo"}
            }
        })
    }

    async fn call(&self, input: Value) -> Result<String, ToolError> {
        let args: UpdateTodoArgs = decode_args(UPDATE_TODO, input)?;
        self.apply(args).await
    }
}

pub struct DeleteTodoTool {
    store: Arc<dyn TodoStore>,
}

impl DeleteTodoTool {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteTodoArgs {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub delete_all: Option<bool>,
}

impl DeleteTodoTool {
    pub async fn apply(&self, args: DeleteTodoArgs) -> Result<String, ToolError> {
        if args.delete_all.unwrap_or(false) {
            let affected = self.store.delete(&TodoSelector::All).await?;
            return Ok(format!("Deleted {affected} todo item(s)."));
        }

        if let Some(raw_id) = provided(args.id) {
            let id = TodoId::parse(&raw_id)?;
            let affected = self.store.delete(&TodoSelector::Id(id.clone())).await?;
            return Ok(format!("Deleted {affected} todo item(s) with ID {id}"));
        }

        if let Some(title) = provided(args.title) {
            let affected = self.store.delete(&TodoSelector::TitleContains(title.clone())).await?;
            return Ok(format!("Deleted {affected} todo item(s) matching title '{title}'"));
        }

        Ok(DELETE_GUIDANCE.to_string())
    }
}

#[async_trait]
impl Tool for DeleteTodoTool {
    fn name(&self) -> &'static str {
        DELETE_TODO
    }

    fn description(&self) -> &'static str {
        "Delete todo item(s) by id, by (partial, case-insensitive) title, or delete all todos."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "ID of the todo to delete"},
                "title": {"type": "string", "description": "Text contained in the titles of the todos to delete"},
                "delete_all": {"type": "boolean", "description": "Set to true to delete every todo"}
            }
        })
    }

    async fn call(&self, input: Value) -> Result<String, ToolError> {
        let args: DeleteTodoArgs = decode_args(DELETE_TODO, input)?;
        self.apply(args).await
    }
}
