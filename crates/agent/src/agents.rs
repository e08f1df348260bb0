use std::sync::Arc;

use serde_json::json;

use tidy_db::TodoStore;

use crate::llm::ToolSpec;
use crate::tools::{
    CreateTodoTool, DeleteTodoTool, ReadTodosTool, Tool, ToolRegistry, UpdateTodoTool,
};

pub const TRIAGE_AGENT: &str = "TriageAgent";
pub const CREATE_AGENT: &str = "CreateAgent";
pub const READ_AGENT: &str = "ReadAgent";
pub const UPDATE_AGENT: &str = "UpdateAgent";
pub const DELETE_AGENT: &str = "DeleteAgent";

const CREATE_INSTRUCTIONS: &str = "\
You are a helpful assistant who creates todo items using the `create_todo` tool.

Your goals:
- If the user asks to add one or more todo items, even indirectly (\"make a todo\", \"add 5 sample todos\", \"add something to my list\"), create them.
- If the user asks you to come up with todos yourself (\"add 5 example todos\", \"generate todos\", \"create some tasks\"), invent useful, realistic ones such as daily chores, health goals, or work and study tasks.
- Call `create_todo` once per todo and report the ID it returns.
- Be friendly and quick. Do not ask many questions; assume the user wants results.

Examples of valid requests:
- \"Create 5 example todos\"
- \"Add a few new tasks like clean room, wash dishes\"
- \"Make some study reminders\"
";

const READ_INSTRUCTIONS: &str = "\
You are a specialized agent for retrieving todo items. Use the `read_todos` tool to fetch all \
todos and present them in a clear, organized format. Summarize the list concisely.";

const UPDATE_INSTRUCTIONS: &str = "\
You are a todo editing assistant that can modify todos in any way using the `update_todo` tool.

When the user asks to change a todo's title:
1. Extract both the current title (to match) and the new title.
2. Pass the current title as `match_title`.
3. Pass the new title as `new_title`.
4. Example: for \"change Review Work Tasks to buy a car\" call
   update_todo(match_title=\"Review Work Tasks\", new_title=\"buy a car\").

You can also:
- Update descriptions (`description`).
- Change completion status (`completed`).
- Make bulk updates (`mark_all=true`).
Only pass the fields the user wants changed.
";

const DELETE_INSTRUCTIONS: &str = "\
You are a helpful assistant for deleting todo items with the `delete_todo` tool.

- You can delete by ID, by title (or partial title), or delete all todos if the user asks.
- If the user says something like \"delete all\", pass `delete_all=true`.
- Infer the user's intent and match the right todos.
";

const TRIAGE_INSTRUCTIONS: &str = "\
You are a triage agent for a todo app. Analyze the user's request and decide whether to create, \
read, update, or delete todos, then hand the conversation off to the matching agent.

Hand off based on intent:
- 'create', 'add', 'new' -> CreateAgent
- 'list', 'show', 'view' -> ReadAgent
- 'update', 'edit', 'modify', 'mark', 'rename' -> UpdateAgent
- 'delete', 'remove', 'clear' -> DeleteAgent

Parameter hints for the destination agent:
- \"delete all todos\" means `delete_all=true`.
- \"update all todos\" means `mark_all=true`.
- \"delete grocery todo\" means `title='grocery'`.
- A partial title or description should be used to match existing todos.

The user might not use exact keywords. Infer intent and the relevant fields.
";

/// A prompt bound to a tool set and a list of agents it may hand off to.
pub struct Agent {
    name: String,
    handoff_description: String,
    instructions: String,
    tools: ToolRegistry,
    handoffs: Vec<Arc<Agent>>,
}

impl Agent {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handoff_description: String::new(),
            instructions: instructions.into(),
            tools: ToolRegistry::default(),
            handoffs: Vec::new(),
        }
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = description.into();
        self
    }

    pub fn with_tool<T>(mut self, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        self.tools.register(tool);
        self
    }

    pub fn with_handoff(mut self, target: Arc<Agent>) -> Self {
        self.handoffs.push(target);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn handoffs(&self) -> &[Arc<Agent>] {
        &self.handoffs
    }

    /// Name of the pseudo-tool other agents call to transfer control here.
    pub fn handoff_tool_name(&self) -> String {
        format!("transfer_to_{}", snake_case(&self.name))
    }

    pub fn handoff_target(&self, tool_name: &str) -> Option<&Arc<Agent>> {
        self.handoffs.iter().find(|target| target.handoff_tool_name() == tool_name)
    }

    /// Function tools first, then one zero-argument spec per handoff target.
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        let mut specs = self.tools.specs();
        specs.extend(self.handoffs.iter().map(|target| ToolSpec {
            name: target.handoff_tool_name(),
            description: format!(
                "Handoff to the {} agent to handle the request. {}",
                target.name, target.handoff_description
            )
            .trim_end()
            .to_string(),
            parameters: json!({"type": "object", "properties": {}, "additionalProperties": false}),
        }));
        specs
    }
}

/// Builds the four specialists and returns the triage agent that routes to them.
pub fn todo_agents(store: Arc<dyn TodoStore>) -> Arc<Agent> {
    let create = Agent::new(CREATE_AGENT, CREATE_INSTRUCTIONS)
        .with_handoff_description("Creates new todo items.")
        .with_tool(CreateTodoTool::new(store.clone()));
    let read = Agent::new(READ_AGENT, READ_INSTRUCTIONS)
        .with_handoff_description("Lists and summarizes existing todo items.")
        .with_tool(ReadTodosTool::new(store.clone()));
    let update = Agent::new(UPDATE_AGENT, UPDATE_INSTRUCTIONS)
        .with_handoff_description("Edits titles, descriptions or completion status of todos.")
        .with_tool(UpdateTodoTool::new(store.clone()));
    let delete = Agent::new(DELETE_AGENT, DELETE_INSTRUCTIONS)
        .with_handoff_description("Deletes todo items by id, title, or all at once.")
        .with_tool(DeleteTodoTool::new(store));

    Arc::new(
        Agent::new(TRIAGE_AGENT, TRIAGE_INSTRUCTIONS)
            .with_handoff(Arc::new(create))
            .with_handoff(Arc::new(read))
            .with_handoff(Arc::new(update))
            .with_handoff(Arc::new(delete)),
    )
}

fn snake_case(name: &str) -> String {
    let mut output = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for character in name.chars() {
        if character.is_ascii_uppercase() {
            if previous_lower {
                output.push('_');
            }
            output.push(character.to_ascii_lowercase());
            previous_lower = false;
        } else if character.is_ascii_alphanumeric() {
            output.push(character);
            previous_lower = true;
        } else {
            if !output.ends_with('_') {
                output.push('_');
            }
            previous_lower = false;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tidy_db::InMemoryTodoStore;

    use super::{snake_case, todo_agents, CREATE_AGENT, DELETE_AGENT, READ_AGENT, UPDATE_AGENT};
    use crate::tools::{CREATE_TODO, DELETE_TODO, READ_TODOS, UPDATE_TODO};

    #[test]
    fn snake_case_matches_handoff_convention() {
        assert_eq!(snake_case("CreateAgent"), "create_agent");
        assert_eq!(snake_case("Triage Agent"), "triage_agent");
    }

    #[test]
    fn triage_hands_off_to_four_specialists_and_owns_no_tools() {
        let triage = todo_agents(Arc::new(InMemoryTodoStore::default()));

        assert!(triage.tools().is_empty());
        let names = triage.handoffs().iter().map(|agent| agent.name()).collect::<Vec<_>>();
        assert_eq!(names, vec![CREATE_AGENT, READ_AGENT, UPDATE_AGENT, DELETE_AGENT]);

        let specs = triage.tool_specs();
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[0].name, "transfer_to_create_agent");
        assert!(triage.handoff_target("transfer_to_delete_agent").is_some());
        assert!(triage.handoff_target("transfer_to_nowhere").is_none());
    }

    #[test]
    fn each_specialist_binds_exactly_one_tool() {
        let triage = todo_agents(Arc::new(InMemoryTodoStore::default()));
        let expected = [CREATE_TODO, READ_TODOS, UPDATE_TODO, DELETE_TODO];

        for (agent, tool) in triage.handoffs().iter().zip(expected) {
            assert_eq!(agent.tools().len(), 1, "{} should own one tool", agent.name());
            assert!(agent.tools().get(tool).is_some());
            assert!(agent.handoffs().is_empty());
        }
    }
}
