use std::collections::BTreeMap;

use tokio::sync::RwLock;

use tidy_core::domain::todo::{NewTodo, Todo, TodoId, TodoPatch, TodoSelector};

use super::{RepositoryError, TodoStore};

/// Keeps insertion order via a monotonically increasing sequence key.
#[derive(Default)]
pub struct InMemoryTodoStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_seq: u64,
    todos: BTreeMap<u64, Todo>,
}

#[async_trait::async_trait]
impl TodoStore for InMemoryTodoStore {
    async fn insert(&self, todo: NewTodo) -> Result<Todo, RepositoryError> {
        let todo = todo.into_todo(TodoId::generate());
        let mut state = self.state.write().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.todos.insert(seq, todo.clone());
        Ok(todo)
    }

    async fn find_all(&self) -> Result<Vec<Todo>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.todos.values().cloned().collect())
    }

    async fn update(
        &self,
        selector: &TodoSelector,
        patch: &TodoPatch,
    ) -> Result<u64, RepositoryError> {
        if patch.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.write().await;
        let mut affected = 0;
        for todo in state.todos.values_mut().filter(|todo| selector.matches(todo)) {
            patch.apply(todo);
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, selector: &TodoSelector) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.todos.len();
        state.todos.retain(|_, todo| !selector.matches(todo));
        Ok((before - state.todos.len()) as u64)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.state.read().await.todos.len() as u64)
    }
}
