use async_trait::async_trait;
use thiserror::Error;

use tidy_core::domain::todo::{NewTodo, Todo, TodoPatch, TodoSelector};
use tidy_core::errors::DomainError;

pub mod memory;
pub mod todo;

pub use memory::InMemoryTodoStore;
pub use todo::SqlTodoStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// CRUD over the single todo collection. Each call is one atomic store operation;
/// nothing spans calls.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn insert(&self, todo: NewTodo) -> Result<Todo, RepositoryError>;

    /// Every record, no paging. One undecodable record fails the whole read.
    async fn find_all(&self) -> Result<Vec<Todo>, RepositoryError>;

    /// Returns the number of records the selector matched.
    async fn update(
        &self,
        selector: &TodoSelector,
        patch: &TodoPatch,
    ) -> Result<u64, RepositoryError>;

    async fn delete(&self, selector: &TodoSelector) -> Result<u64, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;
}
