pub mod config;
pub mod domain;
pub mod errors;

pub use domain::todo::{NewTodo, Todo, TodoId, TodoList, TodoPatch, TodoSelector};
pub use errors::DomainError;
