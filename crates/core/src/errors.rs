use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("'{0}' is not a valid todo id")]
    InvalidTodoId(String),
}
