//! Record store for todos.
//!
//! A single flat `todo` collection behind the [`TodoStore`] trait. The SQLite
//! implementation owns nothing but a pool handle; the in-memory one exists for
//! tests and throwaway sessions.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_lazy_with_settings, connect_with_settings, ping, DbPool};
pub use repositories::{InMemoryTodoStore, RepositoryError, SqlTodoStore, TodoStore};
