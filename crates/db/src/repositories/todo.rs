use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use tracing::debug;

use tidy_core::domain::todo::{NewTodo, Todo, TodoId, TodoPatch, TodoSelector};

use super::{RepositoryError, TodoStore};
use crate::DbPool;

pub struct SqlTodoStore {
    pool: DbPool,
}

impl SqlTodoStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl TodoStore for SqlTodoStore {
    async fn insert(&self, todo: NewTodo) -> Result<Todo, RepositoryError> {
        let todo = todo.into_todo(TodoId::generate());
        sqlx::query("INSERT INTO todo (id, title, description, completed) VALUES (?, ?, ?, 0)")
            .bind(todo.id.as_str())
            .bind(&todo.title)
            .bind(&todo.description)
            .execute(&self.pool)
            .await?;

        debug!(event_name = "store.todo.inserted", todo_id = %todo.id, "todo inserted");
        Ok(todo)
    }

    async fn find_all(&self) -> Result<Vec<Todo>, RepositoryError> {
        let rows = sqlx::query("SELECT id, title, description, completed FROM todo ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_todo).collect()
    }

    async fn update(
        &self,
        selector: &TodoSelector,
        patch: &TodoPatch,
    ) -> Result<u64, RepositoryError> {
        if patch.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let Some(target) = resolve_target(&mut tx, selector).await? else {
            tx.commit().await?;
            return Ok(0);
        };

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE todo SET ");
        {
            let mut assignments = builder.separated(", ");
            if let Some(title) = &patch.title {
                assignments.push("title = ");
                assignments.push_bind_unseparated(title.clone());
            }
            if let Some(description) = &patch.description {
                assignments.push("description = ");
                assignments.push_bind_unseparated(description.clone());
            }
            if let Some(completed) = patch.completed {
                assignments.push("completed = ");
                assignments.push_bind_unseparated(i64::from(completed));
            }
        }
        push_target(&mut builder, target);

        let affected = builder.build().execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;
        debug!(event_name = "store.todo.updated", affected, "todos updated");
        Ok(affected)
    }

    async fn delete(&self, selector: &TodoSelector) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let Some(target) = resolve_target(&mut tx, selector).await? else {
            tx.commit().await?;
            return Ok(0);
        };

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM todo");
        push_target(&mut builder, target);

        let affected = builder.build().execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;
        debug!(event_name = "store.todo.deleted", affected, "todos deleted");
        Ok(affected)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM todo").fetch_one(&self.pool).await?;
        u64::try_from(count).map_err(|_| RepositoryError::Decode(format!("negative count {count}")))
    }
}

/// Rows a write applies to. `None` from [`resolve_target`] means nothing matched.
enum Target {
    All,
    Ids(Vec<String>),
}

/// SQLite's `lower()` and `LIKE` only fold ASCII, so title matching is done
/// here with the same Unicode folding as [`TodoSelector::matches`].
async fn resolve_target(
    tx: &mut Transaction<'_, Sqlite>,
    selector: &TodoSelector,
) -> Result<Option<Target>, RepositoryError> {
    match selector {
        TodoSelector::All => Ok(Some(Target::All)),
        TodoSelector::Id(id) => Ok(Some(Target::Ids(vec![id.0.clone()]))),
        TodoSelector::TitleContains(needle) => {
            let needle = needle.to_lowercase();
            let rows = sqlx::query("SELECT id, title FROM todo ORDER BY rowid")
                .fetch_all(&mut **tx)
                .await?;

            let mut ids = Vec::new();
            for row in &rows {
                let title: String = row.try_get("title")?;
                if title.to_lowercase().contains(&needle) {
                    ids.push(row.try_get::<String, _>("id")?);
                }
            }
            Ok((!ids.is_empty()).then_some(Target::Ids(ids)))
        }
    }
}

fn push_target(builder: &mut QueryBuilder<'_, Sqlite>, target: Target) {
    let Target::Ids(ids) = target else {
        return;
    };
    builder.push(" WHERE id IN (");
    let mut values = builder.separated(", ");
    for id in ids {
        values.push_bind(id);
    }
    values.push_unseparated(")");
}

fn decode_todo(row: &SqliteRow) -> Result<Todo, RepositoryError> {
    let id: String = row.try_get("id")?;
    let title: Option<String> = row.try_get("title")?;
    let description: Option<String> = row.try_get("description")?;
    let completed: Option<i64> = row.try_get("completed")?;

    let missing = |field: &str| RepositoryError::Decode(format!("todo {id} is missing `{field}`"));
    let completed = match completed {
        Some(0) => false,
        Some(1) => true,
        Some(other) => {
            return Err(RepositoryError::Decode(format!(
                "todo {id} has non-boolean `completed` value {other}"
            )))
        }
        None => return Err(missing("completed")),
    };

    Ok(Todo {
        title: title.ok_or_else(|| missing("title"))?,
        description: description.ok_or_else(|| missing("description"))?,
        completed,
        id: TodoId(id),
    })
}
