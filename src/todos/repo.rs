use sqlx::postgres::PgExecutor;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub completed: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Todo joined with its owner, for the admin views.
#[derive(Debug, Clone, FromRow)]
pub struct TodoWithOwner {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub owner_email: String,
}

const OWNER_SELECT: &str = r#"
    SELECT t.id, t.title, t.completed, t.created_at, t.updated_at,
           u.id AS owner_id, u.name AS owner_name, u.email AS owner_email
    FROM todos t
    JOIN users u ON u.id = t.user_id
"#;

impl Todo {
    pub async fn list_by_user(db: impl PgExecutor<'_>, user_id: Uuid) -> sqlx::Result<Vec<Todo>> {
        sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, user_id, title, completed, created_at, updated_at
            FROM todos
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    pub async fn find_own(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        id: Uuid,
    ) -> sqlx::Result<Option<Todo>> {
        sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, user_id, title, completed, created_at, updated_at
            FROM todos
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    pub async fn create(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        title: &str,
        completed: bool,
    ) -> sqlx::Result<Todo> {
        sqlx::query_as::<_, Todo>(
            r#"
            INSERT INTO todos (user_id, title, completed)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, title, completed, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(completed)
        .fetch_one(db)
        .await
    }

    pub async fn update_own(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        id: Uuid,
        title: Option<&str>,
        completed: Option<bool>,
    ) -> sqlx::Result<Option<Todo>> {
        sqlx::query_as::<_, Todo>(
            r#"
            UPDATE todos SET
                title = COALESCE($3, title),
                completed = COALESCE($4, completed),
                updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, completed, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(completed)
        .fetch_optional(db)
        .await
    }

    pub async fn delete_own(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        id: Uuid,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_all(
        db: impl PgExecutor<'_>,
        limit: i64,
        offset: i64,
        search: Option<&str>,
    ) -> sqlx::Result<Vec<TodoWithOwner>> {
        sqlx::query_as::<_, TodoWithOwner>(&format!(
            r#"
            {OWNER_SELECT}
            WHERE ($3::text IS NULL OR t.title ILIKE '%' || $3 || '%')
            ORDER BY t.created_at DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .bind(search)
        .fetch_all(db)
        .await
    }

    pub async fn count_all(db: impl PgExecutor<'_>, search: Option<&str>) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM todos WHERE ($1::text IS NULL OR title ILIKE '%' || $1 || '%')",
        )
        .bind(search)
        .fetch_one(db)
        .await
    }

    pub async fn find_with_owner(
        db: impl PgExecutor<'_>,
        id: Uuid,
    ) -> sqlx::Result<Option<TodoWithOwner>> {
        sqlx::query_as::<_, TodoWithOwner>(&format!("{OWNER_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn update_any(
        db: impl PgExecutor<'_>,
        id: Uuid,
        title: Option<&str>,
        completed: Option<bool>,
    ) -> sqlx::Result<Option<Todo>> {
        sqlx::query_as::<_, Todo>(
            r#"
            UPDATE todos SET
                title = COALESCE($2, title),
                completed = COALESCE($3, completed),
                updated_at = now()
            WHERE id = $1
            RETURNING id, user_id, title, completed, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(completed)
        .fetch_optional(db)
        .await
    }

    pub async fn delete_any(db: impl PgExecutor<'_>, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(db: impl PgExecutor<'_>) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM todos")
            .fetch_one(db)
            .await
    }

    /// (total, completed) for one owner.
    pub async fn stats_for_user(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
    ) -> sqlx::Result<(i64, i64)> {
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE completed)
            FROM todos
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(db)
        .await
    }
}
