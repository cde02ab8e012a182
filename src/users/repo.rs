use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::guard::{PermissionsWrite, UpdatePlan};
use crate::users::role::{AdminPermissions, Role};

/// User record as the rest of the crate sees it: role already parsed,
/// permission flags present iff the account is an admin.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub admin_permissions: Option<AdminPermissions>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Raw database row; the role column is free text constrained by the schema.
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: Option<String>,
    role: String,
    admin_permissions: Option<Json<AdminPermissions>>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl UserRow {
    fn into_user(self) -> sqlx::Result<User> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown role '{}'", self.role).into()))?;
        // Permission flags exist iff the account is an admin; normalize here
        // so no other code ever sees an admin without a flag set.
        let admin_permissions = match role {
            Role::Admin => Some(
                self.admin_permissions
                    .map(|Json(p)| p)
                    .unwrap_or_else(AdminPermissions::promotion_defaults),
            ),
            Role::User | Role::SuperAdmin => None,
        };
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role,
            admin_permissions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, admin_permissions, created_at, updated_at";

impl User {
    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> sqlx::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        row.map(UserRow::into_user).transpose()
    }

    pub async fn find_by_email(db: impl PgExecutor<'_>, email: &str) -> sqlx::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        row.map(UserRow::into_user).transpose()
    }

    /// All users, newest first.
    pub async fn list_all(db: impl PgExecutor<'_>) -> sqlx::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(db)
        .await?;
        rows.into_iter().map(UserRow::into_user).collect()
    }

    pub async fn find_many_by_ids(
        db: impl PgExecutor<'_>,
        ids: &[Uuid],
    ) -> sqlx::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(db)
        .await?;
        rows.into_iter().map(UserRow::into_user).collect()
    }

    pub async fn create(
        db: impl PgExecutor<'_>,
        name: &str,
        email: &str,
        password_hash: Option<&str>,
        role: Role,
        admin_permissions: Option<AdminPermissions>,
    ) -> sqlx::Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role, admin_permissions)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(admin_permissions.map(Json))
        .fetch_one(db)
        .await?;
        row.into_user()
    }

    /// Apply a guard-approved update plan as one statement, so a role flip and
    /// its permission assignment/clear are never observable separately.
    pub async fn apply_update(
        db: impl PgExecutor<'_>,
        id: Uuid,
        plan: &UpdatePlan,
    ) -> sqlx::Result<Option<User>> {
        let (write_permissions, permissions) = match plan.permissions {
            PermissionsWrite::Keep => (false, None),
            PermissionsWrite::Set(p) => (true, Some(Json(p))),
            PermissionsWrite::Clear => (true, None),
        };
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                admin_permissions = CASE WHEN $5 THEN $6 ELSE admin_permissions END,
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(plan.name.as_deref())
        .bind(plan.email.as_deref())
        .bind(plan.role.map(|r| r.as_str()))
        .bind(write_permissions)
        .bind(permissions)
        .fetch_optional(db)
        .await?;
        row.map(UserRow::into_user).transpose()
    }

    /// In-place overwrite used by the create-or-update-by-email merge path.
    pub async fn overwrite(
        db: impl PgExecutor<'_>,
        id: Uuid,
        name: Option<&str>,
        role: Role,
        password_hash: Option<&str>,
        admin_permissions: Option<AdminPermissions>,
    ) -> sqlx::Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                role = $3,
                password_hash = COALESCE($4, password_hash),
                admin_permissions = $5,
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(role.as_str())
        .bind(password_hash)
        .bind(admin_permissions.map(Json))
        .fetch_one(db)
        .await?;
        row.into_user()
    }

    /// Self-service profile update; role and permissions are not reachable here.
    pub async fn update_profile(
        db: impl PgExecutor<'_>,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> sqlx::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(db)
        .await?;
        row.map(UserRow::into_user).transpose()
    }

    pub async fn delete(db: impl PgExecutor<'_>, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Batch delete as a single statement; callers validate the whole set first.
    pub async fn delete_many(db: impl PgExecutor<'_>, ids: &[Uuid]) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(ids)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(db: impl PgExecutor<'_>) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await
    }
}
