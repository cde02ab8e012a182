use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;

use crate::auth::extractors::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::todos::repo::Todo;
use crate::users::repo::User;
use crate::users::role;

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub completed: i64,
    pub pending: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    pub total_tasks: i64,
    pub system_status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub user_stats: UserStats,
    pub admin_stats: Option<AdminStats>,
}

#[instrument(skip(state))]
async fn stats(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<StatsResponse>, ApiError> {
    let (total, completed) = Todo::stats_for_user(&state.db, actor.id).await?;
    let active = total - completed;

    let admin_stats = if role::can_view_users(actor.role) {
        Some(AdminStats {
            total_users: User::count(&state.db).await?,
            total_tasks: Todo::count(&state.db).await?,
            system_status: "Active",
        })
    } else {
        None
    };

    Ok(Json(StatsResponse {
        user_stats: UserStats {
            total,
            active,
            completed,
            pending: active,
        },
        admin_stats,
    }))
}
