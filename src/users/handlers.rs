use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::extractors::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::dto::{
    AdminUpdateUserRequest, BulkDeleteRequest, BulkDeleteResponse, CreateOrUpdateUserRequest,
    UpdateProfileRequest, UserView,
};
use crate::users::service;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/admin/users",
            get(list_users)
                .post(create_or_update_user)
                .delete(bulk_delete_users),
        )
        .route("/admin/users/:id", put(update_user).delete(delete_user))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/users/profile", get(get_profile).put(update_profile))
}

#[instrument(skip(state))]
async fn list_users(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = service::list_users(&state.db, actor.id).await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

#[instrument(skip(state, payload))]
async fn update_user(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    let user = service::update_user(&state.db, actor.id, id, payload).await?;
    Ok(Json(UserView::from(user)))
}

#[instrument(skip(state))]
async fn delete_user(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    service::delete_user(&state.db, actor.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
async fn bulk_delete_users(
    State(state): State<AppState>,
    actor: AuthUser,
    Json(payload): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    let deleted = service::bulk_delete_users(&state.db, actor.id, &payload.ids).await?;
    Ok(Json(BulkDeleteResponse { deleted }))
}

#[instrument(skip(state, payload))]
async fn create_or_update_user(
    State(state): State<AppState>,
    actor: AuthUser,
    Json(payload): Json<CreateOrUpdateUserRequest>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let (user, created) = service::create_or_update_user(&state.db, actor.id, payload).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(UserView::from(user))))
}

#[instrument(skip(state))]
async fn get_profile(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<UserView>, ApiError> {
    let user = service::get_profile(&state.db, actor.id).await?;
    Ok(Json(UserView::from(user)))
}

#[instrument(skip(state, payload))]
async fn update_profile(
    State(state): State<AppState>,
    actor: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserView>, ApiError> {
    let user = service::update_profile(&state.db, actor.id, payload).await?;
    Ok(Json(UserView::from(user)))
}
