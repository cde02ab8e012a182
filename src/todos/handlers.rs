use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::extractors::AuthUser;
use crate::error::{ApiError, DenyReason};
use crate::state::AppState;
use crate::todos::dto::{
    AdminTodoListResponse, AdminTodoQuery, AdminTodoUpdateRequest, AdminTodoView,
    CreateTodoRequest, Pagination, TodoView, UpdateTodoRequest,
};
use crate::todos::repo::Todo;
use crate::users::role;

pub fn own_routes() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/todos", get(admin_list_todos).put(admin_update_todo))
        .route(
            "/admin/todos/:id",
            get(admin_get_todo).delete(admin_delete_todo),
        )
}

fn validated_title(title: &str) -> Result<&str, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::invalid_input("Title is required"));
    }
    if title.len() > 100 {
        return Err(ApiError::invalid_input(
            "Title cannot be more than 100 characters",
        ));
    }
    Ok(title)
}

/// Role-only gate for the admin todo surface. The token role is enough here;
/// nothing below consults permission flags.
fn require_todo_admin(actor: &AuthUser) -> Result<(), ApiError> {
    if !role::can_manage_all_todos(actor.role) {
        return Err(ApiError::Forbidden(DenyReason::Scope));
    }
    Ok(())
}

// --- owner-scoped handlers ---

#[instrument(skip(state))]
async fn list_todos(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<Vec<TodoView>>, ApiError> {
    let todos = Todo::list_by_user(&state.db, actor.id).await?;
    Ok(Json(todos.into_iter().map(TodoView::from).collect()))
}

#[instrument(skip(state, payload))]
async fn create_todo(
    State(state): State<AppState>,
    actor: AuthUser,
    Json(payload): Json<CreateTodoRequest>,
) -> Result<(StatusCode, Json<TodoView>), ApiError> {
    let title = validated_title(&payload.title)?;
    let todo = Todo::create(&state.db, actor.id, title, payload.completed).await?;
    Ok((StatusCode::CREATED, Json(TodoView::from(todo))))
}

#[instrument(skip(state))]
async fn get_todo(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TodoView>, ApiError> {
    let todo = Todo::find_own(&state.db, actor.id, id)
        .await?
        .ok_or(ApiError::NotFound("Todo"))?;
    Ok(Json(TodoView::from(todo)))
}

#[instrument(skip(state, payload))]
async fn update_todo(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTodoRequest>,
) -> Result<Json<TodoView>, ApiError> {
    let title = payload.title.as_deref().map(validated_title).transpose()?;
    let todo = Todo::update_own(&state.db, actor.id, id, title, payload.completed)
        .await?
        .ok_or(ApiError::NotFound("Todo"))?;
    Ok(Json(TodoView::from(todo)))
}

#[instrument(skip(state))]
async fn delete_todo(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !Todo::delete_own(&state.db, actor.id, id).await? {
        return Err(ApiError::NotFound("Todo"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- admin handlers ---

#[instrument(skip(state))]
async fn admin_list_todos(
    State(state): State<AppState>,
    actor: AuthUser,
    Query(query): Query<AdminTodoQuery>,
) -> Result<Json<AdminTodoListResponse>, ApiError> {
    require_todo_admin(&actor)?;

    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 200);
    let offset = (page - 1) * limit;
    let search = query.search.as_deref().filter(|s| !s.is_empty());

    let todos = Todo::list_all(&state.db, limit, offset, search).await?;
    let total = Todo::count_all(&state.db, search).await?;

    Ok(Json(AdminTodoListResponse {
        todos: todos.into_iter().map(AdminTodoView::from).collect(),
        pagination: Pagination {
            total,
            page,
            limit,
            pages: (total + limit - 1) / limit,
        },
    }))
}

#[instrument(skip(state))]
async fn admin_get_todo(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AdminTodoView>, ApiError> {
    require_todo_admin(&actor)?;
    let todo = Todo::find_with_owner(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Todo"))?;
    Ok(Json(AdminTodoView::from(todo)))
}

#[instrument(skip(state, payload))]
async fn admin_update_todo(
    State(state): State<AppState>,
    actor: AuthUser,
    Json(payload): Json<AdminTodoUpdateRequest>,
) -> Result<Json<TodoView>, ApiError> {
    require_todo_admin(&actor)?;
    let title = payload.title.as_deref().map(validated_title).transpose()?;
    let todo = Todo::update_any(&state.db, payload.id, title, payload.completed)
        .await?
        .ok_or(ApiError::NotFound("Todo"))?;
    Ok(Json(TodoView::from(todo)))
}

#[instrument(skip(state))]
async fn admin_delete_todo(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_todo_admin(&actor)?;
    if !Todo::delete_any(&state.db, id).await? {
        return Err(ApiError::NotFound("Todo"));
    }
    Ok(StatusCode::NO_CONTENT)
}
