use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::auth::dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest};
use crate::auth::extractors::AuthUser;
use crate::auth::is_valid_email;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::dto::UserView;
use crate::users::repo::User;
use crate::users::role::Role;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
}

fn issue_pair(keys: &JwtKeys, user: &User) -> Result<(String, String), ApiError> {
    let access_token = keys.sign_access(user)?;
    let refresh_token = keys.sign_refresh(user)?;
    Ok((access_token, refresh_token))
}

#[instrument(skip(state, payload))]
async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    let name = payload.name.trim();

    if name.is_empty() {
        return Err(ApiError::invalid_input("Missing required fields"));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::invalid_input("Invalid email"));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;

    // Self-service registration always lands on the base role.
    let user = User::create(&state.db, name, &payload.email, Some(hash.as_str()), Role::User, None)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "Email already registered"))?;

    let keys = JwtKeys::from_ref(&state);
    let (access_token, refresh_token) = issue_pair(&keys, &user)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            refresh_token,
            user: UserView::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::invalid_input("Invalid email"));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::Unauthorized);
        }
    };

    // OAuth-created accounts have no stored hash and cannot credential-login.
    let stored = match user.password_hash.as_deref() {
        Some(h) => h,
        None => {
            warn!(user_id = %user.id, "login against passwordless account");
            return Err(ApiError::Unauthorized);
        }
    };

    if !verify_password(&payload.password, stored)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized);
    }

    let keys = JwtKeys::from_ref(&state);
    let (access_token, refresh_token) = issue_pair(&keys, &user)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: UserView::from(user),
    }))
}

#[instrument(skip(state, payload))]
async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|_| ApiError::Unauthorized)?;

    // Re-read the user so the new pair carries the current role, not the one
    // from when the refresh token was minted.
    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let (access_token, refresh_token) = issue_pair(&keys, &user)?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: UserView::from(user),
    }))
}

#[instrument(skip(state))]
async fn me(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<UserView>, ApiError> {
    let user = User::find_by_id(&state.db, actor.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(UserView::from(user)))
}
