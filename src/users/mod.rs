use axum::Router;

use crate::state::AppState;

pub mod dto;
pub mod guard;
pub mod handlers;
pub mod repo;
pub mod role;
pub mod service;

pub fn router() -> Router<AppState> {
    handlers::admin_routes().merge(handlers::profile_routes())
}
