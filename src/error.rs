use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Specific cause attached to every `Forbidden` rejection, so callers and
/// tests can assert on why an authenticated actor was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Editing another user's name/email without `canUpdateUserInfo`.
    UpdateInfo,
    /// Demoting an admin without `canDemoteAdmins`.
    Demote,
    /// Touching the super-admin tier as a non-super-admin.
    SuperAdminOnly,
    /// Editing admin permission flags without `canPromoteToAdmin`.
    PermissionsUpdate,
    /// Admin actor reaching outside user-role accounts.
    Scope,
    /// Deleting your own account.
    SelfDelete,
    /// Deleting a super-admin as a lower tier.
    Tier,
    /// Deleting without `canDeleteUsers`.
    Permission,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::UpdateInfo => "update-info",
            DenyReason::Demote => "demote",
            DenyReason::SuperAdminOnly => "super-admin-only",
            DenyReason::PermissionsUpdate => "permissions-update",
            DenyReason::Scope => "scope",
            DenyReason::SelfDelete => "self-delete",
            DenyReason::Tier => "tier",
            DenyReason::Permission => "permission",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(DenyReason),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ApiError::InvalidInput(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Translate a sqlx failure, surfacing unique-key violations as `Conflict`
    /// and everything else as an opaque internal error.
    pub fn from_sqlx(err: sqlx::Error, conflict_msg: &str) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some("23505") {
                return ApiError::Conflict(conflict_msg.to_string());
            }
        }
        ApiError::Internal(err.into())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Internal(cause) => {
                error!(error = %cause, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_reasons_render_as_stable_slugs() {
        assert_eq!(
            ApiError::Forbidden(DenyReason::UpdateInfo).to_string(),
            "Forbidden: update-info"
        );
        assert_eq!(
            ApiError::Forbidden(DenyReason::SuperAdminOnly).to_string(),
            "Forbidden: super-admin-only"
        );
        assert_eq!(
            ApiError::Forbidden(DenyReason::SelfDelete).to_string(),
            "Forbidden: self-delete"
        );
    }

    #[test]
    fn errors_map_to_expected_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Forbidden(DenyReason::Scope).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::NotFound("User").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::invalid_input("Valid role is required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("Email is already in use".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
