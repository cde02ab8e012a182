use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::role::{AdminPermissions, Role};

/// Type of JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[serde(alias = "Access")]
    Access,
    #[serde(alias = "Refresh")]
    Refresh,
}

/// JWT payload. The role and permission flags are a snapshot from issuance
/// time, carried for clients and fast-path role checks only; anything gated
/// by permission flags re-reads the store instead of trusting the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_permissions: Option<AdminPermissions>,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}
