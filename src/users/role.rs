use serde::{Deserialize, Serialize};

/// The three account tiers. Stored as kebab-case text, parsed at the
/// boundary so no other code ever sees an unknown role string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            "super-admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super-admin",
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability flags carried by admin accounts only. Always fully populated
/// when present; super-admins never consult it, user accounts never have it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPermissions {
    pub can_update_user_info: bool,
    pub can_delete_users: bool,
    pub can_promote_to_admin: bool,
    pub can_demote_admins: bool,
}

impl AdminPermissions {
    /// Flags assigned when a user is promoted to admin with no explicit set.
    /// Only the info-edit capability is granted; delete/promote/demote are not.
    pub fn promotion_defaults() -> Self {
        Self {
            can_update_user_info: true,
            can_delete_users: false,
            can_promote_to_admin: false,
            can_demote_admins: false,
        }
    }
}

/// Partial permission payload from a client. Unspecified flags fall back to
/// the base value they are merged over, so a subset update never silently
/// zeroes the rest.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminPermissionsPatch {
    pub can_update_user_info: Option<bool>,
    pub can_delete_users: Option<bool>,
    pub can_promote_to_admin: Option<bool>,
    pub can_demote_admins: Option<bool>,
}

impl AdminPermissionsPatch {
    pub fn merge_over(&self, base: AdminPermissions) -> AdminPermissions {
        AdminPermissions {
            can_update_user_info: self.can_update_user_info.unwrap_or(base.can_update_user_info),
            can_delete_users: self.can_delete_users.unwrap_or(base.can_delete_users),
            can_promote_to_admin: self.can_promote_to_admin.unwrap_or(base.can_promote_to_admin),
            can_demote_admins: self.can_demote_admins.unwrap_or(base.can_demote_admins),
        }
    }
}

/// Evaluate an admin capability flag, with the super-admin bypass applied in
/// exactly one place: super-admins pass every check, plain users none.
fn admin_flag(
    role: Role,
    perms: Option<&AdminPermissions>,
    flag: fn(&AdminPermissions) -> bool,
) -> bool {
    match role {
        Role::SuperAdmin => true,
        Role::Admin => perms.map(flag).unwrap_or(false),
        Role::User => false,
    }
}

pub fn can_view_users(role: Role) -> bool {
    role.is_elevated()
}

pub fn can_update_user_info(role: Role, perms: Option<&AdminPermissions>) -> bool {
    admin_flag(role, perms, |p| p.can_update_user_info)
}

pub fn can_delete_users(role: Role, perms: Option<&AdminPermissions>) -> bool {
    admin_flag(role, perms, |p| p.can_delete_users)
}

pub fn can_delete_admin_users(role: Role) -> bool {
    matches!(role, Role::SuperAdmin)
}

pub fn can_promote_to_admin(role: Role, perms: Option<&AdminPermissions>) -> bool {
    admin_flag(role, perms, |p| p.can_promote_to_admin)
}

pub fn can_promote_to_super_admin(role: Role) -> bool {
    matches!(role, Role::SuperAdmin)
}

pub fn can_demote_admins(role: Role, perms: Option<&AdminPermissions>) -> bool {
    admin_flag(role, perms, |p| p.can_demote_admins)
}

pub fn can_manage_all_todos(role: Role) -> bool {
    role.is_elevated()
}
