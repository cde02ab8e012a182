//! Per-operation authorization checks for user-account mutations.
//!
//! Pure decision logic: the service layer loads the actor and target from the
//! store (inside the same transaction as the write) and asks the guard for a
//! verdict. On allow, the guard hands back the exact write to perform, so the
//! permission side effects of a role change can never drift from the decision
//! that approved them.

use crate::error::{ApiError, DenyReason};
use crate::users::repo::User;
use crate::users::role::{self, AdminPermissions, AdminPermissionsPatch, Role};

/// Field changes requested against a target account. Role strings are parsed
/// before this point; an unknown role never reaches the guard.
#[derive(Debug, Default)]
pub struct UpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub permissions: Option<AdminPermissionsPatch>,
}

/// What to write to the permissions column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionsWrite {
    Keep,
    Set(AdminPermissions),
    Clear,
}

/// Guard-approved update, applied as a single statement.
#[derive(Debug)]
pub struct UpdatePlan {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub permissions: PermissionsWrite,
}

/// Decide a role/info update. Checks run in a fixed order and the first
/// failure is the denial reason; super-admin actors skip the per-field gates.
pub fn authorize_update(
    actor: &User,
    target: &User,
    req: UpdateRequest,
) -> Result<UpdatePlan, ApiError> {
    if !actor.role.is_elevated() {
        return Err(ApiError::Unauthorized);
    }

    if actor.role == Role::Admin {
        let actor_perms = actor.admin_permissions.as_ref();

        if (req.name.is_some() || req.email.is_some())
            && !role::can_update_user_info(actor.role, actor_perms)
        {
            return Err(ApiError::Forbidden(DenyReason::UpdateInfo));
        }

        if let Some(requested) = req.role {
            match (target.role, requested) {
                (_, Role::SuperAdmin) => {
                    return Err(ApiError::Forbidden(DenyReason::SuperAdminOnly));
                }
                // A plain user->admin promotion is not gated by the promote
                // flag; only an explicit permissions payload is (see below).
                (Role::User, Role::Admin) => {}
                (Role::Admin, Role::User) => {
                    if !role::can_demote_admins(actor.role, actor_perms) {
                        return Err(ApiError::Forbidden(DenyReason::Demote));
                    }
                }
                _ => {}
            }
        }

        if req.permissions.is_some() {
            if !role::can_promote_to_admin(actor.role, actor_perms) {
                return Err(ApiError::Forbidden(DenyReason::PermissionsUpdate));
            }
            if req.role.is_none() && target.role != Role::Admin {
                return Err(ApiError::Forbidden(DenyReason::PermissionsUpdate));
            }
        }

        // Admins broadly edit user-role accounts only; demoting an admin and
        // editing an admin's permission flags are the two exceptions.
        if target.role != Role::User {
            let demotion = target.role == Role::Admin && req.role == Some(Role::User);
            let permissions_only = req.role.is_none()
                && req.permissions.is_some()
                && req.name.is_none()
                && req.email.is_none();
            if !(demotion || permissions_only) {
                return Err(ApiError::Forbidden(DenyReason::Scope));
            }
        }
    }

    Ok(plan_update(target, req))
}

/// Compute the write for an approved update. Assigning the admin role always
/// (re)writes the permission set; leaving it assigns over the promotion
/// defaults. Any other role assignment clears the set in the same write.
fn plan_update(target: &User, req: UpdateRequest) -> UpdatePlan {
    let permissions = match req.role {
        Some(Role::Admin) => {
            let defaults = AdminPermissions::promotion_defaults();
            PermissionsWrite::Set(
                req.permissions
                    .map(|p| p.merge_over(defaults))
                    .unwrap_or(defaults),
            )
        }
        Some(Role::User) | Some(Role::SuperAdmin) => PermissionsWrite::Clear,
        None => match (req.permissions, target.role) {
            // Partial payloads merge over the stored value, not whatever
            // copy the client last saw.
            (Some(patch), Role::Admin) => PermissionsWrite::Set(patch.merge_over(
                target
                    .admin_permissions
                    .unwrap_or_else(AdminPermissions::promotion_defaults),
            )),
            _ => PermissionsWrite::Keep,
        },
    };

    UpdatePlan {
        name: req.name,
        email: req.email,
        role: req.role,
        permissions,
    }
}

/// Decide a single delete. Self-deletion is refused before any role check.
pub fn authorize_delete(actor: &User, target: &User) -> Result<(), ApiError> {
    if !actor.role.is_elevated() {
        return Err(ApiError::Unauthorized);
    }
    if actor.id == target.id {
        return Err(ApiError::Forbidden(DenyReason::SelfDelete));
    }
    if target.role == Role::SuperAdmin && !role::can_delete_admin_users(actor.role) {
        return Err(ApiError::Forbidden(DenyReason::Tier));
    }
    if actor.role == Role::Admin {
        if !role::can_delete_users(actor.role, actor.admin_permissions.as_ref()) {
            return Err(ApiError::Forbidden(DenyReason::Permission));
        }
        if target.role != Role::User {
            return Err(ApiError::Forbidden(DenyReason::Scope));
        }
    }
    Ok(())
}

/// Decide a batch delete: every target must pass, or the whole batch is
/// rejected and nothing is deleted.
pub fn authorize_bulk_delete(actor: &User, targets: &[User]) -> Result<(), ApiError> {
    for target in targets {
        authorize_delete(actor, target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user_with(role: Role, perms: Option<AdminPermissions>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Test User".into(),
            email: format!("{}@example.com", Uuid::new_v4()),
            password_hash: None,
            role,
            admin_permissions: perms,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn plain_user() -> User {
        user_with(Role::User, None)
    }

    fn super_admin() -> User {
        user_with(Role::SuperAdmin, None)
    }

    fn admin(perms: AdminPermissions) -> User {
        user_with(Role::Admin, Some(perms))
    }

    fn no_flags() -> AdminPermissions {
        AdminPermissions {
            can_update_user_info: false,
            can_delete_users: false,
            can_promote_to_admin: false,
            can_demote_admins: false,
        }
    }

    fn deny_reason(err: ApiError) -> DenyReason {
        match err {
            ApiError::Forbidden(reason) => reason,
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    // --- role/info updates ---

    #[test]
    fn plain_user_actor_is_unauthorized() {
        let err = authorize_update(&plain_user(), &plain_user(), UpdateRequest::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn admin_without_info_flag_cannot_edit_name() {
        let actor = admin(no_flags());
        let req = UpdateRequest {
            name: Some("New Name".into()),
            ..Default::default()
        };
        let err = authorize_update(&actor, &plain_user(), req).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::UpdateInfo);
    }

    #[test]
    fn admin_with_info_flag_edits_user_name_and_email() {
        let actor = admin(AdminPermissions {
            can_update_user_info: true,
            ..no_flags()
        });
        let req = UpdateRequest {
            name: Some("New Name".into()),
            email: Some("new@example.com".into()),
            ..Default::default()
        };
        let plan = authorize_update(&actor, &plain_user(), req).unwrap();
        assert_eq!(plan.name.as_deref(), Some("New Name"));
        assert_eq!(plan.email.as_deref(), Some("new@example.com"));
        assert_eq!(plan.permissions, PermissionsWrite::Keep);
    }

    #[test]
    fn promotion_without_permissions_payload_needs_no_promote_flag() {
        // Observed upstream behavior, kept deliberately: a role-only flip to
        // admin succeeds even when the actor lacks the promote capability.
        let actor = admin(no_flags());
        let req = UpdateRequest {
            role: Some(Role::Admin),
            ..Default::default()
        };
        let plan = authorize_update(&actor, &plain_user(), req).unwrap();
        assert_eq!(plan.role, Some(Role::Admin));
        assert_eq!(
            plan.permissions,
            PermissionsWrite::Set(AdminPermissions::promotion_defaults())
        );
    }

    #[test]
    fn promotion_with_permissions_payload_requires_promote_flag() {
        let actor = admin(no_flags());
        let req = UpdateRequest {
            role: Some(Role::Admin),
            permissions: Some(AdminPermissionsPatch {
                can_delete_users: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = authorize_update(&actor, &plain_user(), req).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::PermissionsUpdate);
    }

    #[test]
    fn admin_can_never_mint_a_super_admin() {
        let actor = admin(AdminPermissions {
            can_update_user_info: true,
            can_delete_users: true,
            can_promote_to_admin: true,
            can_demote_admins: true,
        });
        let req = UpdateRequest {
            role: Some(Role::SuperAdmin),
            ..Default::default()
        };
        let err = authorize_update(&actor, &plain_user(), req).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::SuperAdminOnly);
    }

    #[test]
    fn demotion_requires_demote_flag() {
        let actor = admin(no_flags());
        let target = admin(AdminPermissions::promotion_defaults());
        let req = UpdateRequest {
            role: Some(Role::User),
            ..Default::default()
        };
        let err = authorize_update(&actor, &target, req).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::Demote);
    }

    #[test]
    fn demotion_with_flag_clears_permissions() {
        let actor = admin(AdminPermissions {
            can_demote_admins: true,
            ..no_flags()
        });
        let target = admin(AdminPermissions::promotion_defaults());
        let req = UpdateRequest {
            role: Some(Role::User),
            ..Default::default()
        };
        let plan = authorize_update(&actor, &target, req).unwrap();
        assert_eq!(plan.role, Some(Role::User));
        assert_eq!(plan.permissions, PermissionsWrite::Clear);
    }

    #[test]
    fn admin_cannot_broadly_edit_another_admin() {
        let actor = admin(AdminPermissions {
            can_update_user_info: true,
            ..no_flags()
        });
        let target = admin(AdminPermissions::promotion_defaults());
        let req = UpdateRequest {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        let err = authorize_update(&actor, &target, req).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::Scope);
    }

    #[test]
    fn admin_cannot_touch_a_super_admin_at_all() {
        let actor = admin(AdminPermissions {
            can_update_user_info: true,
            can_delete_users: true,
            can_promote_to_admin: true,
            can_demote_admins: true,
        });
        let target = super_admin();
        let req = UpdateRequest {
            role: Some(Role::User),
            ..Default::default()
        };
        let err = authorize_update(&actor, &target, req).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::Scope);
    }

    #[test]
    fn permissions_only_update_requires_admin_target_and_promote_flag() {
        let actor = admin(AdminPermissions {
            can_promote_to_admin: true,
            ..no_flags()
        });
        let patch = AdminPermissionsPatch {
            can_delete_users: Some(true),
            ..Default::default()
        };

        // user-role target: refused
        let req = UpdateRequest {
            permissions: Some(patch),
            ..Default::default()
        };
        let err = authorize_update(&actor, &plain_user(), req).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::PermissionsUpdate);

        // admin target: merges over the stored flags
        let target = admin(AdminPermissions::promotion_defaults());
        let req = UpdateRequest {
            permissions: Some(patch),
            ..Default::default()
        };
        let plan = authorize_update(&actor, &target, req).unwrap();
        match plan.permissions {
            PermissionsWrite::Set(p) => {
                assert!(p.can_update_user_info); // from stored defaults
                assert!(p.can_delete_users); // from the patch
                assert!(!p.can_promote_to_admin);
            }
            other => panic!("expected Set, got {other:?}"),
        }
    }

    #[test]
    fn permissions_only_update_without_promote_flag_is_refused() {
        let actor = admin(AdminPermissions {
            can_update_user_info: true,
            ..no_flags()
        });
        let target = admin(AdminPermissions::promotion_defaults());
        let req = UpdateRequest {
            permissions: Some(AdminPermissionsPatch::default()),
            ..Default::default()
        };
        let err = authorize_update(&actor, &target, req).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::PermissionsUpdate);
    }

    #[test]
    fn super_admin_bypasses_field_gates() {
        let actor = super_admin();
        let target = admin(AdminPermissions {
            can_delete_users: true,
            ..AdminPermissions::promotion_defaults()
        });
        let req = UpdateRequest {
            name: Some("Renamed".into()),
            role: Some(Role::User),
            ..Default::default()
        };
        let plan = authorize_update(&actor, &target, req).unwrap();
        assert_eq!(plan.role, Some(Role::User));
        // Demotion drops the permission set in the same write.
        assert_eq!(plan.permissions, PermissionsWrite::Clear);
    }

    #[test]
    fn super_admin_promotion_to_super_admin_clears_permissions() {
        let actor = super_admin();
        let target = admin(AdminPermissions::promotion_defaults());
        let req = UpdateRequest {
            role: Some(Role::SuperAdmin),
            ..Default::default()
        };
        let plan = authorize_update(&actor, &target, req).unwrap();
        assert_eq!(plan.permissions, PermissionsWrite::Clear);
    }

    #[test]
    fn reassigning_admin_role_resets_to_supplied_or_default_flags() {
        let actor = super_admin();
        let target = admin(AdminPermissions {
            can_delete_users: true,
            ..AdminPermissions::promotion_defaults()
        });
        let req = UpdateRequest {
            role: Some(Role::Admin),
            permissions: Some(AdminPermissionsPatch {
                can_demote_admins: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let plan = authorize_update(&actor, &target, req).unwrap();
        match plan.permissions {
            PermissionsWrite::Set(p) => {
                // assignment semantics: merged over defaults, not the old set
                assert!(p.can_update_user_info);
                assert!(!p.can_delete_users);
                assert!(p.can_demote_admins);
            }
            other => panic!("expected Set, got {other:?}"),
        }
    }

    // --- deletes ---

    #[test]
    fn nobody_deletes_themself() {
        let actor = super_admin();
        let err = authorize_delete(&actor, &actor).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::SelfDelete);

        let actor = admin(AdminPermissions {
            can_delete_users: true,
            ..no_flags()
        });
        let err = authorize_delete(&actor, &actor).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::SelfDelete);
    }

    #[test]
    fn only_super_admin_deletes_a_super_admin() {
        let target = super_admin();
        let actor = admin(AdminPermissions {
            can_delete_users: true,
            ..no_flags()
        });
        let err = authorize_delete(&actor, &target).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::Tier);

        assert!(authorize_delete(&super_admin(), &target).is_ok());
    }

    #[test]
    fn admin_without_delete_flag_deletes_nothing() {
        let actor = admin(no_flags());
        let err = authorize_delete(&actor, &plain_user()).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::Permission);

        // even against another admin the refusal is the missing capability
        let err = authorize_delete(&actor, &admin(no_flags())).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::Permission);
    }

    #[test]
    fn admin_with_delete_flag_is_scoped_to_user_targets() {
        let actor = admin(AdminPermissions {
            can_delete_users: true,
            ..no_flags()
        });
        assert!(authorize_delete(&actor, &plain_user()).is_ok());

        let err = authorize_delete(&actor, &admin(no_flags())).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::Scope);
    }

    #[test]
    fn bulk_delete_rejects_the_whole_batch_on_one_bad_target() {
        let actor = admin(AdminPermissions {
            can_delete_users: true,
            ..no_flags()
        });
        let targets = vec![plain_user(), admin(no_flags())];
        let err = authorize_bulk_delete(&actor, &targets).unwrap_err();
        assert_eq!(deny_reason(err), DenyReason::Scope);
    }

    #[test]
    fn bulk_delete_allows_a_clean_batch() {
        let actor = super_admin();
        let targets = vec![plain_user(), admin(no_flags()), plain_user()];
        assert!(authorize_bulk_delete(&actor, &targets).is_ok());
    }
}
