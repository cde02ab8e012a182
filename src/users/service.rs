//! Account-mutation operations. Every decision re-reads the actor from the
//! store inside the transaction that performs the write; session claims are
//! never trusted for permission-gated work, since flags can change between
//! token issuance and use.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::password;
use crate::error::{ApiError, DenyReason};
use crate::users::dto::{AdminUpdateUserRequest, CreateOrUpdateUserRequest, UpdateProfileRequest};
use crate::users::guard::{self, UpdateRequest};
use crate::users::repo::User;
use crate::users::role::{self, AdminPermissions, AdminPermissionsPatch, Role};

const EMAIL_IN_USE: &str = "Email is already in use";

async fn load_actor(db: impl sqlx::PgExecutor<'_>, actor_id: Uuid) -> Result<User, ApiError> {
    User::find_by_id(db, actor_id)
        .await?
        .ok_or(ApiError::Unauthorized)
}

fn parse_role(raw: Option<&str>) -> Result<Option<Role>, ApiError> {
    match raw {
        Some(s) => Role::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError::invalid_input("Valid role is required")),
        None => Ok(None),
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Flags written when a role assignment lands on `admin`: the supplied patch
/// merged over the promotion defaults, or the defaults alone.
fn assigned_permissions(req_permissions: Option<AdminPermissionsPatch>) -> AdminPermissions {
    let defaults = AdminPermissions::promotion_defaults();
    req_permissions
        .map(|p| p.merge_over(defaults))
        .unwrap_or(defaults)
}

pub async fn list_users(db: &PgPool, actor_id: Uuid) -> Result<Vec<User>, ApiError> {
    let actor = load_actor(db, actor_id).await?;
    if !role::can_view_users(actor.role) {
        return Err(ApiError::Unauthorized);
    }
    Ok(User::list_all(db).await?)
}

pub async fn update_user(
    db: &PgPool,
    actor_id: Uuid,
    target_id: Uuid,
    req: AdminUpdateUserRequest,
) -> Result<User, ApiError> {
    let mut tx = db.begin().await?;

    let actor = load_actor(&mut *tx, actor_id).await?;
    if !actor.role.is_elevated() {
        return Err(ApiError::Unauthorized);
    }

    let requested_role = parse_role(req.role.as_deref())?;

    let target = User::find_by_id(&mut *tx, target_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let email = req.email.as_deref().map(normalize_email);
    let plan = guard::authorize_update(
        &actor,
        &target,
        UpdateRequest {
            name: req.name,
            email,
            role: requested_role,
            permissions: req.admin_permissions,
        },
    )?;

    if let Some(new_email) = plan.email.as_deref() {
        if new_email != target.email {
            if let Some(other) = User::find_by_email(&mut *tx, new_email).await? {
                if other.id != target.id {
                    return Err(ApiError::Conflict(EMAIL_IN_USE.into()));
                }
            }
        }
    }

    let updated = User::apply_update(&mut *tx, target_id, &plan)
        .await
        .map_err(|e| ApiError::from_sqlx(e, EMAIL_IN_USE))?
        .ok_or(ApiError::NotFound("User"))?;

    tx.commit().await?;
    info!(actor_id = %actor.id, target_id = %updated.id, role = %updated.role, "user updated");
    Ok(updated)
}

pub async fn delete_user(db: &PgPool, actor_id: Uuid, target_id: Uuid) -> Result<(), ApiError> {
    let mut tx = db.begin().await?;

    let actor = load_actor(&mut *tx, actor_id).await?;
    if !actor.role.is_elevated() {
        return Err(ApiError::Unauthorized);
    }

    let target = User::find_by_id(&mut *tx, target_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    guard::authorize_delete(&actor, &target)?;
    User::delete(&mut *tx, target_id).await?;

    tx.commit().await?;
    info!(actor_id = %actor.id, target_id = %target_id, "user deleted");
    Ok(())
}

/// All-or-nothing batch delete: the whole id set is resolved and checked
/// before a single row is removed, and the removal is one statement.
pub async fn bulk_delete_users(
    db: &PgPool,
    actor_id: Uuid,
    ids: &[Uuid],
) -> Result<u64, ApiError> {
    if ids.is_empty() {
        return Err(ApiError::invalid_input("No users selected"));
    }
    let mut unique = ids.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let mut tx = db.begin().await?;

    let actor = load_actor(&mut *tx, actor_id).await?;
    if !actor.role.is_elevated() {
        return Err(ApiError::Unauthorized);
    }

    let targets = User::find_many_by_ids(&mut *tx, &unique).await?;
    if targets.len() != unique.len() {
        return Err(ApiError::NotFound("User"));
    }

    guard::authorize_bulk_delete(&actor, &targets)?;
    let deleted = User::delete_many(&mut *tx, &unique).await?;

    tx.commit().await?;
    info!(actor_id = %actor.id, deleted, "bulk user delete");
    Ok(deleted)
}

/// Upsert keyed by email. An existing record is updated in place through a
/// deliberately more permissive merge than the role-transition guard; the
/// super-admin tier stays out of reach of lower actors on both branches.
pub async fn create_or_update_user(
    db: &PgPool,
    actor_id: Uuid,
    req: CreateOrUpdateUserRequest,
) -> Result<(User, bool), ApiError> {
    let mut tx = db.begin().await?;

    let actor = load_actor(&mut *tx, actor_id).await?;
    if !actor.role.is_elevated() {
        return Err(ApiError::Unauthorized);
    }
    let actor_perms = actor.admin_permissions.as_ref();

    let email = match req.email.as_deref().map(normalize_email) {
        Some(e) if !e.is_empty() => e,
        _ => return Err(ApiError::invalid_input("Missing required fields")),
    };
    if !crate::auth::is_valid_email(&email) {
        return Err(ApiError::invalid_input("Invalid email"));
    }
    let requested_role = parse_role(req.role.as_deref())?;

    if let Some(existing) = User::find_by_email(&mut *tx, &email).await? {
        let final_role = requested_role.unwrap_or(existing.role);
        if final_role == Role::SuperAdmin
            && existing.role != Role::SuperAdmin
            && !role::can_promote_to_super_admin(actor.role)
        {
            return Err(ApiError::Forbidden(DenyReason::SuperAdminOnly));
        }

        let password_hash = match req.password.as_deref() {
            Some(p) => Some(password::hash_password(p)?),
            None => None,
        };
        let permissions =
            (final_role == Role::Admin).then(|| assigned_permissions(req.admin_permissions));

        let user = User::overwrite(
            &mut *tx,
            existing.id,
            req.name.as_deref(),
            final_role,
            password_hash.as_deref(),
            permissions,
        )
        .await?;

        tx.commit().await?;
        info!(actor_id = %actor.id, user_id = %user.id, role = %user.role, "user updated by email");
        return Ok((user, false));
    }

    let name = match req.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => return Err(ApiError::invalid_input("Missing required fields")),
    };
    let password = req
        .password
        .as_deref()
        .ok_or_else(|| ApiError::invalid_input("Missing required fields"))?;

    let role = requested_role.unwrap_or(Role::User);
    match role {
        Role::SuperAdmin if !role::can_promote_to_super_admin(actor.role) => {
            return Err(ApiError::Forbidden(DenyReason::SuperAdminOnly));
        }
        Role::Admin if !role::can_promote_to_admin(actor.role, actor_perms) => {
            return Err(ApiError::Forbidden(DenyReason::Permission));
        }
        _ => {}
    }

    let hash = password::hash_password(password)?;
    let permissions = (role == Role::Admin).then(|| assigned_permissions(req.admin_permissions));

    let user = User::create(&mut *tx, &name, &email, Some(hash.as_str()), role, permissions)
        .await
        .map_err(|e| ApiError::from_sqlx(e, EMAIL_IN_USE))?;

    tx.commit().await?;
    info!(actor_id = %actor.id, user_id = %user.id, role = %user.role, "user created");
    Ok((user, true))
}

pub async fn get_profile(db: &PgPool, user_id: Uuid) -> Result<User, ApiError> {
    User::find_by_id(db, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))
}

pub async fn update_profile(
    db: &PgPool,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> Result<User, ApiError> {
    let mut tx = db.begin().await?;

    let current = User::find_by_id(&mut *tx, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let name = match req.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => {
            if n.len() > 60 {
                return Err(ApiError::invalid_input("Name cannot be more than 60 characters"));
            }
            Some(n.to_string())
        }
        _ => None,
    };

    let email = match req.email.as_deref().map(normalize_email) {
        Some(e) if !e.is_empty() && e != current.email => {
            if !crate::auth::is_valid_email(&e) {
                return Err(ApiError::invalid_input("Invalid email"));
            }
            if let Some(other) = User::find_by_email(&mut *tx, &e).await? {
                if other.id != user_id {
                    return Err(ApiError::Conflict(EMAIL_IN_USE.into()));
                }
            }
            Some(e)
        }
        _ => None,
    };

    let password_hash = match req.new_password.as_deref() {
        Some(new_password) => {
            let current_password = req.current_password.as_deref().ok_or_else(|| {
                ApiError::invalid_input("Current password is required to set a new password")
            })?;
            let stored = current
                .password_hash
                .as_deref()
                .ok_or_else(|| ApiError::invalid_input("Current password is incorrect"))?;
            if !password::verify_password(current_password, stored)? {
                return Err(ApiError::invalid_input("Current password is incorrect"));
            }
            Some(password::hash_password(new_password)?)
        }
        None => None,
    };

    if name.is_none() && email.is_none() && password_hash.is_none() {
        return Ok(current);
    }

    let updated = User::update_profile(
        &mut *tx,
        user_id,
        name.as_deref(),
        email.as_deref(),
        password_hash.as_deref(),
    )
    .await
    .map_err(|e| ApiError::from_sqlx(e, EMAIL_IN_USE))?
    .ok_or(ApiError::NotFound("User"))?;

    tx.commit().await?;
    info!(user_id = %updated.id, "profile updated");
    Ok(updated)
}
