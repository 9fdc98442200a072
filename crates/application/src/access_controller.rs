use std::sync::Arc;

use rolegate_core::{AppError, AppResult};
use rolegate_domain::{AuthorizableUser, Permission, Role, UserId};

use crate::access_ports::{AccessStore, AccessTransaction};

/// Application service evaluating permission checks and executing role and
/// permission assignment transitions.
///
/// Users hold at most one role. Assigning a role materializes its permissions
/// into the user's direct permission set and a later switch unwinds exactly
/// those grants, so permission checks never join through the role at query
/// time and directly attached permissions survive any role change.
#[derive(Clone)]
pub struct AccessController {
    store: Arc<dyn AccessStore>,
}

impl AccessController {
    /// Creates a controller over a storage backend.
    #[must_use]
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Returns the user's sole role, or `None` when unassigned.
    pub async fn current_role(&self, user: &impl AuthorizableUser) -> AppResult<Option<Role>> {
        self.store.current_role(user.user_id()).await
    }

    /// Returns whether the user's role carries the given name.
    ///
    /// An unassigned user yields `false`, not an error.
    pub async fn has_role(
        &self,
        user: &impl AuthorizableUser,
        role_name: &str,
    ) -> AppResult<bool> {
        Ok(self
            .current_role(user)
            .await?
            .is_some_and(|role| role.name() == role_name))
    }

    /// Returns whether the user's direct permission set contains the name.
    pub async fn has_permission(
        &self,
        user: &impl AuthorizableUser,
        permission_name: &str,
    ) -> AppResult<bool> {
        let count = self
            .store
            .count_user_permissions(user.user_id(), permission_name)
            .await?;

        Ok(count > 0)
    }

    /// Makes `role` the user's sole role.
    ///
    /// The previous role's grants are unwound before its link is removed,
    /// then the new role is linked and its permissions attached. The whole
    /// transition runs in one transaction, so readers never observe a user
    /// with zero or two roles mid-switch. Permissions tied to neither role
    /// are untouched.
    pub async fn assign_role(&self, user: &impl AuthorizableUser, role: &Role) -> AppResult<()> {
        let user_id = user.user_id();
        let mut transaction = self.store.begin().await?;
        transaction.lock_user(user_id).await?;

        unwind_current_role(transaction.as_mut(), user_id).await?;

        transaction.link_user_role(user_id, role.id()).await?;
        for permission in transaction.role_permissions(role.id()).await? {
            transaction
                .link_user_permission(user_id, permission.id())
                .await?;
        }

        transaction.commit().await
    }

    /// Resolves a role by name and assigns it.
    pub async fn assign_role_by_name(
        &self,
        user: &impl AuthorizableUser,
        role_name: &str,
    ) -> AppResult<()> {
        let role = self
            .store
            .find_role_by_name(role_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_name}' was not found")))?;

        self.assign_role(user, &role).await
    }

    /// Removes the user's role together with the permissions it granted.
    ///
    /// A no-op for unassigned users; directly attached permissions survive.
    pub async fn unassign_role(&self, user: &impl AuthorizableUser) -> AppResult<()> {
        let user_id = user.user_id();
        let mut transaction = self.store.begin().await?;
        transaction.lock_user(user_id).await?;

        unwind_current_role(transaction.as_mut(), user_id).await?;

        transaction.commit().await
    }

    /// Adds a permission to the user's direct permission set.
    ///
    /// A no-op when the user already holds it.
    pub async fn attach_permission(
        &self,
        user: &impl AuthorizableUser,
        permission: &Permission,
    ) -> AppResult<()> {
        if self.has_permission(user, permission.name()).await? {
            return Ok(());
        }

        let mut transaction = self.store.begin().await?;
        transaction
            .link_user_permission(user.user_id(), permission.id())
            .await?;
        transaction.commit().await
    }

    /// Resolves a permission by name and attaches it.
    ///
    /// An unknown name fails with `NotFound` and performs no mutation; the
    /// controller never creates permissions implicitly.
    pub async fn attach_permission_by_name(
        &self,
        user: &impl AuthorizableUser,
        permission_name: &str,
    ) -> AppResult<()> {
        let permission = self.resolve_permission(permission_name).await?;
        self.attach_permission(user, &permission).await
    }

    /// Removes a permission from the user's direct permission set.
    ///
    /// A no-op when the user does not hold it.
    pub async fn detach_permission(
        &self,
        user: &impl AuthorizableUser,
        permission: &Permission,
    ) -> AppResult<()> {
        let mut transaction = self.store.begin().await?;
        transaction
            .unlink_user_permission(user.user_id(), permission.id())
            .await?;
        transaction.commit().await
    }

    /// Resolves a permission by name and detaches it.
    ///
    /// An unknown name fails with `NotFound`; a resolvable permission the
    /// user does not hold is a no-op.
    pub async fn detach_permission_by_name(
        &self,
        user: &impl AuthorizableUser,
        permission_name: &str,
    ) -> AppResult<()> {
        let permission = self.resolve_permission(permission_name).await?;
        self.detach_permission(user, &permission).await
    }

    async fn resolve_permission(&self, permission_name: &str) -> AppResult<Permission> {
        self.store
            .find_permission_by_name(permission_name)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("permission '{permission_name}' was not found"))
            })
    }
}

/// Unwinds the current role's grants and its link inside the transaction.
///
/// Grants are detached before the role link is removed, so no committed state
/// ever shows a roleless user with stale role-derived permissions.
async fn unwind_current_role(
    transaction: &mut dyn AccessTransaction,
    user_id: UserId,
) -> AppResult<()> {
    let Some(previous) = transaction.current_role(user_id).await? else {
        return Ok(());
    };

    for permission in transaction.role_permissions(previous.id()).await? {
        transaction
            .unlink_user_permission(user_id, permission.id())
            .await?;
    }

    transaction.unlink_user_role(user_id, previous.id()).await
}
