use async_trait::async_trait;

use rolegate_core::AppResult;
use rolegate_domain::{Permission, PermissionId, Role, RoleId, UserId};

/// Input payload for creating roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique role name.
    pub name: String,
    /// Human-readable display name.
    pub display_name: Option<String>,
    /// Role description.
    pub description: Option<String>,
}

/// Input payload for creating permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePermissionInput {
    /// Unique permission name.
    pub name: String,
    /// Human-readable display name.
    pub display_name: Option<String>,
    /// Permission description.
    pub description: Option<String>,
}

/// Role definition with effective grants, returned by listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleWithPermissions {
    /// The role definition.
    pub role: Role,
    /// Permissions attached to the role, sorted by name.
    pub permissions: Vec<Permission>,
}

/// Storage port consumed by the access controller.
///
/// Reads run directly against the backend; every mutation sequence goes
/// through a transaction opened with [`AccessStore::begin`].
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Resolves a role by its unique name.
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    /// Resolves a permission by its unique name.
    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>>;

    /// Returns the user's sole role, or `None` when unassigned.
    ///
    /// More than one stored role row is unrecoverable state corruption and
    /// fails with [`rolegate_core::AppError::Internal`]; the store never
    /// tie-breaks.
    async fn current_role(&self, user_id: UserId) -> AppResult<Option<Role>>;

    /// Counts `user_permissions` rows whose permission carries the name.
    async fn count_user_permissions(
        &self,
        user_id: UserId,
        permission_name: &str,
    ) -> AppResult<i64>;

    /// Opens a transaction for one mutation sequence.
    async fn begin(&self) -> AppResult<Box<dyn AccessTransaction>>;
}

/// Transactional command set over the three join relations.
///
/// Link operations are idempotent inserts; unlink operations delete the row
/// when present and are no-ops otherwise. Nothing becomes visible to readers
/// before [`AccessTransaction::commit`], and dropping the transaction
/// discards every staged change.
#[async_trait]
pub trait AccessTransaction: Send {
    /// Serializes concurrent mutation sequences for one user.
    async fn lock_user(&mut self, user_id: UserId) -> AppResult<()>;

    /// Returns the user's sole role as seen inside the transaction.
    async fn current_role(&mut self, user_id: UserId) -> AppResult<Option<Role>>;

    /// Lists the permissions attached to a role.
    async fn role_permissions(&mut self, role_id: RoleId) -> AppResult<Vec<Permission>>;

    /// Inserts a `user_roles` row.
    async fn link_user_role(&mut self, user_id: UserId, role_id: RoleId) -> AppResult<()>;

    /// Deletes a `user_roles` row.
    async fn unlink_user_role(&mut self, user_id: UserId, role_id: RoleId) -> AppResult<()>;

    /// Inserts a `user_permissions` row.
    async fn link_user_permission(
        &mut self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AppResult<()>;

    /// Deletes a `user_permissions` row.
    async fn unlink_user_permission(
        &mut self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AppResult<()>;

    /// Commits the mutation sequence.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Repository port for role and permission administration.
///
/// Administrative writes are not part of the access controller's contract;
/// hosts consume this port directly to manage the role catalog.
#[async_trait]
pub trait AccessAdminRepository: Send + Sync {
    /// Creates a role with a unique name.
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role>;

    /// Creates a permission with a unique name.
    async fn create_permission(&self, input: CreatePermissionInput) -> AppResult<Permission>;

    /// Attaches a permission to a role; a no-op when already attached.
    async fn grant_role_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> AppResult<()>;

    /// Removes a permission from a role.
    async fn revoke_role_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> AppResult<()>;

    /// Deletes a role; its join rows are cascade-deleted.
    async fn delete_role(&self, role_name: &str) -> AppResult<()>;

    /// Deletes a permission; its join rows are cascade-deleted.
    async fn delete_permission(&self, permission_name: &str) -> AppResult<()>;

    /// Lists roles with effective grants, sorted by name.
    async fn list_roles(&self) -> AppResult<Vec<RoleWithPermissions>>;

    /// Lists permissions sorted by name.
    async fn list_permissions(&self) -> AppResult<Vec<Permission>>;
}
