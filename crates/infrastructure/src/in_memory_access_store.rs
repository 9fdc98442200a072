use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use rolegate_application::{
    AccessAdminRepository, AccessStore, AccessTransaction, CreatePermissionInput, CreateRoleInput,
    RoleWithPermissions,
};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::{Permission, PermissionId, Role, RoleId, UserId};

#[cfg(test)]
mod tests;

/// Relation state shared by the store and its transactions.
#[derive(Debug, Clone, Default)]
struct AccessState {
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
    role_permissions: HashSet<(RoleId, PermissionId)>,
    user_roles: HashSet<(UserId, RoleId)>,
    user_permissions: HashSet<(UserId, PermissionId)>,
}

impl AccessState {
    fn sole_role(&self, user_id: UserId) -> AppResult<Option<Role>> {
        let mut assigned = self
            .user_roles
            .iter()
            .filter(|(stored_user_id, _)| stored_user_id == &user_id);

        let Some((_, role_id)) = assigned.next() else {
            return Ok(None);
        };

        if assigned.next().is_some() {
            return Err(AppError::Internal(format!(
                "user '{user_id}' holds more than one role row; the single-role invariant is corrupted"
            )));
        }

        match self.roles.get(role_id) {
            Some(role) => Ok(Some(role.clone())),
            None => Err(AppError::Internal(format!(
                "user '{user_id}' role row references a missing role"
            ))),
        }
    }

    fn role_grants(&self, role_id: RoleId) -> Vec<Permission> {
        let mut grants: Vec<Permission> = self
            .role_permissions
            .iter()
            .filter(|(stored_role_id, _)| stored_role_id == &role_id)
            .filter_map(|(_, permission_id)| self.permissions.get(permission_id).cloned())
            .collect();
        grants.sort_by(|left, right| left.name().cmp(right.name()));
        grants
    }

    fn find_role(&self, name: &str) -> Option<Role> {
        self.roles.values().find(|role| role.name() == name).cloned()
    }

    fn find_permission(&self, name: &str) -> Option<Permission> {
        self.permissions
            .values()
            .find(|permission| permission.name() == name)
            .cloned()
    }
}

/// In-memory storage backend for tests and embedded use.
///
/// Transactions stage a copy of the state and swap it in on commit, so a
/// dropped transaction leaves the store unchanged. The store mutex is held
/// for the whole transaction lifetime, which serializes mutation sequences.
#[derive(Debug, Default)]
pub struct InMemoryAccessStore {
    state: Arc<Mutex<AccessState>>,
}

impl InMemoryAccessStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessStore for InMemoryAccessStore {
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self.state.lock().await.find_role(name))
    }

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        Ok(self.state.lock().await.find_permission(name))
    }

    async fn current_role(&self, user_id: UserId) -> AppResult<Option<Role>> {
        self.state.lock().await.sole_role(user_id)
    }

    async fn count_user_permissions(
        &self,
        user_id: UserId,
        permission_name: &str,
    ) -> AppResult<i64> {
        let state = self.state.lock().await;
        let count = state
            .user_permissions
            .iter()
            .filter(|(stored_user_id, _)| stored_user_id == &user_id)
            .filter_map(|(_, permission_id)| state.permissions.get(permission_id))
            .filter(|permission| permission.name() == permission_name)
            .count();

        Ok(count as i64)
    }

    async fn begin(&self) -> AppResult<Box<dyn AccessTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();

        Ok(Box::new(InMemoryAccessTransaction { guard, staged }))
    }
}

struct InMemoryAccessTransaction {
    guard: OwnedMutexGuard<AccessState>,
    staged: AccessState,
}

#[async_trait]
impl AccessTransaction for InMemoryAccessTransaction {
    async fn lock_user(&mut self, _user_id: UserId) -> AppResult<()> {
        // The store mutex acquired at begin already serializes writers.
        Ok(())
    }

    async fn current_role(&mut self, user_id: UserId) -> AppResult<Option<Role>> {
        self.staged.sole_role(user_id)
    }

    async fn role_permissions(&mut self, role_id: RoleId) -> AppResult<Vec<Permission>> {
        Ok(self.staged.role_grants(role_id))
    }

    async fn link_user_role(&mut self, user_id: UserId, role_id: RoleId) -> AppResult<()> {
        if !self.staged.roles.contains_key(&role_id) {
            return Err(AppError::Internal(format!(
                "cannot link user '{user_id}' to missing role '{role_id}'"
            )));
        }

        self.staged.user_roles.insert((user_id, role_id));
        Ok(())
    }

    async fn unlink_user_role(&mut self, user_id: UserId, role_id: RoleId) -> AppResult<()> {
        self.staged.user_roles.remove(&(user_id, role_id));
        Ok(())
    }

    async fn link_user_permission(
        &mut self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AppResult<()> {
        if !self.staged.permissions.contains_key(&permission_id) {
            return Err(AppError::Internal(format!(
                "cannot link user '{user_id}' to missing permission '{permission_id}'"
            )));
        }

        self.staged.user_permissions.insert((user_id, permission_id));
        Ok(())
    }

    async fn unlink_user_permission(
        &mut self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AppResult<()> {
        self.staged.user_permissions.remove(&(user_id, permission_id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let InMemoryAccessTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl AccessAdminRepository for InMemoryAccessStore {
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        let name = input.name.trim();

        if state.find_role(name).is_some() {
            return Err(AppError::Conflict(format!("role '{name}' already exists")));
        }

        let role = Role::new(RoleId::new(), name, input.display_name, input.description)?;
        state.roles.insert(role.id(), role.clone());
        Ok(role)
    }

    async fn create_permission(&self, input: CreatePermissionInput) -> AppResult<Permission> {
        let mut state = self.state.lock().await;
        let name = input.name.trim();

        if state.find_permission(name).is_some() {
            return Err(AppError::Conflict(format!(
                "permission '{name}' already exists"
            )));
        }

        let permission =
            Permission::new(PermissionId::new(), name, input.display_name, input.description)?;
        state.permissions.insert(permission.id(), permission.clone());
        Ok(permission)
    }

    async fn grant_role_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let role = state
            .find_role(role_name)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_name}' was not found")))?;
        let permission = state.find_permission(permission_name).ok_or_else(|| {
            AppError::NotFound(format!("permission '{permission_name}' was not found"))
        })?;

        state.role_permissions.insert((role.id(), permission.id()));
        Ok(())
    }

    async fn revoke_role_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let removed = match (state.find_role(role_name), state.find_permission(permission_name)) {
            (Some(role), Some(permission)) => state
                .role_permissions
                .remove(&(role.id(), permission.id())),
            _ => false,
        };

        if !removed {
            return Err(AppError::NotFound(format!(
                "role grant '{role_name}:{permission_name}' was not found"
            )));
        }

        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let role = state
            .find_role(role_name)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_name}' was not found")))?;

        state.roles.remove(&role.id());
        state
            .role_permissions
            .retain(|(role_id, _)| role_id != &role.id());
        state.user_roles.retain(|(_, role_id)| role_id != &role.id());
        Ok(())
    }

    async fn delete_permission(&self, permission_name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let permission = state.find_permission(permission_name).ok_or_else(|| {
            AppError::NotFound(format!("permission '{permission_name}' was not found"))
        })?;

        state.permissions.remove(&permission.id());
        state
            .role_permissions
            .retain(|(_, permission_id)| permission_id != &permission.id());
        state
            .user_permissions
            .retain(|(_, permission_id)| permission_id != &permission.id());
        Ok(())
    }

    async fn list_roles(&self) -> AppResult<Vec<RoleWithPermissions>> {
        let state = self.state.lock().await;

        let mut roles: Vec<RoleWithPermissions> = state
            .roles
            .values()
            .map(|role| RoleWithPermissions {
                role: role.clone(),
                permissions: state.role_grants(role.id()),
            })
            .collect();
        roles.sort_by(|left, right| left.role.name().cmp(right.role.name()));
        Ok(roles)
    }

    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        let state = self.state.lock().await;

        let mut permissions: Vec<Permission> = state.permissions.values().cloned().collect();
        permissions.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(permissions)
    }
}
