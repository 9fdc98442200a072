use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use rolegate_application::{
    AccessAdminRepository, CreatePermissionInput, CreateRoleInput, RoleWithPermissions,
};
use rolegate_core::{AppError, AppResult, NonEmptyString};
use rolegate_domain::{Permission, PermissionId, Role, RoleId};

use crate::postgres_access_store::{PermissionRow, RoleRow};

/// PostgreSQL-backed repository for role and permission administration.
#[derive(Clone)]
pub struct PostgresAccessAdminRepository {
    pool: PgPool,
}

impl PostgresAccessAdminRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn resolve_role_id(&self, role_name: &str) -> AppResult<RoleId> {
        sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT id
            FROM roles
            WHERE name = $1
            "#,
        )
        .bind(role_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to resolve role: {error}")))?
        .map(RoleId::from_uuid)
        .ok_or_else(|| AppError::NotFound(format!("role '{role_name}' was not found")))
    }

    async fn resolve_permission_id(&self, permission_name: &str) -> AppResult<PermissionId> {
        sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT id
            FROM permissions
            WHERE name = $1
            "#,
        )
        .bind(permission_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to resolve permission: {error}")))?
        .map(PermissionId::from_uuid)
        .ok_or_else(|| {
            AppError::NotFound(format!("permission '{permission_name}' was not found"))
        })
    }
}

#[derive(Debug, FromRow)]
struct RoleGrantRow {
    id: uuid::Uuid,
    name: String,
    display_name: Option<String>,
    description: Option<String>,
    permission_id: Option<uuid::Uuid>,
    permission_name: Option<String>,
    permission_display_name: Option<String>,
    permission_description: Option<String>,
}

#[async_trait]
impl AccessAdminRepository for PostgresAccessAdminRepository {
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        let name = NonEmptyString::new(input.name.trim())?;

        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            INSERT INTO roles (name, display_name, description)
            VALUES ($1, $2, $3)
            RETURNING id, name, display_name, description
            "#,
        )
        .bind(name.as_str())
        .bind(&input.display_name)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_unique_conflict(error, "role", name.as_str()))?;

        row.into_role()
    }

    async fn create_permission(&self, input: CreatePermissionInput) -> AppResult<Permission> {
        let name = NonEmptyString::new(input.name.trim())?;

        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            INSERT INTO permissions (name, display_name, description)
            VALUES ($1, $2, $3)
            RETURNING id, name, display_name, description
            "#,
        )
        .bind(name.as_str())
        .bind(&input.display_name)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_unique_conflict(error, "permission", name.as_str()))?;

        row.into_permission()
    }

    async fn grant_role_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> AppResult<()> {
        let role_id = self.resolve_role_id(role_name).await?;
        let permission_id = self.resolve_permission_id(permission_name).await?;

        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(permission_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to grant role permission: {error}")))?;

        Ok(())
    }

    async fn revoke_role_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM role_permissions
            USING roles, permissions
            WHERE role_permissions.role_id = roles.id
                AND role_permissions.permission_id = permissions.id
                AND roles.name = $1
                AND permissions.name = $2
            "#,
        )
        .bind(role_name)
        .bind(permission_name)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to revoke role permission: {error}"))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "role grant '{role_name}:{permission_name}' was not found"
            )));
        }

        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM roles
            WHERE name = $1
            "#,
        )
        .bind(role_name)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete role: {error}")))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "role '{role_name}' was not found"
            )));
        }

        Ok(())
    }

    async fn delete_permission(&self, permission_name: &str) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM permissions
            WHERE name = $1
            "#,
        )
        .bind(permission_name)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete permission: {error}")))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "permission '{permission_name}' was not found"
            )));
        }

        Ok(())
    }

    async fn list_roles(&self) -> AppResult<Vec<RoleWithPermissions>> {
        let rows = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT
                roles.id,
                roles.name,
                roles.display_name,
                roles.description,
                permissions.id AS permission_id,
                permissions.name AS permission_name,
                permissions.display_name AS permission_display_name,
                permissions.description AS permission_description
            FROM roles
            LEFT JOIN role_permissions ON role_permissions.role_id = roles.id
            LEFT JOIN permissions ON permissions.id = role_permissions.permission_id
            ORDER BY roles.name, permissions.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        aggregate_roles(rows)
    }

    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, name, display_name, description
            FROM permissions
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list permissions: {error}")))?;

        rows.into_iter()
            .map(PermissionRow::into_permission)
            .collect()
    }
}

fn aggregate_roles(rows: Vec<RoleGrantRow>) -> AppResult<Vec<RoleWithPermissions>> {
    let mut by_id: HashMap<uuid::Uuid, RoleWithPermissions> = HashMap::new();

    for row in rows {
        let entry = match by_id.entry(row.id) {
            std::collections::hash_map::Entry::Occupied(occupied) => occupied.into_mut(),
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let role = Role::new(
                    RoleId::from_uuid(row.id),
                    row.name.as_str(),
                    row.display_name.clone(),
                    row.description.clone(),
                )
                .map_err(|error| {
                    AppError::Internal(format!("invalid stored role '{}': {error}", row.name))
                })?;

                vacant.insert(RoleWithPermissions {
                    role,
                    permissions: Vec::new(),
                })
            }
        };

        if let Some(permission_id) = row.permission_id {
            let permission = Permission::new(
                PermissionId::from_uuid(permission_id),
                row.permission_name.clone().unwrap_or_default(),
                row.permission_display_name.clone(),
                row.permission_description.clone(),
            )
            .map_err(|error| {
                AppError::Internal(format!(
                    "invalid stored permission for role '{}': {error}",
                    row.name
                ))
            })?;

            entry.permissions.push(permission);
        }
    }

    let mut roles = by_id.into_values().collect::<Vec<_>>();
    roles.sort_by(|left, right| left.role.name().cmp(right.role.name()));
    Ok(roles)
}

fn map_unique_conflict(error: sqlx::Error, kind: &str, name: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("{kind} '{name}' already exists"));
    }

    AppError::Internal(format!("failed to create {kind}: {error}"))
}
