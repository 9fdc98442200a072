use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::warn;

use rolegate_application::{AccessStore, AccessTransaction};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::{Permission, PermissionId, Role, RoleId, UserId};

#[cfg(test)]
mod tests;

const CURRENT_ROLE_QUERY: &str = r#"
    SELECT roles.id, roles.name, roles.display_name, roles.description
    FROM user_roles
    INNER JOIN roles ON roles.id = user_roles.role_id
    WHERE user_roles.user_id = $1
"#;

const ROLE_PERMISSIONS_QUERY: &str = r#"
    SELECT permissions.id, permissions.name, permissions.display_name, permissions.description
    FROM role_permissions
    INNER JOIN permissions ON permissions.id = role_permissions.permission_id
    WHERE role_permissions.role_id = $1
    ORDER BY permissions.name
"#;

/// PostgreSQL-backed storage for the access controller.
#[derive(Clone)]
pub struct PostgresAccessStore {
    pool: PgPool,
}

impl PostgresAccessStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RoleRow {
    pub(crate) id: uuid::Uuid,
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
}

impl RoleRow {
    pub(crate) fn into_role(self) -> AppResult<Role> {
        let RoleRow {
            id,
            name,
            display_name,
            description,
        } = self;

        Role::new(RoleId::from_uuid(id), name.as_str(), display_name, description)
            .map_err(|error| AppError::Internal(format!("invalid stored role '{name}': {error}")))
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PermissionRow {
    pub(crate) id: uuid::Uuid,
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
}

impl PermissionRow {
    pub(crate) fn into_permission(self) -> AppResult<Permission> {
        let PermissionRow {
            id,
            name,
            display_name,
            description,
        } = self;

        Permission::new(
            PermissionId::from_uuid(id),
            name.as_str(),
            display_name,
            description,
        )
        .map_err(|error| {
            AppError::Internal(format!("invalid stored permission '{name}': {error}"))
        })
    }
}

fn decode_sole_role(rows: Vec<RoleRow>, user_id: UserId) -> AppResult<Option<Role>> {
    if rows.len() > 1 {
        warn!(%user_id, count = rows.len(), "user holds more than one role row");
        return Err(AppError::Internal(format!(
            "user '{user_id}' holds {} role rows; the single-role invariant is corrupted",
            rows.len()
        )));
    }

    rows.into_iter().next().map(RoleRow::into_role).transpose()
}

#[async_trait]
impl AccessStore for PostgresAccessStore {
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, display_name, description
            FROM roles
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to resolve role: {error}")))?;

        row.map(RoleRow::into_role).transpose()
    }

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, name, display_name, description
            FROM permissions
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to resolve permission: {error}")))?;

        row.map(PermissionRow::into_permission).transpose()
    }

    async fn current_role(&self, user_id: UserId) -> AppResult<Option<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(CURRENT_ROLE_QUERY)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to load current role: {error}"))
            })?;

        decode_sole_role(rows, user_id)
    }

    async fn count_user_permissions(
        &self,
        user_id: UserId,
        permission_name: &str,
    ) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM user_permissions
            INNER JOIN permissions ON permissions.id = user_permissions.permission_id
            WHERE user_permissions.user_id = $1
                AND permissions.name = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(permission_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count user permissions: {error}")))
    }

    async fn begin(&self) -> AppResult<Box<dyn AccessTransaction>> {
        let transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        Ok(Box::new(PostgresAccessTransaction { transaction }))
    }
}

struct PostgresAccessTransaction {
    transaction: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccessTransaction for PostgresAccessTransaction {
    async fn lock_user(&mut self, user_id: UserId) -> AppResult<()> {
        // Advisory lock keyed on the user id; concurrent mutation sequences
        // for the same user queue behind it until this transaction ends.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id.as_uuid())
            .execute(&mut *self.transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to lock user: {error}")))?;

        Ok(())
    }

    async fn current_role(&mut self, user_id: UserId) -> AppResult<Option<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(CURRENT_ROLE_QUERY)
            .bind(user_id.as_uuid())
            .fetch_all(&mut *self.transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to load current role: {error}"))
            })?;

        decode_sole_role(rows, user_id)
    }

    async fn role_permissions(&mut self, role_id: RoleId) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(ROLE_PERMISSIONS_QUERY)
            .bind(role_id.as_uuid())
            .fetch_all(&mut *self.transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to load role permissions: {error}"))
            })?;

        rows.into_iter()
            .map(PermissionRow::into_permission)
            .collect()
    }

    async fn link_user_role(&mut self, user_id: UserId, role_id: RoleId) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (role_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (role_id, user_id) DO NOTHING
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to link user role: {error}")))?;

        Ok(())
    }

    async fn unlink_user_role(&mut self, user_id: UserId, role_id: RoleId) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM user_roles
            WHERE role_id = $1 AND user_id = $2
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to unlink user role: {error}")))?;

        Ok(())
    }

    async fn link_user_permission(
        &mut self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_permissions (permission_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (permission_id, user_id) DO NOTHING
            "#,
        )
        .bind(permission_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to link user permission: {error}"))
        })?;

        Ok(())
    }

    async fn unlink_user_permission(
        &mut self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM user_permissions
            WHERE permission_id = $1 AND user_id = $2
            "#,
        )
        .bind(permission_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to unlink user permission: {error}"))
        })?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))
    }
}
