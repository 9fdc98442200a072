use std::sync::Arc;

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use rolegate_application::{
    AccessAdminRepository, AccessController, CreatePermissionInput, CreateRoleInput,
};
use rolegate_core::AppError;
use rolegate_domain::UserId;

use crate::PostgresAccessAdminRepository;

use super::PostgresAccessStore;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres access tests: {error}");
    }

    Some(pool)
}

fn unique(name: &str) -> String {
    format!("{name}.{}", uuid::Uuid::new_v4().simple())
}

async fn create_role(admin: &PostgresAccessAdminRepository, name: &str, grants: &[&str]) {
    let created = admin
        .create_role(CreateRoleInput {
            name: name.to_owned(),
            display_name: None,
            description: None,
        })
        .await;
    assert!(created.is_ok());

    for grant in grants {
        let granted = admin.grant_role_permission(name, grant).await;
        assert!(granted.is_ok());
    }
}

async fn create_permission(admin: &PostgresAccessAdminRepository, name: &str) {
    let created = admin
        .create_permission(CreatePermissionInput {
            name: name.to_owned(),
            display_name: None,
            description: None,
        })
        .await;
    assert!(created.is_ok());
}

#[tokio::test]
async fn assign_and_switch_roles_through_postgres() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let admin = PostgresAccessAdminRepository::new(pool.clone());
    let controller = AccessController::new(Arc::new(PostgresAccessStore::new(pool)));
    let user = UserId::new();

    let create = unique("content.create");
    let edit = unique("content.edit");
    let publish = unique("content.publish");
    let author = unique("author");
    let editor = unique("editor");

    create_permission(&admin, create.as_str()).await;
    create_permission(&admin, edit.as_str()).await;
    create_permission(&admin, publish.as_str()).await;
    create_role(&admin, author.as_str(), &[create.as_str(), edit.as_str()]).await;
    create_role(&admin, editor.as_str(), &[edit.as_str(), publish.as_str()]).await;

    assert!(controller.assign_role_by_name(&user, author.as_str()).await.is_ok());
    assert!(matches!(
        controller.has_role(&user, author.as_str()).await,
        Ok(true)
    ));
    assert!(matches!(
        controller.has_permission(&user, create.as_str()).await,
        Ok(true)
    ));

    assert!(controller.assign_role_by_name(&user, editor.as_str()).await.is_ok());
    assert!(matches!(
        controller.has_role(&user, editor.as_str()).await,
        Ok(true)
    ));
    assert!(matches!(
        controller.has_permission(&user, create.as_str()).await,
        Ok(false)
    ));
    assert!(matches!(
        controller.has_permission(&user, edit.as_str()).await,
        Ok(true)
    ));
    assert!(matches!(
        controller.has_permission(&user, publish.as_str()).await,
        Ok(true)
    ));

    assert!(controller.unassign_role(&user).await.is_ok());
    assert!(matches!(controller.current_role(&user).await, Ok(None)));
    assert!(matches!(
        controller.has_permission(&user, publish.as_str()).await,
        Ok(false)
    ));
}

#[tokio::test]
async fn attach_and_detach_permissions_through_postgres() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let admin = PostgresAccessAdminRepository::new(pool.clone());
    let controller = AccessController::new(Arc::new(PostgresAccessStore::new(pool)));
    let user = UserId::new();

    let export = unique("reports.export");
    create_permission(&admin, export.as_str()).await;

    assert!(controller
        .attach_permission_by_name(&user, export.as_str())
        .await
        .is_ok());
    assert!(matches!(
        controller.has_permission(&user, export.as_str()).await,
        Ok(true)
    ));

    assert!(controller
        .detach_permission_by_name(&user, export.as_str())
        .await
        .is_ok());
    assert!(matches!(
        controller.has_permission(&user, export.as_str()).await,
        Ok(false)
    ));

    // Detaching again is a no-op; an unknown name fails closed.
    assert!(controller
        .detach_permission_by_name(&user, export.as_str())
        .await
        .is_ok());
    let unknown = controller
        .attach_permission_by_name(&user, unique("reports.unknown").as_str())
        .await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}
