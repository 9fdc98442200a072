use std::sync::Arc;

use rolegate_application::{
    AccessAdminRepository, AccessController, AccessStore, AccessTransaction,
    CreatePermissionInput, CreateRoleInput,
};
use rolegate_core::AppError;
use rolegate_domain::{Permission, Role, UserId};

use super::InMemoryAccessStore;

fn role_input(name: &str) -> CreateRoleInput {
    CreateRoleInput {
        name: name.to_owned(),
        display_name: None,
        description: None,
    }
}

fn permission_input(name: &str) -> CreatePermissionInput {
    CreatePermissionInput {
        name: name.to_owned(),
        display_name: None,
        description: None,
    }
}

async fn create_permission(store: &InMemoryAccessStore, name: &str) -> Permission {
    match store.create_permission(permission_input(name)).await {
        Ok(permission) => permission,
        Err(error) => panic!("failed to create permission '{name}': {error}"),
    }
}

async fn create_role_with(store: &InMemoryAccessStore, name: &str, grants: &[&str]) -> Role {
    let role = match store.create_role(role_input(name)).await {
        Ok(role) => role,
        Err(error) => panic!("failed to create role '{name}': {error}"),
    };

    for grant in grants {
        create_permission(store, grant).await;
        if let Err(error) = store.grant_role_permission(name, grant).await {
            panic!("failed to grant '{grant}' to '{name}': {error}");
        }
    }

    role
}

#[tokio::test]
async fn role_switch_keeps_shared_and_adds_new_permissions() {
    let store = Arc::new(InMemoryAccessStore::new());
    let controller = AccessController::new(store.clone());
    let user = UserId::new();

    create_role_with(&store, "author", &["content.create", "content.edit"]).await;
    let editor = match store.create_role(role_input("editor")).await {
        Ok(role) => role,
        Err(error) => panic!("failed to create role 'editor': {error}"),
    };
    create_permission(&store, "content.publish").await;
    assert!(store.grant_role_permission("editor", "content.edit").await.is_ok());
    assert!(store
        .grant_role_permission("editor", "content.publish")
        .await
        .is_ok());

    assert!(controller.assign_role_by_name(&user, "author").await.is_ok());
    assert!(controller.assign_role(&user, &editor).await.is_ok());

    assert!(matches!(controller.has_permission(&user, "content.create").await, Ok(false)));
    assert!(matches!(controller.has_permission(&user, "content.edit").await, Ok(true)));
    assert!(matches!(controller.has_permission(&user, "content.publish").await, Ok(true)));
    assert!(matches!(controller.has_role(&user, "editor").await, Ok(true)));
}

#[tokio::test]
async fn direct_permission_survives_role_switches() {
    let store = Arc::new(InMemoryAccessStore::new());
    let controller = AccessController::new(store.clone());
    let user = UserId::new();

    create_role_with(&store, "author", &["content.create"]).await;
    create_role_with(&store, "editor", &["content.publish"]).await;
    create_permission(&store, "reports.export").await;

    assert!(controller
        .attach_permission_by_name(&user, "reports.export")
        .await
        .is_ok());
    assert!(controller.assign_role_by_name(&user, "author").await.is_ok());
    assert!(controller.assign_role_by_name(&user, "editor").await.is_ok());

    assert!(matches!(
        controller.has_permission(&user, "reports.export").await,
        Ok(true)
    ));
    assert!(matches!(
        controller.has_permission(&user, "content.create").await,
        Ok(false)
    ));
}

#[tokio::test]
async fn repeated_assignment_is_idempotent() {
    let store = Arc::new(InMemoryAccessStore::new());
    let controller = AccessController::new(store.clone());
    let user = UserId::new();

    create_role_with(&store, "editor", &["content.edit"]).await;

    assert!(controller.assign_role_by_name(&user, "editor").await.is_ok());
    assert!(controller.assign_role_by_name(&user, "editor").await.is_ok());

    let current = controller.current_role(&user).await;
    assert!(matches!(current, Ok(Some(ref role)) if role.name() == "editor"));
    assert!(matches!(store.count_user_permissions(user, "content.edit").await, Ok(1)));
}

#[tokio::test]
async fn dropped_transaction_discards_staged_changes() {
    let store = Arc::new(InMemoryAccessStore::new());
    let user = UserId::new();

    let permission = create_permission(&store, "content.edit").await;

    let staged = async {
        let mut transaction = store.begin().await?;
        transaction.link_user_permission(user, permission.id()).await?;
        drop(transaction);
        Ok::<(), AppError>(())
    }
    .await;
    assert!(staged.is_ok());

    assert!(matches!(store.count_user_permissions(user, "content.edit").await, Ok(0)));
}

#[tokio::test]
async fn duplicate_role_name_conflicts() {
    let store = InMemoryAccessStore::new();

    assert!(store.create_role(role_input("editor")).await.is_ok());
    let duplicate = store.create_role(role_input("editor")).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn delete_role_cascades_links_but_keeps_materialized_grants() {
    let store = Arc::new(InMemoryAccessStore::new());
    let controller = AccessController::new(store.clone());
    let user = UserId::new();

    create_role_with(&store, "editor", &["content.edit"]).await;
    assert!(controller.assign_role_by_name(&user, "editor").await.is_ok());

    assert!(store.delete_role("editor").await.is_ok());

    assert!(matches!(controller.current_role(&user).await, Ok(None)));
    // The materialized grant references the permission, not the role.
    assert!(matches!(
        controller.has_permission(&user, "content.edit").await,
        Ok(true)
    ));
}

#[tokio::test]
async fn delete_permission_cascades_user_grants() {
    let store = Arc::new(InMemoryAccessStore::new());
    let controller = AccessController::new(store.clone());
    let user = UserId::new();

    create_permission(&store, "reports.export").await;
    assert!(controller
        .attach_permission_by_name(&user, "reports.export")
        .await
        .is_ok());

    assert!(store.delete_permission("reports.export").await.is_ok());

    assert!(matches!(
        controller.has_permission(&user, "reports.export").await,
        Ok(false)
    ));
}

#[tokio::test]
async fn two_committed_role_rows_surface_corruption() {
    let store = Arc::new(InMemoryAccessStore::new());
    let controller = AccessController::new(store.clone());
    let user = UserId::new();

    let author = create_role_with(&store, "author", &[]).await;
    let editor = create_role_with(&store, "editor", &[]).await;

    let seeded = async {
        let mut transaction = store.begin().await?;
        transaction.link_user_role(user, author.id()).await?;
        transaction.link_user_role(user, editor.id()).await?;
        transaction.commit().await
    }
    .await;
    assert!(seeded.is_ok());

    assert!(matches!(
        controller.current_role(&user).await,
        Err(AppError::Internal(_))
    ));
}

#[tokio::test]
async fn grant_role_permission_requires_existing_endpoints() {
    let store = InMemoryAccessStore::new();

    create_permission(&store, "content.edit").await;
    let missing_role = store.grant_role_permission("editor", "content.edit").await;
    assert!(matches!(missing_role, Err(AppError::NotFound(_))));

    assert!(store.create_role(role_input("editor")).await.is_ok());
    let missing_permission = store.grant_role_permission("editor", "content.publish").await;
    assert!(matches!(missing_permission, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn revoke_of_missing_grant_is_not_found() {
    let store = InMemoryAccessStore::new();

    assert!(store.create_role(role_input("editor")).await.is_ok());
    create_permission(&store, "content.edit").await;

    let result = store.revoke_role_permission("editor", "content.edit").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn list_roles_returns_sorted_grants() {
    let store = InMemoryAccessStore::new();

    create_role_with(&store, "editor", &["content.publish", "content.edit"]).await;
    create_role_with(&store, "author", &["content.create"]).await;

    let listed = store.list_roles().await;
    assert!(listed.is_ok());
    if let Ok(roles) = listed {
        let names: Vec<&str> = roles.iter().map(|entry| entry.role.name()).collect();
        assert_eq!(names, vec!["author", "editor"]);

        let editor_grants: Vec<&str> = roles[1]
            .permissions
            .iter()
            .map(|permission| permission.name())
            .collect();
        assert_eq!(editor_grants, vec!["content.edit", "content.publish"]);
    }
}
