//! Integration tests for the device binding repository.

use agrinova_core::AgrinovaError;
use agrinova_core::models::device::{BindingState, CreateDeviceBinding, DeviceInfo, Platform};
use agrinova_core::repository::DeviceRepository;
use agrinova_db::repository::SurrealDeviceRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> SurrealDeviceRepository<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    agrinova_db::run_migrations(&db).await.unwrap();
    SurrealDeviceRepository::new(db)
}

fn binding(user_id: Uuid, device_id: &str) -> CreateDeviceBinding {
    CreateDeviceBinding {
        user_id,
        device_id: device_id.into(),
        device_fingerprint: format!("fp-{device_id}"),
        platform: Platform::Android,
        device_info: DeviceInfo {
            model: "SM-A145F".into(),
            os_version: "14".into(),
            app_version: "2.3.0".into(),
            brand: Some("samsung".into()),
            build_number: None,
            device_name: None,
        },
        biometric_hash: None,
        is_trusted: false,
    }
}

#[tokio::test]
async fn create_and_get_binding() {
    let repo = setup().await;
    let user_id = Uuid::new_v4();

    let created = repo.create(binding(user_id, "dev-1")).await.unwrap();
    assert_eq!(created.state(), BindingState::Bound);
    assert!(created.can_issue_tokens());
    assert_eq!(created.device_info.brand.as_deref(), Some("samsung"));

    let fetched = repo.get(user_id, "dev-1").await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.platform, Platform::Android);
    assert_eq!(fetched.device_info, created.device_info);
}

#[tokio::test]
async fn one_binding_per_user_and_device() {
    let repo = setup().await;
    let user_id = Uuid::new_v4();
    repo.create(binding(user_id, "dev-1")).await.unwrap();

    let err = repo.create(binding(user_id, "dev-1")).await.unwrap_err();
    assert!(matches!(err, AgrinovaError::AlreadyExists { .. }));

    // Same device for another user is a separate binding.
    repo.create(binding(Uuid::new_v4(), "dev-1")).await.unwrap();
}

#[tokio::test]
async fn revoke_then_reactivate() {
    let repo = setup().await;
    let user_id = Uuid::new_v4();
    let created = repo.create(binding(user_id, "dev-1")).await.unwrap();

    let revoked = repo.revoke(user_id, "dev-1").await.unwrap();
    assert_eq!(revoked.state(), BindingState::Revoked);
    assert!(!revoked.can_issue_tokens());
    assert!(revoked.revoked_at.is_some());

    let mut again = binding(user_id, "dev-1");
    again.device_fingerprint = "fp-new".into();
    let reactivated = repo.reactivate(created.id, again).await.unwrap();
    assert_eq!(reactivated.id, created.id);
    assert!(reactivated.can_issue_tokens());
    assert_eq!(reactivated.device_fingerprint, "fp-new");
}

#[tokio::test]
async fn trust_records_who_approved() {
    let repo = setup().await;
    let user_id = Uuid::new_v4();
    let approver = Uuid::new_v4();
    repo.create(binding(user_id, "dev-1")).await.unwrap();

    let trusted = repo.set_trusted(user_id, "dev-1", approver).await.unwrap();
    assert_eq!(trusted.state(), BindingState::Trusted);
    assert_eq!(trusted.authorized_by, Some(approver));
    assert!(trusted.authorized_at.is_some());
}

#[tokio::test]
async fn unknown_binding_is_not_found() {
    let repo = setup().await;
    let user_id = Uuid::new_v4();

    assert!(repo.get(user_id, "ghost").await.unwrap_err().is_not_found());
    assert!(repo.revoke(user_id, "ghost").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn list_and_touch() {
    let repo = setup().await;
    let user_id = Uuid::new_v4();
    let first = repo.create(binding(user_id, "dev-1")).await.unwrap();
    repo.create(binding(user_id, "dev-2")).await.unwrap();

    repo.touch_last_seen(first.id).await.unwrap();
    let listed = repo.list_for_user(user_id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].device_id, "dev-1", "most recently seen first");
}
