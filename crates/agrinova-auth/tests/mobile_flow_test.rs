//! Integration tests for the mobile login, refresh, renew and device
//! binding flows.

mod common;

use agrinova_auth::device::BindDeviceInput;
use agrinova_auth::service::{DeviceRenewInput, RefreshInput};
use agrinova_auth::{Credential, SessionEvent};
use agrinova_core::AuthErrorKind;
use agrinova_core::models::device::{BindingState, DeviceInfo, Platform};
use agrinova_core::models::scope::ScopeLevel;
use agrinova_core::models::security_event::{SecurityEventKind, Severity};
use agrinova_core::models::user::{Role, UpdateUser};
use agrinova_core::repository::{AssignmentRepository, DeviceRepository, UserRepository};
use agrinova_db::repository::SurrealDeviceRepository;

use common::{client, harness, mobile_login};

fn refresh(token: &str) -> RefreshInput {
    RefreshInput {
        refresh_token: token.into(),
        device_id: None,
        device_fingerprint: None,
        client: client(),
    }
}

fn renew(offline_token: &str, device_id: &str) -> DeviceRenewInput {
    DeviceRenewInput {
        offline_token: offline_token.into(),
        device_id: device_id.into(),
        device_fingerprint: Some("fp-1".into()),
        client: client(),
    }
}

#[tokio::test]
async fn login_issues_triad_and_auto_binds_device() {
    let h = harness().await;
    let user = h.user("mandor", Role::Mandor).await;

    let out = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    assert_eq!(out.user.id, user.id);
    assert_eq!(out.expires_in, 900);
    assert!(!out.offline_token.is_empty());
    assert!(out.offline_expires_at > out.refresh_expires_at);
    assert_eq!(out.device.device_id, "dev-1");
    assert_eq!(out.device.state(), BindingState::Bound);
    assert!(!out.device.is_trusted);
    assert_eq!(out.device.device_info, DeviceInfo::unknown());
    assert_eq!(out.assignments.len(), 1);
    assert_eq!(out.scope.companies, ScopeLevel::Listed(vec![h.company_id]));
    assert_eq!(out.scope.divisions, ScopeLevel::Listed(vec![h.division_id]));

    let claims = h.service.validate_access_token(&out.access_token).unwrap();
    assert_eq!(claims.user_id().unwrap(), user.id);
    assert_eq!(claims.device_id.as_deref(), Some("dev-1"));
    assert_eq!(claims.role, Role::Mandor);
    assert_eq!(claims.company_id, Some(h.company_id.to_string()));

    // The refresh token is not an access token.
    let err = h
        .service
        .validate_access_token(&out.refresh_token)
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidToken));

    assert_eq!(h.events(SecurityEventKind::LoginSuccess).await.len(), 1);
    assert_eq!(h.events(SecurityEventKind::DeviceBind).await.len(), 1);
}

#[tokio::test]
async fn new_login_invalidates_previous_refresh_token() {
    let h = harness().await;
    h.user("mandor", Role::Mandor).await;

    let first = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();
    let second = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    let err = h
        .service
        .refresh_token(refresh(&first.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidToken));

    // The old offline token went with it.
    let err = h
        .service
        .validate_offline_access(&first.offline_token)
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidToken));

    h.service
        .refresh_token(refresh(&second.refresh_token))
        .await
        .unwrap();
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let h = harness().await;
    h.user("asisten", Role::Asisten).await;
    let login = h
        .service
        .mobile_login(mobile_login("asisten", "dev-1", "fp-1"))
        .await
        .unwrap();

    let rotated = h
        .service
        .refresh_token(refresh(&login.refresh_token))
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, login.refresh_token);
    assert_eq!(rotated.scope.estates, ScopeLevel::Listed(vec![h.estate_id]));

    let replay = h
        .service
        .refresh_token(refresh(&login.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(replay.auth_kind(), Some(AuthErrorKind::InvalidToken));

    // The replacement still works, exactly once.
    h.service
        .refresh_token(refresh(&rotated.refresh_token))
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_refresh_has_one_winner_and_typed_losers() {
    let h = harness().await;
    h.user("asisten", Role::Asisten).await;

    for round in 0..5 {
        let device = format!("dev-{round}");
        let login = h
            .service
            .mobile_login(mobile_login("asisten", &device, "fp-1"))
            .await
            .unwrap();

        let (a, b, c) = tokio::join!(
            h.service.refresh_token(refresh(&login.refresh_token)),
            h.service.refresh_token(refresh(&login.refresh_token)),
            h.service.refresh_token(refresh(&login.refresh_token)),
        );
        let results = [a, b, c];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "round {round}");
        for err in results.into_iter().filter_map(Result::err) {
            assert_eq!(
                err.auth_kind(),
                Some(AuthErrorKind::InvalidToken),
                "round {round}: {err}"
            );
        }
    }
}

#[tokio::test]
async fn refresh_recomputes_company_from_current_assignments() {
    let h = harness().await;
    let user = h.user("satpam", Role::Satpam).await;
    let login = h
        .service
        .mobile_login(mobile_login("satpam", "dev-1", "fp-1"))
        .await
        .unwrap();

    for assignment in h.assignments().list_for_user(user.id).await.unwrap() {
        h.assignments()
            .set_active(assignment.id, false)
            .await
            .unwrap();
    }

    let rotated = h
        .service
        .refresh_token(refresh(&login.refresh_token))
        .await
        .unwrap();
    let claims = h
        .service
        .validate_access_token(&rotated.access_token)
        .unwrap();
    assert_eq!(claims.company_id, None);
    assert!(rotated.assignments.is_empty());
}

#[tokio::test]
async fn refresh_cross_checks_presented_device() {
    let h = harness().await;
    h.user("mandor", Role::Mandor).await;
    let login = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    let mut input = refresh(&login.refresh_token);
    input.device_id = Some("dev-2".into());
    let err = h.service.refresh_token(input).await.unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotAuthorized));

    let mut input = refresh(&login.refresh_token);
    input.device_fingerprint = Some("fp-other".into());
    let err = h.service.refresh_token(input).await.unwrap_err();
    assert_eq!(
        err.auth_kind(),
        Some(AuthErrorKind::DeviceFingerprintMismatch)
    );

    let suspicious = h.events(SecurityEventKind::SuspiciousActivity).await;
    assert!(
        suspicious
            .iter()
            .any(|e| e.severity == Severity::Warning && e.details["reason"] == "device_id_mismatch")
    );
    assert!(
        suspicious
            .iter()
            .any(|e| e.severity == Severity::Critical
                && e.details["reason"] == "device_fingerprint_mismatch")
    );

    // Neither failure consumed the token.
    h.service
        .refresh_token(refresh(&login.refresh_token))
        .await
        .unwrap();
}

#[tokio::test]
async fn refresh_fails_for_deactivated_user() {
    let h = harness().await;
    let user = h.user("mandor", Role::Mandor).await;
    let login = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    h.users()
        .update(
            user.id,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .service
        .refresh_token(refresh(&login.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::UserNotFound));
}

#[tokio::test]
async fn fingerprint_mismatch_never_rewrites_stored_fingerprint() {
    let h = harness().await;
    let user = h.user("mandor", Role::Mandor).await;
    h.service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    for _ in 0..2 {
        let err = h
            .service
            .mobile_login(mobile_login("mandor", "dev-1", "fp-evil"))
            .await
            .unwrap_err();
        assert_eq!(
            err.auth_kind(),
            Some(AuthErrorKind::DeviceFingerprintMismatch)
        );
    }

    let stored = SurrealDeviceRepository::new(h.db.clone())
        .get(user.id, "dev-1")
        .await
        .unwrap();
    assert_eq!(stored.device_fingerprint, "fp-1");
    assert!(stored.can_issue_tokens());

    let critical: Vec<_> = h
        .events(SecurityEventKind::SuspiciousActivity)
        .await
        .into_iter()
        .filter(|e| e.severity == Severity::Critical)
        .collect();
    assert_eq!(critical.len(), 2);
}

#[tokio::test]
async fn login_rejections() {
    let h = harness().await;
    h.user("mandor", Role::Mandor).await;
    h.user("admin", Role::CompanyAdmin).await;
    h.bare_user("grading", Role::Grading).await;

    let mut wrong = mobile_login("mandor", "dev-1", "fp-1");
    wrong.credential = Credential::Password("not-the-password".into());
    let err = h.service.mobile_login(wrong).await.unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidCredentials));

    let err = h
        .service
        .mobile_login(mobile_login("nobody", "dev-1", "fp-1"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidCredentials));

    let err = h
        .service
        .mobile_login(mobile_login("admin", "dev-1", "fp-1"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::MobileAccessDenied));

    let err = h
        .service
        .mobile_login(mobile_login("grading", "dev-9", "fp-9"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::NoAssignments));

    // Biometric answers the same whether or not the account exists.
    for identifier in ["mandor", "nobody"] {
        let mut biometric = mobile_login(identifier, "dev-1", "fp-1");
        biometric.credential = Credential::Biometric("assertion".into());
        let err = h.service.mobile_login(biometric).await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthErrorKind::NotImplemented));
    }

    let mut no_device = mobile_login("mandor", "dev-1", "fp-1");
    no_device.device_id = Some("  ".into());
    assert!(matches!(
        h.service.mobile_login(no_device).await.unwrap_err(),
        agrinova_core::AgrinovaError::Validation { .. }
    ));

    let reasons: Vec<String> = h
        .events(SecurityEventKind::LoginFailure)
        .await
        .iter()
        .filter_map(|e| e.details["reason"].as_str().map(str::to_string))
        .collect();
    for expected in [
        "invalid_password",
        "user_not_found",
        "mobile_access_denied",
        "biometric_not_implemented",
    ] {
        assert!(reasons.iter().any(|r| r == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn inactive_assignments_mean_no_company() {
    let h = harness().await;
    let user = h.user("timbangan", Role::Timbangan).await;
    for assignment in h.assignments().list_for_user(user.id).await.unwrap() {
        h.assignments()
            .set_active(assignment.id, false)
            .await
            .unwrap();
    }

    let err = h
        .service
        .mobile_login(mobile_login("timbangan", "dev-1", "fp-1"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::NoCompany));
}

#[tokio::test]
async fn explicit_bind_twice_is_already_bound() {
    let h = harness().await;
    let user = h.user("mandor", Role::Mandor).await;
    let input = BindDeviceInput {
        device_id: "dev-7".into(),
        fingerprint: "fp-7".into(),
        platform: Platform::Ios,
        info: DeviceInfo {
            model: "iPhone".into(),
            os_version: "17".into(),
            app_version: "2.1.0".into(),
            brand: Some("Apple".into()),
            build_number: None,
            device_name: None,
        },
        biometric_hash: None,
    };

    let bound = h.service.bind_device(user.id, input.clone()).await.unwrap();
    assert_eq!(bound.platform, Platform::Ios);

    let err = h.service.bind_device(user.id, input.clone()).await.unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceAlreadyBound));

    // A revoked binding can be bound again, with a new fingerprint.
    h.service.unbind_device(user.id, "dev-7").await.unwrap();
    let rebound = h
        .service
        .bind_device(
            user.id,
            BindDeviceInput {
                fingerprint: "fp-7b".into(),
                ..input
            },
        )
        .await
        .unwrap();
    assert_eq!(rebound.id, bound.id);
    assert_eq!(rebound.device_fingerprint, "fp-7b");
    assert!(rebound.can_issue_tokens());
}

#[tokio::test]
async fn unbind_blocks_every_token_operation() {
    let h = harness().await;
    let user = h.user("mandor", Role::Mandor).await;
    let login = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    let access = h
        .service
        .validate_offline_access(&login.offline_token)
        .await
        .unwrap();
    assert_eq!(access.user.id, user.id);
    assert_eq!(access.device_id, "dev-1");

    let mut events = h.service.events();
    h.service.unbind_device(user.id, "dev-1").await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::DeviceUnbound {
            user_id: user.id,
            device_id: "dev-1".into(),
        }
    );

    let err = h
        .service
        .validate_offline_access(&login.offline_token)
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotAuthorized));

    let err = h
        .service
        .refresh_token(refresh(&login.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotAuthorized));

    let err = h
        .service
        .device_renew(renew(&login.offline_token, "dev-1"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotAuthorized));

    // Auto-bind never resurrects a revoked binding.
    let err = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotAuthorized));

    let err = h.service.unbind_device(user.id, "dev-404").await.unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotFound));
}

#[tokio::test]
async fn device_renew_echoes_offline_token_and_is_not_retryable() {
    let h = harness().await;
    h.user("mandor", Role::Mandor).await;
    let login = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    let renewed = h
        .service
        .device_renew(renew(&login.offline_token, "dev-1"))
        .await
        .unwrap();
    assert_eq!(renewed.offline_token, login.offline_token);
    assert_ne!(renewed.refresh_token, login.refresh_token);

    // The refresh token from login was superseded by the renewed one.
    let err = h
        .service
        .refresh_token(refresh(&login.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidToken));
    h.service
        .refresh_token(refresh(&renewed.refresh_token))
        .await
        .unwrap();

    let retry = h
        .service
        .device_renew(renew(&login.offline_token, "dev-1"))
        .await
        .unwrap_err();
    assert_eq!(retry.auth_kind(), Some(AuthErrorKind::InvalidToken));

    // Login, one renew and one refresh; the failures are not sign-ins.
    let methods: Vec<Option<String>> = h
        .events(SecurityEventKind::LoginSuccess)
        .await
        .iter()
        .map(|e| e.details["method"].as_str().map(str::to_string))
        .collect();
    assert_eq!(methods.len(), 3);
    for method in ["device_renew", "refresh"] {
        assert_eq!(
            methods.iter().filter(|m| m.as_deref() == Some(method)).count(),
            1,
            "{method}"
        );
    }
    assert!(
        h.events(SecurityEventKind::LoginSuccess)
            .await
            .iter()
            .all(|e| e.severity == Severity::Info)
    );
}

#[tokio::test]
async fn device_renew_rejects_other_device_and_garbage() {
    let h = harness().await;
    h.user("mandor", Role::Mandor).await;
    let login = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    let err = h
        .service
        .device_renew(renew(&login.offline_token, "dev-2"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotAuthorized));

    let err = h
        .service
        .device_renew(renew("not-a-token", "dev-1"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidToken));
}

#[tokio::test]
async fn logout_revokes_device_tokens_but_keeps_binding() {
    let h = harness().await;
    let user = h.user("mandor", Role::Mandor).await;
    let login = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    let mut events = h.service.events();
    h.service.logout(user.id, "dev-1", &client()).await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::DeviceLoggedOut { .. }
    ));

    let err = h
        .service
        .refresh_token(refresh(&login.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidToken));

    let devices = h.service.list_devices(user.id).await.unwrap();
    assert_eq!(devices.len(), 1);
    assert!(devices[0].can_issue_tokens());
    assert_eq!(h.events(SecurityEventKind::Logout).await.len(), 1);

    let err = h
        .service
        .logout(user.id, "dev-404", &client())
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotFound));
}

#[tokio::test]
async fn trust_requires_live_binding() {
    let h = harness().await;
    let user = h.user("mandor", Role::Mandor).await;
    let admin = h.user("admin", Role::CompanyAdmin).await;
    h.service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();

    let trusted = h
        .service
        .trust_device(user.id, "dev-1", admin.id)
        .await
        .unwrap();
    assert_eq!(trusted.state(), BindingState::Trusted);
    assert_eq!(trusted.authorized_by, Some(admin.id));
    assert_eq!(h.events(SecurityEventKind::DeviceTrust).await.len(), 1);

    h.service.unbind_device(user.id, "dev-1").await.unwrap();
    let err = h
        .service
        .trust_device(user.id, "dev-1", admin.id)
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotAuthorized));

    let err = h
        .service
        .trust_device(user.id, "dev-404", admin.id)
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::DeviceNotFound));
}
