//! Integration tests for web sessions, QR login and the account-wide
//! operations.

mod common;

use agrinova_auth::service::{QrLoginApproval, WebLoginInput};
use agrinova_auth::{AuthConfig, QrLoginStatus, RateLimitConfig, SessionEvent};
use agrinova_core::AuthErrorKind;
use agrinova_core::models::scope::{AuthorizedScope, ScopeLevel};
use agrinova_core::models::security_event::{SecurityEventKind, Severity};
use agrinova_core::models::user::Role;
use agrinova_core::repository::WebSessionRepository;
use agrinova_db::repository::SurrealWebSessionRepository;
use chrono::{Duration, Utc};
use uuid::Uuid;

use common::{PASSWORD, client, harness, harness_with, mobile_login, test_config};

fn web_login(identifier: &str, password: &str) -> WebLoginInput {
    WebLoginInput {
        identifier: identifier.into(),
        password: password.into(),
        remember_me: false,
        fingerprint: Some("browser-fp".into()),
        client: client(),
    }
}

fn approval(session_id: Uuid, challenge: &str, access_token: &str) -> QrLoginApproval {
    QrLoginApproval {
        session_id,
        challenge: challenge.into(),
        access_token: access_token.into(),
        client: client(),
    }
}

#[tokio::test]
async fn web_allow_list_follows_role_table() {
    let h = harness().await;
    h.user("mandor", Role::Mandor).await;
    h.user("satpam", Role::Satpam).await;
    h.bare_user("root", Role::SuperAdmin).await;

    let err = h
        .service
        .web_login(web_login("mandor", PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::WebAccessDenied));

    // SATPAM has both platforms; SUPER_ADMIN is web-only and needs no
    // assignments.
    h.service
        .web_login(web_login("satpam", PASSWORD))
        .await
        .unwrap();
    let root = h
        .service
        .web_login(web_login("root", PASSWORD))
        .await
        .unwrap();
    assert_eq!(root.scope, AuthorizedScope::unrestricted());
    assert!(root.company_ids.is_empty());
}

#[tokio::test]
async fn widened_allow_list_admits_mandor_and_narrowed_one_refuses_super_admin() {
    let mut config = test_config();
    config.web_roles.push(Role::Mandor);
    config.web_roles.retain(|r| *r != Role::SuperAdmin);
    let h = harness_with(config).await;
    h.user("mandor", Role::Mandor).await;
    h.bare_user("root", Role::SuperAdmin).await;

    let out = h
        .service
        .web_login(web_login("mandor", "demo123"))
        .await
        .unwrap();
    assert!(!out.session_token.is_empty());
    assert!(!out.csrf_token.is_empty());
    assert_ne!(out.session_token, out.csrf_token);
    assert_eq!(out.company_ids, vec![h.company_id]);
    assert_eq!(out.scope.estates, ScopeLevel::Listed(vec![h.estate_id]));

    let err = h
        .service
        .web_login(web_login("root", PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::WebAccessDenied));
}

#[tokio::test]
async fn session_and_csrf_validation() {
    let h = harness().await;
    let user = h.user("manager", Role::Manager).await;
    let out = h
        .service
        .web_login(web_login("manager@agrinova.test", PASSWORD))
        .await
        .unwrap();
    assert_eq!(out.user.id, user.id);

    let [session_cookie, csrf_cookie] = &out.cookies;
    assert_eq!(session_cookie.value, out.session_token);
    assert_eq!(session_cookie.max_age_secs, 86_400);
    assert!(session_cookie.to_string().contains("SameSite=Lax"));
    assert!(csrf_cookie.to_string().contains("SameSite=Strict"));
    let remaining = out.expires_at - Utc::now();
    assert!(remaining > Duration::hours(23) && remaining <= Duration::hours(24));

    let session = h.service.validate_session(&out.session_token).await.unwrap();
    assert_eq!(session.id, out.session_id);
    assert_eq!(session.device_id.as_deref(), Some("browser-fp"));
    assert_eq!(session.ip_address.as_deref(), Some("10.0.0.7:52311"));

    h.service.validate_csrf(&session, &out.csrf_token).unwrap();
    let err = h
        .service
        .validate_csrf(&session, &out.session_token)
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidSession));

    let err = h
        .service
        .validate_session("forged-session")
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidSession));

    let me = h.service.get_me(&out.session_token).await.unwrap();
    assert_eq!(me.user.id, user.id);
    assert_eq!(me.company_ids, vec![h.company_id]);
    assert_eq!(me.scope.divisions, ScopeLevel::All);
}

#[tokio::test]
async fn remember_me_extends_session() {
    let h = harness().await;
    h.user("asisten", Role::Asisten).await;
    let mut input = web_login("asisten", PASSWORD);
    input.remember_me = true;

    let out = h.service.web_login(input).await.unwrap();
    assert!(out.expires_at - Utc::now() > Duration::days(6));
    assert_eq!(out.cookies[0].max_age_secs, 604_800);
    // The CSRF cookie keeps its own lifetime.
    assert_eq!(out.cookies[1].max_age_secs, 86_400);
}

#[tokio::test]
async fn web_logout_revokes_session_and_clears_cookies() {
    let h = harness().await;
    let user = h.user("asisten", Role::Asisten).await;
    let out = h
        .service
        .web_login(web_login("asisten", PASSWORD))
        .await
        .unwrap();

    let mut events = h.service.events();
    let cleared = h
        .service
        .web_logout(out.session_id, &client())
        .await
        .unwrap();
    assert!(cleared.iter().all(|c| c.max_age_secs == 0));
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::WebSessionRevoked {
            user_id: user.id,
            session_id: out.session_id,
        }
    );

    let err = h
        .service
        .validate_session(&out.session_token)
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidSession));

    // Soft revoke: the row remains with its reason.
    let stored = SurrealWebSessionRepository::new(h.db.clone())
        .get_by_id(out.session_id)
        .await
        .unwrap();
    assert!(stored.revoked);
    assert!(!stored.is_active);
    assert_eq!(stored.revoked_reason.as_deref(), Some("logout"));
    assert_eq!(stored.revoked_by, Some(user.id));
    assert_eq!(h.events(SecurityEventKind::Logout).await.len(), 1);
}

#[tokio::test]
async fn admin_session_revocation() {
    let h = harness().await;
    let user = h.user("manager", Role::Manager).await;
    let admin = h.user("admin", Role::CompanyAdmin).await;
    let first = h
        .service
        .web_login(web_login("manager", PASSWORD))
        .await
        .unwrap();
    let second = h
        .service
        .web_login(web_login("manager", PASSWORD))
        .await
        .unwrap();
    let third = h
        .service
        .web_login(web_login("manager", PASSWORD))
        .await
        .unwrap();

    let revoked = h
        .service
        .revoke_session(first.session_id, admin.id, "suspicious")
        .await
        .unwrap();
    assert_eq!(revoked.revoked_by, Some(admin.id));
    assert_eq!(revoked.revoked_reason.as_deref(), Some("suspicious"));

    let count = h
        .service
        .revoke_all_user_sessions(user.id, admin.id, "offboarding")
        .await
        .unwrap();
    assert_eq!(count, 2);
    for token in [&second.session_token, &third.session_token] {
        assert!(h.service.validate_session(token).await.is_err());
    }
    assert_eq!(h.events(SecurityEventKind::SessionRevoked).await.len(), 2);
}

#[tokio::test]
async fn expire_stale_marks_old_sessions_inactive() {
    let h = harness().await;
    h.user("manager", Role::Manager).await;
    let out = h
        .service
        .web_login(web_login("manager", PASSWORD))
        .await
        .unwrap();

    assert_eq!(h.service.expire_stale_sessions().await.unwrap(), 0);

    h.db.query("UPDATE web_session SET expires_at = time::now() - 1m")
        .await
        .unwrap()
        .check()
        .unwrap();
    assert_eq!(h.service.expire_stale_sessions().await.unwrap(), 1);

    let err = h
        .service
        .validate_session(&out.session_token)
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidSession));
}

#[tokio::test]
async fn failed_logins_are_rate_limited_per_client_host() {
    let mut config: AuthConfig = test_config();
    config.rate_limit = RateLimitConfig {
        max_failures: 3,
        window_secs: 900,
        block_secs: 900,
    };
    let h = harness_with(config).await;
    h.user("manager", Role::Manager).await;

    for _ in 0..2 {
        let err = h
            .service
            .web_login(web_login("manager", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidCredentials));
    }
    let err = h
        .service
        .web_login(web_login("manager", "wrong"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::RateLimited));

    // Same host on another port is still blocked, even with the right
    // password.
    let mut input = web_login("manager", PASSWORD);
    input.client.ip_address = Some("10.0.0.7:40000".into());
    let err = h.service.web_login(input).await.unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::RateLimited));

    let mut input = web_login("manager", PASSWORD);
    input.client.ip_address = Some("10.0.0.8:40000".into());
    h.service.web_login(input).await.unwrap();

    let trips = h.events(SecurityEventKind::SuspiciousActivity).await;
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].severity, Severity::Warning);
    assert_eq!(h.events(SecurityEventKind::LoginFailure).await.len(), 3);
}

#[tokio::test]
async fn change_password_revokes_everything() {
    let h = harness().await;
    let user = h.user("satpam", Role::Satpam).await;
    let mobile = h
        .service
        .mobile_login(mobile_login("satpam", "dev-1", "fp-1"))
        .await
        .unwrap();
    let web = h
        .service
        .web_login(web_login("satpam", PASSWORD))
        .await
        .unwrap();

    let err = h
        .service
        .change_password(user.id, "wrong", "kebun-baru-2024", &client())
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidCredentials));
    let suspicious = h.events(SecurityEventKind::SuspiciousActivity).await;
    assert_eq!(suspicious[0].details["reason"], "wrong_current_password");

    let err = h
        .service
        .change_password(user.id, PASSWORD, "short", &client())
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::WeakPassword));

    h.service
        .change_password(user.id, PASSWORD, "kebun-baru-2024", &client())
        .await
        .unwrap();

    assert!(
        h.service
            .validate_session(&web.session_token)
            .await
            .is_err()
    );
    let err = h
        .service
        .validate_offline_access(&mobile.offline_token)
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidToken));

    let err = h
        .service
        .web_login(web_login("satpam", PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidCredentials));
    h.service
        .web_login(web_login("satpam", "kebun-baru-2024"))
        .await
        .unwrap();
    assert_eq!(h.events(SecurityEventKind::PasswordChange).await.len(), 1);
}

#[tokio::test]
async fn logout_all_devices_signs_out_everywhere() {
    let h = harness().await;
    let user = h.user("satpam", Role::Satpam).await;
    let phone = h
        .service
        .mobile_login(mobile_login("satpam", "dev-1", "fp-1"))
        .await
        .unwrap();
    let tablet = h
        .service
        .mobile_login(mobile_login("satpam", "dev-2", "fp-2"))
        .await
        .unwrap();
    let web = h
        .service
        .web_login(web_login("satpam", PASSWORD))
        .await
        .unwrap();

    let mut events = h.service.events();
    h.service
        .logout_all_devices(user.id, &client())
        .await
        .unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::UserSignedOutEverywhere { user_id: user.id }
    );

    for offline in [&phone.offline_token, &tablet.offline_token] {
        let err = h
            .service
            .validate_offline_access(offline)
            .await
            .unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidToken));
    }
    assert!(
        h.service
            .validate_session(&web.session_token)
            .await
            .is_err()
    );

    let logouts = h.events(SecurityEventKind::Logout).await;
    assert_eq!(logouts.len(), 1);
    assert_eq!(logouts[0].details["scope"], "all");
}

#[tokio::test]
async fn qr_login_approved_on_mobile_opens_one_web_session() {
    let h = harness().await;
    let manager = h.user("manager", Role::Manager).await;
    let mobile = h
        .service
        .mobile_login(mobile_login("manager", "dev-1", "fp-1"))
        .await
        .unwrap();

    let qr = h.service.create_qr_login().unwrap();
    assert_eq!(qr.status, QrLoginStatus::Pending);
    assert!(qr.qr_data.contains(&qr.challenge));

    let err = h
        .service
        .consume_qr_login(qr.session_id, &qr.challenge, client())
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::QrLoginNotApproved));

    let approved = h
        .service
        .approve_qr_login(approval(qr.session_id, &qr.challenge, &mobile.access_token))
        .await
        .unwrap();
    assert_eq!(approved.status, QrLoginStatus::Approved);
    let polled = h
        .service
        .get_qr_login_status(qr.session_id, &qr.challenge)
        .unwrap();
    assert_eq!(polled.status, QrLoginStatus::Approved);

    let out = h
        .service
        .consume_qr_login(qr.session_id, &qr.challenge, client())
        .await
        .unwrap();
    assert_eq!(out.user.id, manager.id);
    assert_eq!(out.company_ids, vec![h.company_id]);
    let session = h.service.validate_session(&out.session_token).await.unwrap();
    assert_eq!(session.login_method, "QR_CODE");
    assert_eq!(session.device_id, None);
    h.service.validate_csrf(&session, &out.csrf_token).unwrap();

    // The QR code is single use.
    let err = h
        .service
        .consume_qr_login(qr.session_id, &qr.challenge, client())
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::QrLoginConsumed));
    let polled = h
        .service
        .get_qr_login_status(qr.session_id, &qr.challenge)
        .unwrap();
    assert_eq!(polled.status, QrLoginStatus::Consumed);

    let qr_logins: Vec<_> = h
        .events(SecurityEventKind::LoginSuccess)
        .await
        .into_iter()
        .filter(|e| e.details["login_method"] == "QR_CODE")
        .collect();
    assert_eq!(qr_logins.len(), 1);
    assert_eq!(qr_logins[0].user_id, Some(manager.id));
}

#[tokio::test]
async fn qr_login_refuses_a_second_approver_and_wrong_challenge() {
    let h = harness().await;
    let manager = h.user("manager", Role::Manager).await;
    h.user("satpam", Role::Satpam).await;
    let manager_app = h
        .service
        .mobile_login(mobile_login("manager", "dev-1", "fp-1"))
        .await
        .unwrap();
    let satpam_app = h
        .service
        .mobile_login(mobile_login("satpam", "dev-2", "fp-2"))
        .await
        .unwrap();

    let qr = h.service.create_qr_login().unwrap();
    h.service
        .approve_qr_login(approval(qr.session_id, &qr.challenge, &manager_app.access_token))
        .await
        .unwrap();

    let err = h
        .service
        .approve_qr_login(approval(qr.session_id, &qr.challenge, &satpam_app.access_token))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidSession));
    // The original approver may repeat the scan.
    h.service
        .approve_qr_login(approval(qr.session_id, &qr.challenge, &manager_app.access_token))
        .await
        .unwrap();

    let err = h
        .service
        .get_qr_login_status(qr.session_id, "guessed")
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidSession));
    let err = h
        .service
        .consume_qr_login(qr.session_id, "guessed", client())
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidSession));
    let err = h
        .service
        .consume_qr_login(Uuid::new_v4(), &qr.challenge, client())
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidSession));

    let out = h
        .service
        .consume_qr_login(qr.session_id, &qr.challenge, client())
        .await
        .unwrap();
    assert_eq!(out.user.id, manager.id);
}

#[tokio::test]
async fn qr_login_approver_needs_web_access_and_a_valid_token() {
    let h = harness().await;
    h.user("mandor", Role::Mandor).await;
    let mandor_app = h
        .service
        .mobile_login(mobile_login("mandor", "dev-1", "fp-1"))
        .await
        .unwrap();
    let qr = h.service.create_qr_login().unwrap();

    let err = h
        .service
        .approve_qr_login(approval(qr.session_id, &qr.challenge, &mandor_app.access_token))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::WebAccessDenied));

    // A refresh token is not an access token.
    for token in [mandor_app.refresh_token.as_str(), "not-a-jwt"] {
        let err = h
            .service
            .approve_qr_login(approval(qr.session_id, &qr.challenge, token))
            .await
            .unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidToken));
    }

    let polled = h
        .service
        .get_qr_login_status(qr.session_id, &qr.challenge)
        .unwrap();
    assert_eq!(polled.status, QrLoginStatus::Pending);
}

#[tokio::test]
async fn qr_login_expires_unapproved() {
    let mut config = test_config();
    config.qr_login_lifetime_secs = 1;
    let h = harness_with(config).await;
    h.user("manager", Role::Manager).await;
    let app = h
        .service
        .mobile_login(mobile_login("manager", "dev-1", "fp-1"))
        .await
        .unwrap();

    let qr = h.service.create_qr_login().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;

    let polled = h
        .service
        .get_qr_login_status(qr.session_id, &qr.challenge)
        .unwrap();
    assert_eq!(polled.status, QrLoginStatus::Expired);
    let err = h
        .service
        .approve_qr_login(approval(qr.session_id, &qr.challenge, &app.access_token))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::QrLoginExpired));

    assert_eq!(h.service.prune_qr_logins(), 1);
    let err = h
        .service
        .get_qr_login_status(qr.session_id, &qr.challenge)
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidSession));
}
