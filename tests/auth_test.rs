//! Authentication integration tests: the signup/OTP flow, sessions,
//! password reset, account deletion, and the user directory.

use std::sync::Arc;

use taskhub::auth::{LoginRequest, SignupRequest, VerifyOtpRequest};
use taskhub::database::Database;
use taskhub::services::ProjectService;
use taskhub::{ApiError, AuthService, Config, LogNotifier};

async fn setup() -> (Database, AuthService) {
    let db = Database::in_memory().await.unwrap();
    let auth = AuthService::new(db.clone(), Arc::new(LogNotifier), Config::default());
    (db, auth)
}

fn signup_request(name: &str) -> SignupRequest {
    SignupRequest {
        full_name: format!("{} Example", name),
        username: name.to_string(),
        email: format!("{}@example.com", name),
        password: "hunter2hunter2".to_string(),
    }
}

/// Run the full signup flow, reading the OTP from the pending table the way
/// the mail would carry it.
async fn register(db: &Database, auth: &AuthService, name: &str) -> (String, i64) {
    auth.signup(signup_request(name)).await.unwrap();

    let pending = db
        .pending_signup(&format!("{}@example.com", name))
        .await
        .unwrap()
        .expect("pending signup missing");

    let response = auth
        .verify_otp(VerifyOtpRequest {
            email: pending.email,
            otp: pending.otp,
        })
        .await
        .unwrap();
    (response.token, response.user.id)
}

#[tokio::test]
async fn signup_creates_no_user_until_otp_verified() {
    let (db, auth) = setup().await;

    auth.signup(signup_request("alice")).await.unwrap();
    assert!(db.find_user_by_email("alice@example.com").await.unwrap().is_none());

    let pending = db.pending_signup("alice@example.com").await.unwrap().unwrap();
    let response = auth
        .verify_otp(VerifyOtpRequest {
            email: "alice@example.com".to_string(),
            otp: pending.otp,
        })
        .await
        .unwrap();

    assert_eq!(response.user.username, "alice");
    assert!(db.find_user_by_email("alice@example.com").await.unwrap().is_some());
    // The pending row is consumed.
    assert!(db.pending_signup("alice@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn wrong_otp_is_rejected() {
    let (db, auth) = setup().await;

    auth.signup(signup_request("alice")).await.unwrap();
    let pending = db.pending_signup("alice@example.com").await.unwrap().unwrap();
    let wrong = if pending.otp == "000000" { "000001" } else { "000000" };

    let err = auth
        .verify_otp(VerifyOtpRequest {
            email: "alice@example.com".to_string(),
            otp: wrong.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let (db, auth) = setup().await;
    register(&db, &auth, "alice").await;

    let err = auth.signup(signup_request("alice")).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn login_checks_credentials_and_issues_sessions() {
    let (db, auth) = setup().await;
    register(&db, &auth, "alice").await;

    let err = auth
        .login(LoginRequest {
            email: "alice@example.com".to_string(),
            password: "wrong password".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));

    let response = auth
        .login(LoginRequest {
            email: "ALICE@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        })
        .await
        .unwrap();

    let session = db.session_user(&response.token).await.unwrap();
    assert_eq!(session.unwrap().username, "alice");
    assert!(db.session_user("not-a-token").await.unwrap().is_none());
}

#[tokio::test]
async fn password_reset_revokes_sessions() {
    let (db, auth) = setup().await;
    let (token, user_id) = register(&db, &auth, "alice").await;

    auth.forgot_password("alice@example.com").await.unwrap();
    // Unknown addresses get the same silent success.
    auth.forgot_password("nobody@example.com").await.unwrap();

    let reset_token: String =
        sqlx::query_scalar("SELECT token FROM password_resets WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&*db)
            .await
            .unwrap();

    auth.reset_password(&reset_token, "new password 123").await.unwrap();

    // Old session and old password are both dead.
    assert!(db.session_user(&token).await.unwrap().is_none());
    let err = auth
        .login(LoginRequest {
            email: "alice@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));

    auth.login(LoginRequest {
        email: "alice@example.com".to_string(),
        password: "new password 123".to_string(),
    })
    .await
    .unwrap();

    // Reset tokens are single use.
    let err = auth
        .reset_password(&reset_token, "another password")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));
}

#[tokio::test]
async fn search_excludes_self_and_requires_two_chars() {
    let (db, auth) = setup().await;
    let (_, alice_id) = register(&db, &auth, "alice").await;
    register(&db, &auth, "alicia").await;
    register(&db, &auth, "bob").await;

    let err = auth.search_users("a", alice_id).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));

    let results = auth.search_users("ali", alice_id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].username, "alicia");
}

#[tokio::test]
async fn delete_account_takes_owned_projects_along() {
    let (db, auth) = setup().await;
    let (_, alice_id) = register(&db, &auth, "alice").await;

    let projects = ProjectService::new(db.clone(), Arc::new(LogNotifier));
    let alice = db.get_user_by_id(alice_id).await.unwrap();
    let view = projects
        .create(
            &alice,
            taskhub::models::CreateProjectRequest {
                title: Some("Apollo".to_string()),
                description: None,
                github_link: None,
                project_type: None,
                collaborators: Vec::new(),
            },
        )
        .await
        .unwrap();

    auth.delete_account(alice_id).await.unwrap();

    assert!(db.find_user_by_email("alice@example.com").await.unwrap().is_none());
    assert!(matches!(
        db.get_project(view.id).await.unwrap_err(),
        taskhub::database::DatabaseError::NotFound(_)
    ));
}

#[tokio::test]
async fn availability_checks_report_shape_problems_as_unavailable() {
    let (db, auth) = setup().await;
    register(&db, &auth, "alice").await;

    let taken = auth.check_username("alice").await.unwrap();
    assert!(!taken.available);
    let free = auth.check_username("someone-else").await.unwrap();
    assert!(free.available);
    // Too short: reported as unavailable, not as an error.
    let bad = auth.check_username("ab").await.unwrap();
    assert!(!bad.available);

    let taken = auth.check_email("alice@example.com").await.unwrap();
    assert!(!taken.available);
    let bad = auth.check_email("not-an-email").await.unwrap();
    assert!(!bad.available);
}
