//! Authentication Flows
//!
//! Signup with OTP verification, login, sessions, password reset, and
//! profile management. Sessions are opaque bearer tokens in the database;
//! the `AuthUser` extractor resolves a token to a user row and is the
//! identity oracle for every authenticated route. Password hashing is kept
//! behind this module.
//!
//! Pending signups live in a TTL-keyed table (not process memory): a
//! concurrent signup for the same email simply overwrites the previous
//! attempt, and expired rows are swept on insert.

use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::database::{Database, UserRow};
use crate::error::ApiError;
use crate::models::{self, UserSummary};
use crate::notify::{Notification, Notifier, dispatch};
use crate::web::AppState;

const PASSWORD_MIN: usize = 8;

// ========== Request / response DTOs ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendOtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckUsernameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckEmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Availability {
    pub available: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserRow);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || ApiError::Unauthorized("Please authenticate".to_string());

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(unauthorized)?;
        let token = header.strip_prefix("Bearer ").ok_or_else(unauthorized)?;

        match state.auth.db.session_user(token).await {
            Ok(Some(user)) => Ok(AuthUser(user)),
            Ok(None) => Err(unauthorized()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    pub(crate) db: Database,
    notifier: Arc<dyn Notifier>,
    config: Config,
}

impl AuthService {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        Self { db, notifier, config }
    }

    pub async fn check_username(&self, username: &str) -> Result<Availability, ApiError> {
        if let Err(msg) = models::validate_username(username) {
            return Ok(Availability { available: false, message: msg });
        }
        let taken = self.db.find_user_by_username(username).await?.is_some();
        Ok(Availability {
            available: !taken,
            message: if taken {
                "Username is already taken".to_string()
            } else {
                "Username is available".to_string()
            },
        })
    }

    pub async fn check_email(&self, email: &str) -> Result<Availability, ApiError> {
        let email = email.to_lowercase();
        if let Err(msg) = models::validate_email(&email) {
            return Ok(Availability { available: false, message: msg });
        }
        let taken = self.db.find_user_by_email(&email).await?.is_some();
        Ok(Availability {
            available: !taken,
            message: if taken {
                "Email is already registered".to_string()
            } else {
                "Email is available".to_string()
            },
        })
    }

    /// Stash the signup and send an OTP. The user record is only created
    /// once the OTP is verified.
    pub async fn signup(&self, req: SignupRequest) -> Result<(), ApiError> {
        let email = req.email.to_lowercase();

        let mut details = Vec::new();
        if req.full_name.trim().is_empty() {
            details.push("Full name is required".to_string());
        }
        if let Err(e) = models::validate_username(&req.username) {
            details.push(e);
        }
        if let Err(e) = models::validate_email(&email) {
            details.push(e);
        }
        if req.password.len() < PASSWORD_MIN {
            details.push(format!(
                "Password must be at least {} characters long",
                PASSWORD_MIN
            ));
        }
        if !details.is_empty() {
            return Err(ApiError::validation_details(details));
        }

        let email_taken = self.db.find_user_by_email(&email).await?.is_some();
        let username_taken = self.db.find_user_by_username(&req.username).await?.is_some();
        if email_taken || username_taken {
            return Err(ApiError::conflict(
                "User with this email or username already exists",
            ));
        }

        let password_hash = hash_password(&req.password)?;
        let otp = generate_otp();
        let expires_at = utc_in(self.config.otp_ttl_secs);

        self.db
            .upsert_pending_signup(
                &email,
                req.full_name.trim(),
                &req.username,
                &password_hash,
                &otp,
                &expires_at,
            )
            .await?;

        tracing::info!(email = email.as_str(), "signup pending, OTP issued");
        dispatch(self.notifier.clone(), Notification::SignupOtp { email, otp });
        Ok(())
    }

    pub async fn verify_otp(&self, req: VerifyOtpRequest) -> Result<AuthResponse, ApiError> {
        let email = req.email.to_lowercase();

        let pending = self
            .db
            .pending_signup(&email)
            .await?
            .ok_or_else(|| ApiError::validation("Invalid or expired OTP"))?;

        if pending.expires_at <= utc_now() {
            return Err(ApiError::validation("Invalid or expired OTP"));
        }
        if pending.otp != req.otp {
            return Err(ApiError::validation("Invalid or expired OTP"));
        }

        let user_id = self
            .db
            .create_user(
                &pending.username,
                &pending.email,
                &pending.full_name,
                &pending.password_hash,
            )
            .await?;
        self.db.delete_pending_signup(&email).await?;

        tracing::info!(user_id, email = email.as_str(), "user created");

        let user = self.db.get_user_by_id(user_id).await?;
        self.issue_session(user).await
    }

    pub async fn resend_otp(&self, email: &str) -> Result<(), ApiError> {
        let email = email.to_lowercase();

        if self.db.pending_signup(&email).await?.is_none() {
            return Err(ApiError::validation("No pending signup for this email"));
        }

        let otp = generate_otp();
        let expires_at = utc_in(self.config.otp_ttl_secs);
        self.db.update_pending_otp(&email, &otp, &expires_at).await?;

        dispatch(self.notifier.clone(), Notification::SignupOtp { email, otp });
        Ok(())
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, ApiError> {
        let email = req.email.to_lowercase();

        let user = self
            .db
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

        if !verify_password(&req.password, &user.password_hash) {
            return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
        }

        self.issue_session(user).await
    }

    /// Always answers the same way, whether or not the account exists.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let email = email.to_lowercase();

        if let Some(user) = self.db.find_user_by_email(&email).await? {
            let token = Uuid::now_v7().to_string();
            let expires_at = utc_in(self.config.reset_ttl_secs);
            self.db.create_password_reset(&token, user.id, &expires_at).await?;
            dispatch(
                self.notifier.clone(),
                Notification::PasswordReset { email, token },
            );
        }
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), ApiError> {
        if password.len() < PASSWORD_MIN {
            return Err(ApiError::validation(format!(
                "Password must be at least {} characters long",
                PASSWORD_MIN
            )));
        }

        let user_id = self
            .db
            .take_password_reset(token)
            .await?
            .ok_or_else(|| ApiError::validation("Invalid or expired reset token"))?;

        let password_hash = hash_password(password)?;
        self.db.update_user_password(user_id, &password_hash).await?;
        // Existing sessions are revoked along with the old password.
        self.db.delete_sessions_for_user(user_id).await?;

        tracing::info!(user_id, "password reset");
        Ok(())
    }

    pub async fn update_profile(
        &self,
        caller: &UserRow,
        req: UpdateProfileRequest,
    ) -> Result<UserSummary, ApiError> {
        let full_name = req.full_name.as_deref().unwrap_or(&caller.full_name).trim();
        let username = req.username.as_deref().unwrap_or(&caller.username);
        let email_owned = req
            .email
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| caller.email.clone());

        if full_name.is_empty() {
            return Err(ApiError::validation("Full name is required"));
        }
        models::validate_username(username).map_err(ApiError::validation)?;
        models::validate_email(&email_owned).map_err(ApiError::validation)?;

        self.db
            .update_user_profile(caller.id, full_name, username, &email_owned)
            .await?;

        let user = self.db.get_user_by_id(caller.id).await?;
        Ok(UserSummary::from(user))
    }

    /// Delete the account and everything hanging off it, in one transaction.
    pub async fn delete_account(&self, caller_id: i64) -> Result<(), ApiError> {
        self.db.delete_user_cascade(caller_id).await?;
        tracing::info!(user_id = caller_id, "account deleted");
        Ok(())
    }

    pub async fn search_users(
        &self,
        term: &str,
        caller_id: i64,
    ) -> Result<Vec<UserSummary>, ApiError> {
        if term.len() < 2 {
            return Err(ApiError::validation(
                "Search term must be at least 2 characters long",
            ));
        }
        let rows = self.db.search_users(term, caller_id, 10).await?;
        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    async fn issue_session(&self, user: UserRow) -> Result<AuthResponse, ApiError> {
        let token = Uuid::now_v7().to_string();
        let expires_at = utc_in(self.config.session_ttl_secs);
        self.db.create_session(&token, user.id, &expires_at).await?;

        Ok(AuthResponse {
            token,
            user: UserSummary::from(user),
        })
    }
}

// ========== Helpers ==========

fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// UTC timestamps in SQLite's `datetime('now')` format, so expiries compare
/// lexically against it.
fn utc_now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn utc_in(secs: i64) -> String {
    (chrono::Utc::now() + chrono::Duration::seconds(secs))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..64 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn expiry_strings_compare_lexically() {
        assert!(utc_in(60) > utc_now());
        assert!(utc_in(-60) < utc_now());
    }
}
