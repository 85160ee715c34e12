//! Notification Sink
//!
//! Outbound notifications (collaboration invites, signup OTPs, password
//! resets) are fire-and-forget: they are dispatched after the primary write
//! commits, on a spawned task, and a delivery failure is logged and
//! swallowed. Actual delivery (SMTP etc.) lives behind the `Notifier` trait;
//! the default implementation records the event through tracing.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Notification {
    CollaboratorAdded {
        email: String,
        full_name: String,
        project_title: String,
        role: String,
        inviter: String,
    },
    SignupOtp {
        email: String,
        otp: String,
    },
    PasswordReset {
        email: String,
        token: String,
    },
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Notification delivery failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

pub trait Notifier: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Console-style sink: logs every event instead of sending mail. Stands in
/// for the external delivery collaborator.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::CollaboratorAdded {
                email,
                full_name,
                project_title,
                role,
                inviter,
            } => {
                tracing::info!(
                    to = email.as_str(),
                    collaborator = full_name.as_str(),
                    project = project_title.as_str(),
                    role = role.as_str(),
                    inviter = inviter.as_str(),
                    "collaboration notification"
                );
            }
            Notification::SignupOtp { email, otp } => {
                tracing::info!(to = email.as_str(), otp = otp.as_str(), "signup OTP");
            }
            Notification::PasswordReset { email, token } => {
                tracing::info!(
                    to = email.as_str(),
                    token = token.as_str(),
                    "password reset token"
                );
            }
        }
        Ok(())
    }
}

/// Deliver off the request path. Failures never propagate to the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.deliver(&notification) {
            tracing::warn!(error = %e, "notification dropped");
        }
    });
}
