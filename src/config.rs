//! Configuration Management
//!
//! Application configuration read from environment variables with sensible
//! defaults for local development.
//!
//! ## Configuration Variables
//!
//! - `DATABASE_URL`: Path to SQLite database file (default: `taskhub.db`)
//! - `BIND_ADDRESS`: HTTP server bind address (default: `0.0.0.0:3000`)
//! - `OTP_TTL_SECS`: Lifetime of signup OTPs in seconds (default: `300`)
//! - `RESET_TTL_SECS`: Lifetime of password-reset tokens (default: `3600`)
//! - `SESSION_TTL_SECS`: Lifetime of bearer sessions (default: 7 days)

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub otp_ttl_secs: i64,
    pub reset_ttl_secs: i64,
    pub session_ttl_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "taskhub.db".to_string(),
            bind_address: "0.0.0.0:3000".to_string(),
            otp_ttl_secs: 5 * 60,
            reset_ttl_secs: 60 * 60,
            session_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_address: std::env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            otp_ttl_secs: env_i64("OTP_TTL_SECS", defaults.otp_ttl_secs),
            reset_ttl_secs: env_i64("RESET_TTL_SECS", defaults.reset_ttl_secs),
            session_ttl_secs: env_i64("SESSION_TTL_SECS", defaults.session_ttl_secs),
        }
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
