//! Configuration for Wellspring
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

use crate::auth::JwtValidator;
use crate::types::WellspringError;

const DEV_SECRET: &str = "dev-only-insecure-secret-do-not-deploy";
const MIN_SECRET_LEN: usize = 32;

/// Wellspring - employee assistance counseling platform
#[derive(Parser, Debug, Clone)]
#[command(name = "wellspring")]
#[command(about = "Employee assistance counseling platform API")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Port override for the listen address
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// MongoDB connection URI. Unset runs the in-memory demo store.
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "wellspring")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required unless dev mode)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token lifetime in seconds (7 days)
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "604800")]
    pub jwt_expiry_seconds: u64,

    /// Enable development mode (insecure default secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Platform per-session counselor rate in won
    #[arg(long, env = "SYSTEM_COUNSELOR_RATE", default_value = "50000")]
    pub system_counselor_rate: i64,

    /// Serve super-admin dashboard reads through the TTL cache
    #[arg(long, env = "DASHBOARD_CACHE", default_value = "true", action = clap::ArgAction::Set)]
    pub dashboard_cache: bool,
}

impl Args {
    /// Effective socket address, with `PORT` taking precedence
    pub fn listen_addr(&self) -> SocketAddr {
        match self.port {
            Some(port) => SocketAddr::new(self.listen.ip(), port),
            None => self.listen,
        }
    }

    /// Token validator for the configured secret
    pub fn jwt_validator(&self) -> Result<JwtValidator, WellspringError> {
        let secret = match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => secret.clone(),
            (None, true) => DEV_SECRET.to_string(),
            (None, false) => {
                return Err(WellspringError::Config(
                    "JWT_SECRET is required in production mode".into(),
                ))
            }
        };
        JwtValidator::new(secret, self.jwt_expiry_seconds)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                Some(s) if s.len() < MIN_SECRET_LEN => {
                    return Err(format!("JWT_SECRET must be at least {MIN_SECRET_LEN} characters"))
                }
                Some(_) => {}
            }
        }

        if self.jwt_expiry_seconds == 0 {
            return Err("JWT_EXPIRY_SECONDS must be positive".to_string());
        }

        if self.system_counselor_rate < 0 {
            return Err("SYSTEM_COUNSELOR_RATE must not be negative".to_string());
        }

        Ok(())
    }

    /// Defaults for a dev-mode process, used by tests
    pub fn dev() -> Self {
        Self::parse_from(["wellspring", "--dev-mode"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["wellspring"]);
        assert_eq!(args.listen_addr().port(), 5000);
        assert_eq!(args.jwt_expiry_seconds, 604_800);
        assert_eq!(args.system_counselor_rate, 50_000);
        assert!(args.dashboard_cache);
        assert!(args.mongodb_uri.is_none());
    }

    #[test]
    fn test_port_overrides_listen() {
        let args = Args::parse_from(["wellspring", "--port", "8081"]);
        assert_eq!(args.listen_addr().to_string(), "0.0.0.0:8081");
    }

    #[test]
    fn test_secret_required_outside_dev() {
        let args = Args::parse_from(["wellspring"]);
        assert!(args.validate().is_err());
        assert!(args.jwt_validator().is_err());

        let short = Args::parse_from(["wellspring", "--jwt-secret", "short"]);
        assert!(short.validate().unwrap_err().contains("32"));

        assert!(Args::dev().validate().is_ok());
        assert!(Args::dev().jwt_validator().is_ok());
    }

    #[test]
    fn test_cache_can_be_disabled() {
        let args = Args::parse_from(["wellspring", "--dashboard-cache", "false"]);
        assert!(!args.dashboard_cache);
    }
}
