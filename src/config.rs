use axum::http::StatusCode;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use validator::Validate;

use crate::error::{ThrottlerError, ThrottlerResult};
use crate::middleware::DenyPolicy;
use crate::options::{ThrottleOptions, DEFAULT_DURATION_SECS, DEFAULT_GC_INTERVAL_SECS};
use crate::store::Storage;

/// Service configuration, read from flags or the environment.
#[derive(Debug, Clone, Parser, Validate)]
#[command(name = "keyed-throttle", version, about)]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_address: SocketAddr,

    /// Default cooldown in seconds
    #[arg(long, env = "THROTTLE_DURATION", default_value_t = DEFAULT_DURATION_SECS)]
    pub duration: u64,

    /// Seconds between sweeps of expired records, 0 disables sweeping
    #[arg(long, env = "GC_INTERVAL", default_value_t = DEFAULT_GC_INTERVAL_SECS)]
    pub gc_interval: u64,

    /// Status code for throttled requests
    #[arg(long, env = "DENY_STATUS", default_value_t = 429)]
    #[validate(range(min = 100, max = 599))]
    pub deny_status: u16,

    /// Message for throttled requests, defaults to the status reason phrase
    #[arg(long, env = "DENY_MESSAGE")]
    pub deny_message: Option<String>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    #[validate(length(min = 1))]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            duration: DEFAULT_DURATION_SECS,
            gc_interval: DEFAULT_GC_INTERVAL_SECS,
            deny_status: 429,
            deny_message: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parse flags and environment variables, then validate.
    pub fn load() -> ThrottlerResult<Self> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    /// Throttle options over `storage` with this configuration's timings.
    pub fn throttle_options(&self, storage: Arc<Storage>) -> ThrottleOptions {
        ThrottleOptions::new()
            .duration(self.duration)
            .gc_interval(self.gc_interval)
            .storage(storage)
    }

    pub fn deny_policy(&self) -> ThrottlerResult<DenyPolicy> {
        let code = StatusCode::from_u16(self.deny_status).map_err(|e| {
            ThrottlerError::Validation(format!("Invalid deny status {}: {}", self.deny_status, e))
        })?;

        Ok(match &self.deny_message {
            Some(message) => DenyPolicy::Status {
                code,
                message: message.clone(),
            },
            None => DenyPolicy::status(code),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let config = Config::try_parse_from([
            "keyed-throttle",
            "--bind-address",
            "0.0.0.0:8080",
            "--duration",
            "2",
            "--gc-interval",
            "0",
            "--deny-message",
            "Slow down",
        ])
        .unwrap();

        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(config.duration, 2);
        assert_eq!(config.gc_interval, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deny_status_out_of_range() {
        let config = Config {
            deny_status: 700,
            ..Default::default()
        };
        let err: ThrottlerError = config.validate().unwrap_err().into();
        assert!(matches!(err, ThrottlerError::Validation(_)));
    }

    #[test]
    fn test_default_deny_policy() {
        match Config::default().deny_policy().unwrap() {
            DenyPolicy::Status { code, message } => {
                assert_eq!(code, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(message, "Too Many Requests");
            }
            DenyPolicy::Handler(_) => panic!("expected status policy"),
        }
    }

    #[test]
    fn test_custom_deny_message() {
        let config = Config {
            deny_status: 503,
            deny_message: Some("Busy".to_string()),
            ..Default::default()
        };
        match config.deny_policy().unwrap() {
            DenyPolicy::Status { code, message } => {
                assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(message, "Busy");
            }
            DenyPolicy::Handler(_) => panic!("expected status policy"),
        }
    }

    #[test]
    fn test_throttle_options_share_storage() {
        let storage = Storage::memory();
        let options = Config::default().throttle_options(storage.clone());
        assert_eq!(options.duration, 5);
        assert!(Arc::ptr_eq(&options.storage, &storage));
    }
}
