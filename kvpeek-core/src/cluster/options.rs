//! Cluster connection options.
//!
//! Options hold credentials, so they implement `Display` without them and
//! are never serialized.

use crate::security::{Credentials, SecurityConfig};
use crate::{KvPeekError, Result};
use std::time::Duration;

/// Default bound for `Cluster::wait_until_ready`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for a single key-value round trip.
pub const DEFAULT_KV_TIMEOUT: Duration = Duration::from_millis(2500);

/// Operation time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect, TLS handshake and bootstrap of one node
    pub connect_timeout: Duration,
    /// One request/response exchange
    pub kv_timeout: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            kv_timeout: DEFAULT_KV_TIMEOUT,
        }
    }
}

/// Options for [`super::Cluster::connect`].
///
/// # Example
/// ```rust
/// use kvpeek_core::cluster::ClusterOptions;
/// use kvpeek_core::security::SecurityConfig;
/// use std::time::Duration;
///
/// let options = ClusterOptions::new("Administrator", "password")
///     .with_kv_timeout(Duration::from_secs(5))
///     .with_security(SecurityConfig::insecure());
///
/// assert!(options.validate().is_ok());
/// assert!(!options.to_string().contains("password"));
/// ```
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub credentials: Credentials,
    pub timeouts: Timeouts,
    pub security: SecurityConfig,
    /// Sent in HELLO; shows up in the server's connection list
    pub user_agent: String,
}

impl ClusterOptions {
    /// Creates options with default timeouts and certificate verification
    /// disabled.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(username.into(), password.into()),
            timeouts: Timeouts::default(),
            security: SecurityConfig::insecure(),
            user_agent: format!("kvpeek/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect_timeout = timeout;
        self
    }

    pub fn with_kv_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.kv_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validates option values.
    ///
    /// # Errors
    /// Returns a configuration error if the username is empty, a timeout is
    /// zero, or the user agent does not fit in a HELLO key.
    pub fn validate(&self) -> Result<()> {
        if self.credentials.username().is_empty() {
            return Err(KvPeekError::configuration("username cannot be empty"));
        }

        if self.timeouts.connect_timeout.is_zero() {
            return Err(KvPeekError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.timeouts.kv_timeout.is_zero() {
            return Err(KvPeekError::configuration(
                "kv_timeout must be greater than 0",
            ));
        }

        if self.user_agent.len() > 250 {
            return Err(KvPeekError::configuration(
                "user_agent must not exceed 250 bytes",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for ClusterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ClusterOptions(user={}, connect_timeout={}ms, kv_timeout={}ms, verify_certs={})",
            self.credentials.username(),
            self.timeouts.connect_timeout.as_millis(),
            self.timeouts.kv_timeout.as_millis(),
            self.security.verifies_certificates()
        )
    }
}
