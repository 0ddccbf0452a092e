//! Connection string parsing.
//!
//! Accepted forms:
//! - `host`, `host:port`, `[v6addr]:port`
//! - `couchbase://h1,h2:11210` (plain data-service connections)
//! - `couchbases://h1,h2` (TLS data-service connections)
//!
//! Any `user:password@` section is stripped and ignored; credentials are
//! always supplied separately.

use crate::protocol::{DEFAULT_KV_PORT, DEFAULT_KV_TLS_PORT};
use crate::{KvPeekError, Result};

/// Transport selected by the connection string scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `couchbase://` or no scheme
    Couchbase,
    /// `couchbases://`
    Couchbases,
}

impl Scheme {
    pub fn uses_tls(self) -> bool {
        self == Self::Couchbases
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Couchbase => DEFAULT_KV_PORT,
            Self::Couchbases => DEFAULT_KV_TLS_PORT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Couchbase => "couchbase",
            Self::Couchbases => "couchbases",
        }
    }
}

/// A data-service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port` or `[v6]:port`, using `default_port` when
    /// no port is given.
    pub fn parse(input: &str, default_port: u16) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(KvPeekError::configuration("Empty host in connection string"));
        }

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(|| {
                KvPeekError::configuration(format!("Unterminated IPv6 address: {}", input))
            })?;
            let port = match after.strip_prefix(':') {
                Some(port) => Some(port),
                None if after.is_empty() => None,
                None => {
                    return Err(KvPeekError::configuration(format!(
                        "Unexpected characters after IPv6 address: {}",
                        input
                    )));
                }
            };
            (host, port)
        } else if input.matches(':').count() > 1 {
            // Bare IPv6 literal without brackets cannot carry a port.
            (input, None)
        } else {
            match input.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            }
        };

        if host.is_empty() {
            return Err(KvPeekError::configuration(format!(
                "Missing host in connection string entry: {}",
                input
            )));
        }

        let port = match port {
            Some(port) => {
                let port = port.parse::<u16>().map_err(|_| {
                    KvPeekError::configuration(format!("Invalid port number: {}", port))
                })?;
                if port == 0 {
                    return Err(KvPeekError::configuration(
                        "Invalid port number: must be greater than 0",
                    ));
                }
                port
            }
            None => default_port,
        };

        Ok(Self::new(host, port))
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parsed connection string with credentials removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub scheme: Scheme,
    pub seeds: Vec<NodeAddress>,
    /// `?key=value` options; parsed and echoed, never acted on
    pub query_params: Vec<(String, String)>,
}

impl ConnectionString {
    /// Parses a connection string.
    ///
    /// # Example
    /// ```rust
    /// use kvpeek_core::security::{ConnectionString, Scheme};
    ///
    /// let cs = ConnectionString::parse("couchbases://cb1.local,cb2.local:18000")?;
    /// assert_eq!(cs.scheme, Scheme::Couchbases);
    /// assert_eq!(cs.seeds[0].port, 11207);
    /// assert_eq!(cs.seeds[1].port, 18000);
    /// # Ok::<(), kvpeek_core::KvPeekError>(())
    /// ```
    pub fn parse(connection_string: &str) -> Result<Self> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(KvPeekError::configuration("Connection string is empty"));
        }

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = match scheme.to_ascii_lowercase().as_str() {
                    "couchbase" => Scheme::Couchbase,
                    "couchbases" => Scheme::Couchbases,
                    _ => {
                        return Err(KvPeekError::configuration(
                            "Connection string must use couchbase:// or couchbases:// scheme",
                        ));
                    }
                };
                (scheme, rest)
            }
            None => (Scheme::Couchbase, trimmed),
        };

        let rest = match rest.rsplit_once('@') {
            Some((_, hosts)) => {
                tracing::warn!("Ignoring credentials embedded in the connection string");
                hosts
            }
            None => rest,
        };

        let (rest, query) = match rest.split_once('?') {
            Some((hosts, query)) => (hosts, Some(query)),
            None => (rest, None),
        };

        let hosts = match rest.split_once('/') {
            Some((hosts, path)) => {
                if !path.is_empty() {
                    tracing::debug!("Ignoring path '{}' in connection string", path);
                }
                hosts
            }
            None => rest,
        };

        let seeds = hosts
            .split([',', ';'])
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|h| NodeAddress::parse(h, scheme.default_port()))
            .collect::<Result<Vec<_>>>()?;

        if seeds.is_empty() {
            return Err(KvPeekError::configuration(
                "Connection string must specify at least one host",
            ));
        }

        let query_params: Vec<(String, String)> = query
            .map(|q| {
                q.split('&')
                    .filter(|p| !p.is_empty())
                    .map(|p| match p.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (p.to_string(), String::new()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !query_params.is_empty() {
            let keys: Vec<&str> = query_params.iter().map(|(k, _)| k.as_str()).collect();
            tracing::warn!(
                "Ignoring unsupported connection string options: {}",
                keys.join(", ")
            );
        }

        Ok(Self {
            scheme,
            seeds,
            query_params,
        })
    }

    pub fn uses_tls(&self) -> bool {
        self.scheme.uses_tls()
    }

    /// Reconstructs the connection string without credentials.
    pub fn to_safe_string(&self) -> String {
        let hosts: Vec<String> = self.seeds.iter().map(ToString::to_string).collect();
        let mut url = format!("{}://{}", self.scheme.as_str(), hosts.join(","));

        if !self.query_params.is_empty() {
            url.push('?');
            let params: Vec<String> = self
                .query_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            url.push_str(&params.join("&"));
        }

        url
    }
}
