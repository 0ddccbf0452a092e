//! Core library for kvpeek.
//!
//! A small, read-only client for a document database's binary key-value
//! service: connection strings, TLS, SASL, bucket topology and multi-path
//! lookups, exposed through the [`reader::DocumentReader`] seam.
//!
//! # Security Guarantees
//! - Passwords are held in zeroizing containers and never logged
//! - Connection strings are stripped of userinfo before display
//! - The only data commands issued are lookups; nothing is ever written
//!
//! # Module Structure
//! - `protocol`: frame codec, opcodes, status codes, lookup bodies
//! - `auth`: SASL PLAIN and SCRAM
//! - `cluster`: bootstrap, bucket topology, collection handles
//! - `models`: lookup specs and results
//! - `security`: credentials, connection strings, TLS configuration

pub mod auth;
pub mod cluster;
pub mod error;
pub mod logging;
pub mod models;
pub mod protocol;
pub mod reader;
pub mod security;

// Re-export commonly used types
pub use cluster::{Bucket, Cluster, ClusterOptions, Collection, Scope};
pub use error::{KvPeekError, Result};
pub use models::{LookupField, LookupInResult, LookupInSpec, VATTR_DOCUMENT, VATTR_XTOC};
pub use reader::DocumentReader;
pub use security::{Credentials, SecurityConfig};
