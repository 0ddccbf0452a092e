//! Cluster bootstrap, bucket selection and collection handles.
//!
//! # Lifecycle
//! 1. [`Cluster::connect`] parses the connection string and validates options
//! 2. [`Cluster::wait_until_ready`] opens and authenticates a connection to
//!    the first reachable seed
//! 3. [`Cluster::bucket`] selects the bucket on that connection and loads its
//!    vBucket map
//! 4. [`Bucket::scope`] / [`Scope::collection`] name a collection; its id is
//!    resolved on first use
//!
//! Connections to the other nodes of the bucket are opened on demand and
//! kept until the [`Bucket`] is dropped.
//!
//! # Example
//! ```rust,no_run
//! use kvpeek_core::cluster::{Cluster, ClusterOptions};
//! use kvpeek_core::models::LookupInSpec;
//! use kvpeek_core::reader::DocumentReader;
//! use std::time::Duration;
//!
//! # async fn example() -> kvpeek_core::Result<()> {
//! let mut cluster = Cluster::connect("couchbase://127.0.0.1", ClusterOptions::new("Administrator", "password"))?;
//! cluster.wait_until_ready(Duration::from_secs(30)).await?;
//! let bucket = cluster.bucket("travel-sample").await?;
//! let collection = bucket.scope("inventory").collection("airline");
//! let result = collection.lookup_in("airline_10", &[LookupInSpec::get("")]).await?;
//! println!("{} bytes", result.content_as_bytes(0)?.len());
//! # Ok(())
//! # }
//! ```

pub(crate) mod connection;
mod options;
mod topology;

pub use options::{ClusterOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_KV_TIMEOUT, Timeouts};
pub use topology::BucketTopology;

use crate::models::{LookupInResult, LookupInSpec};
use crate::protocol::{Feature, collection_key};
use crate::reader::DocumentReader;
use crate::security::{ConnectionString, NodeAddress};
use crate::{KvPeekError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use connection::KvConnection;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio_rustls::rustls::ClientConfig;

/// Name of the default scope and of the default collection.
pub const DEFAULT_NAME: &str = "_default";

/// A handle to a cluster reached through a connection string.
pub struct Cluster {
    connection_string: ConnectionString,
    options: ClusterOptions,
    tls_config: Option<Arc<ClientConfig>>,
    bootstrap: Option<KvConnection>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("connection_string", &self.connection_string.to_safe_string())
            .field("options", &self.options.to_string())
            .field("bootstrapped", &self.bootstrap.is_some())
            .finish()
    }
}

impl Cluster {
    /// Prepares a cluster handle. No network traffic happens until
    /// [`Cluster::wait_until_ready`] or [`Cluster::bucket`] is called.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid connection string or
    /// options, and a TLS error when the CA bundle cannot be loaded.
    pub fn connect(connection_string: &str, options: ClusterOptions) -> Result<Self> {
        options.validate()?;
        let connection_string = ConnectionString::parse(connection_string)?;
        let tls_config = if connection_string.uses_tls() {
            Some(options.security.client_config()?)
        } else {
            if options.security.verifies_certificates() {
                tracing::warn!(
                    "CA file ignored: {} is not a TLS connection string, use couchbases:// to verify the cluster",
                    connection_string.to_safe_string()
                );
            }
            None
        };

        tracing::debug!(
            "Cluster handle for {} with {}",
            connection_string.to_safe_string(),
            options
        );

        Ok(Self {
            connection_string,
            options,
            tls_config,
            bootstrap: None,
        })
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    /// Bootstraps against the seed nodes, in order, within `timeout`.
    ///
    /// # Errors
    /// Returns [`KvPeekError::Timeout`] when no seed could be bootstrapped in
    /// time, an authentication error as soon as any seed rejects the
    /// credentials, or the last seed's error when all seeds fail.
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> Result<()> {
        if self.bootstrap.is_some() {
            return Ok(());
        }
        let conn = tokio::time::timeout(timeout, self.bootstrap_any())
            .await
            .map_err(|_| KvPeekError::timeout("wait_until_ready", timeout))??;
        self.bootstrap = Some(conn);
        Ok(())
    }

    async fn bootstrap_any(&self) -> Result<KvConnection> {
        let mut last_error = None;
        for seed in &self.connection_string.seeds {
            match KvConnection::connect(seed, &self.options, self.tls_config.as_ref()).await {
                Ok(conn) => return Ok(conn),
                Err(e @ KvPeekError::Authentication { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!("Failed to bootstrap from {}: {}", seed, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            KvPeekError::configuration("Connection string has no seed nodes")
        }))
    }

    /// Opens a bucket: selects it and loads its vBucket map.
    ///
    /// Bootstraps first (bounded by the connect timeout) when
    /// [`Cluster::wait_until_ready`] has not been called.
    pub async fn bucket(&mut self, name: &str) -> Result<Bucket> {
        if name.is_empty() {
            return Err(KvPeekError::configuration("bucket name cannot be empty"));
        }
        let mut conn = match self.bootstrap.take() {
            Some(conn) => conn,
            None => self.bootstrap_any().await?,
        };

        conn.select_bucket(name).await?;
        let config = conn.cluster_config().await?;
        let topology = BucketTopology::parse(&config, conn.address(), self.tls_config.is_some())?;
        tracing::debug!(
            "Bucket {} config rev {:?}: {} vBuckets on {} nodes",
            name,
            topology.rev,
            topology.num_vbuckets(),
            topology.nodes().len()
        );

        let bootstrap_node = topology
            .this_node()
            .cloned()
            .unwrap_or_else(|| conn.address().clone());
        let mut connections = HashMap::new();
        connections.insert(bootstrap_node.clone(), conn);

        Ok(Bucket {
            name: name.to_string(),
            topology,
            options: self.options.clone(),
            tls_config: self.tls_config.clone(),
            bootstrap_node,
            connections: Mutex::new(connections),
        })
    }
}

/// An opened bucket.
pub struct Bucket {
    name: String,
    topology: BucketTopology,
    options: ClusterOptions,
    tls_config: Option<Arc<ClientConfig>>,
    bootstrap_node: NodeAddress,
    connections: Mutex<HashMap<NodeAddress, KvConnection>>,
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> &BucketTopology {
        &self.topology
    }

    pub fn scope(&self, name: impl Into<String>) -> Scope<'_> {
        Scope {
            bucket: self,
            name: name.into(),
        }
    }

    /// The default collection of the default scope.
    pub fn default_collection(&self) -> Collection<'_> {
        self.scope(DEFAULT_NAME).collection(DEFAULT_NAME)
    }

    /// Returns the connection to `node`, opening it on first use.
    async fn connection<'m>(
        &self,
        connections: &'m mut HashMap<NodeAddress, KvConnection>,
        node: &NodeAddress,
    ) -> Result<&'m mut KvConnection> {
        match connections.entry(node.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut conn =
                    KvConnection::connect(node, &self.options, self.tls_config.as_ref()).await?;
                conn.select_bucket(&self.name).await?;
                Ok(entry.insert(conn))
            }
        }
    }

    async fn collection_id(&self, scope: &str, collection: &str) -> Result<u32> {
        let mut connections = self.connections.lock().await;
        let conn = self.connection(&mut connections, &self.bootstrap_node).await?;
        if !conn.has_feature(Feature::Collections) {
            return Err(KvPeekError::unsupported(format!(
                "collection {}.{} requested but {} does not support collections",
                scope,
                collection,
                conn.address()
            )));
        }
        conn.collection_id(scope, collection).await
    }

    async fn lookup_in(
        &self,
        collection_id: u32,
        id: &str,
        specs: &[LookupInSpec],
    ) -> Result<LookupInResult> {
        let (vbucket, node) = self.topology.route(id.as_bytes())?;
        let mut connections = self.connections.lock().await;
        let conn = self.connection(&mut connections, node).await?;

        let key = if conn.has_feature(Feature::Collections) {
            collection_key(collection_id, id)
        } else if collection_id == 0 {
            Bytes::copy_from_slice(id.as_bytes())
        } else {
            return Err(KvPeekError::unsupported(format!(
                "{} does not support collections",
                conn.address()
            )));
        };

        tracing::trace!("Lookup {} on vBucket {} at {}", id, vbucket, node);
        conn.lookup_in(vbucket, key, id, specs).await
    }
}

/// A named scope of a bucket.
#[derive(Debug)]
pub struct Scope<'a> {
    bucket: &'a Bucket,
    name: String,
}

impl<'a> Scope<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection<'a> {
        Collection {
            bucket: self.bucket,
            scope: self.name.clone(),
            name: name.into(),
            id: OnceCell::new(),
        }
    }
}

/// A collection handle. The collection id is looked up once, on first use.
#[derive(Debug)]
pub struct Collection<'a> {
    bucket: &'a Bucket,
    scope: String,
    name: String,
    id: OnceCell<u32>,
}

impl Collection<'_> {
    pub fn scope_name(&self) -> &str {
        &self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the numeric collection id.
    ///
    /// # Errors
    /// Returns a status error when the scope or collection does not exist.
    pub async fn id(&self) -> Result<u32> {
        self.id
            .get_or_try_init(|| async {
                if self.scope == DEFAULT_NAME && self.name == DEFAULT_NAME {
                    return Ok(0);
                }
                self.bucket.collection_id(&self.scope, &self.name).await
            })
            .await
            .copied()
    }
}

#[async_trait]
impl DocumentReader for Collection<'_> {
    async fn lookup_in(&self, id: &str, specs: &[LookupInSpec]) -> Result<LookupInResult> {
        if id.is_empty() {
            return Err(KvPeekError::configuration("document id cannot be empty"));
        }
        if id.len() > 250 {
            return Err(KvPeekError::configuration(
                "document id must not exceed 250 bytes",
            ));
        }
        let collection_id = self.id().await?;
        self.bucket.lookup_in(collection_id, id, specs).await
    }
}
