//! Bucket configuration parsing and vBucket routing.
//!
//! The server returns the bucket configuration with the literal `$HOST`
//! standing for the address the client used to reach it; it is replaced
//! with the bootstrap host before any address is parsed.

use crate::protocol::{DEFAULT_KV_TLS_PORT, vbucket_for_key};
use crate::security::NodeAddress;
use crate::{KvPeekError, Result};
use serde::Deserialize;
use std::collections::HashMap;

const HOST_PLACEHOLDER: &str = "$HOST";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBucketConfig {
    name: Option<String>,
    rev: Option<i64>,
    node_locator: Option<String>,
    #[serde(rename = "vBucketServerMap")]
    vbucket_server_map: Option<RawServerMap>,
    #[serde(default)]
    nodes_ext: Vec<RawNodeExt>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerMap {
    server_list: Vec<String>,
    #[serde(rename = "vBucketMap")]
    vbucket_map: Vec<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNodeExt {
    #[serde(default)]
    services: HashMap<String, u16>,
    hostname: Option<String>,
    #[serde(default)]
    this_node: bool,
}

/// Routing table for one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTopology {
    pub name: String,
    pub rev: Option<i64>,
    nodes: Vec<NodeAddress>,
    vbucket_map: Vec<Vec<i32>>,
    this_node: Option<usize>,
}

impl BucketTopology {
    /// Parses a bucket configuration received from `bootstrap`.
    ///
    /// With `tls` set, node addresses use each node's `kvSSL` port.
    ///
    /// # Errors
    /// Returns an error for malformed JSON, for buckets without a vBucket
    /// map (memcached buckets), and for maps that reference unknown nodes.
    pub fn parse(config: &[u8], bootstrap: &NodeAddress, tls: bool) -> Result<Self> {
        let raw: RawBucketConfig = serde_json::from_slice(config)
            .map_err(|e| KvPeekError::serialization("Invalid bucket configuration", e))?;

        let name = raw.name.unwrap_or_default();
        let Some(server_map) = raw.vbucket_server_map else {
            return Err(KvPeekError::unsupported(format!(
                "bucket '{}' has no vBucket map (node locator {})",
                name,
                raw.node_locator.as_deref().unwrap_or("unknown")
            )));
        };
        if server_map.vbucket_map.is_empty() {
            return Err(KvPeekError::protocol(format!(
                "Bucket '{}' configuration has an empty vBucket map",
                name
            )));
        }

        let bootstrap_host = if bootstrap.host.contains(':') {
            format!("[{}]", bootstrap.host)
        } else {
            bootstrap.host.clone()
        };

        let mut nodes = Vec::with_capacity(server_map.server_list.len());
        let mut this_node = None;
        for (index, entry) in server_map.server_list.iter().enumerate() {
            let plain = NodeAddress::parse(
                &entry.replace(HOST_PLACEHOLDER, &bootstrap_host),
                bootstrap.port,
            )?;
            let node_ext = raw.nodes_ext.iter().find(|ext| {
                let host = match ext.hostname.as_deref() {
                    None | Some(HOST_PLACEHOLDER) => bootstrap.host.as_str(),
                    Some(host) => host,
                };
                host == plain.host && ext.services.get("kv") == Some(&plain.port)
            });

            if node_ext.is_some_and(|ext| ext.this_node) {
                this_node = Some(index);
            }

            let address = if tls {
                let port = node_ext
                    .and_then(|ext| ext.services.get("kvSSL").copied())
                    .unwrap_or_else(|| {
                        tracing::debug!(
                            "No kvSSL port advertised for {}, using {}",
                            plain,
                            DEFAULT_KV_TLS_PORT
                        );
                        DEFAULT_KV_TLS_PORT
                    });
                NodeAddress::new(plain.host, port)
            } else {
                plain
            };
            nodes.push(address);
        }

        for (vbucket, chain) in server_map.vbucket_map.iter().enumerate() {
            if let Some(&active) = chain.first()
                && active >= 0
                && active as usize >= nodes.len()
            {
                return Err(KvPeekError::protocol(format!(
                    "vBucket {} maps to node {} but only {} nodes are listed",
                    vbucket,
                    active,
                    nodes.len()
                )));
            }
        }

        Ok(Self {
            name,
            rev: raw.rev,
            nodes,
            vbucket_map: server_map.vbucket_map,
            this_node,
        })
    }

    pub fn num_vbuckets(&self) -> usize {
        self.vbucket_map.len()
    }

    pub fn nodes(&self) -> &[NodeAddress] {
        &self.nodes
    }

    /// The node that served this configuration, when the server marked it.
    pub fn this_node(&self) -> Option<&NodeAddress> {
        self.this_node.and_then(|i| self.nodes.get(i))
    }

    /// Returns the vBucket of `id` and the node where it is active.
    ///
    /// # Errors
    /// Returns an error when the vBucket currently has no active node.
    pub fn route(&self, id: &[u8]) -> Result<(u16, &NodeAddress)> {
        let vbucket = vbucket_for_key(id, self.num_vbuckets());
        let active = self
            .vbucket_map
            .get(vbucket as usize)
            .and_then(|chain| chain.first())
            .copied()
            .unwrap_or(-1);

        let node = usize::try_from(active)
            .ok()
            .and_then(|i| self.nodes.get(i))
            .ok_or_else(|| {
                KvPeekError::protocol(format!("vBucket {} has no active node", vbucket))
            })?;
        Ok((vbucket, node))
    }
}
