//! One data-service connection.
//!
//! A connection is used by one caller at a time: each request is written,
//! then frames are read until the response with the matching opaque arrives.
//! Every exchange is bounded by the KV timeout.

use super::options::ClusterOptions;
use crate::auth;
use crate::models::{LookupInResult, LookupInSpec};
use crate::protocol::subdoc::{decode_lookup_fields, encode_lookup_specs};
use crate::protocol::{
    Feature, Opcode, Request, Response, Status, collection_id_request, hello_request,
    parse_collection_id, parse_features,
};
use crate::security::NodeAddress;
use crate::security::tls::server_name;
use crate::{KvPeekError, Result};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::ClientConfig;

trait KvStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> KvStream for T {}

/// An authenticated connection to one node.
pub(crate) struct KvConnection {
    address: NodeAddress,
    stream: Box<dyn KvStream>,
    read_buf: BytesMut,
    next_opaque: u32,
    kv_timeout: Duration,
    features: Vec<Feature>,
    tls: bool,
}

impl std::fmt::Debug for KvConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvConnection")
            .field("address", &self.address)
            .field("tls", &self.tls)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl KvConnection {
    /// Opens, negotiates and authenticates a connection within the
    /// configured connect timeout.
    pub(crate) async fn connect(
        address: &NodeAddress,
        options: &ClusterOptions,
        tls: Option<&Arc<ClientConfig>>,
    ) -> Result<Self> {
        let connect_timeout = options.timeouts.connect_timeout;
        tokio::time::timeout(connect_timeout, async {
            let mut conn = Self::open(address, options, tls).await?;
            conn.hello(&options.user_agent).await?;
            let tls = conn.tls;
            let mechanism = auth::authenticate(&mut conn, &options.credentials, tls).await?;
            tracing::debug!(
                "Connected to {} as {} ({})",
                address,
                options.credentials.username(),
                mechanism.name()
            );
            Ok(conn)
        })
        .await
        .map_err(|_| KvPeekError::timeout(format!("Connect to {}", address), connect_timeout))?
    }

    async fn open(
        address: &NodeAddress,
        options: &ClusterOptions,
        tls: Option<&Arc<ClientConfig>>,
    ) -> Result<Self> {
        tracing::debug!("Opening connection to {}", address);
        let tcp = TcpStream::connect((address.host.as_str(), address.port))
            .await
            .map_err(|e| KvPeekError::connection_failed(format!("Failed to connect to {}", address), e))?;
        tcp.set_nodelay(true)
            .map_err(|e| KvPeekError::connection_failed(format!("Failed to configure socket for {}", address), e))?;

        let stream: Box<dyn KvStream> = match tls {
            Some(config) => {
                if !options.security.verifies_certificates() {
                    tracing::warn!(
                        "TLS certificate verification is disabled for {}; the server identity is not checked",
                        address
                    );
                }
                let connector = TlsConnector::from(Arc::clone(config));
                let tls_stream = connector
                    .connect(server_name(&address.host)?, tcp)
                    .await
                    .map_err(|e| KvPeekError::tls(format!("TLS handshake with {} failed", address), e))?;
                Box::new(tls_stream)
            }
            None => Box::new(tcp),
        };

        Ok(Self {
            address: address.clone(),
            stream,
            read_buf: BytesMut::with_capacity(8 * 1024),
            next_opaque: 1,
            kv_timeout: options.timeouts.kv_timeout,
            features: Vec::new(),
            tls: tls.is_some(),
        })
    }

    pub(crate) fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub(crate) fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Sends one request and waits for its response.
    pub(crate) async fn execute(&mut self, mut request: Request) -> Result<Response> {
        let opaque = self.next_opaque;
        self.next_opaque = self.next_opaque.wrapping_add(1);
        request.opaque = opaque;

        let kv_timeout = self.kv_timeout;
        let opcode = request.opcode;
        tokio::time::timeout(kv_timeout, self.round_trip(request))
            .await
            .map_err(|_| KvPeekError::timeout(format!("{} on {}", opcode, self.address), kv_timeout))?
    }

    async fn round_trip(&mut self, request: Request) -> Result<Response> {
        let mut out = BytesMut::new();
        request.encode(&mut out)?;
        tracing::trace!(
            "-> {} {} opaque={} vb={} key={}B value={}B",
            self.address,
            request.opcode,
            request.opaque,
            request.vbucket,
            request.key.len(),
            request.value.len()
        );

        self.stream
            .write_all(&out)
            .await
            .map_err(|e| KvPeekError::connection_failed(format!("Write to {} failed", self.address), e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| KvPeekError::connection_failed(format!("Write to {} failed", self.address), e))?;

        loop {
            if let Some(response) = Response::decode(&mut self.read_buf)? {
                tracing::trace!(
                    "<- {} {} opaque={} status={} value={}B",
                    self.address,
                    response.opcode,
                    response.opaque,
                    response.status,
                    response.value.len()
                );
                if response.opaque == request.opaque {
                    return Ok(response);
                }
                tracing::debug!(
                    "Discarding response with stale opaque {} from {}",
                    response.opaque,
                    self.address
                );
                continue;
            }

            let read = self
                .stream
                .read_buf(&mut self.read_buf)
                .await
                .map_err(|e| KvPeekError::connection_failed(format!("Read from {} failed", self.address), e))?;
            if read == 0 {
                return Err(KvPeekError::connection_failed(
                    format!("Read from {} failed", self.address),
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    ),
                ));
            }
        }
    }

    async fn hello(&mut self, user_agent: &str) -> Result<()> {
        let response = self
            .execute(hello_request(user_agent, &Feature::REQUESTED))
            .await?;
        if !response.status.is_success() {
            return Err(response.into_error("HELLO"));
        }
        self.features = parse_features(response.value)?;
        tracing::debug!("{} negotiated features {:?}", self.address, self.features);

        if !self.has_feature(Feature::Xattr) {
            return Err(KvPeekError::unsupported(format!(
                "{} does not support extended attributes",
                self.address
            )));
        }
        Ok(())
    }

    pub(crate) async fn select_bucket(&mut self, bucket: &str) -> Result<()> {
        let response = self
            .execute(Request::new(Opcode::SelectBucket).with_key(Bytes::copy_from_slice(bucket.as_bytes())))
            .await?;
        if !response.status.is_success() {
            return Err(response.into_error(format!("SELECT_BUCKET {}", bucket)));
        }
        tracing::debug!("Selected bucket {} on {}", bucket, self.address);
        Ok(())
    }

    /// Fetches the selected bucket's configuration JSON.
    pub(crate) async fn cluster_config(&mut self) -> Result<Bytes> {
        let response = self.execute(Request::new(Opcode::GetClusterConfig)).await?;
        if !response.status.is_success() {
            return Err(response.into_error("GET_CLUSTER_CONFIG"));
        }
        Ok(response.value)
    }

    pub(crate) async fn collection_id(&mut self, scope: &str, collection: &str) -> Result<u32> {
        let response = self
            .execute(collection_id_request(scope, collection))
            .await?;
        if !response.status.is_success() {
            return Err(response.into_error(format!("GET_COLLECTION_ID {}.{}", scope, collection)));
        }
        let (manifest_uid, cid) = parse_collection_id(response.extras)?;
        tracing::debug!(
            "Collection {}.{} has id {:#x} (manifest {:#x})",
            scope,
            collection,
            cid,
            manifest_uid
        );
        Ok(cid)
    }

    /// Runs one multi-path lookup against `key` in `vbucket`.
    pub(crate) async fn lookup_in(
        &mut self,
        vbucket: u16,
        key: Bytes,
        id: &str,
        specs: &[LookupInSpec],
    ) -> Result<LookupInResult> {
        let request = Request::new(Opcode::SubdocMultiLookup)
            .with_vbucket(vbucket)
            .with_key(key)
            .with_value(encode_lookup_specs(specs)?);
        let response = self.execute(request).await?;

        match response.status {
            Status::KeyNotFound => Err(KvPeekError::DocumentNotFound { id: id.to_string() }),
            status if status.has_lookup_body() => {
                let deleted = matches!(
                    status,
                    Status::SubdocSuccessDeleted | Status::SubdocMultiPathFailureDeleted
                );
                let fields = decode_lookup_fields(response.value)?;
                Ok(LookupInResult::new(specs, fields, response.cas)?.with_deleted(deleted))
            }
            _ => Err(response.into_error(format!("SUBDOC_MULTI_LOOKUP {}", id))),
        }
    }
}
