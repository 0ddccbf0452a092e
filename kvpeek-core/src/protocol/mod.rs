//! Binary key-value protocol spoken by the cluster's data service.
//!
//! # Module Structure
//! - `opcode`: magic bytes, opcodes, HELLO features, datatype bits
//! - `status`: response status codes
//! - `packet`: request/response framing with incremental decoding
//! - `key`: collection-prefixed keys and vBucket hashing
//! - `subdoc`: multi-path lookup bodies

pub mod key;
pub mod opcode;
pub mod packet;
pub mod status;
pub mod subdoc;

pub use key::{collection_key, vbucket_for_key};
pub use opcode::{DATATYPE_JSON, Feature, Magic, Opcode};
pub use packet::{HEADER_LEN, Request, Response};
pub use status::Status;

use crate::{KvPeekError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Default data-service port without TLS.
pub const DEFAULT_KV_PORT: u16 = 11210;

/// Default data-service port with TLS.
pub const DEFAULT_KV_TLS_PORT: u16 = 11207;

/// Builds a HELLO request announcing `user_agent` and the requested features.
pub fn hello_request(user_agent: &str, features: &[Feature]) -> Request {
    let mut value = BytesMut::with_capacity(features.len() * 2);
    for feature in features {
        value.put_u16(feature.code());
    }
    Request::new(Opcode::Hello)
        .with_key(Bytes::copy_from_slice(user_agent.as_bytes()))
        .with_value(value.freeze())
}

/// Parses the feature list of a HELLO response (or request).
pub fn parse_features(mut value: Bytes) -> Result<Vec<Feature>> {
    if value.len() % 2 != 0 {
        return Err(KvPeekError::protocol(format!(
            "HELLO feature list has odd length {}",
            value.len()
        )));
    }
    let mut features = Vec::with_capacity(value.len() / 2);
    while value.has_remaining() {
        features.push(Feature::from(value.get_u16()));
    }
    Ok(features)
}

/// Builds a GET_COLLECTION_ID request for `scope.collection`.
pub fn collection_id_request(scope: &str, collection: &str) -> Request {
    Request::new(Opcode::GetCollectionId)
        .with_value(Bytes::from(format!("{}.{}", scope, collection)))
}

/// Extracts `(manifest_uid, collection_id)` from GET_COLLECTION_ID extras.
pub fn parse_collection_id(mut extras: Bytes) -> Result<(u64, u32)> {
    if extras.len() != 12 {
        return Err(KvPeekError::protocol(format!(
            "GET_COLLECTION_ID returned {} bytes of extras, expected 12",
            extras.len()
        )));
    }
    Ok((extras.get_u64(), extras.get_u32()))
}
