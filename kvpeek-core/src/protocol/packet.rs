//! Frame encoding and incremental decoding.
//!
//! Every frame is a 24-byte header followed by `extras`, `key` and `value`.
//! Decoders take a growing `BytesMut` read buffer and return `Ok(None)` until
//! a whole frame is available; on success the frame's bytes are consumed.

use super::opcode::{DATATYPE_JSON, Magic, Opcode};
use super::status::Status;
use crate::{KvPeekError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Deserialize;

/// Fixed header size for requests and responses.
pub const HEADER_LEN: usize = 24;

/// Largest body the client accepts from a peer (20 MiB document + slack).
pub const MAX_BODY_LEN: usize = 24 * 1024 * 1024;

/// A client request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub opcode: Opcode,
    pub datatype: u8,
    pub vbucket: u16,
    pub opaque: u32,
    pub cas: u64,
    pub extras: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

impl Request {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            datatype: 0,
            vbucket: 0,
            opaque: 0,
            cas: 0,
            extras: Bytes::new(),
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Bytes>) -> Self {
        self.extras = extras.into();
        self
    }

    pub fn with_vbucket(mut self, vbucket: u16) -> Self {
        self.vbucket = vbucket;
        self
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let key_len = u16::try_from(self.key.len())
            .map_err(|_| KvPeekError::protocol(format!("Key too long: {} bytes", self.key.len())))?;
        let extras_len = u8::try_from(self.extras.len()).map_err(|_| {
            KvPeekError::protocol(format!("Extras too long: {} bytes", self.extras.len()))
        })?;
        let body_len = body_len(&[&self.extras, &self.key, &self.value])?;

        dst.reserve(HEADER_LEN + body_len as usize);
        dst.put_u8(Magic::Request as u8);
        dst.put_u8(self.opcode as u8);
        dst.put_u16(key_len);
        dst.put_u8(extras_len);
        dst.put_u8(self.datatype);
        dst.put_u16(self.vbucket);
        dst.put_u32(body_len);
        dst.put_u32(self.opaque);
        dst.put_u64(self.cas);
        dst.put_slice(&self.extras);
        dst.put_slice(&self.key);
        dst.put_slice(&self.value);
        Ok(())
    }

    /// Decodes one request frame. Used by the mock data service in tests.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>> {
        let Some(mut frame) = take_frame(src)? else {
            return Ok(None);
        };

        let magic = Magic::try_from(frame.get_u8())?;
        if magic != Magic::Request {
            return Err(KvPeekError::protocol(format!(
                "Expected request magic, got {:?}",
                magic
            )));
        }
        let opcode = Opcode::try_from(frame.get_u8())?;
        let key_len = frame.get_u16() as usize;
        let extras_len = frame.get_u8() as usize;
        let datatype = frame.get_u8();
        let vbucket = frame.get_u16();
        let body_len = frame.get_u32() as usize;
        let opaque = frame.get_u32();
        let cas = frame.get_u64();

        let (_, extras, key, value) = split_body(frame, body_len, 0, extras_len, key_len)?;

        Ok(Some(Self {
            opcode,
            datatype,
            vbucket,
            opaque,
            cas,
            extras,
            key,
            value,
        }))
    }
}

/// A server response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub opcode: Opcode,
    pub status: Status,
    pub datatype: u8,
    pub opaque: u32,
    pub cas: u64,
    pub framing_extras: Bytes,
    pub extras: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    context: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

impl Response {
    pub fn new(opcode: Opcode, status: Status) -> Self {
        Self {
            opcode,
            status,
            datatype: 0,
            opaque: 0,
            cas: 0,
            framing_extras: Bytes::new(),
            extras: Bytes::new(),
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    /// Creates a response answering `request`, echoing its opaque.
    pub fn reply_to(request: &Request, status: Status) -> Self {
        let mut response = Self::new(request.opcode, status);
        response.opaque = request.opaque;
        response
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Bytes>) -> Self {
        self.extras = extras.into();
        self
    }

    pub fn with_datatype(mut self, datatype: u8) -> Self {
        self.datatype = datatype;
        self
    }

    /// Encodes the response. Flexible framing is used when framing extras
    /// are present.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let body_len = body_len(&[
            &self.framing_extras,
            &self.extras,
            &self.key,
            &self.value,
        ])?;
        let extras_len = u8::try_from(self.extras.len())
            .map_err(|_| KvPeekError::protocol("Extras too long"))?;

        dst.reserve(HEADER_LEN + body_len as usize);
        if self.framing_extras.is_empty() {
            let key_len = u16::try_from(self.key.len())
                .map_err(|_| KvPeekError::protocol("Key too long"))?;
            dst.put_u8(Magic::Response as u8);
            dst.put_u8(self.opcode as u8);
            dst.put_u16(key_len);
        } else {
            let framing_len = u8::try_from(self.framing_extras.len())
                .map_err(|_| KvPeekError::protocol("Framing extras too long"))?;
            let key_len = u8::try_from(self.key.len())
                .map_err(|_| KvPeekError::protocol("Key too long for flexible framing"))?;
            dst.put_u8(Magic::AltResponse as u8);
            dst.put_u8(self.opcode as u8);
            dst.put_u8(framing_len);
            dst.put_u8(key_len);
        }
        dst.put_u8(extras_len);
        dst.put_u8(self.datatype);
        dst.put_u16(self.status.code());
        dst.put_u32(body_len);
        dst.put_u32(self.opaque);
        dst.put_u64(self.cas);
        dst.put_slice(&self.framing_extras);
        dst.put_slice(&self.extras);
        dst.put_slice(&self.key);
        dst.put_slice(&self.value);
        Ok(())
    }

    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>> {
        let Some(mut frame) = take_frame(src)? else {
            return Ok(None);
        };

        let magic = Magic::try_from(frame.get_u8())?;
        let opcode = Opcode::try_from(frame.get_u8())?;
        let (framing_len, key_len) = match magic {
            Magic::Response => (0, frame.get_u16() as usize),
            Magic::AltResponse => (frame.get_u8() as usize, frame.get_u8() as usize),
            Magic::Request => {
                return Err(KvPeekError::protocol(
                    "Server sent a request frame; server push is not supported",
                ));
            }
        };
        let extras_len = frame.get_u8() as usize;
        let datatype = frame.get_u8();
        let status = Status::from(frame.get_u16());
        let body_len = frame.get_u32() as usize;
        let opaque = frame.get_u32();
        let cas = frame.get_u64();

        let (framing_extras, extras, key, value) =
            split_body(frame, body_len, framing_len, extras_len, key_len)?;

        Ok(Some(Self {
            opcode,
            status,
            datatype,
            opaque,
            cas,
            framing_extras,
            extras,
            key,
            value,
        }))
    }

    /// Extracts the server's extended error context, if the value carries one.
    pub fn error_context(&self) -> Option<String> {
        if self.status.is_success() || self.value.is_empty() {
            return None;
        }
        if self.datatype & DATATYPE_JSON == 0 && self.value.first() != Some(&b'{') {
            return None;
        }
        let envelope: ErrorEnvelope = serde_json::from_slice(&self.value).ok()?;
        match (envelope.error.context, envelope.error.reference) {
            (Some(context), Some(reference)) => Some(format!("{} [ref {}]", context, reference)),
            (Some(context), None) => Some(context),
            (None, Some(reference)) => Some(format!("ref {}", reference)),
            (None, None) => None,
        }
    }

    /// Converts a non-success response into a status error for `operation`.
    pub fn into_error(self, operation: impl Into<String>) -> KvPeekError {
        KvPeekError::Status {
            operation: operation.into(),
            status: self.status,
            error_context: self.error_context(),
        }
    }
}

fn body_len(parts: &[&Bytes]) -> Result<u32> {
    let total: usize = parts.iter().map(|p| p.len()).sum();
    u32::try_from(total).map_err(|_| KvPeekError::protocol(format!("Body too long: {} bytes", total)))
}

/// Splits one complete frame off `src`, or returns `None` if more bytes are needed.
fn take_frame(src: &mut BytesMut) -> Result<Option<Bytes>> {
    if src.len() < HEADER_LEN {
        return Ok(None);
    }

    let body_len = u32::from_be_bytes([src[8], src[9], src[10], src[11]]) as usize;
    if body_len > MAX_BODY_LEN {
        return Err(KvPeekError::protocol(format!(
            "Frame body of {} bytes exceeds limit of {} bytes",
            body_len, MAX_BODY_LEN
        )));
    }

    let frame_len = HEADER_LEN + body_len;
    if src.len() < frame_len {
        src.reserve(frame_len - src.len());
        return Ok(None);
    }

    Ok(Some(src.split_to(frame_len).freeze()))
}

fn split_body(
    mut body: Bytes,
    body_len: usize,
    framing_len: usize,
    extras_len: usize,
    key_len: usize,
) -> Result<(Bytes, Bytes, Bytes, Bytes)> {
    if framing_len + extras_len + key_len > body_len {
        return Err(KvPeekError::protocol(format!(
            "Header lengths (framing {}, extras {}, key {}) exceed body length {}",
            framing_len, extras_len, key_len, body_len
        )));
    }

    let framing_extras = body.split_to(framing_len);
    let extras = body.split_to(extras_len);
    let key = body.split_to(key_len);
    Ok((framing_extras, extras, key, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encoding_layout() {
        let mut buf = BytesMut::new();
        Request::new(Opcode::SelectBucket)
            .with_key(Bytes::from_static(b"travel"))
            .encode(&mut buf)
            .unwrap();

        assert_eq!(buf.len(), HEADER_LEN + 6);
        assert_eq!(buf[0], 0x80);
        assert_eq!(buf[1], 0x89);
        assert_eq!(&buf[2..4], &[0x00, 0x06]); // key length
        assert_eq!(buf[4], 0); // extras length
        assert_eq!(&buf[8..12], &[0, 0, 0, 6]); // body length
        assert_eq!(&buf[HEADER_LEN..], b"travel");
    }

    #[test]
    fn test_response_decoding_from_raw_bytes() {
        let mut raw = BytesMut::new();
        raw.extend_from_slice(&[0x81, 0xbb, 0x00, 0x00, 0x0c, 0x00, 0x00, 0x00]);
        raw.extend_from_slice(&12u32.to_be_bytes()); // body: 12 bytes of extras
        raw.extend_from_slice(&7u32.to_be_bytes()); // opaque
        raw.extend_from_slice(&0u64.to_be_bytes()); // cas
        raw.extend_from_slice(&3u64.to_be_bytes()); // manifest uid
        raw.extend_from_slice(&8u32.to_be_bytes()); // collection id

        let response = Response::decode(&mut raw).unwrap().expect("complete frame");
        assert_eq!(response.opcode, Opcode::GetCollectionId);
        assert_eq!(response.status, Status::Success);
        assert_eq!(response.opaque, 7);
        assert_eq!(response.extras.len(), 12);
        assert!(response.value.is_empty());
        assert!(raw.is_empty());
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let mut encoded = BytesMut::new();
        Response::new(Opcode::Get, Status::Success)
            .with_value(Bytes::from_static(b"{\"a\":1}"))
            .encode(&mut encoded)
            .unwrap();

        let mut partial = BytesMut::from(&encoded[..HEADER_LEN + 2]);
        assert!(Response::decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&encoded[HEADER_LEN + 2..]);
        let response = Response::decode(&mut partial).unwrap().unwrap();
        assert_eq!(&response.value[..], b"{\"a\":1}");
    }

    #[test]
    fn test_flexible_response_skips_framing_extras() {
        let mut raw = BytesMut::new();
        raw.extend_from_slice(&[0x18, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00]);
        raw.extend_from_slice(&5u32.to_be_bytes()); // 3 framing + 2 value
        raw.extend_from_slice(&1u32.to_be_bytes());
        raw.extend_from_slice(&0u64.to_be_bytes());
        raw.extend_from_slice(&[0x02, 0x00, 0x10]); // server duration frame
        raw.extend_from_slice(b"hi");

        let response = Response::decode(&mut raw).unwrap().unwrap();
        assert_eq!(response.framing_extras.len(), 3);
        assert_eq!(&response.value[..], b"hi");
    }

    #[test]
    fn test_inconsistent_lengths_are_rejected() {
        let mut raw = BytesMut::new();
        raw.extend_from_slice(&[0x81, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00]);
        raw.extend_from_slice(&4u32.to_be_bytes()); // body shorter than key
        raw.extend_from_slice(&0u32.to_be_bytes());
        raw.extend_from_slice(&0u64.to_be_bytes());
        raw.extend_from_slice(&[0, 0, 0, 0]);

        assert!(Response::decode(&mut raw).is_err());
    }

    #[test]
    fn test_oversized_body_is_rejected_before_buffering() {
        let mut raw = BytesMut::new();
        raw.extend_from_slice(&[0x81, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        raw.extend_from_slice(&u32::MAX.to_be_bytes());
        raw.extend_from_slice(&[0u8; 12]);

        assert!(Response::decode(&mut raw).is_err());
    }

    #[test]
    fn test_error_context_is_extracted() {
        let response = Response::new(Opcode::SelectBucket, Status::NoAccess)
            .with_datatype(DATATYPE_JSON)
            .with_value(Bytes::from_static(
                br#"{"error":{"context":"No access to bucket","ref":"a1b2"}}"#,
            ));

        assert_eq!(
            response.error_context().as_deref(),
            Some("No access to bucket [ref a1b2]")
        );

        let err = response.into_error("SELECT_BUCKET");
        assert!(err.to_string().contains("No access to bucket"));
    }

    #[test]
    fn test_request_decode_matches_encode() {
        let request = Request::new(Opcode::SubdocMultiLookup)
            .with_vbucket(513)
            .with_key(Bytes::from_static(b"\x08airline_10"))
            .with_value(Bytes::from_static(&[0xc5, 0x04, 0x00, 0x01, b'x']));

        let mut buf = BytesMut::new();
        request.encode(&mut buf).unwrap();
        let decoded = Request::decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.vbucket, 513);
        assert_eq!(&decoded.key[..], b"\x08airline_10");
        assert_eq!(decoded.value.len(), 5);
    }
}
