//! Multi-path lookup body encoding and decoding.
//!
//! Request body, per path: `opcode u8 | flags u8 | path_len u16 | path`.
//! Response body, per path: `status u16 | value_len u32 | value`.

use super::opcode::Opcode;
use super::status::Status;
use crate::models::{LookupField, LookupInSpec, LookupOp};
use crate::{KvPeekError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Path flag: the path addresses an extended attribute.
pub const PATH_FLAG_XATTR: u8 = 0x04;

/// Maximum number of paths in one multi-lookup.
pub const MAX_LOOKUP_SPECS: usize = 16;

/// Encodes lookup specs into a `SUBDOC_MULTI_LOOKUP` value.
///
/// Extended-attribute paths must precede document paths; the server rejects
/// any other ordering.
pub fn encode_lookup_specs(specs: &[LookupInSpec]) -> Result<Bytes> {
    if specs.is_empty() {
        return Err(KvPeekError::configuration("Lookup requires at least one path"));
    }
    if specs.len() > MAX_LOOKUP_SPECS {
        return Err(KvPeekError::configuration(format!(
            "Lookup supports at most {} paths, got {}",
            MAX_LOOKUP_SPECS,
            specs.len()
        )));
    }
    if let Some(pos) = specs.iter().position(|s| !s.xattr)
        && specs[pos..].iter().any(|s| s.xattr)
    {
        return Err(KvPeekError::configuration(
            "Extended attribute paths must come before document paths",
        ));
    }

    let mut dst = BytesMut::new();
    for spec in specs {
        let path_len = u16::try_from(spec.path.len()).map_err(|_| {
            KvPeekError::configuration(format!("Path too long: {} bytes", spec.path.len()))
        })?;
        let opcode = match spec.op {
            LookupOp::Get => Opcode::SubdocGet,
            LookupOp::GetDocument => Opcode::Get,
        };
        let flags = if spec.xattr { PATH_FLAG_XATTR } else { 0 };

        dst.put_u8(opcode as u8);
        dst.put_u8(flags);
        dst.put_u16(path_len);
        dst.put_slice(spec.path.as_bytes());
    }
    Ok(dst.freeze())
}

/// Decodes a `SUBDOC_MULTI_LOOKUP` response value into per-path fields.
pub fn decode_lookup_fields(mut src: Bytes) -> Result<Vec<LookupField>> {
    let mut fields = Vec::new();
    while src.has_remaining() {
        if src.remaining() < 6 {
            return Err(KvPeekError::protocol(format!(
                "Truncated lookup field header ({} bytes)",
                src.remaining()
            )));
        }
        let status = Status::from(src.get_u16());
        let len = src.get_u32() as usize;
        if src.remaining() < len {
            return Err(KvPeekError::protocol(format!(
                "Lookup field declares {} bytes, {} remain",
                len,
                src.remaining()
            )));
        }
        fields.push(LookupField::new(status, src.split_to(len)));
    }
    Ok(fields)
}

/// Encodes per-path fields. Used by the mock data service in tests.
pub fn encode_lookup_fields(fields: &[LookupField]) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    for field in fields {
        let len = u32::try_from(field.value.len())
            .map_err(|_| KvPeekError::protocol("Lookup field too long"))?;
        dst.put_u16(field.status.code());
        dst.put_u32(len);
        dst.put_slice(&field.value);
    }
    Ok(dst.freeze())
}

/// Decodes a request value back into specs. Used by the mock data service.
pub fn decode_lookup_specs(mut src: Bytes) -> Result<Vec<LookupInSpec>> {
    let mut specs = Vec::new();
    while src.has_remaining() {
        if src.remaining() < 4 {
            return Err(KvPeekError::protocol("Truncated lookup spec"));
        }
        let opcode = Opcode::try_from(src.get_u8())?;
        let flags = src.get_u8();
        let path_len = src.get_u16() as usize;
        if src.remaining() < path_len {
            return Err(KvPeekError::protocol("Truncated lookup spec path"));
        }
        let path = String::from_utf8(src.split_to(path_len).to_vec())
            .map_err(|_| KvPeekError::protocol("Lookup path is not UTF-8"))?;
        let op = match opcode {
            Opcode::Get => LookupOp::GetDocument,
            Opcode::SubdocGet => LookupOp::Get,
            other => {
                return Err(KvPeekError::protocol(format!(
                    "Unsupported lookup opcode {}",
                    other
                )));
            }
        };
        specs.push(LookupInSpec {
            op,
            path,
            xattr: flags & PATH_FLAG_XATTR != 0,
        });
    }
    Ok(specs)
}
