//! Document key encoding: collection prefixes and vBucket hashing.

use crate::{KvPeekError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Appends `value` as unsigned LEB128.
pub fn write_leb128(dst: &mut BytesMut, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            dst.put_u8(byte);
            return;
        }
        dst.put_u8(byte | 0x80);
    }
}

/// Reads an unsigned LEB128 value, returning it with the number of bytes used.
pub fn read_leb128(src: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in src.iter().enumerate().take(5) {
        let chunk = u32::from(byte & 0x7f);
        let shift = 7 * i as u32;
        if shift == 28 && chunk > 0x0f {
            return Err(KvPeekError::protocol("LEB128 value overflows u32"));
        }
        value |= chunk << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(KvPeekError::protocol("Unterminated LEB128 value"))
}

/// Builds the on-wire key: LEB128 collection id followed by the document id.
pub fn collection_key(collection_id: u32, id: &str) -> Bytes {
    let mut key = BytesMut::with_capacity(id.len() + 5);
    write_leb128(&mut key, collection_id);
    key.put_slice(id.as_bytes());
    key.freeze()
}

/// Maps a document id to its vBucket using the cluster's CRC32 scheme.
pub fn vbucket_for_key(id: &[u8], num_vbuckets: usize) -> u16 {
    if num_vbuckets == 0 {
        return 0;
    }
    let crc = crc32fast::hash(id);
    let hashed = ((crc >> 16) & 0x7fff) as usize;
    (hashed % num_vbuckets) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leb128_single_byte() {
        let mut buf = BytesMut::new();
        write_leb128(&mut buf, 0);
        write_leb128(&mut buf, 8);
        write_leb128(&mut buf, 127);
        assert_eq!(&buf[..], &[0x00, 0x08, 0x7f]);
    }

    #[test]
    fn test_leb128_multi_byte() {
        let mut buf = BytesMut::new();
        write_leb128(&mut buf, 128);
        assert_eq!(&buf[..], &[0x80, 0x01]);

        let mut buf = BytesMut::new();
        write_leb128(&mut buf, 0x1234);
        assert_eq!(&buf[..], &[0xb4, 0x24]);
        assert_eq!(read_leb128(&buf).unwrap(), (0x1234, 2));
    }

    #[test]
    fn test_leb128_max_and_errors() {
        let mut buf = BytesMut::new();
        write_leb128(&mut buf, u32::MAX);
        assert_eq!(buf.len(), 5);
        assert_eq!(read_leb128(&buf).unwrap(), (u32::MAX, 5));

        assert!(read_leb128(&[0x80, 0x80]).is_err());
        assert!(read_leb128(&[0xff, 0xff, 0xff, 0xff, 0x7f]).is_err());
    }

    #[test]
    fn test_collection_key_prefix() {
        let key = collection_key(0, "airline_10");
        assert_eq!(key[0], 0x00);
        assert_eq!(&key[1..], b"airline_10");

        let key = collection_key(200, "k");
        assert_eq!(&key[..], &[0xc8, 0x01, b'k']);
    }

    #[test]
    fn test_vbucket_for_key_is_stable_and_bounded() {
        let first = vbucket_for_key(b"airline_10", 1024);
        assert_eq!(first, vbucket_for_key(b"airline_10", 1024));
        assert!(first < 1024);

        for id in ["a", "b", "user::42", ""] {
            assert!(vbucket_for_key(id.as_bytes(), 64) < 64);
        }
        assert_eq!(vbucket_for_key(b"anything", 1), 0);
        assert_eq!(vbucket_for_key(b"anything", 0), 0);
    }

    #[test]
    fn test_vbucket_matches_crc32_scheme() {
        // CRC32("hello") = 0x3610a686 -> (0x3610 & 0x7fff) = 0x3610 = 13840
        assert_eq!(vbucket_for_key(b"hello", 1024), (13840 % 1024) as u16);
    }
}
