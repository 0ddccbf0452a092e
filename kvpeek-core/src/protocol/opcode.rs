//! Magic bytes, command opcodes and HELLO feature codes.

use crate::{KvPeekError, Result};

/// First byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Magic {
    /// Client request
    Request = 0x80,
    /// Server response
    Response = 0x81,
    /// Server response carrying flexible framing extras
    AltResponse = 0x18,
}

impl TryFrom<u8> for Magic {
    type Error = KvPeekError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0x80 => Ok(Self::Request),
            0x81 => Ok(Self::Response),
            0x18 => Ok(Self::AltResponse),
            _ => Err(KvPeekError::protocol(format!("Unknown magic byte: {:#04x}", v))),
        }
    }
}

/// Commands issued by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Hello = 0x1f,
    SaslListMechs = 0x20,
    SaslAuth = 0x21,
    SaslStep = 0x22,
    SelectBucket = 0x89,
    GetClusterConfig = 0xb5,
    GetCollectionId = 0xbb,
    SubdocGet = 0xc5,
    SubdocMultiLookup = 0xd0,
}

impl Opcode {
    /// Wire name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Hello => "HELLO",
            Self::SaslListMechs => "SASL_LIST_MECHS",
            Self::SaslAuth => "SASL_AUTH",
            Self::SaslStep => "SASL_STEP",
            Self::SelectBucket => "SELECT_BUCKET",
            Self::GetClusterConfig => "GET_CLUSTER_CONFIG",
            Self::GetCollectionId => "GET_COLLECTION_ID",
            Self::SubdocGet => "SUBDOC_GET",
            Self::SubdocMultiLookup => "SUBDOC_MULTI_LOOKUP",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = KvPeekError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0x00 => Ok(Self::Get),
            0x1f => Ok(Self::Hello),
            0x20 => Ok(Self::SaslListMechs),
            0x21 => Ok(Self::SaslAuth),
            0x22 => Ok(Self::SaslStep),
            0x89 => Ok(Self::SelectBucket),
            0xb5 => Ok(Self::GetClusterConfig),
            0xbb => Ok(Self::GetCollectionId),
            0xc5 => Ok(Self::SubdocGet),
            0xd0 => Ok(Self::SubdocMultiLookup),
            _ => Err(KvPeekError::protocol(format!("Unknown opcode: {:#04x}", v))),
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// HELLO feature codes negotiated at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Xattr,
    XError,
    SelectBucket,
    Json,
    Collections,
    Other(u16),
}

impl Feature {
    /// Features requested by every connection.
    pub const REQUESTED: [Self; 5] = [
        Self::Xattr,
        Self::XError,
        Self::SelectBucket,
        Self::Json,
        Self::Collections,
    ];

    pub fn code(self) -> u16 {
        match self {
            Self::Xattr => 0x06,
            Self::XError => 0x07,
            Self::SelectBucket => 0x08,
            Self::Json => 0x0b,
            Self::Collections => 0x12,
            Self::Other(code) => code,
        }
    }
}

impl From<u16> for Feature {
    fn from(code: u16) -> Self {
        match code {
            0x06 => Self::Xattr,
            0x07 => Self::XError,
            0x08 => Self::SelectBucket,
            0x0b => Self::Json,
            0x12 => Self::Collections,
            other => Self::Other(other),
        }
    }
}

/// Datatype bit: value is JSON.
pub const DATATYPE_JSON: u8 = 0x01;
/// Datatype bit: value is snappy-compressed. Never negotiated here.
pub const DATATYPE_SNAPPY: u8 = 0x02;
/// Datatype bit: value is prefixed with an xattr section.
pub const DATATYPE_XATTR: u8 = 0x04;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trips_through_byte() {
        for opcode in [
            Opcode::Get,
            Opcode::Hello,
            Opcode::SaslAuth,
            Opcode::SelectBucket,
            Opcode::GetCollectionId,
            Opcode::SubdocMultiLookup,
        ] {
            assert_eq!(Opcode::try_from(opcode as u8).unwrap(), opcode);
        }
    }

    #[test]
    fn test_unknown_opcode_is_protocol_error() {
        let err = Opcode::try_from(0x42).unwrap_err();
        assert!(err.to_string().contains("0x42"));
    }

    #[test]
    fn test_feature_codes() {
        assert_eq!(Feature::Collections.code(), 0x12);
        assert_eq!(Feature::from(0x06), Feature::Xattr);
        assert_eq!(Feature::from(0x0f), Feature::Other(0x0f));
    }

    #[test]
    fn test_magic_parsing() {
        assert_eq!(Magic::try_from(0x81).unwrap(), Magic::Response);
        assert_eq!(Magic::try_from(0x18).unwrap(), Magic::AltResponse);
        assert!(Magic::try_from(0x00).is_err());
    }
}
