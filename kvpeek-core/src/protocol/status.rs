//! Response status codes.

/// Status field of a response header, or of one multi-lookup field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    KeyNotFound,
    KeyExists,
    NotMyVbucket,
    NoBucket,
    AuthError,
    AuthContinue,
    NoAccess,
    UnknownCommand,
    NotSupported,
    Busy,
    TemporaryFailure,
    UnknownCollection,
    UnknownScope,
    SubdocPathNotFound,
    SubdocPathMismatch,
    SubdocPathInvalid,
    SubdocDocNotJson,
    SubdocInvalidCombo,
    SubdocMultiPathFailure,
    SubdocSuccessDeleted,
    SubdocXattrInvalidKeyCombo,
    SubdocXattrUnknownVattr,
    SubdocMultiPathFailureDeleted,
    Unknown(u16),
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Self::Success => 0x00,
            Self::KeyNotFound => 0x01,
            Self::KeyExists => 0x02,
            Self::NotMyVbucket => 0x07,
            Self::NoBucket => 0x08,
            Self::AuthError => 0x20,
            Self::AuthContinue => 0x21,
            Self::NoAccess => 0x24,
            Self::UnknownCommand => 0x81,
            Self::NotSupported => 0x83,
            Self::Busy => 0x85,
            Self::TemporaryFailure => 0x86,
            Self::UnknownCollection => 0x88,
            Self::UnknownScope => 0x8c,
            Self::SubdocPathNotFound => 0xc0,
            Self::SubdocPathMismatch => 0xc1,
            Self::SubdocPathInvalid => 0xc2,
            Self::SubdocDocNotJson => 0xc6,
            Self::SubdocInvalidCombo => 0xcb,
            Self::SubdocMultiPathFailure => 0xcc,
            Self::SubdocSuccessDeleted => 0xcd,
            Self::SubdocXattrInvalidKeyCombo => 0xcf,
            Self::SubdocXattrUnknownVattr => 0xd1,
            Self::SubdocMultiPathFailureDeleted => 0xd3,
            Self::Unknown(code) => code,
        }
    }

    /// Whether a multi-lookup response with this status carries field results.
    pub fn has_lookup_body(self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::SubdocMultiPathFailure
                | Self::SubdocSuccessDeleted
                | Self::SubdocMultiPathFailureDeleted
        )
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        match code {
            0x00 => Self::Success,
            0x01 => Self::KeyNotFound,
            0x02 => Self::KeyExists,
            0x07 => Self::NotMyVbucket,
            0x08 => Self::NoBucket,
            0x20 => Self::AuthError,
            0x21 => Self::AuthContinue,
            0x24 => Self::NoAccess,
            0x81 => Self::UnknownCommand,
            0x83 => Self::NotSupported,
            0x85 => Self::Busy,
            0x86 => Self::TemporaryFailure,
            0x88 => Self::UnknownCollection,
            0x8c => Self::UnknownScope,
            0xc0 => Self::SubdocPathNotFound,
            0xc1 => Self::SubdocPathMismatch,
            0xc2 => Self::SubdocPathInvalid,
            0xc6 => Self::SubdocDocNotJson,
            0xcb => Self::SubdocInvalidCombo,
            0xcc => Self::SubdocMultiPathFailure,
            0xcd => Self::SubdocSuccessDeleted,
            0xcf => Self::SubdocXattrInvalidKeyCombo,
            0xd1 => Self::SubdocXattrUnknownVattr,
            0xd3 => Self::SubdocMultiPathFailureDeleted,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown({:#06x})", code),
            other => write!(f, "{:?}({:#06x})", other, other.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for code in [0x00u16, 0x01, 0x07, 0x20, 0x24, 0x88, 0xc0, 0xcc, 0xd3] {
            assert_eq!(Status::from(code).code(), code);
        }
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status = Status::from(0x4242);
        assert_eq!(status, Status::Unknown(0x4242));
        assert_eq!(status.to_string(), "Unknown(0x4242)");
    }

    #[test]
    fn test_lookup_body_statuses() {
        assert!(Status::Success.has_lookup_body());
        assert!(Status::SubdocMultiPathFailure.has_lookup_body());
        assert!(Status::SubdocMultiPathFailureDeleted.has_lookup_body());
        assert!(!Status::KeyNotFound.has_lookup_body());
        assert!(!Status::NotMyVbucket.has_lookup_body());
    }

    #[test]
    fn test_display_names_status() {
        assert_eq!(Status::KeyNotFound.to_string(), "KeyNotFound(0x0001)");
    }
}
