//! Lookup-in request and result types.
//!
//! A lookup request is an ordered list of [`LookupInSpec`]s submitted as one
//! atomic multi-path read. The matching [`LookupInResult`] holds one
//! [`LookupField`] per spec, in the same order.

use crate::protocol::Status;
use crate::{KvPeekError, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Virtual xattr holding server-maintained document metadata.
pub const VATTR_DOCUMENT: &str = "$document";

/// Virtual xattr listing the names of the xattrs present on a document.
pub const VATTR_XTOC: &str = "$XTOC";

/// Kind of read performed for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOp {
    /// Fetch the value at a path (`SUBDOC_GET`).
    Get,
    /// Fetch the whole document body (`GET` with an empty path).
    GetDocument,
}

/// One path of a lookup-in request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupInSpec {
    pub op: LookupOp,
    pub path: String,
    pub xattr: bool,
}

impl LookupInSpec {
    /// Reads a path. An empty path reads the full document body.
    ///
    /// # Example
    /// ```rust
    /// use kvpeek_core::models::{LookupInSpec, LookupOp};
    ///
    /// assert_eq!(LookupInSpec::get("").op, LookupOp::GetDocument);
    /// assert!(LookupInSpec::get("$XTOC").xattr().xattr);
    /// ```
    pub fn get(path: impl Into<String>) -> Self {
        let path = path.into();
        let op = if path.is_empty() {
            LookupOp::GetDocument
        } else {
            LookupOp::Get
        };
        Self {
            op,
            path,
            xattr: false,
        }
    }

    /// Marks the path as an extended-attribute path.
    pub fn xattr(mut self) -> Self {
        self.xattr = true;
        self
    }
}

/// Outcome of one path of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupField {
    pub status: Status,
    pub value: Bytes,
}

impl LookupField {
    pub fn new(status: Status, value: impl Into<Bytes>) -> Self {
        Self {
            status,
            value: value.into(),
        }
    }

    pub fn success(value: impl Into<Bytes>) -> Self {
        Self::new(Status::Success, value)
    }

    pub fn missing() -> Self {
        Self::new(Status::SubdocPathNotFound, Bytes::new())
    }
}

/// Positional results of a lookup-in.
#[derive(Debug, Clone)]
pub struct LookupInResult {
    paths: Vec<String>,
    fields: Vec<LookupField>,
    cas: u64,
    deleted: bool,
}

impl LookupInResult {
    /// Pairs the request specs with their field outcomes.
    ///
    /// # Errors
    /// Returns a protocol error when the number of fields differs from the
    /// number of specs.
    pub fn new(specs: &[LookupInSpec], fields: Vec<LookupField>, cas: u64) -> Result<Self> {
        if specs.len() != fields.len() {
            return Err(KvPeekError::protocol(format!(
                "Lookup returned {} fields for {} specs",
                fields.len(),
                specs.len()
            )));
        }
        Ok(Self {
            paths: specs.iter().map(|s| s.path.clone()).collect(),
            fields,
            cas,
            deleted: false,
        })
    }

    pub(crate) fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn cas(&self) -> u64 {
        self.cas
    }

    /// True when the document is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// True when the path at `index` was found.
    pub fn exists(&self, index: usize) -> bool {
        self.fields
            .get(index)
            .is_some_and(|f| f.status.is_success())
    }

    /// Raw bytes of the field at `index`.
    pub fn content_as_bytes(&self, index: usize) -> Result<&[u8]> {
        let field = self.fields.get(index).ok_or_else(|| {
            KvPeekError::configuration(format!(
                "Lookup index {} out of range ({} fields)",
                index,
                self.fields.len()
            ))
        })?;

        if !field.status.is_success() {
            return Err(KvPeekError::LookupField {
                index,
                path: self.paths.get(index).cloned().unwrap_or_default(),
                status: field.status,
            });
        }

        Ok(&field.value)
    }

    /// Deserializes the field at `index` from JSON.
    pub fn content_as<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let bytes = self.content_as_bytes(index)?;
        serde_json::from_slice(bytes).map_err(|e| {
            KvPeekError::serialization(format!("Lookup field #{} is not valid JSON", index), e)
        })
    }

    /// The field at `index` as a JSON object.
    pub fn content_as_object(&self, index: usize) -> Result<Map<String, Value>> {
        self.content_as(index)
    }

    /// The field at `index` as a JSON array.
    pub fn content_as_array(&self, index: usize) -> Result<Vec<Value>> {
        self.content_as(index)
    }
}
