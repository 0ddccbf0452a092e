//! The document read seam.

use crate::Result;
use crate::models::{LookupInResult, LookupInSpec};
use async_trait::async_trait;

/// Anything that can run a lookup-in against a document.
///
/// Implemented by [`crate::cluster::Collection`]; tests substitute an
/// in-memory store.
///
/// # Errors
/// Implementations return [`crate::KvPeekError::DocumentNotFound`] when the
/// document does not exist. A path that is absent is not an error here; it
/// surfaces when the corresponding field of the result is read.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Reads `specs` from document `id` in one atomic round trip.
    async fn lookup_in(&self, id: &str, specs: &[LookupInSpec]) -> Result<LookupInResult>;
}
