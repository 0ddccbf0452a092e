//! Document and extended-attribute fetching.
//!
//! The document is read with one lookup of `$document`, `$XTOC` and the
//! body. Each attribute named in `$XTOC` is then read with its own lookup.
//! Files are written as soon as each payload arrives; a later failure does
//! not remove files already written.

use crate::output::{body_file_name, write_content, xattr_file_name};
use kvpeek_core::models::{LookupInSpec, VATTR_DOCUMENT, VATTR_XTOC};
use kvpeek_core::{DocumentReader, KvPeekError, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// The first lookup of a dump.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedDocument {
    /// `$document` virtual attribute
    pub metadata: Map<String, Value>,
    /// Attribute names listed by `$XTOC`
    pub xattrs: Vec<String>,
    /// Raw document body
    pub body: Vec<u8>,
}

/// Files produced by [`dump_document`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSummary {
    /// Path of `<docId>.content.bin`
    pub body_file: PathBuf,
    /// Attribute name and the file its value was written to, in `$XTOC` order
    pub xattr_files: Vec<(String, PathBuf)>,
}

/// Reads `$document`, `$XTOC` and the body of `id` in one lookup.
///
/// # Errors
/// Fails when the document does not exist, when any of the three paths is
/// missing, or when `$XTOC` lists something other than strings.
pub async fn fetch_document<R>(reader: &R, id: &str) -> Result<FetchedDocument>
where
    R: DocumentReader + ?Sized,
{
    let specs = [
        LookupInSpec::get(VATTR_DOCUMENT).xattr(),
        LookupInSpec::get(VATTR_XTOC).xattr(),
        LookupInSpec::get(""),
    ];
    let result = reader.lookup_in(id, &specs).await?;

    let metadata = result.content_as_object(0)?;
    let xattrs = result
        .content_as_array(1)?
        .into_iter()
        .enumerate()
        .map(|(i, entry)| match entry {
            Value::String(name) => Ok(name),
            other => Err(KvPeekError::protocol(format!(
                "{} entry #{} is not a string: {}",
                VATTR_XTOC, i, other
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    let body = result.content_as_bytes(2)?.to_vec();

    Ok(FetchedDocument {
        metadata,
        xattrs,
        body,
    })
}

/// Reads the raw value of one extended attribute.
pub async fn fetch_xattr<R>(reader: &R, id: &str, xattr: &str) -> Result<Vec<u8>>
where
    R: DocumentReader + ?Sized,
{
    let result = reader
        .lookup_in(id, &[LookupInSpec::get(xattr).xattr()])
        .await?;
    Ok(result.content_as_bytes(0)?.to_vec())
}

/// Fetches a document and every attribute it lists, writing each payload
/// under `output_dir`.
pub async fn dump_document<R>(reader: &R, id: &str, output_dir: &Path) -> Result<DumpSummary>
where
    R: DocumentReader + ?Sized,
{
    let body_name = body_file_name(id)?;
    let fetched = fetch_document(reader, id).await?;

    // Rendered outside the macros, which shadow `Value` with tracing's trait.
    let metadata = Value::Object(fetched.metadata.clone());
    let xtoc = Value::from(fetched.xattrs.clone());
    info!("{} contents: {}", VATTR_DOCUMENT, metadata);
    info!("{} contents: {}", VATTR_XTOC, xtoc);
    info!("Body length: {} bytes", fetched.body.len());

    let body_file = write_content(output_dir, &body_name, &fetched.body).await?;
    info!("Body written to {}", body_file.display());

    let mut summary = DumpSummary {
        body_file,
        xattr_files: Vec::with_capacity(fetched.xattrs.len()),
    };

    for xattr in &fetched.xattrs {
        info!("Fetching xattr: {}", xattr);
        let file_name = xattr_file_name(id, xattr)?;
        let content = fetch_xattr(reader, id, xattr).await?;
        info!("xattr {} length: {} bytes", xattr, content.len());

        let path = write_content(output_dir, &file_name, &content).await?;
        info!("xattr {} content written to {}", xattr, path.display());
        summary.xattr_files.push((xattr.clone(), path));
    }

    Ok(summary)
}
