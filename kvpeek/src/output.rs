//! Content file naming and writing.
//!
//! Files are written in place (create or truncate). There is no atomic
//! rename, so an interrupted run can leave a partial file behind.

use kvpeek_core::{KvPeekError, Result};
use std::io;
use std::path::{Path, PathBuf};

const CONTENT_SUFFIX: &str = "content.bin";

/// `<docId>.content.bin`
pub fn body_file_name(doc_id: &str) -> Result<String> {
    file_name(format!("{}.{}", doc_id, CONTENT_SUFFIX))
}

/// `<docId>.<xattr>.content.bin`
pub fn xattr_file_name(doc_id: &str, xattr: &str) -> Result<String> {
    file_name(format!("{}.{}.{}", doc_id, xattr, CONTENT_SUFFIX))
}

/// Rejects names that would escape the output directory.
fn file_name(name: String) -> Result<String> {
    let invalid = name.contains(['/', '\\', '\0']) || name == "." || name == "..";
    if invalid {
        return Err(KvPeekError::io(
            format!("Refusing to write {:?}", name),
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "file name contains a path separator or NUL",
            ),
        ));
    }
    Ok(name)
}

/// Writes `content` to `dir/file_name`, replacing any existing file.
pub async fn write_content(dir: &Path, file_name: &str, content: &[u8]) -> Result<PathBuf> {
    let path = dir.join(file_name);
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| KvPeekError::io(format!("Failed to write to {}", path.display()), e))?;
    Ok(path)
}
