//! Fetch and dump tests against an in-memory document store.
//!
//! This test suite covers:
//! - Body and attribute files carry the exact stored bytes
//! - An empty `$XTOC` produces only the body file
//! - A missing document aborts before any file is written
//! - An attribute failure keeps the files already written
//! - The run narrative is logged at INFO

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::panic)]

use async_trait::async_trait;
use kvpeek::fetch::{dump_document, fetch_document, fetch_xattr};
use kvpeek_core::models::{LookupField, LookupInResult, LookupInSpec, LookupOp};
use kvpeek_core::{DocumentReader, KvPeekError, Result, VATTR_DOCUMENT, VATTR_XTOC};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

struct StoredDocument {
    body: Vec<u8>,
    xtoc: String,
    xattrs: HashMap<String, Vec<u8>>,
}

/// In-memory reader recording every lookup it serves.
#[derive(Default)]
struct MemoryReader {
    documents: HashMap<String, StoredDocument>,
    lookups: Mutex<Vec<Vec<String>>>,
}

impl MemoryReader {
    fn with_document(mut self, id: &str, body: &[u8], xattrs: &[(&str, &[u8])]) -> Self {
        let names: Vec<&str> = xattrs.iter().map(|(k, _)| *k).collect();
        self.documents.insert(
            id.to_string(),
            StoredDocument {
                body: body.to_vec(),
                xtoc: serde_json::to_string(&names).unwrap(),
                xattrs: xattrs
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.to_vec()))
                    .collect(),
            },
        );
        self
    }

    /// Lists an attribute in `$XTOC` that cannot be read.
    fn with_raw_xtoc(mut self, id: &str, xtoc: &str) -> Self {
        self.documents.get_mut(id).unwrap().xtoc = xtoc.to_string();
        self
    }

    fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentReader for MemoryReader {
    async fn lookup_in(&self, id: &str, specs: &[LookupInSpec]) -> Result<LookupInResult> {
        self.lookups
            .lock()
            .unwrap()
            .push(specs.iter().map(|s| s.path.clone()).collect());

        let document = self
            .documents
            .get(id)
            .ok_or_else(|| KvPeekError::DocumentNotFound { id: id.to_string() })?;

        let fields = specs
            .iter()
            .map(|spec| match (spec.op, spec.xattr, spec.path.as_str()) {
                (LookupOp::GetDocument, _, _) => LookupField::success(document.body.clone()),
                (_, true, VATTR_DOCUMENT) => LookupField::success(format!(
                    r#"{{"CAS":"0x0000000000000001","value_bytes":{}}}"#,
                    document.body.len()
                )),
                (_, true, VATTR_XTOC) => LookupField::success(document.xtoc.clone()),
                (_, true, name) => document
                    .xattrs
                    .get(name)
                    .map_or_else(LookupField::missing, |v| LookupField::success(v.clone())),
                _ => LookupField::missing(),
            })
            .collect();

        LookupInResult::new(specs, fields, 1)
    }
}

/// Log sink handed to the fmt subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_dump_writes_body_and_each_xattr() {
    let body = b"\x00\x01binary body\xff";
    let reader = MemoryReader::default().with_document(
        "doc1",
        body,
        &[("_sync", br#"{"rev":"2-b"}"#), ("txn", br#"{"id":7}"#)],
    );
    let dir = tempfile::tempdir().unwrap();

    let summary = dump_document(&reader, "doc1", dir.path()).await.unwrap();

    assert_eq!(std::fs::read(&summary.body_file).unwrap(), body);
    assert_eq!(
        std::fs::read(dir.path().join("doc1._sync.content.bin")).unwrap(),
        br#"{"rev":"2-b"}"#
    );
    assert_eq!(
        std::fs::read(dir.path().join("doc1.txn.content.bin")).unwrap(),
        br#"{"id":7}"#
    );
    assert_eq!(summary.xattr_files.len(), 2);
    assert_eq!(summary.xattr_files[0].0, "_sync");

    // One document lookup, then one lookup per attribute.
    assert_eq!(reader.lookup_count(), 3);
    let lookups = reader.lookups.lock().unwrap();
    assert_eq!(lookups[0], vec!["$document", "$XTOC", ""]);
    assert_eq!(lookups[1], vec!["_sync"]);
    assert_eq!(lookups[2], vec!["txn"]);
}

#[tokio::test]
async fn test_dump_with_empty_xtoc_writes_only_body_file() {
    let reader = MemoryReader::default().with_document("plain", b"{}", &[]);
    let dir = tempfile::tempdir().unwrap();

    let summary = dump_document(&reader, "plain", dir.path()).await.unwrap();

    assert!(summary.xattr_files.is_empty());
    assert_eq!(files_in(dir.path()), vec!["plain.content.bin"]);
    assert_eq!(reader.lookup_count(), 1);
}

#[tokio::test]
async fn test_dump_missing_document_writes_nothing() {
    let reader = MemoryReader::default();
    let dir = tempfile::tempdir().unwrap();

    let err = dump_document(&reader, "ghost", dir.path()).await.unwrap_err();

    assert!(matches!(err, KvPeekError::DocumentNotFound { ref id } if id == "ghost"));
    assert!(!err.is_io());
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_dump_xattr_failure_keeps_earlier_files() {
    let reader = MemoryReader::default()
        .with_document("doc2", b"body", &[("first", b"1")])
        .with_raw_xtoc("doc2", r#"["first","vanished"]"#);
    let dir = tempfile::tempdir().unwrap();

    let err = dump_document(&reader, "doc2", dir.path()).await.unwrap_err();

    assert!(matches!(err, KvPeekError::LookupField { .. }));
    assert_eq!(
        files_in(dir.path()),
        vec!["doc2.content.bin", "doc2.first.content.bin"]
    );
}

#[tokio::test]
async fn test_dump_rejects_xattr_name_with_separator() {
    let reader = MemoryReader::default()
        .with_document("doc3", b"body", &[])
        .with_raw_xtoc("doc3", r#"["../escape"]"#);
    let dir = tempfile::tempdir().unwrap();

    let err = dump_document(&reader, "doc3", dir.path()).await.unwrap_err();

    assert!(err.is_io());
    assert_eq!(files_in(dir.path()), vec!["doc3.content.bin"]);
}

#[tokio::test]
async fn test_dump_rejects_document_id_with_separator() {
    let reader = MemoryReader::default().with_document("a/b", b"body", &[]);
    let dir = tempfile::tempdir().unwrap();

    let err = dump_document(&reader, "a/b", dir.path()).await.unwrap_err();

    assert!(err.is_io());
    assert_eq!(reader.lookup_count(), 0);
}

#[tokio::test]
async fn test_fetch_document_parses_all_three_fields() {
    let reader =
        MemoryReader::default().with_document("doc4", b"[1,2,3]", &[("meta", b"{}")]);

    let fetched = fetch_document(&reader, "doc4").await.unwrap();

    assert_eq!(fetched.metadata["value_bytes"], 7);
    assert_eq!(fetched.xattrs, vec!["meta".to_string()]);
    assert_eq!(fetched.body, b"[1,2,3]");
}

#[tokio::test]
async fn test_fetch_document_rejects_non_string_xtoc_entries() {
    let reader = MemoryReader::default()
        .with_document("doc5", b"{}", &[])
        .with_raw_xtoc("doc5", r#"["ok", 42]"#);

    let err = fetch_document(&reader, "doc5").await.unwrap_err();

    assert!(matches!(err, KvPeekError::Protocol { .. }));
    assert!(err.to_string().contains("#1"));
}

#[tokio::test]
async fn test_fetch_xattr_missing_attribute_is_error() {
    let reader = MemoryReader::default().with_document("doc6", b"{}", &[]);

    let err = fetch_xattr(&reader, "doc6", "nope").await.unwrap_err();

    assert!(matches!(err, KvPeekError::LookupField { index: 0, .. }));
}

#[tokio::test]
async fn test_dump_through_trait_object() {
    let reader: Box<dyn DocumentReader> =
        Box::new(MemoryReader::default().with_document("doc7", b"x", &[("a", b"y")]));
    let dir = tempfile::tempdir().unwrap();

    dump_document(reader.as_ref(), "doc7", dir.path()).await.unwrap();

    assert_eq!(
        files_in(dir.path()),
        vec!["doc7.a.content.bin", "doc7.content.bin"]
    );
}

#[tokio::test]
async fn test_dump_logs_run_narrative() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let reader = MemoryReader::default().with_document("doc8", b"body", &[("first", b"1")]);
    let dir = tempfile::tempdir().unwrap();
    let summary = dump_document(&reader, "doc8", dir.path()).await.unwrap();

    let output = logs.contents();
    let expected = [
        r#"$document contents: {"CAS":"0x0000000000000001","value_bytes":4}"#.to_string(),
        r#"$XTOC contents: ["first"]"#.to_string(),
        "Body length: 4 bytes".to_string(),
        format!("Body written to {}", summary.body_file.display()),
        "Fetching xattr: first".to_string(),
        "xattr first length: 1 bytes".to_string(),
        format!(
            "xattr first content written to {}",
            summary.xattr_files[0].1.display()
        ),
    ];

    let mut last = 0;
    for line in &expected {
        let at = output
            .find(line.as_str())
            .unwrap_or_else(|| panic!("missing {:?} in log output:\n{}", line, output));
        assert!(at >= last, "{:?} logged out of order", line);
        last = at;
    }
}
