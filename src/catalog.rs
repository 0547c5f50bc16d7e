//! Feature catalog: the registry mapping feature indices to what they mean.
//!
//! Training passes append one batch per run; inference passes only read.
//! Every implementation must make `append` all-or-nothing and must not let a
//! reader observe half of a batch.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ast::{compile, Expression, InsertQuery, Literal, Query};
use crate::error::{FeaturizeError, Result};
use crate::sink::QuerySink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCatalogEntry {
    pub feature_index: i64,
    pub attribute: String,
    pub defining_expression: String,
    pub kind: String,
}

pub trait FeatureCatalog: Send + Sync {
    fn entries(&self) -> Result<Vec<FeatureCatalogEntry>>;

    /// Append a whole batch or nothing.
    fn append(&self, entries: &[FeatureCatalogEntry]) -> Result<()>;
}

/// Process-local catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entries: RwLock<Vec<FeatureCatalogEntry>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<FeatureCatalogEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl FeatureCatalog for InMemoryCatalog {
    fn entries(&self) -> Result<Vec<FeatureCatalogEntry>> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .map_err(|_| FeaturizeError::CatalogReadFailed("catalog lock poisoned".into()))
    }

    fn append(&self, entries: &[FeatureCatalogEntry]) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| FeaturizeError::CatalogWriteFailed("catalog lock poisoned".into()))?;
        guard.extend_from_slice(entries);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument {
    updated_at: DateTime<Utc>,
    entries: Vec<FeatureCatalogEntry>,
}

/// Catalog persisted as a JSON document, replaced atomically on append.
#[derive(Debug)]
pub struct JsonFileCatalog {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn default_path(dataset_id: &str) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dcsignal")
            .join(format!("catalog_{}.json", dataset_id))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> std::result::Result<Vec<FeatureCatalogEntry>, String> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| e.to_string())?;
        let document: CatalogDocument =
            serde_json::from_str(&content).map_err(|e| e.to_string())?;
        Ok(document.entries)
    }

    fn write_document(&self, entries: Vec<FeatureCatalogEntry>) -> std::result::Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let document = CatalogDocument {
            updated_at: Utc::now(),
            entries,
        };
        let content = serde_json::to_string_pretty(&document).map_err(|e| e.to_string())?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp, &self.path).map_err(|e| e.to_string())?;
        Ok(())
    }
}

impl FeatureCatalog for JsonFileCatalog {
    fn entries(&self) -> Result<Vec<FeatureCatalogEntry>> {
        let _guard = self
            .lock
            .read()
            .map_err(|_| FeaturizeError::CatalogReadFailed("catalog lock poisoned".into()))?;
        self.read_document().map_err(|e| {
            FeaturizeError::CatalogReadFailed(format!("{}: {}", self.path.display(), e))
        })
    }

    fn append(&self, entries: &[FeatureCatalogEntry]) -> Result<()> {
        let _guard = self
            .lock
            .write()
            .map_err(|_| FeaturizeError::CatalogWriteFailed("catalog lock poisoned".into()))?;
        let write_failed = |e: String| {
            FeaturizeError::CatalogWriteFailed(format!("{}: {}", self.path.display(), e))
        };

        let mut all = self.read_document().map_err(write_failed)?;
        all.extend_from_slice(entries);
        let total = all.len();
        self.write_document(all).map_err(write_failed)?;
        info!(path = %self.path.display(), appended = entries.len(), total, "catalog written");
        Ok(())
    }
}

/// Reads and commits through `inner`, then replays each committed batch as
/// one `INSERT` into the query engine's catalog table.
///
/// `inner` stays the source of truth. A batch whose `INSERT` cannot be
/// submitted is already committed locally and the submission error is returned.
pub struct SqlMirrorCatalog<C> {
    inner: C,
    table: String,
    sink: Arc<dyn QuerySink>,
}

impl<C: FeatureCatalog> SqlMirrorCatalog<C> {
    pub fn new(inner: C, table: impl Into<String>, sink: Arc<dyn QuerySink>) -> Self {
        Self {
            inner,
            table: table.into(),
            sink,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: FeatureCatalog> FeatureCatalog for SqlMirrorCatalog<C> {
    fn entries(&self) -> Result<Vec<FeatureCatalogEntry>> {
        self.inner.entries()
    }

    fn append(&self, entries: &[FeatureCatalogEntry]) -> Result<()> {
        self.inner.append(entries)?;
        if let Some(sql) = insert_statement(&self.table, entries) {
            if let Err(err) = self.sink.submit(&sql) {
                warn!(table = %self.table, %err, "catalog mirror submission failed");
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Catalog table columns in the query engine.
pub mod catalog_columns {
    pub const FEATURE_INDEX: &str = "feature_ind";
    pub const ATTRIBUTE: &str = "attribute";
    pub const DEFINING_EXPRESSION: &str = "value";
    pub const KIND: &str = "Type";
}

/// Single INSERT appending a training batch. `None` for an empty batch.
pub fn insert_statement(table: &str, entries: &[FeatureCatalogEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                Expression::Literal(Literal::Integer(e.feature_index)),
                Expression::Literal(Literal::String(e.attribute.clone())),
                Expression::Literal(Literal::String(e.defining_expression.clone())),
                Expression::Literal(Literal::String(e.kind.clone())),
            ]
        })
        .collect();
    debug!(table, rows = entries.len(), "built catalog insert");

    Some(compile(&Query::Insert(InsertQuery {
        table: table.to_string(),
        columns: vec![
            catalog_columns::FEATURE_INDEX.to_string(),
            catalog_columns::ATTRIBUTE.to_string(),
            catalog_columns::DEFINING_EXPRESSION.to_string(),
            catalog_columns::KIND.to_string(),
        ],
        rows,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_single;
    use crate::sink::BufferSink;

    fn entry(index: i64, kind: &str) -> FeatureCatalogEntry {
        FeatureCatalogEntry {
            feature_index: index,
            attribute: "zip".into(),
            defining_expression: "postab.attrName = 'zip'".into(),
            kind: kind.into(),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("dcsignal-test-{}-{}", std::process::id(), name))
            .join("catalog.json")
    }

    #[test]
    fn test_in_memory_append_and_read() {
        let catalog = InMemoryCatalog::with_entries(vec![entry(1, "init")]);
        catalog.append(&[entry(2, "DC"), entry(3, "DC")]).unwrap();
        let entries = catalog.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].feature_index, 3);
    }

    #[test]
    fn test_json_catalog_missing_file_is_empty() {
        let catalog = JsonFileCatalog::new(temp_path("missing"));
        assert!(catalog.entries().unwrap().is_empty());
    }

    #[test]
    fn test_json_catalog_persists_batches() {
        let path = temp_path("persist");
        let _ = std::fs::remove_file(&path);

        let catalog = JsonFileCatalog::new(&path);
        catalog.append(&[entry(1, "init")]).unwrap();
        catalog.append(&[entry(2, "DC"), entry(3, "DC")]).unwrap();

        let reopened = JsonFileCatalog::new(&path);
        let entries = reopened.entries().unwrap();
        assert_eq!(entries, vec![entry(1, "init"), entry(2, "DC"), entry(3, "DC")]);
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_json_catalog_corrupt_file() {
        let path = temp_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let catalog = JsonFileCatalog::new(&path);
        assert!(matches!(
            catalog.entries(),
            Err(FeaturizeError::CatalogReadFailed(_))
        ));
        assert!(matches!(
            catalog.append(&[entry(1, "DC")]),
            Err(FeaturizeError::CatalogWriteFailed(_))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_insert_statement() {
        assert_eq!(insert_statement("t", &[]), None);
        let sql = insert_statement("Feature_id_map_1", &[entry(8, "DC"), entry(9, "DC")]).unwrap();
        assert!(sql.starts_with(
            "INSERT INTO Feature_id_map_1 (feature_ind, attribute, value, Type) VALUES (8, 'zip', "
        ));
        assert!(sql.contains("'postab.attrName = ''zip'''"));
        assert!(parse_single(&sql).is_ok(), "{}", sql);
    }

    #[test]
    fn test_mirror_submits_insert_after_commit() {
        let sink = Arc::new(BufferSink::new());
        let catalog = SqlMirrorCatalog::new(
            InMemoryCatalog::with_entries(vec![entry(3, "init")]),
            "Feature_id_map_1",
            sink.clone(),
        );
        catalog.append(&[entry(4, "DC"), entry(5, "DC")]).unwrap();
        catalog.append(&[]).unwrap();

        assert_eq!(catalog.entries().unwrap().len(), 3);
        let submitted = sink.snapshot();
        assert_eq!(submitted.len(), 1);
        assert_eq!(
            Some(submitted[0].clone()),
            insert_statement(catalog.table(), &[entry(4, "DC"), entry(5, "DC")])
        );
    }

    struct ClosedSink;

    impl QuerySink for ClosedSink {
        fn submit(&self, _query: &str) -> Result<()> {
            Err(FeaturizeError::SinkSubmissionFailed("closed".into()))
        }
    }

    #[test]
    fn test_mirror_failure_keeps_local_commit() {
        let catalog = SqlMirrorCatalog::new(InMemoryCatalog::new(), "t", Arc::new(ClosedSink));
        let err = catalog.append(&[entry(1, "DC")]).unwrap_err();
        assert!(matches!(err, FeaturizeError::SinkSubmissionFailed(_)));
        assert_eq!(catalog.inner().entries().unwrap(), vec![entry(1, "DC")]);
    }
}
