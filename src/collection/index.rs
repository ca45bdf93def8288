//! Inverted indexes over one field locator of one collection.
//!
//! An index keeps two tables: `value_keys` answers equality lookups, and
//! `key_values` remembers what each document contributed so a re-index of a
//! key can strip its prior entries before inserting the new ones. Both are
//! ordered maps, so persisting an unchanged index produces identical bytes.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errinput;
use crate::error::{Error, Result};
use crate::extract::{extract, FieldType};
use crate::key::{self, Key};
use crate::layout;

use super::Collection;

/// Metadata describing one index. The catalog holds these for query
/// planning, so plans never load full inverted maps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexInfo {
    pub collection_name: String,
    pub field_locator: String,
    /// Discovered from the first extracted value; fixed afterwards.
    pub field_type: Option<FieldType>,
    /// Number of distinct stringified values currently indexed.
    pub num_values: usize,
    /// Where the full index blob is persisted.
    pub file_path: PathBuf,
}

/// A full inverted index, loaded from disk for builds, incremental updates,
/// and query execution, and dropped when the operation completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Index {
    collection_name: String,
    field_locator: String,
    field_type: Option<FieldType>,
    num_values: usize,
    file_path: PathBuf,
    /// value string → keys of the documents that produced it, in insertion
    /// order. A key appears at most once per value.
    value_keys: BTreeMap<String, Vec<Key>>,
    /// key → value strings the document produced, duplicates preserved.
    key_values: BTreeMap<Key, Vec<String>>,
}

impl Index {
    pub(crate) fn new(collection_name: &str, collection_dir: &Path, field_locator: &str) -> Self {
        Index {
            collection_name: collection_name.to_string(),
            field_locator: field_locator.to_string(),
            field_type: None,
            num_values: 0,
            file_path: layout::index_path(collection_dir, field_locator),
            value_keys: BTreeMap::new(),
            key_values: BTreeMap::new(),
        }
    }

    /// The metadata published to the catalog.
    pub(crate) fn info(&self) -> IndexInfo {
        IndexInfo {
            collection_name: self.collection_name.clone(),
            field_locator: self.field_locator.clone(),
            field_type: self.field_type,
            num_values: self.num_values,
            file_path: self.file_path.clone(),
        }
    }

    /// Returns the keys of all documents that produced the given value, in
    /// insertion order.
    pub fn lookup(&self, value: &str) -> &[Key] {
        self.value_keys.get(value).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Builds the index from scratch by walking every partition directory of
    /// the collection. Any failure aborts the build; the caller must not
    /// publish a partially built index.
    pub(crate) fn build(&mut self, collection: &Collection) -> Result<()> {
        tracing::debug!(
            collection = %self.collection_name,
            field = %self.field_locator,
            "Building index"
        );
        let data_dir = collection.data_dir();
        for entry in fs::read_dir(&data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_dir() {
                tracing::warn!(path = %path.display(), "Not a partition directory, skipping");
                continue;
            }
            for doc_entry in fs::read_dir(&path)? {
                let doc_entry = doc_entry?;
                let name = doc_entry.file_name();
                let Some(name) = name.to_str() else {
                    return errinput!("non UTF-8 document filename under {}", path.display());
                };
                let doc_key = key::parse_filename(name)?;
                let doc: Value = collection.get_struct(doc_key)?;
                self.apply(doc_key, &doc)?;
            }
        }
        Ok(())
    }

    /// Replaces the key's contribution to the index with what the given
    /// document content produces. Repeated calls with the same content leave
    /// the index unchanged.
    pub(crate) fn apply(&mut self, doc_key: Key, doc: &Value) -> Result<()> {
        let extracted = extract(doc, &self.field_locator)?;

        // Settle the field kind before touching the tables, so a conflict
        // leaves the index exactly as it was.
        let mut field_type = self.field_type;
        for (value, kind) in &extracted {
            match field_type {
                None => field_type = Some(*kind),
                Some(expected) if expected != *kind => {
                    return Err(Error::TypeConflict(format!(
                        "field {} of collection {} is indexed as {expected}, \
                         document {doc_key} produced the {kind} value {value}",
                        self.field_locator, self.collection_name
                    )));
                }
                Some(_) => {}
            }
        }

        // Strip the key's prior contribution.
        if let Some(old_values) = self.key_values.remove(&doc_key) {
            for value in old_values {
                if let Some(keys) = self.value_keys.get_mut(&value) {
                    keys.retain(|k| *k != doc_key);
                    if keys.is_empty() {
                        self.value_keys.remove(&value);
                    }
                }
            }
        }

        // Re-insert. Duplicates within one document are preserved in
        // key_values but a key is listed at most once per value.
        let mut values = Vec::with_capacity(extracted.len());
        for (value, _) in extracted {
            let keys = self.value_keys.entry(value.clone()).or_default();
            if !keys.contains(&doc_key) {
                keys.push(doc_key);
            }
            values.push(value);
        }
        if !values.is_empty() {
            self.key_values.insert(doc_key, values);
        }

        self.field_type = field_type;
        self.num_values = self.value_keys.len();
        Ok(())
    }

    /// Persists the whole index as one JSON blob at its file path.
    pub(crate) fn save(&self) -> Result<()> {
        tracing::debug!(
            collection = %self.collection_name,
            field = %self.field_locator,
            "Saving index"
        );
        let data = serde_json::to_vec(self)?;
        let mut file = layout::create_file(&self.file_path)?;
        file.write_all(&data)?;
        Ok(())
    }

    /// Loads the index blob for the given field locator. The file path is
    /// re-derived from the collection's location rather than trusted from
    /// the blob, so relocated stores keep working.
    pub(crate) fn load(collection_dir: &Path, field_locator: &str) -> Result<Index> {
        let path = layout::index_path(collection_dir, field_locator);
        let data = fs::read(&path)?;
        let mut index: Index = serde_json::from_slice(&data)?;
        index.file_path = path;
        Ok(index)
    }
}
