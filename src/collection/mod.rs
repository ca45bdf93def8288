//! Collections: named, schemaless sets of documents addressed by integer
//! keys. Each document is one file on disk, spread across partition
//! directories by `key mod num_partitions`.

pub mod index;
pub mod search;

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::{self, Encoding};
use crate::errinput;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::layout;

pub use index::{Index, IndexInfo};

const NAME_LEN_MIN: usize = 2;
const NAME_LEN_MAX: usize = 50;

/// Properties of a collection, fixed at creation. `num_partitions` only
/// changes through a repartition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionProps {
    pub name: String,
    pub encoding: Encoding,
    pub enable_gzip_compression: bool,
    pub num_partitions: u32,
}

impl CollectionProps {
    /// Creates properties for a JSON-encoded, uncompressed collection with a
    /// single partition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encoding: Encoding::Json,
            enable_gzip_compression: false,
            num_partitions: 1,
        }
    }

    /// Sets the document encoding.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Enables gzip compression of document files.
    pub fn gzip_compression(mut self, enabled: bool) -> Self {
        self.enable_gzip_compression = enabled;
        self
    }

    /// Sets the number of partition directories documents are spread over.
    pub fn num_partitions(mut self, num_partitions: u32) -> Self {
        self.num_partitions = num_partitions;
        self
    }

    /// Normalizes the properties: the name is trimmed and lowercased, and a
    /// partition count of zero means one partition.
    pub(crate) fn sanitize(mut self) -> Self {
        self.name = self.name.trim().to_lowercase();
        if self.num_partitions == 0 {
            self.num_partitions = 1;
        }
        self
    }

    /// Validates sanitized properties.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.len() < NAME_LEN_MIN {
            return errinput!("collection name must be at least {NAME_LEN_MIN} characters");
        }
        if self.name.len() > NAME_LEN_MAX {
            return errinput!("collection name can be at most {NAME_LEN_MAX} characters");
        }
        if !self.name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return errinput!("collection name can only contain alphanumeric characters");
        }
        Ok(())
    }
}

/// The index metadata of one collection, keyed by field locator.
#[derive(Debug, Default)]
struct IndexStore {
    store: RwLock<HashMap<String, IndexInfo>>,
}

/// A registered collection. All operations take `&self`; the index store is
/// internally locked, and document files are only held open for the duration
/// of a single operation.
#[derive(Debug)]
pub struct Collection {
    props: CollectionProps,
    dir_path: PathBuf,
    indexes: IndexStore,
}

impl Collection {
    pub(crate) fn new(props: CollectionProps, dir_path: PathBuf) -> Self {
        Self::with_indexes(props, dir_path, HashMap::new())
    }

    pub(crate) fn with_indexes(
        props: CollectionProps,
        dir_path: PathBuf,
        indexes: HashMap<String, IndexInfo>,
    ) -> Self {
        Collection {
            props,
            dir_path,
            indexes: IndexStore {
                store: RwLock::new(indexes),
            },
        }
    }

    pub fn props(&self) -> &CollectionProps {
        &self.props
    }

    pub(crate) fn dir_path(&self) -> &Path {
        &self.dir_path
    }

    /// Directory holding this collection's partition directories.
    pub(crate) fn data_dir(&self) -> PathBuf {
        layout::collection_data_dir(&self.dir_path)
    }

    fn document_path(&self, doc_key: Key) -> PathBuf {
        layout::document_path(
            &self.dir_path,
            &self.props.name,
            doc_key,
            self.props.num_partitions,
            self.props.enable_gzip_compression,
        )
    }

    /// Writes a document, overwriting any prior content, and then updates
    /// every index of the collection with it.
    ///
    /// The file is written in place with a plain create-write-close, so a
    /// crash mid-write can leave a truncated file; the next successful write
    /// of the key repairs it. If index maintenance fails the write itself
    /// stays: the document is retrievable by `get` but may be missing from
    /// index lookups until the key is set again.
    pub fn set(&self, doc_key: Key, data: &[u8]) -> Result<()> {
        let partition_dir =
            layout::partition_dir(&self.dir_path, doc_key, self.props.num_partitions);
        layout::create_dir_if_not_exist(&partition_dir)?;

        let file = layout::create_file(&self.document_path(doc_key))?;
        if self.props.enable_gzip_compression {
            codec::write_compressed(file, data)?;
        } else {
            let mut file = file;
            file.write_all(data)?;
        }

        if self.can_index() {
            self.update_indexes_for_key(doc_key)
                .map_err(|e| Error::IndexUpdate(e.to_string()))?;
        }
        Ok(())
    }

    /// Serializes a value per the collection encoding and stores it under
    /// the key.
    pub fn set_struct<T: Serialize>(&self, doc_key: Key, value: &T) -> Result<()> {
        let data = codec::encode(self.props.encoding, value)?;
        self.set(doc_key, &data)
    }

    /// Reads a document's payload, decompressing it when the collection is
    /// gzip-enabled.
    pub fn get(&self, doc_key: Key) -> Result<Vec<u8>> {
        let file = self.get_file(doc_key)?;
        codec::read_to_end(file, self.props.enable_gzip_compression)
    }

    /// Like `get`, but absence is `None` rather than an error.
    pub fn get_if_exists(&self, doc_key: Key) -> Result<Option<Vec<u8>>> {
        match self.get(doc_key) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Reads and deserializes a document per the collection encoding.
    pub fn get_struct<T: DeserializeOwned>(&self, doc_key: Key) -> Result<T> {
        codec::decode(self.props.encoding, &self.get(doc_key)?)
    }

    /// Like `get_struct`, but absence is `None` rather than an error.
    pub fn get_struct_if_exists<T: DeserializeOwned>(&self, doc_key: Key) -> Result<Option<T>> {
        match self.get_struct(doc_key) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Opens the raw document file for streaming. The handle serves the
    /// stored bytes, compressed for gzip-enabled collections.
    pub fn get_file(&self, doc_key: Key) -> Result<File> {
        Ok(File::open(self.document_path(doc_key))?)
    }

    /// Copies the raw document file into the writer and returns the number
    /// of bytes copied. Does not decompress.
    pub fn get_into_writer(&self, doc_key: Key, dest: &mut impl Write) -> Result<u64> {
        let mut file = self.get_file(doc_key)?;
        Ok(std::io::copy(&mut file, dest)?)
    }

    /// Whether documents of this collection can back field indexes.
    pub fn can_index(&self) -> bool {
        self.props.encoding.is_indexable()
    }

    /// Creates an index over the given field locator: builds it from every
    /// document currently in the collection, persists it, and publishes its
    /// metadata. Fails with `AlreadyExists` if the locator is indexed and
    /// leaves nothing published when the build fails.
    pub fn add_index(&self, field_locator: &str) -> Result<()> {
        if !self.can_index() {
            return errinput!(
                "indexes require the JSON encoding, collection {} uses {:?}",
                self.props.name,
                self.props.encoding
            );
        }
        if field_locator.is_empty() || field_locator.chars().any(std::path::is_separator) {
            return errinput!("invalid field locator {field_locator:?}");
        }
        if self.is_index_exist(field_locator)? {
            return Err(Error::AlreadyExists(format!(
                "index on field {field_locator}"
            )));
        }

        let mut index = Index::new(&self.props.name, &self.dir_path, field_locator);
        index.build(self)?;
        index.save()?;

        let mut store = self.indexes.store.write()?;
        if store.contains_key(field_locator) {
            return Err(Error::AlreadyExists(format!(
                "index on field {field_locator}"
            )));
        }
        store.insert(field_locator.to_string(), index.info());
        Ok(())
    }

    pub(crate) fn is_index_exist(&self, field_locator: &str) -> Result<bool> {
        Ok(self.indexes.store.read()?.contains_key(field_locator))
    }

    pub(crate) fn index_info(&self, field_locator: &str) -> Result<Option<IndexInfo>> {
        Ok(self.indexes.store.read()?.get(field_locator).cloned())
    }

    pub(crate) fn index_infos(&self) -> Result<HashMap<String, IndexInfo>> {
        Ok(self.indexes.store.read()?.clone())
    }

    pub(crate) fn load_index(&self, field_locator: &str) -> Result<Index> {
        if !self.is_index_exist(field_locator)? {
            return Err(Error::NotFound(format!("no index on field {field_locator}")));
        }
        Index::load(&self.dir_path, field_locator)
    }

    /// Re-indexes the document under `doc_key` in every index of the
    /// collection, reading the stored content back so the indexes reflect
    /// exactly what a later `get` will serve.
    fn update_indexes_for_key(&self, doc_key: Key) -> Result<()> {
        let locators: Vec<String> = {
            let store = self.indexes.store.read()?;
            store.keys().cloned().collect()
        };
        if locators.is_empty() {
            return Ok(());
        }

        let doc: serde_json::Value = self.get_struct(doc_key)?;
        for locator in locators {
            let mut index = self.load_index(&locator)?;
            index.apply(doc_key, &doc)?;
            index.save()?;
            self.indexes.store.write()?.insert(locator, index.info());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_props_sanitize() {
        let props = CollectionProps::new("  Users  ").sanitize();
        assert_eq!(props.name, "users");
        assert_eq!(props.num_partitions, 1);

        let props = CollectionProps::new("users").num_partitions(0).sanitize();
        assert_eq!(props.num_partitions, 1);
    }

    #[test]
    fn test_props_validate() {
        assert!(CollectionProps::new("users").sanitize().validate().is_ok());
        assert!(CollectionProps::new("u2").sanitize().validate().is_ok());

        // Too short, too long, or non-alphanumeric names are rejected.
        assert!(CollectionProps::new("u").sanitize().validate().is_err());
        assert!(CollectionProps::new("").sanitize().validate().is_err());
        assert!(CollectionProps::new("x".repeat(51)).sanitize().validate().is_err());
        assert!(CollectionProps::new("my-users").sanitize().validate().is_err());
        assert!(CollectionProps::new("my users").sanitize().validate().is_err());
    }

    #[test]
    fn test_props_builder_defaults() {
        let props = CollectionProps::new("users");
        assert_eq!(props.encoding, Encoding::Json);
        assert!(!props.enable_gzip_compression);
        assert_eq!(props.num_partitions, 1);
    }

    #[test]
    fn test_add_index_requires_json_encoding() {
        let props = CollectionProps::new("blobs").encoding(Encoding::Bincode).sanitize();
        let collection = Collection::new(props, PathBuf::from("/w/data/blobs"));
        let err = collection.add_index("Age").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_add_index_rejects_bad_locators() {
        let props = CollectionProps::new("users").sanitize();
        let collection = Collection::new(props, PathBuf::from("/w/data/users"));
        assert!(collection.add_index("").is_err());
        assert!(collection.add_index("a/b").is_err());
    }
}
