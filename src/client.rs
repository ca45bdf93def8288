//! The client: the entry point applications use to manage collections and
//! documents. A `Client` owns the catalog of one store rooted under the
//! configured document root; every operation resolves the named collection
//! and forwards to it.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::collection::CollectionProps;
use crate::errinput;
use crate::error::Result;
use crate::key::Key;
use crate::layout;
use crate::repartition;

/// Name of the store directory created under the configured document root.
pub const WAREHOUSE_DIR_NAME: &str = "filedb_warehouse";

/// Store initialization options.
#[derive(Clone, Debug)]
pub struct Options {
    /// An existing directory the store may use. The store itself lives in a
    /// warehouse sub-directory created under it.
    pub document_root: PathBuf,
    /// Delete any previous store under the document root first.
    pub overwrite_previous_data: bool,
}

impl Options {
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        Options {
            document_root: document_root.into(),
            overwrite_previous_data: false,
        }
    }

    /// Deletes any previous store under the document root during
    /// initialization.
    pub fn overwrite_previous_data(mut self, enabled: bool) -> Self {
        self.overwrite_previous_data = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.document_root.as_os_str().is_empty() {
            return errinput!("empty document root");
        }
        match fs::metadata(&self.document_root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => errinput!("{} is not a directory", self.document_root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                errinput!("no directory found at {}", self.document_root.display())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn effective_root(&self) -> PathBuf {
        self.document_root.join(WAREHOUSE_DIR_NAME)
    }
}

/// The outcome of a search, with the decoded matching documents in no
/// particular order.
#[derive(Debug)]
pub struct SearchResponse {
    pub collection: String,
    pub query: String,
    pub time_taken: Duration,
    pub num_documents: usize,
    pub results: Vec<serde_json::Value>,
}

/// A handle to one store. All operations take `&self` and may be called
/// concurrently from any thread.
#[derive(Debug)]
pub struct Client {
    root: PathBuf,
    catalog: Catalog,
}

impl Client {
    /// Opens the store under the options' document root, creating the
    /// warehouse directory skeleton and reloading the catalog persisted by a
    /// previous run.
    pub fn initialize(options: Options) -> Result<Client> {
        options.validate()?;
        let root = options.effective_root();
        if options.overwrite_previous_data && root.exists() {
            tracing::info!(path = %root.display(), "Overwriting previous store");
            fs::remove_dir_all(&root)?;
        }
        layout::create_dir_if_not_exist(&root)?;
        layout::create_dir_if_not_exist(&root.join(layout::META_DIR_NAME))?;
        layout::create_dir_if_not_exist(&root.join(layout::DATA_DIR_NAME))?;

        let catalog = Catalog::open(root.clone())?;
        Ok(Client { root, catalog })
    }

    /// Registers a new collection.
    pub fn add_collection(&self, props: CollectionProps) -> Result<()> {
        self.catalog.add_collection(props)
    }

    /// Unregisters a collection and deletes all of its data.
    pub fn remove_collection(&self, name: &str) -> Result<()> {
        self.catalog.remove_collection(name)
    }

    /// Whether a collection with this name exists.
    pub fn collection_exists(&self, name: &str) -> Result<bool> {
        self.catalog.contains(name)
    }

    /// Writes a raw document into the named collection.
    pub fn set(&self, collection: &str, doc_key: impl Into<Key>, data: &[u8]) -> Result<()> {
        self.catalog.get(collection)?.set(doc_key.into(), data)
    }

    /// Serializes a value per the collection's encoding and stores it.
    pub fn set_struct<T: Serialize>(
        &self,
        collection: &str,
        doc_key: impl Into<Key>,
        value: &T,
    ) -> Result<()> {
        self.catalog.get(collection)?.set_struct(doc_key.into(), value)
    }

    /// Reads a document's payload.
    pub fn get(&self, collection: &str, doc_key: impl Into<Key>) -> Result<Vec<u8>> {
        self.catalog.get(collection)?.get(doc_key.into())
    }

    /// Like `get`, but a missing document is `None` rather than an error.
    pub fn get_if_exists(
        &self,
        collection: &str,
        doc_key: impl Into<Key>,
    ) -> Result<Option<Vec<u8>>> {
        self.catalog.get(collection)?.get_if_exists(doc_key.into())
    }

    /// Reads and deserializes a document per the collection's encoding.
    pub fn get_struct<T: DeserializeOwned>(
        &self,
        collection: &str,
        doc_key: impl Into<Key>,
    ) -> Result<T> {
        self.catalog.get(collection)?.get_struct(doc_key.into())
    }

    /// Like `get_struct`, but a missing document is `None` rather than an
    /// error.
    pub fn get_struct_if_exists<T: DeserializeOwned>(
        &self,
        collection: &str,
        doc_key: impl Into<Key>,
    ) -> Result<Option<T>> {
        self.catalog
            .get(collection)?
            .get_struct_if_exists(doc_key.into())
    }

    /// Opens the raw document file for streaming.
    pub fn get_file(&self, collection: &str, doc_key: impl Into<Key>) -> Result<fs::File> {
        self.catalog.get(collection)?.get_file(doc_key.into())
    }

    /// Copies the raw document file into the writer. Does not decompress.
    pub fn get_into_writer(
        &self,
        collection: &str,
        doc_key: impl Into<Key>,
        dest: &mut impl Write,
    ) -> Result<u64> {
        self.catalog
            .get(collection)?
            .get_into_writer(doc_key.into(), dest)
    }

    /// Creates an index over a field locator of the named collection,
    /// building it from all documents already stored.
    pub fn add_index(&self, collection: &str, field_locator: &str) -> Result<()> {
        self.catalog.add_index(collection, field_locator)
    }

    /// Evaluates an equality-conjunction query against the named collection.
    pub fn search(&self, collection: &str, query: &str) -> Result<SearchResponse> {
        let start = Instant::now();
        let collection = self.catalog.get(collection)?;
        let results = collection.search(query)?;
        Ok(SearchResponse {
            collection: collection.props().name.clone(),
            query: query.to_string(),
            time_taken: start.elapsed(),
            num_documents: results.len(),
            results,
        })
    }

    /// Moves the named collection's documents into the layout for the new
    /// partition count, then records the count in the catalog. Fails with
    /// `Busy` when a repartition is running anywhere in the process.
    pub fn repartition_collection(&self, name: &str, num_partitions: u32) -> Result<()> {
        if num_partitions == 0 {
            return errinput!("invalid partition count {num_partitions}");
        }
        let collection = self.catalog.get(name)?;
        repartition::repartition(&collection.data_dir(), num_partitions)?;
        self.catalog.set_num_partitions(name, num_partitions)
    }

    /// Deletes the whole store, collections and catalog included.
    pub fn destroy(self) -> Result<()> {
        tracing::info!(path = %self.root.display(), "Destroying store");
        fs::remove_dir_all(&self.root)?;
        Ok(())
    }
}

pub mod global {
    //! An optional process-wide client for applications that want singleton
    //! ergonomics. Nothing else in the crate touches this state.

    use std::sync::OnceLock;

    use super::{Client, Options};
    use crate::error::{Error, Result};

    static CLIENT: OnceLock<Client> = OnceLock::new();

    /// Initializes the process-wide client. Fails with `AlreadyInitialized`
    /// if called more than once.
    pub fn init(options: Options) -> Result<()> {
        let client = Client::initialize(options)?;
        CLIENT.set(client).map_err(|_| Error::AlreadyInitialized)
    }

    /// Returns the process-wide client.
    ///
    /// # Panics
    ///
    /// Panics when called before a successful [`init`]: using the store
    /// before initializing it is a programming error.
    pub fn client() -> &'static Client {
        CLIENT
            .get()
            .expect("filedb client used before initialization")
    }
}
