//! The catalog: the process-wide registry of collections and their index
//! metadata, persisted as a single binary snapshot under the store root.
//!
//! The snapshot is a bincode record framed as
//! `[length: u32 BE][crc64 checksum: u64 BE][record bytes]`; the checksum is
//! verified on load. Every mutation rewrites the whole snapshot, so a later
//! `Client::initialize` observes a consistent state.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, CollectionProps, IndexInfo};
use crate::error::{Error, Result};
use crate::layout;

/// Registry of all collections in one store. Owns the collection
/// descriptors; lookups hand out shared references.
#[derive(Debug)]
pub struct Catalog {
    root: PathBuf,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

/// The persisted form of the catalog. Holds everything needed to rebuild the
/// descriptors, but never the full inverted maps.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogRecord {
    collections: Vec<CollectionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionRecord {
    props: CollectionProps,
    dir_path: PathBuf,
    indexes: HashMap<String, IndexInfo>,
}

impl Catalog {
    /// Opens the catalog under the given effective root, loading the
    /// snapshot if one was persisted before.
    pub fn open(root: PathBuf) -> Result<Self> {
        let catalog = Catalog {
            root,
            collections: RwLock::new(HashMap::new()),
        };
        let path = layout::catalog_path(&catalog.root);
        if path.is_file() {
            catalog.load(&path)?;
        }
        Ok(catalog)
    }

    /// Looks up a collection by name. Names are matched after trimming and
    /// lowercasing, like `add_collection` stores them.
    pub fn get(&self, name: &str) -> Result<Arc<Collection>> {
        let name = name.trim().to_lowercase();
        let collections = self.collections.read()?;
        collections
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("collection {name}")))
    }

    /// Whether a collection with this name is registered.
    pub fn contains(&self, name: &str) -> Result<bool> {
        let name = name.trim().to_lowercase();
        Ok(self.collections.read()?.contains_key(&name))
    }

    /// Registers a new collection: validates its properties, creates its
    /// directory skeleton, and persists the catalog.
    pub fn add_collection(&self, props: CollectionProps) -> Result<()> {
        let props = props.sanitize();
        props.validate()?;

        let dir_path = layout::collection_dir(&self.root, &props.name);
        let collection = Collection::new(props, dir_path);

        let mut collections = self.collections.write()?;
        if collections.contains_key(&collection.props().name) {
            return Err(Error::AlreadyExists(format!(
                "collection {}",
                collection.props().name
            )));
        }

        layout::create_dir_if_not_exist(&collection.data_dir())?;
        layout::create_dir_if_not_exist(&layout::collection_meta_dir(collection.dir_path()))?;
        layout::create_dir_if_not_exist(&layout::collection_indexes_dir(collection.dir_path()))?;

        let name = collection.props().name.clone();
        collections.insert(name, Arc::new(collection));
        self.persist(&collections)
    }

    /// Unregisters a collection and deletes everything it stored.
    pub fn remove_collection(&self, name: &str) -> Result<()> {
        let name = name.trim().to_lowercase();
        let mut collections = self.collections.write()?;
        let collection = collections
            .remove(&name)
            .ok_or_else(|| Error::NotFound(format!("collection {name}")))?;

        tracing::info!(collection = %name, path = %collection.dir_path().display(), "Removing collection");
        fs::remove_dir_all(collection.dir_path())?;
        self.persist(&collections)
    }

    /// Creates an index on the named collection and persists the catalog so
    /// the new index survives restarts.
    pub fn add_index(&self, name: &str, field_locator: &str) -> Result<()> {
        let collection = self.get(name)?;
        collection.add_index(field_locator)?;
        let collections = self.collections.read()?;
        self.persist(&collections)
    }

    /// Replaces a collection's partition count after its files have been
    /// moved, and persists the catalog.
    pub fn set_num_partitions(&self, name: &str, num_partitions: u32) -> Result<()> {
        let name = name.trim().to_lowercase();
        let mut collections = self.collections.write()?;
        let collection = collections
            .get(&name)
            .ok_or_else(|| Error::NotFound(format!("collection {name}")))?;

        let mut props = collection.props().clone();
        props.num_partitions = num_partitions;
        let replacement = Collection::with_indexes(
            props,
            collection.dir_path().to_path_buf(),
            collection.index_infos()?,
        );
        collections.insert(name, Arc::new(replacement));
        self.persist(&collections)
    }

    /// Rewrites the snapshot from the in-memory state. Called with the
    /// collection map locked so concurrent mutations serialize.
    fn persist(&self, collections: &HashMap<String, Arc<Collection>>) -> Result<()> {
        let mut records = Vec::with_capacity(collections.len());
        for collection in collections.values() {
            records.push(CollectionRecord {
                props: collection.props().clone(),
                dir_path: collection.dir_path().to_path_buf(),
                indexes: collection.index_infos()?,
            });
        }
        let record_bytes = bincode::serialize(&CatalogRecord {
            collections: records,
        })?;

        let mut digest = crc64fast::Digest::new();
        digest.write(&record_bytes);

        let mut file = layout::create_file(&layout::catalog_path(&self.root))?;
        file.write_u32::<BigEndian>(record_bytes.len() as u32)?;
        file.write_u64::<BigEndian>(digest.sum64())?;
        file.write_all(&record_bytes)?;
        Ok(())
    }

    /// Loads the snapshot, verifying the frame checksum before decoding.
    fn load(&self, path: &Path) -> Result<()> {
        let mut file = fs::File::open(path)?;
        let length = file.read_u32::<BigEndian>()? as usize;
        let stored_checksum = file.read_u64::<BigEndian>()?;
        let mut record_bytes = vec![0u8; length];
        file.read_exact(&mut record_bytes)?;

        let mut digest = crc64fast::Digest::new();
        digest.write(&record_bytes);
        if digest.sum64() != stored_checksum {
            return Err(Error::Codec(format!(
                "catalog snapshot checksum mismatch: stored={stored_checksum}, computed={}",
                digest.sum64()
            )));
        }

        let record: CatalogRecord = bincode::deserialize(&record_bytes)?;
        let mut collections = self.collections.write()?;
        for entry in record.collections {
            let collection = Collection::with_indexes(entry.props, entry.dir_path, entry.indexes);
            collections.insert(collection.props().name.clone(), Arc::new(collection));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoding;
    use std::io::Seek;
    use tempfile::tempdir;

    fn open_catalog(root: &Path) -> Result<Catalog> {
        layout::create_dir_if_not_exist(&root.join(layout::META_DIR_NAME))?;
        Catalog::open(root.to_path_buf())
    }

    #[test]
    fn test_add_and_get_collection() -> Result<()> {
        let dir = tempdir()?;
        let catalog = open_catalog(dir.path())?;

        catalog.add_collection(CollectionProps::new("Users").num_partitions(3))?;

        // Lookups are case-insensitive, matching the stored lowercase name.
        let collection = catalog.get("users")?;
        assert_eq!(collection.props().name, "users");
        assert_eq!(collection.props().num_partitions, 3);
        assert!(catalog.get("USERS").is_ok());
        assert!(catalog.contains(" users ")?);
        assert!(!catalog.contains("orgs")?);

        // The directory skeleton exists.
        assert!(collection.data_dir().is_dir());
        assert!(layout::collection_indexes_dir(collection.dir_path()).is_dir());
        Ok(())
    }

    #[test]
    fn test_duplicate_collection_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let catalog = open_catalog(dir.path())?;
        catalog.add_collection(CollectionProps::new("users"))?;
        let err = catalog
            .add_collection(CollectionProps::new("Users"))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        Ok(())
    }

    #[test]
    fn test_snapshot_survives_reopen() -> Result<()> {
        let dir = tempdir()?;
        {
            let catalog = open_catalog(dir.path())?;
            catalog.add_collection(
                CollectionProps::new("users")
                    .num_partitions(3)
                    .encoding(Encoding::Json),
            )?;
            catalog.add_collection(
                CollectionProps::new("org")
                    .gzip_compression(true)
                    .encoding(Encoding::Bincode),
            )?;
        }

        let catalog = Catalog::open(dir.path().to_path_buf())?;
        let users = catalog.get("users")?;
        assert_eq!(users.props().num_partitions, 3);
        let org = catalog.get("org")?;
        assert!(org.props().enable_gzip_compression);
        assert_eq!(org.props().encoding, Encoding::Bincode);
        Ok(())
    }

    #[test]
    fn test_remove_collection_deletes_data() -> Result<()> {
        let dir = tempdir()?;
        let catalog = open_catalog(dir.path())?;
        catalog.add_collection(CollectionProps::new("users"))?;
        let collection_dir = catalog.get("users")?.dir_path().to_path_buf();
        assert!(collection_dir.is_dir());

        catalog.remove_collection("users")?;
        assert!(!collection_dir.exists());
        assert!(catalog.get("users").unwrap_err().is_not_found());

        // The removal is persisted.
        let catalog = Catalog::open(dir.path().to_path_buf())?;
        assert!(!catalog.contains("users")?);
        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot_is_detected() -> Result<()> {
        let dir = tempdir()?;
        {
            let catalog = open_catalog(dir.path())?;
            catalog.add_collection(CollectionProps::new("users"))?;
        }

        // Flip bytes in the record body, past the 12-byte frame header.
        let path = layout::catalog_path(dir.path());
        let mut file = fs::OpenOptions::new().write(true).open(&path)?;
        file.seek(std::io::SeekFrom::Start(16))?;
        file.write_all(&[0xff, 0xff, 0xff])?;
        drop(file);

        let err = Catalog::open(dir.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
        Ok(())
    }

    #[test]
    fn test_set_num_partitions_is_persisted() -> Result<()> {
        let dir = tempdir()?;
        let catalog = open_catalog(dir.path())?;
        catalog.add_collection(CollectionProps::new("users").num_partitions(3))?;
        catalog.set_num_partitions("users", 2)?;
        assert_eq!(catalog.get("users")?.props().num_partitions, 2);

        let catalog = Catalog::open(dir.path().to_path_buf())?;
        assert_eq!(catalog.get("users")?.props().num_partitions, 2);
        Ok(())
    }
}
