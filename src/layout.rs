//! On-disk layout of a store rooted at an effective root directory:
//!
//! ```text
//! <root>/
//!   data/
//!     <collection>/
//!       data/
//!         partition_<k>/
//!           <collection>_doc_<key>[.gz]
//!       meta/
//!         indexes/
//!           <fieldLocator>
//!   meta/
//!     catalog
//! ```
//!
//! Every path-producing function here is total and deterministic; callers
//! create missing directories with mode 0750 and files with mode 0660.

use std::fs::{DirBuilder, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::key::Key;

pub const DATA_DIR_NAME: &str = "data";
pub const META_DIR_NAME: &str = "meta";
pub const INDEXES_DIR_NAME: &str = "indexes";
pub const CATALOG_FILE_NAME: &str = "catalog";

pub const DIR_MODE: u32 = 0o750;
pub const FILE_MODE: u32 = 0o660;

/// Directory holding all of a collection's data and metadata.
pub fn collection_dir(root: &Path, collection_name: &str) -> PathBuf {
    root.join(DATA_DIR_NAME).join(collection_name)
}

/// Directory holding a collection's partition directories.
pub fn collection_data_dir(collection_dir: &Path) -> PathBuf {
    collection_dir.join(DATA_DIR_NAME)
}

/// Directory holding a collection's metadata.
pub fn collection_meta_dir(collection_dir: &Path) -> PathBuf {
    collection_dir.join(META_DIR_NAME)
}

/// Directory holding a collection's persisted index blobs.
pub fn collection_indexes_dir(collection_dir: &Path) -> PathBuf {
    collection_dir.join(META_DIR_NAME).join(INDEXES_DIR_NAME)
}

/// Path of the persisted index blob for one field locator.
pub fn index_path(collection_dir: &Path, field_locator: &str) -> PathBuf {
    collection_indexes_dir(collection_dir).join(field_locator)
}

/// Partition directory holding the given key's document.
pub fn partition_dir(collection_dir: &Path, key: Key, num_partitions: u32) -> PathBuf {
    collection_data_dir(collection_dir).join(key.partition_dir_name(num_partitions))
}

/// Full path of the given key's document file.
pub fn document_path(
    collection_dir: &Path,
    collection_name: &str,
    key: Key,
    num_partitions: u32,
    compressed: bool,
) -> PathBuf {
    partition_dir(collection_dir, key, num_partitions)
        .join(key.filename(collection_name, compressed))
}

/// Path of the store-wide catalog snapshot.
pub fn catalog_path(root: &Path) -> PathBuf {
    root.join(META_DIR_NAME).join(CATALOG_FILE_NAME)
}

/// Creates the directory (and any missing parents) with mode 0750 if it does
/// not exist yet.
pub fn create_dir_if_not_exist(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    tracing::debug!(path = %path.display(), "Creating directory");
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path)?;
    Ok(())
}

/// Opens a file for writing with mode 0660, creating it if missing and
/// truncating any prior content.
pub fn create_file(path: &Path) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(FILE_MODE);
    }
    Ok(opts.open(path)?)
}
