//! Repartitioning: relocates every document file of a collection into the
//! partition directory computed from the new partition count.
//!
//! At most one repartition runs at a time across the whole process. Each
//! file move is an atomic rename, and recomputing a file's partition is
//! deterministic, so an interrupted run leaves a valid layout that the next
//! run completes.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errinput;
use crate::error::{Error, Result};
use crate::key;
use crate::layout;

static REPARTITIONING: AtomicBool = AtomicBool::new(false);

/// Serializes tests that exercise the process-wide repartition flag, which
/// would otherwise see each other's `Busy` under the parallel test runner.
#[cfg(test)]
pub(crate) static REPARTITION_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Holds the process-wide repartition slot; released on drop.
struct RepartitionGuard;

impl RepartitionGuard {
    fn acquire() -> Result<Self> {
        if REPARTITIONING
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Busy);
        }
        Ok(RepartitionGuard)
    }
}

impl Drop for RepartitionGuard {
    fn drop(&mut self) {
        REPARTITIONING.store(false, Ordering::SeqCst);
    }
}

/// Moves every document file under `data_dir` (a collection's data
/// directory, holding the partition directories) into the partition computed
/// from `num_partitions`. Fails with `Busy` when another repartition is
/// running anywhere in the process.
pub fn repartition(data_dir: &Path, num_partitions: u32) -> Result<()> {
    let _guard = RepartitionGuard::acquire()?;

    if data_dir.as_os_str().is_empty() {
        return errinput!("empty data directory");
    }
    if num_partitions == 0 {
        return errinput!("invalid partition count {num_partitions}");
    }

    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        let partition_path = entry.path();
        if !entry.file_type()?.is_dir() {
            tracing::warn!(
                path = %partition_path.display(),
                "Expected only partition directories, skipping"
            );
            continue;
        }

        for doc_entry in fs::read_dir(&partition_path)? {
            let doc_entry = doc_entry?;
            if doc_entry.file_type()?.is_dir() {
                tracing::warn!(
                    path = %doc_entry.path().display(),
                    "Expected only document files, skipping"
                );
                continue;
            }
            let filename = doc_entry.file_name();
            let Some(filename) = filename.to_str() else {
                return errinput!("non UTF-8 document filename under {}", partition_path.display());
            };

            let doc_key = key::parse_filename(filename)?;
            let new_dir = data_dir.join(doc_key.partition_dir_name(num_partitions));
            layout::create_dir_if_not_exist(&new_dir)?;

            let old_path = doc_entry.path();
            let new_path = new_dir.join(filename);
            if old_path != new_path {
                tracing::info!(
                    from = %old_path.display(),
                    to = %new_path.display(),
                    "Moving document"
                );
                fs::rename(&old_path, &new_path)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn populate(data_dir: &Path, keys: &[i64], num_partitions: u32) -> Result<()> {
        for &k in keys {
            let key = Key(k);
            let dir = data_dir.join(key.partition_dir_name(num_partitions));
            layout::create_dir_if_not_exist(&dir)?;
            fs::write(dir.join(key.filename("users", false)), k.to_string())?;
        }
        Ok(())
    }

    fn layout_of(data_dir: &Path) -> Result<BTreeSet<String>> {
        let mut files = BTreeSet::new();
        for entry in fs::read_dir(data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            for doc in fs::read_dir(entry.path())? {
                let doc = doc?;
                files.insert(format!(
                    "{}/{}",
                    entry.file_name().to_string_lossy(),
                    doc.file_name().to_string_lossy()
                ));
            }
        }
        Ok(files)
    }

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        REPARTITION_TEST_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn test_repartition_moves_files() -> Result<()> {
        let _lock = lock();
        let dir = tempdir()?;
        populate(dir.path(), &[1, 2, 3], 3)?;

        repartition(dir.path(), 2)?;

        let files = layout_of(dir.path())?;
        assert!(files.contains("partition_1/users_doc_1"));
        assert!(files.contains("partition_0/users_doc_2"));
        assert!(files.contains("partition_1/users_doc_3"));
        // The documents themselves are untouched.
        assert_eq!(
            fs::read(dir.path().join("partition_0/users_doc_2"))?,
            b"2"
        );
        Ok(())
    }

    #[test]
    fn test_repartition_is_idempotent() -> Result<()> {
        let _lock = lock();
        let dir = tempdir()?;
        populate(dir.path(), &[1, 2, 3, 4, 5], 3)?;

        repartition(dir.path(), 2)?;
        let first = layout_of(dir.path())?;
        repartition(dir.path(), 2)?;
        assert_eq!(layout_of(dir.path())?, first);
        Ok(())
    }

    #[test]
    fn test_repartition_skips_foreign_entries() -> Result<()> {
        let _lock = lock();
        let dir = tempdir()?;
        populate(dir.path(), &[1], 3)?;
        // A stray file at the top level and a stray directory inside a
        // partition are skipped, not treated as documents.
        fs::write(dir.path().join("README"), "stray")?;
        fs::create_dir(dir.path().join("partition_1").join("nested"))?;

        repartition(dir.path(), 1)?;
        assert!(dir.path().join("README").is_file());
        assert!(dir.path().join("partition_1/nested").is_dir());
        assert!(dir.path().join("partition_0/users_doc_1").is_file());
        Ok(())
    }

    #[test]
    fn test_only_one_repartition_at_a_time() -> Result<()> {
        let _lock = lock();
        let dir = tempdir()?;
        populate(dir.path(), &[1], 1)?;

        let _guard = RepartitionGuard::acquire()?;
        assert_eq!(repartition(dir.path(), 1), Err(Error::Busy));
        drop(_guard);

        repartition(dir.path(), 1)?;
        Ok(())
    }

    #[test]
    fn test_invalid_partition_count() {
        let _lock = lock();
        let dir = tempdir().unwrap();
        let err = repartition(dir.path(), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
