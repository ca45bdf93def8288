use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errinput;
use crate::error::Result;

/// Prefix of partition directory names under a collection's data directory.
pub const PARTITION_PREFIX: &str = "partition_";
/// Infix separating the collection name from the key in document filenames.
pub const DOC_PREFIX: &str = "doc_";
/// Suffix of gzip-compressed document files.
pub const GZIP_SUFFIX: &str = ".gz";

/// The primary identifier of a document within a collection. Rendered in
/// decimal for filenames.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Key(pub i64);

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Key {
    fn from(key: i64) -> Self {
        Key(key)
    }
}

impl From<i32> for Key {
    fn from(key: i32) -> Self {
        Key(key.into())
    }
}

impl Key {
    /// Maps the key onto one of `num_partitions` partitions. Uses Euclidean
    /// modulus so the result is in `[0, num_partitions)` even for negative
    /// keys. This mapping locates files on disk and must never change.
    pub fn partition(self, num_partitions: u32) -> u32 {
        debug_assert!(num_partitions >= 1);
        self.0.rem_euclid(num_partitions as i64) as u32
    }

    /// Name of the partition directory holding this key's document.
    pub fn partition_dir_name(self, num_partitions: u32) -> String {
        format!("{}{}", PARTITION_PREFIX, self.partition(num_partitions))
    }

    /// Name of this key's document file within its partition directory.
    pub fn filename(self, collection_name: &str, compressed: bool) -> String {
        let mut name = format!("{}_{}{}", collection_name, DOC_PREFIX, self);
        if compressed {
            name.push_str(GZIP_SUFFIX);
        }
        name
    }
}

/// Recovers the key from a document filename. The name must contain the
/// `doc_` infix exactly once, followed by the decimal key and an optional
/// `.gz` suffix.
pub fn parse_filename(name: &str) -> Result<Key> {
    let parts: Vec<&str> = name.split(DOC_PREFIX).collect();
    if parts.len() != 2 {
        return errinput!("cannot parse key from filename {name}");
    }
    let digits = parts[1].strip_suffix(GZIP_SUFFIX).unwrap_or(parts[1]);
    match digits.parse::<i64>() {
        Ok(key) => Ok(Key(key)),
        Err(e) => errinput!("cannot parse key from filename {name}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_is_euclidean() {
        assert_eq!(Key(1).partition(3), 1);
        assert_eq!(Key(2).partition(3), 2);
        assert_eq!(Key(3).partition(3), 0);
        assert_eq!(Key(0).partition(3), 0);
        // Negative keys land on non-negative partitions.
        assert_eq!(Key(-4).partition(3), 2);
        assert_eq!(Key(-1).partition(5), 4);
        assert_eq!(Key(i64::MIN).partition(2), 0);
    }

    #[test]
    fn test_partition_dir_name() {
        assert_eq!(Key(5).partition_dir_name(3), "partition_2");
        assert_eq!(Key(-4).partition_dir_name(3), "partition_2");
    }

    #[test]
    fn test_filename() {
        assert_eq!(Key(1).filename("users", false), "users_doc_1");
        assert_eq!(Key(42).filename("org", true), "org_doc_42.gz");
        assert_eq!(Key(-7).filename("users", false), "users_doc_-7");
    }

    #[test]
    fn test_parse_filename() -> Result<()> {
        assert_eq!(parse_filename("users_doc_1")?, Key(1));
        assert_eq!(parse_filename("org_doc_42.gz")?, Key(42));
        assert_eq!(parse_filename("users_doc_-7")?, Key(-7));
        Ok(())
    }

    #[test]
    fn test_parse_filename_rejects_malformed_names() {
        assert!(parse_filename("users_1").is_err());
        assert!(parse_filename("users_doc_").is_err());
        assert!(parse_filename("users_doc_abc").is_err());
        // The infix must appear exactly once.
        assert!(parse_filename("doc_doc_1").is_err());
    }

    #[test]
    fn test_filename_round_trips() -> Result<()> {
        for key in [Key(0), Key(17), Key(-17), Key(i64::MAX), Key(i64::MIN)] {
            assert_eq!(parse_filename(&key.filename("users", false))?, key);
            assert_eq!(parse_filename(&key.filename("users", true))?, key);
        }
        Ok(())
    }
}
