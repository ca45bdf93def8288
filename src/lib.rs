//! FileDB is a filesystem-backed, schemaless document store usable as an
//! embedded database or cache layer. Documents live in named collections,
//! one file per document, spread over hash-partitioned directories by their
//! integer key. Collections can maintain inverted indexes over nested JSON
//! field paths, which answer equality-conjunction queries without scanning.

pub mod catalog;
pub mod client;
pub mod codec;
pub mod collection;
pub mod error;
pub mod extract;
pub mod key;
pub mod layout;
pub mod repartition;

pub use client::{global, Client, Options, SearchResponse};
pub use codec::Encoding;
pub use collection::{Collection, CollectionProps};
pub use error::{Error, Result};
pub use key::Key;
