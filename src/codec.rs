//! Document payload codecs: struct encoding per collection encoding type,
//! and streaming gzip compression of whole document files.

use std::fs::File;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errinput;
use crate::error::{Error, Result};

/// How struct values are serialized into document payloads. Only `Json`
/// payloads can be indexed; `Bincode` is an opaque binary serialization and
/// `None` stores raw bytes only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    None,
    Json,
    Bincode,
}

impl Encoding {
    /// Whether documents in this encoding can back a field index.
    pub fn is_indexable(self) -> bool {
        matches!(self, Encoding::Json)
    }
}

/// Serializes a value into a document payload per the encoding.
pub fn encode<T: Serialize>(encoding: Encoding, value: &T) -> Result<Vec<u8>> {
    match encoding {
        Encoding::Json => Ok(serde_json::to_vec(value)?),
        Encoding::Bincode => Ok(bincode::serialize(value)?),
        Encoding::None => errinput!("encoding NONE does not support struct values"),
    }
}

/// Deserializes a document payload per the encoding.
pub fn decode<T: DeserializeOwned>(encoding: Encoding, data: &[u8]) -> Result<T> {
    match encoding {
        Encoding::Json => Ok(serde_json::from_slice(data)?),
        Encoding::Bincode => Ok(bincode::deserialize(data)?),
        Encoding::None => errinput!("encoding NONE does not support struct values"),
    }
}

/// Streams `data` into `file` through a gzip encoder, making the gzip stream
/// the whole file content.
pub fn write_compressed(file: File, data: &[u8]) -> Result<()> {
    let mut encoder = GzEncoder::new(file, flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::Compression(e.to_string()))?;
    Ok(())
}

/// Reads a document file to the end, decompressing when the collection is
/// gzip-enabled.
pub fn read_to_end(file: File, compressed: bool) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    if compressed {
        GzDecoder::new(file)
            .read_to_end(&mut data)
            .map_err(|e| Error::Compression(e.to_string()))?;
    } else {
        let mut file = file;
        file.read_to_end(&mut data)?;
    }
    Ok(data)
}
