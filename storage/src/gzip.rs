//! RFC 1952 gzip codec for HTML snapshots.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::StorageError;

/// Gzip UTF-8 bytes for storage.
pub fn gzip_bytes(bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|()| encoder.finish())
        .map_err(|e| StorageError::Codec(e.to_string()))
}

/// Inverse of [`gzip_bytes`].
pub fn gunzip_bytes(bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| StorageError::Codec(e.to_string()))?;
    Ok(out)
}
