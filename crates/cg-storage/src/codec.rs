//! Self-describing value codec.
//!
//! JSON keeps stored values forward-compatible: readers ignore fields
//! they don't know, and absent optional fields fall back to defaults.
//! List values (the secondary indices) preserve insertion order.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

pub(crate) fn encode<T: Serialize>(
    op: &'static str,
    key: &[u8],
    value: &T,
) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::Codec {
        op,
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(
    op: &'static str,
    key: &[u8],
    bytes: &[u8],
) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Codec {
        op,
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}
