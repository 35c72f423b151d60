//! Delta checksums.
//!
//! SHA-256 over the JSON encoding of a delta with its `checksum` field
//! removed. The step is part of the content, so a delta moved to another
//! step no longer verifies.

use serde_json::Value;
use sha2::{Digest, Sha256};
use vitrine_core::Delta;

use crate::errors::Result;

/// Hex SHA-256 of the delta content.
pub fn delta_checksum(delta: &Delta) -> Result<String> {
    let mut content = serde_json::to_value(delta)?;
    if let Value::Object(map) = &mut content {
        let _ = map.remove("checksum");
    }
    let bytes = serde_json::to_vec(&content)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Whether the stored checksum matches the content. A delta without a
/// checksum does not verify.
pub fn verify_checksum(delta: &Delta) -> Result<bool> {
    match delta.checksum.as_deref() {
        Some(stored) => Ok(stored == delta_checksum(delta)?),
        None => Ok(false),
    }
}
