//! Text-safe manifest codec.
//!
//! Manifests travel over the transport compressed and base64-encoded so they
//! survive XML item bodies. Corrupt input yields an error, never a panic.

use crate::error::{RelayError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Compress and encode a manifest for publishing.
pub fn encode_manifest(manifest: &str) -> Result<String> {
    let compressed = zstd::encode_all(manifest.as_bytes(), 0)
        .map_err(|e| RelayError::Decompress(e.to_string()))?;
    Ok(BASE64.encode(compressed))
}

/// Reverse of [`encode_manifest`]: decode then decompress.
pub fn decode_manifest(payload: &str) -> Result<String> {
    // Published payloads may carry whitespace from the item body.
    let trimmed: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let compressed = BASE64.decode(trimmed.as_bytes())?;
    let bytes =
        zstd::decode_all(compressed.as_slice()).map_err(|e| RelayError::Decompress(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| RelayError::Decompress(e.to_string()))
}
