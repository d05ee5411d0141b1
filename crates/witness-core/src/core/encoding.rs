// crates/witness-core/src/core/encoding.rs
// ============================================================================
// Module: Wire Encoding Helpers
// Description: Serde adapters for base64-encoded byte fields.
// Purpose: Keep envelope and policy byte fields compatible with the
//          standard-alphabet base64 used on the wire.
// Dependencies: base64, serde
// ============================================================================

//! ## Overview
//! Byte fields serialize as standard base64 with padding. Decoding also
//! accepts the URL-safe alphabet.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use base64::engine::general_purpose::URL_SAFE;

// ============================================================================
// SECTION: Functions
// ============================================================================

/// Encodes bytes as standard base64.
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes standard or URL-safe base64.
///
/// # Errors
///
/// Returns the decoder error when neither alphabet accepts the input.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text).or_else(|_| URL_SAFE.decode(text))
}

/// Serde adapter for a single base64 byte field.
pub mod base64_bytes {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use serde::de;

    /// Serializes bytes as base64.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_base64(bytes))
    }

    /// Deserializes base64 into bytes.
    ///
    /// # Errors
    ///
    /// Fails when the value is not valid base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode_base64(&text).map_err(de::Error::custom)
    }
}

/// Serde adapter for a list of base64 byte fields.
pub mod base64_bytes_list {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use serde::de;
    use serde::ser::SerializeSeq;

    /// Serializes a list of byte strings as base64 strings.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&super::encode_base64(item))?;
        }
        seq.end()
    }

    /// Deserializes a list of base64 strings.
    ///
    /// # Errors
    ///
    /// Fails when any entry is not valid base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let texts = Vec::<String>::deserialize(deserializer)?;
        texts.iter().map(|text| super::decode_base64(text).map_err(de::Error::custom)).collect()
    }
}
