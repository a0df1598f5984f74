use serde::{Serialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

pub(crate) fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode CBOR, returning the decoder's message so callers can wrap it in
/// the error variant that fits the structure being parsed.
pub(crate) fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> std::result::Result<T, String> {
    ciborium::de::from_reader(bytes).map_err(|e| e.to_string())
}
