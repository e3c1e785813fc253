//! Transfer encoding: raw bytes → base64 [`EncodedPayload`].
//!
//! Multimodal APIs accept images inline as base64 text next to the media
//! type. Browsers hand file contents over as a `data:` URI, so the same
//! module also strips that prefix back off.

use crate::pipeline::ingest::SelectedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(?P<mime>[^;,]*)(?:;[^;,]*)*?(?P<b64>;base64)?,")
        .expect("data-URI pattern is valid")
});

/// Base64 image bytes paired with their declared media type.
///
/// Built only to construct one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Standard-alphabet base64, no data-URI prefix.
    pub data: String,
    /// Media type exactly as declared at ingestion.
    pub mime_type: String,
}

impl EncodedPayload {
    /// Decode the payload back to the original bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// Encode a selected file for the inference request.
pub fn encode_image(image: &SelectedImage) -> EncodedPayload {
    encode_bytes(&image.bytes, &image.mime_type)
}

/// Encode raw bytes with the given media type.
pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> EncodedPayload {
    let data = STANDARD.encode(bytes);
    debug!("Encoded {} bytes → {} bytes base64", bytes.len(), data.len());
    EncodedPayload {
        data,
        mime_type: mime_type.to_string(),
    }
}

/// Drop a leading `data:…,` prefix, returning the raw payload.
///
/// Strings without a prefix are returned unchanged.
pub fn strip_data_uri(s: &str) -> &str {
    match DATA_URI.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    }
}

/// Split a base64 `data:` URI into an [`EncodedPayload`].
///
/// Returns `None` when `s` is not a data URI or is not base64-encoded.
pub fn parse_data_uri(s: &str) -> Option<EncodedPayload> {
    let caps = DATA_URI.captures(s)?;
    caps.name("b64")?;
    let mime = caps.name("mime").map(|m| m.as_str()).unwrap_or("");
    let end = caps.get(0)?.end();
    Some(EncodedPayload {
        data: s[end..].to_string(),
        mime_type: if mime.is_empty() {
            "text/plain".to_string()
        } else {
            mime.to_string()
        },
    })
}
