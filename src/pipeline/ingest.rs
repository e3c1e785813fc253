//! Ingestion: turn a user-selected file into a [`SelectedImage`].
//!
//! The declared media type is passed through untouched. Nothing here checks
//! that the file really is an image; a PDF or a text file is accepted and
//! sent downstream with whatever type the client reported. Only when the
//! client reported nothing is the type sniffed from the leading bytes.

use crate::error::SolveError;
use crate::pipeline::encode::parse_data_uri;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Type sent when neither the client nor the sniffer can name one.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// The most recently chosen file, ready for preview and encoding.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedImage {
    /// File name as reported by the client (may be empty).
    pub name: String,
    /// Declared media type, unvalidated.
    pub mime_type: String,
    /// Raw file contents.
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl SelectedImage {
    /// Build a selection, sniffing the media type only if none was declared.
    pub fn new(name: impl Into<String>, declared_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let mime_type = match declared_type.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => sniff_mime(&bytes).to_string(),
        };
        Self {
            name: name.into(),
            mime_type,
            bytes,
        }
    }

    /// Content type used when the bytes are served back for the preview.
    ///
    /// Declared types are unvalidated, so anything a browser might execute
    /// (HTML, SVG, scripts) is served as an opaque download instead.
    pub fn preview_content_type(&self) -> &str {
        let t = self.mime_type.to_ascii_lowercase();
        if t.starts_with("image/") && !t.starts_with("image/svg") {
            &self.mime_type
        } else {
            FALLBACK_MIME
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Accept an uploaded file.
///
/// Returns `None` for an empty selection (no file name and no content),
/// which callers treat as a no-op rather than an error.
pub fn ingest_upload(
    file_name: Option<&str>,
    declared_type: Option<&str>,
    bytes: Vec<u8>,
) -> Option<SelectedImage> {
    let name = file_name.unwrap_or("").trim();
    if name.is_empty() && bytes.is_empty() {
        debug!("Empty selection ignored");
        return None;
    }

    let image = SelectedImage::new(name, declared_type, bytes);
    info!(
        "Selected '{}' ({}, {} bytes)",
        image.name,
        image.mime_type,
        image.len()
    );
    Some(image)
}

/// Accept a selection that arrived as a base64 `data:` URI, the form a
/// browser `FileReader` or `canvas.toDataURL()` produces.
///
/// A blank string is an empty selection (`Ok(None)`); anything that is not
/// a base64 data URI is a [`SolveError::ReadFailure`].
pub fn ingest_data_uri(
    file_name: Option<&str>,
    uri: &str,
) -> Result<Option<SelectedImage>, SolveError> {
    let uri = uri.trim();
    if uri.is_empty() {
        debug!("Empty data URI ignored");
        return Ok(None);
    }

    let name = file_name.unwrap_or("").trim();
    let read_failure = |detail: String| SolveError::ReadFailure {
        name: name.to_string(),
        detail,
    };
    let payload = parse_data_uri(uri)
        .ok_or_else(|| read_failure("not a base64 data: URI".to_string()))?;
    let bytes = payload
        .decode()
        .map_err(|e| read_failure(format!("invalid base64: {e}")))?;

    Ok(ingest_upload(Some(name), Some(&payload.mime_type), bytes))
}

/// Read a file from disk into a [`SelectedImage`].
///
/// `declared_type` overrides sniffing, mirroring what a browser would report.
pub async fn ingest_path(
    path: impl AsRef<Path>,
    declared_type: Option<&str>,
) -> Result<SelectedImage, SolveError> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SolveError::ReadFailure {
            name: name.clone(),
            detail: e.to_string(),
        })?;

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    let image = SelectedImage::new(name, declared_type, bytes);
    info!(
        "Selected '{}' ({}, {} bytes)",
        image.name,
        image.mime_type,
        image.len()
    );
    Ok(image)
}

/// Best-effort media type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or(FALLBACK_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn empty_selection_is_a_no_op() {
        assert!(ingest_upload(None, None, Vec::new()).is_none());
        assert!(ingest_upload(Some("  "), Some("image/png"), Vec::new()).is_none());
    }

    #[test]
    fn declared_type_is_passed_through_unvalidated() {
        let img = ingest_upload(Some("notes.txt"), Some("text/plain"), b"3x + 5 = 20".to_vec())
            .expect("non-image files are accepted");
        assert_eq!(img.mime_type, "text/plain");
        assert_eq!(img.name, "notes.txt");
    }

    #[test]
    fn missing_type_is_sniffed() {
        let img = SelectedImage::new("equation", None, PNG_MAGIC.to_vec());
        assert_eq!(img.mime_type, "image/png");

        let blank = SelectedImage::new("equation", Some(""), PNG_MAGIC.to_vec());
        assert_eq!(blank.mime_type, "image/png");
    }

    #[test]
    fn unknown_content_falls_back_to_octet_stream() {
        assert_eq!(sniff_mime(b"hello"), FALLBACK_MIME);
    }

    #[test]
    fn preview_type_is_only_trusted_for_raster_images() {
        let png = SelectedImage::new("equation.png", Some("image/png"), PNG_MAGIC.to_vec());
        assert_eq!(png.preview_content_type(), "image/png");

        let html = SelectedImage::new("page.html", Some("text/html"), b"<script>".to_vec());
        assert_eq!(html.preview_content_type(), FALLBACK_MIME);

        let svg = SelectedImage::new("x.svg", Some("image/svg+xml"), b"<svg/>".to_vec());
        assert_eq!(svg.preview_content_type(), FALLBACK_MIME);
    }

    #[test]
    fn data_uri_selection_keeps_declared_type() {
        let img = ingest_data_uri(Some("canvas"), "data:image/jpeg;base64,/9j/4A==")
            .unwrap()
            .expect("non-empty selection");
        assert_eq!(img.name, "canvas");
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(img.bytes, vec![0xff, 0xd8, 0xff, 0xe0]);
    }

    #[test]
    fn blank_data_uri_is_a_no_op() {
        assert!(ingest_data_uri(None, "  ").unwrap().is_none());
    }

    #[test]
    fn malformed_data_uri_is_read_failure() {
        let err = ingest_data_uri(Some("x"), "not a uri").unwrap_err();
        assert!(matches!(err, SolveError::ReadFailure { .. }));

        let err = ingest_data_uri(Some("x"), "data:image/png;base64,@@@").unwrap_err();
        assert!(matches!(err, SolveError::ReadFailure { ref detail, .. } if detail.contains("base64")));
    }

    #[tokio::test]
    async fn ingest_path_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("equation.png");
        std::fs::write(&path, PNG_MAGIC).unwrap();

        let img = ingest_path(&path, None).await.unwrap();
        assert_eq!(img.name, "equation.png");
        assert_eq!(img.bytes, PNG_MAGIC);
        assert_eq!(img.mime_type, "image/png");
    }

    #[tokio::test]
    async fn ingest_path_missing_file_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = ingest_path(dir.path().join("missing.png"), None)
            .await
            .unwrap_err();
        match err {
            SolveError::ReadFailure { name, .. } => assert_eq!(name, "missing.png"),
            other => panic!("expected ReadFailure, got {other:?}"),
        }
    }
}
