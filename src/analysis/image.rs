use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;

const DEFAULT_MIME: &str = "image/png";
const MARKER: &str = "base64,";

/// Chart image decoded from the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartImage {
    pub mime_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("image is not valid base64: {0}")]
    Base64(String),
    #[error("image is empty")]
    Empty,
}

/// Decode a data URL (`data:image/png;base64,...`) or raw base64.
///
/// Everything up to the first `base64,` is dropped. A `data:<mime>;` header
/// supplies the mime type; otherwise it is `image/png`.
pub fn decode_image(input: &str) -> Result<ChartImage, ImageError> {
    let (header, payload) = match input.find(MARKER) {
        Some(idx) => (&input[..idx], &input[idx + MARKER.len()..]),
        None => ("", input),
    };

    let mime_type = header
        .trim()
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .map(str::trim)
        .filter(|m| m.contains('/'))
        .unwrap_or(DEFAULT_MIME)
        .to_string();

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ImageError::Base64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    Ok(ChartImage {
        mime_type,
        bytes: Bytes::from(bytes),
    })
}
