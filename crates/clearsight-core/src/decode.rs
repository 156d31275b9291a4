//! Image payload decoding: base64 / data-URI strings and raw encoded bytes.

use base64::Engine;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image dimensions are zero")]
    ZeroDimensions,
}

/// Decode a base64 image string, accepting an optional `data:<mime>;base64,` prefix.
pub fn decode_base64(payload: &str) -> Result<RgbImage, DecodeError> {
    let data = strip_data_uri(payload.trim());
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
    decode_bytes(&bytes)
}

/// Decode raw encoded image bytes (JPEG, PNG, ...) into RGB8.
pub fn decode_bytes(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let image = image::load_from_memory(bytes)?.to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::ZeroDimensions);
    }

    tracing::debug!(width = image.width(), height = image.height(), "decoded image");
    Ok(image)
}

/// Strip a `data:image/jpeg;base64,` style marker; anything else passes through.
fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        match payload.split_once(',') {
            Some((_, data)) => data.trim(),
            None => "",
        }
    } else {
        payload
    }
}
