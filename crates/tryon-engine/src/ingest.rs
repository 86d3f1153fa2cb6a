use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::ImageReader;
use tryon_contracts::images::{
    is_image_mime, mime_for_file_name, EncodedImage, ValidationError, MAX_IMAGE_BYTES,
};

/// Reads a user-picked file into an [`EncodedImage`].
///
/// Checks run in order and stop at the first failure: the declared type
/// (from the extension) must be `image/*`, then the file must be at most
/// [`MAX_IMAGE_BYTES`]. Only then is the whole file read.
pub fn ingest_path(path: &Path) -> Result<EncodedImage, ValidationError> {
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or_default();
    let declared = mime_for_file_name(name);
    check_declared_type(declared)?;

    let metadata = fs::metadata(path).map_err(|err| {
        ValidationError::new(format!("Could not read {}: {err}", path.display()))
    })?;
    check_size(metadata.len())?;

    let bytes = fs::read(path).map_err(|err| {
        ValidationError::new(format!("Could not read {}: {err}", path.display()))
    })?;
    Ok(encode(bytes, declared))
}

/// Same checks as [`ingest_path`] for bytes already in memory.
pub fn ingest_bytes(declared_mime: &str, bytes: Vec<u8>) -> Result<EncodedImage, ValidationError> {
    check_declared_type(declared_mime)?;
    check_size(bytes.len() as u64)?;
    Ok(encode(bytes, declared_mime.trim()))
}

/// Width and height from the image header, if the format is recognised.
pub fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn check_declared_type(mime: &str) -> Result<(), ValidationError> {
    if is_image_mime(mime) {
        return Ok(());
    }
    Err(ValidationError::new(
        "Please choose an image file (PNG, JPEG, WebP, GIF or BMP).",
    ))
}

fn check_size(len: u64) -> Result<(), ValidationError> {
    if len <= MAX_IMAGE_BYTES {
        return Ok(());
    }
    Err(ValidationError::new(format!(
        "Image is too large ({:.1} MB); the limit is 6 MB.",
        len as f64 / (1024.0 * 1024.0)
    )))
}

fn encode(bytes: Vec<u8>, mime: &str) -> EncodedImage {
    let dimensions = read_dimensions(&bytes);
    EncodedImage::new(bytes, mime.to_ascii_lowercase(), dimensions)
}
