// still.rs — Turning files and raw frames into encoded still images.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, RgbImage};
use std::io::Cursor;
use std::path::Path;

use super::CaptureError;
use crate::payload::ImagePayload;

/// Read an image file from disk into a payload tagged with its MIME type.
pub async fn read_image_file(path: &Path) -> Result<ImagePayload, CaptureError> {
    let origin = path.display().to_string();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CaptureError::UnreadableFile {
            origin: origin.clone(),
            reason: e.to_string(),
        })?;
    payload_from_bytes(bytes, &origin)
}

/// Sniff the format from the leading bytes. Anything the `image` crate does
/// not recognise is rejected as unreadable.
pub fn payload_from_bytes(bytes: Vec<u8>, origin: &str) -> Result<ImagePayload, CaptureError> {
    let format = image::guess_format(&bytes).map_err(|e| CaptureError::UnreadableFile {
        origin: origin.to_string(),
        reason: format!("not a recognised image: {e}"),
    })?;

    let dimensions = ImageReader::with_format(Cursor::new(&bytes), format)
        .into_dimensions()
        .ok();

    let payload = ImagePayload::new(bytes, format.to_mime_type());
    log::debug!(
        "Loaded {} ({}, {} bytes)",
        origin,
        payload.mime_type(),
        payload.len()
    );
    Ok(match dimensions {
        Some((w, h)) => payload.with_dimensions(w, h),
        None => payload,
    })
}

/// JPEG-encode a frame at its own resolution.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<ImagePayload, CaptureError> {
    let (w, h) = frame.dimensions();
    let mut jpeg_buf: Vec<u8> = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg_buf, quality.clamp(1, 100))
        .encode(frame.as_raw(), w, h, image::ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::StreamError(format!("jpeg encode: {e}")))?;
    Ok(ImagePayload::new(jpeg_buf, "image/jpeg").with_dimensions(w, h))
}
