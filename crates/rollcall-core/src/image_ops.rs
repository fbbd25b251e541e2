//! Image decoding, box clamping, cropping and fixed-size resizing.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Decode encoded image bytes (JPEG, PNG, ...) into an RGB buffer.
///
/// Returns `None` for anything the `image` crate cannot decode, including
/// empty input and zero-sized images.
pub fn decode(bytes: &[u8]) -> Option<RgbImage> {
    let decoded = match image::load_from_memory(bytes) {
        Ok(img) => img.to_rgb8(),
        Err(e) => {
            tracing::debug!(error = %e, len = bytes.len(), "image decode failed");
            return None;
        }
    };
    if decoded.width() == 0 || decoded.height() == 0 {
        return None;
    }
    Some(decoded)
}

/// Clamp a detector box to the image, returning `(x, y, width, height)`.
///
/// The origin is clamped into `[0, dim)` and the far edge to `dim`, so a box
/// that starts off-image keeps its original far edge. Returns `None` when
/// nothing of the box remains inside the image.
pub fn clamp_to_image(face: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if width == 0 || height == 0 || !face.x.is_finite() || !face.y.is_finite() {
        return None;
    }

    let x0 = face.x.floor().clamp(0.0, (width - 1) as f32) as u32;
    let y0 = face.y.floor().clamp(0.0, (height - 1) as f32) as u32;
    let x1 = (face.x + face.width).ceil().clamp(0.0, width as f32) as u32;
    let y1 = (face.y + face.height).ceil().clamp(0.0, height as f32) as u32;

    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

/// Crop the clamped face region out of the image.
pub fn crop_face(image: &RgbImage, face: &BoundingBox) -> Option<RgbImage> {
    let (x, y, w, h) = clamp_to_image(face, image.width(), image.height())?;
    Some(imageops::crop_imm(image, x, y, w, h).to_image())
}

/// Bilinear resize to a `size`×`size` square, ignoring aspect ratio.
pub fn resize_square(image: &RgbImage, size: u32) -> RgbImage {
    if image.width() == size && image.height() == size {
        return image.clone();
    }
    imageops::resize(image, size, size, FilterType::Triangle)
}
