//! Offline try-on fallback.
//!
//! The garment photo is the frame; a crop from the upper middle of the
//! subject photo is pasted over it at a fixed spot near the top, clipped to a
//! rounded rectangle. Placement is a fixed heuristic and never looks at image
//! content.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tryon_contracts::generation::{GenerationResult, ResultImage, SourceTag};
use tryon_contracts::images::EncodedImage;

/// Face box width as a share of the canvas width.
pub const FACE_WIDTH_RATIO: f64 = 0.25;
/// Face box height as a multiple of its width.
pub const FACE_ASPECT: f64 = 1.2;
/// Face box top edge as a share of the canvas height.
pub const FACE_TOP_RATIO: f64 = 0.08;
/// Corner radius of the face clip, in output pixels.
pub const FACE_CORNER_RADIUS: f64 = 36.0;

pub const CROP_X_RATIO: f64 = 0.25;
pub const CROP_Y_RATIO: f64 = 0.10;
pub const CROP_WIDTH_RATIO: f64 = 0.50;
pub const CROP_HEIGHT_RATIO: f64 = 0.40;

pub const CANVAS_LABEL: &str = "Canvas Merged";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("failed to encode composite: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where the face goes on a `width` x `height` canvas.
pub fn face_destination(width: u32, height: u32) -> Rect {
    let face_width = scale(width, FACE_WIDTH_RATIO);
    Rect {
        x: ((width - face_width) as f64 / 2.0).round() as u32,
        y: scale(height, FACE_TOP_RATIO),
        width: face_width,
        height: scale(face_width, FACE_ASPECT),
    }
}

/// The part of a `width` x `height` subject photo assumed to hold the face.
pub fn face_source_crop(width: u32, height: u32) -> Rect {
    Rect {
        x: scale(width, CROP_X_RATIO),
        y: scale(height, CROP_Y_RATIO),
        width: scale(width, CROP_WIDTH_RATIO),
        height: scale(height, CROP_HEIGHT_RATIO),
    }
}

/// Builds the composite. Deterministic and offline.
///
/// An undecodable garment hands back the subject untouched, tagged
/// [`SourceTag::Original`]; an undecodable subject hands back the garment.
/// The only error is a PNG encoder failure.
pub fn compose(
    subject: &EncodedImage,
    garment: &EncodedImage,
) -> Result<GenerationResult, ComposeError> {
    let subject_pixels = image::load_from_memory(subject.bytes());
    let garment_pixels = image::load_from_memory(garment.bytes());

    let (subject_pixels, garment_pixels) = match (subject_pixels, garment_pixels) {
        (Ok(subject_pixels), Ok(garment_pixels)) => (subject_pixels, garment_pixels),
        (_, Err(_)) => return Ok(GenerationResult::original(subject.clone())),
        (Err(_), Ok(_)) => return Ok(GenerationResult::original(garment.clone())),
    };

    let subject_rgba = subject_pixels.to_rgba8();
    let mut canvas = garment_pixels.to_rgba8();
    let (width, height) = canvas.dimensions();

    let dest = face_destination(width, height);
    let crop = face_source_crop(subject_rgba.width(), subject_rgba.height());
    if draw_clipped_crop(&mut canvas, &subject_rgba, crop, dest).is_err() {
        draw_whole_subject(&mut canvas, &subject_rgba, dest);
    }

    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| ComposeError::Encode(err.to_string()))?;

    Ok(GenerationResult {
        image: ResultImage::Encoded(EncodedImage::new(
            bytes,
            "image/png",
            Some((width, height)),
        )),
        label: CANVAS_LABEL.to_string(),
        source: SourceTag::Canvas,
    })
}

#[derive(Debug)]
struct EmptyRegion;

fn draw_clipped_crop(
    canvas: &mut RgbaImage,
    subject: &RgbaImage,
    crop: Rect,
    dest: Rect,
) -> Result<(), EmptyRegion> {
    if crop.is_empty() || dest.is_empty() {
        return Err(EmptyRegion);
    }
    let cropped =
        imageops::crop_imm(subject, crop.x, crop.y, crop.width, crop.height).to_image();
    if cropped.width() == 0 || cropped.height() == 0 {
        return Err(EmptyRegion);
    }
    let scaled = imageops::resize(&cropped, dest.width, dest.height, FilterType::Triangle);
    paste(canvas, &scaled, dest, Some(FACE_CORNER_RADIUS));
    Ok(())
}

fn draw_whole_subject(canvas: &mut RgbaImage, subject: &RgbaImage, dest: Rect) {
    if dest.is_empty() || subject.width() == 0 || subject.height() == 0 {
        return;
    }
    let scaled = imageops::resize(subject, dest.width, dest.height, FilterType::Triangle);
    paste(canvas, &scaled, dest, None);
}

fn paste(canvas: &mut RgbaImage, layer: &RgbaImage, dest: Rect, corner_radius: Option<f64>) {
    let (canvas_width, canvas_height) = canvas.dimensions();
    for (x, y, pixel) in layer.enumerate_pixels() {
        let target_x = dest.x + x;
        let target_y = dest.y + y;
        if target_x >= canvas_width || target_y >= canvas_height {
            continue;
        }
        if let Some(radius) = corner_radius {
            if !inside_rounded_rect(x, y, dest.width, dest.height, radius) {
                continue;
            }
        }
        let base = canvas.get_pixel_mut(target_x, target_y);
        *base = blend_over(*base, *pixel);
    }
}

fn inside_rounded_rect(x: u32, y: u32, width: u32, height: u32, radius: f64) -> bool {
    let (w, h) = (width as f64, height as f64);
    let r = radius.min(w / 2.0).min(h / 2.0).max(0.0);
    let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
    let dx = px - px.clamp(r, w - r);
    let dy = py - py.clamp(r, h - r);
    dx * dx + dy * dy <= r * r
}

fn blend_over(base: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let alpha = u16::from(top[3]);
    let mix = |over: u8, under: u8| -> u8 {
        ((u16::from(over) * alpha + u16::from(under) * (255 - alpha)) / 255) as u8
    };
    let out_alpha = alpha + u16::from(base[3]) * (255 - alpha) / 255;
    Rgba([
        mix(top[0], base[0]),
        mix(top[1], base[1]),
        mix(top[2], base[2]),
        out_alpha.min(255) as u8,
    ])
}

fn scale(value: u32, ratio: f64) -> u32 {
    (value as f64 * ratio).round().max(0.0) as u32
}
