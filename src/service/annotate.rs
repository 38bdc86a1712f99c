//! Painting stored landmarks onto image bytes.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Cursor;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
}

/// Parse a stored landmark map (`point name -> {x, y}`) into its points.
pub fn parse_landmark(json: &str) -> Result<Vec<LandmarkPoint>> {
    let map: BTreeMap<String, LandmarkPoint> = serde_json::from_str(json)?;
    Ok(map.into_values().collect())
}

/// How marks are drawn.
#[derive(Debug, Clone, Copy)]
pub struct MarkStyle {
    pub color: Rgb<u8>,
    pub radius: i32,
    pub jpeg_quality: u8,
}

/// Decode `image_bytes`, draw a filled circle at every point and re-encode
/// the result as JPEG. Points outside the image are clipped.
pub fn paint_marks(image_bytes: &[u8], points: &[LandmarkPoint], style: &MarkStyle) -> Result<Vec<u8>> {
    let mut canvas = image::load_from_memory(image_bytes)?.to_rgb8();

    for point in points {
        let center = (point.x.round() as i32, point.y.round() as i32);
        imageproc::drawing::draw_filled_circle_mut(&mut canvas, center, style.radius, style.color);
    }

    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, style.jpeg_quality);
    DynamicImage::ImageRgb8(canvas).write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}
