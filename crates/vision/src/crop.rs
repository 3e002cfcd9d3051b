//! Close-up tile of a detected code.
//!
//! The crop is axis-aligned around the detected points, padded by a margin,
//! clamped to the frame, and resized to a square tile for display. It is not
//! a perspective rectification.

use image::imageops::{self, FilterType};
use video_ingest::Frame;

use crate::geometry::GeometryPoint;

/// Integer pixel box; `right` and `bottom` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl PixelBox {
    pub fn width(&self) -> i64 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i64 {
        self.bottom.saturating_sub(self.top)
    }

    /// Clamp to `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> PixelBox {
        let (width, height) = (i64::from(width), i64::from(height));
        PixelBox {
            left: self.left.clamp(0, width),
            top: self.top.clamp(0, height),
            right: self.right.clamp(0, width),
            bottom: self.bottom.clamp(0, height),
        }
    }
}

/// Bounding box of `points` expanded by `margin` on every side, before clamping.
pub fn bounding_box(points: &[GeometryPoint], margin: u32) -> Option<PixelBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in &points[1..] {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
        return None;
    }

    let margin = i64::from(margin);
    Some(PixelBox {
        left: (min_x.floor() as i64).saturating_sub(margin),
        top: (min_y.floor() as i64).saturating_sub(margin),
        right: (max_x.ceil() as i64).saturating_add(margin),
        bottom: (max_y.ceil() as i64).saturating_add(margin),
    })
}

/// Crop the region around `points` and resize it to `output_size` squared.
///
/// Returns `None` for an empty point set, a box that collapses after clamping,
/// or a zero output size.
pub fn crop_region(
    frame: &Frame,
    points: &[GeometryPoint],
    margin: u32,
    output_size: u32,
) -> Option<Frame> {
    if output_size == 0 {
        return None;
    }
    let bbox = bounding_box(points, margin)?.clamp_to(frame.width, frame.height);
    if bbox.width() <= 0 || bbox.height() <= 0 {
        return None;
    }

    let rgb = frame.to_rgb_image()?;
    let region = imageops::crop_imm(
        &rgb,
        bbox.left as u32,
        bbox.top as u32,
        bbox.width() as u32,
        bbox.height() as u32,
    )
    .to_image();
    let tile = imageops::resize(&region, output_size, output_size, FilterType::CatmullRom);
    Some(Frame::from_rgb_image(tile, frame.timestamp_ms))
}
