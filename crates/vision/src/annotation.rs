//! Outline drawing for previews and full-frame results.

use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use video_ingest::Frame;

use crate::geometry::GeometryPoint;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);

/// Return an RGB copy of `frame` with the closed polygon through `points` drawn.
///
/// A single point is marked with a dot; an empty point set leaves the frame
/// unchanged apart from the colour conversion.
pub fn draw_polygon(frame: &Frame, points: &[GeometryPoint]) -> Frame {
    let Some(mut image) = frame.to_rgb_image() else {
        return frame.clone();
    };

    match points {
        [] => {}
        [only] => {
            draw_filled_circle_mut(&mut image, (only.x as i32, only.y as i32), 3, OUTLINE);
        }
        _ => {
            for (idx, start) in points.iter().enumerate() {
                let end = points[(idx + 1) % points.len()];
                // Two passes one pixel apart give a 2px outline.
                for offset in [0.0, 1.0] {
                    draw_line_segment_mut(
                        &mut image,
                        (start.x + offset, start.y + offset),
                        (end.x + offset, end.y + offset),
                        OUTLINE,
                    );
                }
            }
        }
    }

    Frame::from_rgb_image(image, frame.timestamp_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_ingest::FrameFormat;

    fn black(width: u32, height: u32) -> Frame {
        Frame::new(
            vec![0; (width * height) as usize],
            width,
            height,
            FrameFormat::Luma8,
            0,
        )
        .unwrap()
    }

    #[test]
    fn polygon_edges_are_drawn() {
        let points = [
            GeometryPoint::new(2.0, 2.0),
            GeometryPoint::new(12.0, 2.0),
            GeometryPoint::new(12.0, 12.0),
            GeometryPoint::new(2.0, 12.0),
        ];
        let annotated = draw_polygon(&black(16, 16), &points);
        let image = annotated.to_rgb_image().unwrap();
        assert_eq!(image.get_pixel(7, 2).0, OUTLINE.0);
        assert_eq!(image.get_pixel(7, 7).0, [0, 0, 0]);
    }

    #[test]
    fn no_points_leaves_frame_untouched() {
        let annotated = draw_polygon(&black(4, 4), &[]);
        assert_eq!(annotated.format, FrameFormat::Rgb8);
        assert!(annotated.data.iter().all(|&v| v == 0));
    }
}
