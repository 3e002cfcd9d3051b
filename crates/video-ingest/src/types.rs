use anyhow::Error;
use image::{GrayImage, RgbImage};
use thiserror::Error;

/// Raw frame captured from a video source.
///
/// Frames own their pixel buffer. Cloning copies the buffer, so a clone handed
/// to another thread never aliases memory the capture loop reuses.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
    Rgb8,
    Luma8,
}

impl FrameFormat {
    pub fn channels(self) -> usize {
        match self {
            FrameFormat::Bgr8 | FrameFormat::Rgb8 => 3,
            FrameFormat::Luma8 => 1,
        }
    }
}

impl Frame {
    /// Build a frame, checking that the buffer matches the declared geometry.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
        timestamp_ms: i64,
    ) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms,
            format,
        })
    }

    pub fn from_rgb_image(image: RgbImage, timestamp_ms: i64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            timestamp_ms,
            format: FrameFormat::Rgb8,
        }
    }

    /// Copy the frame into an RGB image regardless of its channel layout.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        let data = match self.format {
            FrameFormat::Rgb8 => self.data.clone(),
            FrameFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            FrameFormat::Luma8 => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
        };
        RgbImage::from_raw(self.width, self.height, data)
    }

    /// Single-channel luminance copy used by the barcode decoders.
    pub fn to_luma(&self) -> Vec<u8> {
        match self.format {
            FrameFormat::Luma8 => self.data.clone(),
            FrameFormat::Rgb8 => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
            FrameFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[2], px[1], px[0]))
                .collect(),
        }
    }

    pub fn to_gray_image(&self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.to_luma())
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    // Rec. 601 weights in fixed point.
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source {uri:?} requires a capture backend that was not compiled in")]
    Unsupported { uri: String },
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error(transparent)]
    Other(#[from] Error),
}

/// A device or stream that hands out frames one at a time.
///
/// `Ok(None)` means end of stream or a device that stopped returning frames;
/// callers treat it as fatal for the capture loop.
pub trait CaptureSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the underlying device. Reads after release return `Ok(None)`.
    fn release(&mut self);
}

impl<T: CaptureSource + ?Sized> CaptureSource for Box<T> {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_buffer() {
        let err = Frame::new(vec![0; 5], 2, 1, FrameFormat::Rgb8, 0).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::BufferSize {
                expected: 6,
                actual: 5
            }
        ));
    }

    #[test]
    fn bgr_frames_convert_to_rgb() {
        let frame = Frame::new(vec![10, 20, 30], 1, 1, FrameFormat::Bgr8, 0).unwrap();
        let rgb = frame.to_rgb_image().unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [30, 20, 10]);
    }

    #[test]
    fn luma_of_white_is_white() {
        let frame = Frame::new(vec![255; 6], 2, 1, FrameFormat::Rgb8, 0).unwrap();
        assert_eq!(frame.to_luma(), vec![255, 255]);
    }

    #[test]
    fn clone_does_not_alias_buffer() {
        let frame = Frame::new(vec![1, 2, 3], 1, 1, FrameFormat::Rgb8, 0).unwrap();
        let mut copy = frame.clone();
        copy.data[0] = 99;
        assert_eq!(frame.data[0], 1);
    }
}
