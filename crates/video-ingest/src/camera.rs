//! OpenCV-backed camera capture.

use anyhow::anyhow;
use chrono::Utc;
use opencv::{
    core::MatTraitConstManual,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, warn};

use crate::types::{CaptureError, CaptureSource, Frame, FrameFormat};

/// Live camera or stream opened through OpenCV's `VideoCapture`.
///
/// Each `read_frame` blocks until the device delivers the next frame. The
/// OpenCV scratch `Mat` is reused across reads; the returned [`Frame`] always
/// owns a copy of its pixels.
pub struct CameraSource {
    cap: VideoCapture,
    scratch: Mat,
    released: bool,
}

impl CameraSource {
    /// Open a device by index, `/dev/videoN` path, or any URI OpenCV accepts.
    pub fn open(uri: &str, target_size: Option<(u32, u32)>) -> Result<Self, CaptureError> {
        let mut cap = open_video_capture(uri)?;
        configure_camera(&mut cap, target_size, 30.0);
        Ok(Self {
            cap,
            scratch: Mat::default(),
            released: false,
        })
    }
}

impl CaptureSource for CameraSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released {
            return Ok(None);
        }
        let ok = self
            .cap
            .read(&mut self.scratch)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !ok {
            return Ok(None);
        }

        let size = self
            .scratch
            .size()
            .map_err(|e| CaptureError::Other(e.into()))?;
        if size.width <= 0 || size.height <= 0 {
            return Ok(None);
        }
        if self.scratch.channels() != 3 {
            return Err(CaptureError::Other(anyhow!(
                "unsupported camera frame with {} channel(s)",
                self.scratch.channels()
            )));
        }

        let data = self
            .scratch
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Frame::new(
            data,
            size.width as u32,
            size.height as u32,
            FrameFormat::Bgr8,
            Utc::now().timestamp_millis(),
        )
        .map(Some)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.cap.release() {
            warn!("failed to release camera: {err}");
        }
        self.released = true;
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Copy a frame into a BGR `Mat` for OpenCV consumers (display, detectors).
pub fn frame_to_mat(frame: &Frame) -> opencv::Result<Mat> {
    let bgr: Vec<u8> = match frame.format {
        FrameFormat::Bgr8 => frame.data.clone(),
        FrameFormat::Rgb8 => frame
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
        FrameFormat::Luma8 => frame.data.iter().flat_map(|&v| [v, v, v]).collect(),
    };
    let flat = Mat::from_slice(&bgr)?;
    let shaped = flat.reshape(3, frame.height as i32)?;
    shaped.try_clone()
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if stripped.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = stripped.parse::<i32>() {
                return Some(index);
            }
        }
    }
    None
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        debug!("opened camera #{index} with backend {backend}");
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    match VideoCapture::from_file(uri, videoio::CAP_ANY) {
        Ok(cap) => {
            if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                return Ok(cap);
            }
        }
        Err(err) => {
            warn!("failed to open {uri}: {err}");
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Apply common capture settings (resolution, fps, preferred pixel format).
fn configure_camera(cap: &mut VideoCapture, target_size: Option<(u32, u32)>, fps: f64) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    if let Some((width, height)) = target_size {
        let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64);
        let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}
