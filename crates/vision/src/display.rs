//! Preview and result presentation.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use image::codecs::jpeg::JpegEncoder;
use tracing::info;
use video_ingest::Frame;

pub const PREVIEW_WINDOW: &str = "QR Scanner";
pub const RESULT_WINDOW: &str = "QR Code";

/// Key code returned by an acknowledgement when no real key was pressed.
pub const ACK_KEY: char = '\n';

pub trait Display {
    fn show(&mut self, window: &str, frame: &Frame) -> Result<()>;

    /// Wait up to `timeout` for a key. `None` waits until a key is pressed.
    fn poll_key(&mut self, timeout: Option<Duration>) -> Option<char>;

    fn close_all(&mut self);
}

impl<T: Display + ?Sized> Display for Box<T> {
    fn show(&mut self, window: &str, frame: &Frame) -> Result<()> {
        (**self).show(window, frame)
    }

    fn poll_key(&mut self, timeout: Option<Duration>) -> Option<char> {
        (**self).poll_key(timeout)
    }

    fn close_all(&mut self) {
        (**self).close_all()
    }
}

/// Display for runs without a screen.
///
/// Preview frames are discarded. Frames shown in the result window are
/// written as a JPEG when a snapshot path is configured. Key polls never
/// return a key; waiting for acknowledgement returns immediately.
pub struct HeadlessDisplay {
    snapshot_path: Option<PathBuf>,
    jpeg_quality: u8,
}

impl HeadlessDisplay {
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            snapshot_path,
            jpeg_quality: 90,
        }
    }

    fn write_snapshot(&self, path: &Path, frame: &Frame) -> Result<()> {
        let image = frame
            .to_rgb_image()
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut encoder = JpegEncoder::new_with_quality(file, self.jpeg_quality);
        encoder
            .encode_image(&image)
            .with_context(|| format!("failed to encode {}", path.display()))?;
        info!("wrote result snapshot to {}", path.display());
        Ok(())
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, window: &str, frame: &Frame) -> Result<()> {
        match (&self.snapshot_path, window) {
            (Some(path), RESULT_WINDOW) => self.write_snapshot(path, frame),
            _ => Ok(()),
        }
    }

    fn poll_key(&mut self, timeout: Option<Duration>) -> Option<char> {
        match timeout {
            Some(_) => None,
            None => Some(ACK_KEY),
        }
    }

    fn close_all(&mut self) {}
}

#[cfg(feature = "opencv")]
pub use highgui::HighGuiDisplay;

#[cfg(feature = "opencv")]
mod highgui {
    use std::time::Duration;

    use anyhow::Result;
    use opencv::highgui;
    use tracing::warn;
    use video_ingest::{Frame, frame_to_mat};

    use super::Display;

    /// On-screen windows through OpenCV HighGUI.
    #[derive(Default)]
    pub struct HighGuiDisplay;

    impl Display for HighGuiDisplay {
        fn show(&mut self, window: &str, frame: &Frame) -> Result<()> {
            let mat = frame_to_mat(frame)?;
            highgui::imshow(window, &mat)?;
            Ok(())
        }

        fn poll_key(&mut self, timeout: Option<Duration>) -> Option<char> {
            let delay = timeout.map(|t| t.as_millis().clamp(1, i32::MAX as u128) as i32);
            match highgui::wait_key(delay.unwrap_or(0)) {
                Ok(code) if code >= 0 => char::from_u32((code & 0xFF) as u32),
                Ok(_) => None,
                Err(err) => {
                    warn!("failed to poll keyboard: {err}");
                    None
                }
            }
        }

        fn close_all(&mut self) {
            if let Err(err) = highgui::destroy_all_windows() {
                warn!("failed to close windows: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_ingest::FrameFormat;

    fn frame() -> Frame {
        Frame::new(vec![200; 8 * 8 * 3], 8, 8, FrameFormat::Rgb8, 0).unwrap()
    }

    #[test]
    fn headless_writes_only_result_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.jpg");
        let mut display = HeadlessDisplay::new(Some(path.clone()));

        display.show(PREVIEW_WINDOW, &frame()).unwrap();
        assert!(!path.exists());

        display.show(RESULT_WINDOW, &frame()).unwrap();
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (8, 8));
    }

    #[test]
    fn headless_never_reports_keys_but_acknowledges() {
        let mut display = HeadlessDisplay::new(None);
        assert_eq!(display.poll_key(Some(Duration::from_millis(1))), None);
        assert_eq!(display.poll_key(None), Some(ACK_KEY));
    }
}
