//! Capture sources for the QR scanner.
//!
//! Every source implements [`CaptureSource`] and hands out owned [`Frame`]s.
//! Image files and directories are always supported; live cameras require the
//! `opencv` feature.

use std::path::Path;

#[cfg(feature = "opencv")]
mod camera;
mod sequence;
mod types;

#[cfg(feature = "opencv")]
pub use camera::{CameraSource, frame_to_mat};
pub use sequence::ImageSequenceSource;
pub use types::{CaptureError, CaptureSource, Frame, FrameFormat};

/// Options applied when opening a source by URI.
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceOptions {
    /// Requested capture resolution for cameras.
    pub target_size: Option<(u32, u32)>,
    /// Replay image sequences indefinitely instead of ending after the last file.
    pub loop_sequence: bool,
}

/// Open the capture source named by `uri`.
///
/// Existing files and directories become an [`ImageSequenceSource`]; anything
/// else is treated as a camera index, device path, or stream URI.
pub fn open_source(
    uri: &str,
    options: SourceOptions,
) -> Result<Box<dyn CaptureSource + Send>, CaptureError> {
    let path = Path::new(uri);
    if path.exists() && !uri.starts_with("/dev/video") {
        return Ok(Box::new(ImageSequenceSource::open(
            path,
            options.loop_sequence,
        )?));
    }
    open_camera(uri, options)
}

#[cfg(feature = "opencv")]
fn open_camera(
    uri: &str,
    options: SourceOptions,
) -> Result<Box<dyn CaptureSource + Send>, CaptureError> {
    Ok(Box::new(CameraSource::open(uri, options.target_size)?))
}

#[cfg(not(feature = "opencv"))]
fn open_camera(
    uri: &str,
    _options: SourceOptions,
) -> Result<Box<dyn CaptureSource + Send>, CaptureError> {
    Err(CaptureError::Unsupported {
        uri: uri.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn camera_uris_need_opencv() {
        assert!(matches!(
            open_source("0", SourceOptions::default()),
            Err(CaptureError::Unsupported { .. })
        ));
    }

    #[test]
    fn existing_directory_opens_as_sequence() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::new(2, 2)
            .save(dir.path().join("frame.png"))
            .unwrap();
        let mut source = open_source(dir.path().to_str().unwrap(), SourceOptions::default())
            .unwrap();
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_none());
    }
}
