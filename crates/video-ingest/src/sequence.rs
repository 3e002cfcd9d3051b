//! Capture source that replays still images from disk.
//!
//! Useful for headless runs and tests: point it at a single image or a
//! directory of images and it yields them in file-name order, once or in a
//! loop.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, warn};

use crate::types::{CaptureError, CaptureSource, Frame};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    released: bool,
}

impl ImageSequenceSource {
    /// Open a single image file or every image inside a directory.
    pub fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let paths = if path.is_dir() {
            let mut paths = Vec::new();
            let entries = fs::read_dir(path)
                .with_context(|| format!("failed to list {}", path.display()))?;
            for entry in entries {
                let entry_path = entry
                    .with_context(|| format!("failed to list {}", path.display()))?
                    .path();
                if is_image(&entry_path) {
                    paths.push(entry_path);
                }
            }
            paths.sort();
            paths
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        };

        if paths.is_empty() {
            return Err(CaptureError::Open {
                uri: path.display().to_string(),
            });
        }
        debug!(
            "image sequence {} opened with {} frame(s)",
            path.display(),
            paths.len()
        );

        Ok(Self {
            paths,
            cursor: 0,
            looping,
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl CaptureSource for ImageSequenceSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released {
            return Ok(None);
        }
        if self.cursor >= self.paths.len() {
            if !self.looping {
                return Ok(None);
            }
            self.cursor = 0;
        }

        let path = &self.paths[self.cursor];
        self.cursor += 1;

        let image = match image::open(path) {
            Ok(image) => image,
            Err(err) => {
                warn!("failed to load frame {}: {err}", path.display());
                return Ok(None);
            }
        };
        Ok(Some(Frame::from_rgb_image(
            image.to_rgb8(),
            Utc::now().timestamp_millis(),
        )))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, shade: u8) {
        let image = RgbImage::from_pixel(4, 3, Rgb([shade, shade, shade]));
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn yields_directory_frames_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 200);
        write_png(dir.path(), "a.png", 100);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), false).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.read_frame().unwrap().unwrap();
        assert_eq!((first.width, first.height), (4, 3));
        assert_eq!(first.data[0], 100);
        let second = source.read_frame().unwrap().unwrap();
        assert_eq!(second.data[0], 200);
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn looping_restarts_from_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "only.png", 42);

        let mut source = ImageSequenceSource::open(dir.path().join("only.png"), true).unwrap();
        for _ in 0..3 {
            assert_eq!(source.read_frame().unwrap().unwrap().data[0], 42);
        }
        source.release();
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path(), false),
            Err(CaptureError::Open { .. })
        ));
    }
}
