//! Barcode decoding backends.
//!
//! A [`Decoder`] maps one frame to the payloads it finds plus whatever
//! position data the backend reports. Decoders are built inside the decode
//! worker thread through a [`DecoderFactory`], so they never need to be `Send`.

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use rxing::Exceptions;
use tracing::debug;
use video_ingest::Frame;

use crate::geometry::{CornerSet, PointLike, RawPosition};

/// One payload found in a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedSymbol {
    pub text: String,
    pub position: Option<RawPosition>,
}

pub trait Decoder {
    fn decode(&mut self, frame: &Frame) -> Result<Vec<DecodedSymbol>>;
}

/// Builds a decoder on the thread that will own it.
pub type DecoderFactory = Box<dyn FnOnce() -> Result<Box<dyn Decoder>> + Send>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DecoderKind {
    /// ZXing port; reports finder-pattern points.
    #[default]
    Rxing,
    /// quirc port; reports the four grid corners.
    Rqrr,
    /// OpenCV `QRCodeDetector`; reports a `[1, 4, 2]` corner array.
    #[cfg(feature = "opencv")]
    Opencv,
}

impl DecoderKind {
    pub fn label(self) -> &'static str {
        match self {
            DecoderKind::Rxing => "rxing",
            DecoderKind::Rqrr => "rqrr",
            #[cfg(feature = "opencv")]
            DecoderKind::Opencv => "opencv",
        }
    }

    pub fn factory(self) -> DecoderFactory {
        match self {
            DecoderKind::Rxing => Box::new(|| Ok(Box::new(RxingDecoder) as Box<dyn Decoder>)),
            DecoderKind::Rqrr => Box::new(|| Ok(Box::new(RqrrDecoder) as Box<dyn Decoder>)),
            #[cfg(feature = "opencv")]
            DecoderKind::Opencv => {
                Box::new(|| Ok(Box::new(opencv_backend::OpenCvDecoder::new()?) as Box<dyn Decoder>))
            }
        }
    }
}

/// Multi-format decoder backed by `rxing`.
pub struct RxingDecoder;

impl Decoder for RxingDecoder {
    fn decode(&mut self, frame: &Frame) -> Result<Vec<DecodedSymbol>> {
        match rxing::helpers::detect_multiple_in_luma(frame.to_luma(), frame.width, frame.height)
        {
            Ok(results) => Ok(results
                .iter()
                .map(|result| DecodedSymbol {
                    text: result.getText().to_string(),
                    position: Some(RawPosition::Points(
                        result
                            .getPoints()
                            .iter()
                            .map(|point| PointLike::Xy {
                                x: point.x,
                                y: point.y,
                            })
                            .collect(),
                    )),
                })
                .collect()),
            Err(Exceptions::NotFoundException(_)) => Ok(Vec::new()),
            Err(err) => Err(anyhow!("rxing decode failed: {err}")),
        }
    }
}

/// QR-only decoder backed by `rqrr`.
pub struct RqrrDecoder;

impl Decoder for RqrrDecoder {
    fn decode(&mut self, frame: &Frame) -> Result<Vec<DecodedSymbol>> {
        let width = frame.width as usize;
        let height = frame.height as usize;
        let luma = frame.to_luma();
        if luma.len() != width * height {
            return Err(anyhow!(
                "luma buffer holds {} bytes for a {width}x{height} frame",
                luma.len()
            ));
        }

        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| luma[y * width + x]);
        let mut symbols = Vec::new();
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_meta, text)) => {
                    let [tl, tr, br, bl] = grid.bounds;
                    let corner = |p: rqrr::Point| Some(PointLike::from((p.x as f32, p.y as f32)));
                    symbols.push(DecodedSymbol {
                        text,
                        position: Some(RawPosition::Corners(CornerSet {
                            top_left: corner(tl),
                            top_right: corner(tr),
                            bottom_right: corner(br),
                            bottom_left: corner(bl),
                        })),
                    });
                }
                Err(err) => debug!("rqrr grid failed to decode: {err}"),
            }
        }
        Ok(symbols)
    }
}

#[cfg(feature = "opencv")]
mod opencv_backend {
    use anyhow::Result;
    use opencv::{
        core::{Mat, Point2f},
        objdetect::QRCodeDetector,
        prelude::*,
    };
    use video_ingest::{Frame, frame_to_mat};

    use super::{DecodedSymbol, Decoder};
    use crate::geometry::RawPosition;

    pub(super) struct OpenCvDecoder {
        detector: QRCodeDetector,
    }

    impl OpenCvDecoder {
        pub(super) fn new() -> Result<Self> {
            Ok(Self {
                detector: QRCodeDetector::default()?,
            })
        }
    }

    impl Decoder for OpenCvDecoder {
        fn decode(&mut self, frame: &Frame) -> Result<Vec<DecodedSymbol>> {
            let image = frame_to_mat(frame)?;
            let mut points = Mat::default();
            let mut straight = Mat::default();
            let bytes = self
                .detector
                .detect_and_decode(&image, &mut points, &mut straight)?;
            if bytes.is_empty() {
                return Ok(Vec::new());
            }

            let position = if points.empty() {
                None
            } else {
                let corners = points.data_typed::<Point2f>()?;
                Some(RawPosition::Array {
                    data: corners.iter().flat_map(|p| [p.x, p.y]).collect(),
                    shape: vec![1, corners.len(), 2],
                })
            };
            Ok(vec![DecodedSymbol {
                text: String::from_utf8_lossy(&bytes).into_owned(),
                position,
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_ingest::FrameFormat;

    fn blank_frame() -> Frame {
        Frame::new(vec![255; 64 * 48 * 3], 64, 48, FrameFormat::Rgb8, 0).unwrap()
    }

    #[test]
    fn blank_frame_decodes_to_nothing() {
        for kind in [DecoderKind::Rxing, DecoderKind::Rqrr] {
            let mut decoder = (kind.factory())().unwrap();
            let symbols = decoder.decode(&blank_frame()).unwrap_or_default();
            assert!(symbols.is_empty(), "{} found a code in a blank frame", kind.label());
        }
    }

    #[test]
    fn kinds_parse_from_cli_names() {
        assert_eq!(DecoderKind::from_str("rqrr", true).unwrap(), DecoderKind::Rqrr);
        assert_eq!(DecoderKind::default().label(), "rxing");
    }
}
