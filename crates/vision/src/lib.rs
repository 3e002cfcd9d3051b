//! QR frame pipeline that scans captured frames, extracts one field from each
//! decoded payload, and publishes new values.
//!
//! The crate is split into focused modules:
//! - `payload`: Parsing of `KEY:VALUE;...` and positional payloads.
//! - `geometry`: Normalization of decoder position data into points.
//! - `crop`: Bounding boxes and square result tiles.
//! - `annotation`: Outline drawing for previews.
//! - `decoder`: Decoding backends.
//! - `worker`: The decode worker thread.
//! - `sink`: Destinations for published values.
//! - `display`: Preview and result windows.
//! - `pipeline`: CLI configuration and the scan controller.

pub mod annotation;
pub mod crop;
pub mod decoder;
pub mod display;
pub mod geometry;
pub mod payload;
pub mod pipeline;
pub mod sink;
pub mod worker;

pub use decoder::{DecodedSymbol, Decoder, DecoderFactory, DecoderKind};
pub use geometry::{Geometry, GeometryPoint, RawPosition, normalize};
pub use payload::{DecodedRecord, PayloadSchema};
pub use pipeline::{
    PayloadArgs, PipelineState, ScanCliArgs, ScanConfig, ScanOptions, ScanOutcome, ScanReport,
    Scanner, TelemetryOptions,
};
pub use worker::{DecodeResult, decode_frame};
