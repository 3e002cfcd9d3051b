//! Scan pipeline: configuration and the capture/decode controller.

pub use config::{PayloadArgs, ScanCliArgs, ScanConfig, TelemetryOptions};
pub use controller::{PipelineState, ScanOptions, ScanOutcome, ScanReport, Scanner};

mod config;
mod controller;
