//! Configuration parsing for the scan pipeline.
//!
//! This module owns translation of CLI arguments into a `ScanConfig` struct
//! which the controller and the binary use without re-parsing flags.

use std::{path::PathBuf, time::Duration};

use anyhow::{Result, anyhow, bail};
use clap::Args;
use video_ingest::SourceOptions;

use super::controller::ScanOptions;
use crate::{decoder::DecoderKind, payload::PayloadSchema};

#[derive(Clone, Debug)]
/// Canonical configuration for one scan run.
pub struct ScanConfig {
    /// Camera device, video file, image file, or directory of images.
    pub source_uri: String,
    pub source_options: SourceOptions,
    pub decoder: DecoderKind,
    pub schema: PayloadSchema,
    pub options: ScanOptions,
    /// Run without on-screen windows.
    pub headless: bool,
    /// Where the headless display writes the result image.
    pub snapshot: Option<PathBuf>,
    /// External program receiving each value on stdin. Empty means stdout.
    pub sink_command: Vec<String>,
    /// Emit debug logging (frame drops, decode details).
    pub verbose: bool,
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing and metrics.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Write a Prometheus text snapshot of the run's metrics on exit.
    pub metrics_dump_path: Option<PathBuf>,
}

/// Payload layout flags shared by `scan` and `decode`.
#[derive(Debug, Args)]
pub struct PayloadArgs {
    /// Field key whose value is extracted from keyed payloads.
    #[arg(long = "key", value_name = "KEY", default_value = "P")]
    pub key: String,
    /// Field count of a positional payload.
    #[arg(long = "arity", value_name = "N", default_value_t = 4)]
    pub arity: usize,
    /// Zero-based field index read from a positional payload.
    #[arg(long = "index", value_name = "N", default_value_t = 2)]
    pub index: usize,
}

impl PayloadArgs {
    pub fn schema(&self) -> Result<PayloadSchema> {
        if self.key.is_empty() || self.key.contains([':', ';']) {
            bail!("--key must be non-empty and contain neither ':' nor ';'");
        }
        if self.index >= self.arity {
            bail!(
                "--index {} is out of range for --arity {}",
                self.index,
                self.arity
            );
        }
        Ok(PayloadSchema {
            key: self.key.clone(),
            positional_arity: self.arity,
            positional_index: self.index,
        })
    }
}

/// CLI arguments accepted by the `scan` subcommand.
#[derive(Debug, Args)]
pub struct ScanCliArgs {
    /// Camera index, device path, video file, image, or image directory.
    #[arg(value_name = "SOURCE")]
    pub source: Option<String>,
    /// Source flag (overrides positional).
    #[arg(long = "source", value_name = "URI")]
    pub source_flag: Option<String>,
    /// Requested capture width in pixels.
    #[arg(long = "width", value_name = "PX", requires = "height")]
    pub width: Option<u32>,
    /// Requested capture height in pixels.
    #[arg(long = "height", value_name = "PX", requires = "width")]
    pub height: Option<u32>,
    /// Restart an image sequence when it runs out.
    #[arg(long = "loop", action = clap::ArgAction::SetTrue)]
    pub loop_sequence: bool,

    /// Decoding backend.
    #[arg(long = "decoder", value_enum, default_value_t = DecoderKind::default())]
    pub decoder: DecoderKind,
    #[command(flatten)]
    pub payload: PayloadArgs,

    /// Padding in pixels around the detected code when cropping.
    #[arg(long = "margin", value_name = "PX", default_value_t = 20)]
    pub margin: u32,
    /// Edge length of the cropped result tile.
    #[arg(long = "tile-size", value_name = "PX", default_value_t = 300)]
    pub tile_size: u32,
    /// Show the annotated full frame instead of a cropped tile.
    #[arg(long = "no-crop", action = clap::ArgAction::SetTrue)]
    pub no_crop: bool,
    /// Keep scanning after a detection and publish each new value.
    #[arg(long = "continuous", action = clap::ArgAction::SetTrue)]
    pub continuous: bool,

    /// Pause between capture ticks.
    #[arg(long = "tick-ms", value_name = "MS", default_value_t = 20)]
    pub tick_ms: u64,
    /// Upper bound on waiting for the decode worker to exit.
    #[arg(long = "shutdown-timeout-ms", value_name = "MS", default_value_t = 1000)]
    pub shutdown_timeout_ms: u64,

    /// Run without windows.
    #[arg(long = "headless", action = clap::ArgAction::SetTrue)]
    pub headless: bool,
    /// Write the result image here in headless mode.
    #[arg(long = "snapshot", value_name = "PATH")]
    pub snapshot: Option<PathBuf>,
    /// Do not wait for a key after showing the result.
    #[arg(long = "no-wait", action = clap::ArgAction::SetTrue)]
    pub no_wait: bool,

    /// Pipe each value into this command instead of printing it.
    #[arg(long = "sink-command", value_name = "CMD", value_delimiter = ' ')]
    pub sink_command: Vec<String>,

    /// Enable verbose logging (frame drops, decode details).
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Write a Prometheus metrics snapshot on exit.
    #[arg(long = "metrics-dump", value_name = "PATH")]
    pub metrics_dump: Option<PathBuf>,
}

impl TryFrom<ScanCliArgs> for ScanConfig {
    type Error = anyhow::Error;

    fn try_from(args: ScanCliArgs) -> Result<Self> {
        let source_uri = args
            .source_flag
            .or(args.source)
            .ok_or_else(|| anyhow!("Missing source. Provide --source <uri> or positional <source>."))?;

        let target_size = match (args.width, args.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            (None, None) => None,
            _ => bail!("--width and --height must be given together as positive integers"),
        };

        if args.tile_size == 0 {
            bail!("--tile-size must be at least 1");
        }
        if args.shutdown_timeout_ms == 0 {
            bail!("--shutdown-timeout-ms must be at least 1");
        }

        let headless = args.headless || !cfg!(feature = "opencv");
        if args.snapshot.is_some() && !headless {
            bail!("--snapshot requires --headless");
        }

        let options = ScanOptions {
            margin: args.margin,
            tile_size: args.tile_size,
            crop: !args.no_crop,
            stop_on_detect: !args.continuous,
            wait_for_ack: !args.no_wait,
            tick_interval: Duration::from_millis(args.tick_ms),
            worker_shutdown_timeout: Duration::from_millis(args.shutdown_timeout_ms),
            ..ScanOptions::default()
        };

        let sink_command: Vec<String> = args
            .sink_command
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect();

        Ok(Self {
            source_uri,
            source_options: SourceOptions {
                target_size,
                loop_sequence: args.loop_sequence,
            },
            decoder: args.decoder,
            schema: args.payload.schema()?,
            options,
            headless,
            snapshot: args.snapshot,
            sink_command,
            verbose: args.verbose,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
                metrics_dump_path: args.metrics_dump,
            },
        })
    }
}
