//! `scan` subcommand: wire concrete collaborators into the scan controller.

use std::sync::{
    Arc, Once,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result, bail};
use qr_vision::{
    ScanConfig, ScanOutcome, Scanner,
    display::{Display, HeadlessDisplay},
    sink::{CommandSink, Sink, StdoutSink},
};
use tracing::{info, warn};

use crate::telemetry;

pub fn run(config: ScanConfig) -> Result<()> {
    let _telemetry = telemetry::init(config.verbose, &config.telemetry);

    static CTRL_HANDLER: Once = Once::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let capture = video_ingest::open_source(&config.source_uri, config.source_options)
        .with_context(|| format!("failed to open capture source {}", config.source_uri))?;
    let display = build_display(&config);
    let sink = build_sink(&config)?;

    info!(
        source = %config.source_uri,
        decoder = config.decoder.label(),
        key = %config.schema.key,
        "starting scan"
    );
    let scanner = Scanner::start(
        capture,
        display,
        sink,
        config.decoder.factory(),
        config.schema.clone(),
        config.options.clone(),
        shutdown,
    )?;
    let report = scanner.run();

    match report.outcome {
        ScanOutcome::Detected | ScanOutcome::Quit => Ok(()),
        ScanOutcome::CaptureFailed if !report.published.is_empty() => Ok(()),
        ScanOutcome::CaptureFailed => bail!(
            "capture source {} stopped after {} frame(s) without a detection",
            config.source_uri,
            report.frames_captured
        ),
        ScanOutcome::WorkerFailed => bail!("decode worker stopped unexpectedly"),
    }
}

fn build_display(config: &ScanConfig) -> Box<dyn Display> {
    if config.headless {
        return Box::new(HeadlessDisplay::new(config.snapshot.clone()));
    }
    #[cfg(feature = "opencv")]
    {
        Box::new(qr_vision::display::HighGuiDisplay)
    }
    #[cfg(not(feature = "opencv"))]
    {
        Box::new(HeadlessDisplay::new(config.snapshot.clone()))
    }
}

fn build_sink(config: &ScanConfig) -> Result<Box<dyn Sink>> {
    if config.sink_command.is_empty() {
        return Ok(Box::new(StdoutSink::new()));
    }
    Ok(Box::new(CommandSink::from_command_line(&config.sink_command)?))
}
