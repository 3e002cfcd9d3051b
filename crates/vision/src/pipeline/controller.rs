//! Scan controller: capture loop, backpressure, deduplication, and shutdown.
//!
//! The controller runs on the caller's thread and drives one decode worker.
//! Frames go to the worker over a capacity-1 channel with `try_send`, so at
//! most one frame is ever waiting and capture never blocks on decoding.
//! Results come back over an unbounded channel drained without blocking
//! every tick.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use crossbeam_channel::{
    Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded, unbounded,
};
use tracing::{debug, error, info, warn};
use video_ingest::{CaptureSource, Frame};

use crate::{
    annotation::draw_polygon,
    crop::crop_region,
    decoder::DecoderFactory,
    display::{Display, PREVIEW_WINDOW, RESULT_WINDOW},
    geometry::Geometry,
    payload::PayloadSchema,
    sink::Sink,
    worker::{DecodeResult, WorkerMessage, spawn_decode_worker},
};

/// Ticks a detected outline stays on the live preview in continuous mode.
const OVERLAY_TICKS: u32 = 10;

#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Padding around the detected points when cropping the result tile.
    pub margin: u32,
    /// Edge length of the square result tile.
    pub tile_size: u32,
    /// Show a cropped tile instead of the annotated full frame.
    pub crop: bool,
    /// Stop at the first new value. When false, keep scanning and publish on change.
    pub stop_on_detect: bool,
    /// Wait for a key after presenting the result.
    pub wait_for_ack: bool,
    /// Pause between ticks.
    pub tick_interval: Duration,
    /// How long each tick polls the display for a quit key.
    pub key_poll: Duration,
    pub worker_init_timeout: Duration,
    pub worker_shutdown_timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            margin: 20,
            tile_size: 300,
            crop: true,
            stop_on_detect: true,
            wait_for_ack: true,
            tick_interval: Duration::from_millis(20),
            key_poll: Duration::from_millis(1),
            worker_init_timeout: Duration::from_secs(10),
            worker_shutdown_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Scanning,
    Detected,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A new value was published and scanning stopped.
    Detected,
    /// The operator quit or the process was interrupted.
    Quit,
    /// The capture source stopped delivering frames.
    CaptureFailed,
    /// The decode worker went away while scanning.
    WorkerFailed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    /// Every value handed to the sink, in order.
    pub published: Vec<String>,
    pub frames_captured: u64,
    pub frames_submitted: u64,
    pub frames_dropped: u64,
    /// Largest number of frames observed waiting in the worker channel.
    pub max_queue_depth: usize,
    /// Whether the worker exited within the shutdown timeout.
    pub worker_exited: bool,
}

enum Tick {
    Continue,
    Detected(Frame),
    Stop(ScanOutcome),
}

#[derive(Default)]
struct ScanStats {
    frames_captured: u64,
    frames_submitted: u64,
    frames_dropped: u64,
    max_queue_depth: usize,
}

pub struct Scanner<C, D, S> {
    capture: C,
    display: D,
    sink: S,
    options: ScanOptions,
    state: PipelineState,
    last_published: Option<String>,
    published: Vec<String>,
    frame_tx: Sender<WorkerMessage>,
    // Used only to pull back a frame the worker has not started before the
    // shutdown signal is sent.
    pending_frames: Receiver<WorkerMessage>,
    result_rx: Receiver<DecodeResult>,
    worker: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    overlay: Option<(Geometry, u32)>,
    stats: ScanStats,
}

impl<C, D, S> Scanner<C, D, S>
where
    C: CaptureSource,
    D: Display,
    S: Sink,
{
    /// Spawn the decode worker and wait until its decoder is ready.
    pub fn start(
        capture: C,
        display: D,
        sink: S,
        factory: DecoderFactory,
        schema: PayloadSchema,
        options: ScanOptions,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let (frame_tx, frame_rx) = bounded::<WorkerMessage>(1);
        let (result_tx, result_rx) = unbounded::<DecodeResult>();
        let (init_tx, init_rx) = bounded::<Result<String, String>>(1);
        let pending_frames = frame_rx.clone();

        let worker = spawn_decode_worker(factory, schema, frame_rx, result_tx, init_tx)
            .context("failed to spawn decode worker")?;

        match init_rx.recv_timeout(options.worker_init_timeout) {
            Ok(Ok(message)) => debug!("decode worker: {message}"),
            Ok(Err(err)) => {
                let _ = worker.join();
                bail!(err);
            }
            Err(RecvTimeoutError::Timeout) => {
                bail!(
                    "decode worker not ready after {:?}",
                    options.worker_init_timeout
                );
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                bail!("decode worker exited during start-up");
            }
        }

        Ok(Self {
            capture,
            display,
            sink,
            options,
            state: PipelineState::Scanning,
            last_published: None,
            published: Vec::new(),
            frame_tx,
            pending_frames,
            result_rx,
            worker: Some(worker),
            shutdown,
            overlay: None,
            stats: ScanStats::default(),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn last_published(&self) -> Option<&str> {
        self.last_published.as_deref()
    }

    /// Run until a detection, quit, or capture failure, then shut down.
    pub fn run(mut self) -> ScanReport {
        let run_span = tracing::info_span!(
            "scan.run",
            stop_on_detect = self.options.stop_on_detect,
            crop = self.options.crop
        );
        let _run_guard = run_span.enter();
        info!("scanning for QR codes, press 'q' to quit");

        let mut outcome = ScanOutcome::Quit;
        let mut result_view = None;
        while self.state == PipelineState::Scanning {
            match self.tick() {
                Tick::Continue => {}
                Tick::Detected(view) => {
                    outcome = ScanOutcome::Detected;
                    result_view = Some(view);
                    self.state = PipelineState::Detected;
                }
                Tick::Stop(reason) => {
                    outcome = reason;
                    self.state = PipelineState::Stopped;
                }
            }
        }

        let presented = match result_view {
            Some(view) => {
                self.present(&view);
                self.state = PipelineState::Stopped;
                true
            }
            None => false,
        };

        let worker_exited = self.stop_worker();
        if !presented {
            self.capture.release();
        }
        // Also closes the result window left open after acknowledgement.
        self.display.close_all();

        info!(
            outcome = ?outcome,
            captured = self.stats.frames_captured,
            submitted = self.stats.frames_submitted,
            dropped = self.stats.frames_dropped,
            "scan finished"
        );

        ScanReport {
            outcome,
            published: std::mem::take(&mut self.published),
            frames_captured: self.stats.frames_captured,
            frames_submitted: self.stats.frames_submitted,
            frames_dropped: self.stats.frames_dropped,
            max_queue_depth: self.stats.max_queue_depth,
            worker_exited,
        }
    }

    fn tick(&mut self) -> Tick {
        let frame = match self.capture.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                error!("failed to read frame from capture source");
                return Tick::Stop(ScanOutcome::CaptureFailed);
            }
            Err(err) => {
                error!("capture error: {err}");
                return Tick::Stop(ScanOutcome::CaptureFailed);
            }
        };
        self.stats.frames_captured += 1;
        metrics::counter!("qr_frames_captured_total").increment(1);

        self.submit(&frame);

        loop {
            match self.result_rx.try_recv() {
                Ok(result) => {
                    if let Some(view) = self.handle_result(&frame, result) {
                        return Tick::Detected(view);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    error!("decode worker exited unexpectedly");
                    return Tick::Stop(ScanOutcome::WorkerFailed);
                }
            }
        }

        self.show_preview(&frame);
        if self.quit_requested() {
            info!("quit requested");
            return Tick::Stop(ScanOutcome::Quit);
        }
        if !self.options.tick_interval.is_zero() {
            thread::sleep(self.options.tick_interval);
        }
        Tick::Continue
    }

    /// Hand a copy of `frame` to the worker unless one is already waiting.
    fn submit(&mut self, frame: &Frame) {
        let submitted = self.frame_tx.is_empty()
            && match self.frame_tx.try_send(WorkerMessage::Frame(frame.clone())) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
            };

        let depth = self.frame_tx.len();
        self.stats.max_queue_depth = self.stats.max_queue_depth.max(depth);
        metrics::gauge!("qr_queue_depth").set(depth as f64);

        if submitted {
            self.stats.frames_submitted += 1;
            metrics::counter!("qr_frames_submitted_total").increment(1);
        } else {
            self.stats.frames_dropped += 1;
            metrics::counter!("qr_frames_dropped_total").increment(1);
            debug!(
                "dropping frame #{} (decoder busy, dropped total: {})",
                self.stats.frames_captured, self.stats.frames_dropped
            );
        }
    }

    /// Publish a new value. Returns the result view when scanning should stop.
    fn handle_result(&mut self, frame: &Frame, result: DecodeResult) -> Option<Frame> {
        if !self.options.stop_on_detect {
            self.overlay = Some((result.geometry.clone(), OVERLAY_TICKS));
        }
        if result.extracted_value.is_empty()
            || self.last_published.as_deref() == Some(result.extracted_value.as_str())
        {
            return None;
        }

        self.publish(&result.extracted_value);

        self.options
            .stop_on_detect
            .then(|| self.result_view(frame, &result.geometry))
    }

    fn publish(&mut self, value: &str) {
        info!(chars = value.chars().count(), "publishing new value");
        if let Err(err) = self.sink.publish(value) {
            warn!("failed to publish value: {err:#}");
        }
        metrics::counter!("qr_published_total").increment(1);
        self.last_published = Some(value.to_string());
        self.published.push(value.to_string());
    }

    fn result_view(&self, frame: &Frame, geometry: &Geometry) -> Frame {
        if self.options.crop {
            if let Some(tile) =
                crop_region(frame, geometry, self.options.margin, self.options.tile_size)
            {
                return tile;
            }
            debug!("crop unavailable, showing annotated frame");
        }
        draw_polygon(frame, geometry)
    }

    fn show_preview(&mut self, frame: &Frame) {
        let shown = match self.overlay.as_mut() {
            Some((geometry, ticks_left)) => {
                *ticks_left -= 1;
                let annotated = draw_polygon(frame, geometry);
                if *ticks_left == 0 {
                    self.overlay = None;
                }
                self.display.show(PREVIEW_WINDOW, &annotated)
            }
            None => self.display.show(PREVIEW_WINDOW, frame),
        };
        if let Err(err) = shown {
            warn!("failed to show preview: {err:#}");
        }
    }

    fn quit_requested(&mut self) -> bool {
        if self.shutdown.load(Ordering::Relaxed) {
            return true;
        }
        matches!(
            self.display.poll_key(Some(self.options.key_poll)),
            Some('q' | 'Q' | '\u{1b}')
        )
    }

    /// Release scanning resources and show the result until acknowledged.
    fn present(&mut self, view: &Frame) {
        self.capture.release();
        self.display.close_all();
        if let Err(err) = self.display.show(RESULT_WINDOW, view) {
            warn!("failed to show result: {err:#}");
        }
        if self.options.wait_for_ack {
            let _ = self.display.poll_key(None);
        }
    }

    /// Send the shutdown signal and wait a bounded time for the worker to exit.
    fn stop_worker(&mut self) -> bool {
        let Some(handle) = self.worker.take() else {
            return true;
        };
        let timeout = self.options.worker_shutdown_timeout;

        while let Ok(message) = self.pending_frames.try_recv() {
            if let WorkerMessage::Frame(_) = message {
                debug!("discarded frame waiting for the decoder");
            }
        }
        if let Err(err) = self.frame_tx.send_timeout(WorkerMessage::Shutdown, timeout) {
            warn!("failed to signal decode worker: {err}");
        }

        // The worker holds the only result sender, so disconnection means it exited.
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.result_rx.recv_timeout(remaining) {
                Ok(_) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    if handle.join().is_err() {
                        warn!("decode worker panicked during shutdown");
                    }
                    debug!("decode worker exited");
                    return true;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("decode worker did not exit within {timeout:?}, detaching it");
                    return false;
                }
            }
        }
    }
}

impl<C, D, S> Drop for Scanner<C, D, S> {
    fn drop(&mut self) {
        if let Some(_handle) = self.worker.take() {
            // Dropped without `run`: signal the worker and let it finish on its own.
            let _ = self.frame_tx.try_send(WorkerMessage::Shutdown);
        }
    }
}
