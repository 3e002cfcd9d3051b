//! Decode worker thread.
//!
//! The worker owns its decoder and consumes frames from a capacity-1 inbound
//! channel. Only successful [`DecodeResult`]s travel back; decoder errors and
//! panics are logged and count as "nothing found" for that frame.

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    thread,
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};
use video_ingest::Frame;

use crate::{
    decoder::{Decoder, DecoderFactory},
    geometry::{Geometry, normalize},
    payload::PayloadSchema,
};

/// Inbound message for the decode worker.
pub enum WorkerMessage {
    Frame(Frame),
    /// Stop the worker. Nothing is sent after it.
    Shutdown,
}

/// A value of interest and where it was found.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeResult {
    pub extracted_value: String,
    pub geometry: Geometry,
}

/// Spawn the decode worker thread.
///
/// The decoder is built on the new thread and the outcome is reported once on
/// `init_tx`. The worker exits on [`WorkerMessage::Shutdown`], when the frame
/// channel disconnects, or when nobody is listening for results. Dropping its
/// `result_tx` on exit is what lets the controller observe the exit.
pub fn spawn_decode_worker(
    factory: DecoderFactory,
    schema: PayloadSchema,
    frame_rx: Receiver<WorkerMessage>,
    result_tx: Sender<DecodeResult>,
    init_tx: Sender<Result<String, String>>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("qr-decode".into())
        .spawn(move || {
            let worker_span = tracing::info_span!("decode.worker", key = %schema.key);
            let _worker_guard = worker_span.enter();

            let mut decoder = match panic::catch_unwind(AssertUnwindSafe(factory)) {
                Ok(Ok(decoder)) => {
                    if init_tx.send(Ok("decoder ready".to_string())).is_err() {
                        return;
                    }
                    decoder
                }
                Ok(Err(err)) => {
                    let _ = init_tx.send(Err(format!("failed to build decoder: {err:#}")));
                    return;
                }
                Err(_) => {
                    let _ = init_tx.send(Err("decoder construction panicked".to_string()));
                    return;
                }
            };
            drop(init_tx);

            let mut frames: u64 = 0;
            loop {
                let frame = match frame_rx.recv() {
                    Ok(WorkerMessage::Frame(frame)) => frame,
                    Ok(WorkerMessage::Shutdown) => {
                        debug!("decode worker received shutdown after {frames} frame(s)");
                        break;
                    }
                    Err(_) => {
                        warn!("frame channel closed without shutdown signal");
                        break;
                    }
                };
                frames += 1;

                for result in decode_frame(decoder.as_mut(), &schema, &frame) {
                    metrics::counter!("qr_decode_results_total").increment(1);
                    if result_tx.send(result).is_err() {
                        info!("result channel closed, stopping decode worker");
                        return;
                    }
                }
            }
        })
}

/// Decode one frame into results. Never panics and never fails.
pub fn decode_frame(
    decoder: &mut dyn Decoder,
    schema: &PayloadSchema,
    frame: &Frame,
) -> Vec<DecodeResult> {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(frame)));
    metrics::histogram!("qr_decode_latency_seconds").record(started.elapsed().as_secs_f64());

    let symbols = match outcome {
        Ok(Ok(symbols)) => symbols,
        Ok(Err(err)) => {
            warn!("decode error, skipping frame: {err:#}");
            metrics::counter!("qr_decode_errors_total").increment(1);
            return Vec::new();
        }
        Err(_) => {
            error!("decoder panicked, skipping frame");
            metrics::counter!("qr_decode_errors_total").increment(1);
            return Vec::new();
        }
    };

    symbols
        .into_iter()
        .filter_map(|symbol| match schema.parse(&symbol.text) {
            Some(record) => Some(DecodeResult {
                extracted_value: record.into_value(),
                geometry: normalize(symbol.position.as_ref()),
            }),
            None => {
                debug!("no value for key {:?} in payload {:?}", schema.key, symbol.text);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{Result, bail};
    use crossbeam_channel::{RecvTimeoutError, bounded, unbounded};
    use video_ingest::FrameFormat;

    use super::*;
    use crate::decoder::DecodedSymbol;
    use crate::geometry::{GeometryPoint, PointLike, RawPosition};

    fn frame(shade: u8) -> Frame {
        Frame::new(vec![shade; 12], 2, 2, FrameFormat::Rgb8, 0).unwrap()
    }

    /// Fails on shade 0, panics on shade 1, otherwise returns its payloads.
    struct ScriptedDecoder {
        payloads: Vec<&'static str>,
    }

    impl Decoder for ScriptedDecoder {
        fn decode(&mut self, frame: &Frame) -> Result<Vec<DecodedSymbol>> {
            match frame.data[0] {
                0 => bail!("sensor glitch"),
                1 => panic!("decoder bug"),
                _ => Ok(self
                    .payloads
                    .iter()
                    .map(|text| DecodedSymbol {
                        text: text.to_string(),
                        position: Some(RawPosition::Points(vec![PointLike::from((1.0, 1.0))])),
                    })
                    .collect()),
            }
        }
    }

    fn scripted(payloads: Vec<&'static str>) -> DecoderFactory {
        Box::new(move || Ok(Box::new(ScriptedDecoder { payloads }) as Box<dyn Decoder>))
    }

    #[test]
    fn decode_frame_parses_and_normalizes() {
        let mut decoder = ScriptedDecoder {
            payloads: vec!["S:a;P:one", "garbage;no-colon-fields", "P:two"],
        };
        let results = decode_frame(&mut decoder, &PayloadSchema::default(), &frame(9));
        assert_eq!(
            results,
            vec![
                DecodeResult {
                    extracted_value: "one".into(),
                    geometry: vec![GeometryPoint::new(1.0, 1.0)],
                },
                DecodeResult {
                    extracted_value: "two".into(),
                    geometry: vec![GeometryPoint::new(1.0, 1.0)],
                },
            ]
        );
    }

    #[test]
    fn decoder_errors_and_panics_yield_no_results() {
        let mut decoder = ScriptedDecoder {
            payloads: vec!["P:x"],
        };
        let schema = PayloadSchema::default();
        assert!(decode_frame(&mut decoder, &schema, &frame(0)).is_empty());
        assert!(decode_frame(&mut decoder, &schema, &frame(1)).is_empty());
        assert_eq!(decode_frame(&mut decoder, &schema, &frame(2)).len(), 1);
    }

    #[test]
    fn worker_survives_bad_frames_and_exits_on_shutdown() {
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = unbounded();
        let (init_tx, init_rx) = bounded(1);
        let handle = spawn_decode_worker(
            scripted(vec!["P:pw"]),
            PayloadSchema::default(),
            frame_rx,
            result_tx,
            init_tx,
        )
        .unwrap();
        assert!(init_rx.recv().unwrap().is_ok());

        frame_tx.send(WorkerMessage::Frame(frame(0))).unwrap();
        frame_tx.send(WorkerMessage::Frame(frame(1))).unwrap();
        frame_tx.send(WorkerMessage::Frame(frame(5))).unwrap();
        let result = result_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.extracted_value, "pw");

        frame_tx.send(WorkerMessage::Shutdown).unwrap();
        assert_eq!(
            result_rx.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        );
        handle.join().unwrap();
    }

    #[test]
    fn failed_construction_is_reported() {
        let (_frame_tx, frame_rx) = bounded(1);
        let (result_tx, _result_rx) = unbounded();
        let (init_tx, init_rx) = bounded(1);
        let factory: DecoderFactory = Box::new(|| -> Result<Box<dyn Decoder>> { bail!("no model") });
        let handle =
            spawn_decode_worker(factory, PayloadSchema::default(), frame_rx, result_tx, init_tx)
                .unwrap();
        let message = init_rx.recv().unwrap().unwrap_err();
        assert!(message.contains("no model"));
        handle.join().unwrap();
    }
}
