//! `decode` subcommand: extract the value of interest from one still image.

use anyhow::{Context, Result, bail};
use qr_vision::{
    decode_frame,
    sink::{Sink, StdoutSink},
};
use video_ingest::Frame;

use crate::{cli::DecodeArgs, telemetry};

pub fn run(args: DecodeArgs) -> Result<()> {
    let _telemetry = telemetry::init(args.verbose, &Default::default());
    let schema = args.payload.schema()?;

    let image = image::open(&args.image)
        .with_context(|| format!("failed to load {}", args.image.display()))?
        .to_rgb8();
    let frame = Frame::from_rgb_image(image, chrono::Utc::now().timestamp_millis());

    let mut decoder = (args.decoder.factory())()
        .with_context(|| format!("failed to build {} decoder", args.decoder.label()))?;
    let results = decode_frame(decoder.as_mut(), &schema, &frame);
    if results.is_empty() {
        bail!(
            "no QR code with a value for key {:?} found in {}",
            schema.key,
            args.image.display()
        );
    }

    let mut sink = StdoutSink::new();
    for result in results {
        tracing::debug!(points = result.geometry.len(), "decoded value");
        sink.publish(&result.extracted_value)?;
    }
    Ok(())
}
