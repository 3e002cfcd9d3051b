use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use qr_vision::{DecoderKind, PayloadArgs, ScanCliArgs};

/// Scan a video source for QR codes and publish one field of each new payload.
#[derive(Debug, Parser)]
#[command(name = "qr-scan", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan a camera, video, or image sequence until a code is found.
    Scan(ScanCliArgs),
    /// Decode a single image and print the extracted value.
    Decode(DecodeArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Image file to decode.
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,
    /// Decoding backend.
    #[arg(long = "decoder", value_enum, default_value_t = DecoderKind::default())]
    pub decoder: DecoderKind,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Enable verbose logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn decode_subcommand_parses() {
        let cli = Cli::try_parse_from(["qr-scan", "decode", "code.png", "--decoder", "rqrr"])
            .unwrap();
        let Command::Decode(args) = cli.command else {
            panic!("expected decode subcommand");
        };
        assert_eq!(args.image, PathBuf::from("code.png"));
        assert_eq!(args.decoder, DecoderKind::Rqrr);
        assert_eq!(args.payload.key, "P");
    }

    #[test]
    fn scan_subcommand_converts_to_config() {
        let cli = Cli::try_parse_from(["qr-scan", "scan", "frames", "--headless"]).unwrap();
        let Command::Scan(args) = cli.command else {
            panic!("expected scan subcommand");
        };
        let config: qr_vision::ScanConfig = args.try_into().unwrap();
        assert_eq!(config.source_uri, "frames");
        assert!(config.headless);
    }
}
