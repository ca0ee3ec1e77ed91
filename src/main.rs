// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vp8_capture::constants::app_info;

mod cli;

#[derive(Parser)]
#[command(name = "vp8-capture")]
#[command(about = "Capture camera frames as VP8 and play them back")]
#[command(version = app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available V4L2 cameras
    List,

    /// Capture frames, encode them as VP8 and store them in an IVF file
    Record {
        /// Camera index N of /dev/videoN (default: from config)
        #[arg(short, long, conflicts_with = "test_pattern")]
        device: Option<u32>,

        /// Use a synthetic test pattern instead of a camera (e.g. smpte, ball)
        #[arg(short, long)]
        test_pattern: Option<String>,

        /// Capture width (default: from config)
        #[arg(long)]
        width: Option<u32>,

        /// Capture height (default: from config)
        #[arg(long)]
        height: Option<u32>,

        /// Number of frames to record (default: until Ctrl+C)
        #[arg(short, long)]
        frames: Option<u64>,

        /// Force a key frame every N frames
        #[arg(short, long)]
        keyframe_every: Option<u64>,

        /// Output file path (default: ~/Videos/capture_TIMESTAMP.ivf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration file (default: user config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Decode an IVF file into raw I420 frames
    Decode {
        /// IVF input file
        #[arg(short, long)]
        input: PathBuf,

        /// Raw output file (default: input with .yuv extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode an IVF file and show it in a window
    Play {
        /// IVF input file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Write the defaults to the user config file
        #[arg(short, long)]
        write: bool,

        /// Configuration file (default: user config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=vp8_capture=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List) | None => cli::list_cameras(),
        Some(Commands::Record {
            device,
            test_pattern,
            width,
            height,
            frames,
            keyframe_every,
            output,
            config,
        }) => cli::record(cli::RecordOptions {
            device,
            test_pattern,
            width,
            height,
            frames,
            keyframe_every,
            output,
            config,
        }),
        Some(Commands::Decode { input, output }) => cli::decode_file(&input, output),
        Some(Commands::Play { input }) => cli::play(&input),
        Some(Commands::Config { write, config }) => cli::show_config(config, write),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vp8_capture::constants::capture;

    #[test]
    fn test_record_arguments() {
        let cli = Cli::try_parse_from([
            "vp8-capture",
            "record",
            "--test-pattern",
            "ball",
            "--frames",
            "10",
            "--width",
            "320",
        ])
        .expect("valid arguments");
        match cli.command {
            Some(Commands::Record {
                test_pattern,
                frames,
                width,
                height,
                ..
            }) => {
                assert_eq!(test_pattern.as_deref(), Some("ball"));
                assert_eq!(frames, Some(10));
                assert_eq!(width, Some(320));
                assert_eq!(height, None);
            }
            _ => panic!("expected record command"),
        }
    }

    #[test]
    fn test_device_conflicts_with_pattern() {
        let result = Cli::try_parse_from([
            "vp8-capture",
            "record",
            "--device",
            "1",
            "--test-pattern",
            capture::DEFAULT_TEST_PATTERN,
        ]);
        assert!(result.is_err());
    }
}
