// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Recording VP8 streams into IVF files
//! - Decoding and playing IVF files

use chrono::Local;
use gstreamer as gst;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;
use vp8_capture::CaptureError;
use vp8_capture::backends::camera::{CameraSource, enumerate_cameras};
use vp8_capture::config::Config;
use vp8_capture::constants::{capacity, pipeline, timing};
use vp8_capture::media::ivf::{IvfHeader, IvfReader, IvfWriter};
use vp8_capture::media::{PlaneLayout, Vp8Decoder};
use vp8_capture::pipelines::{CaptureSession, MediaPipeline};

/// Arguments of the `record` command
pub struct RecordOptions {
    pub device: Option<u32>,
    pub test_pattern: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frames: Option<u64>,
    pub keyframe_every: Option<u64>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let cameras = enumerate_cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        println!("  [{}] {} ({})", camera.index, camera.name, camera.path);
        println!("      Driver: {} on {}", camera.driver, camera.bus);
        if !camera.formats.is_empty() {
            println!("      Formats: {}", camera.formats.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Capture and encode frames into an IVF file until the frame limit or Ctrl+C
pub fn record(options: RecordOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(options.config.as_deref())?;
    let width = options.width.unwrap_or(config.width);
    let height = options.height.unwrap_or(config.height);

    let source = match options.test_pattern {
        Some(pattern) => CameraSource::test_pattern(pattern),
        None => CameraSource::device(options.device.unwrap_or(config.device)),
    };

    let output_path = match options.output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            path
        }
        None => {
            let dir = default_video_dir();
            std::fs::create_dir_all(&dir)?;
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("capture_{}.ivf", timestamp))
        }
    };

    println!("Source: {}", source);
    println!("Format: {}x{} @ {}fps", width, height, config.framerate);
    println!("Output: {}", output_path.display());

    let mut session = CaptureSession::start(&source, width, height, &config)?;
    let key_frames = session.key_frame_handle();

    let header = IvfHeader::vp8(width, height, config.framerate)?;
    let mut writer = IvfWriter::new(BufWriter::new(File::create(&output_path)?), header)?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!();
    println!("Recording... (press Ctrl+C to stop)");

    let mut out = vec![0u8; config.output_capacity];
    let mut written: u64 = 0;
    let mut failure: Option<CaptureError> = None;
    let start = Instant::now();

    while !stop_flag.load(Ordering::SeqCst) {
        if options.frames.is_some_and(|limit| written >= limit) {
            break;
        }
        if let Some(every) = options.keyframe_every
            && every > 0
            && written > 0
            && written % every == 0
        {
            key_frames.request();
        }

        match session.read(&mut out, false) {
            Ok(len) => {
                if let Err(e) = writer.write_frame(&out[..len], written) {
                    failure = Some(e);
                    break;
                }
                written += 1;
            }
            Err(CaptureError::NoData) => {
                warn!("No frame arrived within the read timeout");
                continue;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }

        if written % timing::FRAME_LOG_INTERVAL == 0 {
            let elapsed = start.elapsed().as_secs();
            print!(
                "\rRecorded: {} frames ({:02}:{:02})",
                written,
                elapsed / 60,
                elapsed % 60
            );
            std::io::stdout().flush()?;
        }
    }
    println!();

    let stop_result = session.stop();
    let mut file = writer.finish()?;
    file.flush()?;

    if let Some(e) = failure {
        return Err(e.into());
    }
    stop_result?;

    println!("Saved {} frames to {}", written, output_path.display());
    Ok(())
}

/// Decode every frame of an IVF file into a raw I420 file
pub fn decode_file(input: &Path, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = open_vp8_ivf(input)?;
    let header = *reader.header();
    let output_path = output.unwrap_or_else(|| input.with_extension("yuv"));

    println!(
        "Input: {} ({}x{}, {} frames)",
        input.display(),
        header.width,
        header.height,
        header.frame_count
    );

    let layout = PlaneLayout::new(header.width as u32, header.height as u32);
    let mut out = vec![0u8; layout.total_len().max(capacity::DEFAULT_OUTPUT_CAPACITY)];
    let mut decoder = Vp8Decoder::open()?;
    let mut sink = BufWriter::new(File::create(&output_path)?);
    let mut pictures = 0usize;

    for frame in &mut reader {
        let frame = frame?;
        let summary = decoder.decode_into(&frame.data, &mut out)?;
        sink.write_all(&out[..summary.bytes_written])?;
        pictures += summary.frames;
    }
    sink.flush()?;
    decoder.close()?;

    println!("Wrote {} pictures to {}", pictures, output_path.display());
    Ok(())
}

/// Decode an IVF file and render it through a video sink
pub fn play(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = open_vp8_ivf(input)?;
    let header = *reader.header();
    let layout = PlaneLayout::new(header.width as u32, header.height as u32);
    let framerate = header.frame_rate.div_ceil(header.time_scale.max(1));

    let mut transport = MediaPipeline::launch(&format!(
        "appsrc name={} format=time ! videoconvert ! autovideosink",
        pipeline::SOURCE_NAME
    ))?;
    transport.set_raw_video_caps(header.width as u32, header.height as u32, framerate)?;
    transport.start()?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let mut decoder = Vp8Decoder::open()?;
    let out_capacity = layout.total_len().max(capacity::DEFAULT_OUTPUT_CAPACITY);
    let mut last_pts = gst::ClockTime::ZERO;

    for frame in &mut reader {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }
        let frame = frame?;
        let image = match decoder.decode(&frame.data, out_capacity) {
            Ok(image) => image,
            Err(CaptureError::NoData) => continue,
            Err(e) => return Err(e.into()),
        };
        last_pts = pts_to_clock_time(&header, frame.pts);
        transport.push_image(&image, last_pts)?;
        transport.check_errors()?;
    }

    transport.end_of_stream()?;
    if !stop_flag.load(Ordering::SeqCst) {
        let wait = Duration::from_nanos(last_pts.nseconds())
            + Duration::from_secs(timing::STOP_TIMEOUT_SECS);
        match transport.wait_for_eos(wait) {
            Ok(()) | Err(CaptureError::NoData) => {}
            Err(e) => return Err(e.into()),
        }
    }
    transport.stop()?;
    decoder.close()?;
    Ok(())
}

/// Print the effective configuration, optionally writing defaults first
pub fn show_config(path: Option<PathBuf>, write: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = match path.or_else(Config::default_path) {
        Some(path) => path,
        None => return Err("No config directory available".into()),
    };

    if write {
        Config::default().save(&path)?;
        println!("Wrote defaults to {}", path.display());
    }

    let config = Config::load_or_default(Some(&path))?;
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn open_vp8_ivf(input: &Path) -> Result<IvfReader<BufReader<File>>, Box<dyn std::error::Error>> {
    let reader = IvfReader::new(BufReader::new(File::open(input)?))?;
    if reader.codec() != "VP80" {
        return Err(CaptureError::InvalidContainer(format!(
            "{} holds {}, not VP8",
            input.display(),
            reader.codec()
        ))
        .into());
    }
    Ok(reader)
}

/// IVF timestamps count `time_scale / frame_rate` second units
fn pts_to_clock_time(header: &IvfHeader, pts: u64) -> gst::ClockTime {
    let nanos = pts as u128 * header.time_scale as u128 * 1_000_000_000
        / header.frame_rate.max(1) as u128;
    gst::ClockTime::from_nseconds(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Default folder for recordings
fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}
