// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Default capture geometry
pub mod capture {
    /// Default capture width
    pub const DEFAULT_WIDTH: u32 = 640;

    /// Default capture height
    pub const DEFAULT_HEIGHT: u32 = 480;

    /// Default framerate requested from the camera and used for timestamps
    pub const DEFAULT_FRAMERATE: u32 = 30;

    /// Default V4L2 device index
    pub const DEFAULT_DEVICE: u32 = 0;

    /// Device node prefix for V4L2 cameras
    pub const V4L2_DEVICE_PREFIX: &str = "/dev/video";

    /// Pattern used when no camera is requested
    pub const DEFAULT_TEST_PATTERN: &str = "smpte";
}

/// VP8 encoder configuration
pub mod encoder {
    /// Resolution the library's default target bitrate is tuned for
    pub const REFERENCE_WIDTH: u32 = 320;

    /// Resolution the library's default target bitrate is tuned for
    pub const REFERENCE_HEIGHT: u32 = 240;

    /// Maximum distance between automatic key frames
    pub const KEYFRAME_MAX_DIST: u32 = 1000;

    /// Frames the encoder may hold back; zero means one packet per frame
    pub const LAG_IN_FRAMES: u32 = 0;

    /// Realtime encode deadline
    pub const DEADLINE_REALTIME: i64 = 1;

    /// Rate control mode
    pub const END_USAGE: &str = "cbr";

    /// Automatic key frame placement
    pub const KEYFRAME_MODE: &str = "auto";

    /// Single pass encoding
    pub const MULTIPASS_MODE: &str = "one-pass";

    /// Error resilience flags (default resilience plus independent partitions)
    pub const ERROR_RESILIENT: &str = "default+partitions";

    /// GStreamer encoder element
    pub const ELEMENT: &str = "vp8enc";

    /// GStreamer decoder element
    pub const DECODER_ELEMENT: &str = "vp8dec";

    /// Scale a library default bitrate (tuned for the reference resolution)
    /// to the given geometry.
    pub fn scaled_bitrate(width: u32, height: u32, default_bitrate: u32) -> u32 {
        let area = width as u64 * height as u64;
        let reference = REFERENCE_WIDTH as u64 * REFERENCE_HEIGHT as u64;
        let scaled = area * default_bitrate as u64 / reference;
        scaled.min(i32::MAX as u64) as u32
    }
}

/// Buffer sizes
pub mod capacity {
    /// Default scratch capacity for one encoded frame (5 MiB)
    pub const DEFAULT_OUTPUT_CAPACITY: usize = 5 * 1024 * 1024;

    /// Working buffers kept in the encoder pool
    pub const ENCODER_POOL_BUFFERS: u32 = 2;
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Maximum buffer queue size on camera appsinks (keep small for low latency)
    pub const MAX_BUFFERS: u32 = 1;

    /// Raw format exchanged with the codec elements
    pub const RAW_FORMAT: &str = "I420";

    /// Caps of the compressed stream
    pub const VP8_CAPS: &str = "video/x-vp8";

    /// Name of the appsrc element in transport pipelines
    pub const SOURCE_NAME: &str = "src";

    /// Name of the appsink element in transport pipelines
    pub const SINK_NAME: &str = "sink";
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// How long a camera read waits for a frame
    pub const READ_TIMEOUT_MS: u64 = 2000;

    /// How long a transport pull waits for a sample
    pub const PULL_TIMEOUT_MS: u64 = 1000;

    /// Nanoseconds per frame at the given framerate
    pub fn frame_duration_ns(framerate: u32) -> u64 {
        1_000_000_000 / framerate.max(1) as u64
    }
}

/// IVF container constants
pub mod ivf {
    /// File signature
    pub const SIGNATURE: &[u8; 4] = b"DKIF";

    /// Only known container version
    pub const VERSION: u16 = 0;

    /// Size of the file header
    pub const HEADER_LEN: u16 = 32;

    /// Size of each frame header (u32 size + u64 pts)
    pub const FRAME_HEADER_LEN: usize = 12;

    /// FourCC for VP8 streams
    pub const VP8_FOURCC: &[u8; 4] = b"VP80";
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Directory name used under the user's config directory
    pub const CONFIG_DIR_NAME: &str = "vp8-capture";
}
