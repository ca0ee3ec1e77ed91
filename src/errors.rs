// SPDX-License-Identifier: GPL-3.0-only

//! Error types for capture and codec sessions
//!
//! Every fallible operation in the crate returns [`CaptureResult`]. The
//! variants mirror the failure points of the capture/encode/decode path so
//! callers can tell "camera missing" apart from "output buffer too small"
//! without parsing messages.

use std::fmt;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Main error type for the capture pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Native codec element could not be created or started
    InitFailed(String),
    /// Working image or buffer pool could not be allocated
    AllocationFailed(String),
    /// Encoder configuration could not be derived or applied
    ConfigError(String),
    /// Native codec element could not be shut down cleanly
    TeardownFailed(String),
    /// Native encoder rejected a frame
    EncodeFailed(String),
    /// Native decoder rejected the input or input was empty
    DecodeFailed(String),
    /// Caller-provided output capacity cannot hold the result
    OutputTooSmall {
        /// Bytes the operation needed at the point of failure
        needed: usize,
        /// Capacity that was available
        capacity: usize,
    },
    /// Encoder produced no data for the submitted frame
    EmptyOutput,
    /// Requested camera device does not exist
    DeviceNotFound(String),
    /// Camera exists but could not be opened or started
    DeviceOpenFailed(String),
    /// No frame or sample became available in time
    NoData,
    /// Operation called in a lifecycle state that does not allow it
    InvalidState {
        /// Name of the rejected operation
        operation: &'static str,
        /// State the session was in
        state: &'static str,
    },
    /// Image geometry or length does not match what the operation expects
    InvalidFrame(String),
    /// IVF stream is malformed or truncated
    InvalidContainer(String),
    /// Transport or capture pipeline failed
    PipelineError(String),
    /// Filesystem or stream I/O error
    Io(String),
}

impl CaptureError {
    /// Numeric code for callers that still speak the legacy integer protocol.
    ///
    /// The first nine values keep their historic meaning; kinds introduced
    /// later continue the sequence.
    pub fn code(&self) -> i32 {
        match self {
            CaptureError::DeviceOpenFailed(_) => -1,
            CaptureError::NoData => -2,
            CaptureError::AllocationFailed(_) => -3,
            CaptureError::ConfigError(_) => -4,
            CaptureError::InitFailed(_) => -5,
            CaptureError::EncodeFailed(_) => -6,
            CaptureError::TeardownFailed(_) => -7,
            CaptureError::OutputTooSmall { .. } => -8,
            CaptureError::DecodeFailed(_) => -9,
            CaptureError::EmptyOutput => -10,
            CaptureError::DeviceNotFound(_) => -11,
            CaptureError::InvalidState { .. } => -12,
            CaptureError::InvalidFrame(_) => -13,
            CaptureError::InvalidContainer(_) => -14,
            CaptureError::PipelineError(_) => -15,
            CaptureError::Io(_) => -16,
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::InitFailed(msg) => write!(f, "Codec initialization failed: {}", msg),
            CaptureError::AllocationFailed(msg) => write!(f, "Allocation failed: {}", msg),
            CaptureError::ConfigError(msg) => write!(f, "Encoder configuration error: {}", msg),
            CaptureError::TeardownFailed(msg) => write!(f, "Codec teardown failed: {}", msg),
            CaptureError::EncodeFailed(msg) => write!(f, "Encode failed: {}", msg),
            CaptureError::DecodeFailed(msg) => write!(f, "Decode failed: {}", msg),
            CaptureError::OutputTooSmall { needed, capacity } => write!(
                f,
                "Output too small: needed {} bytes, capacity {}",
                needed, capacity
            ),
            CaptureError::EmptyOutput => write!(f, "Encoder produced no output"),
            CaptureError::DeviceNotFound(device) => write!(f, "Camera not found: {}", device),
            CaptureError::DeviceOpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            CaptureError::NoData => write!(f, "No data available"),
            CaptureError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while session is {}", operation, state)
            }
            CaptureError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            CaptureError::InvalidContainer(msg) => write!(f, "Invalid IVF stream: {}", msg),
            CaptureError::PipelineError(msg) => write!(f, "Pipeline error: {}", msg),
            CaptureError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_codes_are_stable() {
        assert_eq!(CaptureError::DeviceOpenFailed(String::new()).code(), -1);
        assert_eq!(CaptureError::NoData.code(), -2);
        assert_eq!(CaptureError::AllocationFailed(String::new()).code(), -3);
        assert_eq!(CaptureError::ConfigError(String::new()).code(), -4);
        assert_eq!(CaptureError::InitFailed(String::new()).code(), -5);
        assert_eq!(CaptureError::EncodeFailed(String::new()).code(), -6);
        assert_eq!(CaptureError::TeardownFailed(String::new()).code(), -7);
        assert_eq!(
            CaptureError::OutputTooSmall {
                needed: 2,
                capacity: 1
            }
            .code(),
            -8
        );
        assert_eq!(CaptureError::DecodeFailed(String::new()).code(), -9);
    }

    #[test]
    fn test_display_includes_sizes() {
        let err = CaptureError::OutputTooSmall {
            needed: 1200,
            capacity: 1000,
        };
        let text = err.to_string();
        assert!(text.contains("1200"));
        assert!(text.contains("1000"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: CaptureError = io.into();
        assert!(matches!(err, CaptureError::Io(ref msg) if msg.contains("short read")));
    }
}
