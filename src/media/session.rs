// SPDX-License-Identifier: GPL-3.0-only

//! Codec session lifecycle
//!
//! ```text
//! Uninitialized --init--> Ready --close--> Closed
//! ```
//!
//! Only a `Ready` session accepts frames. `Closed` is terminal: a closed
//! session cannot be re-initialized or closed again.

use crate::errors::{CaptureError, CaptureResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Ready,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        }
    }

    /// Fail with `InvalidState` unless the session is `Ready`
    pub fn require_ready(self, operation: &'static str) -> CaptureResult<()> {
        self.require(SessionState::Ready, operation)
    }

    /// Fail with `InvalidState` unless the session is in `expected`
    pub fn require(self, expected: SessionState, operation: &'static str) -> CaptureResult<()> {
        if self == expected {
            Ok(())
        } else {
            Err(CaptureError::InvalidState {
                operation,
                state: self.as_str(),
            })
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ready_accepts_work() {
        assert!(SessionState::Ready.require_ready("encode").is_ok());
        let err = SessionState::Closed.require_ready("encode").unwrap_err();
        assert_eq!(
            err,
            CaptureError::InvalidState {
                operation: "encode",
                state: "closed"
            }
        );
        assert!(SessionState::Uninitialized.require_ready("decode").is_err());
    }
}
