//! Decode engine seam.
//!
//! Pixel-level symbol decoding is an external capability: the session holds
//! a [`DecodeEngine`] rather than extending one, so orchestration stays
//! decoupled from any particular decoder's internals. Engines classify
//! their failures into the closed [`DecodeError`] set; the scan loop uses
//! that classification to decide between "keep scanning" and "halt".

mod stub;

use std::fmt;

use crate::config::DecodeHints;
use crate::platform::FrameSource;
use crate::{BarcodeFormat, DecodeFailureKind};

pub use stub::{ScriptedEngine, ScriptedOutcome};

/// A successfully decoded symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeResult {
    pub text: String,
    pub format: BarcodeFormat,
}

impl DecodeResult {
    pub fn new(text: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }
}

/// Classified decode failure.
#[derive(Debug)]
pub enum DecodeError {
    /// No code found in the frame. Expected noise while searching.
    NotFound,
    /// A code was found but its checksum did not verify.
    ChecksumMismatch,
    /// A code was found but its structure was invalid.
    FormatInvalid,
    /// The engine signaled failure without any classification. Treated
    /// identically to `NotFound` by the loop.
    Unclassified,
    /// Anything else. Terminates the loop.
    Fatal(anyhow::Error),
}

impl DecodeError {
    /// Maps the error onto the expected-failure taxonomy.
    ///
    /// `Some(kind)` means the loop recovers and keeps scanning (`kind` is
    /// `None` for an unclassified failure); `None` means fatal.
    pub fn failure_kind(&self) -> Option<Option<DecodeFailureKind>> {
        match self {
            DecodeError::NotFound => Some(Some(DecodeFailureKind::NotFound)),
            DecodeError::ChecksumMismatch => Some(Some(DecodeFailureKind::ChecksumMismatch)),
            DecodeError::FormatInvalid => Some(Some(DecodeFailureKind::FormatInvalid)),
            DecodeError::Unclassified => Some(None),
            DecodeError::Fatal(_) => None,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotFound => write!(f, "no code found in frame"),
            DecodeError::ChecksumMismatch => write!(f, "code found but checksum mismatched"),
            DecodeError::FormatInvalid => write!(f, "code found but format was invalid"),
            DecodeError::Unclassified => write!(f, "decode failed without classification"),
            DecodeError::Fatal(err) => write!(f, "fatal decode error: {}", err),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decoding engine capability consumed by the scan loop.
///
/// `decode` runs one attempt against the current frame source. There is no
/// per-attempt timeout here: bounding decode latency is the engine's
/// responsibility.
pub trait DecodeEngine: Send {
    fn decode(&mut self, source: &dyn FrameSource) -> Result<DecodeResult, DecodeError>;

    /// Receive the configured hints (format allow-list, try-harder flag).
    /// The session controller applies these once at construction; engines
    /// that do not tune on hints may keep the default no-op.
    fn set_hints(&mut self, _hints: &DecodeHints) {}
}
