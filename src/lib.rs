//! Continuous barcode/QR scan session kernel.
//!
//! This crate orchestrates continuous scanning sessions over a live camera
//! stream supplied by a browser-like host platform. It does not decode
//! pixels itself: decoding is an external [`DecodeEngine`] capability the
//! session consumes.
//!
//! # Architecture
//!
//! The kernel enforces a small set of lifecycle guarantees:
//!
//! 1. **At most one active stream** and one active loop generation per
//!    controller at any instant. Acquiring a new stream always releases the
//!    old one first.
//! 2. **Generation discipline**: every scan loop is bound to a monotonically
//!    increasing generation token. A superseded generation never emits an
//!    outcome, even if a decode attempt was in flight when it was
//!    invalidated.
//! 3. **Classified failure handling**: expected per-attempt failures
//!    (nothing found, checksum mismatch, invalid format) keep the loop
//!    running at full cadence; anything else terminates the loop and resets
//!    the session.
//! 4. **Probe streams never leak**: a permission-request stream is released
//!    on every exit path before the result is reported.
//!
//! # Module Structure
//!
//! - `platform`: host capability seams (camera access, media streams, frame sinks)
//! - `decode`: decode engine seam and classified decode errors
//! - `stream`: media stream acquisition and release
//! - `torch`: torch capability probing and switching
//! - `scan_loop`: the self-rescheduling decode-attempt loop
//! - `session`: the session controller (start/stop/restart/torch)
//! - `devices`: device enumeration, permission requests, autostart
//! - `events`: the event channel emitted to the host UI
//! - `config`: structured, validated scan configuration

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod decode;
pub mod devices;
pub mod events;
pub mod platform;
pub mod scan_loop;
pub mod session;
pub mod stream;
pub mod torch;

pub use config::{DecodeHints, ScanConfig};
pub use decode::{DecodeEngine, DecodeError, DecodeResult, ScriptedEngine, ScriptedOutcome};
pub use devices::{DeviceOrchestrator, PermissionCheck};
pub use events::{EventBus, ScanEvent};
pub use platform::{
    CameraError, CameraHost, FrameSource, MediaStream, MediaTrack, StreamConstraints,
    StubCameraHost, StubFrameSource, StubTrackSpec, TorchConstraint, TrackCapabilities,
};
pub use session::SessionController;
pub use stream::StreamAcquisitionManager;
pub use torch::TorchSwitch;

// -------------------- Devices & Permission --------------------

/// A video input device as reported by the host platform.
///
/// Enumeration returns an immutable snapshot; labels may be empty before
/// camera permission has been granted, which is acceptable and not fatal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub label: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Camera permission state as resolved from the host platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Could not be determined (unsupported host, no devices, unnamed error).
    Unknown,
}

// -------------------- Torch --------------------

/// Torch (device flashlight) availability for the current stream.
///
/// Monotonic within one stream generation: once `Available`, it stays
/// `Available` until a new stream is acquired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TorchAvailability {
    Unknown,
    Available,
    Unavailable,
}

// -------------------- Scan Outcomes --------------------

/// Expected, non-fatal decode failure kinds. The loop recovers from these
/// locally and keeps scanning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeFailureKind {
    /// No code was found in the frame.
    NotFound,
    /// A code was found but its checksum did not verify.
    ChecksumMismatch,
    /// A code was found but its structure was invalid.
    FormatInvalid,
}

/// The outcome of exactly one decode attempt.
///
/// Exactly one outcome category is produced per attempt, never a partial or
/// duplicate outcome.
#[derive(Debug)]
pub enum ScanOutcome {
    Success(DecodeResult),
    /// Expected failure. `None` means the engine signaled failure without a
    /// classification, which is treated identically to "no code found".
    Failure(Option<DecodeFailureKind>),
    /// Fatal error: the loop terminates and is not rescheduled.
    Error(anyhow::Error),
}

// -------------------- Session State --------------------

/// Lifecycle state of a [`SessionController`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, never started.
    Idle,
    /// A start is in progress (stream being acquired).
    Starting,
    /// A stream is live and a scan loop is running.
    Active {
        device_id: Option<String>,
        generation: u64,
    },
    Stopped,
}

// -------------------- Barcode Formats --------------------

/// Barcode symbologies a decode engine may be asked to look for.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BarcodeFormat {
    Aztec,
    Codabar,
    Code39,
    Code93,
    Code128,
    DataMatrix,
    Ean8,
    Ean13,
    Itf,
    MaxiCode,
    Pdf417,
    QrCode,
    Rss14,
    RssExpanded,
    UpcA,
    UpcE,
    UpcEanExtension,
}

impl BarcodeFormat {
    /// Canonical name, matching the conventional symbology spelling.
    pub fn name(&self) -> &'static str {
        match self {
            BarcodeFormat::Aztec => "AZTEC",
            BarcodeFormat::Codabar => "CODABAR",
            BarcodeFormat::Code39 => "CODE_39",
            BarcodeFormat::Code93 => "CODE_93",
            BarcodeFormat::Code128 => "CODE_128",
            BarcodeFormat::DataMatrix => "DATA_MATRIX",
            BarcodeFormat::Ean8 => "EAN_8",
            BarcodeFormat::Ean13 => "EAN_13",
            BarcodeFormat::Itf => "ITF",
            BarcodeFormat::MaxiCode => "MAXICODE",
            BarcodeFormat::Pdf417 => "PDF_417",
            BarcodeFormat::QrCode => "QR_CODE",
            BarcodeFormat::Rss14 => "RSS_14",
            BarcodeFormat::RssExpanded => "RSS_EXPANDED",
            BarcodeFormat::UpcA => "UPC_A",
            BarcodeFormat::UpcE => "UPC_E",
            BarcodeFormat::UpcEanExtension => "UPC_EAN_EXTENSION",
        }
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BarcodeFormat {
    type Err = anyhow::Error;

    /// Case-insensitive parse; separators (`_`, `-`, spaces) are ignored so
    /// "qr_code", "QR Code" and "QRCODE" all resolve to the same format.
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_uppercase();
        let format = match normalized.as_str() {
            "AZTEC" => BarcodeFormat::Aztec,
            "CODABAR" => BarcodeFormat::Codabar,
            "CODE39" => BarcodeFormat::Code39,
            "CODE93" => BarcodeFormat::Code93,
            "CODE128" => BarcodeFormat::Code128,
            "DATAMATRIX" => BarcodeFormat::DataMatrix,
            "EAN8" => BarcodeFormat::Ean8,
            "EAN13" => BarcodeFormat::Ean13,
            "ITF" => BarcodeFormat::Itf,
            "MAXICODE" => BarcodeFormat::MaxiCode,
            "PDF417" => BarcodeFormat::Pdf417,
            "QRCODE" => BarcodeFormat::QrCode,
            "RSS14" => BarcodeFormat::Rss14,
            "RSSEXPANDED" => BarcodeFormat::RssExpanded,
            "UPCA" => BarcodeFormat::UpcA,
            "UPCE" => BarcodeFormat::UpcE,
            "UPCEANEXTENSION" => BarcodeFormat::UpcEanExtension,
            _ => return Err(anyhow!("unknown barcode format: '{}'", s)),
        };
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barcode_formats_parse_case_insensitively() -> Result<()> {
        assert_eq!("qr_code".parse::<BarcodeFormat>()?, BarcodeFormat::QrCode);
        assert_eq!("QR Code".parse::<BarcodeFormat>()?, BarcodeFormat::QrCode);
        assert_eq!("ean-13".parse::<BarcodeFormat>()?, BarcodeFormat::Ean13);
        assert_eq!("CODE_128".parse::<BarcodeFormat>()?, BarcodeFormat::Code128);
        Ok(())
    }

    #[test]
    fn unknown_barcode_format_fails_to_parse() {
        assert!("EAN_14".parse::<BarcodeFormat>().is_err());
        assert!("".parse::<BarcodeFormat>().is_err());
    }

    #[test]
    fn barcode_format_display_round_trips() -> Result<()> {
        for format in [
            BarcodeFormat::QrCode,
            BarcodeFormat::Aztec,
            BarcodeFormat::UpcEanExtension,
        ] {
            assert_eq!(format.name().parse::<BarcodeFormat>()?, format);
        }
        Ok(())
    }
}
