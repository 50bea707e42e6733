//! Host platform capability seams.
//!
//! The scan session runs against a browser-like host that owns the actual
//! camera hardware. This module defines the traits the kernel consumes:
//!
//! - [`CameraHost`]: stream acquisition and device enumeration
//! - [`MediaStream`] / [`MediaTrack`]: a live stream and its video tracks
//! - [`FrameSource`]: the host-UI-supplied sink frames are decoded against
//!
//! Platform failures are classified into the closed [`CameraError`] set so
//! the rest of the kernel never has to pattern-match on host-specific error
//! strings.

pub mod stub;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::DeviceDescriptor;

pub use stub::{StubCameraHost, StubFrameSource, StubTrackSpec};

// -------------------- Errors --------------------

/// Classified camera/platform failure.
///
/// Mirrors the platform-named error set the host may reject with. Anything
/// unnamed lands in `Other` with the raw message preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraError {
    /// The host has no camera capability (e.g. insecure origin).
    Unsupported,
    /// The user denied camera permission.
    NotAllowed,
    /// No video input device is attached.
    NotFound,
    /// A device exists but its stream could not be read (busy elsewhere).
    NotReadable,
    /// The requested constraints cannot be satisfied by any device.
    Overconstrained,
    /// Unnamed platform error.
    Other(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::Unsupported => write!(f, "camera access is not supported by this host"),
            CameraError::NotAllowed => write!(f, "camera permission denied by the user"),
            CameraError::NotFound => write!(f, "no video input device found"),
            CameraError::NotReadable => {
                write!(f, "video device could not be read, probably in use by another app")
            }
            CameraError::Overconstrained => {
                write!(f, "no device satisfies the requested constraints")
            }
            CameraError::Other(msg) => write!(f, "camera error: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}

// -------------------- Constraints --------------------

/// How a stream should be resolved by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamConstraints {
    /// Exactly the device with this id.
    ExactDevice(String),
    /// Prefer an environment/rear-facing camera.
    PreferEnvironmentFacing,
    /// Whatever the host resolves by default (generic `video: true`).
    HostDefault,
}

/// Advanced track constraint used to switch the torch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TorchConstraint {
    pub torch: bool,
    pub fill_light_mode: &'static str,
}

impl TorchConstraint {
    pub fn on() -> Self {
        Self {
            torch: true,
            fill_light_mode: "torch",
        }
    }

    pub fn off() -> Self {
        Self {
            torch: false,
            fill_light_mode: "none",
        }
    }
}

/// Capability set advertised by a single video track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackCapabilities {
    pub torch: bool,
    pub fill_light_modes: Vec<String>,
}

// -------------------- Capability traits --------------------

/// A single video track of a live media stream.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> String;

    /// Query the track's advertised capability set. May fail on hosts that
    /// do not implement capability inspection; callers must treat a failure
    /// as "incompatible", never as fatal.
    fn capabilities(&self) -> Result<TrackCapabilities>;

    /// Apply an advanced constraint (torch switching).
    fn apply_advanced(&self, constraint: &TorchConstraint) -> Result<()>;

    /// Stop the track, releasing its slice of the camera hardware.
    /// Must be idempotent.
    fn stop(&self);
}

/// A live media stream acquired from the host.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> String;

    /// List the stream's video tracks. May fail on exotic hosts; callers go
    /// through [`crate::stream::video_tracks`] which degrades to an empty
    /// list instead of propagating.
    fn video_tracks(&self) -> Result<Vec<Arc<dyn MediaTrack>>>;
}

/// Camera access and device enumeration as exposed by the host platform.
pub trait CameraHost: Send + Sync {
    /// Whether a camera-capable environment exists at all. When false, a
    /// session start bails out without error.
    fn is_supported(&self) -> bool;

    /// Negotiate a media stream for the given constraints. Rejections are
    /// classified into [`CameraError`].
    fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, CameraError>;

    /// Snapshot of the available video input devices. Callable before
    /// permission is granted; labels may then be empty.
    fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, CameraError>;
}

/// The live video sink decode attempts run against, supplied by the host UI.
///
/// The controller owns the sink exclusively while a session is active and
/// returns it to the host UI on explicit stop.
pub trait FrameSource: Send + Sync {
    /// Bind a freshly acquired stream to this sink.
    fn bind_stream(&self, stream: &Arc<dyn MediaStream>) -> Result<()>;

    /// Detach whatever stream is currently bound. Idempotent.
    fn release(&self);
}
