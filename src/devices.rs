//! Device enumeration, permission probing and autostart.
//!
//! Permission is requested by acquiring a throwaway generic video stream:
//! the prompt is the side effect, the stream itself is released before the
//! check returns, on every exit path. Platform failures never propagate
//! uncaught from the permission path; they classify into a `PermissionState`
//! plus a device-presence hint, with the raw error preserved.

use std::sync::{Arc, OnceLock};

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::config::ScanConfig;
use crate::events::{EventBus, ScanEvent};
use crate::platform::{CameraError, CameraHost, FrameSource, StreamConstraints};
use crate::session::SessionController;
use crate::stream::stop_all_tracks;
use crate::{DeviceDescriptor, PermissionState};

/// Label heuristic for rear/environment-facing cameras, covering the
/// language variants hosts are known to report.
fn rear_facing_pattern() -> &'static Regex {
    // Compile once.
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)back|trás|rear|traseira|environment|ambiente").unwrap())
}

/// Outcome of a permission probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionCheck {
    pub state: PermissionState,
    /// Best-effort device presence hint. `None` when nothing can be
    /// inferred from the failure.
    pub devices_present: Option<bool>,
    /// The raw platform error, kept for caller inspection.
    pub error: Option<CameraError>,
}

impl PermissionCheck {
    fn granted() -> Self {
        Self {
            state: PermissionState::Granted,
            devices_present: Some(true),
            error: None,
        }
    }

    fn classify(error: CameraError) -> Self {
        let (state, devices_present) = match &error {
            CameraError::Unsupported => (PermissionState::Unknown, None),
            CameraError::NotAllowed => (PermissionState::Denied, Some(true)),
            CameraError::NotFound => (PermissionState::Unknown, Some(false)),
            // Busy elsewhere: distinct diagnostic, same presence hint.
            CameraError::NotReadable => (PermissionState::Unknown, Some(false)),
            CameraError::Overconstrained | CameraError::Other(_) => {
                (PermissionState::Unknown, None)
            }
        };
        Self {
            state,
            devices_present,
            error: Some(error),
        }
    }
}

pub struct DeviceOrchestrator {
    host: Arc<dyn CameraHost>,
    events: Arc<EventBus>,
}

impl DeviceOrchestrator {
    pub fn new(host: Arc<dyn CameraHost>, events: Arc<EventBus>) -> Self {
        Self { host, events }
    }

    /// List the available video-input devices and report the result on the
    /// event channel. Callable before permission is granted; labels may be
    /// empty in that case.
    pub fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let devices = self
            .host
            .enumerate_devices()
            .context("device enumeration failed")?;
        if devices.is_empty() {
            self.events.emit(&ScanEvent::DevicesEmpty);
        } else {
            self.events.emit(&ScanEvent::DevicesFound(devices.clone()));
        }
        Ok(devices)
    }

    /// Trigger the permission prompt with a throwaway stream and classify
    /// the result. The probe stream is always released before returning.
    pub fn request_permission(&self) -> PermissionCheck {
        let check = match self.host.get_user_media(&StreamConstraints::HostDefault) {
            Ok(stream) => {
                stop_all_tracks(&stream);
                PermissionCheck::granted()
            }
            Err(error) => {
                log::warn!("permission probe failed: {}", error);
                PermissionCheck::classify(error)
            }
        };
        self.events
            .emit(&ScanEvent::PermissionResult(check.state));
        check
    }

    /// Pick the autostart device: the first label matching the rear-facing
    /// heuristic, otherwise the last enumerated device.
    pub fn pick_autostart_device(devices: &[DeviceDescriptor]) -> Option<&DeviceDescriptor> {
        devices
            .iter()
            .find(|device| rear_facing_pattern().is_match(&device.label))
            .or_else(|| devices.last())
    }

    /// Full autostart: permission prompt, enumeration, device selection and
    /// session start. Zero devices is a hard failure.
    pub fn autostart(
        &self,
        controller: &SessionController,
        source: Arc<dyn FrameSource>,
    ) -> Result<DeviceDescriptor> {
        self.events.emit(&ScanEvent::AutostartBegan);
        let result = self.autostart_inner(controller, source);
        self.events.emit(&ScanEvent::AutostartEnded);
        result
    }

    fn autostart_inner(
        &self,
        controller: &SessionController,
        source: Arc<dyn FrameSource>,
    ) -> Result<DeviceDescriptor> {
        let check = self.request_permission();
        if check.state == PermissionState::Denied {
            bail!("camera permission denied");
        }
        let devices = self.enumerate()?;
        let Some(device) = Self::pick_autostart_device(&devices) else {
            bail!("no video-input devices available");
        };
        log::info!("autostart selected device {} ({})", device.id, device.label);
        controller.start(Some(&device.id), source)?;
        self.events
            .emit(&ScanEvent::DeviceChanged(Some(device.clone())));
        Ok(device.clone())
    }

    /// Initialize per configuration: full autostart when enabled, otherwise
    /// only a device-list refresh without a permission prompt.
    pub fn init(
        &self,
        config: &ScanConfig,
        controller: &SessionController,
        source: Arc<dyn FrameSource>,
    ) -> Result<Option<DeviceDescriptor>> {
        if config.autostart {
            return self.autostart(controller, source).map(Some);
        }
        self.enumerate()?;
        Ok(None)
    }
}
