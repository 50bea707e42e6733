//! Media stream acquisition and release.
//!
//! The manager enforces the at-most-one-active-stream invariant: acquiring
//! a new stream always fully releases (stops all tracks of) the previous
//! one first, so no dual-stream state is ever observable.

use std::sync::Arc;

use crate::platform::{CameraError, CameraHost, MediaStream, MediaTrack, StreamConstraints};

/// List a stream's video tracks defensively: a host that fails while
/// listing yields an empty list rather than propagating.
pub fn video_tracks(stream: &Arc<dyn MediaStream>) -> Vec<Arc<dyn MediaTrack>> {
    match stream.video_tracks() {
        Ok(tracks) => tracks,
        Err(err) => {
            log::warn!("host failed listing tracks of {}: {:#}", stream.id(), err);
            Vec::new()
        }
    }
}

/// Stop every track of a stream.
pub fn stop_all_tracks(stream: &Arc<dyn MediaStream>) {
    for track in video_tracks(stream) {
        log::debug!("stopping track {}", track.id());
        track.stop();
    }
}

pub struct StreamAcquisitionManager {
    host: Arc<dyn CameraHost>,
    current: Option<Arc<dyn MediaStream>>,
}

impl StreamAcquisitionManager {
    pub fn new(host: Arc<dyn CameraHost>) -> Self {
        Self {
            host,
            current: None,
        }
    }

    /// Negotiate a stream for the given device.
    ///
    /// An explicit `device_id` requests an exact match. Without one the
    /// manager prefers an environment/rear-facing camera and falls back to
    /// the host's default resolution when that preference is unresolvable.
    pub fn acquire(
        &mut self,
        device_id: Option<&str>,
    ) -> Result<Arc<dyn MediaStream>, CameraError> {
        self.release();

        let constraints = match device_id {
            Some(id) => StreamConstraints::ExactDevice(id.to_string()),
            None => StreamConstraints::PreferEnvironmentFacing,
        };
        let stream = match self.host.get_user_media(&constraints) {
            Err(CameraError::Overconstrained) if device_id.is_none() => {
                log::debug!("environment-facing preference unresolvable, using host default");
                self.host.get_user_media(&StreamConstraints::HostDefault)?
            }
            other => other?,
        };
        log::info!(
            "acquired stream {} for device {}",
            stream.id(),
            device_id.unwrap_or("<host default>")
        );
        self.current = Some(stream.clone());
        Ok(stream)
    }

    /// Stop all tracks of the current stream, if any. Idempotent.
    pub fn release(&mut self) {
        if let Some(stream) = self.current.take() {
            log::info!("releasing stream {}", stream.id());
            stop_all_tracks(&stream);
        }
    }

    pub fn current(&self) -> Option<Arc<dyn MediaStream>> {
        self.current.clone()
    }
}
