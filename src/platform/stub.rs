//! Scripted host platform for tests and the demo binary.
//!
//! `StubCameraHost` plays the role of the browser: it grants or rejects
//! stream requests according to a configured behavior, hands out streams
//! with configurable track capabilities, and keeps acquire/stop counters so
//! tests can assert the net-1-open stream invariant and probe-stream
//! release.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::platform::{
    CameraError, CameraHost, FrameSource, MediaStream, MediaTrack, StreamConstraints,
    TorchConstraint, TrackCapabilities,
};
use crate::DeviceDescriptor;

/// How the stub answers `get_user_media`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionBehavior {
    Grant,
    /// User denied permission (`NotAllowed`).
    Deny,
    /// No device attached (`NotFound`).
    NoDevice,
    /// Device busy elsewhere (`NotReadable`).
    NotReadable,
    /// Unnamed platform failure.
    Fail(String),
}

/// Capabilities one stub track should advertise.
#[derive(Clone, Debug, Default)]
pub struct StubTrackSpec {
    pub torch: bool,
    pub fill_light_modes: Vec<String>,
    /// Capability query throws instead of answering.
    pub capabilities_fail: bool,
}

impl StubTrackSpec {
    pub fn torch_capable() -> Self {
        Self {
            torch: true,
            ..Self::default()
        }
    }
}

pub struct StubTrack {
    id: String,
    spec: StubTrackSpec,
    stopped: AtomicBool,
    applied: Mutex<Vec<TorchConstraint>>,
    host_counters: Arc<Counters>,
}

impl StubTrack {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Torch constraints applied to this track, in order.
    pub fn applied_constraints(&self) -> Vec<TorchConstraint> {
        self.applied.lock().expect("stub track lock").clone()
    }
}

impl MediaTrack for StubTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn capabilities(&self) -> Result<TrackCapabilities> {
        if self.spec.capabilities_fail {
            return Err(anyhow!("capability inspection not implemented by host"));
        }
        Ok(TrackCapabilities {
            torch: self.spec.torch,
            fill_light_modes: self.spec.fill_light_modes.clone(),
        })
    }

    fn apply_advanced(&self, constraint: &TorchConstraint) -> Result<()> {
        self.applied
            .lock()
            .expect("stub track lock")
            .push(constraint.clone());
        Ok(())
    }

    fn stop(&self) {
        // Idempotent: count only the first stop.
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.host_counters.tracks_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct StubStream {
    id: String,
    tracks: Vec<Arc<StubTrack>>,
    fail_video_tracks: bool,
}

impl StubStream {
    pub fn stub_tracks(&self) -> &[Arc<StubTrack>] {
        &self.tracks
    }

    /// True while at least one track has not been stopped.
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|track| !track.is_stopped())
    }
}

impl MediaStream for StubStream {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn video_tracks(&self) -> Result<Vec<Arc<dyn MediaTrack>>> {
        if self.fail_video_tracks {
            return Err(anyhow!("host failed while listing tracks"));
        }
        Ok(self
            .tracks
            .iter()
            .map(|track| track.clone() as Arc<dyn MediaTrack>)
            .collect())
    }
}

#[derive(Default)]
struct Counters {
    streams_acquired: AtomicUsize,
    tracks_created: AtomicUsize,
    tracks_stopped: AtomicUsize,
    max_live_streams: AtomicUsize,
}

struct HostState {
    devices: Vec<DeviceDescriptor>,
    permission: PermissionBehavior,
    track_specs: Vec<StubTrackSpec>,
    /// Environment-facing preference cannot be resolved by any device.
    environment_unresolvable: bool,
    fail_video_tracks: bool,
    streams: Vec<Arc<StubStream>>,
    requests: Vec<StreamConstraints>,
}

/// Scripted camera host.
pub struct StubCameraHost {
    supported: bool,
    state: Mutex<HostState>,
    counters: Arc<Counters>,
    next_stream_id: AtomicU64,
}

impl StubCameraHost {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            supported: true,
            state: Mutex::new(HostState {
                devices,
                permission: PermissionBehavior::Grant,
                track_specs: vec![StubTrackSpec::default()],
                environment_unresolvable: false,
                fail_video_tracks: false,
                streams: Vec::new(),
                requests: Vec::new(),
            }),
            counters: Arc::new(Counters::default()),
            next_stream_id: AtomicU64::new(1),
        }
    }

    /// A host without any camera capability at all.
    pub fn unsupported() -> Self {
        let mut host = Self::new(Vec::new());
        host.supported = false;
        host
    }

    pub fn with_permission(self, permission: PermissionBehavior) -> Self {
        self.state.lock().expect("stub host lock").permission = permission;
        self
    }

    /// Capabilities for the tracks of every stream handed out from now on.
    pub fn with_track_specs(self, specs: Vec<StubTrackSpec>) -> Self {
        self.state.lock().expect("stub host lock").track_specs = specs;
        self
    }

    pub fn with_environment_unresolvable(self) -> Self {
        self.state.lock().expect("stub host lock").environment_unresolvable = true;
        self
    }

    pub fn with_failing_track_listing(self) -> Self {
        self.state.lock().expect("stub host lock").fail_video_tracks = true;
        self
    }

    pub fn set_permission(&self, permission: PermissionBehavior) {
        self.state.lock().expect("stub host lock").permission = permission;
    }

    // ---- test observability ----

    pub fn streams_acquired(&self) -> usize {
        self.counters.streams_acquired.load(Ordering::SeqCst)
    }

    pub fn tracks_created(&self) -> usize {
        self.counters.tracks_created.load(Ordering::SeqCst)
    }

    pub fn tracks_stopped(&self) -> usize {
        self.counters.tracks_stopped.load(Ordering::SeqCst)
    }

    /// Streams with at least one unstopped track.
    pub fn live_stream_count(&self) -> usize {
        self.state
            .lock()
            .expect("stub host lock")
            .streams
            .iter()
            .filter(|stream| stream.is_live())
            .count()
    }

    /// High-water mark of concurrently live streams.
    pub fn max_live_streams(&self) -> usize {
        self.counters.max_live_streams.load(Ordering::SeqCst)
    }

    /// All streams ever handed out, in acquisition order.
    pub fn streams(&self) -> Vec<Arc<StubStream>> {
        self.state.lock().expect("stub host lock").streams.clone()
    }

    /// Every `get_user_media` request seen, granted or not.
    pub fn requests(&self) -> Vec<StreamConstraints> {
        self.state.lock().expect("stub host lock").requests.clone()
    }

    fn build_stream(&self, state: &mut HostState) -> Arc<StubStream> {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        let tracks: Vec<Arc<StubTrack>> = state
            .track_specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                self.counters.tracks_created.fetch_add(1, Ordering::SeqCst);
                Arc::new(StubTrack {
                    id: format!("stream-{}-track-{}", stream_id, i),
                    spec: spec.clone(),
                    stopped: AtomicBool::new(false),
                    applied: Mutex::new(Vec::new()),
                    host_counters: self.counters.clone(),
                })
            })
            .collect();
        let stream = Arc::new(StubStream {
            id: format!("stream-{}", stream_id),
            tracks,
            fail_video_tracks: state.fail_video_tracks,
        });
        state.streams.push(stream.clone());
        self.counters.streams_acquired.fetch_add(1, Ordering::SeqCst);
        let live = state.streams.iter().filter(|s| s.is_live()).count();
        self.counters.max_live_streams.fetch_max(live, Ordering::SeqCst);
        stream
    }
}

impl CameraHost for StubCameraHost {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, CameraError> {
        if !self.supported {
            return Err(CameraError::Unsupported);
        }
        let mut state = self.state.lock().expect("stub host lock");
        state.requests.push(constraints.clone());
        match &state.permission {
            PermissionBehavior::Grant => {}
            PermissionBehavior::Deny => return Err(CameraError::NotAllowed),
            PermissionBehavior::NoDevice => return Err(CameraError::NotFound),
            PermissionBehavior::NotReadable => return Err(CameraError::NotReadable),
            PermissionBehavior::Fail(msg) => return Err(CameraError::Other(msg.clone())),
        }
        match constraints {
            StreamConstraints::ExactDevice(id) => {
                if !state.devices.iter().any(|device| &device.id == id) {
                    return Err(CameraError::Overconstrained);
                }
            }
            StreamConstraints::PreferEnvironmentFacing => {
                if state.environment_unresolvable {
                    return Err(CameraError::Overconstrained);
                }
            }
            StreamConstraints::HostDefault => {}
        }
        Ok(self.build_stream(&mut state))
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, CameraError> {
        if !self.supported {
            return Err(CameraError::Unsupported);
        }
        Ok(self.state.lock().expect("stub host lock").devices.clone())
    }
}

/// Frame sink stub recording which stream is bound to it.
#[derive(Default)]
pub struct StubFrameSource {
    bound: Mutex<Option<String>>,
    fail_bind: bool,
}

impl StubFrameSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink whose binding always fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            bound: Mutex::new(None),
            fail_bind: true,
        })
    }

    pub fn bound_stream_id(&self) -> Option<String> {
        self.bound.lock().expect("stub frame source lock").clone()
    }
}

impl FrameSource for StubFrameSource {
    fn bind_stream(&self, stream: &Arc<dyn MediaStream>) -> Result<()> {
        if self.fail_bind {
            return Err(anyhow!("sink rejected the stream"));
        }
        *self.bound.lock().expect("stub frame source lock") = Some(stream.id());
        Ok(())
    }

    fn release(&self) {
        *self.bound.lock().expect("stub frame source lock") = None;
    }
}
