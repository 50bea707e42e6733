//! Session controller.
//!
//! Owns the current device id, the live stream and the active loop
//! generation, and exposes the lifecycle operations the host UI drives:
//! start, stop, restart, device switching, torch switching, enable/disable.
//!
//! Side-effecting operations are explicit methods rather than property
//! setters, so a reset-and-restart is visible at the call site.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::config::ScanConfig;
use crate::decode::DecodeEngine;
use crate::events::{EventBus, ScanEvent};
use crate::platform::{CameraHost, FrameSource};
use crate::scan_loop::ContinuousScanLoop;
use crate::stream::StreamAcquisitionManager;
use crate::torch::{self, TorchSwitch};
use crate::{DeviceDescriptor, SessionState, TorchAvailability};

/// Lock with poisoning recovery, for the teardown paths and accessors that
/// cannot return an error. A panic elsewhere must not leave streams
/// unreleased or the state unreadable.
fn recover<'a, T: ?Sized>(lock: &'a Mutex<T>, what: &str) -> std::sync::MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        log::error!("{} lock poisoned, recovering", what);
        poisoned.into_inner()
    })
}

struct SessionInner {
    host: Arc<dyn CameraHost>,
    engine: Arc<Mutex<dyn DecodeEngine>>,
    events: Arc<EventBus>,
    streams: Mutex<StreamAcquisitionManager>,
    /// Current loop generation. Bumping it invalidates every outstanding
    /// loop; loops compare against it at each continuation boundary.
    generation: Arc<AtomicU64>,
    /// Sticky device id: survives resets so a restart resumes on the same
    /// device. Cleared only by an explicit stop.
    device_id: Mutex<Option<String>>,
    frame_source: Mutex<Option<Arc<dyn FrameSource>>>,
    torch: Mutex<TorchAvailability>,
    state: Mutex<SessionState>,
    scan_thread: Mutex<Option<JoinHandle<()>>>,
    enabled: AtomicBool,
    scan_delay: Duration,
}

impl SessionInner {
    fn invalidate_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Join the previous scan loop thread so no stale emission can race a
    /// new session. Never joins the calling thread itself (the fatal-reset
    /// path runs on the loop thread).
    fn join_scan_thread(&self) {
        let handle = recover(&self.scan_thread, "scan thread").take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("scan loop thread panicked");
            }
        }
    }

    /// Tear down the live parts of the session: invalidate the generation,
    /// join the loop, release the stream. Device stickiness and the bound
    /// frame source are left to the caller.
    fn teardown(&self) {
        self.invalidate_generation();
        self.join_scan_thread();
        recover(&self.streams, "stream manager").release();
        *recover(&self.torch, "torch") = TorchAvailability::Unknown;
    }

    /// Reset performed on the scan loop thread after a fatal decode error.
    /// Keeps the sticky device and frame source so `restart()` can resume.
    fn reset_after_fatal(&self) {
        self.invalidate_generation();
        recover(&self.streams, "stream manager").release();
        *recover(&self.torch, "torch") = TorchAvailability::Unknown;
        self.set_state(SessionState::Stopped);
        log::warn!("session reset after fatal decode error");
    }

    fn set_state(&self, state: SessionState) {
        *recover(&self.state, "session state") = state;
    }
}

pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl SessionController {
    pub fn new(
        host: Arc<dyn CameraHost>,
        engine: Arc<Mutex<dyn DecodeEngine>>,
        events: Arc<EventBus>,
        config: &ScanConfig,
    ) -> Self {
        recover(&engine, "decode engine").set_hints(&config.hints);
        Self {
            inner: Arc::new(SessionInner {
                streams: Mutex::new(StreamAcquisitionManager::new(host.clone())),
                host,
                engine,
                events,
                generation: Arc::new(AtomicU64::new(0)),
                device_id: Mutex::new(config.device_id.clone()),
                frame_source: Mutex::new(None),
                torch: Mutex::new(TorchAvailability::Unknown),
                state: Mutex::new(SessionState::Idle),
                scan_thread: Mutex::new(None),
                enabled: AtomicBool::new(true),
                scan_delay: config.scan_delay,
            }),
        }
    }

    /// Start (or re-start) a scan session.
    ///
    /// Resets any prior session first. A `device_id` given here becomes the
    /// sticky device; without one the previously selected device is kept.
    /// On a host without camera capability this bails out without error.
    pub fn start(&self, device_id: Option<&str>, source: Arc<dyn FrameSource>) -> Result<()> {
        let inner = &self.inner;
        inner.teardown();

        if let Some(id) = device_id {
            *inner
                .device_id
                .lock()
                .map_err(|_| anyhow!("device id lock poisoned"))? = Some(id.to_string());
        }

        if !inner.host.is_supported() {
            log::warn!("no camera-capable host environment, start ignored");
            return Ok(());
        }
        if !inner.enabled.load(Ordering::SeqCst) {
            log::debug!("scanner disabled, start ignored");
            return Ok(());
        }

        inner.set_state(SessionState::Starting);
        let sticky = inner
            .device_id
            .lock()
            .map_err(|_| anyhow!("device id lock poisoned"))?
            .clone();

        let stream = match inner
            .streams
            .lock()
            .map_err(|_| anyhow!("stream manager lock poisoned"))?
            .acquire(sticky.as_deref())
        {
            Ok(stream) => stream,
            Err(err) => {
                inner.set_state(SessionState::Stopped);
                return Err(anyhow::Error::from(err)).context("failed to acquire camera stream");
            }
        };

        let availability = torch::probe(&stream);
        *inner
            .torch
            .lock()
            .map_err(|_| anyhow!("torch lock poisoned"))? = availability;
        inner
            .events
            .emit(&ScanEvent::TorchAvailabilityChanged(availability));

        if let Err(err) = source.bind_stream(&stream) {
            // A sink the host UI cannot bind leaves nothing worth keeping
            // open: release the stream and stop, as on acquire failure.
            recover(&inner.streams, "stream manager").release();
            inner.set_state(SessionState::Stopped);
            return Err(err).context("failed to bind stream to frame source");
        }
        *inner
            .frame_source
            .lock()
            .map_err(|_| anyhow!("frame source lock poisoned"))? = Some(source.clone());

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.set_state(SessionState::Active {
            device_id: sticky.clone(),
            generation,
        });
        log::info!(
            "scan session started on device {} (generation {})",
            sticky.as_deref().unwrap_or("<host default>"),
            generation
        );

        let fatal_inner = inner.clone();
        let scan_loop = ContinuousScanLoop::new(
            inner.engine.clone(),
            source,
            inner.events.clone(),
            inner.generation.clone(),
            generation,
            inner.scan_delay,
        )
        .with_fatal_hook(move || fatal_inner.reset_after_fatal());

        let handle = std::thread::Builder::new()
            .name(format!("scan-loop-{}", generation))
            .spawn(move || scan_loop.run())
            .context("failed to spawn scan loop thread")?;
        *recover(&inner.scan_thread, "scan thread") = Some(handle);
        Ok(())
    }

    /// Stop the session: invalidate the generation, release the stream,
    /// clear the device selection and report `DeviceChanged(None)`.
    ///
    /// Idempotent: a second stop performs no additional release and emits
    /// no duplicate event. A session already stopped by a fatal decode
    /// error still has its device selection and frame sink cleared here.
    pub fn stop(&self) {
        let inner = &self.inner;
        let was_running = {
            let mut state = recover(&inner.state, "session state");
            let running = !matches!(*state, SessionState::Stopped | SessionState::Idle);
            *state = SessionState::Stopped;
            running
        };
        if was_running {
            inner.teardown();
        }
        if let Some(source) = recover(&inner.frame_source, "frame source").take() {
            source.release();
        }
        if recover(&inner.device_id, "device id").take().is_some() {
            inner.events.emit(&ScanEvent::DeviceChanged(None));
            log::info!("scan session stopped");
        }
    }

    /// Restart on the sticky device. A no-op when no device was ever
    /// selected or no frame source is bound.
    pub fn restart(&self) -> Result<()> {
        let inner = &self.inner;
        if inner
            .device_id
            .lock()
            .map_err(|_| anyhow!("device id lock poisoned"))?
            .is_none()
        {
            log::debug!("restart without prior device is a no-op");
            return Ok(());
        }
        let source = inner
            .frame_source
            .lock()
            .map_err(|_| anyhow!("frame source lock poisoned"))?
            .clone();
        let Some(source) = source else {
            log::debug!("restart without bound frame source is a no-op");
            return Ok(());
        };
        self.start(None, source)
    }

    /// Switch to a different device, resetting and restarting the session.
    pub fn set_device(&self, device: &DeviceDescriptor) -> Result<()> {
        let inner = &self.inner;
        if inner
            .device_id
            .lock()
            .map_err(|_| anyhow!("device id lock poisoned"))?
            .as_deref()
            == Some(device.id.as_str())
        {
            log::warn!("setting the same device is not allowed");
            return Ok(());
        }
        let source = inner
            .frame_source
            .lock()
            .map_err(|_| anyhow!("frame source lock poisoned"))?
            .clone()
            .ok_or_else(|| anyhow!("no frame source bound yet, call start first"))?;
        self.start(Some(&device.id), source)?;
        inner
            .events
            .emit(&ScanEvent::DeviceChanged(Some(device.clone())));
        Ok(())
    }

    /// Enable or disable scanning. Disabling tears the session down but
    /// keeps the sticky device and frame source; re-enabling resumes on
    /// them.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let was = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if was == enabled {
            return Ok(());
        }
        if enabled {
            self.restart()
        } else {
            self.inner.teardown();
            self.inner.set_state(SessionState::Stopped);
            Ok(())
        }
    }

    /// Switch the torch. Turning it off forces a full session restart: the
    /// disable cannot otherwise be confirmed without re-negotiating the
    /// stream.
    pub fn set_torch(&self, on: bool) -> Result<()> {
        let inner = &self.inner;
        let availability = *inner
            .torch
            .lock()
            .map_err(|_| anyhow!("torch lock poisoned"))?;
        let stream = inner
            .streams
            .lock()
            .map_err(|_| anyhow!("stream manager lock poisoned"))?
            .current();
        let Some(stream) = stream else {
            log::debug!("torch switch without active stream ignored");
            return Ok(());
        };
        match torch::set_torch(&stream, availability, on) {
            TorchSwitch::Skipped | TorchSwitch::Applied => Ok(()),
            TorchSwitch::RestartRequired => self.restart(),
        }
    }

    /// Stop and close the event channel. Called implicitly on drop.
    pub fn destroy(&self) {
        self.stop();
        self.inner.events.complete();
    }

    pub fn state(&self) -> SessionState {
        recover(&self.inner.state, "session state").clone()
    }

    pub fn device_id(&self) -> Option<String> {
        recover(&self.inner.device_id, "device id").clone()
    }

    pub fn torch_availability(&self) -> TorchAvailability {
        *recover(&self.inner.torch, "torch")
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.inner.events.clone()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.destroy();
    }
}
