//! Event channel emitted to the host UI.
//!
//! Single producer (the session kernel), multiple consumers (host UI
//! subscribers). Emission is an explicit callback registry rather than an
//! implicit multicast: subscribers are invoked in registration order, on
//! the emitting thread, and the channel carries an explicit [`ScanEvent::Completed`]
//! sentinel after which nothing is ever emitted again.

use std::sync::{Arc, Mutex};

use crate::decode::DecodeResult;
use crate::{DecodeFailureKind, DeviceDescriptor, PermissionState, TorchAvailability};

/// Everything the kernel reports to the host UI.
///
/// Per-attempt events (`ScanSuccess`/`ScanFailure`/`ScanError`) are emitted
/// exactly once per decode attempt, in strict attempt order for a given
/// loop generation. High-frequency `ScanFailure` events are normal scanning
/// noise, not errors.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanEvent {
    ScanSuccess(DecodeResult),
    ScanFailure(Option<DecodeFailureKind>),
    /// A fatal decode error; the loop has terminated and the session reset.
    ScanError(String),
    DevicesFound(Vec<DeviceDescriptor>),
    DevicesEmpty,
    PermissionResult(PermissionState),
    DeviceChanged(Option<DeviceDescriptor>),
    TorchAvailabilityChanged(TorchAvailability),
    AutostartBegan,
    AutostartEnded,
    /// Terminal sentinel: the channel is closed, subscribers are dropped.
    Completed,
}

type Subscriber = Arc<dyn Fn(&ScanEvent) + Send + Sync>;

struct BusState {
    subscribers: Vec<Subscriber>,
    completed: bool,
}

/// Callback-registry event channel.
pub struct EventBus {
    state: Mutex<BusState>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BusState {
                subscribers: Vec::new(),
                completed: false,
            }),
        })
    }

    /// Lock the registry, recovering from a poisoned lock: a subscriber
    /// panic must not take the whole channel down with it.
    fn locked(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::error!("event channel lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Register a consumer. Late subscribers on a completed channel are
    /// dropped immediately.
    pub fn subscribe(&self, subscriber: impl Fn(&ScanEvent) + Send + Sync + 'static) {
        let mut state = self.locked();
        if state.completed {
            log::warn!("subscribe on a completed event channel ignored");
            return;
        }
        state.subscribers.push(Arc::new(subscriber));
    }

    /// Emit one event to every subscriber. No-op after completion.
    ///
    /// Subscribers are invoked on a snapshot taken outside the registry
    /// lock, so a subscriber may safely re-enter the channel (emit,
    /// subscribe, complete) from its callback.
    pub fn emit(&self, event: &ScanEvent) {
        let snapshot = {
            let state = self.locked();
            if state.completed {
                log::debug!("event after completion discarded: {:?}", event);
                return;
            }
            state.subscribers.clone()
        };
        for subscriber in &snapshot {
            subscriber.as_ref()(event);
        }
    }

    /// Emit the `Completed` sentinel and close the channel.
    pub fn complete(&self) {
        let subscribers = {
            let mut state = self.locked();
            if state.completed {
                return;
            }
            state.completed = true;
            std::mem::take(&mut state.subscribers)
        };
        for subscriber in &subscribers {
            subscriber.as_ref()(&ScanEvent::Completed);
        }
    }

    pub fn is_completed(&self) -> bool {
        self.locked().completed
    }
}

/// Test helper: subscriber that records every event it sees.
#[cfg(test)]
pub(crate) fn recording_subscriber(bus: &EventBus) -> Arc<Mutex<Vec<ScanEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(move |event| sink.lock().expect("recorder lock").push(event.clone()));
    seen
}
