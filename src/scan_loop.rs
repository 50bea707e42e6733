//! The self-rescheduling decode-attempt loop.
//!
//! One loop instance is bound 1:1 to a stream generation. The generation
//! counter is compared at every continuation boundary: before each attempt,
//! after the decode resolves (so an in-flight attempt of a superseded
//! generation is discarded without emission), and during the inter-attempt
//! delay. Cancellation is purely cooperative; there is no preemption of an
//! in-flight decode call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;

use crate::decode::DecodeEngine;
use crate::events::{EventBus, ScanEvent};
use crate::platform::FrameSource;
use crate::ScanOutcome;

/// Granularity of the cooperative delay: invalidation during a suspension
/// is observed within one slice.
const DELAY_SLICE: Duration = Duration::from_millis(20);

pub struct ContinuousScanLoop {
    engine: Arc<Mutex<dyn DecodeEngine>>,
    source: Arc<dyn FrameSource>,
    events: Arc<EventBus>,
    generation: Arc<AtomicU64>,
    bound_generation: u64,
    delay: Duration,
    on_fatal: Option<Box<dyn FnOnce() + Send>>,
}

impl ContinuousScanLoop {
    pub fn new(
        engine: Arc<Mutex<dyn DecodeEngine>>,
        source: Arc<dyn FrameSource>,
        events: Arc<EventBus>,
        generation: Arc<AtomicU64>,
        bound_generation: u64,
        delay: Duration,
    ) -> Self {
        Self {
            engine,
            source,
            events,
            generation,
            bound_generation,
            delay,
            on_fatal: None,
        }
    }

    /// Hook invoked after a fatal decode error has been emitted, used by the
    /// session controller to reset itself.
    pub fn with_fatal_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_fatal = Some(Box::new(hook));
        self
    }

    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.bound_generation
    }

    /// One decode attempt, producing exactly one outcome.
    fn attempt(&self) -> ScanOutcome {
        let mut engine = match self.engine.lock() {
            Ok(engine) => engine,
            Err(_) => return ScanOutcome::Error(anyhow!("decode engine lock poisoned")),
        };
        match engine.decode(self.source.as_ref()) {
            Ok(result) => ScanOutcome::Success(result),
            Err(err) => match err.failure_kind() {
                Some(kind) => ScanOutcome::Failure(kind),
                None => ScanOutcome::Error(err.into()),
            },
        }
    }

    /// Wait out the inter-attempt delay in slices, returning false as soon
    /// as the generation is invalidated.
    fn wait_between_attempts(&self) -> bool {
        let mut remaining = self.delay;
        while !remaining.is_zero() {
            if !self.is_current() {
                return false;
            }
            let slice = remaining.min(DELAY_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
        self.is_current()
    }

    /// Run until the generation is invalidated or a fatal error occurs.
    ///
    /// Per attempt: success emits and waits the configured delay (slower
    /// cadence avoids re-decoding the same still-visible code); an expected
    /// failure emits and reschedules immediately; a fatal error emits, runs
    /// the fatal hook and terminates without rescheduling.
    pub fn run(mut self) {
        log::debug!("scan loop generation {} started", self.bound_generation);
        loop {
            if !self.is_current() {
                break;
            }

            let outcome = self.attempt();

            // The generation may have been invalidated while the decode was
            // in flight; discard the outcome without emission.
            if !self.is_current() {
                break;
            }

            match outcome {
                ScanOutcome::Success(result) => {
                    self.events.emit(&ScanEvent::ScanSuccess(result));
                    if !self.wait_between_attempts() {
                        break;
                    }
                }
                ScanOutcome::Failure(kind) => {
                    self.events.emit(&ScanEvent::ScanFailure(kind));
                }
                ScanOutcome::Error(err) => {
                    log::error!(
                        "scan loop generation {} halting on fatal decode error: {:#}",
                        self.bound_generation,
                        err
                    );
                    self.events.emit(&ScanEvent::ScanError(format!("{:#}", err)));
                    if let Some(hook) = self.on_fatal.take() {
                        hook();
                    }
                    return;
                }
            }
        }
        log::debug!("scan loop generation {} superseded", self.bound_generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{ScriptedEngine, ScriptedOutcome};
    use crate::events::recording_subscriber;
    use crate::platform::StubFrameSource;
    use crate::{DecodeFailureKind, DecodeResult};
    use std::time::Instant;

    fn loop_for(
        engine: ScriptedEngine,
        delay: Duration,
        generation: Arc<AtomicU64>,
    ) -> (ContinuousScanLoop, Arc<std::sync::Mutex<Vec<ScanEvent>>>) {
        let events = EventBus::new();
        let seen = recording_subscriber(&events);
        let scan_loop = ContinuousScanLoop::new(
            Arc::new(Mutex::new(engine)),
            StubFrameSource::new(),
            events,
            generation,
            1,
            delay,
        );
        (scan_loop, seen)
    }

    #[test]
    fn emits_cycle_in_strict_attempt_order_and_discards_stale_attempt() {
        let generation = Arc::new(AtomicU64::new(1));
        let invalidator = generation.clone();
        // Attempts 0..6 run normally; attempt 6 invalidates the generation
        // mid-flight, so its outcome must be discarded without emission.
        let engine = ScriptedEngine::cycling(vec![
            ScriptedOutcome::NotFound,
            ScriptedOutcome::NotFound,
            ScriptedOutcome::Success("code".into()),
        ])
        .with_attempt_hook(move |index| {
            if index == 6 {
                invalidator.fetch_add(1, Ordering::SeqCst);
            }
        });

        let (scan_loop, seen) = loop_for(engine, Duration::ZERO, generation);
        scan_loop.run();

        let success =
            ScanEvent::ScanSuccess(DecodeResult::new("code", crate::BarcodeFormat::QrCode));
        let failure = ScanEvent::ScanFailure(Some(DecodeFailureKind::NotFound));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                failure.clone(),
                failure.clone(),
                success.clone(),
                failure.clone(),
                failure.clone(),
                success,
            ]
        );
    }

    #[test]
    fn fatal_error_halts_without_reschedule() {
        let generation = Arc::new(AtomicU64::new(1));
        let scripted = Arc::new(Mutex::new(
            ScriptedEngine::new(vec![
                ScriptedOutcome::NotFound,
                ScriptedOutcome::Fatal("engine exploded".into()),
            ]),
        ));
        let events = EventBus::new();
        let seen = recording_subscriber(&events);
        let fatal_seen = Arc::new(AtomicU64::new(0));
        let fatal_flag = fatal_seen.clone();

        let scan_loop = ContinuousScanLoop::new(
            scripted.clone() as Arc<Mutex<dyn DecodeEngine>>,
            StubFrameSource::new(),
            events,
            generation,
            1,
            Duration::ZERO,
        )
        .with_fatal_hook(move || {
            fatal_flag.fetch_add(1, Ordering::SeqCst);
        });
        scan_loop.run();

        let recorded = seen.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(
            recorded[0],
            ScanEvent::ScanFailure(Some(DecodeFailureKind::NotFound))
        );
        assert!(matches!(recorded[1], ScanEvent::ScanError(_)));
        // no further attempts after the fatal one
        assert_eq!(scripted.lock().unwrap().attempts(), 2);
        assert_eq!(fatal_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_reschedule_without_introduced_delay() {
        let generation = Arc::new(AtomicU64::new(1));
        let engine = ScriptedEngine::new(vec![
            ScriptedOutcome::NotFound,
            ScriptedOutcome::Unclassified,
            ScriptedOutcome::ChecksumMismatch,
            ScriptedOutcome::FormatInvalid,
            ScriptedOutcome::NotFound,
            ScriptedOutcome::Fatal("end".into()),
        ]);

        // Large success delay: it must not apply to failures.
        let started = Instant::now();
        let (scan_loop, seen) = loop_for(engine, Duration::from_secs(5), generation);
        scan_loop.run();

        assert!(started.elapsed() < Duration::from_secs(1));
        let recorded = seen.lock().unwrap();
        assert_eq!(recorded[1], ScanEvent::ScanFailure(None));
        assert_eq!(recorded.len(), 6);
    }

    #[test]
    fn success_applies_the_inter_attempt_delay() {
        let generation = Arc::new(AtomicU64::new(1));
        let engine = ScriptedEngine::new(vec![
            ScriptedOutcome::Success("first".into()),
            ScriptedOutcome::Fatal("end".into()),
        ]);

        let started = Instant::now();
        let (scan_loop, _seen) = loop_for(engine, Duration::from_millis(60), generation);
        scan_loop.run();

        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn superseded_loop_never_runs_an_attempt() {
        let generation = Arc::new(AtomicU64::new(2)); // already past generation 1
        let scripted = Arc::new(Mutex::new(ScriptedEngine::new(vec![
            ScriptedOutcome::Success("never".into()),
        ])));
        let events = EventBus::new();
        let seen = recording_subscriber(&events);

        let scan_loop = ContinuousScanLoop::new(
            scripted.clone() as Arc<Mutex<dyn DecodeEngine>>,
            StubFrameSource::new(),
            events,
            generation,
            1,
            Duration::ZERO,
        );
        scan_loop.run();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(scripted.lock().unwrap().attempts(), 0);
    }
}
