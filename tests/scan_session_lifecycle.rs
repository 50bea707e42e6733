use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scan_session::{
    DecodeEngine, DeviceDescriptor, DeviceOrchestrator, EventBus, PermissionState, ScanConfig,
    ScanEvent, ScriptedEngine, ScriptedOutcome, SessionController, StubCameraHost,
    StubFrameSource, StubTrackSpec, TorchConstraint,
};

fn cameras() -> Vec<DeviceDescriptor> {
    vec![
        DeviceDescriptor::new("dev-0", "Front Camera"),
        DeviceDescriptor::new("dev-1", "Back Camera"),
    ]
}

fn recorded_events(events: &EventBus) -> Arc<Mutex<Vec<ScanEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    events.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    seen
}

fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

#[test]
fn autostart_scans_in_order_and_tears_down_cleanly() -> Result<()> {
    let host = Arc::new(
        StubCameraHost::new(cameras()).with_track_specs(vec![StubTrackSpec::torch_capable()]),
    );
    let engine: Arc<Mutex<dyn DecodeEngine>> = Arc::new(Mutex::new(ScriptedEngine::cycling(
        vec![
            ScriptedOutcome::NotFound,
            ScriptedOutcome::NotFound,
            ScriptedOutcome::Success("ticket-42".into()),
        ],
    )));

    let events = EventBus::new();
    let seen = recorded_events(&events);
    let mut config = ScanConfig::default();
    config.scan_delay = Duration::from_millis(10);

    let controller = SessionController::new(host.clone(), engine, events.clone(), &config);
    let orchestrator = DeviceOrchestrator::new(host.clone(), events);

    let device = orchestrator.autostart(&controller, StubFrameSource::new())?;
    assert_eq!(device.id, "dev-1", "rear-facing label heuristic");

    let two_successes = wait_until(Duration::from_secs(2), || {
        seen.lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, ScanEvent::ScanSuccess(_)))
            .count()
            >= 2
    });
    assert!(two_successes, "scan loop did not produce successes in time");

    controller.destroy();

    let recorded = seen.lock().unwrap();
    assert!(recorded
        .iter()
        .any(|event| matches!(event, ScanEvent::PermissionResult(PermissionState::Granted))));

    // Per-attempt ordering: every success is preceded by exactly two
    // failures within its cycle.
    let attempts: Vec<&ScanEvent> = recorded
        .iter()
        .filter(|event| matches!(event, ScanEvent::ScanSuccess(_) | ScanEvent::ScanFailure(_)))
        .collect();
    for (index, event) in attempts.iter().enumerate().take(6) {
        match index % 3 {
            2 => assert!(matches!(event, ScanEvent::ScanSuccess(result) if result.text == "ticket-42")),
            _ => assert!(matches!(event, ScanEvent::ScanFailure(Some(_)))),
        }
    }

    assert_eq!(recorded.last(), Some(&ScanEvent::Completed));

    // Everything acquired was released: the permission probe stream and the
    // session stream(s) alike.
    assert_eq!(host.tracks_stopped(), host.tracks_created());
    assert_eq!(host.live_stream_count(), 0);
    assert_eq!(host.max_live_streams(), 1);
    Ok(())
}

#[test]
fn torch_cycle_restarts_on_the_same_device() -> Result<()> {
    let host = Arc::new(
        StubCameraHost::new(cameras()).with_track_specs(vec![StubTrackSpec::torch_capable()]),
    );
    let engine: Arc<Mutex<dyn DecodeEngine>> = Arc::new(Mutex::new(ScriptedEngine::cycling(
        vec![ScriptedOutcome::NotFound],
    )));
    let events = EventBus::new();
    let controller =
        SessionController::new(host.clone(), engine, events, &ScanConfig::default());

    controller.start(Some("dev-1"), StubFrameSource::new())?;
    controller.set_torch(true)?;

    let streams = host.streams();
    assert_eq!(
        streams[0].stub_tracks()[0].applied_constraints(),
        vec![TorchConstraint::on()]
    );

    controller.set_torch(false)?;
    assert_eq!(host.streams_acquired(), 2);
    assert_eq!(controller.device_id(), Some("dev-1".into()));
    assert_eq!(host.max_live_streams(), 1);

    controller.destroy();
    assert_eq!(host.live_stream_count(), 0);
    Ok(())
}
