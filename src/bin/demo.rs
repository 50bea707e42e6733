//! demo - end-to-end scan session run against the stub camera host

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scan_session::{
    DecodeEngine, DeviceOrchestrator, EventBus, ScanConfig, ScanEvent, ScriptedEngine,
    ScriptedOutcome, SessionController, StubCameraHost, StubFrameSource, StubTrackSpec,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Delay in milliseconds between a successful decode and the next attempt.
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,
    /// Stop after this many decode attempts (Ctrl-C also stops the run).
    #[arg(long, default_value_t = 12)]
    attempts: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.attempts == 0 {
        return Err(anyhow!("attempts must be >= 1"));
    }

    let mut config = ScanConfig::load()?;
    config.scan_delay = Duration::from_millis(args.delay_ms);

    // Two synthetic cameras; the rear one carries a torch-capable track so
    // the torch path is exercised end to end.
    let host = Arc::new(
        StubCameraHost::new(vec![
            scan_session::DeviceDescriptor::new("dev-0", "Front Camera"),
            scan_session::DeviceDescriptor::new("dev-1", "Back Camera"),
        ])
        .with_track_specs(vec![StubTrackSpec::torch_capable()]),
    );

    let engine: Arc<Mutex<dyn DecodeEngine>> = Arc::new(Mutex::new(ScriptedEngine::cycling(
        vec![
            ScriptedOutcome::NotFound,
            ScriptedOutcome::NotFound,
            ScriptedOutcome::Success("https://example.com/ticket/42".into()),
        ],
    )));

    let events = EventBus::new();
    let attempts_seen = Arc::new(AtomicUsize::new(0));
    let counter = attempts_seen.clone();
    events.subscribe(move |event| {
        match event {
            ScanEvent::ScanSuccess(result) => {
                log::info!("decoded {} as {}", result.text, result.format)
            }
            ScanEvent::ScanFailure(kind) => log::debug!("attempt failed: {:?}", kind),
            ScanEvent::ScanError(message) => log::error!("scan halted: {}", message),
            other => log::info!("session event: {:?}", other),
        }
        if matches!(
            event,
            ScanEvent::ScanSuccess(_) | ScanEvent::ScanFailure(_) | ScanEvent::ScanError(_)
        ) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    // The controller forwards the configured hints to the engine.
    let controller = SessionController::new(host.clone(), engine, events.clone(), &config);
    let formats: Vec<String> = config
        .hints
        .formats
        .iter()
        .map(|format| format.to_string())
        .collect();
    log::info!(
        "decoding formats [{}], try_harder={}",
        formats.join(", "),
        config.hints.try_harder
    );
    let orchestrator = DeviceOrchestrator::new(host, events);
    let source = StubFrameSource::new();

    let running = Arc::new(AtomicBool::new(true));
    let shutdown = running.clone();
    ctrlc::set_handler(move || {
        shutdown.store(false, Ordering::SeqCst);
    })?;

    let device = orchestrator
        .init(&config, &controller, source)?
        .ok_or_else(|| anyhow!("autostart disabled, nothing to demo"))?;
    log::info!("scanning on {} ({})", device.id, device.label);

    // Exercise the torch path: on is a plain constraint, off forces a
    // session restart on the same device.
    controller.set_torch(true)?;
    controller.set_torch(false)?;

    while running.load(Ordering::SeqCst) && attempts_seen.load(Ordering::SeqCst) < args.attempts {
        std::thread::sleep(Duration::from_millis(20));
    }

    controller.destroy();
    log::info!(
        "demo finished after {} attempts",
        attempts_seen.load(Ordering::SeqCst)
    );
    Ok(())
}
