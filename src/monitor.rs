use crate::event::{EndReason, Event, Update};
use crate::probe::Probe;
use crate::ring::SampleRing;
use crate::stats::RunStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Engine options.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Milliseconds between probes.
    pub interval_ms: u64,
    /// How many recent samples back the rolling average.
    pub sample_window: usize,
    /// Upper bound on a single probe, also the "no data yet" minimum.
    pub probe_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            sample_window: 100,
            probe_timeout_ms: 5000,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Drives periodic latency probes against one host and publishes an
/// [`Update`] per successful probe to every subscriber.
///
/// One run at a time: `start` is a no-op while a run is active, `stop` is
/// idempotent, and each run gets fresh statistics. Cancellation is
/// cooperative; an in-flight probe is never killed, its result is simply
/// discarded once the stop is observed.
pub struct Monitor {
    probe: Arc<dyn Probe>,
    handlers: Vec<EventHandler>,
    sample_window: usize,
    probe_timeout_ms: u64,
    interval_ms: Arc<AtomicU64>,
    running: Arc<watch::Sender<bool>>,
    active: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, probe: Arc<dyn Probe>) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            probe,
            handlers: Vec::new(),
            sample_window: config.sample_window,
            probe_timeout_ms: config.probe_timeout_ms,
            interval_ms: Arc::new(AtomicU64::new(config.interval_ms.max(1))),
            running: Arc::new(running),
            active: Mutex::new(None),
        }
    }

    /// Register a handler for update events and end notifications.
    ///
    /// Handlers are invoked synchronously from the sampling task, in
    /// subscription order, so they see every event in probe order. Register
    /// before calling [`start`](Self::start).
    pub fn subscribe(&mut self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.handlers.push(Arc::new(handler));
    }

    /// Begin a run against `host`, probing every `interval_ms` milliseconds.
    ///
    /// An empty or whitespace-only hostname publishes
    /// [`EndReason::MissingHostname`] and starts nothing. Calling while a
    /// run is active (including the brief drain after a stop) is a no-op.
    pub fn start(&self, host: &str, interval_ms: u64) {
        let host = host.trim();
        if host.is_empty() {
            warn!("start rejected: missing hostname");
            publish(&self.handlers, &Event::Ended(EndReason::MissingHostname));
            return;
        }

        let mut active = self.active.lock().unwrap();
        if active.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(host, "start ignored: a run is already active");
            return;
        }

        self.interval_ms.store(interval_ms.max(1), Ordering::Relaxed);
        self.running.send_replace(true);

        let run = RunContext {
            host: host.to_string(),
            probe: self.probe.clone(),
            handlers: self.handlers.clone(),
            interval_ms: self.interval_ms.clone(),
            probe_timeout_ms: self.probe_timeout_ms,
            sample_window: self.sample_window,
            running: self.running.clone(),
        };
        *active = Some(tokio::spawn(run_loop(run)));
    }

    /// End the current run. Idempotent; a stop while idle does nothing.
    ///
    /// The sleeping loop wakes immediately; an in-flight probe is allowed to
    /// return and its result is discarded.
    pub fn stop(&self) {
        let stopped = self.running.send_if_modified(|running| {
            if *running {
                *running = false;
                true
            } else {
                false
            }
        });
        if stopped {
            info!("stop requested");
        }
    }

    /// Adjust the probe interval mid-run; takes effect at the next sleep.
    #[allow(dead_code)]
    pub fn set_interval_ms(&self, interval_ms: u64) {
        self.interval_ms.store(interval_ms.max(1), Ordering::Relaxed);
    }

    #[allow(dead_code)]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    #[allow(dead_code)]
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Wait until the running flag clears, whether by [`stop`](Self::stop)
    /// or by the run ending itself on a failed probe.
    pub async fn stopped(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }

    /// Wait for the sampling task of the last run to fully quiesce.
    pub async fn join(&self) {
        let task = self.active.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

struct RunContext {
    host: String,
    probe: Arc<dyn Probe>,
    handlers: Vec<EventHandler>,
    interval_ms: Arc<AtomicU64>,
    probe_timeout_ms: u64,
    sample_window: usize,
    running: Arc<watch::Sender<bool>>,
}

/// One monitoring run: probe, publish, sleep, until stopped or a probe
/// fails. Run state lives entirely on this task; subscribers only ever see
/// immutable snapshots.
async fn run_loop(run: RunContext) {
    let mut stats = RunStats::new(run.probe_timeout_ms);
    let mut ring = SampleRing::new(run.sample_window);
    let mut seq: u64 = 0;
    let timeout = Duration::from_millis(run.probe_timeout_ms);
    let mut running = run.running.subscribe();

    info!(host = %run.host, "sampling started");

    loop {
        let outcome = run.probe.probe(&run.host, timeout).await;

        // A stop issued while the probe was in flight discards its result.
        if !*running.borrow_and_update() {
            publish(&run.handlers, &Event::Ended(EndReason::Stopped));
            break;
        }

        match outcome {
            Ok(latency_ms) => {
                seq += 1;
                stats.observe(latency_ms);
                ring.push(latency_ms);
                debug!(seq, latency_ms, "probe completed");
                publish(
                    &run.handlers,
                    &Event::Update(Update {
                        seq,
                        timestamp: chrono::Local::now(),
                        latency_ms,
                        minimum: stats.minimum(),
                        maximum: stats.maximum(),
                        mean: ring.mean(),
                        probe_count: stats.probe_count(),
                    }),
                );
            }
            Err(err) => {
                warn!(host = %run.host, error = %err, "probe failed, ending run");
                run.running.send_replace(false);
                publish(&run.handlers, &Event::Ended(EndReason::ProbeFailed));
                break;
            }
        }

        // Interval is re-read each pass so mid-run adjustments apply to the
        // next sleep.
        let delay = Duration::from_millis(run.interval_ms.load(Ordering::Relaxed));
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = running.changed() => {}
        }
        if !*running.borrow_and_update() {
            publish(&run.handlers, &Event::Ended(EndReason::Stopped));
            break;
        }
    }

    info!(host = %run.host, probes = stats.probe_count(), "sampling ended");
}

fn publish(handlers: &[EventHandler], event: &Event) {
    for handler in handlers {
        handler(event);
    }
}
