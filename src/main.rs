mod event;
mod logger;
mod monitor;
mod probe;
mod ring;
mod stats;

use anyhow::Result;
use clap::Parser;
use event::{EndReason, Event};
use logger::SessionLogger;
use monitor::{Monitor, MonitorConfig};
use probe::SystemPing;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target host to monitor
    target: String,

    /// Milliseconds between probes
    #[arg(short, long, default_value_t = 1000)]
    interval_ms: u64,

    /// Number of recent samples behind the rolling average
    #[arg(short, long, default_value_t = 100)]
    window: usize,

    /// Per-probe timeout in milliseconds
    #[arg(short, long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Append a log line per sample to this file
    #[arg(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = MonitorConfig {
        interval_ms: args.interval_ms,
        sample_window: args.window,
        probe_timeout_ms: args.timeout_ms,
    };

    let mut monitor = Monitor::new(config, Arc::new(SystemPing));

    let window = args.window;
    monitor.subscribe(move |event| match event {
        Event::Update(update) => {
            println!(
                "{:>4}ms  min {}  max {}  avg {:.2} (last {})",
                update.latency_ms, update.minimum, update.maximum, update.mean, window
            );
        }
        Event::Ended(EndReason::ProbeFailed) => eprintln!("Unable to ping host"),
        Event::Ended(EndReason::MissingHostname) => eprintln!("Missing hostname"),
        Event::Ended(EndReason::Stopped) => println!("Stopped"),
    });

    if let Some(path) = &args.output {
        let session_log = Arc::new(SessionLogger::open(path)?);
        session_log.log_startup(&args.target, args.interval_ms, args.window);
        monitor.subscribe(move |event| session_log.record(event));
    }

    println!(
        "MONITOR {}: probing every {}ms (timeout {}ms, averaging last {})",
        args.target, args.interval_ms, args.timeout_ms, args.window
    );

    monitor.start(&args.target, args.interval_ms);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            monitor.stop();
        }
        _ = monitor.stopped() => {}
    }

    monitor.join().await;

    Ok(())
}
