use crate::event::{EndReason, Event};
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;
use tracing::warn;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Appends one line per sample (and per run ending) to a log file.
///
/// Purely an event subscriber; the sampling loop does not depend on it.
/// Writes are best-effort and stop once the size cap is reached.
pub struct SessionLogger {
    inner: Mutex<LogFile>,
}

struct LogFile {
    file: File,
    size: u64,
    capped: bool,
}

impl SessionLogger {
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path))?;

        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            inner: Mutex::new(LogFile {
                file,
                size,
                capped: false,
            }),
        })
    }

    pub fn log_startup(&self, host: &str, interval_ms: u64, window: usize) {
        let now = chrono::Local::now();
        self.append(&format!(
            "[{}] === monitoring {} started: probing every {}ms, averaging last {} ===",
            now.format("%H:%M:%S"),
            host,
            interval_ms,
            window
        ));
    }

    /// Record one event. Suitable for `Monitor::subscribe`.
    pub fn record(&self, event: &Event) {
        match event {
            Event::Update(update) => {
                self.append(&format!(
                    "[{}] #{} {}ms | min/avg/max: {}/{:.2}/{}ms",
                    update.timestamp.format("%H:%M:%S"),
                    update.seq,
                    update.latency_ms,
                    update.minimum,
                    update.mean,
                    update.maximum
                ));
            }
            Event::Ended(reason) => {
                let now = chrono::Local::now();
                let why = match reason {
                    EndReason::ProbeFailed => "probe failed",
                    EndReason::MissingHostname => "missing hostname",
                    EndReason::Stopped => "stopped",
                };
                self.append(&format!("[{}] === session ended: {} ===", now.format("%H:%M:%S"), why));
            }
        }
    }

    fn append(&self, line: &str) {
        let Ok(mut inner) = self.inner.try_lock() else {
            return;
        };

        let bytes = format!("{}\n", line).into_bytes();
        if inner.size + bytes.len() as u64 > MAX_LOG_SIZE {
            if !inner.capped {
                inner.capped = true;
                warn!(
                    "log file size limit ({}MB) reached, further writes skipped",
                    MAX_LOG_SIZE / 1024 / 1024
                );
            }
            return;
        }

        if inner.file.write_all(&bytes).is_ok() && inner.file.flush().is_ok() {
            inner.size += bytes.len() as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Update;

    fn temp_log_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("latmon-{}-{}.log", name, std::process::id()))
    }

    #[test]
    fn records_updates_and_endings() {
        let path = temp_log_path("record");
        let logger = SessionLogger::open(path.to_str().unwrap()).unwrap();

        logger.log_startup("example.net", 1000, 100);
        logger.record(&Event::Update(Update {
            seq: 1,
            timestamp: chrono::Local::now(),
            latency_ms: 23,
            minimum: 23,
            maximum: 23,
            mean: 23.0,
            probe_count: 1,
        }));
        logger.record(&Event::Ended(EndReason::Stopped));

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(contents.contains("monitoring example.net started"));
        assert!(contents.contains("#1 23ms | min/avg/max: 23/23.00/23ms"));
        assert!(contents.contains("session ended: stopped"));
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn reopening_appends() {
        let path = temp_log_path("append");
        {
            let logger = SessionLogger::open(path.to_str().unwrap()).unwrap();
            logger.record(&Event::Ended(EndReason::Stopped));
        }
        {
            let logger = SessionLogger::open(path.to_str().unwrap()).unwrap();
            logger.record(&Event::Ended(EndReason::ProbeFailed));
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("stopped"));
        assert!(contents.contains("probe failed"));
    }
}
