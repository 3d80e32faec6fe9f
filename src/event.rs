use chrono::{DateTime, Local};

/// Snapshot published after each successful probe.
///
/// `minimum` and `maximum` cover the whole run; `mean` covers only the
/// recent-sample window.
#[derive(Debug, Clone)]
pub struct Update {
    /// Position of this sample within the run, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub latency_ms: u64,
    pub minimum: u64,
    pub maximum: u64,
    pub mean: f64,
    pub probe_count: u64,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// A probe failed; the run stops itself and is not retried.
    ProbeFailed,
    /// Start was called with an empty hostname; no run began.
    MissingHostname,
    /// The user stopped the run.
    Stopped,
}

#[derive(Debug, Clone)]
pub enum Event {
    Update(Update),
    Ended(EndReason),
}
