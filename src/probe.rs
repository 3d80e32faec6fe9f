use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// One latency measurement attempt against a target host.
///
/// Implementations must bound their blocking time by `timeout` and be safe
/// to call repeatedly. The sampling loop treats every error variant the
/// same way; the variants exist for the logs.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, host: &str, timeout: Duration) -> Result<u64, ProbeError>;
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,
    #[error("host unreachable or no reply")]
    Unreachable,
    #[error("could not parse ping output")]
    Malformed,
    #[error("failed to run ping: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Probes by running the OS `ping` utility for a single echo request and
/// parsing the reported round-trip time out of its output.
pub struct SystemPing;

#[async_trait]
impl Probe for SystemPing {
    async fn probe(&self, host: &str, timeout: Duration) -> Result<u64, ProbeError> {
        let mut cmd = Command::new("ping");

        #[cfg(windows)]
        cmd.args(["-n", "1", "-w", &timeout.as_millis().to_string()]);
        #[cfg(not(windows))]
        cmd.args(["-c", "1", "-W", &timeout.as_secs().max(1).to_string()]);

        cmd.arg(host)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // The utility has its own deadline, but a stuck resolver can ignore
        // it; the outer timeout is the hard bound.
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| ProbeError::Timeout)??;

        if !output.status.success() {
            return Err(ProbeError::Unreachable);
        }

        let text = String::from_utf8_lossy(&output.stdout);
        debug!(host, "ping returned {} bytes of output", text.len());
        parse_latency_ms(&text).ok_or(ProbeError::Malformed)
    }
}

/// Extract the round-trip time in whole milliseconds from ping output.
///
/// Looks for the `time=`/`time<` marker first ("time=23.4 ms", "time<1ms"),
/// then falls back to the first `<digits>ms` token anywhere in the output,
/// which covers localized variants.
pub(crate) fn parse_latency_ms(output: &str) -> Option<u64> {
    for marker in ["time=", "time<"] {
        if let Some(pos) = output.find(marker) {
            if let Some(ms) = leading_number(&output[pos + marker.len()..]) {
                return Some(ms);
            }
        }
    }

    let bytes = output.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let rest = &output[i..];
            if rest.starts_with("ms") || rest.starts_with(" ms") {
                return leading_number(&output[start..]);
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Parse the decimal number at the start of `s`, rounded to whole ms.
fn leading_number(s: &str) -> Option<u64> {
    let end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse::<f64>().ok().map(|v| v.round() as u64)
}
