//! Liveness probers for the allocation engine.
//!
//! Both probers answer one question: does this address currently answer on
//! the network? Reachability is a heuristic for "in use" — ICMP may be
//! filtered and an unused address may be momentarily unreachable for
//! unrelated reasons — so callers treat the verdict as advisory, not as a
//! correctness guarantee.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use oipam_allocator::LivenessProbe;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default TCP probe port.
pub const DEFAULT_TCP_PROBE_PORT: u16 = 80;

// ============================================================================
// ICMP echo via the system ping binary
// ============================================================================

/// ICMP echo prober that shells out to the system `ping` binary.
///
/// Raw ICMP sockets require elevated privileges; the setuid system binary
/// does not.
#[derive(Debug, Clone)]
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    /// Prober with the given per-probe timeout (rounded up to whole seconds
    /// for ping's deadline flag).
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

/// Map a `ping` exit code to a probe verdict.
///
/// iputils: 0 = reply received, 1 = no reply within the deadline, anything
/// else = error (bad address, missing binary permissions, ...).
fn interpret_ping_exit(code: Option<i32>) -> Result<bool> {
    match code {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        Some(other) => anyhow::bail!("ping exited with status {}", other),
        None => anyhow::bail!("ping terminated by signal"),
    }
}

#[async_trait]
impl LivenessProbe for PingProbe {
    async fn is_reachable(&self, address: IpAddr) -> Result<bool> {
        let wait_secs = self.timeout.as_secs().max(1);

        let output = Command::new("ping")
            .arg("-c")
            .arg("1")
            .arg("-n")
            .arg("-W")
            .arg(wait_secs.to_string())
            .arg(address.to_string())
            .output();

        // One extra second on top of ping's own deadline so a wedged binary
        // cannot hang the caller.
        let output = match timeout(Duration::from_secs(wait_secs + 1), output).await {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("ping of {} did not complete", address),
        };

        let reachable = interpret_ping_exit(output.status.code())?;
        debug!(address = %address, reachable, "ping probe");
        Ok(reachable)
    }
}

// ============================================================================
// TCP connect
// ============================================================================

/// TCP connect prober.
///
/// A completed connection and a refused connection both mean a host answered
/// at the address; only silence (timeout, unreachable network or host)
/// counts as free.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    /// Prober against the given port with a per-probe timeout.
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_PROBE_PORT, DEFAULT_PROBE_TIMEOUT)
    }
}

/// Classify a failed connect. `None` means the outcome is inconclusive and
/// the error should propagate to the caller.
fn classify_connect_error(err: &io::Error) -> Option<bool> {
    match err.kind() {
        // A host answered, even if only to turn us away.
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => Some(true),
        io::ErrorKind::TimedOut
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => Some(false),
        _ => None,
    }
}

#[async_trait]
impl LivenessProbe for TcpProbe {
    async fn is_reachable(&self, address: IpAddr) -> Result<bool> {
        let connect = TcpStream::connect((address, self.port));

        let reachable = match timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => match classify_connect_error(&err) {
                Some(verdict) => verdict,
                None => {
                    return Err(anyhow::Error::from(err)
                        .context(format!("tcp probe of {} failed", address)))
                }
            },
            // No answer within the window.
            Err(_) => false,
        };

        debug!(address = %address, port = self.port, reachable, "tcp probe");
        Ok(reachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_exit_codes_map_to_verdicts() {
        assert!(interpret_ping_exit(Some(0)).unwrap());
        assert!(!interpret_ping_exit(Some(1)).unwrap());
        assert!(interpret_ping_exit(Some(2)).is_err());
        assert!(interpret_ping_exit(None).is_err());
    }

    #[test]
    fn refused_connections_mean_a_host_answered() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_connect_error(&refused), Some(true));

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(classify_connect_error(&reset), Some(true));
    }

    #[test]
    fn silence_means_free() {
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(classify_connect_error(&timed_out), Some(false));

        let unreachable = io::Error::from(io::ErrorKind::HostUnreachable);
        assert_eq!(classify_connect_error(&unreachable), Some(false));
    }

    #[test]
    fn other_errors_are_inconclusive() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify_connect_error(&denied), None);
    }

    #[tokio::test]
    async fn tcp_probe_detects_a_listening_host() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new(port, Duration::from_secs(1));
        let reachable = probe.is_reachable("127.0.0.1".parse().unwrap()).await.unwrap();

        assert!(reachable);
    }

    #[tokio::test]
    async fn tcp_probe_counts_refusal_as_reachable() {
        // Bind then drop to get a port with nothing listening; loopback
        // refuses instead of timing out.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::new(port, Duration::from_secs(1));
        let reachable = probe.is_reachable("127.0.0.1".parse().unwrap()).await.unwrap();

        assert!(reachable);
    }
}
