use crate::types::{ProbeOutcome, ProbeStatus};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time;

/// Attempt one TCP handshake against `addr` within `timeout`.
///
/// The socket is owned by the connect future or the returned stream and is
/// closed on drop, so every path (open, refused, deadline, error) releases
/// it before this returns. Holds no shared state; safe to run concurrently.
pub async fn probe(addr: SocketAddr, timeout: Duration) -> ProbeOutcome {
    let started = Instant::now();
    let status = match time::timeout(timeout, TcpStream::connect(addr)).await {
        Err(_elapsed) => ProbeStatus::Timeout,
        Ok(Err(e)) => classify(&e),
        Ok(Ok(stream)) => {
            drop(stream);
            ProbeStatus::Open
        }
    };
    let outcome = ProbeOutcome::new(addr.port(), status, started.elapsed());
    tracing::trace!(port = addr.port(), status = %outcome.status, elapsed_ms = outcome.elapsed.as_millis() as u64, "probe finished");
    outcome
}

/// Map a failed connect to a port state. Refusals and resets mean the host
/// answered; an OS-level timeout counts the same as our own deadline.
fn classify(err: &io::Error) -> ProbeStatus {
    match err.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => ProbeStatus::Closed,
        io::ErrorKind::TimedOut => ProbeStatus::Timeout,
        _ => ProbeStatus::Error(err.to_string()),
    }
}
