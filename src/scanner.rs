use crate::aggregator::Aggregator;
use crate::error::ScanError;
use crate::prober;
use crate::types::{ProbeOutcome, ProbeStatus, Progress, ScanConfig, ScanReport, Target};
use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinError;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Upper bound on name resolution so a stuck resolver cannot hang a scan.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Scan `config` with the real TCP prober and no external cancellation.
pub async fn run_scan(config: ScanConfig) -> Result<ScanReport, ScanError> {
    Scanner::new(config).run().await
}

/// Resolve a hostname or IP literal to a single address, preferring IPv4.
pub async fn resolve_host(host: &str) -> Result<IpAddr, ScanError> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(ip);
    }

    let failed = |reason: String| ScanError::Resolution {
        host: host.to_string(),
        reason,
    };
    let addrs: Vec<SocketAddr> = match time::timeout(RESOLVE_TIMEOUT, tokio::net::lookup_host((host, 0))).await {
        Err(_) => return Err(failed(format!("timed out after {:?}", RESOLVE_TIMEOUT))),
        Ok(Err(e)) => return Err(failed(e.to_string())),
        Ok(Ok(addrs)) => addrs.collect(),
    };
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(|a| a.ip())
        .ok_or_else(|| failed("no addresses found".into()))
}

/// Drives one scan: resolve once, then probe every port in the range through
/// a pool of at most `concurrency` in-flight probes.
pub struct Scanner {
    config: ScanConfig,
    cancel: CancellationToken,
    progress: Option<watch::Sender<Progress>>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Stop dispatching and abort in-flight probes once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Publish cumulative progress. Sending never blocks and works with no
    /// receivers attached.
    pub fn with_progress(mut self, tx: watch::Sender<Progress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(self) -> Result<ScanReport, ScanError> {
        self.run_with(prober::probe).await
    }

    /// Run the scan with a caller-supplied prober.
    pub async fn run_with<P, Fut>(self, prober: P) -> Result<ScanReport, ScanError>
    where
        P: Fn(SocketAddr, Duration) -> Fut,
        Fut: Future<Output = ProbeOutcome> + Send + 'static,
    {
        let started = Instant::now();
        let ports = self.config.ports();
        let probe_timeout = self.config.timeout();

        let addr = resolve_host(self.config.host()).await?;
        let target = Target {
            host: self.config.host().to_string(),
            addr,
            ports,
        };
        tracing::info!(
            host = %target.host,
            %addr,
            range = %ports,
            concurrency = self.config.concurrency(),
            timeout_ms = probe_timeout.as_millis() as u64,
            "starting scan"
        );

        // Child token: the deadline must not cancel the caller's token.
        let cancel = self.cancel.child_token();
        let deadline = self.config.max_duration().map(|max| {
            let token = cancel.clone();
            tokio::spawn(async move {
                time::sleep(max).await;
                tracing::warn!(max_secs = max.as_secs_f64(), "scan deadline reached");
                token.cancel();
            })
        });

        let progress = Arc::new(ProgressSink::new(self.progress, ports.len()));
        let aggregator = Arc::new(Aggregator::new(target, started));
        let sem = Arc::new(Semaphore::new(self.config.concurrency()));
        let mut tasks = FuturesUnordered::new();

        for port in ports.iter() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            // Reap whatever already finished so the handle set stays bounded.
            while let Some(Some((done_port, joined))) = tasks.next().now_or_never() {
                absorb(done_port, joined, &aggregator, &progress);
            }

            let probe = prober(SocketAddr::new(addr, port), probe_timeout);
            let token = cancel.clone();
            let agg = Arc::clone(&aggregator);
            let sink = Arc::clone(&progress);
            let handle = tokio::spawn(async move {
                let _p = permit; // hold until task ends
                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    outcome = probe => Some(outcome),
                };
                if let Some(outcome) = outcome {
                    sink.update(agg.record(outcome));
                }
            });
            tasks.push(async move { (port, handle.await) });
        }

        while let Some((port, joined)) = tasks.next().await {
            absorb(port, joined, &aggregator, &progress);
        }

        if let Some(handle) = deadline {
            handle.abort();
        }

        let report = aggregator.finalize();
        if report.is_complete() {
            tracing::info!(
                open = report.open.len(),
                closed = report.closed,
                timed_out = report.timed_out,
                errors = report.error_count(),
                duration_ms = report.duration.as_millis() as u64,
                "scan complete"
            );
        } else {
            tracing::warn!(
                scanned = report.ports_scanned,
                total = ports.len(),
                open = report.open.len(),
                "scan cancelled before all ports were probed"
            );
        }
        Ok(report)
    }
}

/// A probe task only fails to join if it panicked; keep its port accounted
/// for as an error instead of dropping it.
fn absorb(port: u16, joined: Result<(), JoinError>, aggregator: &Aggregator, progress: &ProgressSink) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(port, "probe task panicked");
            let outcome = ProbeOutcome::new(port, ProbeStatus::Error(format!("probe task failed: {}", e)), Duration::ZERO);
            progress.update(aggregator.record(outcome));
        }
    }
}

struct ProgressSink {
    tx: Option<watch::Sender<Progress>>,
}

impl ProgressSink {
    fn new(tx: Option<watch::Sender<Progress>>, total: usize) -> Self {
        if let Some(tx) = &tx {
            tx.send_replace(Progress { completed: 0, total });
        }
        Self { tx }
    }

    // Counts can arrive out of order from different tasks; only move forward.
    fn update(&self, completed: usize) {
        if let Some(tx) = &self.tx {
            tx.send_modify(|p| p.completed = p.completed.max(completed));
        }
    }
}
