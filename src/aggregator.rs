use crate::services;
use crate::types::{OpenPort, ProbeFailure, ProbeOutcome, ProbeStatus, ScanReport, ScanStatus, Target};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Collects probe outcomes for one scan and turns them into a [`ScanReport`].
///
/// `record` may be called from many tasks at once; the outcome map behind a
/// single mutex is the only mutable state shared by a running scan. Keying by
/// port keeps every port in exactly one class and yields ascending order for
/// free.
#[derive(Debug)]
pub struct Aggregator {
    target: Target,
    started: Instant,
    outcomes: Mutex<BTreeMap<u16, ProbeStatus>>,
}

impl Aggregator {
    pub fn new(target: Target, started: Instant) -> Self {
        Self {
            target,
            started,
            outcomes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record one finished probe and return how many ports have been recorded.
    /// Ports outside the range and repeat recordings are ignored.
    pub fn record(&self, outcome: ProbeOutcome) -> usize {
        let mut outcomes = self.lock();
        if !self.target.ports.contains(outcome.port) {
            tracing::warn!(port = outcome.port, range = %self.target.ports, "ignoring outcome outside scan range");
            return outcomes.len();
        }
        if outcomes.contains_key(&outcome.port) {
            tracing::warn!(port = outcome.port, "ignoring duplicate outcome");
            return outcomes.len();
        }
        if outcome.is_open() {
            tracing::debug!(port = outcome.port, service = services::lookup(outcome.port), "open port");
        }
        outcomes.insert(outcome.port, outcome.status);
        outcomes.len()
    }

    pub fn recorded(&self) -> usize {
        self.lock().len()
    }

    /// Build the report. Any port left unrecorded means the scan was cut
    /// short, so the report is marked cancelled rather than passed off as
    /// complete.
    pub fn finalize(&self) -> ScanReport {
        let outcomes = self.lock();
        let mut open = Vec::new();
        let mut errors = Vec::new();
        let mut closed = 0;
        let mut timed_out = 0;

        for (&port, status) in outcomes.iter() {
            match status {
                ProbeStatus::Open => open.push(OpenPort {
                    port,
                    service: services::lookup(port).to_string(),
                }),
                ProbeStatus::Closed => closed += 1,
                ProbeStatus::Timeout => timed_out += 1,
                ProbeStatus::Error(reason) => errors.push(ProbeFailure {
                    port,
                    reason: reason.clone(),
                }),
            }
        }

        let status = if outcomes.len() == self.target.ports.len() {
            ScanStatus::Complete
        } else {
            ScanStatus::Cancelled
        };

        ScanReport {
            host: self.target.host.clone(),
            addr: self.target.addr,
            ports: self.target.ports,
            status,
            ports_scanned: outcomes.len(),
            open,
            closed,
            timed_out,
            errors,
            duration: self.started.elapsed(),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still safe to read.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u16, ProbeStatus>> {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
