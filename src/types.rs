use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

pub const MIN_PORT: u32 = 1;
pub const MAX_PORT: u32 = 65_535;
pub const DEFAULT_CONCURRENCY: usize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Closed, non-empty range of TCP ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPortRange")]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Bounds are taken as `u32` so that values above 65535 are rejected
    /// instead of silently wrapping.
    pub fn new(start: u32, end: u32) -> Result<Self, ScanError> {
        for p in [start, end] {
            if !(MIN_PORT..=MAX_PORT).contains(&p) {
                return Err(ScanError::PortOutOfBounds(p));
            }
        }
        if start > end {
            return Err(ScanError::InvalidPortRange { start, end });
        }
        Ok(Self { start: start as u16, end: end as u16 })
    }

    pub fn single(port: u16) -> Result<Self, ScanError> {
        Self::new(port as u32, port as u32)
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Always false: a constructed range holds at least one port.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Ports in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

#[derive(Deserialize)]
struct RawPortRange {
    start: u32,
    end: u32,
}

impl TryFrom<RawPortRange> for PortRange {
    type Error = ScanError;

    fn try_from(raw: RawPortRange) -> Result<Self, Self::Error> {
        PortRange::new(raw.start, raw.end)
    }
}

impl Display for PortRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for PortRange {
    type Err = ScanError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let bad = || ScanError::InvalidPortSpec(spec.to_string());
        let p = spec.trim();
        if p.is_empty() {
            return Err(bad());
        }
        if let Some((start, end)) = p.split_once('-') {
            let s: u32 = start.trim().parse().map_err(|_| bad())?;
            let e: u32 = end.trim().parse().map_err(|_| bad())?;
            PortRange::new(s, e)
        } else {
            let port: u32 = p.parse().map_err(|_| bad())?;
            PortRange::new(port, port)
        }
    }
}

/// Validated scan parameters.
#[derive(Clone, Debug)]
pub struct ScanConfig {
    host: String,
    ports: PortRange,
    timeout: Duration,
    concurrency: usize,
    max_duration: Option<Duration>,
}

impl ScanConfig {
    pub fn new(host: impl Into<String>, ports: PortRange, timeout: Duration) -> Result<Self, ScanError> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(ScanError::EmptyHost);
        }
        if timeout.is_zero() {
            return Err(ScanError::InvalidTimeout);
        }
        Ok(Self {
            host,
            ports,
            timeout,
            concurrency: DEFAULT_CONCURRENCY,
            max_duration: None,
        })
    }

    /// Same as [`ScanConfig::new`] but with the timeout in milliseconds, as
    /// taken from the command line or config file.
    pub fn from_millis(host: impl Into<String>, ports: PortRange, timeout_ms: u64) -> Result<Self, ScanError> {
        Self::new(host, ports, Duration::from_millis(timeout_ms))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Result<Self, ScanError> {
        if concurrency == 0 {
            return Err(ScanError::InvalidConcurrency);
        }
        self.concurrency = concurrency;
        Ok(self)
    }

    /// Cancel the scan once this much wall-clock time has passed.
    pub fn with_max_duration(mut self, max: Duration) -> Result<Self, ScanError> {
        if max.is_zero() {
            return Err(ScanError::InvalidMaxDuration);
        }
        self.max_duration = Some(max);
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn ports(&self) -> PortRange {
        self.ports
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }
}

/// Resolved host plus the range to probe. Shared read-only by every probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub addr: IpAddr,
    pub ports: PortRange,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ProbeStatus {
    Open,
    Closed,
    Timeout,
    Error(String),
}

impl Display for ProbeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Open => write!(f, "open"),
            ProbeStatus::Closed => write!(f, "closed"),
            ProbeStatus::Timeout => write!(f, "timeout"),
            ProbeStatus::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Result of probing a single port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub port: u16,
    pub status: ProbeStatus,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl ProbeOutcome {
    pub fn new(port: u16, status: ProbeStatus, elapsed: Duration) -> Self {
        Self { port, status, elapsed }
    }

    pub fn is_open(&self) -> bool {
        self.status == ProbeStatus::Open
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Complete,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPort {
    pub port: u16,
    pub service: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub port: u16,
    pub reason: String,
}

/// Final, immutable summary of one scan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanReport {
    pub host: String,
    pub addr: IpAddr,
    pub ports: PortRange,
    pub status: ScanStatus,
    pub ports_scanned: usize,
    /// Ascending by port, no duplicates.
    pub open: Vec<OpenPort>,
    pub closed: usize,
    pub timed_out: usize,
    /// Ascending by port.
    pub errors: Vec<ProbeFailure>,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

impl ScanReport {
    pub fn open_ports(&self) -> Vec<u16> {
        self.open.iter().map(|o| o.port).collect()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_complete(&self) -> bool {
        self.status == ScanStatus::Complete
    }
}

/// Advisory progress signal: probes finished so far out of the range size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_rejects_reversed_bounds() {
        assert_eq!(
            PortRange::new(100, 50),
            Err(ScanError::InvalidPortRange { start: 100, end: 50 })
        );
    }

    #[test]
    fn port_range_rejects_out_of_bounds() {
        assert_eq!(PortRange::new(0, 10), Err(ScanError::PortOutOfBounds(0)));
        assert_eq!(PortRange::new(1, 65_536), Err(ScanError::PortOutOfBounds(65_536)));
        assert!(PortRange::new(1, 65_535).is_ok());
    }

    #[test]
    fn port_range_len_counts_both_ends() {
        assert_eq!(PortRange::new(20, 25).unwrap().len(), 6);
        assert_eq!(PortRange::single(80).unwrap().len(), 1);
        assert_eq!(PortRange::new(1, 65_535).unwrap().len(), 65_535);
    }

    #[test]
    fn port_range_iterates_ascending() {
        let ports: Vec<u16> = PortRange::new(20, 25).unwrap().iter().collect();
        assert_eq!(ports, vec![20, 21, 22, 23, 24, 25]);
    }

    #[test]
    fn port_range_parses_specs() {
        assert_eq!("80".parse::<PortRange>().unwrap(), PortRange::single(80).unwrap());
        assert_eq!(" 1 - 1024 ".parse::<PortRange>().unwrap(), PortRange::new(1, 1024).unwrap());
        assert_eq!(
            "100-50".parse::<PortRange>(),
            Err(ScanError::InvalidPortRange { start: 100, end: 50 })
        );
        assert!(matches!("http".parse::<PortRange>(), Err(ScanError::InvalidPortSpec(_))));
        assert!(matches!("".parse::<PortRange>(), Err(ScanError::InvalidPortSpec(_))));
        assert_eq!("0-5".parse::<PortRange>(), Err(ScanError::PortOutOfBounds(0)));
    }

    #[test]
    fn port_range_deserialization_is_validated() {
        assert_eq!(
            serde_json::from_str::<PortRange>(r#"{"start":20,"end":25}"#).unwrap(),
            PortRange::new(20, 25).unwrap()
        );
        let reversed = serde_json::from_str::<PortRange>(r#"{"start":100,"end":50}"#).unwrap_err();
        assert!(reversed.to_string().contains("100-50"));
        assert!(serde_json::from_str::<PortRange>(r#"{"start":0,"end":0}"#).is_err());
        assert!(serde_json::from_str::<PortRange>(r#"{"start":1,"end":70000}"#).is_err());
    }

    #[test]
    fn zero_max_duration_has_its_own_error() {
        let cfg = ScanConfig::new("localhost", PortRange::single(80).unwrap(), DEFAULT_TIMEOUT).unwrap();
        let err = cfg.with_max_duration(Duration::ZERO).unwrap_err();
        assert_eq!(err, ScanError::InvalidMaxDuration);
        assert!(err.to_string().contains("max duration"));
    }

    #[test]
    fn scan_config_validates() {
        let ports = PortRange::new(1, 10).unwrap();
        assert_eq!(
            ScanConfig::new("localhost", ports, Duration::ZERO).unwrap_err(),
            ScanError::InvalidTimeout
        );
        assert_eq!(
            ScanConfig::new("   ", ports, DEFAULT_TIMEOUT).unwrap_err(),
            ScanError::EmptyHost
        );
        let cfg = ScanConfig::from_millis("localhost", ports, 250).unwrap();
        assert_eq!(cfg.timeout(), Duration::from_millis(250));
        assert_eq!(cfg.concurrency(), DEFAULT_CONCURRENCY);
        assert_eq!(cfg.clone().with_concurrency(0).unwrap_err(), ScanError::InvalidConcurrency);
        assert_eq!(cfg.with_concurrency(8).unwrap().concurrency(), 8);
    }

    #[test]
    fn report_serializes_duration_as_millis() {
        let report = ScanReport {
            host: "localhost".into(),
            addr: "127.0.0.1".parse().unwrap(),
            ports: PortRange::new(20, 25).unwrap(),
            status: ScanStatus::Complete,
            ports_scanned: 6,
            open: vec![OpenPort { port: 22, service: "SSH".into() }],
            closed: 5,
            timed_out: 0,
            errors: vec![],
            duration: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["status"], "complete");
        assert_eq!(json["open"][0]["service"], "SSH");
        assert_eq!(report.open_ports(), vec![22]);
    }
}
