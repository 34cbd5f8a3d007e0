use thiserror::Error;

/// Scan-fatal errors. Per-port failures never surface here; they are
/// absorbed into the report as [`crate::types::ProbeStatus`] values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid port range {start}-{end}: start must not exceed end")]
    InvalidPortRange { start: u32, end: u32 },

    #[error("port {0} is out of bounds (ports must be between 1 and 65535)")]
    PortOutOfBounds(u32),

    #[error("invalid port specification '{0}' (expected N or START-END)")]
    InvalidPortSpec(String),

    #[error("probe timeout must be greater than zero")]
    InvalidTimeout,

    #[error("max duration must be greater than zero")]
    InvalidMaxDuration,

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("target host must not be empty")]
    EmptyHost,

    #[error("failed to resolve host '{host}': {reason}")]
    Resolution { host: String, reason: String },
}

impl ScanError {
    /// True for errors raised before any network activity takes place.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ScanError::Resolution { .. })
    }
}
