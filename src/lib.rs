pub mod aggregator;
pub mod config;
pub mod error;
pub mod logging;
pub mod prober;
pub mod scanner;
pub mod services;
pub mod types;

pub use aggregator::Aggregator;
pub use error::ScanError;
pub use logging::init_logging;
pub use prober::probe;
pub use scanner::{resolve_host, run_scan, Scanner};
pub use services::lookup;
pub use types::{
    OpenPort, PortRange, ProbeFailure, ProbeOutcome, ProbeStatus, Progress, ScanConfig, ScanReport, ScanStatus,
    Target,
};
