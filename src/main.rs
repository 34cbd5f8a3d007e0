use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use portsweep::config::{load_config, save_config, FileConfig};
use portsweep::types::{DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT};
use portsweep::{init_logging, PortRange, Progress, ScanConfig, ScanReport, Scanner};

const DEFAULT_PORTS: &str = "1-1024";
const PROGRESS_STEP: usize = 100;

#[derive(Parser, Debug)]
#[command(name = "portsweep", version, about = "Concurrent TCP connect port scanner")]
struct Cli {
    /// Target (IP or hostname). If omitted, must be provided by config file.
    target: Option<String>,

    /// Port range to scan, e.g. 1-1024 or 443
    #[arg(short, long)]
    ports: Option<String>,

    /// Max concurrent probes
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Per-port timeout milliseconds
    #[arg(short = 't', long)]
    timeout_ms: Option<u64>,

    /// Cancel the scan after this many seconds and report what finished
    #[arg(long = "max-duration")]
    max_duration_secs: Option<u64>,

    /// JSON output
    #[arg(short = 'j', long, action = ArgAction::SetTrue)]
    json: bool,

    /// Only list open ports (hides per-port errors)
    #[arg(short = 'o', long = "open-only", action = ArgAction::SetTrue)]
    open_only: bool,

    /// Save the JSON report to this file when the scan finishes
    #[arg(short = 's', long = "save-file")]
    save_file: Option<String>,

    /// Path to a configuration file (TOML). If not set, defaults to $XDG_CONFIG_HOME/portsweep/config.toml when present.
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Write current effective configuration to the config file and exit.
    #[arg(long = "write-config", action = ArgAction::SetTrue)]
    write_config: bool,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let file_cfg = match load_config(cli.config_path.as_deref()) {
        Ok(opt) => opt.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("failed to load config file: {e}");
            FileConfig::default()
        }
    };

    // Merge precedence: CLI > file > built-in defaults
    let target = match (&cli.target, &file_cfg.target) {
        (Some(t), _) => t.clone(),
        (None, Some(t)) => t.clone(),
        (None, None) => return Err(anyhow!("target is required (via CLI or config file)")),
    };
    let ports_spec = cli.ports.clone().or(file_cfg.ports.clone()).unwrap_or_else(|| DEFAULT_PORTS.to_string());
    let concurrency = cli.concurrency.or(file_cfg.concurrency).unwrap_or(DEFAULT_CONCURRENCY);
    let timeout_ms = cli.timeout_ms.or(file_cfg.timeout_ms).unwrap_or(DEFAULT_TIMEOUT.as_millis() as u64);
    let max_duration_secs = cli.max_duration_secs.or(file_cfg.max_duration_secs);
    let json = cli.json || file_cfg.json.unwrap_or(false);
    let open_only = cli.open_only || file_cfg.open_only.unwrap_or(false);
    let save_file = cli.save_file.clone().or(file_cfg.save_file.clone());

    if cli.write_config {
        let eff = FileConfig {
            target: Some(target),
            ports: Some(ports_spec),
            concurrency: Some(concurrency),
            timeout_ms: Some(timeout_ms),
            max_duration_secs,
            json: Some(json),
            open_only: Some(open_only),
            save_file,
        };
        let path = save_config(&eff, cli.config_path.as_deref()).context("failed to write config")?;
        println!("wrote configuration to {}", path.display());
        return Ok(());
    }

    // All validation happens here, before any network activity.
    let ports: PortRange = ports_spec.parse()?;
    let mut config = ScanConfig::from_millis(target, ports, timeout_ms)?.with_concurrency(concurrency)?;
    if let Some(secs) = max_duration_secs {
        config = config.with_max_duration(Duration::from_secs(secs))?;
    }

    if !json {
        print_header(&config);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling scan");
                cancel.cancel();
            }
        })
    };

    let (progress_tx, progress_rx) = watch::channel(Progress::default());
    let printer = (!json).then(|| tokio::spawn(print_progress(progress_rx)));

    let result = Scanner::new(config)
        .with_cancellation(cancel)
        .with_progress(progress_tx)
        .run()
        .await;

    ctrl_c.abort();
    if let Some(printer) = printer {
        printer.await.ok();
        eprintln!();
    }
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, open_only);
    }

    if let Some(path) = save_file {
        save_report(&report, Path::new(&path))?;
        tracing::info!(path = %path, "saved report");
    }

    Ok(())
}

async fn print_progress(mut rx: watch::Receiver<Progress>) {
    let mut last_step = 0;
    while rx.changed().await.is_ok() {
        let p = *rx.borrow_and_update();
        let step = p.completed / PROGRESS_STEP;
        if step > last_step || p.is_done() {
            last_step = step;
            eprint!("\rProgress: {}/{} ports scanned", p.completed, p.total);
        }
        if p.is_done() {
            break;
        }
    }
}

fn print_header(config: &ScanConfig) {
    println!("Target: {}", config.host());
    println!("Port Range: {}", config.ports());
    println!("Timeout: {}ms", config.timeout().as_millis());
    println!("Concurrency: {}", config.concurrency());
    println!();
}

fn print_report(report: &ScanReport, open_only: bool) {
    println!();
    println!("Target Host: {} ({})", report.host, report.addr);
    if !report.is_complete() {
        println!("Scan CANCELLED: {} of {} ports probed", report.ports_scanned, report.ports.len());
    }
    println!("Scan Duration: {:.2} seconds", report.duration.as_secs_f64());
    println!("Total Ports Scanned: {}", report.ports_scanned);
    println!("Open Ports Found: {}", report.open.len());

    if report.open.is_empty() {
        println!("\nNo open ports found in the specified range.");
    } else {
        println!("\nPort\tService");
        println!("----\t-------");
        for open in &report.open {
            println!("{}\t{}", open.port, open.service);
        }
    }

    println!();
    println!("Closed: {}  Timed out: {}  Errors: {}", report.closed, report.timed_out, report.error_count());
    if !open_only {
        for failure in &report.errors {
            println!("  {}: {}", failure.port, failure.reason);
        }
    }
}

fn save_report(report: &ScanReport, path: &Path) -> Result<()> {
    let body = serde_json::to_string_pretty(report)?;
    fs::write(path, body).with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}
