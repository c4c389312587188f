use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::config::{ProbeConfig, VerifyPolicy};
use crate::core_logic::{self, ProbeHealth, RunReport};
use crate::error::{ProbeError, ProbeResult};
use crate::io_controller::{CancelFlag, CapacityProber, LogSink, MountedVolume, ProgressSink, Volume};

struct ActiveRun {
    prober: Arc<CapacityProber>,
    cancel: CancelFlag,
    sink: Arc<dyn ProgressSink>,
    handle: JoinHandle<ProbeResult<RunReport>>,
}

/// Owns at most one run at a time and drives it on a background thread.
#[derive(Default)]
pub struct RunController {
    config: ProbeConfig,
    active: Option<ActiveRun>,
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ProbeConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Starts a run against `volume` and returns without waiting for it.
    pub fn start(&mut self, volume: Arc<dyn Volume>, sink: Arc<dyn ProgressSink>) -> ProbeResult<()> {
        if self.is_running() {
            return Err(ProbeError::RunActive);
        }
        if !volume.is_ready() {
            sink.status(format!("Volume {} is not ready.", volume.root().display()));
            return Err(ProbeError::VolumeNotReady(volume.root().to_path_buf()));
        }
        // Reap a finished run nobody waited for.
        if let Some(Err(e)) = self.wait() {
            warn!("Previous run ended with an error: {e}");
        }

        let prober = Arc::new(CapacityProber::with_config(volume, self.config.clone()));
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));

        let handle = {
            let prober = prober.clone();
            let cancel = cancel.clone();
            let sink = sink.clone();
            thread::Builder::new()
                .name("diskprobe-worker".to_string())
                .spawn(move || prober.run(&cancel, sink.as_ref()))?
        };

        info!("Run started on {}", prober.volume().root().display());
        self.active = Some(ActiveRun {
            prober,
            cancel,
            sink,
            handle,
        });
        Ok(())
    }

    /// Cancels the active run and removes its working directory. Does nothing
    /// when no run is active.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        let Some(run) = self.active.as_ref() else {
            return;
        };
        run.prober.stop(&run.cancel);
        run.sink.status("Operation aborted".to_string());
        info!("Run aborted.");
    }

    /// Blocks until the current run ends and returns its result.
    pub fn wait(&mut self) -> Option<ProbeResult<RunReport>> {
        let run = self.active.take()?;
        Some(run.handle.join().unwrap_or(Err(ProbeError::WorkerPanicked)))
    }
}

/// Runs a complete probe of the volume mounted at `volume_root`, logging
/// status lines, and blocks until it ends.
pub fn run_probe(volume_root: &Path, config: ProbeConfig) -> ProbeResult<RunReport> {
    let mut controller = RunController::with_config(config);
    controller.start(Arc::new(MountedVolume::new(volume_root)), Arc::new(LogSink))?;
    controller.wait().unwrap_or(Err(ProbeError::WorkerPanicked))
}

pub fn print_summary(report: &RunReport) {
    let health = match report.health {
        ProbeHealth::Healthy => "Healthy",
        ProbeHealth::Corrupted => "Corrupted",
        ProbeHealth::Incomplete => "Incomplete",
    };

    println!("========================================");
    println!("DiskProbe Summary");
    println!(
        "Filled        : {} / {} bytes in {} chunks",
        core_logic::format_count(report.bytes_filled),
        core_logic::format_count(report.total_size),
        report.chunks_written
    );
    println!(
        "Checked       : {} / {} chunks",
        report.checked_chunks, report.total_chunks
    );
    println!("Bad chunks    : {}", report.bad_chunks);
    if report.bad_chunks > 0 {
        println!(
            "Bytes lost    : ~ {}",
            core_logic::format_count(report.bad_bytes)
        );
    }
    println!("Status        : {health}");
    println!("========================================");
}

pub fn run_cli(args: &[String]) -> i32 {
    let program = args.first().map(String::as_str).unwrap_or("diskprobe");
    if args.len() < 2 {
        println!("DiskProbe - storage capacity and integrity checker.");
        println!("Usage: {program} <volume_root> [--stop-on-mismatch] [--json]");
        println!("Example: {program} /media/usb");
        println!("Note: fills all free space on the volume, then verifies and deletes the data.");
        return 0;
    }

    let mut volume_root: Option<&str> = None;
    let mut config = ProbeConfig::default();
    let mut json = false;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--stop-on-mismatch" => config.verify_policy = VerifyPolicy::StopAtFirstMismatch,
            "--json" => json = true,
            _ if volume_root.is_none() => volume_root = Some(arg.as_str()),
            _ => {
                eprintln!("[ERROR] Unexpected argument: {arg}");
                return 2;
            }
        }
    }

    let Some(volume_root) = volume_root else {
        eprintln!("[ERROR] Missing volume root.");
        return 2;
    };

    match run_probe(Path::new(volume_root), config) {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{text}"),
                    Err(e) => {
                        error!("Failed to serialize report: {e}");
                        return 2;
                    }
                }
            } else {
                print_summary(&report);
            }
            match report.health {
                ProbeHealth::Healthy => 0,
                ProbeHealth::Corrupted | ProbeHealth::Incomplete => 1,
            }
        }
        Err(e) => {
            eprintln!("[ERROR] Probe failed: {e}");
            2
        }
    }
}
