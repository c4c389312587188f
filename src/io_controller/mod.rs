mod durable;
mod progress;
mod verify;
mod volume;
mod write;

#[cfg(test)]
pub(crate) mod testing;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::config::ProbeConfig;
use crate::core_logic::{self, RunReport, VerifyTally};
use crate::error::{ProbeError, ProbeResult};

pub use progress::{CancelFlag, FanOutSink, LogSink, ProgressSink};
pub use volume::{BlockGeometry, MountedVolume, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Filling,
    Verifying,
    Cancelled,
    Completed,
    Failed,
}

/// Fills a volume with content-addressed chunks and verifies them.
///
/// One prober serves one run at a time; callers must not start `run` twice
/// concurrently. The working directory is touched by the worker and by
/// [`CapacityProber::stop`] only while holding `fs_lock`.
pub struct CapacityProber {
    volume: Arc<dyn Volume>,
    config: ProbeConfig,
    work_dir: PathBuf,
    fs_lock: Mutex<()>,
    state: Mutex<RunState>,
}

impl CapacityProber {
    pub fn new(volume: Arc<dyn Volume>) -> Self {
        Self::with_config(volume, ProbeConfig::default())
    }

    pub fn with_config(volume: Arc<dyn Volume>, config: ProbeConfig) -> Self {
        let work_dir = volume.root().join(config.work_dir_name);
        Self {
            volume,
            config,
            work_dir,
            fs_lock: Mutex::new(()),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn volume(&self) -> &dyn Volume {
        self.volume.as_ref()
    }

    pub fn state(&self) -> RunState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: RunState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn lock_fs(&self) -> ProbeResult<MutexGuard<'_, ()>> {
        self.fs_lock.lock().map_err(|_| ProbeError::LockPoisoned)
    }

    /// Chunk size for this volume, queried once per run.
    pub fn block_size(&self) -> ProbeResult<u64> {
        let geometry = self.volume.geometry()?;
        let block_size = geometry.block_size(self.config.block_scale);
        if block_size == 0 {
            return Err(ProbeError::InvalidGeometry {
                sectors_per_cluster: geometry.sectors_per_cluster,
                bytes_per_sector: geometry.bytes_per_sector,
            });
        }
        Ok(block_size)
    }

    /// Runs fill, verify and cleanup on the calling thread. The sink always
    /// receives exactly one `done(false)` at the end, and a
    /// `"Run failed: ..."` status before it when the run fails.
    pub fn run(&self, cancel: &AtomicBool, sink: &dyn ProgressSink) -> ProbeResult<RunReport> {
        let result = self.run_phases(cancel, sink);
        if let Err(e) = self.remove_work_dir() {
            warn!("Cleanup skipped: {e}");
        }

        match &result {
            Ok(report) if report.cancelled => {
                info!(chunks = report.chunks_written, "Run cancelled.");
                self.set_state(RunState::Cancelled);
            }
            Ok(report) => {
                info!(
                    total_chunks = report.total_chunks,
                    bad_chunks = report.bad_chunks,
                    health = ?report.health,
                    "Run complete."
                );
                self.set_state(RunState::Completed);
            }
            Err(e) => {
                error!("Run failed: {e}");
                sink.status(format!("Run failed: {e}"));
                self.set_state(RunState::Failed);
            }
        }
        sink.done(false);
        result
    }

    fn run_phases(&self, cancel: &AtomicBool, sink: &dyn ProgressSink) -> ProbeResult<RunReport> {
        if !self.volume.is_ready() {
            return Err(ProbeError::VolumeNotReady(self.volume.root().to_path_buf()));
        }

        self.set_state(RunState::Filling);
        let fill = self.run_fill_phase(cancel, sink)?;

        let tally = if fill.cancelled {
            VerifyTally {
                cancelled: true,
                ..VerifyTally::default()
            }
        } else {
            self.set_state(RunState::Verifying);
            self.run_verify_phase(cancel, sink)?
        };

        Ok(core_logic::generate_report(fill, tally))
    }

    /// Requests cancellation and removes the working directory right away.
    /// Waits for an in-flight chunk write to finish but not for the worker
    /// to notice the flag. Safe to call when nothing is running.
    pub fn stop(&self, cancel: &AtomicBool) {
        cancel.store(true, Ordering::SeqCst);
        if let Err(e) = self.remove_work_dir() {
            warn!("Eager cleanup skipped: {e}");
        }
    }

    /// Deletes the working directory under the filesystem lock. Returns
    /// whether a directory was removed; a failed delete is logged, not retried.
    fn remove_work_dir(&self) -> ProbeResult<bool> {
        let _guard = self.lock_fs()?;
        if !self.work_dir.exists() {
            return Ok(false);
        }
        match fs::remove_dir_all(&self.work_dir) {
            Ok(()) => {
                debug!(path = %self.work_dir.display(), "Working directory removed.");
                Ok(true)
            }
            Err(e) => {
                warn!(path = %self.work_dir.display(), "Failed to remove working directory: {e}");
                Ok(false)
            }
        }
    }
}
