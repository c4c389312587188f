use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("volume is not ready: {}", .0.display())]
    VolumeNotReady(PathBuf),

    #[error("volume geometry yields an empty block (sectors/cluster={sectors_per_cluster}, bytes/sector={bytes_per_sector})")]
    InvalidGeometry {
        sectors_per_cluster: u64,
        bytes_per_sector: u64,
    },

    #[error("working directory {} keeps disappearing; gave up after {attempts} skipped writes", path.display())]
    WorkDirLost { path: PathBuf, attempts: u32 },

    #[error("a run is already active")]
    RunActive,

    #[error("prober lock poisoned")]
    LockPoisoned,

    #[error("worker thread panicked")]
    WorkerPanicked,
}

pub type ProbeResult<T> = Result<T, ProbeError>;
