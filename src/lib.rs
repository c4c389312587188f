mod app;
mod config;
mod core_logic;
mod error;
mod io_controller;

pub use crate::app::{RunController, print_summary, run_cli, run_probe};
pub use crate::config::{BLOCK_SCALE, ProbeConfig, VerifyPolicy, WORK_DIR_NAME};
pub use crate::core_logic::{ChunkDigest, DIGEST_LEN, ProbeHealth, RunReport};
pub use crate::error::{ProbeError, ProbeResult};
pub use crate::io_controller::{
    BlockGeometry, CancelFlag, CapacityProber, FanOutSink, LogSink, MountedVolume, ProgressSink,
    RunState, Volume,
};
