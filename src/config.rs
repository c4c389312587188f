/// Reserved name of the hidden working directory created under the volume root.
pub const WORK_DIR_NAME: &str = ".DiskProbe";

/// Multiplier applied to the cluster size to obtain the chunk size.
pub const BLOCK_SCALE: u64 = 127;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VerifyPolicy {
    /// Check every chunk and tally the mismatches.
    #[default]
    ContinueAndTally,
    /// End the verify phase at the first mismatching chunk.
    StopAtFirstMismatch,
}

#[derive(Clone, Debug)]
pub struct ProbeConfig {
    pub work_dir_name: &'static str,
    pub block_scale: u64,
    pub verify_policy: VerifyPolicy,
    pub sync_writes: bool,
    pub max_skipped_writes: u32,
    /// Fixed seed for chunk content; `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            work_dir_name: WORK_DIR_NAME,
            block_scale: BLOCK_SCALE,
            verify_policy: VerifyPolicy::default(),
            sync_writes: true,
            max_skipped_writes: 16,
            rng_seed: None,
        }
    }
}
