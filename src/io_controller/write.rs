use std::fs;
use std::io::{self, ErrorKind};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::core_logic::{self, ChunkDigest, FillOutcome};
use crate::error::{ProbeError, ProbeResult};

use super::durable::write_chunk;
use super::progress::{ProgressSink, should_cancel, speed_mbps};

enum WriteStep {
    Written(u64),
    Skipped,
    StorageFull,
}

/// Failures that mean the working directory went away under us, or the
/// chunk path cannot exist, rather than that the device misbehaved.
fn is_recoverable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::InvalidInput | ErrorKind::InvalidFilename
    )
}

impl super::CapacityProber {
    /// Writes chunks until the volume reports no free space or `cancel` is
    /// raised. Free space is re-queried on every iteration.
    pub(super) fn run_fill_phase(
        &self,
        cancel: &AtomicBool,
        sink: &dyn ProgressSink,
    ) -> ProbeResult<FillOutcome> {
        let total_size = self.volume.total_size()?;
        let mut outcome = FillOutcome {
            total_size,
            ..FillOutcome::default()
        };

        {
            let _guard = self.lock_fs()?;
            if should_cancel(cancel) {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            fs::create_dir_all(&self.work_dir)?;
        }

        let block_size = self.block_size()?;
        let buffer_len = usize::try_from(block_size).map_err(|_| {
            io::Error::new(ErrorKind::InvalidInput, "Block size exceeds addressable memory.")
        })?;
        let mut buffer = vec![0u8; buffer_len];
        let mut rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut skipped_writes = 0u32;
        let start_time = Instant::now();

        info!(
            "Fill phase start. Target={}, BlockSize={}, Total={}",
            self.work_dir.display(),
            block_size,
            total_size
        );

        loop {
            let step = {
                let _guard = self.lock_fs()?;
                if should_cancel(cancel) {
                    outcome.cancelled = true;
                    break;
                }

                let available = self.volume.available_space()?;
                if available == 0 {
                    break;
                }

                let chunk_len = core_logic::next_chunk_len(block_size, available) as usize;
                let chunk = &mut buffer[..chunk_len];
                core_logic::fill_chunk(&mut rng, chunk);
                let name = ChunkDigest::of(chunk).to_hex();
                let path = self.work_dir.join(&name);

                match write_chunk(&path, chunk, self.config.sync_writes) {
                    Ok(()) => WriteStep::Written(chunk_len as u64),
                    Err(e) if e.kind() == ErrorKind::StorageFull => {
                        // Reported free space included blocks the filesystem
                        // needed for its own metadata.
                        if let Err(remove_err) = fs::remove_file(&path) {
                            debug!("Partial chunk {name} not removed: {remove_err}");
                        }
                        WriteStep::StorageFull
                    }
                    Err(e) if is_recoverable(&e) => {
                        warn!("Chunk {name} not written: {e}");
                        WriteStep::Skipped
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            match step {
                WriteStep::Written(len) => {
                    skipped_writes = 0;
                    outcome.chunks_written += 1;
                    outcome.bytes_filled += len;
                }
                WriteStep::Skipped => {
                    skipped_writes += 1;
                    if skipped_writes >= self.config.max_skipped_writes {
                        return Err(ProbeError::WorkDirLost {
                            path: self.work_dir.clone(),
                            attempts: skipped_writes,
                        });
                    }
                }
                WriteStep::StorageFull => {
                    info!("Write stopped: storage full.");
                    break;
                }
            }

            let available = self.volume.available_space()?;
            let used = total_size.saturating_sub(available);
            sink.report(core_logic::used_percent(total_size, available));
            sink.status(core_logic::fill_status_line(used, total_size));
        }

        let duration = start_time.elapsed();
        info!(
            "Fill phase {}: {} chunks, {} bytes, {:.2}s, {:.2} MB/s",
            if outcome.cancelled { "cancelled" } else { "complete" },
            outcome.chunks_written,
            outcome.bytes_filled,
            duration.as_secs_f64(),
            speed_mbps(outcome.bytes_filled, start_time)
        );

        Ok(outcome)
    }
}
