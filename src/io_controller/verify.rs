use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::VerifyPolicy;
use crate::core_logic::{self, ChunkDigest, VerifyTally};
use crate::error::ProbeResult;

use super::durable::read_chunk;
use super::progress::{ProgressSink, should_cancel, speed_mbps};

struct ChunkEntry {
    path: PathBuf,
    name: String,
}

impl super::CapacityProber {
    /// Regular files of the working directory, ordered by name.
    fn list_chunks(&self) -> std::io::Result<Vec<ChunkEntry>> {
        let mut chunks = Vec::new();
        for entry in fs::read_dir(&self.work_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            chunks.push(ChunkEntry {
                path: entry.path(),
                name: entry.file_name().to_string_lossy().into_owned(),
            });
        }
        chunks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(chunks)
    }

    /// Re-reads every chunk and compares its digest with its name.
    pub(super) fn run_verify_phase(
        &self,
        cancel: &AtomicBool,
        sink: &dyn ProgressSink,
    ) -> ProbeResult<VerifyTally> {
        let chunks = match self.list_chunks() {
            Ok(chunks) => chunks,
            Err(e) if e.kind() == ErrorKind::NotFound && should_cancel(cancel) => {
                return Ok(VerifyTally {
                    cancelled: true,
                    ..VerifyTally::default()
                });
            }
            Err(e) => return Err(e.into()),
        };

        let total = chunks.len();
        let mut tally = VerifyTally {
            total_chunks: total as u64,
            ..VerifyTally::default()
        };
        let mut bytes_read = 0u64;
        let start_time = Instant::now();

        info!("Verify phase start. Chunks={total}");

        for (index, chunk) in chunks.iter().enumerate() {
            if should_cancel(cancel) {
                tally.cancelled = true;
                break;
            }
            let position = index + 1;

            let bad_len = match read_chunk(&chunk.path) {
                Ok(data) => {
                    tally.checked_chunks += 1;
                    bytes_read += data.len() as u64;
                    if ChunkDigest::of(&data).matches_name(&chunk.name) {
                        sink.report(core_logic::position_percent(position, total));
                        sink.status(format!("{position} / {total} chunk check OK."));
                        continue;
                    }
                    data.len() as u64
                }
                Err(_) if should_cancel(cancel) => {
                    tally.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!("Read failed for chunk {}: {e}", chunk.name);
                    tally.checked_chunks += 1;
                    fs::metadata(&chunk.path).map(|meta| meta.len()).unwrap_or(0)
                }
            };

            tally.bad_chunks += 1;
            tally.bad_bytes += bad_len;
            if tally.bad_chunks <= 5 {
                warn!("Mismatch in chunk {} ({bad_len} bytes).", chunk.name);
            }
            sink.status(format!("{position} chunk check failed."));

            if self.config.verify_policy == VerifyPolicy::StopAtFirstMismatch {
                sink.status("Verification stopped at first bad chunk.".to_string());
                break;
            }
        }

        for line in core_logic::summary_lines(&tally) {
            sink.status(line);
        }

        info!(
            "Verify phase {}: {}/{} chunks checked, {} bad, {:.2} MB/s",
            if tally.cancelled { "cancelled" } else { "complete" },
            tally.checked_chunks,
            tally.total_chunks,
            tally.bad_chunks,
            speed_mbps(bytes_read, start_time)
        );

        Ok(tally)
    }
}
