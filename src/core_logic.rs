use num_format::{Locale, ToFormattedString};
use rand::RngCore;
use serde::Serialize;
use sha1::{Digest, Sha1};

/// Length of a chunk digest in bytes (SHA-1).
pub const DIGEST_LEN: usize = 20;

/// Content digest of a chunk. Its lowercase hex form is the chunk's file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDigest([u8; DIGEST_LEN]);

impl ChunkDigest {
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True when `name` is exactly the lowercase hex encoding of this digest.
    pub fn matches_name(&self, name: &str) -> bool {
        self.to_hex() == name
    }
}

pub fn fill_chunk<R: RngCore>(rng: &mut R, buffer: &mut [u8]) {
    rng.fill_bytes(buffer);
}

/// Size of the next chunk: the full block, or exactly what is left when the
/// volume has less than a block free.
pub fn next_chunk_len(block_size: u64, available: u64) -> u64 {
    block_size.min(available)
}

/// Share of the volume in use, floored to a whole percent.
pub fn used_percent(total: u64, available: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let used = total.saturating_sub(available) as u128;
    (used * 100 / total as u128).min(100) as u8
}

pub fn position_percent(position: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((position as u128 * 100) / total as u128).min(100) as u8
}

pub fn format_count(value: u64) -> String {
    value.to_formatted_string(&Locale::en)
}

pub fn fill_status_line(used: u64, total: u64) -> String {
    format!(
        "{} / {} bytes filled.",
        format_count(used),
        format_count(total)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeHealth {
    Healthy,
    Corrupted,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub total_size: u64,
    pub bytes_filled: u64,
    pub chunks_written: u64,
    pub total_chunks: u64,
    pub checked_chunks: u64,
    pub bad_chunks: u64,
    pub bad_bytes: u64,
    pub cancelled: bool,
    pub health: ProbeHealth,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillOutcome {
    pub total_size: u64,
    pub bytes_filled: u64,
    pub chunks_written: u64,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyTally {
    pub total_chunks: u64,
    pub checked_chunks: u64,
    pub bad_chunks: u64,
    pub bad_bytes: u64,
    pub cancelled: bool,
}

pub fn generate_report(fill: FillOutcome, tally: VerifyTally) -> RunReport {
    let cancelled = fill.cancelled || tally.cancelled;
    // A detected mismatch outranks an incomplete run.
    let health = if tally.bad_chunks > 0 {
        ProbeHealth::Corrupted
    } else if cancelled {
        ProbeHealth::Incomplete
    } else {
        ProbeHealth::Healthy
    };

    RunReport {
        total_size: fill.total_size,
        bytes_filled: fill.bytes_filled,
        chunks_written: fill.chunks_written,
        total_chunks: tally.total_chunks,
        checked_chunks: tally.checked_chunks,
        bad_chunks: tally.bad_chunks,
        bad_bytes: tally.bad_bytes,
        cancelled,
        health,
    }
}

/// Closing lines of the verify phase, in emission order.
pub fn summary_lines(tally: &VerifyTally) -> Vec<String> {
    let mut lines = vec![
        format!("Total chunks {}.", tally.total_chunks),
        format!("Total bad chunks {}.", tally.bad_chunks),
    ];
    if tally.bad_chunks > 0 {
        lines.push(format!("~ {} bytes lost.", format_count(tally.bad_bytes)));
    }
    lines
}
