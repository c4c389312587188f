use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

/// Writes one chunk file. With `sync` the data is flushed to the device and
/// dropped from the page cache, so a later read has to come from the media.
pub(super) fn write_chunk(path: &Path, data: &[u8], sync: bool) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    if sync {
        file.sync_data()?;
        evict_cached_pages(&file);
    }
    Ok(())
}

pub(super) fn read_chunk(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    evict_cached_pages(&file);
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(target_os = "linux")]
fn evict_cached_pages(file: &File) {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_DONTNEED) };
    if rc != 0 {
        tracing::debug!(rc, "posix_fadvise(DONTNEED) failed; read may be served from cache");
    }
}

#[cfg(not(target_os = "linux"))]
fn evict_cached_pages(_file: &File) {}
