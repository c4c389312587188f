use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::TempDir;

use super::{BlockGeometry, CancelFlag, ProgressSink, Volume};
use crate::config::ProbeConfig;

/// Config whose block size equals the cluster size, so tests can pick exact
/// chunk sizes.
pub(crate) fn scaled_config() -> ProbeConfig {
    ProbeConfig {
        block_scale: 1,
        sync_writes: false,
        ..ProbeConfig::default()
    }
}

/// A scratch directory posing as a volume with a fixed capacity. Free space
/// is the capacity minus the bytes of every file under the root.
pub(crate) struct QuotaVolume {
    _scratch: TempDir,
    root: PathBuf,
    capacity: u64,
    geometry: BlockGeometry,
}

impl QuotaVolume {
    pub(crate) fn new(capacity: u64, geometry: BlockGeometry) -> Self {
        let scratch = tempfile::tempdir().expect("create scratch volume");
        let root = scratch.path().to_path_buf();
        Self {
            _scratch: scratch,
            root,
            capacity,
            geometry,
        }
    }

    /// A volume whose root path is exactly `root_len` bytes long, built from
    /// nested directories inside the scratch dir.
    pub(crate) fn with_root_len(capacity: u64, block_size: u64, root_len: usize) -> Self {
        let mut volume = Self::with_block(capacity, block_size);
        let mut root = volume.root.as_os_str().len();
        assert!(root_len > root + 1, "scratch path already longer than {root_len}");
        while root < root_len {
            // Each component costs its length plus the separator.
            let remaining = root_len - root - 1;
            let component = if remaining <= 200 { remaining } else { 100 };
            volume.root.push("d".repeat(component));
            root = volume.root.as_os_str().len();
        }
        assert_eq!(root, root_len);
        fs::create_dir_all(&volume.root).expect("create nested volume root");
        volume
    }

    pub(crate) fn with_block(capacity: u64, block_size: u64) -> Self {
        Self::new(
            capacity,
            BlockGeometry {
                sectors_per_cluster: 1,
                bytes_per_sector: block_size,
            },
        )
    }
}

fn bytes_under(path: &Path) -> io::Result<u64> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += bytes_under(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

impl Volume for QuotaVolume {
    fn root(&self) -> &Path {
        &self.root
    }

    fn total_size(&self) -> io::Result<u64> {
        Ok(self.capacity)
    }

    fn available_space(&self) -> io::Result<u64> {
        Ok(self.capacity.saturating_sub(bytes_under(&self.root)?))
    }

    fn geometry(&self) -> io::Result<BlockGeometry> {
        Ok(self.geometry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Report(u8),
    Status(String),
    Done(bool),
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn reports(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Report(percent) => Some(percent),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Status(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, percent: u8) {
        self.events.lock().unwrap().push(SinkEvent::Report(percent));
    }

    fn status(&self, message: String) {
        self.events.lock().unwrap().push(SinkEvent::Status(message));
    }

    fn done(&self, done: bool) {
        self.events.lock().unwrap().push(SinkEvent::Done(done));
    }
}

/// Records events and deletes `dir` on the first status line, without
/// raising cancellation.
pub(crate) struct RemoveDirOnStatus {
    pub(crate) inner: RecordingSink,
    dir: PathBuf,
    fired: AtomicBool,
}

impl RemoveDirOnStatus {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            inner: RecordingSink::default(),
            dir,
            fired: AtomicBool::new(false),
        }
    }
}

impl ProgressSink for RemoveDirOnStatus {
    fn report(&self, percent: u8) {
        self.inner.report(percent);
    }

    fn status(&self, message: String) {
        self.inner.status(message);
        if !self.fired.swap(true, Ordering::SeqCst) {
            fs::remove_dir_all(&self.dir).expect("remove working directory");
        }
    }

    fn done(&self, done: bool) {
        self.inner.done(done);
    }
}

/// Records events and raises the cancel flag on the first status line.
pub(crate) struct CancelOnStatus {
    pub(crate) inner: RecordingSink,
    cancel: CancelFlag,
}

impl CancelOnStatus {
    pub(crate) fn new(cancel: CancelFlag) -> Self {
        Self {
            inner: RecordingSink::default(),
            cancel,
        }
    }
}

impl ProgressSink for CancelOnStatus {
    fn report(&self, percent: u8) {
        self.inner.report(percent);
    }

    fn status(&self, message: String) {
        self.inner.status(message);
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn done(&self, done: bool) {
        self.inner.done(done);
    }
}
