use std::io;
use std::path::{Path, PathBuf};

/// Allocation geometry of a volume, used only to derive the chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    pub sectors_per_cluster: u64,
    pub bytes_per_sector: u64,
}

const NOMINAL_SECTOR: u64 = 512;

impl BlockGeometry {
    /// Splits a cluster size into 512-byte sectors when it divides evenly,
    /// otherwise treats the whole cluster as one sector.
    pub fn from_cluster_size(cluster: u64) -> Self {
        if cluster >= NOMINAL_SECTOR && cluster % NOMINAL_SECTOR == 0 {
            Self {
                sectors_per_cluster: cluster / NOMINAL_SECTOR,
                bytes_per_sector: NOMINAL_SECTOR,
            }
        } else {
            Self {
                sectors_per_cluster: 1,
                bytes_per_sector: cluster,
            }
        }
    }

    pub fn cluster_size(&self) -> u64 {
        self.sectors_per_cluster.saturating_mul(self.bytes_per_sector)
    }

    pub fn block_size(&self, scale: u64) -> u64 {
        self.cluster_size().saturating_mul(scale)
    }
}

/// The storage target of a run. Free space is queried live on every call.
pub trait Volume: Send + Sync {
    fn root(&self) -> &Path;
    fn total_size(&self) -> io::Result<u64>;
    fn available_space(&self) -> io::Result<u64>;
    fn geometry(&self) -> io::Result<BlockGeometry>;

    fn is_ready(&self) -> bool {
        self.root().is_dir()
    }
}

/// A mounted filesystem addressed by its root directory.
#[derive(Debug, Clone)]
pub struct MountedVolume {
    root: PathBuf,
}

impl MountedVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Volume for MountedVolume {
    fn root(&self) -> &Path {
        &self.root
    }

    fn total_size(&self) -> io::Result<u64> {
        let stats = fs_stats(&self.root)?;
        Ok(stats.blocks.saturating_mul(stats.fragment_size))
    }

    fn available_space(&self) -> io::Result<u64> {
        let stats = fs_stats(&self.root)?;
        Ok(stats.blocks_available.saturating_mul(stats.fragment_size))
    }

    fn geometry(&self) -> io::Result<BlockGeometry> {
        let stats = fs_stats(&self.root)?;
        Ok(BlockGeometry::from_cluster_size(stats.fragment_size))
    }
}

struct FsStats {
    fragment_size: u64,
    blocks: u64,
    blocks_available: u64,
}

#[cfg(unix)]
fn fs_stats(path: &Path) -> io::Result<FsStats> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "Volume path contains a NUL byte.")
    })?;

    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let stat = unsafe { stat.assume_init() };

    let fragment_size = if stat.f_frsize > 0 {
        stat.f_frsize as u64
    } else {
        stat.f_bsize as u64
    };

    Ok(FsStats {
        fragment_size,
        blocks: stat.f_blocks as u64,
        blocks_available: stat.f_bavail as u64,
    })
}

#[cfg(not(unix))]
fn fs_stats(_path: &Path) -> io::Result<FsStats> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Volume statistics are only available on unix targets.",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_from_cluster() {
        let geometry = BlockGeometry::from_cluster_size(4096);
        assert_eq!(geometry.sectors_per_cluster, 8);
        assert_eq!(geometry.bytes_per_sector, 512);
        assert_eq!(geometry.block_size(127), 4096 * 127);

        let odd = BlockGeometry::from_cluster_size(100);
        assert_eq!(odd.sectors_per_cluster, 1);
        assert_eq!(odd.cluster_size(), 100);
        assert_eq!(BlockGeometry::from_cluster_size(0).block_size(127), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_mounted_volume_reports_space() {
        let dir = tempfile::tempdir().unwrap();
        let volume = MountedVolume::new(dir.path());
        assert!(volume.is_ready());
        let total = volume.total_size().unwrap();
        let available = volume.available_space().unwrap();
        assert!(total > 0);
        assert!(available <= total);
        assert!(volume.geometry().unwrap().cluster_size() > 0);
    }

    #[test]
    fn test_missing_root_is_not_ready() {
        let volume = MountedVolume::new("/nonexistent/diskprobe-volume");
        assert!(!volume.is_ready());
        assert!(volume.available_space().is_err());
    }
}
