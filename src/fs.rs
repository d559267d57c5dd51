//! File identity probing.  A FileInfo snapshot is the only thing used to tell
//! whether an artifact changed; file contents are never hashed.

use std::path::Path;

/// Modification time as seconds + nanoseconds since the epoch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FileTimestamp {
    pub seconds: u64,
    pub nanoseconds: u64,
}

/// The attributes of a present file that participate in staleness checks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FileStat {
    pub device: u64,
    pub inode: u64,
    pub mode: u64,
    pub size: u64,
    pub mtime: FileTimestamp,
}

/// Identity info gathered for a file.  This also models "file is absent".
/// It's not using an Option<> just because it makes the code using it easier
/// to follow.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FileInfo {
    Missing,
    Present(FileStat),
}

impl FileInfo {
    pub fn is_missing(&self) -> bool {
        matches!(self, FileInfo::Missing)
    }
}

impl Default for FileInfo {
    fn default() -> Self {
        FileInfo::Missing
    }
}

pub trait FileSystem: Send + Sync {
    fn read(&self, path: &str) -> std::io::Result<Vec<u8>>;
    /// stat() an on-disk path, producing its FileInfo.  Never fails: anything
    /// that can't be stat()ed is reported as missing.
    fn file_info(&self, path: &str) -> FileInfo;
    fn create_dir_all(&self, path: &str) -> std::io::Result<()>;
}

#[derive(Default)]
pub struct RealFileSystem {}
impl RealFileSystem {
    pub fn new() -> Self {
        RealFileSystem {}
    }
}

#[cfg(unix)]
fn stat_from_metadata(meta: &std::fs::Metadata) -> FileStat {
    use std::os::unix::fs::MetadataExt;
    FileStat {
        device: meta.dev(),
        inode: meta.ino(),
        mode: meta.mode() as u64,
        size: meta.size(),
        mtime: FileTimestamp {
            seconds: meta.mtime() as u64,
            nanoseconds: meta.mtime_nsec() as u64,
        },
    }
}

#[cfg(not(unix))]
fn stat_from_metadata(meta: &std::fs::Metadata) -> FileStat {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| FileTimestamp {
            seconds: d.as_secs(),
            nanoseconds: d.subsec_nanos() as u64,
        })
        .unwrap_or_default();
    FileStat {
        device: 0,
        inode: 0,
        mode: meta.is_dir() as u64,
        size: meta.len(),
        mtime,
    }
}

impl FileSystem for RealFileSystem {
    fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn file_info(&self, path: &str) -> FileInfo {
        match std::fs::metadata(path) {
            Ok(meta) => FileInfo::Present(stat_from_metadata(&meta)),
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("stat {}: {}", path, err);
                }
                FileInfo::Missing
            }
        }
    }

    fn create_dir_all(&self, path: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(Path::new(path))
    }
}
