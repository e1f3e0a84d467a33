//! Size-capped append-only log file.
//!
//! The file is appended to until it grows past `max_size` bytes, at which point
//! it is renamed to `<file>.old` (replacing any previous one) and a fresh file is
//! started. Only one generation is kept.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Default rotation threshold in bytes.
pub const DEFAULT_MAX_LOG_SIZE: u64 = 128 * 1024;

/// Suffix appended to the rotated file name.
pub const ROTATED_SUFFIX: &str = ".old";

/// Append-only writer that rotates its file once it exceeds a size threshold.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    rotated_path: PathBuf,
    max_size: u64,
    file: File,
    size: u64,
}

impl RotatingFile {
    /// Open (or create) `path` for appending.
    ///
    /// The current on-disk size is picked up so that several short-lived
    /// processes sharing one log file still rotate at the same threshold.
    pub fn open(path: impl AsRef<Path>, max_size: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            rotated_path: rotated_path(&path),
            path,
            max_size,
            file,
            size,
        })
    }

    /// Path of the live log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the live file is renamed to on rotation.
    pub fn rotated_path(&self) -> &Path {
        &self.rotated_path
    }

    fn rotate_if_needed(&mut self) {
        if self.size <= self.max_size {
            return;
        }

        // The tracing pipeline is the thing being written, so failures here can
        // only be reported on stderr.
        if let Err(e) = std::fs::rename(&self.path, &self.rotated_path) {
            eprintln!("WARNING: Cannot rotate {} - {}", self.path.display(), e);
            return;
        }

        match open_append(&self.path) {
            Ok(file) => {
                self.file = file;
                self.size = 0;
            }
            Err(e) => {
                eprintln!("WARNING: Cannot open {} - {}", self.path.display(), e);
            }
        }
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rotate_if_needed();
        let n = self.file.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(ROTATED_SUFFIX);
    PathBuf::from(name)
}
