//! Per-instance data directory, log files and pid file

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::{debug, info, warn};

use crate::error::{ProcessError, Result};

/// Child stdout log
pub const STDOUT_LOG: &str = "stdout.log";
/// Child stderr log
pub const STDERR_LOG: &str = "stderr.log";
/// Decimal pid of the current child
pub const PID_FILE: &str = "process.pid";

/// Owns the data directory and the descriptors opened inside it.
///
/// `prepare()` and `destroy()` are both idempotent; the supervisor calls
/// `destroy()` only after the child exit was confirmed.
#[derive(Debug)]
pub struct ResourceManager {
    /// Fixed directory requested by the caller
    override_dir: Option<PathBuf>,
    /// Whether stdout/stderr log files are opened
    logging_enabled: bool,
    /// Directory in use (set by prepare, cleared by destroy)
    dir: Option<PathBuf>,
    stdout: Option<File>,
    stderr: Option<File>,
    pid_file: Option<File>,
}

impl ResourceManager {
    /// Create an unprepared manager
    pub fn new(override_dir: Option<PathBuf>, logging_enabled: bool) -> Self {
        Self {
            override_dir,
            logging_enabled,
            dir: None,
            stdout: None,
            stderr: None,
            pid_file: None,
        }
    }

    /// Data directory, if prepared
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Whether `prepare()` has run since the last `destroy()`
    pub fn is_prepared(&self) -> bool {
        self.pid_file.is_some()
    }

    /// Create the directory and open the files inside it.
    ///
    /// Returns the directory path. Calling it again returns the same path
    /// without touching the filesystem.
    pub fn prepare(&mut self) -> Result<PathBuf> {
        if let Some(dir) = self.dir.as_ref().filter(|_| self.is_prepared()) {
            return Ok(dir.clone());
        }

        let dir = match &self.override_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| resource_error(dir, e))?;
                dir.clone()
            }
            None => create_unique_dir(&std::env::temp_dir())?,
        };

        if self.logging_enabled {
            self.stdout = Some(open_append(&dir.join(STDOUT_LOG))?);
            self.stderr = Some(open_append(&dir.join(STDERR_LOG))?);
        }

        let pid_path = dir.join(PID_FILE);
        let pid_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&pid_path)
            .map_err(|e| resource_error(&pid_path, e))?;
        self.pid_file = Some(pid_file);

        info!(data_dir = %dir.display(), "Created data directory");
        self.dir = Some(dir.clone());
        Ok(dir)
    }

    /// Overwrite the pid file with `pid`
    pub fn write_pid(&mut self, pid: u32) -> Result<()> {
        let dir = self.dir.clone().unwrap_or_default();
        let file = self
            .pid_file
            .as_mut()
            .ok_or_else(|| resource_error(&dir, io::Error::other("data directory not prepared")))?;

        overwrite(file, pid.to_string().as_bytes())
            .map_err(|e| resource_error(&dir.join(PID_FILE), e))
    }

    /// Stdout/stderr for a child: the log files, or null sinks when logging is off
    pub fn stdio(&self) -> Result<(Stdio, Stdio)> {
        let dir = self.dir.clone().unwrap_or_default();
        let redirect = |file: &Option<File>, name: &str| -> Result<Stdio> {
            match file {
                Some(f) => f
                    .try_clone()
                    .map(Stdio::from)
                    .map_err(|e| resource_error(&dir.join(name), e)),
                None => Ok(Stdio::null()),
            }
        };

        Ok((redirect(&self.stdout, STDOUT_LOG)?, redirect(&self.stderr, STDERR_LOG)?))
    }

    /// Close descriptors and remove the directory tree.
    ///
    /// Removal failures are logged and swallowed; the internal state is
    /// cleared either way so a second call is a no-op. Returns the removed
    /// directory when removal succeeded.
    pub fn destroy(&mut self) -> Option<PathBuf> {
        // dropping the handles closes them
        self.stdout.take();
        self.stderr.take();
        self.pid_file.take();

        let dir = self.dir.take()?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(data_dir = %dir.display(), "Removed data directory");
                Some(dir)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Some(dir),
            Err(e) => {
                let err = ProcessError::Cleanup { path: dir, source: e };
                warn!(error = %err, "Data directory cleanup failed");
                None
            }
        }
    }
}

fn resource_error(path: &Path, source: io::Error) -> ProcessError {
    ProcessError::Resource {
        path: path.to_path_buf(),
        source,
    }
}

fn overwrite(file: &mut File, contents: &[u8]) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(contents)?;
    file.flush()
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| resource_error(path, e))
}

/// `portwarden_<timestamp>_<uuid>` under `parent`
fn create_unique_dir(parent: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let dir = parent.join(format!("portwarden_{}_{}", stamp, uuid::Uuid::new_v4().simple()));
    fs::create_dir(&dir).map_err(|e| resource_error(&dir, e))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_creates_layout() {
        let mut resources = ResourceManager::new(None, true);
        let dir = resources.prepare().unwrap();

        assert!(dir.is_dir());
        assert!(dir.join(STDOUT_LOG).is_file());
        assert!(dir.join(STDERR_LOG).is_file());
        assert!(dir.join(PID_FILE).is_file());
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("portwarden_"));

        resources.destroy();
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let mut resources = ResourceManager::new(None, true);
        let first = resources.prepare().unwrap();
        let second = resources.prepare().unwrap();
        assert_eq!(first, second);
        resources.destroy();
    }

    #[test]
    fn test_unique_names() {
        let parent = tempfile::tempdir().unwrap();
        let a = create_unique_dir(parent.path()).unwrap();
        let b = create_unique_dir(parent.path()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_logging_disabled_skips_log_files() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("profile");
        let mut resources = ResourceManager::new(Some(dir.clone()), false);

        assert_eq!(resources.prepare().unwrap(), dir);
        assert!(!dir.join(STDOUT_LOG).exists());
        assert!(!dir.join(STDERR_LOG).exists());
        assert!(dir.join(PID_FILE).is_file());
    }

    #[test]
    fn test_pid_file_is_overwritten() {
        let mut resources = ResourceManager::new(None, false);
        let dir = resources.prepare().unwrap();

        resources.write_pid(123456).unwrap();
        resources.write_pid(42).unwrap();
        assert_eq!(fs::read_to_string(dir.join(PID_FILE)).unwrap(), "42");

        resources.destroy();
    }

    #[test]
    fn test_write_pid_requires_prepare() {
        let mut resources = ResourceManager::new(None, true);
        assert!(matches!(
            resources.write_pid(1),
            Err(ProcessError::Resource { .. })
        ));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut resources = ResourceManager::new(None, true);
        let dir = resources.prepare().unwrap();

        assert_eq!(resources.destroy(), Some(dir.clone()));
        assert!(!dir.exists());
        assert!(!resources.is_prepared());
        assert_eq!(resources.destroy(), None);
    }

    #[test]
    fn test_destroy_without_prepare() {
        let mut resources = ResourceManager::new(None, true);
        assert_eq!(resources.destroy(), None);
    }

    #[test]
    fn test_prepare_fails_on_unwritable_parent() {
        let parent = tempfile::tempdir().unwrap();
        let blocker = parent.path().join("file");
        fs::write(&blocker, b"not a directory").unwrap();

        let mut resources = ResourceManager::new(Some(blocker.join("profile")), true);
        assert!(matches!(
            resources.prepare(),
            Err(ProcessError::Resource { .. })
        ));
    }
}
