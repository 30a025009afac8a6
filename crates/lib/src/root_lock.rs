//! Cross-process lock on a spackle root.
//!
//! `install` holds `<root>/.lock` exclusively while it rewrites the database
//! and install prefixes, and records its request in the file so a blocked
//! command can say what it is waiting on. Read-only commands such as `find`
//! share the lock: they never see a half-written database, and an install
//! never starts underneath them.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::platform::paths::root_dir;
use crate::spec::AbstractSpec;

const LOCK_FILENAME: &str = ".lock";

/// The install currently holding a root, as recorded in its lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub pid: u32,
  pub since_unix: u64,
  /// Requested specs as the user wrote them.
  pub specs: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub environment: Option<String>,
}

impl fmt::Display for LockHolder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "install")?;
    if let Some(env) = &self.environment {
      write!(f, " -e {}", env)?;
    }
    for spec in &self.specs {
      write!(f, " {}", spec)?;
    }
    let running = unix_now().saturating_sub(self.since_unix);
    write!(f, " (pid {}, running for {}s)", self.pid, running)
  }
}

#[derive(Debug, Error)]
pub enum RootLockError {
  #[error(
    "{root} is locked by `{holder}`\n\
     If no spackle process is running, remove the lock file:\n  {lock_path}"
  )]
  Installing {
    root: String,
    holder: LockHolder,
    lock_path: PathBuf,
  },

  /// Held without a recorded install: shared readers, or an install that has
  /// not written its request yet.
  #[error("{root} is in use by another spackle process; try again when it exits")]
  Busy { root: String },

  #[error("failed to open lock file {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to record install request in {path}: {source}")]
  Record {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock {path}: {source}")]
  Lock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
  Shared,
  Exclusive,
}

/// A held root lock; released when dropped.
#[derive(Debug)]
pub struct RootLock {
  file: File,
  path: PathBuf,
  mode: Mode,
}

impl RootLock {
  /// Exclusive lock for an install of `specs`, optionally into `environment`.
  pub fn for_install(root: &Path, specs: &[AbstractSpec], environment: Option<&str>) -> Result<Self, RootLockError> {
    let lock = Self::open(root, Mode::Exclusive)?;
    let holder = LockHolder {
      pid: std::process::id(),
      since_unix: unix_now(),
      specs: specs.iter().map(ToString::to_string).collect(),
      environment: environment.map(String::from),
    };
    lock.record(&holder).map_err(|source| RootLockError::Record {
      path: lock.path.clone(),
      source,
    })?;
    debug!(path = %lock.path.display(), specs = holder.specs.len(), "locked root for install");
    Ok(lock)
  }

  /// Shared lock for commands that only read the database.
  pub fn for_query(root: &Path) -> Result<Self, RootLockError> {
    let lock = Self::open(root, Mode::Shared)?;
    debug!(path = %lock.path.display(), "locked root for reading");
    Ok(lock)
  }

  /// Shared lock on the configured root (`$SPACKLE_ROOT` or the data
  /// directory).
  pub fn for_query_default() -> Result<Self, RootLockError> {
    Self::for_query(&root_dir())
  }

  /// The recorded install request, if this is an install lock. Read through
  /// the held handle since Windows locks are mandatory.
  pub fn holder(&self) -> io::Result<Option<LockHolder>> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    if contents.trim().is_empty() {
      return Ok(None);
    }
    serde_json::from_str(&contents).map(Some).map_err(io::Error::other)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn open(root: &Path, mode: Mode) -> Result<Self, RootLockError> {
    let path = root.join(LOCK_FILENAME);
    let open_err = |source| RootLockError::Open {
      path: path.clone(),
      source,
    };
    std::fs::create_dir_all(root).map_err(open_err)?;
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&path)
      .map_err(open_err)?;

    match try_lock(&file, mode) {
      Ok(()) => Ok(RootLock { file, path, mode }),
      Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(contention(root, &path)),
      Err(source) => Err(RootLockError::Lock { path, source }),
    }
  }

  fn record(&self, holder: &LockHolder) -> io::Result<()> {
    self.file.set_len(0)?;
    let mut writer = io::BufWriter::new(&self.file);
    serde_json::to_writer_pretty(&mut writer, holder).map_err(io::Error::other)?;
    writer.flush()
  }
}

impl Drop for RootLock {
  fn drop(&mut self) {
    // a finished install must not be reported as a holder later
    if self.mode == Mode::Exclusive
      && let Err(err) = self.file.set_len(0)
    {
      warn!(path = %self.path.display(), error = %err, "failed to clear lock file");
    }
  }
}

fn contention(root: &Path, lock_path: &Path) -> RootLockError {
  let holder = std::fs::read_to_string(lock_path)
    .ok()
    .and_then(|contents| serde_json::from_str::<LockHolder>(&contents).ok());
  let root = root.display().to_string();
  match holder {
    Some(holder) => RootLockError::Installing {
      root,
      holder,
      lock_path: lock_path.to_path_buf(),
    },
    None => RootLockError::Busy { root },
  }
}

fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or_default()
}

#[cfg(unix)]
fn try_lock(file: &File, mode: Mode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    Mode::Shared => FlockOperation::NonBlockingLockShared,
    Mode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };
  flock(file.as_fd(), operation).map_err(io::Error::from)
}

#[cfg(windows)]
fn try_lock(file: &File, mode: Mode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let mut flags = LOCKFILE_FAIL_IMMEDIATELY;
  if mode == Mode::Exclusive {
    flags |= LOCKFILE_EXCLUSIVE_LOCK;
  }

  // SAFETY: the handle stays open for the call and a zeroed OVERLAPPED is valid.
  let locked = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(file.as_raw_handle() as HANDLE, flags, 0, 1, 0, &mut overlapped)
  };
  if locked != 0 {
    return Ok(());
  }
  let err = io::Error::last_os_error();
  if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
    return Err(io::Error::from(io::ErrorKind::WouldBlock));
  }
  Err(err)
}
