//! Where a query's output lands.
//!
//! Report and scan resolution both read directory state, so two queries that
//! share a directory can see each other's files. `Isolated` gives every run a
//! private subdirectory; `Shared` keeps the flat layout and holds an exclusive
//! lock file for the duration of the run. A lock left behind by a process
//! that no longer exists is taken over.
use crate::util::now_epoch_ms;
use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const RUNS_DIR: &str = "runs";
pub const LOCK_FILE: &str = ".cryo-query.lock";

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    #[default]
    Isolated,
    Shared,
}

/// Output directory for one run. Holds the lock (if any) until dropped.
#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
    layout: OutputLayout,
    _lock: Option<DirLock>,
}

impl RunDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove a per-run directory that the run left empty. Shared data
    /// directories and directories with any content are kept.
    pub fn discard_if_empty(&self) {
        if self.layout != OutputLayout::Isolated {
            return;
        }
        let is_empty = fs::read_dir(&self.path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            return;
        }
        match fs::remove_dir(&self.path) {
            Ok(()) => tracing::debug!(run_dir = %self.path.display(), "removed empty run dir"),
            Err(err) => tracing::warn!(
                run_dir = %self.path.display(),
                %err,
                "failed to remove empty run dir"
            ),
        }
    }
}

pub fn prepare_run_dir(data_dir: &Path, layout: OutputLayout) -> Result<RunDir> {
    match layout {
        OutputLayout::Isolated => {
            let path = data_dir.join(RUNS_DIR).join(next_run_id()?);
            fs::create_dir_all(&path)
                .with_context(|| format!("create run dir {}", path.display()))?;
            Ok(RunDir {
                path,
                layout,
                _lock: None,
            })
        }
        OutputLayout::Shared => {
            fs::create_dir_all(data_dir)
                .with_context(|| format!("create data dir {}", data_dir.display()))?;
            let lock = DirLock::acquire(data_dir)?;
            Ok(RunDir {
                path: data_dir.to_path_buf(),
                layout,
                _lock: Some(lock),
            })
        }
    }
}

/// `<epoch_ms>-<pid>-<sequence>`; unique across processes and within one.
pub fn next_run_id() -> Result<String> {
    let sequence = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    Ok(format!(
        "{}-{}-{}",
        now_epoch_ms()?,
        std::process::id(),
        sequence
    ))
}

/// Exclusive lock file, removed on drop.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
}

impl DirLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        match Self::create(&path)? {
            Some(lock) => Ok(lock),
            None => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                let holder = holder.trim();
                let stale_pid = holder.parse::<u32>().ok().filter(|pid| !process_alive(*pid));
                let Some(pid) = stale_pid else {
                    return Err(anyhow!(
                        "output directory {} is busy (lock {} held by pid {})",
                        dir.display(),
                        path.display(),
                        holder
                    ));
                };
                tracing::warn!(lock = %path.display(), pid, "taking over stale output lock");
                fs::remove_file(&path)
                    .with_context(|| format!("remove stale lock {}", path.display()))?;
                Self::create(&path)?.ok_or_else(|| {
                    anyhow!(
                        "output directory {} is busy (lock {} re-taken by another run)",
                        dir.display(),
                        path.display()
                    )
                })
            }
        }
    }

    /// `None` when the lock file already exists.
    fn create(path: &Path) -> Result<Option<Self>> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("create lock {}", path.display()));
            }
        };
        write!(file, "{}", std::process::id())
            .with_context(|| format!("write lock {}", path.display()))?;
        Ok(Some(Self {
            path: path.to_path_buf(),
        }))
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return true;
    }
    // SAFETY: signal 0 only checks that the pid exists and may be signalled.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), %err, "failed to release output lock");
        }
    }
}
