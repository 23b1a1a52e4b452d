//! Inter-process queue lock around batch execution.
//!
//! Batches sharing a lock file run one at a time: a second `recap run` blocks
//! in [`QueueLock::acquire`] until the first one drops its guard.

use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct QueueLock;

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct QueueLockGuard {
    file: File,
    path: PathBuf,
}

impl QueueLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open lock file {}", path.display()))
}

fn write_pid(file: &mut File) -> anyhow::Result<()> {
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()?;
    Ok(())
}

#[cfg(unix)]
mod sys {
    use nix::errno::Errno;
    use nix::fcntl::{flock, FlockArg};
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    pub fn lock(file: &File) -> anyhow::Result<()> {
        loop {
            match flock(file.as_raw_fd(), FlockArg::LockExclusive) {
                Ok(()) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(anyhow::anyhow!("flock failed: {e}")),
            }
        }
    }

    pub fn try_lock(file: &File) -> anyhow::Result<bool> {
        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => Ok(true),
            Err(Errno::EWOULDBLOCK) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("flock failed: {e}")),
        }
    }

    pub fn unlock(file: &File) {
        let _ = flock(file.as_raw_fd(), FlockArg::Unlock);
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;

    pub fn lock(_file: &File) -> anyhow::Result<()> {
        tracing::warn!("queue lock is not enforced on this platform");
        Ok(())
    }

    pub fn try_lock(_file: &File) -> anyhow::Result<bool> {
        Ok(true)
    }

    pub fn unlock(_file: &File) {}
}

impl QueueLock {
    /// Block until the lock at `path` is free, then take it.
    pub fn acquire(path: &Path) -> anyhow::Result<QueueLockGuard> {
        let mut file = open_lock_file(path)?;
        if !sys::try_lock(&file)? {
            tracing::info!(lock = %path.display(), "waiting for another batch to finish");
            sys::lock(&file)?;
        }
        write_pid(&mut file)?;
        tracing::debug!(lock = %path.display(), "queue lock acquired");
        Ok(QueueLockGuard {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock if it is free; `None` when another holder has it.
    pub fn try_acquire(path: &Path) -> anyhow::Result<Option<QueueLockGuard>> {
        let mut file = open_lock_file(path)?;
        if !sys::try_lock(&file)? {
            return Ok(None);
        }
        write_pid(&mut file)?;
        Ok(Some(QueueLockGuard {
            file,
            path: path.to_path_buf(),
        }))
    }
}

impl Drop for QueueLockGuard {
    fn drop(&mut self) {
        sys::unlock(&self.file);
        tracing::debug!(lock = %self.path.display(), "queue lock released");
    }
}
