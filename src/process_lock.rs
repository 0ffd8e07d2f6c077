/// Process Lock Module
///
/// Prevents multiple instances of the pipeline from running simultaneously
/// using file-based locking.
///
/// **Implementation:**
/// - Uses fslock for advisory file locking (cross-platform)
/// - Lock file: `data/.dln-indexer.lock`
/// - RAII pattern: Lock held for entire process lifetime, automatically released on drop
/// - OS automatically releases lock if process crashes (no stale locks)
use crate::logger::{self, LogTag};
use fslock::LockFile;
use std::path::PathBuf;

/// Process lock guard - holds file lock for the process lifetime.
///
/// The lock is automatically released when this struct is dropped (RAII
/// pattern). If the process crashes, the OS automatically releases the lock.
pub struct ProcessLock {
    _lock: LockFile,
    lock_path: PathBuf,
}

impl ProcessLock {
    /// Acquire the process lock.
    ///
    /// Returns an error if another instance is already running or if the
    /// lock file cannot be created.
    pub fn acquire() -> Result<Self, String> {
        let lock_path = PathBuf::from("data/.dln-indexer.lock");

        logger::info(LogTag::System, &format!("acquiring process lock: {:?}", lock_path));

        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| format!("failed to create lock file directory: {}", e))?;
            }
        }

        let mut lock = LockFile::open(&lock_path).map_err(|e| {
            format!(
                "failed to open lock file {:?}: {}\nHint: check directory permissions for the 'data/' folder",
                lock_path, e
            )
        })?;

        if !lock
            .try_lock()
            .map_err(|e| format!("failed to acquire lock on {:?}: {}", lock_path, e))?
        {
            return Err(format!(
                "another instance of the indexer is already running.\n\
                 \n\
                 The process lock file is held by another process:\n\
                   Lock file: {:?}\n\
                 \n\
                 To stop the running instance:\n\
                   1. Find process: ps aux | grep dln-indexer | grep -v grep\n\
                   2. Stop process: pkill -f dln-indexer\n\
                   3. Verify stopped: ps aux | grep dln-indexer | grep -v grep\n\
                 \n\
                 If no process is found but the lock persists, it may be stale.\n\
                 In that case, manually remove: rm {:?}",
                lock_path, lock_path
            ));
        }

        logger::info(LogTag::System, &format!("process lock acquired: {:?}", lock_path));

        Ok(Self { _lock: lock, lock_path })
    }

    /// Get the path to the lock file.
    pub fn lock_path(&self) -> &PathBuf {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        logger::info(LogTag::System, &format!("releasing process lock: {:?}", self.lock_path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_lock_prevents_duplicate() {
        let lock1 = ProcessLock::acquire();
        assert!(lock1.is_ok(), "first lock should succeed");

        let lock2 = ProcessLock::acquire();
        assert!(lock2.is_err(), "second lock should fail");
        assert!(
            lock2.unwrap_err().contains("already running"),
            "error should mention another instance"
        );

        drop(lock1);

        let lock3 = ProcessLock::acquire();
        assert!(lock3.is_ok(), "lock should succeed after first is dropped");
    }
}
