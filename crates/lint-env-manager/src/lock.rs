//! Advisory file locks that make holds visible across processes.
//!
//! Each environment directory has a sibling `<dir>.lock` file. A holder
//! keeps a shared lock on it until release; provisioning and eviction take
//! the exclusive lock. The file sits outside the directory so deleting the
//! directory never drops a lock, and it is never removed for the same reason.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::environment::EnvironmentKey;

/// An open lock file; dropping it releases the lock.
#[derive(Debug)]
pub(crate) struct DirLock {
    file: File,
}

impl DirLock {
    pub(crate) fn path_for(root: &Path, key: &EnvironmentKey) -> PathBuf {
        Self::path_for_dir_name(root, &key.dir_name())
    }

    pub(crate) fn path_for_dir_name(root: &Path, dir_name: &str) -> PathBuf {
        root.join(format!("{dir_name}.lock"))
    }

    /// Shared lock, or `None` while another handle holds it exclusively.
    pub(crate) fn try_shared(path: &Path) -> io::Result<Option<Self>> {
        let file = open(path)?;
        match FileExt::try_lock_shared(&file) {
            Ok(()) => Ok(Some(Self { file })),
            Err(err) if is_contended(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Exclusive lock, or `None` while any other handle holds it.
    pub(crate) fn try_exclusive(path: &Path) -> io::Result<Option<Self>> {
        let file = open(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { file })),
            Err(err) if is_contended(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Convert an exclusive lock to a shared one on the same handle.
    pub(crate) fn downgrade(&self) -> io::Result<()> {
        FileExt::lock_shared(&self.file)
    }
}

fn open(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == fs2::lock_contended_error().kind()
}
