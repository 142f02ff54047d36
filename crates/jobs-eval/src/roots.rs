//! Protecting discovered derivations from garbage collection.

use std::fs;
#[cfg(unix)]
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// The part of the store the walker needs for GC roots.
pub trait Store {
    /// `lstat` semantics: a dangling link still exists.
    fn path_exists(&self, path: &Path) -> bool;

    /// Makes `root` a permanent GC root pointing at `target`.
    fn add_permanent_root(&self, root: &Path, target: &str) -> Result<()>;
}

/// A store on the local filesystem, where a GC root is a symlink.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStore;

impl Store for LocalStore {
    fn path_exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn add_permanent_root(&self, root: &Path, target: &str) -> Result<()> {
        let store_err = |source| Error::Store {
            root: root.to_path_buf(),
            source,
        };
        if let Some(parent) = root.parent() {
            fs::create_dir_all(parent).map_err(store_err)?;
        }
        #[cfg(unix)]
        symlink(target, root).map_err(store_err)?;
        #[cfg(not(unix))]
        fs::write(root, target).map_err(store_err)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOutcome {
    /// No roots directory, no store, or a dry run.
    Skipped,
    AlreadyPresent,
    Created,
}

/// Registers one GC root per derivation under a roots directory, named
/// after the derivation's base name.
pub struct RootRegistrar<'a> {
    store: Option<&'a dyn Store>,
    roots_dir: Option<PathBuf>,
    dry_run: bool,
}

impl<'a> RootRegistrar<'a> {
    /// An empty `roots_dir` disables registration just like `None`.
    pub fn new(store: Option<&'a dyn Store>, roots_dir: Option<&Path>, dry_run: bool) -> Self {
        let roots_dir = roots_dir
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);
        Self {
            store,
            roots_dir,
            dry_run,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None, false)
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some() && self.roots_dir.is_some() && !self.dry_run
    }

    pub fn register(&self, drv_path: &str) -> Result<RootOutcome> {
        let (store, roots_dir) = match (self.store, &self.roots_dir) {
            (Some(store), Some(dir)) if !self.dry_run => (store, dir),
            _ => return Ok(RootOutcome::Skipped),
        };
        let base = match Path::new(drv_path).file_name() {
            Some(base) => base,
            None => return Ok(RootOutcome::Skipped),
        };
        let root = roots_dir.join(base);
        if store.path_exists(&root) {
            return Ok(RootOutcome::AlreadyPresent);
        }
        store.add_permanent_root(&root, drv_path)?;
        tracing::debug!(root = %root.display(), drv = drv_path, "registered GC root");
        Ok(RootOutcome::Created)
    }
}
