//! Rollback of refactored files
//!
//! Before a refactoring touches a file, the original is preserved under the
//! rollback directory, mirrored by absolute path below `files/`. Every change
//! is logged to `changes.json` as it happens, so a later process can list
//! the changes or restore the originals.
//!
//! Only one transaction is active at a time: [`RollbackManager::begin`]
//! clears the previous one and hands out the new one by mutable borrow.

use crate::config::RefactorConfig;
use crate::error::RefactorError;
use crate::result::Result;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Subdirectory of the rollback directory holding preserved copies
pub const FILES_DIR: &str = "files";

/// Name of the persisted change log
pub const CHANGES_FILE: &str = "changes.json";

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// Created by the refactoring; rollback deletes it
    New,
    /// Rewritten; rollback restores the preserved copy
    Modified,
    /// Moved aside; rollback restores the preserved copy
    Deleted,
}

impl ChangeKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One logged file change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub kind: ChangeKind,
    /// Absolute path of the refactored file
    pub path: PathBuf,
    /// Where the original was preserved; `None` for new files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserved: Option<PathBuf>,
    /// Unified diff of original vs. written text, for modified files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChangeLog {
    changes: Vec<FileChange>,
}

/// Callback run with a file's path just before it is first preserved
pub type PreModifyHook = Box<dyn FnMut(&Path)>;

/// One rollback transaction
pub struct Rollback {
    dir: PathBuf,
    changes: Vec<FileChange>,
    on_pre_modify: Option<PreModifyHook>,
}

impl fmt::Debug for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rollback")
            .field("dir", &self.dir)
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}

impl Rollback {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            changes: Vec::new(),
            on_pre_modify: None,
        }
    }

    /// Resume the transaction persisted in `dir`, empty if there is none
    fn load(dir: PathBuf) -> Result<Self> {
        let log_path = dir.join(CHANGES_FILE);
        let mut rollback = Self::new(dir);
        if !log_path.exists() {
            return Ok(rollback);
        }
        let content =
            fs::read_to_string(&log_path).map_err(|e| RefactorError::io_error(&log_path, e))?;
        let log: ChangeLog = serde_json::from_str(&content).map_err(|e| RefactorError::Rollback {
            message: format!("Corrupt change log {}: {e}", log_path.display()),
        })?;
        rollback.changes = log.changes;
        Ok(rollback)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn changes(&self) -> &[FileChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Call `hook` whenever an existing file is about to be preserved
    pub fn set_pre_modify_hook(&mut self, hook: impl FnMut(&Path) + 'static) {
        self.on_pre_modify = Some(Box::new(hook));
    }

    /// Copy `path` aside before it is modified
    ///
    /// No-op when the file does not exist yet or was already preserved.
    pub fn preserve(&mut self, path: &Path) -> Result<()> {
        let source = absolute(path)?;
        let saved = self.preserved_path(&source);
        if !source.exists() || saved.exists() {
            return Ok(());
        }
        self.pre_modify(&source);
        create_parent(&saved)?;
        fs::copy(&source, &saved).map_err(|e| RefactorError::io_error(&source, e))?;
        debug!("Preserved {} as {}", source.display(), saved.display());
        self.record(FileChange {
            kind: ChangeKind::Modified,
            path: source,
            preserved: Some(saved),
            diff: None,
        })
    }

    /// Move `path` aside; the file is gone until rolled back
    pub fn preserve_move(&mut self, path: &Path) -> Result<()> {
        let source = absolute(path)?;
        let saved = self.preserved_path(&source);
        if !source.exists() || saved.exists() {
            return Ok(());
        }
        self.pre_modify(&source);
        create_parent(&saved)?;
        move_file(&source, &saved)?;
        info!("Removed {} (preserved for rollback)", source.display());
        self.record(FileChange {
            kind: ChangeKind::Deleted,
            path: source,
            preserved: Some(saved),
            diff: None,
        })
    }

    /// Preserve `path` if needed, then write `text` to it
    ///
    /// A file whose content does not change is put back untouched and not
    /// logged. A failed write restores the original before the error is
    /// returned. Writing a file that did not exist logs it as new.
    pub fn preserve_and_write(&mut self, text: &str, path: &Path) -> Result<()> {
        let target = absolute(path)?;
        let saved = self.preserved_path(&target);

        if saved.exists() || self.is_new(&target) {
            fs::write(&target, text).map_err(|e| RefactorError::io_error(&target, e))?;
            self.refresh_diff(&target, &saved, text);
            return self.persist();
        }

        let new_file = !target.exists();
        if new_file {
            create_parent(&target)?;
        } else {
            self.pre_modify(&target);
            create_parent(&saved)?;
            move_file(&target, &saved)?;
        }

        if let Err(e) = fs::write(&target, text) {
            if !new_file {
                discard(&target);
                move_file(&saved, &target)?;
            }
            return Err(RefactorError::io_error(&target, e));
        }

        if new_file {
            info!("Created {}", target.display());
            return self.record(FileChange {
                kind: ChangeKind::New,
                path: target,
                preserved: None,
                diff: None,
            });
        }

        let original = fs::read_to_string(&saved).map_err(|e| RefactorError::io_error(&saved, e))?;
        if original == text {
            debug!("{} unchanged, original put back", target.display());
            discard(&target);
            return move_file(&saved, &target);
        }

        info!("Wrote {}", target.display());
        let diff = unified_diff(&original, text, &target);
        self.record(FileChange {
            kind: ChangeKind::Modified,
            path: target,
            preserved: Some(saved),
            diff: Some(diff),
        })
    }

    /// Log a file the refactoring created by other means
    pub fn register_new_file(&mut self, path: &Path) -> Result<()> {
        let path = absolute(path)?;
        self.record(FileChange {
            kind: ChangeKind::New,
            path,
            preserved: None,
            diff: None,
        })
    }

    /// Restore every logged file, latest change first, and clear the log
    ///
    /// Keeps going past failures; returns their messages, one per line, or
    /// `None` when everything was restored.
    pub fn rollback(&mut self) -> Option<String> {
        let mut errors = String::new();
        for change in std::mem::take(&mut self.changes).into_iter().rev() {
            match (change.kind, &change.preserved) {
                (ChangeKind::Modified | ChangeKind::Deleted, Some(preserved)) => {
                    discard(&change.path);
                    let restored = create_parent(&change.path)
                        .and_then(|()| move_file(preserved, &change.path));
                    match restored {
                        Ok(()) => info!("Restored {}", change.path.display()),
                        Err(e) => {
                            warn!("{e}");
                            errors.push_str(&format!(
                                "Failed to restore {}\n",
                                change.path.display()
                            ));
                        }
                    }
                }
                (ChangeKind::Modified | ChangeKind::Deleted, None) => {
                    errors.push_str(&format!(
                        "No preserved copy of {}\n",
                        change.path.display()
                    ));
                }
                (ChangeKind::New, _) => match fs::remove_file(&change.path) {
                    Ok(()) => info!("Deleted {}", change.path.display()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(_) => errors.push_str(&format!(
                        "Failed to delete {}\n",
                        change.path.display()
                    )),
                },
            }
        }
        if let Err(e) = self.persist() {
            errors.push_str(&format!("{e}\n"));
        }
        (!errors.is_empty()).then_some(errors)
    }

    /// `LABEL path` per change, one per line
    pub fn change_list(&self) -> String {
        self.changes
            .iter()
            .map(|change| format!("{} {}\n", change.kind, change.path.display()))
            .collect()
    }

    /// Where the original of `source` is kept
    pub fn preserved_path(&self, source: &Path) -> PathBuf {
        mirror_path(&self.dir.join(FILES_DIR), source)
    }

    fn is_new(&self, path: &Path) -> bool {
        self.changes
            .iter()
            .any(|c| c.kind == ChangeKind::New && c.path == path)
    }

    fn pre_modify(&mut self, path: &Path) {
        if let Some(hook) = self.on_pre_modify.as_mut() {
            hook(path);
        }
    }

    fn refresh_diff(&mut self, target: &Path, saved: &Path, text: &str) {
        let Some(change) = self
            .changes
            .iter_mut()
            .find(|c| c.path == target && c.kind == ChangeKind::Modified)
        else {
            return;
        };
        if let Ok(original) = fs::read_to_string(saved) {
            change.diff = Some(unified_diff(&original, text, target));
        }
    }

    fn record(&mut self, change: FileChange) -> Result<()> {
        self.changes.push(change);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| RefactorError::io_error(&self.dir, e))?;
        let log = ChangeLog {
            changes: self.changes.clone(),
        };
        let json = serde_json::to_string_pretty(&log)
            .map_err(|e| RefactorError::internal_error(format!("Failed to serialize change log: {e}")))?;
        let path = self.dir.join(CHANGES_FILE);
        fs::write(&path, json).map_err(|e| RefactorError::io_error(&path, e))
    }
}

/// Owner of the rollback directory and its single active transaction
#[derive(Debug)]
pub struct RollbackManager {
    dir: PathBuf,
    current: Option<Rollback>,
}

impl RollbackManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
        }
    }

    pub fn from_config(config: &RefactorConfig) -> Self {
        Self::new(config.rollback_dir.clone())
    }

    /// Manager holding the transaction persisted in `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let rollback = Rollback::load(dir.clone())?;
        Ok(Self {
            dir,
            current: Some(rollback),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start a new transaction, discarding the previous one and its
    /// preserved copies
    pub fn begin(&mut self) -> Result<&mut Rollback> {
        self.clear()?;
        let rollback = Rollback::new(self.dir.clone());
        rollback.persist()?;
        debug!("Started rollback transaction in {}", self.dir.display());
        Ok(self.current.insert(rollback))
    }

    pub fn current(&self) -> Option<&Rollback> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Rollback> {
        self.current.as_mut()
    }

    fn clear(&mut self) -> Result<()> {
        self.current = None;
        let files = self.dir.join(FILES_DIR);
        if files.exists() {
            fs::remove_dir_all(&files).map_err(|e| RefactorError::io_error(&files, e))?;
        }
        let log = self.dir.join(CHANGES_FILE);
        if log.exists() {
            fs::remove_file(&log).map_err(|e| RefactorError::io_error(&log, e))?;
        }
        Ok(())
    }
}

/// `path` re-rooted under `base`: `/src/a.p` becomes `base/src/a.p`
pub fn mirror_path(base: &Path, path: &Path) -> PathBuf {
    let mut target = base.to_path_buf();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                target.push(prefix.as_os_str().to_string_lossy().replace(':', ""));
            }
            Component::Normal(part) => target.push(part),
            Component::RootDir | Component::CurDir | Component::ParentDir => {}
        }
    }
    target
}

/// Unified diff of `original` vs. `modified`, headed by `path`
pub fn unified_diff(original: &str, modified: &str, path: &Path) -> String {
    let name = path.display().to_string();
    TextDiff::from_lines(original, modified)
        .unified_diff()
        .context_radius(3)
        .header(&name, &format!("{name} (modified)"))
        .to_string()
}

/// Canonical form of `path`; a file that does not exist yet is resolved
/// through its parent directory
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path.canonicalize().map_err(|e| RefactorError::io_error(path, e));
    }
    if let Some(name) = path.file_name() {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if parent.exists() {
            return parent
                .canonicalize()
                .map(|parent| parent.join(name))
                .map_err(|e| RefactorError::io_error(parent, e));
        }
    }
    std::path::absolute(path).map_err(|e| RefactorError::io_error(path, e))
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| RefactorError::io_error(parent, e))
        }
        _ => Ok(()),
    }
}

/// Remove a file that is about to be replaced; failures are logged only
fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {e}", path.display()),
    }
}

/// Rename, falling back to copy and remove across file systems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| RefactorError::io_error(from, e))?;
    fs::remove_file(from).map_err(|e| RefactorError::io_error(from, e))
}
