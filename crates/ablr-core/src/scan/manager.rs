//! Per-file scanner list cache

use super::Scan;
use crate::error::RefactorError;
use crate::lexer::{self, RawToken};
use crate::result::Result;
use crate::store::{NodeId, TokenStore};
use crate::token::FileIndex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::Path;

/// Source of literal tokens for a file
pub trait SourceScanner {
    fn scan_file(&self, path: &Path) -> Result<Vec<RawToken>>;
}

/// Reads the file and lexes it with [`lexer::lex`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AblScanner;

impl SourceScanner for AblScanner {
    fn scan_file(&self, path: &Path) -> Result<Vec<RawToken>> {
        let text = fs::read_to_string(path).map_err(|e| RefactorError::io_error(path, e))?;
        Ok(lexer::lex(&text))
    }
}

/// One scanner list per distinct source file, created on first use
///
/// A file reached from several include sites is tokenized once, so every
/// refactoring target inside it edits the same list.
#[derive(Debug, Default)]
pub struct ScanManager<S: SourceScanner = AblScanner> {
    scanner: S,
    scans: HashMap<FileIndex, Scan>,
}

impl<S: SourceScanner> ScanManager<S> {
    pub fn new(scanner: S) -> Self {
        Self {
            scanner,
            scans: HashMap::new(),
        }
    }

    /// Scanner list for `file`, lexing it on first request
    pub fn get_or_create(&mut self, store: &mut TokenStore, file: FileIndex) -> Result<&mut Scan> {
        match self.scans.entry(file) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = store
                    .files()
                    .path(file)
                    .ok_or_else(|| {
                        RefactorError::internal_error(format!("No path registered for file {file}"))
                    })?
                    .to_path_buf();
                let tokens = self.scanner.scan_file(&path)?;
                tracing::debug!("Scanned {} ({} tokens)", path.display(), tokens.len());
                let scan = store.build_scan(file, tokens)?;
                Ok(entry.insert(scan))
            }
        }
    }

    /// Scanner list for a path, registering it in the store's file table
    pub fn scan_for_path(&mut self, store: &mut TokenStore, path: &Path) -> Result<&mut Scan> {
        let file = store.files_mut().intern(path);
        self.get_or_create(store, file)
    }

    /// Scanner list for the file the node's first natural descendant is in
    pub fn scan_for_node(&mut self, store: &mut TokenStore, node: NodeId) -> Result<Option<&mut Scan>> {
        let Some(first) = store.first_natural_descendant(node)? else {
            return Ok(None);
        };
        let Some(file) = store.node(first)?.file else {
            return Ok(None);
        };
        self.get_or_create(store, file).map(Some)
    }

    pub fn get(&self, file: FileIndex) -> Option<&Scan> {
        self.scans.get(&file)
    }

    pub fn get_mut(&mut self, file: FileIndex) -> Option<&mut Scan> {
        self.scans.get_mut(&file)
    }

    /// Files with a cached list, in index order
    pub fn files(&self) -> Vec<FileIndex> {
        let mut files: Vec<FileIndex> = self.scans.keys().copied().collect();
        files.sort();
        files
    }

    pub fn clear(&mut self) {
        self.scans.clear();
    }
}
