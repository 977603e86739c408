//! Source files and their atom chains

use super::atom::{AtomId, AtomPool};
use super::tree::ExpansionId;
use crate::error::RefactorError;
use crate::lexer;
use crate::result::Result;
use crate::scan::{AblScanner, SourceScanner};
use crate::token::{FileIndex, FileTable};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u32);

impl SourceId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// One file read during a compile unit
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file: FileIndex,
    /// `None` for an empty file
    pub first_atom: Option<AtomId>,
    /// Include expansions that pulled this file in
    pub references: Vec<ExpansionId>,
}

/// Loads each file once and keeps its atoms
///
/// Files are keyed by canonical path, so `a.i` and `./a.i` share one entry.
/// The first file loaded is the main file and gets [`FileIndex::MAIN`].
#[derive(Debug, Default)]
pub struct SourceFilePool<S: SourceScanner = AblScanner> {
    scanner: S,
    files: FileTable,
    sources: Vec<SourceFile>,
    by_path: HashMap<PathBuf, SourceId>,
    atoms: AtomPool,
}

impl<S: SourceScanner> SourceFilePool<S> {
    pub fn new(scanner: S) -> Self {
        Self {
            scanner,
            files: FileTable::new(),
            sources: Vec::new(),
            by_path: HashMap::new(),
            atoms: AtomPool::new(),
        }
    }

    /// The source for `path`, read and lexed on first request
    pub fn load(&mut self, path: &Path) -> Result<SourceId> {
        let canonical = path
            .canonicalize()
            .map_err(|e| RefactorError::io_error(path, e))?;
        if let Some(id) = self.by_path.get(&canonical) {
            return Ok(*id);
        }

        let tokens = self.scanner.scan_file(&canonical)?;
        let file = self.files.intern(&canonical);
        let first_atom = self.atoms.push_chain(file, tokens);
        tracing::debug!("Loaded source {} as file {file}", canonical.display());

        let id = SourceId(self.sources.len() as u32);
        self.sources.push(SourceFile {
            path: canonical.clone(),
            file,
            first_atom,
            references: Vec::new(),
        });
        self.by_path.insert(canonical, id);
        Ok(id)
    }

    /// Atoms for text that did not come from a file, such as include
    /// arguments; they carry `file` but sit on line 0
    pub fn synthesize(&mut self, file: FileIndex, text: &str) -> Option<AtomId> {
        let tokens = lexer::lex(text).into_iter().map(|mut token| {
            token.line = 0;
            token.column = 0;
            token
        });
        self.atoms.push_chain(file, tokens)
    }

    pub fn source(&self, id: SourceId) -> &SourceFile {
        &self.sources[id.0 as usize]
    }

    pub fn source_mut(&mut self, id: SourceId) -> &mut SourceFile {
        &mut self.sources[id.0 as usize]
    }

    pub fn atoms(&self) -> &AtomPool {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut AtomPool {
        &mut self.atoms
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub(crate) fn into_parts(self) -> (FileTable, Vec<SourceFile>, AtomPool) {
        (self.files, self.sources, self.atoms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_files_are_loaded_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.p"), "RUN x.\n").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let mut pool: SourceFilePool = SourceFilePool::new(AblScanner);
        let first = pool.load(&dir.path().join("main.p")).unwrap();
        let again = pool.load(&dir.path().join("sub/../main.p")).unwrap();
        assert_eq!(first, again);
        assert_eq!(pool.len(), 1);

        let source = pool.source(first);
        assert_eq!(source.file, FileIndex::MAIN);
        assert_eq!(pool.atoms().text_between(source.first_atom, None), "RUN x.\n");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut pool: SourceFilePool = SourceFilePool::new(AblScanner);
        let err = pool.load(Path::new("/no/such/file.p")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn test_synthesized_atoms_sit_on_line_zero() {
        let mut pool: SourceFilePool = SourceFilePool::new(AblScanner);
        let first = pool.synthesize(FileIndex(3), "a\nb").unwrap();
        let atom = pool.atoms().atom(first);
        assert_eq!((atom.line, atom.column, atom.file), (0, 0, FileIndex(3)));
        assert_eq!(pool.atoms().text_between(Some(first), None), "a\nb");
    }
}
