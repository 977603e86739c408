//! Scanner lists and the edit primitives over them
//!
//! A scanner list is the literal, unexpanded token chain of one physical
//! file, bounded by `ScannerHead`/`ScannerTail` sentinels. Refactorings never
//! delete tokens directly: they mark them to-be-cut and [`TokenStore::sweep`]
//! unlinks every marked run in one pass once no cursor needs them anymore.
//!
//! ```rust,ignore
//! let mut store = TokenStore::new();
//! let file = store.files_mut().intern("main.p");
//! let scan = store.build_scan(file, lexer::lex("DISPLAY \"hi\".\n"))?;
//! let first = store.next(scan.head())?.unwrap();
//! let last = store.prev(scan.tail())?.unwrap();
//! let (copy_start, copy_end) = store.copy_and_mark(first, last)?;
//! store.sweep(&scan)?;
//! ```

mod chain;
mod edit;
mod manager;

pub use chain::LooseChain;
pub use manager::{AblScanner, ScanManager, SourceScanner};

use crate::lexer::RawToken;
use crate::result::Result;
use crate::store::{NodeId, Position, TokenStore};
use crate::token::{FileIndex, TokenKind};
use std::collections::BTreeMap;

/// Handle to one file's scanner list
#[derive(Debug, Clone)]
pub struct Scan {
    head: NodeId,
    tail: NodeId,
    file: FileIndex,
    lines: LineIndex,
}

/// First token on each line, valid for one store epoch
#[derive(Debug, Clone, Default)]
struct LineIndex {
    epoch: Option<u64>,
    first_on_line: BTreeMap<u32, NodeId>,
}

impl Scan {
    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn tail(&self) -> NodeId {
        self.tail
    }

    pub fn file(&self) -> FileIndex {
        self.file
    }

    /// Look up the first token on `line`, rebuilding the index if any
    /// scanner links changed since it was built
    fn first_on_line(&mut self, store: &TokenStore, line: u32) -> Result<Option<NodeId>> {
        if self.lines.epoch != Some(store.epoch()) {
            let mut first_on_line = BTreeMap::new();
            let mut current = store.next(self.head)?;
            while let Some(id) = current {
                let node = store.node(id)?;
                if node.line > 0 {
                    first_on_line.entry(node.line).or_insert(id);
                }
                current = node.next();
            }
            self.lines = LineIndex {
                epoch: Some(store.epoch()),
                first_on_line,
            };
        }
        Ok(self.lines.first_on_line.get(&line).copied())
    }
}

impl TokenStore {
    /// Build a scanner list for `file` from literal tokens
    pub fn build_scan(
        &mut self,
        file: FileIndex,
        tokens: impl IntoIterator<Item = RawToken>,
    ) -> Result<Scan> {
        let head = self.create_node(TokenKind::ScannerHead, "");
        self.node_mut(head)?.file = Some(file);
        let mut last = head;
        for token in tokens {
            let id = self.create_positioned(
                token.kind,
                token.text,
                Position::new(file, token.line, token.column),
            );
            self.link(last, id)?;
            last = id;
        }
        let tail = self.create_node(TokenKind::ScannerTail, "");
        self.node_mut(tail)?.file = Some(file);
        self.link(last, tail)?;
        self.bump_epoch();
        Ok(Scan {
            head,
            tail,
            file,
            lines: LineIndex::default(),
        })
    }

    /// Tokens strictly between the sentinels
    pub fn scan_tokens(&self, scan: &Scan) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut current = self.next(scan.head)?;
        while let Some(id) = current {
            if id == scan.tail {
                break;
            }
            out.push(id);
            current = self.next(id)?;
        }
        Ok(out)
    }

    /// Concatenated text of the list, to-be-cut tokens included
    pub fn scan_text(&self, scan: &Scan) -> Result<String> {
        let mut text = String::new();
        for id in self.scan_tokens(scan)? {
            text.push_str(self.text(id)?);
        }
        Ok(text)
    }
}
