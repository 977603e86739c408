//! Detached token chains awaiting relocation

use crate::result::Result;
use crate::store::{NodeId, TokenStore};

/// A chain of nodes not linked into any scanner list
///
/// Cut segments are appended here while a refactoring walks the original
/// list, then spliced in elsewhere (or dropped) in one go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LooseChain {
    start: Option<NodeId>,
    end: Option<NodeId>,
}

impl LooseChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Option<NodeId> {
        self.start
    }

    pub fn end(&self) -> Option<NodeId> {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none()
    }

    /// Link the detached segment `[begin, end]` onto the end of the chain
    pub fn append_segment(&mut self, store: &mut TokenStore, begin: NodeId, end: NodeId) -> Result<()> {
        match self.end {
            Some(last) => store.link(last, begin)?,
            None => {
                store.node_mut(begin)?.prev = None;
                self.start = Some(begin);
            }
        }
        store.node_mut(end)?.next = None;
        self.end = Some(end);
        Ok(())
    }

    /// Splice the whole chain in front of `insert_before` and empty it
    pub fn insert_before(&mut self, store: &mut TokenStore, insert_before: NodeId) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            store.insert_section(start, end, insert_before)?;
        }
        *self = Self::default();
        Ok(())
    }

    pub fn text(&self, store: &TokenStore) -> Result<String> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => store.copy_to_text(start, end),
            _ => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::token::FileIndex;

    #[test]
    fn test_chain_collects_segments_and_reinserts() {
        let mut store = TokenStore::new();
        let scan = store.build_scan(FileIndex::MAIN, lex("a b c")).unwrap();
        let tokens = store.scan_tokens(&scan).unwrap();

        let mut chain = LooseChain::new();
        assert!(chain.is_empty());
        let (s1, e1) = store.copy_and_mark(tokens[0], tokens[1]).unwrap();
        chain.append_segment(&mut store, s1, e1).unwrap();
        let (s2, e2) = store.copy_and_mark(tokens[2], tokens[2]).unwrap();
        chain.append_segment(&mut store, s2, e2).unwrap();
        assert_eq!(chain.text(&store).unwrap(), "a b");

        store.sweep(&scan).unwrap();
        assert_eq!(store.scan_text(&scan).unwrap(), " c");

        chain.insert_before(&mut store, scan.tail()).unwrap();
        assert!(chain.is_empty());
        assert_eq!(store.scan_text(&scan).unwrap(), " ca b");
    }
}
