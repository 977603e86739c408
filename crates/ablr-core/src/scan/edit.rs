//! Edit primitives over scanner lists

use super::Scan;
use crate::error::RefactorError;
use crate::result::Result;
use crate::store::{NodeId, TokenStore};
use crate::token::TokenKind;

impl TokenStore {
    /// Move `cursor` forward to the token at `line`/`column`
    ///
    /// Only searches forward of the cursor. Returns `false` and leaves the
    /// cursor alone if no such token exists, which is the normal outcome for
    /// text that came out of a preprocessor expansion.
    pub fn seek(&self, line: u32, column: u32, cursor: &mut NodeId) -> Result<bool> {
        let mut current = *cursor;
        loop {
            let node = self.node(current)?;
            if node.line >= line {
                break;
            }
            match node.next() {
                Some(next) => current = next,
                None => break,
            }
        }
        if self.node(current)?.line != line {
            return Ok(false);
        }
        loop {
            let node = self.node(current)?;
            if node.line == line && node.column == column {
                *cursor = current;
                return Ok(true);
            }
            // Synthetic tokens inserted into the line are stepped over
            if node.line != line && node.line != 0 {
                return Ok(false);
            }
            match node.next() {
                Some(next) => current = next,
                None => return Ok(false),
            }
        }
    }

    /// Like [`TokenStore::seek`], but starts from the list head using the
    /// scan's per-line index
    pub fn seek_from_top(
        &self,
        scan: &mut Scan,
        line: u32,
        column: u32,
        cursor: &mut NodeId,
    ) -> Result<bool> {
        let Some(mut current) = scan.first_on_line(self, line)? else {
            return Ok(false);
        };
        loop {
            let node = self.node(current)?;
            if node.line == line {
                if node.column == column {
                    *cursor = current;
                    return Ok(true);
                }
                if node.column > column {
                    return Ok(false);
                }
            } else if node.line != 0 {
                return Ok(false);
            }
            match node.next() {
                Some(next) => current = next,
                None => return Ok(false),
            }
        }
    }

    /// Flag `[begin, end]` to be removed by the next sweep
    ///
    /// Stops early at a sentinel or the end of the chain.
    pub fn mark_to_be_cut(&mut self, begin: NodeId, end: NodeId) -> Result<()> {
        let mut current = begin;
        loop {
            let node = self.node_mut(current)?;
            if node.kind.is_sentinel() {
                return Ok(());
            }
            node.to_be_cut = true;
            if current == end {
                return Ok(());
            }
            match node.next() {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
    }

    /// Mark `[begin, end]` to-be-cut and build a detached copy of it
    ///
    /// The copy carries kind and text only; its nodes are synthetic. Returns
    /// the copy's first and last node.
    pub fn copy_and_mark(&mut self, begin: NodeId, end: NodeId) -> Result<(NodeId, NodeId)> {
        if self.kind(begin)?.is_sentinel() {
            return Err(RefactorError::contract("Cannot copy a scanner sentinel"));
        }
        let mut current = begin;
        let mut first: Option<NodeId> = None;
        let mut last: Option<NodeId> = None;
        loop {
            let (kind, text, next) = {
                let node = self.node_mut(current)?;
                node.to_be_cut = true;
                (node.kind, node.text.clone(), node.next())
            };
            let clone = self.create_node(kind, text);
            match last {
                Some(previous) => self.link(previous, clone)?,
                None => first = Some(clone),
            }
            last = Some(clone);
            if current == end {
                break;
            }
            match next {
                Some(next) if !self.kind(next)?.is_sentinel() => current = next,
                _ => break,
            }
        }
        match (first, last) {
            (Some(first), Some(last)) => Ok((first, last)),
            _ => Err(RefactorError::internal_error("copy produced no nodes")),
        }
    }

    /// Unlink every run of to-be-cut tokens in one forward pass
    ///
    /// Removed nodes stay alive in the store, so cursors still pointing at
    /// them can walk forward back into the list.
    pub fn sweep(&mut self, scan: &Scan) -> Result<()> {
        if self.node(scan.tail())?.to_be_cut || self.node(scan.head())?.to_be_cut {
            return Err(RefactorError::contract("Cut past Scanner_tail"));
        }
        let mut previous = scan.head();
        let mut run_start: Option<NodeId> = None;
        let mut current = self.next(scan.head())?;
        while let Some(id) = current {
            let (cut, next) = {
                let node = self.node(id)?;
                (node.to_be_cut, node.next())
            };
            match (cut, run_start) {
                (true, None) => run_start = Some(previous),
                (false, Some(before)) => {
                    self.link(before, id)?;
                    self.bump_epoch();
                    run_start = None;
                }
                _ => {}
            }
            previous = id;
            current = next;
        }
        if run_start.is_some() {
            return Err(RefactorError::contract("Cut past Scanner_tail"));
        }
        Ok(())
    }

    /// Splice the detached chain `[begin, end]` in front of `insert_before`
    pub fn insert_section(&mut self, begin: NodeId, end: NodeId, insert_before: NodeId) -> Result<()> {
        match self.prev(insert_before)? {
            Some(previous) => self.link(previous, begin)?,
            None => self.node_mut(begin)?.prev = None,
        }
        self.link(end, insert_before)?;
        self.bump_epoch();
        Ok(())
    }

    /// Unlink `[begin, end]` immediately, without marking
    ///
    /// Only safe when no cursor is inside the section.
    pub fn cut_section_hard(&mut self, begin: NodeId, end: NodeId) -> Result<()> {
        let before = self
            .prev(begin)?
            .ok_or_else(|| RefactorError::contract("Cannot cut a section with no predecessor"))?;
        let after = self
            .next(end)?
            .ok_or_else(|| RefactorError::contract("Cannot cut a section with no successor"))?;
        self.link(before, after)?;
        self.node_mut(begin)?.prev = None;
        self.node_mut(end)?.next = None;
        self.bump_epoch();
        Ok(())
    }

    /// True iff every token not yet marked to-be-cut is whitespace
    pub fn is_all_whitespace(&self, scan: &Scan) -> Result<bool> {
        for id in self.scan_tokens(scan)? {
            let node = self.node(id)?;
            if !node.to_be_cut && !node.kind.is_whitespace() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Concatenated text of `[begin, end]`
    pub fn copy_to_text(&self, begin: NodeId, end: NodeId) -> Result<String> {
        let mut text = String::new();
        let mut current = Some(begin);
        while let Some(id) = current {
            let node = self.node(id)?;
            text.push_str(&node.text);
            if id == end {
                break;
            }
            current = node.next();
        }
        Ok(text)
    }

    /// Collapse `[first, last]` into `first`, carrying `kind` and `text`
    pub(crate) fn clump(
        &mut self,
        first: NodeId,
        last: NodeId,
        kind: TokenKind,
        text: String,
    ) -> Result<()> {
        if first != last {
            match self.next(last)? {
                Some(after) => self.link(first, after)?,
                None => self.node_mut(first)?.next = None,
            }
            self.bump_epoch();
        }
        let node = self.node_mut(first)?;
        node.kind = kind;
        node.text = text;
        Ok(())
    }

    /// Indent lines `first_line..=last_line` by appending `indent` to the
    /// newline in front of each of them
    pub fn indent(&mut self, scan: &Scan, first_line: u32, last_line: u32, indent: &str) -> Result<()> {
        let tokens = self.scan_tokens(scan)?;
        if first_line <= 1
            && let Some(&first) = tokens.first()
        {
            let node = self.node_mut(first)?;
            node.text.insert_str(0, indent);
        }
        for id in tokens {
            let node = self.node_mut(id)?;
            if node.kind == TokenKind::Newline
                && node.line + 1 >= first_line.max(2)
                && node.line < last_line
            {
                node.text.push_str(indent);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::lexer::lex;
    use crate::store::TokenStore;
    use crate::token::TokenKind;

    fn setup(source: &str) -> (TokenStore, super::Scan) {
        let mut store = TokenStore::new();
        let file = store.files_mut().intern("main.p");
        let scan = store.build_scan(file, lex(source)).unwrap();
        (store, scan)
    }

    fn texts(store: &TokenStore, scan: &super::Scan) -> Vec<String> {
        store
            .scan_tokens(scan)
            .unwrap()
            .into_iter()
            .map(|id| store.text(id).unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_copy_and_mark_then_sweep_empties_statement() {
        let (mut store, scan) = setup("DISPLAY \"hi\".");
        let first = store.next(scan.head()).unwrap().unwrap();
        let last = store.prev(scan.tail()).unwrap().unwrap();

        let (copy_start, copy_end) = store.copy_and_mark(first, last).unwrap();
        assert_eq!(
            store.copy_to_text(copy_start, copy_end).unwrap(),
            "DISPLAY \"hi\"."
        );
        for id in store.scan_tokens(&scan).unwrap() {
            assert!(store.node(id).unwrap().to_be_cut);
        }

        store.sweep(&scan).unwrap();
        assert_eq!(store.next(scan.head()).unwrap(), Some(scan.tail()));
        assert_eq!(store.prev(scan.tail()).unwrap(), Some(scan.head()));
    }

    #[test]
    fn test_sweep_keeps_survivors_in_order() {
        let (mut store, scan) = setup("a b c d e");
        let tokens = store.scan_tokens(&scan).unwrap();
        // cut "b " and "d"
        store.mark_to_be_cut(tokens[2], tokens[3]).unwrap();
        store.mark_to_be_cut(tokens[6], tokens[6]).unwrap();
        store.sweep(&scan).unwrap();
        assert_eq!(texts(&store, &scan), vec!["a", " ", "c", " ", " ", "e"]);
    }

    #[test]
    fn test_sweep_rejects_marked_tail() {
        let (mut store, scan) = setup("a");
        store.node_mut(scan.tail()).unwrap().to_be_cut = true;
        assert!(store.sweep(&scan).is_err());
    }

    #[test]
    fn test_mark_never_marks_sentinels() {
        let (mut store, scan) = setup("a b");
        let first = store.next(scan.head()).unwrap().unwrap();
        store.mark_to_be_cut(first, scan.tail()).unwrap();
        assert!(!store.node(scan.tail()).unwrap().to_be_cut);
        store.sweep(&scan).unwrap();
        assert!(store.scan_tokens(&scan).unwrap().is_empty());
    }

    #[test]
    fn test_insert_section_splices_before_target() {
        let (mut store, scan) = setup("a c");
        let tokens = store.scan_tokens(&scan).unwrap();
        let b = store.create_node(TokenKind::Id, "b");
        let space = store.create_node(TokenKind::Whitespace, " ");
        store.insert_section(b, b, tokens[2]).unwrap();
        store.insert_section(space, space, tokens[2]).unwrap();
        assert_eq!(store.scan_text(&scan).unwrap(), "a b c");
    }

    #[test]
    fn test_cut_section_hard_detaches_immediately() {
        let (mut store, scan) = setup("a b c");
        let tokens = store.scan_tokens(&scan).unwrap();
        store.cut_section_hard(tokens[1], tokens[2]).unwrap();
        assert_eq!(store.scan_text(&scan).unwrap(), "a c");
        assert_eq!(store.prev(tokens[1]).unwrap(), None);
    }

    #[test]
    fn test_seek_is_forward_only() {
        let (store, scan) = setup("a b\nc d\n");
        let mut cursor = scan.head();
        assert!(store.seek(2, 3, &mut cursor).unwrap());
        assert_eq!(store.text(cursor).unwrap(), "d");

        let found = cursor;
        assert!(!store.seek(1, 1, &mut cursor).unwrap());
        assert_eq!(cursor, found);
        assert!(!store.seek(2, 2, &mut cursor).unwrap());
        assert!(!store.seek(9, 1, &mut cursor).unwrap());
        assert_eq!(cursor, found);
    }

    #[test]
    fn test_seek_from_top_survives_edits() {
        let (mut store, mut scan) = setup("a b\nc d\ne\n");
        let mut cursor = scan.tail();
        assert!(store.seek_from_top(&mut scan, 2, 3, &mut cursor).unwrap());
        assert_eq!(store.text(cursor).unwrap(), "d");

        // cut line 2's first token and look again
        let tokens = store.scan_tokens(&scan).unwrap();
        store.mark_to_be_cut(tokens[4], tokens[5]).unwrap();
        store.sweep(&scan).unwrap();
        assert!(store.seek_from_top(&mut scan, 2, 3, &mut cursor).unwrap());
        assert!(store.seek_from_top(&mut scan, 3, 1, &mut cursor).unwrap());
        assert_eq!(store.text(cursor).unwrap(), "e");
        assert!(!store.seek_from_top(&mut scan, 2, 1, &mut cursor).unwrap());
    }

    #[test]
    fn test_is_all_whitespace_ignores_cut_tokens() {
        let (mut store, scan) = setup("  x\n");
        assert!(!store.is_all_whitespace(&scan).unwrap());
        let tokens = store.scan_tokens(&scan).unwrap();
        store.mark_to_be_cut(tokens[1], tokens[1]).unwrap();
        assert!(store.is_all_whitespace(&scan).unwrap());
    }

    #[test]
    fn test_indent_line_range() {
        let (mut store, scan) = setup("a.\nb.\nc.\n");
        store.indent(&scan, 1, 2, "  ").unwrap();
        assert_eq!(store.scan_text(&scan).unwrap(), "  a.\n  b.\nc.\n");

        let (mut store, scan) = setup("a.\nb.\nc.\n");
        store.indent(&scan, 2, 3, "\t").unwrap();
        assert_eq!(store.scan_text(&scan).unwrap(), "a.\n\tb.\n\tc.\n");
    }

    #[test]
    fn test_clump_merges_span() {
        let (mut store, scan) = setup("\"hi there\"");
        let first = store.next(scan.head()).unwrap().unwrap();
        let last = store.prev(scan.tail()).unwrap().unwrap();
        store
            .clump(first, last, TokenKind::QString, "\"hi there\"".into())
            .unwrap();
        let tokens = store.scan_tokens(&scan).unwrap();
        assert_eq!(tokens, vec![first]);
        assert_eq!(store.kind(first).unwrap(), TokenKind::QString);
    }
}
