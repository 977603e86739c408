//! Synchronizing syntax-tree nodes with scanner tokens
//!
//! The tree is built from preprocessed tokens while the scanner lists hold
//! the literal source. Tree tokens that came straight from a file carry the
//! line and column they were found at, so they can be matched back to the
//! scanner token at the same position. Tokens that came out of a macro or a
//! conditional have no such match and every function here treats that as an
//! ordinary `false`, not an error.
//!
//! Matching is greedy: when the tree token is longer than the scanner token
//! found at its position, following scanner tokens are concatenated until the
//! text matches, and the span is clumped into a single token.

mod insert;
mod section;

pub use insert::{
    IncludeListing, IncludeParent, IncludeReference, get_insert_point_from_top,
    get_insert_point_in_file,
};
pub use section::{
    consecutive_comments, cut_to_chain, find_leading_whitespace, find_trailing_whitespace,
    get_section_with_comments, mark_branch_to_be_cut,
};

use crate::error::RefactorError;
use crate::result::Result;
use crate::scan::Scan;
use crate::store::{NodeId, TokenStore};
use crate::token::TokenKind;
use tracing::debug;

/// Synchronize one natural tree node with the scanner list
///
/// `cursor` must sit at or before the node's position. On success it points
/// at the matched token, which may be a clump of several scanner tokens
/// carrying the tree node's kind.
pub fn nsync(store: &mut TokenStore, tree_node: NodeId, cursor: &mut NodeId) -> Result<bool> {
    let (kind, want, line, column) = {
        let node = store.node(tree_node)?;
        if !node.is_natural() {
            return Ok(false);
        }
        (node.kind, node.text.clone(), node.line, node.column)
    };

    let mut found = *cursor;
    if !store.seek(line, column, &mut found)? {
        debug!("nsync: no scanner token at {line}:{column} for {want:?}");
        return Ok(false);
    }

    let mut have = store.text(found)?.to_string();
    let mut last = found;
    while have != want && have.len() < want.len() {
        match store.next(last)? {
            Some(next) if !store.kind(next)?.is_sentinel() => {
                have.push_str(store.text(next)?);
                last = next;
            }
            _ => break,
        }
    }
    if have != want {
        debug!("nsync: {want:?} does not match scanner text {have:?} at {line}:{column}");
        return Ok(false);
    }

    if last != found {
        store.clump(found, last, kind, want)?;
    }
    *cursor = found;
    Ok(true)
}

/// Synchronize the hidden tokens in front of a tree node
///
/// Walks the node's hidden tokens from last to first, matching each against
/// the scanner tokens that precede the node and clumping multi-token matches.
/// On success `cursor` points at the first hidden token's scanner token.
/// A node without hidden tokens succeeds without moving the cursor.
pub fn hidden_before_sync(store: &mut TokenStore, tree_node: NodeId, cursor: &mut NodeId) -> Result<bool> {
    let (hidden, is_tail, line, column) = {
        let node = store.node(tree_node)?;
        if node.hidden.is_empty() {
            return Ok(true);
        }
        (
            node.hidden.clone(),
            node.kind == TokenKind::ProgramTail && !node.is_natural(),
            node.line,
            node.column,
        )
    };

    let mut anchor = *cursor;
    if is_tail {
        while let Some(next) = store.next(anchor)? {
            anchor = next;
        }
    } else if !store.seek(line, column, &mut anchor)? {
        return Ok(false);
    }
    let expect_file = store.node(*cursor)?.file;

    for token in hidden.iter().rev() {
        if Some(token.file) != expect_file {
            debug!("hidden token at {}:{} is from another file", token.line, token.column);
            return Ok(false);
        }
        let mut begin = anchor;
        let mut last: Option<NodeId> = None;
        let mut text = String::new();
        while text.len() < token.text.len() {
            match store.prev(begin)? {
                Some(previous) if !store.kind(previous)?.is_sentinel() => {
                    text.insert_str(0, store.text(previous)?);
                    begin = previous;
                    last.get_or_insert(previous);
                }
                _ => break,
            }
        }
        if text != token.text {
            debug!(
                "hidden token {:?} does not match scanner text {text:?}",
                token.text
            );
            return Ok(false);
        }
        if let Some(last) = last {
            store.clump(begin, last, token.kind, token.text.clone())?;
        }
        anchor = begin;
    }

    *cursor = anchor;
    Ok(true)
}

/// Synchronize a whole branch: every natural node and the hidden tokens
/// between them
///
/// Hidden tokens in front of the branch's first natural node are left
/// alone. Synthetic nodes are skipped, unless they claim a file other than
/// the scanner's. On success `cursor1` points at the first natural node's
/// token and `cursor2` at the last synchronized token; on failure both stay
/// at the last successful match.
pub fn msync_branch(
    store: &mut TokenStore,
    first: NodeId,
    cursor1: &mut NodeId,
    cursor2: &mut NodeId,
) -> Result<bool> {
    let expect_file = store.node(*cursor1)?.file;
    let mut cursor = *cursor1;
    let mut found_first = false;

    for id in store.flatten(first)? {
        if found_first && !hidden_before_sync(store, id, &mut cursor)? {
            *cursor2 = cursor;
            return Ok(false);
        }
        let node = store.node(id)?;
        if !node.is_natural() {
            if node.file.is_some() && node.file != expect_file {
                *cursor2 = cursor;
                return Ok(false);
            }
            continue;
        }
        if node.file != expect_file || !nsync(store, id, &mut cursor)? {
            *cursor2 = cursor;
            return Ok(false);
        }
        if !found_first {
            found_first = true;
            *cursor1 = cursor;
        }
    }

    *cursor2 = cursor;
    Ok(true)
}

/// Replace the scanner section `[scan1, scan2]` with fresh tokens made from
/// the branch under `tree_node`
///
/// Each tree node contributes its text, and every node but the first also
/// contributes its hidden tokens. The old section is detached, not released.
pub fn replace_scanner_section(
    store: &mut TokenStore,
    scan1: NodeId,
    scan2: NodeId,
    tree_node: NodeId,
) -> Result<()> {
    let before = store
        .prev(scan1)?
        .ok_or_else(|| RefactorError::contract("Scanner section has no predecessor"))?;
    let after = store
        .next(scan2)?
        .ok_or_else(|| RefactorError::contract("Scanner section has no successor"))?;

    let mut current = before;
    for (i, id) in store.flatten(tree_node)?.into_iter().enumerate() {
        let (kind, text, hidden) = {
            let node = store.node(id)?;
            let hidden = if i > 0 { node.hidden.clone() } else { Vec::new() };
            (node.kind, node.text.clone(), hidden)
        };
        for token in hidden {
            let fresh = store.create_node(token.kind, token.text);
            store.link(current, fresh)?;
            current = fresh;
        }
        if text.is_empty() {
            continue;
        }
        let fresh = store.create_node(kind, text);
        store.link(current, fresh)?;
        current = fresh;
    }
    store.link(current, after)?;
    store.node_mut(scan1)?.prev = None;
    store.node_mut(scan2)?.next = None;
    store.bump_epoch();
    Ok(())
}

/// Synchronize every quoted-string node of the tree that lives in `scan`'s
/// file, so the scanner holds each string as one `QString` token
///
/// Returns the number of strings synchronized.
pub fn sync_all_qstrings(store: &mut TokenStore, root: NodeId, scan: &mut Scan) -> Result<usize> {
    let mut synced = 0;
    for id in store.flatten(root)? {
        let (line, column) = {
            let node = store.node(id)?;
            if node.kind != TokenKind::QString
                || !node.is_natural()
                || node.file != Some(scan.file())
            {
                continue;
            }
            (node.line, node.column)
        };
        let mut cursor = scan.head();
        if !store.seek_from_top(scan, line, column, &mut cursor)? {
            continue;
        }
        if nsync(store, id, &mut cursor)? {
            synced += 1;
        }
    }
    Ok(synced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::store::{Position, TreeBuilder};
    use crate::token::FileIndex;

    fn pos(line: u32, column: u32) -> Position {
        Position::new(FileIndex::MAIN, line, column)
    }

    /// `DISPLAY "hi there".` followed by a newline
    fn display_statement(store: &mut TokenStore) -> (NodeId, NodeId, NodeId) {
        let mut builder = TreeBuilder::new(store);
        let stmt = builder
            .start_node(TokenKind::Keyword, "DISPLAY", Some(pos(1, 1)))
            .unwrap();
        builder.hidden(TokenKind::Whitespace, " ", pos(1, 8));
        let string = builder
            .token(TokenKind::QString, "\"hi there\"", pos(1, 9))
            .unwrap();
        builder.token(TokenKind::Period, ".", pos(1, 19)).unwrap();
        builder.finish_node().unwrap();
        builder.hidden(TokenKind::Whitespace, "\n", pos(1, 20));
        let root = builder.finish().unwrap();
        (root, stmt, string)
    }

    #[test]
    fn test_nsync_clumps_multi_token_string() {
        let mut store = TokenStore::new();
        let scan = store
            .build_scan(FileIndex::MAIN, lex("DISPLAY \"hi there\".\n"))
            .unwrap();
        let (_, _, string) = display_statement(&mut store);

        let mut cursor = scan.head();
        assert!(nsync(&mut store, string, &mut cursor).unwrap());
        assert_eq!(store.kind(cursor).unwrap(), TokenKind::QString);
        assert_eq!(store.text(cursor).unwrap(), "\"hi there\"");
        assert_eq!(store.scan_text(&scan).unwrap(), "DISPLAY \"hi there\".\n");

        // A second pass finds the clump as a single token
        let before = store.scan_tokens(&scan).unwrap().len();
        let mut again = scan.head();
        assert!(nsync(&mut store, string, &mut again).unwrap());
        assert_eq!(again, cursor);
        assert_eq!(store.scan_tokens(&scan).unwrap().len(), before);
    }

    #[test]
    fn test_nsync_rejects_mismatched_text() {
        let mut store = TokenStore::new();
        let scan = store.build_scan(FileIndex::MAIN, lex("DISPLAY x.\n")).unwrap();
        let mut builder = TreeBuilder::new(&mut store);
        let node = builder.token(TokenKind::Id, "xyz", pos(1, 9)).unwrap();
        builder.finish().unwrap();

        let mut cursor = scan.head();
        assert!(!nsync(&mut store, node, &mut cursor).unwrap());
        assert_eq!(cursor, scan.head());
    }

    #[test]
    fn test_nsync_skips_synthetic_nodes() {
        let mut store = TokenStore::new();
        let scan = store.build_scan(FileIndex::MAIN, lex("x")).unwrap();
        let node = store.create_node(TokenKind::Id, "x");
        let mut cursor = scan.head();
        assert!(!nsync(&mut store, node, &mut cursor).unwrap());
    }

    #[test]
    fn test_msync_branch_reproduces_source() {
        let mut store = TokenStore::new();
        let source = "DISPLAY \"hi there\".\n";
        let scan = store.build_scan(FileIndex::MAIN, lex(source)).unwrap();
        let (_, stmt, _) = display_statement(&mut store);

        let mut c1 = scan.head();
        let mut c2 = scan.head();
        assert!(msync_branch(&mut store, stmt, &mut c1, &mut c2).unwrap());
        assert_eq!(store.text(c1).unwrap(), "DISPLAY");
        assert_eq!(store.text(c2).unwrap(), ".");
        assert_eq!(store.copy_to_text(c1, c2).unwrap(), "DISPLAY \"hi there\".");
        assert_eq!(store.scan_text(&scan).unwrap(), source);
    }

    #[test]
    fn test_msync_branch_fails_on_foreign_file() {
        let mut store = TokenStore::new();
        let other = store.files_mut().intern("other.i");
        let scan = store.build_scan(FileIndex::MAIN, lex("a b")).unwrap();
        let mut builder = TreeBuilder::new(&mut store);
        let group = builder.start_node(TokenKind::Expression, "", None).unwrap();
        builder.token(TokenKind::Id, "a", pos(1, 1)).unwrap();
        builder
            .token(TokenKind::Id, "b", Position::new(other, 1, 3))
            .unwrap();
        builder.finish_node().unwrap();
        builder.finish().unwrap();

        let mut c1 = scan.head();
        let mut c2 = scan.head();
        assert!(!msync_branch(&mut store, group, &mut c1, &mut c2).unwrap());
        assert_eq!(store.text(c2).unwrap(), "a");
    }

    #[test]
    fn test_hidden_before_sync_clumps_whitespace() {
        let mut store = TokenStore::new();
        let scan = store.build_scan(FileIndex::MAIN, lex("a\n\n  b")).unwrap();
        let mut builder = TreeBuilder::new(&mut store);
        builder.token(TokenKind::Id, "a", pos(1, 1)).unwrap();
        builder.hidden(TokenKind::Whitespace, "\n\n  ", pos(1, 2));
        let b = builder.token(TokenKind::Id, "b", pos(3, 3)).unwrap();
        builder.finish().unwrap();

        let mut cursor = scan.head();
        assert!(hidden_before_sync(&mut store, b, &mut cursor).unwrap());
        assert_eq!(store.kind(cursor).unwrap(), TokenKind::Whitespace);
        assert_eq!(store.text(cursor).unwrap(), "\n\n  ");
        assert_eq!(store.scan_tokens(&scan).unwrap().len(), 3);
    }

    #[test]
    fn test_hidden_before_sync_reaches_scanner_tail() {
        let mut store = TokenStore::new();
        let scan = store.build_scan(FileIndex::MAIN, lex("a.\n")).unwrap();
        let mut builder = TreeBuilder::new(&mut store);
        builder.token(TokenKind::Id, "a", pos(1, 1)).unwrap();
        builder.token(TokenKind::Period, ".", pos(1, 2)).unwrap();
        builder.hidden(TokenKind::Newline, "\n", pos(1, 3));
        let root = builder.finish().unwrap();
        let tail = store.last_child(root).unwrap().unwrap();

        let mut cursor = scan.head();
        assert!(hidden_before_sync(&mut store, tail, &mut cursor).unwrap());
        assert_eq!(store.text(cursor).unwrap(), "\n");
    }

    #[test]
    fn test_replace_scanner_section_uses_tree_text() {
        let mut store = TokenStore::new();
        let scan = store.build_scan(FileIndex::MAIN, lex("a  +  b.")).unwrap();
        let mut builder = TreeBuilder::new(&mut store);
        let plus = builder.start_operator(TokenKind::Plus, "+", pos(1, 4)).unwrap();
        builder.token(TokenKind::Id, "a", pos(1, 1)).unwrap();
        builder.hidden(TokenKind::Whitespace, " ", pos(1, 5));
        builder.token(TokenKind::Id, "b", pos(1, 7)).unwrap();
        builder.finish_node().unwrap();
        builder.finish().unwrap();

        let tokens = store.scan_tokens(&scan).unwrap();
        let first = tokens[0];
        let last = tokens[tokens.len() - 2];
        replace_scanner_section(&mut store, first, last, plus).unwrap();
        assert_eq!(store.scan_text(&scan).unwrap(), "a+ b.");
    }

    #[test]
    fn test_sync_all_qstrings_counts_matches() {
        let mut store = TokenStore::new();
        let mut scan = store
            .build_scan(FileIndex::MAIN, lex("DISPLAY \"hi there\".\n"))
            .unwrap();
        let (root, _, _) = display_statement(&mut store);

        assert_eq!(sync_all_qstrings(&mut store, root, &mut scan).unwrap(), 1);
        let kinds: Vec<TokenKind> = store
            .scan_tokens(&scan)
            .unwrap()
            .into_iter()
            .map(|id| store.kind(id).unwrap())
            .collect();
        assert!(kinds.contains(&TokenKind::QString));
        assert!(!kinds.contains(&TokenKind::DoubleQuote));
    }
}
