//! Scanner sections for tree branches, with their comments and whitespace

use crate::error::RefactorError;
use crate::result::Result;
use crate::scan::{LooseChain, Scan};
use crate::store::{HiddenToken, NodeId, TokenStore};
use crate::token::TokenKind;

/// Whether the hidden token at `index` starts a run of comments that should
/// stay together
///
/// Returns 1 for two comments back to back, 2 for two comments separated by
/// whitespace holding fewer than two line breaks, 0 otherwise.
pub fn consecutive_comments(hidden: &[HiddenToken], index: usize) -> u8 {
    let Some(first) = hidden.get(index) else {
        return 0;
    };
    if first.kind != TokenKind::Comment {
        return 0;
    }
    match hidden.get(index + 1) {
        Some(next) if next.kind == TokenKind::Comment => 1,
        Some(next) if next.kind.is_whitespace() && next.text.matches('\n').count() < 2 => {
            match hidden.get(index + 2) {
                Some(third) if third.kind == TokenKind::Comment => 2,
                _ => 0,
            }
        }
        _ => 0,
    }
}

/// Find the comments and blank lines that lead into a natural node
///
/// Comments count as leading only if no blank line separates them from the
/// node; the blank lines themselves are carried. A newline that ends the
/// previous statement's line is never included. On success `cursor` points
/// at the first leading token; on failure its position is unspecified.
pub fn find_leading_whitespace(store: &TokenStore, tree_node: NodeId, cursor: &mut NodeId) -> Result<bool> {
    let node = store.node(tree_node)?;
    let hidden = &node.hidden;
    if hidden.is_empty() {
        return Ok(false);
    }

    let mut no_more_comments = false;
    let mut earliest: Option<(u32, u32)> = None;
    // Ends on the earliest token taken, or on the one in front of it that
    // stopped the walk
    let mut index = hidden.len() - 1;
    loop {
        let token = &hidden[index];
        if Some(token.file) != node.file {
            break;
        }
        match token.kind {
            TokenKind::Comment if no_more_comments => break,
            TokenKind::Comment => {}
            kind if kind.is_whitespace() => {
                if token.text.matches('\n').count() >= 2 {
                    no_more_comments = true;
                }
            }
            _ => break,
        }
        earliest = Some((token.line, token.column));
        if index == 0 {
            break;
        }
        index -= 1;
    }
    let Some((line, column)) = earliest.filter(|(line, _)| *line >= 1) else {
        return Ok(false);
    };

    let mut current = *cursor;
    if !store.seek(node.line, node.column, &mut current)? {
        return Ok(false);
    }
    // Walk back rather than seeking forward: whitespace trailing a section
    // that was already cut may sit between the cursor and the target.
    loop {
        let candidate = store.node(current)?;
        if (candidate.line, candidate.column) <= (line, column) {
            break;
        }
        match candidate.prev() {
            Some(previous) => current = previous,
            None => break,
        }
    }

    if store.kind(current)? == TokenKind::Newline {
        if let Some(next) = store.next(current)? {
            *cursor = next;
            return Ok(true);
        }
        return Ok(false);
    }

    // Whitespace, then a comment on the previous statement's line: the
    // comment stays behind and the section starts after it
    match (hidden.get(index + 1), hidden.get(index + 2)) {
        (Some(comment), Some(after))
            if comment.kind == TokenKind::Comment && after.kind.is_whitespace() =>
        {
            if !store.seek(after.line, after.column, &mut current)? {
                return Ok(false);
            }
            if store.kind(current)? == TokenKind::Newline
                && let Some(next) = store.next(current)?
            {
                current = next;
            }
            *cursor = current;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Find the end of the line the branch ends on, carrying same-line comments
///
/// On success `cursor` points at the newline that ends the line.
pub fn find_trailing_whitespace(store: &TokenStore, tree_node: NodeId, cursor: &mut NodeId) -> Result<bool> {
    let Some(after) = store.first_hidden_after_last_descendant(tree_node)? else {
        return Ok(false);
    };
    let file = match store.first_natural_descendant(tree_node)? {
        Some(first) => store.node(first)?.file,
        None => return Ok(false),
    };

    for token in &store.node(after)?.hidden {
        if Some(token.file) != file {
            break;
        }
        match token.kind {
            TokenKind::Comment => continue,
            kind if kind.is_whitespace() => {
                if !token.text.contains('\n') {
                    continue;
                }
                if token.line == 0 {
                    return Ok(false);
                }
                let mut current = *cursor;
                if !store.seek(token.line, token.column, &mut current)? {
                    return Ok(false);
                }
                loop {
                    let node = store.node(current)?;
                    if node.kind.is_sentinel() {
                        return Ok(false);
                    }
                    if node.kind.is_whitespace() && node.text.contains('\n') {
                        *cursor = current;
                        return Ok(true);
                    }
                    match node.next() {
                        Some(next) => current = next,
                        None => return Ok(false),
                    }
                }
            }
            _ => break,
        }
    }
    Ok(false)
}

/// Locate the scanner section for a branch, including leading comments and
/// trailing same-line comments
///
/// Both cursors must start at or before the branch (the list head will do).
/// Fails when the branch has no natural node or begins and ends in
/// different files.
pub fn get_section_with_comments(
    store: &TokenStore,
    tree_node: NodeId,
    begin: &mut NodeId,
    end: &mut NodeId,
) -> Result<bool> {
    let (Some(first), Some(last)) = (
        store.first_natural_descendant(tree_node)?,
        store.last_natural_descendant(tree_node)?,
    ) else {
        return Ok(false);
    };
    let (first_node, last_node) = (store.node(first)?, store.node(last)?);
    if first_node.file != last_node.file {
        return Ok(false);
    }

    let mut section_begin = *begin;
    if !find_leading_whitespace(store, first, &mut section_begin)? {
        section_begin = *begin;
        if !store.seek(first_node.line, first_node.column, &mut section_begin)? {
            return Ok(false);
        }
    }
    let mut section_end = section_begin;
    if !find_trailing_whitespace(store, tree_node, &mut section_end)? {
        section_end = section_begin;
        if !store.seek(last_node.line, last_node.column, &mut section_end)? {
            return Ok(false);
        }
    }

    *begin = section_begin;
    *end = section_end;
    Ok(true)
}

fn section_or_error(store: &TokenStore, tree_node: NodeId, scan: &Scan) -> Result<(NodeId, NodeId)> {
    let mut begin = scan.head();
    let mut end = scan.head();
    if !get_section_with_comments(store, tree_node, &mut begin, &mut end)? {
        let position = match store.first_natural_descendant(tree_node)? {
            Some(first) => store.position_string(first)?,
            None => store.position_string(tree_node)?,
        };
        return Err(RefactorError::refactor(
            position,
            "Failed to get section to cut/paste",
        ));
    }
    Ok((begin, end))
}

/// Mark a branch's section, comments included, to be cut by the next sweep
pub fn mark_branch_to_be_cut(store: &mut TokenStore, tree_node: NodeId, scan: &Scan) -> Result<()> {
    let (begin, end) = section_or_error(store, tree_node, scan)?;
    store.mark_to_be_cut(begin, end)
}

/// Copy a branch's section onto `chain` and mark the original to be cut
pub fn cut_to_chain(
    store: &mut TokenStore,
    tree_node: NodeId,
    scan: &Scan,
    chain: &mut LooseChain,
) -> Result<()> {
    let (begin, end) = section_or_error(store, tree_node, scan)?;
    let (copy_begin, copy_end) = store.copy_and_mark(begin, end)?;
    chain.append_segment(store, copy_begin, copy_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::lex;
    use crate::store::{Position, TreeBuilder};
    use crate::token::FileIndex;

    fn pos(line: u32, column: u32) -> Position {
        Position::new(FileIndex::MAIN, line, column)
    }

    /// x = 1. /* note */
    ///
    /// /* about y */
    /// y = 2.
    /// z = 3.
    const SOURCE: &str = "x = 1. /* note */\n\n/* about y */\ny = 2.\nz = 3.\n";

    struct Program {
        scan: Scan,
        x: NodeId,
        y: NodeId,
    }

    fn assignment(
        builder: &mut TreeBuilder<'_>,
        name: &str,
        line: u32,
        value: &str,
    ) -> NodeId {
        let stmt = builder
            .start_node(TokenKind::Expression, "", None)
            .unwrap();
        builder.token(TokenKind::Id, name, pos(line, 1)).unwrap();
        builder.hidden(TokenKind::Whitespace, " ", pos(line, 2));
        builder.token(TokenKind::Equals, "=", pos(line, 3)).unwrap();
        builder.hidden(TokenKind::Whitespace, " ", pos(line, 4));
        builder.token(TokenKind::Number, value, pos(line, 5)).unwrap();
        builder.token(TokenKind::Period, ".", pos(line, 6)).unwrap();
        builder.finish_node().unwrap();
        stmt
    }

    fn program(store: &mut TokenStore) -> Program {
        build_program(store, false)
    }

    /// Same source, with x and y grouped under a synthetic block so that y
    /// is the block's last child
    fn nested_program(store: &mut TokenStore) -> Program {
        build_program(store, true)
    }

    fn build_program(store: &mut TokenStore, nested: bool) -> Program {
        let scan = store.build_scan(FileIndex::MAIN, lex(SOURCE)).unwrap();
        let mut builder = TreeBuilder::new(store);
        if nested {
            builder.start_node(TokenKind::Expression, "", None).unwrap();
        }
        let x = assignment(&mut builder, "x", 1, "1");
        builder
            .hidden(TokenKind::Whitespace, " ", pos(1, 7))
            .hidden(TokenKind::Comment, "/* note */", pos(1, 8))
            .hidden(TokenKind::Whitespace, "\n\n", pos(1, 18))
            .hidden(TokenKind::Comment, "/* about y */", pos(3, 1))
            .hidden(TokenKind::Whitespace, "\n", pos(3, 14));
        let y = assignment(&mut builder, "y", 4, "2");
        if nested {
            builder.finish_node().unwrap();
        }
        builder.hidden(TokenKind::Whitespace, "\n", pos(4, 7));
        assignment(&mut builder, "z", 5, "3");
        builder.hidden(TokenKind::Whitespace, "\n", pos(5, 7));
        builder.finish().unwrap();
        Program { scan, x, y }
    }

    #[test]
    fn test_consecutive_comments() {
        let p = |line| pos(line, 1);
        let hidden = vec![
            HiddenToken::new(TokenKind::Comment, "/* a */", p(1)),
            HiddenToken::new(TokenKind::Comment, "/* b */", p(1)),
            HiddenToken::new(TokenKind::Whitespace, "\n", p(1)),
            HiddenToken::new(TokenKind::Comment, "/* c */", p(2)),
            HiddenToken::new(TokenKind::Whitespace, "\n\n", p(2)),
            HiddenToken::new(TokenKind::Comment, "/* d */", p(4)),
        ];
        assert_eq!(consecutive_comments(&hidden, 0), 1);
        assert_eq!(consecutive_comments(&hidden, 1), 2);
        assert_eq!(consecutive_comments(&hidden, 3), 0);
        assert_eq!(consecutive_comments(&hidden, 2), 0);
        assert_eq!(consecutive_comments(&hidden, 9), 0);
    }

    #[test]
    fn test_section_carries_blank_line_but_not_detached_comment() {
        let mut store = TokenStore::new();
        let program = program(&mut store);

        let mut begin = program.scan.head();
        let mut end = program.scan.head();
        assert!(get_section_with_comments(&store, program.y, &mut begin, &mut end).unwrap());
        // The same-line comment after `x = 1.` stays with x; the section
        // starts on the blank line and ends with y's newline
        assert_eq!(
            store.copy_to_text(begin, end).unwrap(),
            "\n/* about y */\ny = 2.\n"
        );
    }

    #[test]
    fn test_section_for_first_statement_keeps_trailing_comment() {
        let mut store = TokenStore::new();
        let program = program(&mut store);

        let mut begin = program.scan.head();
        let mut end = program.scan.head();
        assert!(get_section_with_comments(&store, program.x, &mut begin, &mut end).unwrap());
        assert_eq!(store.copy_to_text(begin, end).unwrap(), "x = 1. /* note */\n");
    }

    #[test]
    fn test_cut_to_chain_then_sweep_moves_statement() {
        let mut store = TokenStore::new();
        let program = program(&mut store);

        let mut chain = LooseChain::new();
        cut_to_chain(&mut store, program.x, &program.scan, &mut chain).unwrap();
        store.sweep(&program.scan).unwrap();
        chain.insert_before(&mut store, program.scan.tail()).unwrap();
        assert_eq!(
            store.scan_text(&program.scan).unwrap(),
            "\n/* about y */\ny = 2.\nz = 3.\nx = 1. /* note */\n"
        );
    }

    #[test]
    fn test_mark_branch_to_be_cut() {
        let mut store = TokenStore::new();
        let program = program(&mut store);

        mark_branch_to_be_cut(&mut store, program.y, &program.scan).unwrap();
        store.sweep(&program.scan).unwrap();
        assert_eq!(
            store.scan_text(&program.scan).unwrap(),
            "x = 1. /* note */\nz = 3.\n"
        );
    }

    #[test]
    fn test_section_for_last_child_of_block_ends_on_its_own_line() {
        let mut store = TokenStore::new();
        let program = nested_program(&mut store);

        let mut begin = program.scan.head();
        let mut end = program.scan.head();
        assert!(get_section_with_comments(&store, program.y, &mut begin, &mut end).unwrap());
        assert_eq!(
            store.copy_to_text(begin, end).unwrap(),
            "\n/* about y */\ny = 2.\n"
        );
    }

    #[test]
    fn test_mark_last_child_of_block_to_be_cut() {
        let mut store = TokenStore::new();
        let program = nested_program(&mut store);

        mark_branch_to_be_cut(&mut store, program.y, &program.scan).unwrap();
        store.sweep(&program.scan).unwrap();
        assert_eq!(
            store.scan_text(&program.scan).unwrap(),
            "x = 1. /* note */\nz = 3.\n"
        );
    }

    #[test]
    fn test_cut_last_child_of_block_to_chain_moves_only_that_statement() {
        let mut store = TokenStore::new();
        let program = nested_program(&mut store);

        let mut chain = LooseChain::new();
        cut_to_chain(&mut store, program.y, &program.scan, &mut chain).unwrap();
        store.sweep(&program.scan).unwrap();
        chain.insert_before(&mut store, program.scan.tail()).unwrap();
        assert_eq!(
            store.scan_text(&program.scan).unwrap(),
            "x = 1. /* note */\nz = 3.\n\n/* about y */\ny = 2.\n"
        );
    }

    #[test]
    fn test_branch_without_natural_nodes_is_refactor_error() {
        let mut store = TokenStore::new();
        let scan = store.build_scan(FileIndex::MAIN, lex("x.")).unwrap();
        let mut builder = TreeBuilder::new(&mut store);
        let synthetic = builder.synthetic(TokenKind::Expression, "").unwrap();
        builder.finish().unwrap();

        let err = mark_branch_to_be_cut(&mut store, synthetic, &scan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Refactor);
        assert!(err.to_string().contains("Failed to get section"));
    }
}
