//! Insert points for new code in front of a tree node

use crate::result::Result;
use crate::scan::Scan;
use crate::store::{HiddenToken, NodeId, TokenStore};
use crate::token::{FileIndex, TokenKind};
use tracing::debug;

/// What an include reference was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeParent {
    /// Directly in a source file
    File(FileIndex),
    /// Inside the expansion of a `{&name}` reference
    Macro,
}

/// One `{file.i}` reference: where it was written and what it pulled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeReference {
    pub file: FileIndex,
    pub parent: IncludeParent,
    /// Position of the opening curly in the parent file
    pub line: u32,
    pub column: u32,
}

/// Include references of one compile unit, in source order
#[derive(Debug, Clone, Default)]
pub struct IncludeListing {
    references: Vec<IncludeReference>,
}

impl IncludeListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reference: IncludeReference) {
        self.references.push(reference);
    }

    pub fn references(&self) -> &[IncludeReference] {
        &self.references
    }

    /// The first place `file` was included from
    pub fn first_reference(&self, file: FileIndex) -> Option<&IncludeReference> {
        self.references.iter().find(|reference| reference.file == file)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Find where to insert new statements in `scan`'s file, in front of
/// `tree_node`
///
/// The insert point always starts a line, so new code never lands between a
/// statement and its same-line comment. On success `cursor` is the token to
/// insert in front of. Failure is routine: the node may sit in an include
/// that `scan`'s file never references directly.
pub fn get_insert_point_in_file(
    store: &TokenStore,
    tree_node: NodeId,
    scan: &mut Scan,
    listing: &IncludeListing,
    cursor: &mut NodeId,
) -> Result<bool> {
    let target = scan.file();

    if store.kind(tree_node)? == TokenKind::ProgramTail {
        *cursor = scan.tail();
        return Ok(true);
    }

    let Some(first) = store.first_natural_descendant(tree_node)? else {
        return Ok(false);
    };
    let node = store.node(first)?;

    if node.line == 1 && node.column == 1 && node.file == Some(target) {
        return match store.next(scan.head())? {
            Some(next) => {
                *cursor = next;
                Ok(true)
            }
            None => Ok(false),
        };
    }

    if node.hidden.is_empty() {
        return Ok(false);
    }

    // As early in the hidden tokens as possible, but not before the first
    // line break: anything ahead of it trails the previous statement.
    let mut seen_line_break = false;
    for (index, token) in node.hidden.iter().enumerate() {
        if token.file != target {
            continue;
        }
        if token.line == 1 && token.column == 1 {
            return get_insert_point_from_top(store, &node.hidden, index, scan, cursor);
        }
        if !seen_line_break {
            if !(token.kind.is_whitespace() && token.text.contains('\n')) {
                continue;
            }
            seen_line_break = true;
        }
        let mut found = scan.head();
        if store.seek_from_top(scan, token.line, token.column, &mut found)? {
            if store.kind(found)? == TokenKind::Newline
                && let Some(next) = store.next(found)?
            {
                found = next;
            }
            *cursor = found;
            return Ok(true);
        }
    }

    // The whitespace in front of the node may have begun in another file
    if node.file == Some(target) {
        let mut found = scan.head();
        if !store.seek_from_top(scan, node.line, node.column, &mut found)? {
            return Ok(false);
        }
        let preceded_by_blanks = match store.prev(found)? {
            Some(previous) => store.kind(previous)? == TokenKind::Whitespace,
            None => false,
        };
        if !preceded_by_blanks {
            *cursor = found;
            return Ok(true);
        }
    }

    // Node at the top of an include: insert in front of the reference, as
    // long as it sits directly in the target file
    let Some(file) = node.file.filter(|file| !file.is_main()) else {
        return Ok(false);
    };
    let Some(reference) = listing.first_reference(file) else {
        debug!("No include reference recorded for file {file}");
        return Ok(false);
    };
    if reference.parent != IncludeParent::File(target) {
        return Ok(false);
    }
    let mut found = scan.head();
    if store.seek_from_top(scan, reference.line, reference.column, &mut found)?
        && store.kind(found)? == TokenKind::LeftCurly
    {
        *cursor = found;
        return Ok(true);
    }
    Ok(false)
}

/// Insert point for a node whose hidden tokens start the file: after the
/// leading comments, in front of the last of them
pub fn get_insert_point_from_top(
    store: &TokenStore,
    hidden: &[HiddenToken],
    start: usize,
    scan: &mut Scan,
    cursor: &mut NodeId,
) -> Result<bool> {
    let target = scan.file();
    let mut index = start;
    while index + 1 < hidden.len() {
        let next = &hidden[index + 1];
        if next.file != target || !next.kind.is_hidden() {
            break;
        }
        index += 1;
    }
    let token = &hidden[index];
    let mut found = scan.head();
    if store.seek_from_top(scan, token.line, token.column, &mut found)? {
        *cursor = found;
        return Ok(true);
    }
    Ok(false)
}
