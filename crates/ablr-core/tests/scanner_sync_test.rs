//! Integration tests for scanner list edits and tree synchronization

use ablr_core::lexer::{RawToken, lex};
use ablr_core::store::{Position, TokenStore, TreeBuilder};
use ablr_core::sync::{
    IncludeListing, IncludeParent, IncludeReference, get_insert_point_in_file, msync_branch, nsync,
};
use ablr_core::{FileIndex, TokenKind};

fn pos(line: u32, column: u32) -> Position {
    Position::new(FileIndex::MAIN, line, column)
}

#[test]
fn test_copy_and_mark_then_sweep_empties_list() {
    let mut store = TokenStore::new();
    let scan = store
        .build_scan(
            FileIndex::MAIN,
            vec![
                RawToken::new(TokenKind::Id, "DISPLAY", 1, 1),
                RawToken::new(TokenKind::Whitespace, " ", 1, 8),
                RawToken::new(TokenKind::QString, "\"hi\"", 1, 9),
                RawToken::new(TokenKind::Period, ".", 1, 13),
            ],
        )
        .unwrap();

    let first = store.next(scan.head()).unwrap().unwrap();
    let last = store.prev(scan.tail()).unwrap().unwrap();
    let (copy_start, copy_end) = store.copy_and_mark(first, last).unwrap();
    store.sweep(&scan).unwrap();

    assert!(store.scan_tokens(&scan).unwrap().is_empty());
    assert_eq!(store.next(scan.head()).unwrap(), Some(scan.tail()));
    assert_eq!(store.copy_to_text(copy_start, copy_end).unwrap(), "DISPLAY \"hi\".");
}

#[test]
fn test_sweep_keeps_unmarked_tokens_in_order() {
    let mut store = TokenStore::new();
    let scan = store
        .build_scan(FileIndex::MAIN, lex("a b c d e f\n"))
        .unwrap();
    let tokens = store.scan_tokens(&scan).unwrap();

    // Cut "b" and "d e" including the blanks in front of them
    store.mark_to_be_cut(tokens[1], tokens[2]).unwrap();
    store.mark_to_be_cut(tokens[5], tokens[8]).unwrap();
    store.sweep(&scan).unwrap();

    assert_eq!(store.scan_text(&scan).unwrap(), "a c f\n");
    let mut seen = Vec::new();
    let mut current = store.next(scan.head()).unwrap();
    while let Some(id) = current {
        if id == scan.tail() {
            break;
        }
        seen.push(id);
        current = store.next(id).unwrap();
    }
    let expected: Vec<_> = tokens
        .iter()
        .enumerate()
        .filter(|(i, _)| !matches!(*i, 1 | 2 | 5..=8))
        .map(|(_, id)| *id)
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_insert_point_at_top_of_file() {
    let mut store = TokenStore::new();
    let mut scan = store
        .build_scan(FileIndex::MAIN, lex("DISPLAY x.\nDISPLAY y.\n"))
        .unwrap();
    let mut builder = TreeBuilder::new(&mut store);
    let stmt = builder
        .start_node(TokenKind::Keyword, "DISPLAY", Some(pos(1, 1)))
        .unwrap();
    builder.finish_node().unwrap();
    builder.finish().unwrap();

    let mut cursor = scan.head();
    assert!(
        get_insert_point_in_file(&store, stmt, &mut scan, &IncludeListing::new(), &mut cursor)
            .unwrap()
    );
    assert_eq!(Some(cursor), store.next(scan.head()).unwrap());
}

#[test]
fn test_insert_point_for_include_top_is_the_reference() {
    let mut store = TokenStore::new();
    let main = store.files_mut().intern("/src/main.p");
    let include = store.files_mut().intern("/src/inc.i");
    let mut scan = store
        .build_scan(main, lex("DISPLAY 1.\n{inc.i}\n"))
        .unwrap();
    let mut listing = IncludeListing::new();
    listing.push(IncludeReference {
        file: include,
        parent: IncludeParent::File(main),
        line: 2,
        column: 1,
    });

    let mut builder = TreeBuilder::new(&mut store);
    builder
        .hidden(TokenKind::Comment, "/* c */", Position::new(include, 1, 1))
        .hidden(TokenKind::Whitespace, " ", Position::new(include, 1, 8));
    let stmt = builder
        .start_node(TokenKind::Keyword, "DISPLAY", Some(Position::new(include, 1, 9)))
        .unwrap();
    builder.finish_node().unwrap();
    builder.finish().unwrap();

    let mut cursor = scan.head();
    assert!(get_insert_point_in_file(&store, stmt, &mut scan, &listing, &mut cursor).unwrap());
    let node = store.node(cursor).unwrap();
    assert_eq!(node.kind, TokenKind::LeftCurly);
    assert_eq!((node.line, node.column), (2, 1));

    // Referenced only from inside a macro: no insert point in the file
    let mut from_macro = IncludeListing::new();
    from_macro.push(IncludeReference {
        file: include,
        parent: IncludeParent::Macro,
        line: 2,
        column: 1,
    });
    let mut cursor = scan.head();
    assert!(!get_insert_point_in_file(&store, stmt, &mut scan, &from_macro, &mut cursor).unwrap());
}

#[test]
fn test_nsync_is_idempotent() {
    let mut store = TokenStore::new();
    let scan = store
        .build_scan(FileIndex::MAIN, lex("MESSAGE \"a b c\".\n"))
        .unwrap();
    let mut builder = TreeBuilder::new(&mut store);
    let string = builder
        .token(TokenKind::QString, "\"a b c\"", pos(1, 9))
        .unwrap();
    builder.finish().unwrap();

    let mut first = scan.head();
    assert!(nsync(&mut store, string, &mut first).unwrap());
    let text = store.scan_text(&scan).unwrap();
    let count = store.scan_tokens(&scan).unwrap().len();

    let mut second = scan.head();
    assert!(nsync(&mut store, string, &mut second).unwrap());
    assert_eq!(first, second);
    assert_eq!(store.scan_text(&scan).unwrap(), text);
    assert_eq!(store.scan_tokens(&scan).unwrap().len(), count);
    assert_eq!(store.kind(first).unwrap(), TokenKind::QString);
}

#[test]
fn test_msync_branch_covers_statement_with_hidden_tokens() {
    let mut store = TokenStore::new();
    let source = "DISPLAY /* what */ x\n  y.\n";
    let scan = store.build_scan(FileIndex::MAIN, lex(source)).unwrap();

    let mut builder = TreeBuilder::new(&mut store);
    let stmt = builder
        .start_node(TokenKind::Keyword, "DISPLAY", Some(pos(1, 1)))
        .unwrap();
    builder
        .hidden(TokenKind::Whitespace, " ", pos(1, 8))
        .hidden(TokenKind::Comment, "/* what */", pos(1, 9))
        .hidden(TokenKind::Whitespace, " ", pos(1, 19));
    builder.token(TokenKind::Id, "x", pos(1, 20)).unwrap();
    builder
        .hidden(TokenKind::Newline, "\n", pos(1, 21))
        .hidden(TokenKind::Whitespace, "  ", pos(2, 1));
    builder.token(TokenKind::Id, "y", pos(2, 3)).unwrap();
    builder.token(TokenKind::Period, ".", pos(2, 4)).unwrap();
    builder.finish_node().unwrap();
    builder.finish().unwrap();

    let mut c1 = scan.head();
    let mut c2 = scan.head();
    assert!(msync_branch(&mut store, stmt, &mut c1, &mut c2).unwrap());
    assert_eq!(
        store.copy_to_text(c1, c2).unwrap(),
        "DISPLAY /* what */ x\n  y."
    );
    assert_eq!(store.scan_text(&scan).unwrap(), source);
}
