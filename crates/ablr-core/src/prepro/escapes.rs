//! Escape and comment stripping for preprocessor text

use super::atom::{AtomId, AtomPool};
use crate::token::TokenKind;

fn is_escape_char(c: char, unix: bool) -> bool {
    c == '~' || (unix && c == '\\')
}

/// Resolve escape sequences in `text`
///
/// `~n` and `~r` become newline and carriage return. An escaped line end is
/// removed entirely, together with any carriage returns in front of its
/// newline; carriage returns that no newline follows are kept. Any other
/// escaped character is kept without its marker. With `unix`, a backslash
/// escapes like `~` does.
pub fn strip_escapes(text: &str, unix: bool) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if !is_escape_char(c, unix) {
            result.push(c);
            continue;
        }
        let Some(&escaped) = chars.peek() else {
            result.push(c);
            break;
        };
        chars.next();
        match escaped {
            'n' => result.push('\n'),
            'r' => result.push('\r'),
            '\n' => {}
            '\r' => {
                let mut returns = 1;
                while chars.peek() == Some(&'\r') {
                    chars.next();
                    returns += 1;
                }
                if chars.peek() == Some(&'\n') {
                    chars.next();
                } else {
                    result.extend(std::iter::repeat_n('\r', returns));
                }
            }
            other => result.push(other),
        }
    }
    result
}

/// Remove `/* ... */` comments, which may nest
///
/// An unterminated comment swallows the rest of the text.
pub fn strip_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('*')) => {
                chars.next();
                depth += 1;
            }
            ('*', Some('/')) if depth > 0 => {
                chars.next();
                depth -= 1;
            }
            _ if depth == 0 => result.push(c),
            _ => {}
        }
    }
    result
}

/// Whether the atom is preceded by an odd run of escape atoms
pub fn is_escaped(atoms: &AtomPool, atom: AtomId, unix: bool) -> bool {
    let mut escapes = 0usize;
    let mut current = atoms.prev(atom);
    while let Some(id) = current {
        match atoms.kind(id) {
            TokenKind::Tilde => escapes += 1,
            TokenKind::Backslash if unix => escapes += 1,
            _ => break,
        }
        current = atoms.prev(id);
    }
    escapes % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::token::FileIndex;

    #[test]
    fn test_escape_sequences() {
        assert_eq!(strip_escapes("a~nb~rc", false), "a\nb\rc");
        assert_eq!(strip_escapes("~{x~}", false), "{x}");
        assert_eq!(strip_escapes("a~tb~xc", false), "atbxc");
        assert_eq!(strip_escapes("~101~1", false), "1011");
        assert_eq!(strip_escapes("~N~R", false), "NR");
        assert_eq!(strip_escapes("end~", false), "end~");
    }

    #[test]
    fn test_escaped_newline_is_removed() {
        assert_eq!(strip_escapes("x~\n y", false), "x y");
        assert_eq!(strip_escapes("x~\r\n y", false), "x y");
        assert_eq!(strip_escapes("x~\r\r\n y", false), "x y");
    }

    #[test]
    fn test_escaped_lone_carriage_return_is_kept() {
        assert_eq!(strip_escapes("x~\ry", false), "x\ry");
        assert_eq!(strip_escapes("x~\r\ry", false), "x\r\ry");
        assert_eq!(strip_escapes("x~\r", false), "x\r");
    }

    #[test]
    fn test_backslash_only_escapes_on_unix() {
        assert_eq!(strip_escapes(r"a\nb", true), "a\nb");
        assert_eq!(strip_escapes(r"a\nb", false), r"a\nb");
    }

    #[test]
    fn test_nested_comments() {
        assert_eq!(strip_comments("a /* b /* c */ d */ e"), "a  e");
        assert_eq!(strip_comments("x */ y"), "x */ y");
        assert_eq!(strip_comments("keep /* open"), "keep ");
    }

    #[test]
    fn test_is_escaped_counts_runs() {
        let mut atoms = AtomPool::new();
        let first = atoms.push_chain(FileIndex::MAIN, lex("~{ ~~{ \\{")).unwrap();
        let ids: Vec<AtomId> = std::iter::successors(Some(first), |id| atoms.next(*id)).collect();
        let curlies: Vec<AtomId> = ids
            .iter()
            .copied()
            .filter(|id| atoms.kind(*id) == TokenKind::LeftCurly)
            .collect();

        assert!(is_escaped(&atoms, curlies[0], false));
        assert!(!is_escaped(&atoms, curlies[1], false));
        assert!(!is_escaped(&atoms, curlies[2], false));
        assert!(is_escaped(&atoms, curlies[2], true));
    }
}
