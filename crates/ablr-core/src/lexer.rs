//! Literal scanner for ABL source
//!
//! Produces the fine-grained, unexpanded token stream that scanner lists and
//! preprocessor atoms are built from. Nothing is skipped: whitespace, newlines
//! and comment delimiters all come out as tokens, so concatenating the token
//! texts always reproduces the input.
//!
//! Comments are *not* folded into one token here. `/*` and `*/` are emitted
//! separately and the contents are lexed like code; the preprocessor and the
//! synchronizer clump them when they need to.

use crate::token::TokenKind;
use regex::Regex;
use std::sync::LazyLock;

/// One literal token with its 1-based position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl RawToken {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }
}

static DIRECTIVES: LazyLock<Vec<(Regex, TokenKind)>> = LazyLock::new(|| {
    [
        (r"(?i)^&if$", TokenKind::AmpIf),
        (r"(?i)^&then$", TokenKind::AmpThen),
        (r"(?i)^&elseif$", TokenKind::AmpElseIf),
        (r"(?i)^&else$", TokenKind::AmpElse),
        (r"(?i)^&endif$", TokenKind::AmpEndIf),
        (r"(?i)^&glob(al)?(-define)?$", TokenKind::AmpGlobalDefine),
        (r"(?i)^&scop(ed)?(-define)?$", TokenKind::AmpScopedDefine),
        (r"(?i)^&undef(ine)?$", TokenKind::AmpUndefine),
        (r"(?i)^&message$", TokenKind::AmpMessage),
        (r"(?i)^&analyze-suspend$", TokenKind::AmpAnalyzeSuspend),
        (r"(?i)^&analyze-resume$", TokenKind::AmpAnalyzeResume),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("valid directive pattern"), kind))
    .collect()
});

/// Classify an `&word` as a preprocessor directive
pub fn directive_kind(word: &str) -> Option<TokenKind> {
    DIRECTIVES
        .iter()
        .find(|(pattern, _)| pattern.is_match(word))
        .map(|(_, kind)| *kind)
}

/// Lex ABL source into literal tokens
pub fn lex(input: &str) -> Vec<RawToken> {
    lex_at(input, 1, 1)
}

/// Lex source text whose first character sits at `line`/`column`
pub fn lex_at(input: &str, line: u32, column: u32) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    let len = input.len();
    let mut i = 0usize;
    let mut line = line;
    let mut column = column;

    while i < len {
        let Some((current, size)) = next_char(input, i) else {
            break;
        };
        let start = i;

        let (kind, end) = match current {
            '\n' => (TokenKind::Newline, i + size),
            '\r' => {
                // Handle \r\n as single newline
                match next_char(input, i + size) {
                    Some(('\n', nl_size)) => (TokenKind::Newline, i + size + nl_size),
                    _ => (TokenKind::Newline, i + size),
                }
            }
            c if is_blank(c) => {
                let mut end = i + size;
                while let Some((c, step)) = next_char(input, end) {
                    if !is_blank(c) {
                        break;
                    }
                    end += step;
                }
                (TokenKind::Whitespace, end)
            }
            '/' if peek_is(input, i + size, '*') => (TokenKind::CommentStart, i + 2),
            '*' if peek_is(input, i + size, '/') => (TokenKind::CommentEnd, i + 2),
            '{' => lex_curly(input, i),
            '}' => (TokenKind::RightCurly, i + size),
            '~' => (TokenKind::Tilde, i + size),
            '\\' => (TokenKind::Backslash, i + size),
            '"' => (TokenKind::DoubleQuote, i + size),
            '\'' => (TokenKind::SingleQuote, i + size),
            '&' => lex_amp(input, i),
            c if c.is_ascii_digit() => (TokenKind::Number, lex_number(input, i)),
            c if c.is_alphabetic() || c == '_' => (TokenKind::Id, lex_word(input, i + size)),
            '.' => (TokenKind::Period, i + size),
            ':' => (TokenKind::Colon, i + size),
            ',' => (TokenKind::Comma, i + size),
            '(' => (TokenKind::LeftParen, i + size),
            ')' => (TokenKind::RightParen, i + size),
            '=' => (TokenKind::Equals, i + size),
            '+' => (TokenKind::Plus, i + size),
            '-' => (TokenKind::Minus, i + size),
            '*' => (TokenKind::Star, i + size),
            '/' => (TokenKind::Slash, i + size),
            '<' => (TokenKind::LessThan, i + size),
            '>' => (TokenKind::GreaterThan, i + size),
            _ => (TokenKind::Unknown, i + size),
        };

        let text = &input[start..end];
        tokens.push(RawToken::new(kind, text, line, column));
        if kind == TokenKind::Newline {
            line += 1;
            column = 1;
        } else {
            column += text.chars().count() as u32;
        }
        i = end;
    }

    tokens
}

/// `{`, `{&`, `{*` or `{` followed by digits
fn lex_curly(input: &str, start: usize) -> (TokenKind, usize) {
    let after = start + 1;
    match next_char(input, after) {
        Some(('&', _)) => (TokenKind::CurlyAmp, after + 1),
        Some(('*', _)) => (TokenKind::CurlyStar, after + 1),
        Some((c, _)) if c.is_ascii_digit() => {
            let mut end = after;
            while let Some((c, step)) = next_char(input, end) {
                if !c.is_ascii_digit() {
                    break;
                }
                end += step;
            }
            (TokenKind::CurlyNumber, end)
        }
        _ => (TokenKind::LeftCurly, after),
    }
}

/// A directive if `&word` names one, otherwise a lone `&`
fn lex_amp(input: &str, start: usize) -> (TokenKind, usize) {
    let mut end = start + 1;
    while let Some((c, step)) = next_char(input, end) {
        if !(c.is_ascii_alphabetic() || c == '-') {
            break;
        }
        end += step;
    }
    match directive_kind(&input[start..end]) {
        Some(kind) => (kind, end),
        None => (TokenKind::Amp, start + 1),
    }
}

fn lex_number(input: &str, start: usize) -> usize {
    let mut end = start;
    while let Some((c, step)) = next_char(input, end) {
        if c.is_ascii_digit() {
            end += step;
        } else if c == '.'
            && let Some((d, _)) = next_char(input, end + 1)
            && d.is_ascii_digit()
        {
            end += step;
        } else {
            break;
        }
    }
    end
}

/// Rest of an identifier; ABL names may contain hyphens and a few symbols
fn lex_word(input: &str, mut end: usize) -> usize {
    while let Some((c, step)) = next_char(input, end) {
        if c.is_alphanumeric() || matches!(c, '_' | '-' | '#' | '$' | '%') {
            end += step;
        } else {
            break;
        }
    }
    end
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

fn peek_is(input: &str, pos: usize, expected: char) -> bool {
    matches!(next_char(input, pos), Some((c, _)) if c == expected)
}

/// Get next character at position
fn next_char(input: &str, pos: usize) -> Option<(char, usize)> {
    input.get(pos..)?.chars().next().map(|c| (c, c.len_utf8()))
}
