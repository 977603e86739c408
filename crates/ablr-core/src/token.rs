//! Token kinds and file indices shared by the scanner, the tree and the
//! preprocessor model.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of a scanner token, tree node, hidden token or atom
///
/// Kinds are grouped in ranges:
/// - Trivia (0-9)
/// - Punctuation and escape characters (10-49)
/// - Preprocessor directives (50-69)
/// - Literals and identifiers (70-99)
/// - Tree-only kinds (100-199)
/// - Scanner sentinels (200-249)
/// - Expansion-tree-only kinds (250+)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum TokenKind {
    // ==================
    // Trivia (0-9)
    // ==================
    /// Spaces, tabs and form feeds
    Whitespace = 0,
    /// `\n` or `\r\n`
    Newline = 1,
    /// A complete comment, as carried by hidden tokens and clumped scans
    Comment = 2,
    /// `/*`
    CommentStart = 3,
    /// `*/`
    CommentEnd = 4,

    // ==================
    // Punctuation (10-49)
    // ==================
    Tilde = 10,
    Backslash = 11,
    DoubleQuote = 12,
    SingleQuote = 13,
    /// `{` opening an include reference
    LeftCurly = 14,
    RightCurly = 15,
    /// `{&`
    CurlyAmp = 16,
    /// `{*`
    CurlyStar = 17,
    /// `{` followed by digits, e.g. `{1`
    CurlyNumber = 18,
    Period = 19,
    Colon = 20,
    Comma = 21,
    LeftParen = 22,
    RightParen = 23,
    Equals = 24,
    Plus = 25,
    Minus = 26,
    Star = 27,
    Slash = 28,
    LessThan = 29,
    GreaterThan = 30,
    /// `&` not starting a directive
    Amp = 31,
    /// Any character the scanner has no better kind for
    Unknown = 32,

    // ==================
    // Directives (50-69)
    // ==================
    AmpIf = 50,
    AmpThen = 51,
    AmpElseIf = 52,
    AmpElse = 53,
    AmpEndIf = 54,
    AmpGlobalDefine = 55,
    AmpScopedDefine = 56,
    AmpUndefine = 57,
    AmpMessage = 58,
    AmpAnalyzeSuspend = 59,
    AmpAnalyzeResume = 60,

    // ==================
    // Literals (70-99)
    // ==================
    Id = 70,
    Number = 71,
    QString = 72,
    Filename = 73,

    // ==================
    // Tree kinds (100-199)
    // ==================
    ProgramRoot = 100,
    ProgramTail = 101,
    /// Reserved word heading a statement or phrase
    Keyword = 102,
    /// Synthetic grouping node
    Expression = 103,

    // ==================
    // Sentinels (200-249)
    // ==================
    ScannerHead = 200,
    ScannerTail = 201,

    // ==================
    // Expansion tree (250+)
    // ==================
    /// The `&IF ... &ENDIF` chain folded into one token
    AmpIfConditional = 250,
}

impl TokenKind {
    /// Whitespace or newline
    pub const fn is_whitespace(self) -> bool {
        matches!(self, Self::Whitespace | Self::Newline)
    }

    /// Kinds that ride on a tree node's hidden-token chain
    pub const fn is_hidden(self) -> bool {
        matches!(self, Self::Whitespace | Self::Newline | Self::Comment)
    }

    pub const fn is_directive(self) -> bool {
        (self as u16) >= 50 && (self as u16) < 70
    }

    /// Kinds that open a curly reference
    pub const fn is_curly_start(self) -> bool {
        matches!(
            self,
            Self::LeftCurly | Self::CurlyAmp | Self::CurlyStar | Self::CurlyNumber
        )
    }

    pub const fn is_quote(self) -> bool {
        matches!(self, Self::DoubleQuote | Self::SingleQuote)
    }

    pub const fn is_sentinel(self) -> bool {
        matches!(self, Self::ScannerHead | Self::ScannerTail)
    }

    /// Directives that end an `&IF` branch body
    pub const fn is_branch_end(self) -> bool {
        matches!(self, Self::AmpElseIf | Self::AmpElse | Self::AmpEndIf)
    }

    /// Directives whose extent runs to the end of the (unescaped) line
    pub const fn runs_to_line_end(self) -> bool {
        matches!(
            self,
            Self::AmpGlobalDefine
                | Self::AmpScopedDefine
                | Self::AmpUndefine
                | Self::AmpMessage
                | Self::AmpAnalyzeSuspend
                | Self::AmpAnalyzeResume
        )
    }

    /// Upper-case name used in dumps
    pub const fn name(self) -> &'static str {
        match self {
            Self::Whitespace => "WS",
            Self::Newline => "NEWLINE",
            Self::Comment => "COMMENT",
            Self::CommentStart => "COMMENTSTART",
            Self::CommentEnd => "COMMENTEND",
            Self::Tilde => "TILDE",
            Self::Backslash => "BACKSLASH",
            Self::DoubleQuote => "DOUBLEQUOTE",
            Self::SingleQuote => "SINGLEQUOTE",
            Self::LeftCurly => "LEFTCURLY",
            Self::RightCurly => "RIGHTCURLY",
            Self::CurlyAmp => "CURLYAMP",
            Self::CurlyStar => "CURLYSTAR",
            Self::CurlyNumber => "CURLYNUMBER",
            Self::Period => "PERIOD",
            Self::Colon => "COLON",
            Self::Comma => "COMMA",
            Self::LeftParen => "LEFTPAREN",
            Self::RightParen => "RIGHTPAREN",
            Self::Equals => "EQUAL",
            Self::Plus => "PLUS",
            Self::Minus => "MINUS",
            Self::Star => "STAR",
            Self::Slash => "SLASH",
            Self::LessThan => "LEFTANGLE",
            Self::GreaterThan => "RIGHTANGLE",
            Self::Amp => "AMP",
            Self::Unknown => "UNKNOWN",
            Self::AmpIf => "AMPIF",
            Self::AmpThen => "AMPTHEN",
            Self::AmpElseIf => "AMPELSEIF",
            Self::AmpElse => "AMPELSE",
            Self::AmpEndIf => "AMPENDIF",
            Self::AmpGlobalDefine => "AMPGLOBALDEFINE",
            Self::AmpScopedDefine => "AMPSCOPEDDEFINE",
            Self::AmpUndefine => "AMPUNDEFINE",
            Self::AmpMessage => "AMPMESSAGE",
            Self::AmpAnalyzeSuspend => "AMPANALYZESUSPEND",
            Self::AmpAnalyzeResume => "AMPANALYZERESUME",
            Self::Id => "ID",
            Self::Number => "NUMBER",
            Self::QString => "QSTRING",
            Self::Filename => "FILENAME",
            Self::ProgramRoot => "Program_root",
            Self::ProgramTail => "Program_tail",
            Self::Keyword => "KEYWORD",
            Self::Expression => "EXPRESSION",
            Self::ScannerHead => "Scanner_head",
            Self::ScannerTail => "Scanner_tail",
            Self::AmpIfConditional => "AMPIF_CONDITIONAL",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Index of a source file within one compile unit; 0 is the main file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileIndex(pub u32);

impl FileIndex {
    pub const MAIN: FileIndex = FileIndex(0);

    pub fn is_main(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interning table between file indices and paths
#[derive(Debug, Clone, Default)]
pub struct FileTable {
    paths: Vec<PathBuf>,
    lookup: HashMap<PathBuf, FileIndex>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index for `path`, assigning the next free one if unseen
    pub fn intern(&mut self, path: impl AsRef<Path>) -> FileIndex {
        let path = path.as_ref();
        if let Some(index) = self.lookup.get(path) {
            return *index;
        }
        let index = FileIndex(self.paths.len() as u32);
        self.paths.push(path.to_path_buf());
        self.lookup.insert(path.to_path_buf(), index);
        index
    }

    pub fn index_of(&self, path: impl AsRef<Path>) -> Option<FileIndex> {
        self.lookup.get(path.as_ref()).copied()
    }

    pub fn path(&self, index: FileIndex) -> Option<&Path> {
        self.paths.get(index.0 as usize).map(PathBuf::as_path)
    }

    /// Display name for positions; unknown indices render as `#n`
    pub fn display_name(&self, index: FileIndex) -> String {
        match self.path(index) {
            Some(path) => path.display().to_string(),
            None => format!("#{index}"),
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
