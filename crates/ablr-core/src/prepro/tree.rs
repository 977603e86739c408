//! The expansion tree: tokens, the expansions hanging off them, and the
//! declarations they make

use super::atom::{AtomId, AtomPool};
use super::include_args::IncludeArgs;
use super::scope::DeclarationKind;
use super::source::{SourceFile, SourceId};
use crate::sync::{IncludeListing, IncludeParent, IncludeReference};
use crate::token::{FileTable, TokenKind};
use std::fmt::Write as _;
use std::path::Path;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn index(self) -> u32 {
                self.0
            }

            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }
        }
    };
}

arena_id!(TokenId);
arena_id!(ExpansionId);
arena_id!(DeclarationId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenParent {
    Expansion(ExpansionId),
    /// A curly reference nested in a string, another curly reference or a
    /// directive
    Token(TokenId),
}

/// A run of atoms `[first_atom, terminator)` treated as one unit
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub first_atom: AtomId,
    pub terminator: Option<AtomId>,
    pub parent: TokenParent,
    pub next: Option<TokenId>,
    pub prev: Option<TokenId>,
    /// Alternatives this token expands to; at most one is primary
    pub expansions: Vec<ExpansionId>,
    pub nested: Vec<TokenId>,
    pub declaration: Option<DeclarationId>,
}

#[derive(Debug, Clone)]
pub struct IncludeExpansion {
    /// `None` when the file could not be found inside an inactive branch
    pub source: Option<SourceId>,
    pub args: IncludeArgs,
}

#[derive(Debug, Clone)]
pub struct MacroExpansion {
    pub name: String,
    pub declaration: Option<DeclarationId>,
}

/// One `&IF`, `&ELSEIF` or `&ELSE` branch
#[derive(Debug, Clone)]
pub struct ConditionalExpansion {
    /// The directive token, followed by the condition tokens up to `&THEN`
    pub first_condition_token: TokenId,
    /// Evaluated condition; `None` for `&ELSE` or when evaluation failed
    pub condition: Option<bool>,
}

#[derive(Debug, Clone)]
pub enum ExpansionKind {
    Include(IncludeExpansion),
    Macro(MacroExpansion),
    Conditional(ConditionalExpansion),
}

#[derive(Debug, Clone)]
pub struct Expansion {
    /// `None` only for the main file
    pub parent: Option<TokenId>,
    /// First token of the expanded text (a conditional's body)
    pub first_token: Option<TokenId>,
    pub primary: bool,
    /// Set by a consumer once this expansion has been run through a parser
    pub parsed: bool,
    /// Expansions whose text built the reference this one came from
    pub derivation: Vec<ExpansionId>,
    pub kind: ExpansionKind,
}

/// A preprocessor name and its value
#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub kind: DeclarationKind,
    /// The defining directive; `None` for arguments and predefined names
    pub token: Option<TokenId>,
    /// The value as a ref chain, nested references already substituted
    pub value_atoms: Option<AtomId>,
    /// Position of a numbered argument, 1-based
    pub number: Option<usize>,
}

/// Which half of a conditional the walk is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Condition,
    Body,
}

/// Callbacks for [`ExpansionTree::walk`]
pub trait ExpansionVisitor {
    fn enter_token(&mut self, _tree: &ExpansionTree, _token: TokenId) {}
    fn exit_token(&mut self, _tree: &ExpansionTree, _token: TokenId) {}
    fn enter_expansion(&mut self, _tree: &ExpansionTree, _expansion: ExpansionId) {}
    fn exit_expansion(&mut self, _tree: &ExpansionTree, _expansion: ExpansionId) {}
    fn enter_section(&mut self, _tree: &ExpansionTree, _section: Section) {}
    fn exit_section(&mut self, _tree: &ExpansionTree, _section: Section) {}
}

/// Every include, macro and conditional possibility of one compile unit
#[derive(Debug, Default)]
pub struct ExpansionTree {
    tokens: Vec<Token>,
    expansions: Vec<Expansion>,
    declarations: Vec<Declaration>,
    root: Option<ExpansionId>,
    atoms: AtomPool,
    files: FileTable,
    sources: Vec<SourceFile>,
}

impl ExpansionTree {
    pub(super) fn new_token(&mut self, parent: TokenParent, first_atom: AtomId, kind: TokenKind) -> TokenId {
        let id = TokenId(self.tokens.len() as u32);
        self.tokens.push(Token {
            kind,
            first_atom,
            terminator: None,
            parent,
            next: None,
            prev: None,
            expansions: Vec::new(),
            nested: Vec::new(),
            declaration: None,
        });
        id
    }

    pub(super) fn new_expansion(&mut self, parent: Option<TokenId>, kind: ExpansionKind) -> ExpansionId {
        let id = ExpansionId(self.expansions.len() as u32);
        self.expansions.push(Expansion {
            parent,
            first_token: None,
            primary: false,
            parsed: false,
            derivation: Vec::new(),
            kind,
        });
        if let Some(token) = parent {
            self.tokens[token.0 as usize].expansions.push(id);
        }
        id
    }

    pub(super) fn new_declaration(&mut self, declaration: Declaration) -> DeclarationId {
        let id = DeclarationId(self.declarations.len() as u32);
        self.declarations.push(declaration);
        id
    }

    pub(super) fn link(&mut self, prev: TokenId, next: TokenId) {
        self.tokens[prev.0 as usize].next = Some(next);
        self.tokens[next.0 as usize].prev = Some(prev);
    }

    pub(super) fn set_root(&mut self, root: ExpansionId) {
        self.root = Some(root);
    }

    pub(super) fn attach_sources(&mut self, files: FileTable, sources: Vec<SourceFile>, atoms: AtomPool) {
        self.files = files;
        self.sources = sources;
        self.atoms = atoms;
    }

    /// The main file's expansion
    pub fn root(&self) -> Option<ExpansionId> {
        self.root
    }

    pub fn token(&self, id: TokenId) -> &Token {
        &self.tokens[id.0 as usize]
    }

    pub(super) fn token_mut(&mut self, id: TokenId) -> &mut Token {
        &mut self.tokens[id.0 as usize]
    }

    pub fn expansion(&self, id: ExpansionId) -> &Expansion {
        &self.expansions[id.0 as usize]
    }

    pub fn expansion_mut(&mut self, id: ExpansionId) -> &mut Expansion {
        &mut self.expansions[id.0 as usize]
    }

    pub fn declaration(&self, id: DeclarationId) -> &Declaration {
        &self.declarations[id.0 as usize]
    }

    pub fn atoms(&self) -> &AtomPool {
        &self.atoms
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    pub fn source(&self, id: SourceId) -> &SourceFile {
        &self.sources[id.index() as usize]
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn expansion_count(&self) -> usize {
        self.expansions.len()
    }

    /// Tokens linked from `first` onward
    pub fn chain(&self, first: Option<TokenId>) -> impl Iterator<Item = TokenId> + '_ {
        std::iter::successors(first, |id| self.token(*id).next)
    }

    /// Literal text of a token, before any expansion
    pub fn token_text(&self, id: TokenId) -> String {
        let token = self.token(id);
        self.atoms.text_between(Some(token.first_atom), token.terminator)
    }

    /// Text of `token` after preprocessing
    ///
    /// A reference becomes the text of its primary expansion (nothing when
    /// there is none) and references nested in a literal are substituted.
    pub fn expanded_text(&self, token: TokenId) -> String {
        let mut out = String::new();
        self.push_expanded(&self.atoms, token, &mut out);
        out
    }

    /// Preprocessed text of a whole expansion
    pub fn expansion_text(&self, expansion: ExpansionId) -> String {
        let mut out = String::new();
        self.push_expansion(&self.atoms, expansion, &mut out);
        out
    }

    /// Whether the token stands for something else: a curly reference or a
    /// folded `&IF`
    pub(super) fn is_reference(&self, atoms: &AtomPool, token: TokenId) -> bool {
        let token = self.token(token);
        !token.expansions.is_empty()
            || (token.kind.is_curly_start() && token.terminator != atoms.next(token.first_atom))
    }

    pub(super) fn push_expanded(&self, atoms: &AtomPool, token: TokenId, out: &mut String) {
        if self.is_reference(atoms, token) {
            if let Some(expansion) = self.primary_expansion(token) {
                self.push_expansion(atoms, expansion, out);
            }
            return;
        }
        self.push_expanded_literal(atoms, token, out);
    }

    /// The token's own atoms, with nested references substituted
    pub(super) fn push_expanded_literal(&self, atoms: &AtomPool, token: TokenId, out: &mut String) {
        let token = self.token(token);
        let mut current = Some(token.first_atom);
        for nested in &token.nested {
            let nested_token = self.token(*nested);
            while let Some(atom) = current {
                if Some(atom) == token.terminator || atom == nested_token.first_atom {
                    break;
                }
                out.push_str(atoms.text(atom));
                current = atoms.next(atom);
            }
            if current != Some(nested_token.first_atom) {
                break;
            }
            self.push_expanded(atoms, *nested, out);
            current = nested_token.terminator;
        }
        while let Some(atom) = current {
            if Some(atom) == token.terminator {
                break;
            }
            out.push_str(atoms.text(atom));
            current = atoms.next(atom);
        }
    }

    pub(super) fn push_expansion(&self, atoms: &AtomPool, expansion: ExpansionId, out: &mut String) {
        for token in self.chain(self.expansion(expansion).first_token) {
            self.push_expanded(atoms, token, out);
        }
    }

    pub fn primary_expansion(&self, token: TokenId) -> Option<ExpansionId> {
        self.token(token)
            .expansions
            .iter()
            .copied()
            .find(|id| self.expansion(*id).primary)
    }

    /// The include expansion that `token` was read from
    pub fn enclosing_include(&self, token: TokenId) -> Option<ExpansionId> {
        let mut current = token;
        loop {
            match self.token(current).parent {
                TokenParent::Token(parent) => current = parent,
                TokenParent::Expansion(expansion) => {
                    if matches!(self.expansion(expansion).kind, ExpansionKind::Include(_)) {
                        return Some(expansion);
                    }
                    current = self.expansion(expansion).parent?;
                }
            }
        }
    }

    /// Path of the file `token`'s text came from
    pub fn nearest_enclosing_file(&self, token: TokenId) -> Option<&Path> {
        let expansion = self.enclosing_include(token)?;
        match &self.expansion(expansion).kind {
            ExpansionKind::Include(include) => {
                include.source.map(|id| self.source(id).path.as_path())
            }
            _ => None,
        }
    }

    /// Every include reference that found its file, in source order
    ///
    /// File indices are interned into `files`, so the listing lines up with
    /// whatever table the caller's scanner lists use.
    pub fn include_listing(&self, files: &mut FileTable) -> IncludeListing {
        let mut listing = IncludeListing::new();
        for expansion in &self.expansions {
            let (Some(token), ExpansionKind::Include(include)) = (expansion.parent, &expansion.kind)
            else {
                continue;
            };
            let Some(source) = include.source else {
                continue;
            };
            let atom = self.atoms.atom(self.token(token).first_atom);
            let parent = match self.reference_parent(token) {
                Some(path) if atom.line > 0 => IncludeParent::File(files.intern(path)),
                _ => IncludeParent::Macro,
            };
            listing.push(IncludeReference {
                file: files.intern(&self.source(source).path),
                parent,
                line: atom.line,
                column: atom.column,
            });
        }
        listing
    }

    /// File an include reference was written in; `None` inside macro text
    fn reference_parent(&self, token: TokenId) -> Option<&Path> {
        let mut current = token;
        loop {
            match self.token(current).parent {
                TokenParent::Token(parent) => current = parent,
                TokenParent::Expansion(expansion) => match &self.expansion(expansion).kind {
                    ExpansionKind::Include(include) => {
                        return include.source.map(|id| self.source(id).path.as_path());
                    }
                    ExpansionKind::Macro(_) => return None,
                    ExpansionKind::Conditional(_) => current = self.expansion(expansion).parent?,
                },
            }
        }
    }

    /// Depth-first walk from the main file's expansion
    pub fn walk(&self, visitor: &mut dyn ExpansionVisitor) {
        if let Some(root) = self.root {
            self.walk_expansion(root, visitor);
        }
    }

    fn walk_expansion(&self, id: ExpansionId, visitor: &mut dyn ExpansionVisitor) {
        visitor.enter_expansion(self, id);
        let expansion = self.expansion(id);
        if let ExpansionKind::Conditional(conditional) = &expansion.kind {
            visitor.enter_section(self, Section::Condition);
            self.walk_chain(Some(conditional.first_condition_token), visitor);
            visitor.exit_section(self, Section::Condition);
            visitor.enter_section(self, Section::Body);
            self.walk_chain(expansion.first_token, visitor);
            visitor.exit_section(self, Section::Body);
        } else {
            self.walk_chain(expansion.first_token, visitor);
        }
        visitor.exit_expansion(self, id);
    }

    fn walk_chain(&self, first: Option<TokenId>, visitor: &mut dyn ExpansionVisitor) {
        for token in self.chain(first) {
            visitor.enter_token(self, token);
            for expansion in &self.token(token).expansions {
                self.walk_expansion(*expansion, visitor);
            }
            visitor.exit_token(self, token);
        }
    }

    /// XML-like dump of the whole tree
    pub fn render(&self) -> String {
        let mut renderer = Renderer::default();
        self.walk(&mut renderer);
        renderer.out
    }
}

#[derive(Default)]
struct Renderer {
    out: String,
}

impl ExpansionVisitor for Renderer {
    fn enter_token(&mut self, tree: &ExpansionTree, token: TokenId) {
        let _ = write!(
            self.out,
            "<Token type=\"{}\"><![CDATA[{}]]>",
            tree.token(token).kind,
            tree.token_text(token)
        );
        if !tree.token(token).expansions.is_empty() {
            self.out.push_str("\n<ExpansionSet>\n");
        }
    }

    fn exit_token(&mut self, tree: &ExpansionTree, token: TokenId) {
        if !tree.token(token).expansions.is_empty() {
            self.out.push_str("</ExpansionSet>\n");
        }
        self.out.push_str("</Token>\n");
    }

    fn enter_expansion(&mut self, tree: &ExpansionTree, id: ExpansionId) {
        self.out.push_str("<Expansion>\n");
        let expansion = tree.expansion(id);
        match &expansion.kind {
            ExpansionKind::Include(include) => {
                let file = include
                    .source
                    .map(|source| tree.source(source).path.display().to_string())
                    .unwrap_or_else(|| include.args.file_name.clone());
                let _ = writeln!(
                    self.out,
                    "<ExpansionAttributes subtype=\"include\" file=\"{file}\"/>"
                );
            }
            ExpansionKind::Macro(macro_expansion) => {
                let _ = writeln!(
                    self.out,
                    "<ExpansionAttributes subtype=\"macro\" name=\"{}\"/>",
                    macro_expansion.name
                );
            }
            ExpansionKind::Conditional(_) => {
                let _ = writeln!(
                    self.out,
                    "<ConditionalExpansion primary=\"{}\">",
                    expansion.primary
                );
            }
        }
    }

    fn exit_expansion(&mut self, tree: &ExpansionTree, id: ExpansionId) {
        if matches!(tree.expansion(id).kind, ExpansionKind::Conditional(_)) {
            self.out.push_str("</ConditionalExpansion>\n");
        }
        self.out.push_str("</Expansion>\n");
    }

    fn enter_section(&mut self, _tree: &ExpansionTree, section: Section) {
        self.out.push_str(match section {
            Section::Condition => "<ConditionalExpression>\n",
            Section::Body => "<ConditionalContents>\n",
        });
    }

    fn exit_section(&mut self, _tree: &ExpansionTree, section: Section) {
        self.out.push_str(match section {
            Section::Condition => "</ConditionalExpression>\n",
            Section::Body => "</ConditionalContents>\n",
        });
    }
}
