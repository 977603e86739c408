//! Builds the expansion tree for one compile unit
//!
//! A single recursive-descent pass over atoms. Every token is classified
//! from its first atom: directives that run to the end of their line, `&IF`
//! chains, comments, quoted strings, curly references, and plain atoms.
//! Curly references are expanded on the spot, so definitions take effect in
//! source order, the way the compiler reads them.

use super::atom::AtomId;
use super::condition::{self, ConditionEnv};
use super::escapes::{is_escaped, strip_comments, strip_escapes};
use super::include_args::IncludeArgs;
use super::scope::{DeclarationKind, PreproScope, ScopeFrame};
use super::source::SourceFilePool;
use super::tree::{
    ConditionalExpansion, Declaration, DeclarationId, ExpansionId, ExpansionKind, ExpansionTree,
    IncludeExpansion, MacroExpansion, TokenId, TokenParent,
};
use crate::config::RefactorConfig;
use crate::error::RefactorError;
use crate::result::Result;
use crate::scan::{AblScanner, SourceScanner};
use crate::token::{FileIndex, TokenKind};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListMode {
    /// Stops at `&ELSEIF`/`&ELSE`/`&ENDIF`; `&THEN` is an error
    Body,
    /// Stops after `&THEN`
    Condition,
}

#[derive(Debug, Clone, Copy, Default)]
struct TokenList {
    first: Option<TokenId>,
    last: Option<TokenId>,
    /// Atom the list stopped at, `None` at the end of the atoms
    stop: Option<AtomId>,
}

struct ScopeEnv<'a> {
    scope: &'a PreproScope,
    opsys: &'a str,
    proversion: &'a str,
}

impl ConditionEnv for ScopeEnv<'_> {
    fn defined(&self, name: &str) -> u8 {
        self.scope.defined(name)
    }

    fn opsys(&self) -> &str {
        self.opsys
    }

    fn proversion(&self) -> &str {
        self.proversion
    }
}

/// Preprocessor front end producing an [`ExpansionTree`]
pub struct Processor<S: SourceScanner = AblScanner> {
    pool: SourceFilePool<S>,
    tree: ExpansionTree,
    scope: PreproScope,
    unix: bool,
    opsys: String,
    proversion: String,
    propath: Vec<PathBuf>,
    defines: IndexMap<String, String>,
    max_depth: usize,
    depth: usize,
    /// Open `&IF`s in the file or macro being read
    if_depth: usize,
    /// Strings, curly references and inactive branches being read; no
    /// definitions are registered while non-zero
    suspend: usize,
    /// Inactive `&IF` branches being read
    inactive: usize,
}

impl Processor<AblScanner> {
    pub fn new(config: &RefactorConfig) -> Self {
        Self::with_scanner(config, AblScanner)
    }
}

impl<S: SourceScanner> Processor<S> {
    pub fn with_scanner(config: &RefactorConfig, scanner: S) -> Self {
        Self {
            pool: SourceFilePool::new(scanner),
            tree: ExpansionTree::default(),
            scope: PreproScope::new(),
            unix: config.opsys.is_unix(),
            opsys: config.opsys.builtin_name().to_string(),
            proversion: config.proversion.clone(),
            propath: config.propath.clone(),
            defines: config.defines.clone(),
            max_depth: config.max_include_depth,
            depth: 0,
            if_depth: 0,
            suspend: 0,
            inactive: 0,
        }
    }

    /// Read `main_file` and everything it references
    ///
    /// Structural errors (unbalanced comment, string or curly, a broken
    /// `&IF` chain) abort the build with the offending position.
    pub fn generate_tree(mut self, main_file: &Path) -> Result<ExpansionTree> {
        let source = self.pool.load(main_file)?;
        let main = self.pool.source(source).file;

        self.scope = PreproScope::with_root(ScopeFrame::new(IncludeArgs {
            file_name: main_file.display().to_string(),
            ..Default::default()
        }));
        let defines = std::mem::take(&mut self.defines);
        for (name, value) in &defines {
            let declaration = self.synthetic_declaration(
                main,
                name.to_lowercase(),
                value.clone(),
                DeclarationKind::Global,
                None,
            );
            self.scope.define(DeclarationKind::Global, name, declaration);
        }

        let root = self.tree.new_expansion(
            None,
            ExpansionKind::Include(IncludeExpansion {
                source: Some(source),
                args: IncludeArgs {
                    file_name: main_file.display().to_string(),
                    ..Default::default()
                },
            }),
        );
        self.tree.expansion_mut(root).primary = true;
        self.pool.source_mut(source).references.push(root);

        let first = self.pool.source(source).first_atom;
        let list = self.make_token_list(root, first, ListMode::Body)?;
        self.tree.expansion_mut(root).first_token = list.first;
        self.tree.set_root(root);

        debug!(
            "Expansion tree for {}: {} tokens, {} expansions, {} files",
            main_file.display(),
            self.tree.token_count(),
            self.tree.expansion_count(),
            self.pool.len()
        );

        let (files, sources, atoms) = self.pool.into_parts();
        let mut tree = self.tree;
        tree.attach_sources(files, sources, atoms);
        Ok(tree)
    }

    // ---------------------------------------------------------------
    // Atom helpers
    // ---------------------------------------------------------------

    fn next_atom(&self, atom: AtomId) -> Option<AtomId> {
        self.pool.atoms().next(atom)
    }

    fn kind(&self, atom: AtomId) -> TokenKind {
        self.pool.atoms().kind(atom)
    }

    fn escaped(&self, atom: AtomId) -> bool {
        is_escaped(self.pool.atoms(), atom, self.unix)
    }

    fn is_curly_ref(&self, atom: AtomId) -> bool {
        self.kind(atom).is_curly_start() && !self.escaped(atom)
    }

    fn file_path(&self, file: FileIndex) -> PathBuf {
        match self.pool.files().path(file) {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(self.pool.files().display_name(file)),
        }
    }

    fn error_at(&self, atom: AtomId, message: impl Into<String>) -> RefactorError {
        let atom = self.pool.atoms().atom(atom);
        RefactorError::macro_error(self.file_path(atom.file), atom.line, atom.column, message)
    }

    fn check_depth(&self, atom: AtomId) -> Result<()> {
        if self.depth < self.max_depth {
            return Ok(());
        }
        let atom = self.pool.atoms().atom(atom);
        Err(RefactorError::ExpansionDepth {
            limit: self.max_depth,
            file: self.file_path(atom.file),
            line: atom.line,
            column: atom.column,
        })
    }

    // ---------------------------------------------------------------
    // Token lists
    // ---------------------------------------------------------------

    fn make_token_list(
        &mut self,
        parent: ExpansionId,
        first: Option<AtomId>,
        mode: ListMode,
    ) -> Result<TokenList> {
        let mut list = TokenList::default();
        let mut next = first;

        while let Some(atom) = next {
            let kind = self.kind(atom);
            if kind.is_branch_end() {
                if self.if_depth == 0 {
                    let text = self.pool.atoms().text(atom).to_string();
                    return Err(self.error_at(atom, format!("Unexpected {text}")));
                }
                list.stop = Some(atom);
                return Ok(list);
            }
            if kind == TokenKind::AmpThen && mode == ListMode::Body {
                return Err(self.error_at(atom, "Unexpected &THEN"));
            }

            let token = self
                .tree
                .new_token(TokenParent::Expansion(parent), atom, kind);
            self.process_token(token, atom)?;
            match list.last {
                Some(last) => self.tree.link(last, token),
                None => list.first = Some(token),
            }
            list.last = Some(token);
            next = self.tree.token(token).terminator;

            if kind == TokenKind::AmpThen {
                list.stop = next;
                return Ok(list);
            }
        }
        list.stop = None;
        Ok(list)
    }

    fn process_token(&mut self, token: TokenId, atom: AtomId) -> Result<()> {
        match self.kind(atom) {
            TokenKind::AmpGlobalDefine | TokenKind::AmpScopedDefine => self.token_amp_define(token),
            TokenKind::AmpUndefine => self.token_amp_undefine(token),
            TokenKind::AmpMessage | TokenKind::AmpAnalyzeSuspend | TokenKind::AmpAnalyzeResume => {
                self.collect_directive(token)
            }
            TokenKind::AmpIf => self.token_amp_if(token),
            TokenKind::CommentStart => {
                let end = self.comment_end(atom)?;
                let terminator = self.next_atom(end);
                let token = self.tree.token_mut(token);
                token.kind = TokenKind::Comment;
                token.terminator = terminator;
                Ok(())
            }
            kind if kind.is_curly_start() && !self.escaped(atom) => self.token_curly(token),
            kind if kind.is_quote() && !self.escaped(atom) => self.token_quote(token),
            _ => {
                let terminator = self.next_atom(atom);
                self.tree.token_mut(token).terminator = terminator;
                Ok(())
            }
        }
    }

    fn new_nested(&mut self, parent: TokenId, atom: AtomId) -> Result<TokenId> {
        let kind = self.kind(atom);
        let nested = self.tree.new_token(TokenParent::Token(parent), atom, kind);
        self.tree.token_mut(parent).nested.push(nested);
        self.process_token(nested, atom)?;
        Ok(nested)
    }

    /// The `*/` closing the comment opened at `start`
    fn comment_end(&self, start: AtomId) -> Result<AtomId> {
        let mut depth = 1usize;
        let mut current = self.next_atom(start);
        while let Some(atom) = current {
            match self.kind(atom) {
                TokenKind::CommentStart => depth += 1,
                TokenKind::CommentEnd => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(atom);
                    }
                }
                _ => {}
            }
            current = self.next_atom(atom);
        }
        Err(self.error_at(start, "Failed to find end of comment"))
    }

    /// Extend a directive token through its unescaped newline, expanding
    /// curly references and skipping comments on the way
    fn collect_directive(&mut self, token: TokenId) -> Result<()> {
        let first = self.tree.token(token).first_atom;
        let mut current = self.next_atom(first);
        let terminator = loop {
            let Some(atom) = current else {
                break None;
            };
            match self.kind(atom) {
                TokenKind::CommentStart => {
                    let end = self.comment_end(atom)?;
                    current = self.next_atom(end);
                }
                TokenKind::Newline if !self.escaped(atom) => break self.next_atom(atom),
                kind if kind.is_curly_start() && !self.escaped(atom) => {
                    let nested = self.new_nested(token, atom)?;
                    current = self.tree.token(nested).terminator;
                }
                _ => current = self.next_atom(atom),
            }
        };
        self.tree.token_mut(token).terminator = terminator;
        Ok(())
    }

    fn token_quote(&mut self, token: TokenId) -> Result<()> {
        let first = self.tree.token(token).first_atom;
        let quote = self.kind(first);
        self.suspend += 1;

        let mut current = self.next_atom(first);
        let closing = loop {
            let Some(atom) = current else {
                return Err(self.error_at(first, "Failed to find end of quoted string"));
            };
            let kind = self.kind(atom);
            if kind == quote {
                if self.escaped(atom) {
                    current = self.next_atom(atom);
                    continue;
                }
                let after = self.next_atom(atom);
                if let Some(doubled) = after.filter(|a| self.kind(*a) == quote) {
                    current = self.next_atom(doubled);
                    continue;
                }
                break atom;
            }
            if self.is_curly_ref(atom) {
                let nested = self.new_nested(token, atom)?;
                current = self.tree.token(nested).terminator;
                continue;
            }
            current = self.next_atom(atom);
        };

        self.suspend -= 1;
        let terminator = self.next_atom(closing);
        let token = self.tree.token_mut(token);
        token.kind = TokenKind::QString;
        token.terminator = terminator;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Curly references
    // ---------------------------------------------------------------

    fn token_curly(&mut self, token: TokenId) -> Result<()> {
        let first = self.tree.token(token).first_atom;
        self.suspend += 1;

        let mut current = self.next_atom(first);
        let closing = loop {
            let Some(atom) = current else {
                return Err(self.error_at(first, "Failed to find closing curlybrace"));
            };
            if self.is_curly_ref(atom) {
                let nested = self.new_nested(token, atom)?;
                current = self.tree.token(nested).terminator;
                continue;
            }
            if self.kind(atom) == TokenKind::RightCurly && !self.escaped(atom) {
                break atom;
            }
            current = self.next_atom(atom);
        };

        self.suspend -= 1;
        let terminator = self.next_atom(closing);
        self.tree.token_mut(token).terminator = terminator;
        self.make_curly_expansions(token)
    }

    fn make_curly_expansions(&mut self, token: TokenId) -> Result<()> {
        let first = self.tree.token(token).first_atom;
        let file = self.pool.atoms().atom(first).file;
        let derivation: Vec<ExpansionId> = self
            .tree
            .token(token)
            .nested
            .iter()
            .filter_map(|nested| self.tree.primary_expansion(*nested))
            .collect();

        let mut ref_text = String::new();
        self.tree
            .push_expanded_literal(self.pool.atoms(), token, &mut ref_text);
        let stripped = strip_escapes(&ref_text, self.unix);
        let inner = stripped
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(&stripped)
            .trim()
            .to_string();

        if inner.is_empty() {
            return Ok(());
        }

        if inner == "*" {
            let value = self.scope.args().all_numbered();
            let declaration = self.synthetic_declaration(
                file,
                "*".to_string(),
                value,
                DeclarationKind::NumberedArgument,
                None,
            );
            return self.expand_macro(token, "*".to_string(), declaration, derivation);
        }

        if inner.starts_with("&*") {
            let value = self.scope.args().all_named();
            let declaration = self.synthetic_declaration(
                file,
                "&*".to_string(),
                value,
                DeclarationKind::NamedArgument,
                None,
            );
            return self.expand_macro(token, "&*".to_string(), declaration, derivation);
        }

        if inner.chars().all(|c| c.is_ascii_digit()) {
            let number: usize = inner.parse().unwrap_or(0);
            let declaration = if number == 0 {
                let value = self.scope.args().file_name.clone();
                Some(self.synthetic_declaration(
                    file,
                    "0".to_string(),
                    value,
                    DeclarationKind::NumberedArgument,
                    Some(0),
                ))
            } else {
                self.scope.numbered(number)
            };
            return match declaration {
                Some(declaration) => self.expand_macro(token, inner, declaration, derivation),
                None => Ok(()),
            };
        }

        if let Some(name) = inner.strip_prefix('&') {
            let name = name.split_whitespace().next().unwrap_or("").to_lowercase();
            return match self.scope.lookup(&name) {
                Some(declaration) => self.expand_macro(token, name, declaration, derivation),
                None => {
                    debug!("Reference to undefined name &{name} expands to nothing");
                    Ok(())
                }
            };
        }

        self.expand_include(token, &inner, derivation)
    }

    fn synthetic_declaration(
        &mut self,
        file: FileIndex,
        name: String,
        value: String,
        kind: DeclarationKind,
        number: Option<usize>,
    ) -> DeclarationId {
        let value_atoms = self.pool.synthesize(file, &value);
        self.tree.new_declaration(Declaration {
            name,
            value,
            kind,
            token: None,
            value_atoms,
            number,
        })
    }

    fn expand_macro(
        &mut self,
        token: TokenId,
        name: String,
        declaration: DeclarationId,
        derivation: Vec<ExpansionId>,
    ) -> Result<()> {
        let first = self.tree.token(token).first_atom;
        self.check_depth(first)?;

        let body = self.tree.declaration(declaration).value_atoms;
        let expansion = self.tree.new_expansion(
            Some(token),
            ExpansionKind::Macro(MacroExpansion {
                name,
                declaration: Some(declaration),
            }),
        );
        let entry = self.tree.expansion_mut(expansion);
        entry.primary = true;
        entry.derivation = derivation;

        let list = self.nested_list(expansion, body)?;
        self.tree.expansion_mut(expansion).first_token = list.first;
        Ok(())
    }

    /// Read an include file or macro body with its own `&IF` nesting
    fn nested_list(&mut self, expansion: ExpansionId, first: Option<AtomId>) -> Result<TokenList> {
        let saved_if_depth = std::mem::take(&mut self.if_depth);
        self.depth += 1;
        let list = self.make_token_list(expansion, first, ListMode::Body);
        self.depth -= 1;
        self.if_depth = saved_if_depth;
        list
    }

    fn expand_include(
        &mut self,
        token: TokenId,
        text: &str,
        derivation: Vec<ExpansionId>,
    ) -> Result<()> {
        let first = self.tree.token(token).first_atom;
        let includer = self.pool.atoms().atom(first).file;
        let args = IncludeArgs::parse(text);

        let source = match self.resolve_include(&args.file_name, includer) {
            Some(path) => Some(self.pool.load(&path)?),
            None if self.inactive > 0 => {
                warn!(
                    "Include file '{}' not found on propath (inactive branch)",
                    args.file_name
                );
                None
            }
            None => {
                let atom = self.pool.atoms().atom(first);
                return Err(RefactorError::IncludeNotFound {
                    name: args.file_name,
                    file: self.file_path(atom.file),
                    line: atom.line,
                    column: atom.column,
                });
            }
        };
        self.check_depth(first)?;

        let expansion = self.tree.new_expansion(
            Some(token),
            ExpansionKind::Include(IncludeExpansion {
                source,
                args: args.clone(),
            }),
        );
        let entry = self.tree.expansion_mut(expansion);
        entry.primary = true;
        entry.derivation = derivation;

        let Some(source) = source else {
            return Ok(());
        };
        self.pool.source_mut(source).references.push(expansion);
        let frame = self.argument_frame(includer, args);
        self.scope.push(frame);
        let first_atom = self.pool.source(source).first_atom;
        let list = self.nested_list(expansion, first_atom);
        self.scope.pop();
        self.tree.expansion_mut(expansion).first_token = list?.first;
        Ok(())
    }

    fn argument_frame(&mut self, file: FileIndex, args: IncludeArgs) -> ScopeFrame {
        let mut frame = ScopeFrame::new(args.clone());
        for (index, value) in args.numbered.iter().enumerate() {
            let number = index + 1;
            let declaration = self.synthetic_declaration(
                file,
                number.to_string(),
                value.clone(),
                DeclarationKind::NumberedArgument,
                Some(number),
            );
            frame.add_numbered_arg(declaration);
        }
        for (name, value) in &args.named {
            let declaration = self.synthetic_declaration(
                file,
                name.clone(),
                value.clone(),
                DeclarationKind::NamedArgument,
                None,
            );
            frame.add_named_arg(name, declaration);
        }
        frame
    }

    /// Look for `name` next to the including file, then along the propath
    fn resolve_include(&self, name: &str, includer: FileIndex) -> Option<PathBuf> {
        let name = if self.unix {
            name.to_string()
        } else {
            name.replace('\\', "/")
        };
        let candidate = Path::new(&name);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }

        let includer_dir = self
            .pool
            .files()
            .path(includer)
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        includer_dir
            .iter()
            .chain(self.propath.iter())
            .map(|dir| dir.join(candidate))
            .find(|path| path.is_file())
    }

    // ---------------------------------------------------------------
    // Definitions
    // ---------------------------------------------------------------

    fn token_amp_define(&mut self, token: TokenId) -> Result<()> {
        self.collect_directive(token)?;
        let directive = self.tree.token(token).first_atom;
        let kind = if self.kind(directive) == TokenKind::AmpGlobalDefine {
            DeclarationKind::Global
        } else {
            DeclarationKind::Scoped
        };

        let Some(last) = self.collect_token_atoms(token, None) else {
            return Ok(());
        };
        let (name, value_atoms) = self.split_definition(last);
        if name.is_empty() {
            warn!(
                "{} without a name",
                self.pool.atoms().text(directive).to_uppercase()
            );
            return Ok(());
        }

        let mut prev = None;
        let mut first_ref = None;
        for atom in &value_atoms {
            let reference = self.pool.atoms_mut().make_ref(*atom, prev);
            first_ref.get_or_insert(reference);
            prev = Some(reference);
        }
        let value = self.pool.atoms().text_between(first_ref, None);

        let declaration = self.tree.new_declaration(Declaration {
            name: name.to_lowercase(),
            value,
            kind,
            token: Some(token),
            value_atoms: first_ref,
            number: None,
        });
        self.tree.token_mut(token).declaration = Some(declaration);

        if self.suspend == 0 {
            self.scope.define(kind, &name, declaration);
            debug!("Defined &{} ({kind:?})", name.to_lowercase());
        }
        Ok(())
    }

    /// Split a definition's ref chain into its name and value atoms
    ///
    /// The value drops comments, escaped line ends, the closing newline and
    /// surrounding whitespace.
    fn split_definition(&self, last: AtomId) -> (String, Vec<AtomId>) {
        let atoms = self.pool.atoms();
        let chain: Vec<AtomId> =
            std::iter::successors(Some(atoms.first_of_chain(last)), |a| atoms.next(*a)).collect();

        let is_escape = |kind: TokenKind| {
            kind == TokenKind::Tilde || (self.unix && kind == TokenKind::Backslash)
        };
        let is_gap = |i: usize| {
            let kind = atoms.kind(chain[i]);
            kind == TokenKind::Whitespace
                || (is_escape(kind)
                    && chain
                        .get(i + 1)
                        .is_some_and(|next| atoms.kind(*next) == TokenKind::Newline))
        };

        // chain[0] is the directive itself
        let mut i = 1;
        while i < chain.len() && is_gap(i) {
            i += if atoms.kind(chain[i]) == TokenKind::Whitespace { 1 } else { 2 };
        }
        let mut name = String::new();
        while i < chain.len() {
            let kind = atoms.kind(chain[i]);
            if kind.is_whitespace() || kind == TokenKind::CommentStart || is_gap(i) {
                break;
            }
            name.push_str(atoms.text(chain[i]));
            i += 1;
        }

        let mut value = Vec::new();
        let mut comment_depth = 0usize;
        while i < chain.len() {
            let atom = chain[i];
            let kind = atoms.kind(atom);
            match kind {
                TokenKind::CommentStart => comment_depth += 1,
                TokenKind::CommentEnd if comment_depth > 0 => comment_depth -= 1,
                _ if comment_depth > 0 => {}
                kind if is_escape(kind)
                    && chain
                        .get(i + 1)
                        .is_some_and(|next| atoms.kind(*next) == TokenKind::Newline) =>
                {
                    i += 1;
                }
                TokenKind::Newline if i + 1 == chain.len() => {}
                _ => value.push(atom),
            }
            i += 1;
        }

        let is_blank = |atom: &AtomId| atoms.kind(*atom).is_whitespace();
        let start = value.iter().position(|a| !is_blank(a)).unwrap_or(value.len());
        let end = value.iter().rposition(|a| !is_blank(a)).map_or(start, |p| p + 1);
        (name, value[start..end].to_vec())
    }

    fn token_amp_undefine(&mut self, token: TokenId) -> Result<()> {
        self.collect_directive(token)?;
        let mut text = String::new();
        self.tree
            .push_expanded_literal(self.pool.atoms(), token, &mut text);
        let text = strip_comments(&text);
        let Some(name) = text.split_whitespace().nth(1) else {
            warn!("&UNDEFINE without a name");
            return Ok(());
        };
        if self.suspend == 0 && !self.scope.undefine(name) {
            debug!("&UNDEFINE of unknown name {name}");
        }
        Ok(())
    }

    /// Ref chain of the token's atoms with nested references replaced by
    /// their expansions; returns the last ref
    fn collect_token_atoms(&mut self, token: TokenId, mut prev: Option<AtomId>) -> Option<AtomId> {
        if self.tree.is_reference(self.pool.atoms(), token) {
            if let Some(expansion) = self.tree.primary_expansion(token) {
                prev = self.collect_expansion_atoms(expansion, prev);
            }
            return prev;
        }

        let (first, terminator, nested) = {
            let t = self.tree.token(token);
            (t.first_atom, t.terminator, t.nested.clone())
        };
        let mut current = Some(first);
        for nested in nested {
            let (nested_first, nested_terminator) = {
                let t = self.tree.token(nested);
                (t.first_atom, t.terminator)
            };
            while let Some(atom) = current {
                if Some(atom) == terminator || atom == nested_first {
                    break;
                }
                prev = Some(self.pool.atoms_mut().make_ref(atom, prev));
                current = self.next_atom(atom);
            }
            if current != Some(nested_first) {
                break;
            }
            prev = self.collect_token_atoms(nested, prev);
            current = nested_terminator;
        }
        while let Some(atom) = current {
            if Some(atom) == terminator {
                break;
            }
            prev = Some(self.pool.atoms_mut().make_ref(atom, prev));
            current = self.next_atom(atom);
        }
        prev
    }

    fn collect_expansion_atoms(
        &mut self,
        expansion: ExpansionId,
        mut prev: Option<AtomId>,
    ) -> Option<AtomId> {
        let tokens: Vec<TokenId> = self
            .tree
            .chain(self.tree.expansion(expansion).first_token)
            .collect();
        for token in tokens {
            prev = self.collect_token_atoms(token, prev);
        }
        prev
    }

    // ---------------------------------------------------------------
    // Conditionals
    // ---------------------------------------------------------------

    /// Fold `&IF ... &ENDIF` into one token with one expansion per branch
    fn token_amp_if(&mut self, token: TokenId) -> Result<()> {
        let if_atom = self.tree.token(token).first_atom;
        self.if_depth += 1;

        let mut branch = Some(if_atom);
        let mut chosen = false;
        let mut seen_else = false;
        let end_atom = loop {
            let Some(atom) = branch else {
                return Err(self.error_at(if_atom, "Failed to find &ENDIF"));
            };
            let kind = self.kind(atom);
            match kind {
                TokenKind::AmpEndIf => break atom,
                TokenKind::AmpIf | TokenKind::AmpElseIf | TokenKind::AmpElse if !seen_else => {}
                _ => {
                    let text = self.pool.atoms().text(atom).to_string();
                    return Err(self.error_at(atom, format!("Unexpected {text}")));
                }
            }

            let head = self.tree.new_token(TokenParent::Token(token), atom, kind);
            let head_terminator = self.next_atom(atom);
            self.tree.token_mut(head).terminator = head_terminator;
            let expansion = self.tree.new_expansion(
                Some(token),
                ExpansionKind::Conditional(ConditionalExpansion {
                    first_condition_token: head,
                    condition: None,
                }),
            );
            self.tree.token_mut(head).parent = TokenParent::Expansion(expansion);

            let (is_primary, body_start) = if kind == TokenKind::AmpElse {
                seen_else = true;
                (!chosen, head_terminator)
            } else {
                let condition =
                    self.make_token_list(expansion, head_terminator, ListMode::Condition)?;
                let has_then = condition
                    .last
                    .is_some_and(|last| self.tree.token(last).kind == TokenKind::AmpThen);
                if !has_then {
                    return Err(self.error_at(atom, "Missing &THEN"));
                }
                if let Some(first) = condition.first {
                    self.tree.link(head, first);
                }
                let value = self.evaluate_condition(condition.first);
                if let ExpansionKind::Conditional(conditional) =
                    &mut self.tree.expansion_mut(expansion).kind
                {
                    conditional.condition = value;
                }
                (!chosen && value == Some(true), condition.stop)
            };

            if is_primary {
                chosen = true;
                self.tree.expansion_mut(expansion).primary = true;
            } else {
                self.suspend += 1;
                self.inactive += 1;
            }
            let body = self.make_token_list(expansion, body_start, ListMode::Body);
            if !is_primary {
                self.suspend -= 1;
                self.inactive -= 1;
            }
            let body = body?;
            self.tree.expansion_mut(expansion).first_token = body.first;
            branch = body.stop;
        };

        self.if_depth -= 1;
        let terminator = self.next_atom(end_atom);
        let token = self.tree.token_mut(token);
        token.kind = TokenKind::AmpIfConditional;
        token.first_atom = end_atom;
        token.terminator = terminator;
        Ok(())
    }

    /// Value of the condition tokens before `&THEN`; `None` if it cannot be
    /// evaluated
    fn evaluate_condition(&self, first: Option<TokenId>) -> Option<bool> {
        let mut text = String::new();
        for token in self.tree.chain(first) {
            if self.tree.token(token).kind == TokenKind::AmpThen {
                break;
            }
            self.tree.push_expanded(self.pool.atoms(), token, &mut text);
        }
        let text = strip_comments(&text);
        let env = ScopeEnv {
            scope: &self.scope,
            opsys: &self.opsys,
            proversion: &self.proversion,
        };
        match condition::evaluate(&text, &env) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Could not evaluate &IF condition '{}': {e}", text.trim());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Opsys;
    use crate::error::ErrorKind;
    use crate::sync::IncludeParent;
    use crate::token::FileTable;
    use std::fs;
    use tempfile::TempDir;

    fn build_with(
        files: &[(&str, &str)],
        adjust: impl FnOnce(&mut RefactorConfig),
    ) -> (TempDir, Result<ExpansionTree>) {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            fs::write(dir.path().join(name), text).unwrap();
        }
        let mut config = RefactorConfig {
            opsys: Opsys::Unix,
            propath: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        adjust(&mut config);
        let tree = Processor::new(&config).generate_tree(&dir.path().join(files[0].0));
        (dir, tree)
    }

    fn build(files: &[(&str, &str)]) -> (TempDir, Result<ExpansionTree>) {
        build_with(files, |_| {})
    }

    fn root_tokens(tree: &ExpansionTree) -> Vec<TokenId> {
        let root = tree.root().unwrap();
        tree.chain(tree.expansion(root).first_token).collect()
    }

    fn root_text(tree: &ExpansionTree) -> String {
        tree.expansion_text(tree.root().unwrap())
    }

    fn error_message(files: &[(&str, &str)]) -> String {
        let (_dir, result) = build(files);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Macro);
        err.to_string()
    }

    #[test]
    fn test_if_else_folds_into_one_token() {
        let (_dir, tree) = build(&[(
            "main.p",
            "&IF TRUE &THEN\nDISPLAY 1.\n&ELSE\nDISPLAY 2.\n&ENDIF\n",
        )]);
        let tree = tree.unwrap();

        let tokens = root_tokens(&tree);
        assert_eq!(tokens.len(), 2);
        let conditional = tree.token(tokens[0]);
        assert_eq!(conditional.kind, TokenKind::AmpIfConditional);
        assert_eq!(tree.token_text(tokens[0]), "&ENDIF");
        assert_eq!(conditional.expansions.len(), 2);

        let primaries: Vec<bool> = conditional
            .expansions
            .iter()
            .map(|e| tree.expansion(*e).primary)
            .collect();
        assert_eq!(primaries, vec![true, false]);
        assert_eq!(root_text(&tree), "\nDISPLAY 1.\n\n");

        let rendered = tree.render();
        assert!(rendered.starts_with("<Expansion>\n<ExpansionAttributes subtype=\"include\""));
        assert!(rendered.contains("<ConditionalExpansion primary=\"true\">"));
        assert!(rendered.contains("<ConditionalExpansion primary=\"false\">"));
        assert!(rendered.contains("<Token type=\"AMPIF_CONDITIONAL\"><![CDATA[&ENDIF]]>"));
    }

    #[test]
    fn test_elseif_selects_by_opsys() {
        let source = "&IF OPSYS = \"WIN32\" &THEN a\n&ELSEIF OPSYS = \"UNIX\" &THEN b\n&ELSE c\n&ENDIF";
        let (_dir, tree) = build(&[("main.p", source)]);
        let tree = tree.unwrap();

        let tokens = root_tokens(&tree);
        let expansions = &tree.token(tokens[0]).expansions;
        assert_eq!(expansions.len(), 3);
        assert!(!tree.expansion(expansions[0]).primary);
        assert!(tree.expansion(expansions[1]).primary);
        assert!(!tree.expansion(expansions[2]).primary);
        assert_eq!(root_text(&tree), " b\n");

        let ExpansionKind::Conditional(first) = &tree.expansion(expansions[0]).kind else {
            panic!("expected a conditional expansion");
        };
        assert_eq!(first.condition, Some(false));
        assert_eq!(tree.token(first.first_condition_token).kind, TokenKind::AmpIf);
    }

    #[test]
    fn test_global_define_and_reference() {
        let (_dir, tree) = build(&[(
            "main.p",
            "&GLOBAL-DEFINE greeting \"hi\" /* c */\nDISPLAY {&greeting}.\n",
        )]);
        let tree = tree.unwrap();

        let tokens = root_tokens(&tree);
        let define = tree.token(tokens[0]);
        assert_eq!(define.kind, TokenKind::AmpGlobalDefine);
        let declaration = tree.declaration(define.declaration.unwrap());
        assert_eq!(declaration.name, "greeting");
        assert_eq!(declaration.value, "\"hi\"");
        assert_eq!(declaration.kind, DeclarationKind::Global);

        assert_eq!(
            root_text(&tree),
            "&GLOBAL-DEFINE greeting \"hi\" /* c */\nDISPLAY \"hi\".\n"
        );

        // The macro body still points at the atoms in the define
        let reference = tokens
            .iter()
            .copied()
            .find(|t| tree.token(*t).kind == TokenKind::CurlyAmp)
            .unwrap();
        let expansion = tree.primary_expansion(reference).unwrap();
        let body = tree.expansion(expansion).first_token.unwrap();
        assert_eq!(tree.token(body).kind, TokenKind::QString);
        let atom = tree.atoms().atom(tree.token(body).first_atom);
        assert_eq!((atom.line, atom.column), (1, 25));
    }

    #[test]
    fn test_escaped_newline_continues_define() {
        let (_dir, tree) = build(&[("main.p", "&SCOPED-DEFINE long a ~\n b\nX {&long}\n")]);
        let tree = tree.unwrap();
        let define = root_tokens(&tree)[0];
        let declaration = tree.declaration(tree.token(define).declaration.unwrap());
        assert_eq!(declaration.value, "a  b");
        assert!(root_text(&tree).ends_with("X a  b\n"));
    }

    #[test]
    fn test_nested_reference_in_define_is_substituted_at_definition() {
        let (_dir, tree) = build(&[(
            "main.p",
            "&GLOBAL-DEFINE a 1\n&GLOBAL-DEFINE b {&a}+1\n&UNDEFINE a\nX {&b} {&a}.\n",
        )]);
        let tree = tree.unwrap();
        assert!(root_text(&tree).ends_with("X 1+1 .\n"));
    }

    #[test]
    fn test_include_with_named_arguments() {
        let (dir, tree) = build(&[
            ("main.p", "{inc.i &x=5}\n"),
            ("inc.i", "DISPLAY {&x} {1}.\n"),
        ]);
        let tree = tree.unwrap();
        assert_eq!(root_text(&tree), "DISPLAY 5 5.\n\n");

        let mut files = FileTable::new();
        let listing = tree.include_listing(&mut files);
        assert_eq!(listing.len(), 1);
        let reference = &listing.references()[0];
        assert_eq!(reference.parent, IncludeParent::File(FileIndex::MAIN));
        assert_eq!((reference.line, reference.column), (1, 1));
        let included = dir.path().join("inc.i").canonicalize().unwrap();
        assert_eq!(files.path(reference.file), Some(included.as_path()));

        let curly = root_tokens(&tree)[0];
        let include = tree.primary_expansion(curly).unwrap();
        let first = tree.expansion(include).first_token.unwrap();
        assert_eq!(tree.nearest_enclosing_file(first), Some(included.as_path()));
        assert_eq!(tree.sources().len(), 2);
        assert_eq!(tree.sources()[1].references, vec![include]);
    }

    #[test]
    fn test_argument_references() {
        let (_dir, tree) = build(&[
            ("main.p", "{a.i x \"y z\"}\n"),
            ("a.i", "{*}|{0}|{2}|{3}|{}\n"),
        ]);
        let tree = tree.unwrap();
        assert_eq!(root_text(&tree), "x y z|a.i|y z||\n\n");
    }

    #[test]
    fn test_quoted_string_with_nested_reference() {
        let (_dir, tree) = build(&[(
            "main.p",
            "&SCOPED-DEFINE n 3\nDISPLAY \"a\"\"{&n}\" '~'{&n}'.\n",
        )]);
        let tree = tree.unwrap();
        let strings: Vec<TokenId> = root_tokens(&tree)
            .into_iter()
            .filter(|t| tree.token(*t).kind == TokenKind::QString)
            .collect();
        assert_eq!(strings.len(), 2);
        assert_eq!(tree.expanded_text(strings[0]), "\"a\"\"3\"");
        assert_eq!(tree.token(strings[0]).nested.len(), 1);
        assert_eq!(tree.expanded_text(strings[1]), "'~'3'");
    }

    #[test]
    fn test_definitions_in_inactive_branches_are_not_registered() {
        let source = "&IF FALSE &THEN\n&GLOBAL-DEFINE a 1\n{nope.i}\n&ENDIF\n\
                      &IF DEFINED(a) = 0 &THEN\nyes\n&ELSE\nno\n&ENDIF\n";
        let (_dir, tree) = build(&[("main.p", source)]);
        let tree = tree.unwrap();

        let tokens = root_tokens(&tree);
        let first = tree.token(tokens[0]);
        assert_eq!(first.expansions.len(), 1);
        assert!(tree.primary_expansion(tokens[0]).is_none());

        // The inactive define is still recorded on its token
        let body = tree.expansion(first.expansions[0]).first_token;
        let define = tree
            .chain(body)
            .find(|t| tree.token(*t).kind == TokenKind::AmpGlobalDefine)
            .unwrap();
        assert!(tree.token(define).declaration.is_some());

        assert_eq!(root_text(&tree), "\n\nyes\n\n");
    }

    #[test]
    fn test_predefined_names_from_config() {
        let (_dir, tree) = build_with(
            &[("main.p", "&IF \"{&mode}\" = \"batch\" &THEN B &ELSE I &ENDIF")],
            |config| {
                config.defines.insert("MODE".to_string(), "BATCH".to_string());
            },
        );
        assert_eq!(root_text(&tree.unwrap()), " B ");
    }

    #[test]
    fn test_structural_errors() {
        assert!(error_message(&[("main.p", "&ENDIF\n")]).ends_with(":1:1 Unexpected &ENDIF"));
        assert!(error_message(&[("main.p", "&IF TRUE\nX\n&ENDIF\n")]).ends_with(":1:1 Missing &THEN"));
        assert!(
            error_message(&[("main.p", "x.\n&IF TRUE &THEN X\n")])
                .ends_with(":2:1 Failed to find &ENDIF")
        );
        assert!(
            error_message(&[("main.p", "a {inc.i\n")])
                .ends_with(":1:3 Failed to find closing curlybrace")
        );
        assert!(
            error_message(&[("main.p", "/* a /* b */\n")])
                .ends_with(":1:1 Failed to find end of comment")
        );
        assert!(
            error_message(&[("main.p", "DISPLAY \"open.\n")])
                .ends_with(":1:9 Failed to find end of quoted string")
        );
        assert!(error_message(&[("main.p", "x &THEN\n")]).ends_with("Unexpected &THEN"));
    }

    #[test]
    fn test_missing_include_in_active_code() {
        let (_dir, result) = build(&[("main.p", "\n  {nope.i}\n")]);
        match result {
            Err(RefactorError::IncludeNotFound { name, line, column, .. }) => {
                assert_eq!(name, "nope.i");
                assert_eq!((line, column), (2, 3));
            }
            other => panic!("expected IncludeNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_recursive_include_hits_depth_limit() {
        let (_dir, result) = build_with(
            &[("main.p", "{inc.i}\n"), ("inc.i", "{inc.i}\n")],
            |config| config.max_include_depth = 3,
        );
        assert!(matches!(
            result,
            Err(RefactorError::ExpansionDepth { limit: 3, .. })
        ));
    }

    #[test]
    fn test_escaped_curly_is_literal() {
        let (_dir, tree) = build(&[("main.p", "X ~{inc.i}\n")]);
        let tree = tree.unwrap();
        assert_eq!(root_text(&tree), "X ~{inc.i}\n");
        assert_eq!(tree.expansion_count(), 1);
    }
}
