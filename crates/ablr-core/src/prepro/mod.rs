//! Include and macro expansion trees
//!
//! Unlike a compiler's preprocessor, which keeps only the text of the active
//! configuration, this one records every possibility: each `&IF` branch is
//! kept as an alternative expansion, with the branch the current settings
//! select marked primary. Refactorings use the tree to see which include
//! and macro text a statement came from.
//!
//! Source is read as [`atom::Atom`]s, the literal scanner tokens of each
//! file. Macro bodies are chains of atom refs, so every expanded token can
//! still be traced to the file, line and column it was written at.

pub mod atom;
pub mod condition;
pub mod escapes;
pub mod include_args;
pub mod processor;
pub mod scope;
pub mod source;
pub mod tree;

pub use atom::{Atom, AtomId, AtomPool};
pub use condition::{ConditionEnv, ConditionError};
pub use escapes::{is_escaped, strip_comments, strip_escapes};
pub use include_args::IncludeArgs;
pub use processor::Processor;
pub use scope::{DeclarationKind, PreproScope, ScopeFrame};
pub use source::{SourceFile, SourceFilePool, SourceId};
pub use tree::{
    ConditionalExpansion, Declaration, DeclarationId, Expansion, ExpansionId, ExpansionKind,
    ExpansionTree, ExpansionVisitor, IncludeExpansion, MacroExpansion, Section, Token, TokenId,
    TokenParent,
};
