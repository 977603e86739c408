//! Atoms: immutable literal source spans, and refs that re-chain them

use crate::lexer::RawToken;
use crate::token::{FileIndex, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u32);

impl AtomId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// One literal span of a source file
///
/// Atoms with line 0 were synthesized from argument text rather than read
/// from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub kind: TokenKind,
    pub text: String,
    pub file: FileIndex,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AtomSlot {
    Atom,
    /// Alias of another atom, with links of its own
    Ref(AtomId),
}

#[derive(Debug, Clone)]
struct AtomEntry {
    slot: AtomSlot,
    atom: Option<Atom>,
    next: Option<AtomId>,
    prev: Option<AtomId>,
}

/// Arena of atoms and atom refs
///
/// Ref chains let a macro body be assembled from atoms of several files, in
/// a new order, without copying any text. Attribute reads on a ref resolve to
/// the atom it aliases.
#[derive(Debug, Clone, Default)]
pub struct AtomPool {
    entries: Vec<AtomEntry>,
}

impl AtomPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append lexed tokens as a new linked chain and return its first atom
    pub fn push_chain(
        &mut self,
        file: FileIndex,
        tokens: impl IntoIterator<Item = RawToken>,
    ) -> Option<AtomId> {
        let mut first = None;
        let mut last: Option<AtomId> = None;
        for token in tokens {
            let id = AtomId(self.entries.len() as u32);
            self.entries.push(AtomEntry {
                slot: AtomSlot::Atom,
                atom: Some(Atom {
                    kind: token.kind,
                    text: token.text,
                    file,
                    line: token.line,
                    column: token.column,
                }),
                next: None,
                prev: last,
            });
            match last {
                Some(previous) => self.entries[previous.0 as usize].next = Some(id),
                None => first = Some(id),
            }
            last = Some(id);
        }
        first
    }

    /// Create a ref to `target`, linked after `prev` when given
    ///
    /// A ref to a ref aliases the underlying atom.
    pub fn make_ref(&mut self, target: AtomId, prev: Option<AtomId>) -> AtomId {
        let target = self.resolve(target);
        let id = AtomId(self.entries.len() as u32);
        self.entries.push(AtomEntry {
            slot: AtomSlot::Ref(target),
            atom: None,
            next: None,
            prev,
        });
        if let Some(previous) = prev {
            self.entries[previous.0 as usize].next = Some(id);
        }
        id
    }

    pub fn is_ref(&self, id: AtomId) -> bool {
        matches!(self.entries[id.0 as usize].slot, AtomSlot::Ref(_))
    }

    fn resolve(&self, id: AtomId) -> AtomId {
        match self.entries[id.0 as usize].slot {
            AtomSlot::Atom => id,
            AtomSlot::Ref(target) => target,
        }
    }

    pub fn atom(&self, id: AtomId) -> &Atom {
        let entry = &self.entries[self.resolve(id).0 as usize];
        match &entry.atom {
            Some(atom) => atom,
            None => unreachable!("ref slots always resolve to atoms"),
        }
    }

    pub fn kind(&self, id: AtomId) -> TokenKind {
        self.atom(id).kind
    }

    pub fn text(&self, id: AtomId) -> &str {
        &self.atom(id).text
    }

    pub fn next(&self, id: AtomId) -> Option<AtomId> {
        self.entries[id.0 as usize].next
    }

    pub fn prev(&self, id: AtomId) -> Option<AtomId> {
        self.entries[id.0 as usize].prev
    }

    /// Walk back to the start of the chain `id` is on
    pub fn first_of_chain(&self, id: AtomId) -> AtomId {
        let mut current = id;
        while let Some(previous) = self.prev(current) {
            current = previous;
        }
        current
    }

    /// Text of `[first, terminator)`; a `None` terminator means chain end
    pub fn text_between(&self, first: Option<AtomId>, terminator: Option<AtomId>) -> String {
        let mut text = String::new();
        let mut current = first;
        while let Some(id) = current {
            if Some(id) == terminator {
                break;
            }
            text.push_str(self.text(id));
            current = self.next(id);
        }
        text
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
