//! Token store
//!
//! One arena holds every node the refactoring core touches: literal scanner
//! tokens, tree nodes and nodes synthesized by edit primitives. Each record
//! carries two independent link structures over the same indices:
//!
//! - scanner links (`next`/`prev`) threading a scanner list for one file
//! - tree links (`parent`/`first_child`/`last_child`/`next_sibling`/`prev_sibling`)
//!
//! Nodes are addressed by [`NodeId`], an index plus a generation counter. A
//! released slot bumps its generation before it is reused, so a stale id is
//! reported as [`RefactorError::StaleHandle`] instead of silently aliasing a
//! new node.

mod tree;

pub use tree::{Children, TreeBuilder};

use crate::error::RefactorError;
use crate::result::Result;
use crate::token::{FileIndex, FileTable, TokenKind};

/// Generation-checked handle into a [`TokenStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> u32 {
        self.index
    }
}

/// Source position of a natural node or hidden token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub file: FileIndex,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(file: FileIndex, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }
}

/// Whitespace or comment the parser attached in front of a tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenToken {
    pub kind: TokenKind,
    pub text: String,
    pub file: FileIndex,
    pub line: u32,
    pub column: u32,
}

impl HiddenToken {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            text: text.into(),
            file: position.file,
            line: position.line,
            column: position.column,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.file, self.line, self.column)
    }
}

/// One token record
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: TokenKind,
    pub text: String,
    /// `None` for synthetic nodes that never had a file
    pub file: Option<FileIndex>,
    /// 0 for synthetic nodes
    pub line: u32,
    pub column: u32,
    pub to_be_cut: bool,
    /// Infix operator: flattened between its first operand and the rest
    pub operator: bool,
    /// Hidden tokens in source order; the last one sits right before the node
    pub hidden: Vec<HiddenToken>,

    pub(crate) next: Option<NodeId>,
    pub(crate) prev: Option<NodeId>,

    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
    pub(crate) prev_sibling: Option<NodeId>,
}

impl Node {
    fn new(kind: TokenKind, text: String) -> Self {
        Self {
            kind,
            text,
            file: None,
            line: 0,
            column: 0,
            to_be_cut: false,
            operator: false,
            hidden: Vec::new(),
            next: None,
            prev: None,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }

    /// A node with a real source line
    pub fn is_natural(&self) -> bool {
        self.line > 0
    }

    pub fn position(&self) -> Option<Position> {
        match self.file {
            Some(file) if self.line > 0 => Some(Position::new(file, self.line, self.column)),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.last_child
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }

    pub fn prev_sibling(&self) -> Option<NodeId> {
        self.prev_sibling
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of token records shared by scanner lists and trees
#[derive(Debug, Default)]
pub struct TokenStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    files: FileTable,
    epoch: u64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: FileTable) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileTable {
        &mut self.files
    }

    /// Acquire a synthetic node (line 0, no file)
    pub fn create_node(&mut self, kind: TokenKind, text: impl Into<String>) -> NodeId {
        self.insert(Node::new(kind, text.into()))
    }

    /// Acquire a node with a source position
    pub fn create_positioned(
        &mut self,
        kind: TokenKind,
        text: impl Into<String>,
        position: Position,
    ) -> NodeId {
        let mut node = Node::new(kind, text.into());
        node.file = Some(position.file);
        node.line = position.line;
        node.column = position.column;
        self.insert(node)
    }

    fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Release a node back to the pool
    ///
    /// The caller must already have unlinked it; links held by other nodes
    /// are not touched and will report stale on their next use.
    pub fn release(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        let slot = &mut self.slots[id.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Ok(())
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Both handles refer to the same live node
    pub fn is_same_node(&self, a: NodeId, b: NodeId) -> bool {
        a == b && self.is_alive(a)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(RefactorError::StaleHandle {
                index: id.index,
                generation: id.generation,
            })
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(RefactorError::StaleHandle {
                index: id.index,
                generation: id.generation,
            })
    }

    pub fn kind(&self, id: NodeId) -> Result<TokenKind> {
        Ok(self.node(id)?.kind)
    }

    pub fn text(&self, id: NodeId) -> Result<&str> {
        Ok(self.node(id)?.text.as_str())
    }

    pub fn next(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.next)
    }

    pub fn prev(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.prev)
    }

    /// `file:line:col` of a node, using the store's file table
    pub fn position_string(&self, id: NodeId) -> Result<String> {
        let node = self.node(id)?;
        let file = match node.file {
            Some(file) => self.files.display_name(file),
            None => String::from("<synthetic>"),
        };
        Ok(format!("{}:{}:{}", file, node.line, node.column))
    }

    /// Counter bumped by every structural change to scanner links
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn bump_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Scanner-link `a -> b`
    pub(crate) fn link(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        self.node_mut(a)?.next = Some(b);
        self.node_mut(b)?.prev = Some(a);
        Ok(())
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
