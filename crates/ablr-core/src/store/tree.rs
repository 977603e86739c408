//! Tree view over the token store: building and traversal

use super::{HiddenToken, NodeId, Position, TokenStore};
use crate::error::RefactorError;
use crate::result::Result;
use crate::token::TokenKind;

/// Iterator over the children of one tree node
pub struct Children<'a> {
    store: &'a TokenStore,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self
            .store
            .node(current)
            .ok()
            .and_then(|node| node.next_sibling);
        Some(current)
    }
}

impl TokenStore {
    /// Append `child` as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let previous_last = self.node(parent)?.last_child;
        {
            let node = self.node_mut(child)?;
            node.parent = Some(parent);
            node.prev_sibling = previous_last;
            node.next_sibling = None;
        }
        match previous_last {
            Some(last) => self.node_mut(last)?.next_sibling = Some(child),
            None => self.node_mut(parent)?.first_child = Some(child),
        }
        self.node_mut(parent)?.last_child = Some(child);
        Ok(())
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            store: self,
            next: self.node(id).ok().and_then(|node| node.first_child),
        }
    }

    pub fn last_child(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.last_child)
    }

    /// Number of children under this node's parent (including itself)
    pub fn num_siblings(&self, id: NodeId) -> Result<usize> {
        Ok(match self.node(id)?.parent {
            Some(parent) => self.children(parent).count(),
            None => 1,
        })
    }

    /// The branch in textual order
    ///
    /// Nodes come out in pre-order, except that a binary operator node is
    /// emitted between its first operand and the remaining ones.
    pub fn flatten(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        self.flatten_into(id, &mut out)?;
        Ok(out)
    }

    fn flatten_into(&self, id: NodeId, out: &mut Vec<NodeId>) -> Result<()> {
        let infix = self.node(id)?.operator && self.children(id).nth(1).is_some();
        let mut children = self.children(id);
        if infix && let Some(first) = children.next() {
            self.flatten_into(first, out)?;
        }
        out.push(id);
        for child in children {
            self.flatten_into(child, out)?;
        }
        Ok(())
    }

    /// First node with a real source line, in textual order
    pub fn first_natural_descendant(&self, id: NodeId) -> Result<Option<NodeId>> {
        for candidate in self.flatten(id)? {
            if self.node(candidate)?.is_natural() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Last node with a real source line, in textual order
    pub fn last_natural_descendant(&self, id: NodeId) -> Result<Option<NodeId>> {
        for candidate in self.flatten(id)?.into_iter().rev() {
            if self.node(candidate)?.is_natural() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// The node whose hidden chain follows this branch
    ///
    /// That is the first natural node after the branch in text order, found
    /// by climbing out of the branch until a later sibling exists. The
    /// program tail counts as such a node, since it carries whatever trails
    /// the last statement.
    pub fn first_hidden_after_last_descendant(&self, id: NodeId) -> Result<Option<NodeId>> {
        let mut current = id;
        loop {
            let mut sibling = self.node(current)?.next_sibling;
            while let Some(candidate) = sibling {
                if self.node(candidate)?.kind == TokenKind::ProgramTail {
                    return Ok(Some(candidate));
                }
                if let Some(natural) = self.first_natural_descendant(candidate)? {
                    return Ok(Some(natural));
                }
                sibling = self.node(candidate)?.next_sibling;
            }
            match self.node(current)?.parent {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }
}

/// Incremental tree construction, for parsers and tests
///
/// Hidden tokens queued with [`TreeBuilder::hidden`] attach to the next
/// natural node. Whatever is still queued at [`TreeBuilder::finish`] goes to
/// the `ProgramTail` node appended as the root's last child.
pub struct TreeBuilder<'a> {
    store: &'a mut TokenStore,
    root: NodeId,
    stack: Vec<NodeId>,
    pending: Vec<HiddenToken>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(store: &'a mut TokenStore) -> Self {
        let root = store.create_node(TokenKind::ProgramRoot, "");
        Self {
            store,
            root,
            stack: vec![root],
            pending: Vec::new(),
        }
    }

    /// Queue a hidden token in front of the next natural node
    pub fn hidden(&mut self, kind: TokenKind, text: impl Into<String>, position: Position) -> &mut Self {
        self.pending.push(HiddenToken::new(kind, text, position));
        self
    }

    /// Open an interior node; children follow until [`TreeBuilder::finish_node`]
    pub fn start_node(
        &mut self,
        kind: TokenKind,
        text: impl Into<String>,
        position: Option<Position>,
    ) -> Result<NodeId> {
        let id = self.add(kind, text.into(), position, false)?;
        self.stack.push(id);
        Ok(id)
    }

    /// Open a binary operator node; its first child precedes it in text
    pub fn start_operator(
        &mut self,
        kind: TokenKind,
        text: impl Into<String>,
        position: Position,
    ) -> Result<NodeId> {
        let id = self.add(kind, text.into(), Some(position), true)?;
        self.stack.push(id);
        Ok(id)
    }

    /// Add a natural leaf
    pub fn token(
        &mut self,
        kind: TokenKind,
        text: impl Into<String>,
        position: Position,
    ) -> Result<NodeId> {
        self.add(kind, text.into(), Some(position), false)
    }

    /// Add a synthetic leaf (no source position)
    pub fn synthetic(&mut self, kind: TokenKind, text: impl Into<String>) -> Result<NodeId> {
        self.add(kind, text.into(), None, false)
    }

    pub fn finish_node(&mut self) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(RefactorError::contract("finish_node without an open node"));
        }
        self.stack.pop();
        Ok(())
    }

    /// Close the tree and return its `ProgramRoot`
    pub fn finish(mut self) -> Result<NodeId> {
        if self.stack.len() != 1 {
            return Err(RefactorError::contract(format!(
                "{} tree node(s) left open",
                self.stack.len() - 1
            )));
        }
        let tail = self.store.create_node(TokenKind::ProgramTail, "");
        self.store.node_mut(tail)?.hidden = std::mem::take(&mut self.pending);
        self.store.append_child(self.root, tail)?;
        Ok(self.root)
    }

    fn add(
        &mut self,
        kind: TokenKind,
        text: String,
        position: Option<Position>,
        operator: bool,
    ) -> Result<NodeId> {
        let id = match position {
            Some(position) => {
                let id = self.store.create_positioned(kind, text, position);
                self.store.node_mut(id)?.hidden = std::mem::take(&mut self.pending);
                id
            }
            None => self.store.create_node(kind, text),
        };
        self.store.node_mut(id)?.operator = operator;
        let parent = *self.stack.last().unwrap_or(&self.root);
        self.store.append_child(parent, id)?;
        Ok(id)
    }
}
