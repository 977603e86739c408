//! Preprocessor name scopes

use super::include_args::IncludeArgs;
use super::tree::DeclarationId;
use std::collections::HashMap;

/// How a preprocessor name came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Global,
    Scoped,
    NamedArgument,
    NumberedArgument,
}

/// Names visible inside one include file
#[derive(Debug, Clone, Default)]
pub struct ScopeFrame {
    args: IncludeArgs,
    scoped: HashMap<String, DeclarationId>,
    named_args: HashMap<String, DeclarationId>,
    numbered_args: Vec<DeclarationId>,
}

impl ScopeFrame {
    pub fn new(args: IncludeArgs) -> Self {
        Self {
            args,
            ..Default::default()
        }
    }

    pub fn add_named_arg(&mut self, name: &str, declaration: DeclarationId) {
        self.named_args.insert(name.to_lowercase(), declaration);
    }

    pub fn add_numbered_arg(&mut self, declaration: DeclarationId) {
        self.numbered_args.push(declaration);
    }

    pub fn args(&self) -> &IncludeArgs {
        &self.args
    }
}

/// Stack of include frames over a root-only global table
///
/// Names are case-insensitive. The bottom frame belongs to the main file and
/// is never popped. Scoped names resolve through the current frame and then
/// the frames below it, so an include sees what its includers defined. Names
/// an include defines are dropped when its frame is popped.
#[derive(Debug, Clone)]
pub struct PreproScope {
    frames: Vec<ScopeFrame>,
    globals: HashMap<String, DeclarationId>,
}

impl Default for PreproScope {
    fn default() -> Self {
        Self::new()
    }
}

impl PreproScope {
    pub fn new() -> Self {
        Self {
            frames: vec![ScopeFrame::default()],
            globals: HashMap::new(),
        }
    }

    /// Scope whose main-file frame is `root`
    pub fn with_root(root: ScopeFrame) -> Self {
        Self {
            frames: vec![root],
            globals: HashMap::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, frame: ScopeFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ScopeFrame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    fn current(&self) -> &ScopeFrame {
        // The root frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn current_mut(&mut self) -> &mut ScopeFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Innermost scoped definition of an already lowercased name
    fn scoped(&self, name: &str) -> Option<DeclarationId> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.scoped.get(name).copied())
    }

    /// Register a definition; globals land in the root table wherever the
    /// definition appears
    pub fn define(&mut self, kind: DeclarationKind, name: &str, declaration: DeclarationId) {
        let name = name.to_lowercase();
        match kind {
            DeclarationKind::Global => {
                self.globals.insert(name, declaration);
            }
            DeclarationKind::Scoped => {
                self.current_mut().scoped.insert(name, declaration);
            }
            DeclarationKind::NamedArgument => self.current_mut().add_named_arg(&name, declaration),
            DeclarationKind::NumberedArgument => self.current_mut().add_numbered_arg(declaration),
        }
    }

    /// Remove the innermost scoped definition, else a global one
    pub fn undefine(&mut self, name: &str) -> bool {
        let name = name.to_lowercase();
        if let Some(frame) = self
            .frames
            .iter_mut()
            .rev()
            .find(|frame| frame.scoped.contains_key(&name))
        {
            frame.scoped.remove(&name);
            return true;
        }
        self.globals.remove(&name).is_some()
    }

    /// Resolve `{&name}`: scoped, then global, then a named include argument
    pub fn lookup(&self, name: &str) -> Option<DeclarationId> {
        let name = name.to_lowercase();
        self.scoped(&name)
            .or_else(|| self.globals.get(&name).copied())
            .or_else(|| self.current().named_args.get(&name).copied())
    }

    /// Value of the `DEFINED()` builtin
    pub fn defined(&self, name: &str) -> u8 {
        let name = name.to_lowercase();
        if self.scoped(&name).is_some() {
            3
        } else if self.globals.contains_key(&name) {
            2
        } else if self.current().named_args.contains_key(&name) {
            1
        } else {
            0
        }
    }

    /// Declaration for `{N}`, 1-based
    pub fn numbered(&self, number: usize) -> Option<DeclarationId> {
        let index = number.checked_sub(1)?;
        self.current().numbered_args.get(index).copied()
    }

    pub fn args(&self) -> &IncludeArgs {
        self.current().args()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> DeclarationId {
        DeclarationId::from_raw(n)
    }

    #[test]
    fn test_lookup_order() {
        let mut scope = PreproScope::new();
        scope.define(DeclarationKind::Global, "X", id(1));

        let mut frame = ScopeFrame::new(IncludeArgs::parse("a.i &x=1 &y=2"));
        frame.add_named_arg("x", id(2));
        frame.add_named_arg("y", id(3));
        scope.push(frame);

        assert_eq!(scope.lookup("x"), Some(id(1)));
        assert_eq!(scope.lookup("Y"), Some(id(3)));
        assert_eq!(scope.defined("x"), 2);
        assert_eq!(scope.defined("y"), 1);

        scope.define(DeclarationKind::Scoped, "x", id(4));
        assert_eq!(scope.lookup("x"), Some(id(4)));
        assert_eq!(scope.defined("x"), 3);
        assert_eq!(scope.defined("nope"), 0);
    }

    #[test]
    fn test_globals_outlive_frames() {
        let mut scope = PreproScope::new();
        scope.push(ScopeFrame::default());
        scope.define(DeclarationKind::Global, "g", id(1));
        scope.define(DeclarationKind::Scoped, "s", id(2));
        assert!(scope.pop().is_some());

        assert_eq!(scope.lookup("g"), Some(id(1)));
        assert_eq!(scope.lookup("s"), None);
        // The root frame stays
        assert!(scope.pop().is_none());
        assert_eq!(scope.depth(), 1);
    }

    #[test]
    fn test_pushed_frames_inherit_scoped_names() {
        let mut scope = PreproScope::new();
        scope.define(DeclarationKind::Scoped, "outer", id(1));
        scope.push(ScopeFrame::default());
        assert_eq!(scope.lookup("outer"), Some(id(1)));

        scope.define(DeclarationKind::Scoped, "inner", id(2));
        scope.pop();
        assert_eq!(scope.lookup("inner"), None);
        assert_eq!(scope.defined("outer"), 3);
    }

    #[test]
    fn test_include_shadows_and_undefines_outer_scoped_names() {
        let mut scope = PreproScope::new();
        scope.define(DeclarationKind::Scoped, "a", id(1));
        scope.define(DeclarationKind::Scoped, "b", id(2));
        scope.push(ScopeFrame::default());

        scope.define(DeclarationKind::Scoped, "a", id(3));
        assert_eq!(scope.lookup("a"), Some(id(3)));
        assert!(scope.undefine("b"));
        assert_eq!(scope.lookup("b"), None);

        scope.pop();
        assert_eq!(scope.lookup("a"), Some(id(1)));
        // The include removed the includer's own definition
        assert_eq!(scope.defined("b"), 0);
    }

    #[test]
    fn test_undefine_prefers_scoped() {
        let mut scope = PreproScope::new();
        scope.define(DeclarationKind::Global, "a", id(1));
        scope.define(DeclarationKind::Scoped, "a", id(2));

        assert!(scope.undefine("A"));
        assert_eq!(scope.lookup("a"), Some(id(1)));
        assert!(scope.undefine("a"));
        assert!(!scope.undefine("a"));
    }

    #[test]
    fn test_numbered_arguments() {
        let mut scope = PreproScope::new();
        let mut frame = ScopeFrame::new(IncludeArgs::parse("a.i one two"));
        frame.add_numbered_arg(id(5));
        frame.add_numbered_arg(id(6));
        scope.push(frame);

        assert_eq!(scope.numbered(2), Some(id(6)));
        assert_eq!(scope.numbered(0), None);
        assert_eq!(scope.numbered(3), None);
        assert_eq!(scope.args().numbered_arg(1), "one");
    }
}
