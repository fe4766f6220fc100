// ABOUTME: The Context/GlobalContext variable stores the execution machine juggles.
//! The two variable stores the execution machine juggles: the per-frame,
//! structurally-shared `Context` and the single mutable `GlobalContext`.
//!
//! The distilled design called for shallow-cloning a context on every
//! nested frame; doing that with an owned `HashMap` would deep-copy the
//! whole visible environment on every instruction. Instead each overlay
//! is a new terminal frame chained onto a shared `Rc` parent — lookup
//! walks the chain, nothing upstream is ever mutated or copied.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// An immutable lookup chain of variable bindings.
///
/// Reserved keys (`__FILE__`, `__PATH__`, `__LINE__`, `__INLINE__`, `loop`)
/// live here like any other binding; the machine is responsible for
/// overlaying fresh values for them at the points execution requires it.
pub struct Context {
    bindings: HashMap<String, Value>,
    parent: Option<Rc<Context>>,
}

impl Context {
    /// An empty context with no parent.
    pub fn root() -> Rc<Context> {
        Rc::new(Context {
            bindings: HashMap::new(),
            parent: None,
        })
    }

    /// A new frame layering `additions` on top of `parent`. Neither the
    /// parent's bindings nor any frame further up the chain are touched.
    pub fn overlay(parent: &Rc<Context>, additions: HashMap<String, Value>) -> Rc<Context> {
        Rc::new(Context {
            bindings: additions,
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Walks this frame, then its parent chain, returning the first match.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.bindings.get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }
}

/// The single mutable mapping written by `@set` and `@macro`.
///
/// Unlike `Context`, this is one flat store shared for the lifetime of a
/// top-level `execute` call: a `@set` anywhere must be visible to every
/// later-evaluated expression regardless of nesting depth, which a
/// persistent per-frame structure cannot give for free.
pub struct GlobalContext {
    vars: RefCell<HashMap<String, Value>>,
}

impl GlobalContext {
    pub fn new() -> Self {
        GlobalContext {
            vars: RefCell::new(HashMap::new()),
        }
    }

    /// Clears all variables and macro callables. Called at the start of
    /// every top-level `execute`.
    pub fn reset(&self) {
        self.vars.borrow_mut().clear();
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new()
    }
}
