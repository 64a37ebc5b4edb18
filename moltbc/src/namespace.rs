//! Namespaces
//!
//! A namespace is a named container of variables, nested within a parent namespace.
//! The global namespace, `::`, is the root.  Qualified names separate namespace names
//! with `::`; a name beginning with `::` is absolute, and any other qualified name is
//! relative to the current namespace (falling back to the global namespace).
//!
//! Namespace variables live in a hash table.  When a namespace is deleted, its
//! variables are unset and marked dead, so that links to them from other frames
//! report that they dangle rather than silently re-creating a variable in a namespace
//! that no longer exists.

use crate::types::*;
use crate::var::Var;
use crate::var::VarRef;
use crate::var::VarState;
use crate::var::VarTable;
use indexmap::IndexMap;
use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;
use std::rc::Weak;

/// A namespace.
#[derive(Debug)]
pub struct Namespace {
    /// The fully-qualified name, e.g., `::` or `::a::b`.
    name: String,

    parent: Option<Weak<Namespace>>,
    vars: RefCell<VarTable>,
    children: RefCell<IndexMap<String, Rc<Namespace>, MoltHasher>>,
    deleted: Cell<bool>,
}

impl Namespace {
    /// Creates a new global namespace.
    pub fn new_global() -> Rc<Self> {
        Rc::new(Self {
            name: "::".into(),
            parent: None,
            vars: RefCell::new(VarTable::default()),
            children: RefCell::new(IndexMap::default()),
            deleted: Cell::new(false),
        })
    }

    /// The fully-qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The last component of the name.
    pub fn tail(&self) -> &str {
        split_qualified(&self.name).1
    }

    pub fn parent(&self) -> Option<Rc<Namespace>> {
        self.parent.as_ref().and_then(|p| p.upgrade())
    }

    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    /// Returns the named child namespace.
    pub fn child(&self, name: &str) -> Option<Rc<Namespace>> {
        self.children.borrow().get(name).cloned()
    }

    /// Returns the named child namespace, creating it if need be.
    pub fn ensure_child(self: &Rc<Self>, name: &str) -> Rc<Namespace> {
        if let Some(child) = self.child(name) {
            return child;
        }

        let full_name = if self.is_global() {
            format!("::{}", name)
        } else {
            format!("{}::{}", self.name, name)
        };

        log::debug!("creating namespace {}", full_name);

        let child = Rc::new(Namespace {
            name: full_name,
            parent: Some(Rc::downgrade(self)),
            vars: RefCell::new(VarTable::default()),
            children: RefCell::new(IndexMap::default()),
            deleted: Cell::new(false),
        });
        self.children
            .borrow_mut()
            .insert(name.into(), Rc::clone(&child));
        child
    }

    /// The child namespaces, in creation order.
    pub fn children(&self) -> Vec<Rc<Namespace>> {
        self.children.borrow().values().cloned().collect()
    }

    //-------------------------------------------------------------------------
    // Variables

    /// Returns the named variable's cell, creating an undefined cell if `create` is set.
    pub fn var(&self, name: &str, create: bool) -> Option<VarRef> {
        if let Some(var) = self.vars.borrow().get(name) {
            return Some(Rc::clone(var));
        }

        if create && !self.is_deleted() {
            let var = Var::new_ref(true);
            self.vars.borrow_mut().insert(name.into(), Rc::clone(&var));
            Some(var)
        } else {
            None
        }
    }

    /// Removes the variable's cell if it's undefined and nothing else refers to it.
    pub fn purge_var(&self, name: &str) {
        let mut vars = self.vars.borrow_mut();
        if let Some(var) = vars.get(name) {
            if Rc::strong_count(var) == 1 && var.borrow().is_undefined() {
                vars.shift_remove(name);
            }
        }
    }

    /// The names of the namespace's defined variables.
    pub fn var_names(&self) -> MoltList {
        self.vars
            .borrow()
            .iter()
            .filter(|(_, var)| !var.borrow().is_undefined())
            .map(|(name, _)| Value::from(name.as_str()))
            .collect()
    }

    //-------------------------------------------------------------------------
    // Deletion

    /// Deletes the namespace and its children: every variable is unset and marked dead,
    /// and the namespace is removed from its parent.
    pub fn delete(&self) {
        for child in self.children() {
            child.delete();
        }

        log::debug!("deleting namespace {}", self.name);
        self.deleted.set(true);

        let vars = std::mem::take(&mut *self.vars.borrow_mut());
        for (_, var) in vars {
            let state = {
                let mut var = var.borrow_mut();
                var.dead = true;
                std::mem::replace(&mut var.state, VarState::Undefined)
            };

            // Elements of a deleted array are dead too.
            if let VarState::Array(data) = state {
                data.destroy();
            }
        }

        if let Some(parent) = self.parent() {
            parent.children.borrow_mut().shift_remove(self.tail());
        }
    }
}

/// Returns true if the name is qualified, i.e., contains `::`.
pub fn is_qualified(name: &str) -> bool {
    name.contains("::")
}

/// Splits a qualified name into its qualifiers and its tail: `a::b::c` becomes
/// `(Some("a::b"), "c")`, and `::c` becomes `(Some("::"), "c")`.  Extra colons are
/// allowed as separators.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rfind("::") {
        Some(pos) => {
            let tail = &name[pos + 2..];
            let quals = name[..pos].trim_end_matches(':');
            if quals.is_empty() {
                (Some("::"), tail)
            } else {
                (Some(quals), tail)
            }
        }
        None => (None, name),
    }
}

/// Resolves a namespace path.  An absolute path starts at the global namespace; a
/// relative one starts at `current` and, failing that, at the global namespace.
/// With `create`, missing namespaces along the path are created.
pub fn resolve(
    global: &Rc<Namespace>,
    current: &Rc<Namespace>,
    path: &str,
    create: bool,
) -> Option<Rc<Namespace>> {
    if let Some(rest) = path.strip_prefix("::") {
        return walk(global, rest, create);
    }

    match walk(current, path, create) {
        Some(ns) => Some(ns),
        None if !current.is_global() => walk(global, path, false),
        None => None,
    }
}

fn walk(start: &Rc<Namespace>, path: &str, create: bool) -> Option<Rc<Namespace>> {
    let mut ns = Rc::clone(start);

    for part in path.split("::").filter(|p| !p.is_empty()) {
        let part = part.trim_matches(':');
        if part.is_empty() {
            continue;
        }
        ns = if create {
            ns.ensure_child(part)
        } else {
            ns.child(part)?
        };
    }

    Some(ns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var;
    use crate::var::WriteMode;

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("a"), (None, "a"));
        assert_eq!(split_qualified("::a"), (Some("::"), "a"));
        assert_eq!(split_qualified("a::b::c"), (Some("a::b"), "c"));
        assert_eq!(split_qualified("::a:::b"), (Some("::a"), "b"));
    }

    #[test]
    fn test_resolve() {
        let global = Namespace::new_global();
        let ab = resolve(&global, &global, "a::b", true).unwrap();
        assert_eq!(ab.name(), "::a::b");
        assert_eq!(ab.tail(), "b");

        let a = global.child("a").unwrap();
        assert!(Rc::ptr_eq(&resolve(&global, &a, "b", false).unwrap(), &ab));
        assert!(Rc::ptr_eq(&resolve(&global, &ab, "::a", false).unwrap(), &a));

        // Relative names fall back to the global namespace.
        assert!(Rc::ptr_eq(&resolve(&global, &ab, "a", false).unwrap(), &a));
        assert!(resolve(&global, &global, "x", false).is_none());
    }

    #[test]
    fn test_delete_marks_vars_dead() {
        let global = Namespace::new_global();
        let ns = global.ensure_child("n");
        let var = ns.var("x", true).unwrap();
        var::write(&var, "x", "1".into(), WriteMode::Set).unwrap();

        ns.delete();
        assert!(ns.is_deleted());
        assert!(global.child("n").is_none());
        assert!(var.borrow().dead);
        assert!(var::write(&var, "x", "2".into(), WriteMode::Set).is_err());
    }
}
