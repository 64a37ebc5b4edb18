//! Variable Cells
//!
//! A variable is a heap-allocated, reference-counted cell, so that a reference to it
//! stays valid while the table that holds it grows, and while commands invoked
//! mid-operation add or remove other variables.  A cell is in one of four states:
//! undefined, scalar, array, or link.  A link refers to another cell, and is followed
//! transitively before any read or write.
//!
//! Cells live in one of three places: a call frame's compiled-local slots, a
//! hash table (a namespace's variables, or a call frame's overflow table), or an
//! array's element table.
//!
//! This module defines the cell itself, the operations on a resolved cell (read,
//! write, unset, link), array searches, and `VarError`, the variable engine's
//! error type.  Resolving names to cells is the business of the
//! [`scope`](../scope/index.html) module.

use crate::types::*;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// A shared reference to a variable cell.
pub type VarRef = Rc<RefCell<Var>>;

/// A table of variables by name.
pub type VarTable = IndexMap<String, VarRef, MoltHasher>;

/// The operation that failed, for error messages.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum VarOp {
    Read,
    Set,
    Unset,
    Upvar,
}

impl fmt::Display for VarOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VarOp::Read => write!(f, "read"),
            VarOp::Set => write!(f, "set"),
            VarOp::Unset => write!(f, "unset"),
            VarOp::Upvar => write!(f, "upvar"),
        }
    }
}

/// The errors raised by the variable engine.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum VarError {
    #[error("can't {op} \"{name}\": no such variable")]
    NoSuchVariable { op: VarOp, name: String },

    #[error("can't {op} \"{name}\": no such element in array")]
    NoSuchElement { op: VarOp, name: String },

    #[error("can't {op} \"{name}\": variable isn't array")]
    NeedArray { op: VarOp, name: String },

    #[error("can't {op} \"{name}\": variable is array")]
    IsArray { op: VarOp, name: String },

    #[error("can't {op} \"{name}\": upvar refers to element in deleted array")]
    DeletedElement { op: VarOp, name: String },

    #[error("can't {op} \"{name}\": upvar refers to variable in deleted namespace")]
    DeletedNamespaceVar { op: VarOp, name: String },

    #[error("can't upvar from variable to itself")]
    SelfAlias,

    #[error("variable \"{0}\" already exists")]
    AlreadyExists(String),

    #[error("bad variable name \"{0}\": can't create a scalar variable that looks like an array element")]
    LinkToElement(String),

    #[error("can't {op} \"{name}\": parent namespace doesn't exist")]
    NoSuchNamespace { op: VarOp, name: String },

    #[error("\"{0}\" isn't an array")]
    NotArray(String),

    #[error("couldn't find search \"{0}\"")]
    NoSuchSearch(String),

    #[error("{0}")]
    NotAList(String),
}

impl VarError {
    /// The machine-readable error code, a list.
    pub fn error_code(&self) -> Value {
        let (words, name): (&str, Option<&str>) = match self {
            VarError::NoSuchVariable { name, .. } | VarError::NeedArray { name, .. } => {
                ("TCL LOOKUP VARNAME", Some(name.as_str()))
            }
            VarError::NoSuchElement { name, .. } => ("TCL LOOKUP ELEMENT", Some(name.as_str())),
            VarError::IsArray { .. } => ("TCL READ VARNAME", None),
            VarError::DeletedElement { .. } | VarError::DeletedNamespaceVar { .. } => {
                ("TCL WRITE VARNAME DANGLING", None)
            }
            VarError::SelfAlias => ("TCL UPVAR SELF", None),
            VarError::AlreadyExists(_) => ("TCL UPVAR EXISTS", None),
            VarError::LinkToElement(_) => ("TCL UPVAR LOCAL_ELEMENT", None),
            VarError::NoSuchNamespace { .. } => ("TCL LOOKUP NAMESPACE", None),
            VarError::NotArray(name) => ("TCL LOOKUP ARRAY", Some(name.as_str())),
            VarError::NoSuchSearch(_) => ("TCL LOOKUP ARRAYSEARCH", None),
            VarError::NotAList(_) => ("TCL VALUE LIST", None),
        };

        let mut list: MoltList = words.split(' ').map(Value::from).collect();
        if let Some(name) = name {
            list.push(Value::from(name));
        }
        Value::from(list)
    }
}

impl From<VarError> for Exception {
    fn from(err: VarError) -> Self {
        Exception::molt_err2(err.error_code(), Value::from(err.to_string()))
    }
}

/// The contents of a variable cell.
#[derive(Debug)]
pub enum VarState {
    /// Never set, or unset.
    Undefined,

    /// A scalar variable.
    Scalar(Value),

    /// An array variable.
    Array(Box<ArrayData>),

    /// An alias for another variable.
    Link(VarRef),
}

/// A variable cell.
#[derive(Debug)]
pub struct Var {
    pub(crate) state: VarState,

    /// The cell lives in a hash table rather than a compiled-local slot.
    pub(crate) in_hash_table: bool,

    /// The cell is an element of an array.
    pub(crate) is_array_element: bool,

    /// The cell's array or namespace has been deleted.  Links to it dangle.
    pub(crate) dead: bool,
}

impl Var {
    pub fn new_undefined() -> Self {
        Self {
            state: VarState::Undefined,
            in_hash_table: false,
            is_array_element: false,
            dead: false,
        }
    }

    /// Creates a new, undefined cell for a hash table.
    pub fn new_ref(in_hash_table: bool) -> VarRef {
        let mut var = Var::new_undefined();
        var.in_hash_table = in_hash_table;
        Rc::new(RefCell::new(var))
    }

    fn new_element() -> VarRef {
        let mut var = Var::new_undefined();
        var.in_hash_table = true;
        var.is_array_element = true;
        Rc::new(RefCell::new(var))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.state, VarState::Undefined)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.state, VarState::Scalar(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.state, VarState::Array(_))
    }

    pub fn is_link(&self) -> bool {
        matches!(self.state, VarState::Link(_))
    }
}

/// Follows links from `var` until reaching a cell that isn't a link.
pub fn resolve_link(var: &VarRef) -> VarRef {
    let mut current = Rc::clone(var);
    loop {
        let next = match &current.borrow().state {
            VarState::Link(target) => Rc::clone(target),
            _ => break,
        };
        current = next;
    }
    current
}

//-----------------------------------------------------------------------------
// Reading and writing resolved cells

/// How a write combines the new value with the old.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WriteMode {
    /// Replace the value.
    Set,

    /// Append the new value to the old string.
    Append,

    /// Append the new value to the old list as an element.
    ListAppend,
}

/// Reads a resolved cell.  `name` is the variable name as given, for error messages.
pub fn read(var: &VarRef, name: &str) -> Result<Value, VarError> {
    let var = resolve_link(var);
    let var = var.borrow();

    match &var.state {
        VarState::Scalar(value) => Ok(value.clone()),
        VarState::Array(_) => Err(VarError::IsArray {
            op: VarOp::Read,
            name: name.into(),
        }),
        _ if var.is_array_element => Err(VarError::NoSuchElement {
            op: VarOp::Read,
            name: name.into(),
        }),
        _ => Err(VarError::NoSuchVariable {
            op: VarOp::Read,
            name: name.into(),
        }),
    }
}

/// Writes a resolved cell, returning the variable's new value.
///
/// The old value is taken out of the cell before it's modified, so that an unshared
/// string or list can be extended in place.
pub fn write(var: &VarRef, name: &str, value: Value, mode: WriteMode) -> Result<Value, VarError> {
    let var = resolve_link(var);
    let mut var = var.borrow_mut();

    if var.dead {
        return Err(dangling(&var, VarOp::Set, name));
    }

    let old = match std::mem::replace(&mut var.state, VarState::Undefined) {
        VarState::Scalar(old) => Some(old),
        VarState::Undefined => None,
        VarState::Array(array) => {
            var.state = VarState::Array(array);
            return Err(VarError::IsArray {
                op: VarOp::Set,
                name: name.into(),
            });
        }
        VarState::Link(_) => unreachable!("links were resolved"),
    };

    let new_value = match (mode, old) {
        (WriteMode::Set, _) | (WriteMode::Append, None) => value,
        (WriteMode::Append, Some(mut old)) => {
            old.append_str(value.as_str());
            old
        }
        (WriteMode::ListAppend, None) => Value::from(vec![value]),
        (WriteMode::ListAppend, Some(mut old)) => {
            if let Err(err) = old.append_element(value) {
                let msg = err.value().as_str().to_string();
                var.state = VarState::Scalar(old);
                return Err(VarError::NotAList(msg));
            }
            old
        }
    };

    var.state = VarState::Scalar(new_value.clone());
    Ok(new_value)
}

fn dangling(var: &Var, op: VarOp, name: &str) -> VarError {
    if var.is_array_element {
        VarError::DeletedElement {
            op,
            name: name.into(),
        }
    } else {
        VarError::DeletedNamespaceVar {
            op,
            name: name.into(),
        }
    }
}

/// Unsets a resolved cell.  If the cell is a link, the link's target is unset and the
/// link remains.  An array's elements are torn down first, and marked dead so that
/// links to them dangle.
pub fn unset(var: &VarRef, name: &str) -> Result<(), VarError> {
    let var = resolve_link(var);
    let mut var = var.borrow_mut();

    match std::mem::replace(&mut var.state, VarState::Undefined) {
        VarState::Undefined if var.is_array_element => Err(VarError::NoSuchElement {
            op: VarOp::Unset,
            name: name.into(),
        }),
        VarState::Undefined => Err(VarError::NoSuchVariable {
            op: VarOp::Unset,
            name: name.into(),
        }),
        VarState::Array(array) => {
            array.destroy();
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Makes `local` an alias for `target`.
///
/// The target's own links are followed first.  Fails if the two are the same cell, or
/// if `local` already holds a value and isn't a link.
pub fn make_link(local: &VarRef, target: &VarRef, local_name: &str) -> Result<(), VarError> {
    let target = resolve_link(target);

    if Rc::ptr_eq(local, &target) {
        return Err(VarError::SelfAlias);
    }

    let mut local_var = local.borrow_mut();
    match &local_var.state {
        VarState::Undefined | VarState::Link(_) => {
            local_var.state = VarState::Link(target);
            Ok(())
        }
        _ => Err(VarError::AlreadyExists(local_name.into())),
    }
}

//-----------------------------------------------------------------------------
// Arrays

/// The data of an array variable: its elements, in insertion order, and any
/// active searches.
#[derive(Debug, Default)]
pub struct ArrayData {
    elements: IndexMap<String, VarRef, MoltHasher>,
    searches: Vec<ArraySearch>,
    next_search_id: usize,
}

/// An array search cursor: the id, and the index of the next element to visit.
#[derive(Debug, Clone, Copy)]
struct ArraySearch {
    id: usize,
    position: usize,
}

impl ArrayData {
    /// Returns the element cell, creating it (undefined) if `create` is set.
    pub fn element(&mut self, index: &str, create: bool) -> Option<VarRef> {
        if let Some(elem) = self.elements.get(index) {
            return Some(Rc::clone(elem));
        }

        if create {
            let elem = Var::new_element();
            self.elements.insert(index.into(), Rc::clone(&elem));
            Some(elem)
        } else {
            None
        }
    }

    /// Removes the named element's cell from the table if nothing else refers to it.
    /// While a search is active, removed elements stay in place as undefined
    /// tombstones, so that search positions remain valid.
    pub fn purge(&mut self, index: &str) {
        if !self.searches.is_empty() {
            return;
        }

        if let Some(elem) = self.elements.get(index) {
            if Rc::strong_count(elem) == 1 && elem.borrow().is_undefined() {
                self.elements.shift_remove(index);
            }
        }
    }

    fn purge_all(&mut self) {
        self.elements
            .retain(|_, elem| Rc::strong_count(elem) > 1 || !elem.borrow().is_undefined());
    }

    /// The names of the defined elements.
    pub fn names(&self) -> MoltList {
        self.defined().map(|(name, _)| Value::from(name.as_str())).collect()
    }

    /// The number of defined elements.
    pub fn size(&self) -> usize {
        self.defined().count()
    }

    /// The defined elements as a flat name/value list.
    pub fn get(&self) -> MoltList {
        let mut list = Vec::new();
        for (name, elem) in self.defined() {
            if let VarState::Scalar(value) = &elem.borrow().state {
                list.push(Value::from(name.as_str()));
                list.push(value.clone());
            }
        }
        list
    }

    fn defined(&self) -> impl Iterator<Item = (&String, &VarRef)> {
        self.elements
            .iter()
            .filter(|(_, elem)| !elem.borrow().is_undefined())
    }

    /// Unsets every element, marking each dead.
    pub(crate) fn destroy(self: Box<Self>) {
        for (_, elem) in self.elements {
            let mut elem = elem.borrow_mut();
            elem.state = VarState::Undefined;
            elem.dead = true;
        }
    }

    //-------------------------------------------------------------------------
    // Searches

    /// Starts a new search, returning its id.  Ids are 1-based and increase
    /// monotonically for the life of the array.
    pub fn start_search(&mut self) -> usize {
        self.next_search_id += 1;
        let id = self.next_search_id;
        self.searches.push(ArraySearch { id, position: 0 });
        id
    }

    fn search_mut(&mut self, id: usize) -> Option<&mut ArraySearch> {
        self.searches.iter_mut().find(|s| s.id == id)
    }

    /// Returns true if the search exists.
    pub fn has_search(&self, id: usize) -> bool {
        self.searches.iter().any(|s| s.id == id)
    }

    /// Returns the next defined element name in the search, or `None` when the search
    /// is exhausted.  Elements unset since the search began are skipped.
    pub fn next_element(&mut self, id: usize) -> Option<Option<String>> {
        let mut position = self.search_mut(id)?.position;

        let found = loop {
            match self.elements.get_index(position) {
                Some((name, elem)) => {
                    position += 1;
                    if !elem.borrow().is_undefined() {
                        break Some(name.clone());
                    }
                }
                None => break None,
            }
        };

        if let Some(search) = self.search_mut(id) {
            search.position = position;
        }

        Some(found)
    }

    /// Returns true if the search has more elements to visit.
    pub fn any_more(&self, id: usize) -> Option<bool> {
        let search = self.searches.iter().find(|s| s.id == id)?;
        Some(
            self.elements
                .values()
                .skip(search.position)
                .any(|elem| !elem.borrow().is_undefined()),
        )
    }

    /// Ends the search.  When the last search ends, tombstones are purged.
    pub fn end_search(&mut self, id: usize) -> bool {
        let before = self.searches.len();
        self.searches.retain(|s| s.id != id);
        let found = self.searches.len() < before;

        if found && self.searches.is_empty() {
            self.purge_all();
        }

        found
    }
}

/// Returns the element of an array cell, promoting an undefined cell to an array when
/// `create` is set.  `name` is the full `array(index)` name, for errors.
pub fn array_element(
    array: &VarRef,
    index: &str,
    create: bool,
    op: VarOp,
    name: &str,
) -> Result<VarRef, VarError> {
    let array = resolve_link(array);
    let mut var = array.borrow_mut();

    if var.dead && create {
        return Err(dangling(&var, op, name));
    }

    if let VarState::Array(data) = &mut var.state {
        return data.element(index, create).ok_or(VarError::NoSuchElement {
            op,
            name: name.into(),
        });
    }

    // Arrays of arrays aren't allowed.
    if !var.is_undefined() || var.is_array_element {
        return Err(VarError::NeedArray {
            op,
            name: name.into(),
        });
    }

    if !create {
        return Err(VarError::NoSuchVariable {
            op,
            name: name.into(),
        });
    }

    let mut data = Box::<ArrayData>::default();
    let elem = data.element(index, true);
    var.state = VarState::Array(data);
    elem.ok_or(VarError::NoSuchElement {
        op,
        name: name.into(),
    })
}

/// Calls `func` on the array data of a resolved array cell, or returns `None` if the
/// cell isn't an array.
pub fn with_array<T>(var: &VarRef, func: impl FnOnce(&mut ArrayData) -> T) -> Option<T> {
    let var = resolve_link(var);
    let mut var = var.borrow_mut();
    match &mut var.state {
        VarState::Array(data) => Some(func(data)),
        _ => None,
    }
}

/// Makes a resolved cell an empty array, if it's undefined.  Returns false if it holds
/// a scalar.
pub fn ensure_array(var: &VarRef) -> bool {
    let var = resolve_link(var);
    let mut var = var.borrow_mut();

    if var.is_array() {
        true
    } else if var.is_undefined() && !var.is_array_element {
        var.state = VarState::Array(Box::default());
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(value: &str) -> VarRef {
        let var = Var::new_ref(true);
        write(&var, "x", Value::from(value), WriteMode::Set).unwrap();
        var
    }

    #[test]
    fn test_read_write() {
        let var = Var::new_ref(true);
        assert_eq!(
            read(&var, "x"),
            Err(VarError::NoSuchVariable {
                op: VarOp::Read,
                name: "x".into()
            })
        );

        write(&var, "x", "abc".into(), WriteMode::Set).unwrap();
        write(&var, "x", "def".into(), WriteMode::Append).unwrap();
        assert_eq!(read(&var, "x").unwrap().as_str(), "abcdef");

        write(&var, "x", "g h".into(), WriteMode::ListAppend).unwrap();
        assert_eq!(read(&var, "x").unwrap().as_str(), "abcdef {g h}");
    }

    #[test]
    fn test_list_append_error() {
        let var = scalar("a {b");
        let err = write(&var, "x", "c".into(), WriteMode::ListAppend).unwrap_err();
        assert!(matches!(err, VarError::NotAList(_)));
        assert_eq!(read(&var, "x").unwrap().as_str(), "a {b");
    }

    #[test]
    fn test_links() {
        let target = scalar("1");
        let local = Var::new_ref(false);
        make_link(&local, &target, "y").unwrap();
        assert_eq!(read(&local, "y").unwrap().as_str(), "1");

        write(&local, "y", "2".into(), WriteMode::Set).unwrap();
        assert_eq!(read(&target, "x").unwrap().as_str(), "2");

        // Unsetting through the link unsets the target; the link remains.
        unset(&local, "y").unwrap();
        assert!(target.borrow().is_undefined());
        assert!(local.borrow().is_link());
    }

    #[test]
    fn test_self_alias() {
        let var = Var::new_ref(true);
        assert_eq!(make_link(&var, &var, "x"), Err(VarError::SelfAlias));

        // Linking to a link that leads back is also self-alias.
        let other = Var::new_ref(true);
        make_link(&other, &var, "y").unwrap();
        assert_eq!(make_link(&var, &other, "x"), Err(VarError::SelfAlias));
    }

    #[test]
    fn test_link_onto_defined_var() {
        let local = scalar("1");
        let target = Var::new_ref(true);
        assert!(matches!(
            make_link(&local, &target, "x"),
            Err(VarError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_array_elements() {
        let array = Var::new_ref(true);
        let elem = array_element(&array, "e", true, VarOp::Set, "a(e)").unwrap();
        write(&elem, "a(e)", "v".into(), WriteMode::Set).unwrap();
        assert!(array.borrow().is_array());

        let elem = array_element(&array, "e", false, VarOp::Read, "a(e)").unwrap();
        assert_eq!(read(&elem, "a(e)").unwrap().as_str(), "v");

        assert!(matches!(
            array_element(&array, "f", false, VarOp::Read, "a(f)"),
            Err(VarError::NoSuchElement { .. })
        ));

        let scalar = scalar("1");
        assert!(matches!(
            array_element(&scalar, "f", true, VarOp::Set, "x(f)"),
            Err(VarError::NeedArray { .. })
        ));
    }

    #[test]
    fn test_dangling_element_link() {
        let array = Var::new_ref(true);
        let elem = array_element(&array, "e", true, VarOp::Set, "a(e)").unwrap();
        let local = Var::new_ref(false);
        make_link(&local, &elem, "x").unwrap();
        drop(elem);

        unset(&array, "a").unwrap();
        assert!(matches!(
            write(&local, "x", "1".into(), WriteMode::Set),
            Err(VarError::DeletedElement { .. })
        ));
    }

    #[test]
    fn test_search_with_deletion() {
        let array = Var::new_ref(true);
        for name in ["a", "b", "c"] {
            let elem = array_element(&array, name, true, VarOp::Set, name).unwrap();
            write(&elem, name, "1".into(), WriteMode::Set).unwrap();
        }

        let id = with_array(&array, |data| data.start_search()).unwrap();
        let first = with_array(&array, |data| data.next_element(id)).unwrap();
        assert_eq!(first, Some(Some("a".into())));

        // Delete an element the cursor isn't positioned at.
        let c = array_element(&array, "c", false, VarOp::Unset, "c").unwrap();
        unset(&c, "c").unwrap();
        drop(c);
        with_array(&array, |data| data.purge("c"));

        let rest: Vec<_> = std::iter::from_fn(|| {
            with_array(&array, |data| data.next_element(id)).flatten().flatten()
        })
        .collect();
        assert_eq!(rest, vec!["b".to_string()]);
        assert_eq!(with_array(&array, |data| data.any_more(id)), Some(Some(false)));

        assert_eq!(with_array(&array, |data| data.end_search(id)), Some(true));
        assert_eq!(with_array(&array, |data| data.size()), Some(2));
        assert_eq!(with_array(&array, |data| data.elements.len()), Some(2));
    }
}
