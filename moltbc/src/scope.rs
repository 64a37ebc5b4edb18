//! Call Frames and Variable Resolution
//!
//! The `ScopeStack` is the interpreter's stack of call frames, plus the namespace
//! tree.  Level 0 is the global frame; each procedure call (and each `namespace eval`)
//! pushes a frame.
//!
//! A procedure frame holds the procedure's compiled locals: one cell per name in the
//! body's local-name table, created when the frame is pushed.  Variables the compiler
//! didn't see (names computed at run time) go in the frame's overflow table, created
//! on first use.  A non-procedure frame resolves plain names in its namespace.
//!
//! Name resolution for a plain name in a procedure frame tries, in order:
//!
//! * The compiled-local index cached on the name value, if the frame's local-name table
//!   still holds the very name object the cache was made against.
//! * A scan of the local-name table, which caches the index it finds.
//! * The overflow table.
//!
//! A qualified name (one containing `::`) always resolves in its namespace.
//! A name of the form `array(index)` resolves the array name as above, and then the
//! element within the array.

use crate::namespace;
use crate::namespace::Namespace;
use crate::types::*;
use crate::var;
use crate::var::Var;
use crate::var::VarError;
use crate::var::VarOp;
use crate::var::VarRef;
use crate::var::VarTable;
use crate::var::WriteMode;
use std::rc::Rc;

/// Scoping flags for variable lookup.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct LookupFlags {
    /// Resolve plain names in the global namespace.
    pub global_only: bool,

    /// Resolve plain names in the frame's namespace, ignoring procedure locals.
    pub namespace_only: bool,
}

/// A single call frame.
#[derive(Debug)]
pub struct CallFrame {
    /// The frame's namespace.
    namespace: Rc<Namespace>,

    /// True for procedure frames, which have local variables.
    is_proc: bool,

    /// The compiled-local names, shared with the procedure's bytecode.
    local_names: Rc<Vec<Value>>,

    /// The compiled-local cells, parallel to `local_names`.
    locals: Vec<VarRef>,

    /// Locals the compiler didn't assign slots to.
    vars: Option<VarTable>,

    /// The command words that invoked the frame, for `info level`.
    invocation: MoltList,
}

impl CallFrame {
    fn new(namespace: Rc<Namespace>, is_proc: bool, local_names: Rc<Vec<Value>>) -> Self {
        let locals = local_names.iter().map(|_| Var::new_ref(false)).collect();
        Self {
            namespace,
            is_proc,
            local_names,
            locals,
            vars: None,
            invocation: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &Rc<Namespace> {
        &self.namespace
    }

    pub fn is_proc(&self) -> bool {
        self.is_proc
    }

    pub fn invocation(&self) -> &[Value] {
        &self.invocation
    }

    /// Looks up a plain local name: compiled locals first, then the overflow table.
    fn local(&mut self, name: &str, cache_on: Option<&Value>, create: bool) -> Option<VarRef> {
        if let Some(index) = self.local_names.iter().position(|n| n.as_str() == name) {
            if let Some(value) = cache_on {
                value.cache_slot(&self.local_names[index], index);
            }
            return Some(Rc::clone(&self.locals[index]));
        }

        if let Some(var) = self.vars.as_ref().and_then(|vars| vars.get(name)) {
            return Some(Rc::clone(var));
        }

        if create {
            let var = Var::new_ref(true);
            self.vars
                .get_or_insert_with(VarTable::default)
                .insert(name.into(), Rc::clone(&var));
            Some(var)
        } else {
            None
        }
    }

    fn purge_local(&mut self, name: &str) {
        if let Some(vars) = &mut self.vars {
            if let Some(var) = vars.get(name) {
                if Rc::strong_count(var) == 1 && var.borrow().is_undefined() {
                    vars.shift_remove(name);
                }
            }
        }
    }

    /// The names of the frame's defined local variables.
    fn local_var_names(&self) -> MoltList {
        let mut names: MoltList = self
            .local_names
            .iter()
            .zip(&self.locals)
            .filter(|(_, var)| !var.borrow().is_undefined())
            .map(|(name, _)| name.clone())
            .collect();

        if let Some(vars) = &self.vars {
            names.extend(
                vars.iter()
                    .filter(|(_, var)| !var.borrow().is_undefined())
                    .map(|(name, _)| Value::from(name.as_str())),
            );
        }

        names
    }
}

/// The stack of call frames, and the namespace tree.
pub struct ScopeStack {
    frames: Vec<CallFrame>,
    global: Rc<Namespace>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    /// Creates a scope stack containing only the global frame.
    pub fn new() -> Self {
        let global = Namespace::new_global();
        let frame = CallFrame::new(Rc::clone(&global), false, Rc::new(Vec::new()));

        Self {
            frames: vec![frame],
            global,
        }
    }

    //-------------------------------------------------------------------------
    // Frames

    /// Pushes a procedure frame with the given compiled locals.
    pub fn push_proc(&mut self, local_names: Rc<Vec<Value>>, invocation: &[Value]) {
        let namespace = Rc::clone(&self.top().namespace);
        let mut frame = CallFrame::new(namespace, true, local_names);
        frame.invocation = invocation.to_vec();
        self.frames.push(frame);
    }

    /// Pushes a procedure frame with no compiled locals.
    pub fn push(&mut self) {
        self.push_proc(Rc::new(Vec::new()), &[]);
    }

    /// Pushes a frame for evaluating code in a namespace.
    pub fn push_namespace(&mut self, namespace: Rc<Namespace>) {
        self.frames
            .push(CallFrame::new(namespace, false, Rc::new(Vec::new())));
    }

    /// Pops the top frame.  The global frame is never popped.
    pub fn pop(&mut self) {
        assert!(self.frames.len() > 1, "tried to pop the global frame");
        self.frames.pop();
    }

    /// The current frame's level.  The global frame is level 0.
    pub fn current(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn frame(&self, level: usize) -> Option<&CallFrame> {
        self.frames.get(level)
    }

    fn top(&self) -> &CallFrame {
        &self.frames[self.frames.len() - 1]
    }

    /// Temporarily makes `level` the current frame, as for `uplevel`: frames above it
    /// are set aside until `restore` is called with the returned frames.
    pub fn suspend_above(&mut self, level: usize) -> Vec<CallFrame> {
        self.frames.split_off(level + 1)
    }

    pub fn restore(&mut self, frames: Vec<CallFrame>) {
        self.frames.extend(frames);
    }

    pub fn global_namespace(&self) -> &Rc<Namespace> {
        &self.global
    }

    pub fn current_namespace(&self) -> Rc<Namespace> {
        Rc::clone(&self.top().namespace)
    }

    /// Resolves a namespace name relative to the current namespace.
    pub fn find_namespace(&self, path: &str, create: bool) -> Option<Rc<Namespace>> {
        namespace::resolve(&self.global, &self.top().namespace, path, create)
    }

    //-------------------------------------------------------------------------
    // Compiled locals

    /// Returns compiled-local cell `index` of the current frame, if the frame's locals
    /// were created from the given local-name table.
    pub fn local_slot(&self, local_names: &Rc<Vec<Value>>, index: usize) -> Option<VarRef> {
        let frame = self.top();
        if Rc::ptr_eq(&frame.local_names, local_names) {
            frame.locals.get(index).cloned()
        } else {
            None
        }
    }

    //-------------------------------------------------------------------------
    // Lookup

    /// Resolves a variable name in the current frame.  The returned cell may be a link;
    /// the read and write operations follow links.
    pub fn lookup(&mut self, name: &Value, op: VarOp, create: bool) -> Result<VarRef, VarError> {
        let level = self.current();
        self.lookup_in(level, name, LookupFlags::default(), op, create)
    }

    /// Resolves a variable name in the frame at `level`.
    pub fn lookup_in(
        &mut self,
        level: usize,
        name: &Value,
        flags: LookupFlags,
        op: VarOp,
        create: bool,
    ) -> Result<VarRef, VarError> {
        // FIRST, try the cached compiled-local index.
        if flags == LookupFlags::default() {
            let frame = &self.frames[level];
            if frame.is_proc {
                if let Some(index) = name.cached_slot(&frame.local_names) {
                    return Ok(Rc::clone(&frame.locals[index]));
                }
            }
        }

        // NEXT, split array(index) syntax, and resolve the base variable.
        let var_name = name.as_var_name();

        let cache_on = if var_name.index().is_none() {
            Some(name)
        } else {
            None
        };

        let base = self
            .find_base(level, var_name.name(), cache_on, flags, op, create)
            .map_err(|err| match err {
                VarError::NoSuchNamespace { op, .. } => VarError::NoSuchNamespace {
                    op,
                    name: name.as_str().into(),
                },
                err => err,
            })?
            .ok_or_else(|| VarError::NoSuchVariable {
                op,
                name: name.as_str().into(),
            })?;

        // NEXT, resolve the element, if any.
        match var_name.index() {
            None => Ok(base),
            Some(index) => var::array_element(&base, index, create, op, name.as_str()),
        }
    }

    /// Finds the cell for a plain or qualified variable name, without following links.
    fn find_base(
        &mut self,
        level: usize,
        name: &str,
        cache_on: Option<&Value>,
        flags: LookupFlags,
        op: VarOp,
        create: bool,
    ) -> Result<Option<VarRef>, VarError> {
        if namespace::is_qualified(name) {
            let (quals, tail) = namespace::split_qualified(name);
            let quals = quals.unwrap_or("::");
            let current = Rc::clone(&self.frames[level].namespace);

            return match namespace::resolve(&self.global, &current, quals, false) {
                Some(ns) => Ok(ns.var(tail, create)),
                None if create => Err(VarError::NoSuchNamespace {
                    op,
                    name: name.into(),
                }),
                None => Ok(None),
            };
        }

        let frame = &mut self.frames[level];

        if flags.global_only {
            return Ok(self.global.var(name, create));
        }

        if flags.namespace_only || !frame.is_proc {
            return Ok(frame.namespace.var(name, create));
        }

        Ok(frame.local(name, cache_on, create))
    }

    /// Removes a variable's cell from its table after an unset, if nothing refers to it.
    fn purge(&mut self, name: &Value) {
        let var_name = name.as_var_name();
        let level = self.current();

        if let Some(index) = var_name.index() {
            let flags = LookupFlags::default();
            if let Ok(Some(base)) =
                self.find_base(level, var_name.name(), None, flags, VarOp::Unset, false)
            {
                var::with_array(&base, |data| data.purge(index));
            }
            return;
        }

        let base_name = var_name.name();
        if namespace::is_qualified(base_name) {
            let (quals, tail) = namespace::split_qualified(base_name);
            if let Some(ns) = self.find_namespace(quals.unwrap_or("::"), false) {
                ns.purge_var(tail);
            }
            return;
        }

        let frame = &mut self.frames[level];
        if frame.is_proc {
            frame.purge_local(base_name);
        } else {
            frame.namespace.purge_var(base_name);
        }
    }

    //-------------------------------------------------------------------------
    // Variable operations

    /// Reads the named variable.
    pub fn get(&mut self, name: &Value) -> Result<Value, VarError> {
        let var = self.lookup(name, VarOp::Read, false)?;
        var::read(&var, name.as_str())
    }

    /// Writes the named variable, creating it if need be.  Returns the new value.
    pub fn set(&mut self, name: &Value, value: Value, mode: WriteMode) -> Result<Value, VarError> {
        let var = self.lookup(name, VarOp::Set, true)?;
        var::write(&var, name.as_str(), value, mode)
    }

    /// Returns true if the named variable exists and has a value.
    pub fn exists(&mut self, name: &Value) -> bool {
        match self.lookup(name, VarOp::Read, false) {
            Ok(var) => var::read(&var, name.as_str()).is_ok() || is_array(&var),
            Err(_) => false,
        }
    }

    /// Unsets the named variable.
    pub fn unset(&mut self, name: &Value) -> Result<(), VarError> {
        let var = self.lookup(name, VarOp::Unset, false)?;
        var::unset(&var, name.as_str())?;
        drop(var);
        self.purge(name);
        Ok(())
    }

    /// Sets a variable in the global namespace.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), VarError> {
        let var = self.global.var(name, true).ok_or_else(|| VarError::NoSuchVariable {
            op: VarOp::Set,
            name: name.into(),
        })?;
        var::write(&var, name, value, WriteMode::Set)?;
        Ok(())
    }

    //-------------------------------------------------------------------------
    // Links

    /// Links the local variable `local` in the current frame to the variable `other`
    /// in the frame at `level`.
    pub fn upvar(&mut self, level: usize, other: &Value, local: &Value) -> Result<(), VarError> {
        if local.as_var_name().index().is_some() {
            return Err(VarError::LinkToElement(local.as_str().into()));
        }

        let target = self.lookup_in(level, other, LookupFlags::default(), VarOp::Upvar, true)?;
        self.link_local(local.as_str(), &target)
    }

    /// Links the local variable named by the tail of `name` to the global variable
    /// `name`.  Outside of a procedure this does nothing.
    pub fn global(&mut self, name: &Value) -> Result<(), VarError> {
        if !self.top().is_proc {
            return Ok(());
        }

        let flags = LookupFlags {
            global_only: true,
            namespace_only: false,
        };
        let level = self.current();
        let target = self.lookup_in(level, name, flags, VarOp::Upvar, true)?;
        let tail = namespace::split_qualified(name.as_str()).1;
        self.link_local(tail, &target)
    }

    /// Declares a namespace variable, optionally setting its value.  Within a
    /// procedure, the local variable named by the tail of `name` is linked to it.
    pub fn variable(&mut self, name: &Value, value: Option<Value>) -> Result<(), VarError> {
        if name.as_var_name().index().is_some() {
            return Err(VarError::LinkToElement(name.as_str().into()));
        }

        let flags = LookupFlags {
            global_only: false,
            namespace_only: true,
        };
        let level = self.current();
        let target = self.lookup_in(level, name, flags, VarOp::Set, true)?;

        if let Some(value) = value {
            var::write(&target, name.as_str(), value, WriteMode::Set)?;
        }

        if self.top().is_proc {
            let tail = namespace::split_qualified(name.as_str()).1;
            self.link_local(tail, &target)?;
        }

        Ok(())
    }

    fn link_local(&mut self, local: &str, target: &VarRef) -> Result<(), VarError> {
        let level = self.current();
        let flags = LookupFlags::default();
        let local_var = self
            .find_base(level, local, None, flags, VarOp::Upvar, true)?
            .ok_or_else(|| VarError::NoSuchVariable {
                op: VarOp::Upvar,
                name: local.into(),
            })?;
        var::make_link(&local_var, target, local)
    }

    //-------------------------------------------------------------------------
    // Arrays

    /// Resolves the named array, if it exists.
    pub fn array(&mut self, name: &Value) -> Option<VarRef> {
        let var = self.lookup(name, VarOp::Read, false).ok()?;
        if is_array(&var) {
            Some(var)
        } else {
            None
        }
    }

    /// Resolves the named variable as an array, creating an empty array if the
    /// variable doesn't exist.
    pub fn ensure_array(&mut self, name: &Value) -> Result<VarRef, VarError> {
        let var = self.lookup(name, VarOp::Set, true)?;
        if var::ensure_array(&var) {
            Ok(var)
        } else {
            Err(VarError::NeedArray {
                op: VarOp::Set,
                name: name.as_str().into(),
            })
        }
    }

    //-------------------------------------------------------------------------
    // Introspection

    /// The names of the variables visible in the current frame.
    pub fn vars_in_scope(&self) -> MoltList {
        let frame = self.top();
        if frame.is_proc {
            frame.local_var_names()
        } else {
            frame.namespace.var_names()
        }
    }

    /// The names of the global variables.
    pub fn vars_in_global_scope(&self) -> MoltList {
        self.global.var_names()
    }
}

fn is_array(var: &VarRef) -> bool {
    var::resolve_link(var).borrow().is_array()
}
