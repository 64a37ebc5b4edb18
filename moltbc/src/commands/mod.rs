//! # Standard Command Definitions
//!
//! This module defines the standard commands.  Most of them have dedicated compilers
//! (see the `compile` module); the functions here are what runs when a command is
//! invoked generically: when its compiler declines a form it can't compile, when
//! compilation is disabled, or when the command is called by a computed name.  Either
//! way the command must behave the same.

use crate::check_args;
use crate::dict::dict_get;
use crate::dict::dict_new;
use crate::dict::dict_put;
use crate::execute::error_code_has_prefix;
use crate::execute::regexp_match;
use crate::interp::exception_from_options;
use crate::interp::Interp;
use crate::parser;
use crate::parser::SubstFlags;
use crate::token::TokenKind;
use crate::types::*;
use crate::util;
use crate::util::IndexSpec;
use crate::var;
use crate::var::VarError;
use crate::var::VarOp;
use crate::var::WriteMode;
use std::rc::Rc;

mod mathop;
mod string;

/// The standard commands, by name.
pub(crate) fn standard_commands<Ctx>() -> Vec<(&'static str, CommandFunc<Ctx>)> {
    let mut list: Vec<(&'static str, CommandFunc<Ctx>)> = vec![
        ("append", cmd_append),
        ("array", cmd_array),
        ("break", cmd_break),
        ("catch", cmd_catch),
        ("continue", cmd_continue),
        ("dict", cmd_dict),
        ("error", cmd_error),
        ("eval", cmd_eval),
        ("expr", cmd_expr),
        ("global", cmd_global),
        ("if", cmd_if),
        ("incr", cmd_incr),
        ("info", cmd_info),
        ("lappend", cmd_lappend),
        ("lindex", cmd_lindex),
        ("list", cmd_list),
        ("llength", cmd_llength),
        ("namespace", cmd_namespace),
        ("proc", cmd_proc),
        ("regexp", string::cmd_regexp),
        ("regsub", string::cmd_regsub),
        ("rename", cmd_rename),
        ("return", cmd_return),
        ("set", cmd_set),
        ("string", string::cmd_string),
        ("subst", cmd_subst),
        ("switch", cmd_switch),
        ("throw", cmd_throw),
        ("try", cmd_try),
        ("unset", cmd_unset),
        ("uplevel", cmd_uplevel),
        ("upvar", cmd_upvar),
        ("variable", cmd_variable),
        ("while", cmd_while),
    ];
    list.extend(mathop::commands());
    list
}

//-----------------------------------------------------------------------------
// Helpers

/// Joins the arguments with spaces after trimming them, as TCL's `concat` does.
fn concat(args: &[Value]) -> Value {
    let parts: Vec<&str> = args
        .iter()
        .map(|arg| arg.as_str().trim())
        .filter(|arg| !arg.is_empty())
        .collect();
    Value::from(parts.join(" "))
}

/// The script given by the remaining arguments: the argument itself if there's just
/// one, so that its cached bytecode is reused.
fn script_arg(args: &[Value]) -> Value {
    if args.len() == 1 {
        args[0].clone()
    } else {
        concat(args)
    }
}

/// Whether an argument looks like a level, `#N` or `N`.
fn looks_like_level(spec: &Value) -> bool {
    let text = spec.as_str();
    text.starts_with('#') || text.starts_with(|c: char| c.is_ascii_digit())
}

/// Parses a level: `#N` is absolute, and `N` is relative to the current level.
fn parse_level<Ctx>(interp: &Interp<Ctx>, spec: &Value) -> Result<usize, Exception> {
    let current = interp.scope_level() as MoltInt;
    let text = spec.as_str();

    let level = match text.strip_prefix('#') {
        Some(absolute) => Value::get_int(absolute).ok(),
        None => Value::get_int(text).ok().map(|relative| current - relative),
    };

    match level {
        Some(level) if (0..=current).contains(&level) => Ok(level as usize),
        _ => molt_err!("bad level \"{}\"", text),
    }
}

/// Adds a line to an error's stack trace naming the script that failed and the line
/// within it.
fn annotate(mut exception: Exception, script: &str) -> Exception {
    if exception.is_error() {
        if cfg!(feature = "error-stack-trace") {
            let line = exception
                .error_data()
                .and_then(|data| data.error_line())
                .unwrap_or(1);
            exception.add_error_info(&format!("    ({} line {})", script, line));
        }
        exception.reset_error_line();
    }
    exception
}

/// Filters names by an optional glob pattern.
fn matching(names: MoltList, pattern: Option<&Value>) -> MoltList {
    match pattern {
        Some(pattern) => names
            .into_iter()
            .filter(|name| util::glob_match(pattern.as_str(), name.as_str(), false))
            .collect(),
        None => names,
    }
}

//-----------------------------------------------------------------------------
// Variables

/// # set *varName* ?*newValue*?
///
/// Sets variable *varName* to *newValue*, returning the value.
/// If *newValue* is omitted, returns the variable's current value,
/// returning an error if the variable is unknown.
pub fn cmd_set<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 3, "varName ?newValue?")?;

    if argv.len() == 3 {
        interp.set_var_return(&argv[1], argv[2].clone()).map(Some)
    } else {
        interp.var(&argv[1]).map(Some)
    }
}

/// # unset ?-nocomplain? ?--? ?*varName* ...?
///
/// Removes the variables.  Unless `-nocomplain` is given, a missing variable is an
/// error.
pub fn cmd_unset<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    let mut complain = true;
    let mut i = 1;

    while i < argv.len() {
        match argv[i].as_str() {
            "-nocomplain" => complain = false,
            "--" => {
                i += 1;
                break;
            }
            _ => break,
        }
        i += 1;
    }

    for name in &argv[i..] {
        match interp.scopes.unset(name) {
            Err(err) if complain => return Err(err.into()),
            _ => (),
        }
    }

    molt_opt_ok!()
}

/// # incr *varName* ?*increment*?
///
/// Increments an integer variable by a value.  A missing variable counts as zero.
pub fn cmd_incr<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 3, "varName ?increment?")?;

    let increment = if argv.len() == 3 { argv[2].as_int()? } else { 1 };
    let name = argv[1].as_str();
    let cell = interp.scopes.lookup(&argv[1], VarOp::Set, true)?;

    let old = match var::read(&cell, name) {
        Ok(value) => value.as_int()?,
        Err(VarError::NoSuchVariable { .. }) | Err(VarError::NoSuchElement { .. }) => 0,
        Err(err) => return Err(err.into()),
    };

    let new = Value::from(old.wrapping_add(increment));
    Ok(Some(var::write(&cell, name, new, WriteMode::Set)?))
}

/// # append *varName* ?*value* ...?
///
/// Appends the values to the variable's string value.  With no values, returns the
/// current value.
pub fn cmd_append<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 0, "varName ?value value ...?")?;
    write_each(interp, &argv[1], &argv[2..], WriteMode::Append)
}

/// # lappend *varName* ?*value* ...?
///
/// Appends the values to the variable's list value.  With no values, a missing
/// variable is created with the empty list.
pub fn cmd_lappend<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 0, "varName ?value value ...?")?;

    if argv.len() == 2 && !interp.var_exists(&argv[1]) {
        return interp.set_var_return(&argv[1], Value::empty()).map(Some);
    }
    write_each(interp, &argv[1], &argv[2..], WriteMode::ListAppend)
}

fn write_each<Ctx>(interp: &mut Interp<Ctx>, name: &Value, values: &[Value], mode: WriteMode) -> MoltOptResult {
    if values.is_empty() {
        return interp.var(name).map(Some);
    }

    let mut result = Value::empty();
    for value in values {
        result = interp.scopes.set(name, value.clone(), mode)?;
    }
    molt_opt_ok!(result)
}

/// # upvar ?*level*? *otherVar* *myVar* ?*otherVar* *myVar* ...?
///
/// Links each local variable to a variable in an enclosing frame, by default the
/// caller's.
pub fn cmd_upvar<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 3, 0, "?level? otherVar localVar ?otherVar localVar ...?")?;

    let (level, pairs) = if argv.len() % 2 == 0 {
        (parse_level(interp, &argv[1])?, &argv[2..])
    } else {
        (parse_level(interp, &Value::from(1))?, &argv[1..])
    };

    for pair in pairs.chunks(2) {
        interp.scopes.upvar(level, &pair[0], &pair[1])?;
    }

    molt_opt_ok!()
}

/// # global ?*varName* ...?
///
/// Within a procedure, links each name to the global variable.
pub fn cmd_global<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    for name in &argv[1..] {
        interp.scopes.global(name)?;
    }

    molt_opt_ok!()
}

/// # variable ?*name* *value* ...? *name* ?*value*?
///
/// Declares namespace variables, optionally setting their values.
pub fn cmd_variable<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 0, "?name value...? name ?value?")?;

    for pair in argv[1..].chunks(2) {
        interp.scopes.variable(&pair[0], pair.get(1).cloned())?;
    }

    molt_opt_ok!()
}

//-----------------------------------------------------------------------------
// Arrays

/// # array *subcommand* ?*arg*...?
pub fn cmd_array<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    let subcommands = [
        Subcommand("anymore", cmd_array_anymore),
        Subcommand("donesearch", cmd_array_donesearch),
        Subcommand("exists", cmd_array_exists),
        Subcommand("get", cmd_array_get),
        Subcommand("names", cmd_array_names),
        Subcommand("nextelement", cmd_array_nextelement),
        Subcommand("set", cmd_array_set),
        Subcommand("size", cmd_array_size),
        Subcommand("startsearch", cmd_array_startsearch),
        Subcommand("unset", cmd_array_unset),
    ];
    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

/// # array exists *arrayName*
fn cmd_array_exists<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "arrayName")?;
    molt_opt_ok!(interp.array_exists(argv[2].as_str()))
}

/// # array get *arrayName* ?*pattern*?
fn cmd_array_get<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 4, "arrayName ?pattern?")?;
    let flat = interp.array_get(argv[2].as_str());

    let list: MoltList = match argv.get(3) {
        Some(pattern) => flat
            .chunks(2)
            .filter(|pair| util::glob_match(pattern.as_str(), pair[0].as_str(), false))
            .flat_map(|pair| pair.iter().cloned())
            .collect(),
        None => flat,
    };
    molt_opt_ok!(list)
}

/// # array names *arrayName* ?*pattern*?
fn cmd_array_names<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 4, "arrayName ?pattern?")?;
    let names = interp.array_names(argv[2].as_str());
    molt_opt_ok!(matching(names, argv.get(3)))
}

/// # array set *arrayName* *list*
fn cmd_array_set<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 4, "arrayName list")?;
    let kvlist = argv[3].as_list()?;
    interp.array_set(argv[2].as_str(), &kvlist)?;
    molt_opt_ok!()
}

/// # array size *arrayName*
fn cmd_array_size<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "arrayName")?;
    molt_opt_ok!(interp.array_size(argv[2].as_str()) as MoltInt)
}

/// # array unset *arrayName* ?*pattern*?
///
/// Unsets the whole array, or just the matching elements.
fn cmd_array_unset<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 4, "arrayName ?pattern?")?;
    let name = argv[2].as_str();

    if !interp.array_exists(name) {
        return molt_opt_ok!();
    }

    match argv.get(3) {
        Some(pattern) => {
            for index in matching(interp.array_names(name), Some(pattern)) {
                interp.unset_element(name, index.as_str());
            }
        }
        None => interp.unset(name),
    }
    molt_opt_ok!()
}

/// # array startsearch *arrayName*
///
/// Returns a search id of the form `s-N-arrayName`.
fn cmd_array_startsearch<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "arrayName")?;
    let name = argv[2].as_str();

    let Some(array) = interp.scopes.array(&argv[2]) else {
        return Err(VarError::NotArray(name.into()).into());
    };
    let id = var::with_array(&array, |data| data.start_search()).unwrap_or_default();
    molt_opt_ok!("s-{}-{}", id, name)
}

/// # array nextelement *arrayName* *searchId*
fn cmd_array_nextelement<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 4, "arrayName searchId")?;

    let (array, id) = find_search(interp, &argv[2], &argv[3])?;
    match var::with_array(&array, |data| data.next_element(id)).flatten() {
        Some(Some(index)) => molt_opt_ok!(index),
        Some(None) => molt_opt_ok!(),
        None => Err(VarError::NoSuchSearch(argv[3].as_str().into()).into()),
    }
}

/// # array anymore *arrayName* *searchId*
fn cmd_array_anymore<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 4, "arrayName searchId")?;

    let (array, id) = find_search(interp, &argv[2], &argv[3])?;
    match var::with_array(&array, |data| data.any_more(id)).flatten() {
        Some(flag) => molt_opt_ok!(flag),
        None => Err(VarError::NoSuchSearch(argv[3].as_str().into()).into()),
    }
}

/// # array donesearch *arrayName* *searchId*
fn cmd_array_donesearch<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 4, "arrayName searchId")?;

    let (array, id) = find_search(interp, &argv[2], &argv[3])?;
    if var::with_array(&array, |data| data.end_search(id)) == Some(true) {
        molt_opt_ok!()
    } else {
        Err(VarError::NoSuchSearch(argv[3].as_str().into()).into())
    }
}

/// Resolves an array and a search id naming it.
fn find_search<Ctx>(
    interp: &mut Interp<Ctx>,
    name: &Value,
    search: &Value,
) -> Result<(var::VarRef, usize), Exception> {
    let Some(array) = interp.scopes.array(name) else {
        return Err(VarError::NotArray(name.as_str().into()).into());
    };

    let id = search
        .as_str()
        .strip_prefix("s-")
        .and_then(|rest| rest.split_once('-'))
        .filter(|(_, array_name)| *array_name == name.as_str())
        .and_then(|(id, _)| id.parse::<usize>().ok());

    match id {
        Some(id) => Ok((array, id)),
        None => Err(VarError::NoSuchSearch(search.as_str().into()).into()),
    }
}

//-----------------------------------------------------------------------------
// Namespaces

/// # namespace *subcommand* ?*arg*...?
pub fn cmd_namespace<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    let subcommands = [
        Subcommand("children", cmd_namespace_children),
        Subcommand("current", cmd_namespace_current),
        Subcommand("delete", cmd_namespace_delete),
        Subcommand("eval", cmd_namespace_eval),
        Subcommand("exists", cmd_namespace_exists),
        Subcommand("qualifiers", cmd_namespace_qualifiers),
        Subcommand("tail", cmd_namespace_tail),
    ];
    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

/// # namespace children ?*namespace*?
fn cmd_namespace_children<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 2, 3, "?name?")?;

    let ns = match argv.get(2) {
        Some(path) => match interp.scopes.find_namespace(path.as_str(), false) {
            Some(ns) => ns,
            None => return molt_err!("namespace \"{}\" not found", path),
        },
        None => interp.scopes.current_namespace(),
    };

    let names: MoltList = ns.children().iter().map(|child| Value::from(child.name())).collect();
    molt_opt_ok!(names)
}

/// # namespace current
fn cmd_namespace_current<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 2, 2, "")?;
    molt_opt_ok!(interp.scopes.current_namespace().name())
}

/// # namespace delete ?*namespace* ...?
fn cmd_namespace_delete<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    // FIRST, check them all, so that nothing is deleted on error.
    let mut doomed = Vec::new();
    for path in &argv[2..] {
        match interp.scopes.find_namespace(path.as_str(), false) {
            Some(ns) if ns.is_global() => return molt_err!("can't delete the global namespace"),
            Some(ns) => doomed.push(ns),
            None => {
                return molt_err!("unknown namespace \"{}\" in namespace delete command", path)
            }
        }
    }

    for ns in doomed {
        ns.delete();
    }
    molt_opt_ok!()
}

/// # namespace eval *namespace* *arg* ?*arg* ...?
///
/// Evaluates the script in the namespace, creating it if need be.
fn cmd_namespace_eval<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 0, "name arg ?arg...?")?;

    let Some(ns) = interp.scopes.find_namespace(argv[2].as_str(), true) else {
        return molt_err!("can't create namespace \"{}\"", argv[2]);
    };
    let script = script_arg(&argv[3..]);
    let trace = format!("in namespace eval \"{}\" script", ns.name());

    interp.scopes.push_namespace(ns);
    let result = interp.eval_value(&script, ctx);
    interp.scopes.pop();

    result.map(Some).map_err(|ex| annotate(ex, &trace))
}

/// # namespace exists *namespace*
fn cmd_namespace_exists<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "name")?;
    molt_opt_ok!(interp.scopes.find_namespace(argv[2].as_str(), false).is_some())
}

/// # namespace qualifiers *string*
fn cmd_namespace_qualifiers<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "string")?;
    let (quals, _) = crate::namespace::split_qualified(argv[2].as_str());
    molt_opt_ok!(quals.unwrap_or(""))
}

/// # namespace tail *string*
fn cmd_namespace_tail<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "string")?;
    molt_opt_ok!(crate::namespace::split_qualified(argv[2].as_str()).1)
}

//-----------------------------------------------------------------------------
// Introspection

/// # info *subcommand* ?*arg*...?
pub fn cmd_info<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    let subcommands = [
        Subcommand("args", cmd_info_args),
        Subcommand("body", cmd_info_body),
        Subcommand("cmdtype", cmd_info_cmdtype),
        Subcommand("commands", cmd_info_commands),
        Subcommand("complete", cmd_info_complete),
        Subcommand("default", cmd_info_default),
        Subcommand("exists", cmd_info_exists),
        Subcommand("globals", cmd_info_globals),
        Subcommand("level", cmd_info_level),
        Subcommand("locals", cmd_info_locals),
        Subcommand("procs", cmd_info_procs),
        Subcommand("vars", cmd_info_vars),
    ];
    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

fn cmd_info_args<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "procname")?;
    interp.proc_args(argv[2].as_str()).map(Some)
}

fn cmd_info_body<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "procname")?;
    interp.proc_body(argv[2].as_str()).map(Some)
}

fn cmd_info_cmdtype<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "command")?;
    interp.command_type(argv[2].as_str()).map(Some)
}

fn cmd_info_commands<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 2, 3, "?pattern?")?;
    molt_opt_ok!(matching(interp.command_names(), argv.get(2)))
}

fn cmd_info_complete<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "command")?;
    molt_opt_ok!(interp.complete(argv[2].as_str()))
}

/// # info default *procname* *arg* *varname*
///
/// Stores the argument's default value in the variable, returning 1; or stores the
/// empty string and returns 0 if there is none.
fn cmd_info_default<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 5, 5, "procname arg varname")?;

    match interp.proc_default(argv[2].as_str(), argv[3].as_str())? {
        Some(value) => {
            interp.set_var(&argv[4], value)?;
            molt_opt_ok!(1)
        }
        None => {
            interp.set_var(&argv[4], Value::empty())?;
            molt_opt_ok!(0)
        }
    }
}

fn cmd_info_exists<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "varname")?;
    molt_opt_ok!(interp.var_exists(&argv[2]))
}

fn cmd_info_globals<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 2, 3, "?pattern?")?;
    molt_opt_ok!(matching(interp.vars_in_global_scope(), argv.get(2)))
}

/// # info level ?*number*?
///
/// With no argument, the current level.  Otherwise, the words of the command running
/// at the given level: absolute if positive, relative if zero or negative.
fn cmd_info_level<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 2, 3, "?number?")?;
    let current = interp.scope_level() as MoltInt;

    let Some(spec) = argv.get(2) else {
        return molt_opt_ok!(current);
    };

    let number = spec.as_int()?;
    let level = if number > 0 { number } else { current + number };

    if level <= 0 || level > current {
        return molt_err!("bad level \"{}\"", spec);
    }

    match interp.scopes.frame(level as usize) {
        Some(frame) => molt_opt_ok!(Value::from(frame.invocation())),
        None => molt_err!("bad level \"{}\"", spec),
    }
}

fn cmd_info_locals<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 2, 3, "?pattern?")?;
    molt_opt_ok!(matching(interp.vars_in_local_scope(), argv.get(2)))
}

fn cmd_info_procs<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 2, 3, "?pattern?")?;
    molt_opt_ok!(matching(interp.proc_names(), argv.get(2)))
}

fn cmd_info_vars<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 2, 3, "?pattern?")?;
    molt_opt_ok!(matching(interp.vars_in_scope(), argv.get(2)))
}

//-----------------------------------------------------------------------------
// Procedures and commands

/// # proc *name* *args* *body*
///
/// Defines a procedure.  Each argument is a name, or a name and a default value.
pub fn cmd_proc<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 4, 4, "name args body")?;

    let parms = argv[2].as_list()?;
    for spec in parms.iter() {
        let fields = spec.as_list()?;
        match fields.len() {
            0 => return molt_err!("argument with no name"),
            1 | 2 => (),
            _ => return molt_err!("too many fields in argument specifier \"{}\"", spec),
        }
    }

    interp.add_proc(argv[1].as_str(), &parms, &argv[3]);
    molt_opt_ok!()
}

/// # rename *oldName* *newName*
///
/// Renames a command, or deletes it if the new name is empty.
pub fn cmd_rename<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 3, 3, "oldName newName")?;

    let old_name = argv[1].as_str();
    let new_name = argv[2].as_str();

    if !interp.has_command(old_name) {
        let op = if new_name.is_empty() { "delete" } else { "rename" };
        return molt_err!("can't {} \"{}\": command doesn't exist", op, old_name);
    }

    if new_name.is_empty() {
        interp.remove_command(old_name);
    } else {
        if interp.has_command(new_name) {
            return molt_err!("can't rename to \"{}\": command already exists", new_name);
        }
        interp.rename_command(old_name, new_name);
    }

    molt_opt_ok!()
}

//-----------------------------------------------------------------------------
// Exceptions

/// # break
pub fn cmd_break<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 1, 1, "")?;
    Err(Exception::molt_break())
}

/// # continue
pub fn cmd_continue<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 1, 1, "")?;
    Err(Exception::molt_continue())
}

/// # return ?-option *value* ...? ?*value*?
///
/// Returns from a procedure, or raises the completion the options describe.  A
/// `-options` dictionary is merged into the other options.
pub fn cmd_return<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    let args = &argv[1..];
    let (pairs, value) = if args.len() % 2 == 1 {
        (&args[..args.len() - 1], args[args.len() - 1].clone())
    } else {
        (args, Value::empty())
    };

    let mut opts = dict_new();
    for pair in pairs.chunks(2) {
        if pair[0].as_str() == "-options" {
            for (key, val) in pair[1].as_dict()?.iter() {
                opts.insert(key.clone(), val.clone());
            }
        } else {
            opts.insert(pair[0].clone(), pair[1].clone());
        }
    }

    exception_from_options(value, &Value::from(opts), 1).map(Some)
}

/// # error *message* ?*info*? ?*code*?
///
/// Raises an error.  A non-empty *info* starts the stack trace in place of the message.
pub fn cmd_error<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 4, "message ?errorInfo? ?errorCode?")?;

    let error_code = argv.get(3).cloned().unwrap_or_else(|| Value::from("NONE"));
    let data = match argv.get(2) {
        Some(info) if !info.as_str().is_empty() => ErrorData::rethrow(error_code, info.as_str()),
        _ => ErrorData::new(error_code, argv[1].as_str()),
    };

    Err(Exception::molt_err_data(argv[1].clone(), data))
}

/// # throw *type* *message*
pub fn cmd_throw<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 3, 3, "type message")?;

    if argv[1].as_list()?.is_empty() {
        return molt_err!("type must be non-empty list");
    }
    Err(Exception::molt_err2(argv[1].clone(), argv[2].clone()))
}

/// # catch *script* ?*resultVarName*? ?*optionsVarName*?
///
/// Evaluates the script, returning its result code and saving its result and its
/// return options in the variables.
pub fn cmd_catch<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 4, "script ?resultVarName? ?optionsVarName?")?;

    let result = interp.eval_value(&argv[1], ctx);
    let (code, value) = match &result {
        Ok(value) => (0, value.clone()),
        Err(exception) => {
            if let Some(data) = exception.error_data() {
                interp.scopes.set_global("errorInfo", data.error_info())?;
                interp.scopes.set_global("errorCode", data.error_code())?;
            }
            (exception.code().as_int(), exception.value())
        }
    };

    if let Some(var_name) = argv.get(2) {
        interp.set_var(var_name, value)?;
    }
    if let Some(var_name) = argv.get(3) {
        let options = interp.return_options(&result);
        interp.set_var(var_name, options)?;
    }

    molt_opt_ok!(code)
}

/// A `try` handler.
struct Handler {
    /// `on`: the result code to match.  `trap`: `None`, and the prefix to match.
    code: Option<MoltInt>,
    prefix: Value,
    vars: Rc<MoltList>,
    body: Value,
}

/// # try *body* ?*handler* ...? ?finally *script*?
///
/// Each handler is `on code variableList script` or `trap pattern variableList
/// script`.  The first matching handler runs; a body of `-` uses the next handler's
/// body.  The `finally` script always runs; if it fails, its exception replaces the
/// result, with the result's options in `-during`.
pub fn cmd_try<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 0, "body ?handler ...? ?finally script?")?;

    // FIRST, parse the handlers.
    let mut handlers = Vec::new();
    let mut finally = None;
    let mut i = 2;

    while i < argv.len() {
        match argv[i].as_str() {
            keyword @ ("on" | "trap") => {
                if i + 3 >= argv.len() {
                    return molt_err!(
                        "wrong # args to {} clause: must be \"... {} {} variableList script\"",
                        keyword,
                        keyword,
                        if keyword == "on" { "code" } else { "pattern" }
                    );
                }
                let code = if keyword == "on" {
                    Some(ResultCode::from_value(&argv[i + 1])?.as_int())
                } else {
                    None
                };
                handlers.push(Handler {
                    code,
                    prefix: argv[i + 1].clone(),
                    vars: argv[i + 2].as_list()?,
                    body: argv[i + 3].clone(),
                });
                i += 4;
            }
            "finally" => {
                if i + 2 != argv.len() {
                    return molt_err!("finally clause must be last and have a script");
                }
                finally = Some(argv[i + 1].clone());
                i += 2;
            }
            keyword => {
                return molt_err!("bad handler \"{}\": must be finally, on, or trap", keyword);
            }
        }
    }

    if handlers.last().map(|h| h.body.as_str() == "-").unwrap_or(false) {
        return molt_err!("last non-finally clause must not have a body of \"-\"");
    }

    // NEXT, run the body, and then the first handler that matches.
    let result = interp.eval_value(&argv[1], ctx);
    let options = interp.return_options(&result);
    let code = match &result {
        Ok(_) => 0,
        Err(exception) => exception.code().as_int(),
    };

    let mut found = None;
    for (index, handler) in handlers.iter().enumerate() {
        let matched = match handler.code {
            Some(on) => on == code,
            None => code == 1 && error_code_has_prefix(&options, &handler.prefix)?,
        };
        if matched {
            found = Some(index);
            break;
        }
    }

    let outcome = match found {
        Some(index) => {
            let value = match &result {
                Ok(value) => value.clone(),
                Err(exception) => exception.value(),
            };
            run_handler(interp, &handlers[index..], value, options, ctx)
        }
        None => result,
    };

    // NEXT, the finally script.
    if let Some(script) = finally {
        if let Err(mut exception) = interp.eval_value(&script, ctx) {
            exception.set_during(interp.return_options(&outcome));
            return Err(exception);
        }
    }

    outcome.map(Some)
}

/// Binds the handler's variables and runs its body, falling through `-` bodies.
fn run_handler<Ctx>(
    interp: &mut Interp<Ctx>,
    handlers: &[Handler],
    value: Value,
    options: Value,
    ctx: &mut Ctx,
) -> MoltResult {
    let vars = &handlers[0].vars;
    if let Some(var_name) = vars.first() {
        interp.set_var(var_name, value)?;
    }
    if let Some(var_name) = vars.get(1) {
        interp.set_var(var_name, options)?;
    }

    match handlers.iter().find(|h| h.body.as_str() != "-") {
        Some(handler) => interp.eval_value(&handler.body, ctx),
        None => molt_ok!(),
    }
}

//-----------------------------------------------------------------------------
// Control structures

/// # if *expr* ?then? *script* ?elseif *expr* ?then? *script* ...? ?else? ?*script*?
pub fn cmd_if<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    let mut i = 1;

    loop {
        // FIRST, the condition and its body.
        let Some(cond) = argv.get(i) else {
            return molt_err!("wrong # args: no expression after \"{}\" argument", argv[i - 1]);
        };
        i += 1;
        if argv.get(i).map(|word| word.as_str()) == Some("then") {
            i += 1;
        }
        let Some(body) = argv.get(i) else {
            return molt_err!("wrong # args: no script following \"{}\" argument", cond);
        };
        i += 1;

        if interp.expr_bool(cond, ctx)? {
            return interp.eval_value(body, ctx).map(Some);
        }

        // NEXT, what follows.
        match argv.get(i).map(|word| word.as_str()) {
            None => return molt_opt_ok!(),
            Some("elseif") => i += 1,
            Some(word) => {
                if word == "else" {
                    i += 1;
                }
                let Some(body) = argv.get(i) else {
                    return molt_err!("wrong # args: no script following \"else\" argument");
                };
                if i + 1 != argv.len() {
                    return molt_err!("wrong # args: extra words after \"else\" clause in \"if\" command");
                }
                return interp.eval_value(body, ctx).map(Some);
            }
        }
    }
}

/// # while *test* *command*
pub fn cmd_while<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 3, 3, "test command")?;

    while interp.expr_bool(&argv[1], ctx)? {
        let result = interp.eval_value(&argv[2], ctx);

        if let Err(exception) = result {
            match exception.code() {
                ResultCode::Break => break,
                ResultCode::Continue => (),
                _ => return Err(exception),
            }
        }
    }

    molt_opt_ok!()
}

/// How `switch` compares patterns.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum SwitchMode {
    Exact,
    Glob,
    Regexp,
}

/// # switch ?*options*? *string* *pattern* *body* ?*pattern* *body* ...?
/// # switch ?*options*? *string* {*pattern* *body* ?*pattern* *body* ...?}
///
/// Runs the body of the first pattern that matches.  A body of `-` falls through to
/// the next body; a final `default` pattern matches anything.
pub fn cmd_switch<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    const SIGNATURE: &str = "?-option ...? string {?pattern body ...? ?default body?}";

    let mut mode = SwitchMode::Exact;
    let mut nocase = false;
    let mut i = 1;

    // FIRST, the options.
    while i < argv.len() {
        let word = argv[i].as_str();
        if !word.starts_with('-') {
            break;
        }
        match word {
            "-exact" => mode = SwitchMode::Exact,
            "-glob" => mode = SwitchMode::Glob,
            "-regexp" => mode = SwitchMode::Regexp,
            "-nocase" => nocase = true,
            "--" => {
                i += 1;
                break;
            }
            _ => {
                return molt_err!(
                    "bad option \"{}\": must be -exact, -glob, -regexp, -nocase, or --",
                    word
                )
            }
        }
        i += 1;
    }

    if i + 1 >= argv.len() {
        return molt_throw!("TCL WRONGARGS" => "wrong # args: should be \"switch {}\"", SIGNATURE);
    }
    let string = argv[i].as_str();
    i += 1;

    // NEXT, the arms, in either form.
    let arms: MoltList = if argv.len() - i == 1 {
        argv[i].as_list()?.to_vec()
    } else {
        argv[i..].to_vec()
    };

    if arms.is_empty() {
        return molt_throw!("TCL WRONGARGS" => "wrong # args: should be \"switch {}\"", SIGNATURE);
    }
    if arms.len() % 2 != 0 {
        return molt_err!("extra switch pattern with no body");
    }
    if arms[arms.len() - 1].as_str() == "-" {
        return molt_err!("no body specified for pattern \"{}\"", arms[arms.len() - 2]);
    }

    // NEXT, find the first match.
    let last = arms.len() - 2;
    for index in (0..arms.len()).step_by(2) {
        let pattern = arms[index].as_str();

        let matched = if index == last && pattern == "default" {
            true
        } else {
            match mode {
                SwitchMode::Exact if nocase => pattern.to_lowercase() == string.to_lowercase(),
                SwitchMode::Exact => pattern == string,
                SwitchMode::Glob => util::glob_match(pattern, string, nocase),
                SwitchMode::Regexp => regexp_match(interp, pattern, string, nocase)?,
            }
        };

        if matched {
            let body = arms[index + 1..]
                .iter()
                .step_by(2)
                .find(|body| body.as_str() != "-");
            return match body {
                Some(body) => interp.eval_value(body, ctx).map(Some),
                None => molt_opt_ok!(),
            };
        }
    }

    molt_opt_ok!()
}

/// # subst ?-nobackslashes? ?-nocommands? ?-novariables? *string*
///
/// In a command substitution, `break` ends the substitution with what has been
/// substituted so far, `continue` substitutes the empty string, and `return`
/// substitutes the returned value.
pub fn cmd_subst<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 5, "?-nobackslashes? ?-nocommands? ?-novariables? string")?;

    let mut flags = SubstFlags::default();
    for opt in &argv[1..argv.len() - 1] {
        match opt.as_str() {
            "-nobackslashes" => flags.no_backslashes = true,
            "-nocommands" => flags.no_commands = true,
            "-novariables" => flags.no_variables = true,
            _ => {
                return molt_err!(
                    "bad option \"{}\": must be -nobackslashes, -nocommands, or -novariables",
                    opt
                )
            }
        }
    }

    let source = argv[argv.len() - 1].as_str();
    let tokens = parser::parse_subst(source, 0, source.len(), flags)?;
    let mut result = String::new();
    let mut i = 1;

    while i < tokens.len() {
        let token = tokens[i];
        let subtree = &tokens[i..i + 1 + token.num_components];
        i += subtree.len();

        if token.kind != TokenKind::Command {
            let piece = interp.eval_tokens(source, subtree, ctx)?;
            result.push_str(piece.as_str());
            continue;
        }

        let script = Value::from(&source[token.start + 1..token.end() - 1]);
        match interp.eval_value(&script, ctx) {
            Ok(piece) => result.push_str(piece.as_str()),
            Err(exception) => match exception.code() {
                ResultCode::Break => break,
                ResultCode::Continue => (),
                ResultCode::Return => result.push_str(exception.value().as_str()),
                _ => return Err(exception),
            },
        }
    }

    molt_opt_ok!(result)
}

//-----------------------------------------------------------------------------
// Evaluation

/// # eval *arg* ?*arg* ...?
pub fn cmd_eval<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 0, "arg ?arg ...?")?;

    let script = script_arg(&argv[1..]);
    interp
        .eval_value(&script, ctx)
        .map(Some)
        .map_err(|ex| annotate(ex, "\"eval\" body"))
}

/// # uplevel ?*level*? *arg* ?*arg* ...?
///
/// Evaluates the script in the frame at the given level, by default the caller's.
/// The frames above it are out of sight until the script completes.
pub fn cmd_uplevel<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 0, "?level? command ?arg ...?")?;

    let (level, rest) = if argv.len() > 2 && looks_like_level(&argv[1]) {
        (parse_level(interp, &argv[1])?, &argv[2..])
    } else {
        (parse_level(interp, &Value::from(1))?, &argv[1..])
    };

    let script = script_arg(rest);
    let frames = interp.scopes.suspend_above(level);
    let result = interp.eval_value(&script, ctx);
    interp.scopes.restore(frames);

    result.map(Some).map_err(|ex| annotate(ex, "\"uplevel\" body"))
}

/// # expr *arg* ?*arg* ...?
pub fn cmd_expr<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 0, "arg ?arg ...?")?;
    crate::expr::expr(interp, &script_arg(&argv[1..]), ctx).map(Some)
}

//-----------------------------------------------------------------------------
// Lists and dictionaries

/// # list ?*arg* ...?
pub fn cmd_list<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    molt_opt_ok!(&argv[1..])
}

/// # llength *list*
pub fn cmd_llength<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 2, "list")?;
    molt_opt_ok!(argv[1].as_list()?.len() as MoltInt)
}

/// # lindex *list* ?*index* ...?
///
/// Indexes into nested lists.  A single index argument may itself be a list of
/// indices.  An index out of range yields the empty string.
pub fn cmd_lindex<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(1, argv, 2, 0, "list ?index ...?")?;

    let indices: MoltList = match argv.len() {
        2 => return molt_opt_ok!(argv[1].clone()),
        3 => argv[2].as_list()?.to_vec(),
        _ => argv[2..].to_vec(),
    };

    let mut value = argv[1].clone();
    for index in &indices {
        let list = value.as_list()?;
        let i = IndexSpec::parse(index.as_str())?.resolve(list.len());
        if i < 0 || i as usize >= list.len() {
            return molt_opt_ok!();
        }
        value = list[i as usize].clone();
    }

    molt_opt_ok!(value)
}

/// # dict *subcommand* ?*arg*...?
pub fn cmd_dict<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    let subcommands = [
        Subcommand("create", cmd_dict_create),
        Subcommand("exists", cmd_dict_exists),
        Subcommand("get", cmd_dict_get),
        Subcommand("keys", cmd_dict_keys),
        Subcommand("set", cmd_dict_set),
        Subcommand("size", cmd_dict_size),
    ];
    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

/// # dict create ?*key* *value* ...?
fn cmd_dict_create<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    if argv.len() % 2 != 0 {
        return molt_throw!("TCL WRONGARGS", "wrong # args: should be \"dict create ?key value ...?\"");
    }

    let mut dict = dict_new();
    for pair in argv[2..].chunks(2) {
        dict.insert(pair[0].clone(), pair[1].clone());
    }
    molt_opt_ok!(dict)
}

/// # dict exists *dictionary* *key* ?*key* ...?
fn cmd_dict_exists<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 0, "dictionary key ?key ...?")?;

    let mut value = argv[2].clone();
    for key in &argv[3..] {
        let next = match value.as_dict() {
            Ok(dict) => dict.get(key).cloned(),
            Err(_) => None,
        };
        match next {
            Some(next) => value = next,
            None => return molt_opt_ok!(false),
        }
    }
    molt_opt_ok!(true)
}

/// # dict get *dictionary* ?*key* ...?
fn cmd_dict_get<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 0, "dictionary ?key ...?")?;

    let mut value = argv[2].clone();
    for key in &argv[3..] {
        let dict = value.as_dict()?;
        value = dict_get(&dict, key)?;
    }
    molt_opt_ok!(value)
}

/// # dict keys *dictionary* ?*pattern*?
fn cmd_dict_keys<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 4, "dictionary ?pattern?")?;
    let keys: MoltList = argv[2].as_dict()?.keys().cloned().collect();
    molt_opt_ok!(matching(keys, argv.get(3)))
}

/// # dict set *dictVarName* *key* ?*key* ...? *value*
///
/// Sets a value in a (possibly nested) dictionary variable, creating the variable if
/// need be.
fn cmd_dict_set<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 5, 0, "dictVarName key ?key ...? value")?;

    let old = if interp.var_exists(&argv[2]) {
        interp.var(&argv[2])?
    } else {
        Value::empty()
    };
    let keys = &argv[3..argv.len() - 1];
    let new = dict_set_path(&old, keys, argv[argv.len() - 1].clone())?;
    interp.set_var_return(&argv[2], new).map(Some)
}

fn dict_set_path(dict: &Value, keys: &[Value], value: Value) -> MoltResult {
    if keys.len() == 1 {
        return dict_put(dict, keys[0].clone(), value);
    }

    let inner = dict
        .as_dict()?
        .get(&keys[0])
        .cloned()
        .unwrap_or_else(Value::empty);
    let inner = dict_set_path(&inner, &keys[1..], value)?;
    dict_put(dict, keys[0].clone(), inner)
}

/// # dict size *dictionary*
fn cmd_dict_size<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "dictionary")?;
    molt_opt_ok!(argv[2].as_dict()?.len() as MoltInt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(interp: &mut Interp, script: &str) -> MoltResult {
        interp.eval(script, &mut ())
    }

    /// Evaluates the script with compilation disabled, so that only the generic
    /// commands run.
    fn generic(script: &str) -> MoltResult {
        let mut interp = Interp::new();
        for name in interp.command_names() {
            interp.forget_compiler(name.as_str());
        }
        interp.eval(script, &mut ())
    }

    fn err_msg(result: MoltResult) -> String {
        match result {
            Err(exception) => exception.value().to_string(),
            Ok(value) => panic!("expected an error, got {:?}", value),
        }
    }

    #[test]
    fn test_set_unset() {
        let mut interp = Interp::new();
        assert_eq!(run(&mut interp, "set a 1"), Ok(Value::from("1")));
        assert_eq!(run(&mut interp, "set a"), Ok(Value::from("1")));
        assert_eq!(run(&mut interp, "unset a; info exists a"), Ok(Value::from(false)));
        assert_eq!(
            err_msg(run(&mut interp, "unset a")),
            "can't unset \"a\": no such variable"
        );
        assert!(run(&mut interp, "unset -nocomplain a").is_ok());
    }

    #[test]
    fn test_incr_append_generic() {
        assert_eq!(generic("incr x"), Ok(Value::from("1")));
        assert_eq!(generic("set x 5; incr x -2"), Ok(Value::from("3")));
        assert_eq!(generic("append s a b c"), Ok(Value::from("abc")));
        assert_eq!(generic("lappend l a {b c}"), Ok(Value::from("a {b c}")));
        assert_eq!(generic("lappend m"), Ok(Value::from("")));
        assert!(generic("set x foo; incr x").is_err());
    }

    #[test]
    fn test_upvar_global() {
        let mut interp = Interp::new();
        run(&mut interp, "proc bump {name} {upvar $name v; incr v}").unwrap();
        assert_eq!(run(&mut interp, "set n 1; bump n; set n"), Ok(Value::from("2")));

        run(&mut interp, "proc g {} {global n; set n 10}").unwrap();
        assert_eq!(run(&mut interp, "g; set n"), Ok(Value::from("10")));

        run(&mut interp, "proc same {} {upvar 0 x x}").unwrap();
        assert_eq!(
            err_msg(run(&mut interp, "same")),
            "can't upvar from variable to itself"
        );

        assert_eq!(err_msg(run(&mut interp, "upvar x y")), "bad level \"1\"");
    }

    #[test]
    fn test_array() {
        let mut interp = Interp::new();
        run(&mut interp, "array set a {x 1 y 2 z 3}").unwrap();
        assert_eq!(run(&mut interp, "array size a"), Ok(Value::from(3)));
        assert_eq!(run(&mut interp, "array names a y*"), Ok(Value::from("y")));
        assert_eq!(run(&mut interp, "array get a x"), Ok(Value::from("x 1")));
        assert_eq!(run(&mut interp, "array exists a"), Ok(Value::from(true)));
        assert_eq!(run(&mut interp, "array exists nothing"), Ok(Value::from(false)));

        run(&mut interp, "array unset a x").unwrap();
        assert_eq!(run(&mut interp, "array size a"), Ok(Value::from(2)));
        run(&mut interp, "array unset a").unwrap();
        assert_eq!(run(&mut interp, "info exists a"), Ok(Value::from(false)));
    }

    #[test]
    fn test_array_search() {
        let mut interp = Interp::new();
        run(&mut interp, "array set a {x 1 y 2}").unwrap();
        let id = run(&mut interp, "set id [array startsearch a]").unwrap();
        assert_eq!(id.as_str(), "s-1-a");

        assert_eq!(run(&mut interp, "array anymore a $id"), Ok(Value::from(true)));
        assert_eq!(run(&mut interp, "array nextelement a $id"), Ok(Value::from("x")));
        assert_eq!(run(&mut interp, "array nextelement a $id"), Ok(Value::from("y")));
        assert_eq!(run(&mut interp, "array anymore a $id"), Ok(Value::from(false)));
        assert_eq!(run(&mut interp, "array nextelement a $id"), Ok(Value::from("")));
        run(&mut interp, "array donesearch a $id").unwrap();

        assert_eq!(
            err_msg(run(&mut interp, "array nextelement a $id")),
            "couldn't find search \"s-1-a\""
        );
        assert_eq!(
            err_msg(run(&mut interp, "array startsearch b")),
            "\"b\" isn't an array"
        );
    }

    #[test]
    fn test_namespace() {
        let mut interp = Interp::new();
        assert_eq!(run(&mut interp, "namespace current"), Ok(Value::from("::")));
        assert_eq!(
            run(&mut interp, "namespace eval foo {variable v 1; namespace current}"),
            Ok(Value::from("::foo"))
        );
        assert_eq!(run(&mut interp, "set ::foo::v"), Ok(Value::from("1")));
        assert_eq!(run(&mut interp, "namespace children"), Ok(Value::from("::foo")));
        assert_eq!(run(&mut interp, "namespace tail ::a::b"), Ok(Value::from("b")));
        assert_eq!(run(&mut interp, "namespace qualifiers ::a::b"), Ok(Value::from("::a")));

        run(&mut interp, "namespace delete foo").unwrap();
        assert_eq!(run(&mut interp, "namespace exists foo"), Ok(Value::from(false)));
        assert!(run(&mut interp, "namespace delete foo").is_err());
    }

    #[test]
    fn test_info() {
        let mut interp = Interp::new();
        run(&mut interp, "proc p {a {b 2}} {info level 0}").unwrap();
        assert_eq!(run(&mut interp, "info args p"), Ok(Value::from("a b")));
        assert_eq!(run(&mut interp, "info body p"), Ok(Value::from("info level 0")));
        assert_eq!(run(&mut interp, "info default p b d"), Ok(Value::from(1)));
        assert_eq!(run(&mut interp, "set d"), Ok(Value::from("2")));
        assert_eq!(run(&mut interp, "info default p a d"), Ok(Value::from(0)));
        assert_eq!(run(&mut interp, "p 1"), Ok(Value::from("p 1")));
        assert_eq!(run(&mut interp, "info level"), Ok(Value::from(0)));
        assert_eq!(run(&mut interp, "info procs"), Ok(Value::from("p")));
        assert_eq!(run(&mut interp, "info cmdtype p"), Ok(Value::from("proc")));
        assert_eq!(run(&mut interp, "info complete \"a \\{b\""), Ok(Value::from(false)));
    }

    #[test]
    fn test_proc_definition() {
        let mut interp = Interp::new();
        assert_eq!(
            err_msg(run(&mut interp, "proc p {{a 1 2}} {}")),
            "too many fields in argument specifier \"a 1 2\""
        );
        assert_eq!(
            err_msg(run(&mut interp, "proc q {a} {}; q")),
            "wrong # args: should be \"q a\""
        );
    }

    #[test]
    fn test_rename() {
        let mut interp = Interp::new();
        run(&mut interp, "proc p {} {return ok}").unwrap();
        run(&mut interp, "rename p q").unwrap();
        assert_eq!(run(&mut interp, "q"), Ok(Value::from("ok")));
        assert_eq!(
            err_msg(run(&mut interp, "rename p r")),
            "can't rename \"p\": command doesn't exist"
        );
        run(&mut interp, "rename q {}").unwrap();
        assert!(!interp.has_command("q"));
    }

    #[test]
    fn test_return_codes() {
        let mut interp = Interp::new();
        assert_eq!(run(&mut interp, "catch {return -code break}"), Ok(Value::from(2)));
        assert_eq!(run(&mut interp, "catch {return -level 0 -code break}"), Ok(Value::from(3)));
        assert_eq!(run(&mut interp, "catch {error msg} m; set m"), Ok(Value::from("msg")));

        run(&mut interp, "proc p {} {return -code error -errorcode {MY CODE} bad}").unwrap();
        assert_eq!(run(&mut interp, "catch p m o"), Ok(Value::from(1)));
        assert_eq!(run(&mut interp, "dict get $o -errorcode"), Ok(Value::from("MY CODE")));
        assert_eq!(run(&mut interp, "set errorCode"), Ok(Value::from("MY CODE")));

        run(&mut interp, "proc q {} {return -code break}").unwrap();
        assert_eq!(run(&mut interp, "catch q"), Ok(Value::from(3)));
    }

    #[test]
    fn test_error_and_throw() {
        let mut interp = Interp::new();
        run(&mut interp, "catch {error msg {custom info} {A B}} m o").unwrap();
        assert_eq!(
            run(&mut interp, "string match {custom info*} [dict get $o -errorinfo]"),
            Ok(Value::from(true))
        );
        assert_eq!(run(&mut interp, "dict get $o -errorcode"), Ok(Value::from("A B")));

        run(&mut interp, "catch {throw {X Y} oops} m o").unwrap();
        assert_eq!(run(&mut interp, "set m"), Ok(Value::from("oops")));
        assert_eq!(run(&mut interp, "dict get $o -errorcode"), Ok(Value::from("X Y")));
        assert_eq!(
            err_msg(run(&mut interp, "throw {} oops")),
            "type must be non-empty list"
        );
    }

    #[test]
    fn test_try_generic() {
        assert_eq!(
            generic("try {throw {A B C} boom} trap {A B} {m} {set r $m}"),
            Ok(Value::from("boom"))
        );
        assert_eq!(
            generic("try {error x} on ok {} {set r ok} on error {} {set r err}"),
            Ok(Value::from("err"))
        );
        assert_eq!(
            generic("try {set r 1} on ok - on error {} {set r handled}"),
            Ok(Value::from("handled"))
        );
        assert_eq!(
            generic("set log {}; try {set r 1} finally {lappend log done}; set log"),
            Ok(Value::from("done"))
        );
        assert_eq!(
            err_msg(generic("try {error first} finally {error second}")),
            "second"
        );
        assert_eq!(
            err_msg(generic("try {} bogus")),
            "bad handler \"bogus\": must be finally, on, or trap"
        );
        assert_eq!(
            err_msg(generic("try {} on error {} -")),
            "last non-finally clause must not have a body of \"-\""
        );
    }

    #[test]
    fn test_finally_during() {
        let mut interp = Interp::new();
        for name in interp.command_names() {
            interp.forget_compiler(name.as_str());
        }
        run(
            &mut interp,
            "catch {try {error first} finally {error second}} m o",
        )
        .unwrap();
        assert_eq!(run(&mut interp, "set m"), Ok(Value::from("second")));
        let during = run(&mut interp, "dict get $o -during").unwrap();
        assert_eq!(
            during.as_dict().unwrap().get(&Value::from("-errorinfo")).map(|v| v.as_str().starts_with("first")),
            Some(true)
        );
    }

    #[test]
    fn test_if_while_generic() {
        assert_eq!(generic("if {1} {set a yes} else {set a no}"), Ok(Value::from("yes")));
        assert_eq!(generic("if 0 then {set a yes} elseif 1 {set a maybe}"), Ok(Value::from("maybe")));
        assert_eq!(generic("if 0 {set a yes} {set a implicit}"), Ok(Value::from("implicit")));
        assert_eq!(generic("if 0 {set a yes}"), Ok(Value::from("")));
        assert_eq!(
            err_msg(generic("if")),
            "wrong # args: no expression after \"if\" argument"
        );
        assert_eq!(
            err_msg(generic("if 1")),
            "wrong # args: no script following \"1\" argument"
        );

        assert_eq!(
            generic("set i 0; while {$i < 10} {incr i; if {$i == 5} break}; set i"),
            Ok(Value::from("5"))
        );
        assert_eq!(
            generic("set i 0; set n 0; while {$i < 4} {incr i; if {$i % 2} continue; incr n}; set n"),
            Ok(Value::from("2"))
        );
    }

    #[test]
    fn test_switch_generic() {
        assert_eq!(generic("switch b {a {set r 1} b {set r 2} b {set r 3}}"), Ok(Value::from("2")));
        assert_eq!(generic("switch c a {set r 1} b - c {set r 2}"), Ok(Value::from("2")));
        assert_eq!(generic("switch z {a {set r 1} default {set r d}}"), Ok(Value::from("d")));
        assert_eq!(generic("switch z {a {set r 1}}"), Ok(Value::from("")));
        assert_eq!(generic("switch -glob abc {a* {set r g}}"), Ok(Value::from("g")));
        assert_eq!(generic("switch -nocase ABC {abc {set r n}}"), Ok(Value::from("n")));
        assert_eq!(
            err_msg(generic("switch x {a}")),
            "extra switch pattern with no body"
        );
        assert_eq!(
            err_msg(generic("switch x {a -}")),
            "no body specified for pattern \"a\""
        );
        assert_eq!(
            err_msg(generic("switch -bogus x {a b}")),
            "bad option \"-bogus\": must be -exact, -glob, -regexp, -nocase, or --"
        );
    }

    #[test]
    fn test_subst_generic() {
        assert_eq!(generic("set a 1; subst {a=$a [set a] \\t}"), Ok(Value::from("a=1 1 \t")));
        assert_eq!(generic("subst -nocommands {[x]}"), Ok(Value::from("[x]")));
        assert_eq!(generic("subst {a[break]b}"), Ok(Value::from("a")));
        assert_eq!(generic("subst {a[continue]b}"), Ok(Value::from("ab")));
        assert_eq!(generic("subst {a[return z]b}"), Ok(Value::from("azb")));
        assert_eq!(
            generic("subst {abc,[return foo;expr 1+2],def}"),
            Ok(Value::from("abc,foo,def"))
        );

        // A return in a substitution doesn't leave the enclosing proc.
        let mut interp = Interp::new();
        for name in interp.command_names() {
            interp.forget_compiler(name.as_str());
        }
        run(&mut interp, "proc p {} {set s [subst {<[return in]>}]; return after$s}").unwrap();
        assert_eq!(run(&mut interp, "p"), Ok(Value::from("after<in>")));
        assert!(generic("subst {a[error x]b}").is_err());
    }

    #[test]
    fn test_eval_uplevel() {
        let mut interp = Interp::new();
        assert_eq!(run(&mut interp, "eval set a 5"), Ok(Value::from("5")));
        run(&mut interp, "proc setter {} {uplevel {set b 7}}").unwrap();
        assert_eq!(run(&mut interp, "setter; set b"), Ok(Value::from("7")));
        run(&mut interp, "proc outer {} {set v outer; inner}").unwrap();
        run(&mut interp, "proc inner {} {uplevel 1 {set v}}").unwrap();
        assert_eq!(run(&mut interp, "outer"), Ok(Value::from("outer")));
        run(&mut interp, "proc top {} {uplevel #0 {set c 3}}").unwrap();
        assert_eq!(run(&mut interp, "top; set c"), Ok(Value::from("3")));
    }

    #[test]
    fn test_lists_dicts() {
        let mut interp = Interp::new();
        assert_eq!(run(&mut interp, "list a {b c} d"), Ok(Value::from("a {b c} d")));
        assert_eq!(run(&mut interp, "llength {a {b c} d}"), Ok(Value::from(3)));
        assert_eq!(run(&mut interp, "lindex {a {b c} d} 1 0"), Ok(Value::from("b")));
        assert_eq!(run(&mut interp, "lindex {a b c} end"), Ok(Value::from("c")));
        assert_eq!(run(&mut interp, "lindex {a b c} 5"), Ok(Value::from("")));

        assert_eq!(run(&mut interp, "dict create a 1 b 2"), Ok(Value::from("a 1 b 2")));
        assert_eq!(run(&mut interp, "dict get {a {x 1}} a x"), Ok(Value::from("1")));
        assert_eq!(run(&mut interp, "dict get {a {x {y 2}}} a x y"), Ok(Value::from("2")));
        assert_eq!(
            err_msg(run(&mut interp, "dict get {a 1} b")),
            "key \"b\" not known in dictionary"
        );
        assert_eq!(run(&mut interp, "dict exists {a 1} b"), Ok(Value::from(false)));
        assert_eq!(run(&mut interp, "dict set d a x 1; dict set d b 2"), Ok(Value::from("a {x 1} b 2")));
        assert_eq!(run(&mut interp, "dict size $d"), Ok(Value::from(2)));
        assert_eq!(run(&mut interp, "dict keys $d"), Ok(Value::from("a b")));
    }
}
