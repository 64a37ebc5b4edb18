//! # moltbc
//!
//! A bytecode compiler and variable engine for Molt, an embeddable TCL interpreter.
//!
//! Scripts are tokenized, compiled command-by-command into a compact stack-machine
//! instruction stream, and executed by a small bytecode interpreter.  Control-flow and
//! string commands (`while`, `switch`, `try`, `subst`, `string`, the math operator
//! commands, and the variable commands) have dedicated compilers; every other command,
//! and every form a compiler declines, is compiled as a generic command invocation.
//!
//! Variables live in call frames (as compiled local slots or in an overflow table) and
//! in namespaces; `upvar`, `global`, and `variable` create links between them.
//!
//! ```
//! use moltbc::Interp;
//! use moltbc::types::*;
//!
//! let mut glob_ctx = ();
//! let mut interp = Interp::new();
//! let val = interp.eval("set x 5; incr x 2", &mut glob_ctx).unwrap();
//! assert_eq!(val.as_str(), "7");
//! ```

//-----------------------------------------------------------------------------
// Macros

/// Returns an `Ok` `MoltResult`.
///
/// If called with no arguments, returns an empty value as the `Ok` result.
/// If called with one argument, returns the argument as the `Ok` result, converting it
/// to a value automatically.  If called with two or more arguments, computes the `Ok`
/// result using `format!()`; the first argument is naturally the format string.
#[macro_export]
macro_rules! molt_ok {
    () => (
        Ok($crate::Value::empty())
    );
    ($arg:expr) => (
        Ok($crate::Value::from($arg))
    );
    ($($arg:tt)*) => (
        Ok($crate::Value::from(format!($($arg)*)))
    )
}

/// Returns an `Ok` `MoltOptResult`, the return type of command functions.
///
/// If called with no arguments, returns `Ok(None)`; otherwise, as for `molt_ok!`.
#[macro_export]
macro_rules! molt_opt_ok {
    () => (
        Ok(None)
    );
    ($arg:expr) => (
        Ok(Some($crate::Value::from($arg)))
    );
    ($($arg:tt)*) => (
        Ok(Some($crate::Value::from(format!($($arg)*))))
    )
}

/// Returns an `Error` `MoltResult`.  The error message is formatted as with `format!()`.
///
/// If called with one argument, the single argument is used as the error message.
/// If called with more than one argument, the first is a `format!()` format string,
/// and the remainder are the values to format.
#[macro_export]
macro_rules! molt_err {
    ($arg:expr) => (
        Err($crate::Exception::molt_err($crate::Value::from($arg)))
    );
    ($($arg:tt)*) => (
        Err($crate::Exception::molt_err($crate::Value::from(format!($($arg)*))))
    )
}

/// Returns an `Error` `MoltResult` with a specific error code.  The error message is
/// formatted as with `format!()`.
///
/// The macro requires two or more arguments.  The first argument is the error code.
/// If called with two arguments, the second is the error message.  If called with more
/// than two arguments, the second is a `format!()` format string and the remainder are
/// the values to format.
#[macro_export]
macro_rules! molt_throw {
    ($code:expr, $single:expr) => (
        Err($crate::Exception::molt_err2($crate::Value::from($code), $crate::Value::from($single)))
    );
    ($code:expr => $($arg:tt)*) => (
        Err($crate::Exception::molt_err2($crate::Value::from($code), $crate::Value::from(format!($($arg)*))))
    )
}

//-----------------------------------------------------------------------------
// Modules

pub mod types;
pub mod value;

mod commands;
pub mod compile;
pub mod dict;
mod execute;
mod expr;
pub mod interp;
pub mod list;
pub mod namespace;
pub mod parser;
#[cfg(feature = "regexp")]
mod regexp;
pub mod scope;
pub mod token;
mod util;
pub mod var;

pub use crate::interp::Interp;
pub use crate::types::*;
pub use crate::value::Value;

/// This function is used in command functions to check whether the command's argument
/// list is of a proper size for the given command.  If it is, `check_args` returns
/// the empty result; if not, it returns a TCL `wrong # args` error message.
///
/// * `namec`: the number of elements in `argv` that constitute the command's name;
///   1 for a plain command, 2 for a subcommand.
/// * `argv`: the argument list, including the command name.
/// * `min`: the minimum length of `argv`.
/// * `max`: the maximum length of `argv`, or 0 if there is no maximum.
/// * `argsig`: the argument signature, to be included in the error message.
///
/// ```
/// # use moltbc::types::*;
/// # use moltbc::check_args;
/// let argv: Vec<Value> = vec!["incr".into(), "x".into()];
/// assert!(check_args(1, &argv, 2, 3, "varName ?increment?").is_ok());
/// assert!(check_args(1, &argv, 3, 3, "varName increment").is_err());
/// ```
pub fn check_args(
    namec: usize,
    argv: &[Value],
    min: usize,
    max: usize,
    argsig: &str,
) -> Result<(), Exception> {
    assert!(namec >= 1);
    assert!(min >= 1);
    assert!(!argv.is_empty());

    if argv.len() < min || (max > 0 && argv.len() > max) {
        let cmd_tokens = Value::from(&argv[0..namec]);
        molt_throw!(
            "TCL WRONGARGS" =>
            "wrong # args: should be \"{} {}\"",
            cmd_tokens.as_str(),
            argsig
        )
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_args() {
        let argv: Vec<Value> = vec!["string".into(), "length".into()];
        let err = check_args(2, &argv, 3, 3, "string").unwrap_err();
        assert_eq!(
            err.value().as_str(),
            "wrong # args: should be \"string length string\""
        );
        assert_eq!(err.error_code().as_str(), "TCL WRONGARGS");
        assert!(check_args(1, &argv, 1, 0, "?arg ...?").is_ok());
    }
}
