//! Public Type Declarations
//!
//! This module defines a number of types used throughout Molt's public API.
//!
//! The most important types are [`Value`], the type of data values in the Molt
//! language, and [`MoltResult`], Molt's standard `Result<T,E>` type.  `MoltResult`
//! is an alias for `Result<Value,Exception>`, where [`Exception`] contains the data
//! relating to an exceptional return from a script.  The heart of `Exception` is the
//! [`ResultCode`], which represents all of the ways a Molt script might return early:
//! errors, explicit returns, breaks, and continues.
//!
//! [`Value`]: ../value/index.html
//! [`MoltResult`]: type.MoltResult.html
//! [`Exception`]: struct.Exception.html
//! [`ResultCode`]: enum.ResultCode.html

use crate::interp::Interp;
pub use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

/// The standard integer type for Molt code.
pub type MoltInt = i64;

/// The standard floating point type for Molt code.
pub type MoltFloat = f64;

/// The standard list type for Molt code.
pub type MoltList = Vec<Value>;

/// The hasher used by all of Molt's hash tables.
pub type MoltHasher = fnv::FnvBuildHasher;

/// The standard dictionary type for Molt code.  Dictionaries preserve insertion order.
pub type MoltDict = IndexMap<Value, Value, MoltHasher>;

/// Molt's standard `Result<T,E>` type: the result of evaluating a command or script.
pub type MoltResult = Result<Value, Exception>;

/// The result type of a command function.  `Ok(None)` is the empty result.
pub type MoltOptResult = Result<Option<Value>, Exception>;

/// A function used to implement a binary Molt command.
///
/// The command is passed the interpreter, the command's arguments (`argv[0]` is the
/// command name), and the application context.
pub type CommandFunc<Ctx> = fn(&mut Interp<Ctx>, &[Value], &mut Ctx) -> MoltOptResult;

/// A boxed closure used to implement a Molt command.
pub type CommandClosure<Ctx> = Box<dyn Fn(&mut Interp<Ctx>, &[Value], &mut Ctx) -> MoltOptResult>;

/// The return code of a Molt command or script.
///
/// `Okay` is used only within `return -code`; normal results are `Ok(value)`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResultCode {
    Okay,
    Error,
    Return,
    Break,
    Continue,
    Other(MoltInt),
}

impl ResultCode {
    /// Parses a return code given as a name or an integer.
    pub fn from_value(value: &Value) -> Result<Self, Exception> {
        match value.as_str() {
            "ok" => Ok(ResultCode::Okay),
            "error" => Ok(ResultCode::Error),
            "return" => Ok(ResultCode::Return),
            "break" => Ok(ResultCode::Break),
            "continue" => Ok(ResultCode::Continue),
            _ => match value.as_int() {
                Ok(num) => Ok(ResultCode::from_int(num)),
                Err(_) => molt_err!(
                    "bad completion code \"{}\": must be ok, error, return, break, continue, or an integer",
                    value.as_str()
                ),
            },
        }
    }

    /// Converts an integer completion code into a `ResultCode`.
    pub fn from_int(num: MoltInt) -> Self {
        match num {
            0 => ResultCode::Okay,
            1 => ResultCode::Error,
            2 => ResultCode::Return,
            3 => ResultCode::Break,
            4 => ResultCode::Continue,
            _ => ResultCode::Other(num),
        }
    }

    /// Returns the integer form of the code.
    pub fn as_int(&self) -> MoltInt {
        match self {
            ResultCode::Okay => 0,
            ResultCode::Error => 1,
            ResultCode::Return => 2,
            ResultCode::Break => 3,
            ResultCode::Continue => 4,
            ResultCode::Other(num) => *num,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResultCode::Okay => write!(f, "ok"),
            ResultCode::Error => write!(f, "error"),
            ResultCode::Return => write!(f, "return"),
            ResultCode::Break => write!(f, "break"),
            ResultCode::Continue => write!(f, "continue"),
            ResultCode::Other(num) => write!(f, "{}", num),
        }
    }
}

/// Error details carried by an `Error` exception (or a `Return` that will become one).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorData {
    /// The machine-readable error code, a list.
    error_code: Value,

    /// The human-readable stack trace.
    error_info: String,

    /// True until the first trace line has been added.
    is_new: bool,

    /// The line, within the failing script, of the command that failed.
    error_line: Option<usize>,

    /// The options of an earlier exception that this one superseded.
    during: Option<Value>,
}

impl ErrorData {
    pub fn new(error_code: Value, error_info: &str) -> Self {
        Self {
            error_code,
            error_info: error_info.into(),
            is_new: true,
            error_line: None,
            during: None,
        }
    }

    /// Creates error data for a rethrown error, whose trace is already complete.
    pub fn rethrow(error_code: Value, error_info: &str) -> Self {
        Self {
            error_code,
            error_info: error_info.into(),
            is_new: false,
            error_line: None,
            during: None,
        }
    }

    pub fn error_code(&self) -> Value {
        self.error_code.clone()
    }

    pub fn error_info(&self) -> Value {
        Value::from(&self.error_info)
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn error_line(&self) -> Option<usize> {
        self.error_line
    }

    pub fn during(&self) -> Option<&Value> {
        self.during.as_ref()
    }

    fn add_info(&mut self, info: &str) {
        if !self.error_info.is_empty() {
            self.error_info.push('\n');
        }
        self.error_info.push_str(info);
        self.is_new = false;
    }
}

/// An exceptional return from a Molt command or script: an error, a `return`,
/// a `break`, a `continue`, or a user-defined code.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    code: ResultCode,
    value: Value,
    level: usize,
    next_code: ResultCode,
    error_data: Option<ErrorData>,
}

impl Exception {
    /// Is this exception an error?
    pub fn is_error(&self) -> bool {
        self.code == ResultCode::Error
    }

    /// Is this an error to which no trace has yet been added?
    pub fn is_new_error(&self) -> bool {
        match &self.error_data {
            Some(data) => self.code == ResultCode::Error && data.is_new(),
            None => false,
        }
    }

    pub fn code(&self) -> ResultCode {
        self.code
    }

    pub fn value(&self) -> Value {
        self.value.clone()
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn next_code(&self) -> ResultCode {
        self.next_code
    }

    pub fn error_data(&self) -> Option<&ErrorData> {
        self.error_data.as_ref()
    }

    /// The error code, or the empty value if this isn't an error.
    pub fn error_code(&self) -> Value {
        self.error_data
            .as_ref()
            .map(|data| data.error_code())
            .unwrap_or_default()
    }

    /// The error info, or the empty value if this isn't an error.
    pub fn error_info(&self) -> Value {
        self.error_data
            .as_ref()
            .map(|data| data.error_info())
            .unwrap_or_default()
    }

    /// Adds a line to the error info.
    pub fn add_error_info(&mut self, line: &str) {
        if let Some(data) = &mut self.error_data {
            data.add_info(line);
        }
    }

    /// Records the line of the failing command, if not already known.
    pub(crate) fn set_error_line(&mut self, line: usize) {
        if let Some(data) = &mut self.error_data {
            if data.error_line.is_none() {
                data.error_line = Some(line);
            }
        }
    }

    /// Forgets the failing command's line, so that the caller's command line can be
    /// recorded as the exception leaves a procedure.
    pub(crate) fn reset_error_line(&mut self) {
        if let Some(data) = &mut self.error_data {
            data.error_line = None;
        }
    }

    /// Records the options of an exception this one superseded.
    pub(crate) fn set_during(&mut self, options: Value) {
        if let Some(data) = &mut self.error_data {
            data.during = Some(options);
        }
    }

    /// Creates an error with the given message and the default error code, `NONE`.
    pub fn molt_err(msg: Value) -> Self {
        Self::molt_err2(Value::from("NONE"), msg)
    }

    /// Creates an error with an explicit error code.
    pub fn molt_err2(error_code: Value, msg: Value) -> Self {
        let data = ErrorData::new(error_code, msg.as_str());

        Self {
            code: ResultCode::Error,
            value: msg,
            level: 0,
            next_code: ResultCode::Error,
            error_data: Some(data),
        }
    }

    /// Creates an error carrying existing error data, e.g., when re-raising a caught error.
    pub fn molt_err_data(msg: Value, data: ErrorData) -> Self {
        Self {
            code: ResultCode::Error,
            value: msg,
            level: 0,
            next_code: ResultCode::Error,
            error_data: Some(data),
        }
    }

    /// A plain `return`.
    pub fn molt_return(value: Value) -> Self {
        Self {
            code: ResultCode::Return,
            value,
            level: 1,
            next_code: ResultCode::Okay,
            error_data: None,
        }
    }

    /// `return -level level -code next_code value`.
    pub fn molt_return_ext(value: Value, level: usize, next_code: ResultCode) -> Self {
        Self {
            code: ResultCode::Return,
            value,
            level,
            next_code,
            error_data: None,
        }
    }

    /// `return -code error -level level ...`: a return that becomes an error.
    pub fn molt_return_err(msg: Value, level: usize, data: ErrorData) -> Self {
        Self {
            code: ResultCode::Return,
            value: msg,
            level,
            next_code: ResultCode::Error,
            error_data: Some(data),
        }
    }

    pub fn molt_break() -> Self {
        Self {
            code: ResultCode::Break,
            value: Value::empty(),
            level: 0,
            next_code: ResultCode::Break,
            error_data: None,
        }
    }

    pub fn molt_continue() -> Self {
        Self {
            code: ResultCode::Continue,
            value: Value::empty(),
            level: 0,
            next_code: ResultCode::Continue,
            error_data: None,
        }
    }

    /// A user-defined completion code with the given value.
    pub fn molt_other(code: MoltInt, value: Value) -> Self {
        let code = ResultCode::from_int(code);
        Self {
            code,
            value,
            level: 0,
            next_code: code,
            error_data: None,
        }
    }

    /// Implements the `return -level` protocol: when the level reaches zero the
    /// exception takes on its `next_code`.
    pub fn decrement_level(&mut self) {
        assert!(
            self.code == ResultCode::Return && self.level > 0,
            "Exception is not a return with level > 0"
        );

        self.level -= 1;

        if self.level == 0 {
            self.code = self.next_code;

            if self.code == ResultCode::Error && self.error_data.is_none() {
                self.error_data = Some(ErrorData::new(Value::from("NONE"), self.value.as_str()));
            }
        }
    }
}

/// A subcommand of an ensemble command: the subcommand name and its implementation.
pub struct Subcommand<Ctx>(pub &'static str, pub CommandFunc<Ctx>);

impl<Ctx> Subcommand<Ctx> {
    /// Looks up a subcommand by name or unique prefix, returning a Tcl-style error
    /// if there is no match.
    pub fn find<'a>(ensemble: &'a [Subcommand<Ctx>], sub_name: &str) -> Result<&'a Self, Exception> {
        if let Some(subc) = ensemble.iter().find(|subc| subc.0 == sub_name) {
            return Ok(subc);
        }

        let mut prefixed = ensemble.iter().filter(|subc| subc.0.starts_with(sub_name));
        if let (Some(subc), None) = (prefixed.next(), prefixed.next()) {
            if !sub_name.is_empty() {
                return Ok(subc);
            }
        }

        let mut names = String::new();
        names.push_str(ensemble[0].0);
        let last = ensemble.len() - 1;

        if ensemble.len() > 1 {
            names.push_str(", ");
        }

        if ensemble.len() > 2 {
            let vec: Vec<&str> = ensemble[1..last].iter().map(|x| x.0).collect();
            names.push_str(&vec.join(", "));
            names.push_str(", ");
        }

        if ensemble.len() > 1 {
            names.push_str("or ");
            names.push_str(ensemble[last].0);
        }

        molt_err!(
            "unknown or ambiguous subcommand \"{}\": must be {}",
            sub_name,
            &names
        )
    }
}

/// A parsed variable name: a scalar name, or an array name plus an element index.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VarName {
    name: String,
    index: Option<String>,
}

impl VarName {
    pub fn scalar(name: String) -> Self {
        Self { name, index: None }
    }

    pub fn array(name: String, index: String) -> Self {
        Self {
            name,
            index: Some(index),
        }
    }

    /// Splits `array(elem)` syntax.  Only a name that ends with `)` and contains a `(`
    /// names an element; the element text runs from the first `(` to the final `)`.
    pub fn parse(text: &str) -> Self {
        if let Some(stripped) = text.strip_suffix(')') {
            if let Some(open) = stripped.find('(') {
                return Self::array(stripped[..open].into(), stripped[open + 1..].into());
            }
        }

        Self::scalar(text.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_from_value() {
        assert_eq!(ResultCode::from_value(&"ok".into()), Ok(ResultCode::Okay));
        assert_eq!(ResultCode::from_value(&"3".into()), Ok(ResultCode::Break));
        assert_eq!(ResultCode::from_value(&"7".into()), Ok(ResultCode::Other(7)));
        assert!(ResultCode::from_value(&"bogus".into()).is_err());
    }

    #[test]
    fn test_var_name_parse() {
        assert_eq!(VarName::parse("a"), VarName::scalar("a".into()));
        assert_eq!(VarName::parse("a(b)"), VarName::array("a".into(), "b".into()));
        assert_eq!(VarName::parse("a(b(c)"), VarName::array("a".into(), "b(c".into()));
        assert_eq!(VarName::parse("a(b)c"), VarName::scalar("a(b)c".into()));
        assert_eq!(VarName::parse("a()"), VarName::array("a".into(), "".into()));
    }

    #[test]
    fn test_decrement_level() {
        let mut ex = Exception::molt_return_ext(Value::from("x"), 2, ResultCode::Break);
        ex.decrement_level();
        assert_eq!(ex.code(), ResultCode::Return);
        ex.decrement_level();
        assert_eq!(ex.code(), ResultCode::Break);
    }

    #[test]
    fn test_add_error_info() {
        let mut ex = Exception::molt_err(Value::from("boom"));
        assert!(ex.is_new_error());
        ex.add_error_info("    while executing");
        assert!(!ex.is_new_error());
        assert_eq!(ex.error_info().as_str(), "boom\n    while executing");
    }
}
