//! The Molt Interpreter
//!
//! The [`Interp`] struct is the primary API for embedding Molt into a Rust application.
//! Given an `Interp`, the application may:
//!
//! * Evaluate scripts and expressions
//! * Check scripts for completeness
//! * Extend the language by defining new Molt commands in Rust
//! * Set and get Molt variables
//!
//! # Interp is not Sync!
//!
//! The [`Interp`] class (and the rest of Molt) is intended for use in a single thread.  It is
//! safe to have `Interps` in different threads; but use `String` (or another `Sync`)
//! when passing data between them.  In particular, [`Value`] is not `Sync`.
//!
//! # Creating an Interpreter
//!
//! There are two ways to create an interpreter.  The usual way is to call
//! [`Interp::new`](struct.Interp.html#method.new), which creates an interpreter and populates
//! it with all of the standard Molt commands and their compilers.  The application can then
//! add any application-specific commands.
//!
//! Alternatively, [`Interp::empty`](struct.Interp.html#method.empty) creates an interpreter
//! with no built-in commands, allowing the application to define only those commands it needs.
//!
//! ```
//! use moltbc::Interp;
//! let mut interp = Interp::<()>::new();
//!
//! // add commands, evaluate scripts, etc.
//! ```
//!
//! # Evaluating Scripts
//!
//! The simplest way to evaluate a script is to pass it as a string to `Interp::eval`.  The
//! script is compiled to bytecode and executed in the caller's context: if called at the
//! application level, the script will be evaluated in the interpreter's global scope; if
//! called by a Molt command, it will be evaluated in the scope in which that command is
//! executing.
//!
//! ```
//! use moltbc::Interp;
//! use moltbc::molt_ok;
//! use moltbc::types::*;
//!
//! let _ = my_func();
//!
//! fn my_func() -> MoltResult {
//! // FIRST, create the interpreter.
//! let mut glob_ctx = ();
//! let mut interp = Interp::new();
//!
//! // NEXT, evaluate a script containing an expression,
//! // propagating errors back to the caller
//! let val = interp.eval("expr {2 + 2}", &mut glob_ctx)?;
//! assert_eq!(val.as_str(), "4");
//! assert_eq!(val.as_int()?, 4);
//!
//! molt_ok!()
//! }
//! ```
//!
//! [`Interp::eval_value`](struct.Interp.html#method.eval_value) is equivalent to
//! `Interp::eval` but takes the script as a `Value` instead of as a `&str`.  The compiled
//! bytecode is cached on the `Value`, so evaluating the same `Value` again skips
//! compilation.  When called at the top level, both methods convert the `break` and
//! `continue` return codes (and any user-defined return codes) to errors; otherwise they
//! are propagated to the caller for handling.
//!
//! # Bytecode Caching
//!
//! Compiled bytecode is stamped with the interpreter's compile epoch.  Defining, renaming,
//! or removing a command that has a compiler bumps the epoch, so that bytecode compiled
//! against the old command set is recompiled before it runs again.  Caching can be
//! switched off entirely with
//! [`Interp::set_bytecode_caching`](struct.Interp.html#method.set_bytecode_caching).
//!
//! # Defining New Commands
//!
//! The usual reason for embedding Molt in an application is to extend it with
//! application-specific commands.  Define a [`CommandFunc`] and register it with the
//! interpreter using [`Interp::add_command`](struct.Interp.html#method.add_command).
//!
//! ```
//! use moltbc::Interp;
//! use moltbc::check_args;
//! use moltbc::{molt_opt_ok, molt_ok};
//! use moltbc::types::*;
//!
//! # let _ = dummy();
//! # fn dummy() -> MoltResult {
//! // FIRST, create the interpreter and add the needed command.
//! let mut glob_ctx = ();
//! let mut interp = Interp::new();
//! interp.add_command("square", cmd_square);
//!
//! // NEXT, try using the new command.
//! let val = interp.eval("square 5", &mut glob_ctx)?;
//! assert_eq!(val.as_str(), "25");
//! # molt_ok!()
//! # }
//!
//! // The command: square intValue
//! fn cmd_square(_: &mut Interp, argv: &[Value], _ctx: &mut ()) -> MoltOptResult {
//!     // FIRST, check the number of arguments.
//!     check_args(1, argv, 2, 2, "intValue")?;
//!
//!     // NEXT, get the intValue argument as an int.
//!     let int_value = argv[1].as_int()?;
//!
//!     // NEXT, return the product.
//!     molt_opt_ok!(int_value * int_value)
//! }
//! ```
//!
//! # Accessing Variables
//!
//! Molt defines two kinds of variables, scalars and arrays.  Molt commands will usually use
//! the [`Interp::var`](struct.Interp.html#method.var),
//! [`Interp::set_var`](struct.Interp.html#method.set_var), and
//! [`Interp::set_var_return`](struct.Interp.html#method.set_var_return) methods, each of
//! which takes a variable reference (`name` or `name(index)`) as a `Value`.  The methods
//! [`Interp::scalar`](struct.Interp.html#method.scalar),
//! [`Interp::set_scalar`](struct.Interp.html#method.set_scalar),
//! [`Interp::element`](struct.Interp.html#method.element), and
//! [`Interp::set_element`](struct.Interp.html#method.set_element) access a scalar or an
//! array element explicitly.
//!
//! # Ensemble Commands
//!
//! An _ensemble command_ is simply a command with subcommands, like the standard Molt `info`
//! and `array` commands.  The
//! [`Interp::call_subcommand`](struct.Interp.html#method.call_subcommand) method is used
//! to look up and call the relevant command function, handling all relevant errors in the
//! TCL-standard way.
//!
//! [`MoltResult`]: ../types/type.MoltResult.html
//! [`Exception`]: ../types/struct.Exception.html
//! [`CommandFunc`]: ../types/type.CommandFunc.html
//! [`Value`]: ../value/index.html
//! [`Interp`]: struct.Interp.html

use crate::check_args;
use crate::commands;
use crate::compile;
use crate::compile::ByteCode;
use crate::compile::CompilerTable;
use crate::dict::dict_new;
use crate::execute;
use crate::expr;
use crate::molt_err;
use crate::molt_ok;
use crate::parser;
#[cfg(feature = "regexp")]
use crate::regexp::RegexCache;
use crate::scope::ScopeStack;
use crate::token::Token;
use crate::token::TokenKind;
use crate::types::*;
use crate::util;
use crate::value::Value;
use crate::var;
use crate::var::VarOp;
use crate::var::WriteMode;
use indexmap::IndexMap;
#[cfg(feature = "regexp")]
use regex::Regex;
use std::cell::RefCell;
use std::rc::Rc;

/// The Molt Interpreter.
///
/// The `Interp` struct is the primary API for
/// embedding Molt into a Rust application.  The application creates an instance
/// of `Interp`, configures with it the required set of application-specific
/// and standard Molt commands, and then uses it to evaluate Molt scripts and
/// expressions.  See the
/// [module level documentation](index.html)
/// for an overview.
///
/// # Example
///
/// ```
/// use moltbc::types::*;
/// use moltbc::Interp;
/// use moltbc::molt_ok;
/// # fn dummy() -> MoltResult {
/// let mut glob_ctx = ();
/// let mut interp = Interp::new();
/// let four = interp.eval("expr {2 + 2}", &mut glob_ctx)?;
/// assert_eq!(four, Value::from(4));
/// # molt_ok!()
/// # }
/// ```
pub struct Interp<Ctx = ()> {
    // Command Table
    commands: IndexMap<String, Rc<Command<Ctx>>, MoltHasher>,

    // Command compilers, by command name.
    compilers: CompilerTable,

    // Call frames and namespaces.
    pub(crate) scopes: ScopeStack,

    // Defines the recursion limit for Interp::eval().
    recursion_limit: usize,

    // Current number of eval levels.
    num_levels: usize,

    // Bumped whenever the set of compiled commands changes.
    epoch: u64,

    // Whether compiled bytecode is cached on script values.
    bytecode_caching: bool,

    // Compiled regular expressions, by pattern.
    #[cfg(feature = "regexp")]
    regexes: RegexCache,
}

/// A command defined in the interpreter.
enum Command<Ctx> {
    /// A binary command implemented as a Rust CommandFunc.
    Native(CommandFunc<Ctx>),

    /// A Molt procedure
    Proc(Procedure),
}

impl<Ctx> Command<Ctx> {
    /// Execute the command according to its kind.
    fn execute(&self, interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltResult {
        match self {
            Command::Native(func) => Ok(func(interp, argv, ctx)?.unwrap_or_default()),
            Command::Proc(proc) => proc.execute(interp, argv, ctx),
        }
    }

    /// Returns a value naming the command type.
    fn cmdtype(&self) -> Value {
        match self {
            Command::Native(_) => Value::from("native"),
            Command::Proc(_) => Value::from("proc"),
        }
    }

    /// Returns true if the command is a proc, and false otherwise.
    fn is_proc(&self) -> bool {
        matches!(self, Command::Proc(_))
    }
}

/// Commands live in a single global table; a leading `::` is ignored.
fn command_key(name: &str) -> &str {
    name.strip_prefix("::").unwrap_or(name)
}

impl<Ctx> Default for Interp<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

// NOTE: The order of methods in the generated RustDoc depends on the order in this block.
// Consequently, methods are ordered pedagogically.
impl<Ctx> Interp<Ctx> {
    //--------------------------------------------------------------------------------------------
    // Constructors

    /// Creates a new Molt interpreter with no commands defined.  Use this when crafting
    /// command languages that shouldn't include the normal TCL commands, or as a base
    /// to which specific Molt command sets can be added.
    ///
    /// # Example
    ///
    /// ```
    /// # use moltbc::interp::Interp;
    /// let mut interp = Interp::<()>::empty();
    /// assert!(interp.command_names().is_empty());
    /// ```
    pub fn empty() -> Self {
        let mut interp = Self {
            commands: IndexMap::default(),
            compilers: CompilerTable::default(),
            scopes: ScopeStack::new(),
            recursion_limit: 1000,
            num_levels: 0,
            epoch: 0,
            bytecode_caching: true,
            #[cfg(feature = "regexp")]
            regexes: RegexCache::default(),
        };

        // Writing a fresh global can't fail.
        let _ = interp.set_scalar("errorInfo", Value::empty());
        interp
    }

    /// Creates a new Molt interpreter that is pre-populated with the standard Molt commands,
    /// and, with the `compile-commands` feature, their compilers.
    /// Use [`command_names`](#method.command_names) (or the `info commands` Molt command)
    /// to retrieve the full list, and [`add_command`](#method.add_command)
    /// to extend the interpreter with new commands.
    ///
    /// ```
    /// # use moltbc::types::*;
    /// # use moltbc::Interp;
    /// # use moltbc::molt_ok;
    /// # fn dummy() -> MoltResult {
    /// let mut glob_ctx = ();
    /// let mut interp = Interp::new();
    /// let four = interp.eval("expr {2 + 2}", &mut glob_ctx)?;
    /// assert_eq!(four, Value::from(4));
    /// # molt_ok!()
    /// # }
    /// ```
    pub fn new() -> Self {
        let mut interp = Interp::empty();

        for (name, func) in commands::standard_commands() {
            interp.add_command(name, func);
        }

        cfg_if::cfg_if! {
            if #[cfg(feature = "compile-commands")] {
                for (name, func) in compile::standard_compilers() {
                    interp.compilers.insert(name.into(), func);
                }
            }
        }

        interp
    }

    //--------------------------------------------------------------------------------------------
    // Script and Expression Evaluation

    /// Evaluates a script.  Returns the [`Value`](../value/index.html)
    /// of the last command in the script, or the value of any explicit `return` call in the
    /// script, or any error thrown by the script.  Other
    /// [`Exception`](../types/struct.Exception.html) values are converted to normal errors.
    ///
    /// # Example
    ///
    /// ```
    /// # use moltbc::types::*;
    /// # use moltbc::Interp;
    ///
    /// let mut glob_ctx = ();
    /// let mut interp = Interp::new();
    ///
    /// match interp.eval("set a 1", &mut glob_ctx) {
    ///    Ok(val) => println!("Value: {}", val),
    ///    Err(exception) => println!("Error: {}", exception.value()),
    /// }
    /// ```
    pub fn eval(&mut self, script: &str, ctx: &mut Ctx) -> MoltResult {
        let value = Value::from(script);
        self.eval_value(&value, ctx)
    }

    /// Evaluates the string value of a [`Value`] as a script.
    ///
    /// This method is equivalent to [`eval`](#method.eval), but works on a `Value` rather
    /// than on a string slice.  The script's bytecode is cached on the `Value`, so prefer
    /// this to `eval` when a script is evaluated repeatedly.
    ///
    /// [`Value`]: ../value/index.html
    pub fn eval_value(&mut self, value: &Value, ctx: &mut Ctx) -> MoltResult {
        // FIRST, check the number of nesting levels
        self.enter_level()?;

        // NEXT, compile and execute the script.
        let mut result = match self.bytecode_for(value) {
            Ok(code) => execute::execute(self, &code, ctx),
            Err(exception) => Err(exception),
        };

        self.leave_level();

        // NEXT, translate and return the result.
        if self.num_levels == 0 {
            if let Err(mut exception) = result {
                // FIRST, handle the return -code, -level protocol
                if exception.code() == ResultCode::Return {
                    exception.decrement_level();
                }

                result = match exception.code() {
                    ResultCode::Okay => Ok(exception.value()),
                    ResultCode::Error => Err(exception),
                    ResultCode::Return => Err(exception), // -level > 0
                    ResultCode::Break => molt_err!("invoked \"break\" outside of a loop"),
                    ResultCode::Continue => molt_err!("invoked \"continue\" outside of a loop"),
                    ResultCode::Other(code) => molt_err!("command returned bad code: {}", code),
                };
            }
        }

        if let Err(exception) = &result {
            if exception.is_error() {
                self.set_global_error_data(exception.error_data())?;
            }
        }

        result
    }

    /// Returns the script's bytecode: the cached bytecode if it's current, or freshly
    /// compiled bytecode.
    fn bytecode_for(&mut self, script: &Value) -> Result<Rc<ByteCode>, Exception> {
        if self.bytecode_caching {
            if let Some(code) = script.cached_bytecode() {
                if code.epoch() == self.epoch {
                    return Ok(code);
                }
                log::debug!("recompiling script: epoch {} is stale", code.epoch());
            }
        }

        let code = Rc::new(compile::compile_script(
            script.as_str(),
            &self.compilers,
            self.epoch,
            None,
        )?);

        if self.bytecode_caching {
            script.cache_bytecode(Rc::clone(&code));
        }
        Ok(code)
    }

    /// Increments the nesting level, failing if the recursion limit is reached.
    pub(crate) fn enter_level(&mut self) -> Result<(), Exception> {
        self.num_levels += 1;

        if self.num_levels > self.recursion_limit {
            self.num_levels -= 1;
            return molt_err!("too many nested calls to Interp::eval (infinite loop?)");
        }
        Ok(())
    }

    pub(crate) fn leave_level(&mut self) {
        self.num_levels -= 1;
    }

    /// Saves the error exception data
    fn set_global_error_data(&mut self, error_data: Option<&ErrorData>) -> Result<(), Exception> {
        if let Some(data) = error_data {
            self.scopes.set_global("errorInfo", data.error_info())?;
            self.scopes.set_global("errorCode", data.error_code())?;
        }

        Ok(())
    }

    /// Invokes the command named by the first word, passing it all of the words.
    pub(crate) fn invoke(&mut self, words: &[Value], ctx: &mut Ctx) -> MoltResult {
        let Some(first) = words.first() else {
            return molt_ok!();
        };

        let name = first.as_str();
        let Some(cmd) = self.commands.get(command_key(name)) else {
            let code: MoltList = vec!["TCL".into(), "LOOKUP".into(), "COMMAND".into(), first.clone()];
            return Err(Exception::molt_err2(
                Value::from(code),
                Value::from(format!("invalid command name \"{}\"", name)),
            ));
        };

        let cmd = Rc::clone(cmd);
        cmd.execute(self, words, ctx)
    }

    /// Evaluates a sequence of sibling tokens from `source`, concatenating their values.
    /// A single variable or command token yields its value unchanged.  Used by the
    /// expression evaluator.
    pub(crate) fn eval_tokens(&mut self, source: &str, tokens: &[Token], ctx: &mut Ctx) -> MoltResult {
        let mut pieces: Vec<Value> = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let token = tokens[i];
            let subtree = &tokens[i..i + 1 + token.num_components];

            let piece = match token.kind {
                TokenKind::Variable => {
                    let name = subtree[1].text(source);
                    if subtree.len() == 2 {
                        self.var(&Value::from(name))?
                    } else {
                        let index = self.eval_tokens(source, &subtree[2..], ctx)?;
                        self.element(name, index.as_str())?
                    }
                }
                TokenKind::Command => {
                    let script = &source[token.start + 1..token.end() - 1];
                    self.eval(script, ctx)?
                }
                TokenKind::Backslash => Value::from(util::backslash_subst(source, token.start).0),
                TokenKind::Text | TokenKind::Word => Value::from(token.text(source)),
            };

            pieces.push(piece);
            i += subtree.len();
        }

        if pieces.len() == 1 {
            return Ok(pieces.remove(0));
        }

        let text: String = pieces.iter().map(|piece| piece.as_str()).collect();
        Ok(Value::from(text))
    }

    /// Returns the `return` option dictionary for the given result as a dictionary value.
    /// Used by the `catch` command and the compiled `try`.
    pub(crate) fn return_options(&self, result: &MoltResult) -> Value {
        // Constants
        const OPT_CODE: &str = "-code";
        const OPT_LEVEL: &str = "-level";
        const OPT_ERRORCODE: &str = "-errorcode";
        const OPT_ERRORINFO: &str = "-errorinfo";
        const OPT_ERRORLINE: &str = "-errorline";
        const OPT_DURING: &str = "-during";
        const ZERO: &str = "0";

        let mut opts = dict_new();

        match result {
            Ok(_) => {
                opts.insert(OPT_CODE.into(), ZERO.into());
                opts.insert(OPT_LEVEL.into(), ZERO.into());
            }
            Err(exception) => {
                // FIRST, set the -code
                match exception.code() {
                    ResultCode::Return => {
                        opts.insert(OPT_CODE.into(), exception.next_code().as_int().into());
                    }
                    code => {
                        opts.insert(OPT_CODE.into(), code.as_int().into());
                    }
                }

                // NEXT, set the -level
                opts.insert(OPT_LEVEL.into(), Value::from(exception.level() as MoltInt));

                // NEXT, the error details.
                if let Some(data) = exception.error_data() {
                    opts.insert(OPT_ERRORCODE.into(), data.error_code());
                    opts.insert(OPT_ERRORINFO.into(), data.error_info());
                    if let Some(line) = data.error_line() {
                        opts.insert(OPT_ERRORLINE.into(), Value::from(line as MoltInt));
                    }
                    if let Some(during) = data.during() {
                        opts.insert(OPT_DURING.into(), during.clone());
                    }
                }
            }
        }

        Value::from(opts)
    }

    /// Determines whether or not the script is syntactically complete,
    /// e.g., has no unmatched quotes, brackets, or braces.
    ///
    /// REPLs use this to determine whether or not to ask for another line of
    /// input.
    ///
    /// # Example
    ///
    /// ```
    /// # use moltbc::types::*;
    /// # use moltbc::interp::Interp;
    /// let mut interp = Interp::<()>::new();
    /// assert!(interp.complete("set a [expr {1+1}]"));
    /// assert!(!interp.complete("set a [expr {1+1"));
    /// ```
    pub fn complete(&mut self, script: &str) -> bool {
        parser::parse(script).is_ok()
    }

    /// Evaluates a [Molt expression](https://wduquette.github.io/molt/ref/expr.html) and
    /// returns its value.  The expression is passed as a `Value` which is interpreted as a
    /// `String`.
    ///
    /// # Example
    /// ```
    /// use moltbc::Interp;
    /// use moltbc::types::*;
    /// # fn dummy() -> Result<String,Exception> {
    /// let mut glob_ctx = ();
    /// let mut interp = Interp::new();
    /// let expr = Value::from("2 + 2");
    /// let sum = interp.expr(&expr, &mut glob_ctx)?.as_int()?;
    ///
    /// assert_eq!(sum, 4);
    /// # Ok("dummy".to_string())
    /// # }
    /// ```
    pub fn expr(&mut self, expr: &Value, ctx: &mut Ctx) -> MoltResult {
        // Evaluate the expression and set the errorInfo/errorCode.
        let result = expr::expr(self, expr, ctx);

        if let Err(exception) = &result {
            self.set_global_error_data(exception.error_data())?;
        }

        result
    }

    /// Evaluates a boolean [Molt expression](https://wduquette.github.io/molt/ref/expr.html)
    /// and returns its value, or an error if it couldn't be interpreted as a boolean.
    ///
    /// # Example
    ///
    /// ```
    /// use moltbc::Interp;
    /// use moltbc::types::*;
    /// # fn dummy() -> Result<String,Exception> {
    /// let mut glob_ctx = ();
    /// let mut interp = Interp::new();
    ///
    /// let expr = Value::from("1 < 2");
    /// let flag: bool = interp.expr_bool(&expr, &mut glob_ctx)?;
    ///
    /// assert!(flag);
    /// # Ok("dummy".to_string())
    /// # }
    /// ```
    pub fn expr_bool(&mut self, expr: &Value, ctx: &mut Ctx) -> Result<bool, Exception> {
        self.expr(expr, ctx)?.as_bool()
    }

    /// Evaluates a [Molt expression](https://wduquette.github.io/molt/ref/expr.html)
    /// and returns its value as an integer, or an error if it couldn't be interpreted as an
    /// integer.
    pub fn expr_int(&mut self, expr: &Value, ctx: &mut Ctx) -> Result<MoltInt, Exception> {
        self.expr(expr, ctx)?.as_int()
    }

    /// Evaluates a [Molt expression](https://wduquette.github.io/molt/ref/expr.html)
    /// and returns its value as a float, or an error if it couldn't be interpreted as a
    /// float.
    pub fn expr_float(&mut self, expr: &Value, ctx: &mut Ctx) -> Result<MoltFloat, Exception> {
        self.expr(expr, ctx)?.as_float()
    }

    //--------------------------------------------------------------------------------------------
    // Variable Handling

    /// Retrieves the value of the named variable in the current scope.  The `var_name` may
    /// name a scalar variable or an array element.  This is the normal way to retrieve the
    /// value of a variable named by a command argument.
    ///
    /// Returns an error if the variable is a scalar and the name names an array element,
    /// and vice versa.
    ///
    /// # Example
    ///
    /// ```
    /// use moltbc::types::*;
    /// use moltbc::Interp;
    /// use moltbc::molt_ok;
    /// # fn dummy() -> MoltResult {
    /// let mut glob_ctx = ();
    /// let mut interp = Interp::new();
    ///
    /// interp.eval("set a 1; set b(1) Howdy", &mut glob_ctx)?;
    /// assert_eq!(interp.var(&Value::from("a"))?.as_str(), "1");
    /// assert_eq!(interp.var(&Value::from("b(1)"))?.as_str(), "Howdy");
    /// # molt_ok!()
    /// # }
    /// ```
    pub fn var(&mut self, var_name: &Value) -> MoltResult {
        Ok(self.scopes.get(var_name)?)
    }

    /// Returns true if the named variable exists, and false otherwise.
    pub fn var_exists(&mut self, var_name: &Value) -> bool {
        self.scopes.exists(var_name)
    }

    /// Sets the value of the variable in the current scope, creating the variable (or
    /// array element) if need be.
    pub fn set_var(&mut self, var_name: &Value, value: Value) -> Result<(), Exception> {
        self.scopes.set(var_name, value, WriteMode::Set)?;
        Ok(())
    }

    /// Sets the value of the variable in the current scope, returning the value.  This
    /// is the natural result for commands like `set`.
    pub fn set_var_return(&mut self, var_name: &Value, value: Value) -> MoltResult {
        Ok(self.scopes.set(var_name, value, WriteMode::Set)?)
    }

    /// Retrieves the value of the named scalar variable in the current scope.
    pub fn scalar(&mut self, name: &str) -> MoltResult {
        let var = self.scopes.lookup(&Value::from(name), VarOp::Read, false)?;
        Ok(var::read(&var, name)?)
    }

    /// Sets the value of the named scalar variable in the current scope.
    pub fn set_scalar(&mut self, name: &str, value: Value) -> Result<(), Exception> {
        let var = self.scopes.lookup(&Value::from(name), VarOp::Set, true)?;
        var::write(&var, name, value, WriteMode::Set)?;
        Ok(())
    }

    /// Retrieves the value of the named array element in the current scope.
    pub fn element(&mut self, name: &str, index: &str) -> MoltResult {
        let full = format!("{}({})", name, index);
        let base = self.scopes.lookup(&Value::from(name), VarOp::Read, false).map_err(
            |_| var::VarError::NoSuchVariable {
                op: VarOp::Read,
                name: full.clone(),
            },
        )?;
        let cell = var::array_element(&base, index, false, VarOp::Read, &full)?;
        Ok(var::read(&cell, &full)?)
    }

    /// Sets the value of the named array element in the current scope, creating the
    /// array or element if need be.
    pub fn set_element(&mut self, name: &str, index: &str, value: Value) -> Result<(), Exception> {
        let full = format!("{}({})", name, index);
        let base = self.scopes.lookup(&Value::from(name), VarOp::Set, true)?;
        let cell = var::array_element(&base, index, true, VarOp::Set, &full)?;
        var::write(&cell, &full, value, WriteMode::Set)?;
        Ok(())
    }

    /// Unsets a variable, given its name.  Unsetting a variable that doesn't exist is
    /// not an error.
    pub fn unset(&mut self, name: &str) {
        self.unset_var(&Value::from(name));
    }

    /// Unsets the variable or array element named by the `Value`.  Unsetting a variable
    /// that doesn't exist is not an error.
    pub fn unset_var(&mut self, name: &Value) {
        let _ = self.scopes.unset(name);
    }

    /// Unsets a single array element.
    pub fn unset_element(&mut self, array_name: &str, index: &str) {
        self.unset_var(&Value::from(format!("{}({})", array_name, index)));
    }

    /// Gets a list of the names of the variables visible in the current scope.
    pub fn vars_in_scope(&self) -> MoltList {
        self.scopes.vars_in_scope()
    }

    /// Gets a list of the names of the global variables.
    pub fn vars_in_global_scope(&self) -> MoltList {
        self.scopes.vars_in_global_scope()
    }

    /// Gets a list of the names of the local variables, or the empty list outside of
    /// a procedure.
    pub fn vars_in_local_scope(&self) -> MoltList {
        let level = self.scopes.current();
        match self.scopes.frame(level) {
            Some(frame) if frame.is_proc() => self.scopes.vars_in_scope(),
            _ => Vec::new(),
        }
    }

    /// Returns the current scope level: 0 at the global level, plus one for each
    /// active procedure call or namespace evaluation.
    pub fn scope_level(&self) -> usize {
        self.scopes.current()
    }

    /// Determines whether the named variable is an array.
    pub fn array_exists(&mut self, array_name: &str) -> bool {
        self.scopes.array(&Value::from(array_name)).is_some()
    }

    /// Gets a flat list of the keys and values of the named array, or the empty list
    /// if there's no such array.
    pub fn array_get(&mut self, array_name: &str) -> MoltList {
        self.scopes
            .array(&Value::from(array_name))
            .and_then(|var| var::with_array(&var, |data| data.get()))
            .unwrap_or_default()
    }

    /// Merges a flat list of keys and values into the named array, creating it if need
    /// be.
    pub fn array_set(&mut self, array_name: &str, kvlist: &[Value]) -> Result<(), Exception> {
        if kvlist.len() % 2 != 0 {
            return molt_err!("list must have an even number of elements");
        }

        let base = self.scopes.ensure_array(&Value::from(array_name))?;

        for pair in kvlist.chunks(2) {
            let full = format!("{}({})", array_name, pair[0].as_str());
            let cell = var::array_element(&base, pair[0].as_str(), true, VarOp::Set, &full)?;
            var::write(&cell, &full, pair[1].clone(), WriteMode::Set)?;
        }
        Ok(())
    }

    /// Gets a list of the indices of the named array, or the empty list if there's no
    /// such array.
    pub fn array_names(&mut self, array_name: &str) -> MoltList {
        self.scopes
            .array(&Value::from(array_name))
            .and_then(|var| var::with_array(&var, |data| data.names()))
            .unwrap_or_default()
    }

    /// Gets the number of elements in the named array, or 0 if there's no such array.
    pub fn array_size(&mut self, array_name: &str) -> usize {
        self.scopes
            .array(&Value::from(array_name))
            .and_then(|var| var::with_array(&var, |data| data.size()))
            .unwrap_or(0)
    }

    //--------------------------------------------------------------------------------------------
    // Command Definition and Handling

    /// Adds a binary command with no related context to the interpreter.  This is the normal
    /// way to add most commands.
    ///
    /// If the name was compiled specially, its compiler is dropped: scripts compiled from
    /// now on invoke the new command.
    pub fn add_command(&mut self, name: &str, func: CommandFunc<Ctx>) {
        let name = command_key(name);
        self.forget_compiler(name);
        self.commands
            .insert(name.into(), Rc::new(Command::Native(func)));
    }

    /// Adds a procedure to the interpreter.
    ///
    /// This is how to add a Molt `proc` to the interpreter.  The arguments are the same
    /// as for the `proc` command, which validates the parameter list.
    pub(crate) fn add_proc(&mut self, name: &str, parms: &[Value], body: &Value) {
        let name = command_key(name);
        let proc = Procedure {
            parms: parms.to_owned(),
            body: body.clone(),
            code: RefCell::new(None),
        };

        self.forget_compiler(name);
        self.commands
            .insert(name.into(), Rc::new(Command::Proc(proc)));
    }

    /// Determines whether or not the interpreter contains a command with the given
    /// name.
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(command_key(name))
    }

    /// Renames the command.  The command's compiler, if any, moves with it.
    ///
    /// **Note:** This does not update procedures that reference the command under the old
    /// name.  This is intentional: it is a common TCL programming technique to wrap an
    /// existing command by renaming it and defining a new command with the old name that
    /// calls the original command at its new name.
    ///
    /// # Example
    ///
    /// ```
    /// use moltbc::Interp;
    /// use moltbc::types::*;
    /// use moltbc::molt_ok;
    /// # fn dummy() -> MoltResult {
    /// let mut glob_ctx = ();
    /// let mut interp = Interp::new();
    ///
    /// interp.rename_command("expr", "=");
    ///
    /// let sum = interp.eval("= {1 + 1}", &mut glob_ctx)?.as_int()?;
    ///
    /// assert_eq!(sum, 2);
    /// # molt_ok!()
    /// # }
    /// ```
    pub fn rename_command(&mut self, old_name: &str, new_name: &str) {
        let old_name = command_key(old_name);
        let new_name = command_key(new_name);

        if let Some(cmd) = self.commands.shift_remove(old_name) {
            let compiler = self.compilers.shift_remove(old_name);
            self.forget_compiler(new_name);

            if let Some(func) = compiler {
                self.compilers.insert(new_name.into(), func);
                self.bump_epoch();
            }
            self.commands.insert(new_name.into(), cmd);
        }
    }

    /// Removes the command with the given name.
    ///
    /// This would typically be done when destroying an object command.
    ///
    /// # Example
    ///
    /// ```
    /// use moltbc::Interp;
    ///
    /// let mut interp = Interp::<()>::new();
    ///
    /// interp.remove_command("set");  // You'll be sorry....
    ///
    /// assert!(!interp.has_command("set"));
    /// ```
    pub fn remove_command(&mut self, name: &str) {
        let name = command_key(name);
        self.commands.shift_remove(name);
        self.forget_compiler(name);
    }

    /// Drops the named command's compiler, invalidating compiled bytecode that may have
    /// inlined the command.
    pub(crate) fn forget_compiler(&mut self, name: &str) {
        if self.compilers.shift_remove(name).is_some() {
            self.bump_epoch();
        }
    }

    fn bump_epoch(&mut self) {
        self.epoch += 1;
        log::debug!("compile epoch is now {}", self.epoch);
    }

    /// The current compile epoch.  Bytecode compiled in an earlier epoch is recompiled
    /// before it runs.
    pub fn compile_epoch(&self) -> u64 {
        self.epoch
    }

    /// Determines whether the named command has a compiler.
    pub fn has_compiler(&self, name: &str) -> bool {
        self.compilers.contains_key(command_key(name))
    }

    /// Compiles a script without executing it, for inspection.
    pub fn compile(&self, script: &str) -> Result<ByteCode, Exception> {
        compile::compile_script(script, &self.compilers, self.epoch, None)
    }

    /// Gets a vector of the names of the existing commands.
    ///
    /// # Example
    ///
    /// ```
    /// use moltbc::Interp;
    ///
    /// let mut interp = Interp::<()>::new();
    ///
    /// for name in interp.command_names() {
    ///     println!("Found command: {}", name);
    /// }
    /// ```
    pub fn command_names(&self) -> MoltList {
        self.commands.keys().map(Value::from).collect()
    }

    /// Returns the type of the named command, `native` or `proc`, or an error if there's
    /// no such command.
    pub fn command_type(&self, command: &str) -> MoltResult {
        if let Some(cmd) = self.commands.get(command_key(command)) {
            molt_ok!(cmd.cmdtype())
        } else {
            molt_err!("\"{}\" isn't a command", command)
        }
    }

    /// Gets a vector of the names of the existing procedures.
    pub fn proc_names(&self) -> MoltList {
        self.commands
            .iter()
            .filter(|(_, cmd)| cmd.is_proc())
            .map(|(name, _)| Value::from(name))
            .collect()
    }

    /// Returns the body of the named procedure, or an error if the name doesn't
    /// name a procedure.
    pub fn proc_body(&self, procname: &str) -> MoltResult {
        match self.procedure(procname) {
            Some(proc) => molt_ok!(proc.body.clone()),
            None => molt_err!("\"{}\" isn't a procedure", procname),
        }
    }

    /// Returns a list of the names of the arguments of the named procedure, or an
    /// error if the name doesn't name a procedure.
    pub fn proc_args(&self, procname: &str) -> MoltResult {
        match self.procedure(procname) {
            Some(proc) => {
                let mut names = MoltList::new();
                for spec in &proc.parms {
                    names.push(spec.as_list()?[0].clone());
                }
                molt_ok!(names)
            }
            None => molt_err!("\"{}\" isn't a procedure", procname),
        }
    }

    /// Returns the default value of the named argument of the named procedure, if it has
    /// one.  Returns an error if the procedure has no such argument, or the name doesn't
    /// name a procedure.
    pub fn proc_default(&self, procname: &str, arg: &str) -> Result<Option<Value>, Exception> {
        let Some(proc) = self.procedure(procname) else {
            return molt_err!("\"{}\" isn't a procedure", procname);
        };

        for spec in &proc.parms {
            let vec = spec.as_list()?;
            if vec[0].as_str() == arg {
                return Ok(vec.get(1).cloned());
            }
        }

        molt_err!(
            "procedure \"{}\" doesn't have an argument \"{}\"",
            procname,
            arg
        )
    }

    fn procedure(&self, procname: &str) -> Option<&Procedure> {
        match self.commands.get(command_key(procname)).map(|cmd| &**cmd) {
            Some(Command::Proc(proc)) => Some(proc),
            _ => None,
        }
    }

    /// Calls a subcommand of the current command, looking up its name in an array of
    /// `Subcommand` tuples.
    ///
    /// The subcommand, if found, is called with the same `argv` as its parent ensemble.
    /// `subc` is the index of the subcommand's name in the `argv` array; in most cases
    /// it will be `1`, but it is possible to define subcommands with subcommands of their
    /// own.
    ///
    /// If the subcommand name is found in the array, the matching `CommandFunc` is called.
    /// otherwise, the error message gives the ensemble syntax.  If an invalid subcommand
    /// name was provided, the error message includes the valid options.
    pub fn call_subcommand(
        &mut self,
        argv: &[Value],
        subc: usize,
        subcommands: &[Subcommand<Ctx>],
        ctx: &mut Ctx,
    ) -> MoltOptResult {
        check_args(subc, argv, subc + 1, 0, "subcommand ?arg ...?")?;
        let rec = Subcommand::find(subcommands, argv[subc].as_str())?;
        (rec.1)(self, argv, ctx)
    }

    //--------------------------------------------------------------------------------------------
    // Interpreter Configuration

    /// Gets the interpreter's recursion limit: how deep the stack of script evaluations may be.
    ///
    /// A script stack level is added by each nested script evaluation (i.e., by each call)
    /// to [`eval`](#method.eval) or [`eval_value`](#method.eval_value), and by each
    /// procedure call.
    ///
    /// # Example
    /// ```
    /// # use moltbc::types::*;
    /// # use moltbc::interp::Interp;
    /// let mut interp = Interp::<()>::new();
    /// assert_eq!(interp.recursion_limit(), 1000);
    /// ```
    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Sets the interpreter's recursion limit: how deep the stack of script evaluations may
    /// be.  The default is 1000.
    ///
    /// # Example
    /// ```
    /// # use moltbc::types::*;
    /// # use moltbc::interp::Interp;
    /// let mut interp = Interp::<()>::new();
    /// interp.set_recursion_limit(100);
    /// assert_eq!(interp.recursion_limit(), 100);
    /// ```
    pub fn set_recursion_limit(&mut self, limit: usize) {
        self.recursion_limit = limit;
    }

    /// Gets whether compiled bytecode is cached on script values.
    pub fn bytecode_caching(&self) -> bool {
        self.bytecode_caching
    }

    /// Enables or disables caching of compiled bytecode on script values.  With caching
    /// off, every evaluation compiles its script afresh.  The default is on.
    pub fn set_bytecode_caching(&mut self, flag: bool) {
        self.bytecode_caching = flag;
    }

    /// Returns the compiled form of a regular expression, from the interpreter's cache
    /// when the pattern has been seen before.
    #[cfg(feature = "regexp")]
    pub(crate) fn regex(&mut self, pattern: &str, nocase: bool) -> Result<Rc<Regex>, Exception> {
        self.regexes.get(pattern, nocase)
    }
}

//------------------------------------------------------------------------------------------------
// Return options

/// Converts a result and a `return` options dictionary into the completion they describe.
/// `default_level` is the `-level` when the options don't give one.  Used by `return`,
/// by the compiled `try` to re-raise, and by `catch`'s callers.
pub(crate) fn exception_from_options(value: Value, options: &Value, default_level: usize) -> MoltResult {
    let opts = options.as_dict()?;
    let opt = |name: &str| opts.get(&Value::from(name)).cloned();

    let code = match opt("-code") {
        Some(code) => ResultCode::from_value(&code)?,
        None => ResultCode::Okay,
    };

    let level = match opt("-level") {
        Some(level) => match level.as_int() {
            Ok(level) if level >= 0 => level as usize,
            _ => {
                return molt_err!(
                    "bad -level value: expected non-negative integer but got \"{}\"",
                    level
                )
            }
        },
        None => default_level,
    };

    let error_data = || {
        let error_code = opt("-errorcode").unwrap_or_else(|| Value::from("NONE"));
        match opt("-errorinfo") {
            Some(info) => ErrorData::rethrow(error_code, info.as_str()),
            None => ErrorData::new(error_code, value.as_str()),
        }
    };

    if level > 0 {
        return if code == ResultCode::Error {
            Err(Exception::molt_return_err(value.clone(), level, error_data()))
        } else {
            Err(Exception::molt_return_ext(value, level, code))
        };
    }

    match code {
        ResultCode::Okay => Ok(value),
        ResultCode::Error => {
            let mut exception = Exception::molt_err_data(value.clone(), error_data());
            if let Some(line) = opt("-errorline").and_then(|line| line.as_int().ok()) {
                exception.set_error_line(line as usize);
            }
            if let Some(during) = opt("-during") {
                exception.set_during(during);
            }
            Err(exception)
        }
        ResultCode::Return => Err(Exception::molt_return(value)),
        ResultCode::Break => Err(Exception::molt_break()),
        ResultCode::Continue => Err(Exception::molt_continue()),
        ResultCode::Other(num) => Err(Exception::molt_other(num, value)),
    }
}

//------------------------------------------------------------------------------------------------
// Procedures

/// How a procedure is defined: as an argument list and a body script.
///
/// NOTE: We do not save the procedure's name; the name exists only in the
/// commands table, and can be changed there freely.  The procedure truly doesn't
/// know what its name is except when it is being executed.
struct Procedure {
    /// The procedure's parameter list.  Each item in the list is a name or a
    /// name/default value pair.  (This is verified by the `proc` command.)
    parms: MoltList,

    /// The procedure's body string.
    body: Value,

    /// The body's bytecode, compiled with the parameters as its first locals.
    code: RefCell<Option<Rc<ByteCode>>>,
}

impl Procedure {
    fn execute<Ctx>(&self, interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltResult {
        // FIRST, get the body's current bytecode.
        let code = self.bytecode(interp)?;

        // NEXT, push the proc's frame, with a cell for each compiled local.
        interp.enter_level()?;
        interp.scopes.push_proc(Rc::clone(code.local_names()), argv);

        // NEXT, bind the arguments and run the body.
        let result = match self.bind_args(interp, argv) {
            Ok(()) => execute::execute(interp, &code, ctx),
            Err(exception) => Err(exception),
        };

        interp.scopes.pop();
        interp.leave_level();

        let Err(mut exception) = result else {
            return result;
        };

        // NEXT, handle the return -code, -level protocol
        let returned = exception.code() == ResultCode::Return;
        if returned {
            exception.decrement_level();
        }

        match exception.code() {
            ResultCode::Okay => Ok(exception.value()),
            ResultCode::Error => {
                #[cfg(feature = "error-stack-trace")]
                {
                    let line = exception
                        .error_data()
                        .and_then(|data| data.error_line())
                        .unwrap_or(1);
                    exception.add_error_info(&format!(
                        "    (procedure \"{}\" line {})",
                        argv[0], line
                    ));
                }
                exception.reset_error_line();
                Err(exception)
            }
            ResultCode::Break if !returned => molt_err!("invoked \"break\" outside of a loop"),
            ResultCode::Continue if !returned => molt_err!("invoked \"continue\" outside of a loop"),
            _ => Err(exception),
        }
    }

    /// Returns the body's bytecode, compiling it if it's missing or stale.
    fn bytecode<Ctx>(&self, interp: &Interp<Ctx>) -> Result<Rc<ByteCode>, Exception> {
        if let Some(code) = &*self.code.borrow() {
            if code.epoch() == interp.epoch {
                return Ok(Rc::clone(code));
            }
        }

        let mut names = MoltList::new();
        for spec in &self.parms {
            names.push(spec.as_list()?[0].clone());
        }

        let code = Rc::new(compile::compile_script(
            self.body.as_str(),
            &interp.compilers,
            interp.epoch,
            Some(&names),
        )?);
        *self.code.borrow_mut() = Some(Rc::clone(&code));
        Ok(code)
    }

    /// Binds the arguments to the parameters in the new frame.
    fn bind_args<Ctx>(&self, interp: &mut Interp<Ctx>, argv: &[Value]) -> Result<(), Exception> {
        let mut argi = 1; // Skip the proc's name

        for (speci, spec) in self.parms.iter().enumerate() {
            let vec = spec.as_list()?;
            let name = &vec[0];

            // "args" has special meaning only if it's the final parameter.
            if name.as_str() == "args" && speci == self.parms.len() - 1 {
                let rest = argv.get(argi..).unwrap_or(&[]);
                interp.set_var(name, Value::from(rest))?;
                argi = argv.len();
                break;
            }

            if argi < argv.len() {
                interp.set_var(name, argv[argi].clone())?;
                argi += 1;
            } else if let Some(default) = vec.get(1) {
                interp.set_var(name, default.clone())?;
            } else {
                return self.wrong_num_args(&argv[0]);
            }
        }

        if argi != argv.len() {
            return self.wrong_num_args(&argv[0]);
        }

        Ok(())
    }

    // Outputs the wrong # args message for the proc.  The name is passed in
    // because it can be changed via the `rename` command.
    fn wrong_num_args(&self, name: &Value) -> Result<(), Exception> {
        let mut msg = String::new();
        msg.push_str("wrong # args: should be \"");
        msg.push_str(name.as_str());

        for (i, arg) in self.parms.iter().enumerate() {
            msg.push(' ');

            // "args" has special meaning only in the last place.
            if arg.as_str() == "args" && i == self.parms.len() - 1 {
                msg.push_str("?arg ...?");
                break;
            }

            let vec = arg.as_list()?;

            if vec.len() == 1 {
                msg.push_str(vec[0].as_str());
            } else {
                msg.push('?');
                msg.push_str(vec[0].as_str());
                msg.push('?');
            }
        }
        msg.push('\"');

        molt_throw!("TCL WRONGARGS", msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let interp = Interp::<()>::empty();
        // Interpreter is empty
        assert!(interp.command_names().is_empty());
        assert!(!interp.has_compiler("set"));
    }

    #[test]
    fn test_new() {
        let interp = Interp::<()>::new();

        // Interpreter is not empty
        assert!(!interp.command_names().is_empty());
        assert!(interp.has_command("::set"));

        #[cfg(feature = "compile-commands")]
        assert!(interp.has_compiler("while"));
    }

    #[test]
    fn test_eval() {
        let mut glob_ctx = ();
        let mut interp = Interp::new();

        assert_eq!(interp.eval("set a 1", &mut glob_ctx), Ok(Value::from("1")));
        assert!(ex_match(
            &interp.eval("error 2", &mut glob_ctx),
            Exception::molt_err(Value::from("2"))
        ));
        assert_eq!(interp.eval("return 3", &mut glob_ctx), Ok(Value::from("3")));
        assert!(ex_match(
            &interp.eval("break", &mut glob_ctx),
            Exception::molt_err(Value::from("invoked \"break\" outside of a loop"))
        ));
        assert!(ex_match(
            &interp.eval("continue", &mut glob_ctx),
            Exception::molt_err(Value::from("invoked \"continue\" outside of a loop"))
        ));
    }

    // Shows that the result is matches the given exception.  Ignores the exception's
    // ErrorData, if any.
    fn ex_match(r: &MoltResult, expected: Exception) -> bool {
        // FIRST, if the results are of different types, there's no match.
        if let Err(e) = r {
            e.code() == expected.code() && e.value() == expected.value()
        } else {
            false
        }
    }

    #[test]
    fn test_eval_value() {
        let mut glob_ctx = ();
        let mut interp = Interp::new();

        assert_eq!(
            interp.eval_value(&Value::from("set a 1"), &mut glob_ctx),
            Ok(Value::from("1"))
        );
        assert!(ex_match(
            &interp.eval_value(&Value::from("error 2"), &mut glob_ctx),
            Exception::molt_err(Value::from("2"))
        ));
        assert_eq!(
            interp.eval_value(&Value::from("return 3"), &mut glob_ctx),
            Ok(Value::from("3"))
        );
        assert!(ex_match(
            &interp.eval_value(&Value::from("break"), &mut glob_ctx),
            Exception::molt_err(Value::from("invoked \"break\" outside of a loop"))
        ));
    }

    #[test]
    fn test_invalid_command() {
        let mut interp = Interp::new();
        let err = interp.eval("nonesuch 1 2", &mut ()).unwrap_err();
        assert_eq!(err.value().as_str(), "invalid command name \"nonesuch\"");
        assert_eq!(err.error_code().as_str(), "TCL LOOKUP COMMAND nonesuch");
        assert_eq!(interp.scalar("errorCode").unwrap().as_str(), "TCL LOOKUP COMMAND nonesuch");
    }

    #[test]
    fn test_bytecode_cache() {
        let mut interp = Interp::new();
        let script = Value::from("set a 1");

        interp.eval_value(&script, &mut ()).unwrap();
        let cached = script.cached_bytecode().unwrap();
        interp.eval_value(&script, &mut ()).unwrap();
        assert!(Rc::ptr_eq(&cached, &script.cached_bytecode().unwrap()));

        // Redefining a compiled command makes the cached code stale.
        let epoch = interp.compile_epoch();
        interp.rename_command("set", "assign");
        assert!(interp.compile_epoch() > epoch);
        assert!(interp.eval_value(&script, &mut ()).is_err());
        assert_eq!(interp.eval("assign b 2", &mut ()).unwrap().as_str(), "2");
    }

    #[test]
    fn test_bytecode_caching_off() {
        let mut interp = Interp::new();
        interp.set_bytecode_caching(false);
        assert!(!interp.bytecode_caching());

        let script = Value::from("set a 1");
        interp.eval_value(&script, &mut ()).unwrap();
        assert!(script.cached_bytecode().is_none());
    }

    #[cfg(feature = "regexp")]
    #[test]
    fn test_regex_cache() {
        let mut interp = Interp::new();
        let script = "set n 0; set i 0; while {$i < 5} {incr i; if {[regexp {a+b} x${i}ab]} {incr n}}; set n";
        assert_eq!(interp.eval(script, &mut ()).unwrap().as_str(), "5");
        assert_eq!(
            interp.eval("regsub -all {a+b} aabab X", &mut ()).unwrap().as_str(),
            "XX"
        );
        assert_eq!(interp.regexes.len(), 1);

        interp.eval("switch -regexp abbc {b+c {}}", &mut ()).unwrap();
        assert_eq!(interp.regexes.len(), 2);
    }

    #[test]
    fn test_add_command_drops_compiler() {
        fn cmd_shout(_: &mut Interp, argv: &[Value], _: &mut ()) -> MoltOptResult {
            molt_opt_ok!(argv[1].as_str().to_uppercase())
        }

        let mut interp = Interp::new();
        interp.add_command("string", cmd_shout);
        assert!(!interp.has_compiler("string"));
        assert_eq!(interp.eval("string abc", &mut ()).unwrap().as_str(), "ABC");
    }

    #[test]
    fn test_complete() {
        let mut interp = Interp::<()>::new();

        assert!(interp.complete("abc"));
        assert!(interp.complete("a {bc} [def] \"ghi\" xyz"));

        assert!(!interp.complete("a {bc"));
        assert!(!interp.complete("a [bc"));
        assert!(!interp.complete("a \"bc"));
    }

    #[test]
    fn test_expr() {
        let mut glob_ctx = ();
        let mut interp = Interp::new();
        assert_eq!(
            interp.expr(&Value::from("1 + 2"), &mut glob_ctx),
            Ok(Value::from(3))
        );
        assert!(ex_match(
            &interp.expr(&Value::from("a + b"), &mut glob_ctx),
            Exception::molt_err(Value::from("invalid bareword \"a\""))
        ));
    }

    #[test]
    fn test_expr_bool() {
        let mut glob_ctx = ();
        let mut interp = Interp::new();
        assert_eq!(interp.expr_bool(&Value::from("1"), &mut glob_ctx), Ok(true));
        assert_eq!(
            interp.expr_bool(&Value::from("0"), &mut glob_ctx),
            Ok(false)
        );
        assert!(interp.expr_bool(&Value::from("a"), &mut glob_ctx).is_err());
    }

    #[test]
    fn test_expr_int() {
        let mut glob_ctx = ();
        let mut interp = Interp::new();
        assert_eq!(interp.expr_int(&Value::from("1 + 2"), &mut glob_ctx), Ok(3));
        assert!(interp.expr_int(&Value::from("a"), &mut glob_ctx).is_err());
    }

    #[test]
    fn test_expr_float() {
        let mut glob_ctx = ();
        let mut interp = Interp::new();
        let val = interp
            .expr_float(&Value::from("1.1 + 2.2"), &mut glob_ctx)
            .expect("floating point value");

        assert!((val - 3.3).abs() < 0.001);
    }

    #[test]
    fn test_variables() {
        let mut interp = Interp::<()>::new();

        interp.set_scalar("a", Value::from(1)).unwrap();
        assert_eq!(interp.scalar("a").unwrap().as_str(), "1");
        interp.set_element("b", "x", Value::from("y")).unwrap();
        assert_eq!(interp.element("b", "x").unwrap().as_str(), "y");
        assert_eq!(interp.var(&Value::from("b(x)")).unwrap().as_str(), "y");
        assert!(interp.var_exists(&Value::from("a")));

        interp.array_set("c", &["k1".into(), "v1".into(), "k2".into(), "v2".into()]).unwrap();
        assert_eq!(interp.array_size("c"), 2);
        assert!(interp.array_exists("c"));
        assert!(!interp.array_exists("a"));
        assert_eq!(Value::from(interp.array_names("c")).as_str(), "k1 k2");
        assert!(interp.array_set("c", &["odd".into()]).is_err());

        interp.unset("a");
        assert!(!interp.var_exists(&Value::from("a")));
        interp.unset_element("b", "x");
        assert!(interp.element("b", "x").is_err());
        assert_eq!(
            interp.scalar("nope").unwrap_err().value().as_str(),
            "can't read \"nope\": no such variable"
        );
    }

    #[test]
    fn test_procs() {
        let mut interp = Interp::new();
        interp
            .eval("proc add {a {b 10} args} {return [expr {$a + $b + [llength $args]}]}", &mut ())
            .unwrap();

        assert_eq!(interp.eval("add 1", &mut ()).unwrap().as_str(), "11");
        assert_eq!(interp.eval("add 1 2 x y", &mut ()).unwrap().as_str(), "5");
        assert_eq!(Value::from(interp.proc_names()).as_str(), "add");
        assert_eq!(interp.proc_args("add").unwrap().as_str(), "a b args");
        assert_eq!(interp.proc_default("add", "b").unwrap(), Some(Value::from("10")));
        assert_eq!(interp.proc_default("add", "a").unwrap(), None);
        assert!(interp.proc_default("add", "z").is_err());
        assert_eq!(interp.command_type("add").unwrap().as_str(), "proc");
        assert_eq!(interp.command_type("set").unwrap().as_str(), "native");

        interp.eval("proc two {x y} {}", &mut ()).unwrap();
        let err = interp.eval("two 1", &mut ()).unwrap_err();
        assert_eq!(err.value().as_str(), "wrong # args: should be \"two x y\"");
        assert_eq!(err.error_code().as_str(), "TCL WRONGARGS");
    }

    #[test]
    fn test_proc_error_trace() {
        let mut interp = Interp::new();
        interp.eval("proc p {} {\n  set x 1\n  error oops\n}", &mut ()).unwrap();
        let err = interp.eval("p", &mut ()).unwrap_err();

        #[cfg(feature = "error-stack-trace")]
        assert_eq!(
            err.error_info().as_str(),
            "oops\n    while executing\n\"error oops\"\n    (procedure \"p\" line 3)\n    invoked from within\n\"p\""
        );
        assert_eq!(err.error_data().and_then(|d| d.error_line()), Some(1));
    }

    #[test]
    fn test_return_options() {
        let interp = Interp::<()>::new();
        let opts = interp.return_options(&Ok(Value::empty()));
        assert_eq!(opts.as_str(), "-code 0 -level 0");

        let opts = interp.return_options(&molt_throw!("MY CODE", "boom"));
        let dict = opts.as_dict().unwrap();
        assert_eq!(dict.get(&Value::from("-code")).unwrap().as_str(), "1");
        assert_eq!(dict.get(&Value::from("-errorcode")).unwrap().as_str(), "MY CODE");
        assert_eq!(dict.get(&Value::from("-errorinfo")).unwrap().as_str(), "boom");
    }

    #[test]
    fn test_exception_from_options() {
        let value = Value::from("v");
        assert_eq!(
            exception_from_options(value.clone(), &Value::from("-code 0 -level 0"), 0),
            Ok(value.clone())
        );

        let err = exception_from_options(value.clone(), &Value::from("-code error -errorcode {A B}"), 0)
            .unwrap_err();
        assert!(err.is_error());
        assert!(err.is_new_error());
        assert_eq!(err.error_code().as_str(), "A B");

        let err = exception_from_options(value.clone(), &Value::from("-code 1 -errorinfo trace"), 0)
            .unwrap_err();
        assert!(!err.is_new_error());

        let err = exception_from_options(value.clone(), &Value::from("-code break"), 0).unwrap_err();
        assert_eq!(err.code(), ResultCode::Break);

        let err = exception_from_options(value.clone(), &Value::from(""), 1).unwrap_err();
        assert_eq!(err.code(), ResultCode::Return);
        assert_eq!(err.level(), 1);

        assert!(exception_from_options(value, &Value::from("-level -1"), 0)
            .unwrap_err()
            .value()
            .as_str()
            .starts_with("bad -level value"));
    }

    #[test]
    fn test_recursion_limit() {
        let mut glob_ctx = ();
        let mut interp = Interp::new();

        assert_eq!(interp.recursion_limit(), 1000);
        interp.set_recursion_limit(100);
        assert_eq!(interp.recursion_limit(), 100);

        assert!(interp.eval("proc myproc {} { myproc }", &mut glob_ctx).is_ok());
        assert!(ex_match(
            &interp.eval("myproc", &mut glob_ctx),
            Exception::molt_err(Value::from(
                "too many nested calls to Interp::eval (infinite loop?)"
            ))
        ));
    }
}
