//! The Bytecode Compiler
//!
//! `compile_script` turns a script into a [`ByteCode`] unit.  The script is parsed into
//! commands, and each command is compiled in turn:
//!
//! * If the command's name is known at compile time and a command compiler is
//!   registered for it, the compiler is given a chance to emit a specialized
//!   instruction sequence.  A compiler may decline, in which case everything it
//!   emitted is discarded.
//!
//! * Otherwise the command's words are pushed on the operand stack and the command
//!   is invoked by name at run time.  This is always correct; the specialized forms
//!   are only faster.
//!
//! Every command leaves exactly one value on the operand stack: its result.  The
//! results of all but a script's last command are popped.
//!
//! Words are compiled as follows.  A word with no substitutions is pushed as a
//! literal.  A variable reference loads the variable, through its compiled-local slot
//! when compiling a procedure body and the name is simple.  A command substitution is
//! compiled inline.  A word with several parts pushes each part and concatenates them.

mod bytecode;
mod control;
pub mod env;
mod mathop;
pub mod opcodes;
mod regexp;
mod string;
mod subst;
mod switch;
mod trycmd;
mod vars;

pub use bytecode::AuxData;
pub use bytecode::ByteCode;
pub use bytecode::CmdLocation;
pub use bytecode::ExceptionRange;
pub use bytecode::Instruction;
pub use bytecode::JumpTable;
pub use bytecode::RangeKind;
pub use bytecode::RangeTargets;
pub use env::CompileEnv;
pub use opcodes::Opcode;
pub(crate) use string::DEFAULT_TRIM;

use crate::list;
use crate::parser;
use crate::token::count_lines;
use crate::token::literal_range;
use crate::token::literal_text;
use crate::token::ParsedCommand;
use crate::token::Token;
use crate::token::TokenKind;
use crate::types::*;
use crate::util;
use indexmap::IndexMap;
use std::rc::Rc;
use thiserror::Error;

/// The outcome of a command compiler.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Compiled {
    /// The command was compiled.
    Done,

    /// The compiler declined; the command will be compiled as a generic invocation.
    Decline,
}

/// A compile-time failure.  The driver treats these like a decline: the command is
/// compiled as a generic invocation, which reports the problem at run time.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CompileError {
    #[error("{0}")]
    Syntax(String),

    #[error("exception ranges closed out of order")]
    RangeOrder,

    #[error("jump to a label that was never placed")]
    UnplacedLabel,

    #[error("{0}")]
    BadClause(String),
}

impl From<Exception> for CompileError {
    fn from(ex: Exception) -> Self {
        CompileError::Syntax(ex.value().as_str().into())
    }
}

/// A command compiler.
pub type CompileFunc = fn(&mut Compiler, &ParsedCommand) -> Result<Compiled, CompileError>;

/// The registered command compilers, by command name.
pub type CompilerTable = IndexMap<String, CompileFunc, MoltHasher>;

/// The standard command compilers.
pub fn standard_compilers() -> Vec<(&'static str, CompileFunc)> {
    let mut list: Vec<(&'static str, CompileFunc)> = vec![
        ("append", vars::compile_append),
        ("break", control::compile_break),
        ("continue", control::compile_continue),
        ("expr", control::compile_expr),
        ("if", control::compile_if),
        ("incr", vars::compile_incr),
        ("lappend", vars::compile_lappend),
        ("regexp", regexp::compile_regexp),
        ("regsub", regexp::compile_regsub),
        ("set", vars::compile_set),
        ("string", string::compile_string),
        ("subst", subst::compile_subst),
        ("switch", switch::compile_switch),
        ("try", trycmd::compile_try),
        ("while", control::compile_while),
    ];
    list.extend(mathop::compilers());
    list
}

/// A source range holding a script: its start, end, and starting line.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ScriptRange {
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

/// Compiles a script.  When `params` is given, the script is a procedure body, and
/// the parameters get the first compiled-local slots.
pub fn compile_script(
    source: &str,
    compilers: &CompilerTable,
    epoch: u64,
    params: Option<&[Value]>,
) -> Result<ByteCode, Exception> {
    let commands = parser::parse(source)?;
    let mut compiler = Compiler::new(source, compilers, params.is_some());

    for param in params.unwrap_or(&[]) {
        compiler.env.local_slot(param.as_str());
    }

    if let Err(err) = compiler.compile_commands(&commands) {
        return molt_err!("{}", err);
    }

    let code = match compiler.env.assemble(Rc::from(source), epoch, params.unwrap_or(&[])) {
        Ok(code) => code,
        Err(err) => return molt_err!("{}", err),
    };

    log::debug!(
        "compiled {} command(s) into {} bytes, {} literal(s), {} range(s)",
        commands.len(),
        code.code().len(),
        code.literals().len(),
        code.ranges().len()
    );
    Ok(code)
}

/// The compilation in progress: the instruction builder plus the source and the
/// compiler table.  Command compilers work through this.
pub struct Compiler<'a> {
    pub env: CompileEnv,
    source: &'a str,
    compilers: &'a CompilerTable,
    proc_context: bool,
}

impl<'a> Compiler<'a> {
    pub fn new(source: &'a str, compilers: &'a CompilerTable, proc_context: bool) -> Self {
        Self {
            env: CompileEnv::new(),
            source,
            compilers,
            proc_context,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    //-------------------------------------------------------------------------
    // Scripts and commands

    /// Compiles a sequence of commands, leaving the last one's result on the stack.
    pub fn compile_commands(&mut self, commands: &[ParsedCommand]) -> Result<(), CompileError> {
        if commands.is_empty() {
            self.env.push_literal("");
            return Ok(());
        }

        for (i, cmd) in commands.iter().enumerate() {
            if i > 0 {
                self.env.emit(Opcode::Pop);
            }
            self.compile_command(cmd)?;
        }

        Ok(())
    }

    /// Compiles the script in the given source range inline.
    pub fn compile_script_range(&mut self, range: ScriptRange) -> Result<(), CompileError> {
        let commands = parser::parse_range(self.source, range.start, range.end, range.line)?;
        self.compile_commands(&commands)
    }

    fn compile_command(&mut self, cmd: &ParsedCommand) -> Result<(), CompileError> {
        let handle = self.env.begin_command(cmd.start, cmd.len, cmd.line);

        if !self.try_command_compiler(cmd) {
            self.compile_invoke(cmd)?;
        }

        self.env.end_command(handle);
        Ok(())
    }

    /// Gives the command's compiler, if any, a chance to compile it.  Returns false if
    /// there is none or it declined, in which case nothing has been emitted.
    fn try_command_compiler(&mut self, cmd: &ParsedCommand) -> bool {
        let Some(name) = literal_text(cmd.word(0), self.source) else {
            return false;
        };
        let name = name.strip_prefix("::").unwrap_or(&name);
        let compilers = self.compilers;
        let Some(func) = compilers.get(name).copied() else {
            return false;
        };

        let checkpoint = self.env.checkpoint();
        let depth = self.env.depth();

        match func(self, cmd) {
            Ok(Compiled::Done) => {
                debug_assert_eq!(self.env.depth(), depth + 1, "\"{}\" compiler", name);
                log::trace!("compiled \"{}\" at line {}", name, cmd.line);
                return true;
            }
            Ok(Compiled::Decline) => {
                log::trace!("\"{}\" at line {}: declined", name, cmd.line);
            }
            Err(err) => {
                log::trace!("\"{}\" at line {}: declined, {}", name, cmd.line, err);
            }
        }

        self.env.rewind(checkpoint);
        false
    }

    /// Compiles the command as a generic invocation: push every word, then invoke.
    pub fn compile_invoke(&mut self, cmd: &ParsedCommand) -> Result<(), CompileError> {
        for i in 0..cmd.num_words() {
            self.compile_word(cmd, i)?;
        }
        self.env.emit_invoke(cmd.num_words());
        Ok(())
    }

    //-------------------------------------------------------------------------
    // Words

    /// The line on which the given position of the command's source lies.
    pub fn line_at(&self, cmd: &ParsedCommand, pos: usize) -> usize {
        cmd.line + count_lines(self.source, cmd.start, pos)
    }

    /// The value of word `index`, if it has no substitutions.
    pub fn literal(&self, cmd: &ParsedCommand, index: usize) -> Option<String> {
        literal_text(cmd.word(index), self.source)
    }

    /// The source range of word `index` when its value is exactly that slice of the
    /// source, as a braced script body is.
    pub fn body_range(&self, cmd: &ParsedCommand, index: usize) -> Option<ScriptRange> {
        let (start, len) = literal_range(cmd.word(index))?;
        Some(ScriptRange {
            start,
            end: start + len,
            line: self.line_at(cmd, start),
        })
    }

    /// Parses word `index` as a list whose value is a slice of the source, returning
    /// each element's text and, when the element is itself a slice of the source, its
    /// range.
    pub fn literal_list(
        &self,
        cmd: &ParsedCommand,
        index: usize,
    ) -> Option<Vec<(String, Option<ScriptRange>)>> {
        let range = self.body_range(cmd, index)?;
        let elements = list::parse_elements(&self.source[range.start..range.end]).ok()?;

        Some(
            elements
                .into_iter()
                .map(|elem| {
                    let start = range.start + elem.offset;
                    let body = if elem.literal {
                        Some(ScriptRange {
                            start,
                            end: start + elem.text.len(),
                            line: self.line_at(cmd, start),
                        })
                    } else {
                        None
                    };
                    (elem.text, body)
                })
                .collect(),
        )
    }

    /// Pushes the value of word `index`.
    pub fn compile_word(&mut self, cmd: &ParsedCommand, index: usize) -> Result<(), CompileError> {
        let word = cmd.word(index);

        if let Some(text) = literal_text(word, self.source) {
            self.env.push_literal(&text);
            return Ok(());
        }

        let anchor = (cmd.start, cmd.line);
        let count = self.compile_pieces(&word[1..], anchor)?;
        self.concat(count);
        Ok(())
    }

    /// Concatenates the top `count` items, if there's more than one.
    pub fn concat(&mut self, count: usize) {
        match count {
            0 => self.env.push_literal(""),
            1 => (),
            n => self.env.emit_variadic(Opcode::Concat, n),
        }
    }

    /// Pushes the values of a sequence of sibling tokens, merging adjacent text.
    /// Returns the number of items pushed, which is kept below the concat limit by
    /// concatenating early.  `anchor` is a position and its line, for line numbers.
    pub fn compile_pieces(
        &mut self,
        tokens: &[Token],
        anchor: (usize, usize),
    ) -> Result<usize, CompileError> {
        let mut count = 0;
        let mut text = String::new();
        let mut has_text = false;
        let mut i = 0;

        while i < tokens.len() {
            let token = tokens[i];

            match token.kind {
                TokenKind::Variable | TokenKind::Command => {
                    if has_text {
                        self.env.push_literal(&text);
                        text.clear();
                        has_text = false;
                        count = self.bump(count);
                    }

                    if token.kind == TokenKind::Variable {
                        self.compile_variable(&tokens[i..i + 1 + token.num_components], anchor)?;
                    } else {
                        let line = anchor.1 + count_lines(self.source, anchor.0, token.start);
                        self.compile_script_range(ScriptRange {
                            start: token.start + 1,
                            end: token.end() - 1,
                            line,
                        })?;
                    }
                    count = self.bump(count);
                }
                TokenKind::Backslash => {
                    text.push_str(&util::backslash_subst(self.source, token.start).0);
                    has_text = true;
                }
                TokenKind::Text | TokenKind::Word => {
                    text.push_str(token.text(self.source));
                    has_text = true;
                }
            }

            i += 1 + token.num_components;
        }

        if has_text {
            self.env.push_literal(&text);
            count = self.bump(count);
        }

        Ok(count)
    }

    fn bump(&mut self, count: usize) -> usize {
        if count + 1 == u8::MAX as usize {
            self.env.emit_variadic(Opcode::Concat, count + 1);
            1
        } else {
            count + 1
        }
    }

    /// Pushes the value of a variable reference: a `Variable` token and its components.
    fn compile_variable(&mut self, tokens: &[Token], anchor: (usize, usize)) -> Result<(), CompileError> {
        let name = tokens[1].text(self.source);

        if tokens[0].num_components == 1 {
            self.load_scalar(name);
            return Ok(());
        }

        let index = &tokens[2..];
        match self.slot_for(name) {
            Some(slot) => {
                let count = self.compile_pieces(index, anchor)?;
                self.concat(count);
                self.env.emit_int4(Opcode::LoadArray, slot as i64);
            }
            None => {
                self.env.push_literal(name);
                let count = self.compile_pieces(index, anchor)?;
                self.concat(count);
                self.env.emit(Opcode::LoadArrayStk);
            }
        }
        Ok(())
    }

    /// Pushes the value of a variable named by literal text.
    pub fn load_scalar(&mut self, name: &str) {
        match self.slot_for(name) {
            Some(slot) => self.env.emit_int4(Opcode::LoadScalar, slot as i64),
            None => {
                self.env.push_literal(name);
                self.env.emit(Opcode::LoadStk);
            }
        }
    }

    /// Returns the compiled-local slot for the named variable, if the code is a
    /// procedure body and the name is a plain local name.
    pub fn slot_for(&mut self, name: &str) -> Option<usize> {
        if self.proc_context && is_simple_name(name) {
            Some(self.env.local_slot(name))
        } else {
            None
        }
    }
}

/// A simple name is neither qualified nor in array syntax.
fn is_simple_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("::")
        && !(name.ends_with(')') && name.contains('('))
}

/// Compiles a script with the standard compilers, for tests.
#[cfg(test)]
pub(crate) fn compile_for_test(source: &str, proc_context: bool) -> ByteCode {
    let compilers: CompilerTable = standard_compilers()
        .into_iter()
        .map(|(name, func)| (name.to_string(), func))
        .collect();
    let params: Vec<Value> = Vec::new();
    let params = if proc_context { Some(&params[..]) } else { None };
    compile_script(source, &compilers, 0, params).unwrap()
}

/// The opcodes of a unit, in order, for tests.
#[cfg(test)]
pub(crate) fn ops(code: &ByteCode) -> Vec<Opcode> {
    code.instructions().iter().map(|i| i.op).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str, proc_context: bool) -> ByteCode {
        compile_for_test(source, proc_context)
    }

    #[test]
    fn test_empty_script() {
        let code = compile("", false);
        assert_eq!(ops(&code), vec![Opcode::Push1]);
        assert_eq!(code.literals()[0].as_str(), "");
    }

    #[test]
    fn test_generic_invoke() {
        let code = compile("puts hello; puts world", false);
        assert_eq!(
            ops(&code),
            vec![
                Opcode::Push1,
                Opcode::Push1,
                Opcode::InvokeStk1,
                Opcode::Pop,
                Opcode::Push1,
                Opcode::Push1,
                Opcode::InvokeStk1
            ]
        );
        // "puts" is registered once.
        assert_eq!(code.literals().len(), 3);
        assert_eq!(code.max_stack(), 2);
    }

    #[test]
    fn test_composite_word() {
        let code = compile("puts a$b[c]d", false);
        assert!(ops(&code).contains(&Opcode::LoadStk));
        assert!(ops(&code).contains(&Opcode::Concat));
    }

    #[test]
    fn test_slots_in_procs() {
        let code = compile("puts $x; puts $y(1)", true);
        assert!(ops(&code).contains(&Opcode::LoadScalar));
        assert!(ops(&code).contains(&Opcode::LoadArray));
        assert_eq!(code.local_names().len(), 2);

        let code = compile("puts $::x", true);
        assert!(ops(&code).contains(&Opcode::LoadStk));
        assert!(code.local_names().is_empty());
    }

    #[test]
    fn test_command_locations() {
        let code = compile("set a 1\nputs [string length $a]", false);
        let insts = code.instructions();

        // The StrLen instruction belongs to the nested command.
        let strlen = insts.iter().find(|i| i.op == Opcode::StrLen).unwrap();
        let loc = code.command_at(strlen.pc).unwrap();
        assert_eq!(&code.source()[loc.source_start..loc.source_start + loc.source_len], "string length $a");
        assert_eq!(loc.line, 2);
    }

    #[test]
    fn test_declined_command_is_generic() {
        // "set" with too many words is left for the command to reject.
        let code = compile("set a b c", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
    }

    #[test]
    fn test_parse_error() {
        let compilers = CompilerTable::default();
        let err = compile_script("set a {b", &compilers, 0, None).unwrap_err();
        assert_eq!(err.value().as_str(), "missing close-brace");
    }

    #[test]
    fn test_is_simple_name() {
        assert!(is_simple_name("a"));
        assert!(!is_simple_name("::a"));
        assert!(!is_simple_name("a(b)"));
        assert!(!is_simple_name(""));
    }
}
