//! Compilers for the math operator commands: `+`, `-`, `*`, `/`, `**`, the
//! comparisons, and the bitwise and logical operators.

use crate::compile::CompileFunc;
use crate::compile::Compiled;
use crate::compile::CompileError;
use crate::compile::Compiler;
use crate::compile::Opcode;
use crate::token::ParsedCommand;

/// The operator compilers, by command name.
pub(crate) fn compilers() -> Vec<(&'static str, CompileFunc)> {
    vec![
        ("+", compile_add),
        ("*", compile_mult),
        ("&", compile_bitand),
        ("|", compile_bitor),
        ("^", compile_bitxor),
        ("-", compile_sub),
        ("/", compile_div),
        ("**", compile_expon),
        ("%", compile_mod),
        ("<<", compile_lshift),
        (">>", compile_rshift),
        ("==", compile_eq),
        ("<", compile_lt),
        ("<=", compile_le),
        (">", compile_gt),
        (">=", compile_ge),
        ("eq", compile_streq),
        ("!=", compile_neq),
        ("ne", compile_strneq),
        ("in", compile_in),
        ("ni", compile_ni),
        ("!", compile_not),
        ("~", compile_bitnot),
    ]
}

macro_rules! op_compiler {
    ($name:ident, $shape:ident, $($arg:expr),*) => {
        fn $name(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
            $shape(c, cmd, $($arg),*)
        }
    };
}

op_compiler!(compile_add, fold, Opcode::Add, "0");
op_compiler!(compile_mult, fold, Opcode::Mult, "1");
op_compiler!(compile_bitand, fold, Opcode::BitAnd, "-1");
op_compiler!(compile_bitor, fold, Opcode::BitOr, "0");
op_compiler!(compile_bitxor, fold, Opcode::BitXor, "0");
op_compiler!(compile_sub, left_assoc, Opcode::Sub);
op_compiler!(compile_div, left_assoc, Opcode::Div);
op_compiler!(compile_expon, right_assoc, Opcode::Expon);
op_compiler!(compile_mod, binary, Opcode::Mod);
op_compiler!(compile_lshift, binary, Opcode::Lshift);
op_compiler!(compile_rshift, binary, Opcode::Rshift);
op_compiler!(compile_eq, comparison, Opcode::Eq);
op_compiler!(compile_lt, comparison, Opcode::Lt);
op_compiler!(compile_le, comparison, Opcode::Le);
op_compiler!(compile_gt, comparison, Opcode::Gt);
op_compiler!(compile_ge, comparison, Opcode::Ge);
op_compiler!(compile_streq, comparison, Opcode::StrEq);
op_compiler!(compile_neq, binary, Opcode::Neq);
op_compiler!(compile_strneq, binary, Opcode::StrNeq);
op_compiler!(compile_in, binary, Opcode::ListIn);
op_compiler!(compile_ni, binary, Opcode::ListNotIn);
op_compiler!(compile_not, unary, Opcode::Not);
op_compiler!(compile_bitnot, unary, Opcode::BitNot);

fn push_args(c: &mut Compiler, cmd: &ParsedCommand) -> Result<usize, CompileError> {
    for i in 1..cmd.num_words() {
        c.compile_word(cmd, i)?;
    }
    Ok(cmd.num_words() - 1)
}

/// An associative operator: no arguments give the identity; one argument is combined
/// with the identity, which checks that it's numeric.
fn fold(c: &mut Compiler, cmd: &ParsedCommand, op: Opcode, identity: &str) -> Result<Compiled, CompileError> {
    match cmd.num_words() - 1 {
        0 => c.env.push_literal(identity),
        1 => {
            c.compile_word(cmd, 1)?;
            c.env.push_literal(identity);
            c.env.emit(op);
        }
        _ => {
            c.compile_word(cmd, 1)?;
            for i in 2..cmd.num_words() {
                c.compile_word(cmd, i)?;
                c.env.emit(op);
            }
        }
    }
    Ok(Compiled::Done)
}

/// `-` and `/`.  One argument negates or takes the reciprocal.  Several are combined
/// left to right: the arguments are pushed in order and reversed, then each step
/// brings the next operand into place.
fn left_assoc(c: &mut Compiler, cmd: &ParsedCommand, op: Opcode) -> Result<Compiled, CompileError> {
    match cmd.num_words() - 1 {
        0 => return Ok(Compiled::Decline),
        1 if op == Opcode::Sub => {
            c.compile_word(cmd, 1)?;
            c.env.emit(Opcode::UMinus);
        }
        1 => {
            c.env.push_literal("1.0");
            c.compile_word(cmd, 1)?;
            c.env.emit(op);
        }
        2 => {
            push_args(c, cmd)?;
            c.env.emit(op);
        }
        _ => {
            let count = push_args(c, cmd)?;
            c.env.emit_int4(Opcode::Reverse, count as i64);
            for _ in 1..count {
                c.env.emit_int4(Opcode::Reverse, 2);
                c.env.emit(op);
            }
        }
    }
    Ok(Compiled::Done)
}

/// `**` groups to the right, so the operations simply unwind the stack.
fn right_assoc(c: &mut Compiler, cmd: &ParsedCommand, op: Opcode) -> Result<Compiled, CompileError> {
    match cmd.num_words() - 1 {
        0 => c.env.push_literal("1"),
        1 => {
            c.compile_word(cmd, 1)?;
            c.env.push_literal("1");
            c.env.emit(op);
        }
        _ => {
            let count = push_args(c, cmd)?;
            for _ in 1..count {
                c.env.emit(op);
            }
        }
    }
    Ok(Compiled::Done)
}

fn binary(c: &mut Compiler, cmd: &ParsedCommand, op: Opcode) -> Result<Compiled, CompileError> {
    if cmd.num_words() != 3 {
        return Ok(Compiled::Decline);
    }
    push_args(c, cmd)?;
    c.env.emit(op);
    Ok(Compiled::Done)
}

/// A comparison is trivially true of fewer than two arguments.  Chains of more than
/// two are left to the command.
fn comparison(c: &mut Compiler, cmd: &ParsedCommand, op: Opcode) -> Result<Compiled, CompileError> {
    match cmd.num_words() - 1 {
        0 => c.env.push_literal("1"),
        1 => {
            // The argument is still evaluated.
            c.compile_word(cmd, 1)?;
            c.env.emit(Opcode::Pop);
            c.env.push_literal("1");
        }
        2 => {
            push_args(c, cmd)?;
            c.env.emit(op);
        }
        _ => return Ok(Compiled::Decline),
    }
    Ok(Compiled::Done)
}

fn unary(c: &mut Compiler, cmd: &ParsedCommand, op: Opcode) -> Result<Compiled, CompileError> {
    if cmd.num_words() != 2 {
        return Ok(Compiled::Decline);
    }
    c.compile_word(cmd, 1)?;
    c.env.emit(op);
    Ok(Compiled::Done)
}
