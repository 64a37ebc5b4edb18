//! Compiler for `subst`.
//!
//! The result is built up in an accumulator on the stack.  Each command substitution
//! runs under a catch handler: `break` ends the substitution with what's accumulated
//! so far, `continue` substitutes the empty string, `return` substitutes the returned
//! value, and any other exception is re-raised as it was.

use crate::compile::env::JumpKind;
use crate::compile::env::Label;
use crate::compile::env::RangeTarget;
use crate::compile::Compiled;
use crate::compile::CompileError;
use crate::compile::Compiler;
use crate::compile::Opcode;
use crate::compile::RangeKind;
use crate::compile::ScriptRange;
use crate::parser;
use crate::parser::SubstFlags;
use crate::token::count_lines;
use crate::token::ParsedCommand;
use crate::token::Token;
use crate::token::TokenKind;

/// # subst ?-nobackslashes? ?-nocommands? ?-novariables? *string*
///
/// The string must be a literal slice of the source.
pub(crate) fn compile_subst(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let num_words = cmd.num_words();
    if num_words < 2 {
        return Ok(Compiled::Decline);
    }

    let mut flags = SubstFlags::default();
    for i in 1..num_words - 1 {
        match c.literal(cmd, i).as_deref() {
            Some("-nobackslashes") => flags.no_backslashes = true,
            Some("-nocommands") => flags.no_commands = true,
            Some("-novariables") => flags.no_variables = true,
            _ => return Ok(Compiled::Decline),
        }
    }

    let Some(range) = c.body_range(cmd, num_words - 1) else {
        return Ok(Compiled::Decline);
    };
    let tokens = parser::parse_subst(c.source(), range.start, range.end, flags)?;
    let pieces = &tokens[1..];
    let anchor = (range.start, range.line);

    if !pieces.iter().any(|t| t.kind == TokenKind::Command) {
        let count = c.compile_pieces(pieces, anchor)?;
        c.concat(count);
        return Ok(Compiled::Done);
    }

    let done = c.env.new_label();
    c.env.push_literal("");

    // Compile the runs of non-command pieces together; each command on its own.
    let mut run_start = 0;
    let mut i = 0;
    while i < pieces.len() {
        let token = pieces[i];
        if token.kind == TokenKind::Command {
            append_run(c, &pieces[run_start..i], anchor)?;
            compile_caught_command(c, token, anchor, done)?;
            run_start = i + 1;
        }
        i += 1 + token.num_components;
    }
    append_run(c, &pieces[run_start..], anchor)?;

    c.env.place(done);
    Ok(Compiled::Done)
}

/// Appends a run of pieces to the accumulator.
fn append_run(c: &mut Compiler, run: &[Token], anchor: (usize, usize)) -> Result<(), CompileError> {
    if run.is_empty() {
        return Ok(());
    }
    let count = c.compile_pieces(run, anchor)?;
    c.concat(count);
    c.env.emit_variadic(Opcode::Concat, 2);
    Ok(())
}

/// Appends a command substitution's result to the accumulator, handling `break`,
/// `continue` and `return`.
fn compile_caught_command(
    c: &mut Compiler,
    token: Token,
    anchor: (usize, usize),
    done: Label,
) -> Result<(), CompileError> {
    let line = anchor.1 + count_lines(c.source(), anchor.0, token.start);
    let on_break = c.env.new_label();
    let on_continue = c.env.new_label();
    let on_return = c.env.new_label();
    let handler = c.env.new_label();
    let next = c.env.new_label();

    let range = c.env.open_range(RangeKind::Catch);
    c.env.set_range_target(range, RangeTarget::Catch, handler);
    c.compile_script_range(ScriptRange {
        start: token.start + 1,
        end: token.end() - 1,
        line,
    })?;
    c.env.close_range(range)?;
    c.env.emit_variadic(Opcode::Concat, 2);
    c.env.jump(JumpKind::Always, next);

    // The handler is entered with just the accumulator on the stack.
    c.env.place(handler);
    c.env.emit(Opcode::PushReturnCode);
    c.env.emit(Opcode::Dup);
    c.env.push_literal("3");
    c.env.emit(Opcode::Eq);
    c.env.jump(JumpKind::IfTrue, on_break);
    c.env.emit(Opcode::Dup);
    c.env.push_literal("4");
    c.env.emit(Opcode::Eq);
    c.env.jump(JumpKind::IfTrue, on_continue);
    c.env.emit(Opcode::Dup);
    c.env.push_literal("2");
    c.env.emit(Opcode::Eq);
    c.env.jump(JumpKind::IfTrue, on_return);

    c.env.emit(Opcode::Pop);
    c.env.emit(Opcode::PushResult);
    c.env.emit(Opcode::PushReturnOptions);
    c.env.emit(Opcode::ReturnStk);
    c.env.adjust_depth(-1);

    // These are entered with the code above the accumulator.
    c.env.place(on_break);
    c.env.adjust_depth(1);
    c.env.emit(Opcode::Pop);
    c.env.jump(JumpKind::Always, done);

    // The returned value is substituted.
    c.env.place(on_return);
    c.env.adjust_depth(1);
    c.env.emit(Opcode::Pop);
    c.env.emit(Opcode::PushResult);
    c.env.emit_variadic(Opcode::Concat, 2);
    c.env.jump(JumpKind::Always, next);

    c.env.place(on_continue);
    c.env.adjust_depth(1);
    c.env.emit(Opcode::Pop);

    c.env.place(next);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::compile::compile_for_test;
    use crate::compile::ops;
    use crate::compile::Opcode;
    use crate::compile::RangeKind;
    use crate::interp::Interp;
    use crate::types::*;

    #[test]
    fn test_without_commands() {
        let code = compile_for_test("subst {a $b c}", false);
        assert!(code.ranges().is_empty());
        assert_eq!(ops(&code).last(), Some(&Opcode::Concat));

        let code = compile_for_test("subst -novariables {a $b c}", false);
        assert_eq!(ops(&code), vec![Opcode::Push1]);
    }

    #[test]
    fn test_with_commands() {
        let code = compile_for_test("subst {a [f] b}", false);
        assert_eq!(code.ranges().len(), 1);
        assert_eq!(code.ranges()[0].kind, RangeKind::Catch);
        assert!(ops(&code).contains(&Opcode::ReturnStk));
    }

    #[test]
    fn test_caught_codes() {
        let mut interp = Interp::new();
        let mut eval = |script: &str| interp.eval(script, &mut ());
        assert_eq!(eval("subst {a[break]b}"), Ok(Value::from("a")));
        assert_eq!(eval("subst {a[continue]b}"), Ok(Value::from("ab")));
        assert_eq!(eval("subst {a[return z]b}"), Ok(Value::from("azb")));
        assert_eq!(
            eval("proc p {} {set s [subst {<[return in]>}]; return after$s}; p"),
            Ok(Value::from("after<in>"))
        );
        assert!(eval("subst {a[error x]b}").is_err());
    }

    #[test]
    fn test_substituted_string_declines() {
        let code = compile_for_test("subst $s", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
    }
}
