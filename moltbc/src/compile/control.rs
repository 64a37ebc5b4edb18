//! Compilers for the control structures: `while`, `if`, `break`, `continue`, and `expr`.

use crate::compile::env::JumpKind;
use crate::compile::env::RangeTarget;
use crate::compile::Compiled;
use crate::compile::CompileError;
use crate::compile::Compiler;
use crate::compile::Opcode;
use crate::compile::RangeKind;
use crate::token::ParsedCommand;
use crate::types::*;

/// # while *test* *command*
///
/// Both words must be braced.  A condition that's constant true compiles to an
/// unconditional loop; one that's constant false to nothing at all.  Otherwise the
/// body comes first and the test at the bottom, entered by an initial jump.
pub(crate) fn compile_while(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    if cmd.num_words() != 3 {
        return Ok(Compiled::Decline);
    }
    let Some(cond) = c.literal(cmd, 1) else {
        return Ok(Compiled::Decline);
    };
    let Some(body) = c.body_range(cmd, 2) else {
        return Ok(Compiled::Decline);
    };

    match Value::get_bool(&cond).ok() {
        Some(false) => {
            c.env.push_literal("");
        }
        Some(true) => {
            let top = c.env.new_label();
            let done = c.env.new_label();

            let range = c.env.open_range(RangeKind::Loop);
            c.env.set_range_target(range, RangeTarget::Break, done);
            c.env.set_range_target(range, RangeTarget::Continue, top);

            c.env.place(top);
            c.compile_script_range(body)?;
            c.env.emit(Opcode::Pop);
            c.env.backward_jump(JumpKind::Always, top);
            c.env.close_range(range)?;

            c.env.place(done);
            c.env.push_literal("");
        }
        None => {
            let top = c.env.new_label();
            let test = c.env.new_label();
            let done = c.env.new_label();

            c.env.jump(JumpKind::Always, test);

            let range = c.env.open_range(RangeKind::Loop);
            c.env.set_range_target(range, RangeTarget::Break, done);
            c.env.set_range_target(range, RangeTarget::Continue, test);

            c.env.place(top);
            c.compile_script_range(body)?;
            c.env.emit(Opcode::Pop);
            c.env.close_range(range)?;

            c.env.place(test);
            c.env.push_literal(&cond);
            c.env.emit(Opcode::ExprStk);
            c.env.backward_jump(JumpKind::IfTrue, top);

            c.env.place(done);
            c.env.push_literal("");
        }
    }

    Ok(Compiled::Done)
}

/// # if *expr1* ?then? *body1* elseif *expr2* ?then? *body2* ... ?else? ?*bodyN*?
///
/// Every condition and body must be braced.
pub(crate) fn compile_if(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let num_words = cmd.num_words();
    let mut words = Vec::with_capacity(num_words);
    for i in 0..num_words {
        match c.literal(cmd, i) {
            Some(text) => words.push(text),
            None => return Ok(Compiled::Decline),
        }
    }

    let mut to_end = Vec::new();
    let mut i = 1;

    loop {
        // FIRST, the condition and its body.
        if i >= num_words {
            return Err(CompileError::BadClause("wrong # args: no expression after \"if\" argument".into()));
        }
        let cond = &words[i];
        i += 1;
        if i < num_words && words[i] == "then" {
            i += 1;
        }
        if i >= num_words {
            return Err(CompileError::BadClause(format!("wrong # args: no script following \"{}\" argument", cond)));
        }
        let Some(body) = c.body_range(cmd, i) else {
            return Ok(Compiled::Decline);
        };
        i += 1;

        c.env.push_literal(cond);
        c.env.emit(Opcode::ExprStk);
        let next = c.env.forward_jump(JumpKind::IfFalse);
        c.compile_script_range(body)?;
        to_end.push(c.env.forward_jump(JumpKind::Always));
        c.env.adjust_depth(-1);
        c.env.resolve_here(next);

        // NEXT, what follows.
        if i >= num_words {
            c.env.push_literal("");
            break;
        }

        match words[i].as_str() {
            "elseif" => {
                i += 1;
            }
            "else" => {
                if i + 2 != num_words {
                    return Err(CompileError::BadClause("wrong # args: no script following \"else\" argument".into()));
                }
                let Some(body) = c.body_range(cmd, i + 1) else {
                    return Ok(Compiled::Decline);
                };
                c.compile_script_range(body)?;
                break;
            }
            _ if i + 1 == num_words => {
                let Some(body) = c.body_range(cmd, i) else {
                    return Ok(Compiled::Decline);
                };
                c.compile_script_range(body)?;
                break;
            }
            _ => return Ok(Compiled::Decline),
        }
    }

    for fixup in to_end {
        c.env.resolve_here(fixup);
    }

    Ok(Compiled::Done)
}

/// # break
///
/// Inside a compiled loop, a jump to the loop's exit; otherwise, raises the exception.
pub(crate) fn compile_break(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    compile_loop_exit(c, cmd, true)
}

/// # continue
pub(crate) fn compile_continue(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    compile_loop_exit(c, cmd, false)
}

fn compile_loop_exit(c: &mut Compiler, cmd: &ParsedCommand, is_break: bool) -> Result<Compiled, CompileError> {
    if cmd.num_words() != 1 {
        return Ok(Compiled::Decline);
    }

    match c.env.innermost_range() {
        Some((RangeKind::Loop, depth, Some(break_label), Some(continue_label))) => {
            // Discard whatever the enclosing commands have pushed so far.
            let extra = c.env.depth() - depth;
            for _ in 0..extra {
                c.env.emit(Opcode::Pop);
            }
            let target = if is_break { break_label } else { continue_label };
            c.env.jump(JumpKind::Always, target);

            // Control never falls through; account for the result the command
            // would have left.
            c.env.adjust_depth(extra as isize + 1);
        }
        _ => {
            c.env.emit(if is_break { Opcode::Break } else { Opcode::Continue });
            c.env.adjust_depth(1);
        }
    }

    Ok(Compiled::Done)
}

/// # expr *expr*
///
/// Only the single-argument form is compiled.
pub(crate) fn compile_expr(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    if cmd.num_words() != 2 {
        return Ok(Compiled::Decline);
    }

    c.compile_word(cmd, 1)?;
    c.env.emit(Opcode::ExprStk);
    Ok(Compiled::Done)
}

#[cfg(test)]
mod tests {
    use crate::compile::compile_for_test;
    use crate::compile::ops;
    use crate::compile::Opcode;
    use crate::compile::RangeKind;

    #[test]
    fn test_while_constant_true() {
        let code = compile_for_test("while 1 {incr i}", false);
        let ops = ops(&code);
        assert!(!ops.contains(&Opcode::ExprStk));
        assert!(ops.contains(&Opcode::Jump1));
        assert_eq!(code.ranges().len(), 1);
        assert_eq!(code.ranges()[0].kind, RangeKind::Loop);
    }

    #[test]
    fn test_while_constant_false() {
        let code = compile_for_test("while 0 {incr i}", false);
        assert_eq!(ops(&code), vec![Opcode::Push1]);
    }

    #[test]
    fn test_while_general() {
        let code = compile_for_test("while {$i < 10} {incr i}", false);
        let ops = ops(&code);
        assert_eq!(ops[0], Opcode::Jump1);
        assert!(ops.contains(&Opcode::ExprStk));
        assert!(ops.contains(&Opcode::JumpTrue1));

        // The constant form is smaller.
        let constant = compile_for_test("while 1 {incr i}", false);
        assert!(constant.instruction_count() < code.instruction_count());
    }

    #[test]
    fn test_while_substituted_declines() {
        let code = compile_for_test("while $cond {incr i}", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
        assert!(code.ranges().is_empty());
    }

    #[test]
    fn test_break_in_loop_is_jump() {
        let code = compile_for_test("while 1 {break}", false);
        assert!(!ops(&code).contains(&Opcode::Break));

        let code = compile_for_test("break", false);
        assert_eq!(ops(&code), vec![Opcode::Break]);
    }

    #[test]
    fn test_break_discards_pending_words() {
        // The break is compiled inside a "puts" invocation's words.
        let code = compile_for_test("while 1 {puts [break]}", false);
        let ops = ops(&code);
        assert!(ops.contains(&Opcode::Pop));
        assert!(!ops.contains(&Opcode::Break));
    }

    #[test]
    fn test_if() {
        let code = compile_for_test("if {$a} {set b 1} elseif {$c} then {set b 2} else {set b 3}", false);
        let ops = ops(&code);
        assert_eq!(ops.iter().filter(|op| **op == Opcode::ExprStk).count(), 2);
        assert_eq!(ops.iter().filter(|op| **op == Opcode::JumpFalse1).count(), 2);
    }
}
