//! Compiler for `try`.
//!
//! The body runs under a catch range.  Whether it completes normally or not, control
//! reaches the handler tests with three items on the stack: the result, the return
//! options, and the completion code.  A normal completion has code 0 and can match
//! `on ok`.  If no handler matches, the outcome is re-raised from the options.
//!
//! A `finally` script runs under a second catch range covering the body and the
//! handlers.  If the `finally` script itself fails, its exception replaces the
//! original, with the original's options recorded as `-during`.

use crate::compile::env::JumpKind;
use crate::compile::env::Label;
use crate::compile::env::RangeId;
use crate::compile::env::RangeTarget;
use crate::compile::vars::store_top;
use crate::compile::Compiled;
use crate::compile::CompileError;
use crate::compile::Compiler;
use crate::compile::Opcode;
use crate::compile::RangeKind;
use crate::compile::ScriptRange;
use crate::list;
use crate::token::ParsedCommand;
use crate::types::*;

const OK_OPTIONS: &str = "-code 0 -level 0";

enum Test {
    /// `on code`
    Code(MoltInt),

    /// `trap pattern`: an error whose `-errorcode` begins with the pattern.
    Trap(String),
}

struct Handler {
    test: Test,
    vars: Vec<String>,

    /// `None` for `-`, which uses the next handler's body.
    body: Option<ScriptRange>,
}

/// # try *body* ?*handler* ...? ?finally *script*?
pub(crate) fn compile_try(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let num_words = cmd.num_words();
    if num_words < 2 {
        return Ok(Compiled::Decline);
    }
    let Some(body) = c.body_range(cmd, 1) else {
        return Ok(Compiled::Decline);
    };

    // FIRST, parse the handlers.
    let mut handlers = Vec::new();
    let mut finally = None;
    let mut i = 2;

    while i < num_words {
        let Some(keyword) = c.literal(cmd, i) else {
            return Ok(Compiled::Decline);
        };

        match keyword.as_str() {
            "on" | "trap" => {
                if i + 3 >= num_words {
                    return Err(CompileError::BadClause(format!(
                        "wrong # args to {} clause: must be \"... {} {} variableList script\"",
                        keyword,
                        keyword,
                        if keyword == "on" { "code" } else { "pattern" }
                    )));
                }
                let Some(spec) = c.literal(cmd, i + 1) else {
                    return Ok(Compiled::Decline);
                };
                let test = if keyword == "on" {
                    match ResultCode::from_value(&Value::from(spec.as_str())) {
                        Ok(code) => Test::Code(code.as_int()),
                        Err(ex) => return Err(CompileError::BadClause(ex.value().as_str().into())),
                    }
                } else {
                    Test::Trap(spec)
                };

                let Some(var_list) = c.literal(cmd, i + 2) else {
                    return Ok(Compiled::Decline);
                };
                let vars: Vec<String> = match list::get_list(&var_list) {
                    Ok(vars) if vars.len() <= 2 => vars.iter().map(|v| v.as_str().to_string()).collect(),
                    _ => return Ok(Compiled::Decline),
                };

                let body = if c.literal(cmd, i + 3).as_deref() == Some("-") {
                    None
                } else {
                    match c.body_range(cmd, i + 3) {
                        Some(range) => Some(range),
                        None => return Ok(Compiled::Decline),
                    }
                };

                handlers.push(Handler { test, vars, body });
                i += 4;
            }
            "finally" => {
                if i + 2 != num_words {
                    return Err(CompileError::BadClause(
                        "finally clause must be last and have a script".into(),
                    ));
                }
                match c.body_range(cmd, i + 1) {
                    Some(range) => finally = Some(range),
                    None => return Ok(Compiled::Decline),
                }
                i += 2;
            }
            _ => {
                return Err(CompileError::BadClause(format!(
                    "bad handler \"{}\": must be finally, on, or trap",
                    keyword
                )));
            }
        }
    }

    if handlers.last().map(|h| h.body.is_none()).unwrap_or(false) {
        return Err(CompileError::BadClause(
            "last non-finally clause must not have a body of \"-\"".into(),
        ));
    }

    // NEXT, generate the code.
    let outer = finally.map(|_| c.env.open_range(RangeKind::Catch));

    if handlers.is_empty() {
        c.compile_script_range(body)?;
    } else {
        compile_handlers(c, body, &handlers)?;
    }

    if let (Some(outer), Some(finally)) = (outer, finally) {
        compile_finally(c, outer, finally)?;
    }

    Ok(Compiled::Done)
}

/// Compiles the body and the handlers.
fn compile_handlers(c: &mut Compiler, body: ScriptRange, handlers: &[Handler]) -> Result<(), CompileError> {
    let caught = c.env.new_label();
    let dispatch = c.env.new_label();
    let end = c.env.new_label();

    let range = c.env.open_range(RangeKind::Catch);
    c.env.set_range_target(range, RangeTarget::Catch, caught);
    c.compile_script_range(body)?;
    c.env.close_range(range)?;

    c.env.push_literal(OK_OPTIONS);
    c.env.push_literal("0");
    c.env.jump(JumpKind::Always, dispatch);
    c.env.adjust_depth(-3);

    c.env.place(caught);
    c.env.emit(Opcode::PushResult);
    c.env.emit(Opcode::PushReturnOptions);
    c.env.emit(Opcode::PushReturnCode);

    c.env.place(dispatch);

    // Each handler's body label, or the label of the body it falls through to.
    let mut targets: Vec<Option<Label>> = Vec::with_capacity(handlers.len());
    let mut target = None;
    for handler in handlers.iter().rev() {
        if handler.body.is_some() {
            target = Some(c.env.new_label());
        }
        targets.push(target);
    }
    targets.reverse();

    for (handler, target) in handlers.iter().zip(&targets) {
        let next = c.env.new_label();

        // The test, with [result options code] on the stack.
        match &handler.test {
            Test::Code(code) => {
                c.env.emit(Opcode::Dup);
                c.env.push_literal(&code.to_string());
                c.env.emit(Opcode::Eq);
                c.env.jump(JumpKind::IfFalse, next);
            }
            Test::Trap(prefix) => {
                c.env.emit(Opcode::Dup);
                c.env.push_literal("1");
                c.env.emit(Opcode::Eq);
                c.env.jump(JumpKind::IfFalse, next);
                c.env.emit_int1(Opcode::Over, 1);
                c.env.push_literal(prefix);
                c.env.emit(Opcode::ErrCodePrefix);
                c.env.jump(JumpKind::IfFalse, next);
            }
        }

        // Matched: store the variables, leaving the stack as it was before the try.
        c.env.emit(Opcode::Pop);
        if let Some(name) = handler.vars.get(1) {
            store_top(c, name);
        }
        c.env.emit(Opcode::Pop);
        if let Some(name) = handler.vars.first() {
            store_top(c, name);
        }
        c.env.emit(Opcode::Pop);

        match (handler.body, *target) {
            (Some(body), Some(target)) => {
                c.env.place(target);
                c.compile_script_range(body)?;
                c.env.jump(JumpKind::Always, end);
                c.env.adjust_depth(-1);
            }
            (None, Some(target)) => c.env.jump(JumpKind::Always, target),
            (_, None) => return Err(CompileError::UnplacedLabel),
        }

        c.env.place(next);
        c.env.adjust_depth(3);
    }

    // Nothing matched: complete as the body did.
    c.env.emit(Opcode::Pop);
    c.env.emit(Opcode::ReturnStk);

    c.env.place(end);
    Ok(())
}

/// Compiles the `finally` script, given the open range covering the body and the
/// handlers.
fn compile_finally(c: &mut Compiler, outer: RangeId, finally: ScriptRange) -> Result<(), CompileError> {
    let caught = c.env.new_label();
    let run_finally = c.env.new_label();
    let finally_failed = c.env.new_label();
    let done = c.env.new_label();

    c.env.set_range_target(outer, RangeTarget::Catch, caught);
    c.env.close_range(outer)?;

    // [result options], however the body and handlers completed.
    c.env.push_literal(OK_OPTIONS);
    c.env.jump(JumpKind::Always, run_finally);
    c.env.adjust_depth(-2);

    c.env.place(caught);
    c.env.emit(Opcode::PushResult);
    c.env.emit(Opcode::PushReturnOptions);

    c.env.place(run_finally);
    let range = c.env.open_range(RangeKind::Catch);
    c.env.set_range_target(range, RangeTarget::Catch, finally_failed);
    c.compile_script_range(finally)?;
    c.env.close_range(range)?;
    c.env.emit(Opcode::Pop);
    c.env.emit(Opcode::ReturnStk);
    c.env.jump(JumpKind::Always, done);

    // The finally script failed: raise its exception, noting the original.
    c.env.place(finally_failed);
    c.env.adjust_depth(1);
    c.env.emit(Opcode::PushResult);
    c.env.emit(Opcode::PushReturnOptions);
    c.env.push_literal("-during");
    c.env.emit_int1(Opcode::Over, 3);
    c.env.emit(Opcode::DictSet);
    c.env.emit(Opcode::ReturnStk);
    c.env.adjust_depth(-2);

    c.env.place(done);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::compile::compile_for_test;
    use crate::compile::ops;
    use crate::compile::Opcode;
    use crate::compile::RangeKind;

    #[test]
    fn test_plain_body() {
        let code = compile_for_test("try {set a 1}", false);
        assert!(code.ranges().is_empty());
    }

    #[test]
    fn test_handlers() {
        let code = compile_for_test("try {error x} on error {msg opts} {set a $msg} trap {A B} {} {set b 1}", false);
        assert_eq!(code.ranges().len(), 1);
        assert_eq!(code.ranges()[0].kind, RangeKind::Catch);

        let ops = ops(&code);
        assert!(ops.contains(&Opcode::PushReturnCode));
        assert!(ops.contains(&Opcode::ErrCodePrefix));
        assert!(ops.contains(&Opcode::ReturnStk));
    }

    #[test]
    fn test_finally() {
        let code = compile_for_test("try {set a 1} on ok {} {set b 2} finally {set c 3}", false);
        assert_eq!(code.ranges().len(), 3);
        assert!(ops(&code).contains(&Opcode::DictSet));

        // The outer range encloses the inner one.
        let nestings: Vec<usize> = code.ranges().iter().map(|r| r.nesting).collect();
        assert!(nestings.contains(&0));
        assert!(nestings.contains(&1));
    }

    #[test]
    fn test_bad_clause_declines() {
        let code = compile_for_test("try {set a 1} oops", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));

        let code = compile_for_test("try {set a 1} on error {} -", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
    }
}
