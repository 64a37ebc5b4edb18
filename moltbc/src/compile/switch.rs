//! Compiler for `switch`.
//!
//! Exact matching compiles to a jump table.  Glob and regular expression matching
//! compile to a chain of tests, one per pattern, with the string kept on the stack
//! until a body is chosen.

use crate::compile::env::JumpKind;
use crate::compile::env::Label;
use crate::compile::regexp::emit_regexp_test;
use crate::compile::Compiled;
use crate::compile::CompileError;
use crate::compile::Compiler;
use crate::compile::Opcode;
use crate::compile::ScriptRange;
use crate::token::ParsedCommand;
use crate::types::*;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Mode {
    Exact,
    Glob,
    Regexp,
}

/// One pattern and its body; `None` for `-`, which falls through to the next body.
struct Arm {
    pattern: String,
    body: Option<ScriptRange>,
}

/// # switch ?options? *string* *pattern* *body* ?*pattern* *body* ...?
/// # switch ?options? *string* {*pattern* *body* ?*pattern* *body* ...?}
pub(crate) fn compile_switch(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let num_words = cmd.num_words();
    let mut mode = Mode::Exact;
    let mut nocase = false;
    let mut i = 1;

    // FIRST, the options.
    while i < num_words {
        let Some(word) = c.literal(cmd, i) else {
            break;
        };
        if !word.starts_with('-') {
            break;
        }
        match word.as_str() {
            "-exact" => mode = Mode::Exact,
            "-glob" => mode = Mode::Glob,
            "-regexp" => mode = Mode::Regexp,
            "-nocase" => nocase = true,
            "--" => {
                i += 1;
                break;
            }
            _ => return Ok(Compiled::Decline),
        }
        i += 1;
    }

    if i >= num_words {
        return Ok(Compiled::Decline);
    }
    let string_word = i;
    i += 1;

    // NEXT, the arms, in either form.
    let mut arms = Vec::new();
    if num_words - i == 1 {
        let Some(elements) = c.literal_list(cmd, i) else {
            return Ok(Compiled::Decline);
        };
        if elements.len() % 2 != 0 {
            return Err(CompileError::BadClause("extra switch pattern with no body".into()));
        }
        for pair in elements.chunks(2) {
            let body = if pair[1].0 == "-" {
                None
            } else {
                match pair[1].1 {
                    Some(range) => Some(range),
                    None => return Ok(Compiled::Decline),
                }
            };
            arms.push(Arm {
                pattern: pair[0].0.clone(),
                body,
            });
        }
    } else {
        if (num_words - i) % 2 != 0 {
            return Err(CompileError::BadClause("extra switch pattern with no body".into()));
        }
        while i < num_words {
            let Some(pattern) = c.literal(cmd, i) else {
                return Ok(Compiled::Decline);
            };
            let body = if c.literal(cmd, i + 1).as_deref() == Some("-") {
                None
            } else {
                match c.body_range(cmd, i + 1) {
                    Some(range) => Some(range),
                    None => return Ok(Compiled::Decline),
                }
            };
            arms.push(Arm { pattern, body });
            i += 2;
        }
    }

    match arms.last() {
        None => return Err(CompileError::BadClause("wrong # args: should be \"switch ?-option ...? string {?pattern body ...? ?default body?}\"".into())),
        Some(arm) if arm.body.is_none() => {
            return Err(CompileError::BadClause(format!(
                "no body specified for pattern \"{}\"",
                arm.pattern
            )));
        }
        _ => (),
    }

    // NEXT, the body each arm runs: its own, or the next real one.
    let mut body_labels: Vec<Option<Label>> = Vec::with_capacity(arms.len());
    let mut target = None;
    let mut targets = vec![None; arms.len()];
    for (index, arm) in arms.iter().enumerate().rev() {
        if arm.body.is_some() {
            target = Some(c.env.new_label());
        }
        targets[index] = target;
    }
    for (index, arm) in arms.iter().enumerate() {
        body_labels.push(if arm.body.is_some() { targets[index] } else { None });
    }

    let default = arms
        .last()
        .filter(|arm| arm.pattern == "default")
        .and(targets.last().copied().flatten());
    let tested = if default.is_some() { arms.len() - 1 } else { arms.len() };

    c.compile_word(cmd, string_word)?;

    match mode {
        Mode::Exact if !nocase => compile_jump_table(c, &arms, &targets, &body_labels, default, tested)?,
        Mode::Exact => return Ok(Compiled::Decline),
        _ => {
            if !compile_chain(c, &arms, &targets, &body_labels, default, tested, mode, nocase)? {
                return Ok(Compiled::Decline);
            }
        }
    }

    Ok(Compiled::Done)
}

/// Exact matching: the table dispatches straight to the bodies.  The first of
/// duplicate patterns wins.
fn compile_jump_table(
    c: &mut Compiler,
    arms: &[Arm],
    targets: &[Option<Label>],
    body_labels: &[Option<Label>],
    default: Option<Label>,
    tested: usize,
) -> Result<(), CompileError> {
    let mut table: IndexMap<String, Label, MoltHasher> = IndexMap::default();
    for (arm, target) in arms.iter().zip(targets).take(tested) {
        if let Some(target) = target {
            if !table.contains_key(&arm.pattern) {
                table.insert(arm.pattern.clone(), *target);
            }
        }
    }

    let done = c.env.new_label();
    c.env.emit_jump_table(table);

    match default {
        Some(label) => c.env.jump(JumpKind::Always, label),
        None => {
            c.env.push_literal("");
            c.env.jump(JumpKind::Always, done);
            c.env.adjust_depth(-1);
        }
    }

    for (arm, label) in arms.iter().zip(body_labels) {
        if let (Some(body), Some(label)) = (arm.body, label) {
            c.env.place(*label);
            c.compile_script_range(body)?;
            c.env.jump(JumpKind::Always, done);
            c.env.adjust_depth(-1);
        }
    }

    c.env.place(done);
    c.env.adjust_depth(1);
    Ok(())
}

/// Glob and regular expression matching: test each pattern in turn against the
/// string, which stays on the stack until a body pops it.
#[allow(clippy::too_many_arguments)]
fn compile_chain(
    c: &mut Compiler,
    arms: &[Arm],
    targets: &[Option<Label>],
    body_labels: &[Option<Label>],
    default: Option<Label>,
    tested: usize,
    mode: Mode,
    nocase: bool,
) -> Result<bool, CompileError> {
    let done = c.env.new_label();

    for (arm, target) in arms.iter().zip(targets).take(tested) {
        let Some(target) = target else {
            continue;
        };
        match mode {
            Mode::Regexp => {
                if !emit_regexp_test(c, &arm.pattern, nocase) {
                    return Ok(false);
                }
            }
            _ => {
                c.env.push_literal(&arm.pattern);
                c.env.emit_int1(Opcode::Over, 1);
                c.env.emit_int1(Opcode::StrMatch, nocase as u8);
            }
        }
        c.env.jump(JumpKind::IfTrue, *target);
    }

    match default {
        Some(label) => c.env.jump(JumpKind::Always, label),
        None => {
            c.env.emit(Opcode::Pop);
            c.env.push_literal("");
            c.env.jump(JumpKind::Always, done);
        }
    }

    for (arm, label) in arms.iter().zip(body_labels) {
        if let (Some(body), Some(label)) = (arm.body, label) {
            // Entered with the string on the stack.
            c.env.place(*label);
            c.env.emit(Opcode::Pop);
            c.compile_script_range(body)?;
            c.env.jump(JumpKind::Always, done);
        }
    }

    c.env.place(done);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::compile::compile_for_test;
    use crate::compile::ops;
    use crate::compile::Opcode;

    #[test]
    fn test_exact_uses_jump_table() {
        let code = compile_for_test("switch $x {a {set y 1} b - c {set y 2} default {set y 3}}", false);
        let ops = ops(&code);
        assert!(ops.contains(&Opcode::JumpTable));

        let table = code.jump_table(0).unwrap();
        let keys: Vec<&str> = table.entries.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        // "b" falls through to "c"'s body.
        assert_eq!(table.entries["b"], table.entries["c"]);
    }

    #[test]
    fn test_first_duplicate_wins() {
        let code = compile_for_test("switch $x a {set y 1} a {set y 2}", false);
        let table = code.jump_table(0).unwrap();
        assert_eq!(table.entries.len(), 1);
    }

    #[test]
    fn test_glob_chain() {
        let code = compile_for_test("switch -glob $x {a* {set y 1} default {set y 2}}", false);
        let ops = ops(&code);
        assert!(ops.contains(&Opcode::StrMatch));
        assert!(!ops.contains(&Opcode::JumpTable));
    }

    #[test]
    fn test_nocase_exact_declines() {
        let code = compile_for_test("switch -nocase $x {a {set y 1}}", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
    }

    #[test]
    fn test_missing_body_declines() {
        let code = compile_for_test("switch $x {a -}", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
    }
}
