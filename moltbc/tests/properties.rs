//! Behavioral properties of the compiler and the variable engine, checked end to end.
//!
//! Where a command has both a compiled and a generic form, the generic form is reached
//! by naming the command through a variable, which the compiler can't resolve.

use moltbc::compile::env::JumpKind;
use moltbc::compile::CompileEnv;
use moltbc::compile::Opcode;
use moltbc::var::make_link;
use moltbc::var::Var;
use moltbc::var::VarError;
use moltbc::Interp;
use moltbc::Value;
use std::rc::Rc;

fn interp() -> Interp<()> {
    let mut interp = Interp::new();
    for name in ["switch", "try", "string", "subst", "while"] {
        interp
            .set_scalar(name, Value::from(name))
            .expect("set command-name variable");
    }
    interp
}

fn eval(interp: &mut Interp<()>, script: &str) -> Result<String, String> {
    interp
        .eval(script, &mut ())
        .map(|v| v.to_string())
        .map_err(|e| e.value().to_string())
}

/// Evaluates the script as written, and again with `$` in front of the first word so
/// that the command runs generically.  Both must agree.
fn both(script: &str) -> Result<String, String> {
    let compiled = eval(&mut interp(), script);
    let generic = eval(&mut interp(), &format!("${}", script));
    assert_eq!(compiled, generic, "compiled and generic forms differ: {}", script);
    compiled
}

#[test]
fn jump_widths_resolve_in_any_order() {
    const JUMPS: usize = 30;

    let mut env = CompileEnv::new();
    let mut fixups = Vec::new();
    for i in 0..JUMPS {
        fixups.push(Some(env.forward_jump(JumpKind::Always)));
        for j in 0..3 {
            env.push_literal(&format!("pad{}-{}", i, j));
            env.emit(Opcode::Pop);
        }
    }

    // Resolve in a scrambled order; 7 is prime to 30, so every jump is visited once.
    let mut targets = vec![0; JUMPS];
    for step in 0..JUMPS {
        let which = (step * 7) % JUMPS;
        let fixup = fixups[which].take().expect("each jump resolved once");
        targets[which] = env.instruction_count();
        env.resolve_here(fixup);
        env.push_literal(&format!("target{}", which));
        env.emit(Opcode::Pop);
    }

    let code = env.assemble(Rc::from(""), 0, &[]).expect("assemble");
    let insts = code.instructions();
    let jumps: Vec<_> = insts.iter().filter(|i| i.op.is_jump()).collect();
    assert_eq!(jumps.len(), JUMPS);
    assert!(jumps.iter().any(|j| j.op == Opcode::Jump4));

    for (jump, target) in jumps.iter().zip(targets) {
        let dest = (jump.pc as i64 + jump.operands[0]) as usize;
        assert_eq!(dest, insts[target].pc);
    }
}

#[test]
fn switch_first_match_wins() {
    let script = "switch -exact a {a {set r body1} a {set r body2} default {set r body3}}";
    assert_eq!(both(script), Ok("body1".into()));

    let script = "switch -glob abc {a* {set r body1} *c {set r body2}}";
    assert_eq!(both(script), Ok("body1".into()));
}

#[test]
fn switch_fallthrough() {
    assert_eq!(both("switch a {a - b {set r bodyB}}"), Ok("bodyB".into()));
    assert_eq!(both("switch b {a - b {set r bodyB}}"), Ok("bodyB".into()));
    assert_eq!(both("switch c {a - b {set r bodyB}}"), Ok("".into()));
}

#[test]
fn try_trap_matches_error_code_prefix() {
    let handled_by = |code: &str| {
        both(&format!(
            "try {{throw {{{}}} boom}} trap {{FOO BAR}} {{}} {{set r matched}} on error {{}} {{set r other}}",
            code
        ))
    };

    assert_eq!(handled_by("FOO BAR"), Ok("matched".into()));
    assert_eq!(handled_by("FOO BAR BAZ"), Ok("matched".into()));
    assert_eq!(handled_by("FOO"), Ok("other".into()));
    assert_eq!(handled_by("QUX BAR"), Ok("other".into()));
}

#[test]
fn subst_handles_loop_and_return_codes() {
    // break truncates, continue substitutes nothing, return substitutes its value.
    assert_eq!(both("subst {a[break]b}"), Ok("a".into()));
    assert_eq!(both("subst {a[continue]b}"), Ok("ab".into()));
    assert_eq!(both("subst {a[return z]b}"), Ok("azb".into()));
    assert_eq!(both("subst {abc,[return foo;expr 1+2],def}"), Ok("abc,foo,def".into()));
    assert_eq!(both("subst {x[set y 1][break][set y 2]}"), Ok("x1".into()));
    assert_eq!(both("subst {a[error boom]b}"), Err("boom".into()));
}

#[test]
fn try_finally_always_runs() {
    let mut interp = interp();

    // Success
    assert_eq!(eval(&mut interp, "set ran 0; try {set x 1} finally {set ran 1}"), Ok("1".into()));
    assert_eq!(eval(&mut interp, "set ran"), Ok("1".into()));

    // Failure
    assert_eq!(
        eval(&mut interp, "set ran 0; catch {try {error boom} finally {set ran 1}} msg"),
        Ok("1".into())
    );
    assert_eq!(eval(&mut interp, "list $msg $ran"), Ok("boom 1".into()));

    // Break and continue out of an enclosing loop
    assert_eq!(
        eval(&mut interp, "set n 0; while 1 {try {break} finally {incr n}}; set n"),
        Ok("1".into())
    );
    assert_eq!(
        eval(
            &mut interp,
            "set i 0; set n 0; while {$i < 3} {incr i; try {continue} finally {incr n}}; set n"
        ),
        Ok("3".into())
    );
    assert_eq!(
        eval(
            &mut interp,
            "set n 0; while 1 {$try {break} finally {incr n}}; set n"
        ),
        Ok("1".into())
    );
}

#[test]
fn try_finally_failure_overrides_outcome() {
    for prefix in ["", "$"] {
        let mut interp = interp();
        let script = format!(
            "catch {{{}try {{error first}} finally {{error second}}}} msg opts",
            prefix
        );
        assert_eq!(eval(&mut interp, &script), Ok("1".into()));
        assert_eq!(eval(&mut interp, "set msg"), Ok("second".into()));
        assert_eq!(
            eval(&mut interp, "dict get [dict get $opts -during] -code"),
            Ok("1".into())
        );
    }
}

#[cfg(feature = "compile-commands")]
#[test]
fn while_constant_condition_is_branch_reduced() {
    let mut interp = interp();
    let body = "{incr i; if {$i >= 5} break}";
    let constant = interp.compile(&format!("while 1 {}", body)).expect("compile");
    let general = interp.compile(&format!("while {{$x}} {}", body)).expect("compile");
    assert_ne!(constant.instruction_count(), general.instruction_count());

    assert_eq!(eval(&mut interp, &format!("set i 0; while 1 {}; set i", body)), Ok("5".into()));
    assert_eq!(
        eval(&mut interp, &format!("set x 1; set i 0; while {{$x}} {}; set i", body)),
        Ok("5".into())
    );
}

#[test]
fn array_element_round_trip() {
    let mut interp = interp();
    assert_eq!(eval(&mut interp, "set a(e) written; set a(e)"), Ok("written".into()));

    assert_eq!(
        eval(&mut interp, "set a(f) 1; set a(g)"),
        Err("can't read \"a(g)\": no such element in array".into())
    );

    eval(&mut interp, "unset a").expect("unset array");
    assert_eq!(
        eval(&mut interp, "set a(e)"),
        Err("can't read \"a(e)\": no such variable".into())
    );
    assert_eq!(
        eval(&mut interp, "catch {set a(e)}; list [lindex $errorCode 0] [lindex $errorCode 1] [lindex $errorCode 2]"),
        Ok("TCL LOOKUP VARNAME".into())
    );
}

#[test]
fn array_search_tolerates_removal() {
    let mut interp = interp();
    let search = |victim_after: &str| {
        format!(
            "array unset a; array set a {{x 1 y 2 z 3}}
            set s [array startsearch a]
            set seen {{}}
            while {{[array anymore a $s]}} {{
                set k [array nextelement a $s]
                lappend seen $k
                if {{$k eq \"{}\"}} {{unset a($victim)}}
            }}
            array donesearch a $s
            list $seen [array names a]",
            victim_after
        )
    };

    // Deleting an element the cursor hasn't reached yet
    eval(&mut interp, "set victim z").expect("set");
    assert_eq!(eval(&mut interp, &search("x")), Ok("{x y} {x y}".into()));

    // Deleting one it has passed
    eval(&mut interp, "set victim x").expect("set");
    assert_eq!(eval(&mut interp, &search("y")), Ok("{x y z} {y z}".into()));
}

#[test]
fn link_to_self_is_rejected() {
    let var = Var::new_ref(true);
    assert_eq!(make_link(&var, &var, "v"), Err(VarError::SelfAlias));

    let mut interp = interp();
    assert_eq!(
        eval(&mut interp, "upvar 0 v v"),
        Err("can't upvar from variable to itself".into())
    );
    assert_eq!(
        eval(&mut interp, "set w 1; upvar 0 w w"),
        Err("can't upvar from variable to itself".into())
    );
    assert_eq!(
        eval(&mut interp, "proc p {} {upvar 0 loc loc}; p"),
        Err("can't upvar from variable to itself".into())
    );
}

#[test]
fn string_replace_truth_table() {
    let cases = [
        ("abcdef 1 2 XY", "aXYdef"),
        ("abcdef 2 1 XY", "abcdef"),
        ("abcdef 10 12 XY", "abcdef"),
        ("abcdef -3 -1 XY", "abcdef"),
        ("abcdef -1 0 XY", "XYbcdef"),
        ("abcdef 4 end", "abcd"),
        ("abcdef 4 end+5 Z", "abcdZ"),
        ("abcdef end-1 end ZZ", "abcdZZ"),
        ("abcdef 3 2 X", "abcdef"),
        ("{} 0 0 X", ""),
    ];

    for (args, expected) in cases {
        assert_eq!(
            both(&format!("string replace {}", args)),
            Ok(expected.to_string()),
            "string replace {}",
            args
        );

        // Again with the subject known only at run time.
        let (subject, indices) = args.split_once(' ').unwrap_or((args, ""));
        let mut interp = interp();
        let script = format!("set s {}; string replace $s {}", subject, indices);
        assert_eq!(eval(&mut interp, &script), Ok(expected.to_string()), "{}", script);
    }
}
