//! End-to-end scripts that mix compiled commands, procedures and the variable engine.

use moltbc::Interp;
use moltbc::Value;

fn eval(interp: &mut Interp<()>, script: &str) -> Result<Value, String> {
    interp
        .eval(script, &mut ())
        .map_err(|e| e.value().to_string())
}

#[test]
fn switch_with_fallthrough_and_default() {
    let mut interp = Interp::new();
    let script = "switch -exact $x {a {set r 1} b - c {set r 2} default {set r 0}}";

    for (x, r) in [("a", "1"), ("b", "2"), ("c", "2"), ("q", "0")] {
        interp.set_scalar("x", Value::from(x)).expect("set x");
        eval(&mut interp, script).expect("switch");
        assert_eq!(interp.scalar("r"), Ok(Value::from(r)), "x = {}", x);
    }
}

#[test]
fn try_trap_binds_options_and_runs_finally() {
    let mut interp = Interp::new();
    let script = "try {error boom {} {MY ERR SPECIFIC}} trap {MY ERR} {e o} {set got $o} finally {set ran 1}";

    eval(&mut interp, script).expect("try");
    assert_eq!(interp.scalar("e"), Ok(Value::from("boom")));
    assert_eq!(interp.scalar("ran"), Ok(Value::from("1")));
    assert_eq!(
        eval(&mut interp, "dict get $got -errorcode"),
        Ok(Value::from("MY ERR SPECIFIC"))
    );
    assert_eq!(eval(&mut interp, "dict get $got -code"), Ok(Value::from("1")));
}

#[test]
fn procedures_with_links_and_loops() {
    let mut interp = Interp::new();
    let script = r#"
        proc sum_into {varName args} {
            upvar 1 $varName total
            foreach_index i $args
            return $total
        }
        proc foreach_index {name list} {
            upvar 1 $name i total total
            set i 0
            while {$i < [llength $list]} {
                incr total [lindex $list $i]
                incr i
            }
        }
        set total 10
        sum_into total 1 2 3
    "#;
    assert_eq!(eval(&mut interp, script), Ok(Value::from("16")));
    assert_eq!(interp.scalar("total"), Ok(Value::from("16")));
}

#[test]
fn namespace_variables_and_globals() {
    let mut interp = Interp::new();
    let script = r#"
        namespace eval counter {
            variable count 0
        }
        proc bump {} {
            global hits
            incr hits
            incr ::counter::count 2
        }
        set hits 0
        bump
        bump
        list $hits $::counter::count
    "#;
    assert_eq!(eval(&mut interp, script), Ok(Value::from("2 4")));

    eval(&mut interp, "namespace delete counter").expect("delete");
    assert_eq!(
        eval(&mut interp, "namespace exists counter"),
        Ok(Value::from("0"))
    );
}

#[cfg(feature = "error-stack-trace")]
#[test]
fn errors_carry_a_trace() {
    let mut interp = Interp::new();
    let script = r#"
        proc inner {} {
            error "deep failure"
        }
        proc outer {} {
            inner
        }
        catch {outer} msg opts
        dict get $opts -errorinfo
    "#;

    let info = eval(&mut interp, script).expect("catch");
    let info = info.as_str();
    assert!(info.starts_with("deep failure"), "{}", info);
    assert!(info.contains("(procedure \"inner\" line 2)"), "{}", info);
    assert!(info.contains("invoked from within"), "{}", info);
    assert_eq!(interp.scalar("msg"), Ok(Value::from("deep failure")));
}

#[test]
fn subst_and_string_pipeline() {
    let mut interp = Interp::new();
    let script = r#"
        set name World
        set greeting [subst {Hello, $name! [string toupper $name]}]
        string map {World Tcl} $greeting
    "#;
    assert_eq!(eval(&mut interp, script), Ok(Value::from("Hello, Tcl! WORLD")));

    assert_eq!(
        eval(&mut interp, "string range [string trim {  padded  }] 1 end-1"),
        Ok(Value::from("adde"))
    );
    assert_eq!(eval(&mut interp, "string first b abcabc 2"), Ok(Value::from("4")));
    assert_eq!(eval(&mut interp, "string is integer -strict 42"), Ok(Value::from("1")));
}

#[cfg(feature = "regexp")]
#[test]
fn regexp_and_regsub() {
    let mut interp = Interp::new();
    assert_eq!(
        eval(&mut interp, "regexp {^(\\w+)@(\\w+)$} user@host -> who where; list $who $where"),
        Ok(Value::from("user host"))
    );
    assert_eq!(
        eval(&mut interp, "regsub -all {o} {foo boo} 0"),
        Ok(Value::from("f00 b00"))
    );
    assert_eq!(
        eval(&mut interp, "switch -regexp abc123 {{^[a-z]+$} {set r letters} {\\d+$} {set r digits}}"),
        Ok(Value::from("digits"))
    );
}

#[test]
fn cached_bytecode_sees_redefined_commands() {
    let mut interp = Interp::new();
    let script = Value::from("set v 1; incr v");
    assert_eq!(interp.eval_value(&script, &mut ()), Ok(Value::from(2)));

    // Replacing a compiled command invalidates the cached bytecode.
    eval(&mut interp, "proc incr {name} {upvar 1 $name v; set v incremented}").expect("proc");
    assert_eq!(
        interp.eval_value(&script, &mut ()),
        Ok(Value::from("incremented"))
    );
}
