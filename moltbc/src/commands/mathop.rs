//! The math operator commands: `+`, `-`, `*`, `/`, `**`, the comparisons, and the
//! bitwise and logical operators, as in `::tcl::mathop`.

use crate::check_args;
use crate::expr::binary_op;
use crate::expr::unary_op;
use crate::expr::BinOp;
use crate::expr::UnOp;
use crate::interp::Interp;
use crate::types::*;

/// The operator commands, by name.
pub(crate) fn commands<Ctx>() -> Vec<(&'static str, CommandFunc<Ctx>)> {
    vec![
        ("+", cmd_add),
        ("*", cmd_mult),
        ("&", cmd_bitand),
        ("|", cmd_bitor),
        ("^", cmd_bitxor),
        ("-", cmd_sub),
        ("/", cmd_div),
        ("**", cmd_expon),
        ("%", cmd_mod),
        ("<<", cmd_lshift),
        (">>", cmd_rshift),
        ("==", cmd_eq),
        ("<", cmd_lt),
        ("<=", cmd_le),
        (">", cmd_gt),
        (">=", cmd_ge),
        ("eq", cmd_streq),
        ("!=", cmd_neq),
        ("ne", cmd_strneq),
        ("in", cmd_in),
        ("ni", cmd_ni),
        ("!", cmd_not),
        ("~", cmd_bitnot),
    ]
}

macro_rules! op_command {
    ($name:ident, $shape:ident, $($arg:expr),*) => {
        fn $name<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
            $shape(argv, $($arg),*).map(Some)
        }
    };
}

op_command!(cmd_add, fold, BinOp::Add, 0);
op_command!(cmd_mult, fold, BinOp::Mul, 1);
op_command!(cmd_bitand, fold, BinOp::BitAnd, -1);
op_command!(cmd_bitor, fold, BinOp::BitOr, 0);
op_command!(cmd_bitxor, fold, BinOp::BitXor, 0);
op_command!(cmd_sub, left_assoc, BinOp::Sub);
op_command!(cmd_div, left_assoc, BinOp::Div);
op_command!(cmd_expon, right_assoc, BinOp::Pow);
op_command!(cmd_mod, binary, BinOp::Mod, "integer integer");
op_command!(cmd_lshift, binary, BinOp::Shl, "integer shiftAmount");
op_command!(cmd_rshift, binary, BinOp::Shr, "integer shiftAmount");
op_command!(cmd_eq, comparison, BinOp::Eq);
op_command!(cmd_lt, comparison, BinOp::Lt);
op_command!(cmd_le, comparison, BinOp::Le);
op_command!(cmd_gt, comparison, BinOp::Gt);
op_command!(cmd_ge, comparison, BinOp::Ge);
op_command!(cmd_streq, comparison, BinOp::StrEq);
op_command!(cmd_neq, binary, BinOp::Ne, "value value");
op_command!(cmd_strneq, binary, BinOp::StrNe, "value value");
op_command!(cmd_in, binary, BinOp::In, "value list");
op_command!(cmd_ni, binary, BinOp::Ni, "value list");
op_command!(cmd_not, unary, UnOp::Not, "boolean");
op_command!(cmd_bitnot, unary, UnOp::BitNot, "integer");

/// An associative operator: no arguments give the identity; one argument is combined
/// with the identity, which checks that it's numeric.
fn fold(argv: &[Value], op: BinOp, identity: MoltInt) -> MoltResult {
    let identity = Value::from(identity);

    match argv.len() {
        1 => Ok(identity),
        2 => binary_op(op, &argv[1], &identity),
        _ => {
            let mut acc = argv[1].clone();
            for arg in &argv[2..] {
                acc = binary_op(op, &acc, arg)?;
            }
            Ok(acc)
        }
    }
}

/// `-` and `/`: one argument negates or takes the reciprocal; several are combined
/// left to right.
fn left_assoc(argv: &[Value], op: BinOp) -> MoltResult {
    match argv.len() {
        1 => molt_throw!(
            "TCL WRONGARGS" => "wrong # args: should be \"{} value ?value ...?\"",
            argv[0]
        ),
        2 if op == BinOp::Sub => unary_op(UnOp::Minus, &argv[1]),
        2 => binary_op(op, &Value::from(1.0), &argv[1]),
        _ => {
            let mut acc = argv[1].clone();
            for arg in &argv[2..] {
                acc = binary_op(op, &acc, arg)?;
            }
            Ok(acc)
        }
    }
}

/// `**` groups to the right.
fn right_assoc(argv: &[Value], op: BinOp) -> MoltResult {
    let one = Value::from(1);

    match argv.len() {
        1 => Ok(one),
        2 => binary_op(op, &argv[1], &one),
        _ => {
            let mut acc = argv[argv.len() - 1].clone();
            for arg in argv[1..argv.len() - 1].iter().rev() {
                acc = binary_op(op, arg, &acc)?;
            }
            Ok(acc)
        }
    }
}

fn binary(argv: &[Value], op: BinOp, argsig: &str) -> MoltResult {
    check_args(1, argv, 3, 3, argsig)?;
    binary_op(op, &argv[1], &argv[2])
}

/// A comparison holds if it holds of each adjacent pair; it's trivially true of fewer
/// than two arguments.
fn comparison(argv: &[Value], op: BinOp) -> MoltResult {
    for pair in argv[1..].windows(2) {
        if !binary_op(op, &pair[0], &pair[1])?.as_bool()? {
            return Ok(Value::from(false));
        }
    }
    Ok(Value::from(true))
}

fn unary(argv: &[Value], op: UnOp, argsig: &str) -> MoltResult {
    check_args(1, argv, 2, 2, argsig)?;
    unary_op(op, &argv[1])
}

#[cfg(test)]
mod tests {
    use crate::interp::Interp;
    use crate::types::*;

    /// Invokes an operator command by a computed name, so that it isn't compiled.
    fn op(script: &str) -> MoltResult {
        let mut interp = Interp::new();
        let (name, args) = script.split_once(' ').unwrap_or((script, ""));
        interp.set_scalar("op", Value::from(name)).unwrap();
        interp.eval(&format!("$op {}", args), &mut ())
    }

    #[test]
    fn test_fold() {
        assert_eq!(op("+"), Ok(Value::from(0)));
        assert_eq!(op("+ 5"), Ok(Value::from(5)));
        assert_eq!(op("+ 1 2 3"), Ok(Value::from(6)));
        assert_eq!(op("*"), Ok(Value::from(1)));
        assert_eq!(op("& 12 10"), Ok(Value::from(8)));
        assert!(op("+ a").is_err());
    }

    #[test]
    fn test_left_assoc() {
        assert_eq!(op("- 10 2 3"), Ok(Value::from(5)));
        assert_eq!(op("- 4"), Ok(Value::from(-4)));
        assert_eq!(op("/ 2"), Ok(Value::from(0.5)));
        assert_eq!(op("/ 20 2 5"), Ok(Value::from(2)));
        assert!(op("-").is_err());
    }

    #[test]
    fn test_right_assoc() {
        assert_eq!(op("** 2 3 2"), Ok(Value::from(512)));
        assert_eq!(op("**"), Ok(Value::from(1)));
    }

    #[test]
    fn test_comparison() {
        assert_eq!(op("<"), Ok(Value::from(true)));
        assert_eq!(op("< 1"), Ok(Value::from(true)));
        assert_eq!(op("< 1 2 3"), Ok(Value::from(true)));
        assert_eq!(op("< 1 3 2"), Ok(Value::from(false)));
        assert_eq!(op("eq a a a"), Ok(Value::from(true)));
    }

    #[test]
    fn test_binary_unary() {
        assert_eq!(op("% 7 3"), Ok(Value::from(1)));
        assert_eq!(op("in b {a b c}"), Ok(Value::from(true)));
        assert_eq!(op("! 0"), Ok(Value::from(true)));
        assert_eq!(op("~ 0"), Ok(Value::from(-1)));
        assert_eq!(
            op("% 1").map_err(|e| e.value().to_string()),
            Err("wrong # args: should be \"% integer integer\"".to_string())
        );
    }
}
