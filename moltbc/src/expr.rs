//! The Expression Evaluator
//!
//! Expressions are parsed into a small tree and evaluated, with `&&`, `||`, and `?:`
//! evaluating their operands lazily.  Operands are numbers, booleans, braced or quoted
//! strings, variable references, command substitutions, and math function calls.
//!
//! The arithmetic itself lives in [`binary_op`] and [`unary_op`], which the bytecode
//! interpreter and the math operator commands share.

use crate::interp::Interp;
use crate::list;
use crate::parser;
use crate::token::Token;
use crate::types::*;

//-----------------------------------------------------------------------------
// Operators

/// A binary operator.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    StrEq,
    StrNe,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    In,
    Ni,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::StrEq => "eq",
            BinOp::StrNe => "ne",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::In => "in",
            BinOp::Ni => "ni",
        }
    }

    /// Binding strength; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            BinOp::Pow => 12,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 11,
            BinOp::Add | BinOp::Sub => 10,
            BinOp::Shl | BinOp::Shr => 9,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 8,
            BinOp::Eq | BinOp::Ne => 7,
            BinOp::StrEq | BinOp::StrNe => 6,
            BinOp::In | BinOp::Ni => 5,
            BinOp::BitAnd => 4,
            BinOp::BitXor => 3,
            BinOp::BitOr => 2,
        }
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum UnOp {
    Minus,
    Plus,
    Not,
    BitNot,
}

impl UnOp {
    fn symbol(self) -> &'static str {
        match self {
            UnOp::Minus => "-",
            UnOp::Plus => "+",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(MoltInt),
    Float(MoltFloat),
}

impl Num {
    fn as_float(self) -> MoltFloat {
        match self {
            Num::Int(int) => int as MoltFloat,
            Num::Float(flt) => flt,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(int) => Value::from(int),
            Num::Float(flt) => Value::from(flt),
        }
    }
}

fn try_num(value: &Value) -> Option<Num> {
    if let Ok(int) = value.as_int() {
        Some(Num::Int(int))
    } else if let Ok(flt) = value.as_float() {
        Some(Num::Float(flt))
    } else {
        None
    }
}

fn num(value: &Value, op: &str) -> Result<Num, Exception> {
    match try_num(value) {
        Some(num) => Ok(num),
        None => molt_err!(
            "can't use non-numeric string \"{}\" as operand of \"{}\"",
            value,
            op
        ),
    }
}

fn int(value: &Value, op: &str) -> Result<MoltInt, Exception> {
    match num(value, op)? {
        Num::Int(int) => Ok(int),
        Num::Float(_) => molt_err!("can't use floating-point value \"{}\" as operand of \"{}\"", value, op),
    }
}

fn divide_by_zero() -> MoltResult {
    molt_throw!("ARITH DIVZERO {divide by zero}", "divide by zero")
}

/// Applies a binary operator.
pub(crate) fn binary_op(op: BinOp, a: &Value, b: &Value) -> MoltResult {
    let sym = op.symbol();

    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            let result = match (num(a, sym)?, num(b, sym)?) {
                (Num::Int(x), Num::Int(y)) => Num::Int(match op {
                    BinOp::Add => x.wrapping_add(y),
                    BinOp::Sub => x.wrapping_sub(y),
                    _ => x.wrapping_mul(y),
                }),
                (x, y) => {
                    let (x, y) = (x.as_float(), y.as_float());
                    Num::Float(match op {
                        BinOp::Add => x + y,
                        BinOp::Sub => x - y,
                        _ => x * y,
                    })
                }
            };
            Ok(result.into_value())
        }
        BinOp::Div => match (num(a, sym)?, num(b, sym)?) {
            (Num::Int(_), Num::Int(0)) => divide_by_zero(),
            (Num::Int(x), Num::Int(y)) => {
                // Integer division rounds toward negative infinity.
                let quotient = x.wrapping_div(y);
                if x.wrapping_rem(y) != 0 && ((x < 0) != (y < 0)) {
                    Ok(Value::from(quotient - 1))
                } else {
                    Ok(Value::from(quotient))
                }
            }
            (x, y) => {
                let y = y.as_float();
                if y == 0.0 {
                    return divide_by_zero();
                }
                Ok(Value::from(x.as_float() / y))
            }
        },
        BinOp::Mod => {
            let x = int(a, sym)?;
            let y = int(b, sym)?;
            if y == 0 {
                return divide_by_zero();
            }
            // The remainder takes the sign of the divisor.
            let rem = x.wrapping_rem(y);
            if rem != 0 && ((rem < 0) != (y < 0)) {
                Ok(Value::from(rem + y))
            } else {
                Ok(Value::from(rem))
            }
        }
        BinOp::Pow => match (num(a, sym)?, num(b, sym)?) {
            (Num::Int(x), Num::Int(y)) if y < 0 => match x {
                0 => molt_throw!(
                    "ARITH DOMAIN {exponentiation of zero by negative power}",
                    "exponentiation of zero by negative power"
                ),
                1 => Ok(Value::from(1 as MoltInt)),
                -1 => Ok(Value::from(if y % 2 == 0 { 1 } else { -1 } as MoltInt)),
                _ => Ok(Value::from(0 as MoltInt)),
            },
            (Num::Int(x), Num::Int(y)) => {
                let exp = u32::try_from(y).unwrap_or(u32::MAX);
                Ok(Value::from(x.wrapping_pow(exp)))
            }
            (x, y) => Ok(Value::from(x.as_float().powf(y.as_float()))),
        },
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ordering = match (try_num(a), try_num(b)) {
                (Some(Num::Int(x)), Some(Num::Int(y))) => x.partial_cmp(&y),
                (Some(x), Some(y)) => x.as_float().partial_cmp(&y.as_float()),
                _ => a.as_str().partial_cmp(b.as_str()),
            };
            let flag = match ordering {
                Some(ordering) => match op {
                    BinOp::Eq => ordering.is_eq(),
                    BinOp::Ne => ordering.is_ne(),
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Gt => ordering.is_gt(),
                    BinOp::Le => ordering.is_le(),
                    _ => ordering.is_ge(),
                },
                // NaN compares unequal to everything.
                None => op == BinOp::Ne,
            };
            Ok(Value::from(flag))
        }
        BinOp::StrEq => Ok(Value::from(a.as_str() == b.as_str())),
        BinOp::StrNe => Ok(Value::from(a.as_str() != b.as_str())),
        BinOp::BitAnd => Ok(Value::from(int(a, sym)? & int(b, sym)?)),
        BinOp::BitOr => Ok(Value::from(int(a, sym)? | int(b, sym)?)),
        BinOp::BitXor => Ok(Value::from(int(a, sym)? ^ int(b, sym)?)),
        BinOp::Shl | BinOp::Shr => {
            let x = int(a, sym)?;
            let y = int(b, sym)?;
            if y < 0 {
                return molt_err!("negative shift argument");
            }
            let shifted = if op == BinOp::Shl {
                if y >= 64 {
                    0
                } else {
                    x.wrapping_shl(y as u32)
                }
            } else if y >= 64 {
                if x < 0 {
                    -1
                } else {
                    0
                }
            } else {
                x >> y
            };
            Ok(Value::from(shifted))
        }
        BinOp::In | BinOp::Ni => {
            let list = b.as_list()?;
            let found = list.iter().any(|elem| elem.as_str() == a.as_str());
            Ok(Value::from(found == (op == BinOp::In)))
        }
    }
}

/// Applies a unary operator.
pub(crate) fn unary_op(op: UnOp, a: &Value) -> MoltResult {
    let sym = op.symbol();

    match op {
        UnOp::Minus => match num(a, sym)? {
            Num::Int(x) => Ok(Value::from(x.wrapping_neg())),
            Num::Float(x) => Ok(Value::from(-x)),
        },
        UnOp::Plus => Ok(num(a, sym)?.into_value()),
        UnOp::Not => match try_num(a) {
            Some(x) => Ok(Value::from(x.as_float() == 0.0)),
            None => match a.as_bool() {
                Ok(flag) => Ok(Value::from(!flag)),
                Err(_) => molt_err!("can't use non-numeric string \"{}\" as operand of \"!\"", a),
            },
        },
        UnOp::BitNot => Ok(Value::from(!int(a, sym)?)),
    }
}

//-----------------------------------------------------------------------------
// Math functions

fn call_function(name: &str, args: &[Value]) -> MoltResult {
    let arity = match name {
        "abs" | "int" | "double" | "round" | "bool" | "entier" | "wide" | "sqrt" => Some(1),
        "pow" => Some(2),
        "max" | "min" => None,
        _ => return molt_err!("unknown math function \"{}\"", name),
    };

    match arity {
        Some(n) if args.len() < n => return molt_err!("too few arguments for math function \"{}\"", name),
        Some(n) if args.len() > n => return molt_err!("too many arguments for math function \"{}\"", name),
        None if args.is_empty() => return molt_err!("too few arguments for math function \"{}\"", name),
        _ => (),
    }

    match name {
        "abs" => match num(&args[0], name)? {
            Num::Int(x) => Ok(Value::from(x.wrapping_abs())),
            Num::Float(x) => Ok(Value::from(x.abs())),
        },
        "int" | "entier" | "wide" => match num(&args[0], name)? {
            Num::Int(x) => Ok(Value::from(x)),
            Num::Float(x) => Ok(Value::from(x.trunc() as MoltInt)),
        },
        "double" => Ok(Value::from(num(&args[0], name)?.as_float())),
        "round" => match num(&args[0], name)? {
            Num::Int(x) => Ok(Value::from(x)),
            Num::Float(x) => Ok(Value::from(x.round() as MoltInt)),
        },
        "bool" => Ok(Value::from(args[0].as_bool()?)),
        "sqrt" => Ok(Value::from(num(&args[0], name)?.as_float().sqrt())),
        "pow" => Ok(Value::from(
            num(&args[0], name)?.as_float().powf(num(&args[1], name)?.as_float()),
        )),
        _ => {
            // max and min
            let mut best = (num(&args[0], name)?, args[0].clone());
            for arg in &args[1..] {
                let candidate = num(arg, name)?;
                let better = if name == "max" {
                    candidate.as_float() > best.0.as_float()
                } else {
                    candidate.as_float() < best.0.as_float()
                };
                if better {
                    best = (candidate, arg.clone());
                }
            }
            Ok(best.0.into_value())
        }
    }
}

//-----------------------------------------------------------------------------
// Parsing

#[derive(Debug)]
enum Node {
    Value(Value),

    /// A variable reference, quoted string, or command substitution: a sequence of
    /// sibling tokens.
    Subst(Vec<Token>),

    Unary(UnOp, Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Cond(Box<Node>, Box<Node>, Box<Node>),
    Func(String, Vec<Node>),
}

/// A binary operator token.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Infix {
    Op(BinOp),
    And,
    Or,
}

impl Infix {
    fn precedence(self) -> u8 {
        match self {
            Infix::Op(op) => op.precedence(),
            Infix::And => 1,
            Infix::Or => 0,
        }
    }
}

struct ExprParser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    fn syntax_error<T>(&self) -> Result<T, Exception> {
        molt_throw!(
            "TCL PARSE EXPR" =>
            "syntax error in expression \"{}\"",
            self.source
        )
    }

    fn skip_white(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_white();
        self.bytes.get(self.pos).copied()
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn parse(mut self) -> Result<Node, Exception> {
        if self.peek().is_none() {
            return molt_throw!("TCL PARSE EXPR" => "empty expression");
        }
        let node = self.parse_cond()?;
        if self.peek().is_some() {
            return self.syntax_error();
        }
        Ok(node)
    }

    /// *cond* ::= *binary* ?`?` *cond* `:` *cond*?
    fn parse_cond(&mut self) -> Result<Node, Exception> {
        let test = self.parse_binary(0)?;

        if self.peek() != Some(b'?') {
            return Ok(test);
        }
        self.pos += 1;
        let then = self.parse_cond()?;
        if self.peek() != Some(b':') {
            return self.syntax_error();
        }
        self.pos += 1;
        let otherwise = self.parse_cond()?;

        Ok(Node::Cond(Box::new(test), Box::new(then), Box::new(otherwise)))
    }

    /// Precedence climbing over the binary operators.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Node, Exception> {
        let mut left = self.parse_unary()?;

        while let Some((infix, len)) = self.peek_infix() {
            let prec = infix.precedence();
            if prec < min_prec {
                break;
            }
            self.pos += len;

            // `**` groups to the right.
            let next_min = if infix == Infix::Op(BinOp::Pow) { prec } else { prec + 1 };
            let right = self.parse_binary(next_min)?;

            left = match infix {
                Infix::Op(op) => Node::Binary(op, Box::new(left), Box::new(right)),
                Infix::And => Node::And(Box::new(left), Box::new(right)),
                Infix::Or => Node::Or(Box::new(left), Box::new(right)),
            };
        }

        Ok(left)
    }

    fn peek_infix(&mut self) -> Option<(Infix, usize)> {
        self.peek()?;
        let rest = self.rest();

        const SYMBOLS: &[(&str, Infix)] = &[
            ("**", Infix::Op(BinOp::Pow)),
            ("<<", Infix::Op(BinOp::Shl)),
            (">>", Infix::Op(BinOp::Shr)),
            ("<=", Infix::Op(BinOp::Le)),
            (">=", Infix::Op(BinOp::Ge)),
            ("==", Infix::Op(BinOp::Eq)),
            ("!=", Infix::Op(BinOp::Ne)),
            ("&&", Infix::And),
            ("||", Infix::Or),
            ("+", Infix::Op(BinOp::Add)),
            ("-", Infix::Op(BinOp::Sub)),
            ("*", Infix::Op(BinOp::Mul)),
            ("/", Infix::Op(BinOp::Div)),
            ("%", Infix::Op(BinOp::Mod)),
            ("<", Infix::Op(BinOp::Lt)),
            (">", Infix::Op(BinOp::Gt)),
            ("&", Infix::Op(BinOp::BitAnd)),
            ("^", Infix::Op(BinOp::BitXor)),
            ("|", Infix::Op(BinOp::BitOr)),
        ];
        for (symbol, infix) in SYMBOLS {
            if rest.starts_with(symbol) {
                return Some((*infix, symbol.len()));
            }
        }

        const WORDS: &[(&str, BinOp)] = &[
            ("eq", BinOp::StrEq),
            ("ne", BinOp::StrNe),
            ("in", BinOp::In),
            ("ni", BinOp::Ni),
        ];
        for (word, op) in WORDS {
            if rest.starts_with(word)
                && !rest[2..]
                    .bytes()
                    .next()
                    .map(|b| b.is_ascii_alphanumeric() || b == b'_')
                    .unwrap_or(false)
            {
                return Some((Infix::Op(*op), 2));
            }
        }

        None
    }

    fn parse_unary(&mut self) -> Result<Node, Exception> {
        let op = match self.peek() {
            Some(b'-') => UnOp::Minus,
            Some(b'+') => UnOp::Plus,
            Some(b'!') => UnOp::Not,
            Some(b'~') => UnOp::BitNot,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        let operand = self.parse_unary()?;
        Ok(Node::Unary(op, Box::new(operand)))
    }

    fn parse_primary(&mut self) -> Result<Node, Exception> {
        let Some(ch) = self.peek() else {
            return self.syntax_error();
        };
        let end = self.source.len();

        match ch {
            b'(' => {
                self.pos += 1;
                let node = self.parse_cond()?;
                if self.peek() != Some(b')') {
                    return self.syntax_error();
                }
                self.pos += 1;
                Ok(node)
            }
            b'$' => match parser::parse_var_ref(self.source, self.pos, end)? {
                Some((tokens, next)) => {
                    self.pos = next;
                    Ok(Node::Subst(tokens))
                }
                None => self.syntax_error(),
            },
            b'[' => {
                let (token, next) = parser::parse_command_ref(self.source, self.pos, end)?;
                self.pos = next;
                Ok(Node::Subst(vec![token]))
            }
            b'"' => {
                let (mut tokens, next) = parser::parse_quoted(self.source, self.pos, end)?;
                self.pos = next;
                tokens.remove(0);
                Ok(Node::Subst(tokens))
            }
            b'{' => {
                let (close, _) = list::match_brace(self.source, self.pos)?;
                let text = &self.source[self.pos + 1..close];
                self.pos = close + 1;
                Ok(Node::Value(Value::from(text)))
            }
            b'0'..=b'9' | b'.' => self.parse_number(),
            ch if ch.is_ascii_alphabetic() => self.parse_word(),
            _ => self.syntax_error(),
        }
    }

    fn parse_number(&mut self) -> Result<Node, Exception> {
        let start = self.pos;
        let bytes = self.bytes;
        let lower_prefix = self.rest().get(..2).map(|p| p.to_ascii_lowercase());

        if matches!(lower_prefix.as_deref(), Some("0x") | Some("0o") | Some("0b")) {
            self.pos += 2;
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_alphanumeric() {
                self.pos += 1;
            }
            let text = &self.source[start..self.pos];
            return Ok(Node::Value(Value::from(Value::get_int(text)?)));
        }

        let mut is_float = false;
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'0'..=b'9' => self.pos += 1,
                b'.' => {
                    is_float = true;
                    self.pos += 1;
                }
                b'e' | b'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(bytes.get(self.pos), Some(b'+') | Some(b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }

        let text = &self.source[start..self.pos];
        if is_float {
            Ok(Node::Value(Value::from(Value::get_float(text)?)))
        } else {
            Ok(Node::Value(Value::from(Value::get_int(text)?)))
        }
    }

    /// A function call, or a boolean literal.
    fn parse_word(&mut self) -> Result<Node, Exception> {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let word = &self.source[start..self.pos];

        if self.peek() == Some(b'(') {
            self.pos += 1;
            let mut args = Vec::new();
            if self.peek() == Some(b')') {
                self.pos += 1;
            } else {
                loop {
                    args.push(self.parse_cond()?);
                    match self.peek() {
                        Some(b',') => self.pos += 1,
                        Some(b')') => {
                            self.pos += 1;
                            break;
                        }
                        _ => return self.syntax_error(),
                    }
                }
            }
            return Ok(Node::Func(word.to_string(), args));
        }

        match word.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "false" | "no" | "off" => Ok(Node::Value(Value::from(word))),
            "inf" => Ok(Node::Value(Value::from(MoltFloat::INFINITY))),
            "nan" => Ok(Node::Value(Value::from(MoltFloat::NAN))),
            _ => molt_throw!("TCL PARSE EXPR BAREWORD" => "invalid bareword \"{}\"", word),
        }
    }
}

//-----------------------------------------------------------------------------
// Evaluation

/// Evaluates an expression.
pub(crate) fn expr<Ctx>(interp: &mut Interp<Ctx>, expr: &Value, ctx: &mut Ctx) -> MoltResult {
    let source = expr.as_str();
    let tree = ExprParser::new(source).parse()?;
    eval(interp, source, &tree, ctx)
}

fn eval<Ctx>(interp: &mut Interp<Ctx>, source: &str, node: &Node, ctx: &mut Ctx) -> MoltResult {
    match node {
        Node::Value(value) => Ok(value.clone()),
        Node::Subst(tokens) => interp.eval_tokens(source, tokens, ctx),
        Node::Unary(op, operand) => {
            let value = eval(interp, source, operand, ctx)?;
            unary_op(*op, &value)
        }
        Node::Binary(op, left, right) => {
            let a = eval(interp, source, left, ctx)?;
            let b = eval(interp, source, right, ctx)?;
            binary_op(*op, &a, &b)
        }
        Node::And(left, right) => {
            if !eval(interp, source, left, ctx)?.as_bool()? {
                return Ok(Value::from(false));
            }
            Ok(Value::from(eval(interp, source, right, ctx)?.as_bool()?))
        }
        Node::Or(left, right) => {
            if eval(interp, source, left, ctx)?.as_bool()? {
                return Ok(Value::from(true));
            }
            Ok(Value::from(eval(interp, source, right, ctx)?.as_bool()?))
        }
        Node::Cond(test, then, otherwise) => {
            if eval(interp, source, test, ctx)?.as_bool()? {
                eval(interp, source, then, ctx)
            } else {
                eval(interp, source, otherwise, ctx)
            }
        }
        Node::Func(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(interp, source, arg, ctx)?);
            }
            call_function(name, &values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(text: &str) -> MoltResult {
        let mut interp = Interp::new();
        interp.expr(&Value::from(text), &mut ())
    }

    fn ok(text: &str) -> String {
        ev(text).unwrap().as_str().to_string()
    }

    fn err(text: &str) -> String {
        ev(text).unwrap_err().value().as_str().to_string()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(ok("1 + 2 * 3"), "7");
        assert_eq!(ok("(1 + 2) * 3"), "9");
        assert_eq!(ok("2 ** 3 ** 2"), "512");
        assert_eq!(ok("-2 ** 2"), "4");
        assert_eq!(ok("1 < 2 && 2 < 3"), "1");
        assert_eq!(ok("1 | 2 ^ 3 & 4"), "3");
        assert_eq!(ok("10 - 2 - 3"), "5");
    }

    #[test]
    fn test_division() {
        assert_eq!(ok("7 / 2"), "3");
        assert_eq!(ok("-7 / 2"), "-4");
        assert_eq!(ok("-7 % 2"), "1");
        assert_eq!(ok("7 % -2"), "-1");
        assert_eq!(ok("7.0 / 2"), "3.5");
        assert_eq!(err("1 / 0"), "divide by zero");
        assert_eq!(ev("1 % 0").unwrap_err().error_code().as_str(), "ARITH DIVZERO {divide by zero}");
    }

    #[test]
    fn test_lazy_operators() {
        // The right-hand sides would fail if evaluated.
        assert_eq!(ok("0 && [error boom]"), "0");
        assert_eq!(ok("1 || [error boom]"), "1");
        assert_eq!(ok("1 ? 2 : [error boom]"), "2");
        assert_eq!(ok("0 ? [error boom] : 3"), "3");
    }

    #[test]
    fn test_strings() {
        assert_eq!(ok("\"abc\" eq {abc}"), "1");
        assert_eq!(ok("\"abc\" < \"abd\""), "1");
        assert_eq!(ok("{b} in {a b c}"), "1");
        assert_eq!(ok("{d} ni {a b c}"), "1");
        assert_eq!(ok("true && yes"), "1");
    }

    #[test]
    fn test_functions() {
        assert_eq!(ok("abs(-3)"), "3");
        assert_eq!(ok("int(3.7)"), "3");
        assert_eq!(ok("round(2.5)"), "3");
        assert_eq!(ok("max(1, 5, 3)"), "5");
        assert_eq!(ok("min(4, 2.5)"), "2.5");
        assert_eq!(ok("double(2)"), "2.0");
        assert_eq!(ok("sqrt(16)"), "4.0");
        assert_eq!(err("nosuch(1)"), "unknown math function \"nosuch\"");
        assert_eq!(err("abs()"), "too few arguments for math function \"abs\"");
    }

    #[test]
    fn test_errors() {
        assert_eq!(err("a + b"), "invalid bareword \"a\"");
        assert_eq!(err(""), "empty expression");
        assert_eq!(err("1 +"), "syntax error in expression \"1 +\"");
        assert_eq!(
            err("\"x\" + 1"),
            "can't use non-numeric string \"x\" as operand of \"+\""
        );
        assert_eq!(err("1 << -1"), "negative shift argument");
    }

    #[test]
    fn test_variables_and_commands() {
        let mut interp = Interp::new();
        let mut ctx = ();
        interp.eval("set a 4; set b(x) 5", &mut ctx).unwrap();
        let value = interp.expr(&Value::from("$a * $b(x) + [set a]"), &mut ctx).unwrap();
        assert_eq!(value.as_str(), "24");
        let value = interp.expr(&Value::from("\"$a-$a\""), &mut ctx).unwrap();
        assert_eq!(value.as_str(), "4-4");
    }

    #[test]
    fn test_binary_op_shared() {
        assert_eq!(
            binary_op(BinOp::Add, &Value::from("1"), &Value::from("2.5")).unwrap().as_str(),
            "3.5"
        );
        assert_eq!(
            unary_op(UnOp::Not, &Value::from("0")).unwrap().as_str(),
            "1"
        );
    }
}
