//! Compilers for the variable commands: `set`, `incr`, `append`, and `lappend`.

use crate::compile::Compiled;
use crate::compile::CompileError;
use crate::compile::Compiler;
use crate::compile::Opcode;
use crate::token::ParsedCommand;
use crate::types::*;

/// How an instruction finds its variable.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum VarAccess {
    /// A compiled local.
    Slot(usize),

    /// An element of a compiled local; the element name is on the stack.
    ArraySlot(usize),

    /// The variable name is on the stack.
    Stack,

    /// The array name and the element name are on the stack.
    ArrayStack,
}

/// The four addressing forms of one variable operation.
pub(crate) struct VarOps {
    scalar: Opcode,
    array: Opcode,
    stk: Opcode,
    array_stk: Opcode,
}

pub(crate) const LOAD: VarOps = VarOps {
    scalar: Opcode::LoadScalar,
    array: Opcode::LoadArray,
    stk: Opcode::LoadStk,
    array_stk: Opcode::LoadArrayStk,
};

pub(crate) const STORE: VarOps = VarOps {
    scalar: Opcode::StoreScalar,
    array: Opcode::StoreArray,
    stk: Opcode::StoreStk,
    array_stk: Opcode::StoreArrayStk,
};

const APPEND: VarOps = VarOps {
    scalar: Opcode::AppendScalar,
    array: Opcode::AppendArray,
    stk: Opcode::AppendStk,
    array_stk: Opcode::AppendArrayStk,
};

const LAPPEND: VarOps = VarOps {
    scalar: Opcode::LappendScalar,
    array: Opcode::LappendArray,
    stk: Opcode::LappendStk,
    array_stk: Opcode::LappendArrayStk,
};

const INCR: VarOps = VarOps {
    scalar: Opcode::IncrScalar,
    array: Opcode::IncrArray,
    stk: Opcode::IncrStk,
    array_stk: Opcode::IncrArrayStk,
};

/// Pushes whatever the variable named by word `index` needs on the stack, and returns
/// how the variable instruction should address it.
pub(crate) fn push_var_name(
    c: &mut Compiler,
    cmd: &ParsedCommand,
    index: usize,
) -> Result<VarAccess, CompileError> {
    match c.literal(cmd, index) {
        Some(text) => Ok(push_literal_name(c, &text)),
        None => {
            c.compile_word(cmd, index)?;
            Ok(VarAccess::Stack)
        }
    }
}

/// As `push_var_name`, for a name known at compile time.
pub(crate) fn push_literal_name(c: &mut Compiler, text: &str) -> VarAccess {
    let var_name = VarName::parse(text);

    match var_name.index() {
        None => match c.slot_for(var_name.name()) {
            Some(slot) => VarAccess::Slot(slot),
            None => {
                c.env.push_literal(text);
                VarAccess::Stack
            }
        },
        Some(elem) => match c.slot_for(var_name.name()) {
            Some(slot) => {
                c.env.push_literal(elem);
                VarAccess::ArraySlot(slot)
            }
            None => {
                c.env.push_literal(var_name.name());
                c.env.push_literal(elem);
                VarAccess::ArrayStack
            }
        },
    }
}

/// Emits the variable operation for the given access.
pub(crate) fn emit_var_op(c: &mut Compiler, access: VarAccess, ops: &VarOps) {
    match access {
        VarAccess::Slot(slot) => c.env.emit_int4(ops.scalar, slot as i64),
        VarAccess::ArraySlot(slot) => c.env.emit_int4(ops.array, slot as i64),
        VarAccess::Stack => c.env.emit(ops.stk),
        VarAccess::ArrayStack => c.env.emit(ops.array_stk),
    }
}

/// Stores the value on top of the stack into the named variable, leaving the value
/// on the stack.
pub(crate) fn store_top(c: &mut Compiler, name: &str) {
    let var_name = VarName::parse(name);
    let slot = c.slot_for(var_name.name());

    match (var_name.index(), slot) {
        (None, Some(slot)) => c.env.emit_int4(Opcode::StoreScalar, slot as i64),
        (Some(elem), Some(slot)) => {
            c.env.push_literal(elem);
            c.env.emit_int4(Opcode::Reverse, 2);
            c.env.emit_int4(Opcode::StoreArray, slot as i64);
        }
        _ => {
            c.env.push_literal(name);
            c.env.emit_int4(Opcode::Reverse, 2);
            c.env.emit(Opcode::StoreStk);
        }
    }
}

/// # set *varName* ?*newValue*?
pub(crate) fn compile_set(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    match cmd.num_words() {
        2 => {
            let access = push_var_name(c, cmd, 1)?;
            emit_var_op(c, access, &LOAD);
        }
        3 => {
            let access = push_var_name(c, cmd, 1)?;
            c.compile_word(cmd, 2)?;
            emit_var_op(c, access, &STORE);
        }
        _ => return Ok(Compiled::Decline),
    }

    Ok(Compiled::Done)
}

/// # incr *varName* ?*increment*?
pub(crate) fn compile_incr(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    if cmd.num_words() != 2 && cmd.num_words() != 3 {
        return Ok(Compiled::Decline);
    }

    // A literal increment must be an integer; otherwise leave the error to the command.
    if cmd.num_words() == 3 {
        if let Some(incr) = c.literal(cmd, 2) {
            if Value::get_int(&incr).is_err() {
                return Ok(Compiled::Decline);
            }
        }
    }

    let access = push_var_name(c, cmd, 1)?;
    if cmd.num_words() == 3 {
        c.compile_word(cmd, 2)?;
    } else {
        c.env.push_literal("1");
    }
    emit_var_op(c, access, &INCR);

    Ok(Compiled::Done)
}

/// # append *varName* ?*value* ...?
///
/// Several values are concatenated first.  With no value the command is left alone;
/// it reads or creates the variable.
pub(crate) fn compile_append(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let num_words = cmd.num_words();
    if num_words < 3 {
        return Ok(Compiled::Decline);
    }

    let access = push_var_name(c, cmd, 1)?;
    for i in 2..num_words {
        c.compile_word(cmd, i)?;
    }
    if num_words > 3 {
        let mut count = num_words - 2;
        while count > u8::MAX as usize {
            c.env.emit_variadic(Opcode::Concat, u8::MAX as usize);
            count -= u8::MAX as usize - 1;
        }
        c.env.emit_variadic(Opcode::Concat, count);
    }
    emit_var_op(c, access, &APPEND);

    Ok(Compiled::Done)
}

/// # lappend *varName* *value*
pub(crate) fn compile_lappend(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    if cmd.num_words() != 3 {
        return Ok(Compiled::Decline);
    }

    let access = push_var_name(c, cmd, 1)?;
    c.compile_word(cmd, 2)?;
    emit_var_op(c, access, &LAPPEND);

    Ok(Compiled::Done)
}

#[cfg(test)]
mod tests {
    use crate::compile::compile_for_test;
    use crate::compile::ops;
    use crate::compile::Opcode;

    #[test]
    fn test_set_forms() {
        let code = compile_for_test("set a 1; set a", true);
        assert!(ops(&code).contains(&Opcode::StoreScalar));
        assert!(ops(&code).contains(&Opcode::LoadScalar));

        let code = compile_for_test("set a(x) 1", true);
        assert!(ops(&code).contains(&Opcode::StoreArray));

        let code = compile_for_test("set a(x) 1", false);
        assert!(ops(&code).contains(&Opcode::StoreArrayStk));

        let code = compile_for_test("set $name 1", true);
        assert!(ops(&code).contains(&Opcode::StoreStk));
    }

    #[test]
    fn test_incr() {
        let code = compile_for_test("incr i", true);
        assert_eq!(ops(&code), vec![Opcode::Push1, Opcode::IncrScalar]);

        // A bad literal increment is left for the command to report.
        let code = compile_for_test("incr i x", true);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
    }

    #[test]
    fn test_append_concatenates() {
        let code = compile_for_test("append s a b c", false);
        assert_eq!(
            ops(&code),
            vec![
                Opcode::Push1,
                Opcode::Push1,
                Opcode::Push1,
                Opcode::Push1,
                Opcode::Concat,
                Opcode::AppendStk
            ]
        );
    }

    #[test]
    fn test_lappend() {
        let code = compile_for_test("lappend l x", true);
        assert!(ops(&code).contains(&Opcode::LappendScalar));
    }
}
