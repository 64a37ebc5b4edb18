//! The Instruction Set
//!
//! An instruction is a one-byte opcode followed by zero or more fixed-width operands.
//! Multi-byte operands are little-endian.  Every opcode has a known net effect on the
//! depth of the operand stack, except for the few variadic ones whose effect depends on
//! an operand; the emitter is told their effect explicitly.

/// The width and signedness of an instruction operand.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Operand {
    U1,
    I1,
    U4,
    I4,
}

impl Operand {
    /// The operand's width in bytes.
    pub fn width(self) -> usize {
        match self {
            Operand::U1 | Operand::I1 => 1,
            Operand::U4 | Operand::I4 => 4,
        }
    }
}

macro_rules! opcodes {
    ($($(#[$doc:meta])* $op:ident = $name:literal, [$($operand:ident),*], $effect:expr;)*) => {
        /// The opcodes.
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $op,)*
        }

        const OPCODES: &[Opcode] = &[$(Opcode::$op,)*];

        impl Opcode {
            /// The opcode's name, as shown in instruction listings.
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$op => $name,)*
                }
            }

            /// The opcode's operands, in encoding order.
            pub fn operands(self) -> &'static [Operand] {
                match self {
                    $(Opcode::$op => &[$(Operand::$operand),*],)*
                }
            }

            /// The opcode's net stack effect, or `None` if it depends on an operand.
            pub fn stack_effect(self) -> Option<isize> {
                match self {
                    $(Opcode::$op => $effect,)*
                }
            }
        }
    };
}

const VARIADIC: Option<isize> = None;

opcodes! {
    // Stack manipulation

    /// Pushes literal `u1`.
    Push1 = "push1", [U1], Some(1);
    /// Pushes literal `u4`.
    Push4 = "push4", [U4], Some(1);
    Pop = "pop", [], Some(-1);
    Dup = "dup", [], Some(1);
    /// Pushes a copy of the item `u1` places below the top.
    Over = "over", [U1], Some(1);
    /// Reverses the order of the top `u4` items.
    Reverse = "reverse", [U4], Some(0);
    /// Concatenates the top `u1` items as strings.
    Concat = "concat", [U1], VARIADIC;

    // Evaluation

    /// Invokes the command whose words are the top `u1` items.
    InvokeStk1 = "invokeStk1", [U1], VARIADIC;
    InvokeStk4 = "invokeStk4", [U4], VARIADIC;
    /// Evaluates the top item as a script.
    EvalStk = "evalStk", [], Some(0);
    /// Evaluates the top item as an expression.
    ExprStk = "exprStk", [], Some(0);

    // Variables.  The scalar and array forms address a compiled local by index; the
    // stack forms take the variable name from the stack.  Array forms take the element
    // name from the stack, above the variable name if any, and below the value.

    LoadScalar = "loadScalar", [U4], Some(1);
    LoadArray = "loadArray", [U4], Some(0);
    LoadStk = "loadStk", [], Some(0);
    LoadArrayStk = "loadArrayStk", [], Some(-1);

    StoreScalar = "storeScalar", [U4], Some(0);
    StoreArray = "storeArray", [U4], Some(-1);
    StoreStk = "storeStk", [], Some(-1);
    StoreArrayStk = "storeArrayStk", [], Some(-2);

    AppendScalar = "appendScalar", [U4], Some(0);
    AppendArray = "appendArray", [U4], Some(-1);
    AppendStk = "appendStk", [], Some(-1);
    AppendArrayStk = "appendArrayStk", [], Some(-2);

    LappendScalar = "lappendScalar", [U4], Some(0);
    LappendArray = "lappendArray", [U4], Some(-1);
    LappendStk = "lappendStk", [], Some(-1);
    LappendArrayStk = "lappendArrayStk", [], Some(-2);

    /// Increments by the integer on top of the stack.
    IncrScalar = "incrScalar", [U4], Some(0);
    IncrArray = "incrArray", [U4], Some(-1);
    IncrStk = "incrStk", [], Some(-1);
    IncrArrayStk = "incrArrayStk", [], Some(-2);

    // Jumps.  Offsets are relative to the start of the jump instruction.

    Jump1 = "jump1", [I1], Some(0);
    Jump4 = "jump4", [I4], Some(0);
    JumpTrue1 = "jumpTrue1", [I1], Some(-1);
    JumpTrue4 = "jumpTrue4", [I4], Some(-1);
    JumpFalse1 = "jumpFalse1", [I1], Some(-1);
    JumpFalse4 = "jumpFalse4", [I4], Some(-1);
    /// Pops a string and jumps through jump table `u4`; falls through on no match.
    JumpTable = "jumpTable", [U4], Some(-1);

    // Exceptions

    /// Raises a `break`.
    Break = "break", [], Some(0);
    /// Raises a `continue`.
    Continue = "continue", [], Some(0);
    /// Pushes the result of the exception caught by the innermost catch handler.
    PushResult = "pushResult", [], Some(1);
    /// Pushes the return options dictionary of the caught exception.
    PushReturnOptions = "pushReturnOptions", [], Some(1);
    /// Pushes the completion code of the caught exception.
    PushReturnCode = "pushReturnCode", [], Some(1);
    /// Pops an options dictionary and a result, and completes as they describe.
    ReturnStk = "returnStk", [], Some(-1);
    /// Pops a value, a key, and a dictionary; pushes the dictionary with the key set.
    DictSet = "dictSet", [], Some(-2);
    /// Pops a prefix list and an options dictionary; pushes whether the options'
    /// `-errorcode` begins with the prefix.
    ErrCodePrefix = "errCodePrefix", [], Some(-1);

    // Arithmetic and logic

    Add = "add", [], Some(-1);
    Sub = "sub", [], Some(-1);
    Mult = "mult", [], Some(-1);
    Div = "div", [], Some(-1);
    Mod = "mod", [], Some(-1);
    Expon = "expon", [], Some(-1);
    Eq = "eq", [], Some(-1);
    Neq = "neq", [], Some(-1);
    Lt = "lt", [], Some(-1);
    Gt = "gt", [], Some(-1);
    Le = "le", [], Some(-1);
    Ge = "ge", [], Some(-1);
    StrEq = "streq", [], Some(-1);
    StrNeq = "strneq", [], Some(-1);
    BitAnd = "bitand", [], Some(-1);
    BitOr = "bitor", [], Some(-1);
    BitXor = "bitxor", [], Some(-1);
    Lshift = "lshift", [], Some(-1);
    Rshift = "rshift", [], Some(-1);
    ListIn = "listIn", [], Some(-1);
    ListNotIn = "listNotIn", [], Some(-1);
    Not = "not", [], Some(0);
    BitNot = "bitnot", [], Some(0);
    UMinus = "uminus", [], Some(0);
    UPlus = "uplus", [], Some(0);

    // Strings

    StrLen = "strlen", [], Some(0);
    /// Pops an index and a string.
    StrIndex = "strindex", [], Some(-1);
    StrCmp = "strcmp", [], Some(-1);
    /// Pops a string and a pattern; `u1` is the nocase flag.
    StrMatch = "strmatch", [U1], Some(-1);
    /// Pops the last index, the first index, and a string.
    StrRange = "strrange", [], Some(-2);
    /// The range between two encoded indices.
    StrRangeImm = "strrangeImm", [I4, I4], Some(0);
    /// Pops a string, a replacement, and a search string.
    StrMap = "strmap", [], Some(-2);
    /// Pops a haystack and a needle.
    StrFind = "strfind", [], Some(-1);
    StrFindLast = "strfindLast", [], Some(-1);
    /// Pops a set of characters and a string.
    StrTrim = "strtrim", [], Some(-1);
    StrTrimLeft = "strtrimLeft", [], Some(-1);
    StrTrimRight = "strtrimRight", [], Some(-1);
    StrUpper = "strupper", [], Some(0);
    StrLower = "strlower", [], Some(0);
    StrTitle = "strtitle", [], Some(0);
    /// Tests the top item against character class `u1`; the second `u1` is the strict flag.
    StrIs = "strclass", [U1, U1], Some(0);
    /// Pops the replacement, the last index, the first index, and a string.
    StrReplace = "strreplace", [], Some(-3);
    /// Pops a string and a pattern; `u1` is the nocase flag.
    Regexp = "regexp", [U1], Some(-1);
}

impl Opcode {
    /// Decodes an opcode byte.
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        OPCODES.get(byte as usize).copied()
    }

    /// The opcode's encoded width, including operands.
    pub fn width(self) -> usize {
        1 + self.operands().iter().map(|o| o.width()).sum::<usize>()
    }

    /// Returns true for the relative-jump opcodes.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jump1
                | Opcode::Jump4
                | Opcode::JumpTrue1
                | Opcode::JumpTrue4
                | Opcode::JumpFalse1
                | Opcode::JumpFalse4
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_round_trip() {
        for (i, op) in OPCODES.iter().enumerate() {
            assert_eq!(*op as usize, i);
            assert_eq!(Opcode::from_u8(i as u8), Some(*op));
        }
        assert_eq!(Opcode::from_u8(OPCODES.len() as u8), None);
    }

    #[test]
    fn test_widths() {
        assert_eq!(Opcode::Pop.width(), 1);
        assert_eq!(Opcode::Jump1.width(), 2);
        assert_eq!(Opcode::Jump4.width(), 5);
        assert_eq!(Opcode::StrRangeImm.width(), 9);
        assert_eq!(Opcode::StrIs.width(), 3);
    }

    #[test]
    fn test_stack_effects() {
        assert_eq!(Opcode::Concat.stack_effect(), None);
        assert_eq!(Opcode::JumpTrue1.stack_effect(), Some(-1));
        assert_eq!(Opcode::StrReplace.stack_effect(), Some(-3));
    }
}
