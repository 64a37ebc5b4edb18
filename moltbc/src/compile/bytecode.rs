//! Compiled Bytecode
//!
//! A `ByteCode` is the immutable result of compiling a script: the instruction bytes,
//! the literal table, auxiliary data (jump tables), the exception ranges, the map from
//! instruction offsets back to command source text, and the names of the compiled
//! locals.  It is shared by reference count and never modified after assembly.

use crate::compile::opcodes::Opcode;
use crate::compile::opcodes::Operand;
use crate::types::*;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// A compiled script.
pub struct ByteCode {
    pub(crate) code: Vec<u8>,
    pub(crate) literals: Vec<Value>,
    pub(crate) aux: Vec<AuxData>,
    pub(crate) ranges: Vec<ExceptionRange>,
    pub(crate) cmd_locs: Vec<CmdLocation>,
    pub(crate) local_names: Rc<Vec<Value>>,
    pub(crate) source: Rc<str>,
    pub(crate) epoch: u64,
    pub(crate) max_stack: usize,
}

/// Auxiliary instruction data.
#[derive(Debug, Clone)]
pub enum AuxData {
    JumpTable(JumpTable),
}

/// A jump table: string keys to offsets relative to the `jumpTable` instruction.
#[derive(Debug, Clone, Default)]
pub struct JumpTable {
    pub entries: IndexMap<String, isize, MoltHasher>,
}

/// The kind of an exception range.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RangeKind {
    /// Catches `break` and `continue`.
    Loop,

    /// Catches every exceptional completion.
    Catch,
}

/// Where an exception range sends control.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RangeTargets {
    Loop { break_pc: usize, continue_pc: usize },
    Catch { catch_pc: usize },
}

/// A range of instructions covered by a loop or catch handler.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ExceptionRange {
    pub kind: RangeKind,

    /// The number of ranges enclosing this one.
    pub nesting: usize,

    pub code_start: usize,
    pub code_len: usize,

    /// The operand stack depth when the range was entered; the stack is cut back to
    /// this depth before control passes to a target.
    pub stack_depth: usize,

    pub targets: RangeTargets,
}

impl ExceptionRange {
    pub fn covers(&self, pc: usize) -> bool {
        pc >= self.code_start && pc < self.code_start + self.code_len
    }
}

/// The source of the command compiled to a range of instructions.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CmdLocation {
    pub code_start: usize,
    pub code_len: usize,
    pub source_start: usize,
    pub source_len: usize,
    pub line: usize,
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Instruction {
    pub pc: usize,
    pub op: Opcode,
    pub operands: [i64; 2],
}

impl Instruction {
    /// Decodes the instruction at `pc`, or returns `None` if the bytes there aren't an
    /// instruction.
    pub fn decode(code: &[u8], pc: usize) -> Option<Instruction> {
        let op = Opcode::from_u8(*code.get(pc)?)?;
        let mut operands = [0; 2];
        let mut pos = pc + 1;

        for (i, operand) in op.operands().iter().enumerate() {
            operands[i] = match operand {
                Operand::U1 => *code.get(pos)? as i64,
                Operand::I1 => *code.get(pos)? as i8 as i64,
                Operand::U4 => u32::from_le_bytes(code.get(pos..pos + 4)?.try_into().ok()?) as i64,
                Operand::I4 => i32::from_le_bytes(code.get(pos..pos + 4)?.try_into().ok()?) as i64,
            };
            pos += operand.width();
        }

        Some(Instruction { pc, op, operands })
    }

    pub fn next_pc(&self) -> usize {
        self.pc + self.op.width()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}) {}", self.pc, self.op.name())?;
        for i in 0..self.op.operands().len() {
            write!(f, " {}", self.operands[i])?;
        }
        Ok(())
    }
}

impl ByteCode {
    /// Decodes every instruction, in order.
    pub fn instructions(&self) -> Vec<Instruction> {
        let mut list = Vec::new();
        let mut pc = 0;
        while let Some(inst) = Instruction::decode(&self.code, pc) {
            pc = inst.next_pc();
            list.push(inst);
        }
        list
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions().len()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn literals(&self) -> &[Value] {
        &self.literals
    }

    pub fn ranges(&self) -> &[ExceptionRange] {
        &self.ranges
    }

    pub fn local_names(&self) -> &Rc<Vec<Value>> {
        &self.local_names
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The compile epoch the code was compiled against.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    pub(crate) fn jump_table(&self, index: usize) -> Option<&JumpTable> {
        match self.aux.get(index) {
            Some(AuxData::JumpTable(table)) => Some(table),
            None => None,
        }
    }

    /// Returns the innermost command whose code covers `pc`.
    pub fn command_at(&self, pc: usize) -> Option<&CmdLocation> {
        self.cmd_locs
            .iter()
            .filter(|loc| pc >= loc.code_start && pc < loc.code_start + loc.code_len)
            .min_by_key(|loc| loc.code_len)
    }

    /// Returns the innermost exception range covering `pc` that handles exceptions of
    /// the given kind: a loop range handles only `break` and `continue`.
    pub fn range_at(&self, pc: usize, code: ResultCode) -> Option<&ExceptionRange> {
        let loop_code = matches!(code, ResultCode::Break | ResultCode::Continue);
        self.ranges
            .iter()
            .filter(|r| r.covers(pc) && (r.kind == RangeKind::Catch || loop_code))
            .max_by_key(|r| r.nesting)
    }
}

impl fmt::Debug for ByteCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "ByteCode: {} bytes, {} literals", self.code.len(), self.literals.len())?;
        for inst in self.instructions() {
            writeln!(f, "  {}", inst)?;
        }
        Ok(())
    }
}
