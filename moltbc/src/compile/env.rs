//! The Instruction Stream Builder
//!
//! `CompileEnv` accumulates a compilation's instructions, literals, auxiliary data,
//! exception ranges, and command locations, and assembles them into a `ByteCode`.
//!
//! Instructions are held in an arena until assembly.  Jumps refer to labels, which
//! are positions in the arena; a jump's encoded width isn't chosen until every target
//! is known.  Assembly starts with every jump in its one-byte form, widens any whose
//! distance doesn't fit, and repeats until nothing changes.  Widths only ever grow,
//! so this terminates, and every offset is computed from the final layout.
//!
//! The builder also tracks the operand stack depth.  Every emitted instruction applies
//! its net stack effect; the depth never goes negative, and the maximum is recorded
//! in the bytecode.
//!
//! A command compiler may emit speculatively and then decline; the driver takes a
//! [`Checkpoint`] before calling it and rewinds to it on decline.

use crate::compile::bytecode::AuxData;
use crate::compile::bytecode::ByteCode;
use crate::compile::bytecode::CmdLocation;
use crate::compile::bytecode::ExceptionRange;
use crate::compile::bytecode::JumpTable;
use crate::compile::bytecode::RangeKind;
use crate::compile::bytecode::RangeTargets;
use crate::compile::opcodes::Opcode;
use crate::compile::CompileError;
use crate::types::*;
use indexmap::IndexMap;
use indexmap::IndexSet;
use std::rc::Rc;

/// A jump target.  A label is created unplaced and placed exactly once.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Label(usize);

/// The condition of a jump.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JumpKind {
    Always,
    IfTrue,
    IfFalse,
}

impl JumpKind {
    fn opcodes(self) -> (Opcode, Opcode) {
        match self {
            JumpKind::Always => (Opcode::Jump1, Opcode::Jump4),
            JumpKind::IfTrue => (Opcode::JumpTrue1, Opcode::JumpTrue4),
            JumpKind::IfFalse => (Opcode::JumpFalse1, Opcode::JumpFalse4),
        }
    }
}

/// A forward jump whose target is yet to be placed.
#[derive(Debug)]
#[must_use]
pub struct JumpFixup(Label);

/// Identifies an exception range under construction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RangeId(usize);

/// The target of an exception range to set.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RangeTarget {
    Break,
    Continue,
    Catch,
}

/// Identifies a command location under construction.
#[derive(Debug, Clone, Copy)]
pub struct CmdHandle(usize);

/// A saved builder state to rewind to.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    items: usize,
    literals: usize,
    aux: usize,
    ranges: usize,
    open_ranges: usize,
    labels: usize,
    cmd_locs: usize,
    depth: usize,
}

#[derive(Debug, Clone)]
enum Item {
    Instr { op: Opcode, operands: [i64; 2] },
    Jump { kind: JumpKind, target: Label },
}

#[derive(Debug, Clone)]
struct RangeBuilder {
    kind: RangeKind,
    nesting: usize,
    start: usize,
    end: Option<usize>,
    depth: usize,
    break_target: Option<Label>,
    continue_target: Option<Label>,
    catch_target: Option<Label>,
}

#[derive(Debug, Clone)]
struct CmdBuilder {
    start: usize,
    end: usize,
    source_start: usize,
    source_len: usize,
    line: usize,
}

#[derive(Debug, Clone)]
enum AuxBuilder {
    JumpTable(IndexMap<String, Label, MoltHasher>),
}

/// The instruction stream builder.
#[derive(Debug, Default)]
pub struct CompileEnv {
    items: Vec<Item>,
    literals: IndexSet<String, MoltHasher>,
    aux: Vec<AuxBuilder>,
    ranges: Vec<RangeBuilder>,
    open_ranges: Vec<usize>,
    labels: Vec<Option<usize>>,
    cmd_locs: Vec<CmdBuilder>,
    locals: IndexSet<String, MoltHasher>,
    depth: usize,
    max_depth: usize,
}

impl CompileEnv {
    pub fn new() -> Self {
        Self::default()
    }

    //-------------------------------------------------------------------------
    // Emission

    /// Emits an instruction with no operands.
    pub fn emit(&mut self, op: Opcode) {
        self.emit_with(op, [0, 0]);
    }

    /// Emits an instruction with a one-byte operand.
    pub fn emit_int1(&mut self, op: Opcode, operand: u8) {
        self.emit_with(op, [operand as i64, 0]);
    }

    /// Emits an instruction with a four-byte operand.
    pub fn emit_int4(&mut self, op: Opcode, operand: i64) {
        self.emit_with(op, [operand, 0]);
    }

    /// Emits an instruction with two operands.
    pub fn emit_with(&mut self, op: Opcode, operands: [i64; 2]) {
        debug_assert!(!op.is_jump(), "jumps are emitted with jump()");
        debug_assert!(op.stack_effect().is_some(), "variadic opcodes are emitted with emit_variadic()");
        let effect = op.stack_effect().unwrap_or(0);
        self.items.push(Item::Instr { op, operands });
        self.adjust_depth(effect);
    }

    /// Emits a variadic instruction that consumes `count` items and pushes one.
    pub fn emit_variadic(&mut self, op: Opcode, count: usize) {
        debug_assert!(op.stack_effect().is_none());
        self.items.push(Item::Instr {
            op,
            operands: [count as i64, 0],
        });
        self.adjust_depth(1 - count as isize);
    }

    /// Pushes a literal.
    pub fn push_literal(&mut self, text: &str) {
        let index = self.register_literal(text);
        if index <= u8::MAX as usize {
            self.emit_int1(Opcode::Push1, index as u8);
        } else {
            self.emit_int4(Opcode::Push4, index as i64);
        }
    }

    /// Invokes the command whose `count` words are on the stack.
    pub fn emit_invoke(&mut self, count: usize) {
        if count <= u8::MAX as usize {
            self.emit_variadic(Opcode::InvokeStk1, count);
        } else {
            self.emit_variadic(Opcode::InvokeStk4, count);
        }
    }

    /// Applies a stack effect without emitting anything, e.g., to account for code
    /// that control never falls through.
    pub fn adjust_depth(&mut self, effect: isize) {
        let depth = self.depth as isize + effect;
        debug_assert!(depth >= 0, "stack depth went negative");
        self.depth = depth.max(0) as usize;
        self.max_depth = self.max_depth.max(self.depth);
    }

    /// The current operand stack depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The number of instructions emitted so far.
    pub fn instruction_count(&self) -> usize {
        self.items.len()
    }

    //-------------------------------------------------------------------------
    // Literals and locals

    /// Registers a literal, returning its index.  Identical text is registered once.
    pub fn register_literal(&mut self, text: &str) -> usize {
        match self.literals.get_index_of(text) {
            Some(index) => index,
            None => self.literals.insert_full(text.into()).0,
        }
    }

    /// Returns the compiled-local slot for a variable name, assigning one if need be.
    pub fn local_slot(&mut self, name: &str) -> usize {
        match self.locals.get_index_of(name) {
            Some(index) => index,
            None => self.locals.insert_full(name.into()).0,
        }
    }

    //-------------------------------------------------------------------------
    // Labels and jumps

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Places the label at the current position.
    pub fn place(&mut self, label: Label) {
        debug_assert!(self.labels[label.0].is_none(), "label placed twice");
        self.labels[label.0] = Some(self.items.len());
    }

    /// Emits a jump to a label, placed or not.
    pub fn jump(&mut self, kind: JumpKind, target: Label) {
        self.items.push(Item::Jump { kind, target });
        if kind != JumpKind::Always {
            self.adjust_depth(-1);
        }
    }

    /// Emits a jump to a target that will be placed later.
    pub fn forward_jump(&mut self, kind: JumpKind) -> JumpFixup {
        let label = self.new_label();
        self.jump(kind, label);
        JumpFixup(label)
    }

    /// Resolves a forward jump to the current position.
    pub fn resolve_here(&mut self, fixup: JumpFixup) {
        self.place(fixup.0);
    }

    /// Emits a jump back to an already-placed label.
    pub fn backward_jump(&mut self, kind: JumpKind, target: Label) {
        debug_assert!(self.labels[target.0].is_some(), "backward jump to unplaced label");
        self.jump(kind, target);
    }

    /// Emits a jump table dispatch.  The table maps strings to labels; unmatched strings
    /// fall through to the next instruction.
    pub fn emit_jump_table(&mut self, entries: IndexMap<String, Label, MoltHasher>) {
        self.aux.push(AuxBuilder::JumpTable(entries));
        let index = self.aux.len() - 1;
        self.emit_int4(Opcode::JumpTable, index as i64);
    }

    //-------------------------------------------------------------------------
    // Exception ranges

    /// Opens an exception range at the current position.
    pub fn open_range(&mut self, kind: RangeKind) -> RangeId {
        self.ranges.push(RangeBuilder {
            kind,
            nesting: self.open_ranges.len(),
            start: self.items.len(),
            end: None,
            depth: self.depth,
            break_target: None,
            continue_target: None,
            catch_target: None,
        });
        let id = self.ranges.len() - 1;
        self.open_ranges.push(id);
        RangeId(id)
    }

    /// Closes an exception range at the current position.  Ranges must be closed
    /// innermost first.
    pub fn close_range(&mut self, id: RangeId) -> Result<(), CompileError> {
        if self.open_ranges.last() != Some(&id.0) {
            return Err(CompileError::RangeOrder);
        }
        self.open_ranges.pop();
        self.ranges[id.0].end = Some(self.items.len());
        Ok(())
    }

    pub fn set_range_target(&mut self, id: RangeId, which: RangeTarget, label: Label) {
        let range = &mut self.ranges[id.0];
        match which {
            RangeTarget::Break => range.break_target = Some(label),
            RangeTarget::Continue => range.continue_target = Some(label),
            RangeTarget::Catch => range.catch_target = Some(label),
        }
    }

    /// The innermost open range: its kind, its entry stack depth, and its break and
    /// continue targets, if it's a loop.
    pub fn innermost_range(&self) -> Option<(RangeKind, usize, Option<Label>, Option<Label>)> {
        let range = &self.ranges[*self.open_ranges.last()?];
        Some((
            range.kind,
            range.depth,
            range.break_target,
            range.continue_target,
        ))
    }

    //-------------------------------------------------------------------------
    // Command locations

    /// Records the start of a command's code.
    pub fn begin_command(&mut self, source_start: usize, source_len: usize, line: usize) -> CmdHandle {
        self.cmd_locs.push(CmdBuilder {
            start: self.items.len(),
            end: self.items.len(),
            source_start,
            source_len,
            line,
        });
        CmdHandle(self.cmd_locs.len() - 1)
    }

    /// Records the end of a command's code.
    pub fn end_command(&mut self, handle: CmdHandle) {
        self.cmd_locs[handle.0].end = self.items.len();
    }

    //-------------------------------------------------------------------------
    // Checkpoints

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            items: self.items.len(),
            literals: self.literals.len(),
            aux: self.aux.len(),
            ranges: self.ranges.len(),
            open_ranges: self.open_ranges.len(),
            labels: self.labels.len(),
            cmd_locs: self.cmd_locs.len(),
            depth: self.depth,
        }
    }

    /// Discards everything emitted since the checkpoint.  Compiled-local slots are
    /// kept; an unused slot is harmless.
    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        self.items.truncate(checkpoint.items);
        self.literals.truncate(checkpoint.literals);
        self.aux.truncate(checkpoint.aux);
        self.ranges.truncate(checkpoint.ranges);
        self.open_ranges.truncate(checkpoint.open_ranges);
        self.labels.truncate(checkpoint.labels);
        self.cmd_locs.truncate(checkpoint.cmd_locs);
        self.depth = checkpoint.depth;

        // Labels created before the checkpoint but placed after it are unplaced again.
        for pos in self.labels.iter_mut() {
            if matches!(*pos, Some(p) if p > checkpoint.items) {
                *pos = None;
            }
        }
    }

    //-------------------------------------------------------------------------
    // Assembly

    fn label_pos(&self, label: Label) -> Result<usize, CompileError> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or(CompileError::UnplacedLabel)
    }

    /// Lays out the instructions, choosing each jump's width, and returns the byte
    /// offset of every item (plus the end offset) and each jump's opcode.
    fn layout(&self) -> Result<(Vec<usize>, Vec<Option<Opcode>>), CompileError> {
        let mut wide = vec![false; self.items.len()];
        let mut passes = 0;

        loop {
            passes += 1;
            let offsets = self.offsets(&wide);
            let mut changed = false;

            for (i, item) in self.items.iter().enumerate() {
                if let Item::Jump { target, .. } = item {
                    if !wide[i] {
                        let distance = offsets[self.label_pos(*target)?] as isize - offsets[i] as isize;
                        if i8::try_from(distance).is_err() {
                            wide[i] = true;
                            changed = true;
                        }
                    }
                }
            }

            if !changed {
                log::debug!(
                    "assembled {} instructions in {} layout pass(es), {} widened jump(s)",
                    self.items.len(),
                    passes,
                    wide.iter().filter(|w| **w).count()
                );
                let ops = self
                    .items
                    .iter()
                    .zip(&wide)
                    .map(|(item, wide)| match item {
                        Item::Jump { kind, .. } => {
                            let (short, long) = kind.opcodes();
                            Some(if *wide { long } else { short })
                        }
                        Item::Instr { .. } => None,
                    })
                    .collect();
                return Ok((offsets, ops));
            }
        }
    }

    fn offsets(&self, wide: &[bool]) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.items.len() + 1);
        let mut pc = 0;
        for (item, wide) in self.items.iter().zip(wide) {
            offsets.push(pc);
            pc += match item {
                Item::Instr { op, .. } => op.width(),
                Item::Jump { .. } if *wide => 5,
                Item::Jump { .. } => 2,
            };
        }
        offsets.push(pc);
        offsets
    }

    /// Assembles the final bytecode.
    pub fn assemble(
        self,
        source: Rc<str>,
        epoch: u64,
        param_names: &[Value],
    ) -> Result<ByteCode, CompileError> {
        if !self.open_ranges.is_empty() {
            return Err(CompileError::RangeOrder);
        }

        let (offsets, jump_ops) = self.layout()?;
        let mut code = Vec::with_capacity(offsets[self.items.len()]);

        for (i, item) in self.items.iter().enumerate() {
            let (op, operands) = match item {
                Item::Instr { op, operands } => (*op, *operands),
                Item::Jump { target, .. } => {
                    let distance = offsets[self.label_pos(*target)?] as i64 - offsets[i] as i64;
                    let op = jump_ops[i].ok_or(CompileError::UnplacedLabel)?;
                    (op, [distance, 0])
                }
            };

            code.push(op as u8);
            for (operand, value) in op.operands().iter().zip(operands) {
                match operand.width() {
                    1 => code.push(value as u8),
                    _ => code.extend_from_slice(&(value as u32).to_le_bytes()),
                }
            }
        }

        let mut aux = Vec::with_capacity(self.aux.len());
        for builder in &self.aux {
            match builder {
                AuxBuilder::JumpTable(entries) => {
                    // The table's offsets are relative to its jumpTable instruction.
                    let base = self.items.iter().position(|item| {
                        matches!(item, Item::Instr { op: Opcode::JumpTable, operands }
                            if operands[0] as usize == aux.len())
                    });
                    let base = offsets[base.ok_or(CompileError::UnplacedLabel)?] as isize;
                    let mut table = JumpTable::default();
                    for (key, label) in entries {
                        let target = offsets[self.label_pos(*label)?] as isize;
                        table.entries.insert(key.clone(), target - base);
                    }
                    aux.push(AuxData::JumpTable(table));
                }
            }
        }

        let mut ranges = Vec::with_capacity(self.ranges.len());
        for range in &self.ranges {
            let start = offsets[range.start];
            let end = offsets[range.end.ok_or(CompileError::RangeOrder)?];
            let target = |label: Option<Label>| -> Result<usize, CompileError> {
                Ok(offsets[self.label_pos(label.ok_or(CompileError::UnplacedLabel)?)?])
            };
            let targets = match range.kind {
                RangeKind::Loop => RangeTargets::Loop {
                    break_pc: target(range.break_target)?,
                    continue_pc: target(range.continue_target)?,
                },
                RangeKind::Catch => RangeTargets::Catch {
                    catch_pc: target(range.catch_target)?,
                },
            };
            ranges.push(ExceptionRange {
                kind: range.kind,
                nesting: range.nesting,
                code_start: start,
                code_len: end - start,
                stack_depth: range.depth,
                targets,
            });
        }

        let cmd_locs = self
            .cmd_locs
            .iter()
            .map(|loc| CmdLocation {
                code_start: offsets[loc.start],
                code_len: offsets[loc.end] - offsets[loc.start],
                source_start: loc.source_start,
                source_len: loc.source_len,
                line: loc.line,
            })
            .collect();

        // Parameters keep their own name values, so that name caches made against
        // them stay valid for the life of the procedure.
        let local_names: Vec<Value> = self
            .locals
            .iter()
            .enumerate()
            .map(|(i, name)| match param_names.get(i) {
                Some(param) if param.as_str() == name => param.clone(),
                _ => Value::from(name.as_str()),
            })
            .collect();

        Ok(ByteCode {
            code,
            literals: self.literals.iter().map(|lit| Value::from(lit.as_str())).collect(),
            aux,
            ranges,
            cmd_locs,
            local_names: Rc::new(local_names),
            source,
            epoch,
            max_stack: self.max_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::bytecode::Instruction;

    fn assemble(env: CompileEnv) -> ByteCode {
        env.assemble(Rc::from(""), 0, &[]).unwrap()
    }

    #[test]
    fn test_literal_dedup() {
        let mut env = CompileEnv::new();
        env.push_literal("a");
        env.push_literal("b");
        env.push_literal("a");
        assert_eq!(env.depth(), 3);

        let code = assemble(env);
        assert_eq!(code.literals().len(), 2);
        let insts = code.instructions();
        assert_eq!(insts[0].operands[0], insts[2].operands[0]);
    }

    #[test]
    fn test_short_and_long_jumps() {
        let mut env = CompileEnv::new();
        let short = env.forward_jump(JumpKind::Always);
        env.resolve_here(short);

        let long = env.forward_jump(JumpKind::Always);
        for i in 0..100 {
            env.push_literal(&format!("lit{}", i));
            env.emit(Opcode::Pop);
        }
        env.resolve_here(long);

        let code = assemble(env);
        let insts = code.instructions();
        assert_eq!(insts[0].op, Opcode::Jump1);
        assert_eq!(insts[0].operands[0], 2);
        assert_eq!(insts[1].op, Opcode::Jump4);
        assert_eq!(insts[1].pc + insts[1].operands[0] as usize, code.code().len());
    }

    #[test]
    fn test_widening_cascade() {
        // Many nested forward jumps, each spanning the ones opened after it; resolving
        // them innermost first widens the outer ones.
        let mut env = CompileEnv::new();
        let mut fixups = Vec::new();
        let mut targets = Vec::new();

        for i in 0..40 {
            fixups.push(env.forward_jump(JumpKind::Always));
            env.push_literal(&format!("lit{}", i));
            env.emit(Opcode::Pop);
        }
        while let Some(fixup) = fixups.pop() {
            targets.push(env.instruction_count());
            env.resolve_here(fixup);
            env.push_literal("x");
            env.emit(Opcode::Pop);
        }

        let code = assemble(env);
        let insts = code.instructions();
        let jumps: Vec<&Instruction> = insts.iter().filter(|i| i.op.is_jump()).collect();
        assert_eq!(jumps.len(), 40);
        assert!(jumps.iter().any(|j| j.op == Opcode::Jump4));
        assert!(jumps.iter().any(|j| j.op == Opcode::Jump1));

        // Every jump lands on an instruction boundary: the one its label was placed at.
        targets.reverse();
        for (jump, target_item) in jumps.iter().zip(targets) {
            let dest = (jump.pc as i64 + jump.operands[0]) as usize;
            assert_eq!(dest, insts[target_item].pc);
        }
    }

    #[test]
    fn test_backward_jump() {
        let mut env = CompileEnv::new();
        let top = env.new_label();
        env.place(top);
        env.push_literal("x");
        env.emit(Opcode::Pop);
        env.backward_jump(JumpKind::Always, top);

        let code = assemble(env);
        let insts = code.instructions();
        assert_eq!(insts[2].op, Opcode::Jump1);
        assert_eq!(insts[2].operands[0], -(insts[2].pc as i64));
    }

    #[test]
    fn test_rewind() {
        let mut env = CompileEnv::new();
        env.push_literal("keep");
        let checkpoint = env.checkpoint();

        env.push_literal("drop");
        let range = env.open_range(RangeKind::Catch);
        let _ = env.forward_jump(JumpKind::IfTrue);
        let _ = range;

        env.rewind(checkpoint);
        assert_eq!(env.depth(), 1);
        assert_eq!(env.instruction_count(), 1);
        assert!(env.innermost_range().is_none());

        let code = assemble(env);
        assert_eq!(code.literals().len(), 1);
    }

    #[test]
    fn test_ranges_close_in_order() {
        let mut env = CompileEnv::new();
        let outer = env.open_range(RangeKind::Loop);
        let inner = env.open_range(RangeKind::Catch);
        assert_eq!(env.close_range(outer), Err(CompileError::RangeOrder));
        assert!(env.close_range(inner).is_ok());
        assert!(env.close_range(outer).is_ok());
    }

    #[test]
    fn test_jump_table() {
        let mut env = CompileEnv::new();
        env.push_literal("b");
        let a = env.new_label();
        let b = env.new_label();
        let mut entries = IndexMap::default();
        entries.insert("a".to_string(), a);
        entries.insert("b".to_string(), b);
        env.emit_jump_table(entries);

        env.push_literal("none");
        let done = env.forward_jump(JumpKind::Always);
        env.adjust_depth(-1);
        env.place(a);
        env.push_literal("A");
        let done_a = env.forward_jump(JumpKind::Always);
        env.adjust_depth(-1);
        env.place(b);
        env.push_literal("B");
        env.resolve_here(done);
        env.resolve_here(done_a);

        let code = assemble(env);
        let insts = code.instructions();
        let table = code.jump_table(0).unwrap();
        let jt = insts[1];
        let b_pc = (jt.pc as isize + table.entries["b"]) as usize;
        let at_b = insts.iter().find(|i| i.pc == b_pc).unwrap();
        assert_eq!(code.literals()[at_b.operands[0] as usize].as_str(), "B");
    }
}
