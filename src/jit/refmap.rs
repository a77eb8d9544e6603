//! Reference-map editor: fills in the stack reference maps of a method's
//! packed stops.
//!
//! Runs as a second pass over the bytecode, only when the method recorded
//! at least one stop. An abstract interpreter tracks a frame state (per
//! slot: reference / scalar / uninitialized) per basic block, propagates it
//! along fall-through, branch, switch, and exception edges to a fixed
//! point, and then sets one reference-map bit for every live reference
//! local and operand-stack slot at each stop. False positives are
//! conservative; a live reference must never be missed.

use std::collections::{HashMap, VecDeque};

use crate::bytecode::pool::PoolEntry;
use crate::bytecode::{ops, Kind, Method};

use super::frame::FrameLayout;
use super::stops::{set_map_bit, Stops};
use super::translator::{TranslateError, VerifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotTy {
    Uninit,
    Scalar,
    Ref,
}

impl SlotTy {
    fn merge(a: SlotTy, b: SlotTy) -> SlotTy {
        if a == b { a } else { SlotTy::Scalar }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FrameState {
    /// Locals followed by the operand stack.
    slots: Vec<SlotTy>,
    max_locals: usize,
    sp: usize,
}

impl FrameState {
    fn entry(method: &Method) -> FrameState {
        let mut slots = vec![SlotTy::Uninit; method.max_locals + method.max_stack];
        let mut index = 0;
        for &kind in &method.params {
            if kind.is_category1() {
                slots[index] = if kind.is_reference() {
                    SlotTy::Ref
                } else {
                    SlotTy::Scalar
                };
                index += 1;
            } else {
                slots[index] = SlotTy::Scalar;
                slots[index + 1] = SlotTy::Scalar;
                index += 2;
            }
        }
        FrameState {
            slots,
            max_locals: method.max_locals,
            sp: 0,
        }
    }

    fn local(&self, index: usize) -> SlotTy {
        self.slots[index]
    }

    fn set_local(&mut self, index: usize, ty: SlotTy) {
        self.slots[index] = ty;
    }

    fn stack(&self, index: usize) -> SlotTy {
        self.slots[self.max_locals + index]
    }

    fn push(&mut self, ty: SlotTy, bci: usize) -> Result<(), TranslateError> {
        let slot = self.max_locals + self.sp;
        if slot >= self.slots.len() {
            return Err(VerifyError::OperandStack { bci }.into());
        }
        self.slots[slot] = ty;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self, bci: usize) -> Result<SlotTy, TranslateError> {
        if self.sp == 0 {
            return Err(VerifyError::OperandStack { bci }.into());
        }
        self.sp -= 1;
        Ok(self.slots[self.max_locals + self.sp])
    }

    fn pop_n(&mut self, n: usize, bci: usize) -> Result<(), TranslateError> {
        if self.sp < n {
            return Err(VerifyError::OperandStack { bci }.into());
        }
        self.sp -= n;
        Ok(())
    }

    /// Push a value of `kind`: category-2 values occupy two stack slots.
    fn push_kind(&mut self, kind: Kind, bci: usize) -> Result<(), TranslateError> {
        match kind {
            Kind::Void => Ok(()),
            Kind::Reference => self.push(SlotTy::Ref, bci),
            Kind::Long | Kind::Double => {
                self.push(SlotTy::Scalar, bci)?;
                self.push(SlotTy::Scalar, bci)
            }
            _ => self.push(SlotTy::Scalar, bci),
        }
    }

    /// Merge `other` into `self`; true if anything changed. Stack heights
    /// must agree at merge points.
    fn merge_from(&mut self, other: &FrameState, bci: usize) -> Result<bool, TranslateError> {
        if self.sp != other.sp {
            return Err(VerifyError::OperandStack { bci }.into());
        }
        let mut changed = false;
        let live = self.max_locals + self.sp;
        for i in 0..live {
            let merged = SlotTy::merge(self.slots[i], other.slots[i]);
            if merged != self.slots[i] {
                self.slots[i] = merged;
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Control transfer out of one instruction.
enum Flow {
    Next,
    Jump(usize),
    Branch(usize),
    Switch(Vec<usize>),
    End,
}

pub struct RefMapEditor<'a> {
    method: &'a Method,
    frame: &'a FrameLayout,
    /// Block starts from the translation pass, extended with every
    /// exception-handler entry.
    starts: Vec<bool>,
}

impl<'a> RefMapEditor<'a> {
    pub fn new(method: &'a Method, frame: &'a FrameLayout, block_starts: &[bool]) -> Self {
        let mut starts = block_starts.to_vec();
        for handler in &method.exception_handlers {
            starts[handler.handler_bci] = true;
        }
        RefMapEditor {
            method,
            frame,
            starts,
        }
    }

    /// Computes frame states to a fixed point, then sets the reference-map
    /// bits of every stop in `stops`.
    pub fn edit(&self, stops: &mut Stops) -> Result<(), TranslateError> {
        if stops.stop_count() == 0 {
            return Ok(());
        }
        let entry_states = self.fixed_point()?;

        // Group the stop-bearing bcis by containing block.
        let mut by_block: HashMap<usize, Vec<usize>> = HashMap::new();
        for bci in stops.bcis_with_stops() {
            by_block.entry(self.block_of(bci)).or_default().push(bci);
        }

        for (&block, bcis) in &by_block {
            let Some(entry) = entry_states.get(&block) else {
                // Unreachable code: its stops keep all-clear maps.
                continue;
            };
            let mut state = entry.clone();
            let end = self.block_end(block);
            let mut pc = block;
            let mut remaining = bcis.len();
            while pc < end && remaining > 0 {
                if bcis.contains(&pc) {
                    self.mark_stops_at(pc, &state, stops)?;
                    remaining -= 1;
                }
                let (flow, next) = self.step(&mut state, pc)?;
                match flow {
                    Flow::Next | Flow::Branch(_) => pc = next,
                    _ => break,
                }
            }
        }
        Ok(())
    }

    fn block_of(&self, bci: usize) -> usize {
        let mut block = bci;
        while !self.starts[block] {
            block -= 1;
        }
        block
    }

    fn block_end(&self, block: usize) -> usize {
        let mut end = block + 1;
        while end < self.starts.len() && !self.starts[end] {
            end += 1;
        }
        end
    }

    /// Worklist propagation of block entry states.
    fn fixed_point(&self) -> Result<HashMap<usize, FrameState>, TranslateError> {
        let code_len = self.method.code.len();
        let mut entry_states: HashMap<usize, FrameState> = HashMap::new();
        let mut worklist = VecDeque::new();
        entry_states.insert(0, FrameState::entry(self.method));
        worklist.push_back(0usize);

        while let Some(block) = worklist.pop_front() {
            let mut state = entry_states[&block].clone();
            let end = self.block_end(block);
            let mut pc = block;
            let mut exits: Vec<usize> = Vec::new();
            loop {
                // Handler entries are reachable from every covered
                // instruction, with the locals as they are here and a
                // single exception reference on the stack.
                self.propagate_to_handlers(pc, &state, &mut entry_states, &mut worklist)?;

                let (flow, next) = self.step(&mut state, pc)?;
                match flow {
                    Flow::Next => {
                        if next >= code_len {
                            break;
                        }
                        if self.starts[next] {
                            exits.push(next);
                            break;
                        }
                        pc = next;
                    }
                    Flow::Jump(target) => {
                        exits.push(target);
                        break;
                    }
                    Flow::Branch(target) => {
                        exits.push(target);
                        if next >= code_len {
                            break;
                        }
                        if self.starts[next] {
                            exits.push(next);
                            break;
                        }
                        pc = next;
                    }
                    Flow::Switch(targets) => {
                        exits.extend(targets);
                        break;
                    }
                    Flow::End => break,
                }
                if pc >= end {
                    break;
                }
            }
            for target in exits {
                self.propagate(target, &state, &mut entry_states, &mut worklist)?;
            }
        }
        Ok(entry_states)
    }

    fn propagate(
        &self,
        target: usize,
        state: &FrameState,
        entry_states: &mut HashMap<usize, FrameState>,
        worklist: &mut VecDeque<usize>,
    ) -> Result<(), TranslateError> {
        match entry_states.get_mut(&target) {
            None => {
                entry_states.insert(target, state.clone());
                worklist.push_back(target);
            }
            Some(existing) => {
                if existing.merge_from(state, target)? {
                    worklist.push_back(target);
                }
            }
        }
        Ok(())
    }

    fn propagate_to_handlers(
        &self,
        pc: usize,
        state: &FrameState,
        entry_states: &mut HashMap<usize, FrameState>,
        worklist: &mut VecDeque<usize>,
    ) -> Result<(), TranslateError> {
        for handler in &self.method.exception_handlers {
            if pc >= handler.start_bci && pc < handler.end_bci {
                let mut at_handler = state.clone();
                at_handler.sp = 0;
                at_handler.push(SlotTy::Ref, pc)?;
                self.propagate(handler.handler_bci, &at_handler, entry_states, worklist)?;
            }
        }
        Ok(())
    }

    /// Sets the frame-map bits of every stop recorded at `bci` from the
    /// frame state on entry to that instruction. For a call stop whose
    /// arguments are already popped, the outgoing argument slots are dead
    /// here: the callee's own map covers them.
    fn mark_stops_at(
        &self,
        bci: usize,
        state: &FrameState,
        stops: &mut Stops,
    ) -> Result<(), TranslateError> {
        let consumed = self.invoke_consumed_slots(bci)?;
        let stop_indices: Vec<usize> = stops.stops_at(bci).collect();
        for stop in stop_indices {
            let live_stack = if stops.parameters_popped(stop) {
                state.sp.saturating_sub(consumed)
            } else {
                state.sp
            };
            let map = stops.frame_map_mut(stop);
            for local in 0..self.frame.max_locals {
                if state.local(local) == SlotTy::Ref {
                    set_map_bit(map, self.frame.local_bit(local));
                }
            }
            for slot in 0..live_stack {
                if state.stack(slot) == SlotTy::Ref {
                    set_map_bit(map, self.frame.stack_bit(slot));
                }
            }
        }
        Ok(())
    }

    /// Operand-stack slots consumed by the invoke at `bci` (receiver plus
    /// arguments), or 0 for non-invoke instructions.
    fn invoke_consumed_slots(&self, bci: usize) -> Result<usize, TranslateError> {
        let code = &self.method.code;
        let pool = &self.method.pool;
        let opcode = code[bci];
        let slots = match opcode {
            ops::INVOKESTATIC => {
                let index = ops::read_u2(code, bci + 1).unwrap_or(0);
                pool.method_at(index)?.signature.arg_slots()
            }
            ops::INVOKEVIRTUAL | ops::INVOKESPECIAL => {
                let index = ops::read_u2(code, bci + 1).unwrap_or(0);
                pool.method_at(index)?.signature.arg_slots() + 1
            }
            ops::INVOKEINTERFACE => {
                let index = ops::read_u2(code, bci + 1).unwrap_or(0);
                pool.interface_method_at(index)?.signature.arg_slots() + 1
            }
            _ => 0,
        };
        Ok(slots)
    }

    // ========================================
    // Abstract interpretation of one instruction
    // ========================================

    /// Applies the frame effect of the instruction at `pc`, returning its
    /// control flow and the fall-through position.
    fn step(&self, state: &mut FrameState, pc: usize) -> Result<(Flow, usize), TranslateError> {
        use crate::bytecode::ops::*;

        let code = &self.method.code;
        let len = ops::length_of(code, pc).ok_or(TranslateError::UnsupportedOpcode {
            bci: pc,
            opcode: code[pc],
        })?;
        let next = pc + len;
        let mut opcode = code[pc];
        let mut operand_pc = pc + 1;
        let wide = opcode == WIDE;
        if wide {
            opcode = code[pc + 1];
            operand_pc += 1;
        }
        let var_index = |at: usize| -> usize {
            if wide {
                ops::read_u2(code, at).unwrap_or(0) as usize
            } else {
                code.get(at).copied().unwrap_or(0) as usize
            }
        };

        let flow = match opcode {
            NOP | IINC | PAUSE | UNSAFE_CAST | MEMBAR => Flow::Next,
            MOV_I2F | MOV_F2I | MOV_L2D | MOV_D2L => Flow::Next,

            ACONST_NULL => {
                state.push(SlotTy::Ref, pc)?;
                Flow::Next
            }
            ICONST_M1..=ICONST_5 | BIPUSH | SIPUSH | FCONST_0..=FCONST_2 | WCONST_0 => {
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => {
                state.push_kind(Kind::Long, pc)?;
                Flow::Next
            }
            LDC | LDC_W | LDC2_W => {
                let index = if opcode == LDC {
                    code[pc + 1] as u16
                } else {
                    ops::read_u2(code, pc + 1).unwrap_or(0)
                };
                match self.method.pool.at(index)? {
                    PoolEntry::Integer(_) | PoolEntry::Float(_) => {
                        state.push(SlotTy::Scalar, pc)?
                    }
                    PoolEntry::Long(_) | PoolEntry::Double(_) => {
                        state.push_kind(Kind::Long, pc)?
                    }
                    _ => state.push(SlotTy::Ref, pc)?,
                }
                Flow::Next
            }

            ILOAD | FLOAD => {
                let _ = var_index(operand_pc);
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            WLOAD => {
                let _ = var_index(operand_pc);
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            LLOAD | DLOAD => {
                let _ = var_index(operand_pc);
                state.push_kind(Kind::Long, pc)?;
                Flow::Next
            }
            ALOAD => {
                let _ = var_index(operand_pc);
                state.push(SlotTy::Ref, pc)?;
                Flow::Next
            }
            ILOAD_0..=ILOAD_3 | FLOAD_0..=FLOAD_3 | WLOAD_0..=WLOAD_3 => {
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            LLOAD_0..=LLOAD_3 | DLOAD_0..=DLOAD_3 => {
                state.push_kind(Kind::Long, pc)?;
                Flow::Next
            }
            ALOAD_0..=ALOAD_3 => {
                state.push(SlotTy::Ref, pc)?;
                Flow::Next
            }

            ISTORE | FSTORE | WSTORE => {
                let index = var_index(operand_pc);
                state.pop(pc)?;
                state.set_local(index, SlotTy::Scalar);
                Flow::Next
            }
            LSTORE | DSTORE => {
                let index = var_index(operand_pc);
                state.pop_n(2, pc)?;
                state.set_local(index, SlotTy::Scalar);
                state.set_local(index + 1, SlotTy::Scalar);
                Flow::Next
            }
            ASTORE => {
                let index = var_index(operand_pc);
                let ty = state.pop(pc)?;
                state.set_local(index, ty);
                Flow::Next
            }
            ISTORE_0..=ISTORE_3 => {
                state.pop(pc)?;
                state.set_local((opcode - ISTORE_0) as usize, SlotTy::Scalar);
                Flow::Next
            }
            FSTORE_0..=FSTORE_3 => {
                state.pop(pc)?;
                state.set_local((opcode - FSTORE_0) as usize, SlotTy::Scalar);
                Flow::Next
            }
            WSTORE_0..=WSTORE_3 => {
                state.pop(pc)?;
                state.set_local((opcode - WSTORE_0) as usize, SlotTy::Scalar);
                Flow::Next
            }
            LSTORE_0..=LSTORE_3 => {
                let index = (opcode - LSTORE_0) as usize;
                state.pop_n(2, pc)?;
                state.set_local(index, SlotTy::Scalar);
                state.set_local(index + 1, SlotTy::Scalar);
                Flow::Next
            }
            DSTORE_0..=DSTORE_3 => {
                let index = (opcode - DSTORE_0) as usize;
                state.pop_n(2, pc)?;
                state.set_local(index, SlotTy::Scalar);
                state.set_local(index + 1, SlotTy::Scalar);
                Flow::Next
            }
            ASTORE_0..=ASTORE_3 => {
                let ty = state.pop(pc)?;
                state.set_local((opcode - ASTORE_0) as usize, ty);
                Flow::Next
            }

            IALOAD | FALOAD | BALOAD | CALOAD | SALOAD => {
                state.pop_n(2, pc)?;
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            LALOAD | DALOAD => {
                state.pop_n(2, pc)?;
                state.push_kind(Kind::Long, pc)?;
                Flow::Next
            }
            AALOAD => {
                state.pop_n(2, pc)?;
                state.push(SlotTy::Ref, pc)?;
                Flow::Next
            }
            IASTORE | FASTORE | BASTORE | CASTORE | SASTORE | AASTORE => {
                state.pop_n(3, pc)?;
                Flow::Next
            }
            LASTORE | DASTORE => {
                state.pop_n(4, pc)?;
                Flow::Next
            }

            POP => {
                state.pop(pc)?;
                Flow::Next
            }
            POP2 => {
                state.pop_n(2, pc)?;
                Flow::Next
            }
            DUP => {
                let a = state.pop(pc)?;
                state.push(a, pc)?;
                state.push(a, pc)?;
                Flow::Next
            }
            DUP_X1 => {
                let a = state.pop(pc)?;
                let b = state.pop(pc)?;
                state.push(a, pc)?;
                state.push(b, pc)?;
                state.push(a, pc)?;
                Flow::Next
            }
            DUP_X2 => {
                let a = state.pop(pc)?;
                let b = state.pop(pc)?;
                let c = state.pop(pc)?;
                state.push(a, pc)?;
                state.push(c, pc)?;
                state.push(b, pc)?;
                state.push(a, pc)?;
                Flow::Next
            }
            DUP2 => {
                let a = state.pop(pc)?;
                let b = state.pop(pc)?;
                state.push(b, pc)?;
                state.push(a, pc)?;
                state.push(b, pc)?;
                state.push(a, pc)?;
                Flow::Next
            }
            DUP2_X1 => {
                let a = state.pop(pc)?;
                let b = state.pop(pc)?;
                let c = state.pop(pc)?;
                state.push(b, pc)?;
                state.push(a, pc)?;
                state.push(c, pc)?;
                state.push(b, pc)?;
                state.push(a, pc)?;
                Flow::Next
            }
            DUP2_X2 => {
                let a = state.pop(pc)?;
                let b = state.pop(pc)?;
                let c = state.pop(pc)?;
                let d = state.pop(pc)?;
                state.push(b, pc)?;
                state.push(a, pc)?;
                state.push(d, pc)?;
                state.push(c, pc)?;
                state.push(b, pc)?;
                state.push(a, pc)?;
                Flow::Next
            }
            SWAP => {
                let a = state.pop(pc)?;
                let b = state.pop(pc)?;
                state.push(a, pc)?;
                state.push(b, pc)?;
                Flow::Next
            }

            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR
            | FADD | FSUB | FMUL | FDIV | FREM | WDIV | WDIVI | WREM | WREMI => {
                state.pop_n(2, pc)?;
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR | DADD | DSUB | DMUL
            | DDIV | DREM => {
                state.pop_n(4, pc)?;
                state.push_kind(Kind::Long, pc)?;
                Flow::Next
            }
            LSHL | LSHR | LUSHR => {
                // Value (2 slots) and int shift count.
                state.pop_n(3, pc)?;
                state.push_kind(Kind::Long, pc)?;
                Flow::Next
            }
            INEG | FNEG | LSB | MSB => {
                state.pop(pc)?;
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            LNEG | DNEG => Flow::Next,

            I2F | F2I | I2B | I2C | I2S => {
                state.pop(pc)?;
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            I2L | I2D | F2L | F2D => {
                state.pop(pc)?;
                state.push_kind(Kind::Long, pc)?;
                Flow::Next
            }
            L2I | L2F | D2I | D2F => {
                state.pop_n(2, pc)?;
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            L2D | D2L => Flow::Next,

            LCMP | DCMPL | DCMPG => {
                state.pop_n(4, pc)?;
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            FCMPL | FCMPG => {
                state.pop_n(2, pc)?;
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }

            IFEQ..=IFLE | IFNULL | IFNONNULL => {
                state.pop(pc)?;
                let target = branch_target(code, pc, 2)?;
                Flow::Branch(target)
            }
            IF_ICMPEQ..=IF_ICMPLE | IF_ACMPEQ | IF_ACMPNE => {
                state.pop_n(2, pc)?;
                let target = branch_target(code, pc, 2)?;
                Flow::Branch(target)
            }
            GOTO => Flow::Jump(branch_target(code, pc, 2)?),
            GOTO_W => Flow::Jump(branch_target(code, pc, 4)?),

            TABLESWITCH => {
                state.pop(pc)?;
                let base = ops::pad4(pc + 1);
                let mut targets = Vec::new();
                let default =
                    ops::read_s4(code, base).ok_or(VerifyError::TruncatedInstruction { bci: pc })?;
                targets.push(offset_target(pc, default as i64)?);
                let low = ops::read_s4(code, base + 4).unwrap_or(0);
                let high = ops::read_s4(code, base + 8).unwrap_or(-1);
                let cases = (high as i64 - low as i64 + 1).max(0) as usize;
                for i in 0..cases {
                    let off = ops::read_s4(code, base + 12 + i * 4)
                        .ok_or(VerifyError::TruncatedInstruction { bci: pc })?;
                    targets.push(offset_target(pc, off as i64)?);
                }
                Flow::Switch(targets)
            }
            LOOKUPSWITCH => {
                state.pop(pc)?;
                let base = ops::pad4(pc + 1);
                let mut targets = Vec::new();
                let default =
                    ops::read_s4(code, base).ok_or(VerifyError::TruncatedInstruction { bci: pc })?;
                targets.push(offset_target(pc, default as i64)?);
                let cases = ops::read_s4(code, base + 4).unwrap_or(0).max(0) as usize;
                for i in 0..cases {
                    let off = ops::read_s4(code, base + 8 + i * 8 + 4)
                        .ok_or(VerifyError::TruncatedInstruction { bci: pc })?;
                    targets.push(offset_target(pc, off as i64)?);
                }
                Flow::Switch(targets)
            }

            IRETURN | FRETURN | WRETURN | LRETURN | DRETURN | ARETURN | RETURN => Flow::End,
            ATHROW => {
                state.pop(pc)?;
                Flow::End
            }

            GETFIELD | GETSTATIC | PUTFIELD | PUTSTATIC => {
                let index = ops::read_u2(code, pc + 1).unwrap_or(0);
                let kind = self.method.pool.field_at(index)?.kind;
                match opcode {
                    GETFIELD => {
                        state.pop(pc)?;
                        state.push_kind(kind, pc)?;
                    }
                    GETSTATIC => state.push_kind(kind, pc)?,
                    PUTFIELD => state.pop_n(1 + kind.stack_slots(), pc)?,
                    _ => state.pop_n(kind.stack_slots(), pc)?,
                }
                Flow::Next
            }

            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
                let index = ops::read_u2(code, pc + 1).unwrap_or(0);
                let signature = if opcode == INVOKEINTERFACE {
                    &self.method.pool.interface_method_at(index)?.signature
                } else {
                    &self.method.pool.method_at(index)?.signature
                };
                let receiver = if opcode == INVOKESTATIC { 0 } else { 1 };
                state.pop_n(signature.arg_slots() + receiver, pc)?;
                state.push_kind(signature.result, pc)?;
                Flow::Next
            }

            NEW => {
                state.push(SlotTy::Ref, pc)?;
                Flow::Next
            }
            NEWARRAY | ANEWARRAY => {
                state.pop(pc)?;
                state.push(SlotTy::Ref, pc)?;
                Flow::Next
            }
            MULTIANEWARRAY => {
                let dimensions = code[pc + 3] as usize;
                state.pop_n(dimensions, pc)?;
                state.push(SlotTy::Ref, pc)?;
                Flow::Next
            }
            ARRAYLENGTH | INSTANCEOF => {
                state.pop(pc)?;
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            CHECKCAST => {
                state.pop(pc)?;
                state.push(SlotTy::Ref, pc)?;
                Flow::Next
            }
            MONITORENTER | MONITOREXIT => {
                state.pop(pc)?;
                Flow::Next
            }

            PREAD => {
                let sub = ops::read_u2(code, pc + 1).unwrap_or(0);
                let pops = if sub & pointer_sub::INDEXED != 0 { 3 } else { 2 };
                state.pop_n(pops, pc)?;
                state.push_kind(pointer_kind(sub), pc)?;
                Flow::Next
            }
            PWRITE => {
                let sub = ops::read_u2(code, pc + 1).unwrap_or(0);
                let base = if sub & pointer_sub::INDEXED != 0 { 3 } else { 2 };
                state.pop_n(base + pointer_kind(sub).stack_slots(), pc)?;
                Flow::Next
            }
            PGET => {
                let sub = ops::read_u2(code, pc + 1).unwrap_or(0);
                state.pop_n(3, pc)?;
                state.push_kind(pointer_kind(sub), pc)?;
                Flow::Next
            }
            PSET => {
                let sub = ops::read_u2(code, pc + 1).unwrap_or(0);
                state.pop_n(3 + pointer_kind(sub).stack_slots(), pc)?;
                Flow::Next
            }
            PCMPSWP => {
                let sub = ops::read_u2(code, pc + 1).unwrap_or(0);
                let kind = pointer_kind(sub);
                state.pop_n(2 + 2 * kind.stack_slots(), pc)?;
                state.push_kind(kind, pc)?;
                Flow::Next
            }
            READREG => {
                state.push(SlotTy::Scalar, pc)?;
                Flow::Next
            }
            WRITEREG => {
                state.pop(pc)?;
                Flow::Next
            }

            other => {
                return Err(TranslateError::UnsupportedOpcode {
                    bci: pc,
                    opcode: other,
                })
            }
        };
        Ok((flow, next))
    }
}

fn branch_target(code: &[u8], pc: usize, width: usize) -> Result<usize, TranslateError> {
    let offset = if width == 2 {
        ops::read_s2(code, pc + 1).ok_or(VerifyError::TruncatedInstruction { bci: pc })? as i64
    } else {
        ops::read_s4(code, pc + 1).ok_or(VerifyError::TruncatedInstruction { bci: pc })? as i64
    };
    offset_target(pc, offset)
}

fn offset_target(pc: usize, offset: i64) -> Result<usize, TranslateError> {
    let target = pc as i64 + offset;
    if target < 0 {
        return Err(VerifyError::BadBranchTarget {
            bci: pc,
            target: 0,
        }
        .into());
    }
    Ok(target as usize)
}

fn pointer_kind(sub: u16) -> Kind {
    use crate::bytecode::ops::pointer_sub;
    match sub & pointer_sub::KIND_MASK {
        pointer_sub::BYTE => Kind::Byte,
        pointer_sub::CHAR => Kind::Char,
        pointer_sub::SHORT => Kind::Short,
        pointer_sub::INT => Kind::Int,
        pointer_sub::LONG => Kind::Long,
        pointer_sub::FLOAT => Kind::Float,
        pointer_sub::DOUBLE => Kind::Double,
        pointer_sub::WORD => Kind::Word,
        pointer_sub::REFERENCE => Kind::Reference,
        _ => Kind::Word,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_merge() {
        assert_eq!(SlotTy::merge(SlotTy::Ref, SlotTy::Ref), SlotTy::Ref);
        assert_eq!(SlotTy::merge(SlotTy::Ref, SlotTy::Scalar), SlotTy::Scalar);
        assert_eq!(SlotTy::merge(SlotTy::Uninit, SlotTy::Ref), SlotTy::Scalar);
    }

    #[test]
    fn test_entry_state_from_params() {
        use crate::bytecode::pool::ConstantPool;
        use crate::bytecode::symbols::Symbol;
        let method = Method {
            name: Symbol::intern("t/E.entry"),
            code: vec![ops::RETURN].into_boxed_slice(),
            params: vec![Kind::Reference, Kind::Long, Kind::Int],
            max_locals: 6,
            max_stack: 2,
            exception_handlers: vec![],
            pool: ConstantPool::new(vec![]),
        };
        let state = FrameState::entry(&method);
        assert_eq!(state.local(0), SlotTy::Ref);
        assert_eq!(state.local(1), SlotTy::Scalar);
        assert_eq!(state.local(2), SlotTy::Scalar);
        assert_eq!(state.local(3), SlotTy::Scalar);
        assert_eq!(state.local(4), SlotTy::Uninit);
        assert_eq!(state.sp, 0);
    }

    #[test]
    fn test_dup_x1_preserves_types() {
        let mut state = FrameState {
            slots: vec![SlotTy::Uninit; 4],
            max_locals: 0,
            sp: 0,
        };
        state.push(SlotTy::Ref, 0).unwrap();
        state.push(SlotTy::Scalar, 0).unwrap();
        // simulate dup_x1 by hand through pops/pushes
        let a = state.pop(0).unwrap();
        let b = state.pop(0).unwrap();
        state.push(a, 0).unwrap();
        state.push(b, 0).unwrap();
        state.push(a, 0).unwrap();
        assert_eq!(state.stack(0), SlotTy::Scalar);
        assert_eq!(state.stack(1), SlotTy::Ref);
        assert_eq!(state.stack(2), SlotTy::Scalar);
    }
}
