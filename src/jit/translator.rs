//! The bytecode-to-target translator.
//!
//! A single forward pass over a method's bytecode. Each instruction selects
//! a template (kind-specialized, and resolution-state-specialized where the
//! instruction references the constant pool), patches the template's
//! operand sites in a scratch copy, appends the bytes to the code buffer,
//! and records the stops the template carries. Branches and switches whose
//! targets have not been emitted yet leave placeholders behind and are
//! patched by the epilogue fixup once every code position is known.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::bytecode::pool::{
    FieldRefEntry, LinkCell, MethodInfo, MethodProfile, MethodRefEntry, ObjRef, PoolError,
    ResolveOp,
};
use crate::bytecode::symbols::Symbol;
use crate::bytecode::{ops, Kind, Method};
use crate::config::TranslatorOptions;

use super::codebuf::CodeBuffer;
use super::frame::{FrameLayout, SLOT_BYTES};
use super::modifier::{DispWidth, EncodeError, InstructionModifier};
use super::stops::{Stop, StopsBuilder};
use super::template::{
    Addressing, ArithOp, Barrier, BranchCondition, CmpNan, DispatchVariant, RegRole, Resolution,
    StackOp, StaticResolution, Template, TemplateCatalog, TemplateId,
};

/// Receiver-type profiling at call sites is disabled by policy; the
/// instrumented-template path below is kept structurally intact.
const RECEIVER_PROFILING: bool = false;

/// Receiver-profile slots reserved per instrumented call site.
const RECEIVER_PROFILE_ENTRIES: usize = 2;

// ========================================
// Errors
// ========================================

/// Structural verification failure: the input bytecode is malformed. This
/// aborts translation of the method but indicates bad input, not a
/// translator bug.
#[derive(Debug, Clone)]
pub enum VerifyError {
    /// tableswitch with low > high.
    TableSwitchBounds { bci: usize, low: i32, high: i32 },
    /// lookupswitch with a negative case count.
    LookupSwitchCount { bci: usize, count: i32 },
    /// A branch or switch target outside the method, or into the middle of
    /// an instruction.
    BadBranchTarget { bci: usize, target: usize },
    /// Instruction operands run past the end of the bytecode.
    TruncatedInstruction { bci: usize },
    /// newarray with an unknown element-type tag.
    BadArrayTag { bci: usize, tag: u8 },
    /// Operand-stack underflow/overflow or a merge-height conflict found
    /// while tracking frame states.
    OperandStack { bci: usize },
    /// A constant-pool access found an entry of the wrong shape.
    Pool(PoolError),
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::TableSwitchBounds { bci, low, high } => {
                write!(f, "tableswitch at bci {}: low {} > high {}", bci, low, high)
            }
            VerifyError::LookupSwitchCount { bci, count } => {
                write!(f, "lookupswitch at bci {}: negative case count {}", bci, count)
            }
            VerifyError::BadBranchTarget { bci, target } => {
                write!(f, "branch at bci {} to invalid target {}", bci, target)
            }
            VerifyError::TruncatedInstruction { bci } => {
                write!(f, "instruction at bci {} runs past end of code", bci)
            }
            VerifyError::BadArrayTag { bci, tag } => {
                write!(f, "newarray at bci {}: unknown element tag {}", bci, tag)
            }
            VerifyError::OperandStack { bci } => {
                write!(f, "inconsistent operand stack at bci {}", bci)
            }
            VerifyError::Pool(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Failure of one method's translation. `Verify` marks malformed input;
/// the remaining variants are internal invariant violations (a bug in the
/// translator or in an upstream collaborator). Nothing partial is ever
/// published either way.
#[derive(Debug)]
pub enum TranslateError {
    /// An opcode the exhaustive dispatch does not recognize reached the
    /// translator; the stream should have been rejected earlier.
    UnsupportedOpcode { bci: usize, opcode: u8 },
    /// Operand decoding consumed a different number of bytes than the
    /// instruction's statically known length.
    LengthMismatch {
        bci: usize,
        opcode: u8,
        expected: usize,
        actual: usize,
    },
    /// An instruction-modifier patch did not fit its slot.
    Encode { bci: usize, error: EncodeError },
    Verify(VerifyError),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::UnsupportedOpcode { bci, opcode } => write!(
                f,
                "unsupported opcode {:#04x} ({}) at bci {}",
                opcode,
                ops::name_of(*opcode),
                bci
            ),
            TranslateError::LengthMismatch {
                bci,
                opcode,
                expected,
                actual,
            } => write!(
                f,
                "instruction {} at bci {} decoded {} bytes, expected {}",
                ops::name_of(*opcode),
                bci,
                actual,
                expected
            ),
            TranslateError::Encode { bci, error } => {
                write!(f, "operand encoding failed at bci {}: {}", bci, error)
            }
            TranslateError::Verify(e) => write!(f, "verification failed: {}", e),
        }
    }
}

impl std::error::Error for TranslateError {}

impl From<VerifyError> for TranslateError {
    fn from(e: VerifyError) -> Self {
        TranslateError::Verify(e)
    }
}

impl From<PoolError> for TranslateError {
    fn from(e: PoolError) -> Self {
        TranslateError::Verify(VerifyError::Pool(e))
    }
}

// ========================================
// Fixup records
// ========================================

/// A forward branch awaiting its target's code position.
#[derive(Debug, Clone)]
struct ForwardBranch {
    condition: BranchCondition,
    /// Code-buffer position of the placeholder branch instruction.
    code_pos: usize,
    target_bci: usize,
}

/// A switch whose jump table can only be written once all code positions
/// are known.
enum SwitchFixup {
    Table {
        opcode_bci: usize,
        /// Which alignment-specialized template was emitted.
        alignment: usize,
        default_bci: usize,
        target_bcis: Vec<usize>,
    },
    Lookup {
        opcode_bci: usize,
        default_bci: usize,
        matches: Vec<i32>,
        target_bcis: Vec<usize>,
    },
}

// ========================================
// Translator
// ========================================

pub struct Translator<'a> {
    method: &'a Method,
    catalog: &'a TemplateCatalog,
    options: &'a TranslatorOptions,
    pub(crate) frame: FrameLayout,
    pub(crate) buf: CodeBuffer,
    pub(crate) stops: StopsBuilder,
    /// One entry per bci plus a sentinel for the position one past the last
    /// instruction. Zero marks "unset"; the prologue keeps real entries
    /// positive.
    pub(crate) bci_to_code: Vec<u32>,
    pub(crate) block_starts: Vec<bool>,
    pub(crate) block_count: usize,
    exception_starts: Option<Vec<bool>>,
    /// Backward-jump targets collected by the hot-path pre-scan.
    hot_targets: Option<HashSet<usize>>,
    profile: Option<Arc<MethodProfile>>,
    prev_opcode: Option<u8>,
    /// The opcode being dispatched (the real opcode when WIDE-prefixed).
    current_opcode: u8,
    opcode_bci: usize,
    bci: usize,
    forward_branches: Vec<ForwardBranch>,
    switches: Vec<SwitchFixup>,
    literals: Vec<ObjRef>,
    pub(crate) catch_range_positions: Vec<u32>,
    pub(crate) catch_block_positions: Vec<u32>,
}

impl<'a> Translator<'a> {
    pub fn new(
        method: &'a Method,
        catalog: &'a TemplateCatalog,
        options: &'a TranslatorOptions,
    ) -> Translator<'a> {
        let code_len = method.code.len();
        let frame = FrameLayout::new(
            method.max_locals,
            method.max_stack,
            catalog.max_template_slots(),
            method.param_slots(),
        );
        let mut block_starts = vec![false; code_len];
        let mut block_count = 0;
        if code_len > 0 {
            block_starts[0] = true;
            block_count = 1;
        }
        let exception_starts = if method.exception_handlers.is_empty() {
            None
        } else {
            let mut starts = vec![false; code_len];
            for handler in &method.exception_handlers {
                starts[handler.handler_bci] = true;
            }
            Some(starts)
        };
        let hot_targets = options
            .hotpath_counters
            .then(|| ops::backward_branch_targets(&method.code));
        let profile = options
            .method_profiling
            .then(|| MethodProfile::new(method.name.clone()));
        Translator {
            method,
            catalog,
            options,
            frame,
            buf: CodeBuffer::with_capacity(code_len * 8),
            stops: StopsBuilder::new(code_len),
            bci_to_code: vec![0; code_len + 1],
            block_starts,
            block_count,
            exception_starts,
            hot_targets,
            profile,
            prev_opcode: None,
            current_opcode: 0,
            opcode_bci: 0,
            bci: 0,
            forward_branches: Vec::new(),
            switches: Vec::new(),
            literals: Vec::new(),
            catch_range_positions: Vec::new(),
            catch_block_positions: Vec::new(),
        }
    }

    // ========================================
    // Operand reading
    // ========================================

    fn read_u1(&mut self) -> Result<u8, TranslateError> {
        let byte = self
            .method
            .code
            .get(self.bci)
            .copied()
            .ok_or(VerifyError::TruncatedInstruction { bci: self.opcode_bci })?;
        self.bci += 1;
        Ok(byte)
    }

    fn read_s1(&mut self) -> Result<i8, TranslateError> {
        Ok(self.read_u1()? as i8)
    }

    fn read_u2(&mut self) -> Result<u16, TranslateError> {
        let high = self.read_u1()? as u16;
        let low = self.read_u1()? as u16;
        Ok((high << 8) | low)
    }

    fn read_s2(&mut self) -> Result<i16, TranslateError> {
        Ok(self.read_u2()? as i16)
    }

    fn read_s4(&mut self) -> Result<i32, TranslateError> {
        let high = self.read_u2()? as u32;
        let low = self.read_u2()? as u32;
        Ok(((high << 16) | low) as i32)
    }

    fn read_var_index(&mut self, wide: bool) -> Result<usize, TranslateError> {
        Ok(if wide {
            self.read_u2()? as usize
        } else {
            self.read_u1()? as usize
        })
    }

    fn skip(&mut self, amount: usize) {
        self.bci += amount;
    }

    fn align4(&mut self) {
        self.bci = (self.bci + 3) & !3;
    }

    // ========================================
    // Position and block bookkeeping
    // ========================================

    fn at_hot_target(&self) -> bool {
        self.hot_targets
            .as_ref()
            .is_some_and(|targets| targets.contains(&self.opcode_bci))
    }

    /// Marks the start of the current bytecode's generated code: claims the
    /// bci map slot (unless a hot-path counter already owns it), starts a
    /// block after any block-ending instruction, and splices the
    /// load-pending-exception template at handler entries.
    fn begin_bytecode(&mut self) {
        if !self.at_hot_target() {
            self.bci_to_code[self.opcode_bci] = self.buf.current_position() as u32;
        }
        if self.prev_opcode.is_some_and(ops::is_block_end) {
            self.start_block(self.opcode_bci);
            let is_handler = self
                .exception_starts
                .as_ref()
                .is_some_and(|starts| starts[self.opcode_bci]);
            if is_handler {
                self.emit_handler_entry();
            }
        }
        self.prev_opcode = Some(self.current_opcode);
    }

    fn record_bytecode_start(&mut self) {
        self.bci_to_code[self.opcode_bci] = self.buf.current_position() as u32;
    }

    fn start_block(&mut self, bci: usize) {
        if !self.block_starts[bci] {
            self.block_starts[bci] = true;
            self.block_count += 1;
        }
    }

    fn code_position(&self, bci: usize) -> usize {
        self.bci_to_code[bci] as usize
    }

    // ========================================
    // Template emission and patching
    // ========================================

    fn encode_err(&self, error: EncodeError) -> TranslateError {
        TranslateError::Encode {
            bci: self.opcode_bci,
            error,
        }
    }

    /// Records the stops a template carries and appends its (already
    /// patched) bytes.
    fn emit_recorded(&mut self, template: &Template, code: &[u8]) {
        self.stops
            .add_template(template, self.buf.current_position(), self.opcode_bci);
        self.buf.emit(code);
    }

    /// Emit a no-operand template verbatim.
    fn emit(&mut self, id: TemplateId) {
        let template = self.catalog.template(id);
        self.begin_bytecode();
        self.emit_recorded(template, &template.code.to_vec());
    }

    fn patch_imm(
        &self,
        template: &Template,
        code: &mut [u8],
        index: usize,
        value: i64,
    ) -> Result<(), TranslateError> {
        let modifier = template.modifier(index);
        debug_assert!(matches!(modifier, InstructionModifier::Immediate { .. }));
        modifier.fix(code, value).map_err(|e| self.encode_err(e))
    }

    fn patch_disp(
        &self,
        template: &Template,
        code: &mut [u8],
        index: usize,
        offset: i32,
    ) -> Result<(), TranslateError> {
        let modifier = template.modifier(index);
        debug_assert!(matches!(modifier, InstructionModifier::Displacement { .. }));
        modifier
            .fix(code, offset as i64)
            .map_err(|e| self.encode_err(e))
    }

    /// Appends `literal` to the reference-literal pool and patches the
    /// template's literal-load site to address it. Literals are laid out
    /// before the code, so the computed displacement is negative.
    fn patch_literal(
        &mut self,
        template: &Template,
        code: &mut [u8],
        index: usize,
        literal: ObjRef,
    ) -> Result<(), TranslateError> {
        let modifier = *template.modifier(index);
        let InstructionModifier::LiteralLoad { insn_end, .. } = modifier else {
            panic!("modifier {} of template is not a literal load", index);
        };
        self.literals.push(literal);
        let literal_offset = -((self.literals.len() * SLOT_BYTES) as i64);
        let value = literal_offset - (self.buf.current_position() + insn_end) as i64;
        modifier.fix(code, value).map_err(|e| self.encode_err(e))
    }

    // ========================================
    // Prologue, instrumentation, handler entry
    // ========================================

    /// Emits the frame-setup code. Runs before the main pass, so every
    /// bytecode's mapped position is strictly positive.
    pub fn emit_prologue(&mut self) -> Result<(), TranslateError> {
        let template = self.catalog.frame_entry();
        let mut code = template.copy_code();
        self.patch_imm(template, &mut code, 0, self.frame.frame_bytes() as i64)?;
        self.buf.emit(&code);
        Ok(())
    }

    /// Method-entry instrumentation: an entry counter when profiling is on,
    /// a trace template when tracing is on.
    pub fn emit_entry_instrumentation(&mut self) -> Result<(), TranslateError> {
        if let Some(profile) = self.profile.clone() {
            let template = self.catalog.template(TemplateId::EntryCounter);
            let mut code = template.copy_code();
            self.patch_literal(template, &mut code, 0, ObjRef::profile(profile))?;
            self.emit_recorded(template, &code);
        }
        if self.options.trace_methods {
            let template = self.catalog.template(TemplateId::TraceMethod);
            let mut code = template.copy_code();
            let name = ObjRef::string(Arc::from(self.method.name.as_str()));
            self.patch_literal(template, &mut code, 0, name)?;
            self.emit_recorded(template, &code);
        }
        Ok(())
    }

    /// The pending exception is reloaded at every handler entry point.
    fn emit_handler_entry(&mut self) {
        let template = self.catalog.template(TemplateId::LoadException);
        self.emit_recorded(template, &template.code.to_vec());
    }

    /// Counter increment inserted ahead of a backward-jump target; the
    /// counter, not the real instruction, owns this bci's map entry.
    fn emit_hotpath_counter(&mut self) -> Result<(), TranslateError> {
        self.bci_to_code[self.opcode_bci] = self.buf.current_position() as u32;
        let template = self.catalog.template(TemplateId::HotpathCounter);
        let mut code = template.copy_code();
        self.patch_imm(template, &mut code, 0, self.opcode_bci as i64)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    // ========================================
    // Main pass
    // ========================================

    pub fn generate(&mut self) -> Result<(), TranslateError> {
        use crate::bytecode::ops::*;

        self.bci = 0;
        while self.bci < self.method.code.len() {
            self.opcode_bci = self.bci;
            let mut opcode = self.read_u1()?;
            let mut wide = false;
            if opcode == WIDE {
                opcode = self.read_u1()?;
                wide = true;
            }
            self.current_opcode = opcode;

            if self.at_hot_target() {
                self.emit_hotpath_counter()?;
            }

            match opcode {
                NOP => self.record_bytecode_start(),
                ACONST_NULL => self.emit(TemplateId::AconstNull),
                ARRAYLENGTH => self.emit(TemplateId::ArrayLength),
                ATHROW => self.emit(TemplateId::Athrow),
                MONITORENTER => self.emit(TemplateId::MonitorEnter),
                MONITOREXIT => self.emit(TemplateId::MonitorExit),

                IALOAD => self.emit(TemplateId::ArrayLoad(Kind::Int)),
                LALOAD => self.emit(TemplateId::ArrayLoad(Kind::Long)),
                FALOAD => self.emit(TemplateId::ArrayLoad(Kind::Float)),
                DALOAD => self.emit(TemplateId::ArrayLoad(Kind::Double)),
                AALOAD => self.emit(TemplateId::ArrayLoad(Kind::Reference)),
                BALOAD => self.emit(TemplateId::ArrayLoad(Kind::Byte)),
                CALOAD => self.emit(TemplateId::ArrayLoad(Kind::Char)),
                SALOAD => self.emit(TemplateId::ArrayLoad(Kind::Short)),
                IASTORE => self.emit(TemplateId::ArrayStore(Kind::Int)),
                LASTORE => self.emit(TemplateId::ArrayStore(Kind::Long)),
                FASTORE => self.emit(TemplateId::ArrayStore(Kind::Float)),
                DASTORE => self.emit(TemplateId::ArrayStore(Kind::Double)),
                AASTORE => self.emit(TemplateId::ArrayStore(Kind::Reference)),
                BASTORE => self.emit(TemplateId::ArrayStore(Kind::Byte)),
                CASTORE => self.emit(TemplateId::ArrayStore(Kind::Char)),
                SASTORE => self.emit(TemplateId::ArrayStore(Kind::Short)),

                IADD => self.emit(TemplateId::Arith(ArithOp::Add, Kind::Int)),
                LADD => self.emit(TemplateId::Arith(ArithOp::Add, Kind::Long)),
                FADD => self.emit(TemplateId::Arith(ArithOp::Add, Kind::Float)),
                DADD => self.emit(TemplateId::Arith(ArithOp::Add, Kind::Double)),
                ISUB => self.emit(TemplateId::Arith(ArithOp::Sub, Kind::Int)),
                LSUB => self.emit(TemplateId::Arith(ArithOp::Sub, Kind::Long)),
                FSUB => self.emit(TemplateId::Arith(ArithOp::Sub, Kind::Float)),
                DSUB => self.emit(TemplateId::Arith(ArithOp::Sub, Kind::Double)),
                IMUL => self.emit(TemplateId::Arith(ArithOp::Mul, Kind::Int)),
                LMUL => self.emit(TemplateId::Arith(ArithOp::Mul, Kind::Long)),
                FMUL => self.emit(TemplateId::Arith(ArithOp::Mul, Kind::Float)),
                DMUL => self.emit(TemplateId::Arith(ArithOp::Mul, Kind::Double)),
                IDIV => self.emit(TemplateId::Arith(ArithOp::Div, Kind::Int)),
                LDIV => self.emit(TemplateId::Arith(ArithOp::Div, Kind::Long)),
                FDIV => self.emit(TemplateId::Arith(ArithOp::Div, Kind::Float)),
                DDIV => self.emit(TemplateId::Arith(ArithOp::Div, Kind::Double)),
                IREM => self.emit(TemplateId::Arith(ArithOp::Rem, Kind::Int)),
                LREM => self.emit(TemplateId::Arith(ArithOp::Rem, Kind::Long)),
                FREM => self.emit(TemplateId::Arith(ArithOp::Rem, Kind::Float)),
                DREM => self.emit(TemplateId::Arith(ArithOp::Rem, Kind::Double)),
                INEG => self.emit(TemplateId::Arith(ArithOp::Neg, Kind::Int)),
                LNEG => self.emit(TemplateId::Arith(ArithOp::Neg, Kind::Long)),
                // Float/double negation flips the sign via a patched zero
                // constant.
                FNEG => self.emit_float(TemplateId::Arith(ArithOp::Neg, Kind::Float), 0.0)?,
                DNEG => self.emit_double(TemplateId::Arith(ArithOp::Neg, Kind::Double), 0.0)?,
                ISHL => self.emit(TemplateId::Arith(ArithOp::Shl, Kind::Int)),
                LSHL => self.emit(TemplateId::Arith(ArithOp::Shl, Kind::Long)),
                ISHR => self.emit(TemplateId::Arith(ArithOp::Shr, Kind::Int)),
                LSHR => self.emit(TemplateId::Arith(ArithOp::Shr, Kind::Long)),
                IUSHR => self.emit(TemplateId::Arith(ArithOp::Ushr, Kind::Int)),
                LUSHR => self.emit(TemplateId::Arith(ArithOp::Ushr, Kind::Long)),
                IAND => self.emit(TemplateId::Arith(ArithOp::And, Kind::Int)),
                LAND => self.emit(TemplateId::Arith(ArithOp::And, Kind::Long)),
                IOR => self.emit(TemplateId::Arith(ArithOp::Or, Kind::Int)),
                LOR => self.emit(TemplateId::Arith(ArithOp::Or, Kind::Long)),
                IXOR => self.emit(TemplateId::Arith(ArithOp::Xor, Kind::Int)),
                LXOR => self.emit(TemplateId::Arith(ArithOp::Xor, Kind::Long)),

                I2L => self.emit(TemplateId::Convert { from: Kind::Int, to: Kind::Long }),
                I2F => self.emit(TemplateId::Convert { from: Kind::Int, to: Kind::Float }),
                I2D => self.emit(TemplateId::Convert { from: Kind::Int, to: Kind::Double }),
                L2I => self.emit(TemplateId::Convert { from: Kind::Long, to: Kind::Int }),
                L2F => self.emit(TemplateId::Convert { from: Kind::Long, to: Kind::Float }),
                L2D => self.emit(TemplateId::Convert { from: Kind::Long, to: Kind::Double }),
                F2I => self.emit(TemplateId::Convert { from: Kind::Float, to: Kind::Int }),
                F2L => self.emit(TemplateId::Convert { from: Kind::Float, to: Kind::Long }),
                F2D => self.emit(TemplateId::Convert { from: Kind::Float, to: Kind::Double }),
                D2I => self.emit(TemplateId::Convert { from: Kind::Double, to: Kind::Int }),
                D2L => self.emit(TemplateId::Convert { from: Kind::Double, to: Kind::Long }),
                D2F => self.emit(TemplateId::Convert { from: Kind::Double, to: Kind::Float }),
                I2B => self.emit(TemplateId::Convert { from: Kind::Int, to: Kind::Byte }),
                I2C => self.emit(TemplateId::Convert { from: Kind::Int, to: Kind::Char }),
                I2S => self.emit(TemplateId::Convert { from: Kind::Int, to: Kind::Short }),

                LCMP => self.emit(TemplateId::Cmp(Kind::Long, CmpNan::Less)),
                FCMPL => self.emit(TemplateId::Cmp(Kind::Float, CmpNan::Less)),
                FCMPG => self.emit(TemplateId::Cmp(Kind::Float, CmpNan::Greater)),
                DCMPL => self.emit(TemplateId::Cmp(Kind::Double, CmpNan::Less)),
                DCMPG => self.emit(TemplateId::Cmp(Kind::Double, CmpNan::Greater)),

                POP => self.emit(TemplateId::Stack(StackOp::Pop)),
                POP2 => self.emit(TemplateId::Stack(StackOp::Pop2)),
                DUP => self.emit(TemplateId::Stack(StackOp::Dup)),
                DUP_X1 => self.emit(TemplateId::Stack(StackOp::DupX1)),
                DUP_X2 => self.emit(TemplateId::Stack(StackOp::DupX2)),
                DUP2 => self.emit(TemplateId::Stack(StackOp::Dup2)),
                DUP2_X1 => self.emit(TemplateId::Stack(StackOp::Dup2X1)),
                DUP2_X2 => self.emit(TemplateId::Stack(StackOp::Dup2X2)),
                SWAP => self.emit(TemplateId::Stack(StackOp::Swap)),

                ICONST_M1..=ICONST_5 => {
                    self.emit_int(TemplateId::ConstPush(Kind::Int), opcode as i32 - ICONST_0 as i32)?
                }
                BIPUSH => {
                    let value = self.read_s1()? as i32;
                    self.emit_int(TemplateId::ConstPush(Kind::Int), value)?
                }
                SIPUSH => {
                    let value = self.read_s2()? as i32;
                    self.emit_int(TemplateId::ConstPush(Kind::Int), value)?
                }
                LCONST_0 => self.emit_long(TemplateId::ConstPush(Kind::Long), 0)?,
                LCONST_1 => self.emit_long(TemplateId::ConstPush(Kind::Long), 1)?,
                FCONST_0 => self.emit_float(TemplateId::ConstPush(Kind::Float), 0.0)?,
                FCONST_1 => self.emit_float(TemplateId::ConstPush(Kind::Float), 1.0)?,
                FCONST_2 => self.emit_float(TemplateId::ConstPush(Kind::Float), 2.0)?,
                DCONST_0 => self.emit_double(TemplateId::ConstPush(Kind::Double), 0.0)?,
                DCONST_1 => self.emit_double(TemplateId::ConstPush(Kind::Double), 1.0)?,

                ILOAD => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalLoad(Kind::Int), index, Kind::Int)?
                }
                LLOAD => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalLoad(Kind::Long), index, Kind::Long)?
                }
                FLOAD => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalLoad(Kind::Float), index, Kind::Float)?
                }
                DLOAD => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalLoad(Kind::Double), index, Kind::Double)?
                }
                ALOAD => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(
                        TemplateId::LocalLoad(Kind::Reference),
                        index,
                        Kind::Reference,
                    )?
                }
                WLOAD => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalLoad(Kind::Word), index, Kind::Word)?
                }
                ILOAD_0..=ILOAD_3 => self.emit_var_access(
                    TemplateId::LocalLoad(Kind::Int),
                    (opcode - ILOAD_0) as usize,
                    Kind::Int,
                )?,
                LLOAD_0..=LLOAD_3 => self.emit_var_access(
                    TemplateId::LocalLoad(Kind::Long),
                    (opcode - LLOAD_0) as usize,
                    Kind::Long,
                )?,
                FLOAD_0..=FLOAD_3 => self.emit_var_access(
                    TemplateId::LocalLoad(Kind::Float),
                    (opcode - FLOAD_0) as usize,
                    Kind::Float,
                )?,
                DLOAD_0..=DLOAD_3 => self.emit_var_access(
                    TemplateId::LocalLoad(Kind::Double),
                    (opcode - DLOAD_0) as usize,
                    Kind::Double,
                )?,
                ALOAD_0..=ALOAD_3 => self.emit_var_access(
                    TemplateId::LocalLoad(Kind::Reference),
                    (opcode - ALOAD_0) as usize,
                    Kind::Reference,
                )?,
                WLOAD_0..=WLOAD_3 => self.emit_var_access(
                    TemplateId::LocalLoad(Kind::Word),
                    (opcode - WLOAD_0) as usize,
                    Kind::Word,
                )?,
                ISTORE => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalStore(Kind::Int), index, Kind::Int)?
                }
                LSTORE => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalStore(Kind::Long), index, Kind::Long)?
                }
                FSTORE => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalStore(Kind::Float), index, Kind::Float)?
                }
                DSTORE => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalStore(Kind::Double), index, Kind::Double)?
                }
                ASTORE => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(
                        TemplateId::LocalStore(Kind::Reference),
                        index,
                        Kind::Reference,
                    )?
                }
                WSTORE => {
                    let index = self.read_var_index(wide)?;
                    self.emit_var_access(TemplateId::LocalStore(Kind::Word), index, Kind::Word)?
                }
                ISTORE_0..=ISTORE_3 => self.emit_var_access(
                    TemplateId::LocalStore(Kind::Int),
                    (opcode - ISTORE_0) as usize,
                    Kind::Int,
                )?,
                LSTORE_0..=LSTORE_3 => self.emit_var_access(
                    TemplateId::LocalStore(Kind::Long),
                    (opcode - LSTORE_0) as usize,
                    Kind::Long,
                )?,
                FSTORE_0..=FSTORE_3 => self.emit_var_access(
                    TemplateId::LocalStore(Kind::Float),
                    (opcode - FSTORE_0) as usize,
                    Kind::Float,
                )?,
                DSTORE_0..=DSTORE_3 => self.emit_var_access(
                    TemplateId::LocalStore(Kind::Double),
                    (opcode - DSTORE_0) as usize,
                    Kind::Double,
                )?,
                ASTORE_0..=ASTORE_3 => self.emit_var_access(
                    TemplateId::LocalStore(Kind::Reference),
                    (opcode - ASTORE_0) as usize,
                    Kind::Reference,
                )?,
                WSTORE_0..=WSTORE_3 => self.emit_var_access(
                    TemplateId::LocalStore(Kind::Word),
                    (opcode - WSTORE_0) as usize,
                    Kind::Word,
                )?,
                IINC => {
                    let index = self.read_var_index(wide)?;
                    let increment = if wide {
                        self.read_s2()? as i32
                    } else {
                        self.read_s1()? as i32
                    };
                    self.emit_iinc(index, increment)?
                }

                IRETURN => self.emit_return(TemplateId::Return(Kind::Int))?,
                LRETURN => self.emit_return(TemplateId::Return(Kind::Long))?,
                FRETURN => self.emit_return(TemplateId::Return(Kind::Float))?,
                DRETURN => self.emit_return(TemplateId::Return(Kind::Double))?,
                ARETURN => self.emit_return(TemplateId::Return(Kind::Reference))?,
                RETURN => self.emit_return(TemplateId::Return(Kind::Void))?,
                WRETURN => self.emit_return(TemplateId::Return(Kind::Word))?,

                IFEQ => self.emit_if(BranchCondition::Eq, TemplateId::BranchIfZero(BranchCondition::Eq))?,
                IFNE => self.emit_if(BranchCondition::Ne, TemplateId::BranchIfZero(BranchCondition::Ne))?,
                IFLT => self.emit_if(BranchCondition::Lt, TemplateId::BranchIfZero(BranchCondition::Lt))?,
                IFGE => self.emit_if(BranchCondition::Ge, TemplateId::BranchIfZero(BranchCondition::Ge))?,
                IFGT => self.emit_if(BranchCondition::Gt, TemplateId::BranchIfZero(BranchCondition::Gt))?,
                IFLE => self.emit_if(BranchCondition::Le, TemplateId::BranchIfZero(BranchCondition::Le))?,
                IF_ICMPEQ => self.emit_if(BranchCondition::Eq, TemplateId::BranchIfCompare(BranchCondition::Eq))?,
                IF_ICMPNE => self.emit_if(BranchCondition::Ne, TemplateId::BranchIfCompare(BranchCondition::Ne))?,
                IF_ICMPLT => self.emit_if(BranchCondition::Lt, TemplateId::BranchIfCompare(BranchCondition::Lt))?,
                IF_ICMPGE => self.emit_if(BranchCondition::Ge, TemplateId::BranchIfCompare(BranchCondition::Ge))?,
                IF_ICMPGT => self.emit_if(BranchCondition::Gt, TemplateId::BranchIfCompare(BranchCondition::Gt))?,
                IF_ICMPLE => self.emit_if(BranchCondition::Le, TemplateId::BranchIfCompare(BranchCondition::Le))?,
                IF_ACMPEQ => self.emit_if(BranchCondition::Eq, TemplateId::BranchIfRefCompare(BranchCondition::Eq))?,
                IF_ACMPNE => self.emit_if(BranchCondition::Ne, TemplateId::BranchIfRefCompare(BranchCondition::Ne))?,
                IFNULL => self.emit_if(BranchCondition::Eq, TemplateId::BranchIfNull(BranchCondition::Eq))?,
                IFNONNULL => self.emit_if(BranchCondition::Ne, TemplateId::BranchIfNull(BranchCondition::Ne))?,
                GOTO => {
                    let offset = self.read_s2()? as i64;
                    self.emit_goto(offset)?
                }
                GOTO_W => {
                    let offset = self.read_s4()? as i64;
                    self.emit_goto(offset)?
                }

                GETFIELD => {
                    let index = self.read_u2()?;
                    self.emit_field_access(FieldOp::GetField, index)?
                }
                PUTFIELD => {
                    let index = self.read_u2()?;
                    self.emit_field_access(FieldOp::PutField, index)?
                }
                GETSTATIC => {
                    let index = self.read_u2()?;
                    self.emit_field_access(FieldOp::GetStatic, index)?
                }
                PUTSTATIC => {
                    let index = self.read_u2()?;
                    self.emit_field_access(FieldOp::PutStatic, index)?
                }

                ANEWARRAY => {
                    let index = self.read_u2()?;
                    self.emit_class_op(ClassOp::ANewArray, index)?
                }
                CHECKCAST => {
                    let index = self.read_u2()?;
                    self.emit_class_op(ClassOp::Checkcast, index)?
                }
                INSTANCEOF => {
                    let index = self.read_u2()?;
                    self.emit_class_op(ClassOp::InstanceOf, index)?
                }
                NEW => {
                    let index = self.read_u2()?;
                    self.emit_new(index)?
                }
                NEWARRAY => {
                    let tag = self.read_u1()?;
                    self.emit_newarray(tag)?
                }
                MULTIANEWARRAY => {
                    let index = self.read_u2()?;
                    let dimensions = self.read_u1()? as usize;
                    self.emit_multianewarray(index, dimensions)?
                }

                INVOKEVIRTUAL => {
                    let index = self.read_u2()?;
                    self.emit_invokevirtual(index)?
                }
                INVOKESPECIAL => {
                    let index = self.read_u2()?;
                    self.emit_invokespecial(index)?
                }
                INVOKESTATIC => {
                    let index = self.read_u2()?;
                    self.emit_invokestatic(index)?
                }
                INVOKEINTERFACE => {
                    let index = self.read_u2()?;
                    let _count = self.read_u2()? >> 8;
                    self.emit_invokeinterface(index)?
                }

                LDC => {
                    let index = self.read_u1()? as u16;
                    self.emit_constant(index)?
                }
                LDC_W | LDC2_W => {
                    let index = self.read_u2()?;
                    self.emit_constant(index)?
                }

                TABLESWITCH => self.emit_tableswitch()?,
                LOOKUPSWITCH => self.emit_lookupswitch()?,

                WCONST_0 => {
                    self.emit(TemplateId::WordConst0);
                    self.skip(2);
                }
                WDIV => {
                    self.emit(TemplateId::WordDiv);
                    self.skip(2);
                }
                WDIVI => {
                    self.emit(TemplateId::WordDivI);
                    self.skip(2);
                }
                WREM => {
                    self.emit(TemplateId::WordRem);
                    self.skip(2);
                }
                WREMI => {
                    self.emit(TemplateId::WordRemI);
                    self.skip(2);
                }

                PREAD | PWRITE | PGET | PSET | PCMPSWP => {
                    let sub = self.read_u2()?;
                    let id = pointer_template(opcode, sub).ok_or(
                        TranslateError::UnsupportedOpcode {
                            bci: self.opcode_bci,
                            opcode,
                        },
                    )?;
                    self.emit(id);
                }
                MEMBAR => {
                    let sub = self.read_u2()?;
                    let barrier = match sub {
                        membar_sub::LOAD_LOAD => Barrier::LoadLoad,
                        membar_sub::LOAD_STORE => Barrier::LoadStore,
                        membar_sub::STORE_LOAD => Barrier::StoreLoad,
                        membar_sub::STORE_STORE => Barrier::StoreStore,
                        _ => {
                            return Err(TranslateError::UnsupportedOpcode {
                                bci: self.opcode_bci,
                                opcode,
                            })
                        }
                    };
                    self.emit(TemplateId::MemBarrier(barrier));
                }

                MOV_I2F => {
                    self.emit(TemplateId::MovI2F);
                    self.skip(2);
                }
                MOV_F2I => {
                    self.emit(TemplateId::MovF2I);
                    self.skip(2);
                }
                MOV_L2D => {
                    self.emit(TemplateId::MovL2D);
                    self.skip(2);
                }
                MOV_D2L => {
                    self.emit(TemplateId::MovD2L);
                    self.skip(2);
                }
                PAUSE => {
                    self.emit(TemplateId::Pause);
                    self.skip(2);
                }
                LSB => {
                    self.emit(TemplateId::BitScanForward);
                    self.skip(2);
                }
                MSB => {
                    self.emit(TemplateId::BitScanReverse);
                    self.skip(2);
                }
                READREG | WRITEREG => {
                    let sub = self.read_u2()?;
                    let role = match sub {
                        reg_sub::STACK_POINTER => RegRole::StackPointer,
                        reg_sub::FRAME_POINTER => RegRole::FramePointer,
                        reg_sub::SAFEPOINT_LATCH => RegRole::SafepointLatch,
                        reg_sub::LINK_ADDRESS => RegRole::LinkAddress,
                        _ => {
                            return Err(TranslateError::UnsupportedOpcode {
                                bci: self.opcode_bci,
                                opcode,
                            })
                        }
                    };
                    if opcode == READREG {
                        self.emit(TemplateId::ReadRegister(role));
                    } else {
                        self.emit(TemplateId::WriteRegister(role));
                    }
                }
                UNSAFE_CAST => self.skip(2),

                _ => {
                    return Err(TranslateError::UnsupportedOpcode {
                        bci: self.opcode_bci,
                        opcode,
                    })
                }
            }

            // Decoder and length table must agree exactly; a mismatch means
            // the stream and the dispatch disagree about this instruction.
            let expected = ops::length_of(&self.method.code, self.opcode_bci).ok_or(
                TranslateError::UnsupportedOpcode {
                    bci: self.opcode_bci,
                    opcode,
                },
            )?;
            let actual = self.bci - self.opcode_bci;
            if expected != actual {
                return Err(TranslateError::LengthMismatch {
                    bci: self.opcode_bci,
                    opcode,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    // ========================================
    // Simple patched emissions
    // ========================================

    fn emit_int(&mut self, id: TemplateId, value: i32) -> Result<(), TranslateError> {
        let template = self.catalog.template(id);
        self.begin_bytecode();
        let mut code = template.copy_code();
        self.patch_imm(template, &mut code, 0, value as i64)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_long(&mut self, id: TemplateId, value: i64) -> Result<(), TranslateError> {
        let template = self.catalog.template(id);
        self.begin_bytecode();
        let mut code = template.copy_code();
        self.patch_imm(template, &mut code, 0, value)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_float(&mut self, id: TemplateId, value: f32) -> Result<(), TranslateError> {
        self.emit_int_bits(id, value.to_bits() as i32 as i64)
    }

    fn emit_double(&mut self, id: TemplateId, value: f64) -> Result<(), TranslateError> {
        self.emit_int_bits(id, value.to_bits() as i64)
    }

    fn emit_int_bits(&mut self, id: TemplateId, bits: i64) -> Result<(), TranslateError> {
        let template = self.catalog.template(id);
        self.begin_bytecode();
        let mut code = template.copy_code();
        self.patch_imm(template, &mut code, 0, bits)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    /// Local-variable access: patch the frame-relative displacement of the
    /// accessed slot.
    fn emit_var_access(
        &mut self,
        id: TemplateId,
        index: usize,
        kind: Kind,
    ) -> Result<(), TranslateError> {
        let template = self.catalog.template(id);
        self.begin_bytecode();
        let mut code = template.copy_code();
        let offset = self.frame.local_access_offset(index, kind);
        self.patch_disp(template, &mut code, 0, offset)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_iinc(&mut self, index: usize, increment: i32) -> Result<(), TranslateError> {
        let template = self.catalog.template(TemplateId::Iinc);
        self.begin_bytecode();
        let mut code = template.copy_code();
        let offset = self.frame.local_access_offset(index, Kind::Int);
        self.patch_disp(template, &mut code, 0, offset)?;
        self.patch_imm(template, &mut code, 1, increment as i64)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    /// A return: the kind-specialized value move, then the frame teardown
    /// (which retracts the caller-pushed parameters).
    fn emit_return(&mut self, id: TemplateId) -> Result<(), TranslateError> {
        self.emit(id);
        let template = self.catalog.frame_exit();
        let mut code = template.copy_code();
        self.patch_imm(template, &mut code, 0, self.frame.param_bytes() as i64)?;
        self.buf.emit(&code);
        Ok(())
    }

    // ========================================
    // Branches
    // ========================================

    fn branch_target(&self, offset: i64) -> Result<usize, TranslateError> {
        let target = self.opcode_bci as i64 + offset;
        if target < 0 || target >= self.method.code.len() as i64 {
            return Err(VerifyError::BadBranchTarget {
                bci: self.opcode_bci,
                target: target.max(0) as usize,
            }
            .into());
        }
        Ok(target as usize)
    }

    fn emit_if(
        &mut self,
        condition: BranchCondition,
        prefix: TemplateId,
    ) -> Result<(), TranslateError> {
        let offset = self.read_s2()? as i64;
        let target = self.branch_target(offset)?;
        self.start_block(target);
        let template = self.catalog.template(prefix);
        self.begin_bytecode();
        self.emit_recorded(template, &template.code.to_vec());
        self.emit_branch(condition, target)
    }

    fn emit_goto(&mut self, offset: i64) -> Result<(), TranslateError> {
        let target = self.branch_target(offset)?;
        self.start_block(target);
        self.begin_bytecode();
        self.emit_branch(BranchCondition::Always, target)
    }

    /// Emits the branch instruction itself. A forward branch leaves a wide
    /// placeholder and a fixup record; a backward branch is patched
    /// immediately, taking the narrow encoding when the displacement fits a
    /// signed byte, and is preceded by a safepoint poll (the frame is
    /// already in the target's state, so the target's reference maps apply).
    fn emit_branch(
        &mut self,
        condition: BranchCondition,
        target_bci: usize,
    ) -> Result<(), TranslateError> {
        if target_bci > self.opcode_bci {
            let template = self.catalog.branch(condition, DispWidth::Wide);
            let mut code = template.copy_code();
            template
                .modifier(0)
                .fix(&mut code, 0)
                .map_err(|e| self.encode_err(e))?;
            self.forward_branches.push(ForwardBranch {
                condition,
                code_pos: self.buf.current_position(),
                target_bci,
            });
            self.buf.emit(&code);
            return Ok(());
        }

        // Backward branch: poll for a safepoint at the branch source.
        let poll_pos = self.buf.current_position();
        let poll = self.catalog.safepoint_code().to_vec();
        self.buf.emit(&poll);
        self.stops.add(Stop::BackwardBranchSafepoint {
            pos: poll_pos,
            bci: self.opcode_bci,
        });

        let target_pos = self.code_position(target_bci);
        if target_pos == 0 {
            return Err(VerifyError::BadBranchTarget {
                bci: self.opcode_bci,
                target: target_bci,
            }
            .into());
        }
        let narrow = self.catalog.branch(condition, DispWidth::Narrow);
        let narrow_disp =
            target_pos as i64 - (self.buf.current_position() + narrow.len()) as i64;
        let (template, disp) = if DispWidth::Narrow.fits(narrow_disp as i32) {
            (narrow, narrow_disp)
        } else {
            let wide = self.catalog.branch(condition, DispWidth::Wide);
            let wide_disp =
                target_pos as i64 - (self.buf.current_position() + wide.len()) as i64;
            (wide, wide_disp)
        };
        let mut code = template.copy_code();
        template
            .modifier(0)
            .fix(&mut code, disp)
            .map_err(|e| self.encode_err(e))?;
        self.buf.emit(&code);
        Ok(())
    }

    fn fix_forward_branch(&mut self, branch: &ForwardBranch) -> Result<(), TranslateError> {
        let target_pos = self.code_position(branch.target_bci);
        if target_pos == 0 {
            return Err(VerifyError::BadBranchTarget {
                bci: branch.target_bci,
                target: branch.target_bci,
            }
            .into());
        }
        let template = self.catalog.branch(branch.condition, DispWidth::Wide);
        let disp = target_pos as i64 - (branch.code_pos + template.len()) as i64;
        let mut code = template.copy_code();
        template
            .modifier(0)
            .fix(&mut code, disp)
            .map_err(|e| self.encode_err(e))?;
        self.buf.patch(branch.code_pos, &code);
        Ok(())
    }

    // ========================================
    // Switches
    // ========================================

    fn emit_tableswitch(&mut self) -> Result<(), TranslateError> {
        self.align4();
        let default_offset = self.read_s4()? as i64;
        let low = self.read_s4()?;
        let high = self.read_s4()?;
        if low > high {
            return Err(VerifyError::TableSwitchBounds {
                bci: self.opcode_bci,
                low,
                high,
            }
            .into());
        }
        let cases = (high as i64 - low as i64 + 1) as usize;
        self.begin_bytecode();

        let alignment = self.buf.current_position() & 3;
        let template = self.catalog.table_switch(alignment);
        let mut code = template.copy_code();
        // Modifier order: index-adjust immediate, case-count immediate,
        // branch to the default target (patched at fixup).
        if low != 0 {
            self.patch_imm(template, &mut code, 0, low as i64)?;
        }
        self.patch_imm(template, &mut code, 1, high as i64 - low as i64)?;
        self.emit_recorded(template, &code);

        // Reserve the jump table; entries are written at fixup.
        self.buf.reserve(cases * 4);

        let mut target_bcis = Vec::with_capacity(cases);
        for _ in 0..cases {
            let offset = self.read_s4()? as i64;
            let target = self.branch_target(offset)?;
            target_bcis.push(target);
            self.start_block(target);
        }
        let default_bci = self.branch_target(default_offset)?;
        self.start_block(default_bci);
        self.switches.push(SwitchFixup::Table {
            opcode_bci: self.opcode_bci,
            alignment,
            default_bci,
            target_bcis,
        });
        Ok(())
    }

    fn emit_lookupswitch(&mut self) -> Result<(), TranslateError> {
        self.align4();
        let default_offset = self.read_s4()? as i64;
        let cases = self.read_s4()?;
        if cases < 0 {
            return Err(VerifyError::LookupSwitchCount {
                bci: self.opcode_bci,
                count: cases,
            }
            .into());
        }
        self.begin_bytecode();

        if cases == 0 {
            // Nothing to match: drop the key and fall through, or jump
            // straight to the default target if it is not the next
            // instruction.
            let pop = self.catalog.template(TemplateId::Stack(StackOp::Pop));
            self.emit_recorded(pop, &pop.code.to_vec());
            let default_bci = self.branch_target(default_offset)?;
            self.start_block(default_bci);
            if default_bci != self.bci {
                self.emit_branch(BranchCondition::Always, default_bci)?;
            }
            return Ok(());
        }

        let template = self.catalog.lookup_switch();
        let mut code = template.copy_code();
        // Modifier order: last-match index immediate, branch to default.
        self.patch_imm(template, &mut code, 0, (cases as i64 - 1) * 2)?;
        self.emit_recorded(template, &code);

        // Reserve the match/offset pair table.
        self.buf.reserve(cases as usize * 8);

        let mut matches = Vec::with_capacity(cases as usize);
        let mut target_bcis = Vec::with_capacity(cases as usize);
        for _ in 0..cases {
            matches.push(self.read_s4()?);
            let offset = self.read_s4()? as i64;
            let target = self.branch_target(offset)?;
            target_bcis.push(target);
            self.start_block(target);
        }
        let default_bci = self.branch_target(default_offset)?;
        self.start_block(default_bci);
        self.switches.push(SwitchFixup::Lookup {
            opcode_bci: self.opcode_bci,
            default_bci,
            matches,
            target_bcis,
        });
        Ok(())
    }

    fn fix_table_switch(
        &mut self,
        opcode_bci: usize,
        alignment: usize,
        default_bci: usize,
        target_bcis: &[usize],
    ) -> Result<(), TranslateError> {
        let template = self.catalog.table_switch(alignment);
        let template_pos = self.code_position(opcode_bci);
        // Patch the branch to the default target inside the template.
        let default_pos = self.code_position(default_bci);
        let branch_modifier = *template.modifier(2);
        let disp = default_pos as i64 - (template_pos + branch_modifier.end()) as i64;
        let mut field = vec![0u8; branch_modifier.size()];
        let rel = InstructionModifier::BranchTarget {
            pos: 0,
            width: DispWidth::Wide,
        };
        rel.fix(&mut field, disp).map_err(|e| self.encode_err(e))?;
        self.buf.patch(template_pos + branch_modifier.pos(), &field);

        // Write the jump table: offsets relative to the table base.
        let table_pos = template_pos + template.len();
        for (i, &target_bci) in target_bcis.iter().enumerate() {
            let entry = self.code_position(target_bci) as i64 - table_pos as i64;
            let bytes = (entry as i32).to_le_bytes();
            self.buf.patch(table_pos + i * 4, &bytes);
        }
        Ok(())
    }

    fn fix_lookup_switch(
        &mut self,
        opcode_bci: usize,
        default_bci: usize,
        matches: &[i32],
        target_bcis: &[usize],
    ) -> Result<(), TranslateError> {
        let template = self.catalog.lookup_switch();
        let template_pos = self.code_position(opcode_bci);
        let default_pos = self.code_position(default_bci);
        let branch_modifier = *template.modifier(1);
        let disp = default_pos as i64 - (template_pos + branch_modifier.end()) as i64;
        let mut field = vec![0u8; branch_modifier.size()];
        let rel = InstructionModifier::BranchTarget {
            pos: 0,
            width: DispWidth::Wide,
        };
        rel.fix(&mut field, disp).map_err(|e| self.encode_err(e))?;
        self.buf.patch(template_pos + branch_modifier.pos(), &field);

        // Match values at even word positions, target offsets (relative to
        // the pair table) at odd.
        let table_pos = template_pos + template.len();
        for (i, (&value, &target_bci)) in matches.iter().zip(target_bcis).enumerate() {
            let offset = self.code_position(target_bci) as i64 - table_pos as i64;
            self.buf.patch(table_pos + i * 8, &value.to_le_bytes());
            self.buf
                .patch(table_pos + i * 8 + 4, &(offset as i32).to_le_bytes());
        }
        Ok(())
    }

    // ========================================
    // Resolution-sensitive emissions
    // ========================================

    /// Resolvability check honoring the eager-resolution option: when
    /// forced, a resolution failure still reports "unresolved" and the
    /// guard path is taken.
    fn is_resolved<T: Clone>(&self, link: &LinkCell<T>, name: &Symbol) -> bool {
        if self.options.eager_resolution {
            return link.resolve(name).is_ok();
        }
        link.is_resolvable_without_loading()
    }

    fn emit_field_access(&mut self, op: FieldOp, index: u16) -> Result<(), TranslateError> {
        let entry: &FieldRefEntry = self.method.pool.field_at(index)?;
        let kind = entry.kind;
        if self.is_resolved(&entry.link, &entry.name) {
            // A linkage error here means the entry went bad between the
            // resolvability check and resolution; fall through to the
            // guard template, which re-raises it at run time.
            if let Ok(field) = entry.link.resolve(&entry.name) {
                match op {
                    FieldOp::GetField | FieldOp::PutField if !field.is_static => {
                        let id = match op {
                            FieldOp::GetField => TemplateId::GetField(kind, Resolution::Resolved),
                            _ => TemplateId::PutField(kind, Resolution::Resolved),
                        };
                        let template = self.catalog.template(id);
                        self.begin_bytecode();
                        let mut code = template.copy_code();
                        self.patch_imm(template, &mut code, 0, field.offset as i64)?;
                        self.emit_recorded(template, &code);
                        return Ok(());
                    }
                    FieldOp::GetStatic | FieldOp::PutStatic
                        if field.is_static && field.holder.is_initialized() =>
                    {
                        let id = match op {
                            FieldOp::GetStatic => {
                                TemplateId::GetStatic(kind, StaticResolution::Initialized)
                            }
                            _ => TemplateId::PutStatic(kind, StaticResolution::Initialized),
                        };
                        let template = self.catalog.template(id);
                        self.begin_bytecode();
                        let mut code = template.copy_code();
                        let statics = ObjRef::static_tuple(field.holder.clone());
                        self.patch_literal(template, &mut code, 0, statics)?;
                        self.patch_imm(template, &mut code, 1, field.offset as i64)?;
                        self.emit_recorded(template, &code);
                        return Ok(());
                    }
                    // Static/instance mismatch or uninitialized holder:
                    // take the guard path below.
                    _ => {}
                }
            }
        }
        let (id, resolve_op) = match op {
            FieldOp::GetField => (
                TemplateId::GetField(kind, Resolution::Guard),
                ResolveOp::ReadInstanceField,
            ),
            FieldOp::PutField => (
                TemplateId::PutField(kind, Resolution::Guard),
                ResolveOp::WriteInstanceField,
            ),
            FieldOp::GetStatic => (
                TemplateId::GetStatic(kind, StaticResolution::Guard),
                ResolveOp::ReadStaticField,
            ),
            FieldOp::PutStatic => (
                TemplateId::PutStatic(kind, StaticResolution::Guard),
                ResolveOp::WriteStaticField,
            ),
        };
        let template = self.catalog.template(id);
        self.begin_bytecode();
        let mut code = template.copy_code();
        let guard = self.method.pool.make_resolution_guard(index, resolve_op);
        self.patch_literal(template, &mut code, 0, guard)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_class_op(&mut self, op: ClassOp, index: u16) -> Result<(), TranslateError> {
        let entry = self.method.pool.class_at(index)?;
        let is_array_op = op == ClassOp::ANewArray;
        if self.is_resolved(&entry.link, &entry.name) {
            if let Ok(class) = entry.link.resolve(&entry.name) {
                let class = if is_array_op {
                    class.array_class()
                } else {
                    class
                };
                let id = match op {
                    ClassOp::ANewArray => TemplateId::ANewArray(Resolution::Resolved),
                    ClassOp::Checkcast => TemplateId::Checkcast(Resolution::Resolved),
                    ClassOp::InstanceOf => TemplateId::InstanceOf(Resolution::Resolved),
                };
                let template = self.catalog.template(id);
                self.begin_bytecode();
                let mut code = template.copy_code();
                self.patch_literal(template, &mut code, 0, ObjRef::class(class))?;
                self.emit_recorded(template, &code);
                return Ok(());
            }
        }
        let (id, resolve_op) = match op {
            ClassOp::ANewArray => (TemplateId::ANewArray(Resolution::Guard), ResolveOp::ArrayClass),
            ClassOp::Checkcast => (TemplateId::Checkcast(Resolution::Guard), ResolveOp::Class),
            ClassOp::InstanceOf => (TemplateId::InstanceOf(Resolution::Guard), ResolveOp::Class),
        };
        let template = self.catalog.template(id);
        self.begin_bytecode();
        let mut code = template.copy_code();
        let guard = self.method.pool.make_resolution_guard(index, resolve_op);
        self.patch_literal(template, &mut code, 0, guard)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_new(&mut self, index: u16) -> Result<(), TranslateError> {
        let entry = self.method.pool.class_at(index)?;
        if self.is_resolved(&entry.link, &entry.name) {
            if let Ok(class) = entry.link.resolve(&entry.name) {
                // The allocation fast path applies only once the class is
                // initialized, not merely resolved.
                if class.is_initialized() {
                    let template = self
                        .catalog
                        .template(TemplateId::New(StaticResolution::Initialized));
                    self.begin_bytecode();
                    let mut code = template.copy_code();
                    self.patch_literal(template, &mut code, 0, ObjRef::class(class))?;
                    self.emit_recorded(template, &code);
                    return Ok(());
                }
            }
        }
        let template = self.catalog.template(TemplateId::New(StaticResolution::Guard));
        self.begin_bytecode();
        let mut code = template.copy_code();
        let guard = self
            .method
            .pool
            .make_resolution_guard(index, ResolveOp::ClassForNew);
        self.patch_literal(template, &mut code, 0, guard)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_newarray(&mut self, tag: u8) -> Result<(), TranslateError> {
        let kind = match tag {
            4 => Kind::Boolean,
            5 => Kind::Char,
            6 => Kind::Float,
            7 => Kind::Double,
            8 => Kind::Byte,
            9 => Kind::Short,
            10 => Kind::Int,
            11 => Kind::Long,
            _ => {
                return Err(VerifyError::BadArrayTag {
                    bci: self.opcode_bci,
                    tag,
                }
                .into())
            }
        };
        let template = self.catalog.template(TemplateId::NewArray);
        self.begin_bytecode();
        let mut code = template.copy_code();
        self.patch_literal(template, &mut code, 0, ObjRef::kind_tag(kind))?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_multianewarray(&mut self, index: u16, dimensions: usize) -> Result<(), TranslateError> {
        let dims_literal = ObjRef::int_array(vec![0; dimensions].into_boxed_slice());
        let entry = self.method.pool.class_at(index)?;
        if self.is_resolved(&entry.link, &entry.name) {
            if let Ok(class) = entry.link.resolve(&entry.name) {
                assert!(class.is_array(), "multianewarray of non-array class");
                assert!(
                    class.dimensions() >= dimensions,
                    "array class rank below dimension operand"
                );
                let template = self
                    .catalog
                    .template(TemplateId::MultiANewArray(Resolution::Resolved));
                self.begin_bytecode();
                let mut code = template.copy_code();
                self.patch_literal(template, &mut code, 0, ObjRef::class(class))?;
                self.patch_literal(template, &mut code, 1, dims_literal)?;
                self.emit_recorded(template, &code);
                return Ok(());
            }
        }
        let template = self
            .catalog
            .template(TemplateId::MultiANewArray(Resolution::Guard));
        self.begin_bytecode();
        let mut code = template.copy_code();
        let guard = self.method.pool.make_resolution_guard(index, ResolveOp::Class);
        self.patch_literal(template, &mut code, 0, guard)?;
        self.patch_literal(template, &mut code, 1, dims_literal)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_constant(&mut self, index: u16) -> Result<(), TranslateError> {
        use crate::bytecode::pool::PoolEntry;
        let entry = self.method.pool.at(index)?;
        match entry {
            PoolEntry::Integer(value) => {
                let value = *value;
                self.emit_int(TemplateId::ConstPush(Kind::Int), value)
            }
            PoolEntry::Long(value) => {
                let value = *value;
                self.emit_long(TemplateId::ConstPush(Kind::Long), value)
            }
            PoolEntry::Float(value) => {
                let value = *value;
                self.emit_float(TemplateId::ConstPush(Kind::Float), value)
            }
            PoolEntry::Double(value) => {
                let value = *value;
                self.emit_double(TemplateId::ConstPush(Kind::Double), value)
            }
            PoolEntry::Str(text) => {
                let literal = ObjRef::string(text.clone());
                let template = self.catalog.template(TemplateId::LdcRef(Resolution::Resolved));
                self.begin_bytecode();
                let mut code = template.copy_code();
                self.patch_literal(template, &mut code, 0, literal)?;
                self.emit_recorded(template, &code);
                Ok(())
            }
            PoolEntry::ClassRef(class_entry) => {
                if self.is_resolved(&class_entry.link, &class_entry.name) {
                    if let Ok(class) = class_entry.link.resolve(&class_entry.name) {
                        let template =
                            self.catalog.template(TemplateId::LdcRef(Resolution::Resolved));
                        self.begin_bytecode();
                        let mut code = template.copy_code();
                        self.patch_literal(template, &mut code, 0, ObjRef::class(class))?;
                        self.emit_recorded(template, &code);
                        return Ok(());
                    }
                }
                let template = self.catalog.template(TemplateId::LdcRef(Resolution::Guard));
                self.begin_bytecode();
                let mut code = template.copy_code();
                let guard = self.method.pool.make_resolution_guard(index, ResolveOp::Class);
                self.patch_literal(template, &mut code, 0, guard)?;
                self.emit_recorded(template, &code);
                Ok(())
            }
            other => Err(VerifyError::Pool(PoolError {
                index,
                expected: "loadable constant",
                found: other.tag_name(),
            })
            .into()),
        }
    }

    // ========================================
    // Invokes
    // ========================================

    fn should_profile_call(&self, callee: &MethodInfo, interface: bool) -> bool {
        if self.profile.is_some() && RECEIVER_PROFILING {
            return interface || !callee.is_final;
        }
        false
    }

    fn emit_invokevirtual(&mut self, index: u16) -> Result<(), TranslateError> {
        let entry: &MethodRefEntry = self.method.pool.method_at(index)?;
        let kind = entry.signature.result.invoke_bucket();
        let receiver_index = entry.signature.receiver_stack_index() as i64;
        if self.is_resolved(&entry.link, &entry.name) {
            if let Ok(method) = entry.link.resolve(&entry.name) {
                if method.is_private || method.is_final {
                    // A private or final target needs no table dispatch;
                    // this is the invokespecial path, and taking it is
                    // required for correctness, not an optimization.
                    return self.emit_invokespecial(index);
                }
                if self.should_profile_call(&method, false) {
                    let profile = self.profile.clone().expect("profiling without a profile");
                    let template = self
                        .catalog
                        .template(TemplateId::InvokeVirtual(kind, DispatchVariant::Instrumented));
                    self.begin_bytecode();
                    let mut code = template.copy_code();
                    self.patch_imm(template, &mut code, 0, method.dispatch_index as i64)?;
                    self.patch_imm(template, &mut code, 1, receiver_index)?;
                    self.patch_literal(template, &mut code, 2, ObjRef::profile(profile.clone()))?;
                    let slot = profile.add_call_site(index, RECEIVER_PROFILE_ENTRIES);
                    self.patch_imm(template, &mut code, 3, slot as i64)?;
                    self.emit_recorded(template, &code);
                } else {
                    let template = self
                        .catalog
                        .template(TemplateId::InvokeVirtual(kind, DispatchVariant::Resolved));
                    self.begin_bytecode();
                    let mut code = template.copy_code();
                    self.patch_imm(template, &mut code, 0, method.dispatch_index as i64)?;
                    self.patch_imm(template, &mut code, 1, receiver_index)?;
                    self.emit_recorded(template, &code);
                }
                return Ok(());
            }
        }
        // The guard template also carries the receiver's stack offset so
        // the runtime resolver can locate the receiver for linking.
        let template = self
            .catalog
            .template(TemplateId::InvokeVirtual(kind, DispatchVariant::Guard));
        self.begin_bytecode();
        let mut code = template.copy_code();
        let guard = self
            .method
            .pool
            .make_resolution_guard(index, ResolveOp::VirtualMethod);
        self.patch_literal(template, &mut code, 0, guard)?;
        self.patch_imm(template, &mut code, 1, receiver_index)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_invokeinterface(&mut self, index: u16) -> Result<(), TranslateError> {
        let entry = self.method.pool.interface_method_at(index)?;
        let kind = entry.signature.result.invoke_bucket();
        let receiver_index = entry.signature.receiver_stack_index() as i64;
        if self.is_resolved(&entry.link, &entry.name) {
            if let Ok(method) = entry.link.resolve(&entry.name) {
                // No private/final shortcut here: interface dispatch always
                // goes through the interface method table.
                if self.should_profile_call(&method, true) {
                    let profile = self.profile.clone().expect("profiling without a profile");
                    let template = self.catalog.template(TemplateId::InvokeInterface(
                        kind,
                        DispatchVariant::Instrumented,
                    ));
                    self.begin_bytecode();
                    let mut code = template.copy_code();
                    self.patch_literal(template, &mut code, 0, ObjRef::method(method.clone()))?;
                    self.patch_imm(template, &mut code, 1, receiver_index)?;
                    self.patch_literal(template, &mut code, 2, ObjRef::profile(profile.clone()))?;
                    let slot = profile.add_call_site(index, RECEIVER_PROFILE_ENTRIES);
                    self.patch_imm(template, &mut code, 3, slot as i64)?;
                    self.emit_recorded(template, &code);
                } else {
                    let template = self
                        .catalog
                        .template(TemplateId::InvokeInterface(kind, DispatchVariant::Resolved));
                    self.begin_bytecode();
                    let mut code = template.copy_code();
                    self.patch_literal(template, &mut code, 0, ObjRef::method(method))?;
                    self.patch_imm(template, &mut code, 1, receiver_index)?;
                    self.emit_recorded(template, &code);
                }
                return Ok(());
            }
        }
        let template = self
            .catalog
            .template(TemplateId::InvokeInterface(kind, DispatchVariant::Guard));
        self.begin_bytecode();
        let mut code = template.copy_code();
        let guard = self
            .method
            .pool
            .make_resolution_guard(index, ResolveOp::InterfaceMethod);
        self.patch_literal(template, &mut code, 0, guard)?;
        self.patch_imm(template, &mut code, 1, receiver_index)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_invokespecial(&mut self, index: u16) -> Result<(), TranslateError> {
        let entry = self.method.pool.method_at(index)?;
        let kind = entry.signature.result.invoke_bucket();
        if self.is_resolved(&entry.link, &entry.name) {
            if let Ok(method) = entry.link.resolve(&entry.name) {
                let template = self
                    .catalog
                    .template(TemplateId::InvokeSpecial(kind, Resolution::Resolved));
                self.begin_bytecode();
                self.record_direct_bytecode_call(template, method);
                return Ok(());
            }
        }
        let template = self
            .catalog
            .template(TemplateId::InvokeSpecial(kind, Resolution::Guard));
        self.begin_bytecode();
        let mut code = template.copy_code();
        let guard = self
            .method
            .pool
            .make_resolution_guard(index, ResolveOp::SpecialMethod);
        self.patch_literal(template, &mut code, 0, guard)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    fn emit_invokestatic(&mut self, index: u16) -> Result<(), TranslateError> {
        let entry = self.method.pool.method_at(index)?;
        let kind = entry.signature.result.invoke_bucket();
        if self.is_resolved(&entry.link, &entry.name) {
            if let Ok(method) = entry.link.resolve(&entry.name) {
                if method.holder.is_initialized() {
                    let template = self
                        .catalog
                        .template(TemplateId::InvokeStatic(kind, StaticResolution::Initialized));
                    self.begin_bytecode();
                    self.record_direct_bytecode_call(template, method);
                    return Ok(());
                }
            }
        }
        let template = self
            .catalog
            .template(TemplateId::InvokeStatic(kind, StaticResolution::Guard));
        self.begin_bytecode();
        let mut code = template.copy_code();
        let guard = self
            .method
            .pool
            .make_resolution_guard(index, ResolveOp::StaticMethod);
        self.patch_literal(template, &mut code, 0, guard)?;
        self.emit_recorded(template, &code);
        Ok(())
    }

    /// Registers the single direct call of an invokestatic/invokespecial
    /// template. Such a call is exactly one stop with nothing live in the
    /// template area, so it is recorded directly rather than through the
    /// template's stop list.
    fn record_direct_bytecode_call(&mut self, template: &Template, callee: Arc<MethodInfo>) {
        assert_eq!(template.direct_calls.len(), 1);
        assert_eq!(template.indirect_calls.len(), 0);
        assert_eq!(template.safepoints.len(), 0);
        assert!(template.direct_calls[0].temp_refs.is_empty());
        self.align_direct_call(template);
        let stop_pos = self.buf.current_position() + template.direct_calls[0].pos;
        self.stops.add(Stop::BytecodeDirectCall {
            pos: stop_pos,
            bci: self.opcode_bci,
            callee,
        });
        self.buf.emit(&template.code.to_vec());
    }

    /// Pads with no-ops so the (patchable) call instruction does not
    /// straddle a word boundary.
    fn align_direct_call(&mut self, template: &Template) {
        let word = self.catalog.abi().word_bytes;
        let mask = word - 1;
        if self.buf.current_position() & mask == 0 {
            return;
        }
        let call_pos = self.buf.current_position() + template.direct_calls[0].pos;
        let call_end = call_pos + self.catalog.abi().direct_call_bytes - 1;
        if call_pos & !mask == call_end & !mask {
            return;
        }
        let nop = self.catalog.nop();
        let mut needed = word - (call_pos & mask);
        while needed > 0 {
            self.buf.emit_u8(nop);
            needed -= 1;
        }
    }

    // ========================================
    // Epilogue and packaging
    // ========================================

    /// Records the sentinel map entry and patches everything that waited
    /// for final code positions.
    pub fn emit_epilogue(&mut self) -> Result<(), TranslateError> {
        let end = self.buf.current_position() as u32;
        let code_len = self.method.code.len();
        self.bci_to_code[code_len] = end;

        for branch in std::mem::take(&mut self.forward_branches) {
            self.fix_forward_branch(&branch)?;
        }
        for switch in std::mem::take(&mut self.switches) {
            match switch {
                SwitchFixup::Table {
                    opcode_bci,
                    alignment,
                    default_bci,
                    target_bcis,
                } => self.fix_table_switch(opcode_bci, alignment, default_bci, &target_bcis)?,
                SwitchFixup::Lookup {
                    opcode_bci,
                    default_bci,
                    matches,
                    target_bcis,
                } => self.fix_lookup_switch(opcode_bci, default_bci, &matches, &target_bcis)?,
            }
        }
        Ok(())
    }

    /// Builds the catch-range / catch-block tables: the minimal contiguous
    /// ranges covering all handled code, with explicit no-handler gap
    /// entries and a trailing no-handler sentinel.
    pub fn build_exception_info(&mut self) {
        let handlers = &self.method.exception_handlers;
        if handlers.is_empty() {
            return;
        }
        if handlers.len() == 1 {
            let handler = &handlers[0];
            self.catch_range_positions = vec![
                self.bci_to_code[handler.start_bci],
                self.bci_to_code[handler.end_bci],
            ];
            self.catch_block_positions = vec![self.bci_to_code[handler.handler_bci], 0];
            return;
        }
        let mut ranges = Vec::with_capacity(handlers.len() * 2 + 1);
        let mut blocks = Vec::with_capacity(handlers.len() * 2 + 1);
        let mut next_range = handlers[0].start_bci;
        for handler in handlers {
            if next_range < handler.start_bci {
                // Gap between two catch ranges: cover it with no handler.
                ranges.push(self.bci_to_code[next_range]);
                blocks.push(0);
            }
            ranges.push(self.bci_to_code[handler.start_bci]);
            blocks.push(self.bci_to_code[handler.handler_bci]);
            next_range = handler.end_bci;
        }
        if next_range < self.method.code.len() {
            ranges.push(self.bci_to_code[next_range]);
            blocks.push(0);
        }
        self.catch_range_positions = ranges;
        self.catch_block_positions = blocks;
    }

    /// The reference literals in final layout order: the element at index
    /// `i` sits `(len - i) * word` bytes before the code start.
    pub fn pack_reference_literals(&self) -> Option<Box<[ObjRef]>> {
        if self.literals.is_empty() {
            return None;
        }
        let packed: Vec<ObjRef> = self.literals.iter().rev().cloned().collect();
        Some(packed.into_boxed_slice())
    }

    pub fn profile(&self) -> Option<&Arc<MethodProfile>> {
        self.profile.as_ref()
    }

    /// Hand over the emitted code and the accumulated stops for packing.
    pub fn into_emission(self) -> (CodeBuffer, StopsBuilder) {
        (self.buf, self.stops)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldOp {
    GetField,
    PutField,
    GetStatic,
    PutStatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassOp {
    ANewArray,
    Checkcast,
    InstanceOf,
}

/// Decodes a pointer-access sub-opcode into its template id. Returns `None`
/// for combinations the instruction set does not define (e.g. pset of a
/// char, or an indexed pget).
fn pointer_template(opcode: u8, sub: u16) -> Option<TemplateId> {
    use crate::bytecode::ops::{pointer_sub, PCMPSWP, PGET, PREAD, PSET, PWRITE};

    let kind = match sub & pointer_sub::KIND_MASK {
        pointer_sub::BYTE => Kind::Byte,
        pointer_sub::CHAR => Kind::Char,
        pointer_sub::SHORT => Kind::Short,
        pointer_sub::INT => Kind::Int,
        pointer_sub::LONG => Kind::Long,
        pointer_sub::FLOAT => Kind::Float,
        pointer_sub::DOUBLE => Kind::Double,
        pointer_sub::WORD => Kind::Word,
        pointer_sub::REFERENCE => Kind::Reference,
        _ => return None,
    };
    let indexed = sub & pointer_sub::INDEXED != 0;
    let addressing = if indexed {
        Addressing::Indexed
    } else {
        Addressing::Offset
    };
    match opcode {
        PREAD => Some(TemplateId::PointerRead(kind, addressing)),
        PWRITE if kind != Kind::Char => Some(TemplateId::PointerWrite(kind, addressing)),
        PGET if !indexed => Some(TemplateId::PointerGet(kind)),
        PSET if !indexed && kind != Kind::Char => Some(TemplateId::PointerSet(kind)),
        PCMPSWP if matches!(kind, Kind::Int | Kind::Word | Kind::Reference) => {
            Some(TemplateId::PointerCmpSwap(kind, addressing))
        }
        _ => None,
    }
}
