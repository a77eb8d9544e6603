//! Pre-compiled code templates and the catalog that holds them.
//!
//! A template is an immutable blob of native code implementing one bytecode
//! variant, annotated with the positions of its embedded call sites and
//! safepoints and with the instruction modifiers the translator patches
//! before copying the blob into the code buffer. The catalog maps symbolic
//! template ids to blobs; it is built once (by the template compiler, an
//! external collaborator for which the builder API is the interface) and read
//! concurrently without synchronization afterwards.

use std::collections::HashMap;

use crate::bytecode::Kind;

use super::modifier::{DispWidth, InstructionModifier};
use super::stops::{DirectCallee, RefBitset};

// ========================================
// Template ids
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

/// NaN bias of the floating-point compare templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpNan {
    Less,
    Greater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackOp {
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

/// Resolution state of a template that references a symbolic pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Resolved,
    Guard,
}

/// Static field access and invokestatic additionally require the holder to
/// be initialized before the fast template applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticResolution {
    Initialized,
    Guard,
}

/// Variants of the virtual/interface dispatch templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchVariant {
    Resolved,
    /// Resolved dispatch with inline receiver-profiling counters.
    Instrumented,
    Guard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Addressing {
    Offset,
    Indexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Barrier {
    LoadLoad,
    LoadStore,
    StoreLoad,
    StoreStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegRole {
    StackPointer,
    FramePointer,
    SafepointLatch,
    LinkAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCondition {
    Always,
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl BranchCondition {
    pub const ALL: [BranchCondition; 7] = [
        BranchCondition::Always,
        BranchCondition::Eq,
        BranchCondition::Ne,
        BranchCondition::Lt,
        BranchCondition::Ge,
        BranchCondition::Gt,
        BranchCondition::Le,
    ];
}

/// Symbolic identity of a template: one per bytecode semantic variant,
/// kind-specialized and split by resolution state where the bytecode
/// resolves pool entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    // Straight-line operations, copied verbatim.
    ArrayLoad(Kind),
    ArrayStore(Kind),
    ArrayLength,
    AconstNull,
    Athrow,
    MonitorEnter,
    MonitorExit,
    Arith(ArithOp, Kind),
    Convert { from: Kind, to: Kind },
    Cmp(Kind, CmpNan),
    Stack(StackOp),
    // Condition-prefix templates emitted ahead of a branch instruction:
    // they pop the operand(s) and establish the tested condition.
    BranchIfZero(BranchCondition),
    BranchIfCompare(BranchCondition),
    BranchIfRefCompare(BranchCondition),
    BranchIfNull(BranchCondition),
    // Immediate-patched constant pushes.
    ConstPush(Kind),
    // Local variable access, displacement-patched.
    LocalLoad(Kind),
    LocalStore(Kind),
    Iinc,
    Return(Kind),
    // Pool-referencing operations.
    GetField(Kind, Resolution),
    PutField(Kind, Resolution),
    GetStatic(Kind, StaticResolution),
    PutStatic(Kind, StaticResolution),
    New(StaticResolution),
    NewArray,
    ANewArray(Resolution),
    MultiANewArray(Resolution),
    Checkcast(Resolution),
    InstanceOf(Resolution),
    LdcRef(Resolution),
    InvokeVirtual(Kind, DispatchVariant),
    InvokeInterface(Kind, DispatchVariant),
    InvokeSpecial(Kind, Resolution),
    InvokeStatic(Kind, StaticResolution),
    // Intrinsic extension opcodes.
    WordConst0,
    WordDiv,
    WordDivI,
    WordRem,
    WordRemI,
    PointerRead(Kind, Addressing),
    PointerWrite(Kind, Addressing),
    PointerGet(Kind),
    PointerSet(Kind),
    PointerCmpSwap(Kind, Addressing),
    MemBarrier(Barrier),
    MovI2F,
    MovF2I,
    MovL2D,
    MovD2L,
    Pause,
    BitScanForward,
    BitScanReverse,
    ReadRegister(RegRole),
    WriteRegister(RegRole),
    // Structural templates.
    LoadException,
    HotpathCounter,
    EntryCounter,
    TraceMethod,
}

// ========================================
// Template blobs
// ========================================

/// A direct call site embedded in a template. `temp_refs` marks which
/// template-temporary slots hold references while this call is in flight.
#[derive(Debug, Clone)]
pub struct TemplateCall {
    pub pos: usize,
    pub callee: DirectCallee,
    pub is_runtime_call: bool,
    pub temp_refs: RefBitset,
}

/// An indirect call site embedded in a template.
#[derive(Debug, Clone)]
pub struct TemplateStopMark {
    pub pos: usize,
    pub temp_refs: RefBitset,
}

/// A safepoint embedded in a template; safepoints additionally carry a
/// register reference map.
#[derive(Debug, Clone)]
pub struct TemplateSafepointMark {
    pub pos: usize,
    pub temp_refs: RefBitset,
    pub reg_refs: RefBitset,
}

/// An immutable compiled-code template.
#[derive(Debug, Clone)]
pub struct Template {
    pub code: Box<[u8]>,
    pub direct_calls: Box<[TemplateCall]>,
    pub indirect_calls: Box<[TemplateStopMark]>,
    pub safepoints: Box<[TemplateSafepointMark]>,
    pub modifiers: Box<[InstructionModifier]>,
}

impl Template {
    /// A plain template: code only, no stops, no patchable sites.
    pub fn of(code: &[u8]) -> Template {
        Template {
            code: code.into(),
            direct_calls: Box::new([]),
            indirect_calls: Box::new([]),
            safepoints: Box::new([]),
            modifiers: Box::new([]),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Vec<InstructionModifier>) -> Template {
        self.modifiers = modifiers.into_boxed_slice();
        self
    }

    pub fn with_direct_call(mut self, call: TemplateCall) -> Template {
        let mut calls = self.direct_calls.into_vec();
        calls.push(call);
        self.direct_calls = calls.into_boxed_slice();
        self
    }

    pub fn with_indirect_call(mut self, mark: TemplateStopMark) -> Template {
        let mut calls = self.indirect_calls.into_vec();
        calls.push(mark);
        self.indirect_calls = calls.into_boxed_slice();
        self
    }

    pub fn with_safepoint(mut self, mark: TemplateSafepointMark) -> Template {
        let mut safepoints = self.safepoints.into_vec();
        safepoints.push(mark);
        self.safepoints = safepoints.into_boxed_slice();
        self
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn stop_count(&self) -> usize {
        self.direct_calls.len() + self.indirect_calls.len() + self.safepoints.len()
    }

    /// True if the template loads from the reference-literal area.
    pub fn has_literals(&self) -> bool {
        self.modifiers
            .iter()
            .any(|m| matches!(m, InstructionModifier::LiteralLoad { .. }))
    }

    /// The declared modifier at `index`. A missing modifier means the
    /// template compiler and the translator disagree about this template's
    /// shape, which is a fatal configuration error.
    pub fn modifier(&self, index: usize) -> &InstructionModifier {
        self.modifiers
            .get(index)
            .unwrap_or_else(|| panic!("template declares no modifier {}", index))
    }

    /// A mutable scratch copy of the code, to be patched and then emitted.
    pub fn copy_code(&self) -> Vec<u8> {
        self.code.to_vec()
    }
}

// ========================================
// Catalog
// ========================================

/// Opaque target ABI descriptor, passed through to the translated unit.
#[derive(Debug, Clone, Copy)]
pub struct TargetAbi {
    pub name: &'static str,
    pub word_bytes: usize,
    /// Byte length of a patchable direct call instruction, used to keep
    /// call sites from straddling word boundaries.
    pub direct_call_bytes: usize,
}

/// The immutable table of all templates, built once per process.
pub struct TemplateCatalog {
    templates: HashMap<TemplateId, Template>,
    branches: HashMap<(BranchCondition, DispWidth), Template>,
    /// One tableswitch template per jump-table alignment remainder.
    table_switch: Box<[Template; 4]>,
    lookup_switch: Template,
    /// The safepoint poll instruction bytes.
    safepoint: Box<[u8]>,
    /// Single-byte no-op used to pad direct call sites onto word boundaries.
    nop: u8,
    frame_entry: Template,
    frame_exit: Template,
    /// Worst-case template-temporary slot count over all templates.
    max_template_slots: usize,
    abi: TargetAbi,
}

impl TemplateCatalog {
    /// The template for `id`. Every id the translator uses must be present;
    /// absence aborts, it is a configuration error, not a runtime condition.
    pub fn template(&self, id: TemplateId) -> &Template {
        self.templates
            .get(&id)
            .unwrap_or_else(|| panic!("template catalog has no entry for {:?}", id))
    }

    pub fn has_template(&self, id: TemplateId) -> bool {
        self.templates.contains_key(&id)
    }

    /// Branch template for a condition at a displacement width.
    pub fn branch(&self, condition: BranchCondition, width: DispWidth) -> &Template {
        self.branches
            .get(&(condition, width))
            .unwrap_or_else(|| panic!("no branch template for {:?}/{:?}", condition, width))
    }

    /// Tableswitch template specialized for `alignment` = code position
    /// modulo 4, so the trailing jump table lands 4-byte aligned.
    pub fn table_switch(&self, alignment: usize) -> &Template {
        &self.table_switch[alignment & 3]
    }

    pub fn lookup_switch(&self) -> &Template {
        &self.lookup_switch
    }

    pub fn safepoint_code(&self) -> &[u8] {
        &self.safepoint
    }

    pub fn nop(&self) -> u8 {
        self.nop
    }

    pub fn frame_entry(&self) -> &Template {
        &self.frame_entry
    }

    pub fn frame_exit(&self) -> &Template {
        &self.frame_exit
    }

    pub fn max_template_slots(&self) -> usize {
        self.max_template_slots
    }

    pub fn abi(&self) -> TargetAbi {
        self.abi
    }
}

/// Builder for the catalog; the interface the template compiler feeds.
pub struct TemplateCatalogBuilder {
    templates: HashMap<TemplateId, Template>,
    branches: HashMap<(BranchCondition, DispWidth), Template>,
    table_switch: Option<Box<[Template; 4]>>,
    lookup_switch: Option<Template>,
    safepoint: Option<Box<[u8]>>,
    nop: u8,
    frame_entry: Option<Template>,
    frame_exit: Option<Template>,
    max_template_slots: usize,
    abi: TargetAbi,
}

impl TemplateCatalogBuilder {
    pub fn new(abi: TargetAbi) -> TemplateCatalogBuilder {
        TemplateCatalogBuilder {
            templates: HashMap::new(),
            branches: HashMap::new(),
            table_switch: None,
            lookup_switch: None,
            safepoint: None,
            nop: 0x90,
            frame_entry: None,
            frame_exit: None,
            max_template_slots: 0,
            abi,
        }
    }

    pub fn define(&mut self, id: TemplateId, template: Template) -> &mut Self {
        self.templates.insert(id, template);
        self
    }

    pub fn define_branch(
        &mut self,
        condition: BranchCondition,
        width: DispWidth,
        template: Template,
    ) -> &mut Self {
        self.branches.insert((condition, width), template);
        self
    }

    pub fn table_switch(&mut self, templates: [Template; 4]) -> &mut Self {
        self.table_switch = Some(Box::new(templates));
        self
    }

    pub fn lookup_switch(&mut self, template: Template) -> &mut Self {
        self.lookup_switch = Some(template);
        self
    }

    pub fn safepoint(&mut self, code: &[u8]) -> &mut Self {
        self.safepoint = Some(code.into());
        self
    }

    pub fn nop(&mut self, byte: u8) -> &mut Self {
        self.nop = byte;
        self
    }

    pub fn frame_entry(&mut self, template: Template) -> &mut Self {
        self.frame_entry = Some(template);
        self
    }

    pub fn frame_exit(&mut self, template: Template) -> &mut Self {
        self.frame_exit = Some(template);
        self
    }

    pub fn max_template_slots(&mut self, slots: usize) -> &mut Self {
        self.max_template_slots = slots;
        self
    }

    /// Finalize the catalog. The structural templates every translation
    /// needs must be present; anything missing is a configuration error.
    pub fn build(self) -> TemplateCatalog {
        for condition in BranchCondition::ALL {
            for width in [DispWidth::Narrow, DispWidth::Wide] {
                assert!(
                    self.branches.contains_key(&(condition, width)),
                    "branch template {:?}/{:?} missing",
                    condition,
                    width
                );
            }
        }
        TemplateCatalog {
            templates: self.templates,
            branches: self.branches,
            table_switch: self.table_switch.expect("tableswitch templates missing"),
            lookup_switch: self.lookup_switch.expect("lookupswitch template missing"),
            safepoint: self.safepoint.expect("safepoint code missing"),
            nop: self.nop,
            frame_entry: self.frame_entry.expect("frame entry template missing"),
            frame_exit: self.frame_exit.expect("frame exit template missing"),
            max_template_slots: self.max_template_slots,
            abi: self.abi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::modifier::ImmWidth;

    #[test]
    fn test_template_shape() {
        let template = Template::of(&[0x48, 0x89, 0xc8, 0, 0, 0, 0]).with_modifiers(vec![
            InstructionModifier::Immediate {
                pos: 3,
                width: ImmWidth::Int,
            },
        ]);
        assert_eq!(template.len(), 7);
        assert_eq!(template.stop_count(), 0);
        assert!(!template.has_literals());
        assert_eq!(template.modifier(0).pos(), 3);
    }

    #[test]
    #[should_panic(expected = "no modifier")]
    fn test_missing_modifier_is_fatal() {
        let template = Template::of(&[0x90]);
        template.modifier(0);
    }

    #[test]
    fn test_literal_detection() {
        let template = Template::of(&[0x48, 0x8b, 0x05, 0, 0, 0, 0]).with_modifiers(vec![
            InstructionModifier::LiteralLoad { pos: 3, insn_end: 7 },
        ]);
        assert!(template.has_literals());
    }
}
