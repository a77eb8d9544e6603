//! A complete synthetic template catalog.
//!
//! Backs the `stitch` demo binary and the integration tests: every template
//! id the translator can request is present, with deterministic filler
//! bytes standing in for real machine code and with realistic operand
//! sites and stop markers. The shapes (modifier order, stop placement)
//! follow the conventions documented in the translator.

use crate::bytecode::symbols::Symbol;

use super::modifier::{DispWidth, ImmWidth, InstructionModifier};
use super::stops::{DirectCallee, RefBitset};
use super::template::{
    Addressing, ArithOp, Barrier, BranchCondition, CmpNan, DispatchVariant, RegRole, Resolution,
    StackOp, StaticResolution, TargetAbi, Template, TemplateCall, TemplateCatalog,
    TemplateCatalogBuilder, TemplateId, TemplateSafepointMark, TemplateStopMark,
};
use crate::bytecode::Kind;

/// Template-building scratch: code bytes plus declared sites, appended in
/// order so modifier indices match the translator's conventions.
struct Build {
    code: Vec<u8>,
    tag: u8,
    modifiers: Vec<InstructionModifier>,
    direct_calls: Vec<TemplateCall>,
    indirect_calls: Vec<TemplateStopMark>,
    safepoints: Vec<TemplateSafepointMark>,
}

impl Build {
    fn new(tag: u8) -> Build {
        Build {
            code: vec![tag],
            tag,
            modifiers: Vec::new(),
            direct_calls: Vec::new(),
            indirect_calls: Vec::new(),
            safepoints: Vec::new(),
        }
    }

    fn bytes(mut self, n: usize) -> Build {
        for _ in 0..n {
            self.code.push(self.tag);
        }
        self
    }

    fn imm_int(mut self) -> Build {
        self.modifiers.push(InstructionModifier::Immediate {
            pos: self.code.len(),
            width: ImmWidth::Int,
        });
        self.code.extend_from_slice(&[0; 4]);
        self
    }

    fn imm_long(mut self) -> Build {
        self.modifiers.push(InstructionModifier::Immediate {
            pos: self.code.len(),
            width: ImmWidth::Long,
        });
        self.code.extend_from_slice(&[0; 8]);
        self
    }

    fn imm_short(mut self) -> Build {
        self.modifiers.push(InstructionModifier::Immediate {
            pos: self.code.len(),
            width: ImmWidth::Short,
        });
        self.code.extend_from_slice(&[0; 2]);
        self
    }

    fn disp(mut self) -> Build {
        self.modifiers.push(InstructionModifier::Displacement {
            pos: self.code.len(),
            width: DispWidth::Wide,
        });
        self.code.extend_from_slice(&[0; 4]);
        self
    }

    fn literal(mut self) -> Build {
        let pos = self.code.len();
        self.code.extend_from_slice(&[0; 4]);
        self.modifiers.push(InstructionModifier::LiteralLoad {
            pos,
            insn_end: pos + 4,
        });
        self
    }

    fn branch_site(mut self, width: DispWidth) -> Build {
        self.modifiers.push(InstructionModifier::BranchTarget {
            pos: self.code.len(),
            width,
        });
        self.code.extend_from_slice(&vec![0; width.bytes()]);
        self
    }

    fn runtime_call(self, stub: &str) -> Build {
        self.runtime_call_refs(stub, RefBitset::new())
    }

    fn runtime_call_refs(mut self, stub: &str, temp_refs: RefBitset) -> Build {
        self.direct_calls.push(TemplateCall {
            pos: self.code.len(),
            callee: DirectCallee::Runtime(Symbol::intern(stub)),
            is_runtime_call: true,
            temp_refs,
        });
        self.code.extend_from_slice(&[0xe8, 0, 0, 0, 0]);
        self
    }

    /// The single patchable application call of a resolved
    /// invokestatic/invokespecial template: no reference maps, no other
    /// stops.
    fn linkable_call(mut self) -> Build {
        self.direct_calls.push(TemplateCall {
            pos: self.code.len(),
            callee: DirectCallee::Runtime(Symbol::intern("stub_link")),
            is_runtime_call: false,
            temp_refs: RefBitset::new(),
        });
        self.code.extend_from_slice(&[0xe8, 0, 0, 0, 0]);
        self
    }

    fn indirect_call(self) -> Build {
        self.indirect_call_refs(RefBitset::new())
    }

    fn indirect_call_refs(mut self, temp_refs: RefBitset) -> Build {
        self.indirect_calls.push(TemplateStopMark {
            pos: self.code.len(),
            temp_refs,
        });
        self.code.extend_from_slice(&[0xff, 0xd0]);
        self
    }

    fn safepoint_mark(mut self) -> Build {
        self.safepoints.push(TemplateSafepointMark {
            pos: self.code.len(),
            temp_refs: RefBitset::new(),
            reg_refs: RefBitset::new(),
        });
        self.code.extend_from_slice(&[0x64, 0x85, 0x04, 0x25]);
        self
    }

    fn pad_to(mut self, len: usize) -> Build {
        while self.code.len() < len {
            self.code.push(self.tag);
        }
        self
    }

    fn done(self) -> Template {
        Template {
            code: self.code.into_boxed_slice(),
            direct_calls: self.direct_calls.into_boxed_slice(),
            indirect_calls: self.indirect_calls.into_boxed_slice(),
            safepoints: self.safepoints.into_boxed_slice(),
            modifiers: self.modifiers.into_boxed_slice(),
        }
    }
}

const ARRAY_KINDS: [Kind; 8] = [
    Kind::Int,
    Kind::Long,
    Kind::Float,
    Kind::Double,
    Kind::Reference,
    Kind::Byte,
    Kind::Char,
    Kind::Short,
];

const FIELD_KINDS: [Kind; 10] = [
    Kind::Boolean,
    Kind::Byte,
    Kind::Char,
    Kind::Short,
    Kind::Int,
    Kind::Float,
    Kind::Long,
    Kind::Double,
    Kind::Reference,
    Kind::Word,
];

const LOCAL_KINDS: [Kind; 6] = [
    Kind::Int,
    Kind::Long,
    Kind::Float,
    Kind::Double,
    Kind::Reference,
    Kind::Word,
];

const INVOKE_BUCKETS: [Kind; 5] = [Kind::Word, Kind::Float, Kind::Long, Kind::Double, Kind::Void];

const CONDITIONS: [BranchCondition; 6] = [
    BranchCondition::Eq,
    BranchCondition::Ne,
    BranchCondition::Lt,
    BranchCondition::Ge,
    BranchCondition::Gt,
    BranchCondition::Le,
];

/// Build the full synthetic catalog.
pub fn sample_catalog() -> TemplateCatalog {
    let abi = TargetAbi {
        name: "x86-64",
        word_bytes: 8,
        direct_call_bytes: 5,
    };
    let mut builder = TemplateCatalogBuilder::new(abi);
    builder.max_template_slots(4);
    builder.safepoint(&[0x64, 0x85, 0x04, 0x25]);
    builder.nop(0x90);
    builder.frame_entry(Build::new(0x01).bytes(3).imm_int().done());
    builder.frame_exit(Build::new(0x02).bytes(1).imm_short().done());

    let mut tag: u8 = 0x08;
    let mut next_tag = || {
        tag = tag.wrapping_add(1).max(8);
        tag
    };

    // Branch instructions per condition and width.
    builder.define_branch(
        BranchCondition::Always,
        DispWidth::Narrow,
        Build::new(0xeb).branch_site(DispWidth::Narrow).done(),
    );
    builder.define_branch(
        BranchCondition::Always,
        DispWidth::Wide,
        Build::new(0xe9).branch_site(DispWidth::Wide).done(),
    );
    for (i, condition) in CONDITIONS.into_iter().enumerate() {
        builder.define_branch(
            condition,
            DispWidth::Narrow,
            Build::new(0x70 + i as u8).branch_site(DispWidth::Narrow).done(),
        );
        builder.define_branch(
            condition,
            DispWidth::Wide,
            Build::new(0x80 + i as u8)
                .bytes(1)
                .branch_site(DispWidth::Wide)
                .done(),
        );
    }

    // Tableswitch templates per jump-table alignment; the template length
    // leaves the table 4-byte aligned. Modifiers: index adjust, case
    // count, branch to default.
    let table = std::array::from_fn(|alignment| {
        Build::new(0x30 + alignment as u8)
            .imm_int()
            .bytes(1)
            .imm_int()
            .bytes(1)
            .branch_site(DispWidth::Wide)
            .pad_to(16 + ((4 - alignment) & 3))
            .done()
    });
    builder.table_switch(table);
    // Lookupswitch: last-match index, branch to default; match/offset
    // pairs follow the template.
    builder.lookup_switch(
        Build::new(0x3a)
            .bytes(1)
            .imm_int()
            .bytes(1)
            .branch_site(DispWidth::Wide)
            .done(),
    );

    // Straight-line operations.
    builder.define(TemplateId::AconstNull, Build::new(next_tag()).bytes(3).done());
    builder.define(TemplateId::ArrayLength, Build::new(next_tag()).bytes(4).done());
    builder.define(
        TemplateId::Athrow,
        Build::new(next_tag()).bytes(2).runtime_call("stub_throw").done(),
    );
    builder.define(
        TemplateId::MonitorEnter,
        // Acquiring a contended monitor may block, so the template carries
        // a safepoint of its own.
        Build::new(next_tag())
            .bytes(2)
            .runtime_call("stub_monitor_enter")
            .safepoint_mark()
            .done(),
    );
    builder.define(
        TemplateId::MonitorExit,
        Build::new(next_tag()).bytes(2).runtime_call("stub_monitor_exit").done(),
    );

    for kind in ARRAY_KINDS {
        builder.define(TemplateId::ArrayLoad(kind), Build::new(next_tag()).bytes(7).done());
        if kind == Kind::Reference {
            // Reference array stores go through the runtime store check,
            // with the value held in a template slot across the call.
            let mut temp_refs = RefBitset::new();
            temp_refs.set(0);
            builder.define(
                TemplateId::ArrayStore(kind),
                Build::new(next_tag())
                    .bytes(4)
                    .runtime_call_refs("stub_array_store_check", temp_refs)
                    .done(),
            );
        } else {
            builder.define(TemplateId::ArrayStore(kind), Build::new(next_tag()).bytes(8).done());
        }
    }

    for kind in [Kind::Int, Kind::Long] {
        for op in [
            ArithOp::Add,
            ArithOp::Sub,
            ArithOp::Mul,
            ArithOp::Div,
            ArithOp::Rem,
            ArithOp::Neg,
            ArithOp::Shl,
            ArithOp::Shr,
            ArithOp::Ushr,
            ArithOp::And,
            ArithOp::Or,
            ArithOp::Xor,
        ] {
            builder.define(TemplateId::Arith(op, kind), Build::new(next_tag()).bytes(5).done());
        }
    }
    for kind in [Kind::Float, Kind::Double] {
        for op in [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Rem] {
            builder.define(TemplateId::Arith(op, kind), Build::new(next_tag()).bytes(6).done());
        }
    }
    // Float/double negation templates carry the patched sign constant.
    builder.define(
        TemplateId::Arith(ArithOp::Neg, Kind::Float),
        Build::new(next_tag()).bytes(2).imm_int().bytes(2).done(),
    );
    builder.define(
        TemplateId::Arith(ArithOp::Neg, Kind::Double),
        Build::new(next_tag()).bytes(2).imm_long().bytes(2).done(),
    );

    for (from, to) in [
        (Kind::Int, Kind::Long),
        (Kind::Int, Kind::Float),
        (Kind::Int, Kind::Double),
        (Kind::Long, Kind::Int),
        (Kind::Long, Kind::Float),
        (Kind::Long, Kind::Double),
        (Kind::Float, Kind::Int),
        (Kind::Float, Kind::Long),
        (Kind::Float, Kind::Double),
        (Kind::Double, Kind::Int),
        (Kind::Double, Kind::Long),
        (Kind::Double, Kind::Float),
        (Kind::Int, Kind::Byte),
        (Kind::Int, Kind::Char),
        (Kind::Int, Kind::Short),
    ] {
        builder.define(
            TemplateId::Convert { from, to },
            Build::new(next_tag()).bytes(4).done(),
        );
    }

    for (kind, nan) in [
        (Kind::Long, CmpNan::Less),
        (Kind::Float, CmpNan::Less),
        (Kind::Float, CmpNan::Greater),
        (Kind::Double, CmpNan::Less),
        (Kind::Double, CmpNan::Greater),
    ] {
        builder.define(TemplateId::Cmp(kind, nan), Build::new(next_tag()).bytes(6).done());
    }

    for op in [
        StackOp::Pop,
        StackOp::Pop2,
        StackOp::Dup,
        StackOp::DupX1,
        StackOp::DupX2,
        StackOp::Dup2,
        StackOp::Dup2X1,
        StackOp::Dup2X2,
        StackOp::Swap,
    ] {
        builder.define(TemplateId::Stack(op), Build::new(next_tag()).bytes(3).done());
    }

    builder.define(
        TemplateId::ConstPush(Kind::Int),
        Build::new(0xb8).imm_int().done(),
    );
    builder.define(
        TemplateId::ConstPush(Kind::Long),
        Build::new(next_tag()).bytes(1).imm_long().done(),
    );
    builder.define(
        TemplateId::ConstPush(Kind::Float),
        Build::new(next_tag()).bytes(1).imm_int().done(),
    );
    builder.define(
        TemplateId::ConstPush(Kind::Double),
        Build::new(next_tag()).bytes(1).imm_long().done(),
    );

    for kind in LOCAL_KINDS {
        builder.define(
            TemplateId::LocalLoad(kind),
            Build::new(next_tag()).bytes(2).disp().bytes(1).done(),
        );
        builder.define(
            TemplateId::LocalStore(kind),
            Build::new(next_tag()).bytes(2).disp().bytes(1).done(),
        );
    }
    builder.define(
        TemplateId::Iinc,
        Build::new(next_tag()).bytes(1).disp().imm_int().done(),
    );

    for kind in [
        Kind::Int,
        Kind::Long,
        Kind::Float,
        Kind::Double,
        Kind::Reference,
        Kind::Word,
        Kind::Void,
    ] {
        builder.define(TemplateId::Return(kind), Build::new(next_tag()).bytes(3).done());
    }

    for condition in CONDITIONS {
        builder.define(
            TemplateId::BranchIfZero(condition),
            Build::new(next_tag()).bytes(3).done(),
        );
        builder.define(
            TemplateId::BranchIfCompare(condition),
            Build::new(next_tag()).bytes(4).done(),
        );
    }
    for condition in [BranchCondition::Eq, BranchCondition::Ne] {
        builder.define(
            TemplateId::BranchIfRefCompare(condition),
            Build::new(next_tag()).bytes(4).done(),
        );
        builder.define(
            TemplateId::BranchIfNull(condition),
            Build::new(next_tag()).bytes(3).done(),
        );
    }

    // Field access.
    for kind in FIELD_KINDS {
        builder.define(
            TemplateId::GetField(kind, Resolution::Resolved),
            Build::new(next_tag()).bytes(2).imm_int().done(),
        );
        builder.define(
            TemplateId::PutField(kind, Resolution::Resolved),
            Build::new(next_tag()).bytes(2).imm_int().done(),
        );
        builder.define(
            TemplateId::GetField(kind, Resolution::Guard),
            Build::new(next_tag())
                .bytes(2)
                .literal()
                .runtime_call("stub_resolve_get_field")
                .done(),
        );
        builder.define(
            TemplateId::PutField(kind, Resolution::Guard),
            Build::new(next_tag())
                .bytes(2)
                .literal()
                .runtime_call("stub_resolve_put_field")
                .done(),
        );
        builder.define(
            TemplateId::GetStatic(kind, StaticResolution::Initialized),
            Build::new(next_tag()).bytes(2).literal().imm_int().done(),
        );
        builder.define(
            TemplateId::PutStatic(kind, StaticResolution::Initialized),
            Build::new(next_tag()).bytes(2).literal().imm_int().done(),
        );
        builder.define(
            TemplateId::GetStatic(kind, StaticResolution::Guard),
            Build::new(next_tag())
                .bytes(2)
                .literal()
                .runtime_call("stub_resolve_get_static")
                .done(),
        );
        builder.define(
            TemplateId::PutStatic(kind, StaticResolution::Guard),
            Build::new(next_tag())
                .bytes(2)
                .literal()
                .runtime_call("stub_resolve_put_static")
                .done(),
        );
    }

    // Object and array creation, type tests.
    builder.define(
        TemplateId::New(StaticResolution::Initialized),
        Build::new(next_tag()).bytes(1).literal().runtime_call("stub_new").done(),
    );
    builder.define(
        TemplateId::New(StaticResolution::Guard),
        Build::new(next_tag())
            .bytes(1)
            .literal()
            .runtime_call("stub_resolve_new")
            .done(),
    );
    builder.define(
        TemplateId::NewArray,
        Build::new(next_tag()).bytes(1).literal().runtime_call("stub_new_array").done(),
    );
    for resolution in [Resolution::Resolved, Resolution::Guard] {
        builder.define(
            TemplateId::ANewArray(resolution),
            Build::new(next_tag())
                .bytes(1)
                .literal()
                .runtime_call("stub_anewarray")
                .done(),
        );
        builder.define(
            TemplateId::Checkcast(resolution),
            Build::new(next_tag())
                .bytes(1)
                .literal()
                .runtime_call("stub_checkcast")
                .done(),
        );
        builder.define(
            TemplateId::InstanceOf(resolution),
            Build::new(next_tag())
                .bytes(1)
                .literal()
                .runtime_call("stub_instanceof")
                .done(),
        );
        builder.define(
            TemplateId::MultiANewArray(resolution),
            Build::new(next_tag())
                .bytes(1)
                .literal()
                .literal()
                .runtime_call("stub_multianewarray")
                .done(),
        );
        builder.define(
            TemplateId::LdcRef(resolution),
            Build::new(next_tag()).bytes(1).literal().bytes(1).done(),
        );
    }

    // Invokes, per return-kind bucket.
    for kind in INVOKE_BUCKETS {
        builder.define(
            TemplateId::InvokeVirtual(kind, DispatchVariant::Resolved),
            Build::new(next_tag()).bytes(1).imm_int().imm_int().indirect_call().done(),
        );
        builder.define(
            TemplateId::InvokeVirtual(kind, DispatchVariant::Instrumented),
            Build::new(next_tag())
                .bytes(1)
                .imm_int()
                .imm_int()
                .literal()
                .imm_int()
                .indirect_call()
                .done(),
        );
        builder.define(
            TemplateId::InvokeVirtual(kind, DispatchVariant::Guard),
            Build::new(next_tag()).bytes(1).literal().imm_int().indirect_call().done(),
        );
        builder.define(
            TemplateId::InvokeInterface(kind, DispatchVariant::Resolved),
            Build::new(next_tag()).bytes(1).literal().imm_int().indirect_call().done(),
        );
        builder.define(
            TemplateId::InvokeInterface(kind, DispatchVariant::Instrumented),
            Build::new(next_tag())
                .bytes(1)
                .literal()
                .imm_int()
                .literal()
                .imm_int()
                .indirect_call()
                .done(),
        );
        builder.define(
            TemplateId::InvokeInterface(kind, DispatchVariant::Guard),
            Build::new(next_tag()).bytes(1).literal().imm_int().indirect_call().done(),
        );
        builder.define(
            TemplateId::InvokeSpecial(kind, Resolution::Resolved),
            Build::new(next_tag()).bytes(2).linkable_call().done(),
        );
        builder.define(
            TemplateId::InvokeSpecial(kind, Resolution::Guard),
            Build::new(next_tag()).bytes(1).literal().indirect_call().done(),
        );
        builder.define(
            TemplateId::InvokeStatic(kind, StaticResolution::Initialized),
            Build::new(next_tag()).bytes(2).linkable_call().done(),
        );
        builder.define(
            TemplateId::InvokeStatic(kind, StaticResolution::Guard),
            Build::new(next_tag()).bytes(1).literal().indirect_call().done(),
        );
    }

    // Intrinsics.
    builder.define(TemplateId::WordConst0, Build::new(next_tag()).bytes(3).done());
    for id in [
        TemplateId::WordDiv,
        TemplateId::WordDivI,
        TemplateId::WordRem,
        TemplateId::WordRemI,
    ] {
        builder.define(id, Build::new(next_tag()).bytes(5).done());
    }
    const POINTER_KINDS: [Kind; 9] = [
        Kind::Byte,
        Kind::Char,
        Kind::Short,
        Kind::Int,
        Kind::Long,
        Kind::Float,
        Kind::Double,
        Kind::Word,
        Kind::Reference,
    ];
    for kind in POINTER_KINDS {
        for addressing in [Addressing::Offset, Addressing::Indexed] {
            builder.define(
                TemplateId::PointerRead(kind, addressing),
                Build::new(next_tag()).bytes(4).done(),
            );
            if kind != Kind::Char {
                builder.define(
                    TemplateId::PointerWrite(kind, addressing),
                    Build::new(next_tag()).bytes(4).done(),
                );
            }
        }
        builder.define(TemplateId::PointerGet(kind), Build::new(next_tag()).bytes(5).done());
        if kind != Kind::Char {
            builder.define(TemplateId::PointerSet(kind), Build::new(next_tag()).bytes(5).done());
        }
    }
    for kind in [Kind::Int, Kind::Word, Kind::Reference] {
        for addressing in [Addressing::Offset, Addressing::Indexed] {
            builder.define(
                TemplateId::PointerCmpSwap(kind, addressing),
                Build::new(next_tag()).bytes(6).done(),
            );
        }
    }
    for barrier in [
        Barrier::LoadLoad,
        Barrier::LoadStore,
        Barrier::StoreLoad,
        Barrier::StoreStore,
    ] {
        builder.define(TemplateId::MemBarrier(barrier), Build::new(next_tag()).bytes(3).done());
    }
    for id in [
        TemplateId::MovI2F,
        TemplateId::MovF2I,
        TemplateId::MovL2D,
        TemplateId::MovD2L,
        TemplateId::Pause,
        TemplateId::BitScanForward,
        TemplateId::BitScanReverse,
    ] {
        builder.define(id, Build::new(next_tag()).bytes(3).done());
    }
    for role in [
        RegRole::StackPointer,
        RegRole::FramePointer,
        RegRole::SafepointLatch,
        RegRole::LinkAddress,
    ] {
        builder.define(TemplateId::ReadRegister(role), Build::new(next_tag()).bytes(3).done());
        builder.define(TemplateId::WriteRegister(role), Build::new(next_tag()).bytes(3).done());
    }

    // Structural templates.
    builder.define(TemplateId::LoadException, Build::new(next_tag()).bytes(4).done());
    builder.define(
        TemplateId::HotpathCounter,
        Build::new(next_tag()).bytes(1).imm_int().done(),
    );
    builder.define(
        TemplateId::EntryCounter,
        Build::new(next_tag()).bytes(1).literal().done(),
    );
    builder.define(
        TemplateId::TraceMethod,
        Build::new(next_tag())
            .bytes(1)
            .literal()
            .runtime_call("stub_trace")
            .done(),
    );

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_builds() {
        let catalog = sample_catalog();
        assert_eq!(catalog.abi().word_bytes, 8);
        assert!(catalog.has_template(TemplateId::ArrayLoad(Kind::Reference)));
        assert!(catalog.has_template(TemplateId::InvokeStatic(
            Kind::Word,
            StaticResolution::Initialized
        )));
    }

    #[test]
    fn test_tableswitch_templates_align_table() {
        let catalog = sample_catalog();
        for alignment in 0..4 {
            let template = catalog.table_switch(alignment);
            assert_eq!((alignment + template.len()) % 4, 0);
        }
    }

    #[test]
    fn test_invoke_special_template_shape() {
        let catalog = sample_catalog();
        let template =
            catalog.template(TemplateId::InvokeSpecial(Kind::Word, Resolution::Resolved));
        assert_eq!(template.direct_calls.len(), 1);
        assert_eq!(template.indirect_calls.len(), 0);
        assert_eq!(template.safepoints.len(), 0);
        assert!(template.direct_calls[0].temp_refs.is_empty());
    }
}
