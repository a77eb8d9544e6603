//! End-to-end translation tests over the synthetic sample catalog.
//!
//! These exercise the translator through its public API: assemble a
//! bytecode method, translate it, and check the produced code positions,
//! stops, reference maps, and fixed-up branch/switch operands.

use std::sync::Arc;

use stitch::bytecode::pool::{
    ClassInfo, ConstantPool, FieldInfo, FieldRefEntry, HeapValue, LinkageErrorKind, MethodInfo,
    MethodRefEntry, PoolEntry, Signature,
};
use stitch::bytecode::symbols::Symbol;
use stitch::bytecode::{ops, ExceptionHandler, Kind, Method};
use stitch::jit::modifier::DispWidth;
use stitch::jit::sample::sample_catalog;
use stitch::jit::stops::map_bit;
use stitch::jit::template::{BranchCondition, TemplateCatalog};
use stitch::{TargetGenerator, TranslateError, TranslatedMethod, TranslatorOptions, VerifyError};

fn method(code: Vec<u8>, params: Vec<Kind>, max_locals: usize, max_stack: usize) -> Method {
    method_with_pool(code, params, max_locals, max_stack, ConstantPool::new(vec![]))
}

fn method_with_pool(
    code: Vec<u8>,
    params: Vec<Kind>,
    max_locals: usize,
    max_stack: usize,
    pool: Arc<ConstantPool>,
) -> Method {
    Method {
        name: Symbol::intern("test/Subject.m"),
        code: code.into_boxed_slice(),
        params,
        max_locals,
        max_stack,
        exception_handlers: vec![],
        pool,
    }
}

fn translate(catalog: &TemplateCatalog, method: &Method) -> TranslatedMethod {
    TargetGenerator::new(catalog, TranslatorOptions::default())
        .translate(method)
        .expect("translation failed")
}

fn int_field(holder: &Arc<ClassInfo>, name: &str, offset: i32, is_static: bool) -> Arc<FieldInfo> {
    Arc::new(FieldInfo {
        name: Symbol::intern(name),
        holder: holder.clone(),
        kind: Kind::Int,
        offset,
        is_static,
    })
}

fn static_method(holder: &Arc<ClassInfo>, name: &str) -> Arc<MethodInfo> {
    Arc::new(MethodInfo {
        name: Symbol::intern(name),
        holder: holder.clone(),
        signature: Signature::new(vec![], Kind::Void),
        is_static: true,
        is_final: false,
        is_private: false,
        dispatch_index: 0,
    })
}

fn virtual_method(holder: &Arc<ClassInfo>, name: &str, is_final: bool) -> Arc<MethodInfo> {
    Arc::new(MethodInfo {
        name: Symbol::intern(name),
        holder: holder.clone(),
        signature: Signature::new(vec![Kind::Int], Kind::Int),
        is_static: false,
        is_final,
        is_private: false,
        dispatch_index: 7,
    })
}

// ========================================
// bci map and block structure
// ========================================

#[test]
fn test_bci_map_is_monotonic_with_sentinel() {
    let catalog = sample_catalog();
    let m = method(
        vec![
            ops::ICONST_1,
            ops::ISTORE_1,
            ops::ILOAD_1,
            ops::ICONST_2,
            ops::IADD,
            ops::ISTORE_1,
            ops::RETURN,
        ],
        vec![],
        2,
        2,
    );
    let t = translate(&catalog, &m);
    assert_eq!(t.bci_to_code.len(), m.code.len() + 1);
    let mut last = 0;
    for bci in 0..m.code.len() {
        let pos = t.bci_to_code[bci];
        assert!(pos > 0, "bci {} has no mapped position", bci);
        assert!(pos >= last, "bci map not monotonic at {}", bci);
        last = pos;
    }
    assert_eq!(
        t.bci_to_code[m.code.len()] as usize,
        t.code_len(),
        "sentinel entry must equal the final code length"
    );
}

#[test]
fn test_block_zero_always_starts() {
    let catalog = sample_catalog();
    let m = method(vec![ops::RETURN], vec![], 0, 0);
    let t = translate(&catalog, &m);
    assert!(t.block_starts[0]);
    assert_eq!(t.block_count, 1);
}

// ========================================
// Forward branch fixup
// ========================================

#[test]
fn test_forward_goto_fixup_lands_on_target() {
    let catalog = sample_catalog();
    // 0: goto 8; 3..8: five iconst_0; 8: return
    let m = method(
        vec![
            ops::GOTO,
            0,
            8,
            ops::ICONST_0,
            ops::ICONST_0,
            ops::ICONST_0,
            ops::ICONST_0,
            ops::ICONST_0,
            ops::RETURN,
        ],
        vec![],
        0,
        1,
    );
    let t = translate(&catalog, &m);
    let branch = catalog.branch(BranchCondition::Always, DispWidth::Wide);
    let branch_pos = t.bci_to_code[0] as usize;
    let disp = i32::from_le_bytes(
        t.code[branch_pos + 1..branch_pos + 5].try_into().unwrap(),
    );
    let expected = t.bci_to_code[8] as i64 - (branch_pos + branch.len()) as i64;
    assert_eq!(disp as i64, expected);
    assert!(disp > 0, "forward displacement must be positive");
}

#[test]
fn test_backward_goto_emits_safepoint_and_patches_immediately() {
    let catalog = sample_catalog();
    // 0: iconst_0; 1: pop; 2: goto 0
    let m = method(vec![ops::ICONST_0, ops::POP, ops::GOTO, 0xff, 0xfe], vec![], 0, 1);
    let t = translate(&catalog, &m);
    assert_eq!(t.stops.safepoint_count, 1);
    let safepoint_index = t.stops.stop_count() - 1;
    assert_eq!(t.stops.bcis[safepoint_index], 2);
    // The poll sits where the goto's code begins.
    assert_eq!(
        t.stops.positions[safepoint_index],
        t.bci_to_code[2],
        "backward-branch safepoint precedes the branch instruction"
    );
}

#[test]
fn test_branch_to_invalid_target_is_verify_error() {
    let catalog = sample_catalog();
    let m = method(vec![ops::GOTO, 0x7f, 0x00], vec![], 0, 0);
    let err = TargetGenerator::new(&catalog, TranslatorOptions::default())
        .translate(&m)
        .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::Verify(VerifyError::BadBranchTarget { .. })
    ));
}

// ========================================
// Switches
// ========================================

#[test]
fn test_tableswitch_jump_table_round_trip() {
    let catalog = sample_catalog();
    // tableswitch at bci 0 (low=0, high=2), case targets 30/35/40,
    // default 45; filler nops behind it, return at 45.
    let mut code = vec![ops::ICONST_1, ops::TABLESWITCH, 0, 0];
    code.extend_from_slice(&44i32.to_be_bytes()); // default -> bci 45
    code.extend_from_slice(&0i32.to_be_bytes()); // low
    code.extend_from_slice(&2i32.to_be_bytes()); // high
    code.extend_from_slice(&29i32.to_be_bytes()); // -> bci 30
    code.extend_from_slice(&34i32.to_be_bytes()); // -> bci 35
    code.extend_from_slice(&39i32.to_be_bytes()); // -> bci 40
    assert_eq!(code.len(), 28);
    while code.len() < 45 {
        code.push(ops::NOP);
    }
    code.push(ops::RETURN);
    let m = method(code, vec![], 0, 1);
    let t = translate(&catalog, &m);

    let switch_pos = t.bci_to_code[1] as usize;
    let template = catalog.table_switch(switch_pos & 3);
    let table_pos = switch_pos + template.len();
    assert_eq!(table_pos % 4, 0, "jump table must be 4-byte aligned");
    for (i, target_bci) in [30usize, 35, 40].into_iter().enumerate() {
        let entry = i32::from_le_bytes(
            t.code[table_pos + i * 4..table_pos + i * 4 + 4].try_into().unwrap(),
        );
        let expected = t.bci_to_code[target_bci] as i64 - table_pos as i64;
        assert_eq!(entry as i64, expected, "case {} resolves to its target", i);
    }
}

#[test]
fn test_tableswitch_low_above_high_rejected() {
    let catalog = sample_catalog();
    let mut code = vec![ops::ICONST_1, ops::TABLESWITCH, 0, 0];
    code.extend_from_slice(&8i32.to_be_bytes());
    code.extend_from_slice(&5i32.to_be_bytes()); // low
    code.extend_from_slice(&1i32.to_be_bytes()); // high < low
    let m = method(code, vec![], 0, 1);
    let err = TargetGenerator::new(&catalog, TranslatorOptions::default())
        .translate(&m)
        .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::Verify(VerifyError::TableSwitchBounds { low: 5, high: 1, .. })
    ));
}

#[test]
fn test_lookupswitch_pairs_round_trip() {
    let catalog = sample_catalog();
    // lookupswitch at bci 1: pairs {9 -> 30, 44 -> 35}, default 40.
    let mut code = vec![ops::ICONST_1, ops::LOOKUPSWITCH, 0, 0];
    code.extend_from_slice(&39i32.to_be_bytes()); // default -> bci 40
    code.extend_from_slice(&2i32.to_be_bytes()); // npairs
    code.extend_from_slice(&9i32.to_be_bytes());
    code.extend_from_slice(&29i32.to_be_bytes()); // -> bci 30
    code.extend_from_slice(&44i32.to_be_bytes());
    code.extend_from_slice(&34i32.to_be_bytes()); // -> bci 35
    assert_eq!(code.len(), 28);
    while code.len() < 40 {
        code.push(ops::NOP);
    }
    code.push(ops::RETURN);
    let m = method(code, vec![], 0, 1);
    let t = translate(&catalog, &m);

    let switch_pos = t.bci_to_code[1] as usize;
    let template = catalog.lookup_switch();
    let table_pos = switch_pos + template.len();
    for (i, (match_value, target_bci)) in [(9i32, 30usize), (44, 35)].into_iter().enumerate() {
        let value = i32::from_le_bytes(
            t.code[table_pos + i * 8..table_pos + i * 8 + 4].try_into().unwrap(),
        );
        let offset = i32::from_le_bytes(
            t.code[table_pos + i * 8 + 4..table_pos + i * 8 + 8].try_into().unwrap(),
        );
        assert_eq!(value, match_value);
        assert_eq!(
            offset as i64,
            t.bci_to_code[target_bci] as i64 - table_pos as i64
        );
    }
}

#[test]
fn test_lookupswitch_negative_count_rejected() {
    let catalog = sample_catalog();
    let mut code = vec![ops::ICONST_1, ops::LOOKUPSWITCH, 0, 0];
    code.extend_from_slice(&8i32.to_be_bytes());
    code.extend_from_slice(&(-1i32).to_be_bytes());
    let m = method(code, vec![], 0, 1);
    let err = TargetGenerator::new(&catalog, TranslatorOptions::default())
        .translate(&m)
        .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::Verify(VerifyError::LookupSwitchCount { count: -1, .. })
    ));
}

// ========================================
// Resolution trichotomy
// ========================================

fn getstatic_method(initialized: bool) -> Method {
    let holder = if initialized {
        ClassInfo::new_initialized("test/Holder")
    } else {
        ClassInfo::new("test/Holder")
    };
    let field = int_field(&holder, "test/Holder.count", 24, true);
    let pool = ConstantPool::new(vec![PoolEntry::Integer(0), FieldRefEntry::resolved(field)]);
    method_with_pool(
        vec![ops::GETSTATIC, 0, 1, ops::POP, ops::RETURN],
        vec![],
        0,
        1,
        pool,
    )
}

#[test]
fn test_getstatic_initialized_takes_fast_path() {
    let catalog = sample_catalog();
    let t = translate(&catalog, &getstatic_method(true));
    // Fast path: no resolution stop, one literal (the statics object).
    assert_eq!(t.stops.stop_count(), 0);
    let literals = t.reference_literals.expect("statics literal expected");
    assert_eq!(literals.len(), 1);
    assert!(matches!(literals[0].value(), HeapValue::StaticTuple(_)));
}

#[test]
fn test_getstatic_uninitialized_takes_guard_path() {
    let catalog = sample_catalog();
    let t = translate(&catalog, &getstatic_method(false));
    // Guard path: a resolution runtime call and a guard literal.
    assert_eq!(t.stops.direct_call_count(), 1);
    assert!(t.stops.is_runtime_call(0));
    let literals = t.reference_literals.expect("guard literal expected");
    assert_eq!(literals.len(), 1);
    assert!(matches!(literals[0].value(), HeapValue::Guard(_)));
}

#[test]
fn test_unresolved_field_never_fails_translation() {
    let catalog = sample_catalog();
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        FieldRefEntry::broken("test/Gone.f", Kind::Int, LinkageErrorKind::NoSuchField),
    ]);
    let m = method_with_pool(
        vec![ops::GETSTATIC, 0, 1, ops::POP, ops::RETURN],
        vec![],
        0,
        1,
        pool,
    );
    // The linkage failure is deferred to run time, not surfaced here.
    let t = translate(&catalog, &m);
    let literals = t.reference_literals.expect("guard literal expected");
    assert!(matches!(literals[0].value(), HeapValue::Guard(_)));
}

#[test]
fn test_getfield_resolved_patches_offset() {
    let catalog = sample_catalog();
    let holder = ClassInfo::new_initialized("test/Holder");
    let field = int_field(&holder, "test/Holder.x", 0x44, false);
    let pool = ConstantPool::new(vec![PoolEntry::Integer(0), FieldRefEntry::resolved(field)]);
    let m = method_with_pool(
        vec![ops::ALOAD_0, ops::GETFIELD, 0, 1, ops::POP, ops::RETURN],
        vec![Kind::Reference],
        1,
        1,
        pool,
    );
    let t = translate(&catalog, &m);
    // The resolved template's immediate holds the field offset.
    let template_pos = t.bci_to_code[1] as usize;
    let imm_pos = template_pos + 3; // two body bytes follow the tag byte
    let imm = i32::from_le_bytes(t.code[imm_pos..imm_pos + 4].try_into().unwrap());
    assert_eq!(imm, 0x44);
}

// ========================================
// Invokes
// ========================================

#[test]
fn test_invokestatic_initialized_is_single_direct_call() {
    let catalog = sample_catalog();
    let holder = ClassInfo::new_initialized("test/Holder");
    let callee = static_method(&holder, "test/Holder.tick");
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        MethodRefEntry::resolved(callee.clone()),
    ]);
    let m = method_with_pool(
        vec![ops::INVOKESTATIC, 0, 1, ops::RETURN],
        vec![],
        0,
        0,
        pool,
    );
    let t = translate(&catalog, &m);
    assert_eq!(t.stops.direct_call_count(), 1);
    assert_eq!(t.stops.indirect_count, 0);
    assert!(!t.stops.is_runtime_call(0));
    // The call is an application call to the resolved method, with a
    // completely clear reference map at the call itself.
    match &t.stops.direct_callees[0] {
        stitch::jit::stops::DirectCallee::Method(m) => {
            assert!(Symbol::same(&m.name, &callee.name))
        }
        other => panic!("expected application callee, got {:?}", other),
    }
    assert!(t.stops.frame_map(0).iter().all(|&b| b == 0));
}

#[test]
fn test_direct_call_site_does_not_straddle_word_boundary() {
    let catalog = sample_catalog();
    let holder = ClassInfo::new_initialized("test/Holder");
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        MethodRefEntry::resolved(static_method(&holder, "test/Holder.a")),
    ]);
    // Several padding instructions before the call shift its position
    // around; the call instruction must never cross an 8-byte boundary.
    for filler in 0..6 {
        let mut code = Vec::new();
        for _ in 0..filler {
            code.push(ops::ICONST_0);
            code.push(ops::POP);
        }
        code.extend_from_slice(&[ops::INVOKESTATIC, 0, 1, ops::RETURN]);
        let m = method_with_pool(code, vec![], 0, 1, pool.clone());
        let t = translate(&catalog, &m);
        let call_pos = t.stops.positions[0] as usize;
        let call_end = call_pos + catalog.abi().direct_call_bytes - 1;
        assert_eq!(call_pos & !7, call_end & !7, "call straddles with filler {}", filler);
    }
}

#[test]
fn test_invokevirtual_final_devirtualizes_to_direct_call() {
    let catalog = sample_catalog();
    let holder = ClassInfo::new_initialized("test/Holder");
    let target = virtual_method(&holder, "test/Holder.sealed", true);
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        MethodRefEntry::resolved(target),
    ]);
    let m = method_with_pool(
        vec![
            ops::ALOAD_0,
            ops::ICONST_0,
            ops::INVOKEVIRTUAL,
            0,
            1,
            ops::POP,
            ops::RETURN,
        ],
        vec![Kind::Reference],
        1,
        2,
        pool,
    );
    let t = translate(&catalog, &m);
    // A final target takes the invokespecial path: one direct call, no
    // vtable dispatch.
    assert_eq!(t.stops.direct_call_count(), 1);
    assert_eq!(t.stops.indirect_count, 0);
}

#[test]
fn test_invokevirtual_open_target_dispatches_indirectly() {
    let catalog = sample_catalog();
    let holder = ClassInfo::new_initialized("test/Holder");
    let target = virtual_method(&holder, "test/Holder.open", false);
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        MethodRefEntry::resolved(target),
    ]);
    let m = method_with_pool(
        vec![
            ops::ALOAD_0,
            ops::ICONST_0,
            ops::INVOKEVIRTUAL,
            0,
            1,
            ops::POP,
            ops::RETURN,
        ],
        vec![Kind::Reference],
        1,
        2,
        pool,
    );
    let t = translate(&catalog, &m);
    assert_eq!(t.stops.direct_call_count(), 0);
    assert_eq!(t.stops.indirect_count, 1);
}

#[test]
fn test_unresolved_invokevirtual_takes_guard_path() {
    let catalog = sample_catalog();
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        MethodRefEntry::unresolved("test/Later.poke", Signature::new(vec![Kind::Int], Kind::Void)),
    ]);
    let m = method_with_pool(
        vec![ops::ALOAD_0, ops::ICONST_0, ops::INVOKEVIRTUAL, 0, 1, ops::RETURN],
        vec![Kind::Reference],
        1,
        2,
        pool,
    );
    let t = translate(&catalog, &m);
    assert_eq!(t.stops.indirect_count, 1);
    let literals = t.reference_literals.expect("guard literal expected");
    assert!(matches!(literals[0].value(), HeapValue::Guard(_)));
}

// ========================================
// Reference maps
// ========================================

#[test]
fn test_safepoint_reference_map_is_exact_for_ref_locals() {
    let catalog = sample_catalog();
    // Empty-stack loop with reference locals 0 and 2; local 1 is an int.
    // 0: goto 0 is the whole body.
    let m = method(
        vec![ops::GOTO, 0, 0],
        vec![Kind::Reference, Kind::Int, Kind::Reference],
        3,
        2,
    );
    let t = translate(&catalog, &m);
    assert_eq!(t.stops.safepoint_count, 1);
    let stop = t.stops.stop_count() - 1;
    let map = t.stops.frame_map(stop);
    assert!(map_bit(map, t.frame.local_bit(0)), "live ref local 0 must be marked");
    assert!(map_bit(map, t.frame.local_bit(2)), "live ref local 2 must be marked");
    assert!(!map_bit(map, t.frame.local_bit(1)), "int local must not be marked");
    for stack_slot in 0..m.max_stack {
        assert!(!map_bit(map, t.frame.stack_bit(stack_slot)));
    }
    // Backward-branch safepoints keep registers and template slots clear.
    let register_map = t.stops.register_map(0);
    assert!(register_map.iter().all(|&b| b == 0));
}

#[test]
fn test_reference_on_stack_is_marked_at_runtime_call() {
    let catalog = sample_catalog();
    // aload_0; aconst_null; checkcast (resolved) with a ref below the
    // checked value on the stack.
    let class = ClassInfo::new_initialized("test/Kind");
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        stitch::bytecode::pool::ClassRefEntry::resolved(class),
    ]);
    let m = method_with_pool(
        vec![
            ops::ALOAD_0,
            ops::ACONST_NULL,
            ops::CHECKCAST,
            0,
            1,
            ops::POP,
            ops::POP,
            ops::RETURN,
        ],
        vec![Kind::Reference],
        1,
        3,
        pool,
    );
    let t = translate(&catalog, &m);
    // The checkcast template's runtime call sees both stack refs live.
    assert_eq!(t.stops.direct_call_count(), 1);
    let map = t.stops.frame_map(0);
    assert!(map_bit(map, t.frame.local_bit(0)));
    assert!(map_bit(map, t.frame.stack_bit(0)));
    assert!(map_bit(map, t.frame.stack_bit(1)));
}

#[test]
fn test_popped_arguments_are_dead_at_direct_call() {
    let catalog = sample_catalog();
    let holder = ClassInfo::new_initialized("test/Holder");
    let callee = Arc::new(MethodInfo {
        name: Symbol::intern("test/Holder.eat"),
        holder: holder.clone(),
        signature: Signature::new(vec![Kind::Reference], Kind::Void),
        is_static: true,
        is_final: false,
        is_private: false,
        dispatch_index: 0,
    });
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        MethodRefEntry::resolved(callee),
    ]);
    // Keep one ref on the stack below the outgoing argument.
    let m = method_with_pool(
        vec![
            ops::ALOAD_0,
            ops::ALOAD_0,
            ops::INVOKESTATIC,
            0,
            1,
            ops::POP,
            ops::RETURN,
        ],
        vec![Kind::Reference],
        1,
        2,
        pool,
    );
    let t = translate(&catalog, &m);
    assert_eq!(t.stops.direct_call_count(), 1);
    let map = t.stops.frame_map(0);
    // The slot under the argument stays live; the popped argument slot
    // belongs to the callee's map.
    assert!(map_bit(map, t.frame.stack_bit(0)));
    assert!(!map_bit(map, t.frame.stack_bit(1)));
    assert!(map_bit(map, t.frame.local_bit(0)));
}

#[test]
fn test_template_temp_slots_land_above_frame() {
    let catalog = sample_catalog();
    // aastore's store-check template declares template slot 0 live across
    // its runtime call.
    let m = method(
        vec![
            ops::ALOAD_0,
            ops::ICONST_0,
            ops::ALOAD_1,
            ops::AASTORE,
            ops::RETURN,
        ],
        vec![Kind::Reference, Kind::Reference],
        2,
        3,
    );
    let t = translate(&catalog, &m);
    assert_eq!(t.stops.direct_call_count(), 1);
    let map = t.stops.frame_map(0);
    assert!(map_bit(map, t.frame.first_template_slot()));
}

// ========================================
// Exception handlers
// ========================================

#[test]
fn test_exception_table_translates_to_code_ranges() {
    let catalog = sample_catalog();
    // try { iconst; pop } catch { pop-exception; return }
    // 0: iconst_0, 1: pop, 2: goto 7, 5: astore_0 (handler), 6: nop wait...
    let code = vec![
        ops::ICONST_0, // 0
        ops::POP,      // 1
        ops::GOTO,     // 2 -> 7
        0,
        5,
        ops::ASTORE_0, // 5 handler entry
        ops::NOP,      // 6
        ops::RETURN,   // 7
    ];
    let mut m = method(code, vec![], 1, 1);
    m.exception_handlers = vec![ExceptionHandler {
        start_bci: 0,
        end_bci: 2,
        handler_bci: 5,
        catch_type: None,
    }];
    let t = translate(&catalog, &m);
    assert_eq!(t.catch_range_positions.len(), 2);
    assert_eq!(t.catch_range_positions[0], t.bci_to_code[0]);
    assert_eq!(t.catch_range_positions[1], t.bci_to_code[2]);
    assert_eq!(t.catch_block_positions[0], t.bci_to_code[5]);
    assert_eq!(t.catch_block_positions[1], 0, "trailing sentinel has no handler");
}

#[test]
fn test_gap_between_handlers_gets_no_handler_range() {
    let catalog = sample_catalog();
    let code = vec![
        ops::ICONST_0, // 0
        ops::POP,      // 1
        ops::ICONST_0, // 2
        ops::POP,      // 3
        ops::ICONST_0, // 4
        ops::POP,      // 5
        ops::RETURN,   // 6
    ];
    let mut m = method(code, vec![], 1, 1);
    m.exception_handlers = vec![
        ExceptionHandler {
            start_bci: 0,
            end_bci: 1,
            handler_bci: 6,
            catch_type: None,
        },
        ExceptionHandler {
            start_bci: 4,
            end_bci: 5,
            handler_bci: 6,
            catch_type: None,
        },
    ];
    let t = translate(&catalog, &m);
    // range@0 -> handler, gap@1 -> none, range@4 -> handler, tail@5 -> none
    assert_eq!(t.catch_range_positions.len(), 4);
    assert_eq!(t.catch_block_positions[1], 0);
    assert_ne!(t.catch_block_positions[2], 0);
    assert_eq!(t.catch_block_positions[3], 0);
}

// ========================================
// Errors
// ========================================

#[test]
fn test_unknown_opcode_is_fatal() {
    let catalog = sample_catalog();
    let m = method(vec![0xba], vec![], 0, 0);
    let err = TargetGenerator::new(&catalog, TranslatorOptions::default())
        .translate(&m)
        .unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedOpcode { bci: 0, .. }));
}

#[test]
fn test_jsr_and_ret_are_unsupported() {
    let catalog = sample_catalog();
    for opcode in [ops::JSR, ops::RET, ops::JSR_W] {
        let m = method(vec![opcode, 0, 0, 0, 0], vec![], 1, 1);
        let err = TargetGenerator::new(&catalog, TranslatorOptions::default())
            .translate(&m)
            .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedOpcode { .. }));
    }
}

#[test]
fn test_truncated_operands_rejected() {
    let catalog = sample_catalog();
    let m = method(vec![ops::SIPUSH, 1], vec![], 0, 1);
    let err = TargetGenerator::new(&catalog, TranslatorOptions::default())
        .translate(&m)
        .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::Verify(VerifyError::TruncatedInstruction { .. })
    ));
}

// ========================================
// Wide forms, ldc, intrinsics
// ========================================

#[test]
fn test_wide_iinc_and_loads() {
    let catalog = sample_catalog();
    let m = method(
        vec![
            ops::WIDE,
            ops::ILOAD,
            0x01,
            0x00, // local 256
            ops::POP,
            ops::WIDE,
            ops::IINC,
            0x01,
            0x00,
            0x00,
            0x05,
            ops::RETURN,
        ],
        vec![],
        300,
        1,
    );
    let t = translate(&catalog, &m);
    assert!(t.bci_to_code[0] > 0);
    assert!(t.bci_to_code[5] > t.bci_to_code[0]);
}

#[test]
fn test_ldc_string_creates_literal() {
    let catalog = sample_catalog();
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        PoolEntry::Str("hello".into()),
    ]);
    let m = method_with_pool(vec![ops::LDC, 1, ops::POP, ops::RETURN], vec![], 0, 1, pool);
    let t = translate(&catalog, &m);
    let literals = t.reference_literals.expect("string literal expected");
    assert!(matches!(literals[0].value(), HeapValue::Str(_)));
}

#[test]
fn test_ldc2_long_patches_immediate() {
    let catalog = sample_catalog();
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        PoolEntry::Long(0x0102_0304_0506_0708),
    ]);
    let m = method_with_pool(
        vec![ops::LDC2_W, 0, 1, ops::POP2, ops::RETURN],
        vec![],
        0,
        2,
        pool,
    );
    let t = translate(&catalog, &m);
    let pos = t.bci_to_code[0] as usize + 2; // tag and one body byte
    let imm = i64::from_le_bytes(t.code[pos..pos + 8].try_into().unwrap());
    assert_eq!(imm, 0x0102_0304_0506_0708);
}

#[test]
fn test_pointer_intrinsics_decode_sub_opcode() {
    let catalog = sample_catalog();
    let sub = ops::pointer_sub::REFERENCE as u8;
    let m = method(
        vec![
            ops::ALOAD_0,
            ops::ICONST_0,
            ops::PREAD,
            0,
            sub,
            ops::POP,
            ops::RETURN,
        ],
        vec![Kind::Reference],
        1,
        2,
    );
    // Translates cleanly; a bad sub-opcode is fatal.
    translate(&catalog, &m);

    let bad = method(vec![ops::PREAD, 0, 0x0f, ops::RETURN], vec![], 0, 2);
    let err = TargetGenerator::new(&catalog, TranslatorOptions::default())
        .translate(&bad)
        .unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedOpcode { .. }));
}

#[test]
fn test_multianewarray_carries_two_literals() {
    let catalog = sample_catalog();
    let elem = ClassInfo::new_initialized("test/Elem");
    let matrix = elem.array_class().array_class();
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        stitch::bytecode::pool::ClassRefEntry::resolved(matrix),
    ]);
    let m = method_with_pool(
        vec![
            ops::ICONST_2,
            ops::ICONST_2,
            ops::MULTIANEWARRAY,
            0,
            1,
            2,
            ops::POP,
            ops::RETURN,
        ],
        vec![],
        0,
        2,
        pool,
    );
    let t = translate(&catalog, &m);
    // Layout order: later-created literals sit further from the code, so
    // the dimensions array precedes the class in the packed slice.
    let literals = t.reference_literals.expect("literals expected");
    assert_eq!(literals.len(), 2);
    assert!(matches!(literals[0].value(), HeapValue::IntArray(_)));
    assert!(matches!(literals[1].value(), HeapValue::Class(_)));
}

#[test]
fn test_options_load_from_toml_file() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "hotpath_counters = true\ntrace_methods = true").unwrap();
    let text = std::fs::read_to_string(file.path()).unwrap();
    let options: TranslatorOptions = toml::from_str(&text).unwrap();
    assert!(options.hotpath_counters);
    assert!(options.trace_methods);
    assert!(!options.eager_resolution);
}

// ========================================
// Policy-gated instrumentation
// ========================================

#[test]
fn test_hotpath_counter_owns_backward_target_map_entry() {
    let catalog = sample_catalog();
    // 0: iconst_0, 1: pop, 2: iconst_0, 3: pop, 4: goto 2
    let code = vec![
        ops::ICONST_0,
        ops::POP,
        ops::ICONST_0,
        ops::POP,
        ops::GOTO,
        0xff,
        0xfe,
    ];
    let m = method(code, vec![], 0, 1);
    let options = TranslatorOptions {
        hotpath_counters: true,
        ..Default::default()
    };
    let t = TargetGenerator::new(&catalog, options)
        .translate(&m)
        .unwrap();
    // The counter template sits at the target's mapped position, its
    // immediate patched with the target bci.
    let counter_pos = t.bci_to_code[2] as usize;
    let counter_bci = i32::from_le_bytes(
        t.code[counter_pos + 2..counter_pos + 6].try_into().unwrap(),
    );
    assert_eq!(counter_bci, 2);
}

#[test]
fn test_method_profiling_embeds_profile_literal() {
    let catalog = sample_catalog();
    let m = method(vec![ops::RETURN], vec![], 0, 0);
    let options = TranslatorOptions {
        method_profiling: true,
        ..Default::default()
    };
    let t = TargetGenerator::new(&catalog, options)
        .translate(&m)
        .unwrap();
    let literals = t.reference_literals.expect("entry counter literal");
    assert!(matches!(literals[0].value(), HeapValue::Profile(_)));
}

#[test]
fn test_eager_resolution_still_defers_failures() {
    let catalog = sample_catalog();
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        FieldRefEntry::unresolved("test/Later.f", Kind::Int),
    ]);
    let m = method_with_pool(
        vec![ops::GETSTATIC, 0, 1, ops::POP, ops::RETURN],
        vec![],
        0,
        1,
        pool,
    );
    let options = TranslatorOptions {
        eager_resolution: true,
        ..Default::default()
    };
    // Forcing resolution of an unloadable entry falls back to the guard
    // path instead of failing the translation.
    let t = TargetGenerator::new(&catalog, options)
        .translate(&m)
        .unwrap();
    let literals = t.reference_literals.expect("guard literal expected");
    assert!(matches!(literals[0].value(), HeapValue::Guard(_)));
}

// ========================================
// Stop packing across a whole method
// ========================================

#[test]
fn test_stop_positions_grouped_and_bci_ordered() {
    let catalog = sample_catalog();
    let holder = ClassInfo::new_initialized("test/Holder");
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        MethodRefEntry::resolved(static_method(&holder, "test/Holder.a")),
        MethodRefEntry::resolved(virtual_method(&holder, "test/Holder.b", false)),
    ]);
    // direct call, then virtual (indirect), then a backward goto
    // (safepoint).
    let m = method_with_pool(
        vec![
            ops::INVOKESTATIC, // 0
            0,
            1,
            ops::ALOAD_0, // 3
            ops::ICONST_0,
            ops::INVOKEVIRTUAL, // 5
            0,
            2,
            ops::POP,   // 8
            ops::GOTO,  // 9 -> 0
            0xff,
            0xf7,
        ],
        vec![Kind::Reference],
        1,
        2,
        pool,
    );
    let t = translate(&catalog, &m);
    let stops = &t.stops;
    assert_eq!(stops.direct_call_count(), 1);
    assert_eq!(stops.indirect_count, 1);
    assert_eq!(stops.safepoint_count, 1);
    // Kind groups: direct, indirect, safepoint; bcis ascend within the
    // whole method here.
    assert_eq!(stops.bcis[0], 0);
    assert_eq!(stops.bcis[1], 5);
    assert_eq!(stops.bcis[2], 9);
    // Reference map area sizing: one frame map per stop plus one register
    // map per safepoint.
    assert_eq!(
        stops.reference_map_bytes().len(),
        3 * t.frame.frame_map_bytes() + t.frame.register_map_bytes()
    );
    // The per-bci index finds each stop.
    assert_eq!(stops.stops_at(0).collect::<Vec<_>>(), vec![0]);
    assert_eq!(stops.stops_at(5).collect::<Vec<_>>(), vec![1]);
    assert_eq!(stops.stops_at(9).collect::<Vec<_>>(), vec![2]);
}
