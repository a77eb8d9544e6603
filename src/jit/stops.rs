//! Stop and safepoint bookkeeping for translated methods.
//!
//! A stop is a position in generated code where the set of live object
//! references is precisely known: a direct call, an indirect call, or a
//! safepoint. Stops accumulate in bytecode order while a method is
//! translated and are then packed into compact parallel arrays plus one
//! flat byte array of reference maps.

use std::fmt;
use std::sync::Arc;

use crate::bytecode::pool::MethodInfo;
use crate::bytecode::symbols::Symbol;

use super::template::Template;

// ========================================
// Reference bitsets
// ========================================

/// A small bitset over frame or register slots. Sufficient for template
/// temporary areas and register sets; full frame maps use flat byte arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefBitset(u64);

impl RefBitset {
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn set(&mut self, index: usize) {
        debug_assert!(index < 64, "RefBitset supports max 64 slots");
        self.0 |= 1 << index;
    }

    pub fn is_set(&self, index: usize) -> bool {
        if index >= 64 {
            return false;
        }
        (self.0 & (1 << index)) != 0
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter_set_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..64).filter(|&i| self.is_set(i))
    }
}

/// Set bit `index` in a flat little-endian bitmap.
pub fn set_map_bit(map: &mut [u8], index: usize) {
    map[index / 8] |= 1 << (index % 8);
}

/// Test bit `index` in a flat little-endian bitmap.
pub fn map_bit(map: &[u8], index: usize) -> bool {
    map[index / 8] & (1 << (index % 8)) != 0
}

// ========================================
// Stops
// ========================================

/// Target of a direct call: an application method, or a named runtime
/// entry point (template code calls into the runtime for slow paths).
#[derive(Clone)]
pub enum DirectCallee {
    Method(Arc<MethodInfo>),
    Runtime(Symbol),
}

impl DirectCallee {
    pub fn is_runtime(&self) -> bool {
        matches!(self, DirectCallee::Runtime(_))
    }
}

impl fmt::Debug for DirectCallee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectCallee::Method(m) => write!(f, "{}", m.name),
            DirectCallee::Runtime(s) => write!(f, "runtime:{}", s),
        }
    }
}

/// One recorded stop. Template-derived stops copy their reference bits out
/// of the source template's marker; the two bytecode-level variants mark no
/// template bits at all: at an invoke's own direct call every template slot
/// is dead by contract, and at a backward-branch safepoint nothing live is
/// in registers or template temporaries by construction.
#[derive(Debug, Clone)]
pub enum Stop {
    TemplateDirectCall {
        pos: usize,
        bci: usize,
        callee: DirectCallee,
        is_runtime_call: bool,
        temp_refs: RefBitset,
    },
    TemplateIndirectCall {
        pos: usize,
        bci: usize,
        temp_refs: RefBitset,
    },
    TemplateSafepoint {
        pos: usize,
        bci: usize,
        temp_refs: RefBitset,
        reg_refs: RefBitset,
    },
    BytecodeDirectCall {
        pos: usize,
        bci: usize,
        callee: Arc<MethodInfo>,
    },
    BackwardBranchSafepoint {
        pos: usize,
        bci: usize,
    },
}

impl Stop {
    pub fn pos(&self) -> usize {
        match *self {
            Stop::TemplateDirectCall { pos, .. }
            | Stop::TemplateIndirectCall { pos, .. }
            | Stop::TemplateSafepoint { pos, .. }
            | Stop::BytecodeDirectCall { pos, .. }
            | Stop::BackwardBranchSafepoint { pos, .. } => pos,
        }
    }

    pub fn bci(&self) -> usize {
        match *self {
            Stop::TemplateDirectCall { bci, .. }
            | Stop::TemplateIndirectCall { bci, .. }
            | Stop::TemplateSafepoint { bci, .. }
            | Stop::BytecodeDirectCall { bci, .. }
            | Stop::BackwardBranchSafepoint { bci, .. } => bci,
        }
    }

    fn kind_rank(&self) -> usize {
        match self {
            Stop::TemplateDirectCall { .. } | Stop::BytecodeDirectCall { .. } => 0,
            Stop::TemplateIndirectCall { .. } => 1,
            Stop::TemplateSafepoint { .. } | Stop::BackwardBranchSafepoint { .. } => 2,
        }
    }

    /// At this stop, have the current bytecode's popped operands already
    /// left the stack? True only for the call emitted at an invoke site
    /// itself; the callee's own map covers the outgoing arguments.
    pub fn parameters_popped(&self) -> bool {
        matches!(self, Stop::BytecodeDirectCall { .. })
    }

    /// Fill this stop's bits of the frame reference map covering the
    /// template temporary area, whose first slot is bit
    /// `first_template_slot`.
    fn init_frame_map(&self, map: &mut [u8], first_template_slot: usize) {
        let temp_refs = match self {
            Stop::TemplateDirectCall { temp_refs, .. }
            | Stop::TemplateIndirectCall { temp_refs, .. }
            | Stop::TemplateSafepoint { temp_refs, .. } => *temp_refs,
            Stop::BytecodeDirectCall { .. } | Stop::BackwardBranchSafepoint { .. } => {
                RefBitset::new()
            }
        };
        for slot in temp_refs.iter_set_indices() {
            set_map_bit(map, first_template_slot + slot);
        }
    }

    fn init_register_map(&self, map: &mut [u8]) {
        if let Stop::TemplateSafepoint { reg_refs, .. } = self {
            for reg in reg_refs.iter_set_indices() {
                set_map_bit(map, reg);
            }
        }
        // A backward-branch safepoint keeps no references in registers.
    }
}

// ========================================
// Builder
// ========================================

/// Accumulates stops during translation, in non-decreasing bytecode order.
pub struct StopsBuilder {
    stops: Vec<Stop>,
    last_bci: usize,
}

impl StopsBuilder {
    /// `code_len` sizes the initial allocation so most methods never
    /// reallocate.
    pub fn new(code_len: usize) -> StopsBuilder {
        StopsBuilder {
            stops: Vec::with_capacity(code_len / 2),
            last_bci: 0,
        }
    }

    /// Append one stop. Stops must arrive in non-decreasing bytecode order;
    /// a violation is a translator bug, not an input error.
    pub fn add(&mut self, stop: Stop) {
        assert!(
            stop.bci() >= self.last_bci,
            "stop at bci {} added after bci {}",
            stop.bci(),
            self.last_bci
        );
        self.last_bci = stop.bci();
        self.stops.push(stop);
    }

    /// Record every call site and safepoint a template carries, offset by
    /// the code-buffer position the template was copied to.
    pub fn add_template(&mut self, template: &Template, code_pos: usize, bci: usize) {
        for call in template.direct_calls.iter() {
            self.add(Stop::TemplateDirectCall {
                pos: code_pos + call.pos,
                bci,
                callee: call.callee.clone(),
                is_runtime_call: call.is_runtime_call,
                temp_refs: call.temp_refs,
            });
        }
        for call in template.indirect_calls.iter() {
            self.add(Stop::TemplateIndirectCall {
                pos: code_pos + call.pos,
                bci,
                temp_refs: call.temp_refs,
            });
        }
        for safepoint in template.safepoints.iter() {
            self.add(Stop::TemplateSafepoint {
                pos: code_pos + safepoint.pos,
                bci,
                temp_refs: safepoint.temp_refs,
                reg_refs: safepoint.reg_refs,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Pack the accumulated stops. Stops are grouped by kind (all direct
    /// calls, then indirect calls, then safepoints) so the parallel
    /// arrays share one flat index space with each kind's metadata densely
    /// packed. Template-derived reference bits land at
    /// `first_template_slot` and up; the method's own locals/stack bits are
    /// filled in afterwards by the reference-map editor.
    pub fn pack(
        self,
        frame_map_bytes: usize,
        register_map_bytes: usize,
        first_template_slot: usize,
    ) -> Stops {
        let stop_count = self.stops.len();

        // Order stop indices by kind group, preserving insertion (hence
        // bytecode) order within each group.
        let mut by_kind: Vec<usize> = (0..stop_count).collect();
        by_kind.sort_by_key(|&i| self.stops[i].kind_rank());

        let mut positions = Vec::with_capacity(stop_count);
        let mut bcis = Vec::with_capacity(stop_count);
        let mut direct_callees = Vec::new();
        let mut popped_flags = Vec::with_capacity(stop_count);
        let mut runtime_bits = Vec::new();
        let mut indirect_count = 0;
        let mut safepoint_count = 0;

        for &i in &by_kind {
            let stop = &self.stops[i];
            positions.push(stop.pos() as u32);
            bcis.push(stop.bci() as u32);
            popped_flags.push(stop.parameters_popped());
            match stop {
                Stop::TemplateDirectCall {
                    callee,
                    is_runtime_call,
                    ..
                } => {
                    runtime_bits.push(*is_runtime_call);
                    direct_callees.push(callee.clone());
                }
                Stop::BytecodeDirectCall { callee, .. } => {
                    runtime_bits.push(false);
                    direct_callees.push(DirectCallee::Method(callee.clone()));
                }
                Stop::TemplateIndirectCall { .. } => indirect_count += 1,
                Stop::TemplateSafepoint { .. } | Stop::BackwardBranchSafepoint { .. } => {
                    safepoint_count += 1
                }
            }
        }

        let direct_count = direct_callees.len();
        let mut runtime_call_map = vec![0u8; direct_count.div_ceil(8)];
        for (i, is_runtime) in runtime_bits.iter().enumerate() {
            if *is_runtime {
                set_map_bit(&mut runtime_call_map, i);
            }
        }

        // Frame maps for every stop, then one register map per safepoint.
        let mut reference_maps =
            vec![0u8; stop_count * frame_map_bytes + safepoint_count * register_map_bytes];
        let mut safepoint_index = 0;
        for (packed, &i) in by_kind.iter().enumerate() {
            let stop = &self.stops[i];
            let frame = &mut reference_maps[packed * frame_map_bytes..(packed + 1) * frame_map_bytes];
            stop.init_frame_map(frame, first_template_slot);
            if stop.kind_rank() == 2 {
                let reg_base = stop_count * frame_map_bytes + safepoint_index * register_map_bytes;
                stop.init_register_map(
                    &mut reference_maps[reg_base..reg_base + register_map_bytes],
                );
                safepoint_index += 1;
            }
        }

        // Per-bytecode stop index: a flat stream of bci markers (tagged
        // with the high bit) each followed by the packed indices of the
        // stops that occurred during that bytecode's code.
        let mut order: Vec<usize> = (0..stop_count).collect();
        order.sort_by_key(|&packed| bcis[packed]);
        let mut bci_table = Vec::new();
        let mut current_bci = None;
        for packed in order {
            let bci = bcis[packed];
            if current_bci != Some(bci) {
                bci_table.push(BCI_MARK | bci);
                current_bci = Some(bci);
            }
            bci_table.push(packed as u32);
        }

        Stops {
            positions: positions.into_boxed_slice(),
            bcis: bcis.into_boxed_slice(),
            direct_callees: direct_callees.into_boxed_slice(),
            runtime_call_map: runtime_call_map.into_boxed_slice(),
            popped_flags: popped_flags.into_boxed_slice(),
            indirect_count,
            safepoint_count,
            frame_map_bytes,
            register_map_bytes,
            reference_maps: reference_maps.into_boxed_slice(),
            bci_table: bci_table.into_boxed_slice(),
        }
    }
}

const BCI_MARK: u32 = 0x8000_0000;

// ========================================
// Packed form
// ========================================

/// The packed, immutable stop ledger of one translated method.
#[derive(Debug)]
pub struct Stops {
    /// Code positions, grouped direct calls / indirect calls / safepoints,
    /// each group in ascending bytecode order.
    pub positions: Box<[u32]>,
    /// Bytecode position of each stop, parallel to `positions`.
    pub bcis: Box<[u32]>,
    /// One callee per direct call.
    pub direct_callees: Box<[DirectCallee]>,
    /// Bitmap over direct-call indices: set = call into the runtime.
    pub runtime_call_map: Box<[u8]>,
    popped_flags: Box<[bool]>,
    pub indirect_count: usize,
    pub safepoint_count: usize,
    pub frame_map_bytes: usize,
    pub register_map_bytes: usize,
    /// All frame maps, then one register map per safepoint.
    reference_maps: Box<[u8]>,
    bci_table: Box<[u32]>,
}

impl Stops {
    pub fn stop_count(&self) -> usize {
        self.positions.len()
    }

    pub fn direct_call_count(&self) -> usize {
        self.direct_callees.len()
    }

    pub fn is_runtime_call(&self, direct_index: usize) -> bool {
        map_bit(&self.runtime_call_map, direct_index)
    }

    /// Did the stop's bytecode already pop its outgoing arguments when the
    /// stop is reached? (See the reference-map editor.)
    pub fn parameters_popped(&self, stop: usize) -> bool {
        self.popped_flags[stop]
    }

    pub fn is_safepoint(&self, stop: usize) -> bool {
        stop >= self.direct_call_count() + self.indirect_count
    }

    pub fn frame_map(&self, stop: usize) -> &[u8] {
        let w = self.frame_map_bytes;
        &self.reference_maps[stop * w..(stop + 1) * w]
    }

    pub(crate) fn frame_map_mut(&mut self, stop: usize) -> &mut [u8] {
        let w = self.frame_map_bytes;
        &mut self.reference_maps[stop * w..(stop + 1) * w]
    }

    pub fn register_map(&self, safepoint_index: usize) -> &[u8] {
        let base = self.stop_count() * self.frame_map_bytes
            + safepoint_index * self.register_map_bytes;
        &self.reference_maps[base..base + self.register_map_bytes]
    }

    pub fn reference_map_bytes(&self) -> &[u8] {
        &self.reference_maps
    }

    /// Packed indices of every stop recorded for the given bytecode
    /// position (one bytecode's template may contain several stops).
    pub fn stops_at(&self, bci: usize) -> impl Iterator<Item = usize> + '_ {
        let bci = bci as u32;
        let mut i = 0;
        while i < self.bci_table.len() {
            if self.bci_table[i] == BCI_MARK | bci {
                break;
            }
            i += 1;
        }
        let start = i + 1;
        self.bci_table[start.min(self.bci_table.len())..]
            .iter()
            .take_while(|&&entry| entry & BCI_MARK == 0)
            .map(|&entry| entry as usize)
    }

    /// Bytecode positions that have at least one stop, ascending.
    pub fn bcis_with_stops(&self) -> impl Iterator<Item = usize> + '_ {
        self.bci_table
            .iter()
            .filter(|&&entry| entry & BCI_MARK != 0)
            .map(|&entry| (entry & !BCI_MARK) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime_callee(name: &str) -> DirectCallee {
        DirectCallee::Runtime(Symbol::intern(name))
    }

    #[test]
    fn test_bitset_ops() {
        let mut bits = RefBitset::new();
        bits.set(0);
        bits.set(9);
        assert!(bits.is_set(0));
        assert!(bits.is_set(9));
        assert!(!bits.is_set(1));
        assert_eq!(bits.iter_set_indices().collect::<Vec<_>>(), vec![0, 9]);
    }

    #[test]
    fn test_map_bit_helpers() {
        let mut map = [0u8; 2];
        set_map_bit(&mut map, 0);
        set_map_bit(&mut map, 11);
        assert!(map_bit(&map, 0));
        assert!(map_bit(&map, 11));
        assert!(!map_bit(&map, 5));
        assert_eq!(map, [0x01, 0x08]);
    }

    #[test]
    #[should_panic(expected = "added after")]
    fn test_decreasing_bci_panics() {
        let mut builder = StopsBuilder::new(16);
        builder.add(Stop::BackwardBranchSafepoint { pos: 10, bci: 8 });
        builder.add(Stop::BackwardBranchSafepoint { pos: 20, bci: 4 });
    }

    #[test]
    fn test_equal_bci_allowed() {
        let mut builder = StopsBuilder::new(16);
        builder.add(Stop::TemplateIndirectCall {
            pos: 4,
            bci: 3,
            temp_refs: RefBitset::new(),
        });
        builder.add(Stop::TemplateIndirectCall {
            pos: 9,
            bci: 3,
            temp_refs: RefBitset::new(),
        });
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_pack_groups_by_kind() {
        let mut builder = StopsBuilder::new(16);
        builder.add(Stop::TemplateSafepoint {
            pos: 5,
            bci: 0,
            temp_refs: RefBitset::new(),
            reg_refs: RefBitset::new(),
        });
        builder.add(Stop::TemplateDirectCall {
            pos: 12,
            bci: 1,
            callee: runtime_callee("stub_checkcast"),
            is_runtime_call: true,
            temp_refs: RefBitset::new(),
        });
        builder.add(Stop::TemplateIndirectCall {
            pos: 20,
            bci: 2,
            temp_refs: RefBitset::new(),
        });
        let stops = builder.pack(2, 2, 8);
        // direct call first, then indirect, then safepoint
        assert_eq!(&*stops.positions, &[12, 20, 5]);
        assert_eq!(stops.direct_call_count(), 1);
        assert_eq!(stops.indirect_count, 1);
        assert_eq!(stops.safepoint_count, 1);
        assert!(stops.is_runtime_call(0));
        assert!(stops.is_safepoint(2));
    }

    #[test]
    fn test_pack_reference_map_sizing() {
        let mut builder = StopsBuilder::new(8);
        builder.add(Stop::BackwardBranchSafepoint { pos: 3, bci: 0 });
        builder.add(Stop::BytecodeDirectCall {
            pos: 9,
            bci: 2,
            callee: test_method(),
        });
        let stops = builder.pack(3, 2, 10);
        // 2 stops * 3 bytes frame maps + 1 safepoint * 2 bytes register map
        assert_eq!(stops.reference_map_bytes().len(), 2 * 3 + 2);
        // bytecode-level stops mark no bits anywhere
        assert!(stops.reference_map_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_template_bits_land_in_temp_area() {
        let mut builder = StopsBuilder::new(8);
        let mut temp_refs = RefBitset::new();
        temp_refs.set(0);
        temp_refs.set(2);
        builder.add(Stop::TemplateIndirectCall {
            pos: 7,
            bci: 0,
            temp_refs,
        });
        let stops = builder.pack(3, 2, 9);
        let map = stops.frame_map(0);
        assert!(map_bit(map, 9));
        assert!(map_bit(map, 11));
        assert!(!map_bit(map, 10));
        assert!(!map_bit(map, 0));
    }

    #[test]
    fn test_bci_stop_index() {
        let mut builder = StopsBuilder::new(8);
        builder.add(Stop::TemplateDirectCall {
            pos: 4,
            bci: 1,
            callee: runtime_callee("stub_new"),
            is_runtime_call: true,
            temp_refs: RefBitset::new(),
        });
        builder.add(Stop::TemplateSafepoint {
            pos: 8,
            bci: 1,
            temp_refs: RefBitset::new(),
            reg_refs: RefBitset::new(),
        });
        builder.add(Stop::BackwardBranchSafepoint { pos: 30, bci: 6 });
        let stops = builder.pack(1, 2, 4);
        let at1: Vec<usize> = stops.stops_at(1).collect();
        // direct call packed at 0, safepoints at 1 and 2 (bci order)
        assert_eq!(at1, vec![0, 1]);
        let at6: Vec<usize> = stops.stops_at(6).collect();
        assert_eq!(at6, vec![2]);
        assert!(stops.stops_at(3).next().is_none());
        assert_eq!(stops.bcis_with_stops().collect::<Vec<_>>(), vec![1, 6]);
    }

    fn test_method() -> Arc<MethodInfo> {
        use crate::bytecode::pool::{ClassInfo, Signature};
        use crate::bytecode::Kind;
        Arc::new(MethodInfo {
            name: Symbol::intern("test/C.callee"),
            holder: ClassInfo::new_initialized("test/C"),
            signature: Signature::new(vec![], Kind::Void),
            is_static: true,
            is_final: false,
            is_private: false,
            dispatch_index: 0,
        })
    }
}
