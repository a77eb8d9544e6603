//! Stack frame layout for translated methods.
//!
//! A frame holds, from the frame base downward: the local-variable slots,
//! the operand-stack slots, and a fixed area of template temporaries (spill
//! space any template may scribble on mid-instruction). Reference maps
//! cover all three areas with one bit per slot, in that order.

use crate::bytecode::Kind;

/// Bytes per frame slot (one machine word).
pub const SLOT_BYTES: usize = 8;

/// Bytes in a register reference map (one bit per general register).
pub const REGISTER_MAP_BYTES: usize = 2;

/// Slot geometry for one translated method's frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameLayout {
    pub max_locals: usize,
    pub max_stack: usize,
    /// Slots reserved for in-flight template temporaries. Conservative: the
    /// catalog declares the worst case over all templates.
    pub template_slots: usize,
    /// Local slots occupied by the method's parameters.
    pub param_slots: usize,
}

impl FrameLayout {
    pub fn new(
        max_locals: usize,
        max_stack: usize,
        template_slots: usize,
        param_slots: usize,
    ) -> FrameLayout {
        FrameLayout {
            max_locals,
            max_stack,
            template_slots,
            param_slots,
        }
    }

    /// Frame-base-relative byte offset of a local-variable slot. Locals
    /// grow downward from the frame base.
    pub fn local_slot_offset(&self, slot: usize) -> i32 {
        -(((slot + 1) * SLOT_BYTES) as i32)
    }

    /// Byte offset used to address local `index` holding a value of `kind`.
    /// Category-2 values occupy two slots with the value stored in the
    /// second, so stack-relative addressing stays uniform across kinds.
    pub fn local_access_offset(&self, index: usize, kind: Kind) -> i32 {
        let slot = if kind.is_category1() { index } else { index + 1 };
        self.local_slot_offset(slot)
    }

    /// Total slots covered by the frame reference map.
    pub fn ref_map_slots(&self) -> usize {
        self.max_locals + self.max_stack + self.template_slots
    }

    /// Width in bytes of one frame reference map.
    pub fn frame_map_bytes(&self) -> usize {
        self.ref_map_slots().div_ceil(8)
    }

    pub fn register_map_bytes(&self) -> usize {
        REGISTER_MAP_BYTES
    }

    /// Bit index of the first template-temporary slot; a method's own
    /// locals and operand stack sit below this.
    pub fn first_template_slot(&self) -> usize {
        self.max_locals + self.max_stack
    }

    /// Reference-map bit index of local `index`.
    pub fn local_bit(&self, index: usize) -> usize {
        index
    }

    /// Reference-map bit index of operand-stack slot `index`.
    pub fn stack_bit(&self, index: usize) -> usize {
        self.max_locals + index
    }

    /// Total frame size in bytes (locals + stack + template temporaries).
    pub fn frame_bytes(&self) -> usize {
        self.ref_map_slots() * SLOT_BYTES
    }

    /// Bytes of caller-pushed parameters to retract on return.
    pub fn param_bytes(&self) -> usize {
        self.param_slots * SLOT_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_offsets_descend() {
        let frame = FrameLayout::new(4, 3, 2, 1);
        assert_eq!(frame.local_slot_offset(0), -8);
        assert_eq!(frame.local_slot_offset(3), -32);
    }

    #[test]
    fn test_category2_uses_second_slot() {
        let frame = FrameLayout::new(4, 3, 2, 1);
        assert_eq!(frame.local_access_offset(1, Kind::Int), frame.local_slot_offset(1));
        assert_eq!(
            frame.local_access_offset(1, Kind::Long),
            frame.local_slot_offset(2)
        );
        assert_eq!(
            frame.local_access_offset(1, Kind::Double),
            frame.local_slot_offset(2)
        );
    }

    #[test]
    fn test_ref_map_geometry() {
        let frame = FrameLayout::new(5, 4, 3, 2);
        assert_eq!(frame.ref_map_slots(), 12);
        assert_eq!(frame.frame_map_bytes(), 2);
        assert_eq!(frame.first_template_slot(), 9);
        assert_eq!(frame.local_bit(2), 2);
        assert_eq!(frame.stack_bit(0), 5);
    }
}
