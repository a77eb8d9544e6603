//! Opcode set for the portable bytecode consumed by the translator.
//!
//! The instruction stream is a raw byte array: one opcode byte followed by
//! operand bytes whose width depends on the opcode (and on a preceding WIDE
//! prefix for the indexed local-variable forms). On top of the standard
//! stack-machine instruction set there is a block of intrinsic extension
//! opcodes (word arithmetic, raw pointer access, memory barriers, register
//! access); most of those carry a 16-bit sub-opcode selecting the exact
//! variant.

// ========================================
// Standard instruction set
// ========================================

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ICONST_2: u8 = 0x05;
pub const ICONST_3: u8 = 0x06;
pub const ICONST_4: u8 = 0x07;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0a;
pub const FCONST_0: u8 = 0x0b;
pub const FCONST_1: u8 = 0x0c;
pub const FCONST_2: u8 = 0x0d;
pub const DCONST_0: u8 = 0x0e;
pub const DCONST_1: u8 = 0x0f;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1a;
pub const ILOAD_1: u8 = 0x1b;
pub const ILOAD_2: u8 = 0x1c;
pub const ILOAD_3: u8 = 0x1d;
pub const LLOAD_0: u8 = 0x1e;
pub const LLOAD_1: u8 = 0x1f;
pub const LLOAD_2: u8 = 0x20;
pub const LLOAD_3: u8 = 0x21;
pub const FLOAD_0: u8 = 0x22;
pub const FLOAD_1: u8 = 0x23;
pub const FLOAD_2: u8 = 0x24;
pub const FLOAD_3: u8 = 0x25;
pub const DLOAD_0: u8 = 0x26;
pub const DLOAD_1: u8 = 0x27;
pub const DLOAD_2: u8 = 0x28;
pub const DLOAD_3: u8 = 0x29;
pub const ALOAD_0: u8 = 0x2a;
pub const ALOAD_1: u8 = 0x2b;
pub const ALOAD_2: u8 = 0x2c;
pub const ALOAD_3: u8 = 0x2d;
pub const IALOAD: u8 = 0x2e;
pub const LALOAD: u8 = 0x2f;
pub const FALOAD: u8 = 0x30;
pub const DALOAD: u8 = 0x31;
pub const AALOAD: u8 = 0x32;
pub const BALOAD: u8 = 0x33;
pub const CALOAD: u8 = 0x34;
pub const SALOAD: u8 = 0x35;
pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3a;
pub const ISTORE_0: u8 = 0x3b;
pub const ISTORE_1: u8 = 0x3c;
pub const ISTORE_2: u8 = 0x3d;
pub const ISTORE_3: u8 = 0x3e;
pub const LSTORE_0: u8 = 0x3f;
pub const LSTORE_1: u8 = 0x40;
pub const LSTORE_2: u8 = 0x41;
pub const LSTORE_3: u8 = 0x42;
pub const FSTORE_0: u8 = 0x43;
pub const FSTORE_1: u8 = 0x44;
pub const FSTORE_2: u8 = 0x45;
pub const FSTORE_3: u8 = 0x46;
pub const DSTORE_0: u8 = 0x47;
pub const DSTORE_1: u8 = 0x48;
pub const DSTORE_2: u8 = 0x49;
pub const DSTORE_3: u8 = 0x4a;
pub const ASTORE_0: u8 = 0x4b;
pub const ASTORE_1: u8 = 0x4c;
pub const ASTORE_2: u8 = 0x4d;
pub const ASTORE_3: u8 = 0x4e;
pub const IASTORE: u8 = 0x4f;
pub const LASTORE: u8 = 0x50;
pub const FASTORE: u8 = 0x51;
pub const DASTORE: u8 = 0x52;
pub const AASTORE: u8 = 0x53;
pub const BASTORE: u8 = 0x54;
pub const CASTORE: u8 = 0x55;
pub const SASTORE: u8 = 0x56;
pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5a;
pub const DUP_X2: u8 = 0x5b;
pub const DUP2: u8 = 0x5c;
pub const DUP2_X1: u8 = 0x5d;
pub const DUP2_X2: u8 = 0x5e;
pub const SWAP: u8 = 0x5f;
pub const IADD: u8 = 0x60;
pub const LADD: u8 = 0x61;
pub const FADD: u8 = 0x62;
pub const DADD: u8 = 0x63;
pub const ISUB: u8 = 0x64;
pub const LSUB: u8 = 0x65;
pub const FSUB: u8 = 0x66;
pub const DSUB: u8 = 0x67;
pub const IMUL: u8 = 0x68;
pub const LMUL: u8 = 0x69;
pub const FMUL: u8 = 0x6a;
pub const DMUL: u8 = 0x6b;
pub const IDIV: u8 = 0x6c;
pub const LDIV: u8 = 0x6d;
pub const FDIV: u8 = 0x6e;
pub const DDIV: u8 = 0x6f;
pub const IREM: u8 = 0x70;
pub const LREM: u8 = 0x71;
pub const FREM: u8 = 0x72;
pub const DREM: u8 = 0x73;
pub const INEG: u8 = 0x74;
pub const LNEG: u8 = 0x75;
pub const FNEG: u8 = 0x76;
pub const DNEG: u8 = 0x77;
pub const ISHL: u8 = 0x78;
pub const LSHL: u8 = 0x79;
pub const ISHR: u8 = 0x7a;
pub const LSHR: u8 = 0x7b;
pub const IUSHR: u8 = 0x7c;
pub const LUSHR: u8 = 0x7d;
pub const IAND: u8 = 0x7e;
pub const LAND: u8 = 0x7f;
pub const IOR: u8 = 0x80;
pub const LOR: u8 = 0x81;
pub const IXOR: u8 = 0x82;
pub const LXOR: u8 = 0x83;
pub const IINC: u8 = 0x84;
pub const I2L: u8 = 0x85;
pub const I2F: u8 = 0x86;
pub const I2D: u8 = 0x87;
pub const L2I: u8 = 0x88;
pub const L2F: u8 = 0x89;
pub const L2D: u8 = 0x8a;
pub const F2I: u8 = 0x8b;
pub const F2L: u8 = 0x8c;
pub const F2D: u8 = 0x8d;
pub const D2I: u8 = 0x8e;
pub const D2L: u8 = 0x8f;
pub const D2F: u8 = 0x90;
pub const I2B: u8 = 0x91;
pub const I2C: u8 = 0x92;
pub const I2S: u8 = 0x93;
pub const LCMP: u8 = 0x94;
pub const FCMPL: u8 = 0x95;
pub const FCMPG: u8 = 0x96;
pub const DCMPL: u8 = 0x97;
pub const DCMPG: u8 = 0x98;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IFLT: u8 = 0x9b;
pub const IFGE: u8 = 0x9c;
pub const IFGT: u8 = 0x9d;
pub const IFLE: u8 = 0x9e;
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ICMPNE: u8 = 0xa0;
pub const IF_ICMPLT: u8 = 0xa1;
pub const IF_ICMPGE: u8 = 0xa2;
pub const IF_ICMPGT: u8 = 0xa3;
pub const IF_ICMPLE: u8 = 0xa4;
pub const IF_ACMPEQ: u8 = 0xa5;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const LRETURN: u8 = 0xad;
pub const FRETURN: u8 = 0xae;
pub const DRETURN: u8 = 0xaf;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ARRAYLENGTH: u8 = 0xbe;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const MONITORENTER: u8 = 0xc2;
pub const MONITOREXIT: u8 = 0xc3;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;

// ========================================
// Intrinsic extension opcodes
// ========================================
//
// WLOAD/WSTORE mirror the indexed local-variable forms for word values.
// WCONST_0 through MEMBAR carry a 16-bit sub-opcode operand; for some of
// them the sub-opcode is reserved and ignored.

pub const WLOAD: u8 = 0xcb;
pub const WLOAD_0: u8 = 0xcc;
pub const WLOAD_1: u8 = 0xcd;
pub const WLOAD_2: u8 = 0xce;
pub const WLOAD_3: u8 = 0xcf;
pub const WSTORE: u8 = 0xd0;
pub const WSTORE_0: u8 = 0xd1;
pub const WSTORE_1: u8 = 0xd2;
pub const WSTORE_2: u8 = 0xd3;
pub const WSTORE_3: u8 = 0xd4;
pub const WCONST_0: u8 = 0xd5;
pub const WDIV: u8 = 0xd6;
pub const WDIVI: u8 = 0xd7;
pub const WREM: u8 = 0xd8;
pub const WREMI: u8 = 0xd9;
pub const PREAD: u8 = 0xda;
pub const PWRITE: u8 = 0xdb;
pub const PGET: u8 = 0xdc;
pub const PSET: u8 = 0xdd;
pub const PCMPSWP: u8 = 0xde;
pub const MEMBAR: u8 = 0xdf;
pub const MOV_I2F: u8 = 0xe0;
pub const MOV_F2I: u8 = 0xe1;
pub const MOV_L2D: u8 = 0xe2;
pub const MOV_D2L: u8 = 0xe3;
pub const WRETURN: u8 = 0xe4;
pub const PAUSE: u8 = 0xe5;
pub const LSB: u8 = 0xe6;
pub const MSB: u8 = 0xe7;
pub const READREG: u8 = 0xe8;
pub const WRITEREG: u8 = 0xe9;
pub const UNSAFE_CAST: u8 = 0xea;

/// Sub-opcodes for the pointer access opcodes (PREAD/PWRITE/PGET/PSET/
/// PCMPSWP). The low byte selects the value kind; `INDEXED` marks the
/// scaled-index addressing form (as opposed to the plain byte-offset form).
pub mod pointer_sub {
    pub const BYTE: u16 = 0x01;
    pub const CHAR: u16 = 0x02;
    pub const SHORT: u16 = 0x03;
    pub const INT: u16 = 0x04;
    pub const LONG: u16 = 0x05;
    pub const FLOAT: u16 = 0x06;
    pub const DOUBLE: u16 = 0x07;
    pub const WORD: u16 = 0x08;
    pub const REFERENCE: u16 = 0x09;
    pub const INDEXED: u16 = 0x10;

    pub const KIND_MASK: u16 = 0x0f;
}

/// Sub-opcodes for MEMBAR.
pub mod membar_sub {
    pub const LOAD_LOAD: u16 = 0x01;
    pub const LOAD_STORE: u16 = 0x02;
    pub const STORE_LOAD: u16 = 0x03;
    pub const STORE_STORE: u16 = 0x04;
}

/// Sub-opcodes for READREG/WRITEREG: the role of the named register.
pub mod reg_sub {
    pub const STACK_POINTER: u16 = 0x00;
    pub const FRAME_POINTER: u16 = 0x01;
    pub const SAFEPOINT_LATCH: u16 = 0x02;
    pub const LINK_ADDRESS: u16 = 0x03;
}

/// Returns the total length in bytes (opcode + operands) of the instruction
/// starting at `bci`, or `None` if the opcode is unknown or the stream is
/// truncated. Switch instructions have data-dependent lengths.
pub fn length_of(code: &[u8], bci: usize) -> Option<usize> {
    let opcode = *code.get(bci)?;
    let len = match opcode {
        BIPUSH | LDC | NEWARRAY => 2,
        SIPUSH | LDC_W | LDC2_W | IINC => 3,
        ILOAD | LLOAD | FLOAD | DLOAD | ALOAD | WLOAD => 2,
        ISTORE | LSTORE | FSTORE | DSTORE | ASTORE | WSTORE => 2,
        IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL | GOTO | JSR => 3,
        GOTO_W | JSR_W => 5,
        GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD => 3,
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC => 3,
        INVOKEINTERFACE => 5,
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => 3,
        MULTIANEWARRAY => 4,
        RET => 2,
        WIDE => {
            let widened = *code.get(bci + 1)?;
            match widened {
                IINC => 6,
                ILOAD | LLOAD | FLOAD | DLOAD | ALOAD | WLOAD | ISTORE | LSTORE | FSTORE
                | DSTORE | ASTORE | WSTORE | RET => 4,
                _ => return None,
            }
        }
        TABLESWITCH => {
            // opcode, pad to 4, default, low, high, (high - low + 1) targets
            let base = pad4(bci + 1);
            let low = read_s4(code, base + 4)?;
            let high = read_s4(code, base + 8)?;
            let cases = (high as i64 - low as i64 + 1).max(0) as usize;
            base + 12 + cases * 4 - bci
        }
        LOOKUPSWITCH => {
            // opcode, pad to 4, default, npairs, npairs match/offset pairs
            let base = pad4(bci + 1);
            let npairs = read_s4(code, base + 4)?;
            base + 8 + (npairs.max(0) as usize) * 8 - bci
        }
        WCONST_0 | WDIV | WDIVI | WREM | WREMI | PREAD | PWRITE | PGET | PSET | PCMPSWP
        | MEMBAR | MOV_I2F | MOV_F2I | MOV_L2D | MOV_D2L | PAUSE | LSB | MSB | READREG
        | WRITEREG | UNSAFE_CAST => 3,
        0xba | 0xca | 0xeb..=0xff => return None,
        _ => 1,
    };
    Some(len)
}

pub(crate) fn pad4(pos: usize) -> usize {
    (pos + 3) & !3
}

pub(crate) fn read_s4(code: &[u8], pos: usize) -> Option<i32> {
    let bytes = code.get(pos..pos + 4)?;
    Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_s2(code: &[u8], pos: usize) -> Option<i16> {
    let bytes = code.get(pos..pos + 2)?;
    Some(i16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u2(code: &[u8], pos: usize) -> Option<u16> {
    read_s2(code, pos).map(|v| v as u16)
}

/// True for instructions after which control does not fall through linearly
/// (branches, switches, returns, throw). The instruction following one of
/// these starts a new basic block.
pub fn is_block_end(opcode: u8) -> bool {
    matches!(
        opcode,
        IFEQ..=IF_ACMPNE
            | IFNULL
            | IFNONNULL
            | GOTO
            | GOTO_W
            | TABLESWITCH
            | LOOKUPSWITCH
            | IRETURN
            | LRETURN
            | FRETURN
            | DRETURN
            | ARETURN
            | RETURN
            | WRETURN
            | ATHROW
    )
}

/// Human-readable opcode name, for diagnostics.
pub fn name_of(opcode: u8) -> &'static str {
    match opcode {
        NOP => "nop",
        ACONST_NULL => "aconst_null",
        ICONST_M1..=ICONST_5 => "iconst",
        LCONST_0 | LCONST_1 => "lconst",
        FCONST_0..=FCONST_2 => "fconst",
        DCONST_0 | DCONST_1 => "dconst",
        BIPUSH => "bipush",
        SIPUSH => "sipush",
        LDC => "ldc",
        LDC_W => "ldc_w",
        LDC2_W => "ldc2_w",
        ILOAD..=ALOAD_3 => "load",
        IALOAD..=SALOAD => "arrayload",
        ISTORE..=ASTORE_3 => "store",
        IASTORE..=SASTORE => "arraystore",
        POP => "pop",
        POP2 => "pop2",
        DUP..=DUP2_X2 => "dup",
        SWAP => "swap",
        IADD..=LXOR => "arith",
        IINC => "iinc",
        I2L..=I2S => "convert",
        LCMP..=DCMPG => "cmp",
        IFEQ..=IF_ACMPNE => "if",
        GOTO => "goto",
        JSR => "jsr",
        RET => "ret",
        TABLESWITCH => "tableswitch",
        LOOKUPSWITCH => "lookupswitch",
        IRETURN..=RETURN => "return",
        GETSTATIC => "getstatic",
        PUTSTATIC => "putstatic",
        GETFIELD => "getfield",
        PUTFIELD => "putfield",
        INVOKEVIRTUAL => "invokevirtual",
        INVOKESPECIAL => "invokespecial",
        INVOKESTATIC => "invokestatic",
        INVOKEINTERFACE => "invokeinterface",
        NEW => "new",
        NEWARRAY => "newarray",
        ANEWARRAY => "anewarray",
        ARRAYLENGTH => "arraylength",
        ATHROW => "athrow",
        CHECKCAST => "checkcast",
        INSTANCEOF => "instanceof",
        MONITORENTER => "monitorenter",
        MONITOREXIT => "monitorexit",
        WIDE => "wide",
        MULTIANEWARRAY => "multianewarray",
        IFNULL => "ifnull",
        IFNONNULL => "ifnonnull",
        GOTO_W => "goto_w",
        JSR_W => "jsr_w",
        WLOAD..=WLOAD_3 => "wload",
        WSTORE..=WSTORE_3 => "wstore",
        WCONST_0 => "wconst_0",
        WDIV => "wdiv",
        WDIVI => "wdivi",
        WREM => "wrem",
        WREMI => "wremi",
        PREAD => "pread",
        PWRITE => "pwrite",
        PGET => "pget",
        PSET => "pset",
        PCMPSWP => "pcmpswp",
        MEMBAR => "membar",
        MOV_I2F => "mov_i2f",
        MOV_F2I => "mov_f2i",
        MOV_L2D => "mov_l2d",
        MOV_D2L => "mov_d2l",
        WRETURN => "wreturn",
        PAUSE => "pause",
        LSB => "lsb",
        MSB => "msb",
        READREG => "readreg",
        WRITEREG => "writereg",
        UNSAFE_CAST => "unsafe_cast",
        _ => "unknown",
    }
}

/// Scans a bytecode stream and collects the set of positions that are
/// targets of backward jumps. Used by the hot-path instrumentation pre-pass
/// to decide where to insert counters.
pub fn backward_branch_targets(code: &[u8]) -> std::collections::HashSet<usize> {
    let mut targets = std::collections::HashSet::new();
    let mut bci = 0;
    while bci < code.len() {
        let Some(len) = length_of(code, bci) else {
            break;
        };
        let opcode = code[bci];
        match opcode {
            IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL | GOTO => {
                if let Some(off) = read_s2(code, bci + 1) {
                    let target = bci as i64 + off as i64;
                    if target >= 0 && target <= bci as i64 {
                        targets.insert(target as usize);
                    }
                }
            }
            GOTO_W => {
                if let Some(off) = read_s4(code, bci + 1) {
                    let target = bci as i64 + off as i64;
                    if target >= 0 && target <= bci as i64 {
                        targets.insert(target as usize);
                    }
                }
            }
            TABLESWITCH | LOOKUPSWITCH => {
                // Switch targets are forward in practice; a backward switch
                // target still counts.
                let base = pad4(bci + 1);
                let mut offsets = Vec::new();
                if let Some(default) = read_s4(code, base) {
                    offsets.push(default);
                }
                if opcode == TABLESWITCH {
                    if let (Some(low), Some(high)) = (read_s4(code, base + 4), read_s4(code, base + 8)) {
                        let cases = (high as i64 - low as i64 + 1).max(0) as usize;
                        for i in 0..cases {
                            if let Some(off) = read_s4(code, base + 12 + i * 4) {
                                offsets.push(off);
                            }
                        }
                    }
                } else if let Some(npairs) = read_s4(code, base + 4) {
                    for i in 0..npairs.max(0) as usize {
                        if let Some(off) = read_s4(code, base + 8 + i * 8 + 4) {
                            offsets.push(off);
                        }
                    }
                }
                for off in offsets {
                    let target = bci as i64 + off as i64;
                    if target >= 0 && target <= bci as i64 {
                        targets.insert(target as usize);
                    }
                }
            }
            _ => {}
        }
        bci += len;
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_lengths() {
        assert_eq!(length_of(&[NOP], 0), Some(1));
        assert_eq!(length_of(&[BIPUSH, 7], 0), Some(2));
        assert_eq!(length_of(&[SIPUSH, 0, 7], 0), Some(3));
        assert_eq!(length_of(&[GOTO, 0, 5], 0), Some(3));
        assert_eq!(length_of(&[GOTO_W, 0, 0, 0, 5], 0), Some(5));
        assert_eq!(length_of(&[INVOKEINTERFACE, 0, 1, 2, 0], 0), Some(5));
    }

    #[test]
    fn test_wide_lengths() {
        assert_eq!(length_of(&[WIDE, ILOAD, 0, 9], 0), Some(4));
        assert_eq!(length_of(&[WIDE, IINC, 0, 9, 0, 1], 0), Some(6));
        assert_eq!(length_of(&[WIDE, IADD], 0), None);
    }

    #[test]
    fn test_extension_lengths() {
        assert_eq!(length_of(&[PREAD, 0x00, 0x04], 0), Some(3));
        assert_eq!(length_of(&[MEMBAR, 0x00, 0x03], 0), Some(3));
        assert_eq!(length_of(&[WRETURN], 0), Some(1));
        assert_eq!(length_of(&[WLOAD, 2], 0), Some(2));
    }

    #[test]
    fn test_tableswitch_length() {
        // tableswitch at bci 0: pad = 3 bytes, default(4), low(4), high(4),
        // two targets (low = 0, high = 1).
        let mut code = vec![TABLESWITCH, 0, 0, 0];
        code.extend_from_slice(&10i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&30i32.to_be_bytes());
        assert_eq!(length_of(&code, 0), Some(code.len()));
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(length_of(&[0xba], 0), None);
        assert_eq!(length_of(&[0xfe], 0), None);
    }

    #[test]
    fn test_block_end_classification() {
        assert!(is_block_end(GOTO));
        assert!(is_block_end(ATHROW));
        assert!(is_block_end(TABLESWITCH));
        assert!(is_block_end(RETURN));
        assert!(is_block_end(WRETURN));
        assert!(!is_block_end(IADD));
        assert!(!is_block_end(INVOKESTATIC));
    }

    #[test]
    fn test_backward_target_scan() {
        // 0: iconst_0
        // 1: goto -1 would be weird; use: 1: iload_0, 2: ifne -> 0 (backward)
        let code = vec![ICONST_0, ILOAD_0, IFNE, 0xff, 0xfe, RETURN];
        let targets = backward_branch_targets(&code);
        assert!(targets.contains(&0));
        assert_eq!(targets.len(), 1);
    }
}
