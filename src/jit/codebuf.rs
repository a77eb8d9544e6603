//! Code buffer for assembling translated code.
//!
//! An append-only byte buffer: templates are patched in a scratch copy and
//! then appended whole, so the buffer itself is never mutated on the
//! emission path. The two non-append operations exist for the epilogue
//! fixup pass: `reserve` leaves zero-filled room for a jump table whose
//! entries are only known once every instruction has been emitted, and
//! `patch` overwrites bytes that were emitted (or reserved) earlier.

/// An append-only buffer of generated machine code.
pub struct CodeBuffer {
    code: Vec<u8>,
}

impl CodeBuffer {
    /// Create a new empty code buffer.
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Create a new code buffer with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
        }
    }

    /// Current length of the emitted code. Used as the base position for
    /// every relative patch computed by the translator.
    pub fn current_position(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Append a block of finalized bytes.
    pub fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Append a single byte.
    pub fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Append `n` zero bytes, reserving space to be patched at fixup time.
    pub fn reserve(&mut self, n: usize) {
        self.code.resize(self.code.len() + n, 0);
    }

    /// Overwrite previously emitted bytes at `pos`. Only the epilogue fixup
    /// pass uses this, to fill in forward-branch displacements and jump
    /// tables; the replacement must fit inside what was already emitted.
    pub fn patch(&mut self, pos: usize, bytes: &[u8]) {
        self.code[pos..pos + bytes.len()].copy_from_slice(bytes);
    }

    /// Read back a range of emitted bytes.
    pub fn slice(&self, pos: usize, len: usize) -> &[u8] {
        &self.code[pos..pos + len]
    }

    /// Consume the buffer, yielding the final code bytes.
    pub fn finish(self) -> Box<[u8]> {
        self.code.into_boxed_slice()
    }
}

impl Default for CodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_position() {
        let mut buf = CodeBuffer::new();
        assert_eq!(buf.current_position(), 0);
        buf.emit(&[1, 2, 3]);
        assert_eq!(buf.current_position(), 3);
        buf.emit_u8(4);
        assert_eq!(buf.current_position(), 4);
        assert_eq!(&*buf.finish(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_reserve_zero_fills() {
        let mut buf = CodeBuffer::new();
        buf.emit(&[0xaa]);
        buf.reserve(3);
        assert_eq!(buf.current_position(), 4);
        assert_eq!(buf.slice(1, 3), &[0, 0, 0]);
    }

    #[test]
    fn test_patch_overwrites_in_place() {
        let mut buf = CodeBuffer::new();
        buf.emit(&[0, 0, 0, 0, 0xcc]);
        buf.patch(1, &[9, 8, 7]);
        assert_eq!(&*buf.finish(), &[0, 9, 8, 7, 0xcc]);
    }
}
