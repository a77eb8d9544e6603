//! Executable memory and code-bundle layout.
//!
//! The native code-layout collaborator: allocates one contiguous region
//! sized from the reference-literal count, the scalar-literal bytes, and
//! the code length, copies the assembled pieces in, and flips the region
//! executable. Literals are placed immediately before the code, matching
//! the negative instruction-pointer-relative offsets the translator
//! patched into literal-loading instructions.

use std::ptr::NonNull;

use crate::bytecode::pool::ObjRef;
use crate::jit::frame::SLOT_BYTES;

/// Error type for memory operations.
#[derive(Debug)]
pub enum MemoryError {
    AllocationFailed,
    ProtectionFailed,
    InvalidSize,
}

impl std::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "memory allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "memory protection change failed"),
            MemoryError::InvalidSize => write!(f, "invalid memory size"),
        }
    }
}

impl std::error::Error for MemoryError {}

/// A block of memory allocated via mmap, initially writable. Call
/// `make_executable()` before running anything from it.
pub struct ExecutableMemory {
    ptr: NonNull<u8>,
    size: usize,
    executable: bool,
}

impl ExecutableMemory {
    /// Allocate a new block of memory with the given size, rounded up to
    /// the page size.
    pub fn new(size: usize) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::InvalidSize);
        }
        let page_size = Self::page_size();
        let aligned_size = (size + page_size - 1) & !(page_size - 1);
        let ptr = Self::mmap_alloc(aligned_size)?;
        Ok(Self {
            ptr,
            size: aligned_size,
            executable: false,
        })
    }

    fn page_size() -> usize {
        #[cfg(unix)]
        {
            unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
        }
        #[cfg(not(unix))]
        {
            4096
        }
    }

    #[cfg(unix)]
    fn mmap_alloc(size: usize) -> Result<NonNull<u8>, MemoryError> {
        use std::ptr;

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed);
        }
        NonNull::new(ptr as *mut u8).ok_or(MemoryError::AllocationFailed)
    }

    #[cfg(not(unix))]
    fn mmap_alloc(size: usize) -> Result<NonNull<u8>, MemoryError> {
        // Fallback for non-Unix systems: plain allocation, which may not
        // actually be executable.
        let layout = std::alloc::Layout::from_size_align(size, Self::page_size())
            .map_err(|_| MemoryError::InvalidSize)?;
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(MemoryError::AllocationFailed)
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Write bytes at `offset`. Fails once the region is executable.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        if self.executable {
            return Err(MemoryError::ProtectionFailed);
        }
        if offset + data.len() > self.size {
            return Err(MemoryError::InvalidSize);
        }
        unsafe {
            let dest = self.ptr.as_ptr().add(offset);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dest, data.len());
        }
        Ok(())
    }

    /// Make the memory executable (and read-only).
    #[cfg(unix)]
    pub fn make_executable(&mut self) -> Result<(), MemoryError> {
        if self.executable {
            return Ok(());
        }
        let result = unsafe {
            libc::mprotect(
                self.ptr.as_ptr() as *mut libc::c_void,
                self.size,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if result != 0 {
            return Err(MemoryError::ProtectionFailed);
        }
        self.executable = true;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn make_executable(&mut self) -> Result<(), MemoryError> {
        self.executable = true;
        Ok(())
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }
}

impl Drop for ExecutableMemory {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
            }
        }
        #[cfg(not(unix))]
        {
            let layout = std::alloc::Layout::from_size_align(self.size, Self::page_size())
                .expect("invalid layout");
            unsafe {
                std::alloc::dealloc(self.ptr.as_ptr(), layout);
            }
        }
    }
}

unsafe impl Send for ExecutableMemory {}
unsafe impl Sync for ExecutableMemory {}

/// One allocated code bundle: `[reference literals][scalar literals][code]`,
/// with the code entry directly after the literal areas.
pub struct CodeBundle {
    memory: ExecutableMemory,
    code_offset: usize,
    code_len: usize,
    /// Keeps the literal objects alive as long as their addresses are
    /// embedded in the bundle.
    literals: Box<[ObjRef]>,
}

impl CodeBundle {
    /// Lay out and copy a translated method's pieces. The literal words
    /// hold the stable addresses of the literal objects, in the layout
    /// order produced by the translator (last element adjacent to the
    /// code).
    pub fn allocate(
        literals: &[ObjRef],
        scalar_literals: &[u8],
        code: &[u8],
    ) -> Result<CodeBundle, MemoryError> {
        let literal_bytes = literals.len() * SLOT_BYTES;
        let code_offset = literal_bytes + scalar_literals.len();
        let total = code_offset + code.len();
        let mut memory = ExecutableMemory::new(total.max(1))?;
        for (i, literal) in literals.iter().enumerate() {
            let word = (literal.raw_address() as u64).to_le_bytes();
            memory.write(i * SLOT_BYTES, &word)?;
        }
        memory.write(literal_bytes, scalar_literals)?;
        memory.write(code_offset, code)?;
        memory.make_executable()?;
        Ok(CodeBundle {
            memory,
            code_offset,
            code_len: code.len(),
            literals: literals.to_vec().into_boxed_slice(),
        })
    }

    /// Address of the first code byte.
    pub fn code_start(&self) -> *const u8 {
        unsafe { self.memory.as_ptr().add(self.code_offset) }
    }

    pub fn code_len(&self) -> usize {
        self.code_len
    }

    pub fn literal_count(&self) -> usize {
        self.literals.len()
    }

    pub fn memory(&self) -> &ExecutableMemory {
        &self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_memory() {
        let mem = ExecutableMemory::new(4096).unwrap();
        assert!(mem.size() >= 4096);
        assert!(!mem.is_executable());
    }

    #[test]
    fn test_write_then_seal() {
        let mut mem = ExecutableMemory::new(4096).unwrap();
        mem.write(0, &[0x90, 0x90]).unwrap();
        mem.make_executable().unwrap();
        assert!(mem.is_executable());
        assert!(mem.write(0, &[0x90]).is_err());
    }

    #[test]
    fn test_bundle_layout() {
        use crate::bytecode::pool::ObjRef;
        let lit = ObjRef::string("pinned".into());
        let code = [0xc3u8];
        let bundle = CodeBundle::allocate(&[lit.clone()], &[], &code).unwrap();
        assert_eq!(bundle.code_len(), 1);
        assert_eq!(bundle.literal_count(), 1);
        // The literal word directly before the code holds the object's
        // address.
        let word = unsafe {
            let ptr = bundle.code_start().sub(SLOT_BYTES) as *const u64;
            ptr.read_unaligned()
        };
        assert_eq!(word, lit.raw_address() as u64);
    }
}
