//! Template-based JIT translation infrastructure.
//!
//! This module turns a method's bytecode into native code and metadata:
//! - Code buffer for assembling the generated code
//! - Pre-compiled template catalog and instruction modifiers
//! - The single-pass bytecode-to-target translator
//! - Stop/safepoint ledger and reference-map construction
//! - Executable memory for the final code bundle (behind the `jit` feature)

pub mod codebuf;
pub mod frame;
#[cfg(feature = "jit")]
pub mod memory;
pub mod modifier;
pub mod refmap;
pub mod sample;
pub mod stops;
pub mod target;
pub mod template;
pub mod translator;
