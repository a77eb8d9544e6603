//! Target generator: drives one method's translation end to end and
//! packages the translated unit.

use crate::bytecode::pool::ObjRef;
use crate::bytecode::Method;
use crate::config::TranslatorOptions;

use super::frame::FrameLayout;
use super::refmap::RefMapEditor;
use super::stops::Stops;
use super::template::{TargetAbi, TemplateCatalog};
use super::translator::{TranslateError, Translator};

#[cfg(feature = "jit")]
use super::memory::{CodeBundle, MemoryError};

/// The translated unit: generated code plus everything the runtime needs
/// to execute, unwind, and garbage-collect it.
#[derive(Debug)]
pub struct TranslatedMethod {
    pub code: Box<[u8]>,
    /// Map from bci to code position; the final entry is the sentinel just
    /// past the last instruction's code.
    pub bci_to_code: Box<[u32]>,
    pub block_starts: Box<[bool]>,
    pub block_count: usize,
    pub stops: Stops,
    /// Catch-range starts / catch-block positions, parallel, with a
    /// trailing no-handler sentinel. Empty when the method has no handlers.
    pub catch_range_positions: Box<[u32]>,
    pub catch_block_positions: Box<[u32]>,
    /// Literal objects in layout order, or `None` when the code embeds no
    /// references.
    pub reference_literals: Option<Box<[ObjRef]>>,
    pub frame: FrameLayout,
    pub abi: TargetAbi,
}

impl TranslatedMethod {
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    /// Allocate the final contiguous memory region and copy the assembled
    /// bundle into it.
    #[cfg(feature = "jit")]
    pub fn emit(&self) -> Result<CodeBundle, MemoryError> {
        let empty: &[ObjRef] = &[];
        let literals = self
            .reference_literals
            .as_deref()
            .unwrap_or(empty);
        CodeBundle::allocate(literals, &[], &self.code)
    }
}

/// Drives: prologue, entry instrumentation, the main translation pass,
/// epilogue fixup, exception info, literal and stop packing, and the
/// reference-map edit.
pub struct TargetGenerator<'a> {
    catalog: &'a TemplateCatalog,
    options: TranslatorOptions,
}

impl<'a> TargetGenerator<'a> {
    pub fn new(catalog: &'a TemplateCatalog, options: TranslatorOptions) -> TargetGenerator<'a> {
        TargetGenerator { catalog, options }
    }

    pub fn translate(&self, method: &Method) -> Result<TranslatedMethod, TranslateError> {
        let mut translator = Translator::new(method, self.catalog, &self.options);
        translator.emit_prologue()?;
        translator.emit_entry_instrumentation()?;
        translator.generate()?;
        translator.emit_epilogue()?;
        translator.build_exception_info();

        let frame = translator.frame;
        let reference_literals = translator.pack_reference_literals();
        let block_count = translator.block_count;
        let block_starts = std::mem::take(&mut translator.block_starts).into_boxed_slice();
        let bci_to_code = std::mem::take(&mut translator.bci_to_code).into_boxed_slice();
        let catch_range_positions =
            std::mem::take(&mut translator.catch_range_positions).into_boxed_slice();
        let catch_block_positions =
            std::mem::take(&mut translator.catch_block_positions).into_boxed_slice();

        let (buf, stops_builder) = translator.into_emission();
        let mut stops = stops_builder.pack(
            frame.frame_map_bytes(),
            frame.register_map_bytes(),
            frame.first_template_slot(),
        );
        if stops.stop_count() > 0 {
            RefMapEditor::new(method, &frame, &block_starts).edit(&mut stops)?;
        }

        Ok(TranslatedMethod {
            code: buf.finish(),
            bci_to_code,
            block_starts,
            block_count,
            stops,
            catch_range_positions,
            catch_block_positions,
            reference_literals,
            frame,
            abi: self.catalog.abi(),
        })
    }
}
