//! Constant pool model and symbolic resolution.
//!
//! The pool is the method's symbol table: numeric constants, strings, and
//! symbolic references to classes, fields, and methods. Symbolic entries
//! resolve lazily; the translator only ever asks two things of them:
//! whether they are resolvable without class loading, and (if so) for the
//! resolved target. Resolution results are published into a write-once cell
//! per entry, so concurrent translators racing on the same entry converge
//! on one canonical value.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use super::symbols::Symbol;
use super::Kind;

// ========================================
// Linkage errors
// ========================================

/// Failure family raised by symbolic resolution. The translator never lets
/// these escape: a linkage error during speculative resolution selects the
/// resolution-guard code path, and the error resurfaces naturally when that
/// guard executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkageErrorKind {
    /// The referenced class has not been loaded and loading was not allowed.
    Unresolved,
    NoSuchClass,
    NoSuchField,
    NoSuchMethod,
    IncompatibleClassChange,
}

#[derive(Debug, Clone)]
pub struct LinkageError {
    pub kind: LinkageErrorKind,
    pub what: Symbol,
}

impl LinkageError {
    pub fn new(kind: LinkageErrorKind, what: Symbol) -> Self {
        LinkageError { kind, what }
    }
}

impl fmt::Display for LinkageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = &self.what;
        match self.kind {
            LinkageErrorKind::Unresolved => write!(f, "unresolved symbol: {}", what),
            LinkageErrorKind::NoSuchClass => write!(f, "no such class: {}", what),
            LinkageErrorKind::NoSuchField => write!(f, "no such field: {}", what),
            LinkageErrorKind::NoSuchMethod => write!(f, "no such method: {}", what),
            LinkageErrorKind::IncompatibleClassChange => {
                write!(f, "incompatible class change: {}", what)
            }
        }
    }
}

impl std::error::Error for LinkageError {}

// ========================================
// Resolved runtime structures
// ========================================

/// A loaded class as the translator sees it: just enough identity and state
/// to specialize templates (initialization state, array construction).
pub struct ClassInfo {
    pub name: Symbol,
    initialized: AtomicBool,
    /// For array classes, the component class.
    pub component: Option<Arc<ClassInfo>>,
    /// Lazily created canonical array class with this class as component.
    array_class: OnceLock<Arc<ClassInfo>>,
}

impl ClassInfo {
    pub fn new(name: &str) -> Arc<ClassInfo> {
        Arc::new(ClassInfo {
            name: Symbol::intern(name),
            initialized: AtomicBool::new(false),
            component: None,
            array_class: OnceLock::new(),
        })
    }

    pub fn new_initialized(name: &str) -> Arc<ClassInfo> {
        let class = Self::new(name);
        class.initialized.store(true, Ordering::Release);
        class
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn set_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub fn is_array(&self) -> bool {
        self.component.is_some()
    }

    pub fn dimensions(&self) -> usize {
        let mut n = 0;
        let mut class = self;
        while let Some(component) = &class.component {
            n += 1;
            class = component;
        }
        n
    }

    /// The canonical array class whose component is `this`. Racing callers
    /// all observe the first published instance.
    pub fn array_class(self: &Arc<ClassInfo>) -> Arc<ClassInfo> {
        self.array_class
            .get_or_init(|| {
                Arc::new(ClassInfo {
                    name: Symbol::intern(&format!("[{}", self.name)),
                    initialized: AtomicBool::new(true),
                    component: Some(self.clone()),
                    array_class: OnceLock::new(),
                })
            })
            .clone()
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// A resolved field: holder, kind, and the byte offset of its storage (in
/// the object for instance fields, in the holder's static tuple for static
/// fields).
#[derive(Debug)]
pub struct FieldInfo {
    pub name: Symbol,
    pub holder: Arc<ClassInfo>,
    pub kind: Kind,
    pub offset: i32,
    pub is_static: bool,
}

/// A method signature: parameter kinds (receiver excluded) and result kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Kind>,
    pub result: Kind,
}

impl Signature {
    pub fn new(params: Vec<Kind>, result: Kind) -> Signature {
        Signature { params, result }
    }

    /// Number of operand-stack slots occupied by the declared parameters.
    pub fn arg_slots(&self) -> usize {
        self.params.iter().map(|k| k.stack_slots()).sum()
    }

    /// Stack index of the receiver for an instance call: the receiver sits
    /// below all declared arguments.
    pub fn receiver_stack_index(&self) -> usize {
        self.arg_slots()
    }
}

/// A resolved method: identity plus the dispatch metadata the translator
/// specializes on.
#[derive(Debug)]
pub struct MethodInfo {
    pub name: Symbol,
    pub holder: Arc<ClassInfo>,
    pub signature: Signature,
    pub is_static: bool,
    pub is_final: bool,
    pub is_private: bool,
    /// Virtual-dispatch table index; interface methods use their interface
    /// table index here instead.
    pub dispatch_index: u32,
}

// ========================================
// Heap references and resolution guards
// ========================================

/// The operation a resolution guard performs when it fires at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOp {
    Class,
    ArrayClass,
    ClassForNew,
    ReadInstanceField,
    WriteInstanceField,
    ReadStaticField,
    WriteStaticField,
    StaticMethod,
    SpecialMethod,
    VirtualMethod,
    InterfaceMethod,
}

/// An opaque token correlating a constant-pool index with a resolution
/// operation. Embedded as a reference literal in generated code; the
/// runtime resolver interprets it on first execution of the guarded site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionGuard {
    pub pool_index: u16,
    pub op: ResolveOp,
}

/// Per-method call-site profile storage, referenced from instrumented
/// templates as a literal. Counter layout is owned by the runtime; the
/// translator only reserves slots.
#[derive(Debug)]
pub struct MethodProfile {
    pub method: Symbol,
    pub entry_count: AtomicU32,
    slots: Mutex<Vec<(u16, usize)>>,
}

impl MethodProfile {
    pub fn new(method: Symbol) -> Arc<MethodProfile> {
        Arc::new(MethodProfile {
            method,
            entry_count: AtomicU32::new(0),
            slots: Mutex::new(Vec::new()),
        })
    }

    /// Reserves `entries` receiver-profile slots for the call site at
    /// `pool_index`, returning the slot index to patch into the template.
    pub fn add_call_site(&self, pool_index: u16, entries: usize) -> usize {
        let mut slots = self.slots.lock().unwrap();
        let index = slots.iter().map(|(_, n)| n).sum();
        slots.push((pool_index, entries));
        index
    }
}

/// A heap object reference embedded in generated code's literal area.
#[derive(Clone)]
pub struct ObjRef(Arc<HeapValue>);

pub enum HeapValue {
    Class(Arc<ClassInfo>),
    /// The storage object holding a class's static fields.
    StaticTuple(Arc<ClassInfo>),
    Method(Arc<MethodInfo>),
    Str(Arc<str>),
    Guard(ResolutionGuard),
    /// Scratch dimensions array for multianewarray.
    IntArray(Box<[i32]>),
    /// Array element kind tag for newarray.
    KindTag(Kind),
    Profile(Arc<MethodProfile>),
}

impl ObjRef {
    pub fn class(class: Arc<ClassInfo>) -> ObjRef {
        ObjRef(Arc::new(HeapValue::Class(class)))
    }

    pub fn static_tuple(class: Arc<ClassInfo>) -> ObjRef {
        ObjRef(Arc::new(HeapValue::StaticTuple(class)))
    }

    pub fn method(method: Arc<MethodInfo>) -> ObjRef {
        ObjRef(Arc::new(HeapValue::Method(method)))
    }

    pub fn string(text: Arc<str>) -> ObjRef {
        ObjRef(Arc::new(HeapValue::Str(text)))
    }

    pub fn guard(guard: ResolutionGuard) -> ObjRef {
        ObjRef(Arc::new(HeapValue::Guard(guard)))
    }

    pub fn int_array(values: Box<[i32]>) -> ObjRef {
        ObjRef(Arc::new(HeapValue::IntArray(values)))
    }

    pub fn kind_tag(kind: Kind) -> ObjRef {
        ObjRef(Arc::new(HeapValue::KindTag(kind)))
    }

    pub fn profile(profile: Arc<MethodProfile>) -> ObjRef {
        ObjRef(Arc::new(HeapValue::Profile(profile)))
    }

    pub fn value(&self) -> &HeapValue {
        &self.0
    }

    pub fn ptr_eq(a: &ObjRef, b: &ObjRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Stable address of the referenced object, used when laying literals
    /// out into a code bundle.
    pub fn raw_address(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            HeapValue::Class(c) => write!(f, "class {}", c.name),
            HeapValue::StaticTuple(c) => write!(f, "statics of {}", c.name),
            HeapValue::Method(m) => write!(f, "method {}", m.name),
            HeapValue::Str(s) => write!(f, "string {:?}", s),
            HeapValue::Guard(g) => write!(f, "guard #{} {:?}", g.pool_index, g.op),
            HeapValue::IntArray(a) => write!(f, "int[{}]", a.len()),
            HeapValue::KindTag(k) => write!(f, "kind {:?}", k),
            HeapValue::Profile(p) => write!(f, "profile of {}", p.method),
        }
    }
}

// ========================================
// Link cells
// ========================================

/// How a symbolic entry behaves when asked to resolve. The seed is fixed at
/// pool construction: either the target is already loaded, or resolving
/// requires class loading (which the translator never performs), or
/// resolution is known to fail with a linkage error.
pub enum LinkSeed<T> {
    Loaded(T),
    Unloaded,
    Broken(LinkageErrorKind),
}

/// Resolve-then-publish cell. `resolve` publishes into a write-once cell;
/// concurrent resolvers may duplicate work but all observe the first
/// published value.
pub struct LinkCell<T: Clone> {
    seed: LinkSeed<T>,
    cell: OnceLock<T>,
}

impl<T: Clone> LinkCell<T> {
    pub fn new(seed: LinkSeed<T>) -> LinkCell<T> {
        LinkCell {
            seed,
            cell: OnceLock::new(),
        }
    }

    pub fn is_resolvable_without_loading(&self) -> bool {
        self.cell.get().is_some() || matches!(self.seed, LinkSeed::Loaded(_))
    }

    pub fn resolve(&self, what: &Symbol) -> Result<T, LinkageError> {
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }
        match &self.seed {
            LinkSeed::Loaded(value) => Ok(self.cell.get_or_init(|| value.clone()).clone()),
            LinkSeed::Unloaded => Err(LinkageError::new(LinkageErrorKind::Unresolved, what.clone())),
            LinkSeed::Broken(kind) => Err(LinkageError::new(kind.clone(), what.clone())),
        }
    }
}

// ========================================
// Pool entries
// ========================================

pub struct ClassRefEntry {
    pub name: Symbol,
    pub link: LinkCell<Arc<ClassInfo>>,
}

impl<T: Clone> fmt::Debug for LinkCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkCell")
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct FieldRefEntry {
    pub name: Symbol,
    pub kind: Kind,
    pub link: LinkCell<Arc<FieldInfo>>,
}

pub struct MethodRefEntry {
    pub name: Symbol,
    pub signature: Signature,
    pub link: LinkCell<Arc<MethodInfo>>,
}

impl ClassRefEntry {
    pub fn resolved(class: Arc<ClassInfo>) -> PoolEntry {
        PoolEntry::ClassRef(ClassRefEntry {
            name: class.name.clone(),
            link: LinkCell::new(LinkSeed::Loaded(class)),
        })
    }

    pub fn unresolved(name: &str) -> PoolEntry {
        PoolEntry::ClassRef(ClassRefEntry {
            name: Symbol::intern(name),
            link: LinkCell::new(LinkSeed::Unloaded),
        })
    }
}

impl FieldRefEntry {
    pub fn resolved(field: Arc<FieldInfo>) -> PoolEntry {
        PoolEntry::FieldRef(FieldRefEntry {
            name: field.name.clone(),
            kind: field.kind,
            link: LinkCell::new(LinkSeed::Loaded(field)),
        })
    }

    pub fn unresolved(name: &str, kind: Kind) -> PoolEntry {
        PoolEntry::FieldRef(FieldRefEntry {
            name: Symbol::intern(name),
            kind,
            link: LinkCell::new(LinkSeed::Unloaded),
        })
    }

    pub fn broken(name: &str, kind: Kind, error: LinkageErrorKind) -> PoolEntry {
        PoolEntry::FieldRef(FieldRefEntry {
            name: Symbol::intern(name),
            kind,
            link: LinkCell::new(LinkSeed::Broken(error)),
        })
    }
}

impl MethodRefEntry {
    pub fn resolved(method: Arc<MethodInfo>) -> PoolEntry {
        PoolEntry::MethodRef(MethodRefEntry {
            name: method.name.clone(),
            signature: method.signature.clone(),
            link: LinkCell::new(LinkSeed::Loaded(method)),
        })
    }

    pub fn resolved_interface(method: Arc<MethodInfo>) -> PoolEntry {
        PoolEntry::InterfaceMethodRef(MethodRefEntry {
            name: method.name.clone(),
            signature: method.signature.clone(),
            link: LinkCell::new(LinkSeed::Loaded(method)),
        })
    }

    pub fn unresolved(name: &str, signature: Signature) -> PoolEntry {
        PoolEntry::MethodRef(MethodRefEntry {
            name: Symbol::intern(name),
            signature,
            link: LinkCell::new(LinkSeed::Unloaded),
        })
    }

    pub fn unresolved_interface(name: &str, signature: Signature) -> PoolEntry {
        PoolEntry::InterfaceMethodRef(MethodRefEntry {
            name: Symbol::intern(name),
            signature,
            link: LinkCell::new(LinkSeed::Unloaded),
        })
    }

    pub fn broken(name: &str, signature: Signature, error: LinkageErrorKind) -> PoolEntry {
        PoolEntry::MethodRef(MethodRefEntry {
            name: Symbol::intern(name),
            signature,
            link: LinkCell::new(LinkSeed::Broken(error)),
        })
    }
}

pub enum PoolEntry {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Arc<str>),
    ClassRef(ClassRefEntry),
    FieldRef(FieldRefEntry),
    MethodRef(MethodRefEntry),
    InterfaceMethodRef(MethodRefEntry),
}

impl PoolEntry {
    pub fn tag_name(&self) -> &'static str {
        match self {
            PoolEntry::Integer(_) => "Integer",
            PoolEntry::Long(_) => "Long",
            PoolEntry::Float(_) => "Float",
            PoolEntry::Double(_) => "Double",
            PoolEntry::Str(_) => "String",
            PoolEntry::ClassRef(_) => "ClassRef",
            PoolEntry::FieldRef(_) => "FieldRef",
            PoolEntry::MethodRef(_) => "MethodRef",
            PoolEntry::InterfaceMethodRef(_) => "InterfaceMethodRef",
        }
    }
}

/// Error for a pool access that found an entry of the wrong shape (or an
/// out-of-range index). Indicates malformed input, not a translator bug.
#[derive(Debug, Clone)]
pub struct PoolError {
    pub index: u16,
    pub expected: &'static str,
    pub found: &'static str,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "constant pool entry {} is {} (expected {})",
            self.index, self.found, self.expected
        )
    }
}

impl std::error::Error for PoolError {}

pub struct ConstantPool {
    entries: Vec<PoolEntry>,
}

impl ConstantPool {
    pub fn new(entries: Vec<PoolEntry>) -> Arc<ConstantPool> {
        Arc::new(ConstantPool { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn at(&self, index: u16) -> Result<&PoolEntry, PoolError> {
        self.entries.get(index as usize).ok_or(PoolError {
            index,
            expected: "any entry",
            found: "out of range",
        })
    }

    pub fn class_at(&self, index: u16) -> Result<&ClassRefEntry, PoolError> {
        match self.at(index)? {
            PoolEntry::ClassRef(entry) => Ok(entry),
            other => Err(PoolError {
                index,
                expected: "ClassRef",
                found: other.tag_name(),
            }),
        }
    }

    pub fn field_at(&self, index: u16) -> Result<&FieldRefEntry, PoolError> {
        match self.at(index)? {
            PoolEntry::FieldRef(entry) => Ok(entry),
            other => Err(PoolError {
                index,
                expected: "FieldRef",
                found: other.tag_name(),
            }),
        }
    }

    pub fn method_at(&self, index: u16) -> Result<&MethodRefEntry, PoolError> {
        match self.at(index)? {
            PoolEntry::MethodRef(entry) => Ok(entry),
            other => Err(PoolError {
                index,
                expected: "MethodRef",
                found: other.tag_name(),
            }),
        }
    }

    pub fn interface_method_at(&self, index: u16) -> Result<&MethodRefEntry, PoolError> {
        match self.at(index)? {
            PoolEntry::InterfaceMethodRef(entry) => Ok(entry),
            other => Err(PoolError {
                index,
                expected: "InterfaceMethodRef",
                found: other.tag_name(),
            }),
        }
    }

    pub fn make_resolution_guard(&self, index: u16, op: ResolveOp) -> ObjRef {
        ObjRef::guard(ResolutionGuard {
            pool_index: index,
            op,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, offset: i32, is_static: bool) -> Arc<FieldInfo> {
        Arc::new(FieldInfo {
            name: Symbol::intern(name),
            holder: ClassInfo::new_initialized("test/Holder"),
            kind: Kind::Int,
            offset,
            is_static,
        })
    }

    #[test]
    fn test_link_cell_resolved() {
        let cell = LinkCell::new(LinkSeed::Loaded(field("a", 8, false)));
        assert!(cell.is_resolvable_without_loading());
        let resolved = cell.resolve(&Symbol::intern("a")).unwrap();
        assert_eq!(resolved.offset, 8);
    }

    #[test]
    fn test_link_cell_unloaded() {
        let cell: LinkCell<Arc<FieldInfo>> = LinkCell::new(LinkSeed::Unloaded);
        assert!(!cell.is_resolvable_without_loading());
        let err = cell.resolve(&Symbol::intern("b")).unwrap_err();
        assert_eq!(err.kind, LinkageErrorKind::Unresolved);
    }

    #[test]
    fn test_link_cell_broken() {
        let cell: LinkCell<Arc<FieldInfo>> =
            LinkCell::new(LinkSeed::Broken(LinkageErrorKind::NoSuchField));
        let err = cell.resolve(&Symbol::intern("gone")).unwrap_err();
        assert_eq!(err.kind, LinkageErrorKind::NoSuchField);
    }

    #[test]
    fn test_link_cell_publishes_once() {
        let cell = LinkCell::new(LinkSeed::Loaded(field("c", 16, false)));
        let name = Symbol::intern("c");
        let first = cell.resolve(&name).unwrap();
        let second = cell.resolve(&name).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_array_class_is_canonical() {
        let class = ClassInfo::new_initialized("test/Elem");
        let a = class.array_class();
        let b = class.array_class();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_array());
        assert_eq!(a.dimensions(), 1);
        assert!(Arc::ptr_eq(a.component.as_ref().unwrap(), &class));
    }

    #[test]
    fn test_pool_typed_access() {
        let pool = ConstantPool::new(vec![
            PoolEntry::Integer(42),
            FieldRefEntry::unresolved("test/C.f", Kind::Int),
        ]);
        assert!(pool.field_at(1).is_ok());
        let err = pool.field_at(0).unwrap_err();
        assert_eq!(err.found, "Integer");
        assert!(pool.at(9).is_err());
    }

    #[test]
    fn test_signature_slots() {
        let sig = Signature::new(vec![Kind::Int, Kind::Long, Kind::Reference], Kind::Void);
        assert_eq!(sig.arg_slots(), 4);
        assert_eq!(sig.receiver_stack_index(), 4);
    }
}
