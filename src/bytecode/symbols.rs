//! Process-wide symbol interning.
//!
//! Names and type descriptors are interned into a single shared table so
//! that equal strings resolve to one canonical, reference-comparable
//! symbol. Translators running on different threads hit this table
//! concurrently; a coarse mutex keeps lookups/insertions linearizable, and
//! duplicate-insert races always converge on the first published entry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

/// An interned string. Clones share the same allocation; two symbols with
/// equal text are pointer-equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Symbol(Arc<str>);

static TABLE: LazyLock<Mutex<HashMap<Box<str>, Symbol>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

impl Symbol {
    /// Interns `text`, returning the canonical symbol for it.
    pub fn intern(text: &str) -> Symbol {
        let mut table = TABLE.lock().unwrap();
        if let Some(sym) = table.get(text) {
            return sym.clone();
        }
        let sym = Symbol(Arc::from(text));
        table.insert(Box::from(text), sym.clone());
        sym
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if both symbols are the same canonical entry.
    pub fn same(a: &Symbol, b: &Symbol) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

/// Number of distinct symbols currently interned.
pub fn interned_count() -> usize {
    TABLE.lock().unwrap().len()
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", &*self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_canonical() {
        let a = Symbol::intern("com/example/Widget.count");
        let b = Symbol::intern("com/example/Widget.count");
        assert!(Symbol::same(&a, &b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_symbols_differ() {
        let a = Symbol::intern("alpha#1");
        let b = Symbol::intern("beta#1");
        assert!(!Symbol::same(&a, &b));
        assert_ne!(a, b);
    }

    // The exact entry-count property lives in tests/interning.rs where no
    // unrelated test threads intern symbols concurrently.
    #[test]
    fn test_concurrent_interning_is_canonical() {
        let text = "race/target/Entry.unique";
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(move || Symbol::intern(text)))
            .collect();
        let symbols: Vec<Symbol> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for pair in symbols.windows(2) {
            assert!(Symbol::same(&pair[0], &pair[1]));
        }
    }
}
