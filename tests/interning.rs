//! Symbol interning runs in its own test binary so no unrelated tests
//! intern symbols concurrently while the entry count is being checked.

use stitch::bytecode::symbols::{interned_count, Symbol};

#[test]
fn test_concurrent_interning_adds_exactly_one_entry() {
    // Warm up the table so lazy initialization does not skew the count.
    let _ = Symbol::intern("warmup/Entry");
    let before = interned_count();

    let text = "contended/Target.symbol";
    let handles: Vec<_> = (0..16)
        .map(|_| std::thread::spawn(move || Symbol::intern(text)))
        .collect();
    let symbols: Vec<Symbol> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every thread observes the same canonical instance.
    for symbol in &symbols {
        assert!(Symbol::same(symbol, &symbols[0]));
        assert_eq!(symbol.as_str(), text);
    }
    // And the table grew by exactly one distinct entry.
    assert_eq!(interned_count(), before + 1);
}
