use std::collections::HashMap;

use crate::error::IotaResult;
use crate::heap::Heap;
use crate::value::{ObjId, Value};

/// Interning table. Each unique name maps to exactly one heap slot, so
/// `(eq? 'foo 'foo)` is true because both resolve to the same object.
///
/// The table only grows. Every slot it names is a GC root.
#[derive(Default)]
pub struct SymbolTable {
    name_to_id: HashMap<String, ObjId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            name_to_id: HashMap::new(),
        }
    }

    /// Look up an interned name without creating it.
    pub fn lookup(&self, name: &str) -> Option<ObjId> {
        self.name_to_id.get(name).copied()
    }

    pub(crate) fn insert(&mut self, name: &str, id: ObjId) {
        let previous = self.name_to_id.insert(name.to_string(), id);
        debug_assert!(previous.is_none(), "duplicate interned name {name:?}");
    }

    /// Every interned slot, for root marking.
    pub fn ids(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.name_to_id.values().copied()
    }

    /// Total number of interned names.
    pub fn count(&self) -> usize {
        self.name_to_id.len()
    }
}

/// Symbols and keywords the evaluator and reader dispatch on, interned once
/// at startup.
#[derive(Clone, Copy, Debug)]
pub struct WellKnown {
    pub t: Value,
    pub quote: Value,
    pub backquote: Value,
    pub comma: Value,
    pub comma_at: Value,
    pub pipe: Value,
    pub define: Value,
    pub set: Value,
    pub if_: Value,
    pub cond: Value,
    pub else_: Value,
    pub lambda: Value,
    pub let_: Value,
    pub begin: Value,
    pub macro_: Value,
    /// The rest-parameter marker `:rest`.
    pub rest: Value,
    pub input: Value,
    pub output: Value,
}

impl WellKnown {
    pub fn intern(heap: &mut Heap) -> IotaResult<Self> {
        Ok(WellKnown {
            t: heap.intern_symbol("t")?,
            quote: heap.intern_symbol("quote")?,
            backquote: heap.intern_symbol("backquote")?,
            comma: heap.intern_symbol("comma")?,
            comma_at: heap.intern_symbol("comma-at")?,
            pipe: heap.intern_symbol("pipe")?,
            define: heap.intern_symbol("define")?,
            set: heap.intern_symbol("set!")?,
            if_: heap.intern_symbol("if")?,
            cond: heap.intern_symbol("cond")?,
            else_: heap.intern_symbol("else")?,
            lambda: heap.intern_symbol("lambda")?,
            let_: heap.intern_symbol("let")?,
            begin: heap.intern_symbol("begin")?,
            macro_: heap.intern_symbol("macro")?,
            rest: heap.intern_keyword(":rest")?,
            input: heap.intern_keyword(":input")?,
            output: heap.intern_keyword(":output")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_the_same_object() {
        let mut heap = Heap::new(64);
        let a = heap.intern_symbol("foo").unwrap();
        let b = heap.intern_symbol("foo").unwrap();
        assert_eq!(a, b);
        assert_eq!(heap.symbols.count(), 1);
    }

    #[test]
    fn keywords_live_in_their_own_namespace() {
        let mut heap = Heap::new(64);
        let sym = heap.intern_symbol(":rest").unwrap();
        let kw = heap.intern_keyword(":rest").unwrap();
        assert_ne!(sym, kw);
        assert!(sym.is_symbol());
        assert!(kw.is_keyword());
        assert_eq!(heap.intern_keyword(":rest").unwrap(), kw);
    }

    #[test]
    fn well_known_names_are_distinct() {
        let mut heap = Heap::new(64);
        let wk = WellKnown::intern(&mut heap).unwrap();
        assert_ne!(wk.quote, wk.backquote);
        assert_eq!(heap.intern_symbol("set!").unwrap(), wk.set);
        assert_eq!(heap.symbol_name(wk.rest), Some(":rest"));
    }
}
