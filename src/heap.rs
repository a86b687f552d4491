use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{IotaError, IotaResult};
use crate::primitives::Primitive;
use crate::stream::Stream;
use crate::symbol::SymbolTable;
use crate::value::{ObjId, Value};

/// Parameters, body and defining environment of a procedure or macro.
#[derive(Clone, Copy, Debug)]
pub struct Closure {
    pub params: Value,
    pub body: Value,
    pub env: Value,
}

/// What a heap slot holds. The `Value` tag pointing at a slot always agrees
/// with the variant stored here.
pub enum Object {
    Free,
    Symbol(String),
    Keyword(String),
    Str(Vec<u8>),
    Cons { car: Value, cdr: Value },
    Primitive(Primitive),
    Compound(Closure),
    Macro(Closure),
    Stream(Box<Stream>),
}

/// Outgoing references of an object. Only pairs and closures have any.
fn children(object: &Object) -> [Value; 3] {
    match object {
        Object::Cons { car, cdr } => [*car, *cdr, Value::Nil],
        Object::Compound(c) | Object::Macro(c) => [c.params, c.body, c.env],
        _ => [Value::Nil; 3],
    }
}

struct Slot {
    object: Object,
    mark: bool,
    /// Next slot on the active list, the free list, or the persistent list.
    next: Option<ObjId>,
}

/// Result of one collection cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GcStats {
    /// Pool slots found reachable.
    pub marked: usize,
    /// Slots returned to the free list by this cycle.
    pub reclaimed: usize,
    /// Slots on the free list after the cycle.
    pub free: usize,
}

// ============================================================================
// Root stack
// ============================================================================

type RootCell = Rc<RefCell<Vec<Value>>>;

/// The dynamic root set: values pinned by in-flight native code.
#[derive(Clone, Default)]
pub struct RootStack(RootCell);

impl RootStack {
    fn push(&self, values: &[Value]) -> Rooted {
        let mut stack = self.0.borrow_mut();
        let base = stack.len();
        stack.extend_from_slice(values);
        Rooted {
            stack: Rc::clone(&self.0),
            base,
            len: values.len(),
        }
    }

    pub fn depth(&self) -> usize {
        self.0.borrow().len()
    }
}

/// A pin on the root stack. Values are registered when the guard is created
/// and released when it is dropped, so registration always pairs up with
/// release on every exit path, `?` included.
///
/// Guards must be released in LIFO order, which scoped locals give for free.
pub struct Rooted {
    stack: RootCell,
    base: usize,
    len: usize,
}

impl Rooted {
    pub fn get(&self) -> Value {
        self.get_at(0)
    }

    pub fn set(&self, val: Value) {
        self.set_at(0, val)
    }

    pub fn get_at(&self, i: usize) -> Value {
        debug_assert!(i < self.len);
        self.stack.borrow()[self.base + i]
    }

    pub fn set_at(&self, i: usize, val: Value) {
        debug_assert!(i < self.len);
        self.stack.borrow_mut()[self.base + i] = val;
    }
}

impl Drop for Rooted {
    fn drop(&mut self) {
        let mut stack = self.stack.borrow_mut();
        if !std::thread::panicking() {
            debug_assert_eq!(
                stack.len(),
                self.base + self.len,
                "root stack released out of order"
            );
        }
        stack.truncate(self.base);
    }
}

/// Builds a proper list front to back. The head is pinned, and every cell
/// pushed so far hangs off it, so the partial list survives collections.
pub struct ListBuilder {
    head: Rooted,
    tail: Value,
}

impl ListBuilder {
    pub fn new(heap: &Heap) -> Self {
        ListBuilder {
            head: heap.root(Value::Nil),
            tail: Value::Nil,
        }
    }

    pub fn push(&mut self, heap: &mut Heap, val: Value) -> IotaResult<()> {
        let cell = heap.cons(val, Value::Nil)?;
        match self.tail {
            Value::Nil => self.head.set(cell),
            tail => heap.set_cdr(tail, cell)?,
        }
        self.tail = cell;
        Ok(())
    }

    /// Finish with `tail` as the final cdr instead of `Nil`.
    pub fn finish_with(self, heap: &mut Heap, tail: Value) -> IotaResult<Value> {
        match self.tail {
            Value::Nil => Ok(tail),
            last => {
                heap.set_cdr(last, tail)?;
                Ok(self.head.get())
            }
        }
    }

    pub fn finish(self) -> Value {
        self.head.get()
    }
}

// ============================================================================
// Heap
// ============================================================================

/// The object heap: a fixed pool of slots threaded onto a free list, plus a
/// persistent area for objects that are never collected.
///
/// Allocation pops the free list. When it is empty the collector runs once
/// and the allocation is retried; a second failure is `OutOfMemory`.
pub struct Heap {
    slots: Vec<Slot>,
    capacity: usize,
    free: Option<ObjId>,
    free_count: usize,
    /// Every allocated pool slot.
    active: Option<ObjId>,
    /// Slots allocated through `alloc_persistent`, outside the pool.
    persistent: Option<ObjId>,
    /// Fixed roots registered at startup (global environment, streams, ...).
    roots: Vec<Value>,
    root_stack: RootStack,
    pub symbols: SymbolTable,
    pub keywords: SymbolTable,
    collections: usize,
}

impl Heap {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity < u32::MAX as usize, "heap capacity too large");
        let slots = (0..capacity)
            .map(|i| Slot {
                object: Object::Free,
                mark: false,
                next: if i + 1 < capacity {
                    Some(ObjId(i as u32 + 1))
                } else {
                    None
                },
            })
            .collect();
        Heap {
            slots,
            capacity,
            free: if capacity > 0 { Some(ObjId(0)) } else { None },
            free_count: capacity,
            active: None,
            persistent: None,
            roots: Vec::new(),
            root_stack: RootStack::default(),
            symbols: SymbolTable::new(),
            keywords: SymbolTable::new(),
            collections: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots on the free list.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    // === Allocation ===

    pub fn alloc(&mut self, object: Object) -> IotaResult<ObjId> {
        if self.free.is_none() {
            log::trace!("free list exhausted after {} collections", self.collections);
            self.collect_protecting(&object);
        }
        let id = self.free.ok_or(IotaError::OutOfMemory {
            capacity: self.capacity,
        })?;
        let slot = &mut self.slots[id.index()];
        self.free = slot.next;
        slot.object = object;
        slot.mark = false;
        slot.next = self.active;
        self.active = Some(id);
        self.free_count -= 1;
        Ok(id)
    }

    /// Allocate outside the pool. The object is never swept, but the
    /// collector still traces through it.
    pub fn alloc_persistent(&mut self, object: Object) -> ObjId {
        let id = ObjId(self.slots.len() as u32);
        self.slots.push(Slot {
            object,
            mark: false,
            next: self.persistent,
        });
        self.persistent = Some(id);
        id
    }

    pub fn cons(&mut self, car: Value, cdr: Value) -> IotaResult<Value> {
        Ok(Value::Cons(self.alloc(Object::Cons { car, cdr })?))
    }

    pub fn make_string(&mut self, bytes: impl Into<Vec<u8>>) -> IotaResult<Value> {
        Ok(Value::Str(self.alloc(Object::Str(bytes.into()))?))
    }

    pub fn make_stream(&mut self, stream: Stream) -> IotaResult<Value> {
        Ok(Value::Stream(self.alloc(Object::Stream(Box::new(stream)))?))
    }

    pub fn intern_symbol(&mut self, name: &str) -> IotaResult<Value> {
        if let Some(id) = self.symbols.lookup(name) {
            return Ok(Value::Symbol(id));
        }
        let id = self.alloc(Object::Symbol(name.to_string()))?;
        self.symbols.insert(name, id);
        Ok(Value::Symbol(id))
    }

    pub fn intern_keyword(&mut self, name: &str) -> IotaResult<Value> {
        if let Some(id) = self.keywords.lookup(name) {
            return Ok(Value::Keyword(id));
        }
        let id = self.alloc(Object::Keyword(name.to_string()))?;
        self.keywords.insert(name, id);
        Ok(Value::Keyword(id))
    }

    /// Build a proper list from a slice of values.
    pub fn list(&mut self, values: &[Value]) -> IotaResult<Value> {
        let pinned = self.root_all(values);
        let mut result = Value::Nil;
        for i in (0..values.len()).rev() {
            result = self.cons(pinned.get_at(i), result)?;
        }
        Ok(result)
    }

    // === Roots ===

    /// Register a value that stays reachable for the life of the heap.
    pub fn add_root(&mut self, val: Value) {
        self.roots.push(val);
    }

    pub fn root(&self, val: Value) -> Rooted {
        self.root_stack.push(&[val])
    }

    pub fn root_all(&self, values: &[Value]) -> Rooted {
        self.root_stack.push(values)
    }

    pub fn root_depth(&self) -> usize {
        self.root_stack.depth()
    }

    // === Access ===

    pub fn get(&self, id: ObjId) -> &Object {
        &self.slots[id.index()].object
    }

    pub fn get_mut(&mut self, id: ObjId) -> &mut Object {
        &mut self.slots[id.index()].object
    }

    pub fn is_free(&self, id: ObjId) -> bool {
        matches!(self.slots[id.index()].object, Object::Free)
    }

    /// Car of a pair, `Nil` of `Nil`.
    pub fn car(&self, val: Value) -> IotaResult<Value> {
        match val {
            Value::Nil => Ok(Value::Nil),
            Value::Cons(id) => match self.get(id) {
                Object::Cons { car, .. } => Ok(*car),
                _ => Err(IotaError::Type("car of reclaimed cell".into())),
            },
            other => Err(IotaError::type_error("car", "list", other.type_name())),
        }
    }

    /// Cdr of a pair, `Nil` of `Nil`.
    pub fn cdr(&self, val: Value) -> IotaResult<Value> {
        match val {
            Value::Nil => Ok(Value::Nil),
            Value::Cons(id) => match self.get(id) {
                Object::Cons { cdr, .. } => Ok(*cdr),
                _ => Err(IotaError::Type("cdr of reclaimed cell".into())),
            },
            other => Err(IotaError::type_error("cdr", "list", other.type_name())),
        }
    }

    pub fn cadr(&self, val: Value) -> IotaResult<Value> {
        self.car(self.cdr(val)?)
    }

    pub fn cddr(&self, val: Value) -> IotaResult<Value> {
        self.cdr(self.cdr(val)?)
    }

    pub fn caddr(&self, val: Value) -> IotaResult<Value> {
        self.car(self.cddr(val)?)
    }

    pub fn cdddr(&self, val: Value) -> IotaResult<Value> {
        self.cdr(self.cddr(val)?)
    }

    pub fn set_car(&mut self, pair: Value, val: Value) -> IotaResult<()> {
        match pair {
            Value::Cons(id) => match self.get_mut(id) {
                Object::Cons { car, .. } => {
                    *car = val;
                    Ok(())
                }
                _ => Err(IotaError::Type("set-car! of reclaimed cell".into())),
            },
            other => Err(IotaError::type_error("set-car!", "cons", other.type_name())),
        }
    }

    pub fn set_cdr(&mut self, pair: Value, val: Value) -> IotaResult<()> {
        match pair {
            Value::Cons(id) => match self.get_mut(id) {
                Object::Cons { cdr, .. } => {
                    *cdr = val;
                    Ok(())
                }
                _ => Err(IotaError::Type("set-cdr! of reclaimed cell".into())),
            },
            other => Err(IotaError::type_error("set-cdr!", "cons", other.type_name())),
        }
    }

    /// Name of a symbol or keyword.
    pub fn symbol_name(&self, val: Value) -> Option<&str> {
        match val {
            Value::Symbol(id) | Value::Keyword(id) => match self.get(id) {
                Object::Symbol(name) | Object::Keyword(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn string_bytes(&self, val: Value) -> Option<&[u8]> {
        match val {
            Value::Str(id) => match self.get(id) {
                Object::Str(bytes) => Some(bytes),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn closure(&self, val: Value) -> Option<Closure> {
        match val {
            Value::Compound(id) | Value::Macro(id) => match self.get(id) {
                Object::Compound(c) | Object::Macro(c) => Some(*c),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn primitive(&self, val: Value) -> Option<Primitive> {
        match val {
            Value::Primitive(id) => match self.get(id) {
                Object::Primitive(p) => Some(*p),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn stream(&self, val: Value) -> Option<&Stream> {
        match val {
            Value::Stream(id) => match self.get(id) {
                Object::Stream(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn stream_mut(&mut self, val: Value) -> IotaResult<&mut Stream> {
        match val {
            Value::Stream(id) => match self.get_mut(id) {
                Object::Stream(s) => Ok(s),
                _ => Err(IotaError::Type("stream slot was reclaimed".into())),
            },
            other => Err(IotaError::type_error("stream", "stream", other.type_name())),
        }
    }

    /// `eq?`: identity, except strings compare by content.
    pub fn is_eq(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Str(_), Value::Str(_)) => self.string_bytes(a) == self.string_bytes(b),
            _ => a == b,
        }
    }

    /// Collect a proper list into a Vec. The elements are only as safe as
    /// the list they came from.
    pub fn list_to_vec(&self, list: Value) -> IotaResult<Vec<Value>> {
        let mut result = Vec::new();
        let mut current = list;
        loop {
            match current {
                Value::Nil => return Ok(result),
                Value::Cons(_) => {
                    result.push(self.car(current)?);
                    current = self.cdr(current)?;
                }
                other => {
                    return Err(IotaError::type_error("list", "proper list", other.type_name()))
                }
            }
        }
    }

    pub fn list_len(&self, list: Value) -> IotaResult<usize> {
        let mut len = 0;
        let mut current = list;
        while let Value::Cons(_) = current {
            len += 1;
            current = self.cdr(current)?;
        }
        if current.is_nil() {
            Ok(len)
        } else {
            Err(IotaError::type_error("length", "proper list", current.type_name()))
        }
    }

    // === GC ===

    /// Run a full collection.
    pub fn collect(&mut self) -> GcStats {
        self.collect_protecting(&Object::Free)
    }

    /// Mark from every root plus the fields of `pending`, the object an
    /// allocation is about to store, then sweep.
    fn collect_protecting(&mut self, pending: &Object) -> GcStats {
        let mut worklist = Vec::new();
        let slots = &mut self.slots;

        for val in children(pending) {
            mark_value(slots, &mut worklist, val);
        }
        for &val in &self.roots {
            mark_value(slots, &mut worklist, val);
        }
        for &val in self.root_stack.0.borrow().iter() {
            mark_value(slots, &mut worklist, val);
        }
        for id in self.symbols.ids().chain(self.keywords.ids()) {
            mark_id(slots, &mut worklist, id);
        }
        process_worklist(slots, &mut worklist);

        let stats = self.sweep();
        self.collections += 1;
        log::debug!(
            "gc #{}: marked {}, reclaimed {}, free {}/{}",
            self.collections,
            stats.marked,
            stats.reclaimed,
            stats.free,
            self.capacity
        );
        stats
    }

    /// Walk the active list: unlink unmarked slots onto the free list, clear
    /// the mark on survivors.
    fn sweep(&mut self) -> GcStats {
        let mut marked = 0;
        let mut reclaimed = 0;
        let mut prev: Option<ObjId> = None;
        let mut current = self.active;

        while let Some(id) = current {
            let next = self.slots[id.index()].next;
            if self.slots[id.index()].mark {
                self.slots[id.index()].mark = false;
                marked += 1;
                prev = Some(id);
            } else {
                match prev {
                    Some(p) => self.slots[p.index()].next = next,
                    None => self.active = next,
                }
                let slot = &mut self.slots[id.index()];
                let old = std::mem::replace(&mut slot.object, Object::Free);
                slot.next = self.free;
                self.free = Some(id);
                self.free_count += 1;
                reclaimed += 1;
                if let Object::Stream(stream) = &old {
                    if stream.is_open() {
                        log::trace!("releasing unclosed stream in slot {}", id.0);
                    }
                }
            }
            current = next;
        }

        let mut current = self.persistent;
        while let Some(id) = current {
            let slot = &mut self.slots[id.index()];
            slot.mark = false;
            current = slot.next;
        }

        GcStats {
            marked,
            reclaimed,
            free: self.free_count,
        }
    }
}

fn mark_value(slots: &mut [Slot], worklist: &mut Vec<ObjId>, val: Value) {
    if let Some(id) = val.obj_id() {
        mark_id(slots, worklist, id);
    }
}

fn mark_id(slots: &mut [Slot], worklist: &mut Vec<ObjId>, id: ObjId) {
    let slot = &mut slots[id.index()];
    if !slot.mark {
        slot.mark = true;
        worklist.push(id);
    }
}

/// Depth-first trace. A marked slot is never pushed twice, so cycles end.
fn process_worklist(slots: &mut [Slot], worklist: &mut Vec<ObjId>) {
    while let Some(id) = worklist.pop() {
        for val in children(&slots[id.index()].object) {
            mark_value(slots, worklist, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    fn build_list(heap: &mut Heap, n: i64) -> Rooted {
        let list = heap.root(Value::Nil);
        for i in (0..n).rev() {
            let cell = heap.cons(Value::Fixnum(i), list.get()).unwrap();
            list.set(cell);
        }
        list
    }

    fn reachable(heap: &Heap, roots: &[Value]) -> HashSet<ObjId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<Value> = roots.to_vec();
        while let Some(val) = stack.pop() {
            if let Some(id) = val.obj_id() {
                if seen.insert(id) {
                    stack.extend(children(heap.get(id)));
                }
            }
        }
        seen
    }

    #[test]
    fn garbage_is_reclaimed_when_pool_runs_dry() {
        let mut heap = Heap::new(100);
        for i in 0..1000 {
            heap.cons(Value::Fixnum(i), Value::Nil).unwrap();
        }
        assert!(heap.collections() >= 9);
    }

    #[test]
    fn out_of_memory_when_everything_is_live() {
        let mut heap = Heap::new(10);
        let list = build_list(&mut heap, 10);
        let err = heap.cons(Value::Nil, list.get()).unwrap_err();
        assert!(matches!(err, IotaError::OutOfMemory { capacity: 10 }));
    }

    #[test]
    fn rooted_values_survive_collection() {
        let mut heap = Heap::new(64);
        let list = build_list(&mut heap, 5);
        heap.cons(Value::Fixnum(99), Value::Nil).unwrap();
        let stats = heap.collect();
        assert_eq!(stats.marked, 5);
        assert_eq!(stats.marked + stats.free, heap.capacity());
        let items = heap.list_to_vec(list.get()).unwrap();
        assert_eq!(items, (0..5).map(Value::Fixnum).collect::<Vec<_>>());
    }

    #[test]
    fn fields_of_the_object_being_allocated_are_protected() {
        let mut heap = Heap::new(3);
        let a = heap.cons(Value::Fixnum(1), Value::Nil).unwrap();
        heap.cons(Value::Fixnum(9), Value::Nil).unwrap();
        let b = heap.cons(Value::Fixnum(2), Value::Nil).unwrap();
        assert_eq!(heap.free_count(), 0);

        let pair = heap.cons(a, b).unwrap();
        assert_eq!(heap.collections(), 1);
        assert_eq!(heap.car(pair).unwrap(), a);
        assert_eq!(heap.car(a).unwrap(), Value::Fixnum(1));
        assert_eq!(heap.car(b).unwrap(), Value::Fixnum(2));
    }

    #[test]
    fn rooted_cycle_survives_and_unrooted_cycle_is_reclaimed() {
        let mut heap = Heap::new(16);
        let cell = heap.cons(Value::Fixnum(1), Value::Nil).unwrap();
        heap.set_cdr(cell, cell).unwrap();
        {
            let _pin = heap.root(cell);
            let stats = heap.collect();
            assert_eq!(stats.marked, 1);
            assert_eq!(heap.cdr(cell).unwrap(), cell);
        }
        let stats = heap.collect();
        assert_eq!(stats.marked, 0);
        assert_eq!(stats.reclaimed, 1);
        assert!(heap.is_free(cell.obj_id().unwrap()));
    }

    #[test]
    fn sweep_releases_owned_buffers() {
        let mut heap = Heap::new(8);
        let s = heap.make_string("scratch").unwrap();
        let kept = heap.make_string("kept").unwrap();
        heap.add_root(kept);
        heap.collect();
        assert!(heap.is_free(s.obj_id().unwrap()));
        assert_eq!(heap.string_bytes(kept), Some(&b"kept"[..]));
    }

    #[test]
    fn interned_symbols_are_roots() {
        let mut heap = Heap::new(8);
        let sym = heap.intern_symbol("lonely").unwrap();
        heap.collect();
        assert_eq!(heap.symbol_name(sym), Some("lonely"));
    }

    #[test]
    fn persistent_objects_are_never_swept() {
        let mut heap = Heap::new(4);
        let id = heap.alloc_persistent(Object::Symbol("#<eof>".into()));
        for i in 0..20 {
            heap.cons(Value::Fixnum(i), Value::Nil).unwrap();
        }
        heap.collect();
        assert_eq!(heap.symbol_name(Value::Symbol(id)), Some("#<eof>"));
        assert_eq!(heap.free_count(), heap.capacity());
    }

    #[test]
    fn persistent_objects_keep_their_referents_alive() {
        let mut heap = Heap::new(4);
        let inner = heap.cons(Value::Fixnum(7), Value::Nil).unwrap();
        heap.alloc_persistent(Object::Cons {
            car: inner,
            cdr: Value::Nil,
        });
        let stats = heap.collect();
        assert_eq!(stats.marked, 1);
        assert_eq!(heap.car(inner).unwrap(), Value::Fixnum(7));
    }

    #[test]
    fn root_guards_release_in_lifo_order() {
        let heap = Heap::new(4);
        assert_eq!(heap.root_depth(), 0);
        {
            let a = heap.root(Value::Fixnum(1));
            {
                let b = heap.root_all(&[Value::Fixnum(2), Value::Fixnum(3)]);
                assert_eq!(heap.root_depth(), 3);
                assert_eq!(b.get_at(1), Value::Fixnum(3));
            }
            assert_eq!(heap.root_depth(), 1);
            a.set(Value::Fixnum(5));
            assert_eq!(a.get(), Value::Fixnum(5));
        }
        assert_eq!(heap.root_depth(), 0);
    }

    #[test]
    fn root_guards_release_on_early_return() {
        fn fails(heap: &mut Heap) -> IotaResult<Value> {
            let _pin = heap.root(Value::Fixnum(1));
            let list = build_list(heap, 4);
            heap.car(Value::Fixnum(3))?;
            Ok(list.get())
        }
        let mut heap = Heap::new(16);
        assert!(fails(&mut heap).is_err());
        assert_eq!(heap.root_depth(), 0);
    }

    #[test]
    fn list_builder_survives_collection() {
        let mut heap = Heap::new(8);
        let mut builder = ListBuilder::new(&heap);
        for i in 0..6 {
            builder.push(&mut heap, Value::Fixnum(i)).unwrap();
            heap.cons(Value::Nil, Value::Nil).unwrap();
        }
        let list = builder.finish();
        let _pin = heap.root(list);
        assert_eq!(heap.list_len(list).unwrap(), 6);
        assert_eq!(heap.caddr(list).unwrap(), Value::Fixnum(2));
    }

    #[test]
    fn list_helper_pins_its_inputs() {
        let mut heap = Heap::new(4);
        let a = heap.make_string("a").unwrap();
        heap.cons(Value::Nil, Value::Nil).unwrap();
        heap.cons(Value::Nil, Value::Nil).unwrap();
        heap.cons(Value::Nil, Value::Nil).unwrap();
        let list = heap.list(&[a, Value::Fixnum(1)]).unwrap();
        assert_eq!(heap.car(list).unwrap(), a);
        assert_eq!(heap.string_bytes(a), Some(&b"a"[..]));
    }

    proptest! {
        #[test]
        fn collection_keeps_exactly_the_reachable_graph(
            ops in prop::collection::vec((0usize..64, 0usize..64, 0u8..4), 1..200)
        ) {
            let mut heap = Heap::new(512);
            let mut nodes = vec![Value::Fixnum(0), Value::Nil];
            let mut roots = Vec::new();
            for (i, j, kind) in ops {
                let a = nodes[i % nodes.len()];
                let b = nodes[j % nodes.len()];
                match kind {
                    // set-cdr! onto an existing pair, possibly closing a cycle
                    0 if a.is_cons() => heap.set_cdr(a, b).unwrap(),
                    1 => {
                        let cell = heap.cons(a, b).unwrap();
                        heap.add_root(cell);
                        roots.push(cell);
                        nodes.push(cell);
                    }
                    _ => {
                        let cell = heap.cons(a, b).unwrap();
                        nodes.push(cell);
                    }
                }
            }

            let live = reachable(&heap, &roots);
            let stats = heap.collect();
            prop_assert_eq!(stats.marked, live.len());
            prop_assert_eq!(stats.marked + stats.free, heap.capacity());
            for node in nodes.iter().filter_map(|n| n.obj_id()) {
                prop_assert_eq!(heap.is_free(node), !live.contains(&node));
            }
        }
    }
}
