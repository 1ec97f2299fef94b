// (C) 2020 Brandon Lewis
//
// The heap and its generational mark-and-sweep collector.
//
// *Objects and handles*
//
// Composite values (arrays, maps, records, function descriptors,
// closures) live in a slot arena owned by the Heap. A Value refers to
// one through a Handle, which is just the slot index. The object
// header (mark bit, tenure counter, weak-ref observers) sits in the
// slot next to the body, so the collector reaches it in O(1) from any
// handle and marking is O(live).
//
// *Generations*
//
// Objects are born young. Each young collection they survive bumps a
// tenure counter; past the tenure threshold they are promoted to the
// old generation, which is only swept by a full collection.
//
// *Marking*
//
// The heap never decides what is live on its own: the engine feeds it
// roots through mark_value before any sweep, regardless of what
// triggered the collection. A sweep that runs without a preceding
// root-mark pass would free everything, so the two are never offered
// as separate entry points to the engine.
//
// *Weak references*
//
// A weak reference is a slot in a registry that points at an object
// without keeping it alive. Finalizing an object nulls every weak slot
// observing it. Weak slots themselves are never reaped while the VM
// runs; they go away with the heap, so identifiers stay stable.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::value::{value_handle, Handle, Value};

// Identifier of a weak reference. Travels through programs encoded as
// a Value::Int.
pub type WeakId = usize;

// An immutable function descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub entry: usize,
    pub arity: usize,
    pub varargs: bool,
    pub locals: usize,
    pub name: Rc<str>,
}

// A function together with the values captured at creation sites.
#[derive(Clone, Debug, PartialEq)]
pub struct ClosureData {
    pub function: Handle,
    pub captures: Vec<Value>,
}

// The body of a heap object. Maps and records share a representation:
// keys are 64-bit digests of the original UTF-8 key string, which is
// never stored. Two distinct keys with the same digest are
// indistinguishable.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Array(Vec<Value>),
    Map(HashMap<u64, Value>),
    Record(HashMap<u64, Value>),
    Function(FunctionDef),
    Closure(ClosureData),
}

// Digest a map/record key.
pub fn digest(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

struct HeapObject {
    body: Object,
    marked: bool,
    tenure: u32,
    observers: Vec<WeakId>,
}

// Collector statistics, exposed through the engine's inspection
// surface.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GcStats {
    pub allocations: u64,
    pub minor_collections: u64,
    pub full_collections: u64,
    pub promotions: u64,
    pub finalized: u64,
    pub live_young: usize,
    pub live_old: usize,
    pub weak_refs: usize,
}

pub struct Heap {
    slots: Vec<Option<HeapObject>>,
    free: Vec<Handle>,
    young: Vec<Handle>,
    old: Vec<Handle>,
    weak: Vec<Option<Handle>>,
    young_threshold: usize,
    tenure_threshold: u32,
    allocations: u64,
    minor_collections: u64,
    full_collections: u64,
    promotions: u64,
    finalized: u64,
}

impl Heap {
    pub fn new(young_threshold: usize, tenure_threshold: u32) -> Heap {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            young: Vec::new(),
            old: Vec::new(),
            weak: Vec::new(),
            young_threshold,
            tenure_threshold,
            allocations: 0,
            minor_collections: 0,
            full_collections: 0,
            promotions: 0,
            finalized: 0,
        }
    }

    // Allocate an object into the young generation. Never collects:
    // the engine checks wants_collection first so roots get marked
    // before any sweep.
    pub fn alloc(&mut self, body: Object) -> Handle {
        self.allocations += 1;
        let object = HeapObject {
            body,
            marked: false,
            tenure: 0,
            observers: Vec::new(),
        };
        let handle = match self.free.pop() {
            Some(h) => {
                self.slots[h] = Some(object);
                h
            }
            None => {
                self.slots.push(Some(object));
                self.slots.len() - 1
            }
        };
        self.young.push(handle);
        handle
    }

    // True when the young generation count exceeds the threshold.
    pub fn wants_collection(&self) -> bool {
        self.young.len() > self.young_threshold
    }

    fn body(&self, handle: Handle) -> Result<&Object> {
        match self.slots.get(handle) {
            Some(Some(object)) => Ok(&object.body),
            _ => Err(Error::InvalidOperation),
        }
    }

    fn body_mut(&mut self, handle: Handle) -> Result<&mut Object> {
        match self.slots.get_mut(handle) {
            Some(Some(object)) => Ok(&mut object.body),
            _ => Err(Error::InvalidOperation),
        }
    }

    pub fn array(&self, handle: Handle) -> Result<&Vec<Value>> {
        match self.body(handle)? {
            Object::Array(items) => Ok(items),
            _ => Err(Error::InvalidOperation),
        }
    }

    pub fn array_mut(&mut self, handle: Handle) -> Result<&mut Vec<Value>> {
        match self.body_mut(handle)? {
            Object::Array(items) => Ok(items),
            _ => Err(Error::InvalidOperation),
        }
    }

    pub fn map(&self, handle: Handle) -> Result<&HashMap<u64, Value>> {
        match self.body(handle)? {
            Object::Map(entries) | Object::Record(entries) => Ok(entries),
            _ => Err(Error::InvalidOperation),
        }
    }

    pub fn map_mut(&mut self, handle: Handle) -> Result<&mut HashMap<u64, Value>> {
        match self.body_mut(handle)? {
            Object::Map(entries) | Object::Record(entries) => Ok(entries),
            _ => Err(Error::InvalidOperation),
        }
    }

    pub fn function(&self, handle: Handle) -> Result<&FunctionDef> {
        match self.body(handle)? {
            Object::Function(def) => Ok(def),
            _ => Err(Error::InvalidOperation),
        }
    }

    pub fn closure(&self, handle: Handle) -> Result<&ClosureData> {
        match self.body(handle)? {
            Object::Closure(data) => Ok(data),
            _ => Err(Error::InvalidOperation),
        }
    }

    pub fn closure_mut(&mut self, handle: Handle) -> Result<&mut ClosureData> {
        match self.body_mut(handle)? {
            Object::Closure(data) => Ok(data),
            _ => Err(Error::InvalidOperation),
        }
    }

    // Element count of a container object; None for descriptors and
    // dangling handles.
    pub fn container_len(&self, handle: Handle) -> Option<usize> {
        match self.body(handle) {
            Ok(Object::Array(items)) => Some(items.len()),
            Ok(Object::Map(entries)) | Ok(Object::Record(entries)) => Some(entries.len()),
            _ => None,
        }
    }

    // Reconstruct the Value variant for a live handle.
    fn handle_value(&self, handle: Handle) -> Result<Value> {
        Ok(match self.body(handle)? {
            Object::Array(_) => Value::Array(handle),
            Object::Map(_) => Value::Map(handle),
            Object::Record(_) => Value::Record(handle),
            Object::Function(_) => Value::Function(handle),
            Object::Closure(_) => Value::Closure(handle),
        })
    }

    // Textual rendering of a value. Immediates render themselves;
    // containers render as Kind[count], descriptors as Kind@entry.
    pub fn render(&self, v: &Value) -> String {
        match v {
            Value::Nil => String::from("nil"),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{}", f),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.to_string(),
            Value::Array(h) => format!("Array[{}]", self.container_len(*h).unwrap_or(0)),
            Value::Map(h) => format!("Map[{}]", self.container_len(*h).unwrap_or(0)),
            Value::Record(h) => format!("Record[{}]", self.container_len(*h).unwrap_or(0)),
            Value::Function(h) => match self.function(*h) {
                Ok(def) => format!("Function@{}", def.entry),
                Err(_) => String::from("Function@?"),
            },
            Value::Closure(h) => match self.closure(*h).and_then(|c| self.function(c.function)) {
                Ok(def) => format!("Closure@{}", def.entry),
                Err(_) => String::from("Closure@?"),
            },
        }
    }

    // ------------------------------------------------------------
    // Weak references
    // ------------------------------------------------------------

    // Register a weak reference observing the object behind v. A
    // value with no live heap object behind it yields a dead weak
    // reference; that is the documented behavior, not an error.
    pub fn new_weak(&mut self, v: &Value) -> WeakId {
        let id = self.weak.len();
        let target = value_handle(v).filter(|h| self.body(*h).is_ok());
        if let Some(h) = target {
            if let Some(Some(object)) = self.slots.get_mut(h) {
                object.observers.push(id);
            }
        }
        self.weak.push(target);
        id
    }

    // The current target of a weak reference: the live value, or nil
    // once the target has been collected.
    pub fn weak_target(&self, id: WeakId) -> Result<Value> {
        match self.weak.get(id) {
            Some(Some(h)) => self.handle_value(*h),
            Some(None) => Ok(Value::Nil),
            None => Err(Error::InvalidOperation),
        }
    }

    // ------------------------------------------------------------
    // Mark phase
    // ------------------------------------------------------------

    // Mark everything reachable from a single root value. Already
    // marked objects are not re-visited, which also terminates cycles.
    pub fn mark_value(&mut self, v: &Value) {
        let start = match value_handle(v) {
            Some(h) => h,
            None => return,
        };
        let mut pending = vec![start];
        while let Some(handle) = pending.pop() {
            let object = match self.slots.get_mut(handle) {
                Some(Some(object)) => object,
                _ => continue,
            };
            if object.marked {
                continue;
            }
            object.marked = true;
            match &object.body {
                Object::Array(items) => {
                    pending.extend(items.iter().filter_map(value_handle));
                }
                Object::Map(entries) | Object::Record(entries) => {
                    pending.extend(entries.values().filter_map(value_handle));
                }
                Object::Function(_) => {}
                Object::Closure(data) => {
                    pending.push(data.function);
                    pending.extend(data.captures.iter().filter_map(value_handle));
                }
            }
        }
    }

    // ------------------------------------------------------------
    // Sweep phases
    // ------------------------------------------------------------

    // Finalize exactly once: null every observing weak slot, then
    // release the body and recycle the slot.
    fn finalize(&mut self, handle: Handle) {
        if let Some(object) = self.slots[handle].take() {
            for id in object.observers {
                if let Some(slot) = self.weak.get_mut(id) {
                    *slot = None;
                }
            }
            self.free.push(handle);
            self.finalized += 1;
        }
    }

    // Sweep the young generation: free the unmarked, age the rest,
    // and promote anything past the tenure threshold.
    fn sweep_young(&mut self) {
        let mut kept = Vec::with_capacity(self.young.len());
        for handle in std::mem::take(&mut self.young) {
            let marked = match &self.slots[handle] {
                Some(object) => object.marked,
                None => continue,
            };
            if !marked {
                self.finalize(handle);
                continue;
            }
            let promote = match self.slots[handle].as_mut() {
                Some(object) => {
                    object.marked = false;
                    object.tenure += 1;
                    object.tenure > self.tenure_threshold
                }
                None => continue,
            };
            if promote {
                self.promotions += 1;
                self.old.push(handle);
            } else {
                kept.push(handle);
            }
        }
        self.young = kept;
        self.minor_collections += 1;
    }

    // Sweep the old generation.
    fn sweep_old(&mut self) {
        let mut kept = Vec::with_capacity(self.old.len());
        for handle in std::mem::take(&mut self.old) {
            match self.slots[handle].as_mut() {
                Some(object) if object.marked => {
                    object.marked = false;
                    kept.push(handle);
                }
                Some(_) => self.finalize(handle),
                None => {}
            }
        }
        self.old = kept;
    }

    // Root marking reaches into the old generation too; a young-only
    // sweep has to clear those marks or the next collection would
    // treat them as live unconditionally.
    fn clear_old_marks(&mut self) {
        for handle in &self.old {
            if let Some(Some(object)) = self.slots.get_mut(*handle) {
                object.marked = false;
            }
        }
    }

    // Minor collection. The caller must have marked all roots.
    pub fn collect_young(&mut self) {
        let before = self.young.len();
        self.sweep_young();
        self.clear_old_marks();
        debug!(
            "minor collection: {} young -> {} young, {} old",
            before,
            self.young.len(),
            self.old.len()
        );
    }

    // Full collection. The caller must have marked all roots.
    pub fn collect_full(&mut self) {
        let (y, o) = (self.young.len(), self.old.len());
        self.sweep_young();
        self.sweep_old();
        self.full_collections += 1;
        debug!(
            "full collection: {}+{} -> {}+{} (young+old)",
            y,
            o,
            self.young.len(),
            self.old.len()
        );
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            allocations: self.allocations,
            minor_collections: self.minor_collections,
            full_collections: self.full_collections,
            promotions: self.promotions,
            finalized: self.finalized,
            live_young: self.young.len(),
            live_old: self.old.len(),
            weak_refs: self.weak.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn empty_array(heap: &mut Heap) -> Handle {
        heap.alloc(Object::Array(Vec::new()))
    }

    #[test]
    fn test_alloc_and_reuse() {
        let mut heap = Heap::new(100, 4);
        let a = empty_array(&mut heap);
        let b = empty_array(&mut heap);
        assert_ne!(a, b);

        // Nothing marked: a minor collection frees both, and the next
        // allocation recycles a freed slot.
        heap.collect_young();
        assert_eq!(heap.stats().live_young, 0);
        assert_eq!(heap.stats().finalized, 2);
        let c = empty_array(&mut heap);
        assert!(c == a || c == b);
    }

    #[test]
    fn test_mark_keeps_reachable() {
        let mut heap = Heap::new(100, 4);
        let kept = empty_array(&mut heap);
        let lost = empty_array(&mut heap);

        heap.mark_value(&Value::Array(kept));
        heap.collect_young();

        assert!(heap.array(kept).is_ok());
        assert!(heap.array(lost).is_err());
    }

    #[test]
    fn test_mark_traverses_containers() {
        let mut heap = Heap::new(100, 4);
        let inner = empty_array(&mut heap);
        let outer = heap.alloc(Object::Array(vec![Value::Array(inner)]));
        let mut entries = HashMap::new();
        entries.insert(digest("k"), Value::Array(outer));
        let map = heap.alloc(Object::Map(entries));

        heap.mark_value(&Value::Map(map));
        heap.collect_young();

        assert!(heap.array(inner).is_ok());
        assert!(heap.array(outer).is_ok());
        assert!(heap.map(map).is_ok());
    }

    #[test]
    fn test_mark_terminates_on_cycles() {
        let mut heap = Heap::new(100, 4);
        let a = empty_array(&mut heap);
        let b = heap.alloc(Object::Array(vec![Value::Array(a)]));
        heap.array_mut(a).unwrap().push(Value::Array(b));

        heap.mark_value(&Value::Array(a));
        heap.collect_young();
        assert!(heap.array(a).is_ok());
        assert!(heap.array(b).is_ok());
    }

    #[test]
    fn test_closure_captures_are_traced() {
        let mut heap = Heap::new(100, 4);
        let f = heap.alloc(Object::Function(FunctionDef {
            entry: 7,
            arity: 1,
            varargs: false,
            locals: 0,
            name: Rc::from("fn@7"),
        }));
        let captured = empty_array(&mut heap);
        let c = heap.alloc(Object::Closure(ClosureData {
            function: f,
            captures: vec![Value::Array(captured)],
        }));

        heap.mark_value(&Value::Closure(c));
        heap.collect_young();
        assert!(heap.function(f).is_ok());
        assert!(heap.array(captured).is_ok());
    }

    #[test]
    fn test_tenure_and_promotion() {
        let mut heap = Heap::new(100, 4);
        let h = empty_array(&mut heap);

        // Four survivals age the object but keep it young.
        for _ in 0..4 {
            heap.mark_value(&Value::Array(h));
            heap.collect_young();
            assert_eq!(heap.stats().live_old, 0);
        }
        // The fifth survival promotes it.
        heap.mark_value(&Value::Array(h));
        heap.collect_young();
        assert_eq!(heap.stats().live_young, 0);
        assert_eq!(heap.stats().live_old, 1);
        assert_eq!(heap.stats().promotions, 1);

        // A full collection with no roots reaps it from the old
        // generation.
        heap.collect_full();
        assert!(heap.array(h).is_err());
    }

    #[test]
    fn test_old_marks_cleared_after_minor() {
        let mut heap = Heap::new(100, 4);
        let h = empty_array(&mut heap);
        for _ in 0..5 {
            heap.mark_value(&Value::Array(h));
            heap.collect_young();
        }
        assert_eq!(heap.stats().live_old, 1);

        // A minor collection that marks the old object must not leave
        // the mark behind, or the next full collection would keep it
        // alive with no roots at all.
        heap.mark_value(&Value::Array(h));
        heap.collect_young();
        heap.collect_full();
        assert!(heap.array(h).is_err());
    }

    #[test]
    fn test_weak_ref_nulled_at_finalize() {
        let mut heap = Heap::new(100, 4);
        let h = empty_array(&mut heap);
        let id = heap.new_weak(&Value::Array(h));
        assert_eq!(heap.weak_target(id), Ok(Value::Array(h)));

        heap.collect_young();
        assert_eq!(heap.weak_target(id), Ok(Value::Nil));
        // The slot itself survives the target.
        assert_eq!(heap.stats().weak_refs, 1);
    }

    #[test]
    fn test_weak_ref_to_immediate_is_dead() {
        let mut heap = Heap::new(100, 4);
        let id = heap.new_weak(&Value::Int(42));
        assert_eq!(heap.weak_target(id), Ok(Value::Nil));
        assert_eq!(heap.weak_target(99), Err(Error::InvalidOperation));
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest("field"), digest("field"));
        assert_ne!(digest("field"), digest("other"));
    }

    #[test]
    fn test_stats_counters() {
        let mut heap = Heap::new(100, 4);
        let a = empty_array(&mut heap);
        let _ = empty_array(&mut heap);
        heap.mark_value(&Value::Array(a));
        heap.collect_full();

        let stats = heap.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.minor_collections, 1);
        assert_eq!(stats.full_collections, 1);
        assert_eq!(stats.finalized, 1);
        assert_eq!(stats.live_young, 1);
    }
}
