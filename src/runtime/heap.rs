//! Refcounted heap for boundary-visible objects
//!
//! Every array, object, function, class and task that can cross the
//! boundary lives in a `HeapCell` with an explicit reference count:
//! - Factory operations create a cell holding one reference for the caller.
//! - `retain` adds a reference, `release` drops one; the cell and its payload
//!   are reclaimed when the last reference goes.
//! - Reclaiming a payload releases every reference it holds in turn.
//!
//! Inside the runtime, references are held through `HeapRef`, which owns
//! exactly one count (clone = retain, drop = release). Raw pointers only
//! appear at the boundary.
//!
//! The heap is single-threaded: counts are plain `Cell`s and the
//! instrumentation counters are thread-local.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::ffi::c_void;
use std::ptr::NonNull;

use super::abi::{Kind, NativeCallback};
use super::slot::Slot;

/// Insertion-ordered property storage. Lookups are linear; objects crossing
/// the boundary are small and key order must be stable for enumeration.
pub type PropertyMap = Vec<(String, Slot)>;

// =========================================================================
// Payloads
// =========================================================================

/// A keyed map. Instances created with `new C(...)` link back to their class.
#[derive(Default)]
pub struct ObjectData {
    pub properties: PropertyMap,
    pub class: Option<HeapRef>,
}

impl ObjectData {
    pub fn get(&self, key: &str) -> Option<&Slot> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn has(&self, key: &str) -> bool {
        self.properties.iter().any(|(k, _)| k == key)
    }

    /// Insert or overwrite. The previous value is handed back so the caller
    /// can drop it after releasing any borrow of this object.
    pub fn set(&mut self, key: &str, value: Slot) -> Option<Slot> {
        match self.properties.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.properties.push((key.to_string(), value));
                None
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(k, _)| k.as_str())
    }
}

/// A host function reachable from the runtime.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub callback: NativeCallback,
    /// Borrowed from the host for the runtime's lifetime; never freed here.
    pub userdata: *mut c_void,
}

/// A class descriptor: a name plus instance methods.
pub struct ClassData {
    pub name: String,
    pub methods: PropertyMap,
}

impl ClassData {
    pub fn method(&self, name: &str) -> Option<&Slot> {
        self.methods.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// An already-settled asynchronous value.
pub struct TaskData {
    pub result: Slot,
}

pub enum HeapData {
    Array(Vec<Slot>),
    Object(ObjectData),
    Function(NativeFunction),
    Class(ClassData),
    Task(TaskData),
}

impl HeapData {
    pub fn kind(&self) -> Kind {
        match self {
            HeapData::Array(_) => Kind::Array,
            HeapData::Object(_) => Kind::Object,
            HeapData::Function(_) => Kind::Function,
            HeapData::Class(_) => Kind::Class,
            HeapData::Task(_) => Kind::Task,
        }
    }
}

/// A heap allocation: reference count, fixed kind, payload.
pub struct HeapCell {
    refs: Cell<usize>,
    kind: Kind,
    data: RefCell<HeapData>,
}

// =========================================================================
// Instrumentation
// =========================================================================

/// Per-thread reference counting activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Cells created (each carries an initial reference).
    pub allocated: usize,
    /// Cells reclaimed.
    pub freed: usize,
    /// `retain` calls, excluding the initial reference.
    pub retains: usize,
    /// `release` calls.
    pub releases: usize,
}

impl HeapStats {
    const ZERO: HeapStats = HeapStats {
        allocated: 0,
        freed: 0,
        retains: 0,
        releases: 0,
    };

    pub fn live(&self) -> usize {
        self.allocated.saturating_sub(self.freed)
    }

    /// Activity between `earlier` and `self`.
    pub fn since(&self, earlier: &HeapStats) -> HeapStats {
        HeapStats {
            allocated: self.allocated - earlier.allocated,
            freed: self.freed - earlier.freed,
            retains: self.retains - earlier.retains,
            releases: self.releases - earlier.releases,
        }
    }

    /// Every reference ever taken (initial + retained) has been released and
    /// every cell reclaimed.
    pub fn is_balanced(&self) -> bool {
        self.allocated + self.retains == self.releases && self.allocated == self.freed
    }
}

thread_local! {
    static STATS: Cell<HeapStats> = const { Cell::new(HeapStats::ZERO) };
}

/// Snapshot of this thread's heap counters.
pub fn stats() -> HeapStats {
    STATS.with(|s| s.get())
}

fn record(update: impl FnOnce(&mut HeapStats)) {
    STATS.with(|s| {
        let mut current = s.get();
        update(&mut current);
        s.set(current);
    });
}

// =========================================================================
// Raw retain / release
// =========================================================================

/// Add one reference to a raw handle. Null is ignored.
///
/// # Safety
/// `raw` must be null or a live handle produced by this heap.
pub unsafe fn retain(raw: *mut c_void) {
    let Some(cell) = NonNull::new(raw as *mut HeapCell) else {
        return;
    };
    let cell = unsafe { cell.as_ref() };
    cell.refs.set(cell.refs.get() + 1);
    record(|s| s.retains += 1);
}

/// Drop one reference from a raw handle, reclaiming it at zero. Null is
/// ignored.
///
/// # Safety
/// `raw` must be null or a live handle, and the caller must own the
/// reference being released.
pub unsafe fn release(raw: *mut c_void) {
    let Some(ptr) = NonNull::new(raw as *mut HeapCell) else {
        return;
    };
    record(|s| s.releases += 1);
    let remaining = {
        let cell = unsafe { ptr.as_ref() };
        let refs = cell.refs.get();
        debug_assert!(refs > 0, "release of a reclaimed handle");
        cell.refs.set(refs - 1);
        refs - 1
    };
    if remaining == 0 {
        // Dropping the box drops the payload, which releases its children.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        record(|s| s.freed += 1);
    }
}

// =========================================================================
// Owning reference
// =========================================================================

/// One owned reference to a heap cell.
pub struct HeapRef {
    ptr: NonNull<HeapCell>,
}

impl HeapRef {
    /// Allocate a cell; the returned reference is its only one.
    pub fn alloc(data: HeapData) -> HeapRef {
        let cell = Box::new(HeapCell {
            refs: Cell::new(1),
            kind: data.kind(),
            data: RefCell::new(data),
        });
        record(|s| s.allocated += 1);
        HeapRef {
            ptr: NonNull::from(Box::leak(cell)),
        }
    }

    pub fn array(elements: Vec<Slot>) -> HeapRef {
        HeapRef::alloc(HeapData::Array(elements))
    }

    pub fn object() -> HeapRef {
        HeapRef::alloc(HeapData::Object(ObjectData::default()))
    }

    /// Take over a reference someone else already owns (a "consumed"
    /// transfer). Null yields `None`.
    ///
    /// # Safety
    /// `raw` must be null or a live handle whose reference the caller gives up.
    pub unsafe fn adopt(raw: *mut c_void) -> Option<HeapRef> {
        NonNull::new(raw as *mut HeapCell).map(|ptr| HeapRef { ptr })
    }

    /// Take a new reference to a borrowed handle. Null yields `None`.
    ///
    /// # Safety
    /// `raw` must be null or a live handle.
    pub unsafe fn retained(raw: *mut c_void) -> Option<HeapRef> {
        unsafe { retain(raw) };
        unsafe { HeapRef::adopt(raw) }
    }

    /// Give up ownership without releasing; the count moves with the pointer.
    pub fn into_raw(self) -> *mut c_void {
        let raw = self.as_raw();
        std::mem::forget(self);
        raw
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_ptr() as *mut c_void
    }

    fn cell(&self) -> &HeapCell {
        // A HeapRef keeps its cell alive.
        unsafe { self.ptr.as_ref() }
    }

    pub fn kind(&self) -> Kind {
        self.cell().kind
    }

    pub fn ref_count(&self) -> usize {
        self.cell().refs.get()
    }

    pub fn ptr_eq(&self, other: &HeapRef) -> bool {
        self.ptr == other.ptr
    }

    /// Shared access to the payload, `None` while it is mutably borrowed.
    pub fn try_data(&self) -> Option<Ref<'_, HeapData>> {
        self.cell().data.try_borrow().ok()
    }

    /// Exclusive access to the payload, `None` while it is borrowed.
    pub fn try_data_mut(&self) -> Option<RefMut<'_, HeapData>> {
        self.cell().data.try_borrow_mut().ok()
    }
}

impl Clone for HeapRef {
    fn clone(&self) -> Self {
        unsafe {
            retain(self.as_raw());
            HeapRef { ptr: self.ptr }
        }
    }
}

impl Drop for HeapRef {
    fn drop(&mut self) {
        unsafe { release(self.as_raw()) }
    }
}

impl std::fmt::Debug for HeapRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HeapRef({} {:p}, refs={})",
            self.kind(),
            self.ptr,
            self.ref_count()
        )
    }
}
