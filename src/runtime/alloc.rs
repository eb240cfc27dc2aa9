//! Boundary allocator pair
//!
//! Strings handed across the boundary with "caller frees" ownership are
//! allocated here and must be released through `tether_free`, never through
//! the host's own allocator. Both halves go through libc so a foreign host can
//! pair them with its own C runtime if it links statically.

use std::cell::Cell;
use std::ffi::{CStr, CString, c_char, c_void};
use std::ptr;

/// Per-thread allocation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Blocks handed out by `allocate`.
    pub allocated: usize,
    /// Blocks returned through `free`.
    pub freed: usize,
}

impl AllocStats {
    const ZERO: AllocStats = AllocStats {
        allocated: 0,
        freed: 0,
    };

    /// Blocks currently outstanding.
    pub fn live(&self) -> usize {
        self.allocated.saturating_sub(self.freed)
    }

    /// Activity between `earlier` and `self`.
    pub fn since(&self, earlier: &AllocStats) -> AllocStats {
        AllocStats {
            allocated: self.allocated - earlier.allocated,
            freed: self.freed - earlier.freed,
        }
    }
}

thread_local! {
    static STATS: Cell<AllocStats> = const { Cell::new(AllocStats::ZERO) };
}

/// Snapshot of this thread's allocation counters.
pub fn stats() -> AllocStats {
    STATS.with(|s| s.get())
}

fn record(update: impl FnOnce(&mut AllocStats)) {
    STATS.with(|s| {
        let mut current = s.get();
        update(&mut current);
        s.set(current);
    });
}

/// Allocate `n` bytes. A zero-sized request still returns a unique block so
/// callers can always pair the result with `free`.
pub fn allocate(n: usize) -> *mut c_void {
    let p = unsafe { libc::malloc(n.max(1)) };
    if !p.is_null() {
        record(|s| s.allocated += 1);
    }
    p
}

/// Release a block returned by `allocate`. Null is ignored.
///
/// # Safety
/// `p` must be null or a block from `allocate` that has not been freed yet.
pub unsafe fn free(p: *mut c_void) {
    if p.is_null() {
        return;
    }
    unsafe { libc::free(p) };
    record(|s| s.freed += 1);
}

/// Text up to (not including) the first NUL; a C string cannot carry more.
fn until_nul(s: &str) -> &[u8] {
    let bytes = s.as_bytes();
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Copy `s` into a NUL-terminated block owned by the receiver, who releases
/// it with `free` / `tether_free`. Returns null if allocation fails.
pub fn alloc_c_string(s: &str) -> *mut c_char {
    let bytes = until_nul(s);
    let block = allocate(bytes.len() + 1) as *mut u8;
    if block.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), block, bytes.len());
        *block.add(bytes.len()) = 0;
    }
    block as *mut c_char
}

/// Borrowed C copy of `s` for an outgoing call.
pub fn to_c_string(s: &str) -> CString {
    CString::new(until_nul(s)).unwrap_or_default()
}

/// Borrow a NUL-terminated string from the other side of the boundary.
///
/// # Safety
/// `p` must be null or point at a NUL-terminated buffer that outlives `'a`.
pub unsafe fn borrow_c_str<'a>(p: *const c_char) -> Option<&'a CStr> {
    if p.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(p) })
    }
}
