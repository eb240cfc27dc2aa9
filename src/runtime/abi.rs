//! Tagged value transport for the embedding boundary
//!
//! Every value crossing the boundary travels by value as a `TetherValue`:
//! a fixed-layout record with a kind discriminant and one payload field per
//! representation. Only the field matching the discriminant is meaningful.
//!
//! Layout (64-bit targets):
//! - `kind`     offset 0   (i32, see `Kind`)
//! - `number`   offset 8   (f64)
//! - `boolean`  offset 16  (i32, 0/1)
//! - `string`   offset 24  (NUL-terminated UTF-8, ownership per call)
//! - `handle`   offset 32  (opaque refcounted heap object)
//!
//! The record is 8-byte aligned so both sides of the boundary agree on its
//! layout regardless of which compiler produced them.

use std::ffi::{c_char, c_void};
use std::ptr;

/// Kind discriminant carried in `TetherValue::kind`.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Null = 0,
    Number = 1,
    Bool = 2,
    String = 3,
    Array = 4,
    Object = 5,
    Function = 6,
    Class = 7,
    Task = 8,
}

impl Kind {
    /// Decode a raw discriminant. Unknown values yield `None`; the raw field
    /// comes from foreign code and is never transmuted.
    pub fn from_raw(raw: i32) -> Option<Kind> {
        Some(match raw {
            0 => Kind::Null,
            1 => Kind::Number,
            2 => Kind::Bool,
            3 => Kind::String,
            4 => Kind::Array,
            5 => Kind::Object,
            6 => Kind::Function,
            7 => Kind::Class,
            8 => Kind::Task,
            _ => return None,
        })
    }

    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// True for the kinds whose payload is a heap handle.
    #[inline]
    pub const fn is_handle(self) -> bool {
        matches!(
            self,
            Kind::Array | Kind::Object | Kind::Function | Kind::Class | Kind::Task
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Number => "number",
            Kind::Bool => "bool",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Function => "function",
            Kind::Class => "class",
            Kind::Task => "task",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A value in transport form.
///
/// Plain data: copying a `TetherValue` never touches reference counts or
/// string ownership. Who owns the `string` / `handle` payload is decided by
/// the operation it is passed to, not by the record.
#[repr(C, align(8))]
#[derive(Clone, Copy, Debug)]
pub struct TetherValue {
    pub kind: i32,
    pub number: f64,
    pub boolean: i32,
    pub string: *const c_char,
    pub handle: *mut c_void,
}

impl TetherValue {
    // =========================================================================
    // Constructors
    // =========================================================================

    #[inline]
    pub const fn null() -> Self {
        Self {
            kind: Kind::Null as i32,
            number: 0.0,
            boolean: 0,
            string: ptr::null(),
            handle: ptr::null_mut(),
        }
    }

    #[inline]
    pub const fn number(n: f64) -> Self {
        Self {
            kind: Kind::Number as i32,
            number: n,
            ..Self::null()
        }
    }

    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self {
            kind: Kind::Bool as i32,
            boolean: b as i32,
            ..Self::null()
        }
    }

    /// String record pointing at `s`. The pointer's ownership is defined by
    /// the call that receives the record.
    #[inline]
    pub const fn string(s: *const c_char) -> Self {
        Self {
            kind: Kind::String as i32,
            string: s,
            ..Self::null()
        }
    }

    /// Handle record. `kind` must be a handle kind.
    #[inline]
    pub fn handle(kind: Kind, h: *mut c_void) -> Self {
        debug_assert!(kind.is_handle(), "handle record with {kind} kind");
        Self {
            kind: kind as i32,
            handle: h,
            ..Self::null()
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Decoded kind, or `None` for a discriminant this side does not know.
    #[inline]
    pub fn kind(&self) -> Option<Kind> {
        Kind::from_raw(self.kind)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.kind == Kind::Null as i32
    }
}

impl Default for TetherValue {
    fn default() -> Self {
        Self::null()
    }
}

/// Signature of a native function the runtime can call.
///
/// `argv` points at `argc` records the runtime keeps ownership of; `this_val`
/// is null when the call has no receiver. `userdata` is the pointer given at
/// registration. A String result must be allocated with `tether_malloc` (the
/// runtime frees it); a handle result transfers one reference to the runtime.
pub type NativeCallback = unsafe extern "C" fn(
    argc: i32,
    argv: *const TetherValue,
    this_val: *const TetherValue,
    userdata: *mut c_void,
) -> TetherValue;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for raw in 0..=8 {
            let kind = Kind::from_raw(raw).expect("known kind");
            assert_eq!(kind.as_raw(), raw);
        }
        assert_eq!(Kind::from_raw(9), None);
        assert_eq!(Kind::from_raw(-1), None);
    }

    #[test]
    fn test_handle_kinds() {
        let handles: Vec<Kind> = (0..=8)
            .filter_map(Kind::from_raw)
            .filter(|k| k.is_handle())
            .collect();
        assert_eq!(
            handles,
            vec![Kind::Array, Kind::Object, Kind::Function, Kind::Class, Kind::Task]
        );
    }

    #[test]
    fn test_constructors() {
        let n = TetherValue::number(3.5);
        assert_eq!(n.kind(), Some(Kind::Number));
        assert_eq!(n.number, 3.5);

        let b = TetherValue::boolean(true);
        assert_eq!(b.kind(), Some(Kind::Bool));
        assert_eq!(b.boolean, 1);

        let null = TetherValue::default();
        assert!(null.is_null());
        assert!(null.string.is_null());
        assert!(null.handle.is_null());
    }
}
