//! Runtime-side values and their transport conversions
//!
//! A `Slot` is what the runtime stores in globals, array elements and
//! properties. Handle kinds hold an owning `HeapRef`, so a slot going out of
//! scope releases its reference.
//!
//! Conversions to and from `TetherValue` are split by ownership class:
//! - `to_borrowed`      call-scoped view (argv / receiver passed to a callback)
//! - `to_owned_out`     fresh reference / allocator-owned string for an out param
//! - `from_transport`   borrowed or consumed incoming record

use std::ffi::{CString, c_char, c_void};
use std::fmt;

use super::abi::{Kind, TetherValue};
use super::alloc;
use super::heap::{HeapData, HeapRef};

/// Deepest nesting the display form descends into.
const DISPLAY_DEPTH: usize = 32;

#[derive(Clone, Default)]
pub enum Slot {
    #[default]
    Null,
    Number(f64),
    Bool(bool),
    Str(String),
    Ref(HeapRef),
}

/// What happens to a handle payload when a record becomes a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Incoming {
    /// The sender keeps its reference; the slot takes a new one.
    Borrowed,
    /// The sender's reference moves into the slot.
    Consumed,
}

impl Slot {
    pub fn kind(&self) -> Kind {
        match self {
            Slot::Null => Kind::Null,
            Slot::Number(_) => Kind::Number,
            Slot::Bool(_) => Kind::Bool,
            Slot::Str(_) => Kind::String,
            Slot::Ref(r) => r.kind(),
        }
    }

    pub fn as_ref_of(&self, kind: Kind) -> Option<&HeapRef> {
        match self {
            Slot::Ref(r) if r.kind() == kind => Some(r),
            _ => None,
        }
    }

    /// Script truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Slot::Null => false,
            Slot::Bool(b) => *b,
            Slot::Number(n) => *n != 0.0 && !n.is_nan(),
            Slot::Str(s) => !s.is_empty(),
            Slot::Ref(_) => true,
        }
    }

    /// Numeric coercion used by arithmetic.
    pub fn to_number(&self) -> f64 {
        match self {
            Slot::Null => 0.0,
            Slot::Bool(b) => *b as u8 as f64,
            Slot::Number(n) => *n,
            Slot::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Slot::Ref(_) => f64::NAN,
        }
    }

    /// Strict equality: same kind and value, handles by identity.
    pub fn strict_eq(&self, other: &Slot) -> bool {
        match (self, other) {
            (Slot::Null, Slot::Null) => true,
            (Slot::Number(a), Slot::Number(b)) => a == b,
            (Slot::Bool(a), Slot::Bool(b)) => a == b,
            (Slot::Str(a), Slot::Str(b)) => a == b,
            (Slot::Ref(a), Slot::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    // =========================================================================
    // Transport conversions
    // =========================================================================

    /// Call-scoped view of this slot. String payloads point into `keep`,
    /// which must outlive the returned record; handles are not retained.
    pub fn to_borrowed(&self, keep: &mut Vec<CString>) -> TetherValue {
        match self {
            Slot::Null => TetherValue::null(),
            Slot::Number(n) => TetherValue::number(*n),
            Slot::Bool(b) => TetherValue::boolean(*b),
            Slot::Str(s) => {
                let c = alloc::to_c_string(s);
                let p = c.as_ptr();
                keep.push(c);
                TetherValue::string(p)
            }
            Slot::Ref(r) => TetherValue::handle(r.kind(), r.as_raw()),
        }
    }

    /// Record for an out parameter: strings are allocated with the boundary
    /// allocator and handles carry a fresh reference. The receiver owns both.
    pub fn to_owned_out(&self) -> TetherValue {
        match self {
            Slot::Str(s) => TetherValue::string(alloc::alloc_c_string(s)),
            Slot::Ref(r) => TetherValue::handle(r.kind(), r.clone().into_raw()),
            other => other.to_borrowed(&mut Vec::new()),
        }
    }

    /// Build a slot from an incoming record. Strings are always copied; the
    /// sender keeps its string. Unknown kinds and null handles become Null.
    ///
    /// # Safety
    /// `v.string` must be null or NUL-terminated when `v` is a String record,
    /// and `v.handle` must be null or live when `v` is a handle record.
    pub unsafe fn from_transport(v: &TetherValue, incoming: Incoming) -> Slot {
        match v.kind() {
            Some(Kind::Number) => Slot::Number(v.number),
            Some(Kind::Bool) => Slot::Bool(v.boolean != 0),
            Some(Kind::String) => match unsafe { alloc::borrow_c_str(v.string) } {
                Some(s) => Slot::Str(s.to_string_lossy().into_owned()),
                None => Slot::Str(String::new()),
            },
            Some(kind) if kind.is_handle() => {
                let taken = match incoming {
                    Incoming::Borrowed => unsafe { HeapRef::retained(v.handle) },
                    Incoming::Consumed => unsafe { HeapRef::adopt(v.handle) },
                };
                taken.map_or(Slot::Null, Slot::Ref)
            }
            _ => Slot::Null,
        }
    }

    /// Take ownership of a native callback's result: handles are adopted and
    /// a string payload is copied and then freed with the boundary allocator.
    ///
    /// # Safety
    /// `v` must follow the callback return contract.
    pub unsafe fn from_callback_return(v: TetherValue) -> Slot {
        let slot = unsafe { Slot::from_transport(&v, Incoming::Consumed) };
        if v.kind() == Some(Kind::String) && !v.string.is_null() {
            unsafe { alloc::free(v.string as *mut c_char as *mut c_void) };
        }
        slot
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Slot::Null => f.write_str("null"),
            Slot::Bool(b) => write!(f, "{b}"),
            Slot::Number(n) => f.write_str(&format_number(*n)),
            Slot::Str(s) => f.write_str(s),
            Slot::Ref(r) => {
                let Some(data) = r.try_data() else {
                    return f.write_str("[object]");
                };
                match &*data {
                    HeapData::Array(elements) => {
                        if depth >= DISPLAY_DEPTH {
                            return f.write_str("...");
                        }
                        for (i, e) in elements.iter().enumerate() {
                            if i > 0 {
                                f.write_str(",")?;
                            }
                            e.fmt_depth(f, depth + 1)?;
                        }
                        Ok(())
                    }
                    HeapData::Object(_) => f.write_str("[object Object]"),
                    HeapData::Function(_) => f.write_str("function () { [native code] }"),
                    HeapData::Class(class) => write!(f, "class {}", class.name),
                    HeapData::Task(_) => f.write_str("[object Task]"),
                }
            }
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_depth(f, 0)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Null => f.write_str("Null"),
            Slot::Number(n) => write!(f, "Number({n})"),
            Slot::Bool(b) => write!(f, "Bool({b})"),
            Slot::Str(s) => write!(f, "Str({s:?})"),
            Slot::Ref(r) => write!(f, "{r:?}"),
        }
    }
}

/// Script-style number text: integral values without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        // -0 displays as 0
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}
