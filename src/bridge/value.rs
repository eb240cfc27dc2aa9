//! RAII value wrapper
//!
//! A `Value` owns exactly one reference when it holds a handle kind:
//! - `Clone` retains
//! - a Rust move transfers without touching the count
//! - `Drop` releases once
//!
//! `detach` hands the reference to a consuming boundary call instead of
//! releasing it.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::runtime::Kind;
use crate::runtime::stubs as sys;

/// How `Value::from_raw_handle` takes a raw handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Claim {
    /// The caller's reference moves into the value.
    Adopt,
    /// The value takes a reference of its own.
    Retain,
}

#[derive(Default)]
enum Repr {
    #[default]
    Null,
    Number(f64),
    Bool(bool),
    String(String),
    Handle(Kind, NonNull<c_void>),
}

/// A host-side value. Handle kinds hold a counted reference into the
/// runtime heap and must not outlive the engine they came from.
#[derive(Default)]
pub struct Value {
    repr: Repr,
}

impl Value {
    pub const fn null() -> Self {
        Value { repr: Repr::Null }
    }

    pub const fn number(n: f64) -> Self {
        Value {
            repr: Repr::Number(n),
        }
    }

    pub const fn boolean(b: bool) -> Self {
        Value { repr: Repr::Bool(b) }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value {
            repr: Repr::String(s.into()),
        }
    }

    /// Wrap a raw handle. Null pointers and non-handle kinds give Null.
    ///
    /// # Safety
    /// `ptr` must be null or a live handle of kind `kind`; with
    /// `Claim::Adopt` the caller must own the reference it gives up.
    pub unsafe fn from_raw_handle(kind: Kind, ptr: *mut c_void, claim: Claim) -> Self {
        let Some(ptr) = NonNull::new(ptr).filter(|_| kind.is_handle()) else {
            return Value::null();
        };
        if claim == Claim::Retain {
            unsafe { sys::tether_handle_retain(ptr.as_ptr()) };
        }
        Value {
            repr: Repr::Handle(kind, ptr),
        }
    }

    pub fn kind(&self) -> Kind {
        match &self.repr {
            Repr::Null => Kind::Null,
            Repr::Number(_) => Kind::Number,
            Repr::Bool(_) => Kind::Bool,
            Repr::String(_) => Kind::String,
            Repr::Handle(kind, _) => *kind,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.repr, Repr::Null)
    }

    pub fn is_handle_kind(&self) -> bool {
        matches!(self.repr, Repr::Handle(..))
    }

    /// Raw handle, still owned by this value.
    pub fn handle(&self) -> Option<NonNull<c_void>> {
        match self.repr {
            Repr::Handle(_, ptr) => Some(ptr),
            _ => None,
        }
    }

    /// Number as-is, Bool as 1/0, anything else `default`.
    pub fn to_number(&self, default: f64) -> f64 {
        match self.repr {
            Repr::Number(n) => n,
            Repr::Bool(b) => b as u8 as f64,
            _ => default,
        }
    }

    /// Bool as-is, Number as nonzero, anything else `default`.
    pub fn to_bool(&self, default: bool) -> bool {
        match self.repr {
            Repr::Bool(b) => b,
            Repr::Number(n) => n != 0.0,
            _ => default,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.repr {
            Repr::String(s) => Some(s),
            _ => None,
        }
    }

    /// Move out, leaving Null behind.
    pub fn take(&mut self) -> Value {
        std::mem::take(self)
    }

    /// Give up the held reference without releasing it and reset to Null.
    /// Returns `None` (and leaves the value alone) for non-handle kinds.
    pub fn detach(&mut self) -> Option<NonNull<c_void>> {
        let Repr::Handle(_, ptr) = self.repr else {
            return None;
        };
        self.repr = Repr::Null;
        Some(ptr)
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        let repr = match &self.repr {
            Repr::Null => Repr::Null,
            Repr::Number(n) => Repr::Number(*n),
            Repr::Bool(b) => Repr::Bool(*b),
            Repr::String(s) => Repr::String(s.clone()),
            Repr::Handle(kind, ptr) => {
                unsafe { sys::tether_handle_retain(ptr.as_ptr()) };
                Repr::Handle(*kind, *ptr)
            }
        };
        Value { repr }
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        if let Repr::Handle(_, ptr) = self.repr {
            unsafe { sys::tether_handle_release(ptr.as_ptr()) };
        }
    }
}

/// Primitives compare by value, handles by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Null, Repr::Null) => true,
            (Repr::Number(a), Repr::Number(b)) => a == b,
            (Repr::Bool(a), Repr::Bool(b)) => a == b,
            (Repr::String(a), Repr::String(b)) => a == b,
            (Repr::Handle(ka, a), Repr::Handle(kb, b)) => ka == kb && a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Null => f.write_str("Null"),
            Repr::Number(n) => write!(f, "Number({n})"),
            Repr::Bool(b) => write!(f, "Bool({b})"),
            Repr::String(s) => write!(f, "String({s:?})"),
            Repr::Handle(kind, ptr) => write!(f, "Handle({kind} {ptr:p})"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::heap;

    fn new_object() -> Value {
        unsafe { Value::from_raw_handle(Kind::Object, sys::tether_object_create(), Claim::Adopt) }
    }

    #[test]
    fn test_coercions() {
        assert_eq!(Value::boolean(true).to_number(-1.0), 1.0);
        assert_eq!(Value::string("3").to_number(-1.0), -1.0);
        assert!(Value::number(0.5).to_bool(false));
        assert!(!Value::number(0.0).to_bool(true));
        assert!(Value::null().to_bool(true));
        assert_eq!(Value::from("hé").as_str(), Some("hé"));
        assert_eq!(Value::number(1.0).as_str(), None);
    }

    #[test]
    fn test_clone_retains_and_drop_releases() {
        let before = heap::stats();
        {
            let a = new_object();
            let b = a.clone();
            assert_eq!(a, b);
            assert_eq!(heap::stats().since(&before).retains, 1);
        }
        let delta = heap::stats().since(&before);
        assert_eq!(delta.releases, 2);
        assert!(delta.is_balanced());
    }

    #[test]
    fn test_take_and_move_do_not_touch_count() {
        let before = heap::stats();
        let mut a = new_object();
        let b = a.take();
        assert!(a.is_null());
        let c = b;
        assert_eq!(heap::stats().since(&before).retains, 0);
        drop(c);
        assert!(heap::stats().since(&before).is_balanced());
    }

    #[test]
    fn test_detach_leaves_null_without_release() {
        let before = heap::stats();
        let mut v = new_object();
        let raw = v.detach().expect("handle");
        assert!(v.is_null());
        drop(v);
        assert_eq!(heap::stats().since(&before).releases, 0);
        unsafe { sys::tether_handle_release(raw.as_ptr()) };
        assert!(heap::stats().since(&before).is_balanced());

        let mut n = Value::number(2.0);
        assert!(n.detach().is_none());
        assert_eq!(n, Value::number(2.0));
    }

    #[test]
    fn test_raw_handle_edge_cases() {
        let v = unsafe { Value::from_raw_handle(Kind::Array, std::ptr::null_mut(), Claim::Retain) };
        assert!(v.is_null());
        let raw = sys::tether_array_create();
        let not_handle = unsafe { Value::from_raw_handle(Kind::Number, raw, Claim::Retain) };
        assert!(not_handle.is_null());
        unsafe { sys::tether_handle_release(raw) };
    }

    #[test]
    fn test_identity_equality() {
        assert_ne!(new_object(), new_object());
        assert_ne!(Value::number(1.0), Value::boolean(true));
    }
}
