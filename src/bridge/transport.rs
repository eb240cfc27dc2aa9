//! Host-side marshalling between `Value` and `TetherValue`
//!
//! Ownership is encoded in the types:
//! - `Transport<'a>` is a borrowed record; it cannot outlive the value it was
//!   made from and keeps any temporary C string alive
//! - `Transport::consume` takes the value by move for consuming calls
//! - `Value::from_transport` takes a `Claim` saying whether the record's
//!   reference is adopted or retained
//! - `Value::from_owned_out` takes over an out-parameter record
//! - `into_return` hands a value to the runtime as a callback result

use std::ffi::{CString, c_char, c_void};
use std::marker::PhantomData;

use super::error::{BridgeError, BridgeResult};
use super::value::{Claim, Value};
use crate::runtime::alloc;
use crate::runtime::stubs as sys;
use crate::runtime::{Kind, TetherValue};

/// A borrowed transport record for a `Value`.
pub struct Transport<'a> {
    raw: TetherValue,
    _text: Option<CString>,
    _value: PhantomData<&'a Value>,
}

impl<'a> Transport<'a> {
    /// Borrow `value` as a record. Handles are not retained; strings are
    /// copied into a C string owned by the transport.
    pub fn borrow(value: &'a Value) -> BridgeResult<Transport<'a>> {
        let mut text = None;
        let raw = match value.kind() {
            Kind::Null => TetherValue::null(),
            Kind::Number => TetherValue::number(value.to_number(0.0)),
            Kind::Bool => TetherValue::boolean(value.to_bool(false)),
            Kind::String => {
                let c = c_string(value.as_str().unwrap_or_default())?;
                let raw = TetherValue::string(c.as_ptr());
                text = Some(c);
                raw
            }
            kind => match value.handle() {
                Some(ptr) => TetherValue::handle(kind, ptr.as_ptr()),
                None => TetherValue::null(),
            },
        };
        Ok(Transport {
            raw,
            _text: text,
            _value: PhantomData,
        })
    }

    pub fn raw(&self) -> &TetherValue {
        &self.raw
    }

    pub fn as_ptr(&self) -> *const TetherValue {
        &self.raw
    }
}

impl Transport<'static> {
    /// Record for a consuming call. A handle's reference is detached into the
    /// record, so the call that receives it must always be made.
    pub fn consume(mut value: Value) -> BridgeResult<Transport<'static>> {
        let mut text = None;
        let raw = match value.kind() {
            Kind::Null => TetherValue::null(),
            Kind::Number => TetherValue::number(value.to_number(0.0)),
            Kind::Bool => TetherValue::boolean(value.to_bool(false)),
            Kind::String => {
                let c = c_string(value.as_str().unwrap_or_default())?;
                let raw = TetherValue::string(c.as_ptr());
                text = Some(c);
                raw
            }
            kind => match value.detach() {
                Some(ptr) => TetherValue::handle(kind, ptr.as_ptr()),
                None => TetherValue::null(),
            },
        };
        Ok(Transport {
            raw,
            _text: text,
            _value: PhantomData,
        })
    }
}

/// NUL-terminated copy of `s`; a NUL inside the text is an error.
pub fn c_string(s: &str) -> BridgeResult<CString> {
    CString::new(s).map_err(|_| BridgeError::InteriorNul(s.to_string()))
}

impl Value {
    /// Strict conversion of an incoming record. String payloads are copied.
    ///
    /// # Safety
    /// The record's payload must be valid for its kind: a NUL-terminated
    /// string or a live handle.
    pub unsafe fn from_transport(raw: &TetherValue, claim: Claim) -> BridgeResult<Value> {
        let kind = raw
            .kind()
            .ok_or(BridgeError::Malformed("unknown kind discriminant"))?;
        match kind {
            Kind::Null => Ok(Value::null()),
            Kind::Number => Ok(Value::number(raw.number)),
            Kind::Bool => Ok(Value::boolean(raw.boolean != 0)),
            Kind::String => {
                let text = unsafe { alloc::borrow_c_str(raw.string) }
                    .ok_or(BridgeError::Malformed("null string payload"))?;
                let text = text
                    .to_str()
                    .map_err(|_| BridgeError::Malformed("string payload is not UTF-8"))?;
                Ok(Value::string(text))
            }
            kind => {
                if raw.handle.is_null() {
                    return Err(BridgeError::Malformed("null handle payload"));
                }
                Ok(unsafe { Value::from_raw_handle(kind, raw.handle, claim) })
            }
        }
    }

    /// Take over an out-parameter record: the fresh reference is adopted and
    /// an allocator-owned string is copied, then freed. Malformed records give
    /// Null after releasing whatever they carried.
    ///
    /// # Safety
    /// `raw` must come from a runtime call that fills an out parameter.
    pub unsafe fn from_owned_out(raw: TetherValue) -> Value {
        let value = unsafe { Value::from_transport(&raw, Claim::Adopt) };
        if raw.kind() == Some(Kind::String) && !raw.string.is_null() {
            unsafe { sys::tether_free(raw.string as *mut c_char as *mut c_void) };
        }
        value.unwrap_or_default()
    }
}

/// Hand `value` to the runtime as a callback result: strings are allocated
/// with `tether_malloc` and handles are detached, so the runtime owns both.
pub fn into_return(mut value: Value) -> TetherValue {
    match value.kind() {
        Kind::Null => TetherValue::null(),
        Kind::Number => TetherValue::number(value.to_number(0.0)),
        Kind::Bool => TetherValue::boolean(value.to_bool(false)),
        Kind::String => {
            TetherValue::string(alloc::alloc_c_string(value.as_str().unwrap_or_default()))
        }
        kind => match value.detach() {
            Some(ptr) => TetherValue::handle(kind, ptr.as_ptr()),
            None => TetherValue::null(),
        },
    }
}
