//! Keyed-map view

use std::ffi::{c_char, c_void};

use super::keys::parse_key_list;
use crate::bridge::transport::c_string;
use crate::bridge::{BridgeError, BridgeResult, Engine, Value};
use crate::runtime::alloc;
use crate::runtime::stubs as sys;
use crate::runtime::{Kind, TetherValue};

super::handle_view!(
    /// An object handle (string keys, insertion order).
    Object,
    Kind::Object
);

impl Object {
    pub fn has(&self, key: &str) -> bool {
        let (Some(h), Ok(key)) = (self.value.handle(), c_string(key)) else {
            return false;
        };
        unsafe { sys::tether_object_has(h.as_ptr(), key.as_ptr()) != 0 }
    }

    /// Property `key`; Null when missing or on an empty view.
    pub fn get(&self, key: &str) -> BridgeResult<Value> {
        let Some(h) = self.value.handle() else {
            return Ok(Value::null());
        };
        let key = c_string(key)?;
        let mut out = TetherValue::null();
        let status = unsafe { sys::tether_object_get(h.as_ptr(), key.as_ptr(), &mut out) };
        let value = unsafe { Value::from_owned_out(out) };
        if status == 0 {
            return Err(BridgeError::Rejected("object get"));
        }
        Ok(value)
    }

    /// Insert or overwrite `key` with a copy of `value`.
    pub fn set(&self, engine: &Engine, key: &str, value: &Value) -> BridgeResult<()> {
        let h = self.target()?;
        let key = c_string(key)?;
        let transport = engine.marshal(value)?;
        match unsafe { sys::tether_object_set(h, key.as_ptr(), transport.as_ptr()) } {
            0 => Err(BridgeError::Rejected("object set")),
            _ => Ok(()),
        }
    }

    /// Own keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        let Some(h) = self.value.handle() else {
            return Vec::new();
        };
        let text = unsafe { sys::tether_object_keys(h.as_ptr()) };
        let keys = unsafe { alloc::borrow_c_str(text) }
            .map(|s| parse_key_list(&s.to_string_lossy()))
            .unwrap_or_default();
        unsafe { sys::tether_free(text as *mut c_char as *mut c_void) };
        keys
    }
}
