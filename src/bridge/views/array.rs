//! Sequence view

use crate::bridge::{BridgeError, BridgeResult, Engine, Value};
use crate::runtime::stubs as sys;
use crate::runtime::{Kind, TetherValue};

super::handle_view!(
    /// An array handle.
    Array,
    Kind::Array
);

fn raw_index(i: usize) -> BridgeResult<i32> {
    i32::try_from(i).map_err(|_| BridgeError::Rejected("array index beyond i32"))
}

impl Array {
    pub fn len(&self) -> usize {
        match self.value.handle() {
            Some(h) => unsafe { sys::tether_array_length(h.as_ptr()) }.max(0) as usize,
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i`, Null past the end or on an empty view.
    pub fn get(&self, i: usize) -> BridgeResult<Value> {
        let (Some(h), Ok(index)) = (self.value.handle(), i32::try_from(i)) else {
            return Ok(Value::null());
        };
        let mut out = TetherValue::null();
        let status = unsafe { sys::tether_array_get(h.as_ptr(), index, &mut out) };
        let value = unsafe { Value::from_owned_out(out) };
        if status == 0 {
            return Err(BridgeError::Rejected("array get"));
        }
        Ok(value)
    }

    /// Store a copy of `value` at `i`, padding with Null past the end.
    pub fn set(&self, engine: &Engine, i: usize, value: &Value) -> BridgeResult<()> {
        let h = self.target()?;
        let index = raw_index(i)?;
        let transport = engine.marshal(value)?;
        match unsafe { sys::tether_array_set(h, index, transport.as_ptr()) } {
            0 => Err(BridgeError::Rejected("array set")),
            _ => Ok(()),
        }
    }

    pub fn push(&self, engine: &Engine, value: &Value) -> BridgeResult<()> {
        let h = self.target()?;
        let transport = engine.marshal(value)?;
        match unsafe { sys::tether_array_push(h, transport.as_ptr()) } {
            0 => Err(BridgeError::Rejected("array push")),
            _ => Ok(()),
        }
    }

    pub fn to_vec(&self) -> BridgeResult<Vec<Value>> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}
