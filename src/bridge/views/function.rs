//! Callable view

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use crate::bridge::transport::Transport;
use crate::bridge::{BridgeError, BridgeResult, Engine, Value};
use crate::runtime::stubs as sys;
use crate::runtime::{Kind, TetherValue};

super::handle_view!(
    /// A function handle, native or runtime-defined.
    Function,
    Kind::Function
);

impl Function {
    /// Give up the held reference for a consuming call; the view is empty
    /// afterwards.
    pub fn detach(&mut self) -> Option<NonNull<c_void>> {
        self.value.detach()
    }

    /// Call through the runtime. Arguments and receiver are lent for the
    /// duration of the call; pass Null for no receiver.
    pub fn call(&self, engine: &Engine, args: &[Value], this: &Value) -> BridgeResult<Value> {
        let h = self.target()?;
        let transports = args
            .iter()
            .map(|a| engine.marshal(a))
            .collect::<BridgeResult<Vec<Transport<'_>>>>()?;
        let argv: Vec<TetherValue> = transports.iter().map(|t| *t.raw()).collect();
        let argc =
            i32::try_from(argv.len()).map_err(|_| BridgeError::Rejected("argument count"))?;
        let receiver = if this.is_null() {
            None
        } else {
            Some(engine.marshal(this)?)
        };
        let this_ptr = receiver.as_ref().map_or(ptr::null(), Transport::as_ptr);

        let mut out = TetherValue::null();
        let status = unsafe {
            sys::tether_function_call(engine.raw(), h, argc, argv.as_ptr(), this_ptr, &mut out)
        };
        let result = unsafe { Value::from_owned_out(out) };
        if status == 0 {
            return Err(BridgeError::Rejected("function call"));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::CallbackError;

    #[test]
    fn test_call_with_receiver() {
        let engine = Engine::new().unwrap();
        let f = engine
            .create_function(|_, args, this| {
                let base = this.to_number(0.0);
                let sum: f64 = args.iter().map(|a| a.to_number(0.0)).sum();
                Ok(Value::number(base + sum))
            })
            .unwrap();
        let result = f
            .call(&engine, &[Value::number(1.0), Value::boolean(true)], &Value::number(10.0))
            .unwrap();
        assert_eq!(result, Value::number(12.0));
    }

    #[test]
    fn test_string_arguments_and_results() {
        let engine = Engine::new().unwrap();
        let f = engine
            .create_function(|_, args, _| {
                let s = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| CallbackError::msg("expected a string"))?;
                Ok(Value::string(s.to_uppercase()))
            })
            .unwrap();
        let result = f.call(&engine, &[Value::string("hé")], &Value::null()).unwrap();
        assert_eq!(result.as_str(), Some("HÉ"));
    }

    #[test]
    fn test_detach_empties_view() {
        let engine = Engine::new().unwrap();
        let mut f = engine.create_function(|_, _, _| Ok(Value::null())).unwrap();
        let raw = f.detach().expect("handle");
        assert!(f.is_unbound());
        assert_eq!(
            f.call(&engine, &[], &Value::null()),
            Err(BridgeError::NullHandle(Kind::Function))
        );
        unsafe { sys::tether_handle_release(raw.as_ptr()) };
    }
}
