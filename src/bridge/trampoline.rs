//! Native callback trampoline
//!
//! Every host closure reaches the runtime through `native_trampoline`. It
//! resolves the binding from the user-context pointer, converts arguments
//! and receiver into owned `Value`s, runs the closure and marshals the result
//! back. Closure errors, malformed records and panics all end here as an
//! error-marked String result; nothing unwinds into the runtime.

use std::any::Any;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use tracing::{trace, warn};

use super::engine::{Binding, Engine};
use super::error::{BridgeError, CallbackError};
use super::transport::into_return;
use super::value::{Claim, Value};
use crate::runtime::TetherValue;

/// Message used when a panic payload is not a string.
const UNKNOWN_PANIC: &str = "unknown native panic";

/// # Safety
/// Only the runtime calls this, with `userdata` from `Engine` registration
/// and `argv` / `this_val` following the callback contract.
pub unsafe extern "C" fn native_trampoline(
    argc: i32,
    argv: *const TetherValue,
    this_val: *const TetherValue,
    userdata: *mut c_void,
) -> TetherValue {
    let Some(binding) = (unsafe { (userdata as *const Binding).as_ref() }) else {
        return TetherValue::null();
    };
    let Some(inner) = binding.engine.upgrade() else {
        return TetherValue::null();
    };
    let engine = Engine::from_inner(inner);
    trace!(argc, "native callback");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Value, CallbackError> {
        let args = unsafe { collect_args(argc, argv, engine.config().max_arguments) }?;
        let this = match unsafe { this_val.as_ref() } {
            Some(raw) => unsafe { Value::from_transport(raw, Claim::Retain) }?,
            None => Value::null(),
        };
        (binding.callback)(&engine, &args, &this)
    }));

    let message = match outcome {
        Ok(Ok(value)) => return into_return(value),
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()).to_string(),
    };
    warn!(error = %message, "native callback failed");
    into_return(Value::string(format!(
        "{}{message}",
        engine.config().error_marker
    )))
}

/// Owned copies of the call's arguments; each handle is retained.
unsafe fn collect_args(
    argc: i32,
    argv: *const TetherValue,
    max_arguments: usize,
) -> Result<Vec<Value>, CallbackError> {
    let count = usize::try_from(argc)
        .map_err(|_| BridgeError::Malformed("negative argument count"))?;
    if count > max_arguments {
        return Err(BridgeError::Malformed("too many arguments").into());
    }
    if count == 0 {
        return Ok(Vec::new());
    }
    if argv.is_null() {
        return Err(BridgeError::Malformed("null argument array").into());
    }
    let raw = unsafe { std::slice::from_raw_parts(argv, count) };
    raw.iter()
        .enumerate()
        .map(|(index, v)| {
            unsafe { Value::from_transport(v, Claim::Retain) }.map_err(|e| {
                CallbackError::Argument {
                    index,
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        UNKNOWN_PANIC
    }
}
