//! Engine: owner of one runtime instance and every host binding
//!
//! Bindings are only ever added. They are released together when the
//! engine drops, after the runtime has been destroyed, so a callback can
//! never be reached once its closure is gone.

use std::cell::RefCell;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::config::EngineConfig;
use super::error::{BridgeError, BridgeResult, CallbackError};
use super::trampoline::native_trampoline;
use super::transport::{Transport, c_string};
use super::value::{Claim, Value};
use super::views::{Array, Class, Function, Object};
use crate::runtime::alloc;
use crate::runtime::stubs as sys;
use crate::runtime::{Kind, TetherValue};

/// Signature of a host closure callable from scripts: engine, arguments,
/// receiver (Null without one).
pub type HostFn = dyn Fn(&Engine, &[Value], &Value) -> Result<Value, CallbackError>;

/// One registered closure. Its address is the user-context pointer the
/// runtime passes back to the trampoline.
pub(crate) struct Binding {
    pub(crate) engine: Weak<Inner>,
    pub(crate) callback: Box<HostFn>,
}

pub(crate) struct Inner {
    it: NonNull<c_void>,
    bindings: RefCell<Vec<Rc<Binding>>>,
    config: EngineConfig,
}

impl Drop for Inner {
    fn drop(&mut self) {
        unsafe { sys::tether_destroy(self.it.as_ptr()) };
        let released = self.bindings.get_mut().len();
        self.bindings.get_mut().clear();
        debug!(bindings = released, "engine dropped");
    }
}

/// An embedded runtime plus the closures registered with it.
///
/// Single-threaded: `Engine`, `Value` and the views are neither `Send` nor
/// `Sync`. No value or view may outlive the engine it came from.
pub struct Engine {
    inner: Rc<Inner>,
}

impl Engine {
    pub fn new() -> BridgeResult<Engine> {
        Engine::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> BridgeResult<Engine> {
        let it = NonNull::new(sys::tether_create()).ok_or(BridgeError::RuntimeUnavailable)?;
        debug!(?config, "engine created");
        Ok(Engine {
            inner: Rc::new(Inner {
                it,
                bindings: RefCell::new(Vec::new()),
                config,
            }),
        })
    }

    pub(crate) fn from_inner(inner: Rc<Inner>) -> Engine {
        Engine { inner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Opaque runtime pointer for direct boundary calls.
    pub fn raw(&self) -> *mut c_void {
        self.inner.it.as_ptr()
    }

    pub fn binding_count(&self) -> usize {
        self.inner.bindings.borrow().len()
    }

    /// Execute `code` and return the display form of its last value. Script
    /// failures come back as text starting with `"Error: "`.
    pub fn run(&self, code: &str) -> BridgeResult<String> {
        let code = c_string(code)?;
        let out = unsafe { sys::tether_run(self.raw(), code.as_ptr()) };
        let text = unsafe { alloc::borrow_c_str(out) }
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or(BridgeError::RuntimeUnavailable)?;
        unsafe { sys::tether_free(out as *mut c_void) };
        Ok(text)
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Store `callback` and return its user-context pointer.
    pub(crate) fn bind<F>(&self, callback: F) -> *mut c_void
    where
        F: Fn(&Engine, &[Value], &Value) -> Result<Value, CallbackError> + 'static,
    {
        let binding = Rc::new(Binding {
            engine: Rc::downgrade(&self.inner),
            callback: Box::new(callback),
        });
        let userdata = Rc::as_ptr(&binding) as *mut c_void;
        self.inner.bindings.borrow_mut().push(binding);
        userdata
    }

    /// Expose `callback` to scripts as the global function `name`.
    pub fn register_function<F>(&self, name: &str, callback: F) -> BridgeResult<()>
    where
        F: Fn(&Engine, &[Value], &Value) -> Result<Value, CallbackError> + 'static,
    {
        if name.is_empty() {
            return Err(BridgeError::EmptyName);
        }
        let c_name = c_string(name)?;
        let userdata = self.bind(callback);
        let status = unsafe {
            sys::tether_register(self.raw(), c_name.as_ptr(), Some(native_trampoline), userdata)
        };
        if status == 0 {
            return Err(BridgeError::Rejected("register"));
        }
        debug!(name, bindings = self.binding_count(), "function registered");
        Ok(())
    }

    /// A standalone function value backed by `callback`.
    pub fn create_function<F>(&self, callback: F) -> BridgeResult<Function>
    where
        F: Fn(&Engine, &[Value], &Value) -> Result<Value, CallbackError> + 'static,
    {
        let userdata = self.bind(callback);
        let raw = sys::tether_function_create_native(Some(native_trampoline), userdata);
        unsafe { adopt(Kind::Function, raw) }
    }

    // =========================================================================
    // Factories
    // =========================================================================

    pub fn create_class(&self, name: &str) -> BridgeResult<Class> {
        let c_name = c_string(name)?;
        let raw = unsafe { sys::tether_class_create(self.raw(), c_name.as_ptr()) };
        unsafe { adopt(Kind::Class, raw) }
    }

    pub fn create_object(&self) -> BridgeResult<Object> {
        unsafe { adopt(Kind::Object, sys::tether_object_create()) }
    }

    pub fn create_array(&self) -> BridgeResult<Array> {
        unsafe { adopt(Kind::Array, sys::tether_array_create()) }
    }

    /// A settled task holding `value`.
    pub fn create_task(&self, value: &Value) -> BridgeResult<Value> {
        let transport = self.marshal(value)?;
        let raw = unsafe { sys::tether_task_create_resolved(transport.as_ptr()) };
        Ok(unsafe { Value::from_raw_handle(Kind::Task, raw, Claim::Adopt) })
    }

    /// The value a settled task holds; Null for anything else.
    pub fn task_result(&self, task: &Value) -> Value {
        let Some(handle) = task.handle().filter(|_| task.kind() == Kind::Task) else {
            return Value::null();
        };
        let mut out = TetherValue::null();
        unsafe { sys::tether_task_result(handle.as_ptr(), &mut out) };
        unsafe { Value::from_owned_out(out) }
    }

    // =========================================================================
    // Globals
    // =========================================================================

    /// Bind a copy of `value` to a global; the caller keeps `value`.
    pub fn declare_copy(&self, name: &str, value: &Value) -> BridgeResult<()> {
        self.declare_move(name, value.clone())
    }

    /// Move `value` into a global.
    pub fn declare_move(&self, name: &str, value: Value) -> BridgeResult<()> {
        let c_name = c_string(name)?;
        let kind = value.kind();
        let transport = Transport::consume(value)?;
        let status =
            unsafe { sys::tether_global_declare(self.raw(), c_name.as_ptr(), transport.as_ptr()) };
        if status == 0 {
            return Err(BridgeError::Rejected("declare"));
        }
        debug!(name, %kind, "global declared");
        Ok(())
    }

    /// Borrowed transport record for `value`, valid while the returned
    /// transport lives.
    pub fn marshal<'a>(&self, value: &'a Value) -> BridgeResult<Transport<'a>> {
        Transport::borrow(value)
    }
}

/// Take the creation reference of a fresh factory result. A null handle
/// means the runtime could not build it.
///
/// # Safety
/// `raw` must be null or a live handle of `kind` whose reference the caller
/// owns.
unsafe fn adopt<V>(kind: Kind, raw: *mut c_void) -> BridgeResult<V>
where
    V: TryFrom<Value, Error = BridgeError>,
{
    if raw.is_null() {
        return Err(BridgeError::RuntimeUnavailable);
    }
    V::try_from(unsafe { Value::from_raw_handle(kind, raw, Claim::Adopt) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::heap;

    #[test]
    fn test_run_and_register() {
        let engine = Engine::new().unwrap();
        engine
            .register_function("twice", |_, args, _| {
                Ok(Value::number(args.first().map_or(0.0, |a| a.to_number(0.0)) * 2.0))
            })
            .unwrap();
        assert_eq!(engine.run("twice(21)").unwrap(), "42");
        assert_eq!(engine.binding_count(), 1);
        assert_eq!(
            engine.register_function("", |_, _, _| Ok(Value::null())),
            Err(BridgeError::EmptyName)
        );
        assert_eq!(engine.binding_count(), 1);
    }

    #[test]
    fn test_null_factory_result_is_unavailable() {
        let object: BridgeResult<Object> = unsafe { adopt(Kind::Object, std::ptr::null_mut()) };
        assert_eq!(object, Err(BridgeError::RuntimeUnavailable));
        let array: BridgeResult<Array> = unsafe { adopt(Kind::Array, std::ptr::null_mut()) };
        assert_eq!(array, Err(BridgeError::RuntimeUnavailable));

        let engine = Engine::new().unwrap();
        assert!(!engine.create_object().unwrap().is_unbound());
        assert!(!engine.create_array().unwrap().is_unbound());
    }

    #[test]
    fn test_declare_copy_and_move() {
        let engine = Engine::new().unwrap();
        let text = Value::string("hé");
        engine.declare_copy("greeting", &text).unwrap();
        assert_eq!(text.as_str(), Some("hé"));
        assert_eq!(engine.run("greeting").unwrap(), "hé");

        let arr = engine.create_array().unwrap();
        arr.push(&engine, &Value::number(1.0)).unwrap();
        let value = arr.into_value();
        engine.declare_copy("a", &value).unwrap();
        engine.declare_move("b", value).unwrap();
        assert_eq!(engine.run("a === b").unwrap(), "true");
    }

    #[test]
    fn test_teardown_releases_everything() {
        let before = heap::stats();
        {
            let engine = Engine::new().unwrap();
            let obj = engine.create_object().unwrap();
            obj.set(&engine, "n", &Value::number(1.0)).unwrap();
            engine.declare_move("o", obj.into_value()).unwrap();
            engine
                .register_function("f", |_, _, _| Ok(Value::null()))
                .unwrap();
            assert_eq!(engine.run("o.n").unwrap(), "1");
        }
        assert!(heap::stats().since(&before).is_balanced());
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let engine = Engine::new().unwrap();
        assert!(matches!(
            engine.run("1\0"),
            Err(BridgeError::InteriorNul(_))
        ));
        assert!(matches!(
            engine.declare_move("x\0", Value::null()),
            Err(BridgeError::InteriorNul(_))
        ));
    }

    #[test]
    fn test_tasks() {
        let engine = Engine::new().unwrap();
        let task = engine.create_task(&Value::string("ready")).unwrap();
        assert_eq!(task.kind(), Kind::Task);
        assert_eq!(engine.task_result(&task).as_str(), Some("ready"));
        assert!(engine.task_result(&Value::number(1.0)).is_null());
    }
}
