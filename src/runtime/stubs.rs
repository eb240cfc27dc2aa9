//! Boundary surface callable from any host
//!
//! These extern "C" functions are the only way a host reaches the runtime.
//! Every one of them is null-safe and reports failure through its return
//! value; nothing unwinds out of this module.
//!
//! The calling convention is:
//! - Values cross as `TetherValue` records, passed by pointer
//! - Handles are opaque `*mut c_void`, counted with retain/release
//! - Status results are `i32`: 1 on success, 0 on failure
//! - Strings returned from here are allocated with `tether_malloc`; the
//!   caller releases them with `tether_free`
//!
//! The ownership class of each parameter is noted on the function.

use std::borrow::Cow;
use std::ffi::{c_char, c_void};
use std::mem::ManuallyDrop;
use std::ptr;

use tracing::{debug, warn};

use super::abi::{Kind, NativeCallback, TetherValue};
use super::abi_version::ABI_VERSION;
use super::alloc;
use super::heap::{self, ClassData, HeapData, HeapRef, NativeFunction, TaskData};
use super::interp::{self, CONSTRUCTOR, Interpreter};
use super::slot::{Incoming, Slot};

const OK: i32 = 1;
const FAIL: i32 = 0;

// =========================================================================
// Helpers
// =========================================================================

unsafe fn runtime<'a>(it: *mut c_void) -> Option<&'a Interpreter> {
    unsafe { (it as *const Interpreter).as_ref() }
}

unsafe fn text<'a>(p: *const c_char) -> Option<Cow<'a, str>> {
    unsafe { alloc::borrow_c_str(p) }.map(|s| s.to_string_lossy())
}

/// Look at a borrowed handle without touching its count.
unsafe fn borrow_handle(
    raw: *mut c_void,
    kind: Kind,
    op: &'static str,
) -> Option<ManuallyDrop<HeapRef>> {
    let Some(handle) = (unsafe { HeapRef::adopt(raw) }).map(ManuallyDrop::new) else {
        warn!(op, "null handle");
        return None;
    };
    if handle.kind() != kind {
        warn!(op, expected = %kind, found = %handle.kind(), "handle kind mismatch");
        return None;
    }
    Some(handle)
}

unsafe fn incoming(v: *const TetherValue, mode: Incoming) -> Option<Slot> {
    unsafe { v.as_ref() }.map(|v| unsafe { Slot::from_transport(v, mode) })
}

unsafe fn write_out(out: *mut TetherValue, value: TetherValue) {
    if !out.is_null() {
        unsafe { out.write(value) };
    }
}

fn index_of(i: i32) -> Option<usize> {
    usize::try_from(i).ok()
}

// =========================================================================
// Version / Allocator
// =========================================================================

#[unsafe(no_mangle)]
pub extern "C" fn tether_abi_version() -> u32 {
    ABI_VERSION
}

/// Allocate `n` bytes with the boundary allocator.
#[unsafe(no_mangle)]
pub extern "C" fn tether_malloc(n: usize) -> *mut c_void {
    alloc::allocate(n)
}

/// Release a block from `tether_malloc`, including every string returned by
/// this module. Null is ignored.
///
/// # Safety
/// `p` must be null or an unfreed block from `tether_malloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_free(p: *mut c_void) {
    unsafe { alloc::free(p) }
}

// =========================================================================
// Lifecycle
// =========================================================================

/// Create a runtime instance.
#[unsafe(no_mangle)]
pub extern "C" fn tether_create() -> *mut c_void {
    let it = Box::into_raw(Box::new(Interpreter::new())) as *mut c_void;
    debug!(?it, "runtime created");
    it
}

/// Destroy a runtime instance, releasing its globals.
///
/// # Safety
/// `it` must be null or a live runtime from `tether_create`; it is invalid
/// afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_destroy(it: *mut c_void) {
    if it.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(it as *mut Interpreter) });
    debug!(?it, "runtime destroyed");
}

/// Run source text and return the display form of the last evaluated value.
/// Script failures come back as `"Error: <message>"`. Caller frees the result.
/// Returns null only when `it` or `code` is null.
///
/// # Safety
/// `it` must be null or live; `code` must be null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_run(it: *mut c_void, code: *const c_char) -> *mut c_char {
    let (Some(interp), Some(source)) = (unsafe { runtime(it) }, unsafe { text(code) }) else {
        warn!("tether_run called with a null runtime or source");
        return ptr::null_mut();
    };
    let display = match interp.run(&source) {
        Ok(value) => value.to_string(),
        Err(e) => {
            debug!(error = %e, "script failed");
            format!("{}{e}", interp::ERROR_PREFIX)
        }
    };
    alloc::alloc_c_string(&display)
}

// =========================================================================
// Registration / Globals
// =========================================================================

/// Create a native function handle. `userdata` is borrowed for the runtime's
/// lifetime. Returns a fresh reference, or null without a callback.
#[unsafe(no_mangle)]
pub extern "C" fn tether_function_create_native(
    cb: Option<NativeCallback>,
    userdata: *mut c_void,
) -> *mut c_void {
    let Some(callback) = cb else {
        warn!("tether_function_create_native called without a callback");
        return ptr::null_mut();
    };
    HeapRef::alloc(HeapData::Function(NativeFunction { callback, userdata })).into_raw()
}

/// Bind a native function to a global name.
///
/// # Safety
/// `it` must be null or live; `name` must be null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_register(
    it: *mut c_void,
    name: *const c_char,
    cb: Option<NativeCallback>,
    userdata: *mut c_void,
) -> i32 {
    let (Some(interp), Some(name)) = (unsafe { runtime(it) }, unsafe { text(name) }) else {
        return FAIL;
    };
    let func = tether_function_create_native(cb, userdata);
    match unsafe { HeapRef::adopt(func) } {
        Some(func) => {
            interp.declare(&name, Slot::Ref(func));
            debug!(%name, "native function registered");
            OK
        }
        None => FAIL,
    }
}

/// Bind `*v` to a global name. Handle kinds are consumed (also on failure);
/// strings are copied.
///
/// # Safety
/// `it` must be null or live; `name` null or NUL-terminated; `v` null or a
/// valid record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_global_declare(
    it: *mut c_void,
    name: *const c_char,
    v: *const TetherValue,
) -> i32 {
    let Some(value) = (unsafe { incoming(v, Incoming::Consumed) }) else {
        return FAIL;
    };
    let (Some(interp), Some(name)) = (unsafe { runtime(it) }, unsafe { text(name) }) else {
        return FAIL;
    };
    debug!(%name, kind = %value.kind(), "global declared");
    interp.declare(&name, value);
    OK
}

// =========================================================================
// Classes
// =========================================================================

/// Create an empty class descriptor. Returns a fresh reference.
///
/// # Safety
/// `it` must be null or live; `name` null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_class_create(it: *mut c_void, name: *const c_char) -> *mut c_void {
    let (Some(_), Some(name)) = (unsafe { runtime(it) }, unsafe { text(name) }) else {
        return ptr::null_mut();
    };
    HeapRef::alloc(HeapData::Class(ClassData {
        name: name.into_owned(),
        methods: Vec::new(),
    }))
    .into_raw()
}

/// Add an instance method; `"constructor"` names the constructor. `func` is
/// consumed in every case, including failure.
///
/// # Safety
/// `class` and `func` must be null or live handles; `name` null or
/// NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_class_add_method(
    class: *mut c_void,
    name: *const c_char,
    func: *mut c_void,
) -> i32 {
    let Some(func) = (unsafe { HeapRef::adopt(func) }) else {
        return FAIL;
    };
    if func.kind() != Kind::Function {
        warn!(found = %func.kind(), "class method is not a function");
        return FAIL;
    }
    let Some(name) = (unsafe { text(name) }) else {
        return FAIL;
    };
    let Some(class) = (unsafe { borrow_handle(class, Kind::Class, "tether_class_add_method") })
    else {
        return FAIL;
    };
    let Some(mut data) = class.try_data_mut() else {
        return FAIL;
    };
    let HeapData::Class(class_data) = &mut *data else {
        return FAIL;
    };
    let is_constructor = name == CONSTRUCTOR;
    let method = Slot::Ref(func);
    let previous = match class_data.methods.iter_mut().find(|(k, _)| *k == name) {
        Some((_, slot)) => Some(std::mem::replace(slot, method)),
        None => {
            class_data.methods.push((name.into_owned(), method));
            None
        }
    };
    if is_constructor {
        debug!(class = %class_data.name, "constructor installed");
    }
    drop(data);
    drop(previous);
    OK
}

// =========================================================================
// Arrays
// =========================================================================

/// Create an empty array. Returns a fresh reference.
#[unsafe(no_mangle)]
pub extern "C" fn tether_array_create() -> *mut c_void {
    HeapRef::array(Vec::new()).into_raw()
}

/// Element count; 0 for anything but a live array.
///
/// # Safety
/// `h` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_array_length(h: *mut c_void) -> i32 {
    let Some(arr) = (unsafe { borrow_handle(h, Kind::Array, "tether_array_length") }) else {
        return 0;
    };
    match arr.try_data().as_deref() {
        Some(HeapData::Array(elements)) => i32::try_from(elements.len()).unwrap_or(i32::MAX),
        _ => 0,
    }
}

/// Read element `i` into `*out` (fresh reference / allocator-owned string,
/// caller frees). Out-of-range reads give Null.
///
/// # Safety
/// `h` must be null or live; `out` null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_array_get(h: *mut c_void, i: i32, out: *mut TetherValue) -> i32 {
    unsafe { write_out(out, TetherValue::null()) };
    let Some(arr) = (unsafe { borrow_handle(h, Kind::Array, "tether_array_get") }) else {
        return FAIL;
    };
    let element = match arr.try_data().as_deref() {
        Some(HeapData::Array(elements)) => index_of(i).and_then(|i| elements.get(i).cloned()),
        _ => return FAIL,
    };
    if let Some(element) = element {
        unsafe { write_out(out, element.to_owned_out()) };
    }
    OK
}

/// Store `*v` at `i`, padding with Null past the end. `v` is borrowed.
/// Negative indices and writes too far past the end fail.
///
/// # Safety
/// `h` must be null or live; `v` null or a valid record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_array_set(h: *mut c_void, i: i32, v: *const TetherValue) -> i32 {
    let Some(index) = index_of(i) else {
        return FAIL;
    };
    let Some(arr) = (unsafe { borrow_handle(h, Kind::Array, "tether_array_set") }) else {
        return FAIL;
    };
    let Some(value) = (unsafe { incoming(v, Incoming::Borrowed) }) else {
        return FAIL;
    };
    let Some(mut data) = arr.try_data_mut() else {
        return FAIL;
    };
    let HeapData::Array(elements) = &mut *data else {
        return FAIL;
    };
    let stored = interp::store_element(elements, index, value);
    drop(data);
    match stored {
        Ok(previous) => {
            drop(previous);
            OK
        }
        Err(e) => {
            warn!(error = %e, "tether_array_set rejected");
            FAIL
        }
    }
}

/// Append `*v`. `v` is borrowed.
///
/// # Safety
/// `h` must be null or live; `v` null or a valid record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_array_push(h: *mut c_void, v: *const TetherValue) -> i32 {
    let Some(arr) = (unsafe { borrow_handle(h, Kind::Array, "tether_array_push") }) else {
        return FAIL;
    };
    let Some(value) = (unsafe { incoming(v, Incoming::Borrowed) }) else {
        return FAIL;
    };
    match arr.try_data_mut().as_deref_mut() {
        Some(HeapData::Array(elements)) => {
            elements.push(value);
            OK
        }
        _ => FAIL,
    }
}

// =========================================================================
// Objects
// =========================================================================

/// Create an empty object. Returns a fresh reference.
#[unsafe(no_mangle)]
pub extern "C" fn tether_object_create() -> *mut c_void {
    HeapRef::object().into_raw()
}

/// # Safety
/// `h` must be null or live; `key` null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_object_has(h: *mut c_void, key: *const c_char) -> i32 {
    let (Some(obj), Some(key)) = (
        unsafe { borrow_handle(h, Kind::Object, "tether_object_has") },
        unsafe { text(key) },
    ) else {
        return 0;
    };
    match obj.try_data().as_deref() {
        Some(HeapData::Object(data)) if data.has(&key) => 1,
        _ => 0,
    }
}

/// Read property `key` into `*out` (fresh reference / allocator-owned
/// string, caller frees). Missing keys give Null.
///
/// # Safety
/// `h` must be null or live; `key` null or NUL-terminated; `out` null or
/// writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_object_get(
    h: *mut c_void,
    key: *const c_char,
    out: *mut TetherValue,
) -> i32 {
    unsafe { write_out(out, TetherValue::null()) };
    let (Some(obj), Some(key)) = (
        unsafe { borrow_handle(h, Kind::Object, "tether_object_get") },
        unsafe { text(key) },
    ) else {
        return FAIL;
    };
    let value = match obj.try_data().as_deref() {
        Some(HeapData::Object(data)) => data.get(&key).cloned(),
        _ => return FAIL,
    };
    if let Some(value) = value {
        unsafe { write_out(out, value.to_owned_out()) };
    }
    OK
}

/// Insert or overwrite property `key`. `v` is borrowed.
///
/// # Safety
/// `h` must be null or live; `key` null or NUL-terminated; `v` null or a
/// valid record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_object_set(
    h: *mut c_void,
    key: *const c_char,
    v: *const TetherValue,
) -> i32 {
    let (Some(obj), Some(key)) = (
        unsafe { borrow_handle(h, Kind::Object, "tether_object_set") },
        unsafe { text(key) },
    ) else {
        return FAIL;
    };
    let Some(value) = (unsafe { incoming(v, Incoming::Borrowed) }) else {
        return FAIL;
    };
    let Some(mut data) = obj.try_data_mut() else {
        return FAIL;
    };
    let HeapData::Object(object) = &mut *data else {
        return FAIL;
    };
    let previous = object.set(&key, value);
    drop(data);
    drop(previous);
    OK
}

/// Own keys in insertion order as a JSON array of strings. Caller frees.
/// Anything but a live object gives `[]`.
///
/// # Safety
/// `h` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_object_keys(h: *mut c_void) -> *mut c_char {
    let keys: Vec<String> = unsafe { borrow_handle(h, Kind::Object, "tether_object_keys") }
        .and_then(|obj| match obj.try_data().as_deref() {
            Some(HeapData::Object(data)) => Some(data.keys().map(str::to_string).collect()),
            _ => None,
        })
        .unwrap_or_default();
    let json = serde_json::to_string(&keys).unwrap_or_else(|_| "[]".to_string());
    alloc::alloc_c_string(&json)
}

// =========================================================================
// Handles
// =========================================================================

/// # Safety
/// `h` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_handle_retain(h: *mut c_void) {
    unsafe { heap::retain(h) }
}

/// # Safety
/// `h` must be null or live, and the caller must own the released reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_handle_release(h: *mut c_void) {
    unsafe { heap::release(h) }
}

// =========================================================================
// Calls / Tasks
// =========================================================================

/// Call a function handle. Arguments and receiver are borrowed; the result
/// goes to `*out` (fresh reference / allocator-owned string, caller frees).
///
/// # Safety
/// `it` and `func` must be null or live; `argv` must hold `argc` valid
/// records; `this_val` and `out` must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_function_call(
    it: *mut c_void,
    func: *mut c_void,
    argc: i32,
    argv: *const TetherValue,
    this_val: *const TetherValue,
    out: *mut TetherValue,
) -> i32 {
    unsafe { write_out(out, TetherValue::null()) };
    let Some(interp) = (unsafe { runtime(it) }) else {
        return FAIL;
    };
    let Some(func) = (unsafe { borrow_handle(func, Kind::Function, "tether_function_call") })
    else {
        return FAIL;
    };
    let argc = match usize::try_from(argc) {
        Ok(n) if n == 0 || !argv.is_null() => n,
        _ => {
            warn!(argc, "tether_function_call with malformed arguments");
            return FAIL;
        }
    };
    let args: Vec<Slot> = if argc == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(argv, argc) }
            .iter()
            .map(|v| unsafe { Slot::from_transport(v, Incoming::Borrowed) })
            .collect()
    };
    let this = unsafe { incoming(this_val, Incoming::Borrowed) };
    let callee = Slot::Ref((*func).clone());
    match interp.call(&callee, this.as_ref(), &args) {
        Ok(result) => {
            unsafe { write_out(out, result.to_owned_out()) };
            OK
        }
        Err(e) => {
            warn!(error = %e, "tether_function_call failed");
            FAIL
        }
    }
}

/// Create an already-settled task holding `*v` (borrowed). Returns a fresh
/// reference, or null for a null record.
///
/// # Safety
/// `v` must be null or a valid record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_task_create_resolved(v: *const TetherValue) -> *mut c_void {
    match unsafe { incoming(v, Incoming::Borrowed) } {
        Some(result) => HeapRef::alloc(HeapData::Task(TaskData { result })).into_raw(),
        None => ptr::null_mut(),
    }
}

/// Read a settled task's value into `*out` (caller frees).
///
/// # Safety
/// `task` must be null or live; `out` null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_task_result(task: *mut c_void, out: *mut TetherValue) -> i32 {
    unsafe { write_out(out, TetherValue::null()) };
    let Some(task) = (unsafe { borrow_handle(task, Kind::Task, "tether_task_result") }) else {
        return FAIL;
    };
    let result = match task.try_data().as_deref() {
        Some(HeapData::Task(data)) => data.result.clone(),
        _ => return FAIL,
    };
    unsafe { write_out(out, result.to_owned_out()) };
    OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};

    unsafe extern "C" fn add(
        argc: i32,
        argv: *const TetherValue,
        _this: *const TetherValue,
        _userdata: *mut c_void,
    ) -> TetherValue {
        let args = unsafe { std::slice::from_raw_parts(argv, argc as usize) };
        TetherValue::number(args.iter().map(|a| a.number).sum())
    }

    fn take_string(p: *mut c_char) -> String {
        assert!(!p.is_null());
        let s = unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned();
        unsafe { tether_free(p as *mut c_void) };
        s
    }

    fn run(it: *mut c_void, code: &str) -> String {
        let code = CString::new(code).unwrap();
        take_string(unsafe { tether_run(it, code.as_ptr()) })
    }

    #[test]
    fn test_register_and_run() {
        let it = tether_create();
        let name = CString::new("add").unwrap();
        assert_eq!(
            unsafe { tether_register(it, name.as_ptr(), Some(add), ptr::null_mut()) },
            OK
        );
        assert_eq!(run(it, "add(2, 3)"), "5");
        assert_eq!(run(it, "missing(1)"), "Error: ReferenceError: missing is not defined");
        unsafe { tether_destroy(it) };
    }

    #[test]
    fn test_array_surface() {
        let before = heap::stats();
        let arr = tether_array_create();
        unsafe {
            assert_eq!(tether_array_set(arr, 2, &TetherValue::number(7.0)), OK);
            assert_eq!(tether_array_length(arr), 3);
            assert_eq!(tether_array_set(arr, -1, &TetherValue::number(1.0)), FAIL);
            assert_eq!(tether_array_set(arr, i32::MAX, &TetherValue::number(1.0)), FAIL);
            assert_eq!(tether_array_length(arr), 3);

            let mut out = TetherValue::number(99.0);
            assert_eq!(tether_array_get(arr, 0, &mut out), OK);
            assert!(out.is_null());
            assert_eq!(tether_array_get(arr, 2, &mut out), OK);
            assert_eq!(out.number, 7.0);
            assert_eq!(tether_array_get(arr, 10, &mut out), OK);
            assert!(out.is_null());

            let child = tether_object_create();
            let child_val = TetherValue::handle(Kind::Object, child);
            assert_eq!(tether_array_push(arr, &child_val), OK);
            tether_handle_release(child);
            assert_eq!(tether_array_get(arr, 3, &mut out), OK);
            assert_eq!(out.kind(), Some(Kind::Object));
            assert_eq!(out.handle, child);
            tether_handle_release(out.handle);

            tether_handle_release(arr);
        }
        assert!(heap::stats().since(&before).is_balanced());
    }

    #[test]
    fn test_object_surface_and_keys() {
        let obj = tether_object_create();
        let b = CString::new("b").unwrap();
        let a = CString::new("a").unwrap();
        let text = CString::new("hé").unwrap();
        unsafe {
            assert_eq!(tether_object_set(obj, b.as_ptr(), &TetherValue::boolean(true)), OK);
            assert_eq!(
                tether_object_set(obj, a.as_ptr(), &TetherValue::string(text.as_ptr())),
                OK
            );
            assert_eq!(tether_object_has(obj, a.as_ptr()), 1);
            assert_eq!(take_string(tether_object_keys(obj)), r#"["b","a"]"#);

            let mut out = TetherValue::null();
            assert_eq!(tether_object_get(obj, a.as_ptr(), &mut out), OK);
            assert_eq!(out.kind(), Some(Kind::String));
            assert_eq!(take_string(out.string as *mut c_char), "hé");
            tether_handle_release(obj);
        }
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let arr = tether_array_create();
        let key = CString::new("k").unwrap();
        unsafe {
            assert_eq!(tether_object_set(arr, key.as_ptr(), &TetherValue::null()), FAIL);
            assert_eq!(take_string(tether_object_keys(arr)), "[]");
            assert_eq!(tether_object_has(ptr::null_mut(), key.as_ptr()), 0);
            tether_handle_release(arr);
        }
    }

    #[test]
    fn test_add_method_consumes_on_failure() {
        let before = heap::stats();
        let func = tether_function_create_native(Some(add), ptr::null_mut());
        let name = CString::new("m").unwrap();
        unsafe {
            assert_eq!(tether_class_add_method(ptr::null_mut(), name.as_ptr(), func), FAIL);
        }
        assert!(heap::stats().since(&before).is_balanced());
    }

    #[test]
    fn test_function_call_and_task() {
        let it = tether_create();
        let func = tether_function_create_native(Some(add), ptr::null_mut());
        let argv = [TetherValue::number(1.5), TetherValue::number(2.0)];
        let mut out = TetherValue::null();
        unsafe {
            assert_eq!(
                tether_function_call(it, func, 2, argv.as_ptr(), ptr::null(), &mut out),
                OK
            );
            assert_eq!(out.number, 3.5);
            assert_eq!(
                tether_function_call(it, func, 1, ptr::null(), ptr::null(), &mut out),
                FAIL
            );

            let task = tether_task_create_resolved(&TetherValue::number(4.0));
            assert_eq!(tether_task_result(task, &mut out), OK);
            assert_eq!(out.number, 4.0);
            tether_handle_release(task);
            tether_handle_release(func);
            tether_destroy(it);
        }
        assert_eq!(tether_abi_version(), ABI_VERSION);
    }
}
