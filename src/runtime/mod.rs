//! Runtime kernel behind the embedding boundary
//!
//! This module provides the runtime side of the boundary. It separates:
//! - Value transport records (abi.rs)
//! - The boundary allocator pair (alloc.rs)
//! - Refcounted heap objects (heap.rs)
//! - Runtime-internal values (slot.rs)
//! - A small reference evaluator (interp.rs)
//! - Extern "C" functions callable from any host (stubs.rs)
//!
//! Hosts only ever see `TetherValue` records, opaque handles and strings
//! allocated with `tether_malloc`.

pub mod abi;
pub mod abi_version;
pub mod alloc;
pub mod heap;
pub mod interp;
pub mod slot;
pub mod stubs;

pub use abi::{Kind, NativeCallback, TetherValue};
pub use abi_version::ABI_VERSION;
pub use heap::{HeapRef, HeapStats};
pub use interp::Interpreter;
