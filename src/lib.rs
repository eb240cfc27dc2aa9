//! Library target for the embedding boundary
//!
//! `runtime` holds the runtime side and its `extern "C"` surface; building
//! the crate as a static library exports those symbols to foreign hosts.
//! `bridge` is the Rust host-side wrapper built on that same surface.

pub mod bridge;
pub mod runtime;

pub use bridge::{
    Array, BridgeError, CallbackError, Class, Engine, EngineConfig, Function, Object, Value,
};
pub use runtime::{ABI_VERSION, Kind, TetherValue};
