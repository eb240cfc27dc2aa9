//! Host-side wrapper over the boundary
//!
//! Everything here talks to the runtime only through the `tether_*`
//! functions, the way a foreign host would:
//! - `Value` owns handle references (clone retains, drop releases)
//! - `Engine` owns the runtime and every registered closure
//! - the trampoline turns closure failures into error-marked strings
//! - views give kind-checked access to arrays, objects, functions and classes

pub mod config;
pub mod engine;
pub mod error;
pub mod trampoline;
pub mod transport;
pub mod value;
pub mod views;

pub use config::EngineConfig;
pub use engine::{Engine, HostFn};
pub use error::{BridgeError, BridgeResult, CallbackError};
pub use transport::Transport;
pub use value::{Claim, Value};
pub use views::{Array, Class, Function, Object};
