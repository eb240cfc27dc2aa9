//! Boundary ABI versioning
//!
//! Bump `ABI_VERSION` whenever the layout of `TetherValue`, the callback
//! signature, or the ownership class of any exported function changes.

pub const ABI_VERSION: u32 = 1;

pub const ABI_NAME: &str = "tether";
