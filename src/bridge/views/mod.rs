//! Kind-checked views over handle values
//!
//! A view owns one `Value` of its kind, or Null (the empty view, reachable
//! only through `Default`). Building a view from a value of any other kind,
//! Null included, fails with `KindMismatch`; nothing is ever reinterpreted. Reads on an empty view yield Null / 0 / empty, writes
//! fail with `NullHandle`.

macro_rules! handle_view {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq)]
        pub struct $name {
            value: $crate::bridge::Value,
        }

        impl $name {
            pub const KIND: $crate::runtime::Kind = $kind;

            /// True when the view holds no handle.
            pub fn is_unbound(&self) -> bool {
                self.value.is_null()
            }

            pub fn as_value(&self) -> &$crate::bridge::Value {
                &self.value
            }

            pub fn into_value(self) -> $crate::bridge::Value {
                self.value
            }

            /// Raw handle for a write, or `NullHandle` on an empty view.
            fn target(&self) -> $crate::bridge::BridgeResult<*mut std::ffi::c_void> {
                self.value
                    .handle()
                    .map(std::ptr::NonNull::as_ptr)
                    .ok_or($crate::bridge::BridgeError::NullHandle($kind))
            }
        }

        impl TryFrom<$crate::bridge::Value> for $name {
            type Error = $crate::bridge::BridgeError;

            fn try_from(value: $crate::bridge::Value) -> Result<Self, Self::Error> {
                match value.kind() {
                    k if k == $kind => Ok(Self { value }),
                    found => Err($crate::bridge::BridgeError::KindMismatch {
                        expected: $kind,
                        found,
                    }),
                }
            }
        }

        impl From<$name> for $crate::bridge::Value {
            fn from(view: $name) -> Self {
                view.value
            }
        }
    };
}

pub(crate) use handle_view;

pub mod array;
pub mod class;
pub mod function;
pub mod keys;
pub mod object;

pub use array::Array;
pub use class::Class;
pub use function::Function;
pub use keys::parse_key_list;
pub use object::Object;
