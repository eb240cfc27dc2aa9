//! Class-descriptor view

use super::function::Function;
use crate::bridge::transport::c_string;
use crate::bridge::{BridgeError, BridgeResult};
use crate::runtime::Kind;
use crate::runtime::stubs as sys;

/// Method name the runtime runs for `new`.
pub const CONSTRUCTOR: &str = "constructor";

super::handle_view!(
    /// A class handle. Declare it with `Engine::declare_move` to make it
    /// constructible from scripts.
    Class,
    Kind::Class
);

impl Class {
    /// Add an instance method. `method` is consumed in every case: the
    /// runtime takes its reference, or it is released on failure.
    pub fn add_method(&self, name: &str, mut method: Function) -> BridgeResult<()> {
        let h = self.target()?;
        let c_name = c_string(name)?;
        let Some(func) = method.detach() else {
            return Err(BridgeError::NullHandle(Kind::Function));
        };
        match unsafe { sys::tether_class_add_method(h, c_name.as_ptr(), func.as_ptr()) } {
            0 => Err(BridgeError::Rejected("add method")),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Engine, Value};
    use crate::runtime::heap;

    #[test]
    fn test_constructor_and_method() {
        let engine = Engine::new().unwrap();
        let point = engine.create_class("Point").unwrap();
        let ctor = engine
            .create_function(|engine, args, this| {
                let this = crate::bridge::Object::try_from(this.clone())?;
                this.set(engine, "x", args.first().unwrap_or(&Value::null()))?;
                Ok(Value::null())
            })
            .unwrap();
        point.add_method(CONSTRUCTOR, ctor).unwrap();
        engine.declare_move("Point", point.into_value()).unwrap();

        assert_eq!(engine.run("let p = new Point(4); p.x").unwrap(), "4");
        assert_eq!(engine.run("Point").unwrap(), "class Point");
    }

    #[test]
    fn test_add_method_on_empty_view_keeps_function() {
        let before = heap::stats();
        {
            let engine = Engine::new().unwrap();
            let f = engine.create_function(|_, _, _| Ok(Value::null())).unwrap();
            let empty = Class::default();
            assert_eq!(
                empty.add_method("m", f),
                Err(BridgeError::NullHandle(Kind::Class))
            );
        }
        assert!(heap::stats().since(&before).is_balanced());
    }
}
