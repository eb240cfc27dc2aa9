use tether::runtime::{alloc, heap};
use tether::{Array, BridgeError, Engine, Kind, Value};

#[test]
fn consumed_declare_leaves_nothing_to_release() {
    let before = heap::stats();
    {
        let engine = Engine::new().unwrap();
        let mut value = engine.create_object().unwrap().into_value();
        let moved = value.take();
        assert!(value.is_null());
        engine.declare_move("o", moved).unwrap();

        let mut f = engine.create_function(|_, _, _| Ok(Value::null())).unwrap();
        let class = engine.create_class("K").unwrap();
        class.add_method("m", f.clone()).unwrap();
        let raw = f.detach();
        assert!(raw.is_some());
        assert!(f.is_unbound());
        unsafe { tether::runtime::stubs::tether_handle_release(raw.unwrap().as_ptr()) };
    }
    assert!(heap::stats().since(&before).is_balanced());
}

#[test]
fn declare_copy_keeps_callers_reference() {
    let engine = Engine::new().unwrap();
    let arr = engine.create_array().unwrap();
    let value = arr.as_value().clone();
    engine.declare_copy("shared", &value).unwrap();
    arr.push(&engine, &Value::number(9.0)).unwrap();
    // The runtime sees the same array the host still holds.
    assert_eq!(engine.run("shared[0]").unwrap(), "9");
    assert_eq!(engine.run("shared.length").unwrap(), "1");
}

#[test]
fn sequence_view_from_object_fails() {
    let engine = Engine::new().unwrap();
    let obj = engine.create_object().unwrap().into_value();
    match Array::try_from(obj) {
        Err(BridgeError::KindMismatch { expected, found }) => {
            assert_eq!(expected, Kind::Array);
            assert_eq!(found, Kind::Object);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn every_returned_string_is_freed() {
    let before = alloc::stats();
    {
        let engine = Engine::new().unwrap();
        engine
            .register_function("echo", |_, args, _| Ok(args[0].clone()))
            .unwrap();
        assert_eq!(engine.run("echo('hé')").unwrap(), "hé");
        let obj = engine.create_object().unwrap();
        obj.set(&engine, "k", &Value::string("v")).unwrap();
        assert_eq!(obj.get("k").unwrap().as_str(), Some("v"));
        assert_eq!(obj.keys(), vec!["k"]);
    }
    assert_eq!(alloc::stats().since(&before).live(), 0);
}

#[test]
fn script_values_reach_the_host() {
    let engine = Engine::new().unwrap();
    engine
        .register_function("check", |_, args, _| {
            let arr = Array::try_from(args[0].clone())?;
            let items = arr.to_vec()?;
            Ok(Value::boolean(
                items == vec![Value::number(1.0), Value::string("two"), Value::boolean(false)],
            ))
        })
        .unwrap();
    assert_eq!(engine.run("check([1, 'two', false])").unwrap(), "true");
}
