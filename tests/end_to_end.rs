use tether::bridge::views::class::CONSTRUCTOR;
use tether::{CallbackError, Engine, Object, Value};

fn engine_with_host_api() -> Engine {
    let engine = Engine::new().unwrap();
    engine
        .register_function("hostAdd", |_, args, _| {
            let a = args.first().map_or(0.0, |v| v.to_number(0.0));
            let b = args.get(1).map_or(0.0, |v| v.to_number(0.0));
            Ok(Value::number(a + b))
        })
        .unwrap();

    let counter = engine.create_class("Counter").unwrap();
    let ctor = engine
        .create_function(|engine, args, this| {
            let this = Object::try_from(this.clone())?;
            this.set(engine, "x", &Value::number(args[0].to_number(0.0)))?;
            Ok(Value::null())
        })
        .unwrap();
    let inc = engine
        .create_function(|engine, _, this| {
            let this = Object::try_from(this.clone())?;
            let next = Value::number(this.get("x")?.to_number(0.0) + 1.0);
            this.set(engine, "x", &next)?;
            Ok(next)
        })
        .unwrap();
    counter.add_method(CONSTRUCTOR, ctor).unwrap();
    counter.add_method("inc", inc).unwrap();
    engine.declare_move("Counter", counter.into_value()).unwrap();
    engine
}

#[test]
fn counter_and_host_add() {
    let engine = engine_with_host_api();
    let out = engine
        .run(
            "let c = new Counter(10);
             let first = c.inc();
             let second = c.inc();
             let sum = hostAdd(2, 3);
             [first, second, sum]",
        )
        .unwrap();
    assert_eq!(out, "11,12,5");
    assert_eq!(engine.run("c.x").unwrap(), "12");
    assert_eq!(engine.binding_count(), 3);
}

#[test]
fn host_reads_script_objects() {
    let engine = engine_with_host_api();
    engine
        .register_function("inspect", |_, args, _| {
            let obj = Object::try_from(args[0].clone())?;
            Ok(Value::string(obj.keys().join("|")))
        })
        .unwrap();
    let out = engine
        .run("let o = { b: 1, a: 'two' }; o.c = true; inspect(o)")
        .unwrap();
    assert_eq!(out, "b|a|c");
}

#[test]
fn script_errors_are_strings() {
    let engine = engine_with_host_api();
    let out = engine.run("undefinedThing + 1").unwrap();
    assert!(out.starts_with("Error: "), "{out}");

    engine
        .register_function("fail", |_, _, _| Err(CallbackError::msg("host said no")))
        .unwrap();
    assert_eq!(engine.run("fail()").unwrap(), "Error: host said no");
    // The engine keeps working after a failed callback.
    assert_eq!(engine.run("hostAdd(1, 1)").unwrap(), "2");
}

#[test]
fn method_without_receiver_reports_kind_mismatch() {
    let engine = engine_with_host_api();
    engine
        .register_function("touch", |engine, _, this| {
            let this = Object::try_from(this.clone())?;
            this.set(engine, "touched", &Value::boolean(true))?;
            Ok(Value::null())
        })
        .unwrap();
    assert_eq!(
        engine.run("touch()").unwrap(),
        "Error: expected object value, found null"
    );
}

#[test]
fn panicking_callback_does_not_abort() {
    let engine = Engine::new().unwrap();
    engine
        .register_function("boom", |_, _, _| -> Result<Value, CallbackError> {
            panic!("host bug")
        })
        .unwrap();
    assert_eq!(engine.run("boom()").unwrap(), "Error: host bug");
}

#[test]
fn display_forms() {
    let engine = engine_with_host_api();
    assert_eq!(engine.run("").unwrap(), "null");
    assert_eq!(engine.run("7 / 2").unwrap(), "3.5");
    assert_eq!(engine.run("({})").unwrap(), "[object Object]");
    assert_eq!(engine.run("hostAdd").unwrap(), "function () { [native code] }");
    assert_eq!(engine.run("Counter").unwrap(), "class Counter");
}
