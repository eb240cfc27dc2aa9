use std::env;
use std::fs;
use std::process::ExitCode;

use tether::bridge::views::class::CONSTRUCTOR;
use tether::{BridgeError, CallbackError, Engine, EngineConfig, Object, Value};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

fn install_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn number_arg(args: &[Value], index: usize) -> Result<f64, CallbackError> {
    match args.get(index) {
        Some(v) if v.kind() == tether::Kind::Number => Ok(v.to_number(0.0)),
        _ => Err(CallbackError::Argument {
            index,
            reason: "expected a number".to_string(),
        }),
    }
}

/// Host functions and classes every script can use.
fn install_host_api(engine: &Engine) -> Result<(), BridgeError> {
    engine.register_function("hostAdd", |_, args, _| {
        Ok(Value::number(number_arg(args, 0)? + number_arg(args, 1)?))
    })?;

    let counter = engine.create_class("Counter")?;
    let constructor = engine.create_function(|engine, args, this| {
        let this = Object::try_from(this.clone())?;
        let start = args.first().map_or(0.0, |v| v.to_number(0.0));
        this.set(engine, "x", &Value::number(start))?;
        Ok(Value::null())
    })?;
    counter.add_method(CONSTRUCTOR, constructor)?;

    let inc = engine.create_function(|engine, _, this| {
        let this = Object::try_from(this.clone())?;
        let next = Value::number(this.get("x")?.to_number(0.0) + 1.0);
        this.set(engine, "x", &next)?;
        Ok(next)
    })?;
    counter.add_method("inc", inc)?;

    engine.declare_move("Counter", counter.into_value())
}

fn main() -> ExitCode {
    install_subscriber();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        let prog = args.first().map_or("tether", String::as_str);
        eprintln!("usage: {prog} <script.js>");
        return ExitCode::FAILURE;
    }
    let filename = &args[1];

    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("failed to read {filename}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = match Engine::with_config(EngineConfig::from_env()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = install_host_api(&engine) {
        eprintln!("failed to install host API: {e}");
        return ExitCode::FAILURE;
    }

    match engine.run(&source) {
        Ok(display) => {
            println!("run returned: {display}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("run failed: {e}");
            ExitCode::FAILURE
        }
    }
}
