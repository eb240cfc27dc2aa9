//! Reference runtime behind the boundary
//!
//! `Interpreter` is the object behind the opaque runtime pointer. It owns the
//! global scope and evaluates a deliberately small statement/expression
//! subset so that native functions, classes and the ownership rules can be
//! exercised end to end. Anything outside the subset is reported as an
//! unsupported-syntax error rather than guessed at.
//!
//! All scopes are global. Functions are native only; `new C(...)` builds an
//! object linked to `C` and runs its native `constructor` method.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr;

use swc_common::{FileName, SourceMap, input::StringInput, sync::Lrc};
use swc_ecma_ast::{
    AssignOp, AssignTarget, BinaryOp, Callee, Decl, Expr, ExprOrSpread, Lit, MemberExpr,
    MemberProp, Pat, Prop, PropName, PropOrSpread, SimpleAssignTarget, Stmt, UnaryOp, UpdateOp,
};
use swc_ecma_parser::{Parser, Syntax, lexer::Lexer};
use thiserror::Error;
use tracing::trace;

use super::abi::{Kind, TetherValue};
use super::heap::{HeapData, HeapRef, NativeFunction, ObjectData};
use super::slot::{Slot, format_number};

/// Name of the class method run by `new`.
pub const CONSTRUCTOR: &str = "constructor";

/// Marks a failed `run` in its display result.
pub const ERROR_PREFIX: &str = "Error: ";

/// Largest run of Null padding a single element write may add.
pub const MAX_ELEMENT_GAP: usize = 1 << 16;

#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("unsupported syntax: {0}")]
    Unsupported(&'static str),
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// An assignable location.
enum Place {
    Global(String),
    Member { target: Slot, key: Slot },
}

#[derive(Default)]
pub struct Interpreter {
    globals: RefCell<HashMap<String, Slot>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` in the global scope, replacing any previous binding.
    pub fn declare(&self, name: &str, value: Slot) {
        let previous = self.globals.borrow_mut().insert(name.to_string(), value);
        // Released outside the borrow.
        drop(previous);
    }

    pub fn global(&self, name: &str) -> Option<Slot> {
        self.globals.borrow().get(name).cloned()
    }

    /// Parse and evaluate `source`, returning the value of the last
    /// expression statement (Null if there was none).
    pub fn run(&self, source: &str) -> ScriptResult<Slot> {
        let cm: Lrc<SourceMap> = Default::default();
        let fm = cm.new_source_file(
            FileName::Custom("script.js".into()).into(),
            source.to_string(),
        );
        let lexer = Lexer::new(
            Syntax::Es(Default::default()),
            Default::default(),
            StringInput::from(&*fm),
            None,
        );
        let mut parser = Parser::new_from(lexer);
        let script = parser
            .parse_script()
            .map_err(|e| ScriptError::Syntax(format!("{:?}", e.kind())))?;
        if let Some(e) = parser.take_errors().into_iter().next() {
            return Err(ScriptError::Syntax(format!("{:?}", e.kind())));
        }

        let mut last = Slot::Null;
        for stmt in &script.body {
            self.exec(stmt, &mut last)?;
        }
        Ok(last)
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Call `callee` with an optional receiver.
    pub fn call(&self, callee: &Slot, this: Option<&Slot>, args: &[Slot]) -> ScriptResult<Slot> {
        let Some(func) = native_of(callee) else {
            return Err(ScriptError::Type(format!("{callee} is not a function")));
        };
        Ok(invoke_native(func, this, args))
    }

    /// `new class(args...)`
    pub fn construct(&self, class: &Slot, args: &[Slot]) -> ScriptResult<Slot> {
        let Some(class_ref) = class.as_ref_of(Kind::Class) else {
            return Err(ScriptError::Type(format!("{class} is not a constructor")));
        };
        let ctor = match class_ref.try_data().as_deref() {
            Some(HeapData::Class(data)) => data.method(CONSTRUCTOR).cloned(),
            _ => None,
        };
        let instance = Slot::Ref(HeapRef::alloc(HeapData::Object(ObjectData {
            properties: Vec::new(),
            class: Some(class_ref.clone()),
        })));
        if let Some(ctor) = ctor {
            self.call(&ctor, Some(&instance), args)?;
        }
        Ok(instance)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn exec(&self, stmt: &Stmt, last: &mut Slot) -> ScriptResult<()> {
        match stmt {
            Stmt::Expr(expr_stmt) => {
                *last = self.eval(&expr_stmt.expr)?;
            }
            Stmt::Decl(Decl::Var(var)) => {
                for declarator in &var.decls {
                    let Pat::Ident(binding) = &declarator.name else {
                        return Err(ScriptError::Unsupported("destructuring declaration"));
                    };
                    let value = match &declarator.init {
                        Some(init) => self.eval(init)?,
                        None => Slot::Null,
                    };
                    self.declare(&binding.id.sym.to_string(), value);
                }
            }
            Stmt::Block(block) => {
                for s in &block.stmts {
                    self.exec(s, last)?;
                }
            }
            Stmt::If(if_stmt) => {
                if self.eval(&if_stmt.test)?.truthy() {
                    self.exec(&if_stmt.cons, last)?;
                } else if let Some(alt) = &if_stmt.alt {
                    self.exec(alt, last)?;
                }
            }
            Stmt::While(while_stmt) => {
                while self.eval(&while_stmt.test)?.truthy() {
                    self.exec(&while_stmt.body, last)?;
                }
            }
            Stmt::Empty(_) => {}
            _ => return Err(ScriptError::Unsupported("statement")),
        }
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn eval(&self, expr: &Expr) -> ScriptResult<Slot> {
        match expr {
            Expr::Lit(Lit::Num(num)) => Ok(Slot::Number(num.value)),
            Expr::Lit(Lit::Str(s)) => Ok(Slot::Str(s.value.to_string_lossy().to_string())),
            Expr::Lit(Lit::Bool(b)) => Ok(Slot::Bool(b.value)),
            Expr::Lit(Lit::Null(_)) => Ok(Slot::Null),
            Expr::Ident(id) => {
                let name = id.sym.to_string();
                self.global(&name).ok_or(ScriptError::Reference(name))
            }
            Expr::Paren(paren) => self.eval(&paren.expr),
            Expr::Array(arr) => {
                let mut elements = Vec::with_capacity(arr.elems.len());
                for elem in &arr.elems {
                    match elem {
                        Some(e) if e.spread.is_none() => elements.push(self.eval(&e.expr)?),
                        Some(_) => return Err(ScriptError::Unsupported("spread element")),
                        None => elements.push(Slot::Null),
                    }
                }
                Ok(Slot::Ref(HeapRef::array(elements)))
            }
            Expr::Object(obj) => {
                let mut data = ObjectData::default();
                for prop in &obj.props {
                    let PropOrSpread::Prop(prop) = prop else {
                        return Err(ScriptError::Unsupported("object spread"));
                    };
                    match prop.as_ref() {
                        Prop::KeyValue(kv) => {
                            let key = match &kv.key {
                                PropName::Ident(id) => id.sym.to_string(),
                                PropName::Str(s) => s.value.to_string_lossy().to_string(),
                                PropName::Num(n) => format_number(n.value),
                                _ => return Err(ScriptError::Unsupported("computed key")),
                            };
                            let value = self.eval(&kv.value)?;
                            data.set(&key, value);
                        }
                        Prop::Shorthand(id) => {
                            let name = id.sym.to_string();
                            let value = self
                                .global(&name)
                                .ok_or_else(|| ScriptError::Reference(name.clone()))?;
                            data.set(&name, value);
                        }
                        _ => return Err(ScriptError::Unsupported("object property")),
                    }
                }
                Ok(Slot::Ref(HeapRef::alloc(HeapData::Object(data))))
            }
            Expr::Member(member) => {
                let (target, key) = self.eval_member(member)?;
                get_member(&target, &key)
            }
            Expr::Call(call) => {
                let Callee::Expr(callee) = &call.callee else {
                    return Err(ScriptError::Unsupported("super or import call"));
                };
                let args = self.eval_args(&call.args)?;
                match callee.as_ref() {
                    Expr::Member(member) => {
                        let (target, key) = self.eval_member(member)?;
                        let method = get_member(&target, &key)?;
                        if native_of(&method).is_none() {
                            return Err(ScriptError::Type(format!(
                                "{} is not a function",
                                property_name(&key)
                            )));
                        }
                        self.call(&method, Some(&target), &args)
                    }
                    other => {
                        let func = self.eval(other)?;
                        self.call(&func, None, &args)
                    }
                }
            }
            Expr::New(new_expr) => {
                let class = self.eval(&new_expr.callee)?;
                let args = match &new_expr.args {
                    Some(args) => self.eval_args(args)?,
                    None => Vec::new(),
                };
                self.construct(&class, &args)
            }
            Expr::Assign(assign) => {
                let place = match &assign.left {
                    AssignTarget::Simple(SimpleAssignTarget::Ident(binding)) => {
                        Place::Global(binding.id.sym.to_string())
                    }
                    AssignTarget::Simple(SimpleAssignTarget::Member(member)) => {
                        let (target, key) = self.eval_member(member)?;
                        Place::Member { target, key }
                    }
                    _ => return Err(ScriptError::Unsupported("assignment target")),
                };
                let right = self.eval(&assign.right)?;
                let value = match assign.op {
                    AssignOp::Assign => right,
                    AssignOp::AddAssign => binary(BinaryOp::Add, &self.load(&place)?, &right),
                    AssignOp::SubAssign => binary(BinaryOp::Sub, &self.load(&place)?, &right),
                    AssignOp::MulAssign => binary(BinaryOp::Mul, &self.load(&place)?, &right),
                    _ => return Err(ScriptError::Unsupported("assignment operator")),
                };
                self.store(&place, value.clone())?;
                Ok(value)
            }
            Expr::Update(update) => {
                let place = self.place_of(&update.arg)?;
                let old = self.load(&place)?.to_number();
                let new = match update.op {
                    UpdateOp::PlusPlus => old + 1.0,
                    UpdateOp::MinusMinus => old - 1.0,
                };
                self.store(&place, Slot::Number(new))?;
                Ok(Slot::Number(if update.prefix { new } else { old }))
            }
            Expr::Bin(bin) => match bin.op {
                BinaryOp::LogicalAnd => {
                    let left = self.eval(&bin.left)?;
                    if left.truthy() { self.eval(&bin.right) } else { Ok(left) }
                }
                BinaryOp::LogicalOr => {
                    let left = self.eval(&bin.left)?;
                    if left.truthy() { Ok(left) } else { self.eval(&bin.right) }
                }
                op => {
                    let left = self.eval(&bin.left)?;
                    let right = self.eval(&bin.right)?;
                    Ok(binary(op, &left, &right))
                }
            },
            Expr::Unary(unary) => {
                let arg = self.eval(&unary.arg)?;
                match unary.op {
                    UnaryOp::Minus => Ok(Slot::Number(-arg.to_number())),
                    UnaryOp::Plus => Ok(Slot::Number(arg.to_number())),
                    UnaryOp::Bang => Ok(Slot::Bool(!arg.truthy())),
                    UnaryOp::TypeOf => Ok(Slot::Str(type_of(&arg).to_string())),
                    _ => Err(ScriptError::Unsupported("unary operator")),
                }
            }
            _ => Err(ScriptError::Unsupported("expression")),
        }
    }

    fn eval_args(&self, args: &[ExprOrSpread]) -> ScriptResult<Vec<Slot>> {
        args.iter()
            .map(|arg| {
                if arg.spread.is_some() {
                    Err(ScriptError::Unsupported("spread argument"))
                } else {
                    self.eval(&arg.expr)
                }
            })
            .collect()
    }

    fn eval_member(&self, member: &MemberExpr) -> ScriptResult<(Slot, Slot)> {
        let target = self.eval(&member.obj)?;
        let key = match &member.prop {
            MemberProp::Ident(id) => Slot::Str(id.sym.to_string()),
            MemberProp::Computed(computed) => self.eval(&computed.expr)?,
            MemberProp::PrivateName(_) => return Err(ScriptError::Unsupported("private name")),
        };
        Ok((target, key))
    }

    fn place_of(&self, expr: &Expr) -> ScriptResult<Place> {
        match expr {
            Expr::Ident(id) => Ok(Place::Global(id.sym.to_string())),
            Expr::Member(member) => {
                let (target, key) = self.eval_member(member)?;
                Ok(Place::Member { target, key })
            }
            Expr::Paren(paren) => self.place_of(&paren.expr),
            _ => Err(ScriptError::Unsupported("update target")),
        }
    }

    fn load(&self, place: &Place) -> ScriptResult<Slot> {
        match place {
            Place::Global(name) => self
                .global(name)
                .ok_or_else(|| ScriptError::Reference(name.clone())),
            Place::Member { target, key } => get_member(target, key),
        }
    }

    fn store(&self, place: &Place, value: Slot) -> ScriptResult<()> {
        match place {
            Place::Global(name) => {
                if self.global(name).is_none() {
                    return Err(ScriptError::Reference(name.clone()));
                }
                self.declare(name, value);
                Ok(())
            }
            Place::Member { target, key } => set_member(target, key, value),
        }
    }
}

// =========================================================================
// Native invocation
// =========================================================================

fn native_of(slot: &Slot) -> Option<NativeFunction> {
    let func = slot.as_ref_of(Kind::Function)?;
    match func.try_data().as_deref() {
        Some(HeapData::Function(native)) => Some(*native),
        _ => None,
    }
}

/// Call a host function. Arguments and receiver are lent as call-scoped
/// views; the result is adopted per the callback return contract.
pub fn invoke_native(func: NativeFunction, this: Option<&Slot>, args: &[Slot]) -> Slot {
    let mut keep = Vec::new();
    let argv: Vec<TetherValue> = args.iter().map(|a| a.to_borrowed(&mut keep)).collect();
    let this_val = this.map(|t| t.to_borrowed(&mut keep));
    let this_ptr = this_val
        .as_ref()
        .map_or(ptr::null(), |t| t as *const TetherValue);

    trace!(argc = argv.len(), has_receiver = this.is_some(), "invoking native function");
    let ret = unsafe {
        (func.callback)(
            argv.len() as i32,
            argv.as_ptr(),
            this_ptr,
            func.userdata,
        )
    };
    // `keep` (and the slots behind `argv`) stay alive until here.
    unsafe { Slot::from_callback_return(ret) }
}

// =========================================================================
// Property access
// =========================================================================

fn property_name(key: &Slot) -> String {
    match key {
        Slot::Str(s) => s.clone(),
        Slot::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}

fn array_index(key: &Slot) -> Option<usize> {
    let n = match key {
        Slot::Number(n) => *n,
        Slot::Str(s) => s.parse::<f64>().ok()?,
        _ => return None,
    };
    (n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64).then_some(n as usize)
}

fn type_of(slot: &Slot) -> &'static str {
    match slot.kind() {
        Kind::Null => "object",
        Kind::Number => "number",
        Kind::Bool => "boolean",
        Kind::String => "string",
        Kind::Function | Kind::Class => "function",
        Kind::Array | Kind::Object | Kind::Task => "object",
    }
}

pub fn get_member(target: &Slot, key: &Slot) -> ScriptResult<Slot> {
    let name = property_name(key);
    match target {
        Slot::Null => Err(ScriptError::Type(format!(
            "cannot read property '{name}' of null"
        ))),
        Slot::Str(s) if name == "length" => Ok(Slot::Number(s.chars().count() as f64)),
        Slot::Ref(r) => {
            let Some(data) = r.try_data() else {
                return Ok(Slot::Null);
            };
            let found = match &*data {
                HeapData::Array(elements) => {
                    if name == "length" {
                        Some(Slot::Number(elements.len() as f64))
                    } else {
                        array_index(key).and_then(|i| elements.get(i).cloned())
                    }
                }
                HeapData::Object(obj) => obj.get(&name).cloned().or_else(|| {
                    let class = obj.class.as_ref()?;
                    match class.try_data().as_deref() {
                        Some(HeapData::Class(c)) => c.method(&name).cloned(),
                        _ => None,
                    }
                }),
                HeapData::Class(class) if name == "name" => Some(Slot::Str(class.name.clone())),
                HeapData::Task(task) if name == "result" => Some(task.result.clone()),
                _ => None,
            };
            Ok(found.unwrap_or_default())
        }
        _ => Ok(Slot::Null),
    }
}

pub fn set_member(target: &Slot, key: &Slot, value: Slot) -> ScriptResult<()> {
    let name = property_name(key);
    let Slot::Ref(r) = target else {
        return Err(ScriptError::Type(format!(
            "cannot set property '{name}' of {}",
            target.kind()
        )));
    };
    let Some(mut data) = r.try_data_mut() else {
        return Err(ScriptError::Type(format!("'{name}' is being accessed")));
    };
    let previous = match &mut *data {
        HeapData::Array(elements) => {
            let Some(index) = array_index(key) else {
                return Err(ScriptError::Type(format!("invalid array index '{name}'")));
            };
            store_element(elements, index, value)?
        }
        HeapData::Object(obj) => obj.set(&name, value),
        _ => {
            return Err(ScriptError::Type(format!(
                "cannot set property '{name}' of {}",
                r.kind()
            )));
        }
    };
    drop(data);
    drop(previous);
    Ok(())
}

/// Write `value` at `index`, padding with Null. Returns the replaced value.
/// Fails when the padding would exceed `MAX_ELEMENT_GAP` or cannot be
/// allocated.
pub fn store_element(
    elements: &mut Vec<Slot>,
    index: usize,
    value: Slot,
) -> ScriptResult<Option<Slot>> {
    if let Some(slot) = elements.get_mut(index) {
        return Ok(Some(std::mem::replace(slot, value)));
    }
    let gap = index - elements.len();
    if gap > MAX_ELEMENT_GAP || elements.try_reserve(gap + 1).is_err() {
        return Err(ScriptError::Type(format!("array index {index} is out of range")));
    }
    elements.resize(index, Slot::Null);
    elements.push(value);
    Ok(None)
}

fn binary(op: BinaryOp, left: &Slot, right: &Slot) -> Slot {
    match op {
        BinaryOp::Add => match (left, right) {
            (Slot::Str(_), _) | (_, Slot::Str(_)) => Slot::Str(format!("{left}{right}")),
            _ => Slot::Number(left.to_number() + right.to_number()),
        },
        BinaryOp::Sub => Slot::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Slot::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Slot::Number(left.to_number() / right.to_number()),
        BinaryOp::Mod => Slot::Number(left.to_number() % right.to_number()),
        BinaryOp::EqEqEq | BinaryOp::EqEq => Slot::Bool(left.strict_eq(right)),
        BinaryOp::NotEqEq | BinaryOp::NotEq => Slot::Bool(!left.strict_eq(right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Slot::Str(a), Slot::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let result = ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::LtEq => o.is_le(),
                BinaryOp::Gt => o.is_gt(),
                _ => o.is_ge(),
            });
            Slot::Bool(result)
        }
        _ => Slot::Number(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        let interp = Interpreter::new();
        match interp.run(source) {
            Ok(v) => v.to_string(),
            Err(e) => format!("{ERROR_PREFIX}{e}"),
        }
    }

    #[test]
    fn test_arithmetic_and_globals() {
        assert_eq!(run("let a = 2; let b = a * 3; b + 1"), "7");
        assert_eq!(run("1 / 2"), "0.5");
        assert_eq!(run("'a' + 1"), "a1");
        assert_eq!(run(""), "null");
    }

    #[test]
    fn test_arrays_and_objects() {
        assert_eq!(run("let a = [1, 2]; a[3] = 4; a"), "1,2,null,4");
        assert_eq!(run("let a = [1, 2, 3]; a.length"), "3");
        assert_eq!(run("let o = { x: 1 }; o.x += 2; o.x"), "3");
        assert_eq!(run("let o = {}; o.missing"), "null");
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(run("let i = 0; let s = 0; while (i < 4) { s += i; i++; } s"), "6");
        assert_eq!(run("let x = 5; if (x > 3) { 'big' } else { 'small' }"), "big");
    }

    #[test]
    fn test_errors_are_reported() {
        assert_eq!(run("nope"), "Error: ReferenceError: nope is not defined");
        assert_eq!(run("let x = 1; x()"), "Error: TypeError: 1 is not a function");
        assert!(run("let = ;").starts_with("Error: SyntaxError"));
        assert_eq!(run("function f() {}"), "Error: unsupported syntax: statement");
    }

    #[test]
    fn test_globals_released_on_drop() {
        let before = super::super::heap::stats();
        {
            let interp = Interpreter::new();
            interp.run("let a = [{ k: [1] }, {}]; let b = a;").unwrap();
        }
        assert!(super::super::heap::stats().since(&before).is_balanced());
    }

    #[test]
    fn test_store_element_pads() {
        let mut elements = vec![Slot::Number(1.0)];
        assert!(store_element(&mut elements, 2, Slot::Bool(true)).unwrap().is_none());
        assert_eq!(elements.len(), 3);
        assert!(matches!(elements[1], Slot::Null));
        assert!(store_element(&mut elements, 0, Slot::Null).unwrap().is_some());
    }

    #[test]
    fn test_store_element_gap_is_bounded() {
        let mut elements = vec![Slot::Number(1.0)];
        let far = 1 + MAX_ELEMENT_GAP + 1;
        assert!(matches!(
            store_element(&mut elements, far, Slot::Null),
            Err(ScriptError::Type(_))
        ));
        assert_eq!(elements.len(), 1);
        assert!(store_element(&mut elements, 1 + MAX_ELEMENT_GAP, Slot::Null).is_ok());
        assert_eq!(elements.len(), MAX_ELEMENT_GAP + 2);
    }

    #[test]
    fn test_huge_script_index_is_a_type_error() {
        let interp = Interpreter::new();
        let err = interp.run("let a = []; a[4294967295] = 1").unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)), "{err}");
        assert_eq!(interp.run("a.length").unwrap().to_string(), "0");
    }
}
