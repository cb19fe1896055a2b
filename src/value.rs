//! Runtime values: what an `Expr` evaluates to.
//!
//! Mirrors the handful of concrete types that flow through
//! `chemistry_lang/ch_interpreter.py`'s `evaluate`: `None`/`True`/`False`,
//! `CHQuantity`, `CHString`, and the two callable kinds (`CHWork`,
//! `NativeWork`).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::Stmt;
use crate::chem::Quantity;
use crate::env::EnvId;
use crate::error::{ChemError, ErrorHandler};
use crate::number::SigDigNumber;

/// A string literal that may need `{expr}` interpolation performed lazily,
/// the first time it's actually observed (mirrors `CHString`'s
/// `cached_property` over `extract_subs`).
#[derive(Debug)]
pub struct ChString {
    pub text: String,
    pub interpolated: bool,
    spans: RefCell<Option<Vec<(usize, usize)>>>,
}

impl ChString {
    pub fn new(text: impl Into<String>, interpolated: bool) -> Self {
        ChString { text: text.into(), interpolated, spans: RefCell::new(None) }
    }

    /// Byte ranges, `(open_brace_idx + 1, close_brace_idx)`, of every
    /// non-escaped `{...}` span, computed once and cached.
    pub fn spans(&self, handler: &mut ErrorHandler) -> Vec<(usize, usize)> {
        if let Some(cached) = self.spans.borrow().as_ref() {
            return cached.clone();
        }
        let chars: Vec<char> = self.text.chars().collect();
        let mut stack = Vec::new();
        let mut spans = Vec::new();
        for (idx, &c) in chars.iter().enumerate() {
            let escaped = idx > 0 && chars[idx - 1] == '\\';
            match c {
                '{' if !escaped => stack.push(idx),
                '}' if !escaped => match stack.pop() {
                    Some(open) => spans.push((open + 1, idx)),
                    None => {
                        handler.scan("Unmatched braces".to_string(), None);
                    }
                },
                _ => {}
            }
        }
        *self.spans.borrow_mut() = Some(spans.clone());
        spans
    }
}

impl PartialEq for ChString {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.interpolated == other.interpolated
    }
}

/// A user-defined `work` closed over the environment it was declared in.
#[derive(Debug)]
pub struct Work {
    pub identifier: String,
    pub params: Vec<String>,
    pub body: Stmt,
    pub closure: EnvId,
}

/// A built-in function exposed to the language (`print`, `input`, and every
/// `math` free function, per `Interpreter.init_global_env`).
pub struct NativeWork {
    pub name: String,
    pub arity: usize,
    pub func: Box<dyn Fn(&[Value]) -> Result<Value, ChemError>>,
}

impl fmt::Debug for NativeWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<NativeWork: {}>", self.name)
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Na,
    Bool(bool),
    Quantity(Quantity),
    Str(Rc<ChString>),
    Work(Rc<Work>),
    Native(Rc<NativeWork>),
    /// Results of `redo`/`during` loops and of evaluating an `Interval`
    /// (the original represents the latter as a lazy generator; collecting
    /// it eagerly into a list is the natural Rust analogue since the
    /// language never observes partial consumption).
    List(Vec<Value>),
}

impl Value {
    pub fn dimensionless(n: SigDigNumber) -> Self {
        Value::Quantity(Quantity::dimensionless(n))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Na => false,
            Value::Bool(b) => *b,
            Value::Quantity(q) => q.is_truthy(),
            Value::Str(s) => !s.text.is_empty(),
            Value::Work(_) | Value::Native(_) => true,
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn arity(&self) -> Option<usize> {
        match self {
            Value::Work(w) => Some(w.params.len()),
            Value::Native(n) => Some(n.arity),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Na, Value::Na) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Quantity(a), Value::Quantity(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Work(a), Value::Work(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

/// `Interpreter.stringify`: how a value renders for `print`, string
/// interpolation, and the `write` statement.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Na => "na".to_string(),
        Value::Bool(true) => "pass".to_string(),
        Value::Bool(false) => "fail".to_string(),
        Value::Quantity(q) => q.to_string(),
        Value::Str(s) => s.text.clone(),
        Value::Work(w) => format!("<CHWork: {}>", w.identifier),
        Value::Native(n) => format!("<NativeWork: {}>", n.name),
        Value::List(items) => {
            let rendered: Vec<String> = items.iter().map(stringify).collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_interpolation_span() {
        let s = ChString::new("hi {1 + 2} there", true);
        let mut h = ErrorHandler::new();
        assert_eq!(s.spans(&mut h), vec![(4, 9)]);
    }

    #[test]
    fn stringify_renders_booleans_as_pass_fail() {
        assert_eq!(stringify(&Value::Bool(true)), "pass");
        assert_eq!(stringify(&Value::Bool(false)), "fail");
        assert_eq!(stringify(&Value::Na), "na");
    }
}
