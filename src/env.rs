//! Lexical environments.
//!
//! The original interpreter models an environment as a parent-linked chain
//! of dicts (`ch_env.py`'s `Env`): `assign` walks up to the nearest ancestor
//! that already defines the name and mutates its dict in place; if none
//! does, the binding is created in the *current* scope. A closure that
//! captured an ancestor `Env` therefore sees later assignments to bindings
//! in scopes it still references, which is the behavior worth preserving.
//!
//! A `Work` closure can reference itself (recursion) and can be reassigned
//! from an enclosing scope, which makes a direct `Rc<RefCell<Env>>` parent
//! chain awkward to get right without reference cycles. Instead, scopes
//! live in a single arena (`Vec<Scope>`) addressed by a stable index
//! (`EnvId`), and each scope's bindings sit behind a `RefCell` so `assign`
//! can mutate a scope in place through just a shared reference — any
//! previously captured `EnvId` pointing at that slot observes the update,
//! matching the original's in-place-dict-mutation behavior without needing
//! `Rc` cycles or a rewritten parent pointer.
use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{ChemError, ErrorHandler};
use crate::value::Value;

/// Index into the environment arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(usize);

struct Scope {
    parent: Option<EnvId>,
    vars: RefCell<HashMap<String, Value>>,
}

/// Arena of lexical scopes. Cloning an `EnvId` is just copying an index, so
/// closures can cheaply capture "the environment as of right now".
#[derive(Default)]
pub struct Env {
    scopes: Vec<Scope>,
}

impl Env {
    pub fn new() -> Self {
        Env { scopes: Vec::new() }
    }

    /// Allocate a fresh root scope (no parent) and return its id.
    pub fn root(&mut self) -> EnvId {
        self.push(Scope { parent: None, vars: RefCell::new(HashMap::new()) })
    }

    /// Allocate a child scope of `parent` and return its id.
    pub fn child(&mut self, parent: EnvId) -> EnvId {
        self.push(Scope { parent: Some(parent), vars: RefCell::new(HashMap::new()) })
    }

    /// Bind `name` directly in `env`, shadowing any same-named ancestor
    /// binding. Used for `work` parameters and `redo` loop variables, which
    /// always introduce a fresh binding in their own new scope.
    pub fn define(&self, env: EnvId, name: &str, value: Value) {
        self.scopes[env.0].vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn lookup(&self, env: EnvId, name: &str, handler: &mut ErrorHandler) -> Result<Value, ChemError> {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if let Some(value) = scope.vars.borrow().get(name) {
                return Ok(value.clone());
            }
            current = scope.parent;
        }
        Err(handler.name(format!("Variable '{name}' not found"), None))
    }

    /// Assign `name` to `value` starting from `env`: mutate the nearest
    /// ancestor scope (including `env` itself) that already binds `name`,
    /// in place. If no scope in the chain has it, bind it fresh in `env`
    /// itself — the original's implicit declare-on-first-assign.
    pub fn assign(&self, env: EnvId, name: &str, value: Value) {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if scope.vars.borrow().contains_key(name) {
                scope.vars.borrow_mut().insert(name.to_string(), value);
                return;
            }
            current = scope.parent;
        }
        self.define(env, name, value);
    }

    fn push(&mut self, scope: Scope) -> EnvId {
        self.scopes.push(scope);
        EnvId(self.scopes.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::SigDigNumber;
    use rust_decimal::Decimal;

    fn num(n: i64) -> Value {
        Value::dimensionless(SigDigNumber::exact(Decimal::from(n)))
    }

    #[test]
    fn lookup_finds_variable_in_parent() {
        let mut env = Env::new();
        let mut h = ErrorHandler::new();
        let root = env.root();
        env.assign(root, "x", num(1));
        let child = env.child(root);
        assert_eq!(env.lookup(child, "x", &mut h).unwrap(), num(1));
    }

    #[test]
    fn assign_in_child_does_not_leak_to_parent() {
        let mut env = Env::new();
        let mut h = ErrorHandler::new();
        let root = env.root();
        let child = env.child(root);
        env.assign(child, "y", num(2));
        assert!(env.lookup(child, "y", &mut h).is_ok());
        assert!(env.lookup(root, "y", &mut h).is_err());
    }

    #[test]
    fn reassigning_ancestor_variable_is_visible_through_child() {
        let mut env = Env::new();
        let mut h = ErrorHandler::new();
        let root = env.root();
        env.assign(root, "x", num(1));
        let child = env.child(root);
        env.assign(child, "x", num(2));
        assert_eq!(env.lookup(root, "x", &mut h).unwrap(), num(2));
        assert_eq!(env.lookup(child, "x", &mut h).unwrap(), num(2));
    }

    #[test]
    fn missing_variable_is_a_name_error() {
        let mut env = Env::new();
        let mut h = ErrorHandler::new();
        let root = env.root();
        assert!(env.lookup(root, "nope", &mut h).is_err());
    }
}
