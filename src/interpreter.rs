//! Tree-walking evaluator (the "IN" component).
//!
//! Ground truth: `chemistry_lang/ch_interpreter.py`'s `Interpreter` class.
//! `Submit` unwinding is modeled as a sum type instead of an exception
//! (`ch_work.py`'s `SubmitError`), per the design note in SPEC_FULL.md §9.

use std::collections::HashMap;
use std::io::Write as _;
use std::rc::Rc;

use crate::ast::{ConversionTargetExpr, Expr, Literal, Program, Stmt};
use crate::chem::quantity::{ConversionTarget, ReactionContext};
use crate::chem::{Count, Element, Formula, PartialFormula, Quantity, Term};
use crate::env::{Env, EnvId};
use crate::error::{ChemError, ErrorHandler};
use crate::number::SigDigNumber;
use crate::parser::Parser;
use crate::periodic_table::PeriodicTable;
use crate::scanner::Scanner;
use crate::token::TokenKind;
use crate::value::{stringify, ChString, NativeWork, Value, Work};

/// What a statement produced: a plain value (the natural result of running
/// it, used by `during`/`redo` to build their result list) or a `submit`
/// that must unwind to the nearest enclosing call.
pub enum Outcome {
    Normal(Value),
    Submit(Value),
}

impl Outcome {
    fn into_value(self) -> Value {
        match self {
            Outcome::Normal(v) | Outcome::Submit(v) => v,
        }
    }
}

const MATH_UNARY_FNS: &[(&str, fn(f64) -> f64)] = &[
    ("sin", f64::sin),
    ("cos", f64::cos),
    ("tan", f64::tan),
    ("asin", f64::asin),
    ("acos", f64::acos),
    ("atan", f64::atan),
    ("sqrt", f64::sqrt),
    ("exp", f64::exp),
    ("ln", f64::ln),
    ("log10", f64::log10),
    ("log2", f64::log2),
    ("floor", f64::floor),
    ("ceil", f64::ceil),
    ("round", f64::round),
    ("abs", f64::abs),
];

pub struct Interpreter {
    env: Env,
    global: EnvId,
    table: PeriodicTable,
}

impl Interpreter {
    pub fn new(table: PeriodicTable) -> Self {
        let mut env = Env::new();
        let global = env.root();
        let mut interp = Interpreter { env, global, table };
        interp.init_global_env();
        interp
    }

    /// Seeds `print`, `input`, one `NativeWork` per unary `math` function,
    /// and the two configuration globals the original exposes as plain
    /// variables (`attribute_to_evaluate_element`, `show_balanced_equation`).
    fn init_global_env(&mut self) {
        self.env.define(
            self.global,
            "attribute_to_evaluate_element",
            Value::Str(Rc::new(ChString::new("AtomicMass", false))),
        );
        self.env.define(self.global, "show_balanced_equation", Value::Bool(false));

        self.env.define(
            self.global,
            "print",
            native("print", 1, |args| {
                println!("{}", stringify(&args[0]));
                Ok(Value::Na)
            }),
        );

        self.env.define(
            self.global,
            "input",
            native("input", 0, |_args| {
                let mut line = String::new();
                std::io::stdin()
                    .read_line(&mut line)
                    .map_err(|e| ChemError::Io { message: e.to_string(), line: None })?;
                Ok(Value::Str(Rc::new(ChString::new(line.trim_end().to_string(), false))))
            }),
        );

        for (name, f) in MATH_UNARY_FNS {
            let f = *f;
            self.env.define(
                self.global,
                name,
                native(name, 1, move |args| {
                    let Value::Quantity(q) = &args[0] else {
                        return Err(ChemError::Type {
                            message: format!("{name} expects a quantity"),
                            line: None,
                        });
                    };
                    let result = f(q.magnitude.to_f64());
                    let magnitude = SigDigNumber::new(rust_decimal::Decimal::try_from(result)
                        .unwrap_or(rust_decimal::Decimal::ZERO), q.magnitude.sig_fig);
                    Ok(Value::Quantity(Quantity::new(q.formula.clone(), magnitude, q.unit.clone())))
                }),
            );
        }
    }

    pub fn global_env(&self) -> EnvId {
        self.global
    }

    pub fn run(&mut self, program: &Program, handler: &mut ErrorHandler) -> Result<Value, ChemError> {
        let mut last = Value::Na;
        for stmt in program {
            last = self.eval_stmt(stmt, self.global, handler)?.into_value();
        }
        Ok(last)
    }

    // ---- statements ----

    fn eval_stmt(&mut self, stmt: &Stmt, env: EnvId, handler: &mut ErrorHandler) -> Result<Outcome, ChemError> {
        match stmt {
            Stmt::Expr(expr) => Ok(Outcome::Normal(self.eval_expr(expr, env, handler)?)),
            Stmt::Block(stmts) => self.eval_block(stmts, env, handler),
            Stmt::Exam { cond, pass_stmt, fail_stmt } => {
                let taken = self.eval_expr(cond, env, handler)?.is_truthy();
                if taken {
                    let scope = self.env.child(env);
                    self.eval_stmt(pass_stmt, scope, handler)
                } else if let Some(fail_stmt) = fail_stmt {
                    let scope = self.env.child(env);
                    self.eval_stmt(fail_stmt, scope, handler)
                } else {
                    Ok(Outcome::Normal(Value::Na))
                }
            }
            Stmt::During { cond, body } => {
                let mut results = Vec::new();
                while self.eval_expr(cond, env, handler)?.is_truthy() {
                    let scope = self.env.child(env);
                    match self.eval_stmt(body, scope, handler)? {
                        Outcome::Normal(v) => results.push(v),
                        submit @ Outcome::Submit(_) => return Ok(submit),
                    }
                }
                Ok(Outcome::Normal(Value::List(results)))
            }
            Stmt::Redo { identifier, interval, body } => {
                let items = match self.eval_expr(interval, env, handler)? {
                    Value::List(items) => items,
                    other => vec![other],
                };
                let mut results = Vec::new();
                for item in items {
                    let scope = self.env.child(env);
                    self.env.define(scope, identifier, item);
                    match self.eval_stmt(body, scope, handler)? {
                        Outcome::Normal(v) => results.push(v),
                        submit @ Outcome::Submit(_) => return Ok(submit),
                    }
                }
                Ok(Outcome::Normal(Value::List(results)))
            }
            Stmt::Work { identifier, params, body } => {
                let work = Value::Work(Rc::new(Work {
                    identifier: identifier.clone(),
                    params: params.clone(),
                    body: (**body).clone(),
                    closure: env,
                }));
                self.env.define(env, identifier, work);
                Ok(Outcome::Normal(Value::Na))
            }
            Stmt::Submit(expr) => Ok(Outcome::Submit(self.eval_expr(expr, env, handler)?)),
        }
    }

    fn eval_block(&mut self, stmts: &[Stmt], env: EnvId, handler: &mut ErrorHandler) -> Result<Outcome, ChemError> {
        let mut last = Value::Na;
        for stmt in stmts {
            match self.eval_stmt(stmt, env, handler)? {
                Outcome::Normal(v) => last = v,
                submit @ Outcome::Submit(_) => return Ok(submit),
            }
        }
        Ok(Outcome::Normal(last))
    }

    // ---- expressions ----

    fn eval_expr(&mut self, expr: &Expr, env: EnvId, handler: &mut ErrorHandler) -> Result<Value, ChemError> {
        match expr {
            Expr::Literal(lit) => self.eval_literal(lit, env, handler),
            Expr::Variable { name, .. } => self.env.lookup(env, name, handler),
            Expr::Grouping(inner) => self.eval_expr(inner, env, handler),
            Expr::Unary { op, right, line } => {
                let value = self.eval_expr(right, env, handler)?;
                self.eval_unary(*op, value, *line, handler)
            }
            Expr::Binary { left, op, right, line } => {
                let lhs = self.eval_expr(left, env, handler)?;
                let rhs = self.eval_expr(right, env, handler)?;
                self.eval_binary(lhs, *op, rhs, *line, handler)
            }
            Expr::Assign { name, value, .. } => {
                let v = self.eval_expr(value, env, handler)?;
                self.env.assign(env, name, v.clone());
                Ok(v)
            }
            Expr::Call { callee, args, line } => {
                let callee_value = self.eval_expr(callee, env, handler)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for a in args {
                    arg_values.push(self.eval_expr(a, env, handler)?);
                }
                self.eval_call(callee_value, arg_values, *line, handler)
            }
            Expr::Interval { start, end, line } => {
                let start = self.eval_expr(start, env, handler)?;
                let end = self.eval_expr(end, env, handler)?;
                self.eval_interval(start, end, *line, handler)
            }
            Expr::Conversion { value, target, reactions, line } => {
                let v = self.eval_expr(value, env, handler)?;
                self.eval_conversion(v, target, reactions, env, *line, handler)
            }
            Expr::Write { path, expr, .. } => {
                let value = self.eval_expr(expr, env, handler)?;
                let rendered = stringify(&value);
                let mut file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| handler.io(e.to_string(), None))?;
                writeln!(file, "{rendered}").map_err(|e| handler.io(e.to_string(), None))?;
                Ok(value)
            }
            Expr::FormulaLiteral { formula, .. } => {
                let resolved = self.resolve_formula(formula, env, handler)?;
                Ok(Value::Quantity(resolved.molecular_mass(&self.table, handler)?))
            }
        }
    }

    fn eval_literal(&mut self, lit: &Literal, env: EnvId, handler: &mut ErrorHandler) -> Result<Value, ChemError> {
        Ok(match lit {
            Literal::Na => Value::Na,
            Literal::Pass => Value::Bool(true),
            Literal::Fail => Value::Bool(false),
            Literal::Quantity(q) => Value::Quantity(q.clone()),
            Literal::Str(s) => {
                let text = self.interpolate(s, env, handler)?;
                Value::Str(Rc::new(ChString::new(text, false)))
            }
            Literal::Path(p) => Value::Str(Rc::new(ChString::new(p.display().to_string(), false))),
        })
    }

    /// Renders an `s'...'` string, evaluating each `{expr}` span against the
    /// current environment and splicing its stringified result back in,
    /// mirroring `CHString.substituted`'s span re-evaluation and escaped
    /// `\{`/`\}` cleanup. A plain (non-interpolated) string is returned
    /// as-is.
    fn interpolate(&mut self, s: &ChString, env: EnvId, handler: &mut ErrorHandler) -> Result<String, ChemError> {
        if !s.interpolated {
            return Ok(s.text.clone());
        }
        let spans = s.spans(handler);
        let chars: Vec<char> = s.text.chars().collect();

        let mut result = String::new();
        let mut cursor = 0usize;
        for (start, end) in spans {
            let source: String = chars[start..end].iter().collect();
            let value = self.eval_fragment(&source, env, handler)?;
            result.extend(chars[cursor..start - 1].iter());
            result.push_str(&stringify(&value));
            cursor = end + 1;
        }
        result.extend(chars[cursor..].iter());
        Ok(result.replace("\\}", "}").replace("\\{", "{"))
    }

    /// Scans, parses and evaluates a standalone expression fragment (the
    /// contents of one `{...}` span) against the given environment, the way
    /// `CHString.substituted` re-invokes the top-level `evaluate` on each
    /// extracted span.
    fn eval_fragment(&mut self, source: &str, env: EnvId, handler: &mut ErrorHandler) -> Result<Value, ChemError> {
        let tokens = Scanner::new(source, &self.table, handler).scan_tokens();
        let program = Parser::new(tokens, handler).parse();
        let mut last = Value::Na;
        for stmt in &program {
            last = self.eval_stmt(stmt, env, handler)?.into_value();
        }
        Ok(last)
    }

    /// Resolves every dynamic `_{expr}`/`^{expr}` count or charge in a
    /// formula literal against `env`, producing a formula whose element and
    /// group counts are all fixed decimals — the Rust analogue of
    /// `EvalDecimal` evaluating its pending string the first time the
    /// count/charge is read.
    fn resolve_formula(&mut self, formula: &Formula, env: EnvId, handler: &mut ErrorHandler) -> Result<Formula, ChemError> {
        let terms = formula
            .terms
            .iter()
            .map(|t| self.resolve_term(t, env, handler))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Formula { terms, count: formula.count, charge: formula.charge })
    }

    fn resolve_term(&mut self, term: &Term, env: EnvId, handler: &mut ErrorHandler) -> Result<Term, ChemError> {
        match term {
            Term::Element(e) => {
                let count = self.resolve_count(&e.count, env, handler)?;
                let charge = self.resolve_count(&e.charge, env, handler)?;
                Ok(Term::Element(Element::with_count(e.symbol.clone(), count).with_charge(charge)))
            }
            Term::Partial(p) => {
                let inner = p
                    .terms
                    .iter()
                    .map(|f| self.resolve_formula(f, env, handler))
                    .collect::<Result<Vec<_>, _>>()?;
                let count = self.resolve_count(&p.count, env, handler)?;
                let charge = self.resolve_count(&p.charge, env, handler)?;
                Ok(Term::Partial(PartialFormula::new(inner).with_count(count).with_charge(charge)))
            }
        }
    }

    fn resolve_count(&mut self, count: &Count, env: EnvId, handler: &mut ErrorHandler) -> Result<Count, ChemError> {
        let Count::Dynamic(src) = count else {
            return Ok(count.clone());
        };
        let value = self.eval_fragment(src, env, handler)?;
        let Value::Quantity(q) = value else {
            return Err(handler.type_error(
                format!("Subscript/superscript expression '{src}' must evaluate to a quantity"),
                None,
            ));
        };
        Ok(Count::Fixed(q.magnitude.value))
    }

    fn eval_unary(&mut self, op: TokenKind, value: Value, line: u32, handler: &mut ErrorHandler) -> Result<Value, ChemError> {
        // `!` negates truthiness of any value, not just quantities (`not
        // right` in the original, unlike `+`/`-`/`~` which are quantity-only
        // arithmetic operators).
        if op == TokenKind::Not {
            return Ok(Value::Bool(!value.is_truthy()));
        }
        let Value::Quantity(q) = value else {
            return Err(handler.type_error(format!("Bad operand type for unary {}", op.describe()), Some(line)));
        };
        match op {
            TokenKind::Add => Ok(Value::Quantity(q.pos())),
            TokenKind::Sub => Ok(Value::Quantity(q.neg())),
            TokenKind::Tilde => Ok(Value::Quantity(q.invert(handler)?)),
            _ => unreachable!("unary() never produces other operators"),
        }
    }

    fn eval_binary(
        &mut self,
        lhs: Value,
        op: TokenKind,
        rhs: Value,
        line: u32,
        handler: &mut ErrorHandler,
    ) -> Result<Value, ChemError> {
        if op == TokenKind::And {
            return Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy()));
        }
        if op == TokenKind::Or {
            return Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy()));
        }
        if op == TokenKind::EqEq {
            return Ok(Value::Bool(lhs == rhs));
        }
        if op == TokenKind::NotEq {
            return Ok(Value::Bool(lhs != rhs));
        }

        let (Value::Quantity(a), Value::Quantity(b)) = (&lhs, &rhs) else {
            return Err(handler.type_error(
                format!("Bad operand types for {}", op.describe()),
                Some(line),
            ));
        };

        match op {
            TokenKind::Add => Ok(Value::Quantity(a.add(b, &self.table, None, handler)?)),
            TokenKind::Sub => Ok(Value::Quantity(a.sub(b, &self.table, None, handler)?)),
            TokenKind::Mul => Ok(Value::Quantity(a.mul(b, &self.table, None, handler)?)),
            TokenKind::Div => Ok(Value::Quantity(a.div(b, &self.table, None, handler)?)),
            TokenKind::Mod => Ok(Value::Quantity(a.modulo(b, &self.table, None, handler)?)),
            TokenKind::Caret | TokenKind::MulMul => Ok(Value::Quantity(a.pow(b, handler)?)),
            TokenKind::Lt => Ok(Value::Bool(a.compare(b, &self.table, None, handler)?.is_lt())),
            TokenKind::Le => Ok(Value::Bool(a.compare(b, &self.table, None, handler)?.is_le())),
            TokenKind::Gt => Ok(Value::Bool(a.compare(b, &self.table, None, handler)?.is_gt())),
            TokenKind::Ge => Ok(Value::Bool(a.compare(b, &self.table, None, handler)?.is_ge())),
            _ => Err(handler.type_error(format!("Unsupported operator {}", op.describe()), Some(line))),
        }
    }

    /// Both endpoints must be quantities — fixes the original's
    /// `not isinstance(start, Q) and isinstance(end, Q)` bug per the
    /// resolved open question. The end is exclusive, matching Python's
    /// `range(int(start), int(end))`.
    fn eval_interval(&mut self, start: Value, end: Value, line: u32, handler: &mut ErrorHandler) -> Result<Value, ChemError> {
        let (Value::Quantity(start), Value::Quantity(end)) = (&start, &end) else {
            return Err(handler.type_error("Interval endpoints must be quantities".to_string(), Some(line)));
        };
        let from = start.magnitude.to_i64();
        let to = end.magnitude.to_i64();
        let mut items = Vec::new();
        let mut i = from;
        while i < to {
            items.push(Value::Quantity(Quantity::new(
                start.formula.clone(),
                SigDigNumber::exact(rust_decimal::Decimal::from(i)),
                start.unit.clone(),
            )));
            i += 1;
        }
        Ok(Value::List(items))
    }

    fn eval_conversion(
        &mut self,
        value: Value,
        target: &ConversionTargetExpr,
        reactions: &[crate::chem::Reaction],
        env: EnvId,
        line: u32,
        handler: &mut ErrorHandler,
    ) -> Result<Value, ChemError> {
        let Value::Quantity(q) = value else {
            return Err(handler.type_error("Cannot convert a non-quantity value".to_string(), Some(line)));
        };

        let ctx: Option<ReactionContext> = if reactions.is_empty() {
            None
        } else {
            let show = self
                .env
                .lookup(env, "show_balanced_equation", handler)
                .map(|v| v.is_truthy())
                .unwrap_or(false);
            let mut combined: ReactionContext = HashMap::new();
            for reaction in reactions {
                let balanced = reaction.balanced(handler)?;
                if show {
                    println!("{balanced}");
                }
                combined.extend(balanced.context());
            }
            Some(combined)
        };

        let converted = match target {
            ConversionTargetExpr::Unit(unit) => {
                q.to(ConversionTarget::Unit(unit), ctx.as_ref(), &self.table, handler)?
            }
            ConversionTargetExpr::Formula(formula) => {
                q.to(ConversionTarget::Formula(formula), ctx.as_ref(), &self.table, handler)?
            }
        };
        Ok(Value::Quantity(converted))
    }

    fn eval_call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        line: u32,
        handler: &mut ErrorHandler,
    ) -> Result<Value, ChemError> {
        let Some(arity) = callee.arity() else {
            return Err(handler.type_error("Value is not callable".to_string(), Some(line)));
        };
        if arity != args.len() {
            return Err(handler.arity(
                format!("Expected {arity} argument(s), got {}", args.len()),
                Some(line),
            ));
        }
        match callee {
            Value::Native(native) => (native.func)(&args).map_err(|e| handler.record(e)),
            Value::Work(work) => {
                let call_scope = self.env.child(work.closure);
                for (param, arg) in work.params.iter().zip(args) {
                    self.env.define(call_scope, param, arg);
                }
                match self.eval_stmt(&work.body, call_scope, handler)? {
                    Outcome::Submit(v) => Ok(v),
                    Outcome::Normal(_) => Ok(Value::Na),
                }
            }
            _ => unreachable!("arity() only returns Some for Work/Native"),
        }
    }
}

fn native(
    name: &str,
    arity: usize,
    func: impl Fn(&[Value]) -> Result<Value, ChemError> + 'static,
) -> Value {
    Value::Native(Rc::new(NativeWork { name: name.to_string(), arity, func: Box::new(func) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn table() -> PeriodicTable {
        let mut h = ErrorHandler::new();
        PeriodicTable::from_json_str(
            r#"{"H":{"AtomicMass":"1.008"},"O":{"AtomicMass":"16.00"},"Na":{"AtomicMass":"22.99"},"Cl":{"AtomicMass":"35.45"}}"#,
            &mut h,
        )
        .unwrap()
    }

    fn run(src: &str) -> Value {
        let t = table();
        let mut handler = ErrorHandler::new();
        let tokens = Scanner::new(src, &t, &mut handler).scan_tokens();
        let program = Parser::new(tokens, &mut handler).parse();
        assert!(!handler.had_error(), "scan/parse error on {src:?}");
        let mut interp = Interpreter::new(t);
        interp.run(&program, &mut handler).expect("evaluation should succeed")
    }

    #[test]
    fn evaluates_arithmetic() {
        let v = run("1 + 2 * 3\n");
        match v {
            Value::Quantity(q) => assert_eq!(q.magnitude.to_i64(), 7),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn assignment_and_lookup_roundtrip() {
        let v = run("x = 5\nx + 1\n");
        match v {
            Value::Quantity(q) => assert_eq!(q.magnitude.to_i64(), 6),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn work_can_recurse() {
        let v = run(
            "work fact(n)\n    exam n <= 1\n        submit 1\n    fail\n        submit n * fact(n - 1)\nfact(5)\n",
        );
        match v {
            Value::Quantity(q) => assert_eq!(q.magnitude.to_i64(), 120),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn during_loop_collects_results() {
        let v = run("i = 0\nduring i < 3\n    i += 1\n");
        assert!(matches!(v, Value::List(items) if items.len() == 3));
    }

    #[test]
    fn comparisons_and_booleans() {
        let v = run("1 < 2\n");
        assert_eq!(v, Value::Bool(true));
    }
}
