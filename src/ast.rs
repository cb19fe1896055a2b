//! Abstract syntax tree produced by the parser and walked by the
//! interpreter.

use std::path::PathBuf;
use std::rc::Rc;

use crate::chem::{Formula, Reaction};
use crate::token::TokenKind;
use crate::value::ChString;

/// A parsed program is just a sequence of statements.
pub type Program = Vec<Stmt>;

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Variable { name: String, line: u32 },
    Grouping(Box<Expr>),
    Unary { op: TokenKind, right: Box<Expr>, line: u32 },
    Binary { left: Box<Expr>, op: TokenKind, right: Box<Expr>, line: u32 },
    Assign { name: String, value: Box<Expr>, line: u32 },
    Call { callee: Box<Expr>, args: Vec<Expr>, line: u32 },
    Interval { start: Box<Expr>, end: Box<Expr>, line: u32 },
    /// `value : reaction1, reaction2 -> target` (explicit context) or a bare
    /// `value -> target` (no reaction context, only for same-dimension
    /// unit conversion).
    Conversion {
        value: Box<Expr>,
        target: ConversionTargetExpr,
        reactions: Vec<Reaction>,
        line: u32,
    },
    Write { path: PathBuf, expr: Box<Expr>, line: u32 },
    /// A bare formula used as a value, e.g. `H2O + na` — evaluates to its
    /// molecular mass in grams per mole (`ch_interpreter.py`'s
    /// `@evaluate.register(CHFormula)`).
    FormulaLiteral { formula: Formula, line: u32 },
}

#[derive(Debug, Clone)]
pub enum ConversionTargetExpr {
    Unit(crate::unit::Unit),
    Formula(crate::chem::FormulaUnit),
}

#[derive(Debug, Clone)]
pub enum Literal {
    Na,
    Pass,
    Fail,
    Quantity(crate::chem::Quantity),
    Str(Rc<ChString>),
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Block(Vec<Stmt>),
    Exam {
        cond: Expr,
        pass_stmt: Box<Stmt>,
        fail_stmt: Option<Box<Stmt>>,
    },
    During { cond: Expr, body: Box<Stmt> },
    Redo { identifier: String, interval: Expr, body: Box<Stmt> },
    Work { identifier: String, params: Vec<String>, body: Box<Stmt> },
    Submit(Expr),
}
