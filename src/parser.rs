//! Recursive-descent parser (the "PA" component).
//!
//! Grammar mirrors `chemistry_lang/ch_parser.py` precedence chain exactly:
//! `expr -> write -> interval -> assign -> or_expr -> and_expr -> eq -> cp
//! -> term -> factor -> unary -> exp -> call -> atom`.

use std::path::PathBuf;

use crate::ast::{ConversionTargetExpr, Expr, Literal, Program, Stmt};
use crate::chem::{Formula, FormulaUnit, Reaction};
use crate::error::{ChemError, ErrorHandler};
use crate::token::{Token, TokenKind, TokenValue};
use crate::value::ChString;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    handler: &'a mut ErrorHandler,
}

/// Statement-leading keywords a `synchronize()` call resumes on, mirroring
/// the original's resync set.
const SYNC_KINDS: &[TokenKind] = &[
    TokenKind::Exam,
    TokenKind::Doc,
    TokenKind::Submit,
    TokenKind::Fail,
    TokenKind::Redo,
    TokenKind::During,
    TokenKind::Work,
];

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, handler: &'a mut ErrorHandler) -> Self {
        Parser { tokens, current: 0, handler }
    }

    pub fn parse(mut self) -> Program {
        let mut stmts = Vec::new();
        while !self.end() {
            self.opt_sep();
            if self.end() {
                break;
            }
            match self.stmt() {
                Ok(s) => stmts.push(s),
                Err(_) => self.synchronize(),
            }
        }
        stmts
    }

    fn synchronize(&mut self) {
        self.advance();
        while !self.end() {
            if self.previous().kind == TokenKind::Sep {
                return;
            }
            if SYNC_KINDS.contains(&self.peek().kind) {
                return;
            }
            self.advance();
        }
    }

    // ---- statements ----

    fn stmt(&mut self) -> Result<Stmt, ChemError> {
        if self.match_kind(TokenKind::Work).is_some() {
            return self.work();
        }
        if self.match_kind(TokenKind::Redo).is_some() {
            return self.redo();
        }
        if self.match_kind(TokenKind::During).is_some() {
            return self.during();
        }
        if self.match_kind(TokenKind::Exam).is_some() {
            return self.exam();
        }
        if self.match_kind(TokenKind::Submit).is_some() {
            return self.submit();
        }
        if self.match_kind(TokenKind::Indent).is_some() {
            return self.block_body();
        }
        self.expr_stmt()
    }

    fn expr_stmt(&mut self) -> Result<Stmt, ChemError> {
        let line = self.peek().line;
        let expr = self.expr()?;
        self.sep(line)?;
        Ok(Stmt::Expr(expr))
    }

    /// Consumes the block's closing `Done` too (mirrors `block()` swallowing
    /// the matching `done` after an `INDENT`).
    fn block_body(&mut self) -> Result<Stmt, ChemError> {
        let mut stmts = Vec::new();
        loop {
            self.opt_sep();
            if self.match_kind(TokenKind::Dedent).is_some() || self.end() {
                break;
            }
            stmts.push(self.stmt()?);
        }
        Ok(Stmt::Block(stmts))
    }

    /// The INDENT..stmt*..DEDENT block form. Used everywhere a multi-line
    /// body is expected after a `SEP`.
    fn block(&mut self) -> Result<Stmt, ChemError> {
        self.expect(TokenKind::Indent)?;
        let mut stmts = Vec::new();
        loop {
            self.opt_sep();
            if self.match_kind(TokenKind::Dedent).is_some() || self.end() {
                break;
            }
            stmts.push(self.stmt()?);
        }
        Ok(Stmt::Block(stmts))
    }

    /// `be()`: a statement body that's either an indented block (after a
    /// newline) or a single inline expression.
    fn be(&mut self) -> Result<Stmt, ChemError> {
        if self.match_kind(TokenKind::Sep).is_some() {
            self.block()
        } else {
            let line = self.peek().line;
            let expr = self.expr()?;
            self.opt_sep();
            let _ = line;
            Ok(Stmt::Expr(expr))
        }
    }

    fn opt_sep(&mut self) {
        while self.match_kind(TokenKind::Sep).is_some() {}
    }

    fn sep(&mut self, line: u32) -> Result<(), ChemError> {
        if self.match_kind(TokenKind::Sep).is_some() || self.end() {
            Ok(())
        } else {
            Err(self.error("Expect newline after statement", line))
        }
    }

    fn work(&mut self) -> Result<Stmt, ChemError> {
        let name_tok = self.expect(TokenKind::Id)?;
        let identifier = name_tok.value.as_ident().unwrap().to_string();
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let p = self.expect(TokenKind::Id)?;
                params.push(p.value.as_ident().unwrap().to_string());
                if self.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.be()?;
        Ok(Stmt::Work { identifier, params, body: Box::new(body) })
    }

    fn redo(&mut self) -> Result<Stmt, ChemError> {
        let name_tok = self.expect(TokenKind::Id)?;
        let identifier = name_tok.value.as_ident().unwrap().to_string();
        self.expect(TokenKind::Of)?;
        let interval = self.expr()?;
        let body = self.be()?;
        Ok(Stmt::Redo { identifier, interval, body: Box::new(body) })
    }

    fn during(&mut self) -> Result<Stmt, ChemError> {
        let cond = self.expr()?;
        let body = self.be()?;
        Ok(Stmt::During { cond, body: Box::new(body) })
    }

    fn exam(&mut self) -> Result<Stmt, ChemError> {
        let cond = self.expr()?;
        let pass_stmt = self.be()?;
        self.opt_sep();
        let fail_stmt = if self.match_kind(TokenKind::Makeup).is_some() {
            Some(Box::new(self.exam()?))
        } else if self.match_kind(TokenKind::Fail).is_some() {
            Some(Box::new(self.be()?))
        } else {
            None
        };
        Ok(Stmt::Exam { cond, pass_stmt: Box::new(pass_stmt), fail_stmt })
    }

    fn submit(&mut self) -> Result<Stmt, ChemError> {
        let line = self.previous().line;
        let expr = self.expr()?;
        self.sep(line)?;
        Ok(Stmt::Submit(expr))
    }

    // ---- expressions ----

    fn expr(&mut self) -> Result<Expr, ChemError> {
        self.write()
    }

    fn write(&mut self) -> Result<Expr, ChemError> {
        let line = self.peek().line;
        let mut expr = self.interval()?;
        if self.match_kind(TokenKind::Arrow).is_some() {
            let path_tok = self.expect(TokenKind::Path)?;
            let path: PathBuf = path_tok.value.as_path().unwrap().clone();
            expr = Expr::Write { path, expr: Box::new(expr), line };
        }
        Ok(expr)
    }

    fn interval(&mut self) -> Result<Expr, ChemError> {
        let line = self.peek().line;
        let start = self.assign()?;
        if self.match_kind(TokenKind::Interval).is_some() {
            let end = self.assign()?;
            return Ok(Expr::Interval { start: Box::new(start), end: Box::new(end), line });
        }
        Ok(start)
    }

    fn assign(&mut self) -> Result<Expr, ChemError> {
        let line = self.peek().line;
        let expr = self.or_expr()?;
        let compound = [
            (TokenKind::AddEq, TokenKind::Add),
            (TokenKind::SubEq, TokenKind::Sub),
            (TokenKind::MulEq, TokenKind::Mul),
            (TokenKind::DivEq, TokenKind::Div),
            (TokenKind::ModEq, TokenKind::Mod),
            (TokenKind::CaretEq, TokenKind::Caret),
            (TokenKind::MulMulEq, TokenKind::MulMul),
        ];
        for (compound_kind, plain_op) in compound {
            if self.match_kind(compound_kind).is_some() {
                let name = self.variable_name(&expr, line)?;
                let rhs = self.expr()?;
                let desugared = Expr::Binary {
                    left: Box::new(expr),
                    op: plain_op,
                    right: Box::new(rhs),
                    line,
                };
                return Ok(Expr::Assign { name, value: Box::new(desugared), line });
            }
        }
        if self.match_kind(TokenKind::Assign).is_some() {
            let name = self.variable_name(&expr, line)?;
            let value = self.expr()?;
            return Ok(Expr::Assign { name, value: Box::new(value), line });
        }
        Ok(expr)
    }

    fn variable_name(&mut self, expr: &Expr, line: u32) -> Result<String, ChemError> {
        match expr {
            Expr::Variable { name, .. } => Ok(name.clone()),
            _ => Err(self.error("Invalid assignment target", line)),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ChemError> {
        self.binary_left(&[TokenKind::Or], Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Expr, ChemError> {
        self.binary_left(&[TokenKind::And], Self::eq)
    }

    fn eq(&mut self) -> Result<Expr, ChemError> {
        self.binary_left(&[TokenKind::EqEq, TokenKind::NotEq], Self::cp)
    }

    fn cp(&mut self) -> Result<Expr, ChemError> {
        self.binary_left(&[TokenKind::Lt, TokenKind::Le, TokenKind::Gt, TokenKind::Ge], Self::term)
    }

    fn term(&mut self) -> Result<Expr, ChemError> {
        self.binary_left(&[TokenKind::Add, TokenKind::Sub], Self::factor)
    }

    fn binary_left(
        &mut self,
        ops: &[TokenKind],
        mut next: impl FnMut(&mut Self) -> Result<Expr, ChemError>,
    ) -> Result<Expr, ChemError> {
        let line = self.peek().line;
        let mut left = next(self)?;
        loop {
            let Some(op) = self.match_any(ops) else { break };
            let right = next(self)?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), line };
        }
        Ok(left)
    }

    /// `value : reaction1, reaction2 -> target`. Each listed `reaction()`
    /// parses its own reactants `->` products; the colons bracket the whole
    /// list (`expect(COLON)` opens it in `factor()`, another `expect(COLON)`
    /// closes it here), and the conversion's own `-> target` follows.
    fn factor(&mut self) -> Result<Expr, ChemError> {
        let line = self.peek().line;
        let mut left = self.unary()?;
        loop {
            if let Some(op) = self.match_any(&[TokenKind::Mul, TokenKind::Div, TokenKind::Mod]) {
                let right = self.unary()?;
                left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), line };
            } else if self.match_kind(TokenKind::Colon).is_some() {
                let reactions = self.reactions()?;
                self.expect(TokenKind::Arrow)?;
                let target = self.conversion_target()?;
                left = Expr::Conversion {
                    value: Box::new(left),
                    target,
                    reactions,
                    line,
                };
            } else if self.check(TokenKind::Arrow) && self.peek_next().kind != TokenKind::Path {
                while self.match_kind(TokenKind::Arrow).is_some() {
                    let target = self.conversion_target()?;
                    left = Expr::Conversion {
                        value: Box::new(left),
                        target,
                        reactions: Vec::new(),
                        line,
                    };
                }
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn conversion_target(&mut self) -> Result<ConversionTargetExpr, ChemError> {
        if self.check(TokenKind::Formula) {
            let tok = self.expect(TokenKind::Formula)?;
            let formula = tok.value.as_formula().unwrap().clone();
            Ok(ConversionTargetExpr::Formula(FormulaUnit::new(vec![formula])))
        } else {
            let tok = self.expect(TokenKind::Unit)?;
            Ok(ConversionTargetExpr::Unit(tok.value.as_unit().unwrap().clone()))
        }
    }

    fn reactions(&mut self) -> Result<Vec<Reaction>, ChemError> {
        let mut rxns = vec![self.reaction()?];
        while self.match_kind(TokenKind::Comma).is_some() {
            rxns.push(self.reaction()?);
        }
        self.expect(TokenKind::Colon)?;
        Ok(rxns)
    }

    fn reaction(&mut self) -> Result<Reaction, ChemError> {
        let line = self.peek().line;
        let mut reactants = vec![self.formula_term()?];
        while self.match_kind(TokenKind::Add).is_some() {
            reactants.push(self.formula_term()?);
        }
        self.expect(TokenKind::Arrow)?;
        let mut products = vec![self.formula_term()?];
        while self.match_kind(TokenKind::Add).is_some() {
            products.push(self.formula_term()?);
        }
        Ok(Reaction::new(reactants, products, Some(line)))
    }

    fn formula_term(&mut self) -> Result<Formula, ChemError> {
        let tok = self.expect(TokenKind::Formula)?;
        Ok(tok.value.as_formula().unwrap().clone())
    }

    fn unary(&mut self) -> Result<Expr, ChemError> {
        let line = self.peek().line;
        if let Some(op) =
            self.match_any(&[TokenKind::Add, TokenKind::Sub, TokenKind::Tilde, TokenKind::Not])
        {
            let right = self.unary()?;
            return Ok(Expr::Unary { op, right: Box::new(right), line });
        }
        self.exp()
    }

    fn exp(&mut self) -> Result<Expr, ChemError> {
        let line = self.peek().line;
        let left = self.call()?;
        if let Some(op) = self.match_any(&[TokenKind::Caret, TokenKind::MulMul]) {
            let right = if self.match_kind(TokenKind::LBrace).is_some() {
                let inner = self.expr()?;
                self.expect(TokenKind::RBrace)?;
                inner
            } else {
                self.unary()?
            };
            return Ok(Expr::Binary { left: Box::new(left), op, right: Box::new(right), line });
        }
        Ok(left)
    }

    fn call(&mut self) -> Result<Expr, ChemError> {
        let line = self.peek().line;
        let mut expr = self.atom()?;
        while self.match_kind(TokenKind::LParen).is_some() {
            let mut args = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    args.push(self.expr()?);
                    if self.match_kind(TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
            expr = Expr::Call { callee: Box::new(expr), args, line };
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr, ChemError> {
        let line = self.peek().line;
        if let Some(tok) = self.match_kind(TokenKind::Num) {
            let magnitude = tok.value.as_number().unwrap().clone();
            let unit = if let Some(u) = self.match_kind(TokenKind::Unit) {
                u.value.as_unit().unwrap().clone()
            } else {
                crate::unit::Unit::dimensionless()
            };
            let formula = self.match_kind(TokenKind::Formula).map(|f| {
                FormulaUnit::new(vec![f.value.as_formula().unwrap().clone()])
            });
            return Ok(Expr::Literal(Literal::Quantity(crate::chem::Quantity::new(
                formula, magnitude, unit,
            ))));
        }
        if let Some(tok) = self.match_kind(TokenKind::Path) {
            return Ok(Expr::Literal(Literal::Path(tok.value.as_path().unwrap().clone())));
        }
        if let Some(tok) = self.match_kind(TokenKind::Str) {
            let interpolated = tok.attr.as_ref().is_some_and(|a| a.interpolated);
            let text = tok.value.as_text().unwrap().to_string();
            return Ok(Expr::Literal(Literal::Str(std::rc::Rc::new(ChString::new(
                text,
                interpolated,
            )))));
        }
        if self.match_kind(TokenKind::Na).is_some() {
            return Ok(Expr::Literal(Literal::Na));
        }
        if self.match_kind(TokenKind::Pass).is_some() {
            return Ok(Expr::Literal(Literal::Pass));
        }
        if self.match_kind(TokenKind::Fail).is_some() {
            return Ok(Expr::Literal(Literal::Fail));
        }
        if let Some(tok) = self.match_kind(TokenKind::Id) {
            return Ok(Expr::Variable { name: tok.value.as_ident().unwrap().to_string(), line });
        }
        if let Some(tok) = self.match_kind(TokenKind::Formula) {
            return Ok(Expr::FormulaLiteral { formula: tok.value.as_formula().unwrap().clone(), line });
        }
        if self.match_kind(TokenKind::LParen).is_some() {
            let inner = self.expr()?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::Grouping(Box::new(inner)));
        }
        Err(self.error(&format!("Expect expression, found {}", self.peek().kind.describe()), line))
    }

    // ---- cursor primitives ----

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next(&self) -> &Token {
        let idx = (self.current + 1).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> &Token {
        if !self.end() {
            self.current += 1;
        }
        self.previous()
    }

    fn end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.end() && self.peek().kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance().clone())
        } else {
            None
        }
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> Option<TokenKind> {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return Some(kind);
            }
        }
        None
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ChemError> {
        if self.check(kind) {
            Ok(self.advance().clone())
        } else {
            let line = self.peek().line;
            let found = self.peek().kind.describe();
            Err(self.error(&format!("Expect {}, found {found}", kind.describe()), line))
        }
    }

    fn error(&mut self, message: &str, line: u32) -> ChemError {
        self.handler.parse(message.to_string(), Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::periodic_table::PeriodicTable;
    use crate::scanner::Scanner;

    fn table() -> PeriodicTable {
        let mut h = ErrorHandler::new();
        PeriodicTable::from_json_str(
            r#"{"H":{"AtomicMass":"1.008"},"O":{"AtomicMass":"16.00"}}"#,
            &mut h,
        )
        .unwrap()
    }

    fn parse(src: &str) -> (Program, bool) {
        let t = table();
        let mut handler = ErrorHandler::new();
        let tokens = Scanner::new(src, &t, &mut handler).scan_tokens();
        let program = Parser::new(tokens, &mut handler).parse();
        (program, handler.had_error())
    }

    #[test]
    fn parses_arithmetic_with_precedence() {
        let (program, had_error) = parse("1 + 2 * 3\n");
        assert!(!had_error);
        assert_eq!(program.len(), 1);
        match &program[0] {
            Stmt::Expr(Expr::Binary { op: TokenKind::Add, right, .. }) => {
                assert!(matches!(**right, Expr::Binary { op: TokenKind::Mul, .. }));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_assignment_to_variable() {
        let (program, had_error) = parse("x = 1\n");
        assert!(!had_error);
        assert!(matches!(program[0], Stmt::Expr(Expr::Assign { .. })));
    }

    #[test]
    fn parses_compound_assignment_desugaring() {
        let (program, had_error) = parse("x += 1\n");
        assert!(!had_error);
        match &program[0] {
            Stmt::Expr(Expr::Assign { value, .. }) => {
                assert!(matches!(**value, Expr::Binary { op: TokenKind::Add, .. }));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_work_declaration_with_params() {
        let (program, had_error) = parse("work add(a, b)\n    submit a + b\n");
        assert!(!had_error);
        assert!(matches!(program[0], Stmt::Work { .. }));
    }

    #[test]
    fn parses_exam_with_fail_branch() {
        let (program, had_error) = parse("exam pass\n    1\nfail\n    2\n");
        assert!(!had_error);
        match &program[0] {
            Stmt::Exam { fail_stmt: Some(_), .. } => {}
            other => panic!("expected exam with fail branch, got {other:?}"),
        }
    }

    #[test]
    fn parses_interval_expression() {
        let (program, had_error) = parse("1...5\n");
        assert!(!had_error);
        assert!(matches!(program[0], Stmt::Expr(Expr::Interval { .. })));
    }
}
