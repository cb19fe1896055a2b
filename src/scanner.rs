//! Hand-rolled, indentation-sensitive lexical scanner.
//!
//! Unlike a grammar-driven scanner, this one has to decide — character by
//! character — whether a run of letters is a chemical formula, a unit, a
//! keyword or a bare identifier, and it has to track Python-style
//! indentation without a preprocessing pass. Both of those are easiest to
//! express as a hand-written char scanner rather than a lexer generator.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use rust_decimal::Decimal;

use crate::chem::{Count, Element, Formula, PartialFormula, Term};
use crate::error::{ChemError, ErrorHandler};
use crate::number::SigDigNumber;
use crate::periodic_table::PeriodicTable;
use crate::token::{Token, TokenAttr, TokenKind, TokenValue};
use crate::unit::Unit;

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("na", TokenKind::Na),
    ("exam", TokenKind::Exam),
    ("done", TokenKind::Done),
    ("submit", TokenKind::Submit),
    ("pass", TokenKind::Pass),
    ("fail", TokenKind::Fail),
    ("redo", TokenKind::Redo),
    ("during", TokenKind::During),
    ("makeup", TokenKind::Makeup),
    ("of", TokenKind::Of),
    ("work", TokenKind::Work),
    ("doc", TokenKind::Doc),
];

fn whitespace_depth(c: char) -> Option<u32> {
    match c {
        ' ' => Some(1),
        '\t' => Some(4),
        _ => None,
    }
}

/// What a subscript/superscript scan produced: a plain literal, or raw text
/// from a `{...}` form whose evaluation the CVM layer does not support.
enum Script {
    Number(Decimal),
    Expr(String),
    Default(Decimal),
}

pub struct Scanner<'a> {
    chars: Vec<char>,
    start: usize,
    current: usize,
    line: u32,
    start_of_line: bool,
    indent_stack: Vec<u32>,
    tokens: Vec<Token>,
    start_letters: HashMap<char, HashSet<char>>,
    handler: &'a mut ErrorHandler,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &str, table: &PeriodicTable, handler: &'a mut ErrorHandler) -> Self {
        Scanner {
            chars: source.trim().chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            start_of_line: true,
            indent_stack: Vec::new(),
            tokens: Vec::new(),
            start_letters: build_start_letters(table),
            handler,
        }
    }

    pub fn scan_tokens(mut self) -> Vec<Token> {
        while !self.is_end() {
            self.scan_token();
            self.start = self.current;
        }
        if self.chars.last() != Some(&'\n') {
            self.add_token(TokenKind::Sep, TokenValue::None);
        }
        while let Some(depth) = self.indent_stack.pop() {
            self.add_token(TokenKind::Dedent, TokenValue::Depth(depth));
        }
        self.add_token(TokenKind::Eof, TokenValue::None);
        self.tokens
    }

    // --- low-level cursor helpers ---

    fn is_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.current).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.current + offset).copied()
    }

    fn previous(&self) -> Option<char> {
        if self.current == 0 {
            None
        } else {
            self.chars.get(self.current - 1).copied()
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.current += 1;
        Some(c)
    }

    fn match_one(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, options: &[char]) -> Option<char> {
        let c = self.peek()?;
        if options.contains(&c) {
            self.current += 1;
            Some(c)
        } else {
            None
        }
    }

    fn slice(&self, from: usize, to: usize) -> String {
        self.chars[from..to].iter().collect()
    }

    fn add_token(&mut self, kind: TokenKind, value: TokenValue) {
        self.tokens.push(Token::with_value(kind, value, self.line));
    }

    fn add_token_attr(&mut self, kind: TokenKind, value: TokenValue, attr: TokenAttr) {
        self.tokens.push(Token::with_value(kind, value, self.line).with_attr(attr));
    }

    fn error(&mut self, message: impl Into<String>) -> ChemError {
        self.handler.scan(message.into(), Some(self.line))
    }

    // --- indentation ---

    fn indent(&mut self) {
        if !self.start_of_line {
            return;
        }
        let mut depth = 0u32;
        while let Some(d) = self.peek().and_then(whitespace_depth) {
            self.current += 1;
            depth += d;
        }
        self.start = self.current;
        self.start_of_line = false;

        while matches!(self.indent_stack.last(), Some(&top) if top > depth) {
            let popped = self.indent_stack.pop().unwrap();
            self.add_token(TokenKind::Dedent, TokenValue::Depth(popped));
        }

        if depth != 0 && self.indent_stack.last().map_or(true, |&top| depth > top) {
            self.indent_stack.push(depth);
            self.add_token(TokenKind::Indent, TokenValue::Depth(depth));
        }
    }

    // --- the main dispatch ---

    fn scan_token(&mut self) {
        self.indent();
        if self.is_end() {
            return;
        }
        let prev = match self.advance() {
            Some(c) => c,
            None => return,
        };

        match prev {
            ' ' | '\t' => {}
            '(' => self.add_token(TokenKind::LParen, TokenValue::None),
            ')' => self.add_token(TokenKind::RParen, TokenValue::None),
            '{' => self.add_token(TokenKind::LBrace, TokenValue::None),
            '}' => self.add_token(TokenKind::RBrace, TokenValue::None),
            ',' => self.add_token(TokenKind::Comma, TokenValue::None),
            '_' => self.add_token(TokenKind::Underscore, TokenValue::None),
            '?' => self.add_token(TokenKind::Quest, TokenValue::None),
            ':' => self.add_token(TokenKind::Colon, TokenValue::None),
            '~' => self.add_token(TokenKind::Tilde, TokenValue::None),

            '+' => self.two_char(TokenKind::Add, TokenKind::AddEq),
            '!' => self.two_char(TokenKind::Not, TokenKind::NotEq),
            '%' => self.two_char(TokenKind::Mod, TokenKind::ModEq),
            '<' => self.two_char(TokenKind::Lt, TokenKind::Le),
            '>' => self.two_char(TokenKind::Gt, TokenKind::Ge),
            '=' => self.two_char(TokenKind::Assign, TokenKind::EqEq),
            '^' => self.two_char(TokenKind::Caret, TokenKind::CaretEq),
            '/' => self.two_char(TokenKind::Div, TokenKind::DivEq),

            '-' => {
                if self.match_one('>') {
                    self.add_token(TokenKind::Arrow, TokenValue::None);
                } else if self.match_one('=') {
                    self.add_token(TokenKind::SubEq, TokenValue::None);
                } else {
                    self.add_token(TokenKind::Sub, TokenValue::None);
                }
            }
            '*' => {
                if self.match_one('*') {
                    if self.match_one('=') {
                        self.add_token(TokenKind::MulMulEq, TokenValue::None);
                    } else {
                        self.add_token(TokenKind::MulMul, TokenValue::None);
                    }
                } else {
                    self.add_token(TokenKind::Mul, TokenValue::None);
                }
            }
            '&' => {
                if self.match_one('&') {
                    self.add_token(TokenKind::And, TokenValue::None);
                } else {
                    self.error("Expect '&' to be followed by '&'");
                }
            }
            '|' => {
                if self.match_one('|') {
                    self.add_token(TokenKind::Or, TokenValue::None);
                } else if !self.path() {
                    self.error("Invalid character '|'");
                }
            }
            '\n' => {
                self.start_of_line = true;
                self.line += 1;
                self.add_token(TokenKind::Sep, TokenValue::None);
            }
            '0'..='9' => {
                self.current -= 1;
                self.start = self.current;
                match self.number() {
                    Some(n) => self.add_token(TokenKind::Num, TokenValue::Number(n)),
                    None => {
                        self.error("Invalid number");
                    }
                }
            }
            c if self.start_letters.contains_key(&c) => {
                self.current -= 1;
                self.start = self.current;
                match self.formula() {
                    Some(formula) => self.add_token(TokenKind::Formula, TokenValue::Formula(Box::new(formula))),
                    None => {
                        if !self.id() {
                            self.path();
                        }
                    }
                }
            }
            '`' => {
                if !self.id() {
                    self.error("Expect identifier");
                }
            }
            '"' | '\'' => self.string(false),
            'p' => {
                if self.match_one('s') {
                    self.ps();
                } else if !self.id() {
                    self.path();
                }
            }
            's' => {
                if self.match_one('"') || self.match_one('\'') {
                    self.start += 1;
                    self.string(true);
                } else if !self.id() {
                    self.path();
                }
            }
            '.' => {
                if self.match_one('.') && self.match_one('.') {
                    self.add_token(TokenKind::Interval, TokenValue::None);
                } else {
                    self.error("Invalid character '.'");
                }
            }
            c if c.is_alphabetic() => {
                if self.id() {
                    if matches!(self.tokens.last(), Some(t) if t.kind == TokenKind::Doc) {
                        self.tokens.pop();
                        self.docstring();
                    }
                } else {
                    self.path();
                }
            }
            c => {
                self.error(format!("Invalid character {c:?}"));
            }
        }
    }

    fn two_char(&mut self, bare: TokenKind, eq: TokenKind) {
        if self.match_one('=') {
            self.add_token(eq, TokenValue::None);
        } else {
            self.add_token(bare, TokenValue::None);
        }
    }

    // --- identifiers, keywords, units ---

    fn id(&mut self) -> bool {
        if self.previous() == Some('`') {
            let name_start = self.current;
            self.consume_until_quote('`');
            if !self.match_one('`') {
                self.error("Expect '`' to be followed by '`'. Unterminated identifier.");
            }
            let raw = self.slice(name_start, self.current.saturating_sub(1));
            self.add_token(TokenKind::Id, TokenValue::Ident(raw.replace("\\`", "`")));
            true
        } else {
            let backtrack = self.current;
            self.consume_while(|c| c.is_alphanumeric() || c == '_');
            if self.peek() == Some('\\') {
                self.current = backtrack;
                return false;
            }
            let identifier = self.slice(self.start, self.current);
            if let Some(&kind) = KEYWORDS.iter().find(|(k, _)| *k == identifier).map(|(_, k)| k).as_ref() {
                self.add_token(kind, TokenValue::Ident(identifier));
            } else if let Ok(unit) = Unit::symbol(&identifier) {
                self.add_token(TokenKind::Unit, TokenValue::Unit(unit));
            } else {
                self.add_token(TokenKind::Id, TokenValue::Ident(identifier));
            }
            true
        }
    }

    fn consume_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            if c == '\n' {
                self.line += 1;
            }
            self.current += 1;
        }
    }

    /// Consume up to (not including) the next unescaped `quote`.
    fn consume_until_quote(&mut self, quote: char) {
        loop {
            let Some(c) = self.peek() else { break };
            if c == quote && self.previous() != Some('\\') {
                break;
            }
            if c == '\n' {
                self.line += 1;
            }
            self.current += 1;
        }
    }

    fn docstring(&mut self) {
        let Some(done_idx) = find_subsequence(&self.chars, self.current, &['d', 'o', 'n', 'e']) else {
            self.error("Unterminated docstring");
            return;
        };
        self.consume_while(|c| c.is_whitespace());

        let mut end = done_idx;
        let mut line_offset = 0u32;
        while end > 0 && self.chars[end - 1].is_whitespace() {
            end -= 1;
            if self.chars[end] == '\n' {
                line_offset += 1;
            }
        }

        let body = self.slice(self.current, end);
        let lines: Vec<&str> = body.split('\n').collect();
        let min_ws = lines.iter().map(|l| count_white_space(l)).min().unwrap_or(0);
        let dedented: Vec<String> = lines
            .iter()
            .map(|l| {
                let chars: Vec<char> = l.chars().collect();
                let skip = min_ws.min(chars.len());
                chars[skip..].iter().collect()
            })
            .collect();
        let docstring = dedented.join("\n");

        self.add_token_attr(TokenKind::Str, TokenValue::Text(docstring), TokenAttr { interpolated: true });

        self.line += line_offset;
        self.current = done_idx + 4;
    }

    fn string(&mut self, sub: bool) {
        let quote = self.previous().unwrap_or('"');
        let name_start = self.current;
        self.consume_until_quote(quote);
        if !self.match_one(quote) {
            self.error(format!("Unterminated string literal. Expect '{quote}'"));
        }
        let text = self.slice(name_start, self.current.saturating_sub(1));
        self.add_token_attr(TokenKind::Str, TokenValue::Text(text), TokenAttr { interpolated: sub });
    }

    fn ps(&mut self) {
        self.consume_while(|c| c != '\n');
        self.add_token(TokenKind::Sep, TokenValue::None);
        self.current += 1;
        self.line += 1;
        self.start_of_line = true;
    }

    // --- paths ---

    fn is_path_char(c: char) -> bool {
        !c.is_whitespace() && !"<>\"/|?*(){}".contains(c)
    }

    fn path(&mut self) -> bool {
        if self.previous() == Some('|') {
            let name_start = self.current;
            self.consume_until_quote('|');
            if !self.match_one('|') {
                self.error("Unterminated path");
            }
            let raw = self.slice(name_start, self.current.saturating_sub(1));
            self.add_token(TokenKind::Path, TokenValue::Path(PathBuf::from(raw)));
            true
        } else {
            self.consume_while(Scanner::is_path_char);
            let end = self.current;
            let raw = self.slice(self.start, end);
            if self.start != end && (raw.contains('\\') || raw.contains(':')) {
                self.add_token(TokenKind::Path, TokenValue::Path(PathBuf::from(raw)));
                true
            } else {
                false
            }
        }
    }

    // --- numbers ---

    fn number(&mut self) -> Option<SigDigNumber> {
        let num_start = self.current;
        self.consume_while(|c| c.is_ascii_digit() || c == '_');
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.match_one('.');
            self.consume_while(|c| c.is_ascii_digit() || c == '_');
            if self.match_any(&['e', 'E']).is_some() {
                self.match_any(&['+', '-']);
                self.consume_while(|c| c.is_ascii_digit());
            }
        }
        let raw = self.slice(num_start, self.current);
        if raw.is_empty() {
            return None;
        }
        SigDigNumber::parse(&raw).ok()
    }

    // --- chemical formulas ---

    fn element_name(&mut self) -> Option<String> {
        let name_start = self.current;
        let first = self.peek()?;
        if !self.start_letters.contains_key(&first) {
            return None;
        }
        self.current += 1;
        let seconds = self.start_letters.get(&first).cloned().unwrap_or_default();
        let matched = match self.peek() {
            Some(c2) if seconds.contains(&c2) => {
                self.current += 1;
                true
            }
            _ => seconds.contains(&'\0'),
        };
        if !matched {
            self.current = name_start;
            return None;
        }
        Some(self.slice(name_start, self.current))
    }

    /// `_N`, `_{expr}`, `^N` or `^{expr}`, falling back to `default`.
    fn script(&mut self, marker: char, default: Decimal) -> Script {
        if self.match_one(marker) {
            if self.match_one('{') {
                let raw_start = self.current;
                while self.peek() != Some('}') && !self.is_end() {
                    self.current += 1;
                }
                if !self.match_one('}') {
                    self.error("Unterminated subscript/superscript");
                }
                Script::Expr(self.slice(raw_start, self.current.saturating_sub(1)))
            } else {
                match self.number() {
                    Some(n) => Script::Number(n.value),
                    None => {
                        self.error(format!("Expect number after '{marker}'"));
                        Script::Default(default)
                    }
                }
            }
        } else {
            match self.number() {
                Some(n) => Script::Number(n.value),
                None => Script::Default(default),
            }
        }
    }

    /// A `_{expr}`/`^{expr}` span is kept as raw source text and evaluated
    /// later, against whatever environment the formula literal is read in —
    /// mirroring `EvalDecimal`, which stores the same kind of pending
    /// expression and only evaluates it the first time the count/charge is
    /// actually read.
    fn resolve_script(&mut self, script: Script) -> Count {
        match script {
            Script::Number(n) => Count::Fixed(n),
            Script::Default(d) => Count::Fixed(d),
            Script::Expr(src) => Count::Dynamic(src),
        }
    }

    fn element(&mut self) -> Option<Element> {
        let name = self.element_name()?;
        let subscript = self.script('_', Decimal::ONE);
        let subscript = self.resolve_script(subscript);
        let superscript = self.script('^', Decimal::ZERO);
        let superscript = self.resolve_script(superscript);
        Some(Element::with_count(name, subscript).with_charge(superscript))
    }

    pub fn formula(&mut self) -> Option<Formula> {
        let terms = self.formula_terms()?;
        Some(Formula::new(terms))
    }

    fn formula_terms(&mut self) -> Option<Vec<Term>> {
        let current_backtrack = self.current;
        let start_backtrack = self.start;

        let mut terms = Vec::new();
        loop {
            if self.is_end() {
                break;
            }
            if self.match_one('(') {
                let inner = self.formula_terms();
                if !self.match_one(')') {
                    self.error("Expect ')'. Unmatched '(' ");
                }
                let subscript = self.script('_', Decimal::ONE);
                let subscript = self.resolve_script(subscript);
                let superscript = self.script('^', Decimal::ZERO);
                let superscript = self.resolve_script(superscript);
                let partial = PartialFormula::new(
                    inner
                        .unwrap_or_default()
                        .into_iter()
                        .map(term_into_formula)
                        .collect(),
                )
                .with_count(subscript)
                .with_charge(superscript);
                terms.push(Term::Partial(partial));
            } else if self.peek() == Some(')') {
                return Some(terms);
            } else if self.peek().is_some_and(|c| self.start_letters.contains_key(&c)) {
                match self.element() {
                    Some(e) => terms.push(Term::Element(e)),
                    None => break,
                }
            } else {
                break;
            }
        }

        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.current = current_backtrack;
            self.start = start_backtrack;
            return None;
        }
        Some(terms)
    }
}

/// A bare element stands alone as a one-term formula when it needs to be
/// wrapped back up as a `Term::Partial`'s inner formula list.
fn term_into_formula(term: Term) -> Formula {
    match term {
        Term::Element(e) => Formula::new(vec![Term::Element(e)]),
        Term::Partial(p) => Formula::new(vec![Term::Partial(p)]),
    }
}

fn count_white_space(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| match c {
            ' ' => 1,
            '\t' => 4,
            _ => 0,
        })
        .sum()
}

fn find_subsequence(chars: &[char], from: usize, needle: &[char]) -> Option<usize> {
    if needle.is_empty() || from >= chars.len() {
        return None;
    }
    (from..=chars.len().saturating_sub(needle.len())).find(|&i| chars[i..i + needle.len()] == *needle)
}

fn build_start_letters(table: &PeriodicTable) -> HashMap<char, HashSet<char>> {
    let mut map: HashMap<char, HashSet<char>> = HashMap::new();
    for symbol in table.symbols() {
        let mut chars = symbol.chars();
        let Some(first) = chars.next() else { continue };
        let entry = map.entry(first).or_default();
        match chars.next() {
            Some(second) => {
                entry.insert(second);
            }
            None => {
                entry.insert('\0');
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PeriodicTable {
        let mut h = ErrorHandler::new();
        PeriodicTable::from_json_str(
            r#"{"H":{"AtomicMass":"1.008"},"O":{"AtomicMass":"16.00"},"Na":{"AtomicMass":"22.99"},"Cl":{"AtomicMass":"35.45"}}"#,
            &mut h,
        )
        .unwrap()
    }

    fn scan(src: &str) -> Vec<Token> {
        let t = table();
        let mut h = ErrorHandler::new();
        let scanner = Scanner::new(src, &t, &mut h);
        scanner.scan_tokens()
    }

    #[test]
    fn scans_simple_arithmetic() {
        let tokens = scan("1 + 2\n");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.starts_with(&[TokenKind::Num, TokenKind::Add, TokenKind::Num, TokenKind::Sep]));
    }

    #[test]
    fn recognizes_formula_literal() {
        let tokens = scan("H2O\n");
        assert_eq!(tokens[0].kind, TokenKind::Formula);
    }

    #[test]
    fn falls_back_to_identifier_when_not_a_formula() {
        // "Had" starts like element H but "ad" doesn't continue a formula, and
        // the trailing alnum rule should force a full backtrack to an id.
        let tokens = scan("Had\n");
        assert_eq!(tokens[0].kind, TokenKind::Id);
    }

    #[test]
    fn tracks_indentation() {
        let tokens = scan("exam pass\n    na\ndone\n");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::Indent));
        assert!(kinds.contains(&TokenKind::Dedent));
    }

    #[test]
    fn scans_compound_assign_and_arrow() {
        let tokens = scan("x += 1 -> gram\n");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::AddEq));
        assert!(kinds.contains(&TokenKind::Arrow));
    }

    #[test]
    fn scans_interpolated_string() {
        let tokens = scan("s'hi {1}'\n");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].attr.as_ref().unwrap().interpolated, true);
    }
}
