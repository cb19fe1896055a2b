//! # chemlang
//!
//! An interpreter for a small domain-specific language for chemistry:
//! significant-digit numbers, unit-aware quantities, chemical formulas and
//! reaction balancing.
//!
//! The pipeline is the usual four stages: [`scanner`] turns source text into
//! [`token`]s (tracking Python-style indentation), [`parser`] turns tokens
//! into an [`ast`] tree, and [`interpreter`] walks that tree against a
//! lexical [`env`]ironment, using the chemistry value model in [`chem`] and
//! the [`unit`]/[`periodic_table`]/[`number`] subsystems it builds on.
//!
//! ## Example
//! ```rust
//! use chemlang::{run_source, periodic_table::PeriodicTable, error::ErrorHandler};
//!
//! let mut handler = ErrorHandler::new();
//! let table = PeriodicTable::from_json_str(
//!     r#"{"H":{"AtomicMass":"1.008"},"O":{"AtomicMass":"16.00"}}"#,
//!     &mut handler,
//! ).unwrap();
//! let value = run_source("1 + 2\n", table, &mut handler).unwrap();
//! println!("{}", chemlang::value::stringify(&value));
//! ```

pub mod ast;
pub mod chem;
pub mod env;
pub mod error;
pub mod interpreter;
pub mod number;
pub mod parser;
pub mod periodic_table;
pub mod scanner;
pub mod token;
pub mod unicode_digits;
pub mod unit;
pub mod value;

use error::{ChemError, ErrorHandler};
use interpreter::Interpreter;
use periodic_table::PeriodicTable;
use value::Value;

/// Scans, parses and evaluates a complete source string, the pipeline the
/// CLI's file runner and REPL both drive.
pub fn run_source(
    source: &str,
    table: PeriodicTable,
    handler: &mut ErrorHandler,
) -> Result<Value, ChemError> {
    let tokens = scanner::Scanner::new(source, &table, handler).scan_tokens();
    if handler.had_error() {
        return Err(handler.parse("aborting after scan errors".to_string(), None));
    }
    let program = parser::Parser::new(tokens, handler).parse();
    if handler.had_error() {
        return Err(handler.parse("aborting after parse errors".to_string(), None));
    }
    let mut interpreter = Interpreter::new(table);
    interpreter.run(&program, handler)
}
