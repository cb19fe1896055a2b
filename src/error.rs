//! Diagnostics collection (the "Error Handler" component).
//!
//! Every scan, parse and evaluation failure in the language funnels through
//! [`ChemError`]. The [`ErrorHandler`] additionally tracks whether any error
//! has been reported so far, so the scanner/parser driver can decide whether
//! to proceed to the next phase.

use thiserror::Error;

/// One diagnosed failure, tagged with the kind of failure it is.
///
/// `ControlFlowSignal` (submit unwinding) is deliberately not a variant here:
/// it is never user-visible and is modeled separately by
/// [`crate::interpreter::Outcome`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChemError {
    #[error("{}", format_with_line(.message, *.line))]
    Scan { message: String, line: Option<u32> },
    #[error("{}", format_with_line(.message, *.line))]
    Parse { message: String, line: Option<u32> },
    #[error("{}", format_with_line(.message, *.line))]
    Name { message: String, line: Option<u32> },
    #[error("{}", format_with_line(.message, *.line))]
    Type { message: String, line: Option<u32> },
    #[error("{}", format_with_line(.message, *.line))]
    Dimensionality { message: String, line: Option<u32> },
    #[error("{}", format_with_line(.message, *.line))]
    Conversion { message: String, line: Option<u32> },
    #[error("{}", format_with_line(.message, *.line))]
    Arity { message: String, line: Option<u32> },
    #[error("{}", format_with_line(.message, *.line))]
    Io { message: String, line: Option<u32> },
}

fn format_with_line(message: &str, line: Option<u32>) -> String {
    match line {
        Some(line) => format!("{line}: {message}"),
        None => message.to_string(),
    }
}

impl ChemError {
    pub fn line(&self) -> Option<u32> {
        match self {
            ChemError::Scan { line, .. }
            | ChemError::Parse { line, .. }
            | ChemError::Name { line, .. }
            | ChemError::Type { line, .. }
            | ChemError::Dimensionality { line, .. }
            | ChemError::Conversion { line, .. }
            | ChemError::Arity { line, .. }
            | ChemError::Io { line, .. } => *line,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ChemError::Scan { message, .. }
            | ChemError::Parse { message, .. }
            | ChemError::Name { message, .. }
            | ChemError::Type { message, .. }
            | ChemError::Dimensionality { message, .. }
            | ChemError::Conversion { message, .. }
            | ChemError::Arity { message, .. }
            | ChemError::Io { message, .. } => message,
        }
    }

    /// The process exit code a failure of this kind maps to: `1` for a
    /// scan/parse/IO failure, `-1` for an evaluation error, per the
    /// external-interfaces contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChemError::Scan { .. } | ChemError::Parse { .. } | ChemError::Io { .. } => 1,
            ChemError::Name { .. }
            | ChemError::Type { .. }
            | ChemError::Dimensionality { .. }
            | ChemError::Conversion { .. }
            | ChemError::Arity { .. } => -1,
        }
    }
}

/// Collects diagnostics and remembers whether any have been reported.
///
/// The scanner and parser both synchronize past errors and keep going so a
/// single run can report more than one diagnostic; the top-level driver
/// checks [`ErrorHandler::had_error`] after each phase and aborts before the
/// next one.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    had_error: bool,
}

macro_rules! error_kind_ctor {
    ($name:ident, $variant:ident) => {
        pub fn $name(&mut self, message: impl Into<String>, line: Option<u32>) -> ChemError {
            let err = ChemError::$variant {
                message: message.into(),
                line,
            };
            self.report(&err);
            err
        }
    };
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn clear(&mut self) {
        self.had_error = false;
    }

    fn report(&mut self, err: &ChemError) {
        self.had_error = true;
        log::warn!("{err}");
    }

    /// Registers an error built elsewhere (e.g. inside a `NativeWork`
    /// closure that has no `ErrorHandler` of its own) as if this handler had
    /// constructed it directly.
    pub fn record(&mut self, err: ChemError) -> ChemError {
        self.report(&err);
        err
    }

    error_kind_ctor!(scan, Scan);
    error_kind_ctor!(parse, Parse);
    error_kind_ctor!(name, Name);
    error_kind_ctor!(type_error, Type);
    error_kind_ctor!(dimensionality, Dimensionality);
    error_kind_ctor!(conversion, Conversion);
    error_kind_ctor!(arity, Arity);
    error_kind_ctor!(io, Io);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_and_without_line() {
        let mut h = ErrorHandler::new();
        let with_line = h.scan("bad char", Some(3));
        assert_eq!(with_line.to_string(), "3: bad char");
        let without_line = h.name("no such variable 'x'", None);
        assert_eq!(without_line.to_string(), "no such variable 'x'");
        assert!(h.had_error());
    }

    #[test]
    fn clear_resets_flag() {
        let mut h = ErrorHandler::new();
        h.parse("oops", Some(1));
        assert!(h.had_error());
        h.clear();
        assert!(!h.had_error());
    }
}
