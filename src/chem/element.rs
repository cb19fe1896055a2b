use std::fmt;

use rust_decimal::Decimal;

use crate::error::{ChemError, ErrorHandler};
use crate::periodic_table::PeriodicTable;
use crate::unicode_digits::{to_subscript, to_superscript};

/// A count or charge that is either a literal decimal or a `_{expr}`/`^{expr}`
/// source span whose value is only known once evaluated against an
/// environment, mirroring `EvalDecimal`'s string-or-Decimal descriptor: the
/// scanner records whichever it has on hand, and the interpreter resolves
/// any `Dynamic` span to a `Fixed` value the first time the formula literal
/// it belongs to is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Count {
    Fixed(Decimal),
    Dynamic(String),
}

impl Count {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Count::Dynamic(_))
    }

    /// The resolved value. Only meaningful once every `Dynamic` span in the
    /// formula has been resolved; falls back to `Decimal::ONE` otherwise
    /// rather than panicking, since `Display`/arithmetic still need a value
    /// to show.
    pub fn value(&self) -> Decimal {
        match self {
            Count::Fixed(v) => *v,
            Count::Dynamic(_) => Decimal::ONE,
        }
    }
}

impl From<Decimal> for Count {
    fn from(value: Decimal) -> Self {
        Count::Fixed(value)
    }
}

/// A single element in a formula, e.g. the `H` in `H2O` or the whole of a
/// bare ion like `Na+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element {
    pub symbol: String,
    pub count: Count,
    pub charge: Count,
}

impl Element {
    pub fn new(symbol: impl Into<String>) -> Self {
        Element {
            symbol: symbol.into(),
            count: Count::Fixed(Decimal::ONE),
            charge: Count::Fixed(Decimal::ZERO),
        }
    }

    pub fn with_count(symbol: impl Into<String>, count: impl Into<Count>) -> Self {
        Element {
            symbol: symbol.into(),
            count: count.into(),
            charge: Count::Fixed(Decimal::ZERO),
        }
    }

    pub fn with_charge(mut self, charge: impl Into<Count>) -> Self {
        self.charge = charge.into();
        self
    }

    /// Attribute lookup delegates to the periodic table; missing keys (or a
    /// symbol the table doesn't know) surface as a name error.
    pub fn attribute(
        &self,
        key: &str,
        table: &PeriodicTable,
        handler: &mut ErrorHandler,
    ) -> Result<Decimal, ChemError> {
        table.get(&self.symbol, key, handler)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)?;
        let count = self.count.value();
        if count != Decimal::ONE {
            write!(f, "{}", to_subscript(&count.normalize().to_string()))?;
        }
        let charge = self.charge.value();
        if charge != Decimal::ZERO {
            write!(f, "{}", to_superscript(&charge.normalize().to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_plain_symbol() {
        let h = Element::new("H");
        assert_eq!(h.to_string(), "H");
    }

    #[test]
    fn renders_subscript_count() {
        let h2 = Element::with_count("H", Decimal::from(2));
        assert_eq!(h2.to_string(), "H₂");
    }

    #[test]
    fn renders_superscript_charge() {
        let na = Element::new("Na").with_charge(Decimal::ONE);
        assert_eq!(na.to_string(), "Na¹");
    }
}
