use std::fmt;

use crate::error::{ChemError, ErrorHandler};
use crate::periodic_table::PeriodicTable;

use super::formula::{Formula, TransformContext};

/// A multiset-like, order-preserving sequence of formulas used as the
/// "unit of accounting" on a [`super::quantity::Quantity`]. An empty
/// sequence is "formulaless".
#[derive(Debug, Clone, PartialEq, Eq, Default, std::hash::Hash)]
pub struct FormulaUnit {
    pub formulas: Vec<Formula>,
}

impl FormulaUnit {
    pub fn new(formulas: Vec<Formula>) -> Self {
        FormulaUnit { formulas }
    }

    pub fn formulaless() -> Self {
        FormulaUnit { formulas: Vec::new() }
    }

    pub fn is_formulaless(&self) -> bool {
        self.formulas.is_empty()
    }

    pub fn add(&self, other: &FormulaUnit, handler: &mut ErrorHandler) -> Result<FormulaUnit, ChemError> {
        if self.formulas == other.formulas {
            Ok(self.clone())
        } else {
            Err(handler.type_error(format!("Can not add {self} and {other}"), None))
        }
    }

    /// Mirrors the original's `__sub__ = self + (-other)`: since negation is
    /// identity, subtraction has the same same-formula requirement as
    /// addition.
    pub fn sub(&self, other: &FormulaUnit, handler: &mut ErrorHandler) -> Result<FormulaUnit, ChemError> {
        self.add(other, handler)
    }

    pub fn mul(&self, other: &FormulaUnit) -> FormulaUnit {
        let mut formulas = self.formulas.clone();
        formulas.extend(other.formulas.clone());
        FormulaUnit { formulas }
    }

    pub fn div(&self, other: &FormulaUnit, handler: &mut ErrorHandler) -> Result<FormulaUnit, ChemError> {
        let mut remaining = self.formulas.clone();
        for formula in &other.formulas {
            match remaining.iter().position(|f| f == formula) {
                Some(idx) => {
                    remaining.remove(idx);
                }
                None => return Err(handler.type_error(format!("Can not divide {self} by {other}"), None)),
            }
        }
        Ok(FormulaUnit { formulas: remaining })
    }

    /// Negative exponents are unsupported, matching the limitation on
    /// `Quantity`'s own exponentiation loop.
    pub fn pow(&self, n: i32, handler: &mut ErrorHandler) -> Result<FormulaUnit, ChemError> {
        if n < 0 {
            return Err(handler.type_error(format!("Can not raise {self} to {n}"), None));
        }
        let mut formulas = Vec::new();
        for _ in 0..n {
            formulas.extend(self.formulas.clone());
        }
        Ok(FormulaUnit { formulas })
    }

    pub fn neg(&self) -> FormulaUnit {
        self.clone()
    }

    pub fn invert(&self, handler: &mut ErrorHandler) -> Result<FormulaUnit, ChemError> {
        Err(handler.type_error(format!("Can not invert {self}"), None))
    }

    pub fn is_truthy(&self) -> bool {
        !self.formulas.is_empty()
    }

    pub fn context(
        &self,
        table: &PeriodicTable,
        handler: &mut ErrorHandler,
    ) -> Result<TransformContext, ChemError> {
        match self.formulas.as_slice() {
            [only] => only.context(table, handler),
            _ => Err(handler.type_error(format!("Can not get context of {self}"), None)),
        }
    }
}

impl fmt::Display for FormulaUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.formulas.is_empty() {
            write!(f, "formulaless")
        } else {
            let rendered: Vec<String> = self.formulas.iter().map(|x| x.to_string()).collect();
            write!(f, "{}", rendered.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::Element;
    use crate::chem::formula::Term;
    use rust_decimal::Decimal;

    fn water() -> Formula {
        Formula::new(vec![
            Term::Element(Element::with_count("H", Decimal::from(2))),
            Term::Element(Element::new("O")),
        ])
    }

    #[test]
    fn add_same_formula_is_identity() {
        let mut h = ErrorHandler::new();
        let u = FormulaUnit::new(vec![water()]);
        let v = FormulaUnit::new(vec![water()]);
        assert_eq!(u.add(&v, &mut h).unwrap(), u);
    }

    #[test]
    fn add_different_formula_errors() {
        let mut h = ErrorHandler::new();
        let u = FormulaUnit::new(vec![water()]);
        let v = FormulaUnit::formulaless();
        assert!(u.add(&v, &mut h).is_err());
    }

    #[test]
    fn mul_concatenates() {
        let u = FormulaUnit::new(vec![water()]);
        let v = FormulaUnit::new(vec![water()]);
        assert_eq!(u.mul(&v).formulas.len(), 2);
    }

    #[test]
    fn div_removes_matching_formula() {
        let mut h = ErrorHandler::new();
        let u = FormulaUnit::new(vec![water(), water()]);
        let v = FormulaUnit::new(vec![water()]);
        assert_eq!(u.div(&v, &mut h).unwrap().formulas.len(), 1);
    }
}
