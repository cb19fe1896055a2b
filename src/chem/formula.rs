use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::error::{ChemError, ErrorHandler};
use crate::number::SigDigNumber;
use crate::periodic_table::PeriodicTable;
use crate::unicode_digits::{to_subscript, to_superscript};
use crate::unit::{self, Unit};

use super::element::Count;
use super::formula_unit::FormulaUnit;
use super::quantity::Quantity;

/// A formula transforms a mass quantity into a substance (mole) quantity
/// and back, scaled by its own molecular mass. Registered once per formula
/// and consumed by [`Quantity::to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformContext {
    pub molecular_mass: Decimal,
}

impl TransformContext {
    pub fn mass_to_substance(&self, grams: Decimal) -> Decimal {
        grams / self.molecular_mass
    }

    pub fn substance_to_mass(&self, moles: Decimal) -> Decimal {
        moles * self.molecular_mass
    }
}

/// One term inside a [`Formula`]: either a bare element or a parenthesized
/// sub-formula (`(PO4)2`).
#[derive(Debug, Clone, PartialEq, Eq, std::hash::Hash)]
pub enum Term {
    Element(super::element::Element),
    Partial(PartialFormula),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Element(e) => write!(f, "{e}"),
            Term::Partial(p) => write!(f, "{p}"),
        }
    }
}

/// A chemical formula: ordered terms plus its own multiplier count and
/// charge, e.g. `2 H2O` or the ion `SO4^2-`.
#[derive(Debug, Clone, PartialEq, Eq, std::hash::Hash)]
pub struct Formula {
    pub terms: Vec<Term>,
    pub count: Decimal,
    pub charge: Decimal,
}

impl Formula {
    pub fn new(terms: Vec<Term>) -> Self {
        Formula {
            terms,
            count: Decimal::ONE,
            charge: Decimal::ZERO,
        }
    }

    pub fn with_count(mut self, count: Decimal) -> Self {
        self.count = count;
        self
    }

    pub fn with_charge(mut self, charge: Decimal) -> Self {
        self.charge = charge;
        self
    }

    /// Total atom count per element symbol, recursing into any
    /// `PartialFormula` terms and multiplying by their own subscript count.
    pub fn count_dict(&self) -> HashMap<String, Decimal> {
        let mut result = HashMap::new();
        for term in &self.terms {
            match term {
                Term::Element(e) => {
                    *result.entry(e.symbol.clone()).or_insert(Decimal::ZERO) += e.count.value();
                }
                Term::Partial(p) => {
                    for (symbol, count) in p.count_dict() {
                        *result.entry(symbol).or_insert(Decimal::ZERO) += count * p.count.value();
                    }
                }
            }
        }
        result
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.count_dict().contains_key(symbol)
    }

    pub fn count_of(&self, symbol: &str) -> Decimal {
        self.count_dict().get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    /// Σ(atomic mass · count), returned as a quantity in `gram/mole` whose
    /// formula is `FormulaUnit([self])`.
    pub fn molecular_mass(
        &self,
        table: &PeriodicTable,
        handler: &mut ErrorHandler,
    ) -> Result<Quantity, ChemError> {
        let mut mass = Decimal::ZERO;
        for (symbol, count) in self.count_dict() {
            let atomic_mass = table.get(&symbol, "AtomicMass", handler)?;
            mass += atomic_mass * count;
        }
        let unit = unit::gram().div(&unit::mole());
        Ok(Quantity::new(
            Some(FormulaUnit::new(vec![self.clone()])),
            SigDigNumber::exact(mass),
            unit,
        ))
    }

    pub fn context(
        &self,
        table: &PeriodicTable,
        handler: &mut ErrorHandler,
    ) -> Result<TransformContext, ChemError> {
        Ok(TransformContext {
            molecular_mass: self.molecular_mass(table, handler)?.magnitude.value,
        })
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count != Decimal::ONE {
            write!(f, "{}", self.count.normalize())?;
        }
        for term in &self.terms {
            write!(f, "{term}")?;
        }
        if self.charge != Decimal::ZERO {
            write!(f, "{}", to_superscript(&self.charge.normalize().to_string()))?;
        }
        Ok(())
    }
}

/// A parenthesized sub-formula, e.g. the `(PO4)` in `(PO4)2`. Its own
/// `terms` are full formulas (so it can wrap multi-element groups), not
/// bare elements.
#[derive(Debug, Clone, PartialEq, Eq, std::hash::Hash)]
pub struct PartialFormula {
    pub terms: Vec<Formula>,
    pub count: Count,
    pub charge: Count,
}

impl PartialFormula {
    pub fn new(terms: Vec<Formula>) -> Self {
        PartialFormula {
            terms,
            count: Count::Fixed(Decimal::ONE),
            charge: Count::Fixed(Decimal::ZERO),
        }
    }

    pub fn with_count(mut self, count: impl Into<Count>) -> Self {
        self.count = count.into();
        self
    }

    pub fn with_charge(mut self, charge: impl Into<Count>) -> Self {
        self.charge = charge.into();
        self
    }

    pub fn count_dict(&self) -> HashMap<String, Decimal> {
        let mut result = HashMap::new();
        for formula in &self.terms {
            for (symbol, count) in formula.count_dict() {
                *result.entry(symbol).or_insert(Decimal::ZERO) += count * formula.count;
            }
        }
        result
    }
}

impl fmt::Display for PartialFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner: String = self.terms.iter().map(|t| t.to_string()).collect();
        let count = self.count.value();
        if count != Decimal::ZERO {
            write!(f, "({inner})")?;
        } else {
            write!(f, "{inner}")?;
        }
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
    use super::super::Element;
    use super::*;

    fn h2o() -> Formula {
        Formula::new(vec![
            Term::Element(Element::with_count("H", Decimal::from(2))),
            Term::Element(Element::new("O")),
        ])
    }

    #[test]
    fn count_dict_sums_simple_elements() {
        let water = h2o();
        let counts = water.count_dict();
        assert_eq!(counts.get("H"), Some(&Decimal::from(2)));
        assert_eq!(counts.get("O"), Some(&Decimal::from(1)));
    }

    #[test]
    fn count_dict_multiplies_through_partial_formula() {
        // (PO4)2 => P2 O8
        let po4 = Formula::new(vec![
            Term::Element(Element::new("P")),
            Term::Element(Element::with_count("O", Decimal::from(4))),
        ]);
        let partial = PartialFormula::new(vec![po4]).with_count(Decimal::from(2));
        let formula = Formula::new(vec![Term::Partial(partial)]);
        let counts = formula.count_dict();
        assert_eq!(counts.get("P"), Some(&Decimal::from(2)));
        assert_eq!(counts.get("O"), Some(&Decimal::from(8)));
    }

    #[test]
    fn display_shows_subscript_counts() {
        let water = h2o();
        assert_eq!(water.to_string(), "H₂O");
    }
}
