use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::error::{ChemError, ErrorHandler};
use crate::number::SigDigNumber;
use crate::periodic_table::PeriodicTable;
use crate::unit::{self, Dimension, Unit};

use super::formula::TransformContext;
use super::formula_unit::FormulaUnit;

/// Molar-ratio lookup produced by [`super::reaction::Reaction::context`],
/// threaded through conversions that cross between formulas.
pub type ReactionContext = HashMap<(FormulaUnit, FormulaUnit), SigDigNumber>;

/// What a quantity is being converted to: a plain unit (rescale the
/// magnitude) or a formula unit (re-express via a reaction's molar ratios).
pub enum ConversionTarget<'a> {
    Unit(&'a Unit),
    Formula(&'a FormulaUnit),
}

/// A magnitude paired with a unit and (optionally) the formula it counts,
/// e.g. `2 mole H2O` or a bare `5`.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub formula: Option<FormulaUnit>,
    pub magnitude: SigDigNumber,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(formula: Option<FormulaUnit>, magnitude: SigDigNumber, unit: Unit) -> Self {
        Quantity {
            formula,
            magnitude,
            unit,
        }
    }

    pub fn dimensionless(magnitude: SigDigNumber) -> Self {
        Quantity::new(None, magnitude, Unit::dimensionless())
    }

    fn formula_or_formulaless(&self) -> FormulaUnit {
        self.formula.clone().unwrap_or_default()
    }

    fn formula_is_truthy(&self) -> bool {
        self.formula.as_ref().is_some_and(FormulaUnit::is_truthy)
    }

    fn formula_context(
        &self,
        table: &PeriodicTable,
        handler: &mut ErrorHandler,
    ) -> Option<TransformContext> {
        let formula = self.formula.as_ref()?;
        if formula.is_formulaless() {
            return None;
        }
        formula.context(table, handler).ok()
    }

    /// Align `self` and `other` so the same arithmetic can run on both:
    /// first reconcile formulas (adopting whichever side is formulaless, or
    /// converting through a reaction context), then reconcile units
    /// (escalating a dimensionless side, or converting through UR).
    pub fn match_quantity(
        &self,
        other: &Quantity,
        table: &PeriodicTable,
        reaction_ctx: Option<&ReactionContext>,
        handler: &mut ErrorHandler,
    ) -> Result<(Quantity, Quantity), ChemError> {
        let mut a = self.clone();
        let mut b = other.clone();

        if a.formula != b.formula {
            let b_empty = b.formula.as_ref().map_or(true, |f| f.is_formulaless());
            let a_empty = a.formula.as_ref().map_or(true, |f| f.is_formulaless());
            if b_empty {
                b.formula = a.formula.clone();
            } else if a_empty {
                a.formula = b.formula.clone();
            } else {
                let Some(ctx) = reaction_ctx else {
                    return Err(handler.conversion(
                        format!(
                            "Cannot convert {} to {} without context",
                            b.formula_or_formulaless(),
                            a.formula_or_formulaless()
                        ),
                        None,
                    ));
                };
                let target = a.formula.clone().unwrap_or_default();
                b = b.to(ConversionTarget::Formula(&target), Some(ctx), table, handler)?;
            }
        }

        if a.unit == b.unit {
            return Ok((a, b));
        }
        if b.unit.is_dimensionless() {
            return Ok((a.clone(), Quantity::new(a.formula.clone(), b.magnitude, a.unit)));
        }
        if a.unit.is_dimensionless() {
            return Ok((Quantity::new(b.formula.clone(), a.magnitude, b.unit.clone()), b));
        }
        let target_unit = a.unit.clone();
        let b = b.to(ConversionTarget::Unit(&target_unit), None, table, handler)?;
        Ok((a, b))
    }

    fn combine_formula_additive(
        &self,
        other: &Quantity,
        handler: &mut ErrorHandler,
    ) -> Result<Option<FormulaUnit>, ChemError> {
        if !other.formula_is_truthy() {
            return Ok(self.formula.clone());
        }
        let combined = self.formula_or_formulaless().add(&other.formula_or_formulaless(), handler)?;
        Ok(Some(combined))
    }

    fn combine_formula_mul(&self, other: &Quantity) -> Option<FormulaUnit> {
        if !other.formula_is_truthy() {
            return self.formula.clone();
        }
        Some(self.formula_or_formulaless().mul(&other.formula_or_formulaless()))
    }

    fn combine_formula_div(
        &self,
        other: &Quantity,
        handler: &mut ErrorHandler,
    ) -> Result<Option<FormulaUnit>, ChemError> {
        if !other.formula_is_truthy() {
            return Ok(self.formula.clone());
        }
        let combined = self.formula_or_formulaless().div(&other.formula_or_formulaless(), handler)?;
        Ok(Some(combined))
    }

    pub fn add(
        &self,
        other: &Quantity,
        table: &PeriodicTable,
        reaction_ctx: Option<&ReactionContext>,
        handler: &mut ErrorHandler,
    ) -> Result<Quantity, ChemError> {
        let (a, b) = self.match_quantity(other, table, reaction_ctx, handler)?;
        let formula = self.combine_formula_additive(other, handler)?;
        Ok(Quantity::new(formula, a.magnitude + b.magnitude, a.unit))
    }

    pub fn sub(
        &self,
        other: &Quantity,
        table: &PeriodicTable,
        reaction_ctx: Option<&ReactionContext>,
        handler: &mut ErrorHandler,
    ) -> Result<Quantity, ChemError> {
        let (a, b) = self.match_quantity(other, table, reaction_ctx, handler)?;
        let formula = self.combine_formula_additive(other, handler)?;
        Ok(Quantity::new(formula, a.magnitude - b.magnitude, a.unit))
    }

    pub fn mul(
        &self,
        other: &Quantity,
        table: &PeriodicTable,
        reaction_ctx: Option<&ReactionContext>,
        handler: &mut ErrorHandler,
    ) -> Result<Quantity, ChemError> {
        let (a, b) = self.match_quantity(other, table, reaction_ctx, handler)?;
        let formula = self.combine_formula_mul(other);
        Ok(Quantity::new(formula, a.magnitude * b.magnitude, a.unit.mul(&b.unit)))
    }

    pub fn div(
        &self,
        other: &Quantity,
        table: &PeriodicTable,
        reaction_ctx: Option<&ReactionContext>,
        handler: &mut ErrorHandler,
    ) -> Result<Quantity, ChemError> {
        let (a, b) = self.match_quantity(other, table, reaction_ctx, handler)?;
        let formula = self.combine_formula_div(other, handler)?;
        Ok(Quantity::new(formula, a.magnitude / b.magnitude, a.unit.div(&b.unit)))
    }

    pub fn modulo(
        &self,
        other: &Quantity,
        table: &PeriodicTable,
        reaction_ctx: Option<&ReactionContext>,
        handler: &mut ErrorHandler,
    ) -> Result<Quantity, ChemError> {
        let (a, b) = self.match_quantity(other, table, reaction_ctx, handler)?;
        let formula = self.combine_formula_additive(other, handler)?;
        let remainder = a.magnitude.value % b.magnitude.value;
        let sig_fig = a.magnitude.sig_fig.min(b.magnitude.sig_fig);
        Ok(Quantity::new(formula, SigDigNumber::new(remainder, sig_fig), a.unit))
    }

    pub fn pow(&self, exponent: &Quantity, handler: &mut ErrorHandler) -> Result<Quantity, ChemError> {
        if !exponent.unit.is_dimensionless() {
            return Err(handler.type_error(format!("Cannot raise to power {}", exponent.unit), None));
        }
        let exp_value = exponent.magnitude.to_f64();
        if (exp_value.round() - exp_value).abs() >= 1e-4 {
            return Err(handler.type_error(
                format!("Cannot raise to power {}", exponent.magnitude),
                None,
            ));
        }
        let n = exp_value.round() as i64;
        if n < 0 {
            return Err(handler.type_error(
                "Cannot raise to a negative power".to_string(),
                None,
            ));
        }
        let mut result = Quantity::dimensionless(SigDigNumber::exact(Decimal::ONE));
        for _ in 0..n {
            // A dummy table/reaction context suffice here: the running
            // product is always dimensionless-or-matching self's formula,
            // so no cross-formula/unit conversion is ever triggered.
            result = Quantity::new(
                result.combine_formula_mul(self),
                result.magnitude * self.magnitude,
                result.unit.mul(&self.unit),
            );
        }
        Ok(result)
    }

    pub fn neg(&self) -> Quantity {
        Quantity::new(self.formula.clone(), -self.magnitude, self.unit.clone())
    }

    pub fn pos(&self) -> Quantity {
        self.clone()
    }

    pub fn abs(&self) -> Quantity {
        let magnitude = SigDigNumber::new(self.magnitude.value.abs(), self.magnitude.sig_fig);
        Quantity::new(self.formula.clone(), magnitude, self.unit.clone())
    }

    pub fn invert(&self, handler: &mut ErrorHandler) -> Result<Quantity, ChemError> {
        Err(handler.type_error("Bad operand type for unary ~: quantity".to_string(), None))
    }

    pub fn is_truthy(&self) -> bool {
        self.magnitude.is_truthy()
    }

    /// Orders `self` against `other` after aligning formula and unit,
    /// for the `<, <=, >, >=, ==, !=` operators.
    pub fn compare(
        &self,
        other: &Quantity,
        table: &PeriodicTable,
        reaction_ctx: Option<&ReactionContext>,
        handler: &mut ErrorHandler,
    ) -> Result<std::cmp::Ordering, ChemError> {
        let (a, b) = self.match_quantity(other, table, reaction_ctx, handler)?;
        a.magnitude.partial_cmp(&b.magnitude).ok_or_else(|| {
            handler.type_error(format!("Cannot compare {} and {}", self, other), None)
        })
    }

    pub fn to_i64(&self, handler: &mut ErrorHandler) -> Result<i64, ChemError> {
        if !self.unit.is_dimensionless() {
            return Err(handler.type_error(format!("Cannot convert {} to int", self.unit), None));
        }
        Ok(self.magnitude.to_i64())
    }

    pub fn to_f64(&self, handler: &mut ErrorHandler) -> Result<f64, ChemError> {
        if !self.unit.is_dimensionless() {
            return Err(handler.type_error(format!("Cannot convert {} to float", self.unit), None));
        }
        Ok(self.magnitude.to_f64())
    }

    /// Convert to a target unit or formula, per spec.md §4.2: unit targets
    /// rescale the magnitude (through the formula's mass↔mole context when
    /// the units aren't directly comparable); formula targets require a
    /// reaction context and a mass- or mole-dimensioned unit.
    pub fn to(
        &self,
        target: ConversionTarget<'_>,
        reaction_ctx: Option<&ReactionContext>,
        table: &PeriodicTable,
        handler: &mut ErrorHandler,
    ) -> Result<Quantity, ChemError> {
        let mut magnitude = self.magnitude;
        let mut unit = self.unit.clone();
        let mut formula = self.formula.clone();

        if let ConversionTarget::Unit(target_unit) = target {
            if &self.unit != target_unit {
                let ctx = self.formula_context(table, handler);
                magnitude = convert_with_context(self.magnitude.value, &self.unit, target_unit, ctx.as_ref())
                    .map(|value| SigDigNumber::new(value, self.magnitude.sig_fig))
                    .ok_or_else(|| {
                        handler.conversion(format!("Cannot convert {} to {target_unit}", self.unit), None)
                    })?;
                unit = target_unit.clone();
            }
        }

        if let ConversionTarget::Formula(target_formula) = target {
            if self.formula.as_ref() != Some(target_formula) {
                let reaction_ctx = reaction_ctx.ok_or_else(|| {
                    handler.conversion(
                        format!("Cannot convert {} to {target_formula} without reaction context", self.unit),
                        None,
                    )
                })?;
                if !unit.has_dimension(Dimension::Amount) && !unit.has_dimension(Dimension::Mass) {
                    return Err(handler.conversion(
                        format!("Cannot convert {unit} to {target_formula} without mole dimension"),
                        None,
                    ));
                }
                if unit.has_dimension(Dimension::Mass) {
                    let ctx = self.formula_context(table, handler).ok_or_else(|| {
                        handler.conversion(format!("Cannot convert {unit} to moles"), None)
                    })?;
                    magnitude = SigDigNumber::new(ctx.mass_to_substance(magnitude.value), magnitude.sig_fig);
                    unit = unit::mole();
                }
                let source = self.formula_or_formulaless();
                let ratio = reaction_ctx.get(&(source, target_formula.clone())).ok_or_else(|| {
                    handler.conversion(format!("Cannot convert {unit} to {target_formula}"), None)
                })?;
                magnitude = SigDigNumber::new(magnitude.value * ratio.value, magnitude.sig_fig);
                formula = Some(target_formula.clone());
            }
        }

        Ok(Quantity::new(formula, magnitude, unit))
    }
}

fn convert_with_context(
    value: Decimal,
    from: &Unit,
    to: &Unit,
    ctx: Option<&TransformContext>,
) -> Option<Decimal> {
    if from.same_dimension(to) {
        return from.convert(value, to);
    }
    let ctx = ctx?;
    if from.has_dimension(Dimension::Mass) && to.has_dimension(Dimension::Amount) {
        let grams = from.convert(value, &unit::gram())?;
        let moles = ctx.mass_to_substance(grams);
        return unit::mole().convert(moles, to);
    }
    if from.has_dimension(Dimension::Amount) && to.has_dimension(Dimension::Mass) {
        let moles = from.convert(value, &unit::mole())?;
        let grams = ctx.substance_to_mass(moles);
        return unit::gram().convert(grams, to);
    }
    None
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.magnitude)?;
        if !self.unit.is_dimensionless() {
            write!(f, " {}", self.unit)?;
        }
        if self.formula_is_truthy() {
            write!(f, " {}", self.formula.as_ref().unwrap())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::Element;
    use crate::chem::formula::{Formula, Term};

    fn water_unit() -> FormulaUnit {
        FormulaUnit::new(vec![Formula::new(vec![
            Term::Element(Element::with_count("H", Decimal::from(2))),
            Term::Element(Element::new("O")),
        ])])
    }

    #[test]
    fn add_same_formula_and_unit() {
        let mut h = ErrorHandler::new();
        let mut ht = ErrorHandler::new();
        let table = PeriodicTable::from_json_str(r#"{"H":{"AtomicMass":"1.008"},"O":{"AtomicMass":"16.00"}}"#, &mut ht).unwrap();
        let water = water_unit();
        let a = Quantity::new(Some(water.clone()), SigDigNumber::exact(Decimal::ONE), unit::mole());
        let b = Quantity::new(Some(water.clone()), SigDigNumber::exact(Decimal::ONE), unit::mole());
        let c = a.add(&b, &table, None, &mut h).unwrap();
        assert_eq!(c.magnitude.value, Decimal::from(2));
        assert_eq!(c.unit, unit::mole());
        assert_eq!(c.formula, Some(water));
    }

    #[test]
    fn mul_concatenates_formula_and_squares_unit() {
        let mut h = ErrorHandler::new();
        let mut ht = ErrorHandler::new();
        let table = PeriodicTable::from_json_str(r#"{"H":{"AtomicMass":"1.008"},"O":{"AtomicMass":"16.00"}}"#, &mut ht).unwrap();
        let water = water_unit();
        let a = Quantity::new(Some(water.clone()), SigDigNumber::exact(Decimal::from(2)), unit::mole());
        let b = Quantity::new(Some(water.clone()), SigDigNumber::exact(Decimal::ONE), unit::mole());
        let c = a.mul(&b, &table, None, &mut h).unwrap();
        assert_eq!(c.magnitude.value, Decimal::from(2));
        assert_eq!(c.unit, unit::mole().mul(&unit::mole()));
        assert_eq!(c.formula.unwrap().formulas.len(), 2);
    }

    #[test]
    fn div_by_self_is_dimensionless_and_formulaless() {
        let mut h = ErrorHandler::new();
        let mut ht = ErrorHandler::new();
        let table = PeriodicTable::from_json_str(r#"{"H":{"AtomicMass":"1.008"},"O":{"AtomicMass":"16.00"}}"#, &mut ht).unwrap();
        let water = water_unit();
        let a = Quantity::new(Some(water.clone()), SigDigNumber::exact(Decimal::from(2)), unit::mole());
        let b = Quantity::new(Some(water), SigDigNumber::exact(Decimal::ONE), unit::mole());
        let c = a.div(&b, &table, None, &mut h).unwrap();
        assert!(c.unit.is_dimensionless());
        assert!(c.formula.unwrap().is_formulaless());
    }
}
