use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Zero};
use rust_decimal::Decimal;

use crate::error::{ChemError, ErrorHandler};
use crate::number::SigDigNumber;

use super::formula::Formula;
use super::formula_unit::FormulaUnit;

/// An (unbalanced or balanced) chemical equation: `reactants -> products`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub reactants: Vec<Formula>,
    pub products: Vec<Formula>,
    pub arrow_line: Option<u32>,
}

impl Reaction {
    pub fn new(reactants: Vec<Formula>, products: Vec<Formula>, arrow_line: Option<u32>) -> Self {
        Reaction {
            reactants,
            products,
            arrow_line,
        }
    }

    fn all_formulas(&self) -> impl Iterator<Item = &Formula> {
        self.reactants.iter().chain(self.products.iter())
    }

    /// Solve for integer stoichiometric coefficients via Gaussian
    /// elimination over exact rationals, then scale the single free
    /// variable by the LCM of the other coefficients' denominators so every
    /// variable lands on a positive integer.
    pub fn balanced(&self, handler: &mut ErrorHandler) -> Result<Reaction, ChemError> {
        let elements: BTreeSet<String> = self
            .all_formulas()
            .flat_map(|f| f.count_dict().into_keys())
            .collect();

        let n = self.reactants.len() + self.products.len();
        let mut matrix: Vec<Vec<BigRational>> = Vec::new();
        for element in &elements {
            let mut row = Vec::with_capacity(n + 1);
            for reactant in &self.reactants {
                row.push(decimal_to_rational(reactant.count_of(element)));
            }
            for product in &self.products {
                row.push(-decimal_to_rational(product.count_of(element)));
            }
            row.push(BigRational::zero());
            matrix.push(row);
        }

        let pivots = row_reduce(&mut matrix, n);
        let pivot_cols: BTreeSet<usize> = pivots.iter().map(|&(_, col)| col).collect();
        let free_cols: Vec<usize> = (0..n).filter(|c| !pivot_cols.contains(c)).collect();

        let free_col = match free_cols.as_slice() {
            [single] => *single,
            _ => {
                return Err(handler.type_error(format!("Can not balance {self}"), self.arrow_line));
            }
        };

        let mut coeffs = vec![BigRational::zero(); n];
        coeffs[free_col] = BigRational::one();
        for &(row, col) in &pivots {
            coeffs[col] = -matrix[row][free_col].clone();
        }

        let lcm = coeffs
            .iter()
            .map(|c| c.denom().clone())
            .fold(BigInt::one(), |acc, d| acc.lcm(&d));

        let mut integer_coeffs = Vec::with_capacity(n);
        for c in &coeffs {
            let scaled = c * BigRational::from_integer(lcm.clone());
            if !scaled.is_integer() {
                return Err(handler.type_error(format!("Can not balance {self}"), self.arrow_line));
            }
            integer_coeffs.push(bigint_to_decimal(scaled.to_integer()));
        }

        let mut reactants = Vec::with_capacity(self.reactants.len());
        for (formula, count) in self.reactants.iter().zip(&integer_coeffs) {
            reactants.push(formula.clone().with_count(*count));
        }
        let mut products = Vec::with_capacity(self.products.len());
        for (formula, count) in self
            .products
            .iter()
            .zip(&integer_coeffs[self.reactants.len()..])
        {
            products.push(formula.clone().with_count(*count));
        }

        Ok(Reaction::new(reactants, products, self.arrow_line))
    }

    /// Molar-ratio lookup table keyed by every ordered pair of
    /// single-formula units drawn from this (already-balanced) reaction's
    /// reactants and products.
    pub fn context(&self) -> HashMap<(FormulaUnit, FormulaUnit), SigDigNumber> {
        let all: Vec<&Formula> = self.all_formulas().collect();
        let mut map = HashMap::new();
        for numerator in &all {
            for denominator in &all {
                if std::ptr::eq(*numerator, *denominator) {
                    continue;
                }
                let src = FormulaUnit::new(vec![bare(numerator)]);
                let dst = FormulaUnit::new(vec![bare(denominator)]);
                let ratio = denominator.count / numerator.count;
                map.insert((src, dst), SigDigNumber::exact(ratio));
            }
        }
        map
    }
}

fn bare(formula: &Formula) -> Formula {
    Formula::new(formula.terms.clone())
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reactants: Vec<String> = self.reactants.iter().map(|x| x.to_string()).collect();
        let products: Vec<String> = self.products.iter().map(|x| x.to_string()).collect();
        write!(f, "{} -> {}", reactants.join(" + "), products.join(" + "))
    }
}

fn decimal_to_rational(value: Decimal) -> BigRational {
    let scale = value.scale();
    let mantissa = BigInt::from(value.mantissa());
    let mut denom = BigInt::one();
    for _ in 0..scale {
        denom *= BigInt::from(10u32);
    }
    BigRational::new(mantissa, denom)
}

fn bigint_to_decimal(value: BigInt) -> Decimal {
    Decimal::from_str(&value.to_string()).unwrap_or(Decimal::ZERO)
}

/// Reduced row echelon form via Gaussian elimination, restricted to the
/// `n` variable columns (the trailing augmented column is always zero for
/// this homogeneous system and is carried along but never pivoted on).
/// Returns `(row, column)` for each pivot found.
fn row_reduce(matrix: &mut [Vec<BigRational>], n: usize) -> Vec<(usize, usize)> {
    let rows = matrix.len();
    let mut pivots = Vec::new();
    let mut pivot_row = 0;
    for col in 0..n {
        if pivot_row >= rows {
            break;
        }
        let Some(sel) = (pivot_row..rows).find(|&r| !matrix[r][col].is_zero()) else {
            continue;
        };
        matrix.swap(pivot_row, sel);
        let pivot_val = matrix[pivot_row][col].clone();
        for c in matrix[pivot_row].iter_mut() {
            *c /= pivot_val.clone();
        }
        for r in 0..rows {
            if r == pivot_row {
                continue;
            }
            let factor = matrix[r][col].clone();
            if !factor.is_zero() {
                let pivot_row_clone = matrix[pivot_row].clone();
                for (c, pivot_c) in matrix[r].iter_mut().zip(pivot_row_clone.iter()) {
                    *c -= factor.clone() * pivot_c.clone();
                }
            }
        }
        pivots.push((pivot_row, col));
        pivot_row += 1;
    }
    pivots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::Element;
    use crate::chem::formula::Term;

    fn formula(terms: Vec<(&str, i64)>) -> Formula {
        Formula::new(
            terms
                .into_iter()
                .map(|(symbol, count)| Term::Element(Element::with_count(symbol, Decimal::from(count))))
                .collect(),
        )
    }

    #[test]
    fn balances_hydrogen_and_oxygen() {
        // H2 + O2 -> H2O
        let reaction = Reaction::new(
            vec![formula(vec![("H", 2)]), formula(vec![("O", 2)])],
            vec![formula(vec![("H", 2), ("O", 1)])],
            None,
        );
        let mut h = ErrorHandler::new();
        let balanced = reaction.balanced(&mut h).unwrap();
        assert_eq!(balanced.reactants[0].count, Decimal::from(2));
        assert_eq!(balanced.reactants[1].count, Decimal::from(1));
        assert_eq!(balanced.products[0].count, Decimal::from(2));
    }

    #[test]
    fn combustion_of_methane_balances() {
        // CH4 + O2 -> CO2 + H2O
        let reaction = Reaction::new(
            vec![formula(vec![("C", 1), ("H", 4)]), formula(vec![("O", 2)])],
            vec![
                formula(vec![("C", 1), ("O", 2)]),
                formula(vec![("H", 2), ("O", 1)]),
            ],
            None,
        );
        let mut h = ErrorHandler::new();
        let balanced = reaction.balanced(&mut h).unwrap();
        assert_eq!(balanced.reactants[0].count, Decimal::from(1));
        assert_eq!(balanced.reactants[1].count, Decimal::from(2));
        assert_eq!(balanced.products[0].count, Decimal::from(1));
        assert_eq!(balanced.products[1].count, Decimal::from(2));
    }
}
