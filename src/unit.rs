//! The unit registry (UR): SI units, the custom `atom` unit, and the
//! multiplication/division/comparison/conversion algebra quantities need.
//!
//! Ground truth: `chemistry_lang/objs/ch_ureg.py`, which wraps `pint`'s
//! `UnitRegistry` and defines `atom = mole / 6.0221408e23`. `pint` itself is
//! an external collaborator (per spec.md §1); this module reimplements only
//! the capabilities the language actually exercises: symbol lookup with SI
//! prefixes, dimensional-vector comparison, and scale-factor conversion.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Mass,
    Length,
    Time,
    Current,
    Temperature,
    Amount,
    Luminosity,
    Volume,
}

/// A single registered symbol: which dimension it measures, and its scale
/// relative to that dimension's reference unit (gram, meter, second, ampere,
/// kelvin, mole, candela).
#[derive(Debug, Clone, Copy)]
struct BaseUnit {
    dimension: Dimension,
    scale: f64,
}

const PREFIXES: &[(&str, f64)] = &[
    ("yotta", 1e24),
    ("zetta", 1e21),
    ("exa", 1e18),
    ("peta", 1e15),
    ("tera", 1e12),
    ("giga", 1e9),
    ("mega", 1e6),
    ("kilo", 1e3),
    ("hecto", 1e2),
    ("deca", 1e1),
    ("deci", 1e-1),
    ("centi", 1e-2),
    ("milli", 1e-3),
    ("micro", 1e-6),
    ("nano", 1e-9),
    ("pico", 1e-12),
    ("femto", 1e-15),
    ("atto", 1e-18),
    ("zepto", 1e-21),
    ("yocto", 1e-24),
];

/// Base symbols accepted with prefixes (gram, meter, ...) plus a handful of
/// already-prefixed/derived symbols (liter, atom) that stand alone.
const BASE_SYMBOLS: &[(&str, Dimension, f64)] = &[
    ("gram", Dimension::Mass, 1.0),
    ("mole", Dimension::Amount, 1.0),
    ("mol", Dimension::Amount, 1.0),
    ("meter", Dimension::Length, 1.0),
    ("second", Dimension::Time, 1.0),
    ("kelvin", Dimension::Temperature, 1.0),
    ("ampere", Dimension::Current, 1.0),
    ("candela", Dimension::Luminosity, 1.0),
];

/// Symbols that stand alone, never combined with an SI prefix. `liter` gets
/// its own dimension rather than `Length^3`: the language only ever
/// compares/combines volumes with other volumes, never with raw lengths.
const STANDALONE_SYMBOLS: &[(&str, Dimension, f64)] = &[
    ("liter", Dimension::Volume, 1.0),
    ("atom", Dimension::Amount, 1.0 / 6.0221408e23),
];

fn lookup_symbol(sym: &str) -> Option<BaseUnit> {
    for &(name, dimension, scale) in STANDALONE_SYMBOLS {
        if sym == name {
            return Some(BaseUnit { dimension, scale });
        }
    }
    for &(name, dimension, scale) in BASE_SYMBOLS {
        if sym == name {
            return Some(BaseUnit { dimension, scale });
        }
    }
    for &(prefix, factor) in PREFIXES {
        if let Some(rest) = sym.strip_prefix(prefix) {
            for &(name, dimension, scale) in BASE_SYMBOLS {
                if rest == name {
                    return Some(BaseUnit {
                        dimension,
                        scale: scale * factor,
                    });
                }
            }
        }
    }
    None
}

/// A product of registered symbols raised to integer powers, e.g.
/// `{"gram": 1, "mole": -1}` for `gram/mole`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Unit {
    components: BTreeMap<String, i32>,
}

impl Unit {
    pub fn dimensionless() -> Unit {
        Unit::default()
    }

    pub fn is_dimensionless(&self) -> bool {
        self.components.values().all(|&e| e == 0)
    }

    /// Scanner-facing constructor: a single named symbol (with optional SI
    /// prefix) raised to the first power.
    pub fn symbol(name: &str) -> Result<Unit, String> {
        if lookup_symbol(name).is_none() {
            return Err(format!("'{name}' is not defined in the unit registry"));
        }
        let mut components = BTreeMap::new();
        components.insert(name.to_string(), 1);
        Ok(Unit { components })
    }

    fn combine(&self, other: &Unit, sign: i32) -> Unit {
        let mut components = self.components.clone();
        for (sym, exp) in &other.components {
            let entry = components.entry(sym.clone()).or_insert(0);
            *entry += sign * exp;
            if *entry == 0 {
                components.remove(sym);
            }
        }
        Unit { components }
    }

    pub fn mul(&self, other: &Unit) -> Unit {
        self.combine(other, 1)
    }

    pub fn div(&self, other: &Unit) -> Unit {
        self.combine(other, -1)
    }

    pub fn pow(&self, n: i32) -> Unit {
        let components = self
            .components
            .iter()
            .map(|(sym, exp)| (sym.clone(), exp * n))
            .filter(|(_, exp)| *exp != 0)
            .collect();
        Unit { components }
    }

    pub fn invert(&self) -> Unit {
        self.pow(-1)
    }

    fn dimension_vector(&self) -> BTreeMap<Dimension, i32> {
        let mut v: BTreeMap<Dimension, i32> = BTreeMap::new();
        for (sym, exp) in &self.components {
            let base = lookup_symbol(sym).expect("unit component must be registered");
            *v.entry(base.dimension).or_insert(0) += exp;
        }
        v.retain(|_, e| *e != 0);
        v
    }

    pub fn same_dimension(&self, other: &Unit) -> bool {
        self.dimension_vector() == other.dimension_vector()
    }

    pub fn has_dimension(&self, dimension: Dimension) -> bool {
        let v = self.dimension_vector();
        v.len() == 1 && v.get(&dimension) == Some(&1)
    }

    fn scale(&self) -> f64 {
        self.components
            .iter()
            .map(|(sym, exp)| lookup_symbol(sym).unwrap().scale.powi(*exp))
            .product()
    }

    /// Convert `value` expressed in `self` units into `target` units. `None`
    /// if the two units don't share a dimension.
    pub fn convert(&self, value: Decimal, target: &Unit) -> Option<Decimal> {
        if !self.same_dimension(target) {
            return None;
        }
        if self == target {
            return Some(value);
        }
        let factor = self.scale() / target.scale();
        let factor = Decimal::from_str(&format!("{factor:.15}")).ok()?;
        Some(value * factor)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return Ok(());
        }
        let (num, den): (Vec<_>, Vec<_>) = self.components.iter().partition(|(_, &e)| e > 0);
        let render = |parts: &[(&String, &i32)]| -> String {
            parts
                .iter()
                .map(|(sym, exp)| {
                    if exp.abs() == 1 {
                        (*sym).clone()
                    } else {
                        format!("{sym}^{}", exp.abs())
                    }
                })
                .collect::<Vec<_>>()
                .join("*")
        };
        let num_str = if num.is_empty() {
            "1".to_string()
        } else {
            render(&num)
        };
        if den.is_empty() {
            write!(f, "{num_str}")
        } else {
            write!(f, "{num_str}/{}", render(&den))
        }
    }
}

pub fn mole() -> Unit {
    Unit::symbol("mole").unwrap()
}

pub fn gram() -> Unit {
    Unit::symbol("gram").unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mole_and_gram_are_different_units_same_family() {
        let mole = Unit::symbol("mole").unwrap();
        let gram = Unit::symbol("gram").unwrap();
        assert_ne!(mole, gram);
        assert!(!mole.same_dimension(&gram));
    }

    #[test]
    fn mole_times_mole_is_mole_squared() {
        let mole = Unit::symbol("mole").unwrap();
        let squared = mole.mul(&mole);
        assert_eq!(squared.to_string(), "mole^2");
    }

    #[test]
    fn mole_divided_by_mole_is_dimensionless() {
        let mole = Unit::symbol("mole").unwrap();
        let result = mole.div(&mole);
        assert!(result.is_dimensionless());
    }

    #[test]
    fn atom_converts_to_mole() {
        let atom = Unit::symbol("atom").unwrap();
        let mole = Unit::symbol("mole").unwrap();
        let converted = atom.convert(Decimal::from(6), &mole).unwrap();
        assert!(converted < Decimal::new(1, 0));
    }

    #[test]
    fn kilogram_converts_to_gram() {
        let kg = Unit::symbol("kilogram").unwrap();
        let g = Unit::symbol("gram").unwrap();
        let converted = kg.convert(Decimal::from(2), &g).unwrap();
        assert_eq!(converted, Decimal::from(2000));
    }

    #[test]
    fn unregistered_symbol_is_rejected() {
        assert!(Unit::symbol("banana").is_err());
    }
}
