//! Significant-digit numbers (SDN): an exact decimal magnitude paired with a
//! count of significant figures, so chemistry arithmetic rounds the way a
//! lab notebook would.
//!
//! Ground truth: `chemistry_lang/objs/ch_number.py` (`SignificantDigits`).

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::unicode_digits::to_superscript;

/// A sig-fig count large enough that it is never treated as a real limit on
/// precision: molar ratios derived from a balanced reaction's integer
/// coefficients carry this, per spec.md §4.2.
pub const INFINITE_SIG_FIGS: u32 = 999;

/// Exact decimal value plus a significant-figure count. `sig_fig == 0` means
/// "not a useful measurement" and displays as `"NA"`.
#[derive(Debug, Clone, Copy)]
pub struct SigDigNumber {
    pub value: Decimal,
    pub sig_fig: u32,
}

impl SigDigNumber {
    pub fn new(value: Decimal, sig_fig: u32) -> Self {
        SigDigNumber { value, sig_fig }
    }

    /// Wrap a plain decimal, inferring its sig-fig count from its own
    /// textual representation (an ordinary Rust number has "natural"
    /// precision, matching the coercion rule in spec.md §4.1).
    pub fn from_decimal(value: Decimal) -> Self {
        let sig_fig = parse_significant_digits(&value.to_string());
        SigDigNumber { value, sig_fig }
    }

    pub fn exact(value: Decimal) -> Self {
        SigDigNumber {
            value,
            sig_fig: INFINITE_SIG_FIGS,
        }
    }

    pub fn zero() -> Self {
        SigDigNumber::from_decimal(Decimal::ZERO)
    }

    /// Parse a scanner number literal, e.g. `"1_000.50e2"`, preserving the
    /// sig-fig rules from spec.md §4.1.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let cleaned: String = raw.chars().filter(|&c| c != '_').collect();
        let value = Decimal::from_str(&cleaned)
            .or_else(|_| Decimal::from_scientific(&cleaned))
            .map_err(|_| format!("Invalid number {raw}"))?;
        let sig_fig = parse_significant_digits(&cleaned);
        Ok(SigDigNumber { value, sig_fig })
    }

    fn decimal_places(&self) -> u32 {
        self.value.scale()
    }

    pub fn is_truthy(&self) -> bool {
        !self.value.is_zero()
    }

    pub fn to_i64(&self) -> i64 {
        self.value.trunc().to_i64().unwrap_or(0)
    }

    pub fn to_f64(&self) -> f64 {
        self.value.to_f64().unwrap_or(0.0)
    }
}

impl From<i64> for SigDigNumber {
    fn from(v: i64) -> Self {
        SigDigNumber::from_decimal(Decimal::from(v))
    }
}

impl From<Decimal> for SigDigNumber {
    fn from(value: Decimal) -> Self {
        SigDigNumber::from_decimal(value)
    }
}

impl fmt::Display for SigDigNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_significant(self.value, self.sig_fig))
    }
}

impl PartialEq for SigDigNumber {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.sig_fig == other.sig_fig
    }
}

impl PartialOrd for SigDigNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl Neg for SigDigNumber {
    type Output = SigDigNumber;
    fn neg(self) -> SigDigNumber {
        SigDigNumber::new(-self.value, self.sig_fig)
    }
}

impl Add for SigDigNumber {
    type Output = SigDigNumber;
    fn add(self, rhs: SigDigNumber) -> SigDigNumber {
        let precision = self.decimal_places().min(rhs.decimal_places());
        let result = self.value + rhs.value;
        let sig_fig = parse_significant_digits(&format!("{:.*}", precision as usize, result));
        SigDigNumber::new(result, sig_fig)
    }
}

impl Sub for SigDigNumber {
    type Output = SigDigNumber;
    fn sub(self, rhs: SigDigNumber) -> SigDigNumber {
        let precision = self.decimal_places().min(rhs.decimal_places());
        let result = self.value - rhs.value;
        let sig_fig = parse_significant_digits(&format!("{:.*}", precision as usize, result));
        SigDigNumber::new(result, sig_fig)
    }
}

impl Mul for SigDigNumber {
    type Output = SigDigNumber;
    fn mul(self, rhs: SigDigNumber) -> SigDigNumber {
        let precision = self.sig_fig.min(rhs.sig_fig);
        SigDigNumber::new(self.value * rhs.value, precision)
    }
}

impl Div for SigDigNumber {
    type Output = SigDigNumber;
    fn div(self, rhs: SigDigNumber) -> SigDigNumber {
        let precision = self.sig_fig.min(rhs.sig_fig);
        SigDigNumber::new(self.value / rhs.value, precision)
    }
}

/// Port of `SignificantDigits._parse_significant_digits`.
pub fn parse_significant_digits(raw: &str) -> u32 {
    let mut s: String = raw.chars().filter(|&c| c != '_').collect();
    if let Some(stripped) = s.strip_prefix('-') {
        s = stripped.to_string();
    }

    if let Some(pos) = s.find(['e', 'E']) {
        let mantissa = &s[..pos];
        return mantissa.chars().filter(|c| c.is_ascii_digit()).count() as u32;
    }

    if !s.contains('.') {
        return s.trim_end_matches('0').len() as u32;
    }

    let (int_part, decimal_part) = s.split_once('.').unwrap();
    if int_part == "0" || int_part.is_empty() {
        decimal_part.trim_start_matches('0').len() as u32
    } else {
        int_part.trim_start_matches('0').len() as u32 + decimal_part.len() as u32
    }
}

fn digit_count(mantissa: i128) -> u32 {
    mantissa.unsigned_abs().to_string().len() as u32
}

fn order_of_magnitude(value: Decimal) -> i32 {
    if value.is_zero() {
        return 0;
    }
    digit_count(value.mantissa()) as i32 - 1 - value.scale() as i32
}

fn pow10(n: u32) -> Decimal {
    let mut d = Decimal::ONE;
    for _ in 0..n {
        d *= Decimal::from(10u64);
    }
    d
}

fn round_to_decimal_places(value: Decimal, places: i32) -> Decimal {
    if places >= 0 {
        value.round_dp(places as u32)
    } else {
        let factor = pow10((-places) as u32);
        (value / factor).round_dp(0) * factor
    }
}

/// Port of `"{value:.{sig_fig}g}"`: round to `sig_fig` significant digits,
/// then render fixed-point or scientific depending on magnitude, matching
/// the general-format exponent rule (`-4 <= exp < sig_fig` ⇒ fixed).
fn format_significant(value: Decimal, sig_fig: u32) -> String {
    if sig_fig == 0 {
        return "NA".to_string();
    }
    if sig_fig >= INFINITE_SIG_FIGS {
        return value.normalize().to_string();
    }
    if value.is_zero() {
        let places = sig_fig.saturating_sub(1) as usize;
        return format!("{value:.places$}");
    }

    let neg = value.is_sign_negative();
    let abs = value.abs();
    let p = sig_fig as i32;

    let mut exponent = order_of_magnitude(abs);
    let scale_to_round = p - 1 - exponent;
    let mut rounded = round_to_decimal_places(abs, scale_to_round);
    let new_exponent = order_of_magnitude(rounded);
    if new_exponent != exponent {
        exponent = new_exponent;
        rounded = round_to_decimal_places(rounded, p - 1 - exponent);
    }

    let body = if exponent < -4 || exponent >= p {
        let mantissa = rounded / pow10_signed(exponent);
        let decimal_places = (p - 1).max(0) as usize;
        format!("{mantissa:.decimal_places$}×10{}", to_superscript(&exponent.to_string()))
    } else {
        let decimal_places = (p - 1 - exponent).max(0) as usize;
        format!("{rounded:.decimal_places$}")
    };

    if neg { format!("-{body}") } else { body }
}

fn pow10_signed(exp: i32) -> Decimal {
    if exp >= 0 {
        pow10(exp as u32)
    } else {
        Decimal::ONE / pow10((-exp) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdn(s: &str) -> SigDigNumber {
        SigDigNumber::parse(s).unwrap()
    }

    #[test]
    fn parses_sig_figs() {
        let a = sdn("1.2345");
        assert_eq!(a.value, Decimal::from_str("1.2345").unwrap());
        assert_eq!(a.sig_fig, 5);
        let d = sdn("1e3");
        assert_eq!(d.value, Decimal::from_str("1000").unwrap());
        assert_eq!(d.sig_fig, 1);
    }

    #[test]
    fn str_respects_sig_fig() {
        let c = SigDigNumber::new(Decimal::from_str("1.2345").unwrap(), 3);
        assert_eq!(c.to_string(), "1.23");
    }

    #[test]
    fn utils_match_python_port() {
        assert_eq!(parse_significant_digits("2.200"), 4);
        assert_eq!(parse_significant_digits("22.20"), 4);
        assert_eq!(parse_significant_digits("22.0"), 3);
    }

    #[test]
    fn add_keeps_min_decimal_places() {
        let a = sdn("1.2434");
        let b = sdn("1.2");
        let r = a + b;
        assert_eq!(r.value, Decimal::from_str("2.4434").unwrap());
        assert_eq!(r.sig_fig, 2);
        assert_eq!(r.to_string(), "2.4");
    }

    #[test]
    fn sub_can_render_na() {
        let a = sdn("1.2434");
        let b = sdn("1.2");
        let r = a - b;
        assert_eq!(r.value, Decimal::from_str("0.0434").unwrap());
        assert_eq!(r.sig_fig, 0);
        assert_eq!(r.to_string(), "NA");

        let a = sdn("23.2234");
        let b = sdn("1.2");
        let r = a - b;
        assert_eq!(r.value, Decimal::from_str("22.0234").unwrap());
        assert_eq!(r.sig_fig, 3);
        assert_eq!(r.to_string(), "22.0");
    }

    #[test]
    fn mul_keeps_min_sig_fig() {
        let a = sdn("1.2434");
        let b = sdn("1.2");
        let r = a * b;
        assert_eq!(r.value, Decimal::from_str("1.49208").unwrap());
        assert_eq!(r.sig_fig, 2);
        assert_eq!(r.to_string(), "1.5");
    }

    #[test]
    fn scientific_rendering_uses_superscript() {
        let ten = SigDigNumber::new(Decimal::from(10), 1);
        assert_eq!(ten.to_string(), "1×10¹");
    }
}
