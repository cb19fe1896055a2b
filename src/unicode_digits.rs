//! Unicode sub/superscript rendering shared by [`crate::number`] (scientific
//! exponents) and [`crate::chem`] (element counts, formula/ion charges).
//!
//! Ported from the `sub`/`sup` translation tables in
//! `chemistry_lang/objs/ch_chemistry.py`.

const PLAIN: &str = "0123456789.eE+-";
const SUPER: &str = "⁰¹²³⁴⁵⁶⁷⁸⁹.ᵉᴱ⁺⁻";
const SUB: &str = "₀₁₂₃₄₅₆₇₈₉.ₑₑ₊₋";

fn translate(s: &str, table: &str) -> String {
    let plain_chars: Vec<char> = PLAIN.chars().collect();
    let table_chars: Vec<char> = table.chars().collect();
    s.chars()
        .map(|c| {
            plain_chars
                .iter()
                .position(|&p| p == c)
                .map(|i| table_chars[i])
                .unwrap_or(c)
        })
        .collect()
}

pub fn to_superscript(s: &str) -> String {
    translate(s, SUPER)
}

pub fn to_subscript(s: &str) -> String {
    translate(s, SUB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_digits_and_sign() {
        assert_eq!(to_superscript("-3"), "⁻³");
        assert_eq!(to_subscript("2"), "₂");
    }
}
