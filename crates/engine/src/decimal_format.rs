//! `xsl:decimal-format` and the `format-number()` pattern language.

use crate::compiler::Compiler;
use crate::error::{CompileError, RuntimeError};
use xform_tree::ExpandedName;

#[derive(Debug, Clone, PartialEq)]
pub struct DecimalFormat {
    pub decimal_separator: char,
    pub grouping_separator: char,
    pub infinity: String,
    pub minus_sign: char,
    pub nan: String,
    pub percent: char,
    pub per_mille: char,
    pub zero_digit: char,
    pub digit: char,
    pub pattern_separator: char,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            infinity: "Infinity".into(),
            minus_sign: '-',
            nan: "NaN".into(),
            percent: '%',
            per_mille: '\u{2030}',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
        }
    }
}

/// One half of a `positive;negative` pattern, taken apart.
#[derive(Debug, Default)]
struct SubPattern {
    prefix: String,
    suffix: String,
    min_integer: usize,
    grouping: Option<usize>,
    min_fraction: usize,
    max_fraction: usize,
    multiplier: f64,
}

impl DecimalFormat {
    /// Compiles an `xsl:decimal-format` element. The unnamed declaration
    /// replaces the default format.
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<(ExpandedName, Self), CompileError> {
        let mut name = ExpandedName::default();
        let mut format = Self::default();
        compiler.compile_attributes(|c, attr, value| {
            let single = || {
                let mut chars = value.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(ch),
                    _ => Err(CompileError::InvalidAttributeValue {
                        attribute: attr.to_string(),
                        value: value.to_string(),
                    }),
                }
            };
            match attr {
                "name" => name = c.resolve_qname(value)?,
                "decimal-separator" => format.decimal_separator = single()?,
                "grouping-separator" => format.grouping_separator = single()?,
                "infinity" => format.infinity = value.to_string(),
                "minus-sign" => format.minus_sign = single()?,
                "NaN" => format.nan = value.to_string(),
                "percent" => format.percent = single()?,
                "per-mille" => format.per_mille = single()?,
                "zero-digit" => format.zero_digit = single()?,
                "digit" => format.digit = single()?,
                "pattern-separator" => format.pattern_separator = single()?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        compiler.check_empty()?;
        Ok((name, format))
    }

    fn is_digit(&self, c: char) -> bool {
        c == self.digit || c == self.zero_digit
    }

    fn is_active(&self, c: char) -> bool {
        self.is_digit(c) || c == self.decimal_separator || c == self.grouping_separator
    }

    fn parse(&self, pattern: &str) -> Result<SubPattern, RuntimeError> {
        let chars: Vec<char> = pattern.chars().collect();
        let start = chars.iter().position(|&c| self.is_active(c));
        let end = chars.iter().rposition(|&c| self.is_active(c));
        let (Some(start), Some(end)) = (start, end) else {
            return Err(RuntimeError::Conversion {
                value: pattern.to_string(),
                target: "number format pattern".into(),
            });
        };
        let prefix: String = chars[..start].iter().collect();
        let suffix: String = chars[end + 1..].iter().collect();
        let body = &chars[start..=end];

        let split = body.iter().position(|&c| c == self.decimal_separator);
        let (integer, fraction) = match split {
            Some(i) => (&body[..i], &body[i + 1..]),
            None => (body, &body[body.len()..]),
        };
        let grouping = integer
            .iter()
            .rposition(|&c| c == self.grouping_separator)
            .map(|i| integer[i + 1..].iter().filter(|&&c| self.is_digit(c)).count())
            .filter(|&size| size > 0);
        let affixes = format!("{}{}", prefix, suffix);
        let multiplier = if affixes.contains(self.percent) {
            100.0
        } else if affixes.contains(self.per_mille) {
            1000.0
        } else {
            1.0
        };
        Ok(SubPattern {
            min_integer: integer.iter().filter(|&&c| c == self.zero_digit).count(),
            grouping,
            min_fraction: fraction.iter().filter(|&&c| c == self.zero_digit).count(),
            max_fraction: fraction.iter().filter(|&&c| self.is_digit(c)).count(),
            prefix,
            suffix,
            multiplier,
        })
    }

    /// Formats a number the way `format-number()` does.
    pub fn format(&self, number: f64, pattern: &str) -> Result<String, RuntimeError> {
        if number.is_nan() {
            return Ok(self.nan.clone());
        }
        let mut parts = pattern.splitn(2, self.pattern_separator);
        let positive = self.parse(parts.next().unwrap_or_default())?;
        let negative = parts.next().map(|p| self.parse(p)).transpose()?;

        // A negative sub-pattern only contributes its prefix and suffix.
        let (prefix, suffix) = match (&negative, number < 0.0) {
            (Some(neg), true) => (neg.prefix.clone(), neg.suffix.clone()),
            (None, true) => (format!("{}{}", self.minus_sign, positive.prefix), positive.suffix.clone()),
            _ => (positive.prefix.clone(), positive.suffix.clone()),
        };
        let sub = &positive;

        let value = number.abs() * sub.multiplier;
        if value.is_infinite() {
            return Ok(format!("{}{}{}", prefix, self.infinity, suffix));
        }

        let rounded = format!("{:.*}", sub.max_fraction, value);
        let (int_digits, frac_digits) = match rounded.split_once('.') {
            Some((i, f)) => (i.to_string(), f.to_string()),
            None => (rounded.clone(), String::new()),
        };
        let mut fraction = frac_digits;
        while fraction.len() > sub.min_fraction && fraction.ends_with('0') {
            fraction.pop();
        }
        let mut integer = int_digits.trim_start_matches('0').to_string();
        while integer.len() < sub.min_integer {
            integer.insert(0, '0');
        }
        if integer.is_empty() && fraction.is_empty() {
            integer.push('0');
        }

        let mut out = prefix;
        let digits: Vec<char> = integer.chars().collect();
        for (i, d) in digits.iter().enumerate() {
            let remaining = digits.len() - i;
            if i > 0
                && let Some(size) = sub.grouping
                && remaining % size == 0
            {
                out.push(self.grouping_separator);
            }
            out.push(self.localize(*d));
        }
        if !fraction.is_empty() {
            out.push(self.decimal_separator);
            out.extend(fraction.chars().map(|d| self.localize(d)));
        }
        out.push_str(&suffix);
        Ok(out)
    }

    fn localize(&self, digit: char) -> char {
        match digit.to_digit(10) {
            Some(d) => char::from_u32(self.zero_digit as u32 + d).unwrap_or(digit),
            None => digit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(number: f64, pattern: &str) -> String {
        DecimalFormat::default().format(number, pattern).unwrap()
    }

    #[test]
    fn test_basic_patterns() {
        assert_eq!(fmt(1234.5, "#,##0.00"), "1,234.50");
        assert_eq!(fmt(0.5, "#.##"), ".5");
        assert_eq!(fmt(0.0, "#"), "0");
        assert_eq!(fmt(7.0, "000"), "007");
        assert_eq!(fmt(3.14159, "0.###"), "3.142");
        assert_eq!(fmt(1234567.0, "#,###"), "1,234,567");
    }

    #[test]
    fn test_negative_and_special_values() {
        assert_eq!(fmt(-5.0, "0.0"), "-5.0");
        assert_eq!(fmt(-5.0, "0;(0)"), "(5)");
        assert_eq!(fmt(f64::NAN, "0"), "NaN");
        assert_eq!(fmt(f64::INFINITY, "0"), "Infinity");
    }

    #[test]
    fn test_percent_and_affixes() {
        assert_eq!(fmt(0.25, "0%"), "25%");
        assert_eq!(fmt(12.0, "$0.00"), "$12.00");
    }

    #[test]
    fn test_custom_symbols() {
        let european = DecimalFormat {
            decimal_separator: ',',
            grouping_separator: '.',
            ..DecimalFormat::default()
        };
        assert_eq!(european.format(1234.5, "#.##0,00").unwrap(), "1.234,50");
    }

    #[test]
    fn test_pattern_without_digits_is_an_error() {
        assert!(DecimalFormat::default().format(1.0, "abc").is_err());
    }
}
