//! Value conversion engine.
//!
//! A [`Conversion`] maps a raw channel value to its engineering value. The
//! kind specific parameters live in [`ConversionKind`]; text tables may
//! contain nested conversions ([`TextValue::Scale`]).
//!
//! Out-of-table inputs of the interpolating and nearest-key tables clamp to
//! the first or last entry. Range and exact-key tables fall back to their
//! default entry.

pub mod formula;
pub mod table;

use crate::{Error, Result, types::Value};

use formula::Expr;

/// Nesting limit for conversions referenced from text tables.
pub const MAX_CONVERSION_DEPTH: usize = 20;

/// Result entry of a value-to-text or range-to-text table.
#[derive(Debug, Clone, PartialEq)]
pub enum TextValue {
    Text(String),
    /// Nested conversion applied to the raw value.
    Scale(Box<Conversion>),
}

impl TextValue {
    pub fn text(text: &str) -> Self {
        TextValue::Text(text.to_string())
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            TextValue::Text(t) => Some(t),
            TextValue::Scale(_) => None,
        }
    }

    fn resolve(&self, raw: &Value) -> Value {
        match self {
            TextValue::Text(t) => Value::String(t.clone()),
            TextValue::Scale(conversion) => conversion.apply(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionKind {
    Identity,
    /// `offset + factor * raw`.
    Linear { offset: f64, factor: f64 },
    /// `(p0*x^2 + p1*x + p2) / (p3*x^2 + p4*x + p5)`.
    Rational { p: [f64; 6] },
    Algebraic {
        formula: String,
        /// `None` when the formula does not compile; such conversions
        /// produce NaN.
        expr: Option<Expr>,
    },
    /// MDF3 exponential conversion with parameters P1..P7.
    Exponential { p: [f64; 7] },
    /// MDF3 logarithmic conversion with parameters P1..P7.
    Logarithmic { p: [f64; 7] },
    /// `(key, value)` sorted by key, linear interpolation in between.
    ValueToValueInterp { table: Vec<(f64, f64)> },
    /// `(key, value)` sorted by key, nearest key in between.
    ValueToValue { table: Vec<(f64, f64)> },
    /// `(min, max, value)` ranges.
    RangeToValue {
        ranges: Vec<(f64, f64, f64)>,
        default: f64,
    },
    ValueToText {
        table: Vec<(f64, TextValue)>,
        default: TextValue,
    },
    RangeToText {
        ranges: Vec<(f64, f64, TextValue)>,
        default: TextValue,
    },
    TextToValue {
        table: Vec<(String, f64)>,
        default: f64,
    },
    /// Translation table; inputs without an entry map to `default`, or stay
    /// unchanged when there is none.
    TextToText {
        table: Vec<(String, String)>,
        default: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub name: String,
    pub unit: String,
    pub description: String,
    pub precision: Option<u8>,
    /// Physical range.
    pub range: Option<(f64, f64)>,
    pub kind: ConversionKind,
    pub inverse: Option<Box<Conversion>>,
}

impl Default for Conversion {
    fn default() -> Self {
        Self::new(ConversionKind::Identity)
    }
}

impl Conversion {
    pub fn new(kind: ConversionKind) -> Self {
        Self {
            name: String::new(),
            unit: String::new(),
            description: String::new(),
            precision: None,
            range: None,
            kind,
            inverse: None,
        }
    }

    pub fn identity() -> Self {
        Self::new(ConversionKind::Identity)
    }

    pub fn linear(offset: f64, factor: f64) -> Self {
        Self::new(ConversionKind::Linear { offset, factor })
    }

    pub fn rational(p: [f64; 6]) -> Self {
        Self::new(ConversionKind::Rational { p })
    }

    /// Algebraic conversion; fails when `formula` does not compile.
    pub fn algebraic(formula: &str) -> Result<Self> {
        let expr = formula::compile(formula)?;
        Ok(Self::new(ConversionKind::Algebraic {
            formula: formula.to_string(),
            expr: Some(expr),
        }))
    }

    /// Table conversion, sorted by key.
    pub fn value_to_value(mut table: Vec<(f64, f64)>, interpolate: bool) -> Self {
        table.sort_by(|a, b| a.0.total_cmp(&b.0));
        if interpolate {
            Self::new(ConversionKind::ValueToValueInterp { table })
        } else {
            Self::new(ConversionKind::ValueToValue { table })
        }
    }

    pub fn range_to_value(ranges: Vec<(f64, f64, f64)>, default: f64) -> Self {
        Self::new(ConversionKind::RangeToValue { ranges, default })
    }

    pub fn value_to_text(table: &[(f64, &str)], default: &str) -> Self {
        Self::new(ConversionKind::ValueToText {
            table: table.iter().map(|(k, t)| (*k, TextValue::text(t))).collect(),
            default: TextValue::text(default),
        })
    }

    pub fn range_to_text(ranges: &[(f64, f64, &str)], default: &str) -> Self {
        Self::new(ConversionKind::RangeToText {
            ranges: ranges
                .iter()
                .map(|(lo, hi, t)| (*lo, *hi, TextValue::text(t)))
                .collect(),
            default: TextValue::text(default),
        })
    }

    pub fn text_to_value(table: &[(&str, f64)], default: f64) -> Self {
        Self::new(ConversionKind::TextToValue {
            table: table.iter().map(|(t, v)| (t.to_string(), *v)).collect(),
            default,
        })
    }

    pub fn text_to_text(table: &[(&str, &str)], default: Option<&str>) -> Self {
        Self::new(ConversionKind::TextToText {
            table: table
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            default: default.map(str::to_string),
        })
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// MDF4 `cc_type` code. Exponential and logarithmic conversions are
    /// stored as algebraic formulas in MDF4.
    pub fn type_code(&self) -> u8 {
        match &self.kind {
            ConversionKind::Identity => 0,
            ConversionKind::Linear { .. } => 1,
            ConversionKind::Rational { .. } => 2,
            ConversionKind::Algebraic { .. }
            | ConversionKind::Exponential { .. }
            | ConversionKind::Logarithmic { .. } => 3,
            ConversionKind::ValueToValueInterp { .. } => 4,
            ConversionKind::ValueToValue { .. } => 5,
            ConversionKind::RangeToValue { .. } => 6,
            ConversionKind::ValueToText { .. } => 7,
            ConversionKind::RangeToText { .. } => 8,
            ConversionKind::TextToValue { .. } => 9,
            ConversionKind::TextToText { .. } => 10,
        }
    }

    /// Formula text of algebraic, exponential and logarithmic conversions.
    pub fn formula(&self) -> Option<String> {
        match &self.kind {
            ConversionKind::Algebraic { formula, .. } => Some(formula.clone()),
            ConversionKind::Exponential { p } => Some(asam_formula("exp", p)),
            ConversionKind::Logarithmic { p } => Some(asam_formula("ln", p)),
            _ => None,
        }
    }

    /// Depth of nested conversions below this one.
    pub fn depth(&self) -> usize {
        let nested = |v: &TextValue| match v {
            TextValue::Scale(c) => 1 + c.depth(),
            TextValue::Text(_) => 0,
        };
        match &self.kind {
            ConversionKind::ValueToText { table, default } => table
                .iter()
                .map(|(_, v)| nested(v))
                .chain(std::iter::once(nested(default)))
                .max()
                .unwrap_or(0),
            ConversionKind::RangeToText { ranges, default } => ranges
                .iter()
                .map(|(_, _, v)| nested(v))
                .chain(std::iter::once(nested(default)))
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Engineering value of `raw`.
    pub fn apply(&self, raw: &Value) -> Value {
        match &self.kind {
            ConversionKind::Identity => raw.clone(),
            ConversionKind::TextToValue { table, default } => {
                let text = raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());
                let value = table
                    .iter()
                    .find(|(key, _)| *key == text)
                    .map_or(*default, |(_, v)| *v);
                Value::Float(value)
            }
            ConversionKind::TextToText { table, default } => {
                let text = raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());
                let out = table
                    .iter()
                    .find(|(key, _)| *key == text)
                    .map(|(_, v)| v.clone())
                    .or_else(|| default.clone())
                    .unwrap_or(text);
                Value::String(out)
            }
            ConversionKind::ValueToText { table, default } => match raw.as_f64() {
                Some(x) => table::find_key(table, x)
                    .map_or(default, |i| &table[i].1)
                    .resolve(raw),
                None => default.resolve(raw),
            },
            ConversionKind::RangeToText { ranges, default } => match raw.as_f64() {
                Some(x) => table::find_range(ranges, x, raw.is_integer())
                    .map_or(default, |i| &ranges[i].2)
                    .resolve(raw),
                None => default.resolve(raw),
            },
            _ => match raw.as_f64() {
                Some(x) => Value::Float(self.apply_f64(x, raw.is_integer())),
                None => raw.clone(),
            },
        }
    }

    /// Numeric conversions on a plain `f64`. Text producing kinds return
    /// the input unchanged.
    pub fn apply_f64(&self, x: f64, integer_input: bool) -> f64 {
        match &self.kind {
            ConversionKind::Identity => x,
            ConversionKind::Linear { offset, factor } => offset + factor * x,
            ConversionKind::Rational { p } => {
                let num = p[0] * x * x + p[1] * x + p[2];
                let den = p[3] * x * x + p[4] * x + p[5];
                num / den
            }
            ConversionKind::Algebraic { expr, .. } => {
                expr.as_ref().map_or(f64::NAN, |e| e.eval(x))
            }
            ConversionKind::Exponential { p } => exp_log(p, x, f64::exp),
            ConversionKind::Logarithmic { p } => exp_log(p, x, f64::ln),
            ConversionKind::ValueToValueInterp { table } => {
                table::interpolate(table, x).unwrap_or(x)
            }
            ConversionKind::ValueToValue { table } => table::nearest(table, x).unwrap_or(x),
            ConversionKind::RangeToValue { ranges, default } => {
                table::find_range(ranges, x, integer_input).map_or(*default, |i| ranges[i].2)
            }
            ConversionKind::ValueToText { .. }
            | ConversionKind::RangeToText { .. }
            | ConversionKind::TextToValue { .. }
            | ConversionKind::TextToText { .. } => x,
        }
    }

    /// Inverse conversion, created on first use and kept in
    /// [`inverse`](Self::inverse).
    pub fn create_inverse(&mut self) -> Result<&Conversion> {
        if self.inverse.is_none() {
            self.inverse = Some(Box::new(self.inverted()?));
        }
        match self.inverse.as_deref() {
            Some(inverse) => Ok(inverse),
            None => Err(Error::NotInvertible(self.describe())),
        }
    }

    /// Computes the inverse conversion without storing it.
    pub fn inverted(&self) -> Result<Conversion> {
        let not_invertible = || Error::NotInvertible(self.describe());
        let kind = match &self.kind {
            ConversionKind::Identity => ConversionKind::Identity,
            ConversionKind::Linear { offset, factor } => {
                if *factor == 0.0 || !factor.is_finite() {
                    return Err(not_invertible());
                }
                ConversionKind::Linear {
                    offset: -offset / factor,
                    factor: 1.0 / factor,
                }
            }
            ConversionKind::Rational { p } => {
                // Only first order: y = (p1 x + p2) / (p4 x + p5).
                if p[0] != 0.0 || p[3] != 0.0 || p[1] * p[5] - p[2] * p[4] == 0.0 {
                    return Err(not_invertible());
                }
                ConversionKind::Rational {
                    p: [0.0, p[5], -p[2], 0.0, -p[4], p[1]],
                }
            }
            ConversionKind::ValueToValueInterp { table } | ConversionKind::ValueToValue { table } => {
                if table.is_empty() || !table::is_strictly_monotonic(table.iter().map(|e| e.1)) {
                    return Err(not_invertible());
                }
                let mut swapped: Vec<(f64, f64)> = table.iter().map(|(k, v)| (*v, *k)).collect();
                swapped.sort_by(|a, b| a.0.total_cmp(&b.0));
                match self.kind {
                    ConversionKind::ValueToValueInterp { .. } => {
                        ConversionKind::ValueToValueInterp { table: swapped }
                    }
                    _ => ConversionKind::ValueToValue { table: swapped },
                }
            }
            ConversionKind::ValueToText { table, .. } => {
                let mut inverse = Vec::with_capacity(table.len());
                for (key, value) in table {
                    let text = value.as_text().ok_or_else(not_invertible)?;
                    if inverse.iter().any(|(t, _): &(String, f64)| t == text) {
                        return Err(not_invertible());
                    }
                    inverse.push((text.to_string(), *key));
                }
                ConversionKind::TextToValue {
                    table: inverse,
                    default: 0.0,
                }
            }
            ConversionKind::TextToValue { table, .. } => {
                let mut inverse: Vec<(f64, TextValue)> = Vec::with_capacity(table.len());
                for (text, value) in table {
                    if inverse.iter().any(|(k, _)| k == value) {
                        return Err(not_invertible());
                    }
                    inverse.push((*value, TextValue::Text(text.clone())));
                }
                ConversionKind::ValueToText {
                    table: inverse,
                    default: TextValue::Text(String::new()),
                }
            }
            ConversionKind::TextToText { table, .. } => {
                let mut inverse: Vec<(String, String)> = Vec::with_capacity(table.len());
                for (from, to) in table {
                    if inverse.iter().any(|(k, _)| k == to) {
                        return Err(not_invertible());
                    }
                    inverse.push((to.clone(), from.clone()));
                }
                ConversionKind::TextToText {
                    table: inverse,
                    default: None,
                }
            }
            ConversionKind::Algebraic { .. }
            | ConversionKind::Exponential { .. }
            | ConversionKind::Logarithmic { .. }
            | ConversionKind::RangeToValue { .. }
            | ConversionKind::RangeToText { .. } => return Err(not_invertible()),
        };
        Ok(Conversion {
            name: self.name.clone(),
            unit: String::new(),
            description: String::new(),
            precision: None,
            range: None,
            kind,
            inverse: None,
        })
    }

    fn describe(&self) -> String {
        let name = if self.name.is_empty() {
            "conversion"
        } else {
            self.name.as_str()
        };
        format!("{name} of type {}", self.type_code())
    }
}

/// MDF3 exponential/logarithmic evaluation with `f` = exp or ln.
fn exp_log(p: &[f64; 7], x: f64, f: fn(f64) -> f64) -> f64 {
    if p[3] == 0.0 {
        f(((x - p[6]) * p[5] - p[2]) / p[0]) / p[1]
    } else if p[0] == 0.0 {
        f((p[2] / (x - p[6]) - p[5]) / p[3]) / p[4]
    } else {
        f64::NAN
    }
}

fn asam_formula(function: &str, p: &[f64; 7]) -> String {
    if p[3] == 0.0 {
        format!(
            "{function}(((X-{})*{}-{})/{})/{}",
            p[6], p[5], p[2], p[0], p[1]
        )
    } else {
        format!(
            "{function}(({}/(X-{})-{})/{})/{}",
            p[2], p[6], p[5], p[3], p[4]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_law_and_inverse() {
        let mut conv = Conversion::linear(2.0, 0.5);
        assert_eq!(conv.apply(&Value::UnsignedInteger(10)), Value::Float(7.0));
        let inverse = conv.create_inverse().unwrap().clone();
        assert_eq!(inverse.apply_f64(7.0, false), 10.0);
        let back = inverse.inverted().unwrap();
        assert_eq!(back.kind, ConversionKind::Linear { offset: 2.0, factor: 0.5 });
    }

    #[test]
    fn zero_factor_is_not_invertible() {
        let err = Conversion::linear(1.0, 0.0).inverted().unwrap_err();
        assert!(matches!(err, Error::NotInvertible(_)));
    }

    #[test]
    fn first_order_rational_inverse() {
        // y = (2x + 1) / (x + 3)
        let conv = Conversion::rational([0.0, 2.0, 1.0, 0.0, 1.0, 3.0]);
        let inv = conv.inverted().unwrap();
        let y = conv.apply_f64(4.0, false);
        assert!((inv.apply_f64(y, false) - 4.0).abs() < 1e-12);
        assert!(Conversion::rational([1.0, 0.0, 0.0, 0.0, 0.0, 1.0]).inverted().is_err());
    }

    #[test]
    fn tables_clamp_and_invert() {
        let conv = Conversion::value_to_value(vec![(10.0, 100.0), (0.0, 0.0)], true);
        assert_eq!(conv.apply_f64(-3.0, false), 0.0);
        assert_eq!(conv.apply_f64(5.0, false), 50.0);
        assert_eq!(conv.apply_f64(30.0, false), 100.0);
        let inv = conv.inverted().unwrap();
        assert_eq!(inv.apply_f64(50.0, false), 5.0);

        let bumpy = Conversion::value_to_value(vec![(0.0, 0.0), (1.0, 5.0), (2.0, 3.0)], true);
        assert!(matches!(bumpy.inverted(), Err(Error::NotInvertible(_))));
    }

    #[test]
    fn range_to_value_uses_default() {
        let conv = Conversion::range_to_value(vec![(0.0, 9.0, 1.0), (10.0, 19.0, 2.0)], -1.0);
        assert_eq!(conv.apply_f64(9.0, true), 1.0);
        assert_eq!(conv.apply_f64(9.5, false), -1.0);
        assert_eq!(conv.apply_f64(15.0, false), 2.0);
    }

    #[test]
    fn text_tables() {
        let v2t = Conversion::value_to_text(&[(0.0, "Rx"), (1.0, "Tx")], "");
        assert_eq!(v2t.apply(&Value::UnsignedInteger(1)), Value::String("Tx".into()));
        assert_eq!(v2t.apply(&Value::UnsignedInteger(7)), Value::String(String::new()));

        let t2v = v2t.inverted().unwrap();
        assert_eq!(t2v.apply(&Value::from("Rx")), Value::Float(0.0));

        let r2t = Conversion::range_to_text(&[(0.0, 50.0, "low"), (50.0, 100.0, "high")], "n/a");
        assert_eq!(r2t.apply(&Value::Float(75.0)), Value::String("high".into()));
        assert_eq!(r2t.apply(&Value::Float(175.0)), Value::String("n/a".into()));

        let t2t = Conversion::text_to_text(&[("on", "ein")], None);
        assert_eq!(t2t.apply(&Value::from("on")), Value::String("ein".into()));
        assert_eq!(t2t.apply(&Value::from("off")), Value::String("off".into()));

        let dup = Conversion::value_to_text(&[(0.0, "x"), (1.0, "x")], "");
        assert!(dup.inverted().is_err());
    }

    #[test]
    fn nested_scale_in_text_table() {
        let conv = Conversion::new(ConversionKind::ValueToText {
            table: vec![(0.0, TextValue::text("off"))],
            default: TextValue::Scale(Box::new(Conversion::linear(0.0, 10.0))),
        });
        assert_eq!(conv.apply(&Value::UnsignedInteger(0)), Value::String("off".into()));
        assert_eq!(conv.apply(&Value::UnsignedInteger(3)), Value::Float(30.0));
        assert_eq!(conv.depth(), 1);
    }

    #[test]
    fn algebraic_and_exponential() {
        let conv = Conversion::algebraic("X*X - 1").unwrap();
        assert_eq!(conv.apply_f64(3.0, false), 8.0);

        let p = [2.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let exp = Conversion::new(ConversionKind::Exponential { p });
        assert!((exp.apply_f64(2.0, false) - 1.0f64.exp()).abs() < 1e-12);
        let formula = exp.formula().unwrap();
        let as_formula = Conversion::algebraic(&formula).unwrap();
        assert!((as_formula.apply_f64(2.0, false) - 1.0f64.exp()).abs() < 1e-12);
    }
}
