//! Physical units: SI dimension vectors, scales, and the unit symbol table.
//!
//! A [`Unit`] pairs a [`Dimensions`] vector (rational exponents over the
//! seven SI base dimensions) with a scale factor relative to the SI
//! coherent unit. `mV` is the volt dimension vector at scale `1e-3`;
//! `nS/ms` divides dimensions and scales componentwise.
//!
//! Unit names are resolved through a fixed table of base and derived
//! symbols plus SI metric prefixes, so `pF`, `mmol` and `MOhm` need no
//! dedicated entries.

use crate::model::UnitExpr;
use crate::rational::Rational;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SI base dimensional exponents.
///
/// Each field is the (rational) power of the corresponding SI base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Length (L) - meter
    pub length: Rational,
    /// Mass (M) - kilogram
    pub mass: Rational,
    /// Time (T) - second
    pub time: Rational,
    /// Electric current (I) - ampere
    pub current: Rational,
    /// Temperature (Θ) - kelvin
    pub temperature: Rational,
    /// Amount of substance (N) - mole
    pub amount: Rational,
    /// Luminous intensity (J) - candela
    pub luminosity: Rational,
}

/// A physical unit: dimension vector plus scale factor.
///
/// The scale is the multiplicative factor relative to the SI coherent unit
/// of the same dimension (`mV` → 1e-3, `ms` → 1e-3, `nS` → 1e-9). Two
/// units with equal dimensions but different scales are dimensionally
/// compatible; the type checker records the scale ratio so conversions can
/// be inserted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Dimensional exponents
    pub dims: Dimensions,
    /// Scale factor relative to the SI coherent unit (1.0 = coherent)
    pub scale: f64,
}

impl Dimensions {
    /// Dimensionless constant (all exponents zero).
    pub const NONE: Dimensions = Dimensions {
        length: Rational::ZERO,
        mass: Rational::ZERO,
        time: Rational::ZERO,
        current: Rational::ZERO,
        temperature: Rational::ZERO,
        amount: Rational::ZERO,
        luminosity: Rational::ZERO,
    };

    const fn base(which: usize) -> Dimensions {
        let mut dims = Dimensions::NONE;
        match which {
            0 => dims.length = Rational::ONE,
            1 => dims.mass = Rational::ONE,
            2 => dims.time = Rational::ONE,
            3 => dims.current = Rational::ONE,
            4 => dims.temperature = Rational::ONE,
            5 => dims.amount = Rational::ONE,
            _ => dims.luminosity = Rational::ONE,
        }
        dims
    }

    /// Meter dimension (length = 1)
    pub const LENGTH: Dimensions = Dimensions::base(0);
    /// Kilogram dimension (mass = 1)
    pub const MASS: Dimensions = Dimensions::base(1);
    /// Second dimension (time = 1)
    pub const TIME: Dimensions = Dimensions::base(2);
    /// Ampere dimension (current = 1)
    pub const CURRENT: Dimensions = Dimensions::base(3);
    /// Kelvin dimension (temperature = 1)
    pub const TEMPERATURE: Dimensions = Dimensions::base(4);
    /// Mole dimension (amount = 1)
    pub const AMOUNT: Dimensions = Dimensions::base(5);
    /// Candela dimension (luminosity = 1)
    pub const LUMINOSITY: Dimensions = Dimensions::base(6);

    /// Check if all exponents are zero.
    pub fn is_none(&self) -> bool {
        *self == Dimensions::NONE
    }

    fn zip(self, other: Dimensions, op: impl Fn(Rational, Rational) -> Rational) -> Dimensions {
        Dimensions {
            length: op(self.length, other.length),
            mass: op(self.mass, other.mass),
            time: op(self.time, other.time),
            current: op(self.current, other.current),
            temperature: op(self.temperature, other.temperature),
            amount: op(self.amount, other.amount),
            luminosity: op(self.luminosity, other.luminosity),
        }
    }

    /// Multiply dimensions (add exponents).
    pub fn multiply(self, other: Dimensions) -> Dimensions {
        self.zip(other, |a, b| a + b)
    }

    /// Divide dimensions (subtract exponents).
    pub fn divide(self, other: Dimensions) -> Dimensions {
        self.zip(other, |a, b| a - b)
    }

    /// Raise dimensions to a rational power (scale exponents).
    pub fn pow(self, exponent: Rational) -> Dimensions {
        self.zip(Dimensions::NONE, |a, _| a * exponent)
    }
}

impl Unit {
    /// Dimensionless unit at scale 1.
    pub const NONE: Unit = Unit {
        dims: Dimensions::NONE,
        scale: 1.0,
    };

    /// Create a unit from dimensions and scale.
    pub const fn new(dims: Dimensions, scale: f64) -> Self {
        Self { dims, scale }
    }

    /// Create a coherent unit (scale 1) from dimensions.
    pub const fn coherent(dims: Dimensions) -> Self {
        Self::new(dims, 1.0)
    }

    /// Check if this unit is dimensionless.
    pub fn is_none(&self) -> bool {
        self.dims.is_none()
    }

    /// Multiply two units (dimensions add, scales multiply).
    pub fn multiply(&self, other: &Unit) -> Unit {
        Unit::new(self.dims.multiply(other.dims), self.scale * other.scale)
    }

    /// Divide two units (dimensions subtract, scales divide).
    pub fn divide(&self, other: &Unit) -> Unit {
        Unit::new(self.dims.divide(other.dims), self.scale / other.scale)
    }

    /// Raise a unit to an integer power.
    pub fn powi(&self, exponent: i32) -> Unit {
        self.pow(Rational::integer(exponent.clamp(i16::MIN as i32, i16::MAX as i32) as i16))
    }

    /// Raise a unit to a rational power.
    ///
    /// Rational exponents keep roots of dimensioned quantities exact:
    /// `(m^2)^(1/2) = m`.
    pub fn pow(&self, exponent: Rational) -> Unit {
        Unit::new(self.dims.pow(exponent), self.scale.powf(exponent.to_f64()))
    }

    /// Check dimensional compatibility (scales may differ).
    pub fn same_dims(&self, other: &Unit) -> bool {
        self.dims == other.dims
    }

    /// Conversion factor that maps a value in `self` onto `other`.
    ///
    /// Only meaningful when `same_dims` holds.
    pub fn factor_to(&self, other: &Unit) -> f64 {
        self.scale / other.scale
    }
}

/// SI metric prefixes with their powers of ten.
///
/// ASCII `u` is accepted as a fallback for `μ` (micro).
const SI_PREFIXES: &[(&str, i32)] = &[
    ("da", 1),  // deca
    ("Y", 24),  // yotta
    ("Z", 21),  // zetta
    ("E", 18),  // exa
    ("P", 15),  // peta
    ("T", 12),  // tera
    ("G", 9),   // giga
    ("M", 6),   // mega
    ("k", 3),   // kilo
    ("h", 2),   // hecto
    ("d", -1),  // deci
    ("c", -2),  // centi
    ("m", -3),  // milli
    ("u", -6),  // micro (ASCII fallback)
    ("n", -9),  // nano
    ("p", -12), // pico
    ("f", -15), // femto
    ("a", -18), // atto
    ("z", -21), // zepto
    ("y", -24), // yocto
];

/// Unit symbols that must not be decomposed with prefix parsing.
///
/// Exact matches are always tried first, so this list only matters for
/// symbols whose tail would itself resolve to a unit after stripping a
/// prefix letter.
const RESERVED_UNITS: &[&str] = &[
    "m", "kg", "s", "A", "K", "mol", "cd", // SI base
    "L", "Hz", "N", "Pa", "J", "W", "C", "V", "S", "F", "Ohm", "Bq",
];

/// Resolve a bare unit symbol without prefix handling.
fn try_exact_unit(name: &str) -> Option<Unit> {
    let u = |dims, scale| Some(Unit::new(dims, scale));
    let d = Dimensions::NONE;
    match name {
        // SI base units
        "m" => u(Dimensions::LENGTH, 1.0),
        "kg" => u(Dimensions::MASS, 1.0),
        "s" => u(Dimensions::TIME, 1.0),
        "A" => u(Dimensions::CURRENT, 1.0),
        "K" => u(Dimensions::TEMPERATURE, 1.0),
        "mol" => u(Dimensions::AMOUNT, 1.0),
        "cd" => u(Dimensions::LUMINOSITY, 1.0),

        // Litre
        "L" => u(Dimensions::LENGTH.pow(Rational::integer(3)), 1e-3),

        // SI derived units
        "Hz" | "Bq" => u(Dimensions::NONE.divide(Dimensions::TIME), 1.0),
        "N" => u(
            Dimensions::MASS
                .multiply(Dimensions::LENGTH)
                .divide(Dimensions::TIME.pow(Rational::integer(2))),
            1.0,
        ),
        "Pa" => u(
            Dimensions::MASS
                .divide(Dimensions::LENGTH)
                .divide(Dimensions::TIME.pow(Rational::integer(2))),
            1.0,
        ),
        "J" => u(
            Dimensions::MASS
                .multiply(Dimensions::LENGTH.pow(Rational::integer(2)))
                .divide(Dimensions::TIME.pow(Rational::integer(2))),
            1.0,
        ),
        "W" => u(
            Dimensions::MASS
                .multiply(Dimensions::LENGTH.pow(Rational::integer(2)))
                .divide(Dimensions::TIME.pow(Rational::integer(3))),
            1.0,
        ),
        "C" => u(Dimensions::TIME.multiply(Dimensions::CURRENT), 1.0),
        "V" => u(
            Dimensions::MASS
                .multiply(Dimensions::LENGTH.pow(Rational::integer(2)))
                .divide(Dimensions::TIME.pow(Rational::integer(3)))
                .divide(Dimensions::CURRENT),
            1.0,
        ),
        "S" => u(
            d.divide(Dimensions::MASS)
                .divide(Dimensions::LENGTH.pow(Rational::integer(2)))
                .multiply(Dimensions::TIME.pow(Rational::integer(3)))
                .multiply(Dimensions::CURRENT.pow(Rational::integer(2))),
            1.0,
        ),
        "F" => u(
            d.divide(Dimensions::MASS)
                .divide(Dimensions::LENGTH.pow(Rational::integer(2)))
                .multiply(Dimensions::TIME.pow(Rational::integer(4)))
                .multiply(Dimensions::CURRENT.pow(Rational::integer(2))),
            1.0,
        ),
        "Ohm" => u(
            Dimensions::MASS
                .multiply(Dimensions::LENGTH.pow(Rational::integer(2)))
                .divide(Dimensions::TIME.pow(Rational::integer(3)))
                .divide(Dimensions::CURRENT.pow(Rational::integer(2))),
            1.0,
        ),

        _ => None,
    }
}

/// Try to split an SI prefix off a unit name.
///
/// Two-character prefixes (`da`) are tried before one-character ones.
fn try_parse_prefix(name: &str) -> Option<(f64, &str)> {
    for &(prefix, exp) in SI_PREFIXES {
        if name.len() > prefix.len() && name.starts_with(prefix) {
            return Some((10.0_f64.powi(exp), &name[prefix.len()..]));
        }
    }
    None
}

/// Resolve a unit symbol, with SI prefix support.
///
/// Resolution strategy:
/// 1. Exact match (`m`, `mol`, `Pa`, ...)
/// 2. SI prefix + exact match of the remainder (`mV`, `nS`, `pA`, `mmol`)
pub fn resolve_unit_name(name: &str) -> Option<Unit> {
    if let Some(unit) = try_exact_unit(name) {
        return Some(unit);
    }

    if !RESERVED_UNITS.contains(&name) {
        if let Some((prefix_scale, base_name)) = try_parse_prefix(name) {
            if let Some(base) = try_exact_unit(base_name) {
                return Some(Unit::new(base.dims, base.scale * prefix_scale));
            }
        }
    }

    None
}

/// Evaluate a parsed unit expression into a [`Unit`].
///
/// Errors carry a message only; the caller owns the source span.
pub fn resolve_unit_expr(expr: &UnitExpr) -> Result<Unit, String> {
    match expr {
        UnitExpr::One => Ok(Unit::NONE),
        UnitExpr::Base(name) => resolve_unit_name(name)
            .ok_or_else(|| format!("unknown unit symbol '{}'", name)),
        UnitExpr::Multiply(lhs, rhs) => {
            Ok(resolve_unit_expr(lhs)?.multiply(&resolve_unit_expr(rhs)?))
        }
        UnitExpr::Divide(lhs, rhs) => Ok(resolve_unit_expr(lhs)?.divide(&resolve_unit_expr(rhs)?)),
        UnitExpr::Power(base, exponent) => Ok(resolve_unit_expr(base)?.powi(*exponent)),
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() && (self.scale - 1.0).abs() < 1e-12 {
            return write!(f, "1");
        }

        let mut out = String::new();
        if (self.scale - 1.0).abs() > 1e-12 {
            let log = self.scale.log10();
            if (log - log.round()).abs() < 1e-9 {
                out.push_str(&format!("10^{}", log.round() as i64));
            } else {
                out.push_str(&format!("{}", self.scale));
            }
        }

        let dims = format!("{}", self.dims);
        if !self.dims.is_none() {
            if !out.is_empty() {
                out.push('·');
            }
            out.push_str(&dims);
        }

        write!(f, "{}", out)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "1");
        }

        let mut parts = Vec::new();
        for (symbol, exp) in [
            ("m", self.length),
            ("kg", self.mass),
            ("s", self.time),
            ("A", self.current),
            ("K", self.temperature),
            ("mol", self.amount),
            ("cd", self.luminosity),
        ] {
            if !exp.is_zero() {
                if exp == Rational::ONE {
                    parts.push(symbol.to_string());
                } else {
                    parts.push(format!("{}^{}", symbol, exp));
                }
            }
        }

        write!(f, "{}", parts.join("·"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_units() {
        let mv = resolve_unit_name("mV").unwrap();
        assert_eq!(mv.dims, resolve_unit_name("V").unwrap().dims);
        assert!((mv.scale - 1e-3).abs() < 1e-15);

        let ns = resolve_unit_name("nS").unwrap();
        assert!((ns.scale - 1e-9).abs() < 1e-21);

        let pf = resolve_unit_name("pF").unwrap();
        assert!((pf.scale - 1e-12).abs() < 1e-24);

        assert!(resolve_unit_name("xyz").is_none());
    }

    #[test]
    fn test_reserved_symbols_resolve_exactly() {
        // 'm' is the meter, never milli-something
        assert_eq!(resolve_unit_name("m").unwrap().dims, Dimensions::LENGTH);
        // 'mol' is the mole
        assert_eq!(resolve_unit_name("mol").unwrap().dims, Dimensions::AMOUNT);
        // but 'mmol' picks up the milli prefix
        let mmol = resolve_unit_name("mmol").unwrap();
        assert_eq!(mmol.dims, Dimensions::AMOUNT);
        assert!((mmol.scale - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn test_derived_units() {
        // S = A^2·s^3/(kg·m^2); V = kg·m^2/(s^3·A); S·V = A
        let s = resolve_unit_name("S").unwrap();
        let v = resolve_unit_name("V").unwrap();
        assert_eq!(s.multiply(&v).dims, Dimensions::CURRENT);

        // Hz = 1/s
        let hz = resolve_unit_name("Hz").unwrap();
        assert_eq!(hz.dims, Dimensions::NONE.divide(Dimensions::TIME));
    }

    #[test]
    fn test_conductance_times_voltage_is_current() {
        // nS · mV = 1e-12 A = pA (the classic synaptic current identity)
        let ns = resolve_unit_name("nS").unwrap();
        let mv = resolve_unit_name("mV").unwrap();
        let pa = resolve_unit_name("pA").unwrap();
        let product = ns.multiply(&mv);
        assert_eq!(product.dims, pa.dims);
        assert!((product.scale - pa.scale).abs() < 1e-24);
    }

    #[test]
    fn test_mul_div_inverse_law() {
        // (a*b)/b == a for dimensions and scale
        let a = resolve_unit_name("nS").unwrap();
        let b = resolve_unit_name("ms").unwrap();
        let back = a.multiply(&b).divide(&b);
        assert_eq!(back.dims, a.dims);
        assert!((back.scale - a.scale).abs() / a.scale < 1e-12);
    }

    #[test]
    fn test_pow_composition_law() {
        // (a^n)^m == a^(n*m)
        let a = resolve_unit_name("ms").unwrap();
        let lhs = a.powi(2).powi(3);
        let rhs = a.powi(6);
        assert_eq!(lhs.dims, rhs.dims);
        assert!((lhs.scale - rhs.scale).abs() / rhs.scale < 1e-9);
    }

    #[test]
    fn test_rational_roots() {
        let m2 = resolve_unit_name("m").unwrap().powi(2);
        let root = m2.pow(Rational::new(1, 2));
        assert_eq!(root.dims, Dimensions::LENGTH);

        let half = resolve_unit_name("m").unwrap().pow(Rational::new(1, 2));
        assert_eq!(half.dims.length, Rational::new(1, 2));
    }

    #[test]
    fn test_resolve_unit_expr() {
        // 1/ms
        let expr = UnitExpr::Divide(
            Box::new(UnitExpr::One),
            Box::new(UnitExpr::Base("ms".to_string())),
        );
        let unit = resolve_unit_expr(&expr).unwrap();
        assert_eq!(unit.dims, Dimensions::NONE.divide(Dimensions::TIME));
        assert!((unit.scale - 1e3).abs() < 1e-9);

        // nS/ms
        let expr = UnitExpr::Divide(
            Box::new(UnitExpr::Base("nS".to_string())),
            Box::new(UnitExpr::Base("ms".to_string())),
        );
        assert!(resolve_unit_expr(&expr).is_ok());

        // mV**2
        let expr = UnitExpr::Power(Box::new(UnitExpr::Base("mV".to_string())), 2);
        let unit = resolve_unit_expr(&expr).unwrap();
        assert!((unit.scale - 1e-6).abs() < 1e-18);

        let bad = UnitExpr::Base("frobnitz".to_string());
        assert!(resolve_unit_expr(&bad).is_err());
    }

    #[test]
    fn test_factor_to() {
        let mv = resolve_unit_name("mV").unwrap();
        let v = resolve_unit_name("V").unwrap();
        assert!((mv.factor_to(&v) - 1e-3).abs() < 1e-15);
        assert!((v.factor_to(&mv) - 1e3).abs() < 1e-9);
    }

    #[test]
    fn test_display() {
        assert_eq!(Unit::NONE.to_string(), "1");
        let mv = resolve_unit_name("mV").unwrap();
        let shown = mv.to_string();
        assert!(shown.contains("10^-3"));
        assert!(shown.contains("kg"));
    }
}
