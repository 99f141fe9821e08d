//! The unit-aware type attached to expressions and symbols.

use crate::unit::Unit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric base of a [`PhysicalType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeBase {
    /// Floating point quantity, possibly dimensioned
    Real,
    /// Integer quantity; promotes to `Real` on contact with reals or units
    Integer,
    /// Boolean
    Boolean,
    /// String
    String,
    /// No value (procedure results)
    Void,
    /// Sentinel assigned to subexpressions that already produced a type
    /// error; suppresses cascading diagnostics
    Error,
}

/// A physical type: numeric base plus unit vector.
///
/// The unit is only meaningful for `Real` and `Integer`; the other bases
/// carry [`Unit::NONE`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalType {
    pub base: TypeBase,
    pub unit: Unit,
}

impl PhysicalType {
    /// Dimensionless real.
    pub const REAL: PhysicalType = PhysicalType {
        base: TypeBase::Real,
        unit: Unit::NONE,
    };

    /// Dimensionless integer.
    pub const INTEGER: PhysicalType = PhysicalType {
        base: TypeBase::Integer,
        unit: Unit::NONE,
    };

    /// Boolean.
    pub const BOOLEAN: PhysicalType = PhysicalType {
        base: TypeBase::Boolean,
        unit: Unit::NONE,
    };

    /// String.
    pub const STRING: PhysicalType = PhysicalType {
        base: TypeBase::String,
        unit: Unit::NONE,
    };

    /// Void.
    pub const VOID: PhysicalType = PhysicalType {
        base: TypeBase::Void,
        unit: Unit::NONE,
    };

    /// Error sentinel.
    pub const ERROR: PhysicalType = PhysicalType {
        base: TypeBase::Error,
        unit: Unit::NONE,
    };

    /// A real quantity with the given unit.
    pub const fn real(unit: Unit) -> Self {
        Self {
            base: TypeBase::Real,
            unit,
        }
    }

    /// True for the error sentinel.
    pub fn is_error(&self) -> bool {
        self.base == TypeBase::Error
    }

    /// True for `Real` and `Integer`.
    pub fn is_numeric(&self) -> bool {
        matches!(self.base, TypeBase::Real | TypeBase::Integer)
    }

    /// True for numeric types without dimensions.
    pub fn is_dimensionless_numeric(&self) -> bool {
        self.is_numeric() && self.unit.dims.is_none()
    }

    /// Numeric base promotion: integer stays integer only when combined
    /// with another dimensionless integer.
    pub fn promoted_base(&self, other: &PhysicalType) -> TypeBase {
        if self.base == TypeBase::Integer
            && other.base == TypeBase::Integer
            && self.unit.dims.is_none()
            && other.unit.dims.is_none()
        {
            TypeBase::Integer
        } else {
            TypeBase::Real
        }
    }
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base {
            TypeBase::Boolean => write!(f, "boolean"),
            TypeBase::String => write!(f, "string"),
            TypeBase::Void => write!(f, "void"),
            TypeBase::Error => write!(f, "<error>"),
            TypeBase::Integer => {
                if self.unit.is_none() {
                    write!(f, "integer")
                } else {
                    write!(f, "integer [{}]", self.unit)
                }
            }
            TypeBase::Real => {
                if self.unit.is_none() && (self.unit.scale - 1.0).abs() < 1e-12 {
                    write!(f, "real")
                } else {
                    write!(f, "real [{}]", self.unit)
                }
            }
        }
    }
}
