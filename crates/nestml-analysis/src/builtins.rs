//! Built-in function signatures.
//!
//! The built-ins form a closed set; user-defined functions are monomorphic
//! and resolved through the symbol table instead. Several built-ins have
//! dependent result units (`random_normal` returns the common dimension of
//! its arguments, `sqrt` halves exponents), so the actual unit computation
//! lives with the type checker; this module only enumerates names and
//! arities.

/// A built-in function of the modeling language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Exp,
    Ln,
    Log10,
    Sin,
    Cos,
    Tan,
    Sqrt,
    Abs,
    Min,
    Max,
    /// `steps(t)` — number of simulation ticks in a time interval
    Steps,
    /// `resolution()` — simulation tick length in ms
    Resolution,
    RandomNormal,
    RandomUniform,
    /// `emit_spike()` — only callable inside `update`
    EmitSpike,
    /// `integrate_odes()` — only callable inside `update`
    IntegrateOdes,
    /// `delta(t)` — Dirac pulse, usable as a shape body
    Delta,
    /// `convolve(shape, spike_port)`
    Convolve,
}

impl Builtin {
    /// Look a built-in up by source name.
    pub fn lookup(name: &str) -> Option<Builtin> {
        Some(match name {
            "exp" => Builtin::Exp,
            "ln" => Builtin::Ln,
            "log10" => Builtin::Log10,
            "sin" => Builtin::Sin,
            "cos" => Builtin::Cos,
            "tan" => Builtin::Tan,
            "sqrt" => Builtin::Sqrt,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "steps" => Builtin::Steps,
            "resolution" => Builtin::Resolution,
            "random_normal" => Builtin::RandomNormal,
            "random_uniform" => Builtin::RandomUniform,
            "emit_spike" => Builtin::EmitSpike,
            "integrate_odes" => Builtin::IntegrateOdes,
            "delta" => Builtin::Delta,
            "convolve" => Builtin::Convolve,
            _ => return None,
        })
    }

    /// Expected argument count.
    pub fn arity(&self) -> usize {
        match self {
            Builtin::Resolution | Builtin::EmitSpike | Builtin::IntegrateOdes => 0,
            Builtin::Exp
            | Builtin::Ln
            | Builtin::Log10
            | Builtin::Sin
            | Builtin::Cos
            | Builtin::Tan
            | Builtin::Sqrt
            | Builtin::Abs
            | Builtin::Steps
            | Builtin::Delta => 1,
            Builtin::Min
            | Builtin::Max
            | Builtin::RandomNormal
            | Builtin::RandomUniform
            | Builtin::Convolve => 2,
        }
    }

    /// Source name.
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Exp => "exp",
            Builtin::Ln => "ln",
            Builtin::Log10 => "log10",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Sqrt => "sqrt",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Steps => "steps",
            Builtin::Resolution => "resolution",
            Builtin::RandomNormal => "random_normal",
            Builtin::RandomUniform => "random_uniform",
            Builtin::EmitSpike => "emit_spike",
            Builtin::IntegrateOdes => "integrate_odes",
            Builtin::Delta => "delta",
            Builtin::Convolve => "convolve",
        }
    }
}

/// True if `name` names a built-in function.
pub fn is_builtin(name: &str) -> bool {
    Builtin::lookup(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_arity() {
        assert_eq!(Builtin::lookup("exp"), Some(Builtin::Exp));
        assert_eq!(Builtin::lookup("convolve"), Some(Builtin::Convolve));
        assert_eq!(Builtin::lookup("frobnicate"), None);
        assert_eq!(Builtin::Resolution.arity(), 0);
        assert_eq!(Builtin::Steps.arity(), 1);
        assert_eq!(Builtin::RandomNormal.arity(), 2);
    }

    #[test]
    fn test_names_round_trip() {
        for builtin in [Builtin::Exp, Builtin::Steps, Builtin::Convolve, Builtin::Delta] {
            assert_eq!(Builtin::lookup(builtin.name()), Some(builtin));
        }
    }
}
