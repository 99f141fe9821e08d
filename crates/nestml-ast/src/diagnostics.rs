//! Structured diagnostics for the compiler pipeline.
//!
//! Every phase appends [`Diagnostic`] values to a [`Diagnostics`]
//! collector; nothing is printed from inside the pipeline. A diagnostic
//! carries a machine-readable kind (with a stable code), a severity, the
//! primary source span, and optional secondary labels and notes. The
//! [`DiagnosticFormatter`] renders entries with source snippets and caret
//! underlines.

use crate::span::{SourceMap, Span};
use std::fmt;

/// A single compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Category of this diagnostic
    pub kind: DiagnosticKind,
    /// Severity level
    pub severity: Severity,
    /// Primary source location
    pub span: Span,
    /// Human-readable message
    pub message: String,
    /// Neuron this diagnostic is attributed to, if any. Phase gating is
    /// per neuron, so attribution decides whether analysis still runs.
    pub neuron: Option<String>,
    /// Additional labeled spans
    pub labels: Vec<Label>,
    /// Additional notes or hints
    pub notes: Vec<String>,
}

/// Category of diagnostic.
///
/// # Invariant
///
/// The discriminant values must match the `KIND_INFO` array indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DiagnosticKind {
    // Lexing / parsing
    /// Invalid token or malformed syntax
    Syntax = 0,

    // Name resolution
    /// Reference to an undeclared symbol
    UnknownSymbol = 1,
    /// Duplicate declaration in the same scope
    DuplicateSymbol = 2,
    /// Declaration shadows a symbol of an enclosing scope
    ShadowedSymbol = 3,
    /// Redeclaration of a unit symbol or built-in function
    ReservedName = 4,
    /// Reference before declaration in a block that forbids it
    ForwardReference = 5,
    /// Declared but never referenced
    UnusedSymbol = 6,

    // Types and units
    /// Incompatible numeric bases or argument types
    TypeMismatch = 7,
    /// Dimensional mismatch between operands
    UnitMismatch = 8,
    /// Unknown or ill-formed unit expression
    InvalidUnit = 9,
    /// Non-integer exponent on a dimensioned base
    NonIntegerExponent = 10,
    /// Bad call: wrong arity or argument type for a function
    BadCall = 11,

    // Context conditions
    /// Differential quotient over a variable not in state/initial_values
    DerivativeNotDeclared = 12,
    /// convolve() arguments are not (shape, spike port)
    ConvolveArgs = 13,
    /// Block kind declared more than once
    BlockRepeated = 14,
    /// emit_spike()/integrate_odes() called outside update
    CallOutsideUpdate = 15,
    /// Parameter initialized with a non-constant expression
    NonConstantParameter = 16,
    /// Inhibitory and excitatory spike ports disagree on their unit
    PortUnitMismatch = 17,
    /// Cycle among function aliases
    AliasCycle = 18,
    /// Alias in initial_values references state or itself
    AliasRestriction = 19,
    /// Assignment to a parameter, input port, or alias
    IllegalAssignment = 20,

    // ODE analysis
    /// Solver unavailable, timed out, or declined
    SolverFallback = 21,
    /// Malformed solver reply
    SolverProtocol = 22,
    /// Stiffness or other informational analysis result
    AnalysisNote = 23,

    // Generic
    /// Invariant violated inside the compiler
    Internal = 24,
}

/// Per-kind stable code and human-readable name.
///
/// Index matches the `DiagnosticKind` discriminant.
const KIND_INFO: &[(&str, &str)] = &[
    ("NESTML_SYNTAX", "syntax error"),                        // 0
    ("NESTML_UNKNOWN_SYMBOL", "unknown symbol"),              // 1
    ("NESTML_DUPLICATE_SYMBOL", "duplicate symbol"),          // 2
    ("NESTML_SHADOWED_SYMBOL", "shadowed symbol"),            // 3
    ("NESTML_RESERVED_NAME", "reserved name"),                // 4
    ("NESTML_FORWARD_REFERENCE", "forward reference"),        // 5
    ("NESTML_UNUSED_SYMBOL", "unused symbol"),                // 6
    ("NESTML_TYPE_MISMATCH", "type mismatch"),                // 7
    ("NESTML_UNIT_MISMATCH", "unit mismatch"),                // 8
    ("NESTML_INVALID_UNIT", "invalid unit"),                  // 9
    ("NESTML_NON_INTEGER_EXPONENT", "non-integer exponent"),  // 10
    ("NESTML_BAD_CALL", "bad call"),                          // 11
    ("NESTML_DERIVATIVE_NOT_DECLARED", "derivative of undeclared variable"), // 12
    ("NESTML_CONVOLVE_ARGS", "convolve not correctly provided"), // 13
    ("NESTML_BLOCK_REPEATED", "block declared twice"),        // 14
    ("NESTML_CALL_OUTSIDE_UPDATE", "call outside update"),    // 15
    ("NESTML_NON_CONSTANT_PARAMETER", "non-constant parameter"), // 16
    ("NESTML_PORT_UNIT_MISMATCH", "port unit mismatch"),      // 17
    ("NESTML_ALIAS_CYCLE", "cyclic alias definition"),        // 18
    ("NESTML_ALIAS_RESTRICTION", "illegal alias reference"),  // 19
    ("NESTML_ILLEGAL_ASSIGNMENT", "illegal assignment"),      // 20
    ("NESTML_SOLVER_FALLBACK", "solver fallback"),            // 21
    ("NESTML_SOLVER_PROTOCOL", "malformed solver reply"),     // 22
    ("NESTML_ANALYSIS_NOTE", "analysis note"),                // 23
    ("NESTML_INTERNAL", "internal compiler error"),           // 24
];

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational
    Info,
    /// Suspicious but accepted
    Warning,
    /// Rejects the affected neuron
    Error,
    /// Compiler invariant violated; aborts the unit
    Fatal,
}

/// Secondary labeled span in a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    pub fn error(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Error, span, message.into())
    }

    /// Creates a warning diagnostic.
    pub fn warning(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Warning, span, message.into())
    }

    /// Creates an info diagnostic.
    pub fn info(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Info, span, message.into())
    }

    /// Creates a fatal diagnostic.
    pub fn fatal(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Fatal, span, message.into())
    }

    fn with_severity(kind: DiagnosticKind, severity: Severity, span: Span, message: String) -> Self {
        Self {
            kind,
            severity,
            span,
            message,
            neuron: None,
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Attribute this diagnostic to a neuron (for per-neuron phase gating).
    pub fn in_neuron(mut self, name: impl Into<String>) -> Self {
        self.neuron = Some(name.into());
        self
    }

    /// Add a secondary labeled span.
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            message: message.into(),
        });
        self
    }

    /// Add a note or hint.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl DiagnosticKind {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        KIND_INFO[self as usize].0
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        KIND_INFO[self as usize].1
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {}",
            self.severity,
            self.kind.code(),
            self.message
        )
    }
}

impl std::error::Error for Diagnostic {}

/// Append-only collector of diagnostics.
///
/// Each pipeline invocation owns one; the top-level driver merges per-unit
/// collectors at the end, so no locking is needed.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Append many diagnostics.
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.entries.extend(diagnostics);
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Consume the collector, returning its entries.
    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }

    /// Count entries with exactly this severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    /// True if any entry is at ERROR or worse.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity >= Severity::Error)
    }

    /// True if any entry attributed to `neuron` is at ERROR or worse.
    pub fn neuron_has_errors(&self, neuron: &str) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity >= Severity::Error && d.neuron.as_deref() == Some(neuron))
    }

    /// Process exit code: 0 clean, 1 on errors, 2 on fatal.
    pub fn exit_code(&self) -> i32 {
        if self.entries.iter().any(|d| d.severity == Severity::Fatal) {
            2
        } else if self.has_errors() {
            1
        } else {
            0
        }
    }
}

/// Formats diagnostics with source code context.
pub struct DiagnosticFormatter<'a> {
    sources: &'a SourceMap,
}

impl<'a> DiagnosticFormatter<'a> {
    pub fn new(sources: &'a SourceMap) -> Self {
        Self { sources }
    }

    /// Format a diagnostic with source location, snippet, and labels.
    pub fn format(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "{}[{}]: {}\n",
            diagnostic.severity,
            diagnostic.kind.code(),
            diagnostic.message
        ));

        if self.sources.file_count() > diagnostic.span.file_id as usize {
            let file_path = self.sources.file_path(&diagnostic.span);
            let (line, col) = self.sources.line_col(&diagnostic.span);
            out.push_str(&format!("  --> {}:{}:{}\n", file_path.display(), line, col));

            let file = self.sources.file(&diagnostic.span);
            if let Some(source_line) = file.line_text(line) {
                out.push_str("   |\n");
                out.push_str(&format!("{:3} | {}\n", line, source_line));

                let start_col = col as usize;
                let span_len = diagnostic.span.len() as usize;
                let end_col = (start_col + span_len).min(source_line.len() + 1);
                let underline = " ".repeat(start_col.saturating_sub(1))
                    + &"^".repeat(end_col.saturating_sub(start_col).max(1));
                out.push_str(&format!("   | {}\n", underline));
            }
        }

        for label in &diagnostic.labels {
            let (label_line, label_col) = self.sources.line_col(&label.span);
            out.push_str(&format!(
                "   = note: {} (at {}:{}:{})\n",
                label.message,
                self.sources.file_path(&label.span).display(),
                label_line,
                label_col
            ));
        }

        for note in &diagnostic.notes {
            out.push_str(&format!("   = help: {}\n", note));
        }

        out
    }

    /// Format multiple diagnostics, separated by blank lines.
    pub fn format_all(&self, diagnostics: &[Diagnostic]) -> String {
        diagnostics
            .iter()
            .map(|d| self.format(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dummy_span() -> Span {
        Span::new(0, 0, 5)
    }

    fn test_sources() -> SourceMap {
        let mut sources = SourceMap::new();
        sources.add_file(
            PathBuf::from("iaf.nestml"),
            "V_m mV = 0 pA\nV_th mV = 20 mV".to_string(),
        );
        sources
    }

    #[test]
    fn test_diagnostic_creation() {
        let d = Diagnostic::error(
            DiagnosticKind::UnitMismatch,
            dummy_span(),
            "cannot assign real [pA] to real [mV]",
        );
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.kind, DiagnosticKind::UnitMismatch);
        assert!(d.labels.is_empty());
    }

    #[test]
    fn test_chaining() {
        let d = Diagnostic::error(DiagnosticKind::DuplicateSymbol, dummy_span(), "duplicate 'V_m'")
            .in_neuron("iaf")
            .with_label(dummy_span(), "first declared here")
            .with_note("rename one of the variables");
        assert_eq!(d.neuron.as_deref(), Some("iaf"));
        assert_eq!(d.labels.len(), 1);
        assert_eq!(d.notes.len(), 1);
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(DiagnosticKind::Syntax.code(), "NESTML_SYNTAX");
        assert_eq!(DiagnosticKind::ConvolveArgs.name(), "convolve not correctly provided");
        assert_eq!(DiagnosticKind::Internal.code(), "NESTML_INTERNAL");
        assert_eq!(DiagnosticKind::Internal.name(), "internal compiler error");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_collector_counts() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning(
            DiagnosticKind::UnusedSymbol,
            dummy_span(),
            "unused",
        ));
        assert!(!diags.has_errors());
        assert_eq!(diags.exit_code(), 0);

        diags.push(
            Diagnostic::error(DiagnosticKind::UnknownSymbol, dummy_span(), "nope").in_neuron("a"),
        );
        assert!(diags.has_errors());
        assert!(diags.neuron_has_errors("a"));
        assert!(!diags.neuron_has_errors("b"));
        assert_eq!(diags.exit_code(), 1);

        diags.push(Diagnostic::fatal(DiagnosticKind::Internal, dummy_span(), "bug"));
        assert_eq!(diags.exit_code(), 2);
        assert_eq!(diags.count(Severity::Warning), 1);
    }

    #[test]
    fn test_formatter() {
        let sources = test_sources();
        let d = Diagnostic::error(
            DiagnosticKind::UnitMismatch,
            Span::new(0, 11, 13),
            "cannot assign real [pA] to real [mV]",
        );
        let formatted = DiagnosticFormatter::new(&sources).format(&d);
        assert!(formatted.contains("NESTML_UNIT_MISMATCH"));
        assert!(formatted.contains("iaf.nestml:1:12"));
        assert!(formatted.contains("V_m mV = 0 pA"));
        assert!(formatted.contains('^'));
    }

    #[test]
    fn test_formatter_notes() {
        let sources = test_sources();
        let d = Diagnostic::error(DiagnosticKind::TypeMismatch, Span::new(0, 0, 3), "bad")
            .with_note("expected real");
        let formatted = DiagnosticFormatter::new(&sources).format(&d);
        assert!(formatted.contains("help: expected real"));
    }
}
