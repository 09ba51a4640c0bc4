//! Shared diagnostics, source spans, and parser options for the iacgraph
//! parsing core.
//!
//! Every parser in the workspace reports its outcome through
//! [`ParseResult`], a value-plus-diagnostics envelope: a parse may succeed
//! with warnings, fail recoverably with a partial value, or fail fatally
//! with no value at all.

#![forbid(unsafe_code)]

use serde::Serialize;

mod input;
mod options;
mod span;

pub use input::InputKind;
pub use options::{Deadline, ParseOptions};
pub use span::SourceSpan;

/// The severity of a [`Diagnostic`].
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The parse result is still considered successful.
    Warning,
    /// The parse result is marked unsuccessful, but a partial value may
    /// still be present.
    Error,
    /// The parse was aborted; no meaningful partial value exists.
    Fatal,
}

/// The closed set of diagnostic codes emitted by the parsers.
///
/// These names are part of the emitted record shape and must stay
/// bit-stable.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    InvalidYaml,
    InvalidWorkflow,
    InvalidJob,
    InvalidStep,
    InvalidTrigger,
    UnknownDependency,
    CircularDependency,
    MissingReleaseName,
    MissingReleaseChart,
    InvalidExpression,
    LexerError,
    ParseError,
    FileTooLarge,
    ParseTimeout,
}

impl DiagnosticCode {
    /// The stable string form of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::InvalidYaml => "INVALID_YAML",
            DiagnosticCode::InvalidWorkflow => "INVALID_WORKFLOW",
            DiagnosticCode::InvalidJob => "INVALID_JOB",
            DiagnosticCode::InvalidStep => "INVALID_STEP",
            DiagnosticCode::InvalidTrigger => "INVALID_TRIGGER",
            DiagnosticCode::UnknownDependency => "UNKNOWN_DEPENDENCY",
            DiagnosticCode::CircularDependency => "CIRCULAR_DEPENDENCY",
            DiagnosticCode::MissingReleaseName => "MISSING_RELEASE_NAME",
            DiagnosticCode::MissingReleaseChart => "MISSING_RELEASE_CHART",
            DiagnosticCode::InvalidExpression => "INVALID_EXPRESSION",
            DiagnosticCode::LexerError => "LEXER_ERROR",
            DiagnosticCode::ParseError => "PARSE_ERROR",
            DiagnosticCode::FileTooLarge => "FILE_TOO_LARGE",
            DiagnosticCode::ParseTimeout => "PARSE_TIMEOUT",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parser diagnostic.
#[derive(Serialize, Clone, Debug, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub location: Option<SourceSpan>,
    pub severity: Severity,
    pub recoverable: bool,
}

impl Diagnostic {
    /// A warning diagnostic; never affects parse success.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
            severity: Severity::Warning,
            recoverable: true,
        }
    }

    /// A recoverable error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
            severity: Severity::Error,
            recoverable: true,
        }
    }

    /// A fatal diagnostic; the parse aborts with no partial value.
    pub fn fatal(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
            severity: Severity::Fatal,
            recoverable: false,
        }
    }

    /// Attaches a source span to this diagnostic.
    pub fn at(mut self, span: SourceSpan) -> Self {
        self.location = Some(span);
        self
    }
}

/// The envelope every parser returns: an optional value plus accumulated
/// errors and warnings.
///
/// `success` is false exactly when at least one error- or fatal-severity
/// diagnostic was recorded.
#[derive(Serialize, Clone, Debug)]
pub struct ParseResult<T> {
    pub success: bool,
    pub value: Option<T>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl<T> ParseResult<T> {
    /// A successful result with no diagnostics.
    pub fn ok(value: T) -> Self {
        Self {
            success: true,
            value: Some(value),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A fatal result: no value, one aborting diagnostic.
    pub fn fatal(diagnostic: Diagnostic) -> Self {
        Self {
            success: false,
            value: None,
            errors: vec![diagnostic],
            warnings: Vec::new(),
        }
    }

    /// Builds a result from a value and a mixed bag of diagnostics,
    /// routing them to `errors`/`warnings` by severity.
    pub fn with_diagnostics(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        let mut result = Self::ok(value);
        for diagnostic in diagnostics {
            result.push(diagnostic);
        }
        result
    }

    /// Records a diagnostic, downgrading `success` for errors.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => self.warnings.push(diagnostic),
            Severity::Error | Severity::Fatal => {
                self.success = false;
                self.errors.push(diagnostic);
            }
        }
    }

    /// Maps the inner value, preserving diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseResult<U> {
        ParseResult {
            success: self.success,
            value: self.value.map(f),
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}
