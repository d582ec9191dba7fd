use crate::source_map::Range;

pub const W_REF_UNRESOLVED: &str = "W_REF_UNRESOLVED";
pub const W_FOOTNOTE_UNRESOLVED: &str = "W_FOOTNOTE_UNRESOLVED";
pub const W_TABLE_RAGGED: &str = "W_TABLE_RAGGED";
pub const W_URL_BLOCKED: &str = "W_URL_BLOCKED";
pub const W_DUPLICATE_DEFINITION: &str = "W_DUPLICATE_DEFINITION";

/// A recoverable oddity found while parsing or compiling. Parsing is total:
/// diagnostics are reported alongside the result, never instead of it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: DiagnosticSeverity,
    pub code: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        range: Range,
        severity: DiagnosticSeverity,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            range,
            severity,
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}
