//! Diagnostics: positions, ranges, and the error/warning taxonomy.
//!
//! Rather than a process-wide error collector singleton (as in the original
//! implementation this compiler is descended from), every phase is handed an
//! explicit `&mut DiagnosticSink` so a fresh one can be constructed per
//! compilation (or per test case) with no hidden global state.

use std::cell::Cell;
use std::fmt;

/// A position in a source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Position {
    pub file: String,
    pub line: usize,
    pub col: usize,
    /// Full text of the line containing this position, for error rendering.
    pub full_line: String,
}

impl Position {
    pub fn new(file: impl Into<String>, line: usize, col: usize, full_line: impl Into<String>) -> Self {
        Position { file: file.into(), line, col, full_line: full_line.into() }
    }
}

/// A continuous range between two positions, inclusive on both ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn point(pos: Position) -> Self {
        Range { end: pos.clone(), start: pos }
    }

    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }

    /// Concatenate two ranges into the span that covers both.
    pub fn join(&self, other: &Range) -> Range {
        Range { start: self.start.clone(), end: other.end.clone() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// The closed taxonomy of diagnostic kinds, per the compiler's error design.
///
/// Each variant's message is constructed by its raising site; this enum
/// exists so phase boundaries can ask "did any *kind* of fatal issue occur"
/// without inspecting message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosticKind {
    #[error("lex error")]
    Lex,
    #[error("parse error")]
    Parse,
    #[error("type error")]
    Type,
    #[error("unsupported")]
    Unsupported,
    #[error("link error")]
    Link,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub range: Option<Range>,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>, range: Option<Range>) -> Self {
        Diagnostic { kind, message: message.into(), range, severity: Severity::Error }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>, range: Option<Range>) -> Self {
        Diagnostic { kind, message: message.into(), range, severity: Severity::Warning }
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const ERROR_COLOR: &str = "\x1B[31m";
        const WARN_COLOR: &str = "\x1B[33m";
        const RESET: &str = "\x1B[0m";
        const BOLD: &str = "\x1B[1m";

        let (color, kind_str) = if self.is_warning() {
            (WARN_COLOR, "warning")
        } else {
            (ERROR_COLOR, "error")
        };

        if let Some(range) = &self.range {
            let indicator_pad = " ".repeat(range.start.col.saturating_sub(1));
            let indicator_marks = if range.start.line == range.end.line && range.start.file == range.end.file {
                if range.end.col == range.start.col {
                    "^".to_string()
                } else {
                    "-".repeat(range.end.col - range.start.col + 1)
                }
            } else {
                "-".repeat(range.start.full_line.len().saturating_sub(range.start.col) + 1)
            };

            write!(
                f,
                "{BOLD}{}:{}:{}: {color}{kind_str}:{RESET} {}\n  {}\n  {WARN_COLOR}{indicator_pad}{indicator_marks}{RESET}",
                range.start.file, range.start.line, range.start.col, self.message, range.start.full_line,
            )
        } else {
            write!(f, "{BOLD}cflatc: {color}{kind_str}:{RESET} {}", self.message)
        }
    }
}

impl PartialOrd for Diagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Diagnostic {
    /// Diagnostics without a range sort before all diagnostics with a range;
    /// among ranged diagnostics in the same file, sort by (line, col).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (&self.range, &other.range) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => {
                if a.start.file != b.start.file {
                    Ordering::Equal
                } else {
                    (a.start.line, a.start.col).cmp(&(b.start.line, b.start.col))
                }
            }
        }
    }
}

impl PartialEq for Diagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for Diagnostic {}

/// Accumulates all errors and warnings seen during compilation of one
/// translation unit. Passed explicitly through every phase rather than kept
/// as global state, so tests can construct a fresh sink per case.
#[derive(Default)]
pub struct DiagnosticSink {
    issues: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink { issues: Vec::new() }
    }

    pub fn add(&mut self, issue: Diagnostic) {
        self.issues.push(issue);
        self.issues.sort();
    }

    /// True iff no (non-warning) errors have been recorded.
    pub fn ok(&self) -> bool {
        !self.issues.iter().any(|i| !i.is_warning())
    }

    pub fn has_errors(&self) -> bool {
        !self.ok()
    }

    pub fn issues(&self) -> &[Diagnostic] {
        &self.issues
    }

    pub fn show(&self) {
        for issue in &self.issues {
            eprintln!("{issue}");
        }
    }
}

/// Monotonically increasing label counter, scoped to one compilation rather
/// than process-wide.
#[derive(Default)]
pub struct LabelCounter(Cell<u32>);

impl LabelCounter {
    pub fn new() -> Self {
        LabelCounter(Cell::new(0))
    }

    pub fn next(&self, prefix: &str) -> String {
        let n = self.0.get();
        self.0.set(n + 1);
        format!("__cflatc_{prefix}{n}")
    }
}

/// Used to uniquify file-scope static object names within one translation
/// unit (e.g. `static int x;` declared inside two different functions).
#[derive(Default)]
pub struct AnonStaticCounter(Cell<u32>);

impl AnonStaticCounter {
    pub fn new() -> Self {
        AnonStaticCounter(Cell::new(0))
    }

    pub fn next(&self) -> u32 {
        let n = self.0.get();
        self.0.set(n + 1);
        n
    }
}

/// Explicit context threaded through every compiler phase, replacing the
/// three process-wide singletons (error collector, label counter,
/// anonymous-static counter) of the original design with plain fields.
#[derive(Default)]
pub struct CompilerContext {
    pub diagnostics: DiagnosticSink,
    pub labels: LabelCounter,
    pub anon_statics: AnonStaticCounter,
}

impl CompilerContext {
    pub fn new() -> Self {
        CompilerContext {
            diagnostics: DiagnosticSink::new(),
            labels: LabelCounter::new(),
            anon_statics: AnonStaticCounter::new(),
        }
    }
}
