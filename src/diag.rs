//! Diagnostics bus.
//!
//! Diagnostics are collected bottom-up during a phase. Errors abort the
//! phase once it completes; warnings are reported but do not. Every
//! diagnostic may carry the attribute path it concerns so the host can
//! annotate its own source positions.

use std::fmt;

use serde::Serialize;

use crate::value::Path;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Aborts the phase.
    Error,
    /// Reported only.
    Warning,
}

/// A single path-addressed diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Attribute path, when the diagnostic concerns one attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,
    /// One-line summary.
    pub summary: String,
    /// Longer explanation.
    pub detail: String,
}

/// Append-only collection of diagnostics owned by one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Appends a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Appends an error at `path`.
    pub fn error(&mut self, path: Path, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Error,
            path: Some(path),
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    /// Appends an error that is not tied to an attribute.
    pub fn error_general(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Error,
            path: None,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    /// Appends a warning, optionally tied to an attribute.
    pub fn warning(&mut self, path: Option<Path>, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            path,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    /// Moves every diagnostic of `other` into `self`.
    pub fn extend(&mut self, other: Self) {
        self.items.extend(other.items);
    }

    /// Returns true if any error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    /// Number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Iterates over the errors.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }

    /// Iterates over the warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Iterates over every diagnostic in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if an error was recorded at exactly `path`.
    #[must_use]
    pub fn has_error_at(&self, path: &Path) -> bool {
        self.errors().any(|d| d.path.as_ref() == Some(path))
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.path {
            Some(path) if !path.is_root() => write!(f, "{level}: {path}: {}", self.summary)?,
            _ => write!(f, "{level}: {}", self.summary)?,
        }
        if !self.detail.is_empty() {
            write!(f, " ({})", self.detail)?;
        }
        Ok(())
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_all_errors() {
        let mut diags = Diagnostics::new();
        diags.error(Path::root().attr("a"), "first", "");
        diags.warning(None, "heads up", "");
        diags.error(Path::root().attr("b"), "second", "detail");

        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 2);
        assert_eq!(diags.warnings().count(), 1);
        assert!(diags.has_error_at(&Path::root().attr("b")));
    }

    #[test]
    fn test_warnings_do_not_count_as_errors() {
        let mut diags = Diagnostics::new();
        diags.warning(Some(Path::root().attr("x")), "Requested resource not found", "");
        assert!(!diags.has_errors());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_display() {
        let mut diags = Diagnostics::new();
        diags.error(Path::root().attr("client_secret"), "Missing required argument", "why");
        assert_eq!(
            diags.to_string(),
            "error: client_secret: Missing required argument (why)"
        );
    }
}
