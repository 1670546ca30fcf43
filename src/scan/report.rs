//! Scan report types for structured dataset checks.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::dataset::LayoutKind;

/// The result of scanning a source dataset.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanReport {
    pub layout: LayoutKind,
    /// Every allow-listed image found, in conversion order.
    pub items: Vec<ScannedItem>,
    /// All issues found during the scan.
    pub issues: Vec<ScanIssue>,
}

impl ScanReport {
    pub fn new(layout: LayoutKind) -> Self {
        Self {
            layout,
            ..Default::default()
        }
    }

    pub fn add(&mut self, issue: ScanIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Returns true if there are no errors.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// Number of items a conversion run would write.
    pub fn convertible_count(&self) -> usize {
        self.items.iter().filter(|i| i.label.is_some()).count()
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Found {} image(s), {} with labels",
            self.items.len(),
            self.convertible_count()
        )?;

        if self.issues.is_empty() {
            return writeln!(f, "Scan passed: no issues found");
        }

        writeln!(
            f,
            "Scan completed with {} error(s) and {} warning(s):",
            self.error_count(),
            self.warning_count()
        )?;
        writeln!(f)?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// One allow-listed image in the source tree.
#[derive(Clone, Debug, Serialize)]
pub struct ScannedItem {
    pub mode: String,
    pub image: PathBuf,
    /// Paired label path when it exists.
    pub label: Option<PathBuf>,
    /// Dimensions read from the image header, when readable.
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Stable codes for scan issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum IssueCode {
    MissingLabel,
    UnreadableImage,
    UnreadableLabel,
    EmptyLabel,
    EmptyMode,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScanIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub path: PathBuf,
}

impl ScanIssue {
    pub fn error(code: IssueCode, message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ScanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "[{}] {:?}: {} ({})",
            severity,
            self.code,
            self.message,
            self.path.display()
        )
    }
}
