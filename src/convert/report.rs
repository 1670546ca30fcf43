//! Conversion report types.
//!
//! Records what a conversion run wrote so it can be printed for humans or
//! emitted as JSON for scripts.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::dataset::LayoutKind;

/// Summary of one conversion run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionReport {
    /// Source dataset root.
    pub source: PathBuf,
    /// Output root.
    pub output: PathBuf,
    /// Flat or split source layout.
    pub layout: LayoutKind,
    /// Re-encode target name, if re-encoding was requested.
    pub reencode: Option<String>,
    /// Per-mode item counts, in processing order.
    pub modes: Vec<ModeCounts>,
    /// Every item written, in numbering order.
    pub items: Vec<ConvertedItem>,
    /// Total container bytes written.
    pub bytes_written: u64,
    /// Result of the post-run sanity decode.
    pub verification: VerificationOutcome,
}

impl ConversionReport {
    pub fn new(source: &Path, output: &Path, layout: LayoutKind) -> Self {
        Self {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            layout,
            ..Default::default()
        }
    }

    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// Converted items belonging to `mode`.
    pub fn items_in_mode(&self, mode: &str) -> &[ConvertedItem] {
        let mut start = 0;
        for counts in &self.modes {
            if counts.mode == mode {
                return &self.items[start..start + counts.items];
            }
            start += counts.items;
        }
        &[]
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Converted {} image(s) from {} to {}",
            self.total_items(),
            self.source.display(),
            self.output.display()
        )?;

        if let Some(format) = &self.reencode {
            writeln!(f, "  re-encoded as: {}", format)?;
        }
        writeln!(f, "  container bytes: {}", self.bytes_written)?;

        if self.layout == LayoutKind::Split {
            writeln!(f)?;
            writeln!(f, "Modes ({}):", self.modes.len())?;
            for counts in &self.modes {
                writeln!(f, "  - {}: {} item(s)", counts.mode, counts.items)?;
            }
        }

        writeln!(f)?;
        write!(f, "Verification: {}", self.verification)
    }
}

/// Item count for one mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModeCounts {
    pub mode: String,
    pub items: usize,
}

/// One written `dat{N}` pair.
#[derive(Clone, Debug, Serialize)]
pub struct ConvertedItem {
    pub index: u64,
    pub source: PathBuf,
    pub container: PathBuf,
    pub label: PathBuf,
    pub payload_bytes: u64,
    pub reencoded: bool,
}

/// Outcome of decoding the first written container after the run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Nothing was converted, so nothing was checked.
    #[default]
    Skipped,
    Passed {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    /// Logged, never fatal.
    Failed { path: PathBuf, message: String },
}

impl VerificationOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, VerificationOutcome::Failed { .. })
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::Skipped => writeln!(f, "skipped (no items)"),
            VerificationOutcome::Passed {
                path,
                width,
                height,
            } => writeln!(f, "decoded {} ({}x{})", path.display(), width, height),
            VerificationOutcome::Failed { path, message } => {
                writeln!(f, "FAILED for {}: {}", path.display(), message)
            }
        }
    }
}
