//! Dry-run checks of a source dataset.
//!
//! Uses the same discovery rules as conversion, but collects every problem
//! instead of stopping at the first one, and only reads image headers.

mod report;

pub use report::{IssueCode, ScanIssue, ScanReport, ScannedItem, Severity};

use std::fs;
use std::path::Path;

use crate::dataset::{self, ModeSource};
use crate::error::Result;

/// Scans the dataset rooted at `root`.
///
/// Only traversal failures are returned as errors; dataset problems are
/// reported as issues.
pub fn scan_dataset(root: &Path) -> Result<ScanReport> {
    let layout = dataset::discover_layout(root)?;
    let mut report = ScanReport::new(layout.kind);

    for mode in &layout.modes {
        scan_mode(mode, &mut report)?;
    }

    Ok(report)
}

fn scan_mode(mode: &ModeSource, report: &mut ScanReport) -> Result<()> {
    let images = dataset::collect_images(&mode.dir)?;
    if images.is_empty() {
        report.add(ScanIssue::warning(
            IssueCode::EmptyMode,
            format!("mode '{}' contains no images", mode.display_name()),
            &mode.dir,
        ));
    }

    for image in images {
        let (width, height) = match imagesize::size(&image) {
            Ok(size) => (
                u32::try_from(size.width).ok(),
                u32::try_from(size.height).ok(),
            ),
            Err(err) => {
                report.add(ScanIssue::error(
                    IssueCode::UnreadableImage,
                    format!("cannot read image header: {err}"),
                    &image,
                ));
                (None, None)
            }
        };

        let label_path = dataset::label_path_for(&image);
        let label = if label_path.is_file() {
            check_label(&label_path, report);
            Some(label_path)
        } else {
            report.add(ScanIssue::error(
                IssueCode::MissingLabel,
                format!("no label file {}", label_path.display()),
                &image,
            ));
            None
        };

        report.items.push(ScannedItem {
            mode: mode.display_name().to_string(),
            image,
            label,
            width,
            height,
        });
    }

    Ok(())
}

fn check_label(path: &Path, report: &mut ScanReport) {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => report.add(ScanIssue::warning(
            IssueCode::EmptyLabel,
            "label file is empty",
            path,
        )),
        Ok(_) => {}
        Err(err) => report.add(ScanIssue::error(
            IssueCode::UnreadableLabel,
            format!("cannot read label: {err}"),
            path,
        )),
    }
}
