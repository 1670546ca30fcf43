//! Source dataset discovery.
//!
//! A source tree is either flat (images and their `.txt` labels directly in
//! the root) or split into modes (one subdirectory per split such as
//! `train/` and `val/`, each holding images and labels). The flat case is
//! handled as a single unnamed mode.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{MepError, Result};

/// Allow-listed image extensions, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"];
pub const LABEL_EXTENSION: &str = "txt";

/// How the source tree is organized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Flat,
    Split,
}

/// One source directory to convert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeSource {
    /// Split name, `None` for a flat dataset.
    pub name: Option<String>,
    pub dir: PathBuf,
}

impl ModeSource {
    /// Output directories for images and labels of this mode.
    pub fn output_dirs(&self, output_root: &Path) -> (PathBuf, PathBuf) {
        match &self.name {
            Some(name) => (
                output_root.join("images").join(name),
                output_root.join("labels").join(name),
            ),
            None => (output_root.to_path_buf(), output_root.to_path_buf()),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }
}

#[derive(Clone, Debug)]
pub struct SourceLayout {
    pub kind: LayoutKind,
    pub modes: Vec<ModeSource>,
}

impl SourceLayout {
    /// Drops any split-layout mode whose directory is `dir`.
    ///
    /// Used to keep an output tree nested inside the dataset root from
    /// being read back as a mode. Paths are compared after
    /// canonicalization; a `dir` that does not exist matches nothing.
    pub fn exclude_dir(&mut self, dir: &Path) {
        if self.kind != LayoutKind::Split {
            return;
        }
        let Ok(excluded) = dir.canonicalize() else {
            return;
        };
        self.modes.retain(|mode| {
            mode.dir.canonicalize().map_or(true, |candidate| candidate != excluded)
        });
    }
}

/// Decides between the flat and split layouts for `root`.
///
/// Any allow-listed image directly in `root` makes it flat. Otherwise each
/// immediate subdirectory is a mode, in file-name order.
pub fn discover_layout(root: &Path) -> Result<SourceLayout> {
    if !root.is_dir() {
        return Err(MepError::DatasetLayout {
            path: root.to_path_buf(),
            message: "dataset path must be a directory".to_string(),
        });
    }

    let mut subdirs = Vec::new();
    let mut has_images = false;

    for entry in immediate_children(root) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            subdirs.push(entry.into_path());
        } else if is_image_path(entry.path()) {
            has_images = true;
        }
    }

    if has_images || subdirs.is_empty() {
        return Ok(SourceLayout {
            kind: LayoutKind::Flat,
            modes: vec![ModeSource {
                name: None,
                dir: root.to_path_buf(),
            }],
        });
    }

    let modes = subdirs
        .into_iter()
        .map(|dir| {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            ModeSource {
                name: Some(name),
                dir,
            }
        })
        .collect();

    Ok(SourceLayout {
        kind: LayoutKind::Split,
        modes,
    })
}

/// Allow-listed image files directly inside `dir`, in file-name order.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in immediate_children(dir) {
        let entry = entry?;
        if entry.file_type().is_file() && is_image_path(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// The label file paired with `image`: same directory, same stem, `.txt`.
pub fn label_path_for(image: &Path) -> PathBuf {
    image.with_extension(LABEL_EXTENSION)
}

pub fn is_image_path(path: &Path) -> bool {
    has_extension(path, &IMAGE_EXTENSIONS)
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

fn immediate_children(dir: &Path) -> impl Iterator<Item = Result<walkdir::DirEntry>> + '_ {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .map(move |entry| {
            entry.map_err(|source| MepError::DatasetLayout {
                path: dir.to_path_buf(),
                message: format!("failed while traversing directory: {source}"),
            })
        })
}
