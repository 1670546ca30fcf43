//! Dataset conversion into a renumbered `.mep` output tree.
//!
//! Every allow-listed image in the source tree is paired with its `.txt`
//! label, optionally re-encoded, obfuscated with the active key and
//! written as `dat{N}.mep` next to a `dat{N}.txt` copy of the label. `N`
//! is one counter for the whole run, shared across modes.

pub mod report;

pub use report::{ConversionReport, ConvertedItem, ModeCounts, VerificationOutcome};

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::DynamicImage;
use log::{debug, info, warn};

use crate::bridge::{self, ColorFlags, Preview};
use crate::container::{ContainerCodec, CONTAINER_EXTENSION};
use crate::dataset::{self, has_extension, ModeSource, LABEL_EXTENSION};
use crate::error::{MepError, Result};

/// Quality used when re-encoding to JPEG.
pub const JPEG_QUALITY: u8 = 95;

/// Picture formats a payload can be re-encoded into before obfuscation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum PictureFormat {
    /// WebP; the encoder bundled with `image` is lossless.
    #[value(name = "webp")]
    WebP,
    /// JPEG at a fixed quality of 95.
    Jpeg,
}

impl PictureFormat {
    pub fn name(&self) -> &'static str {
        match self {
            PictureFormat::WebP => "webp",
            PictureFormat::Jpeg => "jpeg",
        }
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self {
            PictureFormat::WebP => &["webp"],
            PictureFormat::Jpeg => &["jpg", "jpeg"],
        }
    }

    /// True if `path` is already stored in this format.
    pub fn matches(&self, path: &Path) -> bool {
        has_extension(path, self.extensions())
    }

    /// Encodes `image` into an in-memory buffer.
    pub fn encode(&self, image: &DynamicImage) -> image::ImageResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            PictureFormat::WebP => {
                let normalized = if image.color().has_alpha() {
                    DynamicImage::ImageRgba8(image.to_rgba8())
                } else {
                    DynamicImage::ImageRgb8(image.to_rgb8())
                };
                normalized.write_with_encoder(WebPEncoder::new_lossless(&mut buf))?;
            }
            PictureFormat::Jpeg => {
                DynamicImage::ImageRgb8(image.to_rgb8())
                    .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
            }
        }
        Ok(buf)
    }
}

/// Resolved settings for one conversion run.
#[derive(Clone, Debug)]
pub struct ConvertOptions {
    /// Source dataset root.
    pub dataset: PathBuf,
    /// Output root; created if missing.
    pub output: PathBuf,
    /// Re-encode images to WebP before obfuscation.
    pub use_webp: bool,
    /// Skip the interactive preview after verification.
    pub no_preview: bool,
    /// Explicit re-encode target; takes precedence over `use_webp`.
    pub reencode: Option<PictureFormat>,
}

impl ConvertOptions {
    pub fn new(dataset: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
            output: output.into(),
            use_webp: false,
            no_preview: true,
            reencode: None,
        }
    }

    /// The effective re-encode target, if any.
    pub fn target_format(&self) -> Option<PictureFormat> {
        self.reencode
            .or(self.use_webp.then_some(PictureFormat::WebP))
    }
}

/// Converts the dataset described by `opts`.
///
/// The codec must have a key available. The run stops at the first image
/// that cannot be decoded or has no label; files already written stay in
/// place.
pub fn convert_dataset(
    codec: &ContainerCodec<'_>,
    opts: &ConvertOptions,
    preview: &mut dyn Preview,
) -> Result<ConversionReport> {
    // Fail before touching the filesystem when no key can be found.
    codec.keys().active_key()?;

    info!("- Loading dataset...");
    let mut layout = dataset::discover_layout(&opts.dataset)?;
    layout.exclude_dir(&opts.output);

    info!("- Create directory: {}", opts.output.display());
    fs::create_dir_all(&opts.output)?;

    let target = opts.target_format();

    let mut report = ConversionReport::new(&opts.dataset, &opts.output, layout.kind);
    report.reencode = target.map(|f| f.name().to_string());

    let mut next_index: u64 = 1;
    for mode in &layout.modes {
        let converted = convert_mode(
            codec,
            mode,
            &opts.output,
            target,
            &mut next_index,
            &mut report,
        )?;
        report.modes.push(ModeCounts {
            mode: mode.display_name().to_string(),
            items: converted,
        });
    }

    info!("- Converted {} images.", report.total_items());

    if let Some(first) = report.items.first() {
        let container = first.container.clone();
        report.verification = verify(codec, &container, opts.no_preview, preview);
        info!("- Check done.");
    }

    Ok(report)
}

fn convert_mode(
    codec: &ContainerCodec<'_>,
    mode: &ModeSource,
    output_root: &Path,
    target: Option<PictureFormat>,
    next_index: &mut u64,
    report: &mut ConversionReport,
) -> Result<usize> {
    let (images_out, labels_out) = mode.output_dirs(output_root);
    fs::create_dir_all(&images_out)?;
    fs::create_dir_all(&labels_out)?;

    let images = dataset::collect_images(&mode.dir)?;
    debug!(
        "mode '{}': {} candidate image(s) in {}",
        mode.display_name(),
        images.len(),
        mode.dir.display()
    );

    for image_path in &images {
        let index = *next_index;
        let item = convert_item(codec, image_path, index, target, &images_out, &labels_out)?;
        info!(
            "-- Convert {} => {}",
            image_path.display(),
            item.container.display()
        );
        report.bytes_written += item.payload_bytes;
        report.items.push(item);
        *next_index += 1;
    }

    Ok(images.len())
}

fn convert_item(
    codec: &ContainerCodec<'_>,
    image_path: &Path,
    index: u64,
    target: Option<PictureFormat>,
    images_out: &Path,
    labels_out: &Path,
) -> Result<ConvertedItem> {
    let image = bridge::open_image(image_path)?;

    let payload = match target {
        Some(format) if !format.matches(image_path) => {
            format
                .encode(&image)
                .map_err(|source| MepError::ImageEncode {
                    path: image_path.to_path_buf(),
                    source,
                })?
        }
        _ => fs::read(image_path)?,
    };
    drop(image);

    // No output is written for an item until its label has been read.
    let label_source = dataset::label_path_for(image_path);
    if !label_source.is_file() {
        return Err(MepError::MissingLabel {
            image: image_path.to_path_buf(),
            expected: label_source,
        });
    }
    let label = fs::read_to_string(&label_source)?;

    let stem = format!("dat{index}");
    let container = images_out.join(format!("{stem}.{CONTAINER_EXTENSION}"));
    let label_out = labels_out.join(format!("{stem}.{LABEL_EXTENSION}"));

    let encoded = codec.encode(&payload)?;
    write_new(&container, &encoded)?;
    write_new(&label_out, label.trim().as_bytes())?;

    Ok(ConvertedItem {
        index,
        source: image_path.to_path_buf(),
        container,
        label: label_out,
        payload_bytes: encoded.len() as u64,
        reencoded: target.is_some_and(|f| !f.matches(image_path)),
    })
}

fn write_new(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => MepError::OutputExists {
                path: path.to_path_buf(),
            },
            _ => MepError::Io(err),
        })?;
    file.write_all(bytes)?;
    Ok(())
}

fn verify(
    codec: &ContainerCodec<'_>,
    container: &Path,
    no_preview: bool,
    preview: &mut dyn Preview,
) -> VerificationOutcome {
    let checked = bridge::read_matrix(codec, container, ColorFlags::Color).and_then(|matrix| {
        if !no_preview {
            preview.show(&container.display().to_string(), &matrix)?;
        }
        Ok(matrix)
    });

    match checked {
        Ok(matrix) => VerificationOutcome::Passed {
            path: container.to_path_buf(),
            width: matrix.width,
            height: matrix.height,
        },
        Err(err) => {
            let message = err.to_string();
            warn!(
                "Error in checking: {}",
                MepError::VerificationFailed {
                    path: container.to_path_buf(),
                    message: message.clone(),
                }
            );
            VerificationOutcome::Failed {
                path: container.to_path_buf(),
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::PixelMatrix;
    use crate::cipher::{KeyManager, MemorySecretStore};
    use image::{Rgb, RgbImage};

    #[derive(Default)]
    struct RecordingPreview {
        shown: Vec<(u32, u32)>,
    }

    impl Preview for RecordingPreview {
        fn show(&mut self, _title: &str, matrix: &PixelMatrix) -> Result<()> {
            self.shown.push((matrix.width, matrix.height));
            Ok(())
        }
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, Rgb([200, 100, 50]))
            .save(path)
            .expect("save png");
    }

    fn keys() -> KeyManager {
        let keys = KeyManager::new(MemorySecretStore::new());
        keys.set_key("unit-test-key").expect("set key");
        keys
    }

    #[test]
    fn target_format_prefers_explicit_reencode() {
        let mut opts = ConvertOptions::new("in", "out");
        assert_eq!(opts.target_format(), None);
        opts.use_webp = true;
        assert_eq!(opts.target_format(), Some(PictureFormat::WebP));
        opts.reencode = Some(PictureFormat::Jpeg);
        assert_eq!(opts.target_format(), Some(PictureFormat::Jpeg));
    }

    #[test]
    fn picture_format_matches_extensions() {
        assert!(PictureFormat::WebP.matches(Path::new("a.WEBP")));
        assert!(PictureFormat::Jpeg.matches(Path::new("a.jpg")));
        assert!(PictureFormat::Jpeg.matches(Path::new("a.jpeg")));
        assert!(!PictureFormat::Jpeg.matches(Path::new("a.png")));
    }

    #[test]
    fn flat_conversion_shows_preview_unless_suppressed() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        fs::create_dir_all(&src).expect("create src");
        write_png(&src.join("cat.png"), 5, 4);
        fs::write(src.join("cat.txt"), "  a cat \n").expect("write label");

        let keys = keys();
        let codec = ContainerCodec::new(&keys);
        let mut preview = RecordingPreview::default();

        let mut opts = ConvertOptions::new(&src, temp.path().join("out"));
        opts.no_preview = false;
        let report = convert_dataset(&codec, &opts, &mut preview).expect("convert");

        assert_eq!(report.total_items(), 1);
        assert_eq!(preview.shown, vec![(5, 4)]);
        assert!(matches!(
            report.verification,
            VerificationOutcome::Passed {
                width: 5,
                height: 4,
                ..
            }
        ));
        assert_eq!(
            fs::read_to_string(temp.path().join("out/dat1.txt")).expect("read label"),
            "a cat"
        );
    }

    struct FailingPreview;

    impl Preview for FailingPreview {
        fn show(&mut self, title: &str, _matrix: &PixelMatrix) -> Result<()> {
            Err(MepError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("cannot show {title}"),
            )))
        }
    }

    #[test]
    fn failed_verification_is_reported_not_fatal() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        let out = temp.path().join("out");
        fs::create_dir_all(&src).expect("create src");
        for stem in ["a", "b"] {
            write_png(&src.join(format!("{stem}.png")), 3, 3);
            fs::write(src.join(format!("{stem}.txt")), stem).expect("write label");
        }

        let keys = keys();
        let codec = ContainerCodec::new(&keys);
        let mut opts = ConvertOptions::new(&src, &out);
        opts.no_preview = false;
        let report = convert_dataset(&codec, &opts, &mut FailingPreview).expect("convert");

        assert!(report.verification.is_failed());
        match &report.verification {
            VerificationOutcome::Failed { path, message } => {
                assert_eq!(path, &out.join("dat1.mep"));
                assert!(message.contains("cannot show"));
            }
            other => panic!("expected failed verification, got {other:?}"),
        }
        assert_eq!(report.total_items(), 2);
        for n in 1..=2 {
            assert!(out.join(format!("dat{n}.mep")).is_file());
            assert!(out.join(format!("dat{n}.txt")).is_file());
        }
    }

    #[test]
    fn corrupted_first_container_fails_verification_only() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        let out = temp.path().join("out");
        fs::create_dir_all(&src).expect("create src");
        write_png(&src.join("a.png"), 2, 2);
        fs::write(src.join("a.txt"), "label").expect("write label");

        // A different key leaves the container undecodable at check time.
        let writer_keys = keys();
        let reader_keys = KeyManager::new(MemorySecretStore::new());
        reader_keys.set_key("some-other-key").expect("set key");

        let report = convert_dataset(
            &ContainerCodec::new(&writer_keys),
            &ConvertOptions::new(&src, &out),
            &mut RecordingPreview::default(),
        )
        .expect("convert");
        assert!(!report.verification.is_failed());

        let reader = ContainerCodec::new(&reader_keys);
        let outcome = verify(&reader, &out.join("dat1.mep"), true, &mut FailingPreview);
        assert!(outcome.is_failed());
        assert!(out.join("dat1.mep").is_file());
        assert!(out.join("dat1.txt").is_file());
    }

    #[test]
    fn mislabeled_extension_still_converts() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        fs::create_dir_all(&src).expect("create src");
        write_png(&src.join("x.png"), 4, 2);
        fs::rename(src.join("x.png"), src.join("x.jpg")).expect("rename");
        fs::write(src.join("x.txt"), "label").expect("write label");

        let keys = keys();
        let codec = ContainerCodec::new(&keys);
        let mut preview = RecordingPreview::default();
        let mut opts = ConvertOptions::new(&src, temp.path().join("out"));
        opts.no_preview = false;
        let report = convert_dataset(&codec, &opts, &mut preview).expect("convert");

        assert_eq!(report.total_items(), 1);
        assert_eq!(preview.shown, vec![(4, 2)]);
        assert!(!report.verification.is_failed());
    }

    #[test]
    fn output_inside_split_root_is_not_a_mode() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("train")).expect("create train");
        write_png(&src.join("train/a.png"), 2, 2);
        fs::write(src.join("train/a.txt"), "label").expect("write label");

        let keys = keys();
        let codec = ContainerCodec::new(&keys);
        let out = src.join("out");
        let opts = ConvertOptions::new(&src, &out);

        let report =
            convert_dataset(&codec, &opts, &mut RecordingPreview::default()).expect("convert");
        let modes: Vec<_> = report.modes.iter().map(|m| m.mode.as_str()).collect();
        assert_eq!(modes, vec!["train"]);
        assert!(!out.join("images/out").exists());
        assert!(!out.join("labels/out").exists());
    }

    #[test]
    fn missing_label_stops_before_writing_container() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        fs::create_dir_all(&src).expect("create src");
        write_png(&src.join("a.png"), 2, 2);
        fs::write(src.join("a.txt"), "first").expect("write label");
        write_png(&src.join("b.png"), 2, 2);

        let keys = keys();
        let codec = ContainerCodec::new(&keys);
        let out = temp.path().join("out");
        let err = convert_dataset(
            &codec,
            &ConvertOptions::new(&src, &out),
            &mut RecordingPreview::default(),
        )
        .unwrap_err();

        assert!(matches!(err, MepError::MissingLabel { .. }));
        assert!(out.join("dat1.mep").is_file());
        assert!(out.join("dat1.txt").is_file());
        assert!(!out.join("dat2.mep").exists());
        assert!(!out.join("dat2.txt").exists());
    }

    #[test]
    fn corrupt_image_fails_fast() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        fs::create_dir_all(&src).expect("create src");
        fs::write(src.join("broken.png"), b"definitely not a png").expect("write junk");
        fs::write(src.join("broken.txt"), "label").expect("write label");

        let keys = keys();
        let codec = ContainerCodec::new(&keys);
        let err = convert_dataset(
            &codec,
            &ConvertOptions::new(&src, temp.path().join("out")),
            &mut RecordingPreview::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MepError::ImageDecode { .. }));
    }

    #[test]
    fn existing_output_is_not_overwritten() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        let out = temp.path().join("out");
        fs::create_dir_all(&src).expect("create src");
        fs::create_dir_all(&out).expect("create out");
        write_png(&src.join("a.png"), 2, 2);
        fs::write(src.join("a.txt"), "label").expect("write label");
        fs::write(out.join("dat1.mep"), b"old").expect("write stale output");

        let keys = keys();
        let codec = ContainerCodec::new(&keys);
        let err = convert_dataset(
            &codec,
            &ConvertOptions::new(&src, &out),
            &mut RecordingPreview::default(),
        )
        .unwrap_err();

        assert!(matches!(err, MepError::OutputExists { .. }));
        assert_eq!(fs::read(out.join("dat1.mep")).expect("read"), b"old");
    }

    #[test]
    fn conversion_without_key_fails_before_creating_output() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let keys = KeyManager::new(MemorySecretStore::new());
        let codec = ContainerCodec::new(&keys);
        let out = temp.path().join("out");

        let err = convert_dataset(
            &codec,
            &ConvertOptions::new(temp.path(), &out),
            &mut RecordingPreview::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MepError::NoKey { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn jpeg_reencode_produces_decodable_jpeg_payload() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        fs::create_dir_all(&src).expect("create src");
        write_png(&src.join("a.png"), 6, 3);
        fs::write(src.join("a.txt"), "label").expect("write label");

        let keys = keys();
        let codec = ContainerCodec::new(&keys);
        let mut opts = ConvertOptions::new(&src, temp.path().join("out"));
        opts.reencode = Some(PictureFormat::Jpeg);
        let report =
            convert_dataset(&codec, &opts, &mut RecordingPreview::default()).expect("convert");

        assert!(report.items[0].reencoded);
        let plain = codec
            .decode(&temp.path().join("out/dat1.mep"))
            .expect("decode")
            .into_inner();
        assert_eq!(
            image::guess_format(&plain).expect("guess format"),
            image::ImageFormat::Jpeg
        );
    }
}
