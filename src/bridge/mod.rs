//! Transparent image reads for raw files and `.mep` containers.
//!
//! Pixel decoding is delegated to the `image` crate. Container paths are
//! decoded in memory first, so callers never see the obfuscated bytes.

pub mod preview;

pub use preview::{Preview, TerminalPreview};

use std::path::Path;

use image::{DynamicImage, ImageReader};
use log::debug;

use crate::container::{is_container_path, ContainerCodec};
use crate::error::{MepError, Result};

/// Channel layout requested from [`read_matrix`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorFlags {
    /// Three channels, BGR order. Alpha is dropped.
    #[default]
    Color,
    /// One luminance channel.
    Grayscale,
    /// Keep alpha when present (BGRA); grayscale stays single-channel.
    Unchanged,
}

/// Row-major interleaved pixel buffer in BGR(A) or gray layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelMatrix {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl PixelMatrix {
    /// Decodes a raw image file straight into matrix form.
    pub fn decode_file(path: &Path, flags: ColorFlags) -> Result<Self> {
        let image = open_image(path)?;
        Ok(Self::from_image(&image, flags))
    }

    /// Converts a decoded image, reordering RGB(A) channels to BGR(A).
    pub fn from_image(image: &DynamicImage, flags: ColorFlags) -> Self {
        let (width, height) = (image.width(), image.height());
        let color = image.color();

        match flags {
            ColorFlags::Grayscale => Self::gray(image),
            ColorFlags::Unchanged if !color.has_color() && !color.has_alpha() => Self::gray(image),
            ColorFlags::Unchanged if color.has_alpha() => {
                let mut data = image.to_rgba8().into_raw();
                swap_red_blue(&mut data, 4);
                Self {
                    width,
                    height,
                    channels: 4,
                    data,
                }
            }
            ColorFlags::Color | ColorFlags::Unchanged => {
                let mut data = image.to_rgb8().into_raw();
                swap_red_blue(&mut data, 3);
                Self {
                    width,
                    height,
                    channels: 3,
                    data,
                }
            }
        }
    }

    fn gray(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: 1,
            data: image.to_luma8().into_raw(),
        }
    }

    /// The channel values of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let channels = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * channels;
        &self.data[start..start + channels]
    }
}

fn swap_red_blue(data: &mut [u8], channels: usize) {
    for px in data.chunks_exact_mut(channels) {
        px.swap(0, 2);
    }
}

/// Decodes a raw image file, picking the decoder from its leading bytes.
///
/// The extension is only a fallback, so a PNG saved as `.jpg` still opens.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|source| MepError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })
}

/// Opens `path` as an image, decoding it first when it is a container.
pub fn read_image(codec: &ContainerCodec<'_>, path: &Path) -> Result<DynamicImage> {
    if !codec.should_decode(path) {
        if is_container_path(path) {
            return Err(MepError::KeyMissingButContainerPath {
                path: path.to_path_buf(),
            });
        }
        return open_image(path);
    }

    debug!("reading container image {}", path.display());
    let stream = codec.decode(path)?;
    ImageReader::new(stream)
        .with_guessed_format()?
        .decode()
        .map_err(|source| MepError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })
}

/// Like [`read_image`], but returns a BGR-ordered [`PixelMatrix`].
pub fn read_matrix(
    codec: &ContainerCodec<'_>,
    path: &Path,
    flags: ColorFlags,
) -> Result<PixelMatrix> {
    if !codec.should_decode(path) {
        if is_container_path(path) {
            return Err(MepError::KeyMissingButContainerPath {
                path: path.to_path_buf(),
            });
        }
        return PixelMatrix::decode_file(path, flags);
    }

    let image = read_image(codec, path)?;
    Ok(PixelMatrix::from_image(&image, flags))
}
