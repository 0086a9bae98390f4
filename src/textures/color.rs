//! Colour profile normalization
//!
//! The encoder reads whatever profile is embedded in its input file, and some
//! profiles make it misbehave. Every image handed to it is therefore
//! converted to sRGB here and re-saved as a PNG tagged with a clean sRGB
//! profile.

use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, ImageReader, RgbaImage};
use moxcms::{ColorProfile, DataColorSpace, Layout, TransformOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

use crate::error::{ConvertError, IoContext, Result};

/// A decoded input image together with its embedded ICC profile, if any.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub path: PathBuf,
    pub image: DynamicImage,
    pub icc_profile: Option<Vec<u8>>,
}

impl SourceImage {
    /// Decode an image file, sniffing the format from its content.
    pub fn open(path: &Path) -> Result<Self> {
        let decode_err = |source| ConvertError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let reader = ImageReader::open(path)
            .io_context(|| format!("Failed to open {}", path.display()))?
            .with_guessed_format()
            .io_context(|| format!("Failed to read {}", path.display()))?;

        let mut decoder = reader.into_decoder().map_err(decode_err)?;
        let icc_profile = decoder.icc_profile().map_err(decode_err)?;
        let image = DynamicImage::from_decoder(decoder).map_err(decode_err)?;

        debug!(
            "Decoded {} ({}x{}, {:?}, icc: {})",
            path.display(),
            image.width(),
            image.height(),
            image.color(),
            icc_profile.is_some()
        );

        Ok(Self {
            path: path.to_path_buf(),
            image,
            icc_profile,
        })
    }
}

/// Converts images into the canonical colour space and writes the canonical
/// files the encoder consumes.
pub trait ColorNormalizer: Send + Sync {
    /// Convert `image` from `profile` into the canonical colour space.
    ///
    /// Without a profile the pixels are returned unchanged.
    fn normalize(&self, image: DynamicImage, profile: Option<&[u8]>) -> Result<DynamicImage>;

    /// Write `image` as a canonical, profile-tagged file inside `dir`.
    ///
    /// The file is deleted when the returned path is dropped or closed.
    fn write_canonical(&self, image: &DynamicImage, dir: &Path, prefix: &str) -> Result<TempPath>;
}

fn cms_error(err: moxcms::CmsError) -> ConvertError {
    ConvertError::ColorProfile(format!("{:?}", err))
}

/// Normalizes to sRGB and writes PNGs carrying an explicit sRGB profile.
#[derive(Debug, Clone)]
pub struct SrgbNormalizer {
    srgb_icc: Vec<u8>,
}

impl SrgbNormalizer {
    pub fn new() -> Result<Self> {
        let srgb_icc = ColorProfile::new_srgb().encode().map_err(cms_error)?;
        Ok(Self { srgb_icc })
    }

    /// The ICC bytes embedded in every canonical file.
    pub fn srgb_icc(&self) -> &[u8] {
        &self.srgb_icc
    }
}

impl ColorNormalizer for SrgbNormalizer {
    fn normalize(&self, image: DynamicImage, profile: Option<&[u8]>) -> Result<DynamicImage> {
        let Some(icc) = profile else {
            return Ok(image);
        };

        let source = ColorProfile::new_from_slice(icc).map_err(cms_error)?;
        if source.color_space != DataColorSpace::Rgb {
            debug!(
                "Leaving {:?} profile untouched, only RGB profiles are converted",
                source.color_space
            );
            return Ok(image);
        }

        let has_alpha = image.color().has_alpha();
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        let transform = source
            .create_transform_8bit(
                Layout::Rgba,
                &ColorProfile::new_srgb(),
                Layout::Rgba,
                TransformOptions::default(),
            )
            .map_err(cms_error)?;

        let mut converted = vec![0u8; rgba.as_raw().len()];
        transform
            .transform(rgba.as_raw(), &mut converted)
            .map_err(cms_error)?;

        let converted = RgbaImage::from_raw(width, height, converted).ok_or_else(|| {
            ConvertError::ColorProfile("transform produced a truncated buffer".to_string())
        })?;

        let converted = DynamicImage::ImageRgba8(converted);
        Ok(if has_alpha {
            converted
        } else {
            DynamicImage::ImageRgb8(converted.to_rgb8())
        })
    }

    fn write_canonical(&self, image: &DynamicImage, dir: &Path, prefix: &str) -> Result<TempPath> {
        let (width, height) = (image.width(), image.height());
        let (pixels, color_type) = if image.color().has_alpha() {
            (image.to_rgba8().into_raw(), ExtendedColorType::Rgba8)
        } else {
            (image.to_rgb8().into_raw(), ExtendedColorType::Rgb8)
        };

        let mut png = Vec::new();
        let mut encoder = PngEncoder::new(&mut png);
        encoder
            .set_icc_profile(self.srgb_icc.clone())
            .map_err(|e| ConvertError::ColorProfile(e.to_string()))?;
        encoder
            .write_image(&pixels, width, height, color_type)
            .map_err(std::io::Error::other)
            .io_context(|| "Failed to encode canonical PNG")?;

        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".png")
            .tempfile_in(dir)
            .io_context(|| format!("Failed to create scratch file in {}", dir.display()))?;
        file.write_all(&png)
            .io_context(|| format!("Failed to write {}", file.path().display()))?;

        Ok(file.into_temp_path())
    }
}
