//! Colour / mask plane decomposition for masked textures.

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Mask values at or below this count as fully transparent.
pub const MASK_THRESHOLD: u8 = 1;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Physical layout of a masked texture's payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskLayout {
    /// One `(W, 2H)` canvas encoded in a single pass, colour on top.
    #[default]
    Merged,
    /// Colour and mask encoded separately and concatenated.
    Split,
}

/// The two planes of a masked texture, both at source size.
#[derive(Debug, Clone, PartialEq)]
pub struct Planes {
    /// Source RGB with alpha forced opaque
    pub color: RgbaImage,
    /// Source alpha replicated into RGB, opaque
    pub mask: RgbaImage,
}

/// Splits an RGBA image into colour and mask planes and composes the
/// stacked canvas the encoder consumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelDecomposer {
    remask: bool,
}

impl ChannelDecomposer {
    /// With `remask` set, colour is only kept where the mask is visible and
    /// everything else becomes white.
    pub fn new(remask: bool) -> Self {
        Self { remask }
    }

    pub fn remask(&self) -> bool {
        self.remask
    }

    /// Extract colour and mask planes.
    ///
    /// When remasking, colour pixels outside the stencil are whitened so the
    /// split layout carries the same colour data as the merged canvas.
    pub fn split(&self, image: &RgbaImage) -> Planes {
        let color = RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
            if self.remask && !visible(a) {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([r, g, b, 255])
            }
        });
        let mask = RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let a = image.get_pixel(x, y)[3];
            Rgba([a, a, a, 255])
        });

        Planes { color, mask }
    }

    /// Build the `(W, 2H)` canvas: colour in the top half, mask in the bottom.
    ///
    /// The canvas starts white. The mask is always pasted whole; colour is
    /// pasted whole or, when remasking, only through the stencil.
    pub fn compose_canvas(&self, image: &RgbaImage) -> RgbImage {
        let (width, height) = image.dimensions();

        RgbImage::from_fn(width, height * 2, |x, y| {
            if y < height {
                let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
                if self.remask && !visible(a) {
                    WHITE
                } else {
                    Rgb([r, g, b])
                }
            } else {
                let a = image.get_pixel(x, y - height)[3];
                Rgb([a, a, a])
            }
        })
    }
}

fn visible(alpha: u8) -> bool {
    alpha > MASK_THRESHOLD
}
