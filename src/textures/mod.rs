//! Texture preparation and block compression
//!
//! Turns a decoded image into CMPR payload bytes: colour-profile
//! normalization, masked-texture plane decomposition, and the encoder seam
//! with its `wimgt` subprocess adapter.

mod color;
mod decompose;
mod encoder;
mod tool_container;

pub use color::{ColorNormalizer, SourceImage, SrgbNormalizer};
pub use decompose::{ChannelDecomposer, MaskLayout, Planes, MASK_THRESHOLD};
pub use encoder::{BlockEncoder, WimgtEncoder, DEFAULT_TIMEOUT};
pub use tool_container::{ToolContainer, ToolOutputError};

use std::fmt;

/// Which image of a conversion job is being encoded.
///
/// Carried into encoder errors so a failure names the sub-image it hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The whole image of an unmasked texture
    Texture,
    /// The pre-composed `(W, 2H)` colour + mask canvas
    Canvas,
    /// Colour plane of a split masked texture
    Color,
    /// Mask plane of a split masked texture
    Mask,
}

impl Stage {
    /// Encoder verb: the canvas is already composed and only needs copying
    /// into the target format, everything else is encoded from scratch.
    pub fn verb(&self) -> &'static str {
        match self {
            Stage::Canvas => "COPY",
            Stage::Texture | Stage::Color | Stage::Mask => "ENCODE",
        }
    }

    /// Short name used for scratch file prefixes.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Stage::Texture => "texture",
            Stage::Canvas => "canvas",
            Stage::Color => "color",
            Stage::Mask => "mask",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Texture => "texture",
            Stage::Canvas => "masked canvas",
            Stage::Color => "color plane",
            Stage::Mask => "mask plane",
        };
        f.write_str(name)
    }
}

/// GPU texture formats the container can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuFormat {
    /// GameCube/Wii S3TC variant: 4x4 blocks of 8 bytes, stored in 8x8 tiles
    Cmpr,
}

impl GpuFormat {
    /// Format name as understood by the encoder's `--transform` option.
    pub fn name(&self) -> &'static str {
        match self {
            GpuFormat::Cmpr => "cmpr",
        }
    }

    /// Size of the compressed payload for a `width` x `height` image.
    ///
    /// CMPR pads both dimensions up to whole 8x8 tiles; each tile holds four
    /// 8-byte blocks, i.e. half a byte per pixel.
    pub fn encoded_size(&self, width: u32, height: u32) -> usize {
        match self {
            GpuFormat::Cmpr => {
                let tiles_wide = width.div_ceil(8) as usize;
                let tiles_high = height.div_ceil(8) as usize;
                tiles_wide * tiles_high * 32
            }
        }
    }
}

/// Compressed payload for one sub-image, exactly as the encoder produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock(Vec<u8>);

impl EncodedBlock {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmpr_size_whole_tiles() {
        // 8x8 = one tile = 4 blocks * 8 bytes
        assert_eq!(GpuFormat::Cmpr.encoded_size(8, 8), 32);
        // 256x256 = 32*32 tiles
        assert_eq!(GpuFormat::Cmpr.encoded_size(256, 256), 32 * 32 * 32);
        // Half a byte per pixel
        assert_eq!(GpuFormat::Cmpr.encoded_size(64, 128), 64 * 128 / 2);
    }

    #[test]
    fn test_cmpr_size_rounds_up_to_tiles() {
        assert_eq!(GpuFormat::Cmpr.encoded_size(2, 2), 32);
        assert_eq!(GpuFormat::Cmpr.encoded_size(10, 6), 2 * 32);
        assert_eq!(GpuFormat::Cmpr.encoded_size(12, 12), 4 * 32);
    }

    #[test]
    fn test_stage_verbs() {
        assert_eq!(Stage::Canvas.verb(), "COPY");
        assert_eq!(Stage::Texture.verb(), "ENCODE");
        assert_eq!(Stage::Color.verb(), "ENCODE");
        assert_eq!(Stage::Mask.verb(), "ENCODE");
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Mask.to_string(), "mask plane");
        assert_eq!(Stage::Canvas.to_string(), "masked canvas");
    }

    #[test]
    fn test_encoded_block() {
        let block = EncodedBlock::new(vec![1, 2, 3]);
        assert_eq!(block.len(), 3);
        assert!(!block.is_empty());
        assert_eq!(block.as_bytes(), &[1, 2, 3]);
    }
}
