//! Texture records: the tagged sub-stream that follows the inner header.

use std::io::{self, Write};

use super::layout::{MASKED_METADATA, SINGLE_METADATA, TAG_MASKED, TAG_SINGLE, RECORD_HEADER_LEN};
use crate::textures::EncodedBlock;

/// How the two planes of a masked texture are laid out in the payload.
#[derive(Debug, Clone)]
pub enum MaskedPayload {
    /// One block for the `(W, 2H)` canvas: colour on top, mask below.
    Merged(EncodedBlock),
    /// Two blocks from separate encoder runs, colour first.
    Split { color: EncodedBlock, mask: EncodedBlock },
}

/// A complete texture record, ready to be written after the inner header.
#[derive(Debug, Clone)]
pub enum TextureRecord {
    /// `1TXD`: a single opaque texture
    Single(EncodedBlock),
    /// `APMC`: colour plane plus alpha mask
    Masked(MaskedPayload),
}

impl TextureRecord {
    pub fn tag(&self) -> &'static [u8; 4] {
        match self {
            TextureRecord::Single(_) => &TAG_SINGLE,
            TextureRecord::Masked(_) => &TAG_MASKED,
        }
    }

    fn metadata(&self) -> &'static [u8] {
        match self {
            TextureRecord::Single(_) => &SINGLE_METADATA,
            TextureRecord::Masked(_) => &MASKED_METADATA,
        }
    }

    fn blocks(&self) -> Vec<&EncodedBlock> {
        match self {
            TextureRecord::Single(block) => vec![block],
            TextureRecord::Masked(MaskedPayload::Merged(block)) => vec![block],
            TextureRecord::Masked(MaskedPayload::Split { color, mask }) => vec![color, mask],
        }
    }

    /// Total payload bytes across all blocks.
    pub fn payload_len(&self) -> usize {
        self.blocks().iter().map(|b| b.len()).sum()
    }

    /// Bytes this record occupies once written.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + self.payload_len()
    }

    /// Write tag, metadata and payload. Returns the number of bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(self.tag())?;
        writer.write_all(self.metadata())?;
        for block in self.blocks() {
            writer.write_all(block.as_bytes())?;
        }
        Ok(self.encoded_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ckd::layout::RECORD_METADATA_LEN;

    fn block(fill: u8, len: usize) -> EncodedBlock {
        EncodedBlock::new(vec![fill; len])
    }

    #[test]
    fn test_single_record_layout() {
        let record = TextureRecord::Single(block(0xAB, 32));
        let mut out = Vec::new();
        let written = record.write_to(&mut out).unwrap();

        assert_eq!(written, out.len());
        assert_eq!(out.len(), 4 + RECORD_METADATA_LEN + 32);
        assert_eq!(&out[0..4], b"1TXD");
        assert_eq!(&out[4..44], &SINGLE_METADATA);
        assert!(out[44..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_merged_masked_record() {
        let record = TextureRecord::Masked(MaskedPayload::Merged(block(1, 64)));
        let mut out = Vec::new();
        record.write_to(&mut out).unwrap();

        assert_eq!(&out[0..4], b"APMC");
        assert_eq!(&out[4..44], &MASKED_METADATA);
        assert_eq!(record.payload_len(), 64);
        assert_eq!(out.len(), record.encoded_len());
    }

    #[test]
    fn test_split_masked_record_is_color_then_mask() {
        let record = TextureRecord::Masked(MaskedPayload::Split {
            color: block(0xC0, 32),
            mask: block(0x3A, 32),
        });
        let mut out = Vec::new();
        record.write_to(&mut out).unwrap();

        assert_eq!(&out[0..4], b"APMC");
        assert!(out[44..76].iter().all(|&b| b == 0xC0));
        assert!(out[76..108].iter().all(|&b| b == 0x3A));
        assert_eq!(record.payload_len(), 64);
    }
}
