//! Fixed byte layout of the UbiArt `.ckd` texture container.
//!
//! A container is three consecutive sections, all big-endian:
//!
//! ```text
//! 0x00  outer asset header        44 bytes  (length field patched last)
//! 0x2C  inner descriptor header   84 bytes
//! 0x80  texture record            tag (4) + metadata (40) + CMPR payload
//! ```
//!
//! Everything except the dimensions and the patched length is a format
//! constant and is reproduced byte-for-byte.

/// Size of the outer asset header.
pub const OUTER_HEADER_LEN: usize = 0x2C;

/// Offset of the u32 length of everything following the outer header.
pub const OUTER_LENGTH_OFFSET: u64 = 0x0C;

/// Offset of the u16 width; the u16 height follows at 0x12.
pub const OUTER_WIDTH_OFFSET: usize = 0x10;

/// 0x00..0x0C: version 9, `TEX\0`, header size 0x2C.
pub const OUTER_PREFIX: [u8; 12] = [
    0x00, 0x00, 0x00, 0x09, 0x54, 0x45, 0x58, 0x00, 0x00, 0x00, 0x00, 0x2C,
];

/// 0x14..0x2C
pub const OUTER_TAIL: [u8; 24] = [
    0x00, 0x01, 0x18, 0x00, 0x00, 0x00, 0x80, 0x80, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xCC, 0xCC,
];

/// Size of the inner texture descriptor header.
pub const INNER_HEADER_LEN: usize = 84;

/// 0x00..0x0C of the inner header: `" SDD"`, descriptor size 0x7C, flags.
pub const INNER_PREFIX: [u8; 12] = [
    0x20, 0x53, 0x44, 0x44, 0x00, 0x00, 0x00, 0x7C, 0x00, 0x08, 0x10, 0x07,
];

/// 0x14..0x54 of the inner header, after the u32 width and height.
pub const INNER_TAIL: [u8; 64] = [
    0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x54, 0x54, 0x56, 0x4E, 0x00, 0x02, 0x00, 0x07, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x04,
];

/// Record tag for a plain texture ("1 TeXture").
pub const TAG_SINGLE: [u8; 4] = *b"1TXD";

/// Record tag for a texture with an alpha mask ("AlPha Map Container").
pub const TAG_MASKED: [u8; 4] = *b"APMC";

/// Size of the metadata block following either record tag.
pub const RECORD_METADATA_LEN: usize = 40;

/// Size of tag + metadata, i.e. the offset of the payload inside a record.
pub const RECORD_HEADER_LEN: usize = 4 + RECORD_METADATA_LEN;

pub const SINGLE_METADATA: [u8; RECORD_METADATA_LEN] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

pub const MASKED_METADATA: [u8; RECORD_METADATA_LEN] = [
    0x00, 0x00, 0x00, 0x20, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF,
    0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outer_header_pieces_add_up() {
        assert_eq!(OUTER_PREFIX.len() + 4 + 2 + 2 + OUTER_TAIL.len(), OUTER_HEADER_LEN);
        assert_eq!(OUTER_PREFIX.len() as u64, OUTER_LENGTH_OFFSET);
        assert_eq!(OUTER_PREFIX.len() + 4, OUTER_WIDTH_OFFSET);
        // The header records its own size
        assert_eq!(OUTER_PREFIX[11] as usize, OUTER_HEADER_LEN);
    }

    #[test]
    fn test_inner_header_pieces_add_up() {
        assert_eq!(INNER_PREFIX.len() + 4 + 4 + INNER_TAIL.len(), INNER_HEADER_LEN);
        assert_eq!(&INNER_TAIL[48..52], b"TTVN");
    }

    #[test]
    fn test_metadata_blocks() {
        assert_eq!(SINGLE_METADATA.iter().filter(|&&b| b != 0).count(), 1);
        assert_eq!(SINGLE_METADATA[22], 0x10);
        assert_eq!(MASKED_METADATA[3], 0x20);
        assert_eq!(MASKED_METADATA[22], 0x10);
        assert_eq!(RECORD_HEADER_LEN, 44);
    }
}
