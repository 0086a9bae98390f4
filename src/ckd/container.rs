//! Container assembly and inspection.

use anyhow::{bail, Context};
use binrw::{binrw, BinRead, BinWrite, BinWriterExt};
use std::io::{self, Cursor, Seek, SeekFrom};
use tracing::debug;

use super::layout::*;
use super::record::TextureRecord;
use crate::error::{ConvertError, IoContext, Result};

/// Outer asset header. `contained_len` is written as a placeholder and
/// patched once the inner header and record are in place.
#[binrw]
#[brw(big)]
#[derive(Debug)]
struct OuterHeader {
    #[br(assert(prefix == OUTER_PREFIX, "not a UbiArt texture container"))]
    prefix: [u8; 12],
    contained_len: u32,
    width: u16,
    height: u16,
    #[br(assert(tail == OUTER_TAIL, "unexpected outer header tail"))]
    tail: [u8; 24],
}

impl OuterHeader {
    fn new(width: u16, height: u16) -> Self {
        Self {
            prefix: OUTER_PREFIX,
            contained_len: 0,
            width,
            height,
            tail: OUTER_TAIL,
        }
    }
}

/// Inner texture descriptor header.
#[binrw]
#[brw(big)]
#[derive(Debug)]
struct InnerHeader {
    #[br(assert(prefix == INNER_PREFIX, "missing texture descriptor header"))]
    prefix: [u8; 12],
    width: u32,
    height: u32,
    #[br(assert(tail == INNER_TAIL, "unexpected texture descriptor tail"))]
    tail: [u8; 64],
}

impl InnerHeader {
    fn new(width: u32, height: u32) -> Self {
        Self {
            prefix: INNER_PREFIX,
            width,
            height,
            tail: INNER_TAIL,
        }
    }
}

/// Check that an image can be stored in a container.
///
/// Both dimensions must be even and fit the outer header's 16-bit fields.
pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    let reason = if width == 0 || height == 0 {
        Some("width and height must be non-zero")
    } else if width % 2 != 0 || height % 2 != 0 {
        Some("width and height must be even")
    } else if width > u16::MAX as u32 || height > u16::MAX as u32 {
        Some("width and height must not exceed 65535")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConvertError::InvalidDimensions {
            width,
            height,
            reason,
        }),
        None => Ok(()),
    }
}

fn to_io(err: binrw::Error) -> io::Error {
    match err {
        binrw::Error::Io(e) => e,
        other => io::Error::other(other),
    }
}

/// Build a complete `.ckd` byte stream around an encoded texture record.
pub fn assemble(width: u32, height: u32, record: &TextureRecord) -> Result<Vec<u8>> {
    validate_dimensions(width, height)?;

    let capacity = OUTER_HEADER_LEN + INNER_HEADER_LEN + record.encoded_len();
    let mut cursor = Cursor::new(Vec::with_capacity(capacity));

    OuterHeader::new(width as u16, height as u16)
        .write(&mut cursor)
        .map_err(to_io)
        .io_context(|| "Failed to write outer header")?;
    InnerHeader::new(width, height)
        .write(&mut cursor)
        .map_err(to_io)
        .io_context(|| "Failed to write texture descriptor")?;
    record
        .write_to(&mut cursor)
        .io_context(|| "Failed to write texture record")?;

    let contained = cursor.position() - OUTER_HEADER_LEN as u64;
    let contained = u32::try_from(contained).map_err(|_| ConvertError::InvalidDimensions {
        width,
        height,
        reason: "texture data exceeds the container's 32-bit length field",
    })?;

    cursor
        .seek(SeekFrom::Start(OUTER_LENGTH_OFFSET))
        .io_context(|| "Failed to seek to length field")?;
    cursor
        .write_be(&contained)
        .map_err(to_io)
        .io_context(|| "Failed to patch length field")?;

    debug!(
        "Assembled {}x{} {} container: {} bytes",
        width,
        height,
        String::from_utf8_lossy(record.tag()),
        capacity
    );

    Ok(cursor.into_inner())
}

/// Record variant found in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Single,
    Masked,
}

/// Summary of a parsed `.ckd` texture container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CkdInfo {
    pub width: u16,
    pub height: u16,
    /// Value of the patched length field
    pub contained_len: u32,
    pub kind: RecordKind,
    /// Bytes of CMPR data after the record metadata
    pub payload_len: usize,
}

impl CkdInfo {
    /// Parse and validate a container's headers.
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let mut cursor = Cursor::new(data);

        let outer = OuterHeader::read(&mut cursor).context("reading outer header")?;
        let following = data.len() - OUTER_HEADER_LEN;
        if outer.contained_len as usize != following {
            bail!(
                "length field says {} bytes follow the header, found {}",
                outer.contained_len,
                following
            );
        }

        let inner = InnerHeader::read(&mut cursor).context("reading texture descriptor")?;
        if inner.width != outer.width as u32 || inner.height != outer.height as u32 {
            bail!(
                "descriptor size {}x{} disagrees with asset header {}x{}",
                inner.width,
                inner.height,
                outer.width,
                outer.height
            );
        }

        let record_start = OUTER_HEADER_LEN + INNER_HEADER_LEN;
        let record = data
            .get(record_start..)
            .filter(|r| r.len() >= RECORD_HEADER_LEN)
            .context("texture record is truncated")?;

        let (tag, metadata) = (&record[0..4], &record[4..RECORD_HEADER_LEN]);
        let kind = if tag == TAG_SINGLE {
            RecordKind::Single
        } else if tag == TAG_MASKED {
            RecordKind::Masked
        } else {
            bail!("unknown record tag {:?}", String::from_utf8_lossy(tag));
        };

        let expected_metadata: &[u8] = match kind {
            RecordKind::Single => &SINGLE_METADATA,
            RecordKind::Masked => &MASKED_METADATA,
        };
        if metadata != expected_metadata {
            bail!("record metadata does not match the {:?} layout", kind);
        }

        Ok(Self {
            width: outer.width,
            height: outer.height,
            contained_len: outer.contained_len,
            kind,
            payload_len: record.len() - RECORD_HEADER_LEN,
        })
    }
}
