//! Parsers for the files the encoder writes.
//!
//! `wimgt` can emit either a whole-file TPL or a segmented TEX0 section.
//! Both wrap the raw CMPR payload behind a short header; this module checks
//! the header and slices the payload out.

use binrw::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use super::GpuFormat;

const TPL_MAGIC: [u8; 4] = [0x00, 0x20, 0xAF, 0x30];
const TEX0_MAGIC: [u8; 4] = *b"TEX0";

/// With `--strip` the single image's data starts right after the header,
/// image table and image header.
const TPL_PAYLOAD_OFFSET: usize = 0x40;

/// Fixed part of a TEX0 section, up to and including the pixel format fields.
const TEX0_HEADER_LEN: usize = 0x40;

/// TPL file header (after the magic)
#[derive(Debug, BinRead)]
#[br(big)]
struct TplHeader {
    image_count: u32,
    #[allow(dead_code)]
    image_table_offset: u32,
}

/// TEX0 section header (after the magic)
#[derive(Debug, BinRead)]
#[br(big)]
struct Tex0Header {
    section_len: u32,
    #[allow(dead_code)]
    version: u32,
    #[allow(dead_code)]
    parent_offset: i32,
    data_offset: u32,
}

/// Ways an encoder output file can fail validation.
#[derive(Debug, thiserror::Error)]
pub enum ToolOutputError {
    #[error("cannot read encoder output: {0}")]
    Unreadable(#[source] std::io::Error),

    #[error("output file is empty")]
    Empty,

    #[error("output file is only {0} bytes")]
    Truncated(usize),

    #[error("unexpected magic {found:02X?}, not a {container} file")]
    BadMagic {
        found: [u8; 4],
        container: &'static str,
    },

    #[error("{container} file is {len} bytes, shorter than its {header} byte header")]
    ShortHeader {
        container: &'static str,
        len: usize,
        header: usize,
    },

    #[error("malformed {container} header: {reason}")]
    MalformedHeader {
        container: &'static str,
        reason: String,
    },

    #[error("TPL file contains no images")]
    NoImages,

    #[error("TEX0 data offset {data_offset:#x} lies beyond section length {section_len:#x}")]
    OffsetBeyondSection { data_offset: u32, section_len: u32 },

    #[error("TEX0 section declares {len} payload bytes at {start:#x} but the file is {file_len} bytes")]
    SectionOverrun {
        len: usize,
        start: usize,
        file_len: usize,
    },

    #[error("payload is {len} bytes, expected at least {expected}")]
    ShortPayload { len: usize, expected: usize },
}

/// Output container requested from the encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolContainer {
    /// Whole-file TPL, payload from a fixed offset to end of file
    #[default]
    Tpl,
    /// Segmented TEX0, payload bounded by the section header
    Tex0,
}

impl ToolContainer {
    /// Value for the encoder's `--transform` option.
    pub fn transform(&self, format: GpuFormat) -> String {
        let prefix = match self {
            ToolContainer::Tpl => "tpl",
            ToolContainer::Tex0 => "tex",
        };
        format!("{}.{}", prefix, format.name())
    }

    /// File suffix for the destination scratch file.
    pub fn suffix(&self) -> &'static str {
        match self {
            ToolContainer::Tpl => ".tpl",
            ToolContainer::Tex0 => ".tex0",
        }
    }

    /// Validate an encoder output file and return its payload.
    ///
    /// `expected` is the minimum payload size for the image that was encoded.
    pub fn extract(&self, data: &[u8], expected: usize) -> Result<Vec<u8>, ToolOutputError> {
        let payload = match self {
            ToolContainer::Tpl => extract_tpl(data)?,
            ToolContainer::Tex0 => extract_tex0(data)?,
        };

        if payload.len() < expected {
            return Err(ToolOutputError::ShortPayload {
                len: payload.len(),
                expected,
            });
        }

        Ok(payload.to_vec())
    }
}

fn check_magic(data: &[u8], magic: &[u8; 4], container: &'static str) -> Result<(), ToolOutputError> {
    match data.get(0..4) {
        None if data.is_empty() => Err(ToolOutputError::Empty),
        None => Err(ToolOutputError::Truncated(data.len())),
        Some(found) if found != magic => Err(ToolOutputError::BadMagic {
            found: [found[0], found[1], found[2], found[3]],
            container,
        }),
        Some(_) => Ok(()),
    }
}

fn extract_tpl(data: &[u8]) -> Result<&[u8], ToolOutputError> {
    check_magic(data, &TPL_MAGIC, "TPL")?;
    if data.len() < TPL_PAYLOAD_OFFSET {
        return Err(ToolOutputError::ShortHeader {
            container: "TPL",
            len: data.len(),
            header: TPL_PAYLOAD_OFFSET,
        });
    }

    let header = TplHeader::read(&mut Cursor::new(&data[4..])).map_err(|e| {
        ToolOutputError::MalformedHeader {
            container: "TPL",
            reason: e.to_string(),
        }
    })?;
    if header.image_count == 0 {
        return Err(ToolOutputError::NoImages);
    }

    Ok(&data[TPL_PAYLOAD_OFFSET..])
}

fn extract_tex0(data: &[u8]) -> Result<&[u8], ToolOutputError> {
    check_magic(data, &TEX0_MAGIC, "TEX0")?;
    if data.len() < TEX0_HEADER_LEN {
        return Err(ToolOutputError::ShortHeader {
            container: "TEX0",
            len: data.len(),
            header: TEX0_HEADER_LEN,
        });
    }

    let header = Tex0Header::read(&mut Cursor::new(&data[4..])).map_err(|e| {
        ToolOutputError::MalformedHeader {
            container: "TEX0",
            reason: e.to_string(),
        }
    })?;

    let start = header.data_offset as usize;
    let len = header
        .section_len
        .checked_sub(header.data_offset)
        .ok_or(ToolOutputError::OffsetBeyondSection {
            data_offset: header.data_offset,
            section_len: header.section_len,
        })? as usize;

    data.get(start..start + len)
        .ok_or(ToolOutputError::SectionOverrun {
            len,
            start,
            file_len: data.len(),
        })
}
