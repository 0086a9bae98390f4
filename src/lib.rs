//! ubitex - UbiArt Wii texture encoder
//!
//! Converts ordinary images into the `.ckd` texture containers UbiArt games
//! load on the Wii. Pixel data is compressed to CMPR by the external `wimgt`
//! tool; everything around it (colour normalization, mask planes, container
//! headers) happens here.

pub mod ckd;
pub mod config;
pub mod convert;
pub mod error;
pub mod paths;
pub mod scratch;
pub mod textures;

pub use config::{ConvertOptions, Settings};
pub use convert::{BatchReport, ConversionJob, Converter};
pub use error::{ConvertError, ErrorKind};
