//! Input expansion and output naming
//!
//! Containers are named after the texture they replace in the game's data:
//! `<stem>.<ext>.ckd`, where `ext` is the extension the game looks the
//! texture up by (`tga` or `png`), not the format of the source file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::error::ConvertError;

/// Logical texture extension embedded in the output file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputExtension {
    #[default]
    Tga,
    Png,
}

impl OutputExtension {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputExtension::Tga => "tga",
            OutputExtension::Png => "png",
        }
    }
}

impl fmt::Display for OutputExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputExtension {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_lowercase().as_str() {
            "tga" => Ok(OutputExtension::Tga),
            "png" => Ok(OutputExtension::Png),
            _ => Err(ConvertError::UnsupportedExtension(s.to_string())),
        }
    }
}

/// Where the container for `input` goes.
///
/// Next to the input unless `output_dir` is given.
/// `textures/hero.png` + `tga` -> `textures/hero.tga.ckd`
pub fn output_path_for(input: &Path, ext: OutputExtension, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{}.{}.ckd", stem, ext);

    match output_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// Expand a glob pattern into the files it matches, sorted.
///
/// A pattern without wildcards matches just that path. Entries that cannot
/// be read are logged and skipped; directories are ignored.
pub fn expand_inputs(pattern: &str) -> Result<Vec<PathBuf>, glob::PatternError> {
    let mut inputs = Vec::new();
    for entry in glob::glob(pattern)? {
        match entry {
            Ok(path) if path.is_file() => inputs.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable path {}: {}", e.path().display(), e.error()),
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Create parent directories for a path if they don't exist
pub fn ensure_parent_dirs(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
