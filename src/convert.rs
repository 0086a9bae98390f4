//! Conversion pipeline
//!
//! One job runs load -> normalize -> validate -> decompose -> encode ->
//! assemble -> write, strictly in that order. Batches run jobs in parallel
//! on the current rayon pool; a failing job is reported and the rest carry on.

use image::{DynamicImage, GenericImageView};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::ckd::{self, MaskedPayload, RecordKind, TextureRecord};
use crate::config::ConvertOptions;
use crate::error::{ConvertError, ErrorKind, IoContext, Result};
use crate::paths::{ensure_parent_dirs, output_path_for};
use crate::textures::{
    BlockEncoder, ChannelDecomposer, ColorNormalizer, MaskLayout, SourceImage, Stage,
};

/// One input file and where its container goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ConversionJob {
    pub fn new(input: impl Into<PathBuf>, options: &ConvertOptions) -> Self {
        let input = input.into();
        let output = output_path_for(&input, options.extension, options.output_dir.as_deref());
        Self { input, output }
    }
}

/// A container that was written successfully.
#[derive(Debug, Clone)]
pub struct ConvertedTexture {
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub kind: RecordKind,
    /// Size of the written container
    pub bytes: usize,
}

#[derive(Debug)]
pub struct FailedJob {
    pub input: PathBuf,
    pub error: ConvertError,
}

/// Outcome of a batch. A batch itself never fails.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<ConvertedTexture>,
    pub failed: Vec<FailedJob>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.converted.len() + self.failed.len()
    }

    /// Failure counts per error category.
    pub fn failures_by_kind(&self) -> HashMap<ErrorKind, usize> {
        let mut counts = HashMap::new();
        for failure in &self.failed {
            *counts.entry(failure.error.kind()).or_insert(0) += 1;
        }
        counts
    }
}

/// Drives the pipeline for single files and batches.
pub struct Converter {
    encoder: Arc<dyn BlockEncoder>,
    normalizer: Arc<dyn ColorNormalizer>,
    options: ConvertOptions,
}

impl Converter {
    pub fn new(
        encoder: Arc<dyn BlockEncoder>,
        normalizer: Arc<dyn ColorNormalizer>,
        options: ConvertOptions,
    ) -> Self {
        if options.masked && options.layout == MaskLayout::Split {
            warn!(
                "Split mask layout selected: APMC records will hold separate colour and mask \
                 blocks, which readers of the merged canvas layout will not expect"
            );
        }

        Self {
            encoder,
            normalizer,
            options,
        }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Encode a normalized image into the record for the configured mode.
    pub fn build_record(&self, image: &DynamicImage) -> Result<TextureRecord> {
        let format = self.options.format;

        if !self.options.masked {
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let block = self.encoder.compress(&rgb, format, Stage::Texture)?;
            return Ok(TextureRecord::Single(block));
        }

        let rgba = image.to_rgba8();
        let decomposer = ChannelDecomposer::new(self.options.remask);

        let payload = match self.options.layout {
            MaskLayout::Merged => {
                let canvas = DynamicImage::ImageRgb8(decomposer.compose_canvas(&rgba));
                MaskedPayload::Merged(self.encoder.compress(&canvas, format, Stage::Canvas)?)
            }
            MaskLayout::Split => {
                let planes = decomposer.split(&rgba);
                let color = self.encoder.compress(
                    &DynamicImage::ImageRgba8(planes.color),
                    format,
                    Stage::Color,
                )?;
                let mask = self.encoder.compress(
                    &DynamicImage::ImageRgba8(planes.mask),
                    format,
                    Stage::Mask,
                )?;
                MaskedPayload::Split { color, mask }
            }
        };

        Ok(TextureRecord::Masked(payload))
    }

    /// Produce the complete container bytes for a decoded source image.
    pub fn encode(&self, source: SourceImage) -> Result<Vec<u8>> {
        let (width, height) = source.image.dimensions();
        ckd::validate_dimensions(width, height)?;

        let image = self
            .normalizer
            .normalize(source.image, source.icc_profile.as_deref())?;
        let record = self.build_record(&image)?;

        ckd::assemble(width, height, &record)
    }

    /// Convert one file. Nothing is written unless every step succeeds.
    pub fn convert(&self, job: &ConversionJob) -> Result<ConvertedTexture> {
        let source = SourceImage::open(&job.input)?;
        let (width, height) = source.image.dimensions();

        let data = self.encode(source)?;
        write_atomically(&job.output, &data)?;

        Ok(ConvertedTexture {
            input: job.input.clone(),
            output: job.output.clone(),
            width,
            height,
            kind: if self.options.masked {
                RecordKind::Masked
            } else {
                RecordKind::Single
            },
            bytes: data.len(),
        })
    }

    /// Convert every job, in parallel on the current rayon pool.
    pub fn run_batch(&self, jobs: &[ConversionJob]) -> BatchReport {
        let pb = if jobs.len() > 1 {
            let pb = ProgressBar::new(jobs.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} | {msg}")
            {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };

        let ok = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let results: Vec<(&ConversionJob, Result<ConvertedTexture>)> = jobs
            .par_iter()
            .map(|job| {
                info!("{} --> {}", job.input.display(), job.output.display());
                let result = self.convert(job);

                match &result {
                    Ok(_) => ok.fetch_add(1, Ordering::Relaxed),
                    Err(e) => {
                        error!("Failed to convert {}: {}", job.input.display(), e);
                        failed.fetch_add(1, Ordering::Relaxed)
                    }
                };
                pb.inc(1);
                pb.set_message(format!(
                    "OK:{} Fail:{}",
                    ok.load(Ordering::Relaxed),
                    failed.load(Ordering::Relaxed)
                ));

                (job, result)
            })
            .collect();

        pb.finish_and_clear();

        let mut report = BatchReport::default();
        for (job, result) in results {
            match result {
                Ok(done) => report.converted.push(done),
                Err(error) => report.failed.push(FailedJob {
                    input: job.input.clone(),
                    error,
                }),
            }
        }
        report
    }
}

/// Write `data` to `path` through a temp file in the same directory, so a
/// reader never sees a half-written container.
fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    ensure_parent_dirs(path)
        .io_context(|| format!("Failed to create directory for {}", path.display()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .io_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(data)
        .io_context(|| format!("Failed to write {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .io_context(|| format!("Failed to move output into place at {}", path.display()))?;

    debug!("Wrote {} ({} bytes)", path.display(), data.len());
    Ok(())
}
