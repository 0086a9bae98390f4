//! ubitex - UbiArt Wii texture encoder

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ubitex::ckd::{CkdInfo, RecordKind};
use ubitex::config::{self, locate_encoder, ConvertOptions, Settings};
use ubitex::convert::{ConversionJob, Converter};
use ubitex::paths::{expand_inputs, OutputExtension};
use ubitex::scratch::ScratchDir;
use ubitex::textures::{GpuFormat, MaskLayout, SrgbNormalizer, ToolContainer, WimgtEncoder};

#[derive(Parser)]
#[command(name = "ubitex")]
#[command(version)]
#[command(about = "Encode images into UbiArt Wii .ckd textures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Settings file to use instead of ~/.config/ubitex/settings.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert images matching a glob pattern into .ckd containers
    Convert {
        /// Input file or glob pattern (quote it to stop the shell expanding it)
        #[arg(short, long)]
        input: String,

        /// Output directory (defaults to next to each input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path to the wimgt executable
        #[arg(short, long, env = "UBITEX_WIMGT")]
        wimgt: Option<PathBuf>,

        /// Store an alpha mask alongside the colour data (APMC record)
        #[arg(short, long)]
        masked: bool,

        /// Texture extension embedded in the output name
        #[arg(short, long, value_enum)]
        extension: Option<ExtensionArg>,

        /// Whiten colour pixels that the mask hides
        #[arg(short = 'W', long)]
        white_alpha: bool,

        /// Payload layout for masked textures
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,

        /// Container wimgt writes its output in
        #[arg(long, value_enum)]
        container: Option<ContainerArg>,

        /// Worker threads (defaults to one per core)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Seconds before a wimgt run is killed (0 = never)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Directory for intermediate files
        #[arg(long)]
        scratch_dir: Option<PathBuf>,
    },

    /// Show the header of a .ckd texture
    Info {
        /// Path to the .ckd file
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExtensionArg {
    Tga,
    Png,
}

impl From<ExtensionArg> for OutputExtension {
    fn from(arg: ExtensionArg) -> Self {
        match arg {
            ExtensionArg::Tga => OutputExtension::Tga,
            ExtensionArg::Png => OutputExtension::Png,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    /// Colour and mask stacked into one canvas, encoded once
    Merged,
    /// Colour and mask encoded separately
    Split,
}

impl From<LayoutArg> for MaskLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Merged => MaskLayout::Merged,
            LayoutArg::Split => MaskLayout::Split,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ContainerArg {
    Tpl,
    Tex0,
}

impl From<ContainerArg> for ToolContainer {
    fn from(arg: ContainerArg) -> Self {
        match arg {
            ContainerArg::Tpl => ToolContainer::Tpl,
            ContainerArg::Tex0 => ToolContainer::Tex0,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive(if cli.verbose {
        "ubitex=debug".parse()?
    } else {
        "ubitex=info".parse()?
    });
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };

    match cli.command {
        Commands::Convert {
            input,
            output,
            wimgt,
            masked,
            extension,
            white_alpha,
            layout,
            container,
            jobs,
            timeout_secs,
            scratch_dir,
        } => {
            let inputs = expand_inputs(&input)
                .with_context(|| format!("Invalid input pattern '{}'", input))?;
            if inputs.is_empty() {
                warn!("No files match {}", input);
                return Ok(());
            }

            // CLI takes precedence, then settings, then built-in defaults
            let extension = match extension {
                Some(ext) => ext.into(),
                None => settings.extension()?.unwrap_or_default(),
            };
            let layout = layout
                .map(MaskLayout::from)
                .or(settings.mask_layout)
                .unwrap_or_default();
            let container = container
                .map(ToolContainer::from)
                .or(settings.container)
                .unwrap_or_default();
            let timeout = match timeout_secs {
                Some(secs) => config::timeout_from_secs(secs),
                None => settings.timeout().unwrap_or_else(config::default_timeout),
            };
            let jobs = match jobs {
                Some(0) => bail!("--jobs must be at least 1"),
                Some(n) => Some(n),
                None => settings.jobs()?,
            };

            let executable = locate_encoder(wimgt.as_deref(), &settings)?;
            info!("Using encoder {}", executable.display());

            let scratch = scratch_dir
                .or_else(|| settings.scratch_dir())
                .map(ScratchDir::new)
                .unwrap_or_else(ScratchDir::system_default);
            let normalizer = Arc::new(SrgbNormalizer::new()?);
            let encoder = WimgtEncoder::new(executable, Arc::new(scratch), normalizer.clone())
                .with_container(container)
                .with_timeout(timeout);

            let options = ConvertOptions {
                masked,
                remask: white_alpha,
                layout,
                extension,
                output_dir: output,
                format: GpuFormat::Cmpr,
            };
            let converter = Converter::new(Arc::new(encoder), normalizer, options);

            let jobs_list: Vec<ConversionJob> = inputs
                .into_iter()
                .map(|input| ConversionJob::new(input, converter.options()))
                .collect();

            let mut pool = rayon::ThreadPoolBuilder::new();
            if let Some(n) = jobs {
                pool = pool.num_threads(n);
            }
            let pool = pool.build().context("Failed to create worker pool")?;

            let report = pool.install(|| converter.run_batch(&jobs_list));

            info!(
                "Converted {}/{} textures",
                report.converted.len(),
                report.total()
            );
            for (kind, count) in report.failures_by_kind() {
                warn!("{} failed with {} errors", count, kind);
            }
        }

        Commands::Info { file } => {
            let data =
                std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let info = CkdInfo::parse(&data)
                .with_context(|| format!("{} is not a texture container", file.display()))?;

            let kind = match info.kind {
                RecordKind::Single => "1TXD (single)",
                RecordKind::Masked => "APMC (colour + mask)",
            };
            println!("File:       {}", file.display());
            println!("Size:       {}x{}", info.width, info.height);
            println!("Record:     {}", kind);
            println!("Payload:    {} bytes", info.payload_len);
            println!("Length:     {} bytes after header", info.contained_len);
        }
    }

    Ok(())
}
