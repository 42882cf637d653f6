//! # Folio CLI
//!
//! Command-line front end for the Folio layout engine.
//!
//! ## Usage
//!
//! ```bash
//! # Resolve a template into scene JSON
//! folio layout brochure.json --mode horizontal --output scene.json
//!
//! # Template -> scene -> template
//! folio roundtrip brochure.json
//!
//! # Export pages 1 and 2 as PNG files, or everything as one PDF
//! folio export brochure.json --pages 0,1 --out-dir out/
//! folio export brochure.json --kind document --format jpeg
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `load_config` - Optional `CanvasConfig` JSON file
//! - `load_controller` - Template file resolved into a `CanvasController`,
//!   with image paths read relative to the template's directory
//! - `run` - Dispatches a subcommand and reports what it wrote

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use folio_core::{
    CanvasConfig, CanvasController, ExportKind, ExportOutput, ExportRequest, LayoutEngine,
    PagingMode, RasterFormat, TemplateDocument,
};
use folio_renderer::{CoverCropProcessor, FileAssetSource, SceneExporter};

/// Command-line arguments for folio.
#[derive(Debug, Clone, Parser)]
#[command(name = "folio")]
#[command(about = "Resolve, round-trip and export Folio page templates")]
#[command(version)]
pub struct CliArgs {
    /// Canvas configuration JSON (page size, snapping, export density)
    #[arg(long, global = true, env = "FOLIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Folio subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Resolve a template and print the scene as JSON
    Layout {
        /// Template JSON file
        template: PathBuf,
        /// Page arrangement
        #[arg(long, value_enum, default_value_t = ModeArg::Vertical)]
        mode: ModeArg,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Resolve a template and serialize the scene back into a template
    Roundtrip {
        /// Template JSON file
        template: PathBuf,
        /// Page arrangement used while resolving
        #[arg(long, value_enum, default_value_t = ModeArg::Vertical)]
        mode: ModeArg,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Export pages as images or as one document
    Export {
        /// Template JSON file
        template: PathBuf,
        /// Zero-based page indices, comma separated (default: all pages)
        #[arg(long, value_delimiter = ',')]
        pages: Vec<usize>,
        /// One file per page, or one document
        #[arg(long, value_enum, default_value_t = KindArg::Raster)]
        kind: KindArg,
        /// Page image encoding
        #[arg(long, value_enum, default_value_t = FormatArg::Png)]
        format: FormatArg,
        /// Output pixels per page unit (default: from config)
        #[arg(long)]
        multiplier: Option<f32>,
        /// Directory the files are written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

/// Page arrangement as written on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Pages stacked top to bottom
    Vertical,
    /// Pages side by side
    Horizontal,
}

impl From<ModeArg> for PagingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Vertical => Self::Vertical,
            ModeArg::Horizontal => Self::Horizontal,
        }
    }
}

/// Export container as written on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// One image file per page
    Raster,
    /// One PDF containing every page
    Document,
}

impl From<KindArg> for ExportKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Raster => Self::Raster,
            KindArg::Document => Self::Document,
        }
    }
}

/// Page image encoding as written on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Lossless PNG
    Png,
    /// JPEG flattened onto the page background
    Jpeg,
}

impl From<FormatArg> for RasterFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Png => Self::Png,
            FormatArg::Jpeg => Self::Jpeg,
        }
    }
}

/// Read a configuration file, or use the defaults when none is given.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn load_config(path: Option<&Path>) -> anyhow::Result<CanvasConfig> {
    let Some(path) = path else {
        return Ok(CanvasConfig::default());
    };
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = CanvasConfig::from_json(&json)
        .with_context(|| format!("parsing config {}", path.display()))?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve a template file into a controller.
///
/// Relative image sources are read from the template's directory.
///
/// # Errors
///
/// Returns an error if the template cannot be read, parsed or resolved.
pub async fn load_controller(
    template: &Path,
    config: CanvasConfig,
    mode: PagingMode,
) -> anyhow::Result<CanvasController> {
    let json = tokio::fs::read_to_string(template)
        .await
        .with_context(|| format!("reading template {}", template.display()))?;
    let document = TemplateDocument::from_json(&json)
        .with_context(|| format!("parsing template {}", template.display()))?;

    let root = template
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let processor = CoverCropProcessor::new(FileAssetSource::new(root));
    let engine = LayoutEngine::new(config.page).with_image_processor(Arc::new(processor));

    let mut controller = CanvasController::new(config).with_engine(engine);
    controller.set_paging_mode(mode);
    controller
        .load_template(&document)
        .await
        .with_context(|| format!("resolving template {}", template.display()))?;
    Ok(controller)
}

/// Run one subcommand. Returns the files written.
///
/// # Errors
///
/// Returns an error if any step of the command fails.
pub async fn run(args: CliArgs) -> anyhow::Result<Vec<PathBuf>> {
    let config = load_config(args.config.as_deref()).await?;

    match args.command {
        Command::Layout {
            template,
            mode,
            output,
        } => {
            let controller = load_controller(&template, config, mode.into()).await?;
            let json = controller.scene().to_json()?;
            emit(&json, output.as_deref()).await
        }
        Command::Roundtrip {
            template,
            mode,
            output,
        } => {
            let controller = load_controller(&template, config, mode.into()).await?;
            let json = controller.to_template().to_json()?;
            emit(&json, output.as_deref()).await
        }
        Command::Export {
            template,
            pages,
            kind,
            format,
            multiplier,
            out_dir,
        } => {
            let multiplier = multiplier.unwrap_or(config.export_multiplier);
            let mut controller =
                load_controller(&template, config, PagingMode::Vertical).await?;
            let pages = if pages.is_empty() {
                (0..controller.pages().len()).collect()
            } else {
                pages
            };
            let request = ExportRequest {
                page_indices: pages,
                kind: kind.into(),
                format: format.into(),
                dpi_multiplier: multiplier,
            };
            let output = controller.export(&request, &SceneExporter::with_defaults())?;
            write_export(output, &stem(&template), &out_dir).await
        }
    }
}

/// Write `json` to `path`, or print it when no path is given.
async fn emit(json: &str, path: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
    match path {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
            Ok(vec![path.to_path_buf()])
        }
        None => {
            println!("{json}");
            Ok(Vec::new())
        }
    }
}

/// Write exported pages under `out_dir` as `<stem>-page-<n>.<ext>` or
/// `<stem>.pdf`.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be written.
pub async fn write_export(
    output: ExportOutput,
    stem: &str,
    out_dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let files = match output {
        ExportOutput::Images(images) => images
            .into_iter()
            .map(|image| {
                let name = format!(
                    "{stem}-page-{}.{}",
                    image.page_index + 1,
                    image.format.extension()
                );
                (out_dir.join(name), image.data)
            })
            .collect::<Vec<_>>(),
        ExportOutput::Document(bytes) => vec![(out_dir.join(format!("{stem}.pdf")), bytes)],
    };

    let mut written = Vec::with_capacity(files.len());
    for (path, bytes) in files {
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        written.push(path);
    }
    Ok(written)
}

fn stem(template: &Path) -> String {
    template
        .file_stem()
        .map_or_else(|| "folio".to_string(), |s| s.to_string_lossy().into_owned())
}
