//! The `metavision extract` command.

use clap::{Args, ValueEnum};
use metavision_core::export::{self, OutputFormat as CoreOutputFormat, OutputWriter};
use metavision_core::pipeline::{ImageHost, ImgbbHost, LocalHost};
use metavision_core::{Config, ImageInput, MetaVision, MetadataRecord, ProcessOptions, Uploader};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::theme;

/// Supported output formats.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty JSON (an array when several images are given)
    #[default]
    Json,
    /// One JSON object per line
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// Arguments for the `extract` command.
#[derive(Args, Debug, Default)]
pub struct ExtractArgs {
    /// Image files to process
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Use this URL as the reference copy instead of uploading (single input only)
    #[arg(long)]
    pub reference_url: Option<String>,

    /// Upload to the configured image host instead of staging a local copy
    #[arg(long, conflicts_with = "reference_url")]
    pub upload: bool,

    /// Output file (defaults to stdout)
    #[arg(short, long, conflicts_with = "save")]
    pub output: Option<PathBuf>,

    /// Save to metadata_<timestamp>.json in the current directory
    #[arg(long)]
    pub save: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Disable the preview thumbnail
    #[arg(long)]
    pub no_preview: bool,

    /// Disable EXIF parsing
    #[arg(long)]
    pub no_exif: bool,

    /// Disable palette and average color
    #[arg(long)]
    pub no_palette: bool,

    /// Disable text recognition
    #[arg(long)]
    pub no_ocr: bool,

    /// Disable QR code detection
    #[arg(long)]
    pub no_qr: bool,
}

impl ExtractArgs {
    fn options(&self) -> ProcessOptions {
        ProcessOptions {
            skip_preview: self.no_preview,
            skip_exif: self.no_exif,
            skip_palette: self.no_palette,
            skip_ocr: self.no_ocr,
            skip_qr: self.no_qr,
        }
    }

    fn destination(&self) -> Option<PathBuf> {
        if self.save {
            Some(PathBuf::from(export::export_file_name()))
        } else {
            self.output.clone()
        }
    }
}

/// Pick the image host: imgbb for `--upload`, otherwise local staging.
fn select_host(config: &Config, upload: bool) -> anyhow::Result<Arc<dyn ImageHost>> {
    if upload {
        return Ok(Arc::new(ImgbbHost::from_config(&config.upload)?));
    }
    Ok(Arc::new(LocalHost::new(config.cache_dir().join("staged"))))
}

fn create_spinner(name: &str) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

    let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(format!("Extracting {name}"));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Execute the extract command.
pub async fn execute(args: ExtractArgs, config: Config) -> anyhow::Result<()> {
    if args.reference_url.is_some() && args.inputs.len() > 1 {
        anyhow::bail!(
            "--reference-url names one image but {} inputs were given\n\n  \
             Hint: Run extract once per image, or drop --reference-url to stage each file.",
            args.inputs.len()
        );
    }

    for path in &args.inputs {
        if !path.is_file() {
            anyhow::bail!(
                "Input file does not exist: {:?}\n\n  Hint: Check the file path and try again.",
                path
            );
        }
    }

    let host = select_host(&config, args.upload)?;
    let uploader = Uploader::new(host, &config.upload);
    tracing::debug!("Using image host: {}", uploader.host_name());

    let metavision = MetaVision::new(config, &args.options()).await.with_uploader(uploader);

    let mut records: Vec<Arc<MetadataRecord>> = Vec::with_capacity(args.inputs.len());
    let mut failed = 0usize;
    for path in &args.inputs {
        match process_one(&metavision, path, args.reference_url.as_deref()).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => tracing::debug!("Run for {:?} was superseded", path),
            Err(e) => {
                tracing::error!("{}: {e}", path.display());
                failed += 1;
            }
        }
    }

    if !records.is_empty() {
        write_records(&records, &args)?;
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} image(s) failed", args.inputs.len());
    }
    Ok(())
}

async fn process_one(
    metavision: &MetaVision,
    path: &Path,
    reference_url: Option<&str>,
) -> anyhow::Result<Option<Arc<MetadataRecord>>> {
    let input = ImageInput::from_path(path, &metavision.config().limits).await?;
    let spinner = create_spinner(&input.name);
    let result = metavision.process(&input, reference_url).await;
    spinner.finish_and_clear();
    Ok(result?)
}

fn write_records(records: &[Arc<MetadataRecord>], args: &ExtractArgs) -> anyhow::Result<()> {
    let items: Vec<&MetadataRecord> = records.iter().map(Arc::as_ref).collect();
    let format = CoreOutputFormat::from(args.format);

    match args.destination() {
        Some(path) => {
            let file = File::create(&path)?;
            write_to(BufWriter::new(file), format, &items)?;
            theme::success(&format!("Metadata written to {}", path.display()));
        }
        None => write_to(std::io::stdout().lock(), format, &items)?,
    }
    Ok(())
}

fn write_to<W: Write>(
    writer: W,
    format: CoreOutputFormat,
    items: &[&MetadataRecord],
) -> std::io::Result<()> {
    let mut writer = OutputWriter::new(writer, format, true);
    match items {
        [single] if format == CoreOutputFormat::Json => writer.write(single)?,
        _ => writer.write_all(items)?,
    }
    writer.flush()
}
