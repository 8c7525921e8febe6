//! humangen CLI - batch animation of SMPL bodies from motion datasets.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use humangen::assets::AssetLayout;
use humangen::batch::{BatchDriver, BatchOptions};
use humangen::host::HeadlessHost;
use humangen::process::{DatasetKind, ProcessorOptions};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("HUMANGEN_BUILD_DATE"), ")");

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Batch-generate animated SMPL bodies", long_about = None)]
struct Cli {
    /// Dataset kind: amass or cloth3d
    #[arg(long)]
    dataset: String,

    /// Root of all experiment outputs
    #[arg(long)]
    output_dir: PathBuf,

    /// Directory with one entry per sample
    #[arg(long)]
    samples_dir: PathBuf,

    /// Parent directory of the SMPL assets
    #[arg(long)]
    parent_path: PathBuf,

    /// Resume from this sample id (inclusive)
    #[arg(long)]
    last_sample: Option<String>,

    /// Process a single sample, or "all"
    #[arg(long, default_value = "all")]
    sample_id: String,

    /// Reuse and write vertex caches
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    with_cache: bool,

    /// Keep attempt logs in the output files only
    #[arg(long)]
    suppress_out: bool,

    /// Store per-frame vertices in the trajectory
    #[arg(long)]
    write_verts: bool,

    /// Export a single frame, or "all"
    #[arg(long, default_value = "all")]
    frame: String,

    /// JSON config override for motion sequences
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Experiment name; defaults to the samples directory name
    #[arg(long)]
    exp_name: Option<String>,

    /// Also export the animated scene
    #[arg(long)]
    scene_export: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::WARN;
        }
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    fn frame(&self) -> Result<Option<usize>> {
        all_or(&self.frame, "frame")?
            .map(|f| f.parse::<usize>().with_context(|| format!("invalid --frame {}", f)))
            .transpose()
    }

    fn exp_name(&self) -> Result<String> {
        if let Some(name) = &self.exp_name {
            return Ok(name.clone());
        }
        last_component(&self.samples_dir)
            .with_context(|| format!("cannot derive an experiment name from {}", self.samples_dir.display()))
    }
}

/// `None` for "all", the trimmed value otherwise.
fn all_or<'a>(value: &'a str, flag: &str) -> Result<Option<&'a str>> {
    let value = value.trim();
    if value.is_empty() {
        bail!("--{} must not be empty", flag);
    }
    Ok((!value.eq_ignore_ascii_case("all")).then_some(value))
}

fn last_component(path: &Path) -> Option<String> {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .last()
}

fn init_tracing(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn run(cli: Cli) -> Result<bool> {
    let dataset: DatasetKind = cli.dataset.parse()?;
    let frame = cli.frame()?;
    let sample_id = all_or(&cli.sample_id, "sample-id")?.map(str::to_string);
    let output_dir = cli.output_dir.join(cli.exp_name()?);
    tracing::info!("experiment output in {}", output_dir.display());

    let assets = AssetLayout::new(&cli.parent_path);
    let mut host = HeadlessHost::from_assets(&assets).context("loading body models")?;

    let mut options = ProcessorOptions::new(&output_dir, &cli.samples_dir);
    options.with_cache = cli.with_cache;
    options.write_verts = cli.write_verts;
    options.scene_export = cli.scene_export;
    let mut processor = dataset.build(options, &assets, cli.config_file.as_deref())?;

    let mut batch = BatchOptions::new(&cli.samples_dir, &output_dir);
    batch.with_cache = cli.with_cache;
    batch.resume_from = cli.last_sample.clone();
    batch.sample_id = sample_id;
    batch.frame = frame;
    batch.echo = (!cli.suppress_out).then(|| cli.level());

    let report = BatchDriver::new(&mut host, processor.as_mut(), batch).run()?;
    if !report.abandoned.is_empty() {
        tracing::error!("abandoned samples: {}", report.abandoned.join(", "));
    }
    Ok(report.is_success())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.level());

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
