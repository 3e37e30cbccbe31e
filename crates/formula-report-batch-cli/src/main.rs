use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use formula_automation::InMemoryHost;
use formula_report_batch::{
    read_divisions, run_batch, BatchConfig, TemplateLayout, VariantSource,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "formula-report-batch")]
#[command(about = "Generate one report sheet per variant from a workbook template.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a batch and save the output workbook next to the source.
    Run(RunArgs),
    /// List the division labels of the reference table.
    Divisions(DivisionsArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Job file (JSON `BatchConfig`). Replaces `--source`, `--division`, and `--variant`.
    #[arg(long, conflicts_with_all = ["source", "division", "variants"])]
    config: Option<PathBuf>,

    /// Source workbook holding the template and reference sheets.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Division to look up in the reference table.
    #[arg(long, conflicts_with = "variants")]
    division: Option<String>,

    /// Variant id to generate (repeatable). Blank ids are reported as skipped.
    #[arg(long = "variant")]
    variants: Vec<String>,

    /// Macro to run after each refresh (repeatable).
    #[arg(long = "macro")]
    macros: Vec<String>,

    /// Layout file (JSON `TemplateLayout`); fields left out keep their defaults.
    #[arg(long, value_name = "PATH")]
    layout: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Parser)]
struct DivisionsArgs {
    /// Source workbook holding the reference sheet.
    #[arg(long)]
    source: PathBuf,

    /// Layout file (JSON `TemplateLayout`).
    #[arg(long, value_name = "PATH")]
    layout: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Divisions(args) => divisions(args),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => BatchConfig::from_json_file(path)?,
        None => {
            let source = args
                .source
                .clone()
                .context("either --config or --source is required")?;
            let variants = match (&args.division, args.variants.is_empty()) {
                (Some(division), true) => VariantSource::Lookup {
                    division: division.clone(),
                },
                (None, false) => VariantSource::Direct {
                    variant_ids: args.variants.clone(),
                },
                _ => anyhow::bail!("pass either --division or at least one --variant"),
            };
            BatchConfig::new(source, variants)
        }
    };
    if !args.macros.is_empty() {
        config.macro_names = args.macros.clone();
    }
    if let Some(path) = &args.layout {
        log::info!("using layout from `{}`", path.display());
        config.layout = load_layout(Some(path))?;
    }

    let result = run_batch(&config, || Ok(InMemoryHost::new()));
    let rendered = match args.format {
        OutputFormat::Text => result.to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(&result)?,
    };
    write_stdout(&rendered)?;

    if !result.is_completed() {
        std::process::exit(1);
    }
    Ok(())
}

fn divisions(args: DivisionsArgs) -> Result<()> {
    let layout = load_layout(args.layout.as_deref())?;
    let divisions = read_divisions(&args.source, &layout, || Ok(InMemoryHost::new()))
        .with_context(|| format!("reading divisions from `{}`", args.source.display()))?;
    let rendered = match args.format {
        OutputFormat::Text => divisions.join("\n"),
        OutputFormat::Json => serde_json::to_string_pretty(&divisions)?,
    };
    write_stdout(&rendered)
}

fn load_layout(path: Option<&Path>) -> Result<TemplateLayout> {
    match path {
        Some(path) => Ok(TemplateLayout::from_json_file(path)?),
        None => Ok(TemplateLayout::default()),
    }
}

/// Print `text` and a newline. A closed stdout is not an error.
fn write_stdout(text: &str) -> Result<()> {
    let mut handle = io::stdout().lock();
    match writeln!(handle, "{text}").and_then(|()| handle.flush()) {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => Ok(other?),
    }
}
