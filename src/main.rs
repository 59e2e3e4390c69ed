// Command-line entry point for stackcheck.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use stackcheck::application::CheckUsecase;
use stackcheck::common::config::{CheckConfig, DuplicateRootPolicy};
use stackcheck::common::error::StackcheckError;
use stackcheck::domain::verifier::SpawnPolicy;
use stackcheck::infrastructure::concurrency::init_thread_pool;
use stackcheck::infrastructure::{GraphFile, HierarchyCallGraphBuilder, ProjectLoader};
use stackcheck::ports::{DotExporter, JsonExporter, TextExporter, ViolationExporter};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Crate whose annotations are checked (required unless --graph)
    #[arg(short, long)]
    target: Option<String>,

    /// Input source file path (can specify multiple)
    #[arg(short, long)]
    input: Vec<String>,

    /// Input source folder(s)
    #[arg(short = 'd', long)]
    folder: Vec<String>,

    /// Workspace Cargo.toml
    #[arg(long)]
    workspace: Option<String>,

    /// Prebuilt call graph (JSON) to verify instead of sources
    #[arg(long, conflicts_with_all = ["input", "folder", "workspace"])]
    graph: Option<PathBuf>,

    /// Also write the call graph (JSON) to this path
    #[arg(long)]
    emit_graph: Option<PathBuf>,

    /// Report file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// require-root or terminate
    #[arg(long)]
    spawn_policy: Option<SpawnPolicy>,

    /// Treat more than one root per label as an error
    #[arg(long)]
    strict_roots: bool,

    /// Keep #[test] functions and #[cfg(test)] modules
    #[arg(long)]
    include_tests: bool,

    /// Worker threads (default: one per core)
    #[arg(long)]
    jobs: Option<usize>,

    /// Config file (default: ./stackcheck.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Dot,
}

impl Cli {
    /// Flags override file values.
    fn apply(&self, config: &mut CheckConfig) {
        if let Some(policy) = self.spawn_policy {
            config.spawn_policy = policy;
        }
        if self.strict_roots {
            config.duplicate_roots = DuplicateRootPolicy::Error;
        }
        if self.include_tests {
            config.include_tests = true;
        }
        if self.jobs.is_some() {
            config.jobs = self.jobs;
        }
    }

    fn exporter(&self) -> Box<dyn ViolationExporter> {
        match self.format {
            Format::Text => Box::new(TextExporter),
            Format::Json => Box::new(JsonExporter),
            Format::Dot => Box::new(DotExporter),
        }
    }
}

/// Loose files and folders belong to the target crate.
fn collect_sources(cli: &Cli, target: &str) -> Result<Vec<(String, String, String)>> {
    let crate_name = target.replace('-', "_");
    let mut sources = Vec::new();

    // 1. input files
    for input_file in &cli.input {
        let code = fs::read_to_string(input_file)
            .with_context(|| format!("Cannot read input file {}", input_file))?;
        sources.push((crate_name.clone(), input_file.clone(), code));
    }

    // 2. folders
    for folder in &cli.folder {
        sources.extend(ProjectLoader::load_dir(Path::new(folder), &crate_name)?);
    }

    // 3. workspace
    if let Some(cargo_toml) = &cli.workspace {
        let ws_sources = ProjectLoader::load_workspace(cargo_toml)?;
        log::debug!("workspace collected {} .rs files", ws_sources.len());
        sources.extend(ws_sources);
    }

    if sources.is_empty() {
        anyhow::bail!("Please provide at least one --input <file>, --folder <dir> or --workspace <Cargo.toml>");
    }
    ProjectLoader::require_target(&sources, &crate_name)?;
    Ok(sources)
}

/// Ok(true) when no violation was found.
fn run(cli: &Cli) -> Result<bool> {
    let mut config = CheckConfig::discover(cli.config.as_deref(), Path::new("."))?;
    cli.apply(&mut config);
    config.validate()?;

    if config.parallel {
        if let Err(e) = init_thread_pool(config.jobs) {
            log::debug!("thread pool already initialized: {}", e);
        }
    }

    let exporter = cli.exporter();
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let usecase = CheckUsecase {
        provider: &HierarchyCallGraphBuilder,
        exporter: exporter.as_ref(),
        config: &config,
    };

    let outcome = match &cli.graph {
        Some(graph) => usecase.run_prebuilt(GraphFile::load(graph)?, &mut *out)?,
        None => {
            let target = cli.target.as_deref().ok_or(StackcheckError::MissingTarget)?;
            let sources = collect_sources(cli, target)?;
            usecase.run(&sources, Some(target), &mut *out)?
        }
    };
    out.flush()?;

    if let Some(path) = &cli.emit_graph {
        GraphFile::write(&outcome.graph, Some(&outcome.annotations), path)?;
        log::info!("Call graph written to {}", path.display());
    }

    Ok(outcome.report.is_clean())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
