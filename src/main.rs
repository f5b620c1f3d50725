//! Conformance CLI
//!
//! Runs a fixture suite against a script host and reports the results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conformance_harness::reporter::{self, baseline};
use conformance_harness::{
    FixtureLoader, OutputFormat, Report, ReportDocument, Runner, RunnerConfig, VERSION,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conformance")]
#[command(author, version, about = "Run Sputnik/ES5-style conformance fixtures against a JavaScript host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging on stderr (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a fixture suite
    Run(RunArgs),

    /// List the fixtures a run would execute
    List {
        /// Suite root directory
        root: PathBuf,
        /// Only fixtures whose id starts with this prefix (repeatable)
        #[arg(long = "id", value_name = "PREFIX")]
        id_prefixes: Vec<String>,
        /// Only fixtures with a section starting with this prefix (repeatable)
        #[arg(long = "section", value_name = "PREFIX")]
        sections: Vec<String>,
        /// Fixture file extension
        #[arg(long, default_value = "js")]
        extension: String,
    },

    /// Compare two JSON reports
    Diff {
        /// Report of the reference run
        baseline: PathBuf,
        /// Report of the run under review
        current: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Suite root directory (overrides the config file)
    root: Option<PathBuf>,

    /// JSON config file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Host command line, e.g. "node" or "d8 --harmony"
    #[arg(short, long, value_name = "CMD")]
    engine: Option<String>,

    /// Only fixtures whose id starts with this prefix (repeatable)
    #[arg(long = "id", value_name = "PREFIX")]
    id_prefixes: Vec<String>,

    /// Only fixtures with a section starting with this prefix (repeatable)
    #[arg(long = "section", value_name = "PREFIX")]
    sections: Vec<String>,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Per-test timeout in milliseconds
    #[arg(short, long, value_name = "MS")]
    timeout: Option<u64>,

    /// Teardown allowance for interrupted tests in milliseconds
    #[arg(long, value_name = "MS")]
    grace_period: Option<u64>,

    /// Run at most this many tests
    #[arg(long)]
    max_tests: Option<usize>,

    /// Stop after this many failures, errors or timeouts
    #[arg(long)]
    max_failures: Option<usize>,

    /// Stop dispatching after this many seconds
    #[arg(long, value_name = "SECS")]
    max_duration: Option<u64>,

    /// Shuffle execution order with this seed
    #[arg(long, value_name = "SEED")]
    shuffle: Option<u64>,

    /// Do not install fnExists, compareArray and the other ES5 helpers
    #[arg(long)]
    no_helpers: bool,

    /// Fixture file extension
    #[arg(long)]
    extension: Option<String>,

    /// Report format: summary, verbose, json or tap
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl RunArgs {
    /// Layer flags over the config file over the defaults
    fn into_config(self) -> Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::from_file(path)?,
            None => RunnerConfig::default(),
        };
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(engine) = self.engine {
            config.engine.command = engine;
            config.engine.args.clear();
        }
        if !self.id_prefixes.is_empty() {
            config.id_prefixes = self.id_prefixes;
        }
        if !self.sections.is_empty() {
            config.sections = self.sections;
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(ms) = self.timeout {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.grace_period {
            config.grace_period = Duration::from_millis(ms);
        }
        if let Some(max) = self.max_tests {
            config.max_tests = max;
        }
        if let Some(max) = self.max_failures {
            config.max_failures = max;
        }
        if let Some(secs) = self.max_duration {
            config.max_duration = Some(Duration::from_secs(secs));
        }
        if self.shuffle.is_some() {
            config.shuffle_seed = self.shuffle;
        }
        if self.no_helpers {
            config.harness_helpers = false;
        }
        if let Some(extension) = self.extension {
            config.extension = extension;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if self.output.is_some() {
            config.output = self.output;
        }
        Ok(config)
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    tracing::debug!(version = VERSION, "conformance harness");

    let result = match cli.command {
        Commands::Run(args) => run(args),
        Commands::List {
            root,
            id_prefixes,
            sections,
            extension,
        } => list(&root, id_prefixes, sections, extension),
        Commands::Diff { baseline, current } => diff(&baseline, &current),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn run(args: RunArgs) -> Result<ExitCode> {
    let config = args.into_config()?;
    let engine = config.engine.build()?;
    let runner = Runner::new(config.clone(), Arc::new(engine));
    let report = runner
        .run()
        .with_context(|| format!("run of '{}' aborted", config.root.display()))?;

    write_report(&report, config.format, config.output.as_deref())?;
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn write_report(report: &Report, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let reporter = reporter::reporter_for(format);
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            reporter.write(report, &mut out)?;
            // Keep a one-line verdict on the console when the report goes to a file.
            let counts = report.counts();
            eprintln!(
                "{} tests: {} passed, {} failed, {} errors, {} skipped, {} timeouts -> {}",
                counts.total,
                counts.passed,
                counts.failed,
                counts.errors,
                counts.skipped,
                counts.timeouts,
                path.display()
            );
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            reporter.write(report, &mut out)?;
        }
    }
    Ok(())
}

fn list(root: &Path, id_prefixes: Vec<String>, sections: Vec<String>, extension: String) -> Result<ExitCode> {
    anyhow::ensure!(root.is_dir(), "suite root '{}' is not a directory", root.display());
    let loader = FixtureLoader::new(root)
        .with_extension(extension)
        .with_filter(conformance_harness::FixtureFilter { id_prefixes, sections });

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut malformed = 0usize;
    for item in loader.iter() {
        match item {
            Ok(descriptor) => writeln!(
                out,
                "{}\t{}\t{}\t{}",
                descriptor.id,
                descriptor.section(),
                descriptor.path.display(),
                descriptor.description()
            )?,
            Err(fixture) => {
                malformed += 1;
                writeln!(out, "{}\t!\t{}\t{}", fixture.id, fixture.path.display(), fixture.reason)?;
            }
        }
    }
    Ok(if malformed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn diff(baseline_path: &Path, current_path: &Path) -> Result<ExitCode> {
    let baseline_doc = ReportDocument::load(baseline_path)
        .with_context(|| format!("cannot load baseline {}", baseline_path.display()))?;
    let current_doc = ReportDocument::load(current_path)
        .with_context(|| format!("cannot load report {}", current_path.display()))?;

    let comparison = baseline::compare(&baseline_doc, &current_doc);
    print!("{}", comparison.render());
    Ok(if comparison.has_regressions() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
