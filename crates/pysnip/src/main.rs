use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{LevelFilter, debug};
use pysnip::{
    BundleError, Bundler,
    config::{Config, ConfigLayer},
};

#[derive(Debug, Parser)]
#[command(
    name = "pysnip",
    version,
    about = "Fold a multi-module Python program into a single source file"
)]
struct Cli {
    /// Entry Python file
    #[arg(value_name = "ENTRY")]
    entry: PathBuf,

    /// Write the bundle to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Project config file, used instead of pysnip.toml next to the entry
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extra directory searched for imports (repeatable)
    #[arg(long = "src", value_name = "DIR")]
    src: Vec<PathBuf>,

    /// Third-party package available where the bundle runs (repeatable)
    #[arg(long = "known-third-party", value_name = "NAME")]
    known_third_party: Vec<String>,

    /// Target Python version, e.g. py312
    #[arg(long, value_name = "VERSION")]
    target_version: Option<String>,

    /// Append each reachable declaration only once
    #[arg(long)]
    dedupe: bool,
}

#[allow(clippy::print_stderr)]
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<BundleError>()
                .map_or(1, BundleError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG still wins over -v
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let entry = std::path::absolute(&cli.entry).map_err(|source| BundleError::PathResolution {
        path: cli.entry.clone(),
        source,
    })?;
    let project_dir = entry.parent().unwrap_or_else(|| Path::new("."));

    let mut config = Config::load(project_dir, cli.config.as_deref())?;
    config.apply(ConfigLayer {
        src: cli.src,
        known_third_party: cli.known_third_party,
        target_version: cli.target_version,
        deduplicate: cli.dedupe.then_some(true),
        share_group_docs: None,
    });
    debug!("Effective configuration: {config:?}");

    let output = Bundler::new(config.to_bundle_options()?).bundle(&entry)?;

    match cli.output {
        Some(path) => fs::write(&path, &output.code)
            .with_context(|| format!("Failed to write bundle to {}", path.display()))?,
        None => io::stdout()
            .lock()
            .write_all(output.code.as_bytes())
            .context("Failed to write bundle to stdout")?,
    }
    Ok(())
}
