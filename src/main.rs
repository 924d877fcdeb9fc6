//! Post-process python source distributions to make their Rust extensions optional.
//! This file contains the CLI.
//!
//! Run with --help for usage information

use anyhow::{Result, bail};
use clap::Parser;
use postprocess_sdist::{PostprocessOptions, postprocess_sdists};
use std::io;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, name = env!("CARGO_PKG_NAME"))]
/// Post-process python source distributions to make their Rust extensions optional
struct Opt {
    /// Path(s) of sdist .tar.gz archive(s) to post-process
    #[arg(required = true, value_name = "SDIST")]
    sdist_paths: Vec<PathBuf>,
    #[command(flatten)]
    options: PostprocessOptions,
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let opt = Opt::parse();
    debug!("{opt:?}");

    let total = opt.sdist_paths.len();
    let report = postprocess_sdists(&opt.sdist_paths, &opt.options);
    for (_, output) in &report.written {
        eprintln!("📦 Wrote post-processed source distribution to {}", output.display());
    }
    if report.is_success() {
        return Ok(());
    }

    let failed = report.failed.len();
    for (sdist_path, err) in report.failed {
        eprintln!("💥 Failed to post-process {}", sdist_path.display());
        for cause in anyhow::Error::new(err).chain() {
            eprintln!("  Caused by: {cause}");
        }
    }
    bail!("{failed} of {total} source distribution(s) could not be post-processed")
}

fn main() {
    if let Err(e) = run() {
        eprintln!("💥 postprocess-sdist failed");
        for cause in e.chain() {
            eprintln!("  Caused by: {cause}");
        }
        std::process::exit(1);
    }
}
