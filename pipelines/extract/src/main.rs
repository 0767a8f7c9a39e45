//! FLAIR MRI 批量脑提取与验证.

mod config;
mod profile;
mod result;
mod runner;

use anyhow::Context;
use clap::Parser;
use config::{Args, ExtractConfig};
use simple_logger::SimpleLogger;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    SimpleLogger::new()
        .with_level(args.log_level())
        .init()
        .context("cannot initialize logger")?;

    let threads = args.threads.unwrap_or_else(utils::cpus);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("cannot build the global thread pool")?;
    log::debug!("using {threads} threads");

    let cfg = ExtractConfig::from_args(&args)?;
    let report = runner::run(&cfg)?;
    report.print()?;
    Ok(())
}
