// src/tagboy.rs
//
// tagboy: find image files, select them on their EXIF/IPTC/XMP tags, then
// print, list, echo, execute or symlink.

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufWriter};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod geodesy;
mod glob;
mod keymap;
mod metadata;
mod output;
mod predicate;
mod script;
mod tag_store;
mod template;
#[cfg(test)]
mod test_support;

use config::{Cli, FileConfig, Options};
use engine::TagBoy;

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

/// Ok(true) when at least one file matched.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let opts = Options::from_cli(cli, file)?;
    debug!("Options: {:?}", opts);

    let stdout = io::stdout();
    let mut tagboy = TagBoy::new(opts, BufWriter::new(stdout.lock()));

    let flag = tagboy.interrupt_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Unable to install Ctrl-C handler: {}", e);
    }

    tagboy.run().context("Unable to write output")
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.paths.is_empty() {
        eprintln!("No arguments.  Nothing to do.  Use -h for help.");
        return ExitCode::from(2);
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}
