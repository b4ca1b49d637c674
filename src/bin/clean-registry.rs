use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Parser;

use rustix::fs::CWD;

use clean_registry::{
    cleaner::Cleaner, docker::DockerControl, prune::CleanupOptions, store::RegistryStore,
};

/// Clean the filesystem storage of a Docker registry container.
///
/// Stale tag index entries and manifest revisions no tag references are
/// deleted, then the registry's own garbage collector reclaims the blobs.
/// The container is stopped for the duration of the cleanup and restarted
/// afterwards.
#[derive(Debug, Parser)]
#[clap(name = "clean-registry", version)]
pub struct App {
    /// Remove the given repositories or tags entirely, rather than
    /// pruning unreferenced data from them.
    #[clap(short = 'x', long)]
    remove: bool,

    /// Suppress progress output for deleted directories.
    #[clap(short, long)]
    quiet: bool,

    /// Name or id of the registry container.
    container: String,

    /// Repositories or tags to clean, as REPOSITORY[:TAG]. All
    /// repositories when omitted.
    #[clap(value_name = "IMAGE")]
    images: Vec<String>,
}

fn run(args: &App) -> Result<bool> {
    if args.remove && args.images.is_empty() {
        bail!("removal requires at least one repository or tag");
    }

    let opts = CleanupOptions {
        quiet: args.quiet,
        remove: args.remove,
    };
    let control = DockerControl::connect(&args.container, &opts)?;
    let store = RegistryStore::open_path(CWD, control.store_root())?;

    Cleaner::new(store, control, opts).run(&args.images)
}

fn main() -> ExitCode {
    env_logger::init();

    let args = App::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
