mod archive;
mod catalog;
mod cfg_file;
mod cli;
mod log;
mod reconcile;
mod settings;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
