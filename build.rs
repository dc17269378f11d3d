//! Renders the manual page from the CLI definition at build time.

use std::io::{Error, ErrorKind};
use std::path::Path;

use clap::CommandFactory;

#[path = "src/cli/mod.rs"]
mod cli;

fn main() -> std::io::Result<()> {
    let out_dir = std::env::var_os("OUT_DIR")
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "OUT_DIR not set"))?;
    let man = clap_mangen::Man::new(cli::Cli::command());
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    std::fs::write(Path::new(&out_dir).join("hangar.1"), buffer)
}
