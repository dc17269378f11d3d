//! Command-line interface definition.
//!
//! Kept free of crate-internal imports so the build script can include it
//! when rendering the manual page.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Lifecycle controller for a fleet of elastic build agents.
#[derive(Debug, Parser)]
#[command(name = "hangar", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run maintenance passes on an interval until interrupted.
    Run {
        /// Path to the cluster profile JSON document.
        #[arg(long, env = "HANGAR_PROFILE")]
        profile: Utf8PathBuf,
    },
    /// Run a single maintenance pass and exit.
    Tick {
        /// Path to the cluster profile JSON document.
        #[arg(long, env = "HANGAR_PROFILE")]
        profile: Utf8PathBuf,
    },
    /// Validate configuration and the profile document, then exit.
    Check {
        /// Path to the cluster profile JSON document.
        #[arg(long, env = "HANGAR_PROFILE")]
        profile: Utf8PathBuf,
    },
}
