use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::cli::{check, compare, print, recover};
use crate::common::debug;
use crate::config::{DumpConfig, Initializer};
use crate::Result;

/// Gridump command
#[derive(Parser, Debug)]
#[command(version, propagate_version = true, subcommand_required = true)]
pub struct GridumpCommand {
    /// Global options
    #[command(flatten)]
    pub options: GlobalOptions,
    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Global options
#[derive(Args, Debug)]
pub struct GlobalOptions {
    /// Configuration file path
    #[arg(long, short = 'C', env = "GRIDUMP_CONFIG_PATH", global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding the dumps
    #[arg(long, env = "GRIDUMP_ROOT_DIR", global = true)]
    pub root_dir: Option<PathBuf>,
    /// Worker threads for reading dumps
    #[arg(long, global = true)]
    pub thread_count: Option<usize>,
}

impl GlobalOptions {
    pub(crate) async fn initializer(self) -> Result<Initializer> {
        let GlobalOptions {
            config,
            mut root_dir,
            thread_count,
        } = self;

        let mut initializer = match config {
            Some(path) => Initializer::load_config_file(path).await?,
            None => Initializer::default(),
        };

        let mut flags = {
            let mut flags = DumpConfig::default();
            flags.set_root_dir(&mut root_dir);
            flags.set_thread_count(thread_count);
            flags
        };
        initializer.config.dump.override_merge(&mut flags);

        debug!("{:?}", initializer);

        Ok(initializer)
    }
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that every copy of each partition in a dump holds the same data
    Check(check::CheckCommand),
    /// Compare two dumps partition by partition
    Compare(compare::CompareCommand),
    /// Print the entries of a dump as json
    Print(print::PrintCommand),
    /// Discard dumps left locked by an interrupted creation
    Recover(recover::RecoverCommand),
}

/// How a successful command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ConflictsFound,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::ConflictsFound => 1,
        }
    }
}

impl GridumpCommand {
    pub async fn run(self) -> Result<Outcome> {
        let GridumpCommand { options, command } = self;
        let initializer = options.initializer().await?;

        match command {
            Command::Check(cmd) => cmd.run(initializer).await,
            Command::Compare(cmd) => cmd.run(initializer).await,
            Command::Print(cmd) => cmd.run(initializer).await,
            Command::Recover(cmd) => cmd.run(initializer).await,
        }
    }
}

/// Parse command line args
pub fn parse() -> GridumpCommand {
    GridumpCommand::parse()
}
