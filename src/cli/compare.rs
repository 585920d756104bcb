use clap::Args;

use crate::cli::{check::print_report, Outcome};
use crate::config::Initializer;
use crate::core::Dump;
use crate::Result;

/// Compare two dumps
#[derive(Args, Debug)]
pub struct CompareCommand {
    /// Dump name
    #[arg()]
    name: String,
    /// Name of the dump to compare with
    #[arg()]
    other: String,
}

impl CompareCommand {
    pub async fn run(self, initializer: Initializer) -> Result<Outcome> {
        let CompareCommand { name, other } = self;

        let dump = Dump::open(initializer.dump_dir(&name))?;
        let other = Dump::open(initializer.dump_dir(&other))?;
        let report = initializer.checker().compare(dump, other).await?;

        Ok(print_report(&report))
    }
}
