use clap::Args;

use crate::cli::Outcome;
use crate::config::Initializer;
use crate::core::{CheckReport, Dump};
use crate::Result;

/// Check a dump
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Dump name
    #[arg()]
    name: String,
}

impl CheckCommand {
    pub async fn run(self, initializer: Initializer) -> Result<Outcome> {
        let dump = Dump::open(initializer.dump_dir(&self.name))?;
        let report = initializer.checker().check(dump).await?;

        Ok(print_report(&report))
    }
}

pub(super) fn print_report(report: &CheckReport) -> Outcome {
    print!("{}", report);

    if report.is_clean() {
        Outcome::Success
    } else {
        Outcome::ConflictsFound
    }
}
