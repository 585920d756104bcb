use clap::Args;

use crate::cli::Outcome;
use crate::config::Initializer;
use crate::Result;

/// Discard interrupted dumps
#[derive(Args, Debug)]
pub struct RecoverCommand {}

impl RecoverCommand {
    pub async fn run(self, initializer: Initializer) -> Result<Outcome> {
        let report = initializer.init_dir().await?;

        for dir in report.discarded.iter() {
            println!("discarded {}", dir.display());
        }
        for dir in report.removed_dumps.iter() {
            println!("removed {}", dir.display());
        }
        Ok(Outcome::Success)
    }
}
