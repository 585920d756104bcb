use std::path::{Path, PathBuf};

use tokio::fs;

use crate::common::{info, Result};
use crate::config::Config;
use crate::core::{self, Checker, Orchestrator, RecoveryReport};
use crate::error::IoContext;
use crate::marshaller::MappingFileStore;

/// Prepares the node side of the dump engine.
#[derive(Debug, Default)]
pub struct Initializer {
    pub config: Config,
}

impl Initializer {
    pub async fn load_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = fs::File::open(path).await.with_path(path)?;
        let config = serde_yaml::from_reader::<_, Config>(f.into_std().await)?;

        Ok(Self { config })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn set_root_dir(&mut self, root_dir: impl Into<PathBuf>) {
        self.config.dump.set_root_dir(&mut Some(root_dir.into()));
    }

    pub fn dump_dir(&self, name: &str) -> PathBuf {
        self.config.dump.root_dir().join(name)
    }

    /// Create the dump root and discard dumps interrupted by a previous crash.
    /// Must complete before the first dump request.
    pub async fn init_dir(&self) -> Result<RecoveryReport> {
        let root_dir = self.config.dump.root_dir().to_path_buf();
        fs::create_dir_all(&root_dir).await.with_path(&root_dir)?;

        let report = tokio::task::spawn_blocking(move || core::recover(&root_dir)).await??;

        info!(
            "Dump root ready [root={}, discarded={}, removed_dumps={}]",
            self.config.dump.root_dir().display(),
            report.discarded.len(),
            report.removed_dumps.len()
        );
        Ok(report)
    }

    /// Type registry of the node, when a work directory is configured.
    pub fn registry(&self) -> Result<Option<MappingFileStore>> {
        self.config
            .marshaller
            .work_dir()
            .map(MappingFileStore::with_work_dir)
            .transpose()
    }

    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let dump = &self.config.dump;
        let mut orchestrator = Orchestrator::new(dump.root_dir(), dump.thread_count())
            .with_compression(dump.compress());
        if let Some(registry) = self.registry()? {
            orchestrator = orchestrator.with_registry(registry);
        }
        Ok(orchestrator)
    }

    pub fn checker(&self) -> Checker {
        Checker::new(self.config.dump.thread_count())
    }
}
