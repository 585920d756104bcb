use std::io::Write;

use chrono::{TimeZone, Utc};
use clap::Args;
use serde_json::json;

use crate::cli::Outcome;
use crate::config::Initializer;
use crate::core::{Dump, DumpEntry};
use crate::marshaller::ObjectRenderer;
use crate::Result;

/// Print dump entries, one json object per line
#[derive(Args, Debug)]
pub struct PrintCommand {
    /// Dump name
    #[arg()]
    name: String,
    /// Only entries of this node
    #[arg(long)]
    node: Option<String>,
    /// Only entries of this cache group
    #[arg(long)]
    group: Option<String>,
    /// Only entries of this partition
    #[arg(long)]
    partition: Option<u32>,
}

impl PrintCommand {
    pub async fn run(self, initializer: Initializer) -> Result<Outcome> {
        let dump = Dump::open(initializer.dump_dir(&self.name))?;

        tracing::debug!("Print {}", dump.path().display());

        tokio::task::spawn_blocking(move || self.print(&dump)).await??;
        Ok(Outcome::Success)
    }

    fn print(&self, dump: &Dump) -> Result<()> {
        let registry = dump.type_registry();
        let renderer = ObjectRenderer::new(registry.as_ref());

        let stdout = std::io::stdout();
        let mut out = stdout.lock();

        for node in dump.nodes_directories() {
            if self.node.as_ref().map_or(false, |n| n != node) {
                continue;
            }
            for config in dump.cache_configs(node) {
                if self.group.as_ref().map_or(false, |g| g != &config.name) {
                    continue;
                }
                for partition in dump.partitions(node, config.cache_id())? {
                    if self.partition.map_or(false, |p| p != partition) {
                        continue;
                    }
                    for entry in dump.iterator(node, config.cache_id(), partition)? {
                        let v = render(&renderer, node, &config.name, &entry?)?;
                        serde_json::to_writer(&mut out, &v)?;
                        writeln!(out)?;
                    }
                }
            }
        }
        out.flush()?;
        Ok(())
    }
}

fn render(
    renderer: &ObjectRenderer,
    node: &str,
    group: &str,
    entry: &DumpEntry,
) -> Result<serde_json::Value> {
    let value = match &entry.value {
        Some(value) => renderer.render(value)?,
        None => serde_json::Value::Null,
    };
    let expire_time = entry.expire_time.and_then(|millis| {
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(|t| t.to_rfc3339())
    });

    Ok(json!({
        "node": node,
        "group": group,
        "partition": entry.partition,
        "key": renderer.render(&entry.key)?,
        "value": value,
        "version": entry.version,
        "conflict_version": entry.conflict_version,
        "expire_time": expire_time,
    }))
}
