use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::{info, warn, Result};
use crate::core::layout::{filepath, DumpLayout};
use crate::core::files;
use crate::error::IoContext;

/// Directories removed by [`recover`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Locked node directories.
    pub discarded: Vec<PathBuf>,
    /// Dump directories left without any node directory.
    pub removed_dumps: Vec<PathBuf>,
}

/// Remove every node directory of every dump under dump_root that still holds a lock marker.
///
/// Must run before the first dump request is served. A missing root is not an error.
pub fn recover(dump_root: &Path) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    if !dump_root.is_dir() {
        return Ok(report);
    }

    for dump in sorted_dirs(dump_root)? {
        let layout = DumpLayout::from_dump_dir(dump);
        let db_dir = layout.db_dir();
        if !db_dir.is_dir() {
            continue;
        }

        let mut discarded = 0;
        for node_dir in sorted_dirs(&db_dir)? {
            if !node_dir.join(filepath::DUMP_LOCK).exists() {
                continue;
            }

            warn!(
                "Found locked dump dir. This means, dump creation not finished prior to node fail. \
                 Directory will be deleted: {}",
                node_dir.display()
            );
            files::remove_dir_if_exists(&node_dir)?;
            report.discarded.push(node_dir);
            discarded += 1;
        }

        if discarded > 0 && !has_node_dirs(&db_dir)? {
            let dump_dir = layout.dump_dir().to_path_buf();
            warn!(
                "No node left in discarded dump. Directory will be deleted: {}",
                dump_dir.display()
            );
            files::remove_dir_if_exists(&dump_dir)?;
            report.removed_dumps.push(dump_dir);
        }
    }

    if !report.discarded.is_empty() {
        info!(
            "Crash recovery finished [root={}, discarded={}]",
            dump_root.display(),
            report.discarded.len()
        );
    }
    Ok(report)
}

fn has_node_dirs(db_dir: &Path) -> Result<bool> {
    Ok(sorted_dirs(db_dir)?.iter().any(|dir| {
        dir.file_name()
            .map_or(false, |name| name != OsStr::new(filepath::MARSHALLER_DIR))
    }))
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        if entry.file_type().with_path(entry.path())?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
