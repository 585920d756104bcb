use std::path::{Path, PathBuf};

// <dumpRoot>/<dumpName>/db/<nodeConsistentId>/cache-<cacheName>/part-<n>.dump[.zip]
pub mod filepath {
    pub const DB_DEFAULT_FOLDER: &str = "db";
    pub const DUMP_LOCK: &str = "dump.lock";
    pub const CACHE_DIR_PREFIX: &str = "cache-";
    pub const PART_FILE_PREFIX: &str = "part-";
    pub const DUMP_FILE_EXT: &str = ".dump";
    pub const ZIP_SUFFIX: &str = ".zip";
    pub const CACHE_DATA_FILENAME: &str = "cache_data.dat";
    pub const MARSHALLER_DIR: &str = "marshaller";
}

use filepath::*;

/// Paths of one named dump.
#[derive(Debug, Clone)]
pub struct DumpLayout {
    dump_dir: PathBuf,
}

impl DumpLayout {
    pub fn new(dump_root: impl AsRef<Path>, name: &str) -> Self {
        Self {
            dump_dir: dump_root.as_ref().join(name),
        }
    }

    pub fn from_dump_dir(dump_dir: impl Into<PathBuf>) -> Self {
        Self {
            dump_dir: dump_dir.into(),
        }
    }

    pub fn dump_dir(&self) -> &Path {
        &self.dump_dir
    }

    pub fn db_dir(&self) -> PathBuf {
        self.dump_dir.join(DB_DEFAULT_FOLDER)
    }

    pub fn marshaller_dir(&self) -> PathBuf {
        self.db_dir().join(MARSHALLER_DIR)
    }

    pub fn node_dir(&self, node: &str) -> PathBuf {
        self.db_dir().join(node)
    }

    pub fn lock_file(&self, node: &str) -> PathBuf {
        self.node_dir(node).join(DUMP_LOCK)
    }

    pub fn cache_dir(&self, node: &str, cache_name: &str) -> PathBuf {
        self.node_dir(node).join(cache_dir_name(cache_name))
    }

    pub fn cache_data_file(&self, node: &str, cache_name: &str) -> PathBuf {
        self.cache_dir(node, cache_name).join(CACHE_DATA_FILENAME)
    }

    pub fn partition_file(
        &self,
        node: &str,
        cache_name: &str,
        partition: u32,
        compress: bool,
    ) -> PathBuf {
        self.cache_dir(node, cache_name)
            .join(partition_file_name(partition, compress))
    }
}

pub fn cache_dir_name(cache_name: &str) -> String {
    format!("{}{}", CACHE_DIR_PREFIX, cache_name)
}

pub fn partition_file_name(partition: u32, compress: bool) -> String {
    format!(
        "{}{}{}{}",
        PART_FILE_PREFIX,
        partition,
        DUMP_FILE_EXT,
        if compress { ZIP_SUFFIX } else { "" }
    )
}

/// Parse `part-<n>.dump[.zip]` into partition id and compression flag.
pub fn parse_partition_file_name(name: &str) -> Option<(u32, bool)> {
    let rest = name.strip_prefix(PART_FILE_PREFIX)?;
    let (rest, compressed) = match rest.strip_suffix(ZIP_SUFFIX) {
        Some(rest) => (rest, true),
        None => (rest, false),
    };
    let partition = rest.strip_suffix(DUMP_FILE_EXT)?;
    partition.parse().ok().map(|p| (p, compressed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_path() {
        let layout = DumpLayout::new("/dumps", "dump0");
        assert_eq!(
            layout.partition_file("node-1", "users", 3, false),
            Path::new("/dumps/dump0/db/node-1/cache-users/part-3.dump")
        );
        assert_eq!(
            layout.partition_file("node-1", "users", 3, true),
            Path::new("/dumps/dump0/db/node-1/cache-users/part-3.dump.zip")
        );
        assert_eq!(
            layout.lock_file("node-1"),
            Path::new("/dumps/dump0/db/node-1/dump.lock")
        );
    }

    #[test]
    fn parse_file_name() {
        assert_eq!(parse_partition_file_name("part-12.dump"), Some((12, false)));
        assert_eq!(parse_partition_file_name("part-0.dump.zip"), Some((0, true)));
        assert_eq!(parse_partition_file_name("cache_data.dat"), None);
        assert_eq!(parse_partition_file_name("part-x.dump"), None);
    }
}
