use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub dump: DumpConfig,
    #[serde(default)]
    pub marshaller: MarshallerConfig,
}

// Dump engine configuration.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct DumpConfig {
    // Directory holding one subdirectory per dump.
    root_dir: Option<PathBuf>,
    // Worker pool size for create, read and check.
    thread_count: Option<usize>,
    // Compress new dumps unless the request says otherwise.
    compress: Option<bool>,
}

impl DumpConfig {
    const DEFAULT_ROOT_DIR: &'static str = "./dumps";

    pub fn set_root_dir(&mut self, val: &mut Option<PathBuf>) {
        if let Some(val) = val.take() {
            self.root_dir = Some(val)
        }
    }
    pub fn set_thread_count(&mut self, val: Option<usize>) {
        if let Some(val) = val {
            self.thread_count = Some(std::cmp::max(val, 1));
        }
    }
    pub fn set_compress(&mut self, val: Option<bool>) {
        if let Some(val) = val {
            self.compress = Some(val)
        }
    }
    pub(crate) fn override_merge(&mut self, other: &mut DumpConfig) {
        self.set_root_dir(&mut other.root_dir);
        self.set_thread_count(other.thread_count);
        self.set_compress(other.compress);
    }

    pub fn root_dir(&self) -> &Path {
        self.root_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(DumpConfig::DEFAULT_ROOT_DIR))
    }

    pub fn thread_count(&self) -> usize {
        match self.thread_count {
            Some(val) => val,
            None => num_cpus::get(),
        }
    }

    pub fn compress(&self) -> bool {
        self.compress.unwrap_or(false)
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct MarshallerConfig {
    // Node work directory, the registry lives in <work_dir>/db/marshaller.
    work_dir: Option<PathBuf>,
}

impl MarshallerConfig {
    pub fn set_work_dir(&mut self, val: &mut Option<PathBuf>) {
        if let Some(val) = val.take() {
            self.work_dir = Some(val)
        }
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_yaml() {
        let yaml = r#"
dump:
  root_dir: /var/dumps
  thread_count: 0
marshaller:
  work_dir: /var/work
"#;
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.dump.root_dir(), Path::new("/var/dumps"));
        assert!(!config.dump.compress());
        assert_eq!(config.marshaller.work_dir(), Some(Path::new("/var/work")));

        // Raw values are taken as is, setters clamp.
        config.dump.set_thread_count(Some(0));
        assert_eq!(config.dump.thread_count(), 1);
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.dump.root_dir(), Path::new("./dumps"));
        assert!(config.dump.thread_count() >= 1);
        assert_eq!(config.marshaller.work_dir(), None);
    }

    #[test]
    fn override_merge() {
        let mut config = DumpConfig::default();
        config.set_compress(Some(true));
        config.set_thread_count(Some(8));

        let mut flags = DumpConfig::default();
        flags.set_root_dir(&mut Some(PathBuf::from("/tmp/dumps")));
        flags.set_thread_count(Some(2));

        config.override_merge(&mut flags);
        assert_eq!(config.root_dir(), Path::new("/tmp/dumps"));
        assert_eq!(config.thread_count(), 2);
        assert!(config.compress());
    }
}
