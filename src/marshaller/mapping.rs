use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::common::{debug, Error, ErrorKind, Result};
use crate::core::files;
use crate::core::lock::StripedLock;
use crate::error::IoContext;

pub const MAPPING_FILE_EXTENSION: &str = ".classname";

// Platform of types registered by the grid itself.
pub const PLATFORM_DEFAULT: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    pub platform_id: u8,
    pub type_id: i32,
    pub type_name: String,
}

/// File backed registry of type id to type name mappings.
///
/// One file per mapping named `<typeId>.classname<platformId>` containing the UTF-8 type name.
#[derive(Debug, Clone)]
pub struct MappingFileStore {
    mapping_dir: PathBuf,
    locks: Arc<StripedLock>,
}

impl MappingFileStore {
    pub const LEGACY_DIR: &'static str = "marshaller";

    /// Open the registry under `<work_dir>/db/marshaller`, moving a legacy `<work_dir>/marshaller` first.
    pub fn with_work_dir(work_dir: impl AsRef<Path>) -> Result<Self> {
        let work_dir = work_dir.as_ref();
        let mapping_dir = work_dir
            .join(crate::core::layout::filepath::DB_DEFAULT_FOLDER)
            .join(crate::core::layout::filepath::MARSHALLER_DIR);

        files::migrate_dir(&work_dir.join(MappingFileStore::LEGACY_DIR), &mapping_dir)?;

        MappingFileStore::new(mapping_dir)
    }

    pub fn new(mapping_dir: impl Into<PathBuf>) -> Result<Self> {
        let mapping_dir = mapping_dir.into();
        fs::create_dir_all(&mapping_dir).with_path(&mapping_dir)?;
        Ok(MappingFileStore::open(mapping_dir))
    }

    // Does not touch the file system.
    pub(crate) fn open(mapping_dir: PathBuf) -> Self {
        Self {
            mapping_dir,
            locks: Arc::new(StripedLock::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.mapping_dir
    }

    pub fn write_mapping(&self, platform_id: u8, type_id: i32, type_name: &str) -> Result<()> {
        let file_name = mapping_file_name(platform_id, type_id);
        let _guard = self.locks.lock(&file_name);

        self.write_file_locked(&file_name, type_name)?;

        debug!(
            "Write mapping [platformId={}, typeId={}, typeName={}]",
            platform_id, type_id, type_name
        );
        Ok(())
    }

    pub fn read_mapping(&self, platform_id: u8, type_id: i32) -> Result<Option<String>> {
        self.read_file(&mapping_file_name(platform_id, type_id))
    }

    /// Type name for a type id, failing when nothing is registered.
    pub fn type_name(&self, platform_id: u8, type_id: i32) -> Result<String> {
        self.read_mapping(platform_id, type_id)?.ok_or_else(|| {
            Error::from(ErrorKind::UnknownType {
                platform_id,
                type_id,
            })
        })
    }

    /// Write the mapping unless the same one is already stored.
    /// A different name stored under the same id is a conflict.
    pub fn merge_and_write_mapping(
        &self,
        platform_id: u8,
        type_id: i32,
        type_name: &str,
    ) -> Result<()> {
        let file_name = mapping_file_name(platform_id, type_id);
        // Read and write under one guard.
        let _guard = self.locks.lock(&file_name);

        match self.read_file_locked(&file_name)? {
            Some(existing) if existing == type_name => Ok(()),
            Some(existing) => Err(ErrorKind::MappingConflict {
                platform_id,
                type_id,
                existing,
                new: type_name.to_owned(),
            }
            .into()),
            None => {
                self.write_file_locked(&file_name, type_name)?;
                debug!(
                    "Merged mapping [platformId={}, typeId={}, typeName={}]",
                    platform_id, type_id, type_name
                );
                Ok(())
            }
        }
    }

    /// Every mapping on disk. Meant for startup.
    pub fn restore_mappings(&self) -> Result<Vec<TypeMapping>> {
        let mut mappings = Vec::new();

        for entry in fs::read_dir(&self.mapping_dir).with_path(&self.mapping_dir)? {
            let entry = entry.with_path(&self.mapping_dir)?;
            let file_name = entry.file_name();
            let file_name = match file_name.to_str() {
                Some(name) => name,
                None => continue,
            };
            let (platform_id, type_id) = match parse_mapping_file_name(file_name) {
                Some(ids) => ids,
                None => continue,
            };

            match self.read_file(file_name)? {
                Some(type_name) if !type_name.is_empty() => mappings.push(TypeMapping {
                    platform_id,
                    type_id,
                    type_name,
                }),
                _ => {
                    return Err(Error::corrupted(
                        0,
                        format!(
                            "type name is empty for [platformId={}, typeId={}], \
                             mapping storage is broken. Clean up {} and restart the node",
                            platform_id,
                            type_id,
                            self.mapping_dir.display()
                        ),
                    )
                    .located(&entry.path(), 0))
                }
            }
        }

        mappings.sort_by_key(|m| (m.platform_id, m.type_id));
        Ok(mappings)
    }

    /// Copy every mapping file into dst.
    pub fn copy_to(&self, dst: &Path) -> Result<u64> {
        files::copy_dir(&self.mapping_dir, dst)
    }

    fn read_file(&self, file_name: &str) -> Result<Option<String>> {
        let _guard = self.locks.lock(file_name);
        self.read_file_locked(file_name)
    }

    // Callers hold the stripe of file_name.
    fn read_file_locked(&self, file_name: &str) -> Result<Option<String>> {
        let path = self.mapping_dir.join(file_name);
        match fs::read_to_string(&path) {
            Ok(name) => Ok(Some(name)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io_path(path, err)),
        }
    }

    fn write_file_locked(&self, file_name: &str, type_name: &str) -> Result<()> {
        let path = self.mapping_dir.join(file_name);
        let mut f = File::create(&path).with_path(&path)?;
        f.write_all(type_name.as_bytes()).with_path(&path)?;
        f.flush().with_path(&path)?;
        Ok(())
    }
}

pub fn mapping_file_name(platform_id: u8, type_id: i32) -> String {
    format!("{}{}{}", type_id, MAPPING_FILE_EXTENSION, platform_id)
}

pub fn parse_mapping_file_name(name: &str) -> Option<(u8, i32)> {
    let (type_id, platform_id) = name.split_once(MAPPING_FILE_EXTENSION)?;
    Some((platform_id.parse().ok()?, type_id.parse().ok()?))
}
