use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::common::{info, Result};
use crate::error::IoContext;

pub const TMP_SUFFIX: &str = ".tmp";

/// Recursively copy src into dst, overwriting files that already exist.
/// Return number of copied files.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<u64> {
    fs::create_dir_all(dst).with_path(dst)?;

    let mut copied = 0;
    for entry in fs::read_dir(src).with_path(src)? {
        let entry = entry.with_path(src)?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if entry.file_type().with_path(&from)?.is_dir() {
            copied += copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to).with_path(&from)?;
            copied += 1;
        }
    }
    Ok(copied)
}

pub fn remove_dir_if_exists(dir: &Path) -> Result<bool> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(crate::Error::io_path(dir, err)),
    }
}

pub fn tmp_path(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_owned();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Move legacy into target in three steps: copy, rename legacy to `<legacy>.tmp`, delete the tmp.
///
/// A crash after the rename leaves only the tmp remnant, which the next call removes
/// before anything else. The legacy location never holds a half deleted tree.
/// Return whether a migration happened.
pub fn migrate_dir(legacy: &Path, target: &Path) -> Result<bool> {
    let remnant = tmp_path(legacy);
    if remove_dir_if_exists(&remnant)? {
        info!("Removed leftover of interrupted migration {}", remnant.display());
    }

    if !legacy.exists() {
        return Ok(false);
    }

    let copied = copy_dir(legacy, target)?;
    fs::rename(legacy, &remnant).with_path(legacy)?;
    remove_dir_if_exists(&remnant)?;

    info!(
        "Migrated {} files from {} to {}",
        copied,
        legacy.display(),
        target.display()
    );

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate() {
        let work = tempfile::tempdir().unwrap();
        let legacy = work.path().join("marshaller");
        let target = work.path().join("db").join("marshaller");

        fs::create_dir_all(&legacy).unwrap();
        fs::write(legacy.join("1.classname0"), "a.B").unwrap();

        assert!(migrate_dir(&legacy, &target).unwrap());
        assert!(!legacy.exists());
        assert!(!tmp_path(&legacy).exists());
        assert_eq!(fs::read_to_string(target.join("1.classname0")).unwrap(), "a.B");

        assert!(!migrate_dir(&legacy, &target).unwrap());
    }

    #[test]
    fn remnant_removed() {
        let work = tempfile::tempdir().unwrap();
        let legacy = work.path().join("marshaller");
        let remnant = tmp_path(&legacy);
        let target = work.path().join("db").join("marshaller");

        fs::create_dir_all(&remnant).unwrap();
        fs::write(remnant.join("1.classname0"), "stale").unwrap();

        assert!(!migrate_dir(&legacy, &target).unwrap());
        assert!(!remnant.exists());
        assert!(!target.exists());
    }

    #[test]
    fn tmp_suffix() {
        assert_eq!(
            tmp_path(Path::new("/work/marshaller")),
            Path::new("/work/marshaller.tmp")
        );
    }
}
