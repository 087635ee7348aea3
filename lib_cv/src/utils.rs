use std::ffi::{OsStr, OsString};
use std::path::Path;

use log::debug;
use opencv::core::{FileStorage, FileStorage_Mode};
use opencv::prelude::*;

use crate::error::Result;

/// Opens a FileStorage for reading, `None` if it cannot be opened or parsed.
pub fn open_storage_for_read(path: &Path) -> Option<FileStorage> {
    let path_str = path.to_str()?;
    let storage = FileStorage::new(path_str, FileStorage_Mode::READ as i32, "").ok()?;
    storage.is_opened().ok()?.then_some(storage)
}

/// Runs `write` against a uniquely named sibling of `dst` and renames the
/// result into place, so `dst` is either complete or untouched. The staged
/// name ends with the file name of `dst`, keeping the extension that
/// FileStorage picks its format from.
pub fn write_atomically<F>(dst: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let parent = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut suffix = OsString::from(".");
    suffix.push(dst.file_name().unwrap_or(OsStr::new("output")));

    // Removed on drop unless persisted.
    let staged = tempfile::Builder::new()
        .prefix(".")
        .suffix(&suffix)
        .tempfile_in(parent)?;
    debug!("Staging output at {}", staged.path().display());

    write(staged.path())?;
    staged.persist(dst).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;
    use std::path::PathBuf;

    fn entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[test]
    fn staged_file_sits_beside_destination_with_its_extension() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("camera.yml");
        let mut seen = None;

        write_atomically(&dst, |staging| {
            seen = Some(staging.to_path_buf());
            Ok(fs::write(staging, "%YAML:1.0\n")?)
        })
        .unwrap();

        let staging = seen.unwrap();
        assert_ne!(staging, dst);
        assert_eq!(staging.parent(), dst.parent());
        assert_eq!(staging.extension().unwrap(), "yml");
    }

    #[test]
    fn concurrent_writers_stage_to_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("poses.csv");
        let mut outer_staging = PathBuf::new();
        let mut inner_staging = PathBuf::new();

        write_atomically(&dst, |outer| {
            outer_staging = outer.to_path_buf();
            fs::write(outer, "t\n0.0\n")?;
            write_atomically(&dst, |inner| {
                inner_staging = inner.to_path_buf();
                Ok(fs::write(inner, "t\n1.0\n")?)
            })
        })
        .unwrap();

        assert_ne!(outer_staging, inner_staging);
        // The last writer to finish owns the destination.
        assert_eq!(fs::read_to_string(&dst).unwrap(), "t\n0.0\n");
        assert_eq!(entries(dir.path()), vec![dst]);
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("poses.csv");

        let result = write_atomically(&dst, |staging| {
            fs::write(staging, "t\n")?;
            Err(Error::Io(std::io::Error::other("interrupted")))
        });

        assert!(result.is_err());
        assert!(!dst.exists());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn successful_write_lands_on_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("poses.csv");

        write_atomically(&dst, |staging| Ok(fs::write(staging, "t\n0.0\n")?)).unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "t\n0.0\n");
        assert_eq!(entries(dir.path()), vec![dst]);
    }
}
