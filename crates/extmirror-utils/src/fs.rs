use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use tempfile::NamedTempFile;

use crate::error::{FileSystemError, FileSystemResult};

/// Creates a directory structure if it doesn't exist.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Writes a file atomically.
///
/// The closure writes into a temporary file created next to `path`; the file
/// is renamed into place only after the closure returns `Ok` and the data has
/// been flushed. On any error the temporary file is removed and `path` is left
/// untouched.
///
/// # Example
///
/// ```no_run
/// use std::io::Write;
/// use extmirror_utils::fs::write_atomic;
///
/// write_atomic("/tmp/state.json", |w| w.write_all(b"{}")).unwrap();
/// ```
pub fn write_atomic<P, F>(path: P, write: F) -> FileSystemResult<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let path = path.as_ref();
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_dir_exists(parent)?;

    let file_err = |action, source| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action,
            source,
        }
    };

    let tmp = NamedTempFile::new_in(parent).map_err(|err| file_err("create", err))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write(&mut writer).map_err(|err| file_err("write", err))?;
        writer.flush().map_err(|err| file_err("flush", err))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|err| file_err("sync", err))?;
    tmp.persist(path)
        .map_err(|err| file_err("persist", err.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_ensure_dir_exists() {
        let dir = tempdir().unwrap();
        let new_dir = dir.path().join("a/b/c");
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.is_dir());

        // idempotent
        ensure_dir_exists(&new_dir).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists_file_collision() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("file.txt");
        fs::write(&file_path, "hello").unwrap();
        assert!(matches!(
            ensure_dir_exists(&file_path),
            Err(FileSystemError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/state.bin");

        write_atomic(&target, |w| w.write_all(b"first")).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"first");

        write_atomic(&target, |w| w.write_all(b"second")).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }

    #[test]
    fn test_write_atomic_failure_keeps_original() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("state.bin");
        fs::write(&target, b"original").unwrap();

        let result = write_atomic(&target, |w| {
            w.write_all(b"partial")?;
            Err(io::Error::other("interrupted"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read(&target).unwrap(), b"original");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
