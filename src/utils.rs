use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;

/// Opens a file for reading, refusing symlinks unless `follow_symlinks` is set.
pub fn safe_open_file(path: &Path, follow_symlinks: bool) -> Result<File> {
    reject_symlink(path, follow_symlinks)?;
    Ok(File::open(path)?)
}

/// Creates (or truncates) a file for writing, creating missing parent
/// directories. Refuses to write through a symlink unless `follow_symlinks` is set.
pub fn safe_create_file(path: &Path, follow_symlinks: bool) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    reject_symlink(path, follow_symlinks)?;

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    Ok(file)
}

fn reject_symlink(path: &Path, follow_symlinks: bool) -> Result<()> {
    if follow_symlinks {
        return Ok(());
    }
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(Error::Validation(format!(
            "Refusing to follow symlink: {}",
            path.display()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::tempdir;

    #[test]
    fn test_create_file_makes_parent_dirs() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested/deeper/out.json");

        let mut file = safe_create_file(&path, false)?;
        file.write_all(b"{}")?;
        drop(file);

        let mut content = String::new();
        safe_open_file(&path, false)?.read_to_string(&mut content)?;
        assert_eq!(content, "{}");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_rejected() -> Result<()> {
        let dir = tempdir()?;
        let target = dir.path().join("target.txt");
        fs::write(&target, b"data")?;
        let link = dir.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link)?;

        assert!(safe_open_file(&link, false).is_err());
        assert!(safe_open_file(&link, true).is_ok());
        assert!(safe_create_file(&link, false).is_err());
        Ok(())
    }
}
