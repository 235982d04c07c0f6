use std::io::{self, Write as _};
use std::path::Path;

use tempfile::NamedTempFile;

/// Replace `path` with `contents` so that readers see either the old or the
/// new file, never a truncated one.
///
/// The temporary file is created next to the target, as `rename` does not
/// work across filesystems.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        // no temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn fails_when_directory_is_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("state.json");

        assert!(write_atomic(&path, b"data").is_err());
    }
}
