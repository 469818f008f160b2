use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write a file only if it does not already exist. Returns true if written.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}

/// Append every entry of `entries` missing from `root/.gitignore`, creating
/// the file when needed. Matching is by exact line.
pub fn ensure_gitignore_entries(root: &Path, entries: &[&str]) -> Result<()> {
    let gitignore = root.join(".gitignore");
    let existing = match std::fs::read_to_string(&gitignore) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let missing: Vec<&str> = entries
        .iter()
        .copied()
        .filter(|entry| !existing.lines().any(|l| l == *entry))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&gitignore)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        writeln!(f)?;
    }
    for entry in missing {
        writeln!(f, "{entry}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".stylist/config.yml");
        atomic_write(&path, b"stylist: {}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "stylist: {}");
    }

    #[test]
    fn write_if_missing_skips_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Dockerfile");
        std::fs::write(&path, b"FROM scratch").unwrap();
        assert!(!write_if_missing(&path, b"FROM alpine").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "FROM scratch");
    }

    #[test]
    fn gitignore_entries_are_added_once() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target\nterraform/.tfupdate").unwrap();
        let entries = [".stylist/environment", "terraform/.tfupdate"];
        ensure_gitignore_entries(dir.path(), &entries).unwrap();
        ensure_gitignore_entries(dir.path(), &entries).unwrap();
        let content = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content, "target\nterraform/.tfupdate\n.stylist/environment\n");
    }
}
