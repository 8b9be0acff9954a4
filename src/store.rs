use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

/// Makes a single path segment safe for use as a file or directory name.
/// Whitespace becomes `_`; anything outside `[A-Za-z0-9_.-]` is dropped.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        return String::new();
    }
    cleaned
}

/// Writes through a temp file in the destination directory, then renames into place,
/// so a failed write never leaves a truncated file at `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Copies `src` to `dest` unless `dest` already exists. Returns whether a copy happened.
pub fn copy_if_missing(src: &Path, dest: &Path) -> std::io::Result<bool> {
    if dest.exists() {
        return Ok(false);
    }
    let bytes = fs::read(src)?;
    write_atomic(dest, &bytes)?;
    Ok(true)
}

pub fn list_files_recursively_sorted(dir: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current)
            .with_context(|| format!("read dir: {}", current.display()))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("list dir: {}", current.display()))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type().context("read entry type")?;
            if file_type.is_dir() {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                stack.push(path);
                continue;
            }
            if file_type.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension)
            {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_segment_keeps_word_characters() {
        assert_eq!(sanitize_segment(" two sum "), "two_sum");
        assert_eq!(sanitize_segment("arrays/../x"), "arrays..x");
        assert_eq!(sanitize_segment("c++-basics"), "c-basics");
        assert_eq!(sanitize_segment(".."), "");
        assert_eq!(sanitize_segment(""), "");
    }

    #[test]
    fn write_atomic_creates_parents_and_overwrites() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("a").join("b").join("page.html");

        write_atomic(&path, b"first")?;
        write_atomic(&path, b"second")?;

        assert_eq!(fs::read_to_string(&path)?, "second");
        let leftovers = fs::read_dir(path.parent().unwrap())?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }

    #[test]
    fn listing_skips_hidden_dirs_and_other_extensions() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let root = temp.path();
        write_atomic(&root.join("b").join("two.json"), b"{}")?;
        write_atomic(&root.join("a").join("one.json"), b"{}")?;
        write_atomic(&root.join("a").join("notes.txt"), b"")?;
        write_atomic(&root.join(".asset_cache").join("index.json"), b"{}")?;

        let files = list_files_recursively_sorted(root, "json")?;
        let rel = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect::<Vec<_>>();
        assert_eq!(rel, vec!["a/one.json", "b/two.json"]);
        Ok(())
    }
}
