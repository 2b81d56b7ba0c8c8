//! Artifact packaging
//!
//! Builds the zip archive for `artifacts`/`serverless` runnables. Directories
//! and any name beginning with `.` are skipped, matching what the archive
//! consumers expect.

use anyhow::{Context, Result};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Archive `source_dir` into a zip file at `zip_path`.
pub fn create_zip_archive(source_dir: &Path, zip_path: &Path) -> Result<()> {
    let file = fs::File::create(zip_path)
        .with_context(|| format!("failed to create archive {}", zip_path.display()))?;
    let mut archive = ZipWriter::new(file);

    add_dir(&mut archive, source_dir, source_dir)?;

    archive.finish().context("failed to finalize archive")?;
    Ok(())
}

fn add_dir(
    archive: &mut ZipWriter<fs::File>,
    root: &Path,
    dir: &Path,
) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }

        if path.is_dir() {
            add_dir(archive, root, &path)?;
            continue;
        }

        let rel = path
            .strip_prefix(root)
            .context("archive entry escapes source directory")?;
        archive.start_file(rel.to_string_lossy().into_owned(), SimpleFileOptions::default())?;

        let mut contents = Vec::new();
        fs::File::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?
            .read_to_end(&mut contents)?;
        archive.write_all(&contents)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn entry_names(zip_path: &Path) -> Vec<String> {
        let file = fs::File::open(zip_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_archives_files_recursively() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub/b.txt"), "beta").unwrap();

        let out = TempDir::new().unwrap();
        let zip_path = out.path().join("out.zip");
        create_zip_archive(src.path(), &zip_path).unwrap();

        assert_eq!(entry_names(&zip_path), vec!["a.txt", "sub/b.txt"]);
    }

    #[test]
    fn test_skips_hidden_names() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("kept.txt"), "x").unwrap();
        fs::write(src.path().join(".hidden"), "y").unwrap();
        fs::create_dir(src.path().join(".git")).unwrap();
        fs::write(src.path().join(".git/config"), "z").unwrap();

        let out = TempDir::new().unwrap();
        let zip_path = out.path().join("out.zip");
        create_zip_archive(src.path(), &zip_path).unwrap();

        assert_eq!(entry_names(&zip_path), vec!["kept.txt"]);
    }

    #[test]
    fn test_content_preserved() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("data.bin"), b"\x00\x01binary").unwrap();

        let out = TempDir::new().unwrap();
        let zip_path = out.path().join("out.zip");
        create_zip_archive(src.path(), &zip_path).unwrap();

        let file = fs::File::open(&zip_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name("data.bin").unwrap();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"\x00\x01binary");
    }
}
