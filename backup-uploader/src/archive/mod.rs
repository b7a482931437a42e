//! Archive construction.
//!
//! Packs the collected files into a single zip container on local storage.
//! Individual files that cannot be added are recorded, not fatal; only an
//! archive with no file at all is an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Compression method for archive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    #[default]
    Deflate,
    Zstd,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflate => CompressionMethod::Deflated,
            Compression::Zstd => CompressionMethod::Zstd,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    pub compression: Compression,
    /// Compression level, method specific (None = method default)
    pub level: Option<i64>,
}

/// A file that could not be added to the archive.
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Per-job outcome of archive construction.
///
/// `succeeded` and `failed` together hold every input path exactly as often
/// as it was supplied.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompressionResult {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
    /// Set when finalizing the container reported an error
    pub close_error: Option<String>,
}

impl CompressionResult {
    pub fn failed_paths(&self) -> impl Iterator<Item = &Path> {
        self.failed.iter().map(|f| f.path.as_path())
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot create archive {}: {source}", .path.display())]
    Create { path: PathBuf, source: io::Error },

    #[error("no file could be added to the archive ({} failed)", .0.failed.len())]
    NothingArchived(CompressionResult),
}

pub struct ArchiveBuilder {
    options: ArchiveOptions,
}

impl ArchiveBuilder {
    pub fn new(options: ArchiveOptions) -> Self {
        Self { options }
    }

    /// Build the archive at `destination` from `files`.
    ///
    /// The archive is left at `destination` on success. When no file could be
    /// added it is removed again and [`BuildError::NothingArchived`] carries
    /// the per-file failures.
    pub fn build(&self, files: &[PathBuf], destination: &Path) -> Result<CompressionResult, BuildError> {
        let file = File::create(destination).map_err(|source| BuildError::Create {
            path: destination.to_path_buf(),
            source,
        })?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let mut result = CompressionResult::default();
        // entry name -> source file it was written from
        let mut added: HashMap<String, PathBuf> = HashMap::new();

        for path in files {
            let name = match entry_name(path) {
                Ok(name) => name,
                Err(e) => {
                    result.failed.push(FailedFile {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let source = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());

            if let Some(existing) = added.get(&name) {
                if *existing == source {
                    result.succeeded.push(path.clone());
                } else {
                    result.failed.push(FailedFile {
                        path: path.clone(),
                        reason: format!("entry {} already holds {}", name, existing.display()),
                    });
                }
                continue;
            }

            match self.add_file(&mut zip, path, &name) {
                Ok(()) => {
                    added.insert(name, source);
                    result.succeeded.push(path.clone());
                }
                Err(e) => result.failed.push(FailedFile {
                    path: path.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        let closed = zip
            .finish()
            .and_then(|mut writer| writer.flush().map_err(ZipError::Io));
        if let Err(e) = closed {
            result.close_error = Some(e.to_string());
        }

        if result.succeeded.is_empty() {
            let _ = std::fs::remove_file(destination);
            return Err(BuildError::NothingArchived(result));
        }

        Ok(result)
    }

    fn add_file<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        path: &Path,
        name: &str,
    ) -> Result<(), ZipError> {
        let mut source = File::open(path)?;
        let metadata = source.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file").into());
        }
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "path has no file name").into());
        }

        let options = SimpleFileOptions::default()
            .compression_method(self.options.compression.method())
            .compression_level(self.options.level)
            .large_file(metadata.len() >= u32::MAX as u64);

        zip.start_file(name, options)?;
        if let Err(e) = io::copy(&mut source, zip) {
            let _ = zip.abort_file();
            return Err(e.into());
        }

        Ok(())
    }
}

/// Name of the entry for `path`.
///
/// The path is made absolute and `.`/`..` are resolved lexically, so distinct
/// spellings of one location share a name and distinct locations never do.
fn entry_name(path: &Path) -> io::Result<String> {
    let mut resolved: Vec<String> = Vec::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::Normal(part) => resolved.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Ok(resolved.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn builder() -> ArchiveBuilder {
        ArchiveBuilder::new(ArchiveOptions::default())
    }

    #[test]
    fn test_entry_name_resolves_dots() -> std::io::Result<()> {
        assert_eq!(entry_name(Path::new("/var/data/a.txt"))?, "var/data/a.txt");
        assert_eq!(entry_name(Path::new("/var/./data/b.txt"))?, "var/data/b.txt");
        assert_eq!(entry_name(Path::new("/var/data/sub/../c.txt"))?, "var/data/c.txt");
        assert_eq!(entry_name(Path::new("/../d.txt"))?, "d.txt");

        let cwd = std::env::current_dir()?;
        assert_eq!(entry_name(Path::new("./e.txt"))?, entry_name(&cwd.join("e.txt"))?);
        assert_eq!(entry_name(Path::new("../f.txt"))?, entry_name(&cwd.join("../f.txt"))?);
        assert_ne!(entry_name(Path::new("../f.txt"))?, entry_name(Path::new("./f.txt"))?);
        Ok(())
    }

    #[test]
    fn test_build_partial_success() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let a = dir.path().join("a.txt");
        let b = dir.path().join("missing.txt");
        fs::write(&a, b"0123456789")?;
        let dest = dir.path().join("job.zip");

        let result = builder().build(&[a.clone(), b.clone()], &dest).unwrap();
        assert_eq!(result.succeeded, vec![a.clone()]);
        assert_eq!(result.failed_paths().collect::<Vec<_>>(), vec![b.as_path()]);
        assert!(result.close_error.is_none());

        let mut archive = ZipArchive::new(fs::File::open(&dest)?).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_name(&entry_name(&a)?).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        assert_eq!(content, "0123456789");
        Ok(())
    }

    #[test]
    fn test_build_all_missing_is_error() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let dest = dir.path().join("job.zip");
        let files = vec![dir.path().join("x"), dir.path().join("y")];

        match builder().build(&files, &dest) {
            Err(BuildError::NothingArchived(result)) => {
                assert!(result.succeeded.is_empty());
                assert_eq!(result.failed.len(), 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!dest.exists());
        Ok(())
    }

    #[test]
    fn test_duplicates_are_counted_once_per_occurrence() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let a = dir.path().join("a.txt");
        fs::write(&a, b"dup")?;
        let dest = dir.path().join("job.zip");

        let files = vec![a.clone(), a.clone(), dir.path().join("gone")];
        let result = builder().build(&files, &dest).unwrap();
        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.total(), files.len());

        let archive = ZipArchive::new(fs::File::open(&dest)?).unwrap();
        assert_eq!(archive.len(), 1);
        Ok(())
    }

    #[test]
    fn test_parent_dir_spelling_keeps_both_files() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        fs::create_dir(dir.path().join("sub"))?;
        let inner = dir.path().join("sub/a.txt");
        let outer = dir.path().join("sub/../a.txt");
        fs::write(&inner, b"INNER")?;
        fs::write(dir.path().join("a.txt"), b"OUTER")?;
        let dest = dir.path().join("job.zip");

        let result = builder().build(&[inner.clone(), outer.clone()], &dest).unwrap();
        assert_eq!(result.succeeded, vec![inner.clone(), outer.clone()]);
        assert!(result.failed.is_empty());

        let mut archive = ZipArchive::new(fs::File::open(&dest)?).unwrap();
        assert_eq!(archive.len(), 2);
        for (path, expected) in [(&inner, "INNER"), (&outer, "OUTER")] {
            let mut content = String::new();
            archive.by_name(&entry_name(path)?).unwrap().read_to_string(&mut content)?;
            assert_eq!(content, expected);
        }
        Ok(())
    }

    #[test]
    fn test_same_file_spelled_twice_is_one_entry() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        fs::create_dir(dir.path().join("sub"))?;
        let a = dir.path().join("a.txt");
        fs::write(&a, b"once")?;
        let dest = dir.path().join("job.zip");

        let files = vec![a.clone(), dir.path().join("./sub/../a.txt")];
        let result = builder().build(&files, &dest).unwrap();
        assert_eq!(result.succeeded, files);

        let archive = ZipArchive::new(fs::File::open(&dest)?).unwrap();
        assert_eq!(archive.len(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_colliding_entry_names_are_reported() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("deep/inner"))?;
        std::os::unix::fs::symlink(dir.path().join("deep/inner"), dir.path().join("link"))?;
        let top = dir.path().join("a.txt");
        fs::write(&top, b"top")?;
        fs::write(dir.path().join("deep/a.txt"), b"deep")?;
        let dest = dir.path().join("job.zip");

        // `link/..` is `deep` on disk but the top directory by name
        let through_link = dir.path().join("link/../a.txt");
        let result = builder().build(&[top.clone(), through_link.clone()], &dest).unwrap();
        assert_eq!(result.succeeded, vec![top]);
        assert_eq!(result.failed_paths().collect::<Vec<_>>(), vec![through_link.as_path()]);
        assert!(result.failed[0].reason.contains("already holds"));
        Ok(())
    }

    #[test]
    fn test_directory_input_fails() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let a = dir.path().join("a.txt");
        fs::write(&a, b"x")?;
        let dest = dir.path().join("job.zip");

        let result = builder().build(&[dir.path().to_path_buf(), a], &dest).unwrap();
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].path, dir.path());
        Ok(())
    }

    #[test]
    fn test_stored_and_zstd_methods() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let a = dir.path().join("a.txt");
        fs::write(&a, vec![b'z'; 2048])?;

        for compression in [Compression::Stored, Compression::Zstd] {
            let dest = dir.path().join(format!("{:?}.zip", compression));
            let builder = ArchiveBuilder::new(ArchiveOptions { compression, level: None });
            let result = builder.build(&[a.clone()], &dest).unwrap();
            assert_eq!(result.succeeded.len(), 1);

            let mut archive = ZipArchive::new(fs::File::open(&dest)?).unwrap();
            let entry = archive.by_index(0).unwrap();
            assert_eq!(entry.compression(), compression.method());
            assert_eq!(entry.size(), 2048);
        }
        Ok(())
    }
}
