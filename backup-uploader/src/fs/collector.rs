//! Expansion of configured input paths into the ordered list of files to
//! archive.
//!
//! Directories are walked recursively. Anything else, including paths that
//! do not exist, is passed through untouched: deciding whether a file can be
//! archived is the archive builder's job, and it must see every input. An
//! entry the walk cannot read is passed through the same way.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for collecting files
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Follow symbolic links while walking directories
    pub follow_links: bool,

    /// Maximum depth below an input directory (None = unlimited)
    pub max_depth: Option<usize>,

    /// Exclude patterns, matched against file names inside walked directories
    pub exclude_patterns: Vec<String>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            max_depth: None,
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

pub fn default_exclude_patterns() -> Vec<String> {
    vec![
        ".git".to_string(),
        "node_modules".to_string(),
        ".DS_Store".to_string(),
    ]
}

/// Expand `inputs` into an ordered file list.
///
/// Input order is preserved; files found inside a directory are sorted by
/// name. Duplicates are kept.
///
/// # Example
/// ```no_run
/// use backup_uploader::fs::{collect_files, CollectOptions};
/// use std::path::PathBuf;
///
/// let files = collect_files(&[PathBuf::from("/etc/hosts")], &CollectOptions::default());
/// println!("Collected {} files", files.len());
/// ```
pub fn collect_files(inputs: &[PathBuf], options: &CollectOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            walk_into(input, options, &mut files);
        } else {
            files.push(input.clone());
        }
    }

    files
}

fn walk_into(root: &Path, options: &CollectOptions, files: &mut Vec<PathBuf>) {
    let mut walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let entries = walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !should_exclude(e, &options.exclude_patterns));

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                match e.path() {
                    // The archive builder records it as failed
                    Some(path) => files.push(path.to_path_buf()),
                    None => tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e),
                }
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        // Symlinks to directories are skipped when links are not followed
        if entry.path_is_symlink() && entry.path().is_dir() {
            continue;
        }

        files.push(entry.into_path());
    }
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|pattern| file_name.contains(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = collect_files(&[temp_dir.path().to_path_buf()], &CollectOptions::default());
        assert!(files.is_empty());
        Ok(())
    }

    #[test]
    fn test_collect_directory_sorted() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("b.txt"), b"content")?;
        fs::write(temp_dir.path().join("a.txt"), b"content")?;
        fs::write(temp_dir.path().join("subdir/c.txt"), b"content")?;

        let files = collect_files(&[temp_dir.path().to_path_buf()], &CollectOptions::default());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(temp_dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            names,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b.txt"),
                PathBuf::from("subdir/c.txt"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_missing_and_plain_paths_pass_through() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let present = temp_dir.path().join("present.txt");
        let missing = temp_dir.path().join("missing.txt");
        fs::write(&present, b"x")?;

        let inputs = vec![missing.clone(), present.clone(), present.clone()];
        let files = collect_files(&inputs, &CollectOptions::default());
        assert_eq!(files, inputs);
        Ok(())
    }

    #[test]
    fn test_exclude_patterns() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("file.txt"), b"keep")?;
        fs::write(temp_dir.path().join(".DS_Store"), b"exclude")?;
        fs::create_dir(temp_dir.path().join(".git"))?;
        fs::write(temp_dir.path().join(".git/HEAD"), b"exclude")?;

        let files = collect_files(&[temp_dir.path().to_path_buf()], &CollectOptions::default());
        assert_eq!(files, vec![temp_dir.path().join("file.txt")]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_error_is_passed_through() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), b"content")?;
        fs::create_dir(temp_dir.path().join("sub"))?;
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("sub/loop"))?;
        fs::write(temp_dir.path().join("z.txt"), b"content")?;

        let options = CollectOptions {
            follow_links: true,
            ..CollectOptions::default()
        };
        let files = collect_files(&[temp_dir.path().to_path_buf()], &options);

        assert_eq!(
            files,
            vec![
                temp_dir.path().join("a.txt"),
                temp_dir.path().join("sub/loop"),
                temp_dir.path().join("z.txt"),
            ]
        );
        Ok(())
    }
}
