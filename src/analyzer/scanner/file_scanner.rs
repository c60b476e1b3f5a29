use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::constants::traversal::{
    DEFAULT_MAX_FILE_SIZE, IGNORE_DIRS, IGNORE_FILES, SUPPORTED_EXTENSIONS,
};
use crate::types::{Result, ScrError};

/// Deterministic repository walker.
///
/// Entries are visited in lexicographic order. Ignored directories are pruned as whole
/// subtrees; every yielded path has been checked to resolve inside the root.
pub struct FileScanner {
    root: PathBuf,
    exclude: Vec<glob::Pattern>,
    max_file_size: u64,
}

impl FileScanner {
    /// Create a scanner for `root`, which must be an existing directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| {
            ScrError::fingerprinting(format!(
                "Repository path does not exist: {} ({})",
                root.display(),
                e
            ))
        })?;
        if !root.is_dir() {
            return Err(ScrError::fingerprinting(format!(
                "Repository path is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            root,
            exclude: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    /// Extra glob patterns matched against the root-relative POSIX path
    pub fn with_exclude(mut self, patterns: &[String]) -> Result<Self> {
        self.exclude = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| {
                    ScrError::validation(format!("Invalid exclude pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false) // Security: prevent symlink traversal attacks
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| IGNORE_DIRS.contains(&name)))
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Scan: skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!("Scan: skipping non-UTF-8 file name: {}", path.display());
                continue;
            };
            if IGNORE_FILES.contains(&file_name) || !is_supported(path) {
                continue;
            }
            // Symlinks are yielded but not followed; only regular targets inside the root count
            if entry.file_type().is_some_and(|t| t.is_dir()) {
                continue;
            }

            let Some(resolved) = self.resolve_within_root(path) else {
                continue;
            };
            if !resolved.is_file() {
                continue;
            }

            let Some(relative) = relative_posix(&self.root, path) else {
                continue;
            };
            if self.is_excluded(&relative) {
                debug!("Scan: excluded {}", relative);
                continue;
            }

            let size = resolved.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(ScannedFile {
                path: path.to_path_buf(),
                relative,
                size,
            });
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(files)
    }

    /// Canonical target of `path`, or `None` (with a warning) when it escapes the root
    fn resolve_within_root(&self, path: &Path) -> Option<PathBuf> {
        match path.canonicalize() {
            Ok(resolved) if resolved.starts_with(&self.root) => Some(resolved),
            Ok(resolved) => {
                warn!(
                    "Scan: skipping {} (resolves outside repository root to {})",
                    path.display(),
                    resolved.display()
                );
                None
            }
            Err(e) => {
                warn!("Scan: skipping {} (cannot resolve: {})", path.display(), e);
                None
            }
        }
    }

    fn is_excluded(&self, relative: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(relative))
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

/// Root-relative path joined with `/`
pub fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Root-relative POSIX path
    pub relative: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x = 1\n").unwrap();
    }

    fn relatives(scanner: &FileScanner) -> Vec<String> {
        scanner
            .scan()
            .unwrap()
            .into_iter()
            .map(|f| f.relative)
            .collect()
    }

    #[test]
    fn test_scan_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "z.py");
        touch(dir.path(), "a.py");
        touch(dir.path(), "pkg/mod.py");
        touch(dir.path(), "README.md");
        touch(dir.path(), "__pycache__/a.cpython.py");
        touch(dir.path(), ".venv/lib/site.py");
        touch(dir.path(), ".hidden/ok.py");
        touch(dir.path(), "nested/env/skip.py");

        let scanner = FileScanner::new(dir.path()).unwrap();
        assert_eq!(
            relatives(&scanner),
            vec![".hidden/ok.py", "a.py", "pkg/mod.py", "z.py"]
        );
    }

    #[test]
    fn test_scan_ignores_gitignore_rules() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.py\n").unwrap();
        touch(dir.path(), "kept.py");

        let scanner = FileScanner::new(dir.path()).unwrap();
        assert_eq!(relatives(&scanner), vec!["kept.py"]);
    }

    #[test]
    fn test_exclude_patterns() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app.py");
        touch(dir.path(), "tests/test_app.py");

        let scanner = FileScanner::new(dir.path())
            .unwrap()
            .with_exclude(&["tests/**".to_string()])
            .unwrap();
        assert_eq!(relatives(&scanner), vec!["app.py"]);

        let invalid = FileScanner::new(dir.path())
            .unwrap()
            .with_exclude(&["[".to_string()]);
        assert!(invalid.is_err());
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = FileScanner::new(&missing).err().unwrap();
        assert!(matches!(err, ScrError::Fingerprinting(_)));
    }

    #[test]
    fn test_file_root_is_error() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.py");
        let err = FileScanner::new(dir.path().join("a.py")).err().unwrap();
        assert!(err.to_string().contains("not a directory"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_skipped() {
        let outside = TempDir::new().unwrap();
        touch(outside.path(), "secret.py");
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app.py");
        std::os::unix::fs::symlink(outside.path().join("secret.py"), dir.path().join("link.py"))
            .unwrap();

        let scanner = FileScanner::new(dir.path()).unwrap();
        assert_eq!(relatives(&scanner), vec!["app.py"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app.py");
        let bad = dir.path().join(OsStr::from_bytes(b"bad\xff.py"));
        if fs::write(&bad, "x = 1\n").is_err() {
            return;
        }

        let scanner = FileScanner::new(dir.path()).unwrap();
        assert_eq!(relatives(&scanner), vec!["app.py"]);
    }

    #[test]
    fn test_relative_posix() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_posix(root, Path::new("/repo/pkg/a.py")).as_deref(),
            Some("pkg/a.py")
        );
        assert_eq!(relative_posix(root, Path::new("/repo")), None);
        assert_eq!(relative_posix(root, Path::new("/elsewhere/a.py")), None);
    }
}
