//! The set of source files a session measures.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Expands include paths into concrete source files.
///
/// Directories are walked recursively, symlinks are followed, and only
/// regular files survive. With a non-empty extension list, files must end in
/// one of the listed extensions (compared without the leading dot).
#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    extensions: Vec<String>,
}

impl SourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.into().trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Returns the files under `path`, sorted. Paths that cannot be read are
    /// logged and skipped.
    pub fn resolve(&self, path: &Path) -> Vec<PathBuf> {
        if !path.exists() {
            warn!(path = %path.display(), "Include path does not exist, skipping");
            return Vec::new();
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Skipping unreadable include entry"
                    );
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                continue;
            }
            let file = normalize(entry.path());
            // Report file tables are line-oriented.
            if file.as_os_str().to_string_lossy().contains(['\n', '\r']) {
                warn!(
                    path = %file.display(),
                    "Skipping source file whose path contains a line break"
                );
                continue;
            }
            files.push(file);
        }
        files
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want == ext))
    }
}

/// Canonical form when the path can be resolved, the path itself otherwise.
fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Files eligible for measurement. Fixed once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionScope {
    files: BTreeSet<PathBuf>,
}

impl InclusionScope {
    /// A scope that tracks nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves every path with the default resolver (all file types).
    pub fn resolve<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self::resolve_with(paths, &SourceResolver::new())
    }

    pub fn resolve_with<P: AsRef<Path>>(paths: &[P], resolver: &SourceResolver) -> Self {
        let files: BTreeSet<PathBuf> = paths
            .iter()
            .flat_map(|p| resolver.resolve(p.as_ref()))
            .collect();
        debug!(
            include_paths = paths.len(),
            files = files.len(),
            "Resolved inclusion scope"
        );
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Checks membership, retrying with the canonical path on a miss.
    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        self.member(path.as_ref()).is_some()
    }

    /// The stored form of `path` if it is in scope.
    pub(crate) fn member(&self, path: &Path) -> Option<PathBuf> {
        if self.files.contains(path) {
            return Some(path.to_path_buf());
        }
        let normalized = normalize(path);
        self.files.contains(&normalized).then_some(normalized)
    }

    /// Files in sorted order.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(dir.path().join("src/nested/util.rs"), "").unwrap();
        fs::write(dir.path().join("src/notes.txt"), "").unwrap();
        dir
    }

    #[test]
    fn test_empty_paths_give_empty_scope() {
        let scope = InclusionScope::resolve::<PathBuf>(&[]);
        assert!(scope.is_empty());
        assert_eq!(scope, InclusionScope::empty());
    }

    #[test]
    fn test_directory_is_walked_recursively() {
        let dir = tree();
        let scope = InclusionScope::resolve(&[dir.path().join("src")]);
        assert_eq!(scope.len(), 3);
        assert!(scope.contains(dir.path().join("src/nested/util.rs")));
    }

    #[test]
    fn test_extension_filter() {
        let dir = tree();
        let resolver = SourceResolver::with_extensions([".rs"]);
        let scope = InclusionScope::resolve_with(&[dir.path()], &resolver);
        assert_eq!(scope.len(), 2);
        assert!(!scope.contains(dir.path().join("src/notes.txt")));
    }

    #[test]
    fn test_single_file_and_duplicates() {
        let dir = tree();
        let main = dir.path().join("src/main.rs");
        let scope =
            InclusionScope::resolve(&[main.clone(), main.clone(), dir.path().join("src")]);
        assert_eq!(scope.len(), 3);
        assert!(scope.contains(&main));
    }

    #[cfg(unix)]
    #[test]
    fn test_line_break_in_file_name_is_skipped() {
        let dir = tree();
        fs::write(dir.path().join("src/odd\nname.rs"), "").unwrap();

        let scope = InclusionScope::resolve(&[dir.path().join("src")]);
        assert_eq!(scope.len(), 3);
        assert!(!scope.contains(dir.path().join("src/odd\nname.rs")));
    }

    #[test]
    fn test_missing_path_is_skipped() {
        let dir = tree();
        let scope = InclusionScope::resolve(&[
            dir.path().join("missing"),
            dir.path().join("src/main.rs"),
        ]);
        assert_eq!(scope.len(), 1);
    }
}
