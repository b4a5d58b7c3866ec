use crate::error::{FinderError, Result};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Async file discovery for suite directories
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// Required file name prefix
    prefix: String,
    /// Required file name suffix (e.g. "Test.php")
    suffix: String,
    /// Excluded path prefixes
    exclude_paths: Vec<PathBuf>,
    /// Excluded glob patterns
    exclude_set: Option<GlobSet>,
    /// Follow symbolic links
    follow_symlinks: bool,
}

impl FileDiscovery {
    /// Create a new FileDiscovery instance matching every `.php` file
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            suffix: ".php".to_string(),
            exclude_paths: Vec::new(),
            exclude_set: None,
            follow_symlinks: true,
        }
    }

    /// Set the file name prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the file name suffix
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Exclude paths; entries containing wildcards are treated as globs
    pub async fn with_excludes(mut self, excludes: &[PathBuf]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut has_globs = false;

        // Walked paths are canonical, so excludes must be too
        for exclude in excludes {
            let pattern = exclude.to_string_lossy();
            if is_glob(&pattern) {
                builder.add(build_glob(&canonical_glob(exclude).await)?);
                has_globs = true;
            } else {
                let canonical = fs::canonicalize(exclude)
                    .await
                    .unwrap_or_else(|_| exclude.clone());
                self.exclude_paths.push(canonical);
            }
        }

        self.exclude_set = if has_globs {
            Some(builder.build().map_err(|e| FinderError::InvalidPattern {
                pattern: "<exclude>".to_string(),
                details: e.to_string(),
            })?)
        } else {
            None
        };
        Ok(self)
    }

    /// Set whether to follow symbolic links
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Discover matching files beneath `path` (file or directory), sorted per directory
    pub async fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let root = fs::canonicalize(path).await?;
        let metadata = fs::metadata(&root).await?;

        if metadata.is_file() {
            return Ok(if self.should_process(&root) {
                vec![root]
            } else {
                Vec::new()
            });
        }

        let mut files = Vec::new();
        let mut visited = HashSet::new();
        self.discover_files_recursive(&root, &mut visited, &mut files)
            .await?;
        Ok(files)
    }

    /// Recursive helper for discovering files
    fn discover_files_recursive<'a>(
        &'a self,
        dir: &'a Path,
        visited: &'a mut HashSet<PathBuf>,
        files: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            // Symlinked directories can loop back on an ancestor
            let canonical = fs::canonicalize(dir).await?;
            if !visited.insert(canonical) {
                return Ok(());
            }

            let mut entries = Vec::new();
            let mut read_dir = fs::read_dir(dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                entries.push(entry.path());
            }
            entries.sort();

            for entry_path in entries {
                if self.is_excluded(&entry_path) {
                    tracing::trace!(path = %entry_path.display(), "excluded");
                    continue;
                }

                let symlink_metadata = match fs::symlink_metadata(&entry_path).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        tracing::warn!(path = %entry_path.display(), error = %e, "cannot stat entry");
                        continue;
                    }
                };
                if symlink_metadata.file_type().is_symlink() && !self.follow_symlinks {
                    continue;
                }

                // Dangling symlinks are skipped
                let Ok(metadata) = fs::metadata(&entry_path).await else {
                    continue;
                };

                if metadata.is_dir() {
                    if let Err(e) = self
                        .discover_files_recursive(&entry_path, visited, files)
                        .await
                    {
                        // Log error but continue with the remaining entries
                        tracing::warn!(path = %entry_path.display(), error = %e, "error while walking directory");
                    }
                } else if metadata.is_file() && self.should_process(&entry_path) {
                    files.push(entry_path);
                }
            }

            Ok(())
        })
    }

    /// Check whether a file matches prefix, suffix and excludes
    pub fn should_process(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };

        file_name.starts_with(&self.prefix)
            && file_name.ends_with(&self.suffix)
            && !self.is_excluded(path)
    }

    /// Check whether `path` lies under an exclude entry
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self
            .exclude_paths
            .iter()
            .any(|exclude| path.starts_with(exclude))
        {
            return true;
        }

        if let Some(exclude_set) = &self.exclude_set {
            return path.ancestors().any(|ancestor| exclude_set.is_match(ancestor));
        }

        false
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a path string contains glob metacharacters
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(&['*', '?', '['][..])
}

fn build_glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| FinderError::InvalidPattern {
            pattern: pattern.to_string(),
            details: e.to_string(),
        })
}

/// Split a pattern into its longest wildcard-free prefix and the remaining components
fn split_pattern(pattern: &Path) -> (PathBuf, Vec<String>) {
    let mut base = PathBuf::new();
    let mut rest = Vec::new();
    for component in pattern.components() {
        if rest.is_empty()
            && !matches!(component, Component::Normal(part) if is_glob(&part.to_string_lossy()))
        {
            base.push(component);
        } else {
            rest.push(component.as_os_str().to_string_lossy().into_owned());
        }
    }
    (base, rest)
}

/// Rewrite a glob so its wildcard-free prefix is canonical, like the paths it is matched against
async fn canonical_glob(pattern: &Path) -> String {
    let (base, rest) = split_pattern(pattern);
    let base = fs::canonicalize(&base).await.unwrap_or(base);

    let mut glob = globset::escape(&base.to_string_lossy());
    for part in rest {
        if !glob.is_empty() && !glob.ends_with(std::path::MAIN_SEPARATOR) {
            glob.push(std::path::MAIN_SEPARATOR);
        }
        glob.push_str(&part);
    }
    glob
}

/// Expand a `<directory>` entry that may contain wildcards into the matching directories
///
/// Without `**` the walk stops at the depth of the pattern.
pub async fn expand_directory_pattern(pattern: &Path, follow_symlinks: bool) -> Result<Vec<PathBuf>> {
    let pattern_str = pattern.to_string_lossy();
    if !is_glob(&pattern_str) {
        return Ok(vec![pattern.to_path_buf()]);
    }

    let matcher = build_glob(&pattern_str)?.compile_matcher();
    let (base, rest) = split_pattern(pattern);
    let max_depth = if rest.iter().any(|part| part.contains("**")) {
        None
    } else {
        Some(rest.len())
    };

    let mut matches = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = vec![(base, 0)];
    while let Some((dir, depth)) = pending.pop() {
        // Symlinked directories can loop back on an ancestor
        let Ok(canonical) = fs::canonicalize(&dir).await else {
            continue;
        };
        if !visited.insert(canonical) {
            continue;
        }
        let Ok(mut read_dir) = fs::read_dir(&dir).await else {
            continue;
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let is_symlink = fs::symlink_metadata(&path)
                .await
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if is_symlink && !follow_symlinks {
                continue;
            }
            if !fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
                continue;
            }
            if matcher.is_match(&path) {
                matches.push(path.clone());
            }
            if max_depth.is_none_or(|max| depth + 1 < max) {
                pending.push((path, depth + 1));
            }
        }
    }

    matches.sort();
    matches.dedup();
    Ok(matches)
}
