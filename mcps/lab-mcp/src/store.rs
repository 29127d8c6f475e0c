//! Confined file store rooted at the sandbox directory
//!
//! Every caller-supplied path is resolved lexically under the root: `..` is
//! stripped from the literal string, the remainder is split on `/` and `\`,
//! and the surviving segments are joined onto the root. Absolute inputs
//! therefore land inside the root too. On top of that, the deepest existing
//! ancestor of a resolved path must canonicalize under the root, which
//! closes symlink escapes.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::types::{Config, LabError, LabResult, ResetSummary};

/// Marker stripped from every caller-supplied path
const PARENT_MARKER: &str = "..";

/// Kind of an entry found while walking the root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    reject_symlink_escape: bool,
    max_file_size: usize,
}

impl FileStore {
    /// Open the store, creating the root directory if absent
    pub fn open(root: impl AsRef<Path>, config: &Config) -> LabResult<Self> {
        let root = root.as_ref();
        if root.exists() && !root.is_dir() {
            return Err(LabError::ConfigError(format!(
                "sandbox root {} is not a directory",
                root.display()
            )));
        }
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;

        tracing::info!(root = %root.display(), "Sandbox root ready");

        Ok(Self {
            root,
            reject_symlink_escape: config.sandbox.reject_symlink_escape,
            max_file_size: config.limits.max_file_size,
        })
    }

    /// Canonical sandbox root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a caller path to a location under the root
    pub fn resolve(&self, path: &str) -> LabResult<PathBuf> {
        if path.contains('\0') {
            return Err(LabError::InvalidPath("Path contains null byte".to_string()));
        }

        let stripped = path.replace(PARENT_MARKER, "");
        let segments: Vec<&str> = stripped
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();

        if segments.is_empty() {
            return Err(LabError::InvalidPath(format!(
                "{:?} does not name a file inside the sandbox",
                path
            )));
        }

        let mut resolved = self.root.clone();
        resolved.extend(segments);

        if self.reject_symlink_escape {
            self.check_contained(&resolved, path)?;
        }

        Ok(resolved)
    }

    /// The deepest existing ancestor must canonicalize under the root
    fn check_contained(&self, resolved: &Path, original: &str) -> LabResult<()> {
        let mut ancestor = Some(resolved);
        while let Some(current) = ancestor {
            if std::fs::symlink_metadata(current).is_ok() {
                let escaped = match current.canonicalize() {
                    Ok(canonical) => !canonical.starts_with(&self.root),
                    // dangling symlink
                    Err(_) => true,
                };
                if escaped {
                    return Err(LabError::PathEscape(original.to_string()));
                }
                return Ok(());
            }
            ancestor = current.parent();
        }
        Ok(())
    }

    /// Path relative to the root, `/`-separated
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Write text content, creating parent directories and overwriting
    pub async fn write(&self, path: &str, content: &str) -> LabResult<PathBuf> {
        let resolved = self.resolve(path)?;

        if content.len() > self.max_file_size {
            return Err(LabError::FileTooLarge {
                size: content.len() as u64,
                max: self.max_file_size,
            });
        }

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&resolved, content).await?;

        tracing::debug!(path = %self.relative(&resolved), bytes = content.len(), "Wrote file");
        Ok(resolved)
    }

    /// Read a file as UTF-8 text; missing files and directories are `NotFound`
    pub async fn read(&self, path: &str) -> LabResult<(PathBuf, String)> {
        let resolved = self.resolve(path)?;

        let metadata = match fs::metadata(&resolved).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(LabError::NotFound(path.to_string())),
        };

        if metadata.len() > self.max_file_size as u64 {
            return Err(LabError::FileTooLarge {
                size: metadata.len(),
                max: self.max_file_size,
            });
        }

        let content = fs::read_to_string(&resolved).await?;
        Ok((resolved, content))
    }

    /// Every regular file under the root, relative and sorted
    ///
    /// Fails if any directory cannot be read, since the listing would be
    /// incomplete.
    pub async fn list(&self) -> LabResult<Vec<String>> {
        let walk = self.walk().await;
        if let Some((path, err)) = walk.errors.into_iter().next() {
            tracing::warn!(path = %path.display(), error = %err, "Could not list sandbox directory");
            return Err(LabError::IoError(err));
        }

        let mut files: Vec<String> = walk
            .entries
            .into_iter()
            .filter(|(_, kind)| *kind == EntryKind::File)
            .map(|(path, _)| self.relative(&path))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Delete every file under the root, continuing past individual failures
    ///
    /// Directories are left in place. Symlinks are removed without touching
    /// their targets. Unreadable directories count as one failure each.
    pub async fn reset(&self) -> ResetSummary {
        let walk = self.walk().await;
        let mut summary = ResetSummary {
            removed: 0,
            failed: walk.errors.len(),
        };

        for (path, err) in &walk.errors {
            tracing::warn!(path = %path.display(), error = %err, "Could not walk sandbox directory");
        }

        for (path, _) in walk.entries {
            match fs::remove_file(&path).await {
                Ok(()) => summary.removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove sandbox file");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(removed = summary.removed, failed = summary.failed, "Sandbox reset");
        summary
    }

    /// Collect files and symlinks without following symlinked directories
    ///
    /// Never stops early: a directory or entry that cannot be read is
    /// recorded in `errors` and the walk moves on.
    async fn walk(&self) -> Walk {
        let mut walk = Walk::default();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    walk.errors.push((dir, e));
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        walk.errors.push((dir.clone(), e));
                        break;
                    }
                };

                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        walk.errors.push((entry.path(), e));
                        continue;
                    }
                };

                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_symlink() {
                    walk.entries.push((entry.path(), EntryKind::Symlink));
                } else if file_type.is_file() {
                    walk.entries.push((entry.path(), EntryKind::File));
                }
            }
        }

        walk
    }
}

/// Result of walking the root
#[derive(Debug, Default)]
struct Walk {
    entries: Vec<(PathBuf, EntryKind)>,
    errors: Vec<(PathBuf, std::io::Error)>,
}
