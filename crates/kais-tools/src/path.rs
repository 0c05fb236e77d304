//! Workspace path resolution shared by `read_file`, `write_file` and
//! `commit_file` (§4.2): `private/…` resolves under a Cell's private
//! directory, `shared/…` or a bare path resolves under the shared directory.
//! Any resolution that would escape its base is a traversal error and performs
//! no I/O (§8 invariant).

use std::path::{Component, Path, PathBuf};

use kais_core::{Error, Result};

pub struct WorkspacePaths {
    pub private: PathBuf,
    pub shared: PathBuf,
}

impl WorkspacePaths {
    pub fn new(workspace_root: impl AsRef<Path>, cell_name: &str) -> Self {
        let root = workspace_root.as_ref();
        Self { private: root.join("private").join(cell_name), shared: root.join("shared") }
    }

    /// Resolves a tool-supplied path to an absolute path under the correct base,
    /// rejecting any `..` traversal that would escape it.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        if let Some(rest) = path.strip_prefix("private/") {
            safe_join(&self.private, rest)
        } else if let Some(rest) = path.strip_prefix("shared/") {
            safe_join(&self.shared, rest)
        } else {
            safe_join(&self.shared, path)
        }
    }

    /// Resolves `path` under the private base regardless of any `private/`/
    /// `shared/` prefix it carries — used by `commit_file`'s source side,
    /// which always reads from private (§4.2).
    pub fn resolve_private(&self, path: &str) -> Result<PathBuf> {
        let rel = strip_known_prefix(path);
        safe_join(&self.private, rel)
    }

    /// Resolves `path` under the shared base regardless of any `private/`/
    /// `shared/` prefix it carries — used by `commit_file`'s destination
    /// side, which always writes to shared (§4.2), including when
    /// `destination` defaults to the (private-prefixed) `source` string.
    pub fn resolve_shared(&self, path: &str) -> Result<PathBuf> {
        let rel = strip_known_prefix(path);
        safe_join(&self.shared, rel)
    }
}

fn strip_known_prefix(path: &str) -> &str {
    path.strip_prefix("private/").or_else(|| path.strip_prefix("shared/")).unwrap_or(path)
}

fn safe_join(base: &Path, rel: &str) -> Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(segment) => resolved.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved == base {
                    return Err(Error::path_traversal(rel));
                }
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::path_traversal(rel));
            }
        }
    }
    if !resolved.starts_with(base) {
        return Err(Error::path_traversal(rel));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_prefix_resolves_under_private_base() {
        let paths = WorkspacePaths::new("/workspace", "researcher");
        let resolved = paths.resolve("private/notes.md").unwrap();
        assert_eq!(resolved, PathBuf::from("/workspace/private/researcher/notes.md"));
    }

    #[test]
    fn shared_prefix_and_bare_path_resolve_under_shared_base() {
        let paths = WorkspacePaths::new("/workspace", "researcher");
        assert_eq!(paths.resolve("shared/report.md").unwrap(), PathBuf::from("/workspace/shared/report.md"));
        assert_eq!(paths.resolve("report.md").unwrap(), PathBuf::from("/workspace/shared/report.md"));
    }

    #[test]
    fn traversal_above_base_is_rejected() {
        let paths = WorkspacePaths::new("/workspace", "researcher");
        assert!(paths.resolve("private/../../etc/passwd").is_err());
        assert!(paths.resolve("../escape").is_err());
    }

    #[test]
    fn nested_traversal_within_base_is_allowed() {
        let paths = WorkspacePaths::new("/workspace", "researcher");
        let resolved = paths.resolve("shared/sub/../report.md").unwrap();
        assert_eq!(resolved, PathBuf::from("/workspace/shared/report.md"));
    }

    #[test]
    fn resolve_private_strips_either_prefix_into_private_base() {
        let paths = WorkspacePaths::new("/workspace", "researcher");
        assert_eq!(paths.resolve_private("private/draft.md").unwrap(), PathBuf::from("/workspace/private/researcher/draft.md"));
        assert_eq!(paths.resolve_private("draft.md").unwrap(), PathBuf::from("/workspace/private/researcher/draft.md"));
    }

    #[test]
    fn resolve_shared_strips_either_prefix_into_shared_base() {
        let paths = WorkspacePaths::new("/workspace", "researcher");
        assert_eq!(paths.resolve_shared("private/draft.md").unwrap(), PathBuf::from("/workspace/shared/draft.md"));
        assert_eq!(paths.resolve_shared("draft.md").unwrap(), PathBuf::from("/workspace/shared/draft.md"));
    }
}
