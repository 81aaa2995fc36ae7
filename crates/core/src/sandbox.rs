//! Allow-list confinement for every file-browser operation.
//!
//! A candidate path is accepted only if its fully resolved form (`.`, `..`
//! and symlinks resolved against the real filesystem) is one of the sandbox
//! roots or lies beneath one. Comparison is component-wise on resolved paths,
//! never on raw strings.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// The set of directories file operations may act in.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    /// Roots as configured, used to recreate them if they vanish.
    configured: Vec<PathBuf>,
    /// Canonical form of each root; `roots[0]` is the base for relative paths.
    roots: Vec<PathBuf>,
}

impl PathSandbox {
    /// Build a sandbox, creating any missing root directory.
    ///
    /// Failing to create or resolve a root is fatal: the caller has no
    /// browsable allow-list without it.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> CoreResult<Self> {
        let configured: Vec<PathBuf> = roots.into_iter().collect();
        if configured.is_empty() {
            return Err(CoreError::validation("at least one sandbox root is required"));
        }

        let mut resolved = Vec::with_capacity(configured.len());
        for root in &configured {
            std::fs::create_dir_all(root).map_err(|e| CoreError::Io {
                context: format!("cannot create sandbox root {}", root.display()),
                source: e,
            })?;
            let canonical = std::fs::canonicalize(root).map_err(|e| CoreError::Io {
                context: format!("cannot resolve sandbox root {}", root.display()),
                source: e,
            })?;
            resolved.push(canonical);
        }

        Ok(Self {
            configured,
            roots: resolved,
        })
    }

    /// Directory relative candidates are resolved against.
    pub fn base(&self) -> &Path {
        &self.roots[0]
    }

    /// Canonical roots, in configuration order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_root(&self, resolved: &Path) -> bool {
        self.roots.iter().any(|r| r == resolved)
    }

    /// Resolve `candidate` and return its normalized absolute form if it is
    /// inside the sandbox. The error message says why it was refused.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> CoreResult<PathBuf> {
        self.ensure_roots();

        let candidate = candidate.as_ref();
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base().join(candidate)
        };

        let normalized = normalize(&absolute).map_err(|e| {
            CoreError::AccessDenied(format!(
                "'{}' cannot be resolved: {e}",
                candidate.display()
            ))
        })?;

        if self.roots.iter().any(|root| normalized.starts_with(root)) {
            Ok(normalized)
        } else {
            tracing::debug!(
                candidate = %candidate.display(),
                resolved = %normalized.display(),
                "sandbox rejected path"
            );
            Err(CoreError::AccessDenied(format!(
                "'{}' is outside the allowed directories",
                candidate.display()
            )))
        }
    }

    /// Resolve `candidate` as a directory entry to act on.
    ///
    /// The parent goes through [`resolve`](Self::resolve) but the final
    /// component is kept as named, so a symlink stays the link rather than
    /// being swapped for its target. The entry need not exist.
    pub fn resolve_entry(&self, candidate: impl AsRef<Path>) -> CoreResult<PathBuf> {
        let candidate = candidate.as_ref();
        match (candidate.parent(), candidate.components().next_back()) {
            (Some(parent), Some(Component::Normal(name))) => {
                Ok(self.resolve(parent)?.join(name))
            }
            _ => self.resolve(candidate),
        }
    }

    pub fn is_allowed(&self, candidate: impl AsRef<Path>) -> bool {
        self.resolve(candidate).is_ok()
    }

    /// Recreate roots that were removed after start-up so the top-level
    /// menu stays listable.
    fn ensure_roots(&self) {
        for root in &self.configured {
            if root.is_dir() {
                continue;
            }
            if let Err(e) = std::fs::create_dir_all(root) {
                tracing::warn!(
                    root = %root.display(),
                    error = %e,
                    "failed to recreate sandbox root"
                );
            }
        }
    }
}

/// Resolve `.`, `..` and symlinks in an absolute path.
///
/// Components are resolved one at a time against the filesystem, so a
/// symlink anywhere along the way is followed before a later `..` is
/// applied. The part of the path that does not exist yet is kept
/// lexically. A dangling symlink is refused since its target cannot be
/// checked.
pub fn normalize(path: &Path) -> io::Result<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                match std::fs::canonicalize(&resolved) {
                    Ok(real) => resolved = real,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        let is_link = std::fs::symlink_metadata(&resolved)
                            .map(|m| m.file_type().is_symlink())
                            .unwrap_or(false);
                        if is_link {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidInput,
                                format!("dangling symlink at {}", resolved.display()),
                            ));
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// `<tmp>/minecraft` with a `plugins` sub-root, plus a sibling
    /// `<tmp>/minecraft_evil` that shares the root's string prefix.
    fn fixture() -> (TempDir, PathSandbox) {
        let tmp = tempfile::tempdir().unwrap();
        let server = tmp.path().join("minecraft");
        let sandbox =
            PathSandbox::new(vec![server.clone(), server.join("plugins")]).unwrap();
        std::fs::create_dir_all(tmp.path().join("minecraft_evil")).unwrap();
        (tmp, sandbox)
    }

    #[test]
    fn new_creates_missing_roots() {
        let (tmp, sandbox) = fixture();
        assert!(tmp.path().join("minecraft/plugins").is_dir());
        assert_eq!(sandbox.roots().len(), 2);
    }

    #[test]
    fn new_rejects_empty_root_list() {
        let err = PathSandbox::new(Vec::new()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn roots_and_descendants_allowed() {
        let (_tmp, sandbox) = fixture();
        assert!(sandbox.is_allowed("."));
        assert!(sandbox.is_allowed(""));
        assert!(sandbox.is_allowed("plugins"));
        assert!(sandbox.is_allowed("plugins/not-yet-created.jar"));
        assert!(sandbox.is_allowed("world/region/r.0.0.mca"));
        let base = sandbox.base().to_path_buf();
        assert!(sandbox.is_allowed(base.join("server.properties")));
    }

    #[test]
    fn traversal_rejected() {
        let (_tmp, sandbox) = fixture();
        assert!(!sandbox.is_allowed("../../etc"));
        assert!(!sandbox.is_allowed(".."));
        assert!(!sandbox.is_allowed("plugins/../../"));
        assert!(!sandbox.is_allowed("/etc/passwd"));
    }

    #[test]
    fn string_prefix_sibling_rejected() {
        let (tmp, sandbox) = fixture();
        assert!(!sandbox.is_allowed("../minecraft_evil"));
        assert!(!sandbox.is_allowed(tmp.path().join("minecraft_evil/x.jar")));
    }

    #[test]
    fn dotdot_that_stays_inside_is_allowed() {
        let (_tmp, sandbox) = fixture();
        let resolved = sandbox.resolve("plugins/../plugins/x.jar").unwrap();
        assert_eq!(resolved, sandbox.base().join("plugins/x.jar"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_rejected() {
        let (tmp, sandbox) = fixture();
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, sandbox.base().join("escape")).unwrap();

        assert!(!sandbox.is_allowed("escape"));
        assert!(!sandbox.is_allowed("escape/new-file.jar"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_then_dotdot_resolves_physically() {
        let (tmp, sandbox) = fixture();
        let deep = tmp.path().join("outside/deep");
        std::fs::create_dir_all(&deep).unwrap();
        std::os::unix::fs::symlink(&deep, sandbox.base().join("link")).unwrap();

        // Lexically this is `<base>/x`; physically it is `<tmp>/outside/x`.
        assert!(!sandbox.is_allowed("link/../x"));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_rejected() {
        let (tmp, sandbox) = fixture();
        std::os::unix::fs::symlink(
            tmp.path().join("nowhere"),
            sandbox.base().join("dangling"),
        )
        .unwrap();
        assert!(!sandbox.is_allowed("dangling"));
    }

    #[test]
    fn rejection_carries_reason() {
        let (_tmp, sandbox) = fixture();
        let err = sandbox.resolve("../../etc").unwrap_err();
        assert!(matches!(err, CoreError::AccessDenied(_)));
        assert!(err.to_string().contains("outside the allowed directories"));
    }

    #[test]
    fn removed_root_is_recreated_on_check() {
        let (tmp, sandbox) = fixture();
        let plugins = tmp.path().join("minecraft/plugins");
        std::fs::remove_dir_all(&plugins).unwrap();
        assert!(sandbox.is_allowed("plugins"));
        assert!(plugins.is_dir());
    }

    #[test]
    fn is_root_matches_resolved_roots_only() {
        let (_tmp, sandbox) = fixture();
        let plugins = sandbox.resolve("plugins").unwrap();
        assert!(sandbox.is_root(&plugins));
        assert!(!sandbox.is_root(&plugins.join("x.jar")));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_entry_keeps_final_symlink() {
        let (_tmp, sandbox) = fixture();
        let plugins = sandbox.resolve("plugins").unwrap();
        std::fs::write(plugins.join("real.jar"), "x").unwrap();
        std::os::unix::fs::symlink("real.jar", plugins.join("link.jar")).unwrap();

        assert_eq!(sandbox.resolve("plugins/link.jar").unwrap(), plugins.join("real.jar"));
        assert_eq!(sandbox.resolve_entry("plugins/link.jar").unwrap(), plugins.join("link.jar"));
    }

    #[test]
    fn resolve_entry_still_confines_parent() {
        let (_tmp, sandbox) = fixture();
        let err = sandbox.resolve_entry("../minecraft_evil/x.jar").unwrap_err();
        assert!(matches!(err, CoreError::AccessDenied(_)));
        assert_eq!(sandbox.resolve_entry(".").unwrap(), sandbox.base());
        assert!(sandbox.is_root(&sandbox.resolve_entry("plugins").unwrap()));
    }
}
