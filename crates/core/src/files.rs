//! File-browser operations confined to the sandbox.
//!
//! Every path argument is re-validated on its own, including the computed
//! final path of a move or rename, so a two-path operation can never act
//! outside the allowed roots through its second endpoint.

use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::sandbox::PathSandbox;

/// `list` argument that shows the sandbox roots themselves as a menu.
pub const ROOT_VIEW: &str = ":roots:";

/// Extensions accepted by `upload`, compared case-insensitively.
pub const ALLOWED_UPLOAD_EXTENSIONS: &[&str] = &["jar"];

/// Destination used when an upload names none.
pub const DEFAULT_UPLOAD_DIR: &str = "plugins";

/// Overall result of an operation as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Success,
    Error,
    PartialSuccess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    /// Path relative to the sandbox base, usable as the next `list` argument.
    pub path: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    /// Name the file was stored under after sanitization.
    pub filename: String,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFileResult {
    /// Name as supplied by the client.
    pub filename: String,
    pub status: OpStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadBatchReport {
    pub status: OpStatus,
    pub message: String,
    pub results: Vec<UploadFileResult>,
}

pub struct FileOps {
    sandbox: PathSandbox,
}

impl FileOps {
    pub fn new(sandbox: PathSandbox) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// Display form of a resolved path: relative to the base when under it.
    fn relative(&self, resolved: &Path) -> String {
        match resolved.strip_prefix(self.sandbox.base()) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => resolved.display().to_string(),
        }
    }

    /// Directory listing, directories first, then by name ignoring case.
    pub fn list(&self, path: &str) -> CoreResult<Vec<DirEntry>> {
        if path == ROOT_VIEW {
            return Ok(self.list_roots());
        }

        let dir = self.sandbox.resolve(path)?;
        let meta = std::fs::metadata(&dir).map_err(|e| CoreError::io(&dir, e))?;
        if !meta.is_dir() {
            return Err(CoreError::validation(format!("'{path}' is not a directory")));
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| CoreError::io(&dir, e))? {
            let entry = entry.map_err(|e| CoreError::io(&dir, e))?;
            let full = entry.path();
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: self.relative(&full),
                is_dir: full.is_dir(),
            });
        }
        entries.sort_by(|a, b| {
            b.is_dir
                .cmp(&a.is_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(entries)
    }

    fn list_roots(&self) -> Vec<DirEntry> {
        self.sandbox
            .roots()
            .iter()
            .map(|root| DirEntry {
                name: root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| root.display().to_string()),
                path: self.relative(root),
                is_dir: true,
            })
            .collect()
    }

    /// Move `source` to `destination`, or into it when it is a directory.
    /// Never overwrites. A symlink source moves the link, not its target.
    pub fn move_item(&self, source: &str, destination: &str) -> CoreResult<String> {
        let src = self.sandbox.resolve_entry(source)?;
        if std::fs::symlink_metadata(&src).is_err() {
            return Err(CoreError::not_found("Source", source));
        }
        if self.sandbox.is_root(&src) {
            return Err(CoreError::AccessDenied(format!(
                "'{source}' is a top-level folder and cannot be moved"
            )));
        }

        let dest = self.sandbox.resolve(destination)?;
        let target = if dest.is_dir() {
            let name = src
                .file_name()
                .ok_or_else(|| CoreError::validation(format!("'{source}' has no file name")))?;
            dest.join(name)
        } else {
            dest
        };

        if target.starts_with(&src) {
            return Err(CoreError::validation(format!(
                "cannot move '{source}' into itself"
            )));
        }
        if std::fs::symlink_metadata(&target).is_ok() {
            return Err(CoreError::validation(format!(
                "'{}' already exists",
                self.relative(&target)
            )));
        }

        std::fs::rename(&src, &target).map_err(|e| CoreError::io(&target, e))?;
        tracing::info!(from = %src.display(), to = %target.display(), "moved");
        Ok(format!("Moved '{source}' to '{destination}'."))
    }

    /// Rename an entry in place. `new_name` must be a bare name.
    pub fn rename(&self, path: &str, new_name: &str) -> CoreResult<String> {
        let new_name = new_name.trim();
        if new_name.is_empty()
            || new_name == "."
            || new_name.contains("..")
            || new_name.contains('/')
            || new_name.contains('\\')
        {
            return Err(CoreError::validation(format!("invalid new name '{new_name}'")));
        }

        let old = self.sandbox.resolve_entry(path)?;
        if std::fs::symlink_metadata(&old).is_err() {
            return Err(CoreError::not_found("Path", path));
        }
        if self.sandbox.is_root(&old) {
            return Err(CoreError::AccessDenied(format!(
                "'{path}' is a top-level folder and cannot be renamed"
            )));
        }

        let parent = old.parent().unwrap_or(self.sandbox.base());
        let new = parent.join(new_name);
        if std::fs::symlink_metadata(&new).is_ok() {
            return Err(CoreError::validation(format!("'{new_name}' already exists")));
        }

        std::fs::rename(&old, &new).map_err(|e| CoreError::io(&old, e))?;
        tracing::info!(from = %old.display(), to = %new.display(), "renamed");
        Ok(format!("Renamed '{path}' to '{new_name}'."))
    }

    /// Store `reader`'s content as `destination/<sanitized filename>`,
    /// creating the destination directory if needed. An existing file of
    /// the same name is replaced.
    pub fn upload<R: Read>(
        &self,
        mut reader: R,
        filename: &str,
        destination: &str,
    ) -> CoreResult<UploadOutcome> {
        if filename.trim().is_empty() {
            return Err(CoreError::validation("No file selected."));
        }
        let safe = secure_filename(filename);
        if safe.is_empty() {
            return Err(CoreError::validation(format!("'{filename}' is not a usable file name")));
        }
        if !has_allowed_extension(&safe) {
            let allowed: Vec<String> = ALLOWED_UPLOAD_EXTENSIONS
                .iter()
                .map(|e| format!(".{e}"))
                .collect();
            return Err(CoreError::validation(format!(
                "File type not allowed. Only {} files are permitted.",
                allowed.join(", ")
            )));
        }

        let dir = self.sandbox.resolve(destination)?;
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
        let target = self.sandbox.resolve(dir.join(&safe))?;

        let mut file = std::fs::File::create(&target).map_err(|e| CoreError::io(&target, e))?;
        let written = io::copy(&mut reader, &mut file).map_err(|e| CoreError::io(&target, e))?;
        tracing::info!(path = %target.display(), bytes = written, "uploaded");

        Ok(UploadOutcome {
            message: format!("File '{safe}' uploaded to '{destination}'."),
            path: self.relative(&target),
            filename: safe,
        })
    }

    /// Upload several files to one destination and summarize the results.
    pub fn upload_batch<R, I>(&self, files: I, destination: &str) -> UploadBatchReport
    where
        R: Read,
        I: IntoIterator<Item = (String, R)>,
    {
        let results: Vec<UploadFileResult> = files
            .into_iter()
            .map(|(filename, reader)| match self.upload(reader, &filename, destination) {
                Ok(outcome) => UploadFileResult {
                    filename,
                    status: OpStatus::Success,
                    message: outcome.message,
                },
                Err(e) => UploadFileResult {
                    filename,
                    status: OpStatus::Error,
                    message: e.to_string(),
                },
            })
            .collect();

        let total = results.len();
        let ok = results.iter().filter(|r| r.status == OpStatus::Success).count();
        let (status, message) = if total == 0 {
            (OpStatus::Error, "No files selected.".to_string())
        } else if ok == total {
            (OpStatus::Success, format!("{ok} file(s) uploaded to '{destination}'."))
        } else if ok == 0 {
            (OpStatus::Error, format!("All {total} upload(s) failed."))
        } else {
            (
                OpStatus::PartialSuccess,
                format!("{ok} of {total} file(s) uploaded, {} failed.", total - ok),
            )
        };
        UploadBatchReport {
            status,
            message,
            results,
        }
    }
}

fn has_allowed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            ALLOWED_UPLOAD_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Reduce a client-supplied name to `[A-Za-z0-9._-]`.
///
/// Non-ASCII is dropped, separators become spaces, whitespace runs become
/// `_`, and leading or trailing `.`/`_` are trimmed. May return an empty
/// string.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, FileOps) {
        let tmp = tempfile::tempdir().unwrap();
        let server = tmp.path().join("minecraft");
        let roots = vec![
            server.clone(),
            server.join("plugins"),
            server.join("old_plugins"),
            server.join("old_paper"),
        ];
        let ops = FileOps::new(PathSandbox::new(roots).unwrap());
        (tmp, ops)
    }

    fn base(ops: &FileOps) -> PathBuf {
        ops.sandbox().base().to_path_buf()
    }

    #[test]
    fn list_sorts_dirs_first_then_case_insensitive() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        std::fs::write(b.join("server.properties"), "").unwrap();
        std::fs::write(b.join("Banned-players.json"), "").unwrap();
        std::fs::create_dir(b.join("world")).unwrap();

        let names: Vec<(String, bool)> = ops
            .list(".")
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        assert_eq!(
            names,
            vec![
                ("old_paper".to_string(), true),
                ("old_plugins".to_string(), true),
                ("plugins".to_string(), true),
                ("world".to_string(), true),
                ("Banned-players.json".to_string(), false),
                ("server.properties".to_string(), false),
            ]
        );
    }

    #[test]
    fn list_entries_carry_relative_paths() {
        let (_tmp, ops) = fixture();
        std::fs::write(base(&ops).join("plugins/a.jar"), "").unwrap();
        let entries = ops.list("plugins").unwrap();
        assert_eq!(entries[0].path, "plugins/a.jar");
    }

    #[test]
    fn root_view_lists_roots_only() {
        let (_tmp, ops) = fixture();
        std::fs::write(base(&ops).join("plugins/a.jar"), "").unwrap();
        let entries = ops.list(ROOT_VIEW).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec![".", "plugins", "old_plugins", "old_paper"]);
        assert!(entries.iter().all(|e| e.is_dir));
    }

    #[test]
    fn list_rejects_outside_and_non_directories() {
        let (_tmp, ops) = fixture();
        assert_eq!(ops.list("../..").unwrap_err().kind(), ErrorKind::AccessDenied);

        std::fs::write(base(&ops).join("eula.txt"), "eula=true").unwrap();
        assert_eq!(ops.list("eula.txt").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(ops.list("nope").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn move_into_directory_keeps_basename() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        std::fs::create_dir_all(b.join("a")).unwrap();
        std::fs::create_dir_all(b.join("c")).unwrap();
        std::fs::write(b.join("a/b.txt"), "x").unwrap();

        ops.move_item("a/b.txt", "c").unwrap();
        assert!(b.join("c/b.txt").is_file());
        assert!(!b.join("a/b.txt").exists());
    }

    #[test]
    fn move_to_new_name() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        std::fs::write(b.join("plugins/x.jar"), "x").unwrap();
        ops.move_item("plugins/x.jar", "old_plugins/x-1.0.jar").unwrap();
        assert!(b.join("old_plugins/x-1.0.jar").is_file());
    }

    #[test]
    fn move_refuses_to_overwrite() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        std::fs::write(b.join("plugins/x.jar"), "new").unwrap();
        std::fs::write(b.join("old_plugins/x.jar"), "old").unwrap();

        let err = ops.move_item("plugins/x.jar", "old_plugins").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(std::fs::read_to_string(b.join("old_plugins/x.jar")).unwrap(), "old");
    }

    #[test]
    fn move_checks_both_endpoints() {
        let (tmp, ops) = fixture();
        std::fs::write(base(&ops).join("plugins/x.jar"), "x").unwrap();
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();

        let err = ops
            .move_item("plugins/x.jar", outside.to_str().unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);

        std::fs::write(outside.join("evil.jar"), "x").unwrap();
        let err = ops.move_item("../outside/evil.jar", "plugins").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[test]
    fn move_missing_source_is_not_found() {
        let (_tmp, ops) = fixture();
        let err = ops.move_item("plugins/ghost.jar", "old_plugins").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn move_refuses_roots_and_self_nesting() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        let err = ops.move_item("plugins", "old_plugins").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);

        std::fs::create_dir_all(b.join("world/region")).unwrap();
        let err = ops.move_item("world", "world/region").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(b.join("world/region").is_dir());
    }

    #[test]
    fn move_into_missing_parent_names_the_target() {
        let (_tmp, ops) = fixture();
        std::fs::write(base(&ops).join("plugins/x.jar"), "x").unwrap();
        let err = ops
            .move_item("plugins/x.jar", "old_plugins/nowhere/x.jar")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("nowhere"), "{err}");
        assert!(base(&ops).join("plugins/x.jar").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn move_symlink_moves_the_link() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        std::fs::write(b.join("plugins/real.jar"), "x").unwrap();
        std::os::unix::fs::symlink(b.join("plugins/real.jar"), b.join("plugins/link.jar"))
            .unwrap();

        ops.move_item("plugins/link.jar", "old_plugins").unwrap();

        assert!(b.join("plugins/real.jar").is_file());
        assert!(std::fs::symlink_metadata(b.join("plugins/link.jar")).is_err());
        let moved = std::fs::symlink_metadata(b.join("old_plugins/link.jar")).unwrap();
        assert!(moved.file_type().is_symlink());
        assert!(!b.join("old_plugins/real.jar").exists());
    }

    #[cfg(unix)]
    #[test]
    fn rename_symlink_renames_the_link() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        std::fs::write(b.join("plugins/real.jar"), "x").unwrap();
        std::os::unix::fs::symlink("real.jar", b.join("plugins/link.jar")).unwrap();

        ops.rename("plugins/link.jar", "renamed.jar").unwrap();

        assert!(b.join("plugins/real.jar").is_file());
        assert!(std::fs::symlink_metadata(b.join("plugins/link.jar")).is_err());
        let renamed = std::fs::symlink_metadata(b.join("plugins/renamed.jar")).unwrap();
        assert!(renamed.file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(b.join("plugins/renamed.jar")).unwrap(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_can_be_renamed() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        std::os::unix::fs::symlink("gone.jar", b.join("plugins/stale.jar")).unwrap();

        ops.rename("plugins/stale.jar", "stale.jar.disabled").unwrap();
        let renamed = std::fs::symlink_metadata(b.join("plugins/stale.jar.disabled")).unwrap();
        assert!(renamed.file_type().is_symlink());
    }

    #[test]
    fn rename_rejects_path_like_names() {
        let (_tmp, ops) = fixture();
        std::fs::write(base(&ops).join("plugins/x.jar"), "x").unwrap();
        for bad in ["a/b.jar", "a\\b.jar", "..", "../../x.jar", "", "  ", "."] {
            let err = ops.rename("plugins/x.jar", bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "name {bad:?}");
        }
    }

    #[test]
    fn rename_refuses_existing_target() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        std::fs::write(b.join("plugins/x.jar"), "x").unwrap();
        std::fs::write(b.join("plugins/y.jar"), "y").unwrap();
        let err = ops.rename("plugins/x.jar", "y.jar").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(std::fs::read_to_string(b.join("plugins/y.jar")).unwrap(), "y");
    }

    #[test]
    fn rename_in_place() {
        let (_tmp, ops) = fixture();
        let b = base(&ops);
        std::fs::write(b.join("plugins/x.jar"), "x").unwrap();
        ops.rename("plugins/x.jar", "x.jar.disabled").unwrap();
        assert!(b.join("plugins/x.jar.disabled").is_file());

        assert_eq!(ops.rename("plugins/ghost", "g").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(ops.rename("plugins", "mods").unwrap_err().kind(), ErrorKind::AccessDenied);
    }

    #[test]
    fn upload_writes_sanitized_file() {
        let (_tmp, ops) = fixture();
        let outcome = ops
            .upload(&b"jar bytes"[..], "../My Plugin 1.2.jar", "plugins")
            .unwrap();
        assert_eq!(outcome.filename, "My_Plugin_1.2.jar");
        assert_eq!(outcome.path, "plugins/My_Plugin_1.2.jar");
        let stored = base(&ops).join("plugins/My_Plugin_1.2.jar");
        assert_eq!(std::fs::read(stored).unwrap(), b"jar bytes");
    }

    #[test]
    fn upload_extension_check() {
        let (_tmp, ops) = fixture();
        let err = ops.upload(&b""[..], "payload.sh", "plugins").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = ops.upload(&b""[..], "evil.jar.sh", "plugins").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(ops.upload(&b""[..], "Upper.JAR", "plugins").is_ok());
    }

    #[test]
    fn upload_rejects_empty_names_and_outside_destinations() {
        let (_tmp, ops) = fixture();
        let kind = |name: &str| ops.upload(&b""[..], name, "plugins").unwrap_err().kind();
        assert_eq!(kind(""), ErrorKind::Validation);
        assert_eq!(kind("日本.jar"), ErrorKind::Validation);
        assert_eq!(
            ops.upload(&b""[..], "x.jar", "../../tmp").unwrap_err().kind(),
            ErrorKind::AccessDenied
        );
    }

    #[test]
    fn upload_creates_destination() {
        let (_tmp, ops) = fixture();
        ops.upload(&b"x"[..], "x.jar", "plugins/staging").unwrap();
        assert!(base(&ops).join("plugins/staging/x.jar").is_file());
    }

    #[test]
    fn batch_reports_partial_success() {
        let (_tmp, ops) = fixture();
        let files = vec![
            ("good.jar".to_string(), &b"1"[..]),
            ("bad.exe".to_string(), &b"2"[..]),
        ];
        let report = ops.upload_batch(files, DEFAULT_UPLOAD_DIR);
        assert_eq!(report.status, OpStatus::PartialSuccess);
        assert!(report.message.contains("1 of 2"));
        assert_eq!(report.results[0].status, OpStatus::Success);
        assert_eq!(report.results[1].status, OpStatus::Error);
    }

    #[test]
    fn batch_all_or_nothing_statuses() {
        let (_tmp, ops) = fixture();
        let files = vec![
            ("a.jar".to_string(), &b""[..]),
            ("b.jar".to_string(), &b""[..]),
        ];
        let report = ops.upload_batch(files, "plugins");
        assert_eq!(report.status, OpStatus::Success);

        let report = ops.upload_batch(vec![("a.txt".to_string(), &b""[..])], "plugins");
        assert_eq!(report.status, OpStatus::Error);

        let report = ops.upload_batch(Vec::<(String, &[u8])>::new(), "plugins");
        assert_eq!(report.status, OpStatus::Error);
    }

    #[test]
    fn secure_filename_rules() {
        assert_eq!(secure_filename("My cool plugin.jar"), "My_cool_plugin.jar");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("..\\win\\x.jar"), "win_x.jar");
        assert_eq!(secure_filename("_.hidden.jar"), "hidden.jar");
        assert_eq!(secure_filename("naïve.jar"), "nave.jar");
        assert_eq!(secure_filename("a$b%c.jar"), "abc.jar");
        assert_eq!(secure_filename("..."), "");
    }
}
