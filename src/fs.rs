//! Filesystem adapter: job-name/file-name normalisation, extension-from-code
//! lookup, and non-overwrite renaming, shared by both engines.

use std::path::{Path, PathBuf};

use log::debug;

/// What to do when a write target already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Clobber the existing file.
    Allow,
    /// Append `-N` before the extension, smallest `N >= 1` that doesn't exist.
    Deny,
}

/// Host-side storage backend for job files, related files, and system tables.
pub struct FilesystemAdapter {
    root: PathBuf,
    whitelist: Option<Vec<String>>,
    overwrite: OverwritePolicy,
}

impl FilesystemAdapter {
    pub fn new(root: impl Into<PathBuf>, whitelist: Option<Vec<String>>, overwrite: OverwritePolicy) -> Self {
        Self {
            root: root.into(),
            whitelist,
            overwrite,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn whitelist(&self) -> Option<&[String]> {
        self.whitelist.as_deref()
    }

    pub fn overwrite(&self) -> OverwritePolicy {
        self.overwrite
    }

    pub fn resolve(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Ensures any `//NAME <base>` directive in `content` matches `base_name`
    /// (the filename without extension), logging corrections, and enforces
    /// `\r\n` line endings with a trailing terminator.
    ///
    /// Wire content is `\r`-delimited (the BSC teletype convention), so lines
    /// are split on bare `\r` rather than `\n`.
    ///
    /// Idempotent: `normalise(base, normalise(base, c)) == normalise(base, c)`.
    pub fn normalise(&self, base_name: &str, content: &str) -> String {
        let expected_entry = format!("//NAME {base_name}");

        let mut result = Vec::new();
        for line in content.split(['\r', '\n']).filter(|l| !l.is_empty()) {
            if line.starts_with("//NAME ") && line != expected_entry {
                debug!(
                    "{}: changing job name from {:?} to {:?}",
                    base_name, line, expected_entry
                );
                result.push(expected_entry.clone());
            } else {
                result.push(line.to_string());
            }
        }

        let mut joined = result.join("\r\n");
        joined.push_str("\r\n");
        joined
    }

    /// Returns `desired` unchanged if overwrite is allowed or the path is
    /// free; otherwise finds the smallest `N >= 1` such that
    /// `<stem>-N<ext>` does not exist, and returns that instead.
    pub fn resolve_write_target(&self, desired: &Path) -> PathBuf {
        if self.overwrite == OverwritePolicy::Allow || !desired.exists() {
            return desired.to_path_buf();
        }

        let stem = desired
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = desired
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let parent = desired.parent().unwrap_or_else(|| Path::new(""));

        let mut n = 1u32;
        loop {
            let candidate = parent.join(format!("{stem}-{n}{ext}"));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Either the whitelist filtered to files that currently exist, or all
    /// `*.JBI` files in the root directory whose name length satisfies
    /// `4 < len < 17`.
    pub fn list_job_files(&self) -> std::io::Result<Vec<String>> {
        if let Some(whitelist) = &self.whitelist {
            return Ok(whitelist
                .iter()
                .filter(|name| self.root.join(name).exists())
                .cloned()
                .collect());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".JBI") && name.len() > 4 && name.len() < 17 {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Extension implied by a BSC transaction code, per the fixed table in the
/// system overview. Defaults to `DAT` for anything not explicitly job data.
pub fn extension_for_code(code: &str) -> &'static str {
    match code {
        "02,001" | "02,051" => "JBI",
        "02,002" | "02,052" => "JBR",
        _ => "DAT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn normalise_rewrites_mismatched_name_line() {
        let adapter = FilesystemAdapter::new(".", None, OverwritePolicy::Deny);
        let content = "//NAME OLDJOB\nNOP\nEND";
        let fixed = adapter.normalise("JOB1", content);
        assert_eq!(fixed, "//NAME JOB1\r\nNOP\r\nEND\r\n");
    }

    #[test]
    fn normalise_is_idempotent() {
        let adapter = FilesystemAdapter::new(".", None, OverwritePolicy::Deny);
        let once = adapter.normalise("JOB1", "//NAME WRONG\nNOP\nEND");
        let twice = adapter.normalise("JOB1", &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalise_leaves_matching_name_alone() {
        let adapter = FilesystemAdapter::new(".", None, OverwritePolicy::Deny);
        let fixed = adapter.normalise("JOB1", "//NAME JOB1\nNOP\nEND");
        assert_eq!(fixed, "//NAME JOB1\r\nNOP\r\nEND\r\n");
    }

    #[test]
    fn resolve_write_target_allow_always_returns_desired() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("TEST.JBI"), b"existing").unwrap();
        let adapter = FilesystemAdapter::new(dir.path(), None, OverwritePolicy::Allow);
        let target = adapter.resolve_write_target(&dir.path().join("TEST.JBI"));
        assert_eq!(target, dir.path().join("TEST.JBI"));
    }

    #[test]
    fn resolve_write_target_deny_finds_next_free_suffix() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("TEST.JBI"), b"one").unwrap();
        std::fs::write(dir.path().join("TEST-1.JBI"), b"two").unwrap();
        let adapter = FilesystemAdapter::new(dir.path(), None, OverwritePolicy::Deny);
        let target = adapter.resolve_write_target(&dir.path().join("TEST.JBI"));
        assert_eq!(target, dir.path().join("TEST-2.JBI"));
    }

    #[test]
    fn resolve_write_target_deny_absent_file_returns_input() {
        let dir = tempdir().unwrap();
        let adapter = FilesystemAdapter::new(dir.path(), None, OverwritePolicy::Deny);
        let desired = dir.path().join("NEW.JBI");
        assert_eq!(adapter.resolve_write_target(&desired), desired);
    }

    #[test]
    fn list_job_files_whitelist_filters_to_existing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("A.JBI"), b"").unwrap();
        let adapter = FilesystemAdapter::new(
            dir.path(),
            Some(vec!["A.JBI".into(), "MISSING.JBI".into()]),
            OverwritePolicy::Deny,
        );
        assert_eq!(adapter.list_job_files().unwrap(), vec!["A.JBI".to_string()]);
    }

    #[test]
    fn list_job_files_enumerates_jbi_within_length_bounds() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("OK.JBI"), b"").unwrap();
        std::fs::write(dir.path().join("X.JBI"), b"").unwrap();
        std::fs::write(dir.path().join("TOO-LONG-NAME-HERE.JBI"), b"").unwrap();
        std::fs::write(dir.path().join("IGNORED.DAT"), b"").unwrap();
        let adapter = FilesystemAdapter::new(dir.path(), None, OverwritePolicy::Deny);
        let files = adapter.list_job_files().unwrap();
        assert!(files.contains(&"OK.JBI".to_string()));
        assert!(files.contains(&"X.JBI".to_string()));
        assert!(!files.iter().any(|f| f.starts_with("TOO-LONG")));
        assert!(!files.iter().any(|f| f.ends_with(".DAT")));
    }

    #[test]
    fn extension_for_code_table() {
        assert_eq!(extension_for_code("02,001"), "JBI");
        assert_eq!(extension_for_code("02,051"), "JBI");
        assert_eq!(extension_for_code("02,002"), "JBR");
        assert_eq!(extension_for_code("02,052"), "JBR");
        assert_eq!(extension_for_code("02,012"), "DAT");
        assert_eq!(extension_for_code("01,000"), "DAT");
    }
}
