//! Base directory resolution.
//!
//! The base directory is kept in two forms. The raw form is what the user
//! supplied and is what gets handed to other tools, so their messages and
//! logs show the same path the user typed. The canonical form is only used
//! for comparisons inside this process.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable naming the source tree root.
pub const BASE_DIR_VAR: &str = "ZEPHYR_BASE";

/// A validated base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDir {
    raw: PathBuf,
    canonical: PathBuf,
}

impl BaseDir {
    /// Resolve the base directory from [`BASE_DIR_VAR`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_var(std::env::var_os(BASE_DIR_VAR))
    }

    fn from_var(value: Option<std::ffi::OsString>) -> Result<Self, ConfigError> {
        match value {
            Some(v) if !v.is_empty() => Self::from_path(PathBuf::from(v)),
            _ => Err(ConfigError::MissingBaseDir(BASE_DIR_VAR)),
        }
    }

    /// Validate an explicit path.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let raw = path.into();
        let canonical = std::fs::canonicalize(&raw).map_err(|source| ConfigError::InvalidBaseDir {
            path: raw.clone(),
            source,
        })?;

        if !canonical.is_dir() {
            return Err(ConfigError::NotADirectory(raw));
        }

        tracing::debug!("Base directory {} -> {}", raw.display(), canonical.display());
        Ok(Self { raw, canonical })
    }

    /// The path as supplied. Pass this to child processes.
    pub fn raw(&self) -> &Path {
        &self.raw
    }

    /// The resolved absolute path. Use this for comparisons.
    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    /// Whether `path` lives inside the base directory.
    ///
    /// Paths that cannot be canonicalized (e.g. they do not exist) are
    /// compared as given when absolute, and are otherwise outside.
    pub fn contains(&self, path: &Path) -> bool {
        self.relativize(path).is_some()
    }

    /// `path` relative to the base directory, if it lives inside it.
    pub fn relativize(&self, path: &Path) -> Option<PathBuf> {
        let resolved = match std::fs::canonicalize(path) {
            Ok(p) => p,
            Err(_) if path.is_absolute() => path.to_path_buf(),
            Err(_) => return None,
        };

        resolved
            .strip_prefix(&self.canonical)
            .ok()
            .map(Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable() {
        let err = BaseDir::from_var(None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseDir("ZEPHYR_BASE")));
        assert_eq!(err.to_string(), "$ZEPHYR_BASE environment variable undefined");
    }

    #[test]
    fn test_empty_variable() {
        let err = BaseDir::from_var(Some("".into())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseDir(_)));
    }

    #[test]
    fn test_nonexistent_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let err = BaseDir::from_path(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseDir { .. }));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();

        let err = BaseDir::from_path(&file).unwrap_err();
        assert!(matches!(err, ConfigError::NotADirectory(_)));
    }

    #[test]
    fn test_raw_is_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tree")).unwrap();
        let dotted = dir.path().join("tree").join("..").join("tree");

        let base = BaseDir::from_path(&dotted).unwrap();
        assert_eq!(base.raw(), dotted.as_path());
        assert_eq!(base.canonical(), std::fs::canonicalize(dir.path().join("tree")).unwrap());
    }

    #[test]
    fn test_contains_compares_canonical_paths() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("samples")).unwrap();
        let base = BaseDir::from_path(&tree).unwrap();

        let inside = tree.join("samples").join("..").join("samples");
        assert!(base.contains(&inside));
        assert_eq!(base.relativize(&inside), Some(PathBuf::from("samples")));

        assert!(!base.contains(dir.path()));
    }

    #[test]
    fn test_relative_missing_path_is_outside() {
        let dir = tempfile::tempdir().unwrap();
        let base = BaseDir::from_path(dir.path()).unwrap();
        assert!(!base.contains(Path::new("no/such/relative/path")));
    }
}
