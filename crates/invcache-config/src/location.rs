//! Backing file location resolution.
//!
//! Every process that cooperates on one inventory must land on the same
//! file, so both the directory probe order and the file name derivation are
//! deterministic.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{ConfigError, LocationConfig};

/// Resolved directory and file name of the backing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLocation {
    pub dir: PathBuf,
    pub file_name: String,
}

impl CacheLocation {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    /// Complete path to the backing file
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Normalize path, falling back to the original if canonicalization fails.
pub fn normalize_or_original(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Derive the cache file name from the invoking program.
///
/// The program lives inside a sub-directory of a project with a meaningful
/// name, so `<project>/inventory/invcache` yields `project_invcache.json`.
pub fn cache_file_name(program: impl AsRef<Path>) -> String {
    let program = normalize_or_original(program);

    let base = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let short = base.split('.').next().unwrap_or_default();

    let parent_name = program
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!("{}_{}.json", parent_name, short)
}

/// Directories to try, in order, when no explicit file is configured
pub fn candidate_dirs(config: &LocationConfig) -> Vec<PathBuf> {
    let tempdir = std::env::temp_dir();
    let mut candidates = Vec::with_capacity(5);
    if let Some(artifacts) = &config.artifacts {
        candidates.push(artifacts.clone());
    }
    if let Some(workspace) = &config.workspace {
        candidates.push(workspace.join("artifacts"));
        candidates.push(workspace.clone());
    }
    candidates.push(tempdir.join("artifacts"));
    candidates.push(tempdir);
    candidates
}

/// Create `dir` if needed and prove a file can be written inside it
fn ensure_writable(dir: &Path) -> std::io::Result<()> {
    // create_dir_all tolerates a directory that already exists (or appears
    // concurrently); everything else is a real failure for this candidate.
    std::fs::create_dir_all(dir)?;
    tempfile::tempfile_in(dir).map(drop)
}

/// Resolve where the backing file lives.
///
/// An explicit `cache_file` wins; its directory is created if needed.
/// Otherwise the first writable candidate from [`candidate_dirs`] is used
/// together with [`cache_file_name`] of `program`.
pub fn resolve_location(
    config: &LocationConfig,
    program: impl AsRef<Path>,
) -> Result<CacheLocation, ConfigError> {
    if let Some(file) = &config.cache_file {
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        std::fs::create_dir_all(&dir)?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| cache_file_name(program.as_ref()));
        return Ok(CacheLocation::new(dir, file_name));
    }

    let candidates = candidate_dirs(config);
    for dir in &candidates {
        match ensure_writable(dir) {
            Ok(()) => {
                debug!("Using cache directory {:?}", dir);
                return Ok(CacheLocation::new(dir.clone(), cache_file_name(program)));
            }
            Err(e) => debug!("Skipping cache directory {:?}: {}", dir, e),
        }
    }

    Err(ConfigError::NoWritableDirectory { candidates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_cache_file_name_uses_project_and_stem() {
        let name = cache_file_name("/nonexistent/myproject/inventory/invcache.py");
        assert_eq!(name, "myproject_invcache.json");
    }

    #[test]
    fn test_cache_file_name_strips_all_extensions() {
        let name = cache_file_name("/nonexistent/proj/bin/tool.tar.gz");
        assert_eq!(name, "proj_tool.json");
    }

    #[test]
    fn test_cache_file_name_is_stable() {
        let temp = tempdir().unwrap();
        let bin = temp.path().join("repo/bin");
        fs::create_dir_all(&bin).unwrap();
        let program = bin.join("invcache");
        fs::write(&program, "").unwrap();

        assert_eq!(cache_file_name(&program), cache_file_name(&program));
        assert_eq!(cache_file_name(&program), "repo_invcache.json");
    }

    #[test]
    fn test_normalize_or_original_returns_original_on_failure() {
        let fake_path = Path::new("/nonexistent/path/file.txt");
        assert_eq!(normalize_or_original(fake_path), fake_path);
    }

    #[test]
    fn test_candidate_order() {
        let config = LocationConfig {
            cache_file: None,
            artifacts: Some(PathBuf::from("/a")),
            workspace: Some(PathBuf::from("/w")),
        };
        let tmp = std::env::temp_dir();
        assert_eq!(
            candidate_dirs(&config),
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/w/artifacts"),
                PathBuf::from("/w"),
                tmp.join("artifacts"),
                tmp,
            ]
        );
    }

    #[test]
    fn test_candidates_skip_unset_dirs() {
        let candidates = candidate_dirs(&LocationConfig::default());
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_explicit_file_wins() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("nested/dir/custom.json");
        let config = LocationConfig {
            cache_file: Some(file.clone()),
            artifacts: Some(temp.path().join("ignored")),
            workspace: None,
        };

        let location = resolve_location(&config, "/x/y/prog").unwrap();
        assert_eq!(location.path(), file);
        assert!(temp.path().join("nested/dir").is_dir());
        assert!(!temp.path().join("ignored").exists());
    }

    #[test]
    fn test_artifacts_dir_created() {
        let temp = tempdir().unwrap();
        let artifacts = temp.path().join("artifacts");
        let config = LocationConfig {
            cache_file: None,
            artifacts: Some(artifacts.clone()),
            workspace: None,
        };

        let location = resolve_location(&config, "/x/proj/bin/prog").unwrap();
        assert_eq!(location.dir, artifacts);
        assert_eq!(location.file_name, "proj_prog.json");
        assert!(artifacts.is_dir());
    }

    #[test]
    fn test_existing_dir_accepted() {
        let temp = tempdir().unwrap();
        let config = LocationConfig {
            cache_file: None,
            artifacts: Some(temp.path().to_path_buf()),
            workspace: None,
        };
        let location = resolve_location(&config, "/x/proj/bin/prog").unwrap();
        assert_eq!(location.dir, temp.path());
    }

    #[test]
    fn test_unusable_candidate_falls_through() {
        let temp = tempdir().unwrap();
        // A regular file cannot be used as a directory.
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let workspace = temp.path().join("ws");
        let config = LocationConfig {
            cache_file: None,
            artifacts: Some(blocker),
            workspace: Some(workspace.clone()),
        };

        let location = resolve_location(&config, "/x/proj/bin/prog").unwrap();
        assert_eq!(location.dir, workspace.join("artifacts"));
    }
}
