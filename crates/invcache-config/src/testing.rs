//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated artifacts directory
//! - An isolated workspace directory
//! - A unique cache file name per environment
//!
//! # Usage
//!
//! ```ignore
//! use invcache_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let location = env.location();
//!     // location.path() is unique to this test
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{CacheLocation, LocationConfig};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Isolated artifacts directory
    pub artifacts_dir: PathBuf,
    /// Isolated workspace directory
    pub workspace_dir: PathBuf,
    /// Cache file name for this environment, unique per process
    pub file_name: String,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let artifacts_dir = root.join("artifacts");
        let workspace_dir = root.join("workspace");
        std::fs::create_dir_all(&artifacts_dir)?;
        std::fs::create_dir_all(&workspace_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            artifacts_dir,
            workspace_dir,
            file_name: format!("invcache-test-{}.json", test_id),
        })
    }

    /// Location of the backing file inside the artifacts directory
    pub fn location(&self) -> CacheLocation {
        CacheLocation::new(&self.artifacts_dir, &self.file_name)
    }

    /// Full path of the backing file
    pub fn cache_path(&self) -> PathBuf {
        self.location().path()
    }

    /// Location config pointing probing at this environment
    pub fn location_config(&self) -> LocationConfig {
        LocationConfig {
            cache_file: None,
            artifacts: Some(self.artifacts_dir.clone()),
            workspace: Some(self.workspace_dir.clone()),
        }
    }

    /// Overwrite the backing file with raw contents
    pub fn write_cache(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.cache_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Raw backing file contents, `None` if it does not exist
    pub fn read_cache(&self) -> Option<String> {
        std::fs::read_to_string(self.cache_path()).ok()
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
