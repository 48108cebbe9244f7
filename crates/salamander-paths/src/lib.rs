use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("home directory not found; set the $HOME environment variable")]
    HomeNotFound,
}

/// Centralized path construction for the `~/.salamander/` directory layout.
///
/// Single source of truth for every path under `~/.salamander/`. Use `resolve()`
/// in production code and `from_dir()` in tests.
#[derive(Debug, Clone)]
pub struct SalamanderPaths {
    base_dir: PathBuf,
}

impl SalamanderPaths {
    /// Resolve paths from the user's home directory (`~/.salamander`).
    pub fn resolve() -> Result<Self, PathError> {
        let home = dirs::home_dir().ok_or(PathError::HomeNotFound)?;
        Ok(Self {
            base_dir: home.join(".salamander"),
        })
    }

    /// Create paths from an explicit base directory. Use in tests.
    pub fn from_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// The base `~/.salamander` directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // --- Task list ---

    pub fn tasklist_dir(&self) -> PathBuf {
        self.base_dir.join("tasklist")
    }

    /// Shared process table. Only read or written while holding `tasklist_lock()`.
    pub fn tasklist_file(&self) -> PathBuf {
        self.tasklist_dir().join("processlist.json")
    }

    pub fn tasklist_lock(&self) -> PathBuf {
        self.tasklist_dir().join("processlist.lock")
    }

    pub fn control_dir(&self) -> PathBuf {
        self.tasklist_dir().join("control")
    }

    /// Control socket of the instance running as `pid`.
    pub fn control_socket(&self, pid: u32) -> PathBuf {
        self.control_dir().join(format!("{pid}.sock"))
    }

    // --- Top-level files ---

    pub fn user_config(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    // --- Static helpers (no self) ---

    /// Project-level config: `<project_root>/.salamander/config.toml`.
    pub fn project_config(project_root: &Path) -> PathBuf {
        project_root.join(".salamander").join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_paths() -> SalamanderPaths {
        SalamanderPaths::from_dir(PathBuf::from("/home/user/.salamander"))
    }

    #[test]
    fn test_resolve_returns_ok_when_home_set() {
        // HOME is set in CI and dev environments
        let result = SalamanderPaths::resolve();
        assert!(result.is_ok());
        let paths = result.unwrap();
        assert!(paths.base_dir().to_string_lossy().contains(".salamander"));
    }

    #[test]
    fn test_from_dir() {
        let paths = SalamanderPaths::from_dir(PathBuf::from("/tmp/test-salamander"));
        assert_eq!(paths.base_dir(), Path::new("/tmp/test-salamander"));
    }

    #[test]
    fn test_tasklist_layout() {
        let paths = test_paths();
        assert_eq!(
            paths.tasklist_file(),
            PathBuf::from("/home/user/.salamander/tasklist/processlist.json")
        );
        assert_eq!(
            paths.tasklist_lock(),
            PathBuf::from("/home/user/.salamander/tasklist/processlist.lock")
        );
    }

    #[test]
    fn test_control_socket() {
        assert_eq!(
            test_paths().control_socket(4242),
            PathBuf::from("/home/user/.salamander/tasklist/control/4242.sock")
        );
    }

    #[test]
    fn test_user_config() {
        assert_eq!(
            test_paths().user_config(),
            PathBuf::from("/home/user/.salamander/config.toml")
        );
    }

    #[test]
    fn test_project_config() {
        assert_eq!(
            SalamanderPaths::project_config(Path::new("/work/repo")),
            PathBuf::from("/work/repo/.salamander/config.toml")
        );
    }
}
