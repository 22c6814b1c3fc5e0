//! Path utilities and XDG directory discovery.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::ConfigError;

/// XDG-compliant paths for the offline-sync daemon.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("dev", "offline-sync", "offsyncd"),
        }
    }

    /// User config directory (`~/.config/offsyncd/`).
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::Xdg("failed to determine user config directory".into()))
    }

    /// User config file path (`~/.config/offsyncd/config.toml`).
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// Project config file path (`offsync.toml`).
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("offsync.toml")
    }

    /// Local override file path (`offsync.local.toml`, gitignored).
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("offsync.local.toml")
    }

    /// Whether a project directory has been initialized.
    pub fn is_initialized(project_dir: impl AsRef<Path>) -> bool {
        Self::project_config_file(project_dir).exists()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn project_paths_are_relative_to_project_dir() {
        let temp = tempdir().unwrap();
        let project_dir = temp.path();

        assert_eq!(
            Paths::project_config_file(project_dir),
            project_dir.join("offsync.toml")
        );
        assert_eq!(
            Paths::local_config_file(project_dir),
            project_dir.join("offsync.local.toml")
        );
        assert!(!Paths::is_initialized(project_dir));

        std::fs::write(project_dir.join("offsync.toml"), "mode = \"master\"\n").unwrap();
        assert!(Paths::is_initialized(project_dir));
    }
}
