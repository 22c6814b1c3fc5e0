//! Configuration loader with multi-source merging.

use std::env;
use std::path::{Path, PathBuf};

use crate::{error::ConfigError, OffsyncConfig, Paths};

/// Configuration loader with a builder pattern, mirroring the
/// precedence documented on [`OffsyncConfig`].
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "OFFSYNC".to_string(),
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Loads configuration from all sources with proper precedence and
    /// runs [`OffsyncConfig::validate`].
    pub fn load(self) -> Result<OffsyncConfig, ConfigError> {
        let mut builder = config::Config::builder();

        let defaults = OffsyncConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("_")
                .try_parsing(true),
        );

        let built = builder.build()?;
        let cfg: OffsyncConfig = built.try_deserialize()?;
        Ok(cfg)
    }

    /// Loads configuration, falling back to defaults on any error.
    /// Used by tooling that wants a best-effort config rather than a
    /// hard failure (e.g. `offsyncd config show`).
    pub fn load_or_default(self) -> OffsyncConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_when_no_files_present() {
        let temp = tempdir().unwrap();
        let config = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .unwrap();

        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.bus.topics.master_updates, "master-updates");
    }

    #[test]
    fn project_config_overrides_defaults() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("offsync.toml"),
            r#"
mode = "master"

[sync]
batchSize = 25
"#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .unwrap();

        assert_eq!(config.sync.batch_size, 25);
    }

    #[test]
    fn local_config_overrides_project_config() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("offsync.toml"),
            "[sync]\nbatchSize = 25\n",
        )
        .unwrap();
        fs::write(
            temp.path().join("offsync.local.toml"),
            "[sync]\nbatchSize = 10\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .unwrap();

        assert_eq!(config.sync.batch_size, 10);
    }
}
