// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::app::services::launcher::ThrottleSettings;
use crate::app::services::monitor::MonitorSettings;

const APP_DIR_NAME: &str = "jobsd";
const CONFIG_FILE_NAME: &str = "jobsd.toml";
const CONFIG_ENV_VAR: &str = "JOBSD_CONFIG_PATH";
const DATABASE_FILE_NAME: &str = "jobsd.sqlite";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database_path: Option<String>,
    poll_interval_secs: Option<u64>,
    verbose: Option<bool>,
    sender_id: Option<String>,
    #[serde(default)]
    launch_throttle: ThrottleSettings,
    #[serde(default)]
    monitor: MonitorSettings,
}

#[derive(Debug)]
pub struct Config {
    pub database_path: PathBuf,
    pub poll_interval_secs: u64,
    pub verbose: bool,
    pub sender_id: String,
    pub launch_throttle: ThrottleSettings,
    pub monitor: MonitorSettings,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub database_path: ConfigValue<PathBuf>,
    pub poll_interval_secs: ConfigValue<u64>,
    pub verbose: ConfigValue<bool>,
    pub sender_id: ConfigValue<String>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub verbose: Option<bool>,
}

fn pick<T>(over: Option<T>, file: Option<T>, default: impl FnOnce() -> T) -> (T, ConfigSource) {
    match (over, file) {
        (Some(value), _) => (value, ConfigSource::Override),
        (None, Some(value)) => (value, ConfigSource::ConfigFile),
        (None, None) => (default(), ConfigSource::Default),
    }
}

#[cfg(test)]
fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path
        .as_deref()
        .map(|path| path.exists())
        .unwrap_or(false);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };

    let (database_path, database_source) = match overrides.database_path {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.database_path {
            Some(raw) => (
                resolve_path(
                    &raw,
                    config_path.as_deref().and_then(|path| path.parent()),
                ),
                ConfigSource::ConfigFile,
            ),
            None => (
                default_database_path().with_context(|| {
                    "failed to resolve default database path; specify --database-path or set database_path in the config file"
                })?,
                ConfigSource::Default,
            ),
        },
    };

    let (poll_interval_secs, poll_interval_source) = pick(
        overrides.poll_interval_secs,
        file_config.poll_interval_secs,
        || DEFAULT_POLL_INTERVAL_SECS,
    );
    if poll_interval_secs == 0 {
        anyhow::bail!("poll_interval_secs must be at least 1");
    }
    let (verbose, verbose_source) = pick(overrides.verbose, file_config.verbose, || false);
    let (sender_id, sender_id_source) = pick(None, file_config.sender_id, || {
        format!("jobsd-{}", std::process::id())
    });
    if sender_id.trim().is_empty() {
        anyhow::bail!("sender_id must not be empty");
    }

    let config = Config {
        database_path,
        poll_interval_secs,
        verbose,
        sender_id,
        launch_throttle: file_config.launch_throttle,
        monitor: file_config.monitor,
        config_path: config_path.clone(),
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        database_path: ConfigValue {
            value: config.database_path.clone(),
            source: database_source,
        },
        poll_interval_secs: ConfigValue {
            value: config.poll_interval_secs,
            source: poll_interval_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
        sender_id: ConfigValue {
            value: config.sender_id.clone(),
            source: sender_id_source,
        },
    };

    Ok(LoadResult { config, report })
}

pub fn ensure_database_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_database_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME).join(DATABASE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn clear(key: &'static str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.prev {
                // SAFETY: tests serialize env mutations with ENV_LOCK.
                Some(value) => unsafe { std::env::set_var(self.key, value) },
                // SAFETY: tests serialize env mutations with ENV_LOCK.
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let config_dir = dir.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        let config_path = config_dir.join("jobsd.toml");
        fs::write(&config_path, contents).unwrap();
        config_path
    }

    #[test]
    fn missing_optional_config_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let cfg = read_config_file(&dir.path().join("missing.toml"), false).unwrap();
        assert!(cfg.database_path.is_none());
        assert_eq!(cfg.monitor, MonitorSettings::default());
    }

    #[test]
    fn missing_required_config_file_errors() {
        let dir = TempDir::new().unwrap();
        let err = read_config_file(&dir.path().join("missing.toml"), true).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn file_values_and_tables_are_read() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            &dir,
            r#"
database_path = "db/jobsd.sqlite"
poll_interval_secs = 3
sender_id = "jobsd-a"

[launch_throttle]
max_launches = 2

[monitor]
scheduler_extension_minutes = 30
"#,
        );

        let LoadResult { config, report } =
            load_with_report(Some(config_path.clone()), Overrides::default()).unwrap();
        assert_eq!(
            config.database_path,
            config_path.parent().unwrap().join("db").join("jobsd.sqlite")
        );
        assert_eq!(config.poll_interval_secs, 3);
        assert_eq!(config.sender_id, "jobsd-a");
        assert_eq!(config.launch_throttle.max_launches, 2);
        assert_eq!(
            config.launch_throttle.window_millis,
            ThrottleSettings::default().window_millis
        );
        assert_eq!(config.monitor.scheduler_extension_minutes, 30);
        assert_eq!(config.monitor.initial_queuing_retries, 15);
        assert_eq!(report.sender_id.source, ConfigSource::ConfigFile);
        assert_eq!(report.verbose.source, ConfigSource::Default);
        assert!(report.config_file_present);
    }

    #[test]
    fn cli_overrides_take_precedence_per_field() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            &dir,
            "database_path = \"db/from_config.sqlite\"\npoll_interval_secs = 9\nverbose = false\n",
        );

        let config = load(
            Some(config_path.clone()),
            Overrides {
                database_path: None,
                poll_interval_secs: Some(2),
                verbose: Some(true),
            },
        )
        .unwrap();
        assert_eq!(
            config.database_path,
            config_path
                .parent()
                .unwrap()
                .join("db")
                .join("from_config.sqlite")
        );
        assert_eq!(config.poll_interval_secs, 2);
        assert!(config.verbose);

        let config = load(
            Some(config_path),
            Overrides {
                database_path: Some(PathBuf::from("from_flag.sqlite")),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("from_flag.sqlite"));
        assert_eq!(config.poll_interval_secs, 9);
    }

    #[test]
    fn defaults_apply_when_keys_are_missing() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir, "database_path = \"db/jobsd.sqlite\"\n");
        let config = load(Some(config_path), Overrides::default()).unwrap();
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert!(config.sender_id.starts_with("jobsd-"));
        assert!(!config.verbose);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path =
            write_config(&dir, "database_path = \"x.sqlite\"\npoll_interval_secs = 0\n");
        let err = load(Some(config_path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn ensure_database_dir_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("jobsd.sqlite");
        ensure_database_dir(&db_path).unwrap();
        assert!(dir.path().join("nested").is_dir());
        ensure_database_dir(Path::new("jobsd.sqlite")).unwrap();
    }

    #[test]
    fn env_config_path_used_when_no_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let config_path =
            write_config(&dir, "database_path = \"db.sqlite\"\npoll_interval_secs = 4\n");
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, config_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(None, Overrides::default()).unwrap();
        assert_eq!(config.poll_interval_secs, 4);
        assert_eq!(config.config_path, Some(config_path));
        assert_eq!(report.config_path_source, Some(ConfigSource::Env));
    }

    #[test]
    fn cli_config_path_takes_precedence_over_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("env.toml");
        let cli_path = dir.path().join("cli.toml");
        fs::write(&env_path, "database_path = \"db.sqlite\"\npoll_interval_secs = 4\n").unwrap();
        fs::write(&cli_path, "database_path = \"db.sqlite\"\npoll_interval_secs = 5\n").unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, env_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(Some(cli_path.clone()), Overrides::default()).unwrap();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.config_path, Some(cli_path));
        assert_eq!(report.config_path_source, Some(ConfigSource::Override));
    }
}
