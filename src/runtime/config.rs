//! Configuration persistence with atomic writes
//!
//! `RunnerConfig` is stored as pretty JSON. Writes are staged in a hidden
//! sibling file that is synced and renamed over the target, so a crash never
//! leaves a torn config behind.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use super::RunnerConfig;

/// File name used when a directory is given instead of a file.
pub const CONFIG_FILE: &str = "segue.json";

/// Resolve `path` to a config file, appending [`CONFIG_FILE`] to directories.
pub fn config_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(CONFIG_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Replace `path` with `data` in one step.
///
/// The bytes go to a hidden sibling named after the target plus a random
/// suffix, so concurrent writers and unrelated `*.tmp` files never collide.
/// The sibling is removed again if anything before the rename fails.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .with_context(|| format!("Not a file path: {:?}", path))?;
    let staging = path.with_file_name(format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    let staged = stage(&staging, data).and_then(|()| {
        fs::rename(&staging, path)
            .with_context(|| format!("Failed to replace {:?}", path))
    });
    if let Err(err) = staged {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }

    // The rename is durable only once the directory entry is.
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        File::open(dir)
            .and_then(|dir| dir.sync_all())
            .with_context(|| format!("Failed to sync directory: {:?}", dir))?;
    }

    Ok(())
}

fn stage(staging: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging)
        .with_context(|| format!("Failed to create {:?}", staging))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("Failed to write {:?}", staging))
}

/// Write configuration to `path` (a file, or a directory to hold [`CONFIG_FILE`])
pub fn write_config(path: &Path, config: &RunnerConfig) -> Result<PathBuf> {
    let config_path = config_path(path);
    if let Some(parent) = config_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;
    write_atomic(&config_path, &json)?;

    Ok(config_path)
}

/// Load configuration from `path` (a file, or a directory holding [`CONFIG_FILE`])
///
/// Fields missing from the file take their default values.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    let config_path = config_path(path);

    let data = fs::read(&config_path)
        .with_context(|| format!("Failed to read file: {:?}", config_path))?;
    let config: RunnerConfig =
        serde_json::from_slice(&data).context("Failed to deserialize config")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_config() {
        let temp = TempDir::new().unwrap();

        let config = RunnerConfig {
            prompt: "$ ".to_string(),
            worker_stack_size: Some(1 << 20),
            debug: true,
            ..RunnerConfig::default()
        };

        let written = write_config(temp.path(), &config).unwrap();
        assert_eq!(written, temp.path().join(CONFIG_FILE));

        let loaded = load_config(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.json");
        fs::write(&path, br#"{ "continuation_prompt": "> " }"#).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.continuation_prompt, "> ");
        assert_eq!(loaded.prompt, RunnerConfig::default().prompt);
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_atomic_write() {
        let temp = TempDir::new().unwrap();
        let test_file = temp.path().join("test.dat");

        write_atomic(&test_file, b"Hello, world!").unwrap();
        write_atomic(&test_file, b"replaced").unwrap();

        assert_eq!(fs::read(&test_file).unwrap(), b"replaced");
        assert_eq!(entries(temp.path()), vec!["test.dat".to_string()]);
    }

    #[test]
    fn test_atomic_write_leaves_neighbours_alone() {
        let temp = TempDir::new().unwrap();
        // Shares the stem with the target.
        let neighbour = temp.path().join("segue.tmp");
        fs::write(&neighbour, b"keep me").unwrap();

        write_config(temp.path(), &RunnerConfig::default()).unwrap();

        assert_eq!(fs::read(&neighbour).unwrap(), b"keep me");
        assert_eq!(
            entries(temp.path()),
            vec![CONFIG_FILE.to_string(), "segue.tmp".to_string()]
        );
    }

    #[test]
    fn test_failed_atomic_write_cleans_up() {
        let temp = TempDir::new().unwrap();
        // A non-empty directory cannot be replaced by a file.
        let target = temp.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("inner"), b"x").unwrap();

        assert!(write_atomic(&target, b"data").is_err());
        assert_eq!(entries(temp.path()), vec!["occupied".to_string()]);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(load_config(&temp.path().join("absent.json")).is_err());
    }
}
