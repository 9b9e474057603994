//! Files under the per-user data directory.
//!
//! - `config.json`: user defaults, created on first use
//! - `state.json`: the active session; absent when idle
//! - `intent.json`: current, pinned and recent intents
//! - `log.jsonl`: append-only audit log, one compact object per line
//!
//! Whole-file writes go to a sibling temp file first and are renamed over
//! the target, so readers never see a partial file. Reads that fail to parse
//! are treated as "nothing there".

use crate::config::Config;
use crate::intent::TaskIntentState;
use crate::session::{LogEvent, PomodoroState};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    /// Open the store in `data_dir_override`, or the platform default.
    pub fn open(data_dir_override: Option<&Path>) -> Result<Self> {
        let dir = match data_dir_override {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_data_dir()?,
        };
        Self::at(dir)
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create data directory: {}", data_dir.display())
        })?;
        Ok(Self { data_dir })
    }

    pub fn default_data_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "pomodoro", "Pomodoro")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(proj_dirs.data_local_dir().to_path_buf())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn intent_path(&self) -> PathBuf {
        self.data_dir.join("intent.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("log.jsonl")
    }

    /// Diagnostic log of the resident process.
    pub fn daemon_log_path(&self) -> PathBuf {
        self.data_dir.join("daemon.log")
    }

    /// Load `config.json`, writing the defaults when it is missing or
    /// unreadable.
    pub fn load_or_create_config(&self) -> Result<Config> {
        let path = self.config_path();
        if path.exists() {
            if let Some(config) = read_json::<Config>(&path) {
                return Ok(config);
            }
            warn!("Replacing unreadable config at {}", path.display());
        }
        let config = Config::default();
        self.save_config(&config)?;
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        write_json(&self.config_path(), config)
    }

    /// The active session, or `None` when there is none or the file cannot
    /// be used.
    pub fn try_load_state(&self) -> Option<PomodoroState> {
        let path = self.state_path();
        if !path.exists() {
            return None;
        }
        let state = read_json::<PomodoroState>(&path)?;
        if !state.is_well_formed() {
            warn!("Ignoring inconsistent session state at {}", path.display());
            return None;
        }
        Some(state)
    }

    pub fn save_state(&self, state: &PomodoroState) -> Result<()> {
        write_json(&self.state_path(), state)
    }

    pub fn delete_state(&self) -> Result<()> {
        let path = self.state_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete state file: {}", path.display()))
            }
        }
    }

    pub fn load_intent(&self) -> TaskIntentState {
        let mut intent = read_json::<TaskIntentState>(&self.intent_path()).unwrap_or_default();
        intent.normalize();
        intent
    }

    pub fn save_intent(&self, intent: &TaskIntentState) -> Result<()> {
        write_json(&self.intent_path(), intent)
    }

    pub fn append_log(&self, event: &LogEvent) -> Result<()> {
        let path = self.log_path();
        let mut line = serde_json::to_string(event).context("Failed to serialize log event")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to log file: {}", path.display()))?;
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    atomic_write(path, &json)
}

/// Write `contents` to a temp file next to `path`, then rename it over
/// `path`.
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Invalid path: {}", path.display()))?;

    // Same directory keeps the rename on one filesystem.
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown"),
        std::process::id()
    ));

    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
