//! User-editable defaults (`config.json`) and how they combine with
//! per-invocation overrides into [`SessionOptions`].

use crate::session::{SessionOptions, MAX_CYCLES, MAX_PHASE_MINUTES};
use pomodoro_ipc::IpcRequest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    pub work_minutes: u32,
    pub break_minutes: u32,
    pub long_break_minutes: u32,
    pub cycles: u32,
    pub auto_advance: bool,
    pub popup: bool,
    pub sound: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            break_minutes: 5,
            long_break_minutes: 15,
            cycles: 4,
            auto_advance: true,
            popup: true,
            sound: true,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Invalid boolean: {0}")]
    InvalidBoolean(String),

    #[error("Unknown config key: {0} (expected work, break, long, cycles, auto, popup or sound)")]
    UnknownKey(String),
}

impl Config {
    /// A copy with `key` set to `value`, as typed on the command line.
    ///
    /// Durations are whole minutes up to a day and cycles at most
    /// [`MAX_CYCLES`]; zero is rejected. Booleans accept true/false,
    /// 1/0, yes/no and on/off in any case.
    pub fn with_setting(&self, key: &str, value: &str) -> Result<Config, ConfigError> {
        let mut updated = self.clone();
        match key.to_ascii_lowercase().as_str() {
            "work" => updated.work_minutes = parse_bounded(value, MAX_PHASE_MINUTES)?,
            "break" => updated.break_minutes = parse_bounded(value, MAX_PHASE_MINUTES)?,
            "long" => updated.long_break_minutes = parse_bounded(value, MAX_PHASE_MINUTES)?,
            "cycles" => updated.cycles = parse_bounded(value, MAX_CYCLES)?,
            "auto" => updated.auto_advance = parse_bool(value)?,
            "popup" => updated.popup = parse_bool(value)?,
            "sound" => updated.sound = parse_bool(value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(updated)
    }

    /// Merge with `overrides`. Durations are clamped to one minute..one day
    /// and the cycle count to `1..=MAX_CYCLES`.
    pub fn session_options(&self, overrides: &StartOverrides) -> SessionOptions {
        let minutes =
            |value: Option<u32>, fallback: u32| i64::from(value.unwrap_or(fallback).clamp(1, MAX_PHASE_MINUTES)) * 60;
        SessionOptions {
            work_seconds: minutes(overrides.work_minutes, self.work_minutes),
            break_seconds: minutes(overrides.break_minutes, self.break_minutes),
            long_break_seconds: minutes(overrides.long_break_minutes, self.long_break_minutes),
            cycles: overrides.cycles.unwrap_or(self.cycles).clamp(1, MAX_CYCLES),
            auto_advance: overrides.auto_advance.unwrap_or(self.auto_advance),
            popup: overrides.popup.unwrap_or(self.popup),
            sound: overrides.sound.unwrap_or(self.sound),
        }
    }
}

/// Per-invocation values given to `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOverrides {
    pub work_minutes: Option<u32>,
    pub break_minutes: Option<u32>,
    pub long_break_minutes: Option<u32>,
    pub cycles: Option<u32>,
    pub auto_advance: Option<bool>,
    pub popup: Option<bool>,
    pub sound: Option<bool>,
}

impl StartOverrides {
    /// Read the `--work/--break/--long/--cycles` values and the
    /// `--auto/--no-auto`, `--popup/--no-popup`, `--sound/--no-sound` pairs.
    ///
    /// Values that do not parse fall back to the configured default.
    pub fn from_request(request: &IpcRequest) -> Self {
        let number = |name: &str| {
            request
                .option(name)
                .flatten()
                .and_then(|raw| raw.trim().parse::<u32>().ok())
        };
        let toggle = |on: &str, off: &str| {
            if request.has_flag(on) {
                Some(true)
            } else if request.has_flag(off) {
                Some(false)
            } else {
                None
            }
        };
        Self {
            work_minutes: number("--work"),
            break_minutes: number("--break"),
            long_break_minutes: number("--long"),
            cycles: number("--cycles"),
            auto_advance: toggle("--auto", "--no-auto"),
            popup: toggle("--popup", "--no-popup"),
            sound: toggle("--sound", "--no-sound"),
        }
    }
}

fn parse_bounded(value: &str, max: u32) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(ConfigError::InvalidNumber(value.to_string())),
    }
}

fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn start_request(pairs: &[(&str, Option<&str>)]) -> IpcRequest {
        let options: BTreeMap<String, Option<String>> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect();
        IpcRequest::new("start").with_options(options)
    }

    #[test]
    fn defaults_match_the_classic_technique() {
        let config = Config::default();
        assert_eq!(config.work_minutes, 25);
        assert_eq!(config.break_minutes, 5);
        assert_eq!(config.long_break_minutes, 15);
        assert_eq!(config.cycles, 4);
        assert!(config.auto_advance && config.popup && config.sound);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"WorkMinutes": 50}"#).unwrap();
        assert_eq!(config.work_minutes, 50);
        assert_eq!(config.break_minutes, 5);
        assert_eq!(config.cycles, 4);
    }

    #[test]
    fn with_setting_updates_one_field() {
        let config = Config::default();
        let updated = config.with_setting("work", "45").unwrap();
        assert_eq!(updated.work_minutes, 45);
        assert_eq!(updated.break_minutes, config.break_minutes);

        let updated = config.with_setting("AUTO", "no").unwrap();
        assert!(!updated.auto_advance);
        let updated = config.with_setting("sound", "Off").unwrap();
        assert!(!updated.sound);
    }

    #[test]
    fn with_setting_rejects_bad_input_without_touching_config() {
        let config = Config::default();
        assert_eq!(
            config.with_setting("cycles", "many"),
            Err(ConfigError::InvalidNumber("many".to_string()))
        );
        assert_eq!(
            config.with_setting("work", "0"),
            Err(ConfigError::InvalidNumber("0".to_string()))
        );
        assert_eq!(
            config.with_setting("long", "1441"),
            Err(ConfigError::InvalidNumber("1441".to_string()))
        );
        assert_eq!(
            config.with_setting("cycles", "101"),
            Err(ConfigError::InvalidNumber("101".to_string()))
        );
        assert_eq!(
            config.with_setting("popup", "maybe"),
            Err(ConfigError::InvalidBoolean("maybe".to_string()))
        );
        assert_eq!(
            config.with_setting("colour", "red"),
            Err(ConfigError::UnknownKey("colour".to_string()))
        );
        assert_eq!(config, Config::default());
    }

    #[test]
    fn overrides_win_over_config() {
        let request = start_request(&[
            ("--work", Some("1")),
            ("--cycles", Some("2")),
            ("--no-auto", None),
            ("--popup", None),
        ]);
        let options = Config::default().session_options(&StartOverrides::from_request(&request));
        assert_eq!(options.work_seconds, 60);
        assert_eq!(options.break_seconds, 300);
        assert_eq!(options.long_break_seconds, 900);
        assert_eq!(options.cycles, 2);
        assert!(!options.auto_advance);
        assert!(options.popup);
        assert!(options.sound);
    }

    #[test]
    fn unparseable_override_keeps_the_configured_value() {
        let request = start_request(&[("--work", Some("soon")), ("--break", None)]);
        let options = Config::default().session_options(&StartOverrides::from_request(&request));
        assert_eq!(options.work_seconds, 25 * 60);
        assert_eq!(options.break_seconds, 5 * 60);
    }

    #[test]
    fn zero_values_are_clamped_to_one() {
        let request = start_request(&[("--long", Some("0")), ("--cycles", Some("0"))]);
        let options = Config::default().session_options(&StartOverrides::from_request(&request));
        assert_eq!(options.long_break_seconds, 60);
        assert_eq!(options.cycles, 1);
    }

    #[test]
    fn huge_values_are_clamped_to_the_limits() {
        let request = start_request(&[("--work", Some("100000")), ("--cycles", Some("5000"))]);
        let options = Config::default().session_options(&StartOverrides::from_request(&request));
        assert_eq!(options.work_seconds, 24 * 60 * 60);
        assert_eq!(options.cycles, MAX_CYCLES);
    }
}
