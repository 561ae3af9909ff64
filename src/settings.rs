//! Canonical display settings, the partial updates clients propose, and
//! their on-disk form.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::ConfigError;

pub const BRIGHTNESS_RANGE: (i32, i32) = (10, 100);
pub const CONTRAST_RANGE: (i32, i32) = (10, 100);
pub const GAMMA_RANGE: (i32, i32) = (50, 200);
pub const TEMPERATURE_RANGE: (i32, i32) = (1000, 6500);
pub const CHANNEL_RANGE: (i32, i32) = (10, 100);
pub const VIBRANCE_RANGE: (i32, i32) = (0, 100);
pub const HUE_RANGE: (i32, i32) = (0, 360);

pub const NEUTRAL_CONTRAST: i32 = 50;
pub const NEUTRAL_TEMPERATURE: i32 = 6500;

/// Wall-clock hour and minute, written as `HH:MM`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn to_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("invalid time {s:?}, expected HH:MM"))?;
        let hour: u32 = h.parse().map_err(|_| format!("invalid hour in {s:?}"))?;
        let minute: u32 = m.parse().map_err(|_| format!("invalid minute in {s:?}"))?;
        TimeOfDay::new(hour, minute).ok_or_else(|| format!("time {s:?} out of range"))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSnapshot {
    pub brightness_pct: i32,
    pub contrast_pct: i32,
    pub gamma_pct: i32,
    pub temperature_k: i32,
    pub red_pct: i32,
    pub green_pct: i32,
    pub blue_pct: i32,
    pub vibrance_pct: i32,
    pub hue_shift_deg: i32,
    pub auto_schedule_enabled: bool,
    pub schedule_on_time: TimeOfDay,
    pub schedule_off_time: TimeOfDay,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            brightness_pct: 100,
            contrast_pct: NEUTRAL_CONTRAST,
            gamma_pct: 100,
            temperature_k: NEUTRAL_TEMPERATURE,
            red_pct: 100,
            green_pct: 100,
            blue_pct: 100,
            vibrance_pct: 0,
            hue_shift_deg: 0,
            auto_schedule_enabled: false,
            schedule_on_time: TimeOfDay { hour: 19, minute: 0 },
            schedule_off_time: TimeOfDay { hour: 6, minute: 0 },
        }
    }
}

fn clamp_to(v: i32, (lo, hi): (i32, i32)) -> i32 {
    v.clamp(lo, hi)
}

impl SettingsSnapshot {
    /// Forces every slider into its domain.
    pub fn clamped(mut self) -> Self {
        self.brightness_pct = clamp_to(self.brightness_pct, BRIGHTNESS_RANGE);
        self.contrast_pct = clamp_to(self.contrast_pct, CONTRAST_RANGE);
        self.gamma_pct = clamp_to(self.gamma_pct, GAMMA_RANGE);
        self.temperature_k = clamp_to(self.temperature_k, TEMPERATURE_RANGE);
        self.red_pct = clamp_to(self.red_pct, CHANNEL_RANGE);
        self.green_pct = clamp_to(self.green_pct, CHANNEL_RANGE);
        self.blue_pct = clamp_to(self.blue_pct, CHANNEL_RANGE);
        self.vibrance_pct = clamp_to(self.vibrance_pct, VIBRANCE_RANGE);
        self.hue_shift_deg = clamp_to(self.hue_shift_deg, HUE_RANGE);
        self
    }

    pub fn apply_patch(&self, patch: &SettingsPatch) -> Self {
        let mut next = self.clone();
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(v) = patch.$field { next.$field = v; })*
            };
        }
        merge!(
            brightness_pct,
            contrast_pct,
            gamma_pct,
            temperature_k,
            red_pct,
            green_pct,
            blue_pct,
            vibrance_pct,
            hue_shift_deg,
            auto_schedule_enabled,
            schedule_on_time,
            schedule_off_time
        );
        next.clamped()
    }

    /// Neutral sliders with auto-schedule off; schedule times are kept.
    pub fn day_reset(&self) -> Self {
        Self {
            schedule_on_time: self.schedule_on_time,
            schedule_off_time: self.schedule_off_time,
            ..Self::default()
        }
    }
}

/// A proposed change from a client. Absent fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_pct: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast_pct: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma_pct: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub red_pct: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub green_pct: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue_pct: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibrance_pct: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue_shift_deg: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_schedule_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_on_time: Option<TimeOfDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_off_time: Option<TimeOfDay>,
}

pub trait SettingsStore {
    /// Never fails; unreadable state yields defaults.
    fn load(&self) -> SettingsSnapshot;
    fn save(&self, settings: &SettingsSnapshot) -> Result<(), ConfigError>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glasstint")
            .join("settings.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<SettingsSnapshot>, ConfigError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    reason: e.to_string(),
                });
            }
        };
        serde_json::from_str::<SettingsSnapshot>(&raw)
            .map(|s| Some(s.clamped()))
            .map_err(|e| ConfigError::Read {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> SettingsSnapshot {
        match self.read() {
            Ok(Some(settings)) => {
                debug!(path = %self.path.display(), "loaded settings");
                settings
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no settings file, using defaults");
                SettingsSnapshot::default()
            }
            Err(e) => {
                warn!("{e}; using defaults");
                SettingsSnapshot::default()
            }
        }
    }

    fn save(&self, settings: &SettingsSnapshot) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        fs::write(&self.path, json).map_err(write_err)
    }
}
