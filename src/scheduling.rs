use chrono::{Local, NaiveTime};
use serde::Serialize;

use crate::settings::{SettingsSnapshot, TimeOfDay};

pub const NIGHT_TEMP: i32 = 3500;
pub const DAY_TEMP: i32 = 6500;
/// Night only warms the display when it is hotter than this.
pub const NIGHT_TRIGGER_ABOVE: i32 = 4500;
/// Day only cools the display when it is warmer than this.
pub const DAY_TRIGGER_BELOW: i32 = 5000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPhase {
    Day,
    Night,
}

pub trait Clock: Send {
    fn now(&self) -> NaiveTime;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// `on`..`off` is the night window, both ends inclusive. A window with
/// `on >= off` wraps past midnight.
pub fn phase_for(now: NaiveTime, on: TimeOfDay, off: TimeOfDay) -> DayPhase {
    let (on, off) = (on.to_naive(), off.to_naive());
    let night = if on < off {
        on <= now && now <= off
    } else {
        now >= on || now <= off
    };
    if night { DayPhase::Night } else { DayPhase::Day }
}

/// Temperature the schedule wants to force, if any. The gap between the two
/// trigger thresholds keeps a temperature near the boundary from flapping.
pub fn auto_temperature(phase: DayPhase, current_temp: i32) -> Option<i32> {
    match phase {
        DayPhase::Night if current_temp > NIGHT_TRIGGER_ABOVE => Some(NIGHT_TEMP),
        DayPhase::Day if current_temp < DAY_TRIGGER_BELOW => Some(DAY_TEMP),
        _ => None,
    }
}

/// One poll of the monitor. `None` when disabled or nothing needs to change.
pub fn evaluate(settings: &SettingsSnapshot, now: NaiveTime) -> Option<i32> {
    if !settings.auto_schedule_enabled {
        return None;
    }
    let phase = phase_for(now, settings.schedule_on_time, settings.schedule_off_time);
    auto_temperature(phase, settings.temperature_k)
}

#[cfg(test)]
pub struct FixedClock(pub NaiveTime);

#[cfg(test)]
impl FixedClock {
    pub fn at(h: u32, m: u32) -> Self {
        Self(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> NaiveTime {
        self.0
    }
}
