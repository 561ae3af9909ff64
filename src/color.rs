use crate::settings::{NEUTRAL_CONTRAST, SettingsSnapshot};

/// Smallest multiplier the color tool is ever handed; it misbehaves at zero.
pub const MIN_FACTOR: f64 = 0.1;

const VIBRANCE_BRIGHTNESS_DIVISOR: f64 = 300.0;
const VIBRANCE_CHANNEL_DIVISOR: f64 = 400.0;
const HUE_AMPLITUDE: f64 = 0.2;
const HUE_PHASES: [f64; 3] = [0.0, 2.09, 4.18];

/// Arguments for one color tool invocation.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ToolArguments {
    pub temperature_k: i32,
    pub brightness_factor: f64,
    pub gamma_rgb: [f64; 3],
}

impl ToolArguments {
    /// `-P` drops any earlier adjustment; the tool composes them otherwise.
    pub fn to_args(&self) -> Vec<String> {
        let [r, g, b] = self.gamma_rgb;
        vec![
            "-P".to_string(),
            "-O".to_string(),
            self.temperature_k.to_string(),
            "-b".to_string(),
            self.brightness_factor.to_string(),
            "-g".to_string(),
            format!("{r}:{g}:{b}"),
        ]
    }
}

fn pct(v: i32) -> f64 {
    (v as f64 / 100.0).max(MIN_FACTOR)
}

/// Folds every slider into the brightness scalar and the per-channel gamma.
///
/// Order matters: contrast couples into gamma first, then vibrance and hue
/// adjust the channel gains, and only then is gamma divided by each gain.
/// The hue step modulates channel gain with three sinusoids ~120° apart; it
/// approximates a hue rotation but is not a colorimetric one.
pub fn compute(s: &SettingsSnapshot) -> ToolArguments {
    let mut brightness = pct(s.brightness_pct);
    let mut channels = [pct(s.red_pct), pct(s.green_pct), pct(s.blue_pct)];

    let contrast_factor = 1.0 + (NEUTRAL_CONTRAST - s.contrast_pct) as f64 / 100.0;
    let final_gamma = pct(s.gamma_pct) * contrast_factor;

    if s.vibrance_pct > 0 {
        let v = s.vibrance_pct as f64;
        brightness += v / VIBRANCE_BRIGHTNESS_DIVISOR;
        for ch in channels.iter_mut() {
            *ch = (*ch - v / VIBRANCE_CHANNEL_DIVISOR).max(MIN_FACTOR);
        }
    }

    if s.hue_shift_deg != 0 {
        let angle = (s.hue_shift_deg as f64).to_radians();
        for (ch, phase) in channels.iter_mut().zip(HUE_PHASES) {
            *ch *= 1.0 + HUE_AMPLITUDE * (angle + phase).sin();
        }
    }

    ToolArguments {
        temperature_k: s.temperature_k,
        brightness_factor: brightness,
        gamma_rgb: channels.map(|ch| (final_gamma / ch).max(MIN_FACTOR)),
    }
}
