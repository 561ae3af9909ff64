use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::executor::DEFAULT_TOOL;
use crate::settings::TimeOfDay;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "glasstint",
    version,
    about = "Display tint daemon: brightness, contrast, gamma, RGB, vibrance and hue via redshift"
)]
pub struct Opts {
    /// Settings file. Defaults to <config dir>/glasstint/settings.json
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Control socket, also used to detect an already running instance
    #[arg(long = "socket")]
    pub socket: Option<PathBuf>,

    /// Gamma-ramp tool to invoke
    #[arg(long = "tool", default_value = DEFAULT_TOOL)]
    pub tool: String,

    /// Give up on a tool invocation after this many milliseconds
    #[arg(long = "tool-timeout-ms", default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    pub tool_timeout_ms: u64,

    /// Quiet period after the last change before applying (ms)
    #[arg(long = "debounce-ms", default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub debounce_ms: u64,

    /// Auto-schedule poll interval (seconds)
    #[arg(long = "poll-secs", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_secs: u64,

    /// Leave already running tool processes alone
    #[arg(long = "no-kill")]
    pub no_kill: bool,

    /// Log tool invocations instead of running them
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Night window start HH:MM, overrides the saved value
    #[arg(long = "on")]
    pub on: Option<TimeOfDay>,

    /// Night window end HH:MM, overrides the saved value
    #[arg(long = "off")]
    pub off: Option<TimeOfDay>,

    /// Enable the day/night auto schedule
    #[arg(long = "auto")]
    pub auto: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = Opts::try_parse_from(["glasstint"]).unwrap();
        assert_eq!(opts.tool, "redshift");
        assert_eq!(opts.debounce_ms, 100);
        assert_eq!(opts.poll_secs, 60);
        assert_eq!(opts.tool_timeout_ms, 2000);
        assert!(!opts.auto && !opts.dry_run && !opts.no_kill);
    }

    #[test]
    fn parses_schedule_overrides() {
        let opts =
            Opts::try_parse_from(["glasstint", "--on", "21:30", "--off", "06:45", "--auto", "-vv"])
                .unwrap();
        assert_eq!(opts.on, TimeOfDay::new(21, 30));
        assert_eq!(opts.off, TimeOfDay::new(6, 45));
        assert!(opts.auto);
        assert_eq!(opts.verbose, 2);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Opts::try_parse_from(["glasstint", "--on", "7pm"]).is_err());
        assert!(Opts::try_parse_from(["glasstint", "--debounce-ms", "0"]).is_err());
    }
}
