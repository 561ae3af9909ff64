//! Single control loop owning the canonical settings.
//!
//! Clients only propose changes through [`Event`]s. Bursts of changes are
//! coalesced: every change re-arms one debounce deadline and only the last
//! one in a burst reaches the color tool. The same loop drives the
//! auto-schedule poll.

use serde::Serialize;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, warn};

use crate::color::{ToolArguments, compute};
use crate::error::ToolError;
use crate::executor::CommandExecutor;
use crate::scheduling::{Clock, DayPhase, evaluate, phase_for};
use crate::settings::{SettingsPatch, SettingsSnapshot, SettingsStore};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Re-applies after launch, in case something resets the display shortly after us.
pub const STARTUP_APPLY_DELAYS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

#[derive(Debug)]
pub enum Event {
    SettingsChanged(SettingsPatch),
    ResetDay,
    ForceApply,
    PollTick,
    Status(oneshot::Sender<StatusReport>),
    Shutdown,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub settings: SettingsSnapshot,
    pub arguments: ToolArguments,
    pub last_applied: Option<ToolArguments>,
    pub phase: DayPhase,
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

pub struct Scheduler<S, E, C> {
    settings: SettingsSnapshot,
    store: S,
    executor: E,
    clock: C,
    config: SchedulerConfig,
    deadline: Option<Instant>,
    last_applied: Option<ToolArguments>,
}

impl<S, E, C> Scheduler<S, E, C>
where
    S: SettingsStore,
    E: CommandExecutor,
    C: Clock,
{
    pub fn new(
        settings: SettingsSnapshot,
        store: S,
        executor: E,
        clock: C,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            settings: settings.clamped(),
            store,
            executor,
            clock,
            config,
            deadline: None,
            last_applied: None,
        }
    }

    pub fn settings(&self) -> &SettingsSnapshot {
        &self.settings
    }

    /// Runs until `Shutdown` or until every sender is gone. Returns itself so
    /// the final state can be inspected.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) -> Self {
        let period = self.config.poll_interval;
        let mut poll = interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.deadline;
            let debounce = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if self.handle(event).await.is_break() {
                        break;
                    }
                }
                _ = debounce => {
                    self.deadline = None;
                    self.apply().await;
                }
                _ = poll.tick() => self.poll(),
            }
        }
        debug!("scheduler stopped");
        self
    }

    async fn handle(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::SettingsChanged(patch) => {
                self.settings = self.settings.apply_patch(&patch);
                self.arm();
            }
            Event::ResetDay => {
                info!("resetting to day defaults");
                self.settings = self.settings.day_reset();
                self.arm();
            }
            Event::ForceApply => {
                self.deadline = None;
                self.apply().await;
            }
            Event::PollTick => self.poll(),
            Event::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Event::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Replaces any pending deadline.
    fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.config.debounce);
    }

    fn poll(&mut self) {
        if let Some(temp) = evaluate(&self.settings, self.clock.now()) {
            info!(
                from = self.settings.temperature_k,
                to = temp,
                "auto schedule adjusting temperature"
            );
            self.settings.temperature_k = temp;
            self.arm();
        }
    }

    async fn apply(&mut self) {
        if let Err(e) = self.store.save(&self.settings) {
            warn!("{e}");
        }

        let args = compute(&self.settings);
        debug!(
            temperature = args.temperature_k,
            brightness = args.brightness_factor,
            gamma = ?args.gamma_rgb,
            "applying"
        );
        match self.executor.apply(&args).await {
            Ok(()) => {}
            Err(e @ ToolError::Unavailable(_)) => debug!("{e}; skipping"),
            Err(e) => warn!("{e}"),
        }
        self.last_applied = Some(args);
    }

    fn status(&self) -> StatusReport {
        StatusReport {
            settings: self.settings.clone(),
            arguments: compute(&self.settings),
            last_applied: self.last_applied.clone(),
            phase: phase_for(
                self.clock.now(),
                self.settings.schedule_on_time,
                self.settings.schedule_off_time,
            ),
        }
    }
}

/// Sends a `ForceApply` after each delay, measured from now.
pub fn schedule_startup_applies(
    events: mpsc::UnboundedSender<Event>,
    delays: &[Duration],
) -> tokio::task::JoinHandle<()> {
    let start = Instant::now();
    let delays = delays.to_vec();
    tokio::spawn(async move {
        for delay in delays {
            sleep_until(start + delay).await;
            if events.send(Event::ForceApply).is_err() {
                break;
            }
        }
    })
}
