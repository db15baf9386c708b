//! Background cache warmer.
//!
//! When background polling is enabled, a [`Scheduler`] refreshes the status
//! cache on a fixed interval so requests rarely wait on the upstream APIs.
//! Supports:
//! - Jitter on the interval
//! - Exponential backoff after failed refreshes
//! - Stopping through a [`SchedulerHandle`]

use std::future::Future;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base interval between refreshes.
    pub interval: Duration,
    /// Maximum jitter added to the interval (as fraction 0.0-1.0).
    pub jitter_fraction: f64,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            jitter_fraction: 0.1,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with the given refresh interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Builder: set jitter fraction.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Next refresh delay, with jitter.
    pub fn next_delay(&self) -> Duration {
        let base = self.interval.as_secs_f64();
        let jitter = rand_jitter(base * self.jitter_fraction);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Backoff delay after `consecutive_failures` failed refreshes.
    ///
    /// Capped at `max_backoff` and at the refresh interval.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let multiplier = self
            .backoff_multiplier
            .powi(consecutive_failures.min(32) as i32 - 1);
        let max = self
            .max_backoff
            .min(self.interval.max(self.initial_backoff))
            .as_secs_f64();

        Duration::from_secs_f64((base * multiplier).min(max))
    }
}

/// A pseudo-random value in [0, 1), taken from the clock's sub-second nanos.
pub(crate) fn jitter_unit() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos) / 1_000_000_000.0
}

/// A pseudo-random value in [-range, range].
fn rand_jitter(range: f64) -> f64 {
    (jitter_unit() * 2.0 - 1.0) * range
}

/// Commands that can be sent to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Stop the scheduler.
    Stop,
}

/// Outcome bookkeeping for the refresh loop.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub consecutive_failures: u32,
    pub runs: u64,
    pub last_success: Option<DateTime<Utc>>,
}

impl SchedulerState {
    pub fn record_success(&mut self) {
        self.runs += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.runs += 1;
        self.consecutive_failures += 1;
    }
}

/// Periodic refresh loop.
pub struct Scheduler {
    config: SchedulerConfig,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(4);
        Self {
            config,
            command_tx,
            command_rx,
        }
    }

    /// Returns a handle for sending commands to the scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Runs the loop until [`SchedulerCommand::Stop`] arrives or every
    /// handle is dropped, and returns the final state.
    ///
    /// `refresh_fn` runs once immediately, then after every delay. It
    /// returns the failure message when a refresh failed.
    pub async fn run<F, Fut>(self, refresh_fn: F) -> SchedulerState
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        let Self {
            config,
            command_tx,
            mut command_rx,
        } = self;
        // Only handles keep the channel open.
        drop(command_tx);

        info!(interval_secs = config.interval.as_secs(), "cache warmer started");
        let mut state = SchedulerState::default();
        refresh(&mut state, &refresh_fn).await;

        loop {
            let failures = state.consecutive_failures;
            let delay = if failures > 0 {
                config.backoff_delay(failures)
            } else {
                config.next_delay()
            };
            debug!(delay_ms = delay.as_millis() as u64, failures, "scheduling next refresh");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    refresh(&mut state, &refresh_fn).await;
                }
                cmd = command_rx.recv() => match cmd {
                    Some(SchedulerCommand::Stop) | None => {
                        info!(runs = state.runs, "cache warmer stopping");
                        break;
                    }
                },
            }
        }
        state
    }
}

async fn refresh<F, Fut>(state: &mut SchedulerState, refresh_fn: &F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    match refresh_fn().await {
        Ok(()) => {
            debug!("background refresh completed");
            state.record_success();
        }
        Err(e) => {
            state.record_failure();
            warn!(
                error = %e,
                failures = state.consecutive_failures,
                last_success = ?state.last_success,
                "background refresh failed"
            );
        }
    }
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Stops the scheduler.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn next_delay_stays_within_jitter() {
        let config = SchedulerConfig::new(Duration::from_secs(60)).with_jitter(0.1);
        for _ in 0..20 {
            let delay = config.next_delay().as_secs_f64();
            assert!((54.0..=66.0).contains(&delay), "{delay}");
        }
        let exact = SchedulerConfig::new(Duration::from_secs(60)).with_jitter(0.0);
        assert_eq!(exact.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn jitter_unit_bounds() {
        for _ in 0..100 {
            let unit = jitter_unit();
            assert!((0.0..1.0).contains(&unit));
        }
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let config = SchedulerConfig::new(Duration::from_secs(600)).with_backoff(
            Duration::from_secs(5),
            Duration::from_secs(300),
            2.0,
        );

        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(20));
        assert_eq!(config.backoff_delay(10), Duration::from_secs(300));
        assert_eq!(config.backoff_delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn backoff_never_exceeds_interval() {
        let config = SchedulerConfig::new(Duration::from_secs(60));
        assert_eq!(config.backoff_delay(8), Duration::from_secs(60));
    }

    #[test]
    fn state_records_outcomes() {
        let mut state = SchedulerState::default();
        state.record_failure();
        state.record_failure();
        assert_eq!(state.consecutive_failures, 2);
        assert!(state.last_success.is_none());

        state.record_success();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.runs, 3);
        assert!(state.last_success.is_some());
    }

    type Outcome = std::future::Ready<Result<(), String>>;

    /// Counts calls; the first `fail_first` calls fail.
    fn counting(count: Arc<AtomicU32>, fail_first: u32) -> impl Fn() -> Outcome + Send + Sync {
        move || {
            let n = count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n < fail_first {
                Err(format!("failure {n}"))
            } else {
                Ok(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_on_interval_until_stopped() {
        let config = SchedulerConfig::new(Duration::from_secs(60)).with_jitter(0.0);
        let scheduler = Scheduler::new(config);
        let handle = scheduler.handle();
        let count = Arc::new(AtomicU32::new(0));

        let task = tokio::spawn(scheduler.run(counting(count.clone(), 0)));

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.stop().await.unwrap();
        let state = task.await.unwrap();
        assert_eq!(state.runs, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_after_failures() {
        let config = SchedulerConfig::new(Duration::from_secs(60))
            .with_jitter(0.0)
            .with_backoff(Duration::from_secs(5), Duration::from_secs(300), 2.0);
        let scheduler = Scheduler::new(config);
        let handle = scheduler.handle();
        let count = Arc::new(AtomicU32::new(0));

        let task = tokio::spawn(scheduler.run(counting(count.clone(), 3)));

        // t=0 fails, t=5 fails, t=15 fails, t=35 succeeds.
        tokio::time::sleep(Duration::from_secs(36)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        handle.stop().await.unwrap();
        let state = task.await.unwrap();
        assert_eq!(state.runs, 4);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_success.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_handles_are_dropped() {
        let scheduler = Scheduler::new(SchedulerConfig::new(Duration::from_secs(60)));
        let handle = scheduler.handle();
        let task = tokio::spawn(scheduler.run(counting(Arc::new(AtomicU32::new(0)), 0)));

        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
