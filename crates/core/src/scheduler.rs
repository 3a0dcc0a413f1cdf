use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use ipvane_lookup::{LocationProvider, LookupReply};

use crate::config::WatchCfg;
use crate::events::EventReceiver;
use crate::probe::ActivityProbe;
use crate::reconcile::StateReconciler;
use crate::shutdown::ShutdownGuard;
use crate::state::AgentStatus;

/// Active-mode jitter: ±30% around the base interval, re-rolled per arm.
const JITTER_FRACTION: f64 = 0.30;
/// Hard floor on any active-mode interval, seconds.
const MIN_TIMER_SECS: f64 = 1.0;
/// Cadence of the idle wake check.
const WAKE_CHECK: Duration = Duration::from_secs(1);

/// Control messages accepted from outside the loop task.
#[derive(Debug)]
enum ControlMsg {
    /// Manual trigger: reset to active cadence and fetch immediately.
    ForceUpdate,
    /// Swap in new settings and re-arm the timer under them.
    ReloadConfig(WatchCfg),
}

/// Cloneable, thread-safe trigger into the scheduler loop. Safe to invoke
/// repeatedly or concurrently; it never blocks.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<ControlMsg>,
}

impl SchedulerHandle {
    /// Request an immediate forced update.
    pub fn force_update(&self) {
        if self.tx.try_send(ControlMsg::ForceUpdate).is_err() {
            tracing::debug!("force update already pending");
        }
    }

    /// Apply a new configuration on the next loop turn.
    pub fn reload_config(&self, cfg: WatchCfg) {
        if self.tx.try_send(ControlMsg::ReloadConfig(cfg)).is_err() {
            tracing::warn!("control channel full, config reload dropped");
        }
    }
}

/// A finished fetch, handed back to the loop task for reconciliation.
#[derive(Debug)]
struct FetchCompletion {
    reply: Option<LookupReply>,
    is_forced: bool,
}

/// Owns the single recurring update timer, the idle/active regime, jitter,
/// and fetch dispatch.
///
/// All state mutation happens on the task running [`run`](Self::run);
/// fetch workers only ever send immutable completions back over a channel,
/// so no locks are needed. An in-flight fetch is never cancelled: its
/// completion still reconciles, and the `ip_changed` check turns stale
/// completions into no-ops (last-applied-wins).
pub struct UpdateScheduler {
    cfg: WatchCfg,
    provider: Arc<dyn LocationProvider>,
    probe: Box<dyn ActivityProbe>,
    reconciler: StateReconciler,
    shutdown: ShutdownGuard,
    control_rx: mpsc::Receiver<ControlMsg>,
    /// Held so the control channel never closes while the loop runs.
    _control_tx: mpsc::Sender<ControlMsg>,
    completion_rx: mpsc::Receiver<FetchCompletion>,
    completion_tx: mpsc::Sender<FetchCompletion>,
    next_fire: Instant,
}

impl UpdateScheduler {
    /// Create a scheduler. Returns (scheduler, control handle, event stream,
    /// status watch). Consumers read transitions from the event stream and
    /// render from the status watch.
    pub fn new(
        cfg: WatchCfg,
        provider: Arc<dyn LocationProvider>,
        probe: Box<dyn ActivityProbe>,
    ) -> (
        Self,
        SchedulerHandle,
        EventReceiver,
        watch::Receiver<AgentStatus>,
    ) {
        let (event_tx, event_rx) = crate::events::channel(cfg.event_buffer);
        let (status_tx, status_rx) = watch::channel(AgentStatus::default());
        let (control_tx, control_rx) = mpsc::channel(4);
        let (completion_tx, completion_rx) = mpsc::channel(16);
        let scheduler = Self {
            cfg,
            provider,
            probe,
            reconciler: StateReconciler::new(event_tx, status_tx),
            shutdown: ShutdownGuard::new(),
            control_rx,
            _control_tx: control_tx.clone(),
            completion_rx,
            completion_tx,
            next_fire: Instant::now(),
        };
        let handle = SchedulerHandle { tx: control_tx };
        (scheduler, handle, event_rx, status_rx)
    }

    /// Token for coordinating shutdown with other tasks.
    pub fn token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Enter the scheduling loop. Returns only after shutdown is requested;
    /// provider failures never stop the loop.
    pub async fn run(&mut self) {
        self.shutdown.spawn_signal_listener();
        let token = self.shutdown.token();

        let mut wake_check = tokio::time::interval(WAKE_CHECK);
        wake_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.next_fire = Instant::now() + Duration::from_millis(self.cfg.startup_delay_ms);
        tracing::info!(
            interval_secs = self.cfg.update_interval_secs,
            idle_enabled = self.cfg.idle_enabled,
            "update scheduler started"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("shutdown signal received, exiting update loop");
                    break;
                }
                _ = tokio::time::sleep_until(self.next_fire) => {
                    self.on_timer_fired();
                }
                _ = wake_check.tick() => {
                    self.check_for_wakeup();
                }
                Some(msg) = self.control_rx.recv() => {
                    match msg {
                        ControlMsg::ForceUpdate => self.on_forced_update(),
                        ControlMsg::ReloadConfig(cfg) => self.reload(cfg),
                    }
                }
                Some(done) = self.completion_rx.recv() => {
                    self.reconciler.apply(done.reply, done.is_forced);
                }
            }
        }
        tracing::info!("update scheduler stopped");
    }

    /// Periodic tick: decide idle entry vs. fetch.
    fn on_timer_fired(&mut self) {
        if self.cfg.idle_enabled
            && !self.reconciler.state().is_idle()
            && self.probe.is_user_idle(self.cfg.idle_threshold())
        {
            // newly idle: switch cadence and skip this cycle's fetch
            self.reconciler.enter_idle();
            self.next_fire = Instant::now() + self.cfg.idle_interval();
            return;
        }
        self.dispatch_fetch(false);
        self.next_fire = Instant::now() + self.next_interval();
    }

    /// 1-second pulse: leave idle as soon as the user is back.
    fn check_for_wakeup(&mut self) {
        if !self.reconciler.state().is_idle() {
            return;
        }
        if !self.probe.is_user_idle(self.cfg.idle_threshold()) {
            self.reconciler.exit_idle();
            self.force_fetch();
        }
    }

    /// Manual trigger: drop the pending timer, force active mode, fetch now.
    fn on_forced_update(&mut self) {
        self.reconciler.exit_idle(); // no-op when already active
        self.force_fetch();
    }

    fn force_fetch(&mut self) {
        // Re-arm first (the stop/reset sequence), then dispatch. The old
        // deadline is simply overwritten; an in-flight fetch keeps running
        // and its completion reconciles whenever it lands.
        self.next_fire = Instant::now() + self.jittered_interval();
        self.dispatch_fetch(true);
    }

    fn reload(&mut self, cfg: WatchCfg) {
        tracing::info!(
            interval_secs = cfg.update_interval_secs,
            idle_enabled = cfg.idle_enabled,
            "configuration reloaded"
        );
        self.cfg = cfg;
        self.next_fire = Instant::now() + self.next_interval();
    }

    /// Next timer interval for the current mode.
    fn next_interval(&self) -> Duration {
        if self.reconciler.state().is_idle() {
            self.cfg.idle_interval()
        } else {
            self.jittered_interval()
        }
    }

    fn jittered_interval(&self) -> Duration {
        jittered(self.cfg.update_interval_secs)
    }

    /// Hand the fetch to a worker task; the loop never blocks on I/O.
    /// The next timer is armed by the caller without awaiting the result,
    /// so overlapping fetches are possible under provider latency. Results
    /// are idempotent snapshots and the newest applied one wins.
    fn dispatch_fetch(&self, is_forced: bool) {
        let provider = Arc::clone(&self.provider);
        let timeout = Duration::from_secs(self.cfg.fetch_timeout_secs);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let reply = match tokio::time::timeout(timeout, provider.fetch()).await {
                Ok(Ok(reply)) => Some(reply),
                Ok(Err(e)) => {
                    tracing::warn!(provider = provider.name(), error = %e, "location lookup failed");
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        provider = provider.name(),
                        timeout_secs = timeout.as_secs(),
                        "location lookup timed out"
                    );
                    None
                }
            };
            if completion_tx
                .send(FetchCompletion { reply, is_forced })
                .await
                .is_err()
            {
                tracing::debug!("scheduler gone, lookup result dropped");
            }
        });
    }
}

/// Uniformly jittered active-mode interval: `base ± 30%`, floored at 1 s.
/// Re-rolled on every arm so many instances never synchronize.
fn jittered(base_secs: u64) -> Duration {
    let base = base_secs as f64;
    let jitter = base * JITTER_FRACTION;
    let secs = base - jitter + rand::random::<f64>() * (2.0 * jitter);
    Duration::from_secs_f64(secs.max(MIN_TIMER_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        for base in [4u64, 7, 60, 300] {
            let lo = Duration::from_secs_f64(base as f64 * 0.7);
            let hi = Duration::from_secs_f64(base as f64 * 1.3);
            for _ in 0..1000 {
                let d = jittered(base);
                assert!(d >= lo && d <= hi, "base {base}: {d:?} out of [{lo:?}, {hi:?}]");
            }
        }
    }

    #[test]
    fn jitter_floors_at_one_second() {
        for _ in 0..1000 {
            assert!(jittered(1) >= Duration::from_secs(1));
            assert!(jittered(0) >= Duration::from_secs(1));
        }
    }
}
