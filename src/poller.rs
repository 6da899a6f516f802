use crate::{config::Config, presence::PresencePublisher, probe::ServerProbe};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Stopped,
}

/// The running timer task. Dropping it without `stop` leaves the task running.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Status poller task ended abnormally: {e}");
        }
    }
}

enum Lifecycle {
    Idle,
    Running(PollerHandle),
    Stopped,
}

/// Polls the server on a fixed interval and mirrors the result into the bot's presence.
///
/// The first tick fires one full interval after `start`, so presence stays
/// whatever the session had until then. Ticks never overlap: a slow tick
/// pushes the next one back instead of running alongside it.
pub struct StatusPoller {
    probe: Arc<ServerProbe>,
    host: String,
    port: u16,
    interval: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl StatusPoller {
    pub fn new(config: &Config, probe: Arc<ServerProbe>) -> Self {
        Self {
            probe,
            host: config.host.clone(),
            port: config.port,
            interval: POLL_INTERVAL,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    pub fn state(&self) -> PollerState {
        match *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) {
            Lifecycle::Idle => PollerState::Idle,
            Lifecycle::Running(_) => PollerState::Running,
            Lifecycle::Stopped => PollerState::Stopped,
        }
    }

    /// Starts the timer. Returns `false` if the poller already left `Idle`.
    pub fn start(&self, publisher: PresencePublisher) -> bool {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*lifecycle, Lifecycle::Idle) {
            info!("Status poller already started, ignoring duplicate ready signal");
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            Tick {
                probe: self.probe.clone(),
                publisher,
                host: self.host.clone(),
                port: self.port,
            },
            self.interval,
            cancel.clone(),
        ));
        *lifecycle = Lifecycle::Running(PollerHandle { cancel, task });
        info!(
            "Status poller started for {}:{}, every {:?}",
            self.host, self.port, self.interval
        );
        true
    }

    /// Cancels the timer and waits for the task to finish. Terminal.
    pub async fn stop(&self) {
        let previous = std::mem::replace(
            &mut *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner),
            Lifecycle::Stopped,
        );
        if let Lifecycle::Running(handle) = previous {
            handle.stop().await;
        }
    }
}

struct Tick {
    probe: Arc<ServerProbe>,
    publisher: PresencePublisher,
    host: String,
    port: u16,
}

impl Tick {
    /// One probe-then-publish pass. Nothing escapes it.
    async fn run(&self) {
        let result = self.probe.query(&self.host, self.port).await;
        if let Err(e) = self.publisher.publish(result).await {
            warn!("{e}");
        }
    }
}

async fn run(tick: Tick, interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick.run() => {}
        }
    }
    info!("Status poller stopped");
}
