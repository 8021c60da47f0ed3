//! Timing driver for the search.
//!
//! [`Driver`] owns the live [`Snapshot`] and decides when the next one is
//! derived: once per manual [`step`](Driver::step), or once per interval
//! while running. The interval loop is a tokio task that waits on either a
//! shutdown [`Notify`] or the next sleep.
//!
//! Every run gets an epoch number. `pause`, `reset` and `configure` bump
//! the epoch under the driver lock, so a tick that already woke up finds a
//! stale epoch when it takes the lock and leaves without stepping.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    config::{ConfigError, SimulationConfig},
    engine::{Snapshot, Stepper},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverStatus {
    /// No snapshot.
    Idle,
    /// Snapshot present, timer stopped.
    Ready,
    Running,
    /// The search is solved or exhausted.
    Terminal,
}

/// Delay between automatic steps, clamped to [`Speed::MIN_MS`]..=[`Speed::MAX_MS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Speed(u64);

impl Speed {
    pub const MIN_MS: u64 = 100;
    pub const MAX_MS: u64 = 1000;
    pub const DEFAULT_MS: u64 = 500;
    pub const INCREMENT_MS: u64 = 100;

    pub fn from_millis(ms: u64) -> Self {
        Speed(ms.clamp(Self::MIN_MS, Self::MAX_MS))
    }

    pub fn millis(self) -> u64 {
        self.0
    }

    pub fn interval(self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Shorter delay by one increment.
    pub fn faster(self) -> Self {
        Self::from_millis(self.0.saturating_sub(Self::INCREMENT_MS))
    }

    /// Longer delay by one increment.
    pub fn slower(self) -> Self {
        Self::from_millis(self.0 + Self::INCREMENT_MS)
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            0..=200 => "Fast",
            201..=500 => "Normal",
            _ => "Slow",
        }
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed(Self::DEFAULT_MS)
    }
}

struct Ticker {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

struct Shared {
    config: Option<SimulationConfig>,
    snapshot: Option<Arc<Snapshot>>,
    status: DriverStatus,
    speed: Speed,
    epoch: u64,
    stepper: Stepper,
    ticker: Option<Ticker>,
    publisher: watch::Sender<Option<Arc<Snapshot>>>,
    status_publisher: watch::Sender<DriverStatus>,
}

impl Shared {
    fn set_status(&mut self, status: DriverStatus) {
        self.status = status;
        self.status_publisher.send_replace(status);
    }

    fn publish(&mut self, snapshot: Option<Arc<Snapshot>>) {
        self.snapshot = snapshot.clone();
        self.publisher.send_replace(snapshot);
    }

    /// Stops the ticker; no step of the cancelled run happens after this returns.
    fn cancel_ticker(&mut self) {
        self.epoch += 1;
        if let Some(ticker) = self.ticker.take() {
            ticker.shutdown.notify_one();
            ticker.handle.abort();
        }
    }

    /// Builds a fresh snapshot from the stored config.
    fn initialize(&mut self) -> bool {
        let Some(config) = &self.config else {
            return false;
        };
        let snapshot = Arc::new(Snapshot::initial(config));
        self.set_status(DriverStatus::Ready);
        self.publish(Some(snapshot));
        true
    }

    /// Derives and publishes the next snapshot.
    fn advance(&mut self) {
        let Some(current) = &self.snapshot else {
            return;
        };
        let next = Arc::new(self.stepper.advance(current));
        let terminal = next.is_terminal();
        self.publish(Some(next));
        if terminal {
            self.set_status(DriverStatus::Terminal);
            info!(epoch = self.epoch, "search finished");
        }
    }
}

/// Control surface for one search: configure, start, pause, step, reset.
///
/// [`start`](Driver::start) spawns onto the ambient tokio runtime and must be
/// called from within one.
pub struct Driver {
    shared: Arc<Mutex<Shared>>,
}

impl Driver {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(None);
        let (status_publisher, _) = watch::channel(DriverStatus::Idle);
        Driver {
            shared: Arc::new(Mutex::new(Shared {
                config: None,
                snapshot: None,
                status: DriverStatus::Idle,
                speed: Speed::default(),
                epoch: 0,
                stepper: Stepper::new(),
                ticker: None,
                publisher,
                status_publisher,
            })),
        }
    }

    /// Validates and stores `config`, discarding any current run, and builds
    /// the initial snapshot.
    pub fn configure(&self, config: SimulationConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut shared = self.shared.lock();
        shared.cancel_ticker();
        shared.config = Some(config);
        shared.initialize();
        info!(status = ?shared.status, "configured");
        Ok(())
    }

    /// Begins stepping on the timer. From `Idle`, initializes first.
    pub fn start(&self) {
        let mut shared = self.shared.lock();
        match shared.status {
            DriverStatus::Idle => {
                if !shared.initialize() {
                    debug!("start ignored: nothing configured");
                    return;
                }
            }
            DriverStatus::Ready => {}
            status => {
                debug!(?status, "start ignored");
                return;
            }
        }

        shared.cancel_ticker();
        shared.set_status(DriverStatus::Running);
        let epoch = shared.epoch;
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(tick_loop(
            Arc::clone(&self.shared),
            Arc::clone(&shutdown),
            epoch,
        ));
        shared.ticker = Some(Ticker { handle, shutdown });
        info!(epoch, interval_ms = shared.speed.millis(), "running");
    }

    pub fn pause(&self) {
        let mut shared = self.shared.lock();
        if shared.status != DriverStatus::Running {
            debug!(status = ?shared.status, "pause ignored");
            return;
        }
        shared.cancel_ticker();
        shared.set_status(DriverStatus::Ready);
        info!("paused");
    }

    /// Advances one level by hand. Ignored while running or finished.
    pub fn step(&self) {
        let mut shared = self.shared.lock();
        match shared.status {
            DriverStatus::Ready => shared.advance(),
            DriverStatus::Idle => {
                if !shared.initialize() {
                    debug!("step ignored: nothing configured");
                }
            }
            status => debug!(?status, "step ignored"),
        }
    }

    /// Stops any run and drops the snapshot. The configuration is kept.
    pub fn reset(&self) {
        let mut shared = self.shared.lock();
        shared.cancel_ticker();
        shared.set_status(DriverStatus::Idle);
        shared.publish(None);
        info!("reset");
    }

    /// Sets the delay before the next automatic step.
    pub fn set_speed(&self, interval_ms: u64) {
        let speed = Speed::from_millis(interval_ms);
        self.shared.lock().speed = speed;
        debug!(interval_ms = speed.millis(), "speed changed");
    }

    pub fn speed(&self) -> Speed {
        self.shared.lock().speed
    }

    pub fn status(&self) -> DriverStatus {
        self.shared.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == DriverStatus::Running
    }

    pub fn config(&self) -> Option<SimulationConfig> {
        self.shared.lock().config.clone()
    }

    /// The live snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.shared.lock().snapshot.clone()
    }

    /// Receives every snapshot the driver publishes; `None` after a reset.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.shared.lock().publisher.subscribe()
    }

    /// Receives every status transition.
    pub fn subscribe_status(&self) -> watch::Receiver<DriverStatus> {
        self.shared.lock().status_publisher.subscribe()
    }

    /// Starts the run and waits until it stops, returning the last snapshot.
    ///
    /// Returns on any exit from `Running`: a finished search, a pause, a
    /// reset or a reconfiguration.
    pub async fn run_to_end(&self) -> Option<Arc<Snapshot>> {
        let mut status = self.subscribe_status();
        self.start();
        if status
            .wait_for(|status| *status != DriverStatus::Running)
            .await
            .is_err()
        {
            debug!("status channel closed");
        }
        self.snapshot()
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shared.lock().cancel_ticker();
    }
}

async fn tick_loop(shared: Arc<Mutex<Shared>>, shutdown: Arc<Notify>, epoch: u64) {
    loop {
        let delay = {
            let state = shared.lock();
            if state.epoch != epoch || state.status != DriverStatus::Running {
                break;
            }
            state.speed.interval()
        };

        tokio::select! {
            biased;

            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let mut state = shared.lock();
        if state.epoch != epoch || state.status != DriverStatus::Running {
            break;
        }
        state.advance();
        if state.status != DriverStatus::Running {
            state.ticker = None;
            break;
        }
    }
    debug!(epoch, "tick loop stopped");
}
