//! Timed actuation with automatic stop
//!
//! Every non-stop command arms a stop timer measured from the moment of
//! dispatch. A newer dispatch invalidates the armed timer before arming its
//! own, so a stale timer can never stop motion it did not start.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::publisher::{DrivePublisher, PublishOutcome};
use crate::Command;

/// Default time a movement runs before the automatic stop
pub const DEFAULT_STOP_DELAY: Duration = Duration::from_secs(1);

/// Actuation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No stop timer armed
    Idle,
    /// Moving with a stop timer armed
    Moving(Command),
}

struct Armed {
    generation: u64,
    state: SchedulerState,
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    publisher: DrivePublisher,
    stop_delay: Duration,
    armed: Mutex<Armed>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Armed> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publishes commands and schedules their automatic stop
///
/// Cloning yields another handle to the same timer state.
#[derive(Clone)]
pub struct ActuationScheduler {
    shared: Arc<Shared>,
}

impl ActuationScheduler {
    /// Create a scheduler publishing through `publisher`
    #[must_use]
    pub fn new(publisher: DrivePublisher, stop_delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                publisher,
                stop_delay,
                armed: Mutex::new(Armed {
                    generation: 0,
                    state: SchedulerState::Idle,
                    timer: None,
                }),
            }),
        }
    }

    /// Delay between a movement and its automatic stop
    #[must_use]
    pub fn stop_delay(&self) -> Duration {
        self.shared.stop_delay
    }

    /// Current actuation state
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.shared.lock().state
    }

    /// Publisher this scheduler writes to
    #[must_use]
    pub fn publisher(&self) -> &DrivePublisher {
        &self.shared.publisher
    }

    /// Publish `command` now and, unless it is `stop`, arm its stop timer
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, command: Command) -> PublishOutcome {
        let dispatched_at = Instant::now();
        let mut armed = self.shared.lock();

        armed.generation += 1;
        let generation = armed.generation;
        if let Some(timer) = armed.timer.take() {
            timer.abort();
        }

        // Published under the lock so channel order matches dispatch order
        let outcome = self.shared.publisher.publish(command);

        if command.is_stop() {
            armed.state = SchedulerState::Idle;
            return outcome;
        }

        armed.state = SchedulerState::Moving(command);
        let shared = Arc::clone(&self.shared);
        let deadline = dispatched_at + self.shared.stop_delay;
        armed.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let mut armed = shared.lock();
            if armed.generation != generation {
                return;
            }
            armed.state = SchedulerState::Idle;
            armed.timer = None;
            tracing::debug!(%command, "auto-stop");
            shared.publisher.publish(Command::Stop);
        }));

        tracing::debug!(%command, generation, "stop timer armed");
        outcome
    }

    /// Disarm any pending stop timer without publishing
    pub fn cancel(&self) {
        let mut armed = self.shared.lock();
        armed.generation += 1;
        if let Some(timer) = armed.timer.take() {
            timer.abort();
        }
        armed.state = SchedulerState::Idle;
    }
}
