//! Voice control loop
//!
//! Capture → window → transcription → interpretation → actuation, one chunk
//! at a time. The loop owns the session lifecycle: whatever ends it
//! (cancellation, a capture fault, the future being dropped) publishes
//! `stop` once and releases the audio source and drive channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{AudioConfig, TranscriptionConfig};
use crate::drive::{ActuationScheduler, DrivePublisher};
use crate::stt::{StreamWindow, Transcriber, Transcription, WindowUpdate};
use crate::voice::{CaptureEvent, SAMPLE_RATE, samples_to_wav};
use crate::{Command, Error, Result, interpret};

/// Push-based audio producer
pub trait AudioSource {
    /// Begin delivering events to `tx`
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be started
    fn start(&mut self, tx: mpsc::Sender<CaptureEvent>) -> Result<()>;

    /// Stop delivering and release the device; idempotent
    fn stop(&mut self);
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Drive channel connected
    pub connected: bool,
    /// Control loop running
    pub active: bool,
}

/// Shared, cloneable session status
#[derive(Clone)]
pub struct SessionStatus {
    publisher: DrivePublisher,
    active: Arc<AtomicBool>,
}

impl SessionStatus {
    #[must_use]
    pub fn new(publisher: DrivePublisher) -> Self {
        Self {
            publisher,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState {
            connected: self.publisher.is_connected(),
            active: self.active.load(Ordering::SeqCst),
        }
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

/// Loop tuning
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Rate of incoming chunks
    pub sample_rate: u32,
    /// Window handed to transcription as a final result
    pub chunk_length: Duration,
    /// Capture → loop queue capacity
    pub queue_depth: usize,
    /// Also transcribe intermediate windows
    ///
    /// Partials are transcribed in series with the final window, so each one
    /// delays the window's command by a transcription round-trip. A partial
    /// is skipped when the next slice is already queued.
    pub partials: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            chunk_length: Duration::from_secs(3),
            queue_depth: 8,
            partials: false,
        }
    }
}

impl LoopOptions {
    #[must_use]
    pub fn from_config(audio: &AudioConfig, transcription: &TranscriptionConfig) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            chunk_length: audio.chunk_length,
            queue_depth: audio.queue_depth.max(1),
            partials: transcription.partials,
        }
    }
}

/// Releases session resources exactly once, in order:
/// disarm the stop timer and publish `stop`, stop the audio source,
/// close the drive channel
///
/// Runs on [`Teardown::release`] or on drop, whichever comes first.
pub struct Teardown<'a> {
    scheduler: &'a ActuationScheduler,
    status: &'a SessionStatus,
    source: &'a mut dyn AudioSource,
    released: bool,
}

impl<'a> Teardown<'a> {
    #[must_use]
    pub fn new(
        scheduler: &'a ActuationScheduler,
        status: &'a SessionStatus,
        source: &'a mut dyn AudioSource,
    ) -> Self {
        Self {
            scheduler,
            status,
            source,
            released: false,
        }
    }

    /// Start the guarded source
    ///
    /// # Errors
    ///
    /// Returns error if the source fails to start
    pub fn start_source(&mut self, tx: mpsc::Sender<CaptureEvent>) -> Result<()> {
        self.source.start(tx)
    }

    /// Whether resources were already released
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Release everything; later calls do nothing
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Supersedes any armed timer, so no later stop can follow
        self.scheduler.dispatch(Command::Stop);
        self.source.stop();
        self.scheduler.publisher().close();
        self.status.set_active(false);

        tracing::info!("session released");
    }
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Long-lived voice command loop
pub struct ControlLoop {
    scheduler: ActuationScheduler,
    transcriber: Arc<dyn Transcriber>,
    status: SessionStatus,
    options: LoopOptions,
}

impl ControlLoop {
    #[must_use]
    pub fn new(
        scheduler: ActuationScheduler,
        transcriber: Arc<dyn Transcriber>,
        options: LoopOptions,
    ) -> Self {
        let status = SessionStatus::new(scheduler.publisher().clone());
        Self {
            scheduler,
            transcriber,
            status,
            options,
        }
    }

    /// Handle for observing the session
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.clone()
    }

    /// Run until `cancel` fires, the source ends, or capture faults
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot start or reports a fault. Resources
    /// are released on every path.
    #[allow(clippy::future_not_send)]
    pub async fn run(&self, source: &mut dyn AudioSource, cancel: CancellationToken) -> Result<()> {
        let mut teardown = Teardown::new(&self.scheduler, &self.status, source);
        // Declared after `teardown` so that on drop the receiver closes before
        // the source is stopped; a producer blocked on a full queue is released
        let (tx, mut rx) = mpsc::channel(self.options.queue_depth.max(1));

        teardown.start_source(tx)?;
        self.status.set_active(true);
        tracing::info!(
            transcriber = self.transcriber.name(),
            window_secs = self.options.chunk_length.as_secs_f64(),
            "control loop started"
        );

        let result = self.process(&mut rx, &cancel).await;
        rx.close();
        teardown.release();

        match &result {
            Ok(()) => tracing::info!("control loop stopped"),
            Err(e) => tracing::error!(error = %e, "control loop failed"),
        }
        result
    }

    async fn process(
        &self,
        rx: &mut mpsc::Receiver<CaptureEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut window = StreamWindow::new(self.options.sample_rate, self.options.chunk_length);

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("cancellation requested");
                    return Ok(());
                }
                event = rx.recv() => event,
            };

            let chunk = match event {
                Some(CaptureEvent::Chunk(chunk)) => chunk,
                Some(CaptureEvent::Fault(message)) => {
                    tracing::error!(error = %message, "audio capture fault");
                    return Err(Error::Audio(message));
                }
                None => {
                    tracing::info!("audio source ended");
                    return Ok(());
                }
            };

            let update = window.push(&chunk);
            if !update.is_final {
                if !self.options.partials {
                    continue;
                }
                if !rx.is_empty() {
                    tracing::debug!(seq = update.seq, "next slice queued, skipping partial");
                    continue;
                }
            }

            let transcription = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("cancellation requested during transcription");
                    return Ok(());
                }
                result = self.transcribe(&update) => result,
            };

            if let Some(transcription) = transcription {
                self.handle(&transcription);
            }
        }
    }

    /// Transcribe a window; failures yield no result
    async fn transcribe(&self, update: &WindowUpdate) -> Option<Transcription> {
        let wav = match samples_to_wav(&update.samples, update.sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(seq = update.seq, error = %e, "failed to encode chunk");
                return None;
            }
        };

        let text = match self.transcriber.transcribe(&wav).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(seq = update.seq, error = %e, "transcription failed");
                return None;
            }
        };

        if text.is_empty() {
            tracing::debug!(seq = update.seq, "empty transcription");
            return None;
        }

        if update.is_final {
            tracing::info!(seq = update.seq, transcript = %text, "final transcript");
            Some(Transcription::final_text(text))
        } else {
            tracing::debug!(seq = update.seq, transcript = %text, "partial transcript");
            Some(Transcription::partial(text))
        }
    }

    /// Act on a transcription; only final results move the robot
    fn handle(&self, transcription: &Transcription) {
        if !transcription.is_final {
            return;
        }

        match interpret(&transcription.text) {
            Some(command) => {
                tracing::info!(%command, "dispatching");
                self.scheduler.dispatch(command);
            }
            None => tracing::debug!(transcript = %transcription.text, "no command"),
        }
    }
}
