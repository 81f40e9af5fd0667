//! Shared test utilities
//!
//! Hardware-free doubles for the three seams of the control loop: the drive
//! channel, the audio source and the transcriber.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use voicedrive::drive::{ActuationScheduler, DRIVE_TOPIC, DriveEncoding, DrivePublisher, MessageSink};
use voicedrive::stt::Transcriber;
use voicedrive::voice::{AudioChunk, CaptureEvent};
use voicedrive::{AudioSource, DbPool, Error, Result, db};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Drive channel that records payloads with their (virtual) publish time
pub struct RecordingSink {
    start: Instant,
    messages: Mutex<Vec<(Duration, String)>>,
    connected: AtomicBool,
    closes: AtomicUsize,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            messages: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
        })
    }

    /// Payloads in publish order
    pub fn payloads(&self) -> Vec<String> {
        self.timeline().into_iter().map(|(_, p)| p).collect()
    }

    /// Payloads with their offset from sink creation
    pub fn timeline(&self) -> Vec<(Duration, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl MessageSink for RecordingSink {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        assert_eq!(topic, DRIVE_TOPIC);
        if self.close_count() > 0 {
            return Err(Error::ChannelUnavailable("closed".to_string()));
        }
        let payload = String::from_utf8(payload).expect("payload is utf-8");
        self.messages
            .lock()
            .unwrap()
            .push((self.start.elapsed(), payload));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.close_count() == 0
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scheduler publishing bare tokens to `sink`
#[must_use]
pub fn scheduler(sink: &Arc<RecordingSink>, stop_delay: Duration) -> ActuationScheduler {
    let sink: Arc<dyn MessageSink> = sink.clone();
    ActuationScheduler::new(DrivePublisher::new(sink, DriveEncoding::Token), stop_delay)
}

/// `secs` of low-level noise at `sample_rate`
#[must_use]
pub fn chunk(seq: u64, secs: f64, sample_rate: u32) -> AudioChunk {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let len = (f64::from(sample_rate) * secs).round() as usize;
    AudioChunk {
        seq,
        samples: vec![0.01; len],
        sample_rate,
    }
}

/// Audio source replaying a fixed script of events
///
/// Each event is sent after its delay. With `hold_open` the sender stays
/// alive after the script ends, like a live microphone.
pub struct ScriptedSource {
    script: Vec<(Duration, CaptureEvent)>,
    hold_open: bool,
    task: Option<JoinHandle<()>>,
    stops: Arc<AtomicUsize>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(script: Vec<(Duration, CaptureEvent)>, hold_open: bool) -> Self {
        Self {
            script,
            hold_open,
            task: None,
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// One-second chunks at 16kHz, all delivered immediately
    #[must_use]
    pub fn chunks(count: u64, hold_open: bool) -> Self {
        let script = (0..count)
            .map(|seq| (Duration::ZERO, CaptureEvent::Chunk(chunk(seq, 1.0, 16000))))
            .collect();
        Self::new(script, hold_open)
    }

    /// Shared count of `stop` calls, readable after the source is borrowed
    #[must_use]
    pub fn stop_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stops)
    }
}

impl AudioSource for ScriptedSource {
    fn start(&mut self, tx: mpsc::Sender<CaptureEvent>) -> Result<()> {
        let script = std::mem::take(&mut self.script);
        let hold_open = self.hold_open;

        self.task = Some(tokio::spawn(async move {
            for (delay, event) in script {
                tokio::time::sleep(delay).await;
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if hold_open {
                std::future::pending::<()>().await;
            }
            drop(tx);
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Audio source that queues all its chunks synchronously on start
///
/// Every chunk is already waiting when the loop first receives. The sender
/// is kept until `stop`, like a live microphone.
pub struct QueuedSource {
    chunks: Vec<AudioChunk>,
    tx: Option<mpsc::Sender<CaptureEvent>>,
}

impl QueuedSource {
    /// `count` one-second chunks at 16kHz
    #[must_use]
    pub fn new(count: u64) -> Self {
        Self {
            chunks: (0..count).map(|seq| chunk(seq, 1.0, 16000)).collect(),
            tx: None,
        }
    }
}

impl AudioSource for QueuedSource {
    fn start(&mut self, tx: mpsc::Sender<CaptureEvent>) -> Result<()> {
        for chunk in self.chunks.drain(..) {
            tx.try_send(CaptureEvent::Chunk(chunk))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        self.tx = Some(tx);
        Ok(())
    }

    fn stop(&mut self) {
        self.tx = None;
    }
}

/// Audio source whose producer is a std thread blocking on a full queue
///
/// The thread sends chunks with `blocking_send` until the receiver goes
/// away, like a device callback that waits for queue space. `stop` joins
/// it, so it only returns once the receiver is closed.
pub struct BlockingSource {
    worker: Option<std::thread::JoinHandle<()>>,
    sent: Arc<AtomicUsize>,
}

impl BlockingSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            worker: None,
            sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Chunks accepted by the queue so far
    #[must_use]
    pub fn sent_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.sent)
    }
}

impl AudioSource for BlockingSource {
    fn start(&mut self, tx: mpsc::Sender<CaptureEvent>) -> Result<()> {
        let sent = Arc::clone(&self.sent);
        self.worker = Some(std::thread::spawn(move || {
            for seq in 0.. {
                if tx.blocking_send(CaptureEvent::Chunk(chunk(seq, 1.0, 16000))).is_err() {
                    return;
                }
                sent.fetch_add(1, Ordering::SeqCst);
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.join().expect("producer thread panicked");
        }
    }
}

/// Transcriber answering from a queue of canned results
///
/// Results are taken in call order; an exhausted queue yields empty text.
pub struct ScriptedTranscriber {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    #[must_use]
    pub fn new(responses: &[std::result::Result<&str, &str>]) -> Arc<Self> {
        Self::with_latency(responses, Duration::ZERO)
    }

    #[must_use]
    pub fn with_latency(
        responses: &[std::result::Result<&str, &str>],
        latency: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(
                responses
                    .iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            latency,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        assert_eq!(&wav[0..4], b"RIFF");
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(Error::Transcription(message)),
            None => Ok(String::new()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
