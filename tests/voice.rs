//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use voicedrive::stt::{RemoteTranscriber, StreamWindow, Transcriber};
use voicedrive::voice::{
    Chunker, SAMPLE_RATE, StreamResampler, decode_audio, samples_to_wav, wav_to_samples,
};
use voicedrive::{Command, ControlLoop, LoopOptions, interpret};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[test]
fn test_native_rate_stream_becomes_fixed_chunks() {
    // A 48kHz device delivering irregular callback buffers
    let native = generate_sine_samples(440.0, 2.5, 48000, 0.3);
    let mut resampler = StreamResampler::new(48000, SAMPLE_RATE).unwrap();
    let mut chunker = Chunker::new(SAMPLE_RATE, Duration::from_secs(1));

    let mut chunks = Vec::new();
    for buffer in native.chunks(1234) {
        let resampled = resampler.push(buffer).unwrap();
        chunks.extend(chunker.push(&resampled));
    }

    assert_eq!(chunks.len(), 2);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.seq, i as u64);
        assert_eq!(chunk.sample_rate, SAMPLE_RATE);
        assert_eq!(chunk.samples.len(), 16000);
        assert_eq!(chunk.duration(), Duration::from_secs(1));
        assert!(chunk.samples.iter().all(|s| s.abs() <= 1.0));
    }
}

#[test]
fn test_window_output_is_valid_wav() {
    let mut chunker = Chunker::new(SAMPLE_RATE, Duration::from_millis(500));
    let mut window = StreamWindow::new(SAMPLE_RATE, Duration::from_secs(1));

    let chunks = chunker.push(&generate_sine_samples(220.0, 1.0, SAMPLE_RATE, 0.5));
    assert_eq!(chunks.len(), 2);

    let partial = window.push(&chunks[0]);
    assert!(!partial.is_final);
    let last = window.push(&chunks[1]);
    assert!(last.is_final);
    assert_eq!(last.seq, 1);

    let wav = samples_to_wav(&last.samples, last.sample_rate).unwrap();
    let (decoded, rate) = wav_to_samples(&wav).unwrap();
    assert_eq!(rate, SAMPLE_RATE);
    assert_eq!(decoded.len(), 16000);

    // decode_audio sniffs the container
    let (sniffed, sniffed_rate) = decode_audio(&wav).unwrap();
    assert_eq!(sniffed_rate, SAMPLE_RATE);
    assert_eq!(sniffed.len(), decoded.len());
}

#[tokio::test]
async fn test_chunk_through_remote_worker_to_command() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": " Go back! "})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transcriber = RemoteTranscriber::openai_compatible(
        &server.uri(),
        "whisper-1".to_string(),
        Some(secrecy::SecretString::from("sk-test".to_string())),
    );

    let chunk = common::chunk(0, 1.0, SAMPLE_RATE);
    let text = transcriber.transcribe(&chunk.to_wav().unwrap()).await.unwrap();

    assert_eq!(interpret(&text), Some(Command::Back));
}

#[test]
fn test_garbage_audio_is_rejected() {
    assert!(wav_to_samples(b"definitely not audio").is_err());
    assert!(decode_audio(&[0u8; 16]).is_err());
}

#[tokio::test]
async fn test_stalled_worker_skips_chunk_and_loop_moves_on() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"text": "go forward"}))
                .set_delay(Duration::from_secs(30)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "turn left"})))
        .mount(&server)
        .await;

    let transcriber = Arc::new(
        RemoteTranscriber::openai_compatible(&server.uri(), "whisper-1".to_string(), None)
            .with_timeout(Duration::from_millis(200)),
    );
    let sink = common::RecordingSink::new();
    let options = LoopOptions {
        sample_rate: SAMPLE_RATE,
        chunk_length: Duration::from_secs(1),
        queue_depth: 8,
        partials: false,
    };
    let control = ControlLoop::new(
        common::scheduler(&sink, Duration::from_secs(60)),
        transcriber,
        options,
    );
    let mut source = common::ScriptedSource::chunks(2, false);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        control.run(&mut source, CancellationToken::new()),
    )
    .await
    .expect("control loop stalled on the transcription worker");

    // The stalled first chunk yields nothing; the second still drives
    result.unwrap();
    assert_eq!(sink.payloads(), ["left", "stop"]);
}
