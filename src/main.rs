use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use voicedrive::api::{ApiServer, ApiState};
use voicedrive::drive::{ActuationScheduler, DrivePublisher, MessageSink, MqttLink, PublishOutcome};
use voicedrive::llm::TextGenerator;
use voicedrive::stt::build_transcriber;
use voicedrive::voice::{
    AudioCapture, CaptureEvent, PhraseCache, Speaker, TextToSpeech, TtsProvider, list_devices,
};
use voicedrive::{AudioSource, Config, ControlLoop, LoopOptions, db, interpret};

/// How long to wait for the broker before starting anyway
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long queued drive messages get to flush on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// voicedrive - drive a robot with your voice
#[derive(Parser)]
#[command(name = "voicedrive", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the voice loop and the HTTP API (default)
    Run {
        /// Skip the microphone loop (API only)
        #[arg(long, env = "VOICEDRIVE_NO_VOICE")]
        no_voice: bool,
        /// Skip the HTTP API
        #[arg(long)]
        no_api: bool,
    },
    /// List audio devices
    Devices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Show which command a phrase maps to
    Interpret {
        /// Phrase to interpret
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Publish one drive command (movements auto-stop)
    Send {
        /// forward, back, left, right or stop
        command: voicedrive::Command,
    },
    /// Speak text through the configured TTS provider
    Say {
        /// Text to speak
        #[arg(required = true)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voicedrive=info,rumqttc=warn",
        1 => "info,voicedrive=debug,rumqttc=warn",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.unwrap_or(Command::Run {
        no_voice: false,
        no_api: false,
    });

    match command {
        Command::Run { no_voice, no_api } => run_session(no_voice, no_api).await,
        Command::Devices => cmd_devices(),
        Command::TestMic { duration } => test_mic(duration).await,
        Command::Interpret { text } => {
            cmd_interpret(&text.join(" "));
            Ok(())
        }
        Command::Send { command } => cmd_send(command).await,
        Command::Say { text } => cmd_say(&text.join(" ")).await,
    }
}

/// Open the drive channel and wrap it in a scheduler
async fn open_drive(config: &Config) -> (Arc<MqttLink>, ActuationScheduler) {
    let link = Arc::new(MqttLink::open(&config.mqtt));
    if !link.wait_connected(CONNECT_TIMEOUT).await {
        tracing::warn!(
            host = %config.mqtt.host,
            port = config.mqtt.port,
            "broker not reachable yet, commands are dropped until it connects"
        );
    }

    let sink: Arc<dyn MessageSink> = link.clone();
    let publisher = DrivePublisher::new(sink, config.drive.encoding)
        .with_speeds(config.drive.linear_speed, config.drive.angular_speed);
    let scheduler = ActuationScheduler::new(publisher, config.drive.stop_delay);

    (link, scheduler)
}

/// Build the speaker if the configured TTS provider has a key
fn build_speaker(config: &Config, playback: bool) -> anyhow::Result<Option<Speaker>> {
    let key = match config.tts.provider {
        TtsProvider::ElevenLabs => config.api_keys.elevenlabs(),
        TtsProvider::OpenAI => config.api_keys.openai(),
    };
    let Some(key) = key else {
        tracing::info!(provider = ?config.tts.provider, "no TTS key, speech output disabled");
        return Ok(None);
    };

    let tts = TextToSpeech::new(
        config.tts.provider,
        key,
        &config.tts.voice,
        config.tts.model.clone(),
    )?;
    let cache = PhraseCache::new(config.phrase_cache_dir(), &config.tts.cached_phrases);

    Ok(Some(Speaker::new(
        tts,
        cache,
        config.audio.preferred_devices.clone(),
        playback,
    )))
}

fn build_api(
    config: &Config,
    scheduler: ActuationScheduler,
    control: Option<&ControlLoop>,
) -> anyhow::Result<ApiServer> {
    let pool = db::init(config.db_path())?;
    let mut state = ApiState::new(pool, scheduler);

    if let Some(key) = config.api_keys.gemini() {
        let generator = TextGenerator::new(key, config.llm.model.clone())?
            .with_base_url(config.llm.base_url.clone());
        state = state.with_generator(Arc::new(generator));
    } else {
        tracing::info!("no GEMINI_API_KEY, reply generation disabled");
    }

    if let Some(speaker) = build_speaker(config, true)? {
        state = state.with_speaker(Arc::new(speaker));
    }

    if let Some(control) = control {
        state = state.with_session(control.status());
    }

    Ok(ApiServer::new(
        state,
        config.server.port,
        &config.server.cors_origin,
    )?)
}

/// Run the voice loop and API until interrupted
#[allow(clippy::future_not_send)]
async fn run_session(no_voice: bool, no_api: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let (link, scheduler) = open_drive(&config).await;

    let voice = if no_voice {
        None
    } else {
        let transcriber = match build_transcriber(&config.transcription, &config.api_keys) {
            Ok(transcriber) => transcriber,
            Err(e) => {
                link.shutdown(SHUTDOWN_GRACE).await;
                return Err(e.into());
            }
        };

        // No microphone is fatal: release the drive channel first
        let capture = match AudioCapture::new(
            &config.audio.preferred_devices,
            config.audio.sample_rate,
            config.audio.stream_chunk,
        ) {
            Ok(capture) => capture,
            Err(e) => {
                link.shutdown(SHUTDOWN_GRACE).await;
                return Err(e.into());
            }
        };
        tracing::info!(device = capture.device_name(), "microphone ready");

        let options = LoopOptions::from_config(&config.audio, &config.transcription);
        Some((ControlLoop::new(scheduler.clone(), transcriber, options), capture))
    };

    let api = if no_api {
        None
    } else {
        let control = voice.as_ref().map(|(control, _)| control);
        match build_api(&config, scheduler.clone(), control) {
            Ok(server) => Some(server.spawn()),
            Err(e) => {
                link.shutdown(SHUTDOWN_GRACE).await;
                return Err(e);
            }
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    tracing::info!(voice = !no_voice, api = !no_api, "voicedrive ready");

    let mut api = api;
    let result = match voice {
        Some((control, mut capture)) => control
            .run(&mut capture, cancel.clone())
            .await
            .map_err(anyhow::Error::from),
        None => {
            if let Some(mut handle) = api.take() {
                let exited = tokio::select! {
                    () = cancel.cancelled() => None,
                    joined = &mut handle => Some(joined),
                };
                match exited {
                    Some(joined) => report_api_exit(joined),
                    None => handle.abort(),
                }
            }
            scheduler.dispatch(voicedrive::Command::Stop);
            Ok(())
        }
    };

    if let Some(handle) = api {
        if handle.is_finished() {
            report_api_exit(handle.await);
        } else {
            handle.abort();
        }
    }

    link.shutdown(SHUTDOWN_GRACE).await;
    result
}

fn report_api_exit(joined: Result<voicedrive::Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => tracing::info!("API server stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
        Err(e) => tracing::error!(error = %e, "API server task failed"),
    }
}

/// List audio devices
fn cmd_devices() -> anyhow::Result<()> {
    let devices = list_devices()?;
    if devices.is_empty() {
        println!("No audio devices found");
        return Ok(());
    }

    println!("{:>3}  {:<40} {:>3} {:>3} {:>7}", "#", "name", "in", "out", "rate");
    for device in devices {
        let rate = device
            .default_sample_rate
            .map_or_else(|| "-".to_string(), |r| r.to_string());
        println!(
            "{:>3}  {:<40} {:>3} {:>3} {:>7}",
            device.index,
            device.name,
            device.max_input_channels,
            device.max_output_channels,
            rate
        );
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    let config = Config::load()?;

    let mut capture = AudioCapture::new(
        &config.audio.preferred_devices,
        config.audio.sample_rate,
        Duration::from_secs(1),
    )?;
    println!("Testing {} for {duration} seconds...", capture.device_name());
    println!("Speak into your microphone!\n");

    let (tx, mut rx) = mpsc::channel(8);
    capture.start(tx)?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        match event {
            CaptureEvent::Chunk(chunk) => {
                let energy = calculate_rms(&chunk.samples);
                let peak = chunk.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

                // Visual meter
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let meter_len = (energy * 100.0).min(50.0) as usize;
                let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

                println!(
                    "[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]",
                    chunk.seq + 1
                );
            }
            CaptureEvent::Fault(message) => {
                capture.stop();
                anyhow::bail!("capture failed: {message}");
            }
        }
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check the preferred_devices list in config.toml");
    println!("and run `voicedrive devices` to see what is available.");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

fn cmd_interpret(text: &str) {
    match interpret(text) {
        Some(command) => println!("{command}"),
        None => println!("(no command)"),
    }
}

/// Publish one command and wait for its automatic stop
async fn cmd_send(command: voicedrive::Command) -> anyhow::Result<()> {
    let config = Config::load()?;
    let (link, scheduler) = open_drive(&config).await;

    if scheduler.dispatch(command) == PublishOutcome::Dropped {
        link.shutdown(SHUTDOWN_GRACE).await;
        anyhow::bail!(
            "broker {}:{} not connected, command dropped",
            config.mqtt.host,
            config.mqtt.port
        );
    }
    println!("Sent {command}");

    if !command.is_stop() {
        tokio::time::sleep(scheduler.stop_delay() + Duration::from_millis(100)).await;
        println!("Sent stop");
    }

    link.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}

/// Speak text through the configured provider
async fn cmd_say(text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let speaker = build_speaker(&config, true)?
        .ok_or_else(|| anyhow::anyhow!("no API key for {:?} TTS", config.tts.provider))?;

    println!("Speaking: \"{text}\"");
    let audio = speaker.speak(text).await?;
    println!("Played {} bytes of audio", audio.len());

    Ok(())
}
