use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use beacon_voice::transport::ws;
use beacon_voice::voice::{
    CaptureDevice, CpalCapture, CpalOutputFactory, FrameSink, PlaybackChunk, QUANTUM_SAMPLES,
    SAMPLE_RATE,
};
use beacon_voice::client::Command as MicCommand;
use beacon_voice::{CaptureController, CaptureState, Config, PlaybackScheduler, VoiceClient};

/// How long quitting waits for queued messages to be written
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Beacon Voice - Real-time voice streaming for AI assistants
#[derive(Parser)]
#[command(name = "beacon-voice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Talk to the assistant (Enter toggles the mic, `q` quits)
    Client {
        /// Bridge WebSocket URL
        #[arg(long, env = "BEACON_VOICE_BACKEND_URL")]
        url: Option<String>,
    },
    /// Relay voice clients to the realtime backend
    Bridge {
        /// Port to listen on
        #[arg(long, env = "BEACON_VOICE_PORT")]
        port: Option<u16>,
    },
    /// Test microphone input through the frame encoder
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output through the playback scheduler
    TestSpeaker,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_voice=info",
        1 => "info,beacon_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    // cpal streams aren't Send, so everything but the bridge runs on one thread
    let runtime = match &cli.command {
        Command::Bridge { .. } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build(),
        _ => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build(),
    };

    let result = match runtime {
        Ok(rt) => rt.block_on(run(cli)),
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Client { url } => {
            if let Some(url) = url {
                config.client.backend_url = url;
            }
            run_client(&config).await
        }
        Command::Bridge { port } => {
            if let Some(port) = port {
                config.bridge.port = port;
            }
            beacon_voice::bridge::serve(config.bridge).await?;
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration, config.audio.frame_capacity).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Interactive voice session
async fn run_client(config: &Config) -> anyhow::Result<()> {
    let mut connection =
        ws::connect(&config.client.backend_url, config.audio.queue_capacity).await?;

    let controller = CaptureController::with_capacity(
        CpalCapture::new(),
        connection.transport(),
        config.audio.frame_capacity,
    );
    let mut ui = controller.subscribe();
    let scheduler = PlaybackScheduler::new(CpalOutputFactory);
    let mut client = VoiceClient::new(controller, scheduler, |text: &str| {
        println!("assistant: {text}");
    });

    // Mic indicator
    tokio::spawn(async move {
        while ui.changed().await.is_ok() {
            let state = *ui.borrow_and_update();
            match state {
                CaptureState::Recording => println!("● recording (Enter to send)"),
                CaptureState::Idle => println!("○ idle (Enter to talk)"),
            }
        }
    });

    // Keyboard stands in for the mic button
    let (tx, mut commands) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = if line.trim().eq_ignore_ascii_case("q") {
                MicCommand::Quit
            } else {
                MicCommand::Toggle
            };
            if tx.send(command).await.is_err() || command == MicCommand::Quit {
                break;
            }
        }
    });

    println!("Connected to {}", config.client.backend_url);
    println!("Press Enter to talk, Enter again to send, q + Enter to quit.");

    client.run(&mut connection, &mut commands).await;
    drop(client);

    // Let a final commit reach the backend before the socket goes away
    connection.close(CLOSE_TIMEOUT).await;
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64, capacity: usize) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut frames) = mpsc::channel(capacity);
    let overflow = Arc::new(AtomicU64::new(0));

    let mut capture = CpalCapture::new();
    capture.acquire()?;
    capture.build_graph(FrameSink::new(tx, Arc::clone(&overflow)))?;
    capture.resume()?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut count = 0usize;
        let mut sum_squares = 0.0f64;
        let mut samples = 0usize;
        let mut peak = 0i16;

        while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, frames.recv()).await {
            count += 1;
            for &s in frame.samples() {
                sum_squares += f64::from(s) * f64::from(s);
                peak = peak.max(s.saturating_abs());
            }
            samples += frame.len();
        }

        #[allow(clippy::cast_precision_loss)]
        let rms = if samples == 0 {
            0.0
        } else {
            (sum_squares / samples as f64).sqrt() / 32768.0
        };

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] frames: {count:3} | RMS: {rms:.4} | Peak: {peak:6} | [{meter}]",
            i + 1
        );
    }

    let dropped = overflow.load(std::sync::atomic::Ordering::Relaxed);
    println!("\n---");
    println!("Dropped frames: {dropped}");
    println!(
        "Expect ~{} frames per second.",
        SAMPLE_RATE as usize / QUANTUM_SAMPLES
    );
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a tone split into back-to-back chunks
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a steady 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let chunk_samples = SAMPLE_RATE as usize / 10;
    let total_samples = SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let tone: Vec<f32> = (0..total_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let mut scheduler = PlaybackScheduler::new(CpalOutputFactory);
    for samples in tone.chunks(chunk_samples) {
        scheduler.enqueue(PlaybackChunk {
            samples: samples.to_vec(),
            sample_rate: SAMPLE_RATE,
        })?;
    }

    println!(
        "Scheduled {} chunks of 100ms; playback ends at {:.2}s on the device clock",
        scheduler.scheduled(),
        scheduler.cursor()
    );

    tokio::time::sleep(Duration::from_millis(2300)).await;

    println!("\n---");
    println!("If you heard a clean tone with no clicks, playback scheduling works!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
