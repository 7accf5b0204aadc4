use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use kindly::console::spawn_command_reader;
use kindly::voice::{
    AudioBlock, AudioOutput, CaptureTap, CpalMicrophone, INPUT_SAMPLE_RATE, Microphone,
    MusicPlayer, OUTPUT_SAMPLE_RATE, OutputContext, PlaybackBuffer, PreviewPlayer, VoiceId,
    samples_to_wav,
};
use kindly::{
    Command as CompanionCommand, Companion, CompanionDeps, CompanionSettings, Config, Console,
    CpalBackend, GeminiLive, GeminiNews, ITunesSearch, MusicSearch, NewsSource,
};

/// Rate the music output is opened at; previews are 44.1 kHz AAC
const MUSIC_SAMPLE_RATE: u32 = 44_100;

/// Kindly - a voice companion styled as a friendly radio host
#[derive(Parser)]
#[command(name = "kindly", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the captured 16 kHz audio as a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// Read today's headline digest
    News,
    /// Look up a song and play its preview
    Play {
        /// Song title
        song: String,
        /// Artist
        artist: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,kindly=info",
        1 => "info,kindly=debug",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries the conversation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration, output } => test_mic(duration, output).await,
            Command::TestSpeaker => test_speaker().await,
            Command::News => news().await,
            Command::Play { song, artist } => play(&song, &artist).await,
        };
    }

    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let client = http_client()?;
    let (music, music_ended) = music_player(&client)?;
    let deps = CompanionDeps {
        backend: Arc::new(CpalBackend),
        connector: Arc::new(GeminiLive::new(config.live_endpoint.clone(), config.api_key())),
        search: Arc::new(ITunesSearch::new(client.clone(), config.search_url.clone())),
        news: Arc::new(GeminiNews::new(
            client,
            config.api_base.clone(),
            config.news_model.clone(),
            config.api_key(),
        )),
        music: Arc::new(music),
        music_ended: Some(music_ended),
    };

    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let console = tokio::spawn(Console::new(std::io::stdout()).run(ui_rx));
    spawn_command_reader(command_tx.clone())?;

    let interrupt = command_tx;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let _ = interrupt.send(CompanionCommand::Quit);
        }
    });

    tracing::info!(model = %config.live_model, voice = %config.voice, "kindly ready");
    println!("Kindly is on the dial. Press Enter to start or stop, q to quit.");

    let mut companion = Companion::new(deps, CompanionSettings::from(&config), ui_tx);
    companion.run(command_rx).await;
    drop(companion);

    console.await?;
    Ok(())
}

fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("kindly/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()?)
}

fn music_player(
    client: &reqwest::Client,
) -> anyhow::Result<(PreviewPlayer, mpsc::UnboundedReceiver<VoiceId>)> {
    let (ended_tx, ended_rx) = mpsc::unbounded_channel();
    let output = OutputContext::open(MUSIC_SAMPLE_RATE, ended_tx)?;
    Ok((PreviewPlayer::new(client.clone(), Box::new(output)), ended_rx))
}

/// Test microphone input
async fn test_mic(duration: u64, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut microphone = CpalMicrophone::acquire()?;
    println!("Device rate: {} Hz (captured at {INPUT_SAMPLE_RATE} Hz)", microphone.device_rate());
    println!("---");

    let (tx, mut rx) = mpsc::unbounded_channel::<AudioBlock>();
    microphone.attach(CaptureTap::new(tx))?;

    let mut recorded = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut second = Vec::new();
        while let Ok(block) = rx.try_recv() {
            second.extend_from_slice(block.samples());
        }
        let energy = calculate_rms(&second);
        let peak = second.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
        recorded.extend(second);
    }

    microphone.release();

    if let Some(path) = output {
        let wav = samples_to_wav(&recorded, INPUT_SAMPLE_RATE)?;
        std::fs::write(&path, wav)?;
        println!("Saved {} samples to {}", recorded.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

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

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let output = OutputContext::open(OUTPUT_SAMPLE_RATE, ended_tx)?;

    let sample_rate = OUTPUT_SAMPLE_RATE;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let buffer = PlaybackBuffer::mono(sample_rate, samples);
    output.start_voice(&buffer, output.current_time());
    let _ = tokio::time::timeout(Duration::from_secs(4), ended_rx.recv()).await;
    output.close();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Print the headline digest
async fn news() -> anyhow::Result<()> {
    let config = Config::load()?;
    let news = GeminiNews::new(
        http_client()?,
        config.api_base.clone(),
        config.news_model.clone(),
        config.api_key(),
    );

    println!("Fetching headlines from {}...\n", config.news_model);
    println!("{}", news.headlines().await?);
    Ok(())
}

/// Search for a song and play its preview to the end
async fn play(song: &str, artist: &str) -> anyhow::Result<()> {
    let client = http_client()?;
    let search = ITunesSearch::new(client.clone(), kindly::tools::DEFAULT_SEARCH_URL);

    let Some(track) = search.search(song, artist, None).await? else {
        println!("No match for \"{song}\" by {artist}");
        return Ok(());
    };

    println!("Playing \"{}\" by {} ({})", track.name, track.artist, track.preview_url);
    let (player, mut ended) = music_player(&client)?;
    player.play(&track.preview_url).await?;

    tokio::select! {
        _ = ended.recv() => println!("Preview finished"),
        _ = tokio::signal::ctrl_c() => {
            player.stop();
            println!("Stopped");
        }
    }
    Ok(())
}
