use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use clarion_core::config::Config;
use clarion_core::turn::{ConversationTurn, TurnState};
use clarion_core::types::{AssistantMode, AudioClip, AudioContainer, AudioFormat};
use clarion_media::sniff::{container_for_path, sniff_container};
use clarion_media::wav::parse_wav;
use clarion_media::FfmpegNormalizer;
use clarion_pipeline::{PipelineOrchestrator, Session};
use clarion_providers::{GeminiClient, GoogleSpeechClient, GoogleTtsClient};

#[derive(Parser)]
#[command(
    name = "clarion",
    about = "Voice support assistant — speak or type, get the answer back as text and audio",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one voice turn from a recorded/uploaded audio file
    Turn {
        /// Input audio (wav, mp3, m4a, webm, or ogg)
        input: PathBuf,

        /// Where to write the reply audio (default: ~/.clarion/audio/)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Assistant mode: customer_service, call_center, lead_generation
        #[arg(long)]
        mode: Option<String>,

        /// Print a conversation analysis after the turn
        #[arg(long)]
        analyze: bool,
    },

    /// Ask with typed text instead of audio
    Ask {
        message: String,

        /// Where to write the reply audio (default: ~/.clarion/audio/)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Assistant mode: customer_service, call_center, lead_generation
        #[arg(long)]
        mode: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose common issues (transcoder, credentials)
    Doctor,

    /// Show resolved settings
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value (dotted path, e.g. speech.location)
    Get { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    init_logging(&config, cli.verbose);
    tracing::debug!(path = %config_path.display(), "Config loaded");

    match cli.command {
        Commands::Turn {
            input,
            out,
            mode,
            analyze,
        } => {
            let mode = parse_mode(mode.as_deref())?;
            let (orchestrator, gemini) = build_pipeline(&config)?;
            let clip = load_clip(&input).await?;

            let cancel = cancel_on_ctrl_c();
            let mut session = Session::with_mode(mode);
            let turn = orchestrator.run_turn(&mut session, clip, &cancel).await;
            render_turn(&turn, out)?;

            if analyze && !session.history().is_empty() {
                let analysis = gemini.analyze_conversation(session.history()).await?;
                println!("\n--- Conversation analysis ---\n{analysis}");
            }
        }
        Commands::Ask { message, out, mode } => {
            let mode = parse_mode(mode.as_deref())?;
            let (orchestrator, _) = build_pipeline(&config)?;

            let cancel = cancel_on_ctrl_c();
            let mut session = Session::with_mode(mode);
            let turn = orchestrator.run_text_turn(&mut session, &message, &cancel).await;
            render_turn(&turn, out)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("No such config key: {key}");
                    std::process::exit(1);
                }
            },
        },
        Commands::Doctor => {
            doctor(&config).await;
        }
        Commands::Status => {
            println!("Clarion v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Model: {}", config.model());
            println!("Speech location: {}", config.speech().resolve_location());
            println!("Sample rate: {} Hz", config.audio().sample_rate_hz());
            println!("Transcoder: {}", config.audio().ffmpeg_path());
        }
    }

    Ok(())
}

fn init_logging(config: &Config, verbose: bool) {
    let logging = config.logging.clone().unwrap_or_default();

    let base = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".into())
    };
    let mut directives = vec![base];
    directives.extend(logging.filters.iter().cloned());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives.join(",")));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_mode(name: Option<&str>) -> anyhow::Result<AssistantMode> {
    match name {
        None => Ok(AssistantMode::default()),
        Some(name) => AssistantMode::from_name(name).ok_or_else(|| {
            anyhow::anyhow!(
                "unknown mode '{name}' (expected customer_service, call_center, or lead_generation)"
            )
        }),
    }
}

fn build_pipeline(config: &Config) -> anyhow::Result<(PipelineOrchestrator, Arc<GeminiClient>)> {
    let normalizer = Arc::new(FfmpegNormalizer::new(&config.audio()));
    let stt = Arc::new(GoogleSpeechClient::new(&config.speech())?);
    let gemini = Arc::new(GeminiClient::new(&config.generation(), config.model())?);
    let tts = Arc::new(GoogleTtsClient::new(&config.synthesis())?);

    let orchestrator = PipelineOrchestrator::new(normalizer, stt, gemini.clone(), tts, config);
    Ok((orchestrator, gemini))
}

/// Read an input file into a clip. The payload's magic bytes win over the
/// file extension when they disagree.
async fn load_clip(path: &Path) -> anyhow::Result<AudioClip> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let container = sniff_container(&data)
        .or_else(|| container_for_path(path))
        .ok_or_else(|| anyhow::anyhow!("unsupported audio container: {}", path.display()))?;

    let format = match container {
        AudioContainer::Wav => match parse_wav(&data) {
            Some(info) => AudioFormat {
                container,
                sample_rate_hz: Some(info.sample_rate),
                channels: Some(info.channels),
                duration_ms: Some(info.duration_ms()),
            },
            None => AudioFormat::declared(container),
        },
        _ => AudioFormat::declared(container),
    };

    Ok(AudioClip::new(data, format))
}

/// Cancel the turn on Ctrl-C so scratch files are released cleanly.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

/// Generate a unique output filename under `~/.clarion/audio/`.
fn default_output_path() -> PathBuf {
    let dir = clarion_core::config::data_dir().join("audio");
    let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let id = uuid::Uuid::new_v4().simple().to_string();
    dir.join(format!("reply_{ts}_{}.mp3", &id[..8]))
}

fn render_turn(turn: &ConversationTurn, out: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(transcript) = turn.transcript() {
        println!("You said: {}", transcript.text);
    }

    match turn.state() {
        TurnState::Complete | TurnState::PartialComplete => {
            let reply = turn
                .reply()
                .ok_or_else(|| anyhow::anyhow!("terminal turn without a reply"))?;
            println!("Assistant: {}", reply.text);

            if let Some(audio) = turn.synthesized() {
                let path = out.unwrap_or_else(default_output_path);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, &audio.clip.data)?;
                println!(
                    "Reply audio: {} ({}KB)",
                    path.display(),
                    audio.clip.len() / 1024
                );
            } else if let Some(message) = turn.user_message() {
                eprintln!("{message}");
            }
        }
        TurnState::Failed => {
            let message = turn
                .user_message()
                .unwrap_or("Something went wrong. Please try again.");
            eprintln!("{message}");
            std::process::exit(1);
        }
        // run_turn always returns a terminal turn.
        _ => {}
    }

    Ok(())
}

async fn doctor(config: &Config) {
    let mut failures = 0usize;

    let (warnings, errors) = config.validate();
    for w in &warnings {
        println!("warn: {w}");
    }
    for e in &errors {
        println!("FAIL: {e}");
        failures += 1;
    }

    // Transcoder reachable?
    let ffmpeg = config.audio().ffmpeg_path().to_string();
    match tokio::process::Command::new(&ffmpeg)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            let first_line = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("")
                .to_string();
            println!("ok:   transcoder: {first_line}");
        }
        Ok(output) => {
            println!("FAIL: transcoder '{ffmpeg}' exited with {}", output.status);
            failures += 1;
        }
        Err(e) => {
            println!("FAIL: transcoder '{ffmpeg}' not runnable: {e}");
            failures += 1;
        }
    }

    if config.generation().resolve_api_key().is_some() {
        println!("ok:   language-model API key present");
    }
    if config.speech().resolve_project_id().is_some() {
        println!("ok:   recognizer project configured");
    }

    if failures > 0 {
        std::process::exit(1);
    }
    println!("All checks passed ({} warnings)", warnings.len());
}
