use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use chalk_canvas::{CanvasExecutor, CanvasSession, CanvasSurface, SafeBounds, WhiteboardAction, decode_batch, validate};
use chalk_core::config::{Config, LoggingConfig};
use chalk_realtime::{
    AudioInput, HttpCredentialIssuer, NoAudioInput, PcmFileInput, PlaybackBuffer, RuntimeDeps, ScriptedConnector,
    Session, SessionNotice, SessionOptions, StaticCredential, WebSocketConnector,
};

#[derive(Parser)]
#[command(
    name = "chalk",
    about = "Real-time AI tutoring engine: voice session plus a shared math whiteboard",
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
    /// Plot a named function or a custom equation onto a blank board
    Curve {
        /// sin, cos, tan, parabola, cubic, exponential, logarithm, absolute, sqrt, reciprocal, linear
        #[arg(default_value = "sin")]
        function: String,

        /// Plot this expression in x instead of a named function
        #[arg(long)]
        equation: Option<String>,

        #[arg(long, default_value_t = 100.0)]
        x_min: f64,

        #[arg(long, default_value_t = 900.0)]
        x_max: f64,

        #[arg(long, default_value_t = 350.0)]
        y_center: f64,

        #[arg(long, default_value_t = 150.0)]
        amplitude: f64,

        #[arg(long)]
        period: Option<f64>,

        /// Write the board as SVG
        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Extract and validate whiteboard blocks from a tutor response
    Decode {
        file: PathBuf,

        /// Execute the actions and write the board as SVG
        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Run a session against a recorded JSON-lines event script
    Replay {
        script: PathBuf,

        /// Question to type once connected
        #[arg(long)]
        text: Option<String>,

        /// Stop after this long without a session notice
        #[arg(long, default_value_t = 1000)]
        idle_ms: u64,

        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Start a live tutoring session; type questions, `/stop` to interrupt, `/quit` to leave
    Talk {
        /// Stream this PCM16 (24kHz mono) or WAV file as the microphone
        #[arg(long)]
        audio_in: Option<PathBuf>,

        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Check the configuration for problems
    Validate,
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("info")
    };
    let mut directives = vec![level.to_string()];
    directives.extend(logging.filters.iter().cloned());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives.join(",")));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let to_stdout = logging.output == "stdout";
    match (logging.format.as_str(), to_stdout) {
        ("json", true) => builder.json().with_writer(std::io::stdout).init(),
        ("json", false) => builder.json().with_writer(std::io::stderr).init(),
        (_, true) => builder.with_writer(std::io::stdout).init(),
        (_, false) => builder.with_writer(std::io::stderr).init(),
    }
}

fn blank_board(config: &Config) -> (CanvasExecutor<CanvasSession>, SafeBounds) {
    let canvas = config.canvas();
    let bounds = SafeBounds::from(&canvas);
    let surface = CanvasSession::new("cli", canvas.width, canvas.height);
    (CanvasExecutor::new(surface, bounds), bounds)
}

fn write_svg(path: &Path, board: &CanvasSession) -> anyhow::Result<()> {
    std::fs::write(path, board.to_svg()).with_context(|| format!("writing {}", path.display()))?;
    println!("Board written to {} ({} elements)", path.display(), board.len());
    Ok(())
}

fn print_notice(notice: &SessionNotice) {
    match notice {
        SessionNotice::PhaseChanged { phase } => println!("[{phase}]"),
        SessionNotice::Transcript { message } => {
            let who = match message.role {
                chalk_core::types::Role::User => "you",
                chalk_core::types::Role::Assistant => "tutor",
            };
            println!("{who}: {}", message.text);
        }
        SessionNotice::Error { message, fatal } => {
            let label = if *fatal { "error" } else { "warning" };
            eprintln!("{label}: {message}");
        }
        SessionNotice::ActionApplied {
            kind,
            content,
            is_error,
        } => {
            let mark = if *is_error { "!" } else { "+" };
            println!("  {mark} {kind}: {content}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    init_logging(&config.logging.clone().unwrap_or_default(), cli.verbose);
    tracing::debug!(path = %config_path.display(), "Config loaded");

    match cli.command {
        Commands::Curve {
            function,
            equation,
            x_min,
            x_max,
            y_center,
            amplitude,
            period,
            svg,
        } => {
            let (mut executor, bounds) = blank_board(&config);
            let raw = match equation {
                Some(equation) => json!({
                    "type": "draw_custom_curve",
                    "params": {
                        "equation": equation,
                        "xMin": -std::f64::consts::PI * 2.0,
                        "xMax": std::f64::consts::PI * 2.0,
                        "canvasXMin": x_min,
                        "canvasXMax": x_max,
                        "yCenter": y_center,
                        "yScale": amplitude / 2.0,
                    }
                }),
                None => json!({
                    "type": "draw_math_curve",
                    "params": {
                        "function": function,
                        "xMin": x_min,
                        "xMax": x_max,
                        "yCenter": y_center,
                        "amplitude": amplitude,
                        "period": period,
                    }
                }),
            };
            let action: WhiteboardAction = serde_json::from_value(raw)?;
            let outcome = executor.apply(validate(action, &bounds));
            if outcome.is_error {
                anyhow::bail!(outcome.content);
            }
            println!("{}", serde_json::to_string_pretty(executor.surface().elements())?);
            if let Some(path) = svg {
                write_svg(&path, executor.surface())?;
            }
        }
        Commands::Decode { file, svg } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let (mut executor, bounds) = blank_board(&config);
            let decoded = decode_batch(&text, &bounds);
            println!("{}", decoded.text);
            println!("{}", serde_json::to_string_pretty(&decoded.actions)?);
            if let Some(path) = svg {
                for action in decoded.actions {
                    let outcome = executor.apply(action);
                    print_notice(&SessionNotice::ActionApplied {
                        kind: outcome.kind,
                        content: outcome.content,
                        is_error: outcome.is_error,
                    });
                }
                write_svg(&path, executor.surface())?;
            }
        }
        Commands::Replay {
            script,
            text,
            idle_ms,
            svg,
        } => {
            let raw = std::fs::read_to_string(&script).with_context(|| format!("reading {}", script.display()))?;
            let connector = ScriptedConnector::from_jsonl(&raw)?;
            let (executor, _) = blank_board(&config);
            let mut running = chalk_realtime::spawn(
                Session::new(SessionOptions::from_config(&config)),
                RuntimeDeps {
                    executor,
                    sink: PlaybackBuffer::new(),
                    audio: Box::new(NoAudioInput::default()),
                    credentials: Arc::new(StaticCredential("replay".into())),
                    connector: Arc::new(connector.clone()),
                    vad: config.vad(),
                },
            );

            running.handle.connect().await?;
            if let Some(text) = text {
                running.handle.send_text(text)?;
            }
            let idle = Duration::from_millis(idle_ms);
            while let Ok(Some(notice)) = tokio::time::timeout(idle, running.notices.recv()).await {
                print_notice(&notice);
                if matches!(notice, SessionNotice::Error { fatal: true, .. }) {
                    break;
                }
            }

            let parts = running.shutdown().await?;
            let sent = connector.sent().await;
            tracing::info!(events = sent.len(), "Replay finished");
            for event in &sent {
                println!("> {}", event.kind());
            }
            if let Some(path) = svg {
                write_svg(&path, parts.executor.surface())?;
            }
        }
        Commands::Talk { audio_in, svg } => {
            let realtime = config.realtime();
            let audio: Box<dyn AudioInput> = match audio_in {
                Some(path) => Box::new(PcmFileInput::new(path)),
                None => Box::new(NoAudioInput::default()),
            };
            let (executor, _) = blank_board(&config);
            let mut running = chalk_realtime::spawn(
                Session::new(SessionOptions::from_config(&config)),
                RuntimeDeps {
                    executor,
                    sink: PlaybackBuffer::new(),
                    audio,
                    credentials: Arc::new(HttpCredentialIssuer::from_config(&realtime)),
                    connector: Arc::new(WebSocketConnector::from_config(&realtime)),
                    vad: config.vad(),
                },
            );

            tracing::info!(model = %realtime.model, "Connecting to tutor");
            running.handle.connect().await?;
            println!("Connected. Type a question, /stop to interrupt, /quit to leave.");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    notice = running.notices.recv() => {
                        let Some(notice) = notice else { break };
                        print_notice(&notice);
                        if matches!(notice, SessionNotice::Error { fatal: true, .. }) {
                            break;
                        }
                    }
                    line = lines.next_line() => {
                        let Some(line) = line? else { break };
                        match line.trim() {
                            "/quit" => break,
                            "/stop" => running.handle.stop()?,
                            "" => {}
                            text => running.handle.send_text(text)?,
                        }
                    }
                }
            }

            running.handle.disconnect()?;
            let parts = running.shutdown().await?;
            if let Some(path) = svg {
                write_svg(&path, parts.executor.surface())?;
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} config error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}
