//! DailyStack CLI
//!
//! Terminal front end for the daily flashcard challenge.

mod view;

use std::io::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dailystack_client::{
    ApiClient, Config, Controller, Credentials, EventBroadcaster, Session, SessionEvent, View,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use crate::view::Render;

type Input = Lines<BufReader<Stdin>>;

/// DailyStack - daily system design flashcards
///
/// Waits for the backend to generate today's scenario, then lets you study
/// its flashcards and chat with the LLM about them.
#[derive(Parser, Debug)]
#[command(name = "dailystack")]
#[command(version, about, long_about = None)]
struct Args {
    /// Backend address (overrides baseUrl in dailystack.json)
    #[arg(short, long, value_name = "URL")]
    base_url: Option<String>,

    /// Path to configuration file (default: dailystack.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Rendering mode: stream, snapshot or json
    #[arg(long, value_name = "MODE")]
    view: Option<View>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so they never interleave with rendered output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("DailyStack starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Runs the client until the user quits.
///
/// 1. Load config and apply overrides
/// 2. Make sure the backend has LLM credentials
/// 3. Wait for the daily challenge
/// 4. Read commands until `:quit`, end of input or Ctrl+C
async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(view) = args.view {
        config.view = view;
    }

    // Re-validate after overrides
    config.validate()?;
    print_config(&config);

    let backend = Arc::new(ApiClient::from_config(&config)?);
    let session = Session::new(EventBroadcaster::new(config.event_capacity));
    let controller = Controller::new(backend, session.clone(), config.poll_policy());

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    // Step 1: Credentials
    if !controller.check_auth().await {
        let credentials = prompt_credentials(&mut input).await?;
        if let Err(e) = controller.save_credentials(&credentials).await {
            print_alert(&format!("Failed to save credentials: {e}"));
            anyhow::bail!("Credentials were not saved");
        }
        eprintln!("Credentials saved.");
    }

    // Step 2: Render session changes in the background
    let renderer = tokio::spawn(render_loop(session.clone(), view::renderer(config.view)));

    // Step 3: Wait for the daily challenge
    let readiness = tokio::select! {
        readiness = controller.await_ready() => readiness,
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C while waiting, shutting down");
            renderer.abort();
            return Ok(());
        }
    };

    if let Some(error) = readiness.into_error() {
        renderer.abort();
        return Err(error.into());
    }

    // Step 4: Interactive loop
    print_help();
    let result = run_interactive(&controller, &mut input).await;

    renderer.abort();
    result
}

/// Reads commands from stdin and dispatches them.
///
/// Explanations and chat answers stream in spawned tasks so the prompt stays
/// responsive.
async fn run_interactive(
    controller: &Controller<ApiClient>,
    input: &mut Input,
) -> anyhow::Result<()> {
    let mut streams = JoinSet::new();

    loop {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
            Some(finished) = streams.join_next(), if !streams.is_empty() => {
                if let Err(e) = finished {
                    tracing::warn!(error = %e, "Answer task failed");
                }
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("End of input");
                    break;
                };

                match Command::parse(&line) {
                    Command::Empty => {}
                    Command::Reveal => {
                        if let Some(request) = controller.toggle_answer().await {
                            let controller = controller.clone();
                            streams.spawn(async move {
                                controller.explain(request).await;
                            });
                        }
                    }
                    Command::Next => {
                        // Failures are shown through the session error.
                        if let Err(e) = controller.next_card().await {
                            tracing::debug!(error = %e, "Next card failed");
                        }
                    }
                    Command::History => {
                        if let Err(e) = controller.load_chat_history().await {
                            eprintln!("Could not load chat history: {e}");
                        }
                    }
                    Command::Help => print_help(),
                    Command::Quit => break,
                    Command::Unknown(command) => {
                        eprintln!("Unknown command '{command}'. Type :help for a list.");
                    }
                    Command::Chat(text) => {
                        let controller = controller.clone();
                        let text = text.to_string();
                        streams.spawn(async move {
                            controller.send(&text).await;
                        });
                    }
                }
            }
        }
    }

    streams.abort_all();
    Ok(())
}

/// Forwards session events to the renderer until the session goes away.
async fn render_loop(session: Session, mut view: Box<dyn Render>) {
    let (state, mut events) = session.observe().await;
    emit(view.render(&SessionEvent::snapshot(state.clone()), &state));

    loop {
        match events.recv().await {
            Ok(event) => {
                let state = session.snapshot().await;
                emit(view.render(&event, &state));
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Renderer fell behind, redrawing");
                let state = session.snapshot().await;
                emit(view.render(&SessionEvent::snapshot(state.clone()), &state));
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn emit(output: Option<String>) {
    if let Some(output) = output {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(output.as_bytes());
        let _ = stdout.flush();
    }
}

// ============================================================================
// Commands
// ============================================================================

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Empty,
    Reveal,
    Next,
    History,
    Help,
    Quit,
    Unknown(&'a str),
    Chat(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        match line {
            "" => Self::Empty,
            ":reveal" | "r" => Self::Reveal,
            ":next" | "n" => Self::Next,
            ":history" => Self::History,
            ":help" | "?" => Self::Help,
            ":quit" | ":q" | "q" => Self::Quit,
            _ if line.starts_with(':') => Self::Unknown(line),
            _ => Self::Chat(line),
        }
    }
}

fn print_help() {
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  :reveal, r   show or hide the answer");
    eprintln!("  :next, n     go to the next flashcard");
    eprintln!("  :history     reload the chat history");
    eprintln!("  :help, ?     show this help");
    eprintln!("  :quit, q     exit");
    eprintln!("Anything else is sent to the chat.");
    eprintln!();
}

// ============================================================================
// Setup helpers
// ============================================================================

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Prints the effective configuration.
fn print_config(config: &Config) {
    eprintln!("Configuration loaded:");
    eprintln!("  Backend: {}", config.base_url);
    eprintln!("  View: {}", config.view);
    eprintln!(
        "  Readiness: {} attempts every {}ms",
        config.max_poll_attempts, config.poll_interval_ms
    );
}

/// Asks for the three credential fields on stdin.
async fn prompt_credentials(input: &mut Input) -> anyhow::Result<Credentials> {
    eprintln!();
    eprintln!("The backend has no LLM credentials yet. Please enter them:");

    let credentials = Credentials {
        client_id: prompt(input, "Client ID").await?,
        client_key: prompt(input, "Client key").await?,
        realm: prompt(input, "Realm").await?,
    };

    if !credentials.is_complete() {
        anyhow::bail!("All three credential fields are required");
    }
    Ok(credentials)
}

async fn prompt(input: &mut Input, label: &str) -> anyhow::Result<String> {
    eprint!("{label}: ");
    std::io::stderr().flush()?;
    input
        .next_line()
        .await?
        .map(|line| line.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Input closed while reading {label}"))
}

/// Prints an error the user must not miss.
fn print_alert(message: &str) {
    let rule = "!".repeat(message.chars().count().min(72) + 4);
    eprintln!();
    eprintln!("{rule}");
    eprintln!("! {message} !");
    eprintln!("{rule}");
    eprintln!();
}
