//! DGMS Hub TUI - a terminal launcher for the school's web applications.
//!
//! Shows the app catalog as a tile grid, keeps an offline copy of it and
//! re-syncs in the background whenever the backend is reachable.

mod app;
mod ui;

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture, Event,
        KeyCode, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{build_engine, App, AppState};
use dgmshub_core::{ApiClient, Config};
use ui::input::handle_input;
use ui::render::{grid_columns, render};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

const LOG_FILE_NAME: &str = "dgmshub.log";

/// Initialize the tracing subscriber, writing to a log file in the cache
/// directory. The returned guard flushes the writer on drop.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = config.cache_dir().ok()?;
    if std::fs::create_dir_all(&log_dir).is_err() {
        return None;
    }
    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Some(guard)
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {:#}. Using default settings.", e);
            Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = load_config();
    let _log_guard = init_tracing(&config);

    // Check for CLI commands
    let args: Vec<String> = std::env::args().collect();
    if let Some(command) = args.get(1) {
        return run_command(command, &config).await;
    }

    info!(api = %config.api_base_url, "DGMS Hub starting");

    // Create app before touching the terminal so setup errors print normally
    let mut app = App::new(config)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Show stored apps right away, sync behind them
    app.start();

    // Main loop
    let result = run_app(&mut terminal, &mut app).await;
    app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableFocusChange
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    info!("DGMS Hub shutting down");
    Ok(())
}

/// Non-interactive commands. Output goes to stdout as JSON.
async fn run_command(command: &str, config: &Config) -> Result<()> {
    match command {
        "--diagnostics" => {
            let (engine, _) = build_engine(config)?;
            println!("{}", serde_json::to_string_pretty(&engine.diagnostics())?);
        }
        "--dump-catalog" => {
            let (engine, _) = build_engine(config)?;
            let result = engine.get_catalog(false).await;
            eprintln!("{}", result.message);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "--clear-cache" => {
            let (engine, _) = build_engine(config)?;
            if !engine.clear_cache() {
                anyhow::bail!("Failed to clear offline data");
            }
            eprintln!("Offline data cleared");
        }
        "--health" => {
            let client = ApiClient::new(&config.api_base_url)?;
            let status = client
                .health_check()
                .await
                .with_context(|| format!("Backend at {} is not healthy", config.api_base_url))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "--help" | "-h" => print_usage(),
        other => {
            warn!(argument = %other, "Unknown argument");
            print_usage();
            anyhow::bail!("Unknown argument: {}", other);
        }
    }
    Ok(())
}

fn print_usage() {
    eprintln!("Usage: dgmshub [COMMAND]");
    eprintln!();
    eprintln!("Without a command, starts the interactive launcher.");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  --diagnostics   Print cache and sync diagnostics as JSON");
    eprintln!("  --dump-catalog  Load the catalog (network or offline) and print it as JSON");
    eprintln!("  --clear-cache   Delete the offline catalog and icons");
    eprintln!("  --health        Check the backend health endpoint");
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.grid_columns = grid_columns(terminal.size()?.width);

        // Draw UI
        terminal.draw(|f| render(f, app))?;

        // Poll for events with timeout to allow background updates
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            match event::read()? {
                Event::Key(key) => {
                    // Ctrl+C to quit
                    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                        return Ok(());
                    }

                    if handle_input(app, key) {
                        return Ok(());
                    }
                }
                Event::FocusGained => app.on_focus_gained(),
                _ => {}
            }
        }

        // Check for completed background tasks
        app.check_background_tasks();

        // Check if we should quit
        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}
