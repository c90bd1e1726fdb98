//! lexterm - terminal emulator host
//!
//! Runs a shell behind a PTY, interprets its output with the lexterm engine
//! and paints the result onto the current terminal with crossterm.
//!
//! # Quick Start
//!
//! ```text
//! lexterm                                   # $SHELL (or /bin/sh)
//! lexterm --shell /bin/bash --arg -l        # login bash
//! lexterm --color-scheme nord
//! lexterm --dump-markup --shell /bin/sh --arg -c --arg 'ls --color=always'
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lexterm::config::{ColorScheme, Config};
use lexterm::core::pty::{PtyError, ShellCommand};
use lexterm::core::reader::{AsyncReader, ReaderEvent};
use lexterm::core::session::Session;
use lexterm::core::term::Lexer;
use lexterm::ui::{KeyMapper, Renderer};

/// Command line options; they override the configuration file
#[derive(Parser, Debug)]
#[command(name = "lexterm", version, about = "Terminal emulator with a PTY shell session")]
struct Args {
    /// Shell to run
    #[arg(long)]
    shell: Option<String>,

    /// Argument passed to the shell (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    shell_args: Vec<String>,

    /// Color scheme name (see --list-schemes)
    #[arg(long)]
    color_scheme: Option<String>,

    /// Log file path
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Columns (defaults to the host terminal width, or 80 with --dump-markup)
    #[arg(long)]
    cols: Option<u16>,

    /// Rows (defaults to the host terminal height, or 24 with --dump-markup)
    #[arg(long)]
    rows: Option<u16>,

    /// Print the built-in color schemes and exit
    #[arg(long)]
    list_schemes: bool,

    /// Run headless and print the final screen as markup once the shell exits
    #[arg(long)]
    dump_markup: bool,
}

/// Signals raised by the engine callbacks while lexing
enum UiSignal {
    Title(String),
    Bell,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.list_schemes {
        for name in ColorScheme::list() {
            println!("{}", name);
        }
        return Ok(());
    }

    let (config, load_error) = Config::load();
    let config = merge_args(config, &args);
    init_logging(&config)?;
    if let Some(e) = load_error {
        warn!("{:#}; using default configuration", anyhow::Error::new(e));
    }

    info!("lexterm {} starting", env!("CARGO_PKG_VERSION"));

    let command = ShellCommand::from_config(&config);
    let scheme = config.get_color_scheme();
    info!("Shell: {} {:?}", command.program, command.args);
    info!("Color scheme: {}", scheme.name);

    let result = if args.dump_markup {
        let size = (args.cols.unwrap_or(80), args.rows.unwrap_or(24));
        run_headless(&command, scheme, size)
    } else {
        let (host_cols, host_rows) = Renderer::size()?;
        let size = (args.cols.unwrap_or(host_cols), args.rows.unwrap_or(host_rows));
        run_terminal(&command, scheme, size)
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    info!("lexterm exiting");
    result
}

fn merge_args(mut config: Config, args: &Args) -> Config {
    if let Some(shell) = &args.shell {
        config.shell = Some(shell.clone());
        config.shell_args.clear();
    }
    if !args.shell_args.is_empty() {
        config.shell_args = args.shell_args.clone();
    }
    if let Some(scheme) = &args.color_scheme {
        config.color_scheme = scheme.clone();
    }
    if let Some(path) = &args.log_file {
        config.log_file = Some(path.clone());
    }
    config
}

/// Log to a file so nothing is written over the UI
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let log_path = config.log_path()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn new_lexer(size: (u16, u16), scheme: ColorScheme, signals: Sender<UiSignal>) -> Lexer {
    let bell = signals.clone();
    Lexer::new(
        size.0,
        size.1,
        move |title| {
            let _ = signals.send(UiSignal::Title(title.to_string()));
        },
        move || {
            let _ = bell.send(UiSignal::Bell);
        },
    )
    .with_color_scheme(scheme)
}

/// Feed everything the reader has delivered so far. Returns
/// `(received_data, closed)`.
fn drain_reader(rx: &Receiver<ReaderEvent>, lexer: &mut Lexer, session: &mut Session) -> (bool, bool) {
    let mut received = false;
    loop {
        match rx.try_recv() {
            Ok(ReaderEvent::Data(chunk)) => {
                lexer.lex(&chunk);
                received = true;
            }
            Ok(ReaderEvent::Closed) | Err(TryRecvError::Disconnected) => {
                return (received, true);
            }
            Err(TryRecvError::Empty) => break,
        }
    }
    send_responses(lexer, session);
    (received, false)
}

fn send_responses(lexer: &mut Lexer, session: &mut Session) {
    for response in lexer.take_responses() {
        match session.write(&response.to_bytes()) {
            Ok(()) | Err(PtyError::Closed) => {}
            Err(e) => warn!("Failed to send reply {:?}: {}", response, e),
        }
    }
}

fn run_terminal(command: &ShellCommand, scheme: ColorScheme, size: (u16, u16)) -> anyhow::Result<()> {
    let (signal_tx, signal_rx) = mpsc::channel();
    let mut lexer = new_lexer(size, scheme, signal_tx);

    let mut session = Session::spawn(command, size.0, size.1, || info!("Session ended"))
        .context("failed to start shell")?;
    let (reader, rx) = AsyncReader::channel(&session)?;

    let mut renderer = Renderer::new();
    renderer.init()?;
    renderer.set_title(&format!("lexterm - {}", command.program))?;

    let result = run_main_loop(&mut session, &mut lexer, &mut renderer, &rx, &signal_rx);

    renderer.cleanup()?;
    if let Err(e) = session.close() {
        warn!("Failed to close session: {}", e);
    }
    if reader.is_finished() {
        reader.join();
    }
    result
}

fn run_main_loop(
    session: &mut Session,
    lexer: &mut Lexer,
    renderer: &mut Renderer,
    rx: &Receiver<ReaderEvent>,
    signals: &Receiver<UiSignal>,
) -> anyhow::Result<()> {
    let poll_timeout = Duration::from_millis(10);

    loop {
        let (received, closed) = drain_reader(rx, lexer, session);

        for signal in signals.try_iter() {
            match signal {
                UiSignal::Title(title) => renderer.set_title(&title)?,
                UiSignal::Bell => renderer.bell()?,
            }
        }
        if received {
            renderer.render(lexer)?;
        }
        if closed {
            info!("Shell output closed (exit code {:?})", session.exit_code());
            return Ok(());
        }

        if !event::poll(poll_timeout)? {
            continue;
        }
        match event::read()? {
            Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                if let Some(bytes) = KeyMapper::map(&key_event, lexer.modes()) {
                    match session.write(&bytes) {
                        Ok(()) => {}
                        Err(PtyError::Closed) => return Ok(()),
                        Err(e) => warn!("Failed to write key input: {}", e),
                    }
                }
            }
            Event::Resize(cols, rows) => {
                // Session and engine are resized in lockstep
                match session.resize(cols, rows) {
                    Ok(()) => lexer.resize(cols, rows),
                    Err(e) => warn!("Ignoring resize to {}x{}: {}", cols, rows, e),
                }
                renderer.invalidate(lexer)?;
                renderer.render(lexer)?;
            }
            _ => {}
        }
    }
}

/// Run the shell to completion without a UI and print the final screen
fn run_headless(command: &ShellCommand, scheme: ColorScheme, size: (u16, u16)) -> anyhow::Result<()> {
    let (signal_tx, signal_rx) = mpsc::channel();
    let mut lexer = new_lexer(size, scheme, signal_tx);

    let mut session = Session::spawn(command, size.0, size.1, || info!("Session ended"))
        .context("failed to start shell")?;
    let (reader, rx) = AsyncReader::channel(&session)?;

    for event in rx.iter() {
        match event {
            ReaderEvent::Data(chunk) => {
                lexer.lex(&chunk);
                send_responses(&mut lexer, &mut session);
            }
            ReaderEvent::Closed => break,
        }
    }
    reader.join();

    for signal in signal_rx.try_iter() {
        if let UiSignal::Title(title) = signal {
            info!("Title: {}", title);
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for row in 0..lexer.size().1 as usize {
        writeln!(out, "{}", lexer.get_line(row)?)?;
    }
    out.flush()?;

    if let Some(code) = session.exit_code() {
        info!("Shell exited with code {}", code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "lexterm",
            "--shell",
            "/bin/zsh",
            "--arg",
            "-l",
            "--color-scheme",
            "dracula",
        ]);
        let mut config = Config::default();
        config.shell_args = vec!["-i".to_string()];

        let merged = merge_args(config, &args);
        assert_eq!(merged.shell.as_deref(), Some("/bin/zsh"));
        assert_eq!(merged.shell_args, vec!["-l"]);
        assert_eq!(merged.color_scheme, "dracula");
    }

    #[test]
    fn test_cli_defaults_keep_config() {
        let args = Args::parse_from(["lexterm"]);
        let mut config = Config::default();
        config.shell = Some("/bin/bash".to_string());
        config.shell_args = vec!["-l".to_string()];

        let merged = merge_args(config.clone(), &args);
        assert_eq!(merged, config);
        assert!(!args.dump_markup);
    }
}
