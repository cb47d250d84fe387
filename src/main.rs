//! refract - select code, ask a model to improve it, review the change
//!
//! The binary hosts the pipeline over a file on disk: the selected lines
//! become the selection, the preview is printed as a colored diff and the
//! accept/reject decision is read from the terminal.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal;
use refract::config::{self, Config, ConfigProvider, CredentialLocation};
use refract::error::EditConflict;
use refract::preview::PreviewSession;
use refract::service::{ApplyMode, RefactorSession, RequestOutcome};
use refract::surface::{
    Decision, DocumentSurface, MarkupHandle, MarkupStyle, MemoryDocument, NotifyLevel, TextRange,
};
use refract::transform::{BackendKind, Intent};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "refract",
    about = "Refactor a selection with an AI backend and review the change before applying it",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transform a range of lines in a file
    Transform(TransformArgs),
    /// Store an API key for a backend
    SetCredential {
        /// claude or huggingface
        backend: BackendKind,
    },
    /// Show the config location and effective settings
    Config,
}

#[derive(Args, Debug)]
struct TransformArgs {
    file: PathBuf,

    /// Lines to select, 1-based and inclusive (e.g. 10:24)
    #[arg(long, value_parser = parse_line_span)]
    lines: LineSpan,

    /// readability, performance, security, modernization, testability,
    /// error-handling, complete, annotate or tonecheck
    #[arg(long)]
    intent: Option<Intent>,

    /// Backend for refactoring (claude or huggingface)
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Apply the change immediately instead of previewing it
    #[arg(long)]
    no_preview: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineSpan {
    first: usize,
    last: usize,
}

fn parse_line_span(s: &str) -> std::result::Result<LineSpan, String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<usize>()
            .map_err(|_| format!("'{}' is not a line number", part.trim()))
    };
    let span = match s.split_once(':') {
        Some((first, last)) => LineSpan {
            first: parse(first)?,
            last: parse(last)?,
        },
        None => {
            let line = parse(s)?;
            LineSpan {
                first: line,
                last: line,
            }
        }
    };
    if span.first == 0 || span.last < span.first {
        return Err(format!("'{}' is not a valid line range", s));
    }
    Ok(span)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Transform(args) => run_transform(args).await,
        Commands::SetCredential { backend } => set_credential(backend).map(|_| ExitCode::SUCCESS),
        Commands::Config => {
            show_config();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("REFRACT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

async fn run_transform(args: TransformArgs) -> Result<ExitCode> {
    let config = Config::load();
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let range = TextRange::for_lines(&text, args.lines.first, args.lines.last).ok_or_else(|| {
        anyhow!(
            "Lines {}:{} are outside {}",
            args.lines.first,
            args.lines.last,
            args.file.display()
        )
    })?;

    let intent = args.intent.unwrap_or_else(|| config.optimization_goal());
    let backend = args.backend.unwrap_or_else(|| config.selected_backend());
    let mode = if args.no_preview {
        ApplyMode::Direct
    } else {
        ApplyMode::from_preview_flag(config.preview_changes)
    };

    let mut doc = TerminalDocument::new(MemoryDocument::new(text).with_selection(range));
    let mut session = RefactorSession::from_config(&config);
    eprintln!("  Asking {} for {}...", backend.display_name(), intent);

    match session.handle_user_request(&mut doc, intent, backend, mode).await {
        RequestOutcome::Applied => {
            fs::write(&args.file, doc.inner.contents())
                .with_context(|| format!("Failed to write {}", args.file.display()))?;
            Ok(ExitCode::SUCCESS)
        }
        RequestOutcome::Failed(_) => Ok(ExitCode::FAILURE),
        RequestOutcome::NoChange(_) | RequestOutcome::Discarded | RequestOutcome::Analysis(_) => {
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Prompt for a key with masked input and store it
fn set_credential(backend: BackendKind) -> Result<()> {
    println!();
    println!("  Setting up the {} backend", backend.display_name());
    println!("  ─────────────────────────────");
    println!();

    let Some(key) = read_masked(&format!("  {} API key: ", backend.display_name()))? else {
        println!("  Cancelled.");
        return Ok(());
    };
    let key = key.trim();
    if key.is_empty() {
        println!("  No key entered. Run 'refract set-credential {}' to try again.", backend);
        return Ok(());
    }

    if !config::validate_key_format(backend, key) {
        match backend {
            BackendKind::HuggingFace => bail!(
                "Invalid HuggingFace API key format. Key should start with \"{}\"",
                refract::transform::huggingface::KEY_PREFIX
            ),
            BackendKind::Claude => {
                println!("  Warning: key doesn't look like an Anthropic key (should start with sk-ant-)");
            }
        }
    }

    let mut config = Config::load();
    let location = config
        .set_credential(backend, key)
        .map_err(|e| anyhow!("{}", e))?;

    println!();
    match location {
        CredentialLocation::Keychain => println!("  ✓ API key saved to the system keychain"),
        CredentialLocation::ConfigFile => {
            println!("  ✓ API key saved to {}", Config::config_location())
        }
    }

    if config.credential(backend).is_none() {
        eprintln!("  ! Warning: API key was saved but cannot be read back.");
        eprintln!(
            "  ! Workaround: set the {} environment variable.",
            config::credential_env_var(backend)
        );
        bail!("API key verification failed");
    }
    println!();
    Ok(())
}

fn show_config() {
    let config = Config::load();
    println!("  Config: {}", Config::config_location());
    println!();
    for key in ["optimizationGoal", "backend", "previewChanges", "requestTimeoutSecs"] {
        let value = config
            .get_value(key)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "(unset)".to_string());
        println!("  {:<20} {}", key, value);
    }
    for backend in [BackendKind::Claude, BackendKind::HuggingFace] {
        let state = if config.credential(backend).is_some() {
            "set"
        } else {
            "not set"
        };
        println!("  {:<20} {}", config::credential_key(backend), state);
    }
}

/// Restores cooked mode when dropped, even on early return.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Read a line echoing `*` per character. `None` on Esc or Ctrl+C.
fn read_masked(prompt: &str) -> Result<Option<String>> {
    let mut stdout = io::stdout();
    print!("{}", prompt);
    stdout.flush()?;

    let _guard = RawModeGuard::enable().context("Failed to enable raw terminal mode")?;
    let mut input = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => break,
            KeyCode::Esc => {
                print!("\r\n");
                return Ok(None);
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                print!("\r\n");
                return Ok(None);
            }
            KeyCode::Backspace => {
                if input.pop().is_some() {
                    print!("\x08 \x08");
                }
            }
            KeyCode::Char(c) => {
                input.push(c);
                print!("*");
            }
            _ => {}
        }
        stdout.flush()?;
    }
    print!("\r\n");
    stdout.flush()?;
    Ok(Some(input))
}

/// A file buffer shown in the terminal.
struct TerminalDocument {
    inner: MemoryDocument,
}

impl TerminalDocument {
    fn new(inner: MemoryDocument) -> Self {
        Self { inner }
    }

    fn print_preview(session: &PreviewSession) {
        println!();
        for line in session.original_text.lines() {
            println!("  {}", format!("- {}", line).red().crossed_out());
        }
        for line in session.candidate_text.lines() {
            println!("  {}", format!("+ {}", line).green());
        }
        println!();
    }
}

impl DocumentSurface for TerminalDocument {
    fn selection(&self) -> Option<TextRange> {
        self.inner.selection()
    }

    fn text(&self, range: TextRange) -> std::result::Result<String, EditConflict> {
        self.inner.text(range)
    }

    fn replace(&mut self, range: TextRange, text: &str) -> std::result::Result<(), EditConflict> {
        self.inner.replace(range, text)
    }

    fn render_markup(
        &mut self,
        range: TextRange,
        style: MarkupStyle,
    ) -> std::result::Result<MarkupHandle, EditConflict> {
        self.inner.render_markup(range, style)
    }

    fn clear_markup(&mut self, handle: MarkupHandle) {
        self.inner.clear_markup(handle)
    }

    fn notify(&mut self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Info => println!("  + {}", message),
            NotifyLevel::Warning => eprintln!("  ! {}", message.yellow()),
            NotifyLevel::Error => eprintln!("  ! {}", message.red()),
        }
        self.inner.notify(level, message);
    }

    fn request_decision(&mut self, session: &PreviewSession) -> Decision {
        Self::print_preview(session);
        print!("  Apply this change? [y/N]: ");
        if io::stdout().flush().is_err() {
            return Decision::Reject;
        }
        let mut answer = String::new();
        if io::stdin().read_line(&mut answer).is_err() {
            return Decision::Reject;
        }
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => Decision::Accept,
            _ => Decision::Reject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_span() {
        assert_eq!(parse_line_span("3:7"), Ok(LineSpan { first: 3, last: 7 }));
        assert_eq!(parse_line_span("5"), Ok(LineSpan { first: 5, last: 5 }));
        assert!(parse_line_span("0:2").is_err());
        assert!(parse_line_span("7:3").is_err());
        assert!(parse_line_span("a:b").is_err());
    }

    #[test]
    fn test_cli_parses_transform() {
        let cli = Cli::try_parse_from([
            "refract",
            "transform",
            "app.js",
            "--lines",
            "2:4",
            "--intent",
            "security",
            "--backend",
            "hf",
            "--no-preview",
        ])
        .unwrap();
        match cli.command {
            Commands::Transform(args) => {
                assert_eq!(args.lines, LineSpan { first: 2, last: 4 });
                assert_eq!(args.intent, Some(Intent::Security));
                assert_eq!(args.backend, Some(BackendKind::HuggingFace));
                assert!(args.no_preview);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["refract", "set-credential", "openai"]).is_err());
    }
}
