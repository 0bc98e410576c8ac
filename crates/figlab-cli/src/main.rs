//! figlab CLI
//!
//! Local tooling for the figlab design-to-mockup workbench: the PIN-locked
//! API-key vault, Figma node-id normalization and payload cleanup.

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vault_core::{
    config_file_path, default_data_dir, ensure_data_dir, extract_html, format_bytes,
    load_config, parse_node_id, preprocess_mcp_data, save_config, ErrorReporter, FileStore,
    SystemClock, VaultConfig, VaultError,
};
use vault_session::{
    spawn_vault, ActivityEvent, CredentialVault, InitOutcome, TickOutcome, VaultHandle,
    VaultPhase,
};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// PIN prompts offered before a migrated plaintext key is given up
const MIGRATION_PIN_TRIES: usize = 3;

#[derive(Parser)]
#[command(name = "figlab")]
#[command(version)]
#[command(about = "figlab - Figma-to-HTML workbench tools")]
#[command(after_help = "EXAMPLES:
  figlab node-id 'https://www.figma.com/design/abc/File?node-id=12-34'
  figlab key save                   Encrypt and save the API key under a PIN
  figlab key unlock                 Check the PIN and show the masked key
  figlab session --timeout-secs 60  Hold the key open until idle for 60s")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical node id for a Figma URL or raw id
    NodeId {
        /// URL, `12-34`, or `12:34`
        raw: String,
    },

    /// Manage the saved API key
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },

    /// Unlock the key and keep it in memory until the session goes idle.
    /// Each line typed on stdin counts as activity.
    Session {
        /// Override the configured inactivity timeout
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show or clear the persisted error log
    Errors {
        #[command(subcommand)]
        action: ErrorCommands,
    },

    /// Clean design payloads and model output
    Html {
        #[command(subcommand)]
        action: HtmlCommands,
    },

    /// Show or write the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Show whether a key is saved
    Status,
    /// Encrypt a new API key under a PIN and save it
    Save,
    /// Unlock the saved key with its PIN
    Unlock,
    /// Forget the saved key so it can be saved under a new PIN
    ResetPin,
    /// Remove the saved key and the remember setting
    Clear,
}

#[derive(Subcommand)]
enum ErrorCommands {
    /// Print recorded errors as JSON
    Show,
    /// Delete all recorded errors
    Clear,
}

#[derive(Subcommand)]
enum HtmlCommands {
    /// Pull the HTML document out of a model reply
    Extract { file: PathBuf },
    /// Strip Figma data attributes from design markup
    CleanMcp { file: PathBuf },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to disk
    Init,
}

/// Initialize logging
fn init_logging() {
    // stderr only; stdout carries command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        None => {
            println!("figlab - Figma-to-HTML workbench tools");
            println!();
            println!("Run 'figlab --help' for usage information.");
        }
        Some(cmd) => {
            if let Err(e) = handle_command(cmd).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn data_dir() -> PathBuf {
    std::env::var("FIGLAB_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_data_dir())
}

async fn handle_command(cmd: Commands) -> CliResult {
    let dir = data_dir();
    debug!("Using data directory: {}", dir.display());

    match cmd {
        Commands::NodeId { raw } => handle_node_id(&raw),
        Commands::Key { action } => {
            let config = load_config(&dir).await?;
            match action {
                KeyCommands::Status => handle_key_status(&dir, config).await,
                KeyCommands::Save => handle_key_save(&dir, config).await,
                KeyCommands::Unlock => handle_key_unlock(&dir, config).await,
                KeyCommands::ResetPin => handle_key_reset_pin(&dir, config).await,
                KeyCommands::Clear => handle_key_clear(&dir, config).await,
            }
        }
        Commands::Session { timeout_secs } => {
            let mut config = load_config(&dir).await?;
            if let Some(secs) = timeout_secs {
                config.session_timeout_seconds = secs;
            }
            handle_session(&dir, config).await
        }
        Commands::Errors { action } => {
            let config = load_config(&dir).await?;
            handle_errors(&dir, &config, action)
        }
        Commands::Html { action } => handle_html(action).await,
        Commands::Config { action } => handle_config(&dir, action).await,
    }
}

fn handle_node_id(raw: &str) -> CliResult {
    match parse_node_id(raw) {
        Some(id) => {
            println!("{}", id);
            Ok(())
        }
        None => Err(format!("No Figma node id found in '{}'", raw.trim()).into()),
    }
}

/// Load the vault from disk and move it onto its own task.
///
/// A legacy plaintext key is gone from disk once the vault has loaded it, so
/// it is encrypted under a new PIN before any command runs.
async fn open_vault(dir: &Path, config: VaultConfig) -> CliResult<VaultHandle> {
    ensure_data_dir(dir).await?;
    let store = FileStore::open(dir)?;
    let min_pin_length = config.min_pin_length;
    let mut vault = CredentialVault::new(store, Arc::new(SystemClock), config);
    let outcome = vault.initialize()?;
    let handle = spawn_vault(vault);

    if outcome == InitOutcome::MigratedLegacy {
        println!("Found an unencrypted API key from an older version and removed it from disk.");
        println!("Choose a PIN to keep it encrypted (Enter discards it).");

        let mut attempt = 1;
        let pin = loop {
            match prompt_new_pin(min_pin_length) {
                Ok(pin) => break pin,
                Err(e) if attempt < MIGRATION_PIN_TRIES => {
                    eprintln!("{}", e);
                    attempt += 1;
                }
                Err(e) => {
                    handle.shutdown().await?;
                    return Err(e);
                }
            }
        };
        match pin {
            Some(pin) => {
                if let Err(e) = save_current_key(&handle, pin).await {
                    handle.shutdown().await?;
                    return Err(e);
                }
                println!("✓ API key saved encrypted");
            }
            None => println!("Unencrypted API key discarded."),
        }
    }

    Ok(handle)
}

/// Ask for a new PIN twice. `None` when the user enters nothing.
fn prompt_new_pin(min_pin_length: usize) -> CliResult<Option<String>> {
    let pin = prompt_password(&format!("PIN ({}+ characters): ", min_pin_length))?;
    if pin.is_empty() {
        return Ok(None);
    }
    if pin.chars().count() < min_pin_length {
        return Err(VaultError::PinTooShort(min_pin_length).into());
    }
    let confirm = prompt_password("Confirm PIN: ")?;
    if pin != confirm {
        return Err("PINs do not match".into());
    }
    Ok(Some(pin))
}

/// Encrypt the key the vault holds under `pin` and write it now
async fn save_current_key(handle: &VaultHandle, pin: String) -> CliResult {
    handle.set_remember(true).await?;
    handle.set_pin(pin).await?;

    match handle.flush().await? {
        TickOutcome::Persisted | TickOutcome::PersistSkipped => Ok(()),
        _ => Err("API key could not be saved; see 'figlab errors show'".into()),
    }
}

async fn handle_key_status(dir: &Path, config: VaultConfig) -> CliResult {
    let handle = open_vault(dir, config).await?;
    let status = handle.status().await?;

    println!("Vault:     {}", status.phase);
    println!("Saved key: {}", if status.has_saved_key { "yes" } else { "no" });
    if let Some(secret) = handle.secret().await? {
        println!("Key:       {}", mask_value(secret.expose_secret()));
    }

    handle.shutdown().await?;
    Ok(())
}

async fn handle_key_save(dir: &Path, config: VaultConfig) -> CliResult {
    let min_pin_length = config.min_pin_length;
    let handle = open_vault(dir, config).await?;

    if handle.status().await?.phase == VaultPhase::Locked {
        handle.shutdown().await?;
        return Err("An API key is already saved. Run 'figlab key reset-pin' or 'figlab key clear' first.".into());
    }

    let key = prompt_password("API key: ")?;
    let key = key.trim().to_string();
    if key.is_empty() {
        handle.shutdown().await?;
        return Err("API key cannot be empty".into());
    }

    let pin = match prompt_new_pin(min_pin_length) {
        Ok(Some(pin)) => pin,
        Ok(None) => {
            handle.shutdown().await?;
            return Err("PIN cannot be empty".into());
        }
        Err(e) => {
            handle.shutdown().await?;
            return Err(e);
        }
    };

    let result = match handle.set_secret(key.as_str()).await {
        Ok(()) => save_current_key(&handle, pin).await,
        Err(e) => Err(e.into()),
    };
    handle.shutdown().await?;
    result?;

    println!("✓ API key saved ({})", mask_value(&key));
    Ok(())
}

/// Prompt until the PIN is right, the user gives up, or a lockout starts
async fn unlock_with_prompt(handle: &VaultHandle) -> CliResult {
    match handle.status().await?.phase {
        VaultPhase::Locked => {}
        VaultPhase::Unlocked => return Ok(()),
        VaultPhase::Empty => return Err(VaultError::NothingToUnlock.into()),
    }

    loop {
        let pin = prompt_password("PIN: ")?;
        if pin.is_empty() {
            return Err("Unlock cancelled".into());
        }

        match handle.unlock(pin).await {
            Ok(()) => return Ok(()),
            Err(e @ VaultError::InvalidPin { .. }) => eprintln!("{}", e),
            Err(e) => return Err(e.into()),
        }
    }
}

async fn handle_key_unlock(dir: &Path, config: VaultConfig) -> CliResult {
    let handle = open_vault(dir, config).await?;
    let result = unlock_with_prompt(&handle).await;

    if result.is_ok() {
        if let Some(secret) = handle.secret().await? {
            println!("✓ Unlocked: {}", mask_value(secret.expose_secret()));
        }
    }

    handle.shutdown().await?;
    result
}

async fn handle_key_reset_pin(dir: &Path, config: VaultConfig) -> CliResult {
    let handle = open_vault(dir, config).await?;
    let had_key = handle.status().await?.has_saved_key;
    handle.reset_pin().await?;
    handle.shutdown().await?;

    if had_key {
        println!("✓ Saved API key removed. Run 'figlab key save' to save it under a new PIN.");
    } else {
        println!("No saved API key.");
    }
    Ok(())
}

async fn handle_key_clear(dir: &Path, config: VaultConfig) -> CliResult {
    let handle = open_vault(dir, config).await?;
    handle.clear_all().await?;
    handle.shutdown().await?;
    println!("✓ API key cleared");
    Ok(())
}

async fn handle_session(dir: &Path, config: VaultConfig) -> CliResult {
    let timeout = config.session_timeout_seconds;
    let handle = open_vault(dir, config).await?;

    if let Err(e) = unlock_with_prompt(&handle).await {
        handle.shutdown().await?;
        return Err(e);
    }
    if !handle.status().await?.session_guard_active {
        handle.shutdown().await?;
        return Err("No saved key to return to; save one with 'figlab key save' first".into());
    }

    println!("Session open. Press Enter to stay active; locks after {}s idle.", timeout);

    let mut status_rx = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            locked = status_rx.wait_for(|status| status.phase == VaultPhase::Locked) => {
                if locked.is_ok() {
                    println!("Session locked after inactivity.");
                }
                break;
            }
            line = lines.next_line() => match line? {
                Some(_) => handle.activity(ActivityEvent::KeyDown).await?,
                None => {
                    info!("stdin closed - locking session");
                    handle.lock().await?;
                    println!("Session closed.");
                    break;
                }
            },
        }
    }

    handle.shutdown().await?;
    Ok(())
}

fn handle_errors(dir: &Path, config: &VaultConfig, action: ErrorCommands) -> CliResult {
    let store = FileStore::open(dir)?;
    let reporter = ErrorReporter::new(&store, config.max_error_reports);

    match action {
        ErrorCommands::Show => {
            if reporter.entries()?.is_empty() {
                println!("No errors recorded.");
            } else {
                println!("{}", reporter.report()?);
            }
        }
        ErrorCommands::Clear => {
            reporter.clear()?;
            println!("✓ Error log cleared");
        }
    }
    Ok(())
}

async fn handle_html(action: HtmlCommands) -> CliResult {
    match action {
        HtmlCommands::Extract { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            println!("{}", extract_html(&raw));
        }
        HtmlCommands::CleanMcp { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let cleaned = preprocess_mcp_data(&raw);
            eprintln!(
                "{} -> {}",
                format_bytes(raw.len() as u64),
                format_bytes(cleaned.len() as u64)
            );
            println!("{}", cleaned);
        }
    }
    Ok(())
}

async fn handle_config(dir: &Path, action: ConfigCommands) -> CliResult {
    let config = load_config(dir).await?;

    match action {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommands::Init => {
            save_config(dir, &config).await?;
            println!("✓ Wrote {}", config_file_path(dir).display());
        }
    }
    Ok(())
}

fn prompt_password(prompt: &str) -> CliResult<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    Ok(rpassword::read_password()?)
}

/// Mask an API key for display: first and last four characters
fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(1));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
