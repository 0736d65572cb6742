//! Binary entrypoint for the smsrelay CLI.
//!
//! Commands:
//! - `start [--port <path>] [--daemon]` - run the relay: call monitor plus periodic SMS checks
//! - `init` - write a starter `config.toml`
//! - `status` - local state, then network, signal and storage info from the modem
//! - `probe` - show which endpoints discovery picks for each role
//! - `list [--raw]`, `send`, `delete`, `answer`, `hangup`, `reject` - one-shot modem commands
//! - `check` - run one message check now
//! - `clear-seen`, `add-recipient`, `recipients` - manage the persisted sets
//!
//! See the library crate docs for module-level details: `smsrelay::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use smsrelay::config::Config;
use smsrelay::modem::discovery::{self, Candidates, Role};
use smsrelay::modem::{ListFilter, ModemDriver, SerialOpener, Storage};
use smsrelay::relay::Relay;

#[derive(Parser)]
#[command(name = "smsrelay")]
#[command(about = "Forward SMS and incoming calls from an AT-command cellular modem")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Start {
        /// Default modem port when discovery finds nothing (e.g., /dev/ttyUSB2)
        #[arg(short, long)]
        port: Option<String>,

        /// Run as a background daemon (Unix only)
        #[arg(short, long)]
        daemon: bool,

        /// PID file location (for daemon mode)
        #[arg(long, default_value = "/tmp/smsrelay.pid")]
        pid_file: String,
    },
    /// Write a default configuration file
    Init,
    /// Show relay state and modem network status
    Status,
    /// Probe candidate endpoints for both roles and print the result as JSON
    Probe,
    /// List stored SMS from SIM and modem memory
    List {
        /// Print the modem's raw listing instead of decoded messages
        #[arg(long)]
        raw: bool,
    },
    /// Send an SMS
    Send {
        number: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Delete a stored SMS
    Delete {
        /// Storage area: SM (SIM) or ME (modem)
        storage: String,
        index: u32,
    },
    /// Answer the ringing call
    Answer,
    /// Hang up the active call
    Hangup,
    /// Reject the ringing call
    Reject,
    /// Run one message check and notify new SMS
    Check,
    /// Forget notified messages so they are sent again
    ClearSeen,
    /// Register a notification recipient (Telegram chat id)
    AddRecipient { id: i64 },
    /// List registered recipients
    Recipients,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };

    // Daemon start initialises logging in the child; init has no config yet
    match &cli.command {
        Commands::Start { daemon, .. } if *daemon => {}
        Commands::Init => {}
        _ => init_logging(&pre_config, cli.verbose),
    }

    match cli.command {
        Commands::Start { port, daemon, pid_file } => {
            let mut config = load_or(pre_config, &cli.config).await?;

            #[cfg(all(unix, feature = "daemon"))]
            if daemon {
                // Parent exits inside; the child re-runs without --daemon
                daemonize_process(&config, &pid_file)?;
            }

            #[cfg(not(all(unix, feature = "daemon")))]
            if daemon {
                let _ = pid_file;
                eprintln!("Error: Daemon mode requires Unix platform and 'daemon' feature.");
                eprintln!("Compile with: cargo build --features daemon");
                std::process::exit(1);
            }

            if let Some(port) = port {
                config.modem.port = port;
            }
            info!("Starting smsrelay v{}", env!("CARGO_PKG_VERSION"));
            let mut relay = Relay::new(config);
            if relay.recipients().await.is_empty() {
                warn!("No recipients registered yet; use `smsrelay add-recipient <chat id>`");
            }
            relay.run().await?;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = load_or(pre_config, &cli.config).await?;
            let relay = Relay::new(config.clone());
            println!("smsrelay v{}", env!("CARGO_PKG_VERSION"));
            println!("Seen messages: {}", relay.seen_count());
            println!("Recipients: {}", relay.recipients().await.len());
            println!(
                "Telegram: {}",
                if config.telegram.is_configured() { "configured" } else { "not configured" }
            );
            drop(relay);

            let mut modem = connect_modem(&config).await?;
            let network = modem.network_report().await;
            let storage = modem.storage_info().await;
            if let Some(endpoint) = modem.endpoint() {
                println!("Modem: {}", endpoint);
            }
            modem.disconnect();
            println!("\n{}", network?);
            println!("\nStorage Info:\n{}", storage?.trim());
        }
        Commands::Probe => {
            let config = load_or(pre_config, &cli.config).await?;
            let opener = SerialOpener;
            let timing = config.modem.probe_timing();
            let command = discovery::discover(
                &opener,
                &Candidates::Fixed(config.modem.preferred_ports.clone()),
                config.modem.baud_rate,
                Role::Command,
                &timing,
            )
            .await;
            let monitor_candidates = Candidates::Pattern(config.modem.device_pattern.clone());
            let monitor = discovery::discover(
                &opener,
                &monitor_candidates,
                config.modem.baud_rate,
                Role::Monitor,
                &timing,
            )
            .await;
            let describe = |found: &Result<discovery::Discovered, smsrelay::modem::ModemError>| match found {
                Ok(d) => serde_json::json!({ "path": d.endpoint().path, "live": d.is_live() }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            let payload = serde_json::json!({
                "candidates": monitor_candidates.resolve(),
                "command": describe(&command),
                "monitor": describe(&monitor),
                "default_port": config.modem.port,
                "baud_rate": config.modem.baud_rate,
            });
            println!("{}", payload);
        }
        Commands::List { raw } => {
            let config = load_or(pre_config, &cli.config).await?;
            let mut modem = connect_modem(&config).await?;
            if raw {
                let listing = modem.list_messages_raw().await;
                modem.disconnect();
                println!("{}", listing?);
            } else {
                let messages = modem.list_messages(ListFilter::All).await;
                modem.disconnect();
                let messages = messages?;
                if messages.is_empty() {
                    println!("No messages found");
                }
                for m in messages {
                    println!(
                        "[{} {} #{}] {} {} {}\n  {}",
                        m.storage.description(),
                        m.storage,
                        m.index,
                        m.status,
                        m.sender,
                        m.timestamp,
                        m.text
                    );
                }
            }
        }
        Commands::Send { number, text } => {
            let config = load_or(pre_config, &cli.config).await?;
            let body = text.join(" ");
            let mut modem = connect_modem(&config).await?;
            let reply = modem.send_sms(&number, &body).await;
            modem.disconnect();
            let reply = reply?;
            if reply.contains("OK") {
                println!("SMS sent to {}", number);
            } else {
                println!("Failed to send SMS:\n{}", reply.trim());
            }
        }
        Commands::Delete { storage, index } => {
            let area = Storage::parse(&storage)
                .ok_or_else(|| anyhow!("Unknown storage '{}', expected SM or ME", storage))?;
            let config = load_or(pre_config, &cli.config).await?;
            let mut modem = connect_modem(&config).await?;
            let reply = modem.delete_message(index, area).await;
            modem.disconnect();
            println!("{}", reply?.trim());
        }
        Commands::Answer => {
            let config = load_or(pre_config, &cli.config).await?;
            call_command(&config, CallAction::Answer).await?;
        }
        Commands::Hangup => {
            let config = load_or(pre_config, &cli.config).await?;
            call_command(&config, CallAction::Hangup).await?;
        }
        Commands::Reject => {
            let config = load_or(pre_config, &cli.config).await?;
            call_command(&config, CallAction::Reject).await?;
        }
        Commands::Check => {
            let config = load_or(pre_config, &cli.config).await?;
            let mut relay = Relay::new(config);
            let summary = relay.check_new_messages().await?;
            println!(
                "Listed {} messages, {} new, {} notified",
                summary.listed, summary.new, summary.notified
            );
        }
        Commands::ClearSeen => {
            let config = load_or(pre_config, &cli.config).await?;
            let mut relay = Relay::new(config);
            relay.clear_seen();
            println!("Cleared seen messages cache. All stored messages will be notified on the next check.");
        }
        Commands::AddRecipient { id } => {
            let config = load_or(pre_config, &cli.config).await?;
            let relay = Relay::new(config);
            if relay.register_recipient(id).await {
                println!("Registered recipient {}", id);
            } else {
                println!("Recipient {} already registered", id);
            }
        }
        Commands::Recipients => {
            let config = load_or(pre_config, &cli.config).await?;
            let relay = Relay::new(config);
            let recipients = relay.recipients().await;
            if recipients.is_empty() {
                println!("No recipients registered");
            }
            for id in recipients {
                println!("{}", id);
            }
        }
    }

    Ok(())
}

/// Use the config loaded for logging, or load it now so the error surfaces.
async fn load_or(pre_config: Option<Config>, path: &str) -> Result<Config> {
    match pre_config {
        Some(config) => Ok(config),
        None => Config::load(path).await,
    }
}

async fn connect_modem(config: &Config) -> Result<ModemDriver> {
    let mut modem = ModemDriver::serial(config.modem.clone());
    modem.connect().await?;
    Ok(modem)
}

#[derive(Clone, Copy)]
enum CallAction {
    Answer,
    Hangup,
    Reject,
}

async fn call_command(config: &Config, action: CallAction) -> Result<()> {
    let mut modem = connect_modem(config).await?;
    let reply = match action {
        CallAction::Answer => modem.answer_call().await,
        CallAction::Hangup => modem.hangup_call().await,
        CallAction::Reject => modem.reject_call().await,
    };
    modem.disconnect();
    println!("{}", reply?.trim());
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .map(|c| c.logging.level_filter())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // In daemon mode stdout is redirected into the log file, so only echo on a TTY
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}

/// Daemonize the process (Unix only)
///
/// Re-spawns the binary without `--daemon`, detached from the terminal with
/// stdout/stderr appended to the log file, writes the child's PID and exits.
#[cfg(all(unix, feature = "daemon"))]
fn daemonize_process(config: &Config, pid_file: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::process::Command;

    let log_path = config.logging.file.as_deref().unwrap_or("smsrelay.log");

    let current_exe = std::env::current_exe()?;
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--daemon" || arg == "-d") {
        args.remove(pos);
    }
    let child_args = args.get(1..).unwrap_or_default();

    let log_file = OpenOptions::new().create(true).append(true).open(log_path)?;

    let child = Command::new(&current_exe)
        .args(child_args)
        .stdin(std::process::Stdio::null())
        .stdout(log_file.try_clone()?)
        .stderr(log_file)
        .spawn()?;

    std::fs::write(pid_file, format!("{}", child.id()))?;

    std::process::exit(0);
}
