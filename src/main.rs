//! fabricd: transaction coordinator daemon and control CLI

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fabricd::{
    client,
    config::{Config, LogFormat, LogLevel},
    daemon::{get_daemon_pid, Daemon},
    types::{ConfigTarget, ControllerKind},
};
use tracing::info;

#[derive(Parser)]
#[command(name = "fabricd")]
#[command(about = "Transaction coordinator for an SDN control fabric")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "fabricd.toml")]
    config: PathBuf,

    /// Daemon socket path override
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Client session id (defaults to the process id)
    #[arg(short, long)]
    session: Option<u32>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the coordinator daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Acquire or release the exclusive configuration session
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Commit the candidate configuration
    Commit {
        /// Config id returned by `config acquire`
        config_id: u32,
    },

    /// Audit one controller's state
    Audit {
        /// Controller kind (openflow, overlay, legacy)
        controller: ControllerKind,
    },

    /// Cancel the audit in flight
    AuditCancel,

    /// Save the running configuration into the startup configuration
    Save,

    /// Clear the startup configuration
    ClearStartup,

    /// Read or toggle the autosave flag
    Autosave {
        #[command(subcommand)]
        command: AutosaveCommands,
    },

    /// Read a configuration's version and status
    Status {
        /// Which configuration to query
        #[arg(value_enum)]
        target: CliTarget,
    },

    /// Check whether the daemon is responsive
    Ping,

    /// Rebuild the participant channel map
    Rediscover,
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the daemon in the foreground
    Start,
    /// Stop a running daemon
    Stop,
    /// Show daemon status
    Status,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Acquire the configuration session; prints the config id
    Acquire,
    /// Release the configuration session
    Release {
        /// Config id returned by `config acquire`
        config_id: u32,
    },
}

#[derive(Subcommand)]
enum AutosaveCommands {
    Get,
    Enable,
    Disable,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliTarget {
    Running,
    Startup,
}

impl From<CliTarget> for ConfigTarget {
    fn from(target: CliTarget) -> Self {
        match target {
            CliTarget::Running => ConfigTarget::Running,
            CliTarget::Startup => ConfigTarget::Startup,
        }
    }
}

fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.logging.level.clone(),
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };
    init_logging(&config, cli.verbose);

    let socket = cli.socket.clone().or_else(|| config.node.socket_path.clone());
    let session = cli.session.unwrap_or_else(std::process::id);

    match cli.command {
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => {
                let daemon = Daemon::start(config).await?;
                daemon.run().await?;
            }
            DaemonCommands::Stop => {
                client::shutdown(&socket).await?;
                println!("shutdown requested");
            }
            DaemonCommands::Status => match client::status(&socket).await {
                Ok(status) => {
                    println!("uptime:        {}s", status.uptime_seconds);
                    println!("shutting down: {}", status.shutting_down);
                    match status.config_owner {
                        Some((sid, cid)) => {
                            println!("config owner:  session {sid} (config id {cid})")
                        }
                        None => println!("config owner:  none"),
                    }
                    println!("drivers:       {}", status.driver_count);
                    let m = status.metrics;
                    println!(
                        "operations:    {} total, {} failed, {} busy",
                        m.ops_total, m.ops_failed, m.busy_rejections
                    );
                    println!("phases sent:   {}", m.phases_sent);
                }
                Err(client::ClientError::DaemonNotRunning) => {
                    match get_daemon_pid(&config.node.data_dir) {
                        Some(pid) => println!("daemon PID {pid} found but socket unreachable"),
                        None => println!("daemon is not running"),
                    }
                }
                Err(e) => return Err(e.into()),
            },
        },

        Commands::Config { command } => match command {
            ConfigCommands::Acquire => {
                let config_id = client::acquire_config(&socket, session).await?;
                println!("{config_id}");
            }
            ConfigCommands::Release { config_id } => {
                client::release_config(&socket, session, config_id).await?;
                info!("configuration session released");
            }
        },

        Commands::Commit { config_id } => {
            client::commit(&socket, session, config_id).await?;
            println!("commit complete");
        }

        Commands::Audit { controller } => {
            client::audit(&socket, session, controller).await?;
            println!("audit complete");
        }

        Commands::AuditCancel => {
            client::audit_cancel(&socket, session).await?;
            println!("audit cancel requested");
        }

        Commands::Save => {
            client::save_running(&socket, session).await?;
            println!("running configuration saved");
        }

        Commands::ClearStartup => {
            client::clear_startup(&socket, session).await?;
            println!("startup configuration cleared");
        }

        Commands::Autosave { command } => match command {
            AutosaveCommands::Get => {
                let enabled = client::autosave_get(&socket, session).await?;
                println!("{}", if enabled { "enabled" } else { "disabled" });
            }
            AutosaveCommands::Enable => {
                client::autosave_set(&socket, session, true).await?;
                println!("autosave enabled");
            }
            AutosaveCommands::Disable => {
                client::autosave_set(&socket, session, false).await?;
                println!("autosave disabled");
            }
        },

        Commands::Status { target } => {
            let (version, updating) = client::read_status(&socket, session, target.into()).await?;
            println!(
                "version {version}, {}",
                if updating { "updating" } else { "confirmed" }
            );
        }

        Commands::Ping => {
            if client::ping(&socket).await? {
                println!("pong");
            }
        }

        Commands::Rediscover => {
            let drivers = client::rediscover(&socket).await?;
            println!("channel map rebuilt: {drivers} drivers");
        }
    }

    Ok(())
}
