//! Thin command-line surface over the client library.
//!
//! One session per invocation: connect, log in, run the requested
//! operation, disconnect. Exit codes: 0 success, 2 protocol error, 3 login
//! failed, 4 I/O error, 5 cancelled.

#![expect(
    clippy::print_stdout,
    reason = "intentional console output for command results"
)]
#![expect(
    clippy::print_stderr,
    reason = "intentional error output for diagnostics"
)]
#![expect(
    clippy::float_arithmetic,
    reason = "progress percentage is inherently floating point"
)]

use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use mxc::{
    config::{ClientConfig, DEFAULT_PORT},
    session::{ServerEvent, Session, SessionError},
    tracker,
    transfer::{
        DownloadDestination, FileDownload, FileUpload, TransferError, TransferProgress,
    },
};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

/// Exit code for protocol-level failures.
const EXIT_PROTOCOL: i32 = 2;
/// Exit code for refused logins.
const EXIT_LOGIN: i32 = 3;
/// Exit code for I/O failures.
const EXIT_IO: i32 = 4;
/// Exit code for cancelled operations.
const EXIT_CANCELLED: i32 = 5;

#[derive(Parser, Debug)]
#[command(name = "mxc", about = "Hotline protocol client")]
struct Cli {
    /// Server host name or address.
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,
    /// Server control port.
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Account login.
    #[arg(long, global = true, default_value = "guest")]
    login: String,
    /// Account password.
    #[arg(long, global = true, default_value = "")]
    password: String,
    /// Display name.
    #[arg(long, global = true, default_value = "mxc")]
    name: String,
    /// Icon id.
    #[arg(long, global = true, default_value_t = 414)]
    icon: u16,
    /// Emit listings as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, log in, and report the server identity.
    Connect,
    /// Show the identity and privileges granted to this session.
    Whoami,
    /// Send a chat line.
    Send {
        /// Chat text.
        text: String,
        /// Announce instead of speaking.
        #[arg(long)]
        announce: bool,
    },
    /// List files at a path.
    Ls {
        /// Slash-separated server path; omit for the root.
        path: Option<String>,
    },
    /// Download a file into a directory.
    Get {
        /// File name on the server.
        file: String,
        /// Slash-separated server path holding the file.
        #[arg(long)]
        path: Option<String>,
        /// Destination directory.
        #[arg(long, default_value = ".")]
        output: Utf8PathBuf,
    },
    /// Upload a local file.
    Put {
        /// Local file to upload.
        local: Utf8PathBuf,
        /// Slash-separated server path to upload into.
        #[arg(long)]
        path: Option<String>,
    },
    /// List news categories, or articles when a path is given.
    News {
        /// Slash-separated news path.
        path: Option<String>,
    },
    /// Print the message board.
    Board,
    /// Tracker operations.
    Tracker {
        #[command(subcommand)]
        command: TrackerCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TrackerCommand {
    /// List servers known to a tracker.
    Ls {
        /// Tracker host.
        tracker_host: String,
        /// Tracker port.
        #[arg(long)]
        tracker_port: Option<u16>,
    },
}

fn split_path(path: Option<&str>) -> Vec<String> {
    path.map(|p| {
        p.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(session_err) = err.downcast_ref::<SessionError>() {
        return match session_err {
            SessionError::LoginFailed(_) => EXIT_LOGIN,
            SessionError::Io(_) | SessionError::Timeout => EXIT_IO,
            SessionError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_PROTOCOL,
        };
    }
    if let Some(transfer_err) = err.downcast_ref::<TransferError>() {
        return match transfer_err {
            TransferError::Cancelled => EXIT_CANCELLED,
            TransferError::Io(_)
            | TransferError::Connect(_)
            | TransferError::Timeout
            | TransferError::DestinationUnwritable(_) => EXIT_IO,
            _ => EXIT_PROTOCOL,
        };
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return EXIT_IO;
    }
    EXIT_PROTOCOL
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("mxc: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::load().context("loading configuration")?;
    match &cli.command {
        Command::Tracker {
            command: TrackerCommand::Ls {
                tracker_host,
                tracker_port,
            },
        } => {
            let servers = tracker::list_servers(tracker_host, *tracker_port, &config).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&servers)?);
            } else {
                for server in servers {
                    println!(
                        "{:<24} {}:{} ({} users) {}",
                        server.name, server.address, server.port, server.user_count,
                        server.description
                    );
                }
            }
            Ok(())
        }
        command => with_session(&cli, config, command).await,
    }
}

async fn with_session(cli: &Cli, config: ClientConfig, command: &Command) -> Result<()> {
    let (session, mut events) = Session::connect(cli.host.clone(), cli.port, config).await?;
    let server = session
        .login(&cli.login, &cli.password, &cli.name, cli.icon)
        .await?;
    let result = dispatch(cli, &session, &mut events, command, &server).await;
    session.disconnect().await;
    result
}

async fn dispatch(
    cli: &Cli,
    session: &Session,
    events: &mut mxc::session::EventStream,
    command: &Command,
    server: &mxc::session::ServerInfo,
) -> Result<()> {
    match command {
        Command::Connect => {
            println!(
                "connected to {} (version {})",
                server.name.as_deref().unwrap_or("<unnamed>"),
                server.version
            );
            if let Some(text) = wait_for_agreement(events).await {
                println!("--- agreement ---\n{text}");
            }
            Ok(())
        }
        Command::Whoami => {
            println!("logged in as {} ({})", cli.name, cli.login);
            if let Some(access) = wait_for_access(events).await {
                println!("privileges: {access:?}");
            }
            Ok(())
        }
        Command::Send { text, announce } => {
            session.send_chat(text, *announce).await?;
            Ok(())
        }
        Command::Ls { path } => {
            let files = session.get_file_list(&split_path(path.as_deref())).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for file in files {
                    let marker = if file.is_folder() { "/" } else { "" };
                    println!("{:>10}  {}{}", file.size, file.name, marker);
                }
            }
            Ok(())
        }
        Command::Get { file, path, output } => {
            let path = split_path(path.as_deref());
            let reference = session.request_download_file(file, &path, false).await?;
            let download = FileDownload::new(
                session.host().to_owned(),
                session.transfer_port(),
                reference,
                DownloadDestination::Directory(output.clone()),
                session.config().clone(),
            );
            let mut progress = download.progress();
            let watcher = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let current = progress.borrow().clone();
                    if let TransferProgress::Transfer { fraction, .. } = current {
                        eprint!("\r{:>5.1}%", fraction * 100.0);
                    }
                }
                eprintln!();
            });
            let saved = download.run().await?;
            let _: Result<_, _> = watcher.await;
            println!("saved {saved}");
            Ok(())
        }
        Command::Put { local, path } => {
            let name = local
                .file_name()
                .context("upload source has no file name")?;
            let reference = session
                .request_upload_file(name, &split_path(path.as_deref()))
                .await?;
            let upload = FileUpload::new(
                session.host().to_owned(),
                session.transfer_port(),
                reference,
                local.clone(),
                session.config().clone(),
            );
            upload.run().await?;
            println!("uploaded {local}");
            Ok(())
        }
        Command::News { path } => {
            let segments = split_path(path.as_deref());
            if segments.is_empty() {
                for category in session.get_news_categories(&[]).await? {
                    println!("{} ({} items)", category.name, category.count);
                }
            } else {
                for article in session.get_news_articles(&segments).await? {
                    println!("{:>6}  {}  by {}", article.id, article.title, article.poster);
                }
            }
            Ok(())
        }
        Command::Board => {
            println!("{}", session.get_message_board().await?);
            Ok(())
        }
        Command::Tracker { .. } => Ok(()),
    }
}

async fn wait_for_agreement(events: &mut mxc::session::EventStream) -> Option<String> {
    let deadline = Duration::from_secs(2);
    let wait = async {
        while let Some(event) = events.recv().await {
            if let ServerEvent::AgreementRequired(text) = event {
                return Some(text);
            }
        }
        None
    };
    timeout(deadline, wait).await.ok().flatten()
}

async fn wait_for_access(
    events: &mut mxc::session::EventStream,
) -> Option<mxc::privileges::Privileges> {
    let deadline = Duration::from_secs(2);
    let wait = async {
        while let Some(event) = events.recv().await {
            if let ServerEvent::UserAccess(access) = event {
                return Some(access);
            }
        }
        None
    };
    timeout(deadline, wait).await.ok().flatten()
}
