mod alarms;
mod presenter;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use fedi_core::poller::CheckOutcome;
use fedi_core::service::ActivationService;
use fedi_core::{AccountSession, ActivationInfo};

use crate::alarms::FileWakeAlarms;
use crate::presenter::StdoutNotifications;

#[derive(Parser)]
#[command(name = "fedi")]
#[command(about = "Headless host for the account activation core")]
struct Cli {
    /// Directory holding the account registry, config, logs and the alarm table.
    #[arg(long, env = "FEDI_DATA_DIR", default_value = "./fedi-data", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage signed-in accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommand,
    },
    /// Run one approval check now.
    Check { account_id: String },
    /// Deliver a wake alarm for an account, as the OS would.
    Wake { account_id: String },
    /// Inspect or run the wake alarm table.
    Alarms {
        #[command(subcommand)]
        command: AlarmsCommand,
    },
    /// Show the "resend confirmation email" button state for an account.
    Cooldown { account_id: String },
}

#[derive(Subcommand)]
enum AccountsCommand {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        domain: String,
        #[arg(long, env = "FEDI_ACCESS_TOKEN", hide_env_values = true)]
        token: String,
        /// Address the confirmation email went to; marks the account as signing up.
        #[arg(long)]
        email: Option<String>,
    },
    List,
    Remove { account_id: String },
}

#[derive(Subcommand)]
enum AlarmsCommand {
    List,
    /// Deliver alarms as they fall due.
    Run {
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
        /// Deliver whatever is due now and exit.
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("create data dir {}", cli.data_dir.display()))?;
    let alarms = Arc::new(FileWakeAlarms::new(&cli.data_dir));
    let service = open_service(&cli.data_dir, alarms.clone())?;

    match cli.command {
        Command::Accounts { command } => accounts(&service, command).await,
        Command::Check { account_id } => {
            let outcome = service.check_now(&account_id).await;
            if let CheckOutcome::Activated { .. } = outcome {
                service.poller().run_housekeeping(&account_id).await;
            }
            println!("{account_id}: {}", describe(outcome));
            Ok(())
        }
        Command::Wake { account_id } => {
            let outcome = service.handle_wake(&account_id).await;
            println!("{account_id}: {}", describe(outcome));
            Ok(())
        }
        Command::Alarms { command } => match command {
            AlarmsCommand::List => {
                for (key, entry) in alarms.list()? {
                    let due = chrono::DateTime::from_timestamp_millis(entry.due_at_ms)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| entry.due_at_ms.to_string());
                    println!("{key}\t{}\t{due}", entry.account_id);
                }
                Ok(())
            }
            AlarmsCommand::Run { poll_ms, once } => {
                run_alarms(&service, &alarms, Duration::from_millis(poll_ms.max(10)), once).await
            }
        },
        Command::Cooldown { account_id } => {
            let Some(session) = service.registry().get(&account_id)? else {
                bail!("no account {account_id}");
            };
            let state = fedi_core::resend_cooldown(
                session.last_resend_at_ms(),
                fedi_core::now_millis(),
                service.config().resend_cooldown(),
            );
            if state.enabled {
                println!("{account_id}: resend available");
            } else {
                println!(
                    "{account_id}: resend available in {}s",
                    state.seconds_remaining
                );
            }
            Ok(())
        }
    }
}

fn open_service(data_dir: &Path, alarms: Arc<FileWakeAlarms>) -> anyhow::Result<ActivationService> {
    let data_dir = data_dir
        .to_str()
        .context("data dir must be valid UTF-8")?;
    ActivationService::open(data_dir, alarms, Arc::new(StdoutNotifications))
}

async fn accounts(service: &ActivationService, command: AccountsCommand) -> anyhow::Result<()> {
    match command {
        AccountsCommand::Add {
            id,
            domain,
            token,
            email,
        } => {
            let mut session = AccountSession::new(id, domain, token);
            session.activation_info = email.map(|email| ActivationInfo {
                email,
                last_resend_at_ms: 0,
            });
            service.sign_in(&session)?;
            println!("added {}", session.account_id);
        }
        AccountsCommand::List => {
            for session in service.registry().list()? {
                println!("{}", serde_json::to_string(&session)?);
            }
        }
        AccountsCommand::Remove { account_id } => {
            if service.sign_out(&account_id).await? {
                println!("removed {account_id}");
            } else {
                println!("no account {account_id}");
            }
        }
    }
    Ok(())
}

async fn run_alarms(
    service: &ActivationService,
    alarms: &FileWakeAlarms,
    poll: Duration,
    once: bool,
) -> anyhow::Result<()> {
    tracing::info!(poll_ms = poll.as_millis() as u64, once, "delivering wake alarms");
    loop {
        for (key, entry) in alarms.take_due(fedi_core::now_millis())? {
            tracing::info!(%key, account_id = %entry.account_id, "wake alarm due");
            let outcome = service.handle_wake(&entry.account_id).await;
            println!("{}: {}", entry.account_id, describe(outcome));
            if outcome.is_terminal() {
                tracing::info!(account_id = %entry.account_id, "no further wake alarms for account");
            }
        }
        if once {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
        }
    }
}

fn describe(outcome: CheckOutcome) -> &'static str {
    use fedi_core::poller::StaleReason;
    match outcome {
        CheckOutcome::Activated { notified: true } => "activated (notified)",
        CheckOutcome::Activated { notified: false } => "activated",
        CheckOutcome::AwaitingApproval { first_observed: true } => "awaiting approval (new)",
        CheckOutcome::AwaitingApproval { first_observed: false } => "awaiting approval",
        CheckOutcome::NotYetKnown => "not yet known; will retry",
        CheckOutcome::Stale(StaleReason::SessionMissing) => "no session; checks cancelled",
        CheckOutcome::Stale(StaleReason::AlreadyActivated) => "already activated; checks cancelled",
    }
}
