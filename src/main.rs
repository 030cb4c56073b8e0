//! gigmeet - meeting scheduling for a freelance marketplace
//!
//! Propose, negotiate and join client/freelancer meetings from the terminal.

mod api;
mod auth;
mod config;
mod error;
mod meeting;
mod models;
mod transport;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meeting::{MeetingSubject, Transition};

#[derive(Parser)]
#[command(name = "gigmeet")]
#[command(about = "Meeting scheduling for freelance marketplace contracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password (password from GIGMEET_PASSWORD or prompt)
    Login {
        /// Account email
        email: String,

        /// Log in again even if a valid session exists
        #[arg(short, long)]
        force: bool,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current session status
    Status,

    /// Show bucket counts, pending responses and today's meetings
    Dashboard,

    /// List one bucket: today, ongoing, sent, received, rescheduled, completed, expired
    List {
        bucket: String,
    },

    /// Show meetings for a month, grouped by local day
    Calendar {
        /// Month to show (YYYY-MM), defaults to the current month
        #[arg(short, long, conflicts_with = "day")]
        month: Option<String>,

        /// Number of consecutive months to show
        #[arg(short = 'n', long, default_value = "1")]
        months: u32,

        /// Step back from the starting month instead of forward
        #[arg(short, long)]
        back: bool,

        /// Show every meeting on one day (YYYY-MM-DD)
        #[arg(short, long)]
        day: Option<String>,
    },

    /// Propose a new meeting
    Propose {
        /// Contract the meeting belongs to
        #[arg(long, conflicts_with = "with")]
        contract: Option<String>,

        /// Counterparty user ID, for a meeting before any contract exists
        #[arg(long)]
        with: Option<String>,

        /// Start time (RFC 3339 or "YYYY-MM-DD HH:MM" in your configured offset)
        #[arg(long)]
        at: String,

        /// Duration in minutes
        #[arg(short, long, default_value = "30")]
        duration: u32,

        /// Meeting agenda
        #[arg(short, long)]
        agenda: String,
    },

    /// Accept a proposed meeting
    Accept { meeting_id: String },

    /// Reject a proposed meeting
    Reject {
        meeting_id: String,

        #[arg(short, long)]
        reason: String,
    },

    /// Ask to move an accepted meeting
    Reschedule {
        meeting_id: String,

        /// Proposed new start time
        #[arg(long)]
        to: String,
    },

    /// Approve a pending reschedule request
    Approve { meeting_id: String },

    /// Decline a pending reschedule request
    Decline {
        meeting_id: String,

        #[arg(short, long)]
        reason: String,
    },

    /// Answer a reschedule request with a different time
    Counter {
        meeting_id: String,

        /// Counter-proposed start time
        #[arg(long)]
        to: String,
    },

    /// Cancel a meeting that has not started
    Cancel {
        meeting_id: String,

        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Join a live meeting
    Join { meeting_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Login { email, force } => {
            tracing::info!("Starting login...");
            auth::login(&email, force).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Dashboard => {
            tracing::info!("Fetching meetings...");
            api::dashboard().await?;
        }
        Commands::List { bucket } => {
            api::list_bucket(&bucket).await?;
        }
        Commands::Calendar {
            month,
            months,
            back,
            day,
        } => {
            let view = match day.as_deref() {
                Some(day) => api::CalendarView::Day(day),
                None => api::CalendarView::Months {
                    month: month.as_deref(),
                    count: months,
                    backward: back,
                },
            };
            api::calendar(view).await?;
        }
        Commands::Propose {
            contract,
            with,
            at,
            duration,
            agenda,
        } => {
            let subject = match (contract, with) {
                (Some(contract_id), None) => MeetingSubject::Contract(contract_id),
                (None, Some(counterparty_id)) => MeetingSubject::PreContract { counterparty_id },
                _ => bail!("Give either --contract <id> or --with <user id>"),
            };
            let scheduled_at = api::parse_time(&at, &api::viewer_timezone()?)?;
            api::propose(subject, scheduled_at, duration, agenda).await?;
        }
        Commands::Accept { meeting_id } => {
            api::transition(&meeting_id, Transition::Accept).await?;
        }
        Commands::Reject { meeting_id, reason } => {
            api::transition(&meeting_id, Transition::Reject { reason }).await?;
        }
        Commands::Reschedule { meeting_id, to } => {
            let proposed_time = api::parse_time(&to, &api::viewer_timezone()?)?;
            api::transition(&meeting_id, Transition::RequestReschedule { proposed_time }).await?;
        }
        Commands::Approve { meeting_id } => {
            api::transition(&meeting_id, Transition::ApproveReschedule).await?;
        }
        Commands::Decline { meeting_id, reason } => {
            api::transition(&meeting_id, Transition::DeclineReschedule { reason }).await?;
        }
        Commands::Counter { meeting_id, to } => {
            let proposed_time = api::parse_time(&to, &api::viewer_timezone()?)?;
            api::transition(&meeting_id, Transition::CounterReschedule { proposed_time }).await?;
        }
        Commands::Cancel { meeting_id, reason } => {
            api::transition(&meeting_id, Transition::Cancel { reason }).await?;
        }
        Commands::Join { meeting_id } => {
            tracing::info!("Joining meeting {}...", meeting_id);
            api::join(&meeting_id).await?;
        }
    }

    Ok(())
}
