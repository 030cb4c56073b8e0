//! Marketplace API commands
//!
//! Each command loads config, opens an authenticated desk over the HTTP
//! repository and prints the result.

pub mod client;
pub mod meetings;
mod views;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::MeetingError;
use crate::meeting::{
    authorize_join, Actor, BucketKind, MeetingDesk, MeetingStateMachine, MeetingSubject,
    MonthCursor, ProposalDraft, SessionJoinCoordinator, Transition,
};
use crate::models::Role;
use crate::transport::{self, SignalingTransport};
use client::MarketplaceClient;
use meetings::HttpMeetingRepository;

pub use views::parse_time;

struct Session {
    config: Config,
    actor: Actor,
    tz: FixedOffset,
    machine: MeetingStateMachine,
    repo: Arc<HttpMeetingRepository>,
}

impl Session {
    async fn open() -> Result<Self> {
        let config = Config::load()?;
        let (user_id, role) = match (config.user_id.clone(), config.role) {
            (Some(id), Some(role)) => (id, role),
            _ => bail!("Unknown user. Run 'gigmeet login <email>' first."),
        };
        let tz = config.timezone()?;
        let client = MarketplaceClient::new().await?;
        Ok(Self {
            actor: Actor::new(user_id, role),
            tz,
            machine: MeetingStateMachine::new(config.cancel_policy),
            repo: Arc::new(HttpMeetingRepository::new(client, role)),
            config,
        })
    }

    fn role(&self) -> Role {
        self.actor.role
    }

    fn desk(&self) -> MeetingDesk<HttpMeetingRepository> {
        MeetingDesk::new(
            self.repo.clone(),
            self.role(),
            self.tz,
            self.config.page_limit,
        )
    }
}

/// Viewer timezone from config, for parsing times given on the command line.
pub fn viewer_timezone() -> Result<FixedOffset> {
    Config::load()?.timezone()
}

/// Show bucket counts, pending responses and today's meetings
pub async fn dashboard() -> Result<()> {
    let session = Session::open().await?;
    let mut desk = session.desk();
    let role = desk.role();
    let now = Utc::now();
    let dashboard = desk.load(now).await.context("Failed to load meetings")?;
    views::print_dashboard(dashboard, role, &session.tz);
    Ok(())
}

/// List one dashboard bucket
pub async fn list_bucket(bucket: &str) -> Result<()> {
    let kind = BucketKind::parse(bucket).with_context(|| {
        let names: Vec<&str> = BucketKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("Unknown bucket '{}'. Choose one of: {}", bucket, names.join(", "))
    })?;
    let session = Session::open().await?;
    let mut desk = session.desk();
    let role = desk.role();
    let now = Utc::now();
    let dashboard = desk.load(now).await.context("Failed to load meetings")?;
    views::print_bucket(kind, &dashboard.buckets, role, &session.tz, now);
    Ok(())
}

/// Which part of the calendar to show
pub enum CalendarView<'a> {
    /// `count` months starting at `month` (default: the current one),
    /// stepping back in time when `backward` is set.
    Months {
        month: Option<&'a str>,
        count: u32,
        backward: bool,
    },
    /// Every meeting on one `YYYY-MM-DD` day.
    Day(&'a str),
}

/// Show meetings grouped by local day
pub async fn calendar(view: CalendarView<'_>) -> Result<()> {
    let session = Session::open().await?;
    let now = Utc::now();
    let mut desk = session.desk();
    desk.load(now).await.context("Failed to load meetings")?;
    let mut index = desk.calendar().context("Meetings not loaded")?;

    let (month, count, backward) = match view {
        CalendarView::Day(day) => {
            for line in views::format_day(&index, day, desk.role(), now)? {
                println!("{}", line);
            }
            return Ok(());
        }
        CalendarView::Months {
            month,
            count,
            backward,
        } => (month, count, backward),
    };

    let mut cursor = match month {
        Some(m) => MonthCursor::parse(m)?,
        None => MonthCursor::containing(index.local_date(now))?,
    };
    for shown in 0..count.max(1) {
        if shown > 0 {
            cursor = if backward { cursor.prev()? } else { cursor.next()? };
        }
        if !index.covers(cursor) {
            tracing::debug!("{} is outside the loaded range; refetching", cursor);
            desk.invalidate();
            desk.load(now).await.context("Failed to load meetings")?;
            index = desk.calendar().context("Meetings not loaded")?;
        }
        views::print_month(&index, cursor);
    }
    println!(
        "\n{} meeting(s) on {} day(s) loaded.",
        index.total(),
        index.entries().len()
    );
    Ok(())
}

/// Propose a new meeting
pub async fn propose(
    subject: MeetingSubject,
    scheduled_at: DateTime<Utc>,
    duration_minutes: u32,
    agenda: String,
) -> Result<()> {
    let session = Session::open().await?;
    let mut desk = session.desk();
    let draft = ProposalDraft {
        scheduled_at,
        duration_minutes,
        agenda,
    };
    let now = Utc::now();

    // Check authorship and the draft locally before asking the server
    let dashboard = desk.load(now).await.context("Failed to load meetings")?;
    let (client, freelancer, contract_id) = dashboard.proposal_parties(&session.actor, &subject);
    let local = session
        .machine
        .propose(
            String::new(),
            &session.actor,
            client,
            freelancer,
            contract_id,
            draft.clone(),
            now,
        )
        .context("Cannot propose meeting")?;
    tracing::debug!(
        "Proposal passes local checks; response due by {}",
        local.response_deadline
    );

    let meeting = desk
        .propose(&subject, &draft, now)
        .await
        .context("Failed to propose meeting")?;
    println!("Meeting proposed.");
    println!("{}", views::format_meeting(&meeting, desk.role(), &session.tz, now));
    Ok(())
}

/// Apply a lifecycle transition to a meeting
pub async fn transition(meeting_id: &str, transition: Transition) -> Result<()> {
    let session = Session::open().await?;
    let mut desk = session.desk();
    let now = Utc::now();

    // Check locally against the loaded record before asking the server
    desk.load(now).await.context("Failed to load meetings")?;
    if let Some(current) = desk.find(meeting_id) {
        session
            .machine
            .apply(current, &session.actor, &transition, now)
            .with_context(|| format!("Cannot {} meeting {}", transition.name(), meeting_id))?;
    } else {
        tracing::debug!("Meeting {} not in loaded view; deferring to server", meeting_id);
    }

    match desk.perform(meeting_id, transition.clone(), now).await {
        Ok(meeting) => {
            println!("Meeting {}: {}.", meeting_id, meeting.status);
            println!("{}", views::format_meeting(&meeting, desk.role(), &session.tz, now));
            Ok(())
        }
        Err(MeetingError::Conflict(msg)) => {
            bail!(
                "Meeting {} changed before {} could apply ({}). Run 'gigmeet dashboard' to see its current state.",
                meeting_id,
                transition.name(),
                msg
            )
        }
        Err(e) if e.is_retryable() => {
            bail!(
                "Could not reach the marketplace to {} meeting {} ({}). Try again.",
                transition.name(),
                meeting_id,
                e
            )
        }
        Err(e) => Err(e)
            .with_context(|| format!("Failed to {} meeting {}", transition.name(), meeting_id)),
    }
}

/// Join a live meeting and hold the session until Ctrl-C
pub async fn join(meeting_id: &str) -> Result<()> {
    let session = Session::open().await?;
    let mut desk = session.desk();
    let now = Utc::now();
    desk.load(now).await.context("Failed to load meetings")?;
    if let Some(meeting) = desk.find(meeting_id) {
        authorize_join(meeting, &session.actor.user_id)
            .with_context(|| format!("Cannot join meeting {}", meeting_id))?;
    }

    let coordinator = SessionJoinCoordinator::new(
        session.repo.clone(),
        SignalingTransport,
        session.config.join_timeout(),
    );

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let joined = coordinator.join(meeting_id, &cancel).await;
    watcher.abort();

    let joined = joined.with_context(|| format!("Failed to join meeting {}", meeting_id))?;
    println!(
        "Joined meeting {} on channel {} (session {}). Press Ctrl-C to leave.",
        meeting_id,
        joined.credentials.channel,
        joined.session.session_id().unwrap_or("-")
    );
    transport::run_until_interrupted(joined.session).await
}
