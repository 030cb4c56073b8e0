//! Meeting desk: the caller-side driver for one user's meetings.
//!
//! Loads the four backing queries concurrently, derives buckets and the
//! calendar from their union, and throws the whole view away after every
//! mutation (or conflict) instead of patching it locally. Statuses are read
//! at `now`: an accepted meeting whose window has opened shows as ongoing
//! even if the server has not moved it yet.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use super::buckets::{classify, Buckets};
use super::calendar::CalendarIndex;
use super::repository::{list_all, MeetingFilter, MeetingRepository, MeetingSubject};
use super::state_machine::{
    advance, validate_draft, validate_input, Actor, ProposalDraft, Transition,
};
use crate::error::MeetingError;
use crate::models::{Meeting, MeetingStatus, Party, Role};

/// Snapshot of everything the caller can see, computed at `fetched_at`.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub meetings: Vec<Meeting>,
    pub buckets: Buckets,
    pub fetched_at: DateTime<Utc>,
}

impl Dashboard {
    /// A party as loaded records name them, looked up by user ID.
    fn known_party(&self, user_id: &str) -> Option<&Party> {
        self.meetings
            .iter()
            .find_map(|m| m.role_of(user_id).map(|role| m.party(role)))
    }

    /// Client, freelancer and contract for a new proposal by `actor`.
    ///
    /// Parties come from loaded meetings where possible. A party that no
    /// loaded meeting names is represented by its ID alone.
    pub fn proposal_parties(
        &self,
        actor: &Actor,
        subject: &MeetingSubject,
    ) -> (Party, Party, Option<String>) {
        let by_id = |id: &str| {
            self.known_party(id).cloned().unwrap_or_else(|| Party {
                id: id.to_string(),
                name: id.to_string(),
                avatar: None,
            })
        };
        match subject {
            MeetingSubject::Contract(contract_id) => {
                let on_contract = self
                    .meetings
                    .iter()
                    .find(|m| m.contract_id.as_deref() == Some(contract_id.as_str()));
                let (client, freelancer) = match on_contract {
                    Some(m) => (m.client.clone(), m.freelancer.clone()),
                    None => {
                        let me = by_id(&actor.user_id);
                        let other = Party {
                            id: String::new(),
                            name: format!("contract {}", contract_id),
                            avatar: None,
                        };
                        match actor.role {
                            Role::Client => (me, other),
                            Role::Freelancer => (other, me),
                        }
                    }
                };
                (client, freelancer, Some(contract_id.clone()))
            }
            MeetingSubject::PreContract { counterparty_id } => {
                let me = by_id(&actor.user_id);
                let other = by_id(counterparty_id);
                match actor.role {
                    Role::Client => (me, other, None),
                    Role::Freelancer => (other, me, None),
                }
            }
        }
    }
}

pub struct MeetingDesk<R: ?Sized> {
    repo: Arc<R>,
    role: Role,
    tz: FixedOffset,
    page_limit: u32,
    cache: Option<Dashboard>,
}

impl<R: MeetingRepository + ?Sized> MeetingDesk<R> {
    pub fn new(repo: Arc<R>, role: Role, tz: FixedOffset, page_limit: u32) -> Self {
        Self {
            repo,
            role,
            tz,
            page_limit: page_limit.max(1),
            cache: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Cached dashboard, fetching it first if needed.
    pub async fn load(&mut self, now: DateTime<Utc>) -> Result<&Dashboard, MeetingError> {
        if self.cache.is_none() {
            self.refresh(now).await?;
        }
        self.cache
            .as_ref()
            .ok_or_else(|| MeetingError::Api("dashboard unavailable".to_string()))
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Issue all four backing queries concurrently and rebuild the view.
    pub async fn refresh(&mut self, now: DateTime<Utc>) -> Result<&Dashboard, MeetingError> {
        let limit = self.page_limit;
        let repo = self.repo.as_ref();
        let all_filter = MeetingFilter::all(limit);
        let completed_filter = MeetingFilter::with_status(limit, MeetingStatus::Completed);
        let expired_filter = MeetingFilter::expired(limit);
        let reschedule_filter =
            MeetingFilter::with_status(limit, MeetingStatus::RescheduleRequested);

        let (all, completed, expired, reschedule) = tokio::try_join!(
            list_all(repo, &all_filter),
            list_all(repo, &completed_filter),
            list_all(repo, &expired_filter),
            list_all(repo, &reschedule_filter),
        )?;

        // The same meeting may come back from several queries
        let mut by_id: HashMap<String, Meeting> = HashMap::new();
        for mut meeting in all.into_iter().chain(completed).chain(expired).chain(reschedule) {
            if let Err(e) = meeting.check_invariants() {
                tracing::warn!("Inconsistent meeting record: {}", e);
            }
            let status = advance(&meeting, now);
            if status != meeting.status {
                tracing::debug!(
                    "Meeting {} reads as {} (stored {})",
                    meeting.meeting_id,
                    status,
                    meeting.status
                );
                meeting.status = status;
            }
            by_id.insert(meeting.meeting_id.clone(), meeting);
        }
        let mut meetings: Vec<Meeting> = by_id.into_values().collect();
        meetings.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.meeting_id.cmp(&b.meeting_id))
        });

        let buckets = classify(&meetings, self.role, now, &self.tz);
        tracing::debug!(
            "Dashboard rebuilt: {} meetings, {} today, {} expired",
            meetings.len(),
            buckets.today.len(),
            buckets.expired.len()
        );

        Ok(self.cache.insert(Dashboard {
            meetings,
            buckets,
            fetched_at: now,
        }))
    }

    /// Calendar over the cached meetings, in the desk's timezone.
    ///
    /// The unfiltered query has no date bounds, so every month counts as
    /// loaded.
    pub fn calendar(&self) -> Option<CalendarIndex<FixedOffset>> {
        self.cache.as_ref().map(|d| {
            CalendarIndex::build(&d.meetings, self.tz)
                .with_loaded_range(NaiveDate::MIN, NaiveDate::MAX)
        })
    }

    pub fn find(&self, meeting_id: &str) -> Option<&Meeting> {
        self.cache
            .as_ref()?
            .meetings
            .iter()
            .find(|m| m.meeting_id == meeting_id)
    }

    pub async fn propose(
        &mut self,
        subject: &MeetingSubject,
        draft: &ProposalDraft,
        now: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError> {
        validate_draft(draft, now)?;
        let result = self.repo.propose_meeting(subject, draft).await;
        self.settle(result, now).await
    }

    /// Run one transition against the repository, then refetch.
    pub async fn perform(
        &mut self,
        meeting_id: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError> {
        validate_input(&transition, now)?;
        tracing::info!("Requesting {} on meeting {}", transition.name(), meeting_id);

        let repo = &self.repo;
        let result = match &transition {
            Transition::Accept => repo.accept_meeting(meeting_id).await,
            Transition::Reject { reason } => repo.reject_meeting(meeting_id, reason).await,
            Transition::RequestReschedule { proposed_time } => {
                repo.request_reschedule(meeting_id, *proposed_time).await
            }
            Transition::ApproveReschedule => repo.approve_reschedule(meeting_id).await,
            Transition::DeclineReschedule { reason } => {
                repo.decline_reschedule(meeting_id, reason).await
            }
            Transition::CounterReschedule { proposed_time } => {
                repo.counter_reschedule(meeting_id, *proposed_time).await
            }
            Transition::Cancel { reason } => {
                repo.cancel_meeting(meeting_id, reason.as_deref()).await
            }
        };
        self.settle(result, now).await
    }

    /// Drop the cached view after a mutation attempt and refetch when the
    /// server state may have moved.
    async fn settle(
        &mut self,
        result: Result<Meeting, MeetingError>,
        now: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError> {
        let must_refetch = matches!(result, Ok(_) | Err(MeetingError::Conflict(_)));
        if must_refetch {
            self.invalidate();
            if let Err(e) = self.refresh(now).await {
                tracing::warn!("Refetch after mutation failed: {}", e);
            }
        }
        if let Ok(ref meeting) = result {
            tracing::info!("Meeting {} is now {}", meeting.meeting_id, meeting.status);
        }
        result
    }
}
