//! Remote meeting store interface.
//!
//! Implementations act on behalf of one authenticated user; identity is part
//! of the session, not of each call. Every mutating call must be applied
//! with a compare-and-set on the meeting's current status so that repeating
//! it fails with `MeetingError::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state_machine::ProposalDraft;
use crate::error::MeetingError;
use crate::models::{Meeting, MeetingStatus, Page};

/// Query parameters for `list_meetings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingFilter {
    pub page: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MeetingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expired: Option<bool>,
}

impl MeetingFilter {
    pub fn all(limit: u32) -> Self {
        Self {
            page: 1,
            limit,
            status: None,
            is_expired: None,
        }
    }

    pub fn with_status(limit: u32, status: MeetingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::all(limit)
        }
    }

    pub fn expired(limit: u32) -> Self {
        Self {
            is_expired: Some(true),
            ..Self::all(limit)
        }
    }

    pub fn at_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

/// What a new meeting is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingSubject {
    /// Tied to an existing contract; the contract names both parties.
    Contract(String),
    /// Before any contract exists, with the named counterparty.
    PreContract { counterparty_id: String },
}

/// Opaque credentials that let one user attach to one live meeting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    pub meeting_id: String,
    pub channel: String,
    pub token: String,
    /// Signaling endpoint for the media transport.
    pub signaling_url: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait MeetingRepository: Send + Sync {
    async fn list_meetings(&self, filter: &MeetingFilter) -> Result<Page<Meeting>, MeetingError>;

    async fn propose_meeting(
        &self,
        subject: &MeetingSubject,
        draft: &ProposalDraft,
    ) -> Result<Meeting, MeetingError>;

    async fn accept_meeting(&self, meeting_id: &str) -> Result<Meeting, MeetingError>;

    async fn reject_meeting(&self, meeting_id: &str, reason: &str)
        -> Result<Meeting, MeetingError>;

    async fn request_reschedule(
        &self,
        meeting_id: &str,
        proposed_time: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError>;

    async fn approve_reschedule(&self, meeting_id: &str) -> Result<Meeting, MeetingError>;

    async fn decline_reschedule(
        &self,
        meeting_id: &str,
        reason: &str,
    ) -> Result<Meeting, MeetingError>;

    async fn counter_reschedule(
        &self,
        meeting_id: &str,
        proposed_time: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError>;

    async fn cancel_meeting(
        &self,
        meeting_id: &str,
        reason: Option<&str>,
    ) -> Result<Meeting, MeetingError>;

    async fn join_meeting(&self, meeting_id: &str) -> Result<SessionCredentials, MeetingError>;
}

/// Fetch every page of a filtered query.
///
/// Pages are counted on our side. A response that reports a different page
/// than the one requested ends the walk with `MeetingError::Api`.
pub async fn list_all<R: MeetingRepository + ?Sized>(
    repo: &R,
    filter: &MeetingFilter,
) -> Result<Vec<Meeting>, MeetingError> {
    let mut items = Vec::new();
    let mut page = filter.page.max(1);
    loop {
        let result = repo.list_meetings(&filter.at_page(page)).await?;
        if result.page != page {
            return Err(MeetingError::Api(format!(
                "asked for page {} of meetings, got page {}",
                page, result.page
            )));
        }
        let done = result.items.is_empty() || result.is_last();
        items.extend(result.items);
        if done {
            break;
        }
        page += 1;
    }
    tracing::debug!("Fetched {} meetings over {} page(s)", items.len(), page);
    Ok(items)
}
