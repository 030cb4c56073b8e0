//! Meeting-related models

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MeetingError;

/// Which side of the marketplace a user acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Freelancer,
}

impl Role {
    pub fn counterpart(self) -> Self {
        match self {
            Role::Client => Role::Freelancer,
            Role::Freelancer => Role::Client,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Freelancer => "freelancer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meeting type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeetingType {
    PreContract,
    PostContract,
}

/// Stored meeting status. Expiry is never stored; see `meeting::expiry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Proposed,
    Accepted,
    Ongoing,
    Completed,
    Cancelled,
    Rejected,
    RescheduleRequested,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Proposed => "proposed",
            MeetingStatus::Accepted => "accepted",
            MeetingStatus::Ongoing => "ongoing",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Cancelled => "cancelled",
            MeetingStatus::Rejected => "rejected",
            MeetingStatus::RescheduleRequested => "reschedule_requested",
        }
    }

    /// Statuses that wait on a counterparty response and can therefore expire.
    pub fn is_pending_response(&self) -> bool {
        matches!(
            self,
            MeetingStatus::Proposed | MeetingStatus::RescheduleRequested
        )
    }
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Party reference (one client and one freelancer per meeting)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Meeting entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub meeting_id: String,
    #[serde(default)]
    pub contract_id: Option<String>,
    pub meeting_type: MeetingType,
    pub client: Party,
    pub freelancer: Party,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub agenda: String,
    pub status: MeetingStatus,
    #[serde(default)]
    pub is_proposed_by_client: Option<bool>,
    #[serde(default)]
    pub reschedule_requested_by: Option<Role>,
    #[serde(default)]
    pub proposed_reschedule_time: Option<DateTime<Utc>>,
    pub response_deadline: DateTime<Utc>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub decline_reason: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Meeting {
    /// End of the meeting window (exclusive).
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn party(&self, role: Role) -> &Party {
        match role {
            Role::Client => &self.client,
            Role::Freelancer => &self.freelancer,
        }
    }

    /// Role `user_id` holds in this meeting, if any.
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        if self.client.id == user_id {
            Some(Role::Client)
        } else if self.freelancer.id == user_id {
            Some(Role::Freelancer)
        } else {
            None
        }
    }

    /// Author of the outstanding proposal. Only meaningful while proposed.
    pub fn proposer(&self) -> Option<Role> {
        self.is_proposed_by_client.map(|by_client| {
            if by_client {
                Role::Client
            } else {
                Role::Freelancer
            }
        })
    }

    /// Check the record-level invariants of a meeting.
    pub fn check_invariants(&self) -> Result<(), MeetingError> {
        if self.duration_minutes == 0 {
            return Err(MeetingError::Validation(format!(
                "meeting {} has zero duration",
                self.meeting_id
            )));
        }

        let reschedule_fields = (
            self.reschedule_requested_by.is_some(),
            self.proposed_reschedule_time.is_some(),
        );
        match (self.status, reschedule_fields) {
            (MeetingStatus::RescheduleRequested, (true, true)) => {}
            (MeetingStatus::RescheduleRequested, _) => {
                return Err(MeetingError::Validation(format!(
                    "meeting {} is reschedule_requested without requester and time",
                    self.meeting_id
                )));
            }
            (_, (false, false)) => {}
            (status, _) => {
                return Err(MeetingError::Validation(format!(
                    "meeting {} carries reschedule fields while {}",
                    self.meeting_id, status
                )));
            }
        }

        if self.status == MeetingStatus::Proposed && self.is_proposed_by_client.is_none() {
            return Err(MeetingError::Validation(format!(
                "meeting {} is proposed without a proposer",
                self.meeting_id
            )));
        }

        let pre_contract = self.meeting_type == MeetingType::PreContract;
        if pre_contract == self.contract_id.is_some() {
            return Err(MeetingError::Validation(format!(
                "meeting {} has a {:?} type inconsistent with its contract reference",
                self.meeting_id, self.meeting_type
            )));
        }

        Ok(())
    }
}

/// Deadline for answering a proposal or reschedule request that starts at
/// `start`: the following midnight UTC.
pub fn default_response_deadline(start: DateTime<Utc>) -> DateTime<Utc> {
    let next_day = start.date_naive() + Duration::days(1);
    next_day.and_time(NaiveTime::MIN).and_utc()
}
