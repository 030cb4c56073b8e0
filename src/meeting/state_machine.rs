//! Meeting lifecycle transitions and who may perform them.
//!
//! All functions here are pure: they take a meeting snapshot and return a
//! new one (or an error) without touching any store. Stores apply the result
//! with a compare-and-set on the status the snapshot was taken at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::expiry::is_expired;
use crate::error::MeetingError;
use crate::models::{default_response_deadline, Meeting, MeetingStatus, MeetingType, Party, Role};

/// The authenticated user performing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Who may cancel a meeting that has not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Either party may cancel a proposed or accepted meeting.
    #[default]
    AnyParty,
    /// A proposed meeting may only be withdrawn by its proposer.
    ProposerOnlyWhileProposed,
}

/// Time, length and topic of a new proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalDraft {
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub agenda: String,
}

/// A user-initiated change to an existing meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Accept,
    Reject { reason: String },
    RequestReschedule { proposed_time: DateTime<Utc> },
    ApproveReschedule,
    DeclineReschedule { reason: String },
    CounterReschedule { proposed_time: DateTime<Utc> },
    Cancel { reason: Option<String> },
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Accept => "accept",
            Transition::Reject { .. } => "reject",
            Transition::RequestReschedule { .. } => "request reschedule",
            Transition::ApproveReschedule => "approve reschedule",
            Transition::DeclineReschedule { .. } => "decline reschedule",
            Transition::CounterReschedule { .. } => "counter reschedule",
            Transition::Cancel { .. } => "cancel",
        }
    }

    /// Statuses this transition may start from.
    pub fn source_statuses(&self) -> &'static [MeetingStatus] {
        match self {
            Transition::Accept | Transition::Reject { .. } => &[MeetingStatus::Proposed],
            Transition::RequestReschedule { .. } => &[MeetingStatus::Accepted],
            Transition::ApproveReschedule
            | Transition::DeclineReschedule { .. }
            | Transition::CounterReschedule { .. } => &[MeetingStatus::RescheduleRequested],
            Transition::Cancel { .. } => &[MeetingStatus::Proposed, MeetingStatus::Accepted],
        }
    }
}

fn require_reason(reason: &str, what: &str) -> Result<(), MeetingError> {
    if reason.trim().is_empty() {
        return Err(MeetingError::Validation(format!(
            "a reason is required to {}",
            what
        )));
    }
    Ok(())
}

fn require_future(time: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), MeetingError> {
    if time <= now {
        return Err(MeetingError::Validation(format!(
            "proposed time {} is not in the future",
            time.to_rfc3339()
        )));
    }
    Ok(())
}

/// Validate a new proposal before it is sent anywhere.
pub fn validate_draft(draft: &ProposalDraft, now: DateTime<Utc>) -> Result<(), MeetingError> {
    if draft.duration_minutes == 0 {
        return Err(MeetingError::Validation(
            "duration must be a positive number of minutes".to_string(),
        ));
    }
    if draft.agenda.trim().is_empty() {
        return Err(MeetingError::Validation("agenda must not be empty".to_string()));
    }
    require_future(draft.scheduled_at, now)
}

/// Validate the caller-supplied inputs of a transition.
///
/// Runs before any store access, so a malformed request never reaches the
/// network.
pub fn validate_input(transition: &Transition, now: DateTime<Utc>) -> Result<(), MeetingError> {
    match transition {
        Transition::Reject { reason } => require_reason(reason, "reject a meeting"),
        Transition::DeclineReschedule { reason } => {
            require_reason(reason, "decline a reschedule request")
        }
        Transition::RequestReschedule { proposed_time }
        | Transition::CounterReschedule { proposed_time } => require_future(*proposed_time, now),
        Transition::Accept | Transition::ApproveReschedule | Transition::Cancel { .. } => Ok(()),
    }
}

/// Applies lifecycle transitions under a cancellation policy.
#[derive(Debug, Clone, Default)]
pub struct MeetingStateMachine {
    cancel_policy: CancelPolicy,
}

impl MeetingStateMachine {
    pub fn new(cancel_policy: CancelPolicy) -> Self {
        Self { cancel_policy }
    }

    /// Create a `proposed` meeting authored by `actor`.
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &self,
        meeting_id: String,
        actor: &Actor,
        client: Party,
        freelancer: Party,
        contract_id: Option<String>,
        draft: ProposalDraft,
        now: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError> {
        validate_draft(&draft, now)?;

        let author = match actor.role {
            Role::Client => &client,
            Role::Freelancer => &freelancer,
        };
        if author.id != actor.user_id {
            return Err(MeetingError::Authorization(format!(
                "user {} is not the {} of this engagement",
                actor.user_id, actor.role
            )));
        }

        let meeting_type = if contract_id.is_some() {
            MeetingType::PostContract
        } else {
            MeetingType::PreContract
        };

        Ok(Meeting {
            meeting_id,
            contract_id,
            meeting_type,
            client,
            freelancer,
            scheduled_at: draft.scheduled_at,
            duration_minutes: draft.duration_minutes,
            agenda: draft.agenda.trim().to_string(),
            status: MeetingStatus::Proposed,
            is_proposed_by_client: Some(actor.role == Role::Client),
            reschedule_requested_by: None,
            proposed_reschedule_time: None,
            response_deadline: default_response_deadline(draft.scheduled_at),
            rejection_reason: None,
            decline_reason: None,
            cancellation_reason: None,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }

    /// Apply `transition` by `actor` to a snapshot of `meeting` at `now`.
    ///
    /// Checks run in a fixed order: input validation, party membership,
    /// expected source status (conflict), expiry (conflict), then the
    /// per-transition actor rule.
    pub fn apply(
        &self,
        meeting: &Meeting,
        actor: &Actor,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError> {
        validate_input(transition, now)?;

        let role = match meeting.role_of(&actor.user_id) {
            Some(role) if role == actor.role => role,
            _ => {
                return Err(MeetingError::Authorization(format!(
                    "user {} is not a party to meeting {}",
                    actor.user_id, meeting.meeting_id
                )));
            }
        };

        if !transition.source_statuses().contains(&meeting.status) {
            return Err(MeetingError::Conflict(format!(
                "cannot {} meeting {}: it is already {}",
                transition.name(),
                meeting.meeting_id,
                meeting.status
            )));
        }

        if is_expired(meeting, now) {
            return Err(MeetingError::Conflict(format!(
                "cannot {} meeting {}: response deadline {} has passed",
                transition.name(),
                meeting.meeting_id,
                meeting.response_deadline.to_rfc3339()
            )));
        }

        self.authorize(meeting, role, transition)?;

        let mut next = meeting.clone();
        next.updated_at = Some(now);

        match transition {
            Transition::Accept => {
                next.status = MeetingStatus::Accepted;
            }
            Transition::Reject { reason } => {
                next.status = MeetingStatus::Rejected;
                next.rejection_reason = Some(reason.trim().to_string());
            }
            Transition::RequestReschedule { proposed_time } => {
                if *proposed_time == meeting.scheduled_at {
                    return Err(MeetingError::Validation(
                        "proposed time is the current schedule".to_string(),
                    ));
                }
                next.status = MeetingStatus::RescheduleRequested;
                next.reschedule_requested_by = Some(role);
                next.proposed_reschedule_time = Some(*proposed_time);
                next.response_deadline = default_response_deadline(*proposed_time);
            }
            Transition::ApproveReschedule => {
                let proposed_time = meeting.proposed_reschedule_time.ok_or_else(|| {
                    MeetingError::Conflict(format!(
                        "meeting {} has no pending reschedule time",
                        meeting.meeting_id
                    ))
                })?;
                next.status = MeetingStatus::Accepted;
                next.scheduled_at = proposed_time;
                next.reschedule_requested_by = None;
                next.proposed_reschedule_time = None;
            }
            Transition::DeclineReschedule { reason } => {
                next.status = MeetingStatus::Accepted;
                next.reschedule_requested_by = None;
                next.proposed_reschedule_time = None;
                next.decline_reason = Some(reason.trim().to_string());
            }
            Transition::CounterReschedule { proposed_time } => {
                if meeting.proposed_reschedule_time == Some(*proposed_time) {
                    return Err(MeetingError::Validation(
                        "counter proposal repeats the pending time".to_string(),
                    ));
                }
                next.reschedule_requested_by = Some(role);
                next.proposed_reschedule_time = Some(*proposed_time);
                next.response_deadline = default_response_deadline(*proposed_time);
            }
            Transition::Cancel { reason } => {
                next.status = MeetingStatus::Cancelled;
                next.cancellation_reason = reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(String::from);
            }
        }

        Ok(next)
    }

    fn authorize(
        &self,
        meeting: &Meeting,
        role: Role,
        transition: &Transition,
    ) -> Result<(), MeetingError> {
        let allowed = match transition {
            // Answering a proposal is for the party that did not make it
            Transition::Accept | Transition::Reject { .. } => meeting.proposer() != Some(role),
            Transition::RequestReschedule { .. } => true,
            Transition::ApproveReschedule
            | Transition::DeclineReschedule { .. }
            | Transition::CounterReschedule { .. } => {
                meeting.reschedule_requested_by != Some(role)
            }
            Transition::Cancel { .. } => match (self.cancel_policy, meeting.status) {
                (CancelPolicy::ProposerOnlyWhileProposed, MeetingStatus::Proposed) => {
                    meeting.proposer() == Some(role)
                }
                _ => true,
            },
        };

        if allowed {
            Ok(())
        } else {
            Err(MeetingError::Authorization(format!(
                "the {} may not {} meeting {}",
                role,
                transition.name(),
                meeting.meeting_id
            )))
        }
    }
}

/// Status the meeting should hold at `now` from the passage of time alone.
///
/// An accepted meeting whose window has fully elapsed goes straight to
/// `completed`.
pub fn advance(meeting: &Meeting, now: DateTime<Utc>) -> MeetingStatus {
    let started = now >= meeting.scheduled_at;
    let ended = now >= meeting.ends_at();
    match meeting.status {
        MeetingStatus::Accepted | MeetingStatus::Ongoing if ended => MeetingStatus::Completed,
        MeetingStatus::Accepted if started => MeetingStatus::Ongoing,
        status => status,
    }
}

/// Check that `user_id` may enter `meeting` now. Returns their role.
pub fn authorize_join(meeting: &Meeting, user_id: &str) -> Result<Role, MeetingError> {
    let role = meeting.role_of(user_id).ok_or_else(|| {
        MeetingError::Forbidden(format!(
            "user {} is not a party to meeting {}",
            user_id, meeting.meeting_id
        ))
    })?;
    if meeting.status != MeetingStatus::Ongoing {
        return Err(MeetingError::NotJoinable(format!(
            "meeting {} is {}",
            meeting.meeting_id, meeting.status
        )));
    }
    Ok(role)
}
