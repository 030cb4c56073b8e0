//! HTTP-backed meeting repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::client::MarketplaceClient;
use crate::error::MeetingError;
use crate::meeting::{
    MeetingFilter, MeetingRepository, MeetingSubject, ProposalDraft, SessionCredentials,
};
use crate::models::{Meeting, MeetingType, Page, Role};

/// Meeting store reached over the marketplace REST API, acting as the
/// logged-in user.
pub struct HttpMeetingRepository {
    client: MarketplaceClient,
    role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProposeBody<'a> {
    meeting_type: MeetingType,
    #[serde(skip_serializing_if = "Option::is_none")]
    contract_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    freelancer_id: Option<&'a str>,
    scheduled_at: DateTime<Utc>,
    duration_minutes: u32,
    agenda: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MeetingAction<'a> {
    meeting_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proposed_time: Option<DateTime<Utc>>,
}

impl<'a> MeetingAction<'a> {
    fn id(meeting_id: &'a str) -> Self {
        Self {
            meeting_id,
            reason: None,
            proposed_time: None,
        }
    }

    fn reason(meeting_id: &'a str, reason: Option<&'a str>) -> Self {
        Self {
            reason,
            ..Self::id(meeting_id)
        }
    }

    fn time(meeting_id: &'a str, proposed_time: DateTime<Utc>) -> Self {
        Self {
            proposed_time: Some(proposed_time),
            ..Self::id(meeting_id)
        }
    }
}

fn propose_body<'a>(role: Role, subject: &'a MeetingSubject, draft: &'a ProposalDraft) -> ProposeBody<'a> {
    let mut body = ProposeBody {
        meeting_type: MeetingType::PostContract,
        contract_id: None,
        client_id: None,
        freelancer_id: None,
        scheduled_at: draft.scheduled_at,
        duration_minutes: draft.duration_minutes,
        agenda: &draft.agenda,
    };
    match subject {
        MeetingSubject::Contract(id) => body.contract_id = Some(id),
        MeetingSubject::PreContract { counterparty_id } => {
            body.meeting_type = MeetingType::PreContract;
            match role.counterpart() {
                Role::Client => body.client_id = Some(counterparty_id),
                Role::Freelancer => body.freelancer_id = Some(counterparty_id),
            }
        }
    }
    body
}

/// Join reuses the generic taxonomy with two narrower kinds.
fn join_error(e: MeetingError) -> MeetingError {
    match e {
        MeetingError::Conflict(msg) => MeetingError::NotJoinable(msg),
        MeetingError::Authorization(msg) => MeetingError::Forbidden(msg),
        other => other,
    }
}

impl HttpMeetingRepository {
    pub fn new(client: MarketplaceClient, role: Role) -> Self {
        Self { client, role }
    }

    async fn act(&self, path: &str, action: MeetingAction<'_>) -> Result<Meeting, MeetingError> {
        tracing::info!("{} meeting {}", path, action.meeting_id);
        self.client.post(path, &action).await
    }
}

#[async_trait]
impl MeetingRepository for HttpMeetingRepository {
    async fn list_meetings(&self, filter: &MeetingFilter) -> Result<Page<Meeting>, MeetingError> {
        self.client.get("/meetings", filter).await
    }

    async fn propose_meeting(
        &self,
        subject: &MeetingSubject,
        draft: &ProposalDraft,
    ) -> Result<Meeting, MeetingError> {
        let body = propose_body(self.role, subject, draft);
        tracing::info!("Proposing {:?} meeting at {}", body.meeting_type, draft.scheduled_at);
        self.client.post("/meetings", &body).await
    }

    async fn accept_meeting(&self, meeting_id: &str) -> Result<Meeting, MeetingError> {
        self.act("/meetings/accept", MeetingAction::id(meeting_id))
            .await
    }

    async fn reject_meeting(
        &self,
        meeting_id: &str,
        reason: &str,
    ) -> Result<Meeting, MeetingError> {
        self.act("/meetings/reject", MeetingAction::reason(meeting_id, Some(reason)))
            .await
    }

    async fn request_reschedule(
        &self,
        meeting_id: &str,
        proposed_time: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError> {
        self.act("/meetings/reschedule", MeetingAction::time(meeting_id, proposed_time))
            .await
    }

    async fn approve_reschedule(&self, meeting_id: &str) -> Result<Meeting, MeetingError> {
        self.act("/meetings/reschedule/approve", MeetingAction::id(meeting_id))
            .await
    }

    async fn decline_reschedule(
        &self,
        meeting_id: &str,
        reason: &str,
    ) -> Result<Meeting, MeetingError> {
        self.act(
            "/meetings/reschedule/decline",
            MeetingAction::reason(meeting_id, Some(reason)),
        )
        .await
    }

    async fn counter_reschedule(
        &self,
        meeting_id: &str,
        proposed_time: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError> {
        self.act(
            "/meetings/reschedule/counter",
            MeetingAction::time(meeting_id, proposed_time),
        )
        .await
    }

    async fn cancel_meeting(
        &self,
        meeting_id: &str,
        reason: Option<&str>,
    ) -> Result<Meeting, MeetingError> {
        self.act("/meetings/cancel", MeetingAction::reason(meeting_id, reason))
            .await
    }

    async fn join_meeting(&self, meeting_id: &str) -> Result<SessionCredentials, MeetingError> {
        tracing::info!("Requesting session credentials for meeting {}", meeting_id);
        self.client
            .post("/meetings/join", &MeetingAction::id(meeting_id))
            .await
            .map_err(join_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::at;

    fn draft() -> ProposalDraft {
        ProposalDraft {
            scheduled_at: at(2025, 3, 1, 10, 0, 0),
            duration_minutes: 30,
            agenda: "Intro call".into(),
        }
    }

    #[test]
    fn test_contract_propose_body() {
        let subject = MeetingSubject::Contract("c-1".into());
        let d = draft();
        let body = serde_json::to_value(propose_body(Role::Client, &subject, &d)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "meetingType": "post-contract",
                "contractId": "c-1",
                "scheduledAt": "2025-03-01T10:00:00Z",
                "durationMinutes": 30,
                "agenda": "Intro call"
            })
        );
    }

    #[test]
    fn test_pre_contract_names_counterparty_by_role() {
        let subject = MeetingSubject::PreContract {
            counterparty_id: "f-2".into(),
        };
        let d = draft();
        let body = serde_json::to_value(propose_body(Role::Client, &subject, &d)).unwrap();
        assert_eq!(body["meetingType"], "pre-contract");
        assert_eq!(body["freelancerId"], "f-2");
        assert!(body.get("clientId").is_none());

        let body = serde_json::to_value(propose_body(Role::Freelancer, &subject, &d)).unwrap();
        assert_eq!(body["clientId"], "f-2");
    }

    #[test]
    fn test_action_bodies() {
        let body = serde_json::to_value(MeetingAction::id("m-1")).unwrap();
        assert_eq!(body, serde_json::json!({"meetingId": "m-1"}));

        let body = serde_json::to_value(MeetingAction::reason("m-1", None)).unwrap();
        assert_eq!(body, serde_json::json!({"meetingId": "m-1"}));

        let body =
            serde_json::to_value(MeetingAction::time("m-1", at(2025, 3, 2, 9, 30, 0))).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"meetingId": "m-1", "proposedTime": "2025-03-02T09:30:00Z"})
        );
    }

    #[test]
    fn test_join_error_mapping() {
        assert_eq!(
            join_error(MeetingError::Conflict("not live".into())),
            MeetingError::NotJoinable("not live".into())
        );
        assert_eq!(
            join_error(MeetingError::Authorization("nope".into())),
            MeetingError::Forbidden("nope".into())
        );
        assert_eq!(
            join_error(MeetingError::NotFound("m".into())),
            MeetingError::NotFound("m".into())
        );
    }
}
