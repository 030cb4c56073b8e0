//! In-process meeting store with compare-and-set semantics.
//!
//! Mirrors what the marketplace backend guarantees: each mutation reads a
//! snapshot, runs it through the state machine and writes back only if the
//! stored status still matches the snapshot. Used to exercise the
//! repository contract and the dashboard loader without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::expiry::is_expired;
use super::repository::{MeetingFilter, MeetingRepository, MeetingSubject, SessionCredentials};
use super::state_machine::{
    advance, authorize_join, Actor, MeetingStateMachine, ProposalDraft, Transition,
};
use crate::error::MeetingError;
use crate::models::{Meeting, MeetingStatus, Page, Party, Role};

#[derive(Default)]
struct StoreState {
    meetings: HashMap<String, Meeting>,
    contracts: HashMap<String, (Party, Party)>,
    users: HashMap<String, (Party, Role)>,
    now: Option<DateTime<Utc>>,
}

/// Shared store; hand out one `MemorySession` per acting user.
#[derive(Clone, Default)]
pub struct MemoryMeetingStore {
    state: Arc<Mutex<StoreState>>,
    machine: MeetingStateMachine,
    list_calls: Arc<AtomicUsize>,
    join_calls: Arc<AtomicUsize>,
}

impl MemoryMeetingStore {
    pub fn new(now: DateTime<Utc>) -> Self {
        let store = Self::default();
        store.lock().now = Some(now);
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A poisoned lock only means another test thread panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock().now = Some(now);
    }

    pub fn add_user(&self, party: Party, role: Role) {
        self.lock().users.insert(party.id.clone(), (party, role));
    }

    pub fn add_contract(&self, contract_id: &str, client: Party, freelancer: Party) {
        self.lock()
            .contracts
            .insert(contract_id.to_string(), (client, freelancer));
    }

    /// Seed a meeting as-is, bypassing the state machine.
    pub fn insert(&self, meeting: Meeting) {
        self.lock()
            .meetings
            .insert(meeting.meeting_id.clone(), meeting);
    }

    pub fn get(&self, meeting_id: &str) -> Option<Meeting> {
        self.lock().meetings.get(meeting_id).cloned()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn join_calls(&self) -> usize {
        self.join_calls.load(Ordering::SeqCst)
    }

    pub fn session(&self, actor: Actor) -> MemorySession {
        MemorySession {
            store: self.clone(),
            actor,
        }
    }

    /// Write `next` only if the stored status still equals `expected`.
    fn compare_and_set(
        state: &mut StoreState,
        expected: MeetingStatus,
        next: Meeting,
    ) -> Result<Meeting, MeetingError> {
        let current = state
            .meetings
            .get_mut(&next.meeting_id)
            .ok_or_else(|| MeetingError::NotFound(next.meeting_id.clone()))?;
        if current.status != expected {
            return Err(MeetingError::Conflict(format!(
                "meeting {} changed to {} concurrently",
                next.meeting_id, current.status
            )));
        }
        *current = next.clone();
        Ok(next)
    }

    /// Apply time-driven transitions to every stored meeting.
    fn tick(state: &mut StoreState) -> DateTime<Utc> {
        let now = state.now.unwrap_or_else(Utc::now);
        for meeting in state.meetings.values_mut() {
            meeting.status = advance(meeting, now);
        }
        now
    }

    fn transition(
        &self,
        actor: &Actor,
        meeting_id: &str,
        t: Transition,
    ) -> Result<Meeting, MeetingError> {
        let mut state = self.lock();
        let now = Self::tick(&mut state);
        let snapshot = state
            .meetings
            .get(meeting_id)
            .cloned()
            .ok_or_else(|| MeetingError::NotFound(meeting_id.to_string()))?;
        let next = self.machine.apply(&snapshot, actor, &t, now)?;
        Self::compare_and_set(&mut state, snapshot.status, next)
    }
}

/// A store handle acting as one user.
pub struct MemorySession {
    store: MemoryMeetingStore,
    actor: Actor,
}

#[async_trait]
impl MeetingRepository for MemorySession {
    async fn list_meetings(&self, filter: &MeetingFilter) -> Result<Page<Meeting>, MeetingError> {
        self.store.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.store.lock();
        let now = MemoryMeetingStore::tick(&mut state);

        let mut items: Vec<Meeting> = state
            .meetings
            .values()
            .filter(|m| m.role_of(&self.actor.user_id).is_some())
            .filter(|m| filter.status.map_or(true, |s| m.status == s))
            .filter(|m| filter.is_expired.map_or(true, |e| is_expired(m, now) == e))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.meeting_id.cmp(&b.meeting_id))
        });

        let limit = filter.limit.max(1) as usize;
        let pages = items.len().div_ceil(limit) as u32;
        let page = filter.page.max(1);
        let items = items
            .into_iter()
            .skip((page as usize - 1) * limit)
            .take(limit)
            .collect();
        Ok(Page { items, page, pages })
    }

    async fn propose_meeting(
        &self,
        subject: &MeetingSubject,
        draft: &ProposalDraft,
    ) -> Result<Meeting, MeetingError> {
        let mut state = self.store.lock();
        let now = MemoryMeetingStore::tick(&mut state);

        let (client, freelancer, contract_id) = match subject {
            MeetingSubject::Contract(id) => {
                let (client, freelancer) = state
                    .contracts
                    .get(id)
                    .cloned()
                    .ok_or_else(|| MeetingError::NotFound(format!("contract {}", id)))?;
                (client, freelancer, Some(id.clone()))
            }
            MeetingSubject::PreContract { counterparty_id } => {
                let (me, _) = state
                    .users
                    .get(&self.actor.user_id)
                    .cloned()
                    .ok_or_else(|| MeetingError::NotFound(format!("user {}", self.actor.user_id)))?;
                let (other, other_role) = state
                    .users
                    .get(counterparty_id)
                    .cloned()
                    .ok_or_else(|| MeetingError::NotFound(format!("user {}", counterparty_id)))?;
                if other_role == self.actor.role {
                    return Err(MeetingError::Validation(format!(
                        "counterparty {} is also a {}",
                        counterparty_id, other_role
                    )));
                }
                match self.actor.role {
                    Role::Client => (me, other, None),
                    Role::Freelancer => (other, me, None),
                }
            }
        };

        let meeting = self.store.machine.propose(
            uuid::Uuid::new_v4().to_string(),
            &self.actor,
            client,
            freelancer,
            contract_id,
            draft.clone(),
            now,
        )?;
        state
            .meetings
            .insert(meeting.meeting_id.clone(), meeting.clone());
        Ok(meeting)
    }

    async fn accept_meeting(&self, meeting_id: &str) -> Result<Meeting, MeetingError> {
        self.store
            .transition(&self.actor, meeting_id, Transition::Accept)
    }

    async fn reject_meeting(
        &self,
        meeting_id: &str,
        reason: &str,
    ) -> Result<Meeting, MeetingError> {
        self.store.transition(
            &self.actor,
            meeting_id,
            Transition::Reject {
                reason: reason.to_string(),
            },
        )
    }

    async fn request_reschedule(
        &self,
        meeting_id: &str,
        proposed_time: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError> {
        self.store.transition(
            &self.actor,
            meeting_id,
            Transition::RequestReschedule { proposed_time },
        )
    }

    async fn approve_reschedule(&self, meeting_id: &str) -> Result<Meeting, MeetingError> {
        self.store
            .transition(&self.actor, meeting_id, Transition::ApproveReschedule)
    }

    async fn decline_reschedule(
        &self,
        meeting_id: &str,
        reason: &str,
    ) -> Result<Meeting, MeetingError> {
        self.store.transition(
            &self.actor,
            meeting_id,
            Transition::DeclineReschedule {
                reason: reason.to_string(),
            },
        )
    }

    async fn counter_reschedule(
        &self,
        meeting_id: &str,
        proposed_time: DateTime<Utc>,
    ) -> Result<Meeting, MeetingError> {
        self.store.transition(
            &self.actor,
            meeting_id,
            Transition::CounterReschedule { proposed_time },
        )
    }

    async fn cancel_meeting(
        &self,
        meeting_id: &str,
        reason: Option<&str>,
    ) -> Result<Meeting, MeetingError> {
        self.store.transition(
            &self.actor,
            meeting_id,
            Transition::Cancel {
                reason: reason.map(String::from),
            },
        )
    }

    async fn join_meeting(&self, meeting_id: &str) -> Result<SessionCredentials, MeetingError> {
        self.store.join_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.store.lock();
        let now = MemoryMeetingStore::tick(&mut state);
        let meeting = state
            .meetings
            .get(meeting_id)
            .ok_or_else(|| MeetingError::NotFound(meeting_id.to_string()))?;
        authorize_join(meeting, &self.actor.user_id)?;

        Ok(SessionCredentials {
            meeting_id: meeting_id.to_string(),
            channel: format!("meeting-{}", meeting_id),
            token: uuid::Uuid::new_v4().to_string(),
            signaling_url: "wss://media.invalid/signal".to_string(),
            uid: Some(self.actor.user_id.clone()),
            expires_at: Some(meeting.ends_at().max(now)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::*;
    use tokio_test::{assert_err, assert_ok};

    fn store() -> MemoryMeetingStore {
        let store = MemoryMeetingStore::new(at(2025, 3, 1, 8, 0, 0));
        let m = proposed("m-1", at(2025, 3, 1, 10, 0, 0));
        store.add_user(m.client.clone(), Role::Client);
        store.add_user(m.freelancer.clone(), Role::Freelancer);
        store.add_contract("contract-1", m.client.clone(), m.freelancer.clone());
        store.insert(m);
        store
    }

    fn client(store: &MemoryMeetingStore) -> MemorySession {
        store.session(Actor::new(CLIENT_ID, Role::Client))
    }

    fn freelancer(store: &MemoryMeetingStore) -> MemorySession {
        store.session(Actor::new(FREELANCER_ID, Role::Freelancer))
    }

    #[tokio::test]
    async fn test_second_accept_conflicts_and_leaves_status() {
        let store = store();
        let f = freelancer(&store);

        let accepted = assert_ok!(f.accept_meeting("m-1").await);
        assert_eq!(accepted.status, MeetingStatus::Accepted);

        let err = assert_err!(f.accept_meeting("m-1").await);
        assert!(matches!(err, MeetingError::Conflict(_)));
        assert_eq!(store.get("m-1").unwrap().status, MeetingStatus::Accepted);
    }

    #[tokio::test]
    async fn test_rejected_transition_does_not_mutate() {
        let store = store();
        let before = store.get("m-1").unwrap();

        // Proposer may not accept their own proposal
        assert_err!(client(&store).accept_meeting("m-1").await);
        // Missing reason
        assert_err!(freelancer(&store).reject_meeting("m-1", "").await);
        // Wrong source status
        assert_err!(freelancer(&store).approve_reschedule("m-1").await);

        assert_eq!(store.get("m-1").unwrap(), before);
    }

    #[tokio::test]
    async fn test_reschedule_round_trip() {
        let store = store();
        assert_ok!(freelancer(&store).accept_meeting("m-1").await);

        let requested = assert_ok!(
            client(&store)
                .request_reschedule("m-1", at(2025, 4, 1, 9, 0, 0))
                .await
        );
        assert_eq!(requested.reschedule_requested_by, Some(Role::Client));

        let approved = assert_ok!(freelancer(&store).approve_reschedule("m-1").await);
        assert_eq!(approved.status, MeetingStatus::Accepted);
        assert_eq!(approved.scheduled_at, at(2025, 4, 1, 9, 0, 0));
        assert!(approved.reschedule_requested_by.is_none());
        assert!(approved.proposed_reschedule_time.is_none());
    }

    #[tokio::test]
    async fn test_time_drives_ongoing_and_completed() {
        let store = store();
        assert_ok!(freelancer(&store).accept_meeting("m-1").await);

        store.set_now(at(2025, 3, 1, 10, 5, 0));
        let page = assert_ok!(
            client(&store)
                .list_meetings(&MeetingFilter::with_status(10, MeetingStatus::Ongoing))
                .await
        );
        assert_eq!(page.items.len(), 1);

        store.set_now(at(2025, 3, 1, 11, 0, 0));
        assert_eq!(store.get("m-1").unwrap().status, MeetingStatus::Ongoing);
        assert_err!(client(&store).join_meeting("m-1").await);
        assert_eq!(store.get("m-1").unwrap().status, MeetingStatus::Completed);
    }

    #[tokio::test]
    async fn test_join_rules() {
        let store = store();
        let err = assert_err!(client(&store).join_meeting("m-1").await);
        assert!(matches!(err, MeetingError::NotJoinable(_)));

        assert_ok!(freelancer(&store).accept_meeting("m-1").await);
        store.set_now(at(2025, 3, 1, 10, 1, 0));

        let outsider = store.session(Actor::new("stranger", Role::Client));
        let err = assert_err!(outsider.join_meeting("m-1").await);
        assert!(matches!(err, MeetingError::Forbidden(_)));

        let creds = assert_ok!(client(&store).join_meeting("m-1").await);
        assert_eq!(creds.meeting_id, "m-1");
        assert_eq!(store.join_calls(), 3);
    }

    #[tokio::test]
    async fn test_propose_and_paging() {
        let store = store();
        let draft = |h| ProposalDraft {
            scheduled_at: at(2025, 3, 2, h, 0, 0),
            duration_minutes: 30,
            agenda: "Follow-up".to_string(),
        };
        let f = freelancer(&store);
        for h in [9, 10, 11] {
            let m = assert_ok!(
                f.propose_meeting(&MeetingSubject::Contract("contract-1".into()), &draft(h))
                    .await
            );
            assert_eq!(m.is_proposed_by_client, Some(false));
        }
        let pre = assert_ok!(
            f.propose_meeting(
                &MeetingSubject::PreContract {
                    counterparty_id: CLIENT_ID.into()
                },
                &draft(12)
            )
            .await
        );
        assert!(pre.contract_id.is_none());

        let first = assert_ok!(f.list_meetings(&MeetingFilter::all(2)).await);
        assert_eq!(first.pages, 3);
        assert_eq!(first.items.len(), 2);
        let all = assert_ok!(super::super::repository::list_all(&f, &MeetingFilter::all(2)).await);
        assert_eq!(all.len(), 5);

        let err = assert_err!(
            f.propose_meeting(&MeetingSubject::Contract("nope".into()), &draft(9))
                .await
        );
        assert!(matches!(err, MeetingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expired_filter_is_derived() {
        let store = store();
        store.set_now(at(2025, 3, 2, 0, 0, 1));
        let page = assert_ok!(client(&store).list_meetings(&MeetingFilter::expired(10)).await);
        assert_eq!(page.items.len(), 1);
        // Still stored as proposed
        assert_eq!(page.items[0].status, MeetingStatus::Proposed);

        let err = assert_err!(freelancer(&store).accept_meeting("m-1").await);
        assert!(matches!(err, MeetingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cas_detects_stale_snapshot() {
        let store = store();
        let snapshot = store.get("m-1").unwrap();
        assert_ok!(freelancer(&store).accept_meeting("m-1").await);

        let mut stale_next = snapshot.clone();
        stale_next.status = MeetingStatus::Rejected;
        let mut state = store.lock();
        let err = MemoryMeetingStore::compare_and_set(&mut state, snapshot.status, stale_next)
            .unwrap_err();
        assert!(matches!(err, MeetingError::Conflict(_)));
    }
}
