//! Operational views over a meeting set.
//!
//! Each bucket is an independent predicate over status, time and actor
//! fields; a meeting may sit in several buckets at once. Everything is
//! recomputed from scratch on every call.

use chrono::{DateTime, TimeZone, Utc};

use super::expiry::is_expired;
use crate::models::{Meeting, MeetingStatus, Role};

/// Bucket names, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    Today,
    Ongoing,
    Sent,
    Received,
    Rescheduled,
    Completed,
    Expired,
}

impl BucketKind {
    pub const ALL: [BucketKind; 7] = [
        BucketKind::Today,
        BucketKind::Ongoing,
        BucketKind::Sent,
        BucketKind::Received,
        BucketKind::Rescheduled,
        BucketKind::Completed,
        BucketKind::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BucketKind::Today => "today",
            BucketKind::Ongoing => "ongoing",
            BucketKind::Sent => "sent",
            BucketKind::Received => "received",
            BucketKind::Rescheduled => "rescheduled",
            BucketKind::Completed => "completed",
            BucketKind::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl std::fmt::Display for BucketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `scheduled_at` falls on the same local date as `now` in `tz`.
pub fn is_today<Tz: TimeZone>(meeting: &Meeting, now: DateTime<Utc>, tz: &Tz) -> bool {
    meeting.scheduled_at.with_timezone(tz).date_naive() == now.with_timezone(tz).date_naive()
}

/// An outstanding proposal authored by `role`.
pub fn is_sent_by(meeting: &Meeting, role: Role) -> bool {
    meeting.status == MeetingStatus::Proposed && meeting.proposer() == Some(role)
}

/// An outstanding proposal waiting on `role` to answer.
pub fn is_received_by(meeting: &Meeting, role: Role) -> bool {
    meeting.status == MeetingStatus::Proposed
        && meeting.proposer().is_some_and(|proposer| proposer != role)
}

/// All buckets for one caller, computed at one instant.
#[derive(Debug, Clone, Default)]
pub struct Buckets {
    pub role: Option<Role>,
    pub today: Vec<Meeting>,
    pub ongoing: Vec<Meeting>,
    pub sent_requests: Vec<Meeting>,
    pub received_requests: Vec<Meeting>,
    pub reschedule_requests: Vec<Meeting>,
    pub completed: Vec<Meeting>,
    pub expired: Vec<Meeting>,
}

impl Buckets {
    pub fn get(&self, kind: BucketKind) -> &[Meeting] {
        match kind {
            BucketKind::Today => &self.today,
            BucketKind::Ongoing => &self.ongoing,
            BucketKind::Sent => &self.sent_requests,
            BucketKind::Received => &self.received_requests,
            BucketKind::Rescheduled => &self.reschedule_requests,
            BucketKind::Completed => &self.completed,
            BucketKind::Expired => &self.expired,
        }
    }

    pub fn counts(&self) -> Vec<(BucketKind, usize)> {
        BucketKind::ALL
            .into_iter()
            .map(|kind| (kind, self.get(kind).len()))
            .collect()
    }

    /// Reschedule requests the caller has to answer.
    pub fn needs_my_action(&self) -> Vec<&Meeting> {
        let Some(role) = self.role else {
            return Vec::new();
        };
        self.reschedule_requests
            .iter()
            .filter(|m| m.reschedule_requested_by.is_some_and(|by| by != role))
            .collect()
    }

    /// Reschedule requests the caller made and the counterparty has to answer.
    pub fn awaiting_counterparty(&self) -> Vec<&Meeting> {
        let Some(role) = self.role else {
            return Vec::new();
        };
        self.reschedule_requests
            .iter()
            .filter(|m| m.reschedule_requested_by == Some(role))
            .collect()
    }
}

fn collect_sorted(meetings: &[Meeting], predicate: impl Fn(&Meeting) -> bool) -> Vec<Meeting> {
    let mut out: Vec<Meeting> = meetings.iter().filter(|m| predicate(*m)).cloned().collect();
    out.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.meeting_id.cmp(&b.meeting_id))
    });
    out
}

/// Classify `meetings` for a caller acting as `role`.
pub fn classify<Tz: TimeZone>(
    meetings: &[Meeting],
    role: Role,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Buckets {
    let today = collect_sorted(meetings, |m| is_today(m, now, tz));
    let ongoing = collect_sorted(&today, |m| m.status == MeetingStatus::Ongoing);

    Buckets {
        role: Some(role),
        ongoing,
        sent_requests: collect_sorted(meetings, |m| is_sent_by(m, role)),
        received_requests: collect_sorted(meetings, |m| is_received_by(m, role)),
        reschedule_requests: collect_sorted(meetings, |m| {
            m.status == MeetingStatus::RescheduleRequested
        }),
        completed: collect_sorted(meetings, |m| m.status == MeetingStatus::Completed),
        expired: collect_sorted(meetings, |m| is_expired(m, now)),
        today,
    }
}
