//! Response-deadline expiry.
//!
//! Expiry is a read-time fact: a meeting still `proposed` or
//! `reschedule_requested` after its response deadline is treated as expired
//! (terminal for scheduling) without any stored status change.

use chrono::{DateTime, Duration, Utc};

use crate::models::Meeting;

/// True iff the meeting awaits a response and `now` is past its deadline.
pub fn is_expired(meeting: &Meeting, now: DateTime<Utc>) -> bool {
    meeting.status.is_pending_response() && now > meeting.response_deadline
}

/// Time left to respond, for pending meetings that have not yet expired.
pub fn time_until_expiry(meeting: &Meeting, now: DateTime<Utc>) -> Option<Duration> {
    if !meeting.status.is_pending_response() || is_expired(meeting, now) {
        return None;
    }
    Some(meeting.response_deadline - now)
}
