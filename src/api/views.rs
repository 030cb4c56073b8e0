//! Terminal rendering of meetings, buckets and calendar months

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::meeting::{
    date_key, is_expired, time_until_expiry, BucketKind, Buckets, CalendarIndex, Dashboard,
    MonthCursor,
};
use crate::models::{Meeting, MeetingStatus, MeetingType, Role};

/// Accepts RFC 3339, or `YYYY-MM-DD HH:MM` read in the viewer's offset.
pub fn parse_time(input: &str, tz: &FixedOffset) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
        .with_context(|| format!("Unrecognized time '{}' (use YYYY-MM-DD HH:MM)", input))?;
    let local = tz
        .from_local_datetime(&naive)
        .single()
        .with_context(|| format!("Time '{}' is out of range at offset {}", input, tz))?;
    Ok(local.with_timezone(&Utc))
}

fn local(at: DateTime<Utc>, tz: &FixedOffset) -> String {
    at.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}

fn type_label(kind: MeetingType) -> &'static str {
    match kind {
        MeetingType::PreContract => "pre-contract",
        MeetingType::PostContract => "contract",
    }
}

fn remaining(d: Duration) -> String {
    if d.num_hours() >= 24 {
        format!("{}d {}h", d.num_days(), d.num_hours() % 24)
    } else if d.num_minutes() >= 60 {
        format!("{}h {}m", d.num_hours(), d.num_minutes() % 60)
    } else {
        format!("{}m", d.num_minutes().max(1))
    }
}

/// Status label as the viewer should read it at `now`.
pub fn status_label(meeting: &Meeting, now: DateTime<Utc>) -> String {
    if is_expired(meeting, now) {
        return format!("{} (expired)", meeting.status);
    }
    match time_until_expiry(meeting, now) {
        Some(left) => format!("{} ({} to respond)", meeting.status, remaining(left)),
        None => meeting.status.to_string(),
    }
}

/// Multi-line summary of one meeting, seen by `role`.
pub fn format_meeting(meeting: &Meeting, role: Role, tz: &FixedOffset, now: DateTime<Utc>) -> String {
    let other = meeting.party(role.counterpart());
    let mut out = format!(
        "{}-{}  {}  {}min  with {}\n  ID: {}\n  Status: {}",
        local(meeting.scheduled_at, tz),
        meeting.ends_at().with_timezone(tz).format("%H:%M"),
        type_label(meeting.meeting_type),
        meeting.duration_minutes,
        other.name,
        meeting.meeting_id,
        status_label(meeting, now),
    );
    if !meeting.agenda.is_empty() {
        out.push_str(&format!("\n  Agenda: {}", meeting.agenda));
    }
    if meeting.status == MeetingStatus::RescheduleRequested {
        if let (Some(by), Some(time)) = (meeting.reschedule_requested_by, meeting.proposed_reschedule_time) {
            let who = if by == role { "you" } else { other.name.as_str() };
            out.push_str(&format!("\n  Reschedule to {} requested by {}", local(time, tz), who));
        }
    }
    let reason = meeting
        .rejection_reason
        .as_deref()
        .or(meeting.decline_reason.as_deref())
        .or(meeting.cancellation_reason.as_deref());
    if let Some(reason) = reason {
        out.push_str(&format!("\n  Reason: {}", reason));
    }
    out
}

pub fn print_bucket(kind: BucketKind, buckets: &Buckets, role: Role, tz: &FixedOffset, now: DateTime<Utc>) {
    let meetings = buckets.get(kind);
    println!("\n{} ({}):", kind, meetings.len());
    println!("{:-<60}", "");
    if meetings.is_empty() {
        println!("  (none)");
        return;
    }
    for meeting in meetings {
        println!("{}", format_meeting(meeting, role, tz, now));
        println!();
    }
}

pub fn print_dashboard(dashboard: &Dashboard, role: Role, tz: &FixedOffset) {
    let buckets = &dashboard.buckets;
    let now = dashboard.fetched_at;
    println!("\nMeetings ({} view, as of {}):", role, local(now, tz));
    println!("{:-<60}", "");
    for (kind, count) in buckets.counts() {
        println!("  {:<12} {}", kind.as_str(), count);
    }

    let action = buckets.needs_my_action();
    if !action.is_empty() {
        println!("\nNeeds your response:");
        for meeting in action {
            println!("{}", format_meeting(meeting, role, tz, now));
        }
    }
    let waiting = buckets.awaiting_counterparty();
    if !waiting.is_empty() {
        println!("\nWaiting on the other party:");
        for meeting in waiting {
            println!("{}", format_meeting(meeting, role, tz, now));
        }
    }
    print_bucket(BucketKind::Today, buckets, role, tz, now);
}

/// Heading plus every meeting on one `YYYY-MM-DD` day.
pub fn format_day(
    index: &CalendarIndex<FixedOffset>,
    day: &str,
    role: Role,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let date = NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d")
        .with_context(|| format!("Expected YYYY-MM-DD, got '{}'", day))?;
    let key = date_key(date);
    let mut lines = vec![format!(
        "\n{} ({}): {} meeting(s)",
        key,
        date.format("%A"),
        index.count_on(date)
    )];
    match index.on_key(&key) {
        Some(entry) => lines.extend(
            entry
                .meetings
                .iter()
                .map(|m| format_meeting(m, role, index.timezone(), now)),
        ),
        None => lines.push("  (no meetings)".to_string()),
    }
    Ok(lines)
}

/// One line per day in `month` that has meetings.
pub fn format_month(index: &CalendarIndex<FixedOffset>, month: MonthCursor) -> Vec<String> {
    let tz = *index.timezone();
    index
        .month(month)
        .into_iter()
        .map(|(date, entry)| {
            let times: Vec<String> = entry
                .meetings
                .iter()
                .map(|m| m.scheduled_at.with_timezone(&tz).format("%H:%M").to_string())
                .collect();
            format!("{}  {:>2}  {}", date.format("%a %d"), entry.count(), times.join(" "))
        })
        .collect()
}

pub fn print_month(index: &CalendarIndex<FixedOffset>, month: MonthCursor) {
    println!("\n{}:", month);
    println!("{:-<60}", "");
    let lines = format_month(index, month);
    if lines.is_empty() {
        println!("  (no meetings)");
    }
    for line in lines {
        println!("{}", line);
    }
}
