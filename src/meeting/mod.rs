//! Meeting negotiation and scheduling
//!
//! Pure lifecycle rules (`state_machine`, `expiry`), read-side views
//! (`buckets`, `calendar`), the remote store seam (`repository`) and the two
//! orchestrators built on top of them (`desk`, `join`).

pub mod buckets;
pub mod calendar;
pub mod desk;
pub mod expiry;
pub mod join;
#[cfg(test)]
pub mod memory;
pub mod repository;
pub mod state_machine;

pub use buckets::{classify, BucketKind, Buckets};
pub use calendar::{date_key, CalendarIndex, DayEntry, MonthCursor};
pub use desk::{Dashboard, MeetingDesk};
pub use expiry::{is_expired, time_until_expiry};
pub use join::{JoinedSession, MediaTransport, SessionJoinCoordinator};
pub use repository::{MeetingFilter, MeetingRepository, MeetingSubject, SessionCredentials};
pub use state_machine::{
    advance, authorize_join, Actor, CancelPolicy, MeetingStateMachine, ProposalDraft, Transition,
};
