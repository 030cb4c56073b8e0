//! Two-phase join of a live meeting.
//!
//! Phase 1 asks the marketplace for session credentials; phase 2 hands them
//! to the media transport and waits for its acknowledgment. Credentials may
//! be single-use, so a phase 2 failure is reported as `TransportFailed` and
//! phase 1 is never repeated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::repository::{MeetingRepository, SessionCredentials};
use crate::error::MeetingError;

/// Media provider that turns credentials into a live session.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    type Session: Send;

    /// Resolve only once the provider has acknowledged the session.
    async fn attach(&self, credentials: &SessionCredentials) -> anyhow::Result<Self::Session>;
}

/// Outcome of a successful join.
#[derive(Debug)]
pub struct JoinedSession<S> {
    pub credentials: SessionCredentials,
    pub session: S,
}

pub struct SessionJoinCoordinator<R: ?Sized, T> {
    repo: Arc<R>,
    transport: T,
    timeout: Duration,
}

impl<R, T> SessionJoinCoordinator<R, T>
where
    R: MeetingRepository + ?Sized,
    T: MediaTransport,
{
    pub fn new(repo: Arc<R>, transport: T, timeout: Duration) -> Self {
        Self {
            repo,
            transport,
            timeout,
        }
    }

    /// Authorize, then attach. Each phase is bounded by the configured
    /// timeout and aborted as soon as `cancel` fires.
    pub async fn join(
        &self,
        meeting_id: &str,
        cancel: &CancellationToken,
    ) -> Result<JoinedSession<T::Session>, MeetingError> {
        tracing::info!("Requesting session credentials for meeting {}", meeting_id);
        let credentials = tokio::select! {
            _ = cancel.cancelled() => return Err(MeetingError::Cancelled),
            res = tokio::time::timeout(self.timeout, self.repo.join_meeting(meeting_id)) => {
                match res {
                    Ok(creds) => creds?,
                    Err(_) => return Err(MeetingError::Timeout(self.timeout.as_secs())),
                }
            }
        };
        tracing::debug!(
            "Credentials issued for channel {} (signaling {})",
            credentials.channel,
            credentials.signaling_url
        );

        let attached = tokio::select! {
            _ = cancel.cancelled() => return Err(MeetingError::Cancelled),
            res = tokio::time::timeout(self.timeout, self.transport.attach(&credentials)) => res,
        };
        let session = match attached {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                tracing::warn!("Media transport failed for meeting {}: {:#}", meeting_id, e);
                return Err(MeetingError::TransportFailed(format!("{:#}", e)));
            }
            Err(_) => {
                tracing::warn!("Media transport did not acknowledge meeting {}", meeting_id);
                return Err(MeetingError::TransportFailed(format!(
                    "no acknowledgment within {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        tracing::info!("Joined meeting {}", meeting_id);
        Ok(JoinedSession {
            credentials,
            session,
        })
    }
}
