//! Response envelope and paging shapes shared by every marketplace endpoint

use serde::{Deserialize, Serialize};

use crate::error::MeetingError;

/// `{success, message?, data?}` wrapper around every API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the payload, branching on `success` rather than the HTTP code.
    ///
    /// `status` is only used as a hint to pick the error kind.
    pub fn into_result(self, status: u16) -> Result<T, MeetingError> {
        let message = self
            .message
            .unwrap_or_else(|| "request failed without a message".to_string());
        if !self.success {
            return Err(MeetingError::from_status(status, message));
        }
        self.data
            .ok_or_else(|| MeetingError::Api(format!("response carried no data ({})", message)))
    }
}

/// One page of a paginated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub pages: u32,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.page >= self.pages
    }
}
