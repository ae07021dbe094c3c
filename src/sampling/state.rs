//! Request status state machine
//!
//! ```text
//! pending --Reject-->  rejected
//! pending --Approve--> approved --Complete--> completed
//!                               --Fail------> error
//! ```
//!
//! Terminal states never transition again; re-submission creates a new request.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Result, SamplingError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Completed,
    Rejected,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Error)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Approve,
    Reject,
    Complete,
    Fail,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Complete => "complete",
            Self::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// Next status for `event`, or `InvalidTransition`
pub fn transition(id: &str, from: RequestStatus, event: StatusEvent) -> Result<RequestStatus> {
    use RequestStatus::*;
    use StatusEvent::*;

    match (from, event) {
        (Pending, Reject) => Ok(Rejected),
        (Pending, Approve) => Ok(Approved),
        (Approved, Complete) => Ok(Completed),
        (Approved, Fail) => Ok(Error),
        _ => Err(SamplingError::InvalidTransition {
            id: id.to_string(),
            from: from.to_string(),
            event: event.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [RequestStatus; 5] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Completed,
        RequestStatus::Rejected,
        RequestStatus::Error,
    ];
    const ALL_EVENTS: [StatusEvent; 4] = [
        StatusEvent::Approve,
        StatusEvent::Reject,
        StatusEvent::Complete,
        StatusEvent::Fail,
    ];

    #[test]
    fn test_valid_transitions() {
        assert_eq!(
            transition("r", RequestStatus::Pending, StatusEvent::Approve).unwrap(),
            RequestStatus::Approved
        );
        assert_eq!(
            transition("r", RequestStatus::Pending, StatusEvent::Reject).unwrap(),
            RequestStatus::Rejected
        );
        assert_eq!(
            transition("r", RequestStatus::Approved, StatusEvent::Complete).unwrap(),
            RequestStatus::Completed
        );
        assert_eq!(
            transition("r", RequestStatus::Approved, StatusEvent::Fail).unwrap(),
            RequestStatus::Error
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        for status in ALL_STATUSES.iter().filter(|s| s.is_terminal()) {
            for event in ALL_EVENTS {
                assert!(transition("r", *status, event).is_err());
            }
        }
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = transition("abc", RequestStatus::Approved, StatusEvent::Reject).unwrap_err();
        assert!(matches!(err, SamplingError::InvalidTransition { .. }));
        let text = err.to_string();
        assert!(text.contains("abc"));
        assert!(text.contains("approved"));
        assert!(text.contains("reject"));
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::Completed).unwrap(),
            "\"completed\""
        );
        let parsed: RequestStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(parsed, RequestStatus::Rejected);
    }
}
