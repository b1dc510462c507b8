use thiserror::Error;

use crate::{store::StoreError, validator::ValidationError};

/// Text sent to a voter when the store could not take or count their vote.
pub const RETRYABLE_VOTE_ERROR: &str = "Failed to record vote. Please try again.";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    MalformedMessage(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl RelayError {
    /// The message placed in the `error` frame sent back to the originating
    /// connection. Store details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::MalformedMessage(message) => message.clone(),
            RelayError::Invalid(err) => err.to_string(),
            RelayError::StoreUnavailable(_) => RETRYABLE_VOTE_ERROR.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn store_failures_hide_details_from_clients() {
        let err = RelayError::from(StoreError::Timeout(Duration::from_secs(5)));
        assert!(err.is_retryable());
        assert_eq!(err.client_message(), RETRYABLE_VOTE_ERROR);
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn validation_failures_name_the_offending_id() {
        let err = RelayError::from(ValidationError::UnknownOption {
            poll_id: "p1".into(),
            option_id: "z".into(),
        });
        assert!(!err.is_retryable());
        assert_eq!(err.client_message(), "Unknown optionId: z for poll p1");
    }
}
