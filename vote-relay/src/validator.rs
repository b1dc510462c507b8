use thiserror::Error;

use crate::catalog::{Catalog, Poll, PollOption};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown pollId: {0}")]
    UnknownPoll(String),

    #[error("Unknown optionId: {option_id} for poll {poll_id}")]
    UnknownOption { poll_id: String, option_id: String },
}

/// Resolves a vote target against the catalog. Pure lookup, no I/O.
pub fn validate<'a>(
    catalog: &'a Catalog,
    poll_id: &str,
    option_id: &str,
) -> Result<(&'a Poll, &'a PollOption), ValidationError> {
    let poll = catalog
        .poll(poll_id)
        .ok_or_else(|| ValidationError::UnknownPoll(poll_id.to_string()))?;

    let option = poll
        .option(option_id)
        .ok_or_else(|| ValidationError::UnknownOption {
            poll_id: poll_id.to_string(),
            option_id: option_id.to_string(),
        })?;

    Ok((poll, option))
}
