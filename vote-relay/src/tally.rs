use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;

use crate::{
    catalog::Catalog,
    store::{StoreError, StoredVote, VoteFilter, VoteStore},
};

/// Upper bound on records read per poll. Votes past it are not counted.
pub const DEFAULT_FIND_LIMIT: usize = 1000;

/// Tally key for stored votes that carry no option id.
pub const MISSING_OPTION: &str = "(missing)";

/// Vote counts keyed by option id. Derived on demand, never stored.
pub type Tally = BTreeMap<String, u64>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollTally {
    pub poll_id: String,
    pub tally: Tally,
}

pub struct TallyEngine {
    store: Arc<dyn VoteStore>,
    catalog: Catalog,
    find_limit: usize,
}

impl TallyEngine {
    pub fn new(store: Arc<dyn VoteStore>, catalog: Catalog, find_limit: usize) -> Self {
        Self {
            store,
            catalog,
            find_limit,
        }
    }

    pub async fn compute_tally(&self, poll_id: &str) -> Result<Tally, StoreError> {
        let votes = self
            .store
            .find(&VoteFilter::poll(poll_id), self.find_limit)
            .await?;
        Ok(fold_records(&votes))
    }

    /// Tallies every catalog poll one after another, in catalog order.
    pub async fn compute_all_tallies(&self) -> Result<Vec<PollTally>, StoreError> {
        let mut tallies = Vec::with_capacity(self.catalog.len());
        for poll_id in self.catalog.poll_ids() {
            let tally = self.compute_tally(poll_id).await?;
            tallies.push(PollTally {
                poll_id: poll_id.to_string(),
                tally,
            });
        }
        Ok(tallies)
    }
}

/// Counts votes by option id as stored; option ids are not checked
/// against the catalog, so orphaned ids show up in the result. Every vote
/// is counted once, those without an option id under [`MISSING_OPTION`].
pub fn fold_records(votes: &[StoredVote]) -> Tally {
    let mut tally = Tally::new();
    for vote in votes {
        let key = vote.option_id.as_deref().unwrap_or(MISSING_OPTION);
        *tally.entry(key.to_string()).or_default() += 1;
    }
    tally
}
