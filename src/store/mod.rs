//! Storage traits for polls and the vote ledger.
//!
//! Both backends (Postgres and in-memory) implement every trait here. The
//! service layer only talks to `dyn Storage`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Poll, PollId, VoteRecord, VoterId};
use crate::poll::NewPoll;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of an insert into the vote ledger.
///
/// A duplicate `(poll, voter)` pair is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded<T> {
    Inserted(T),
    Duplicate,
}

/// An accepted vote together with the poll as it stands after the increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedVote {
    pub record: VoteRecord,
    pub poll: Poll,
}

/// A poll after its tallies were recomputed from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub poll: Poll,
    /// Counters as they were stored before the recompute.
    pub previous: Vec<u64>,
}

impl Reconciled {
    pub fn repaired(&self) -> bool {
        self.previous != self.poll.tallies()
    }
}

/// Poll definitions and their running tallies.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn create_poll(&self, poll: NewPoll) -> Result<Poll, StoreError>;

    async fn get_poll(&self, id: PollId) -> Result<Poll, StoreError>;

    /// All polls, most recently created first.
    async fn list_polls(&self) -> Result<Vec<Poll>, StoreError>;

    /// Adds one to `options[index].votes` without a read-modify-write race.
    async fn increment_option(&self, id: PollId, index: usize) -> Result<Poll, StoreError>;
}

/// Append-only record of accepted votes.
#[async_trait]
pub trait VoteLedger: Send + Sync {
    /// Atomic check-and-insert keyed on `(poll_id, voter_id)`.
    ///
    /// The ledger does not know how many options the poll has; only a
    /// negative index is rejected here.
    async fn record_vote(
        &self,
        poll_id: PollId,
        voter_id: &VoterId,
        option_index: i64,
    ) -> Result<Recorded<VoteRecord>, StoreError>;

    /// Per-option counts recomputed from ledger records.
    ///
    /// Records whose index falls outside `option_count` are ignored.
    async fn ledger_tally(&self, poll_id: PollId, option_count: usize)
        -> Result<Vec<u64>, StoreError>;
}

/// A backend holding both stores, able to run the vote gate and the tally
/// increment as a single unit.
#[async_trait]
pub trait Storage: PollStore + VoteLedger {
    /// Inserts the ledger record and increments the matching counter
    /// atomically. On `Duplicate` neither the ledger nor the tally changes.
    async fn accept_vote(
        &self,
        poll_id: PollId,
        voter_id: &VoterId,
        option_index: usize,
    ) -> Result<Recorded<AcceptedVote>, StoreError>;

    /// Recomputes a poll's counters from its ledger records and stores them.
    /// Must not race with `accept_vote` on the same poll.
    async fn reconcile(&self, poll_id: PollId) -> Result<Reconciled, StoreError>;
}

/// Checks a caller-supplied index before it is stored.
pub(crate) fn ledger_index(option_index: i64) -> Result<usize, StoreError> {
    usize::try_from(option_index).map_err(|_| StoreError::NegativeIndex(option_index))
}

/// Counts ledger entries per option.
pub(crate) fn count_by_option(
    indexes: impl IntoIterator<Item = usize>,
    option_count: usize,
) -> Vec<u64> {
    let mut tallies = vec![0u64; option_count];
    for index in indexes {
        if let Some(slot) = tallies.get_mut(index) {
            *slot += 1;
        }
    }
    tallies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_index_rejects_negative() {
        assert_eq!(ledger_index(3).unwrap(), 3);
        assert!(matches!(ledger_index(-1), Err(StoreError::NegativeIndex(-1))));
    }

    #[test]
    fn test_count_by_option_ignores_out_of_range() {
        assert_eq!(count_by_option([0, 1, 1, 5], 3), vec![1, 2, 0]);
        assert_eq!(count_by_option(std::iter::empty(), 2), vec![0, 0]);
    }
}
