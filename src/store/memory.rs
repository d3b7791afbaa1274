//! In-memory backend. Used when no database is configured, and in tests.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    count_by_option, ledger_index, AcceptedVote, PollStore, Reconciled, Recorded, Storage,
    VoteLedger,
};
use crate::error::StoreError;
use crate::models::{Poll, PollId, PollOption, VoteRecord, VoterId};
use crate::poll::NewPoll;

struct StoredPoll {
    poll: Poll,
    /// Insertion sequence, breaks `created_at` ties in `list_polls`.
    seq: u64,
}

#[derive(Default)]
struct State {
    polls: HashMap<PollId, StoredPoll>,
    ledger: HashMap<(PollId, VoterId), VoteRecord>,
    next_seq: u64,
}

impl State {
    fn poll_mut(&mut self, id: PollId) -> Result<&mut Poll, StoreError> {
        self.polls
            .get_mut(&id)
            .map(|stored| &mut stored.poll)
            .ok_or(StoreError::NotFound(id))
    }

    fn increment(&mut self, id: PollId, index: usize) -> Result<Poll, StoreError> {
        let poll = self.poll_mut(id)?;
        let len = poll.options.len();
        let option = poll
            .options
            .get_mut(index)
            .ok_or(StoreError::IndexOutOfRange { index, len })?;
        option.votes += 1;
        Ok(poll.clone())
    }

    fn ledger_tally(&self, poll_id: PollId, option_count: usize) -> Vec<u64> {
        let indexes = self
            .ledger
            .values()
            .filter(|record| record.poll_id == poll_id)
            .map(|record| record.option_index);
        count_by_option(indexes, option_count)
    }

    fn insert_vote(
        &mut self,
        poll_id: PollId,
        voter_id: &VoterId,
        option_index: usize,
    ) -> Recorded<VoteRecord> {
        match self.ledger.entry((poll_id, voter_id.clone())) {
            Entry::Occupied(_) => Recorded::Duplicate,
            Entry::Vacant(slot) => {
                let record = VoteRecord {
                    poll_id,
                    voter_id: voter_id.clone(),
                    option_index,
                    created_at: Utc::now(),
                };
                slot.insert(record.clone());
                Recorded::Inserted(record)
            }
        }
    }
}

/// Thread-safe in-memory store. One lock guards polls and ledger together so
/// the vote gate and the increment form a single critical section.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Number of ledger records for a poll.
    pub fn ledger_len(&self, poll_id: PollId) -> Result<usize, StoreError> {
        Ok(self
            .state()?
            .ledger
            .keys()
            .filter(|(id, _)| *id == poll_id)
            .count())
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create_poll(&self, new_poll: NewPoll) -> Result<Poll, StoreError> {
        let poll = Poll {
            id: PollId::new(),
            question: new_poll.question().to_string(),
            options: new_poll
                .options()
                .iter()
                .map(|text| PollOption {
                    text: text.clone(),
                    votes: 0,
                })
                .collect(),
            created_at: Utc::now(),
        };

        let mut state = self.state()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.polls.insert(
            poll.id,
            StoredPoll {
                poll: poll.clone(),
                seq,
            },
        );
        Ok(poll)
    }

    async fn get_poll(&self, id: PollId) -> Result<Poll, StoreError> {
        self.state()?
            .polls
            .get(&id)
            .map(|stored| stored.poll.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_polls(&self) -> Result<Vec<Poll>, StoreError> {
        let state = self.state()?;
        let mut stored: Vec<&StoredPoll> = state.polls.values().collect();
        stored.sort_by(|a, b| {
            b.poll
                .created_at
                .cmp(&a.poll.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(stored.into_iter().map(|s| s.poll.clone()).collect())
    }

    async fn increment_option(&self, id: PollId, index: usize) -> Result<Poll, StoreError> {
        self.state()?.increment(id, index)
    }
}

#[async_trait]
impl VoteLedger for MemoryStore {
    async fn record_vote(
        &self,
        poll_id: PollId,
        voter_id: &VoterId,
        option_index: i64,
    ) -> Result<Recorded<VoteRecord>, StoreError> {
        let option_index = ledger_index(option_index)?;
        Ok(self.state()?.insert_vote(poll_id, voter_id, option_index))
    }

    async fn ledger_tally(
        &self,
        poll_id: PollId,
        option_count: usize,
    ) -> Result<Vec<u64>, StoreError> {
        Ok(self.state()?.ledger_tally(poll_id, option_count))
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn accept_vote(
        &self,
        poll_id: PollId,
        voter_id: &VoterId,
        option_index: usize,
    ) -> Result<Recorded<AcceptedVote>, StoreError> {
        let mut state = self.state()?;

        // Check the target first so a bad index never leaves a ledger row.
        let poll = state.poll_mut(poll_id)?;
        let len = poll.options.len();
        if option_index >= len {
            return Err(StoreError::IndexOutOfRange {
                index: option_index,
                len,
            });
        }

        let record = match state.insert_vote(poll_id, voter_id, option_index) {
            Recorded::Inserted(record) => record,
            Recorded::Duplicate => return Ok(Recorded::Duplicate),
        };
        let poll = state.increment(poll_id, option_index)?;
        Ok(Recorded::Inserted(AcceptedVote { record, poll }))
    }

    async fn reconcile(&self, poll_id: PollId) -> Result<Reconciled, StoreError> {
        let mut state = self.state()?;
        let option_count = state.poll_mut(poll_id)?.options.len();
        let tallies = state.ledger_tally(poll_id, option_count);

        let poll = state.poll_mut(poll_id)?;
        let previous = poll.tallies();
        for (option, votes) in poll.options.iter_mut().zip(tallies) {
            option.votes = votes;
        }
        Ok(Reconciled {
            poll: poll.clone(),
            previous,
        })
    }
}
