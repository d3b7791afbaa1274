// services.rs
//! Poll operations exposed to the HTTP layer.
//!
//! Reads go straight to the poll store. A vote is validated here and then
//! handed to the backend as one atomic gate-and-increment step.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::PollError;
use crate::models::{Poll, PollId, VoterId};
use crate::poll::{parse_poll_id, NewPoll};
use crate::store::{Reconciled, Recorded, Storage};

/// Counts from one pass of `PollService::sweep`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub repaired: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct PollService {
    store: Arc<dyn Storage>,
}

impl PollService {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    pub async fn list_polls(&self) -> Result<Vec<Poll>, PollError> {
        Ok(self.store.list_polls().await?)
    }

    pub async fn get_poll(&self, id: &str) -> Result<Poll, PollError> {
        let id = parse_poll_id(id)?;
        Ok(self.store.get_poll(id).await?)
    }

    pub async fn create_poll<I, S>(&self, question: &str, options: I) -> Result<Poll, PollError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let new_poll = NewPoll::new(question, options)?;
        let poll = self.store.create_poll(new_poll).await?;
        info!(poll_id = %poll.id, options = poll.options.len(), "poll created");
        Ok(poll)
    }

    /// Records one vote and returns the poll with fresh tallies.
    ///
    /// A repeated `(poll, voter)` pair yields `AlreadyVoted` and leaves the
    /// tallies untouched. Retrying after a transport failure is safe for the
    /// same reason.
    pub async fn cast_vote(
        &self,
        poll_id: &str,
        voter_id: &str,
        option_index: i64,
    ) -> Result<Poll, PollError> {
        let poll_id = parse_poll_id(poll_id)?;
        let voter_id = VoterId::parse(voter_id)?;

        let poll = self.store.get_poll(poll_id).await?;
        let position = poll
            .option_position(option_index)
            .ok_or(PollError::IndexOutOfRange {
                index: option_index,
                len: poll.options.len(),
            })?;

        match self.store.accept_vote(poll_id, &voter_id, position).await? {
            Recorded::Inserted(accepted) => {
                info!(
                    poll_id = %poll_id,
                    voter_id = %voter_id,
                    option_index = position,
                    "vote accepted"
                );
                Ok(accepted.poll)
            }
            Recorded::Duplicate => {
                debug!(poll_id = %poll_id, voter_id = %voter_id, "duplicate vote rejected");
                Err(PollError::AlreadyVoted)
            }
        }
    }

    /// Compares stored tallies with the ledger without changing anything.
    ///
    /// Advisory only: a vote landing between the two reads can show up as a
    /// transient mismatch.
    pub async fn verify_poll(&self, id: PollId) -> Result<(), PollError> {
        let poll = self.store.get_poll(id).await?;
        let ledger = self.store.ledger_tally(id, poll.options.len()).await?;
        let stored = poll.tallies();
        if stored != ledger {
            return Err(PollError::Inconsistency {
                poll_id: id,
                stored,
                ledger,
            });
        }
        Ok(())
    }

    /// Recomputes a poll's tallies from its ledger entries.
    pub async fn reconcile_poll(&self, id: &str) -> Result<Reconciled, PollError> {
        let id = parse_poll_id(id)?;
        self.reconcile(id).await
    }

    async fn reconcile(&self, id: PollId) -> Result<Reconciled, PollError> {
        let reconciled = self.store.reconcile(id).await?;
        if reconciled.repaired() {
            let divergence = PollError::Inconsistency {
                poll_id: id,
                stored: reconciled.previous.clone(),
                ledger: reconciled.poll.tallies(),
            };
            warn!(poll_id = %id, "{divergence}; tallies rewritten from ledger");
        }
        Ok(reconciled)
    }

    /// Reconciles every poll. A failure on one poll is logged and the sweep
    /// moves on.
    pub async fn sweep(&self) -> SweepReport {
        let polls = match self.store.list_polls().await {
            Ok(polls) => polls,
            Err(err) => {
                error!(error = %err, "reconcile sweep could not list polls");
                return SweepReport {
                    failed: 1,
                    ..SweepReport::default()
                };
            }
        };

        let mut report = SweepReport::default();
        for poll in polls {
            report.checked += 1;
            match self.reconcile(poll.id).await {
                Ok(reconciled) if reconciled.repaired() => report.repaired += 1,
                Ok(_) => {}
                Err(err) => {
                    report.failed += 1;
                    error!(poll_id = %poll.id, error = %err, "reconcile failed");
                }
            }
        }

        debug!(
            checked = report.checked,
            repaired = report.repaired,
            failed = report.failed,
            "reconcile sweep finished"
        );
        report
    }
}
