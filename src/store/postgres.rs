//! Postgres backend.
//!
//! Counters live in `poll_options.votes` and are only changed with
//! `votes = votes + 1` (or a reconcile under row locks), never by writing back
//! a value read earlier.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{ledger_index, AcceptedVote, PollStore, Reconciled, Recorded, Storage, VoteLedger};
use crate::error::StoreError;
use crate::models::{Poll, PollId, PollOption, VoteRecord, VoterId};
use crate::poll::NewPoll;

const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, sqlx::FromRow)]
struct PollRow {
    id: Uuid,
    question: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OptionRow {
    poll_id: Uuid,
    position: i32,
    text: String,
    votes: i64,
}

impl OptionRow {
    fn into_option(self) -> Result<PollOption, StoreError> {
        let votes = u64::try_from(self.votes).map_err(|_| {
            StoreError::Corrupt(format!(
                "negative vote count {} on poll {} option {}",
                self.votes, self.poll_id, self.position
            ))
        })?;
        Ok(PollOption {
            text: self.text,
            votes,
        })
    }
}

fn assemble(row: PollRow, options: Vec<OptionRow>) -> Result<Poll, StoreError> {
    Ok(Poll {
        id: row.id.into(),
        question: row.question,
        options: options
            .into_iter()
            .map(OptionRow::into_option)
            .collect::<Result<_, _>>()?,
        created_at: row.created_at,
    })
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == FOREIGN_KEY_VIOLATION)
}

async fn fetch_poll(conn: &mut PgConnection, id: PollId) -> Result<Poll, StoreError> {
    let row: PollRow =
        sqlx::query_as("SELECT id, question, created_at FROM polls WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::NotFound(id))?;

    let options: Vec<OptionRow> = sqlx::query_as(
        "SELECT poll_id, position, text, votes FROM poll_options \
         WHERE poll_id = $1 ORDER BY position",
    )
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    assemble(row, options)
}

async fn insert_vote(
    conn: &mut PgConnection,
    poll_id: PollId,
    voter_id: &VoterId,
    option_index: usize,
) -> Result<Recorded<VoteRecord>, StoreError> {
    let position = i32::try_from(option_index)
        .map_err(|_| StoreError::Corrupt(format!("option index {option_index} too large")))?;

    let inserted: Option<DateTime<Utc>> = sqlx::query_scalar(
        "INSERT INTO votes (poll_id, voter_id, option_index) VALUES ($1, $2, $3) \
         ON CONFLICT (poll_id, voter_id) DO NOTHING \
         RETURNING created_at",
    )
    .bind(poll_id.as_uuid())
    .bind(voter_id.as_str())
    .bind(position)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|err| {
        if is_foreign_key_violation(&err) {
            StoreError::NotFound(poll_id)
        } else {
            StoreError::Database(err)
        }
    })?;

    Ok(match inserted {
        Some(created_at) => Recorded::Inserted(VoteRecord {
            poll_id,
            voter_id: voter_id.clone(),
            option_index,
            created_at,
        }),
        None => Recorded::Duplicate,
    })
}

async fn bump_option(conn: &mut PgConnection, id: PollId, index: usize) -> Result<(), StoreError> {
    let position = i32::try_from(index).unwrap_or(i32::MAX);
    let updated = sqlx::query(
        "UPDATE poll_options SET votes = votes + 1 WHERE poll_id = $1 AND position = $2",
    )
    .bind(id.as_uuid())
    .bind(position)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 1 {
        return Ok(());
    }

    // Nothing matched: tell a missing poll apart from a bad index.
    let len: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM poll_options WHERE poll_id = $1")
        .bind(id.as_uuid())
        .fetch_one(&mut *conn)
        .await?;
    if len == 0 {
        Err(StoreError::NotFound(id))
    } else {
        Err(StoreError::IndexOutOfRange {
            index,
            len: usize::try_from(len).unwrap_or(0),
        })
    }
}

async fn tally_rows(
    conn: &mut PgConnection,
    poll_id: PollId,
    option_count: usize,
) -> Result<Vec<u64>, StoreError> {
    let rows: Vec<(i32, i64)> = sqlx::query_as(
        "SELECT option_index, COUNT(*) FROM votes WHERE poll_id = $1 GROUP BY option_index",
    )
    .bind(poll_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    let mut tallies = vec![0u64; option_count];
    for (index, count) in rows {
        let slot = usize::try_from(index).ok().and_then(|i| tallies.get_mut(i));
        if let Some(slot) = slot {
            *slot = u64::try_from(count).unwrap_or(0);
        }
    }
    Ok(tallies)
}

/// Postgres-backed poll store and vote ledger sharing one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn create_poll(&self, new_poll: NewPoll) -> Result<Poll, StoreError> {
        let id = PollId::new();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO polls (id, question) VALUES ($1, $2)")
            .bind(id.as_uuid())
            .bind(new_poll.question())
            .execute(&mut *tx)
            .await?;

        for (position, text) in new_poll.options().iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::Corrupt("too many options".into()))?;
            sqlx::query("INSERT INTO poll_options (poll_id, position, text) VALUES ($1, $2, $3)")
                .bind(id.as_uuid())
                .bind(position)
                .bind(text)
                .execute(&mut *tx)
                .await?;
        }

        let poll = fetch_poll(&mut tx, id).await?;
        tx.commit().await?;
        debug!(poll_id = %id, "poll inserted");
        Ok(poll)
    }

    async fn get_poll(&self, id: PollId) -> Result<Poll, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_poll(&mut conn, id).await
    }

    async fn list_polls(&self) -> Result<Vec<Poll>, StoreError> {
        let rows: Vec<PollRow> = sqlx::query_as(
            "SELECT id, question, created_at FROM polls ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let options: Vec<OptionRow> = sqlx::query_as(
            "SELECT poll_id, position, text, votes FROM poll_options \
             WHERE poll_id = ANY($1) ORDER BY poll_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_poll: HashMap<Uuid, Vec<OptionRow>> = HashMap::new();
        for option in options {
            by_poll.entry(option.poll_id).or_default().push(option);
        }

        rows.into_iter()
            .map(|row| {
                let options = by_poll.remove(&row.id).unwrap_or_default();
                assemble(row, options)
            })
            .collect()
    }

    async fn increment_option(&self, id: PollId, index: usize) -> Result<Poll, StoreError> {
        let mut tx = self.pool.begin().await?;
        bump_option(&mut tx, id, index).await?;
        let poll = fetch_poll(&mut tx, id).await?;
        tx.commit().await?;
        Ok(poll)
    }
}

#[async_trait]
impl VoteLedger for PgStore {
    async fn record_vote(
        &self,
        poll_id: PollId,
        voter_id: &VoterId,
        option_index: i64,
    ) -> Result<Recorded<VoteRecord>, StoreError> {
        let option_index = ledger_index(option_index)?;
        let mut conn = self.pool.acquire().await?;
        insert_vote(&mut conn, poll_id, voter_id, option_index).await
    }

    async fn ledger_tally(
        &self,
        poll_id: PollId,
        option_count: usize,
    ) -> Result<Vec<u64>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        tally_rows(&mut conn, poll_id, option_count).await
    }
}

#[async_trait]
impl Storage for PgStore {
    async fn accept_vote(
        &self,
        poll_id: PollId,
        voter_id: &VoterId,
        option_index: usize,
    ) -> Result<Recorded<AcceptedVote>, StoreError> {
        // Dropping `tx` on any early return rolls both statements back.
        let mut tx = self.pool.begin().await?;

        let record = match insert_vote(&mut tx, poll_id, voter_id, option_index).await? {
            Recorded::Inserted(record) => record,
            Recorded::Duplicate => {
                tx.rollback().await?;
                return Ok(Recorded::Duplicate);
            }
        };
        bump_option(&mut tx, poll_id, option_index).await?;
        let poll = fetch_poll(&mut tx, poll_id).await?;

        tx.commit().await?;
        Ok(Recorded::Inserted(AcceptedVote { record, poll }))
    }

    async fn reconcile(&self, poll_id: PollId) -> Result<Reconciled, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row locks on the counters make concurrent increments wait, so the
        // ledger count below sees every vote whose increment already landed.
        let locked: Vec<(i32, i64)> = sqlx::query_as(
            "SELECT position, votes FROM poll_options WHERE poll_id = $1 \
             ORDER BY position FOR UPDATE",
        )
        .bind(poll_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;
        if locked.is_empty() {
            return Err(StoreError::NotFound(poll_id));
        }

        let previous = locked
            .iter()
            .map(|&(_, votes)| {
                u64::try_from(votes)
                    .map_err(|_| StoreError::Corrupt(format!("negative vote count {votes}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let tallies = tally_rows(&mut tx, poll_id, locked.len()).await?;

        for (&(position, _), &votes) in locked.iter().zip(&tallies) {
            let votes = i64::try_from(votes)
                .map_err(|_| StoreError::Corrupt(format!("vote count {votes} overflows")))?;
            sqlx::query("UPDATE poll_options SET votes = $3 WHERE poll_id = $1 AND position = $2")
                .bind(poll_id.as_uuid())
                .bind(position)
                .bind(votes)
                .execute(&mut *tx)
                .await?;
        }

        let poll = fetch_poll(&mut tx, poll_id).await?;
        tx.commit().await?;
        Ok(Reconciled { poll, previous })
    }
}
