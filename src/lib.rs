//! QuickPolls core: polls, a vote ledger enforcing one vote per voter per
//! poll, and tallies that stay consistent with the ledger under concurrent
//! voting.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod poll;
pub mod routes;
pub mod services;
pub mod store;
pub mod sweeper;

pub use error::{PollError, StoreError};
pub use models::{Poll, PollId, PollOption, VoteRecord, VoterId};
pub use services::PollService;
