// src/sweeper.rs
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::services::PollService;

/// Runs `PollService::sweep` every `every` until the handle is aborted.
/// The first pass happens one full interval after startup.
pub fn spawn_sweeper(service: PollService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = every.as_secs(), "reconcile sweeper started");

        loop {
            ticker.tick().await;
            let report = service.sweep().await;
            if report.repaired > 0 || report.failed > 0 {
                warn!(
                    checked = report.checked,
                    repaired = report.repaired,
                    failed = report.failed,
                    "reconcile sweep found divergent polls"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PollStore};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_repairs_on_tick() {
        let store = Arc::new(MemoryStore::new());
        let service = PollService::new(store.clone());
        let poll = service.create_poll("Q", ["A", "B"]).await.unwrap();
        // Counter bumped with no ledger entry behind it.
        store.increment_option(poll.id, 1).await.unwrap();

        let handle = spawn_sweeper(service.clone(), Duration::from_secs(60));
        time::sleep(Duration::from_secs(61)).await;

        let repaired = service.get_poll(&poll.id.to_string()).await.unwrap();
        assert_eq!(repaired.tallies(), vec![0, 0]);
        handle.abort();
    }
}
