//! Periodic expiry pruning.
//!
//! The sweep runs on its own timer task, independent of traffic, and
//! is aborted with the rest of the node on shutdown. Pruning is
//! idempotent, so the interval only bounds how long an expired
//! envelope can linger.

use std::sync::Arc;
use std::time::Duration;

use driftmesh_storage::MessageStore;
use driftmesh_types::{now_millis, Result};
use tokio::task::JoinHandle;

/// Summary of one sweep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PruneReport {
    pub pruned: usize,
    pub remaining: usize,
}

/// Deletes every envelope expired at `now` and flushes the store.
pub fn run_prune(store: &MessageStore, now: i64) -> Result<PruneReport> {
    let pruned = store.prune_expired(now)?;
    store.flush()?;
    let report = PruneReport {
        pruned,
        remaining: store.count()?,
    };
    tracing::debug!(pruned = report.pruned, remaining = report.remaining, "expiry sweep done");
    Ok(report)
}

/// Spawns the sweep on a fixed `interval`. The first sweep runs
/// immediately.
pub fn spawn_prune_task(store: Arc<MessageStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;
            if let Err(e) = run_prune(&store, now_millis()) {
                tracing::error!(%e, "expiry sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use driftmesh_protocol::{Envelope, MessageType};
    use driftmesh_types::config::{DtnSettings, SettingsHandle};
    use driftmesh_types::StableId;

    use super::*;

    fn envelope(ttl: i64) -> Envelope {
        let mut env = Envelope::originate(
            StableId::new("a"),
            "b",
            MessageType::GroupMessage,
            "{}".into(),
            0,
            3,
        );
        env.ttl = ttl;
        env
    }

    #[test]
    fn sweep_reports_pruned_and_remaining() -> Result<()> {
        let store = MessageStore::in_memory(SettingsHandle::new(DtnSettings::default())?);
        store.add(&envelope(10))?;
        store.add(&envelope(1_000))?;

        let first = run_prune(&store, 500)?;
        assert_eq!(first, PruneReport { pruned: 1, remaining: 1 });

        let second = run_prune(&store, 500)?;
        assert_eq!(second, PruneReport { pruned: 0, remaining: 1 });
        Ok(())
    }

    #[tokio::test]
    async fn prune_task_sweeps_on_start() -> Result<()> {
        let store = Arc::new(MessageStore::in_memory(SettingsHandle::new(
            DtnSettings::default(),
        )?));
        store.add(&envelope(1))?;

        let task = spawn_prune_task(store.clone(), Duration::from_secs(3600));
        for _ in 0..50 {
            if store.count()? == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();
        assert_eq!(store.count()?, 0);
        Ok(())
    }
}
