use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::store::CacheStore;

/// Periodically drop expired entries. The first sweep runs one full interval
/// after spawning.
pub fn spawn_sweeper(store: Arc<CacheStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired();
            if removed > 0 {
                debug!(target = "voxline::cache", removed, "Swept expired cache entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_unread_expired_entries() {
        let store = Arc::new(CacheStore::new());
        store.set("short", json!(1), Duration::from_secs(30));
        store.set("long", json!(2), Duration::from_secs(300));
        let task = spawn_sweeper(store.clone(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.len(), 1);

        task.abort();
    }
}
