use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::engine::Engine;

pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    // The first tick fires immediately; skip it so startup isn't slowed down.
    interval.tick().await;
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

/// One compactor pass. Returns whether the WAL was rewritten.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        debug!("compactor: {appends} appends since last compaction, below {threshold}");
        return false;
    }
    match engine.compact_wal().await {
        Ok(events) => {
            info!("compacted WAL: {appends} appends folded into {events} events");
            true
        }
        Err(e) => {
            error!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roombook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(path, FixedOffset::east_opt(0).unwrap()).unwrap();

        let room = Ulid::new();
        engine.create_room(room, None).await.unwrap();
        for i in 0..4 {
            engine.update_room(room, Some(format!("Room {i}"))).await.unwrap();
        }
        assert_eq!(engine.wal_appends_since_compact().await, 5);

        assert!(!compact_if_needed(&engine, 10).await);
        assert_eq!(engine.wal_appends_since_compact().await, 5);

        assert!(compact_if_needed(&engine, 5).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert_eq!(engine.list_rooms().await[0].name.as_deref(), Some("Room 3"));
    }
}
