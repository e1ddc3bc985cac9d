//! Background sweeper for aged artifacts.
//!
//! Sources and outputs are content-addressed and shared between sessions, so
//! deleting a record never deletes a file; this task reclaims disk on a TTL
//! instead.

use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::StorageConfig;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the sweeper loop. The handle is detached in production; tests can
/// abort it.
pub fn spawn_janitor(storage: StorageConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_dir(
                &storage.outputs_dir(),
                Duration::from_secs(storage.converted_ttl_secs),
            )
            .await;
            sweep_dir(
                &storage.streams_dir(),
                Duration::from_secs(storage.unconverted_ttl_secs),
            )
            .await;
        }
    })
}

/// Remove regular files in `dir` whose modification time is older than `ttl`.
async fn sweep_dir(dir: &Path, ttl: Duration) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let Ok(age) = modified.elapsed() else {
            continue;
        };
        if age > ttl {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "swept aged artifact"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to sweep artifact"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_removes_only_aged_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.mp3");
        let fresh = dir.path().join("fresh.mp3");
        std::fs::write(&old, b"x").unwrap();
        std::fs::write(&fresh, b"y").unwrap();

        // Zero TTL ages out everything already on disk.
        sweep_dir(dir.path(), Duration::ZERO).await;
        assert!(!old.exists());
        assert!(!fresh.exists());

        std::fs::write(&fresh, b"y").unwrap();
        sweep_dir(dir.path(), Duration::from_secs(3600)).await;
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_sweep_tolerates_missing_dir() {
        sweep_dir(Path::new("/nonexistent/audiomill-sweep"), Duration::ZERO).await;
    }
}
