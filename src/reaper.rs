use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::calendar;
use crate::engine::Engine;

/// How often the compactor checks the append counter.
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically move confirmed bookings whose end has passed to completed.
pub async fn run_completion_sweep(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let completed = engine.complete_past_bookings(calendar::now_ms()).await;
        debug!(completed, "completion sweep done");
    }
}

/// Rewrite the WAL once `threshold` appends have piled up since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    compactor_loop(engine, threshold, COMPACT_CHECK_INTERVAL).await;
}

async fn compactor_loop(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!(appends, "compacted WAL"),
            Err(e) => warn!(error = %e, "WAL compaction failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{parse_date, parse_time, parse_timestamp};
    use crate::model::*;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("hotdesk_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn seeded(name: &str) -> (Arc<Engine>, Ulid, Ulid) {
        let engine = Arc::new(Engine::new(test_wal_path(name)).unwrap());
        let ws = Ulid::new();
        engine
            .create_workspace(Workspace {
                id: ws,
                name: "Hot desk".into(),
                workspace_type: WorkspaceType::Desk,
                capacity: 1,
                hourly_rate: 800,
                amenity_tier: AmenityTier::Basic,
            })
            .await
            .unwrap();
        let user = Ulid::new();
        engine
            .register_user(User {
                id: user,
                email: "sweep@example.com".into(),
                role: Role::Member,
            })
            .await
            .unwrap();
        (engine, ws, user)
    }

    #[tokio::test]
    async fn sweep_completes_ended_bookings() {
        let (engine, ws, user) = seeded("sweep_task.wal").await;
        // Booked long ago, so it has ended by the wall clock.
        let booked_at = parse_timestamp("2020-01-01").unwrap();
        let mut ids = Vec::new();
        for (start, end) in [("09:00", "10:00"), ("10:00", "11:00")] {
            let b = engine
                .create_booking(
                    NewBooking {
                        id: Ulid::new(),
                        workspace_id: ws,
                        user_id: user,
                        slot: Slot::new(
                            parse_date("2020-02-03").unwrap(),
                            parse_time(start).unwrap(),
                            parse_time(end).unwrap(),
                        ),
                        equipment: Vec::new(),
                    },
                    booked_at,
                )
                .await
                .unwrap();
            ids.push(b.id);
        }
        engine.confirm_booking(ids[0]).await.unwrap();

        let task = tokio::spawn(run_completion_sweep(engine.clone(), Duration::from_millis(10)));
        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let b = engine.get_booking(ids[0]).await.unwrap();
                if b.status == BookingStatus::Completed {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        task.abort();
        assert!(completed.is_ok(), "sweep never completed the booking");

        // Pending bookings are never completed
        let pending = engine.get_booking(ids[1]).await.unwrap();
        assert_eq!(pending.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn compactor_resets_append_counter() {
        let (engine, _, _) = seeded("compactor_task.wal").await;
        assert_eq!(engine.wal_appends_since_compact().await, 2);

        let task = tokio::spawn(compactor_loop(engine.clone(), 2, Duration::from_millis(10)));
        let compacted = tokio::time::timeout(Duration::from_secs(5), async {
            while engine.wal_appends_since_compact().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        task.abort();
        assert!(compacted.is_ok(), "compactor never ran");
        assert_eq!(engine.list_users(None, 0).await.len(), 1);
    }
}
