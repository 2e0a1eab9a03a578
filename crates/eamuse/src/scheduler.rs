//! Periodic scheduled-work sweeps.

use eamuse_server::{SweepReport, XrpcService};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Runs one sweep over every registered game version.
pub async fn sweep(service: &XrpcService) -> SweepReport {
    let report = service
        .registry()
        .run_scheduled_work(service.database(), service.config())
        .await;
    if report.failures > 0 {
        warn!(
            "🗓️ Scheduled work: {} games, {} failed, {} events",
            report.games, report.failures, report.events
        );
    } else {
        info!(
            "🗓️ Scheduled work: {} games, {} events",
            report.games, report.events
        );
    }
    report
}

/// Sweeps immediately and then every `interval` until the task is aborted.
pub fn spawn(service: XrpcService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep(&service).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eamuse_data::Database;
    use eamuse_protocol::EamuseProtocol;
    use eamuse_server::{GameRegistry, ServerConfig};
    use std::sync::Arc;

    fn create_service() -> XrpcService {
        let registry = Arc::new(GameRegistry::new());
        game_sample::register(&registry);
        XrpcService::new(
            EamuseProtocol::default(),
            Database::in_memory().unwrap(),
            registry,
            ServerConfig::new("127.0.0.1", 8080),
        )
    }

    #[tokio::test]
    async fn test_sweep_reports_every_version() {
        let service = create_service();

        let report = sweep(&service).await;
        assert_eq!(report.games, 2);
        assert_eq!(report.failures, 0);
        assert_eq!(report.events, 1);

        let data = service.database().data().unwrap();
        let events = data
            .network()
            .get_events(Some(game_sample::DAILY_SONG_EVENT), 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_task_sweeps_on_start() {
        let service = create_service();
        let handle = spawn(service.clone(), Duration::from_secs(3_600));

        let mut swept = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let data = service.database().data().unwrap();
            if !data
                .network()
                .get_events(Some(game_sample::DAILY_SONG_EVENT), 1)
                .await
                .unwrap()
                .is_empty()
            {
                swept = true;
                break;
            }
        }
        handle.abort();
        assert!(swept);
    }
}
