use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::EventBus;

/// Run the ack-timeout sweep every `period` until `cancel` fires. The first
/// sweep happens one full period after start.
pub fn spawn_sweeper(
    bus: Arc<EventBus>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "timeout sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match bus.trigger_timeout_checks(Utc::now()).await {
                Ok(report) if report.total() > 0 => info!(
                    requeued = report.requeued(),
                    dead_lettered = report.dead_lettered(),
                    dropped = report.dropped(),
                    "ack timeout sweep"
                ),
                Ok(_) => debug!("ack timeout sweep found nothing expired"),
                Err(e) => warn!(error = %e, "ack timeout sweep failed"),
            }
        }

        info!("timeout sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::config::EventLimits;

    #[tokio::test]
    async fn stops_when_cancelled() {
        let bus = Arc::new(EventBus::new(EventLimits::default()));
        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(bus, Duration::from_secs(3600), cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn keeps_sweeping_between_ticks() {
        let bus = Arc::new(EventBus::new(EventLimits::default()));
        let cancel = CancellationToken::new();
        bus.create_queue("q", 1, 1, false, &cancel).await.unwrap();

        let handle = spawn_sweeper(Arc::clone(&bus), Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap();
    }
}
