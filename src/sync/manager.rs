use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::core::{CalendarTime, Error, Result};
use crate::network::SerialLink;
use crate::time::RtcClock;
use super::pipeline::TimeSync;

/// Counters kept across periodic synchronizations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Attempts started
    pub attempts: u64,
    /// Attempts that wrote the clock
    pub successes: u64,
    /// Attempts that failed
    pub failures: u64,
    /// Time written by the last successful attempt
    pub last_time: Option<CalendarTime>,
    /// Error of the last failed attempt
    pub last_error: Option<String>,
}

/// Keeps the clock synchronized on a fixed period
pub struct SyncManager<L, C> {
    sync: TimeSync<L, C>,
    stats: SyncStats,
}

impl<L: SerialLink, C: RtcClock> SyncManager<L, C> {
    /// Creates a manager around a connected pipeline
    pub fn new(sync: TimeSync<L, C>) -> Self {
        SyncManager {
            sync,
            stats: SyncStats::default(),
        }
    }

    /// Runs one synchronization and records its outcome
    pub async fn sync_once(&mut self) -> Result<CalendarTime> {
        self.stats.attempts += 1;
        match self.sync.sync_rtc().await {
            Ok(time) => {
                self.stats.successes += 1;
                self.stats.last_time = Some(time);
                Ok(time)
            }
            Err(e) => {
                self.stats.failures += 1;
                self.stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Synchronizes immediately, then every `period` until the keep-running
    /// flag clears. Failed attempts are retried on the next tick.
    ///
    /// The flag is checked on every tick, so shutdown waits for at most one period.
    pub async fn run(&mut self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::invalid_param("sync period must be non-zero"));
        }

        let keep_running = self.sync.keep_running();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(?period, "periodic clock sync started");
        loop {
            ticker.tick().await;
            if !keep_running.load(Ordering::Relaxed) {
                break;
            }

            match self.sync_once().await {
                Ok(time) => info!(%time, attempt = self.stats.attempts, "periodic sync complete"),
                Err(Error::Cancelled) => break,
                Err(e) => warn!(error = %e, attempt = self.stats.attempts, "periodic sync failed"),
            }
        }

        info!(
            attempts = self.stats.attempts,
            successes = self.stats.successes,
            "periodic clock sync stopped"
        );
        Ok(())
    }

    /// Outcome counters
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// The pipeline
    pub fn sync(&self) -> &TimeSync<L, C> {
        &self.sync
    }

    /// The pipeline, mutably
    pub fn sync_mut(&mut self) -> &mut TimeSync<L, C> {
        &mut self.sync
    }

    /// Releases the pipeline
    pub fn into_inner(self) -> TimeSync<L, C> {
        self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SyncConfig;
    use crate::network::{Modem, RxConsumer};
    use crate::testing::{ScriptedModem, SimulatedIsl1208};
    use crate::time::Isl1208;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    type TestManager = SyncManager<ScriptedModem, Isl1208<SimulatedIsl1208>>;

    async fn manager(link: ScriptedModem, rx: RxConsumer) -> (TestManager, Arc<AtomicBool>) {
        let config = SyncConfig {
            ssid: "lab".to_string(),
            ..SyncConfig::default()
        };
        let keep_running = Arc::new(AtomicBool::new(true));
        let modem = Modem::new(link, rx, &config.timeouts);
        let mut sync = TimeSync::new(modem, Isl1208::new(SimulatedIsl1208::new()), &config)
            .unwrap()
            .with_keep_running(keep_running.clone());
        sync.connect().await.unwrap();
        (SyncManager::new(sync), keep_running)
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync_until_stopped() {
        let (mut link, rx) = ScriptedModem::new();
        link.script_wifi().script_time_server(0xE67B_2C80);
        let (mut manager, keep_running) = manager(link, rx).await;

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            keep_running.store(false, Ordering::Relaxed);
        });

        manager.run(Duration::from_secs(60)).await.unwrap();
        stopper.await.unwrap();

        let stats = manager.stats();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.successes, 3);
        assert_eq!(stats.last_time.map(|t| t.to_string()).as_deref(), Some("2022-07-15 08:00:00"));
        assert_eq!(manager.sync().clock().bus().time_block_writes(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted() {
        let (mut link, rx) = ScriptedModem::new();
        link.script_wifi().on("AT+CIPSTART", b"\r\nERROR\r\n");
        let (mut manager, _keep_running) = manager(link, rx).await;

        assert!(matches!(manager.sync_once().await, Err(Error::AllServersExhausted)));
        let stats = manager.stats();
        assert_eq!((stats.attempts, stats.failures), (1, 1));
        assert!(stats.last_error.is_some());
        assert!(stats.last_time.is_none());
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let (mut link, rx) = ScriptedModem::new();
        link.script_wifi();
        let (mut manager, _) = manager(link, rx).await;
        assert!(matches!(
            manager.run(Duration::ZERO).await,
            Err(Error::InvalidParam(_))
        ));
    }
}
