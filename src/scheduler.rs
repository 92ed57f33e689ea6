//! Periodic sync and token refresh
//!
//! Two independent timers drive the service: one runs a sync, the other
//! refreshes the access token. Neither fires immediately; the first tick
//! lands one full period after startup. A tick that arrives while a sync is
//! still running waits for it (runs are serialized by the orchestrator).

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::{Config, MAX_INTERVAL};
use crate::harvest::CookieSource;
use crate::service::Service;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    sync_every: Duration,
    refresh_every: Duration,
}

impl Scheduler {
    /// Periods longer than [`MAX_INTERVAL`] are capped.
    pub fn new(sync_every: Duration, refresh_every: Duration) -> Self {
        Self {
            sync_every: sync_every.min(MAX_INTERVAL),
            refresh_every: refresh_every.min(MAX_INTERVAL),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sync_interval(), config.token_refresh_interval())
    }

    pub fn sync_every(&self) -> Duration {
        self.sync_every
    }

    pub fn refresh_every(&self) -> Duration {
        self.refresh_every
    }

    /// Run the startup pass, then tick until `shutdown` resolves.
    pub async fn run<C, F>(&self, service: &Service<C>, shutdown: F)
    where
        C: CookieSource,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            _ = service.startup() => {}
            _ = &mut shutdown => {
                log::info!("Shutdown requested during startup");
                return;
            }
        }

        let now = Instant::now();
        let (Some(mut sync_ticker), Some(mut refresh_ticker)) =
            (ticker(now, self.sync_every), ticker(now, self.refresh_every))
        else {
            log::error!("Timer period is out of range; scheduler not started");
            return;
        };

        log::info!(
            "Scheduler started: sync every {:?}, token refresh every {:?}",
            self.sync_every,
            self.refresh_every
        );

        loop {
            tokio::select! {
                _ = sync_ticker.tick() => {
                    log::debug!("Scheduled sync");
                    service.scheduled_sync().await;
                }
                _ = refresh_ticker.tick() => {
                    log::debug!("Scheduled token refresh");
                    if !service.refresh().await {
                        log::debug!("Scheduled token refresh did not renew the session");
                    }
                }
                _ = &mut shutdown => {
                    log::info!("Scheduler stopped");
                    break;
                }
            }
        }
    }
}

/// Ticker whose first tick lands one period after `now`.
fn ticker(now: Instant, period: Duration) -> Option<Interval> {
    let mut ticker = interval_at(now.checked_add(period)?, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}
