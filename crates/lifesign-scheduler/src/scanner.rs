//! Scan job and scheduler lifecycle.
//!
//! The scan tick is the heartbeat of the whole service: select overdue
//! users, dispatch an alert for each, then send pre-deadline reminders.
//! Ticks never overlap (a slow tick makes the next one skip) and never
//! kill the timer — every failure is contained at the narrowest scope
//! that can absorb it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;

use lifesign_core::config::SchedulerConfig;
use lifesign_core::traits::{Crypto, DeadlineStore, EmailChannel, PushChannel};
use lifesign_core::types::WARNING_THRESHOLD_HOURS;

use crate::dispatch::AlertDispatcher;
use crate::sweep::RetentionSweeper;
use crate::templates;

/// What one scan tick did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub overdue: usize,
    pub alerted: usize,
    pub failed: usize,
    pub reminders_sent: usize,
}

struct ScanJob {
    store: Arc<dyn DeadlineStore>,
    dispatcher: AlertDispatcher,
    push: Arc<dyn PushChannel>,
    suppression: Duration,
    // Held for the duration of a tick; a tick that cannot take it skips.
    gate: tokio::sync::Mutex<()>,
}

impl ScanJob {
    /// Run one scan tick. Returns None when a previous tick is still running.
    async fn tick(&self, now: DateTime<Utc>) -> Option<ScanSummary> {
        let Ok(_guard) = self.gate.try_lock() else {
            tracing::warn!("previous deadline scan still running, skipping this tick");
            return None;
        };
        Some(self.scan(now).await)
    }

    async fn scan(&self, now: DateTime<Utc>) -> ScanSummary {
        let mut summary = ScanSummary::default();

        match self
            .store
            .find_overdue_candidates(now, self.suppression)
            .await
        {
            Ok(overdue) => {
                summary.overdue = overdue.len();
                if !overdue.is_empty() {
                    tracing::info!("⏰ {} user(s) past their deadline", overdue.len());
                }
                for user in &overdue {
                    // One user's failure must not starve the rest of the batch.
                    match self.dispatcher.dispatch_alert(user, now).await {
                        Ok(outcome) if outcome.episode_written => summary.alerted += 1,
                        Ok(_) => {}
                        Err(e) => {
                            summary.failed += 1;
                            tracing::error!("alert dispatch failed for user {}: {e}", user.id);
                        }
                    }
                }
            }
            Err(e) => tracing::error!("overdue scan failed: {e}"),
        }

        summary.reminders_sent = self.send_reminders(now).await;
        summary
    }

    /// Pre-deadline reminder pushes, at most one per check-in cycle.
    async fn send_reminders(&self, now: DateTime<Utc>) -> usize {
        let candidates = match self
            .store
            .find_reminder_candidates(now, Duration::hours(WARNING_THRESHOLD_HOURS))
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!("reminder scan failed: {e}");
                return 0;
            }
        };

        let mut sent = 0;
        for user in &candidates {
            let (Some(token), Some(deadline)) = (&user.push_token, user.next_deadline) else {
                continue;
            };
            // Round up so "5h59m left" reads as 6 hours, not 5.
            let hours_remaining = ((deadline - now).num_minutes() + 59) / 60;
            let message = templates::reminder_push_message(token, hours_remaining);
            self.push.send_batch(vec![message]).await;
            match self.store.mark_reminded(&user.id, now).await {
                Ok(()) => {
                    sent += 1;
                    tracing::info!("🔔 reminded user {} ({hours_remaining}h remaining)", user.id);
                }
                Err(e) => tracing::error!("failed to mark user {} reminded: {e}", user.id),
            }
        }
        sent
    }
}

/// Owns the periodic jobs. `start` spawns them, `stop` tears them down.
pub struct Scheduler {
    job: Arc<ScanJob>,
    sweeper: Arc<RetentionSweeper>,
    config: SchedulerConfig,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn DeadlineStore>,
        push: Arc<dyn PushChannel>,
        email: Arc<dyn EmailChannel>,
        crypto: Arc<dyn Crypto>,
        config: SchedulerConfig,
    ) -> Self {
        let dispatcher =
            AlertDispatcher::new(store.clone(), push.clone(), email, crypto);
        let job = Arc::new(ScanJob {
            store: store.clone(),
            dispatcher,
            push,
            suppression: Duration::seconds(config.suppression_window_secs as i64),
            gate: tokio::sync::Mutex::new(()),
        });
        Self {
            job,
            sweeper: Arc::new(RetentionSweeper::new(store)),
            config,
            handles: Vec::new(),
        }
    }

    /// Run one scan tick immediately. Used by the periodic job and by the
    /// `scan` CLI command.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> ScanSummary {
        self.job.tick(now).await.unwrap_or_default()
    }

    /// Run one retention sweep immediately.
    pub async fn sweep_once(&self, now: DateTime<Utc>) {
        self.sweeper.sweep(now).await;
    }

    /// Spawn the scan and sweep jobs.
    pub fn start(&mut self) {
        tracing::info!(
            "🚀 scheduler started (scan every {}s, sweep every {}s)",
            self.config.scan_interval_secs,
            self.config.sweep_interval_secs
        );

        let job = self.job.clone();
        let scan_interval = std::time::Duration::from_secs(self.config.scan_interval_secs);
        self.handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(scan_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                // Spawned so a hanging tick delays nothing; the gate inside
                // keeps concurrent ticks from doubling alerts.
                let job = job.clone();
                tokio::spawn(async move {
                    job.tick(Utc::now()).await;
                });
            }
        }));

        let sweeper = self.sweeper.clone();
        let sweep_interval = std::time::Duration::from_secs(self.config.sweep_interval_secs);
        self.handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so startup is quiet.
            interval.tick().await;
            loop {
                interval.tick().await;
                sweeper.sweep(Utc::now()).await;
            }
        }));
    }

    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        tracing::info!("🛑 scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
