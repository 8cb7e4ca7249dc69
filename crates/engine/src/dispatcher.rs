//! Due-instance dispatcher — the time-driven trigger for the executor.
//!
//! A polling loop scans for scheduled instances whose time has come and hands
//! each to the executor. Multiple dispatchers may run against the same store;
//! the executor's claim step guarantees each instance is processed at most
//! once, so overlapping scans are harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::executor::InstanceExecutor;
use crate::store::CampaignStore;

pub struct Dispatcher {
    store: Arc<CampaignStore>,
    executor: Arc<InstanceExecutor>,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<CampaignStore>,
        executor: Arc<InstanceExecutor>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            poll_interval,
        }
    }

    /// Runs the poll loop until the process shuts down. Executor errors are
    /// logged and never propagate; a bad instance must not take the loop down.
    pub async fn run(&self) {
        info!(poll_interval_secs = self.poll_interval.as_secs(), "Dispatcher started");
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One scan: execute everything currently due. Exposed for tests and for
    /// cron-style invocation.
    pub async fn tick(&self) {
        let due = self.store.due_instance_ids(Utc::now());
        if due.is_empty() {
            return;
        }
        debug!(count = due.len(), "Due instances found");
        for instance_id in due {
            match self.executor.execute(instance_id).await {
                Ok(Some(report)) => {
                    debug!(
                        instance_id = %instance_id,
                        success = report.success_count,
                        of = report.recipient_count,
                        "Instance dispatched"
                    );
                }
                // Claim lost to a concurrent worker, or no longer due.
                Ok(None) => {}
                Err(e) => {
                    error!(instance_id = %instance_id, error = %e, "Instance execution failed");
                    metrics::counter!("engine.dispatch_errors").increment(1);
                }
            }
        }
    }
}
