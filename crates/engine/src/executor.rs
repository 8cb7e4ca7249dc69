//! Instance executor — claims a due instance and drives one send round.
//!
//! The claim (Scheduled → Executing compare-and-swap) is the sole guard
//! against duplicate sends: a worker that loses the claim does nothing.
//! Per-recipient dispatches are independent; one failure never aborts the
//! instance or other recipients' sends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use outreach_core::event_bus::{make_event, EventSink};
use outreach_core::types::EventType;
use outreach_core::{OutreachError, OutreachResult};

use crate::scheduler::InstanceScheduler;
use crate::stop::{StopConditionEvaluator, StopVerdict};
use crate::store::CampaignStore;
use crate::templates::render;
use crate::transport::MessageTransport;
use crate::types::{Campaign, CampaignPhase, DeliveryLog, DeliveryOutcome, Recipient};

/// What one execution round did.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub instance_id: Uuid,
    pub recipient_count: u32,
    pub success_count: u32,
    /// True when this round terminated the campaign (cap reached or schedule
    /// exhausted).
    pub campaign_ended: bool,
}

pub struct InstanceExecutor {
    store: Arc<CampaignStore>,
    transport: Arc<dyn MessageTransport>,
    evaluator: Arc<StopConditionEvaluator>,
    scheduler: Arc<InstanceScheduler>,
    event_sink: Arc<dyn EventSink>,
    program_name: String,
    dispatch_timeout: Duration,
    max_parallel_sends: usize,
}

impl InstanceExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<CampaignStore>,
        transport: Arc<dyn MessageTransport>,
        evaluator: Arc<StopConditionEvaluator>,
        scheduler: Arc<InstanceScheduler>,
        event_sink: Arc<dyn EventSink>,
        program_name: String,
        dispatch_timeout: Duration,
        max_parallel_sends: usize,
    ) -> Self {
        Self {
            store,
            transport,
            evaluator,
            scheduler,
            event_sink,
            program_name,
            dispatch_timeout,
            max_parallel_sends: max_parallel_sends.max(1),
        }
    }

    /// Executes a due instance end to end. Returns `Ok(None)` when the claim
    /// is lost to a concurrent worker or the instance is not due — both are
    /// ordinary non-events, not errors.
    pub async fn execute(&self, instance_id: Uuid) -> OutreachResult<Option<ExecutionReport>> {
        let now = Utc::now();
        let Some(instance) = self.store.claim_due_instance(instance_id, now) else {
            return Ok(None);
        };

        let Some(campaign) = self.store.get_campaign(instance.campaign_id) else {
            error!(instance_id = %instance_id, "Claimed instance references a missing campaign");
            self.store
                .fail_instance(instance_id, "campaign record missing")?;
            return Err(OutreachError::NotFound(format!(
                "campaign {}",
                instance.campaign_id
            )));
        };

        // A pause or delete raced with the dispatcher; the instance was due
        // but the campaign no longer wants it.
        if campaign.phase != CampaignPhase::Active {
            warn!(
                campaign_id = %campaign.id,
                instance_id = %instance_id,
                phase = %campaign.phase,
                "Campaign no longer active, cancelling claimed instance"
            );
            self.store.cancel_instance(instance_id)?;
            return Ok(None);
        }

        // Cap already reached before this round: end instead of sending over
        // the limit.
        if self.cap_reached(&campaign) {
            self.store.cancel_instance(instance_id)?;
            self.end_campaign(&campaign, "max_messages_reached")?;
            return Ok(Some(ExecutionReport {
                instance_id,
                recipient_count: 0,
                success_count: 0,
                campaign_ended: true,
            }));
        }

        let recipients = self.store.active_recipients(campaign.id);
        let recipient_count = recipients.len() as u32;

        let outcomes = self.dispatch_all(&campaign, instance_id, recipients).await;
        let success_count = outcomes.iter().filter(|(_, ok)| *ok).count() as u32;

        // Post-send stop-condition pass.
        for (recipient, _) in &outcomes {
            if let StopVerdict::Stop(reason) = self.evaluator.evaluate(&campaign, recipient) {
                info!(
                    campaign_id = %campaign.id,
                    recipient = %recipient.identity,
                    ?reason,
                    "Stop condition fired, deactivating recipient"
                );
                self.store.stop_recipient(recipient.id, reason, Utc::now())?;
                self.event_sink.emit(make_event(
                    EventType::RecipientStopped,
                    Some(campaign.id),
                    Some(instance_id),
                    Some(recipient.identity.clone()),
                    Some(format!("{reason:?}")),
                ));
            }
        }

        let finished_at = Utc::now();
        self.store
            .finalize_instance(instance_id, recipient_count, success_count, finished_at)?;
        metrics::counter!("engine.instances_executed").increment(1);
        self.event_sink.emit(make_event(
            EventType::InstanceExecuted,
            Some(campaign.id),
            Some(instance_id),
            None,
            None,
        ));
        info!(
            campaign_id = %campaign.id,
            instance_id = %instance_id,
            recipient_count,
            success_count,
            "Instance executed"
        );

        // Campaign-level stop: the cap counts sent logs across all instances,
        // including this one.
        let campaign_ended = if self.cap_reached(&campaign) {
            self.end_campaign(&campaign, "max_messages_reached")?;
            true
        } else {
            // Re-arm from the nominal firing time so the cadence never
            // drifts with execution latency.
            let next = self
                .scheduler
                .schedule_next(campaign.id, instance.scheduled_for, finished_at)?;
            next.is_none()
        };

        Ok(Some(ExecutionReport {
            instance_id,
            recipient_count,
            success_count,
            campaign_ended,
        }))
    }

    fn cap_reached(&self, campaign: &Campaign) -> bool {
        campaign
            .max_messages
            .is_some_and(|max| self.store.sent_count(campaign.id) >= max as u64)
    }

    fn end_campaign(&self, campaign: &Campaign, detail: &str) -> OutreachResult<()> {
        info!(campaign_id = %campaign.id, detail, "Campaign ended");
        self.store.mark_ended(campaign.id, Utc::now())?;
        self.event_sink.emit(make_event(
            EventType::CampaignEnded,
            Some(campaign.id),
            None,
            None,
            Some(detail.to_string()),
        ));
        Ok(())
    }

    /// Renders and dispatches to every recipient with bounded parallelism.
    /// Returns each recipient with whether their dispatch succeeded.
    async fn dispatch_all(
        &self,
        campaign: &Campaign,
        instance_id: Uuid,
        recipients: Vec<Recipient>,
    ) -> Vec<(Recipient, bool)> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_sends));
        let mut join_set: JoinSet<(Recipient, Result<(), String>)> = JoinSet::new();

        for recipient in recipients {
            let vars = self.template_vars(campaign, &recipient);
            let body = render(&campaign.body_template, &vars);
            let subject = campaign
                .subject_template
                .as_deref()
                .map(|t| render(t, &vars));

            let transport = self.transport.clone();
            let semaphore = semaphore.clone();
            let channel = campaign.channel;
            let dispatch_timeout = self.dispatch_timeout;

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let mut result =
                    Self::dispatch_once(&*transport, channel, &recipient, subject.as_deref(), &body, dispatch_timeout)
                        .await;
                // Exactly one retry at the recipient level; persistent
                // failures are recorded, never retried indefinitely.
                if result.is_err() {
                    result = Self::dispatch_once(
                        &*transport,
                        channel,
                        &recipient,
                        subject.as_deref(),
                        &body,
                        dispatch_timeout,
                    )
                    .await;
                }
                (recipient, result)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((recipient, result)) => {
                    let ok = result.is_ok();
                    let detail = result.err();
                    self.store.append_log(DeliveryLog {
                        id: Uuid::new_v4(),
                        instance_id,
                        campaign_id: campaign.id,
                        recipient_id: recipient.id,
                        outcome: if ok {
                            DeliveryOutcome::Sent
                        } else {
                            DeliveryOutcome::Failed
                        },
                        detail: detail.clone(),
                        logged_at: Utc::now(),
                    });
                    if ok {
                        metrics::counter!("engine.messages_sent").increment(1);
                        self.event_sink.emit(make_event(
                            EventType::MessageSent,
                            Some(campaign.id),
                            Some(instance_id),
                            Some(recipient.identity.clone()),
                            None,
                        ));
                    } else {
                        metrics::counter!("engine.messages_failed").increment(1);
                        warn!(
                            campaign_id = %campaign.id,
                            recipient = %recipient.identity,
                            detail = detail.as_deref().unwrap_or("unknown"),
                            "Dispatch failed after retry"
                        );
                        self.event_sink.emit(make_event(
                            EventType::MessageFailed,
                            Some(campaign.id),
                            Some(instance_id),
                            Some(recipient.identity.clone()),
                            detail,
                        ));
                    }
                    outcomes.push((recipient, ok));
                }
                Err(e) => {
                    // A panicked dispatch task loses its recipient's log
                    // entry but must not take the instance down.
                    error!(error = %e, "Dispatch task panicked");
                }
            }
        }
        outcomes
    }

    async fn dispatch_once(
        transport: &dyn MessageTransport,
        channel: outreach_core::types::Channel,
        recipient: &Recipient,
        subject: Option<&str>,
        body: &str,
        dispatch_timeout: Duration,
    ) -> Result<(), String> {
        match timeout(
            dispatch_timeout,
            transport.send(channel, &recipient.identity, subject, body),
        )
        .await
        {
            Ok(Ok(_receipt)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "dispatch timed out after {}ms",
                dispatch_timeout.as_millis()
            )),
        }
    }

    fn template_vars(&self, campaign: &Campaign, recipient: &Recipient) -> HashMap<String, String> {
        let mut vars = campaign.template_vars.clone();
        vars.insert("recipient_name".to_string(), recipient.display_name.clone());
        vars.insert("recipient_id".to_string(), recipient.identity.clone());
        vars.insert("program_name".to_string(), self.program_name.clone());
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::demo_directory;
    use crate::store::tests_support::sample_campaign;
    use crate::transport::RecordingTransport;
    use crate::types::{InstanceStatus, StopCondition};
    use chrono::Duration as ChronoDuration;
    use outreach_core::event_bus::capture_sink;

    struct Harness {
        store: Arc<CampaignStore>,
        transport: Arc<RecordingTransport>,
        directory: Arc<crate::directory::InMemoryDirectory>,
        executor: InstanceExecutor,
    }

    fn harness() -> Harness {
        let store = Arc::new(CampaignStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let directory = demo_directory();
        let sink = capture_sink();
        let scheduler = Arc::new(InstanceScheduler::new(store.clone(), sink.clone()));
        let evaluator = Arc::new(StopConditionEvaluator::new(directory.clone()));
        let executor = InstanceExecutor::new(
            store.clone(),
            transport.clone(),
            evaluator,
            scheduler,
            sink,
            "Riverside Youth Club".to_string(),
            Duration::from_millis(500),
            4,
        );
        Harness {
            store,
            transport,
            directory,
            executor,
        }
    }

    /// Creates an active campaign with a roster and one due instance.
    fn due_instance(h: &Harness, campaign: crate::types::Campaign) -> Uuid {
        let id = campaign.id;
        let now = Utc::now();
        h.store.insert_campaign(campaign);
        h.store.add_recipients(
            id,
            vec![
                ("parent-ben".into(), "Ben Okafor".into()),
                ("parent-cleo".into(), "Cleo Tanaka".into()),
            ],
            now,
        );
        let instance = h
            .store
            .insert_scheduled_if_none(id, now - ChronoDuration::seconds(1), now)
            .unwrap()
            .unwrap();
        instance.id
    }

    #[tokio::test]
    async fn test_execute_sends_and_schedules_next() {
        let h = harness();
        let mut campaign = sample_campaign();
        campaign.body_template = "Hi {recipient_name}, from {program_name}".to_string();
        let campaign_id = campaign.id;
        let instance_id = due_instance(&h, campaign);

        let report = h.executor.execute(instance_id).await.unwrap().unwrap();
        assert_eq!(report.recipient_count, 2);
        assert_eq!(report.success_count, 2);
        assert!(!report.campaign_ended);

        let instance = h.store.get_instance(instance_id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Sent);
        assert!(instance.actual_sent_at.is_some());

        // Body rendered with built-ins.
        let sends = h.transport.sends();
        assert!(sends
            .iter()
            .any(|(_, _, _, body)| body == "Hi Ben Okafor, from Riverside Youth Club"));

        // Exactly one new live instance armed for the next round.
        let live = h.store.live_instances(campaign_id);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].status, InstanceStatus::Scheduled);
        assert_eq!(h.store.logs_for_instance(instance_id).len(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_still_finalizes_as_sent() {
        let h = harness();
        h.transport.fail_for("parent-cleo");
        let campaign = sample_campaign();
        let instance_id = due_instance(&h, campaign);

        let report = h.executor.execute(instance_id).await.unwrap().unwrap();
        assert_eq!(report.recipient_count, 2);
        assert_eq!(report.success_count, 1);

        let instance = h.store.get_instance(instance_id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Sent);

        let logs = h.store.logs_for_instance(instance_id);
        assert_eq!(logs.len(), 2);
        let failed: Vec<_> = logs
            .iter()
            .filter(|l| l.outcome == DeliveryOutcome::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].detail.is_some());

        // The failing recipient was tried twice (one retry), the healthy one
        // once.
        assert_eq!(h.transport.send_count(), 3);
    }

    #[tokio::test]
    async fn test_hanging_transport_times_out_and_records_failure() {
        let h = harness();
        h.transport.stall_for("parent-ben");
        let campaign = sample_campaign();
        let instance_id = due_instance(&h, campaign);

        let report = h.executor.execute(instance_id).await.unwrap().unwrap();
        assert_eq!(report.recipient_count, 2);
        assert_eq!(report.success_count, 1);

        // The hung send was cut off by the timeout, retried once, and cut
        // off again; the instance still finalizes.
        assert_eq!(h.transport.send_count(), 3);
        let instance = h.store.get_instance(instance_id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Sent);

        let logs = h.store.logs_for_instance(instance_id);
        let failed: Vec<_> = logs
            .iter()
            .filter(|l| l.outcome == DeliveryOutcome::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .detail
            .as_deref()
            .is_some_and(|d| d.contains("timed out")));
    }

    #[tokio::test]
    async fn test_double_claim_is_noop() {
        let h = harness();
        let campaign = sample_campaign();
        let instance_id = due_instance(&h, campaign);

        // Simulate a concurrent worker winning the claim.
        h.store.claim_due_instance(instance_id, Utc::now()).unwrap();

        let report = h.executor.execute(instance_id).await.unwrap();
        assert!(report.is_none());
        assert!(h.store.logs_for_instance(instance_id).is_empty());
        assert_eq!(h.transport.send_count(), 0);
    }

    #[tokio::test]
    async fn test_cap_reached_ends_campaign_without_sending() {
        let h = harness();
        let mut campaign = sample_campaign();
        campaign.max_messages = Some(3);
        let campaign_id = campaign.id;
        let instance_id = due_instance(&h, campaign);

        // Three prior successful sends across past instances.
        for _ in 0..3 {
            h.store.append_log(DeliveryLog {
                id: Uuid::new_v4(),
                instance_id: Uuid::new_v4(),
                campaign_id,
                recipient_id: Uuid::new_v4(),
                outcome: DeliveryOutcome::Sent,
                detail: None,
                logged_at: Utc::now(),
            });
        }

        let report = h.executor.execute(instance_id).await.unwrap().unwrap();
        assert!(report.campaign_ended);
        assert_eq!(h.transport.send_count(), 0);
        assert_eq!(
            h.store.get_campaign(campaign_id).unwrap().phase,
            CampaignPhase::Ended
        );
        assert_eq!(
            h.store.get_instance(instance_id).unwrap().status,
            InstanceStatus::Cancelled
        );
        assert!(h.store.live_instances(campaign_id).is_empty());
    }

    #[tokio::test]
    async fn test_stopped_recipient_excluded_from_later_instances() {
        let h = harness();
        let mut campaign = sample_campaign();
        campaign.stop_conditions = vec![StopCondition::ObligationResolved];
        let campaign_id = campaign.id;
        let instance_id = due_instance(&h, campaign);

        // Ben settles before this round: he still receives this message
        // (post-send evaluation) and is then deactivated.
        h.directory.settle("parent-ben");

        let report = h.executor.execute(instance_id).await.unwrap().unwrap();
        assert_eq!(report.recipient_count, 2);

        let roster = h.store.active_recipients(campaign_id);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].identity, "parent-cleo");

        // Force the next instance due and execute it: Ben is gone.
        let next = h.store.live_instances(campaign_id).pop().unwrap();
        h.store.cancel_instance(next.id).unwrap();
        let now = Utc::now();
        let next = h
            .store
            .insert_scheduled_if_none(campaign_id, now - ChronoDuration::seconds(1), now)
            .unwrap()
            .unwrap();
        let report = h.executor.execute(next.id).await.unwrap().unwrap();
        assert_eq!(report.recipient_count, 1);
    }

    #[tokio::test]
    async fn test_paused_campaign_cancels_claimed_instance() {
        let h = harness();
        let campaign = sample_campaign();
        let campaign_id = campaign.id;
        let instance_id = due_instance(&h, campaign);

        h.store
            .mark_paused(campaign_id, "seasonal break", Utc::now())
            .unwrap();

        let report = h.executor.execute(instance_id).await.unwrap();
        assert!(report.is_none());
        assert_eq!(
            h.store.get_instance(instance_id).unwrap().status,
            InstanceStatus::Cancelled
        );
        assert_eq!(h.transport.send_count(), 0);
    }
}
