//! Integration test for the full campaign lifecycle: create → execute →
//! re-arm → pause → resume → cap-driven end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use outreach_core::event_bus::{capture_sink, CaptureSink};
use outreach_core::types::{Channel, EventType};
use outreach_engine::audience::AudienceResolver;
use outreach_engine::directory::{demo_directory, InMemoryDirectory};
use outreach_engine::engine::CampaignEngine;
use outreach_engine::executor::InstanceExecutor;
use outreach_engine::scheduler::InstanceScheduler;
use outreach_engine::stop::StopConditionEvaluator;
use outreach_engine::store::CampaignStore;
use outreach_engine::transport::RecordingTransport;
use outreach_engine::types::{
    AudienceSpec, CampaignPhase, CreateCampaignRequest, InstanceStatus, IntervalKind, IntervalSpec,
};

struct World {
    store: Arc<CampaignStore>,
    transport: Arc<RecordingTransport>,
    directory: Arc<InMemoryDirectory>,
    sink: Arc<CaptureSink>,
    engine: CampaignEngine,
    executor: Arc<InstanceExecutor>,
}

fn world() -> World {
    let store = Arc::new(CampaignStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let directory = demo_directory();
    let sink = capture_sink();
    let scheduler = Arc::new(InstanceScheduler::new(store.clone(), sink.clone()));
    let evaluator = Arc::new(StopConditionEvaluator::new(directory.clone()));
    let executor = Arc::new(InstanceExecutor::new(
        store.clone(),
        transport.clone(),
        evaluator,
        scheduler.clone(),
        sink.clone(),
        "Riverside Youth Club".to_string(),
        Duration::from_millis(500),
        4,
    ));
    let engine = CampaignEngine::new(
        store.clone(),
        AudienceResolver::new(directory.clone()),
        scheduler,
        sink.clone(),
    );
    World {
        store,
        transport,
        directory,
        sink,
        engine,
        executor,
    }
}

fn weekly_reminder_request() -> CreateCampaignRequest {
    CreateCampaignRequest {
        name: "Overdue payment reminders".to_string(),
        channel: Channel::Email,
        body_template: "Hi {recipient_name}, a payment for {program_name} is overdue.".to_string(),
        subject_template: Some("{program_name}: payment reminder".to_string()),
        interval: IntervalSpec {
            kind: IntervalKind::Weekly,
            every: 1,
        },
        audience: AudienceSpec::OverduePayments,
        start_at: Some(Utc::now() + ChronoDuration::hours(1)),
        end_at: None,
        max_messages: None,
        stop_conditions: vec![],
        template_vars: HashMap::new(),
    }
}

/// Replaces the campaign's live instance with one that is due right now.
fn force_due(w: &World, campaign_id: uuid::Uuid) -> uuid::Uuid {
    for instance in w.store.live_instances(campaign_id) {
        w.store.cancel_instance(instance.id).unwrap();
    }
    let now = Utc::now();
    w.store
        .insert_scheduled_if_none(campaign_id, now - ChronoDuration::seconds(1), now)
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn test_full_campaign_lifecycle() {
    let w = world();

    // Create: roster materialized from the directory, one instance armed.
    let campaign = w.engine.create_campaign(weekly_reminder_request()).unwrap();
    assert_eq!(campaign.phase, CampaignPhase::Active);
    assert_eq!(w.store.active_recipients(campaign.id).len(), 2);
    assert_eq!(w.store.live_instances(campaign.id).len(), 1);

    // Execute one round.
    let due = force_due(&w, campaign.id);
    let report = w.executor.execute(due).await.unwrap().unwrap();
    assert_eq!(report.success_count, 2);
    assert_eq!(w.transport.send_count(), 2);

    // The executor re-armed exactly one next instance.
    let live = w.store.live_instances(campaign.id);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].status, InstanceStatus::Scheduled);

    // Subject rendered with the program name.
    let sends = w.transport.sends();
    assert_eq!(
        sends[0].2.as_deref(),
        Some("Riverside Youth Club: payment reminder")
    );

    // Pause cancels the armed instance, leaves the sent one alone.
    w.engine.pause(campaign.id, "spring break").unwrap();
    assert!(w.store.live_instances(campaign.id).is_empty());
    let sent_count = w
        .store
        .recent_instances(campaign.id, 10)
        .iter()
        .filter(|i| i.status == InstanceStatus::Sent)
        .count();
    assert_eq!(sent_count, 1);

    // Resume re-arms exactly one.
    let resumed = w.engine.resume(campaign.id).unwrap();
    assert_eq!(resumed.phase, CampaignPhase::Active);
    assert_eq!(w.store.live_instances(campaign.id).len(), 1);

    // Lifecycle events were emitted along the way.
    assert_eq!(w.sink.count_type(EventType::CampaignCreated), 1);
    assert_eq!(w.sink.count_type(EventType::CampaignPaused), 1);
    assert_eq!(w.sink.count_type(EventType::CampaignResumed), 1);
    assert_eq!(w.sink.count_type(EventType::MessageSent), 2);
}

#[tokio::test]
async fn test_max_message_cap_terminates_campaign() {
    let w = world();
    let mut req = weekly_reminder_request();
    req.max_messages = Some(2);
    let campaign = w.engine.create_campaign(req).unwrap();

    // First round: two sends reach the cap; the campaign ends instead of
    // re-arming.
    let due = force_due(&w, campaign.id);
    let report = w.executor.execute(due).await.unwrap().unwrap();
    assert_eq!(report.success_count, 2);
    assert!(report.campaign_ended);

    let stored = w.store.get_campaign(campaign.id).unwrap();
    assert_eq!(stored.phase, CampaignPhase::Ended);
    assert!(w.store.live_instances(campaign.id).is_empty());
    assert_eq!(w.sink.count_type(EventType::CampaignEnded), 1);
}

#[tokio::test]
async fn test_stop_condition_shrinks_roster_between_rounds() {
    let w = world();
    let mut req = weekly_reminder_request();
    req.stop_conditions = vec![outreach_engine::types::StopCondition::ObligationResolved];
    let campaign = w.engine.create_campaign(req).unwrap();

    // Round one: both overdue parents get a message.
    let due = force_due(&w, campaign.id);
    let report = w.executor.execute(due).await.unwrap().unwrap();
    assert_eq!(report.recipient_count, 2);

    // Ben pays up between rounds; the post-send pass of round two drops him
    // after his final message.
    w.directory.settle("parent-ben");
    let due = force_due(&w, campaign.id);
    let report = w.executor.execute(due).await.unwrap().unwrap();
    assert_eq!(report.recipient_count, 2);
    assert_eq!(w.store.active_recipients(campaign.id).len(), 1);

    // Round three only reaches Cleo.
    let due = force_due(&w, campaign.id);
    let report = w.executor.execute(due).await.unwrap().unwrap();
    assert_eq!(report.recipient_count, 1);
    assert_eq!(w.sink.count_type(EventType::RecipientStopped), 1);
}

#[tokio::test]
async fn test_refresh_audience_adds_new_matches_only() {
    let w = world();
    let campaign = w.engine.create_campaign(weekly_reminder_request()).unwrap();
    assert_eq!(w.store.active_recipients(campaign.id).len(), 2);

    // Nothing changed: refresh is a no-op.
    assert_eq!(w.engine.refresh_audience(campaign.id).unwrap(), 0);

    // Dana falls behind after creation; only a refresh picks her up.
    w.directory.insert(outreach_engine::directory::DirectoryEntry {
        identity: "parent-dana".into(),
        name: "Dana Weiss".into(),
        active: true,
        overdue: true,
        payment_plan: Some("quarterly".into()),
        opted_out: false,
    });
    assert_eq!(w.engine.refresh_audience(campaign.id).unwrap(), 1);
    assert_eq!(w.store.active_recipients(campaign.id).len(), 3);
}
