//! Campaign engine facade — validation, lifecycle operations, and queries.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use outreach_core::event_bus::{make_event, EventSink};
use outreach_core::types::EventType;
use outreach_core::{OutreachError, OutreachResult};

use crate::audience::AudienceResolver;
use crate::scheduler::InstanceScheduler;
use crate::store::CampaignStore;
use crate::types::{
    AudienceSpec, Campaign, CampaignDetail, CampaignPhase, CreateCampaignRequest, StopReason,
};

/// How many instances a campaign detail view includes.
const RECENT_INSTANCE_LIMIT: usize = 20;

pub struct CampaignEngine {
    store: Arc<CampaignStore>,
    resolver: AudienceResolver,
    scheduler: Arc<InstanceScheduler>,
    event_sink: Arc<dyn EventSink>,
}

impl CampaignEngine {
    pub fn new(
        store: Arc<CampaignStore>,
        resolver: AudienceResolver,
        scheduler: Arc<InstanceScheduler>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            resolver,
            scheduler,
            event_sink,
        }
    }

    /// Validates and persists a campaign, materializes its audience, and arms
    /// the first instance. On validation failure nothing is persisted.
    pub fn create_campaign(&self, req: CreateCampaignRequest) -> OutreachResult<Campaign> {
        validate(&req)?;

        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: req.name,
            channel: req.channel,
            body_template: req.body_template,
            subject_template: req.subject_template,
            interval: req.interval,
            audience: req.audience,
            start_at: req.start_at.unwrap_or(now),
            end_at: req.end_at,
            max_messages: req.max_messages,
            stop_conditions: req.stop_conditions,
            template_vars: req.template_vars,
            phase: CampaignPhase::Active,
            paused_at: None,
            paused_reason: None,
            created_at: now,
            updated_at: now,
        };
        let id = campaign.id;
        info!(campaign_id = %id, name = %campaign.name, "Creating campaign");
        self.store.insert_campaign(campaign.clone());

        self.resolver
            .materialize(&self.store, id, &campaign.audience, now);
        self.scheduler.schedule_first(&campaign, now)?;

        metrics::counter!("engine.campaigns_created").increment(1);
        self.event_sink.emit(make_event(
            EventType::CampaignCreated,
            Some(id),
            None,
            None,
            None,
        ));

        // The campaign may have ended immediately (start/end window already
        // exhausted); return the stored state.
        self.store
            .get_campaign(id)
            .ok_or_else(|| OutreachError::NotFound(format!("campaign {id}")))
    }

    /// Active → Paused. Cancels every future scheduled instance; an in-flight
    /// execution is left to finish naturally.
    pub fn pause(&self, id: Uuid, reason: &str) -> OutreachResult<Campaign> {
        let now = Utc::now();
        let campaign = self.store.mark_paused(id, reason, now)?;
        let cancelled = self.store.cancel_pending_instances(id, now);
        info!(campaign_id = %id, reason, cancelled, "Campaign paused");
        self.event_sink.emit(make_event(
            EventType::CampaignPaused,
            Some(id),
            None,
            None,
            Some(reason.to_string()),
        ));
        Ok(campaign)
    }

    /// Paused → Active. Re-arms the campaign from now if no scheduled
    /// instance exists.
    pub fn resume(&self, id: Uuid) -> OutreachResult<Campaign> {
        let now = Utc::now();
        self.store.mark_resumed(id, now)?;
        // insert_scheduled_if_none makes this a no-op when an instance
        // somehow survived the pause.
        self.scheduler.schedule_next(id, now, now)?;
        info!(campaign_id = %id, "Campaign resumed");
        self.event_sink.emit(make_event(
            EventType::CampaignResumed,
            Some(id),
            None,
            None,
            None,
        ));
        // schedule_next may have ended the campaign on the spot; return the
        // stored state.
        self.store
            .get_campaign(id)
            .ok_or_else(|| OutreachError::NotFound(format!("campaign {id}")))
    }

    /// Any live phase → Stopped. Cancels pending instances (a superset of
    /// pause's behavior) and deactivates the whole roster.
    pub fn delete(&self, id: Uuid) -> OutreachResult<Campaign> {
        let now = Utc::now();
        let campaign = self.store.mark_stopped(id, now)?;
        let cancelled = self.store.cancel_pending_instances(id, now);
        let stopped = self
            .store
            .stop_roster(id, StopReason::CampaignStopped, now);
        info!(campaign_id = %id, cancelled, stopped, "Campaign stopped");
        self.event_sink.emit(make_event(
            EventType::CampaignStopped,
            Some(id),
            None,
            None,
            None,
        ));
        Ok(campaign)
    }

    /// Re-resolves the audience against the directory's current state and
    /// adds any new matches to the roster. Never removes existing members.
    pub fn refresh_audience(&self, id: Uuid) -> OutreachResult<usize> {
        let campaign = self
            .store
            .get_campaign(id)
            .ok_or_else(|| OutreachError::NotFound(format!("campaign {id}")))?;
        if matches!(campaign.phase, CampaignPhase::Ended | CampaignPhase::Stopped) {
            return Err(OutreachError::Validation(format!(
                "campaign {id} is {} and cannot be refreshed",
                campaign.phase
            )));
        }
        let added = self
            .resolver
            .materialize(&self.store, id, &campaign.audience, Utc::now());
        self.event_sink.emit(make_event(
            EventType::AudienceRefreshed,
            Some(id),
            None,
            None,
            Some(format!("{added} added")),
        ));
        Ok(added)
    }

    pub fn get(&self, id: Uuid) -> OutreachResult<CampaignDetail> {
        let campaign = self
            .store
            .get_campaign(id)
            .ok_or_else(|| OutreachError::NotFound(format!("campaign {id}")))?;
        Ok(CampaignDetail {
            recent_instances: self.store.recent_instances(id, RECENT_INSTANCE_LIMIT),
            active_recipients: self.store.active_recipients(id),
            campaign,
        })
    }

    pub fn list(&self, phase: Option<CampaignPhase>) -> Vec<Campaign> {
        self.store.list_campaigns(phase)
    }
}

fn validate(req: &CreateCampaignRequest) -> OutreachResult<()> {
    if req.name.trim().is_empty() {
        return Err(OutreachError::Validation("campaign name must not be empty".into()));
    }
    if req.body_template.trim().is_empty() {
        return Err(OutreachError::Validation("body template must not be empty".into()));
    }
    if req.interval.every < 1 {
        return Err(OutreachError::Validation(
            "interval multiplier must be at least 1".into(),
        ));
    }
    if let Some(max) = req.max_messages {
        if max < 1 {
            return Err(OutreachError::Validation(
                "max_messages must be at least 1 when set".into(),
            ));
        }
    }
    if let (Some(start), Some(end)) = (req.start_at, req.end_at) {
        if end <= start {
            return Err(OutreachError::Validation(
                "end time must be after start time".into(),
            ));
        }
    }
    if let AudienceSpec::ExplicitList { identities } = &req.audience {
        if identities.is_empty() {
            return Err(OutreachError::Validation(
                "explicit audience list must not be empty".into(),
            ));
        }
    }
    Ok(())
}
