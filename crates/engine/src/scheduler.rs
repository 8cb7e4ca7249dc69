//! Instance scheduler — keeps every active campaign armed with exactly one
//! pending future instance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use outreach_core::event_bus::{make_event, EventSink};
use outreach_core::types::EventType;
use outreach_core::{OutreachError, OutreachResult};

use crate::schedule::next_occurrence;
use crate::store::CampaignStore;
use crate::types::{Campaign, MessageInstance};

pub struct InstanceScheduler {
    store: Arc<CampaignStore>,
    event_sink: Arc<dyn EventSink>,
}

impl InstanceScheduler {
    pub fn new(store: Arc<CampaignStore>, event_sink: Arc<dyn EventSink>) -> Self {
        Self { store, event_sink }
    }

    /// Arms the next instance of a campaign from the given reference time.
    ///
    /// Safe to call from any trigger (creation, resume, post-execution):
    /// the insert is conditional on no live instance existing, so concurrent
    /// callers cannot produce two. When the calculator reports no further
    /// firing, the campaign is marked Ended and nothing is created.
    pub fn schedule_next(
        &self,
        campaign_id: Uuid,
        reference: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> OutreachResult<Option<MessageInstance>> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .ok_or_else(|| OutreachError::NotFound(format!("campaign {campaign_id}")))?;

        match next_occurrence(&campaign.interval, reference, campaign.end_at) {
            Some(at) => self.arm(&campaign, at, now),
            None => {
                self.end_campaign(&campaign, now)?;
                Ok(None)
            }
        }
    }

    /// Arms the first instance of a freshly created campaign: at `start_at`
    /// itself when it lies in the future, otherwise at the first computed
    /// occurrence at or after now.
    pub fn schedule_first(
        &self,
        campaign: &Campaign,
        now: DateTime<Utc>,
    ) -> OutreachResult<Option<MessageInstance>> {
        let mut at = campaign.start_at;
        while at < now {
            match next_occurrence(&campaign.interval, at, campaign.end_at) {
                Some(next) => at = next,
                None => {
                    self.end_campaign(campaign, now)?;
                    return Ok(None);
                }
            }
        }
        if let Some(end) = campaign.end_at {
            if at > end {
                self.end_campaign(campaign, now)?;
                return Ok(None);
            }
        }
        self.arm(campaign, at, now)
    }

    fn arm(
        &self,
        campaign: &Campaign,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> OutreachResult<Option<MessageInstance>> {
        let instance = self.store.insert_scheduled_if_none(campaign.id, at, now)?;
        if let Some(instance) = &instance {
            info!(
                campaign_id = %campaign.id,
                instance_id = %instance.id,
                scheduled_for = %instance.scheduled_for,
                "Instance scheduled"
            );
            metrics::counter!("engine.instances_scheduled").increment(1);
            self.event_sink.emit(make_event(
                EventType::InstanceScheduled,
                Some(campaign.id),
                Some(instance.id),
                None,
                None,
            ));
        }
        Ok(instance)
    }

    fn end_campaign(&self, campaign: &Campaign, now: DateTime<Utc>) -> OutreachResult<()> {
        info!(campaign_id = %campaign.id, "No further occurrences, campaign ended");
        self.store.mark_ended(campaign.id, now)?;
        self.event_sink.emit(make_event(
            EventType::CampaignEnded,
            Some(campaign.id),
            None,
            None,
            Some("schedule_exhausted".to_string()),
        ));
        Ok(())
    }
}
