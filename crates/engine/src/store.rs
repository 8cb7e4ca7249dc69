//! In-memory campaign store backed by DashMap.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store; the two
//! conditional operations (`claim_due_instance`, `insert_scheduled_if_none`)
//! map onto a compare-and-swap UPDATE and a partial unique index respectively.
//! This provides the same API surface for development and testing.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use outreach_core::{OutreachError, OutreachResult};

use crate::lifecycle;
use crate::types::{
    Campaign, CampaignPhase, DeliveryLog, DeliveryOutcome, InstanceStatus, MessageInstance,
    Recipient, StopReason,
};

/// Thread-safe store for campaigns, recipient rosters, instances, and
/// delivery logs.
pub struct CampaignStore {
    campaigns: DashMap<Uuid, Campaign>,
    recipients: DashMap<Uuid, Recipient>,
    instances: DashMap<Uuid, MessageInstance>,
    /// Append-only; rows are never mutated after insertion.
    delivery_logs: DashMap<Uuid, DeliveryLog>,
}

impl CampaignStore {
    pub fn new() -> Self {
        info!("Campaign store initialized (in-memory, development mode)");
        Self {
            campaigns: DashMap::new(),
            recipients: DashMap::new(),
            instances: DashMap::new(),
            delivery_logs: DashMap::new(),
        }
    }

    // ─── Campaigns ─────────────────────────────────────────────────────────

    pub fn insert_campaign(&self, campaign: Campaign) {
        self.campaigns.insert(campaign.id, campaign);
    }

    pub fn get_campaign(&self, id: Uuid) -> Option<Campaign> {
        self.campaigns.get(&id).map(|r| r.value().clone())
    }

    pub fn list_campaigns(&self, phase: Option<CampaignPhase>) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|r| phase.is_none_or(|p| r.value().phase == p))
            .map(|r| r.value().clone())
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns
    }

    fn campaign_mut(
        &self,
        id: Uuid,
    ) -> OutreachResult<dashmap::mapref::one::RefMut<'_, Uuid, Campaign>> {
        self.campaigns
            .get_mut(&id)
            .ok_or_else(|| OutreachError::NotFound(format!("campaign {id}")))
    }

    /// Active → Paused; records the pause markers together.
    pub fn mark_paused(
        &self,
        id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> OutreachResult<Campaign> {
        let mut entry = self.campaign_mut(id)?;
        lifecycle::check_transition(entry.phase, CampaignPhase::Paused)?;
        entry.phase = CampaignPhase::Paused;
        entry.paused_at = Some(now);
        entry.paused_reason = Some(reason.to_string());
        entry.updated_at = now;
        Ok(entry.clone())
    }

    /// Paused → Active; clears the pause markers together.
    pub fn mark_resumed(&self, id: Uuid, now: DateTime<Utc>) -> OutreachResult<Campaign> {
        let mut entry = self.campaign_mut(id)?;
        lifecycle::check_transition(entry.phase, CampaignPhase::Active)?;
        entry.phase = CampaignPhase::Active;
        entry.paused_at = None;
        entry.paused_reason = None;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    /// Active → Ended (schedule exhausted or max-message cap reached).
    pub fn mark_ended(&self, id: Uuid, now: DateTime<Utc>) -> OutreachResult<Campaign> {
        let mut entry = self.campaign_mut(id)?;
        lifecycle::check_transition(entry.phase, CampaignPhase::Ended)?;
        entry.phase = CampaignPhase::Ended;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    /// Active | Paused → Stopped (manual delete).
    pub fn mark_stopped(&self, id: Uuid, now: DateTime<Utc>) -> OutreachResult<Campaign> {
        let mut entry = self.campaign_mut(id)?;
        lifecycle::check_transition(entry.phase, CampaignPhase::Stopped)?;
        entry.phase = CampaignPhase::Stopped;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    // ─── Recipients ────────────────────────────────────────────────────────

    /// Adds identities to a campaign's roster, skipping any identity already
    /// on it (active or stopped). Returns the number actually added.
    pub fn add_recipients(
        &self,
        campaign_id: Uuid,
        identities: Vec<(String, String)>,
        now: DateTime<Utc>,
    ) -> usize {
        let existing: std::collections::HashSet<String> = self
            .recipients
            .iter()
            .filter(|r| r.value().campaign_id == campaign_id)
            .map(|r| r.value().identity.clone())
            .collect();

        let mut added = 0;
        for (identity, display_name) in identities {
            if existing.contains(&identity) {
                continue;
            }
            let recipient = Recipient {
                id: Uuid::new_v4(),
                campaign_id,
                identity,
                display_name,
                is_active: true,
                stopped_at: None,
                stop_reason: None,
                added_at: now,
            };
            self.recipients.insert(recipient.id, recipient);
            added += 1;
        }
        added
    }

    pub fn active_recipients(&self, campaign_id: Uuid) -> Vec<Recipient> {
        let mut out: Vec<Recipient> = self
            .recipients
            .iter()
            .filter(|r| r.value().campaign_id == campaign_id && r.value().is_active)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| a.identity.cmp(&b.identity));
        out
    }

    /// Deactivates one recipient, recording when and why.
    pub fn stop_recipient(
        &self,
        recipient_id: Uuid,
        reason: StopReason,
        now: DateTime<Utc>,
    ) -> OutreachResult<()> {
        let mut entry = self
            .recipients
            .get_mut(&recipient_id)
            .ok_or_else(|| OutreachError::NotFound(format!("recipient {recipient_id}")))?;
        if entry.is_active {
            entry.is_active = false;
            entry.stopped_at = Some(now);
            entry.stop_reason = Some(reason);
        }
        Ok(())
    }

    /// Deactivates every active recipient of a campaign. Returns the count.
    pub fn stop_roster(&self, campaign_id: Uuid, reason: StopReason, now: DateTime<Utc>) -> usize {
        let mut stopped = 0;
        for mut entry in self.recipients.iter_mut() {
            let r = entry.value_mut();
            if r.campaign_id == campaign_id && r.is_active {
                r.is_active = false;
                r.stopped_at = Some(now);
                r.stop_reason = Some(reason);
                stopped += 1;
            }
        }
        stopped
    }

    // ─── Instances ─────────────────────────────────────────────────────────

    /// First concurrency-control point: creates a Scheduled instance for the
    /// campaign only if no live (Scheduled or Executing) instance exists.
    ///
    /// The check and insert run under the campaign's entry lock, so competing
    /// triggers (creation, resume, post-execution) serialize here and exactly
    /// one wins. The loser gets `None` and does nothing.
    pub fn insert_scheduled_if_none(
        &self,
        campaign_id: Uuid,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> OutreachResult<Option<MessageInstance>> {
        let _guard = self.campaign_mut(campaign_id)?;

        let already_live = self
            .instances
            .iter()
            .any(|r| r.value().campaign_id == campaign_id && r.value().status.is_live());
        if already_live {
            debug!(campaign_id = %campaign_id, "Live instance already exists, not scheduling");
            return Ok(None);
        }

        let instance = MessageInstance {
            id: Uuid::new_v4(),
            campaign_id,
            scheduled_for,
            status: InstanceStatus::Scheduled,
            actual_sent_at: None,
            recipient_count: 0,
            success_count: 0,
            created_at: now,
            failure_detail: None,
        };
        self.instances.insert(instance.id, instance.clone());
        Ok(Some(instance))
    }

    /// Second concurrency-control point: atomically claims a due instance,
    /// Scheduled → Executing. Returns `None` when the instance is missing,
    /// not yet due, or already claimed by a concurrent worker — the losing
    /// worker simply does nothing.
    pub fn claim_due_instance(&self, id: Uuid, now: DateTime<Utc>) -> Option<MessageInstance> {
        let mut entry = self.instances.get_mut(&id)?;
        if entry.status != InstanceStatus::Scheduled || entry.scheduled_for > now {
            return None;
        }
        entry.status = InstanceStatus::Executing;
        Some(entry.clone())
    }

    /// Cancels every future Scheduled instance of a campaign. Sent, failed,
    /// and in-flight executing instances are untouched.
    pub fn cancel_pending_instances(&self, campaign_id: Uuid, now: DateTime<Utc>) -> usize {
        let mut cancelled = 0;
        for mut entry in self.instances.iter_mut() {
            let inst = entry.value_mut();
            if inst.campaign_id == campaign_id
                && inst.status == InstanceStatus::Scheduled
                && inst.scheduled_for > now
            {
                inst.status = InstanceStatus::Cancelled;
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Marks an executing instance Sent with its final counts.
    pub fn finalize_instance(
        &self,
        id: Uuid,
        recipient_count: u32,
        success_count: u32,
        now: DateTime<Utc>,
    ) -> OutreachResult<()> {
        let mut entry = self
            .instances
            .get_mut(&id)
            .ok_or_else(|| OutreachError::NotFound(format!("instance {id}")))?;
        entry.status = InstanceStatus::Sent;
        entry.actual_sent_at = Some(now);
        entry.recipient_count = recipient_count;
        entry.success_count = success_count;
        Ok(())
    }

    /// Marks an instance Failed before any send attempt was made.
    pub fn fail_instance(&self, id: Uuid, detail: &str) -> OutreachResult<()> {
        let mut entry = self
            .instances
            .get_mut(&id)
            .ok_or_else(|| OutreachError::NotFound(format!("instance {id}")))?;
        entry.status = InstanceStatus::Failed;
        entry.failure_detail = Some(detail.to_string());
        Ok(())
    }

    /// Cancels a single instance regardless of due time (cap reached while
    /// the instance was claimed).
    pub fn cancel_instance(&self, id: Uuid) -> OutreachResult<()> {
        let mut entry = self
            .instances
            .get_mut(&id)
            .ok_or_else(|| OutreachError::NotFound(format!("instance {id}")))?;
        entry.status = InstanceStatus::Cancelled;
        Ok(())
    }

    pub fn get_instance(&self, id: Uuid) -> Option<MessageInstance> {
        self.instances.get(&id).map(|r| r.value().clone())
    }

    /// Instances of a campaign, most recently scheduled first.
    pub fn recent_instances(&self, campaign_id: Uuid, limit: usize) -> Vec<MessageInstance> {
        let mut out: Vec<MessageInstance> = self
            .instances
            .iter()
            .filter(|r| r.value().campaign_id == campaign_id)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| b.scheduled_for.cmp(&a.scheduled_for));
        out.truncate(limit);
        out
    }

    /// Live (Scheduled or Executing) instances of a campaign.
    pub fn live_instances(&self, campaign_id: Uuid) -> Vec<MessageInstance> {
        self.instances
            .iter()
            .filter(|r| r.value().campaign_id == campaign_id && r.value().status.is_live())
            .map(|r| r.value().clone())
            .collect()
    }

    /// IDs of Scheduled instances whose time has come, for the dispatcher.
    pub fn due_instance_ids(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.instances
            .iter()
            .filter(|r| {
                r.value().status == InstanceStatus::Scheduled && r.value().scheduled_for <= now
            })
            .map(|r| *r.key())
            .collect()
    }

    // ─── Delivery logs ─────────────────────────────────────────────────────

    pub fn append_log(&self, log: DeliveryLog) {
        self.delivery_logs.insert(log.id, log);
    }

    pub fn logs_for_instance(&self, instance_id: Uuid) -> Vec<DeliveryLog> {
        let mut out: Vec<DeliveryLog> = self
            .delivery_logs
            .iter()
            .filter(|r| r.value().instance_id == instance_id)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| a.logged_at.cmp(&b.logged_at));
        out
    }

    /// Successfully sent messages across all instances of a campaign, used
    /// for the max-message cap.
    pub fn sent_count(&self, campaign_id: Uuid) -> u64 {
        self.delivery_logs
            .iter()
            .filter(|r| {
                r.value().campaign_id == campaign_id && r.value().outcome == DeliveryOutcome::Sent
            })
            .count() as u64
    }
}

impl Default for CampaignStore {
    fn default() -> Self {
        Self::new()
    }
}
