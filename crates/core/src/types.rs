use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Delivery channel for campaign messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Lifecycle and delivery events emitted by the campaign engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CampaignCreated,
    CampaignPaused,
    CampaignResumed,
    CampaignStopped,
    CampaignEnded,
    AudienceRefreshed,
    InstanceScheduled,
    InstanceExecuted,
    MessageSent,
    MessageFailed,
    RecipientStopped,
}

/// An event record routed through the [`crate::event_bus::EventSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub campaign_id: Option<Uuid>,
    pub instance_id: Option<Uuid>,
    pub recipient: Option<String>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}
