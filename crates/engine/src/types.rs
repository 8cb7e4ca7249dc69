use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use outreach_core::types::Channel;

/// A recurring message campaign definition.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub channel: Channel,
    /// Message body with `{variable}` placeholders.
    pub body_template: String,
    /// Optional subject line (email campaigns), same placeholder syntax.
    pub subject_template: Option<String>,
    pub interval: IntervalSpec,
    pub audience: AudienceSpec,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    /// Campaign-wide cap on successfully sent messages across all instances.
    pub max_messages: Option<u32>,
    pub stop_conditions: Vec<StopCondition>,
    /// Campaign-declared template variables, merged under the built-ins.
    pub template_vars: HashMap<String, String>,
    pub phase: CampaignPhase,
    /// Set together with `paused_reason` on pause, cleared together on resume.
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle phase of a campaign.
///
/// `Ended` is a distinct persisted phase (end date passed or max-message cap
/// reached), not inferred from the absence of a scheduled instance. `Ended`
/// and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CampaignPhase {
    Active,
    Paused,
    Ended,
    Stopped,
}

impl std::fmt::Display for CampaignPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignPhase::Active => write!(f, "active"),
            CampaignPhase::Paused => write!(f, "paused"),
            CampaignPhase::Ended => write!(f, "ended"),
            CampaignPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// How often a campaign fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IntervalSpec {
    pub kind: IntervalKind,
    /// Multiplier: every N days/weeks/months. Must be at least 1.
    pub every: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum IntervalKind {
    Daily,
    Weekly,
    Monthly,
    /// Placeholder for a pluggable cron-style schedule. Carried through
    /// serde but currently scheduled with a daily fallback.
    Custom { descriptor: String },
}

/// Who a campaign messages. Resolved once at creation into a frozen roster;
/// `refresh_audience` is the explicit re-resolution operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AudienceSpec {
    /// Every active parent in the program.
    AllActive,
    /// Parents with at least one overdue payment as of resolution time.
    OverduePayments,
    /// A caller-supplied identity list. Unresolved identities are admitted
    /// as-is; validation happens downstream at dispatch time.
    ExplicitList { identities: Vec<String> },
    /// Parents holding an active payment plan of the named type.
    PaymentPlanCohort { plan: String },
}

/// A rule that ends a recipient's participation early. Evaluated after each
/// send, not proactively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    /// The recipient's overdue obligation has since been settled.
    ObligationResolved,
    /// The recipient opted out of program messages.
    OptedOut,
}

/// Why a recipient or the whole roster was deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ObligationResolved,
    OptedOut,
    ManualStop,
    CampaignStopped,
}

/// A materialized audience member of one campaign.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Recipient {
    pub id: Uuid,
    pub campaign_id: Uuid,
    /// Stable identity in the recipient source-of-truth.
    pub identity: String,
    pub display_name: String,
    pub is_active: bool,
    /// Set together with `stop_reason` when the recipient is deactivated.
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub added_at: DateTime<Utc>,
}

/// One concrete scheduled firing of a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageInstance {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    pub status: InstanceStatus,
    pub actual_sent_at: Option<DateTime<Utc>>,
    /// Active recipients at execution time.
    pub recipient_count: u32,
    /// Recipients whose dispatch succeeded.
    pub success_count: u32,
    pub created_at: DateTime<Utc>,
    /// Populated when the instance fails before any send attempt.
    pub failure_detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Scheduled,
    Executing,
    Sent,
    Failed,
    Cancelled,
}

impl InstanceStatus {
    /// Scheduled and executing instances count against the one-live-instance
    /// invariant.
    pub fn is_live(&self) -> bool {
        matches!(self, InstanceStatus::Scheduled | InstanceStatus::Executing)
    }
}

/// Append-only per-recipient outcome within one instance execution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryLog {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub campaign_id: Uuid,
    pub recipient_id: Uuid,
    pub outcome: DeliveryOutcome,
    pub detail: Option<String>,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// Request payload for creating a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub channel: Channel,
    pub body_template: String,
    #[serde(default)]
    pub subject_template: Option<String>,
    pub interval: IntervalSpec,
    pub audience: AudienceSpec,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_messages: Option<u32>,
    #[serde(default)]
    pub stop_conditions: Vec<StopCondition>,
    #[serde(default)]
    pub template_vars: HashMap<String, String>,
}

/// Full campaign view: definition plus recent instances and the live roster.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CampaignDetail {
    pub campaign: Campaign,
    pub recent_instances: Vec<MessageInstance>,
    pub active_recipients: Vec<Recipient>,
}
