//! OpenAPI specification and Swagger UI configuration.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Outreach API",
        version = "0.1.0",
        description = "Recurring message campaign engine for a youth program.\n\nCampaigns resolve an audience once at creation, then fire on a daily/weekly/monthly cadence until an end date, a max-message cap, or a manual stop.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Campaigns", description = "Recurring campaign lifecycle operations"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        // Campaigns
        crate::rest::create_campaign,
        crate::rest::list_campaigns,
        crate::rest::get_campaign,
        crate::rest::pause_campaign,
        crate::rest::resume_campaign,
        crate::rest::delete_campaign,
        crate::rest::refresh_audience,
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        // Engine types
        outreach_engine::types::Campaign,
        outreach_engine::types::CampaignDetail,
        outreach_engine::types::CampaignPhase,
        outreach_engine::types::CreateCampaignRequest,
        outreach_engine::types::IntervalSpec,
        outreach_engine::types::IntervalKind,
        outreach_engine::types::AudienceSpec,
        outreach_engine::types::StopCondition,
        outreach_engine::types::StopReason,
        outreach_engine::types::Recipient,
        outreach_engine::types::MessageInstance,
        outreach_engine::types::InstanceStatus,
        outreach_core::types::Channel,
        // REST envelope types
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
        crate::rest::PauseRequest,
        crate::rest::RefreshResponse,
    ))
)]
pub struct ApiDoc;
