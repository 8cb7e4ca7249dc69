//! Campaign lifecycle — a finite set of valid phase transitions.

use outreach_core::{OutreachError, OutreachResult};

use crate::types::CampaignPhase;

/// Describes a single valid phase transition for a campaign.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTransition {
    pub from: CampaignPhase,
    pub to: CampaignPhase,
    pub trigger: &'static str,
}

/// Valid campaign phase transitions. `Ended` and `Stopped` are terminal:
/// nothing leaves them.
pub const TRANSITIONS: &[PhaseTransition] = &[
    PhaseTransition {
        from: CampaignPhase::Active,
        to: CampaignPhase::Paused,
        trigger: "pause",
    },
    PhaseTransition {
        from: CampaignPhase::Paused,
        to: CampaignPhase::Active,
        trigger: "resume",
    },
    PhaseTransition {
        from: CampaignPhase::Active,
        to: CampaignPhase::Ended,
        trigger: "schedule_exhausted",
    },
    PhaseTransition {
        from: CampaignPhase::Active,
        to: CampaignPhase::Stopped,
        trigger: "delete",
    },
    PhaseTransition {
        from: CampaignPhase::Paused,
        to: CampaignPhase::Stopped,
        trigger: "delete",
    },
];

/// Returns `true` if the given transition is allowed.
pub fn can_transition(from: CampaignPhase, to: CampaignPhase) -> bool {
    TRANSITIONS.iter().any(|t| t.from == from && t.to == to)
}

/// Checks a transition, returning `InvalidTransition` if not permitted.
pub fn check_transition(from: CampaignPhase, to: CampaignPhase) -> OutreachResult<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(OutreachError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
