//! Stop-condition evaluator.
//!
//! Conditions are evaluated after each send, not proactively: a recipient who
//! should have stopped receives at most one more message than ideal before
//! deactivation. This latency is an accepted trade-off for engine simplicity.

use std::sync::Arc;

use crate::directory::RecipientDirectory;
use crate::types::{Campaign, Recipient, StopCondition, StopReason};

/// Verdict for one recipient after a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopVerdict {
    Continue,
    Stop(StopReason),
}

pub struct StopConditionEvaluator {
    directory: Arc<dyn RecipientDirectory>,
}

impl StopConditionEvaluator {
    pub fn new(directory: Arc<dyn RecipientDirectory>) -> Self {
        Self { directory }
    }

    /// Checks the campaign's declared conditions against the recipient's
    /// current state. The first matching condition wins.
    pub fn evaluate(&self, campaign: &Campaign, recipient: &Recipient) -> StopVerdict {
        for condition in &campaign.stop_conditions {
            match condition {
                StopCondition::ObligationResolved => {
                    if !self.directory.is_overdue(&recipient.identity) {
                        return StopVerdict::Stop(StopReason::ObligationResolved);
                    }
                }
                StopCondition::OptedOut => {
                    if self.directory.is_opted_out(&recipient.identity) {
                        return StopVerdict::Stop(StopReason::OptedOut);
                    }
                }
            }
        }
        StopVerdict::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::demo_directory;
    use crate::store::tests_support::sample_campaign;
    use chrono::Utc;
    use uuid::Uuid;

    fn recipient_for(identity: &str, campaign_id: Uuid) -> Recipient {
        Recipient {
            id: Uuid::new_v4(),
            campaign_id,
            identity: identity.to_string(),
            display_name: identity.to_string(),
            is_active: true,
            stopped_at: None,
            stop_reason: None,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_conditions_always_continues() {
        let directory = demo_directory();
        let evaluator = StopConditionEvaluator::new(directory);
        let campaign = sample_campaign();
        let recipient = recipient_for("parent-ana", campaign.id);
        assert_eq!(evaluator.evaluate(&campaign, &recipient), StopVerdict::Continue);
    }

    #[test]
    fn test_obligation_resolved_stops_recipient() {
        let directory = demo_directory();
        let evaluator = StopConditionEvaluator::new(directory.clone());
        let mut campaign = sample_campaign();
        campaign.stop_conditions = vec![StopCondition::ObligationResolved];

        let recipient = recipient_for("parent-ben", campaign.id);
        // Still overdue: keeps going.
        assert_eq!(evaluator.evaluate(&campaign, &recipient), StopVerdict::Continue);

        directory.settle("parent-ben");
        assert_eq!(
            evaluator.evaluate(&campaign, &recipient),
            StopVerdict::Stop(StopReason::ObligationResolved)
        );
    }

    #[test]
    fn test_opt_out_stops_recipient() {
        let directory = demo_directory();
        let evaluator = StopConditionEvaluator::new(directory.clone());
        let mut campaign = sample_campaign();
        campaign.stop_conditions = vec![StopCondition::OptedOut];

        directory.opt_out("parent-cleo");
        let recipient = recipient_for("parent-cleo", campaign.id);
        assert_eq!(
            evaluator.evaluate(&campaign, &recipient),
            StopVerdict::Stop(StopReason::OptedOut)
        );
    }
}
