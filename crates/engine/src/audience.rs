//! Audience resolver — turns an audience descriptor into recipient identities
//! and materializes them as a campaign roster.
//!
//! Resolution is deterministic against the directory's state at call time. It
//! runs once at campaign creation (the roster is a frozen snapshot) and again
//! only through the explicit refresh operation, which is additive: parents
//! who matched earlier are never removed by a refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::directory::RecipientDirectory;
use crate::store::CampaignStore;
use crate::types::AudienceSpec;

pub struct AudienceResolver {
    directory: Arc<dyn RecipientDirectory>,
}

impl AudienceResolver {
    pub fn new(directory: Arc<dyn RecipientDirectory>) -> Self {
        Self { directory }
    }

    /// Resolves the audience descriptor to identities, in directory order.
    /// Explicit lists are admitted as-is; unresolved identities are not
    /// rejected here — validation, if any, happens at dispatch time.
    pub fn resolve(&self, audience: &AudienceSpec) -> Vec<String> {
        match audience {
            AudienceSpec::AllActive => self.directory.list_active(),
            AudienceSpec::OverduePayments => self.directory.list_overdue(),
            AudienceSpec::ExplicitList { identities } => identities.clone(),
            AudienceSpec::PaymentPlanCohort { plan } => self.directory.list_by_plan(plan),
        }
    }

    /// Resolves and persists one Recipient row per identity, skipping
    /// identities already on the roster. Returns the number added.
    pub fn materialize(
        &self,
        store: &CampaignStore,
        campaign_id: Uuid,
        audience: &AudienceSpec,
        now: DateTime<Utc>,
    ) -> usize {
        let identities = self.resolve(audience);
        let entries: Vec<(String, String)> = identities
            .into_iter()
            .map(|identity| {
                let name = self.directory.display_name(&identity);
                (identity, name)
            })
            .collect();

        let added = store.add_recipients(campaign_id, entries, now);
        info!(campaign_id = %campaign_id, added, "Audience materialized");
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::demo_directory;
    use crate::store::tests_support::sample_campaign;

    #[test]
    fn test_resolve_overdue() {
        let resolver = AudienceResolver::new(demo_directory());
        let identities = resolver.resolve(&AudienceSpec::OverduePayments);
        assert_eq!(identities, vec!["parent-ben", "parent-cleo"]);
    }

    #[test]
    fn test_resolve_explicit_list_admits_unknown_ids() {
        let resolver = AudienceResolver::new(demo_directory());
        let identities = resolver.resolve(&AudienceSpec::ExplicitList {
            identities: vec!["parent-ana".into(), "no-such-parent".into()],
        });
        assert_eq!(identities.len(), 2);
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let directory = demo_directory();
        let resolver = AudienceResolver::new(directory);
        let store = CampaignStore::new();
        let campaign = sample_campaign();
        let id = campaign.id;
        let now = campaign.created_at;
        store.insert_campaign(campaign);

        let added = resolver.materialize(&store, id, &AudienceSpec::AllActive, now);
        assert_eq!(added, 4);

        // Re-materializing the same audience adds nothing.
        let added = resolver.materialize(&store, id, &AudienceSpec::AllActive, now);
        assert_eq!(added, 0);
        assert_eq!(store.active_recipients(id).len(), 4);
    }

    #[test]
    fn test_refresh_picks_up_new_matches() {
        let directory = demo_directory();
        let resolver = AudienceResolver::new(directory.clone());
        let store = CampaignStore::new();
        let campaign = sample_campaign();
        let id = campaign.id;
        let now = campaign.created_at;
        store.insert_campaign(campaign);

        resolver.materialize(&store, id, &AudienceSpec::OverduePayments, now);
        assert_eq!(store.active_recipients(id).len(), 2);

        // Dana falls behind after creation; a refresh picks her up.
        directory.insert(crate::directory::DirectoryEntry {
            identity: "parent-dana".into(),
            name: "Dana Weiss".into(),
            active: true,
            overdue: true,
            payment_plan: Some("quarterly".into()),
            opted_out: false,
        });
        let added = resolver.materialize(&store, id, &AudienceSpec::OverduePayments, now);
        assert_eq!(added, 1);
        assert_eq!(store.active_recipients(id).len(), 3);
    }
}
