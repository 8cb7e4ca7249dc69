//! Recipient source-of-truth collaborator.
//!
//! The engine never owns parent records; it asks the directory for stable
//! identities at audience-resolution time and for obligation status when
//! evaluating stop conditions. Production: back this with the program's
//! parent/payment database.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Read-only view over the program's parent/payment records.
pub trait RecipientDirectory: Send + Sync {
    /// All parents currently active in the program.
    fn list_active(&self) -> Vec<String>;
    /// Parents with at least one overdue payment as of now.
    fn list_overdue(&self) -> Vec<String>;
    /// Parents holding an active payment plan of the named type.
    fn list_by_plan(&self, plan: &str) -> Vec<String>;
    /// Whether the identity still has an overdue payment.
    fn is_overdue(&self, identity: &str) -> bool;
    /// Whether the identity opted out of program messages.
    fn is_opted_out(&self, identity: &str) -> bool;
    /// Display name for template rendering; falls back to the identity.
    fn display_name(&self, identity: &str) -> String;
}

/// A parent entry in the in-memory directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub identity: String,
    pub name: String,
    pub active: bool,
    pub overdue: bool,
    pub payment_plan: Option<String>,
    pub opted_out: bool,
}

/// In-memory directory for development and testing.
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: DashMap<String, DirectoryEntry>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, entry: DirectoryEntry) {
        self.entries.insert(entry.identity.clone(), entry);
    }

    /// Mark an identity's overdue payment as settled.
    pub fn settle(&self, identity: &str) {
        if let Some(mut entry) = self.entries.get_mut(identity) {
            entry.overdue = false;
        }
    }

    pub fn opt_out(&self, identity: &str) {
        if let Some(mut entry) = self.entries.get_mut(identity) {
            entry.opted_out = true;
        }
    }

    /// Seeds a handful of parents for development mode.
    pub fn seed_demo_parents(&self) {
        let demo = [
            ("parent-ana", "Ana Moreau", true, false, Some("monthly")),
            ("parent-ben", "Ben Okafor", true, true, Some("monthly")),
            ("parent-cleo", "Cleo Tanaka", true, true, None),
            ("parent-dana", "Dana Weiss", true, false, Some("quarterly")),
            ("parent-eli", "Eli Navarro", false, false, None),
        ];
        for (identity, name, active, overdue, plan) in demo {
            self.insert(DirectoryEntry {
                identity: identity.to_string(),
                name: name.to_string(),
                active,
                overdue,
                payment_plan: plan.map(str::to_string),
                opted_out: false,
            });
        }
    }
}

impl RecipientDirectory for InMemoryDirectory {
    fn list_active(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().active)
            .map(|e| e.key().clone())
            .collect();
        out.sort();
        out
    }

    fn list_overdue(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().active && e.value().overdue)
            .map(|e| e.key().clone())
            .collect();
        out.sort();
        out
    }

    fn list_by_plan(&self, plan: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().active && e.value().payment_plan.as_deref() == Some(plan))
            .map(|e| e.key().clone())
            .collect();
        out.sort();
        out
    }

    fn is_overdue(&self, identity: &str) -> bool {
        self.entries
            .get(identity)
            .map(|e| e.overdue)
            .unwrap_or(false)
    }

    fn is_opted_out(&self, identity: &str) -> bool {
        self.entries
            .get(identity)
            .map(|e| e.opted_out)
            .unwrap_or(false)
    }

    fn display_name(&self, identity: &str) -> String {
        self.entries
            .get(identity)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| identity.to_string())
    }
}

/// Convenience: a shared demo directory.
pub fn demo_directory() -> Arc<InMemoryDirectory> {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.seed_demo_parents();
    directory
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_filters() {
        let directory = demo_directory();

        // Inactive parents never appear in any listing.
        assert!(!directory.list_active().contains(&"parent-eli".to_string()));

        let overdue = directory.list_overdue();
        assert_eq!(overdue, vec!["parent-ben", "parent-cleo"]);

        let monthly = directory.list_by_plan("monthly");
        assert_eq!(monthly, vec!["parent-ana", "parent-ben"]);
    }

    #[test]
    fn test_settle_clears_overdue() {
        let directory = demo_directory();
        assert!(directory.is_overdue("parent-ben"));
        directory.settle("parent-ben");
        assert!(!directory.is_overdue("parent-ben"));
    }

    #[test]
    fn test_unknown_identity_defaults() {
        let directory = InMemoryDirectory::new();
        assert!(!directory.is_overdue("nobody"));
        assert!(!directory.is_opted_out("nobody"));
        assert_eq!(directory.display_name("nobody"), "nobody");
    }
}
