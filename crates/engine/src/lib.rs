//! Recurring message campaign engine.
//!
//! Turns a declarative campaign definition (who to message, how often, under
//! what stopping conditions) into a reliable, non-duplicating, resumable
//! sequence of send events over time. The anti-duplication contract: for any
//! campaign, at most one instance is ever scheduled or executing at a time.

pub mod audience;
pub mod directory;
pub mod dispatcher;
pub mod engine;
pub mod executor;
pub mod lifecycle;
pub mod schedule;
pub mod scheduler;
pub mod stop;
pub mod store;
pub mod templates;
pub mod transport;
pub mod types;

pub use engine::CampaignEngine;
pub use store::CampaignStore;
