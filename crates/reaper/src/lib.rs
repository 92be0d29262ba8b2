//! reaper: finds abandoned cloud resources and escalates them to termination
//!
//! Each cycle discovers instances, autoscaling groups, security groups,
//! volumes and stacks, works out which of them are dependencies of others,
//! filters the rest against configured groups, and walks every match through
//! a timed lifecycle. Owners are notified at each stage with signed links
//! that terminate, stop, whitelist, snooze or schedule the resource.

pub mod actions;
pub mod config;
pub mod error;
pub mod events;
pub mod filters;
pub mod inference;
pub mod prices;
pub mod provider;
pub mod reaper;
pub mod registry;
pub mod resource;
pub mod state;
pub mod token;

pub use error::{ProviderError, ReaperError};
