//! Shared test utilities for the reaper
//!
//! ## Modules
//!
//! - [`fakes`]: in-memory discovery plus recording mutator and notifier
//! - [`fixtures`]: snapshot builders and a ready-to-use test config

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeDiscovery, MutatorCall, RecordingMutator, RecordingNotifier};
pub use fixtures::{
    SnapshotExt, TEST_REGION, TEST_SECRET, asg, instance, security_group, stack, test_config,
    volume,
};
