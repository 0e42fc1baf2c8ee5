// Core moderation module - contains the moderation engine and its parts.
// Following the same pattern as the other core modules: models, ports,
// and services here, platform adapters in `discord/`.

pub mod content_classifier;
pub mod moderation_config;
pub mod moderation_models;
pub mod moderation_ports;
pub mod moderation_service;
pub mod mute_scheduler;
pub mod normalizer;
pub mod rate_tracker;
pub mod user_state;
pub mod user_locks;
pub mod warning_ledger;

#[cfg(test)]
pub mod test_support;

pub use moderation_config::ModerationPolicy;
pub use moderation_models::*;
pub use moderation_ports::*;
pub use moderation_service::ModerationEngine;
