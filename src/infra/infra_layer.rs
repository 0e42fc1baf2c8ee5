// The infra module contains implementations of core concerns that touch
// the outside world (files, environment).
// Each feature implementation goes in its own submodule.

#[path = "moderation/mod.rs"]
pub mod moderation;
