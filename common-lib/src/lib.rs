//! Shared plumbing for event-driven control plane services.

pub mod broadcaster;
pub mod event_state_machine;
