//! Gatehouse: member-onboarding workflow core.
//!
//! The host bot wires a platform [`platform::Gateway`] and a
//! [`store::Database`] into [`onboarding::Onboarding`], then feeds it raw
//! interaction events. Everything else (the per-applicant state machine,
//! stage timeouts, and the side effects of acceptance or removal) happens
//! in here.

pub mod config;
pub mod error;
pub mod ids;
pub mod onboarding;
pub mod platform;
pub mod store;

#[cfg(test)]
pub(crate) mod testkit;

pub use error::{Error, Result};
