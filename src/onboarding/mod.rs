//! The member-onboarding workflow.
//!
//! [`Onboarding`] is the entry point: the host bot calls [`Onboarding::begin`]
//! when a member asks to join and forwards interactions and departures; one
//! engine task per applicant drives the stages from language selection through
//! staff review to resolution.

pub mod effects;
pub mod events;
pub mod model;
pub mod registry;
pub mod stage;
pub mod supervisor;

mod engine;

pub use engine::{HostEvent, Onboarding};
pub use events::{RawInteraction, ReviewAction, StageEvent};
pub use model::{FormFields, Language, Outcome, Session, ThreadRecord};
pub use stage::Stage;
