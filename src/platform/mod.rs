//! Chat-platform seam.
//!
//! The real client (gateway connection, rate limiting, embeds) lives in the
//! host bot; this module only defines the calls the workflow makes against it.

pub mod gateway;

pub use gateway::{Component, Gateway, Notice, NoticeColor, Panel, SelectOption};
