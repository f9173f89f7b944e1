//! Typed stage events and the adapter that derives them from raw platform
//! interactions.
//!
//! The engine only ever sees [`StageEvent`]s. Hosts that already decode their
//! platform's interaction payloads can deliver them directly; hosts that
//! forward raw component/modal interactions go through [`decode_interaction`],
//! which understands the custom-id scheme used on every panel this crate
//! sends. Anything unparseable is dropped, never an error; the session keeps
//! waiting for a valid event.

use std::collections::HashMap;

use crate::ids::{RoleId, UserId};

use super::model::FormFields;
use super::stage::Stage;

/// A staff decision on an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Accept,
    Decline {
        /// Falls back to the configured default when the form left it blank.
        reason: Option<String>,
        ban: bool,
    },
    /// Send the applicant back to recapture their introduction.
    MoreInfo,
    /// Post the canned learning-resources reply; review stays open.
    Redirect,
}

/// An event consumed by the stage engine.
///
/// Which stage an event applies to is decided by the engine against the
/// session's current stage; a `SelectionSubmitted` means "the language pick"
/// in `LanguageSelect` and "the primary pick" in `PrimaryLanguageSelect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// The applicant submitted a select component.
    SelectionSubmitted { selected: Vec<RoleId> },
    /// The applicant (or, for more-info recapture, staff) submitted a form.
    FormSubmitted { fields: FormFields },
    /// A staff member pressed a review action.
    Review {
        reviewer_id: UserId,
        action: ReviewAction,
    },
    /// The applicant left the guild mid-flight.
    ApplicantLeft,
    /// Injected by the timeout supervisor. `generation` identifies the arming
    /// that produced it; the engine discards a firing whose generation no
    /// longer matches the live timer. The stage alone would not do: stages
    /// like `MoreInfoRequested` are re-enterable, so an old visit's timer
    /// could otherwise pass for the current one.
    StageTimedOut { stage: Stage, generation: u64 },
}

/// A raw component or modal interaction as the host receives it from the
/// platform, stripped of everything the workflow does not need.
#[derive(Debug, Clone)]
pub struct RawInteraction {
    /// The member who interacted (applicant or reviewer).
    pub user: UserId,
    pub custom_id: String,
    /// Selected values for select components.
    pub values: Vec<String>,
    /// Field id → submitted text, for modal submissions.
    pub text_fields: HashMap<String, String>,
}

/// Custom-id construction and parsing for the panels this crate sends.
pub mod custom_ids {
    use crate::ids::UserId;

    pub const LANG: &str = "lang";
    pub const PRIMARY: &str = "primary";
    pub const INTRO: &str = "intro";
    pub const REVIEW: &str = "review";
    pub const DECLINE: &str = "decline";
    pub const MORE_INFO: &str = "more_info";

    /// Sentinel select value for "a language we did not list".
    pub const OTHER_VALUE: &str = "other";

    /// Field ids inside form submissions.
    pub const FIELD_INTRODUCTION: &str = "introduction";
    pub const FIELD_OTHER_LANGUAGES: &str = "other_languages";
    pub const FIELD_REASON: &str = "reason";
    pub const FIELD_BAN: &str = "ban";

    pub fn format(kind: &str, applicant: UserId) -> String {
        format!("onboard:{kind}:{applicant}")
    }

    /// Review buttons carry the action as a fourth segment.
    pub fn format_review(applicant: UserId, action: &str) -> String {
        format!("onboard:{}:{applicant}:{action}", REVIEW)
    }

    /// Split `onboard:<kind>:<applicant>[:<action>]`.
    pub fn parse(custom_id: &str) -> Option<(&str, UserId, Option<&str>)> {
        let mut parts = custom_id.splitn(4, ':');
        if parts.next()? != "onboard" {
            return None;
        }
        let kind = parts.next()?;
        let applicant = parts.next()?.parse::<u64>().ok().map(UserId)?;
        Some((kind, applicant, parts.next()))
    }
}

/// Decode a raw interaction into `(applicant, event)`, or `None` if it is not
/// ours, is malformed, or comes from the wrong member.
///
/// Applicant-facing components must be submitted by the applicant themselves;
/// review components may come from any staff member (staff gating happens in
/// the host before the interaction reaches us).
pub fn decode_interaction(raw: &RawInteraction) -> Option<(UserId, StageEvent)> {
    let (kind, applicant, action) = custom_ids::parse(&raw.custom_id)?;

    match kind {
        custom_ids::LANG | custom_ids::PRIMARY => {
            if raw.user != applicant {
                return None;
            }
            let selected = raw
                .values
                .iter()
                .filter(|v| *v != custom_ids::OTHER_VALUE)
                .filter_map(|v| v.parse::<u64>().ok())
                .map(RoleId)
                .collect();
            Some((applicant, StageEvent::SelectionSubmitted { selected }))
        }
        custom_ids::INTRO => {
            if raw.user != applicant {
                return None;
            }
            Some((applicant, StageEvent::FormSubmitted { fields: form_fields(raw) }))
        }
        custom_ids::MORE_INFO => {
            // Staff may transcribe the replacement introduction on the
            // applicant's behalf, so no author check here.
            Some((applicant, StageEvent::FormSubmitted { fields: form_fields(raw) }))
        }
        custom_ids::REVIEW => {
            let action = match action? {
                "accept" => ReviewAction::Accept,
                "more_info" => ReviewAction::MoreInfo,
                "redirect" => ReviewAction::Redirect,
                _ => return None,
            };
            Some((
                applicant,
                StageEvent::Review {
                    reviewer_id: raw.user,
                    action,
                },
            ))
        }
        custom_ids::DECLINE => {
            let reason = raw
                .text_fields
                .get(custom_ids::FIELD_REASON)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(String::from);
            let ban = raw
                .text_fields
                .get(custom_ids::FIELD_BAN)
                .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
                .unwrap_or(false);
            Some((
                applicant,
                StageEvent::Review {
                    reviewer_id: raw.user,
                    action: ReviewAction::Decline { reason, ban },
                },
            ))
        }
        _ => None,
    }
}

fn form_fields(raw: &RawInteraction) -> FormFields {
    FormFields {
        introduction: raw
            .text_fields
            .get(custom_ids::FIELD_INTRODUCTION)
            .cloned()
            .unwrap_or_default(),
        other_languages: raw
            .text_fields
            .get(custom_ids::FIELD_OTHER_LANGUAGES)
            .cloned()
            .filter(|s| !s.is_empty()),
    }
}
