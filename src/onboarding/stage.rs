//! Onboarding stage graph: which stage a session is in and where it may go.

use serde::{Deserialize, Serialize};

/// The stages of the onboarding workflow.
///
/// Forward path: `LanguageSelect → [PrimaryLanguageSelect] → Intake →
/// StaffReview → {Accepted | Declined} → Closed`. `PrimaryLanguageSelect` is
/// skipped when fewer than two languages were chosen. `MoreInfoRequested` is
/// the one allowed loop: staff send the applicant back for a replacement
/// introduction, then review resumes. `Aborted` is reachable from every
/// non-terminal stage via timeout, explicit cancellation, or the applicant
/// leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LanguageSelect,
    PrimaryLanguageSelect,
    Intake,
    StaffReview,
    MoreInfoRequested,
    Accepted,
    Declined,
    Closed,
    Aborted,
}

impl Stage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        if self.is_terminal() {
            return false;
        }
        // Any live stage may abort.
        if target == Aborted {
            return true;
        }
        matches!(
            (self, target),
            (LanguageSelect, PrimaryLanguageSelect)
                | (LanguageSelect, Intake)
                | (PrimaryLanguageSelect, Intake)
                | (Intake, StaffReview)
                | (StaffReview, MoreInfoRequested)
                | (MoreInfoRequested, StaffReview)
                | (StaffReview, Accepted)
                | (StaffReview, Declined)
                | (Accepted, Closed)
                | (Declined, Closed)
        )
    }

    /// Whether this stage ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }

    /// Whether the session is still waiting on the applicant (as opposed to
    /// staff). Applicant-facing stages carry a timeout; review does not.
    pub fn is_applicant_facing(&self) -> bool {
        matches!(
            self,
            Self::LanguageSelect | Self::PrimaryLanguageSelect | Self::Intake | Self::MoreInfoRequested
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LanguageSelect => "language_select",
            Self::PrimaryLanguageSelect => "primary_language_select",
            Self::Intake => "intake",
            Self::StaffReview => "staff_review",
            Self::MoreInfoRequested => "more_info_requested",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}
