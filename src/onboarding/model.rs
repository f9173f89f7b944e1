//! Domain records: languages, sessions, and thread bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{MessageId, RoleId, ThreadId, UserId};

use super::stage::Stage;

/// A registered programming-language community role.
///
/// Created and removed by staff administrative commands; read-only from the
/// workflow's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub role_id: RoleId,
    pub role_name: String,
    /// Rendered emoji (e.g. `<:rust:123>` or a unicode glyph).
    pub emoji_repr: String,
}

/// Durable row linking a scratch thread to its applicant, so orphaned threads
/// can be identified and reclaimed after a crash or departure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub thread_id: ThreadId,
    pub applicant_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Free-text fields captured from the intake form.
///
/// Minimum-length enforcement happens in the form itself; by the time a
/// submission reaches the engine these are taken as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormFields {
    pub introduction: String,
    pub other_languages: Option<String>,
}

/// Terminal outcome of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Declined,
    Aborted,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// In-memory record of one applicant's progress through the stages.
///
/// Owned exclusively by the session task; never persisted (an in-flight
/// session does not survive a restart, by design).
#[derive(Debug, Clone)]
pub struct Session {
    /// Instance id, used only for log correlation.
    pub id: Uuid,
    pub applicant_id: UserId,
    /// Display name at session start, used for thread naming and summaries.
    pub display_name: String,
    pub thread_id: ThreadId,
    /// The panel message being edited as stages advance.
    pub panel_message: Option<MessageId>,
    pub started_at: DateTime<Utc>,
    pub stage: Stage,
    /// Selection order preserved; unique by role id.
    pub selected_languages: Vec<Language>,
    /// Set only when more than one language was selected, or inferred when
    /// exactly one was.
    pub primary_language: Option<Language>,
    pub intake_text: String,
    pub other_languages_text: Option<String>,
    /// Staff member who resolved the session.
    pub reviewer_id: Option<UserId>,
    /// Set when review looped through the more-info recapture.
    pub more_info_requested: bool,
}

impl Session {
    pub fn new(applicant_id: UserId, display_name: impl Into<String>, thread_id: ThreadId) -> Self {
        Self {
            id: Uuid::new_v4(),
            applicant_id,
            display_name: display_name.into(),
            thread_id,
            panel_message: None,
            started_at: Utc::now(),
            stage: Stage::LanguageSelect,
            selected_languages: Vec::new(),
            primary_language: None,
            intake_text: String::new(),
            other_languages_text: None,
            reviewer_id: None,
            more_info_requested: false,
        }
    }

    /// Record the applicant's language selection, deduplicated but keeping
    /// selection order. Unknown ids have already been filtered out by the
    /// caller against the catalog.
    pub fn select_languages(&mut self, languages: Vec<Language>) {
        self.selected_languages.clear();
        for lang in languages {
            if !self.selected_languages.iter().any(|l| l.role_id == lang.role_id) {
                self.selected_languages.push(lang);
            }
        }
    }

    /// Mark one of the selected languages as primary. Returns false if the
    /// role id was not among the selection.
    pub fn set_primary(&mut self, role_id: RoleId) -> bool {
        match self
            .selected_languages
            .iter()
            .find(|l| l.role_id == role_id)
        {
            Some(lang) => {
                self.primary_language = Some(lang.clone());
                true
            }
            None => false,
        }
    }

    /// Role ids to grant on acceptance.
    pub fn selected_role_ids(&self) -> Vec<RoleId> {
        self.selected_languages.iter().map(|l| l.role_id).collect()
    }

    /// The application summary shown to staff and posted on resolution.
    pub fn application_summary(&self) -> String {
        let mut langs = String::new();
        for lang in &self.selected_languages {
            langs.push_str(&lang.emoji_repr);
            langs.push_str("  ");
        }
        if langs.is_empty() {
            langs.push_str("(none listed)");
        }

        let mut summary = format!(
            "**Introduction:**\n{}\n\n**Languages:**\n{}",
            self.intake_text, langs
        );
        if let Some(other) = self.other_languages_text.as_deref().filter(|s| !s.is_empty()) {
            summary.push_str(&format!("\n\n**Other Languages:**\n```{other}```"));
        }
        summary
    }
}
