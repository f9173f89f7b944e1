//! Stage Engine: drives one session task per applicant.
//!
//! Each session is a single-writer actor: it owns its `Session` outright and
//! consumes a mailbox of [`StageEvent`]s. Timers race the mailbox by
//! injecting `StageTimedOut` into it, so every transition (forward, abort,
//! or timeout) serializes through one `recv` loop and no side effect can be
//! issued twice. Platform and store I/O happens inside the task without any
//! cross-session lock held.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::config::OnboardConfig;
use crate::error::{Result, SessionError};
use crate::ids::{ThreadId, UserId};
use crate::platform::{Gateway, Panel};
use crate::store::Database;

use super::effects::{GrantReport, SideEffectExecutor};
use super::events::{RawInteraction, ReviewAction, StageEvent, decode_interaction};
use super::model::{Language, Outcome, Session};
use super::registry::{SessionRegistry, SessionSlot};
use super::stage::Stage;
use super::supervisor::{self, TimerHandle};

/// An inbound event as the host bot hands it over: either a raw component or
/// modal interaction, or a member-departure notification.
#[derive(Debug, Clone)]
pub enum HostEvent {
    Interaction(RawInteraction),
    MemberLeft(UserId),
}

/// Every stage write goes through here so an illegal edge is caught in debug
/// builds.
fn advance(session: &mut Session, next: Stage) {
    debug_assert!(
        session.stage.can_transition_to(next),
        "illegal stage transition {} -> {next}",
        session.stage
    );
    session.stage = next;
}

/// What applying one event did to the session.
enum Flow {
    /// Event ignored or handled without a stage change; keep waiting.
    Stay,
    /// Stage changed; re-arm the timer for the new stage.
    Advanced,
    /// Session reached a terminal stage.
    Finished,
}

/// The onboarding workflow entry point.
///
/// Owns the session registry and spawns one engine task per applicant. The
/// host wires in the platform gateway and record store and forwards events;
/// everything else is internal.
pub struct Onboarding {
    config: OnboardConfig,
    gateway: Arc<dyn Gateway>,
    store: Arc<dyn Database>,
    effects: SideEffectExecutor,
    registry: SessionRegistry,
}

impl Onboarding {
    pub fn new(
        config: OnboardConfig,
        gateway: Arc<dyn Gateway>,
        store: Arc<dyn Database>,
    ) -> Arc<Self> {
        let effects = SideEffectExecutor::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            config.clone(),
        );
        Arc::new(Self {
            config,
            gateway,
            store,
            effects,
            registry: SessionRegistry::new(),
        })
    }

    /// Start onboarding for an applicant: claim the session slot, open the
    /// scratch thread, present the language panel, and spawn the session task.
    ///
    /// Fails closed with [`SessionError::CatalogUnavailable`] when the record
    /// store cannot produce the language catalog; a session without it would
    /// be broken from the first panel.
    pub async fn begin(self: &Arc<Self>, applicant: UserId) -> Result<ThreadId> {
        let slot = self.registry.claim(applicant)?;
        match self.start_session(applicant, slot).await {
            Ok(thread) => Ok(thread),
            Err(e) => {
                // Whatever partially happened is surfaced to the caller; the
                // key must be reusable either way.
                self.registry.end(applicant);
                Err(e)
            }
        }
    }

    async fn start_session(
        self: &Arc<Self>,
        applicant: UserId,
        slot: SessionSlot,
    ) -> Result<ThreadId> {
        let catalog = self
            .store
            .get_languages()
            .await
            .map_err(SessionError::CatalogUnavailable)?;

        let display_name = self.gateway.display_name(applicant).await?;

        // The applicant role marks the application as in flight and gates the
        // rest of the guild until staff decide.
        self.gateway
            .add_roles(applicant, &[self.config.applicant_role])
            .await?;

        let thread = self
            .gateway
            .open_thread(
                self.config.welcome_channel,
                &format!("Welcome {display_name}"),
                applicant,
            )
            .await?;

        // Durable bookkeeping first, so a crash after this point leaves a
        // reclaimable record rather than an invisible orphan thread.
        self.store
            .record_thread(thread, applicant, Utc::now())
            .await?;

        let mut session = Session::new(applicant, display_name, thread);
        let panel = panels::language_select(&catalog, applicant);
        session.panel_message = Some(self.gateway.send_panel(thread, panel).await?);

        info!(
            %applicant,
            session = %session.id,
            %thread,
            "Onboarding session started"
        );

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_session(session, slot, catalog).await;
        });

        Ok(thread)
    }

    /// Decode and route a raw interaction. Anything unparseable or aimed at
    /// an unknown session is dropped silently.
    pub async fn handle_interaction(&self, raw: RawInteraction) {
        match decode_interaction(&raw) {
            Some((applicant, event)) => self.registry.route(applicant, event).await,
            None => debug!(custom_id = %raw.custom_id, "Ignoring unrelated interaction"),
        }
    }

    /// Notify the workflow that a member left the guild. A no-op unless they
    /// have a session in flight.
    pub async fn member_left(&self, user: UserId) {
        self.registry.route(user, StageEvent::ApplicantLeft).await;
    }

    /// Deliver an already-typed stage event, for hosts that decode platform
    /// payloads themselves.
    pub async fn deliver(&self, applicant: UserId, event: StageEvent) {
        self.registry.route(applicant, event).await;
    }

    /// Consume a host event stream until it ends.
    pub async fn run_event_stream<S>(self: Arc<Self>, stream: S)
    where
        S: Stream<Item = HostEvent> + Send,
    {
        tokio::pin!(stream);
        while let Some(event) = stream.next().await {
            match event {
                HostEvent::Interaction(raw) => self.handle_interaction(raw).await,
                HostEvent::MemberLeft(user) => self.member_left(user).await,
            }
        }
    }

    /// Current stage of an in-flight session, if any.
    pub fn current_stage(&self, applicant: UserId) -> Option<Stage> {
        self.registry.current_stage(applicant)
    }

    pub fn is_active(&self, applicant: UserId) -> bool {
        self.registry.is_active(applicant)
    }

    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    // ── Session task ────────────────────────────────────────────────

    async fn run_session(
        self: Arc<Self>,
        mut session: Session,
        slot: SessionSlot,
        catalog: Vec<Language>,
    ) {
        let SessionSlot {
            mut events,
            mailbox,
            stage_tx,
        } = slot;
        let applicant = session.applicant_id;

        // Bumped on every stage change; each armed timer carries the value it
        // was armed under, so a firing from an earlier visit of a re-enterable
        // stage can never pass for the live timer.
        let mut generation: u64 = 0;
        let mut timer = self.arm_stage_timer(&session, generation, &mailbox);

        while let Some(event) = events.recv().await {
            match self.apply(&mut session, event, generation, &catalog).await {
                Flow::Stay => {}
                Flow::Advanced => {
                    stage_tx.send_replace(session.stage);
                    if let Some(t) = timer.take() {
                        t.disarm();
                    }
                    generation += 1;
                    timer = self.arm_stage_timer(&session, generation, &mailbox);
                }
                Flow::Finished => {
                    stage_tx.send_replace(session.stage);
                    if let Some(t) = timer.take() {
                        t.disarm();
                    }
                    break;
                }
            }
        }

        self.registry.end(applicant);
    }

    /// Per-stage timeout policy. Only applicant-facing stages carry a timer;
    /// staff review is bounded by human availability, not a clock.
    fn arm_stage_timer(
        &self,
        session: &Session,
        generation: u64,
        mailbox: &mpsc::Sender<StageEvent>,
    ) -> Option<TimerHandle> {
        if !session.stage.is_applicant_facing() {
            return None;
        }
        let duration = match session.stage {
            Stage::LanguageSelect | Stage::PrimaryLanguageSelect => self.config.selection_timeout,
            _ => self.config.form_timeout,
        };
        Some(supervisor::arm(
            session.applicant_id,
            session.stage,
            generation,
            duration,
            mailbox.clone(),
        ))
    }

    async fn apply(
        &self,
        session: &mut Session,
        event: StageEvent,
        generation: u64,
        catalog: &[Language],
    ) -> Flow {
        match (session.stage, event) {
            (Stage::LanguageSelect, StageEvent::SelectionSubmitted { selected }) => {
                let languages = selected
                    .iter()
                    .filter_map(|id| catalog.iter().find(|l| l.role_id == *id).cloned())
                    .collect::<Vec<_>>();
                // An "other"-only pick arrives as an empty `selected` and is a
                // legal zero-language selection. A non-empty pick where no id
                // matched the catalog is stale or tampered; keep waiting.
                if languages.is_empty() && !selected.is_empty() {
                    debug!(
                        applicant = %session.applicant_id,
                        submitted = selected.len(),
                        "Selection matched no catalog entry, ignored"
                    );
                    return Flow::Stay;
                }
                session.select_languages(languages);

                match session.selected_languages.len() {
                    // Zero is legal: "other"/unspecified, straight to intake.
                    0 => {
                        advance(session, Stage::Intake);
                        self.show_panel(session, panels::intake_prompt(session.applicant_id))
                            .await;
                    }
                    1 => {
                        let only = session.selected_languages[0].clone();
                        session.primary_language = Some(only);
                        advance(session, Stage::Intake);
                        self.show_panel(session, panels::intake_prompt(session.applicant_id))
                            .await;
                    }
                    _ => {
                        advance(session, Stage::PrimaryLanguageSelect);
                        self.show_panel(
                            session,
                            panels::primary_select(&session.selected_languages, session.applicant_id),
                        )
                        .await;
                    }
                }
                debug!(
                    applicant = %session.applicant_id,
                    languages = session.selected_languages.len(),
                    next = %session.stage,
                    "Language selection recorded"
                );
                Flow::Advanced
            }

            (Stage::PrimaryLanguageSelect, StageEvent::SelectionSubmitted { selected }) => {
                let Some(choice) = selected.first() else {
                    debug!(applicant = %session.applicant_id, "Empty primary pick ignored");
                    return Flow::Stay;
                };
                if !session.set_primary(*choice) {
                    // Not among their selection; stale or tampered component.
                    debug!(
                        applicant = %session.applicant_id,
                        role = %choice,
                        "Primary pick outside selection ignored"
                    );
                    return Flow::Stay;
                }
                advance(session, Stage::Intake);
                self.show_panel(session, panels::intake_prompt(session.applicant_id))
                    .await;
                Flow::Advanced
            }

            (Stage::Intake | Stage::MoreInfoRequested, StageEvent::FormSubmitted { fields }) => {
                session.intake_text = fields.introduction;
                if fields.other_languages.is_some() {
                    session.other_languages_text = fields.other_languages;
                }
                advance(session, Stage::StaffReview);
                // Review gets its own message so staff see each (re)submission.
                match self
                    .gateway
                    .send_panel(session.thread_id, panels::review(session))
                    .await
                {
                    Ok(msg) => session.panel_message = Some(msg),
                    Err(e) => warn!(error = %e, "Could not post review panel"),
                }
                Flow::Advanced
            }

            (Stage::StaffReview, StageEvent::Review { reviewer_id, action }) => {
                self.apply_review(session, reviewer_id, action).await
            }

            (_, StageEvent::ApplicantLeft) => {
                info!(
                    applicant = %session.applicant_id,
                    stage = %session.stage,
                    "Applicant left, aborting session"
                );
                // No kick or ban: they are already gone. Notice first, while
                // the stage still names where they stopped.
                self.effects.note_departure(session).await;
                advance(session, Stage::Aborted);
                self.effects
                    .close_session(session, Outcome::Aborted, &GrantReport::default())
                    .await;
                Flow::Finished
            }

            (current, StageEvent::StageTimedOut { stage, generation: fired }) => {
                if fired != generation {
                    // A timer that lost the race to a transition. Comparing
                    // the stage would not be enough: re-enterable stages can
                    // be revisited, and an old visit's timer must not abort
                    // the fresh one.
                    debug!(
                        applicant = %session.applicant_id,
                        fired_stage = %stage,
                        fired_generation = fired,
                        %current,
                        generation,
                        "Stale stage timer ignored"
                    );
                    return Flow::Stay;
                }
                warn!(
                    applicant = %session.applicant_id,
                    %stage,
                    "Stage timed out, aborting session"
                );
                self.effects
                    .remove_applicant(
                        session,
                        &format!("Timed out during onboarding ({stage})"),
                        false,
                    )
                    .await;
                advance(session, Stage::Aborted);
                self.effects
                    .close_session(session, Outcome::Aborted, &GrantReport::default())
                    .await;
                Flow::Finished
            }

            (stage, event) => {
                // Wrong stage for this event: stale or duplicate delivery.
                // The stage keeps waiting for the event it expects.
                debug!(
                    applicant = %session.applicant_id,
                    %stage,
                    ?event,
                    "Event ignored in current stage"
                );
                Flow::Stay
            }
        }
    }

    async fn apply_review(
        &self,
        session: &mut Session,
        reviewer_id: UserId,
        action: ReviewAction,
    ) -> Flow {
        match action {
            ReviewAction::Accept => {
                session.reviewer_id = Some(reviewer_id);
                advance(session, Stage::Accepted);
                info!(
                    applicant = %session.applicant_id,
                    reviewer = %reviewer_id,
                    "Application accepted"
                );
                let report = self.effects.grant_membership(session).await;
                self.effects
                    .close_session(session, Outcome::Accepted, &report)
                    .await;
                advance(session, Stage::Closed);
                Flow::Finished
            }
            ReviewAction::Decline { reason, ban } => {
                session.reviewer_id = Some(reviewer_id);
                advance(session, Stage::Declined);
                let reason = reason.unwrap_or_else(|| self.config.default_decline_reason.clone());
                info!(
                    applicant = %session.applicant_id,
                    reviewer = %reviewer_id,
                    ban,
                    "Application declined"
                );
                self.effects.remove_applicant(session, &reason, ban).await;
                self.effects
                    .close_session(session, Outcome::Declined, &GrantReport::default())
                    .await;
                advance(session, Stage::Closed);
                Flow::Finished
            }
            ReviewAction::MoreInfo => {
                session.more_info_requested = true;
                advance(session, Stage::MoreInfoRequested);
                info!(
                    applicant = %session.applicant_id,
                    reviewer = %reviewer_id,
                    "More information requested"
                );
                if let Err(e) = self
                    .gateway
                    .send_panel(session.thread_id, panels::more_info_prompt(session.applicant_id))
                    .await
                {
                    warn!(error = %e, "Could not post more-info prompt");
                }
                Flow::Advanced
            }
            ReviewAction::Redirect => {
                // Canned nudge; review stays open for a follow-up decision.
                if let Err(e) = self
                    .gateway
                    .send_panel(
                        session.thread_id,
                        Panel::text("", self.config.redirect_reply.clone()),
                    )
                    .await
                {
                    warn!(error = %e, "Could not post redirect reply");
                }
                Flow::Stay
            }
        }
    }

    /// Replace the stage panel in place, or send it if there is none yet.
    /// Failures are logged, not fatal: the stage keeps waiting and the timer
    /// cleans up if the applicant never sees it.
    async fn show_panel(&self, session: &mut Session, panel: Panel) {
        let result = match session.panel_message {
            Some(msg) => self.gateway.edit_panel(session.thread_id, msg, panel).await,
            None => match self.gateway.send_panel(session.thread_id, panel).await {
                Ok(msg) => {
                    session.panel_message = Some(msg);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };
        if let Err(e) = result {
            warn!(
                applicant = %session.applicant_id,
                stage = %session.stage,
                error = %e,
                "Could not show stage panel"
            );
        }
    }
}

/// Panel construction for each stage. Text kept short; real presentation
/// polish belongs to the host.
mod panels {
    use crate::ids::UserId;
    use crate::platform::{Component, Panel, SelectOption};

    use super::super::events::custom_ids;
    use super::super::model::{Language, Session};

    fn language_options(languages: &[Language]) -> Vec<SelectOption> {
        languages
            .iter()
            .map(|lang| SelectOption {
                label: lang.role_name.clone(),
                value: lang.role_id.to_string(),
                emoji: Some(lang.emoji_repr.clone()),
            })
            .collect()
    }

    pub fn language_select(catalog: &[Language], applicant: UserId) -> Panel {
        let mut options = language_options(catalog);
        options.push(SelectOption {
            label: "Other".to_string(),
            value: custom_ids::OTHER_VALUE.to_string(),
            emoji: Some("🖥️".to_string()),
        });
        let max_values = options.len();
        Panel {
            title: "What languages are you proficient in?".to_string(),
            body: "Selecting languages here will unlock the help channels for those \
                   languages. This can always be changed later!"
                .to_string(),
            component: Some(Component::Select {
                custom_id: custom_ids::format(custom_ids::LANG, applicant),
                placeholder: "Choose your language(s)".to_string(),
                options,
                max_values,
            }),
        }
    }

    pub fn primary_select(selected: &[Language], applicant: UserId) -> Panel {
        Panel {
            title: "Which language is your primary?".to_string(),
            body: "Thank you for the selection! Out of the languages you chose, which \
                   one would you say is your primary?"
                .to_string(),
            component: Some(Component::Select {
                custom_id: custom_ids::format(custom_ids::PRIMARY, applicant),
                placeholder: "Which of these is your primary language?".to_string(),
                options: language_options(selected),
                max_values: 1,
            }),
        }
    }

    pub fn intake_prompt(applicant: UserId) -> Panel {
        Panel {
            title: "Introduce yourself".to_string(),
            body: "Thank you! Now please use the form to answer a few questions."
                .to_string(),
            component: Some(Component::Buttons {
                custom_id: custom_ids::format(custom_ids::INTRO, applicant),
                labels: vec!["Open the form".to_string()],
            }),
        }
    }

    pub fn review(session: &Session) -> Panel {
        Panel {
            title: format!("Application from {}", session.display_name),
            body: session.application_summary(),
            component: Some(Component::Buttons {
                custom_id: custom_ids::format(custom_ids::REVIEW, session.applicant_id),
                labels: vec![
                    "Accept".to_string(),
                    "Decline".to_string(),
                    "More info".to_string(),
                    "Learning resources".to_string(),
                ],
            }),
        }
    }

    pub fn more_info_prompt(applicant: UserId) -> Panel {
        Panel {
            title: "A little more detail, please".to_string(),
            body: "Could you tell us more about how you plan on using the API?"
                .to_string(),
            component: Some(Component::Buttons {
                custom_id: custom_ids::format(custom_ids::MORE_INFO, applicant),
                labels: vec!["Submit replacement introduction".to_string()],
            }),
        }
    }
}
