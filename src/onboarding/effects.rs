//! Side-Effect Executor: the irreversible external actions behind stage
//! transitions.
//!
//! Every operation here is idempotent and independently retryable. Side
//! effects are not transactional against the platform, so the executor
//! re-checks current role state before granting rather than assuming a fresh
//! member. It holds no session state beyond the call it was invoked for, and
//! is never called while any session lock is held.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::OnboardConfig;
use crate::ids::{RoleId, UserId};
use crate::platform::{Gateway, Notice, NoticeColor};
use crate::store::Database;

use super::model::{Outcome, Session};

/// What a membership grant actually managed to do.
///
/// Partial failures (rename rejected, a role grant bounced off the permission
/// hierarchy) never fail the acceptance; they are collected here and surfaced
/// in the moderation-log summary so a human can remediate.
#[derive(Debug, Clone, Default)]
pub struct GrantReport {
    pub warnings: Vec<String>,
}

/// Executes role grants, removals, notifications, and cleanup.
pub struct SideEffectExecutor {
    gateway: Arc<dyn Gateway>,
    store: Arc<dyn Database>,
    config: OnboardConfig,
}

impl SideEffectExecutor {
    pub fn new(gateway: Arc<dyn Gateway>, store: Arc<dyn Database>, config: OnboardConfig) -> Self {
        Self {
            gateway,
            store,
            config,
        }
    }

    /// Grant full membership: language roles plus the member role, revoke the
    /// temporary applicant role, and suffix the nickname with the primary
    /// language tag.
    pub async fn grant_membership(&self, session: &Session) -> GrantReport {
        let applicant = session.applicant_id;
        let mut report = GrantReport::default();

        // The platform is the source of truth; skip roles already present so
        // a retried grant cannot surface duplicate-role errors.
        let held = match self.gateway.member_roles(applicant).await {
            Ok(roles) => roles,
            Err(e) => {
                warn!(%applicant, error = %e, "Could not read current roles, granting blind");
                report
                    .warnings
                    .push(format!("Could not read current roles: {e}"));
                Vec::new()
            }
        };

        let mut to_grant: Vec<RoleId> = session.selected_role_ids();
        to_grant.push(self.config.member_role);
        to_grant.retain(|role| !held.contains(role));

        if !to_grant.is_empty() {
            if let Err(e) = self.gateway.add_roles(applicant, &to_grant).await {
                warn!(%applicant, error = %e, "Role grant failed");
                report.warnings.push(format!("Role grant failed: {e}"));
            }
        }

        if held.contains(&self.config.applicant_role) {
            if let Err(e) = self
                .gateway
                .remove_role(applicant, self.config.applicant_role)
                .await
            {
                warn!(%applicant, error = %e, "Could not revoke applicant role");
                report
                    .warnings
                    .push(format!("Could not revoke applicant role: {e}"));
            }
        }

        if let Some(primary) = &session.primary_language {
            let nick = format!("{} | {}", session.display_name, primary.role_name);
            if let Err(e) = self.gateway.set_nickname(applicant, &nick).await {
                // A too-long name is expected occasionally; never fatal.
                warn!(%applicant, error = %e, "Could not rename member");
                report.warnings.push(format!("Rename failed: {e}"));
            }
        }

        info!(
            %applicant,
            session = %session.id,
            roles = ?session.selected_role_ids(),
            primary = session.primary_language.as_ref().map(|l| l.role_name.as_str()),
            "Enrolled member"
        );
        report
    }

    /// Kick or ban the applicant, post the audit notice, and drop the thread
    /// record. Used by decline and by stage timeouts.
    pub async fn remove_applicant(&self, session: &Session, reason: &str, ban: bool) {
        let applicant = session.applicant_id;
        let result = if ban {
            self.gateway.ban(applicant, reason).await
        } else {
            self.gateway.kick(applicant, reason).await
        };
        if let Err(e) = result {
            // Commonly UnknownMember when they already left; the audit trail
            // below still matters.
            warn!(%applicant, error = %e, "Removal call failed");
        }

        let verb = if ban { "banned" } else { "kicked" };
        info!(%applicant, session = %session.id, verb, reason, "Removed applicant");

        self.post_mod_log(Notice {
            title: format!("Applicant {} has been {verb}", session.display_name),
            body: format!("**Reason:**\n{reason}"),
            color: NoticeColor::Error,
        })
        .await;

        self.forget_thread_record(session).await;
    }

    /// Audit an applicant-initiated departure. No kick or ban, since they are
    /// already gone, but moderation still gets one notice so the orphaned
    /// thread is visible.
    pub async fn note_departure(&self, session: &Session) {
        info!(
            applicant = %session.applicant_id,
            session = %session.id,
            stage = %session.stage,
            "Applicant left mid-onboarding"
        );
        self.post_mod_log(Notice {
            title: format!("Applicant {} left during onboarding", session.display_name),
            body: format!("Left while in stage `{}`. No action taken.", session.stage),
            color: NoticeColor::Info,
        })
        .await;

        self.forget_thread_record(session).await;
    }

    /// Final notifications and cleanup. The scratch thread is deleted last,
    /// after every notice has gone out, so a crash mid-cleanup cannot lose
    /// the audit trail.
    pub async fn close_session(&self, session: &Session, outcome: Outcome, report: &GrantReport) {
        if outcome == Outcome::Accepted {
            let summary = session.application_summary();
            let reviewer = match session.reviewer_id {
                Some(id) => self.reviewer_name(id).await,
                None => "unknown reviewer".to_string(),
            };

            let mut body = summary.clone();
            if !report.warnings.is_empty() {
                body.push_str("\n\n**Needs attention:**\n");
                for warning in &report.warnings {
                    body.push_str(&format!("- {warning}\n"));
                }
            }

            self.post_mod_log(Notice {
                title: format!(
                    "Applicant {} has been approved by {reviewer}",
                    session.display_name
                ),
                body,
                color: NoticeColor::Success,
            })
            .await;

            let welcome = Notice {
                title: format!("Please welcome {}!", session.display_name),
                body: summary,
                color: NoticeColor::Success,
            };
            if let Err(e) = self
                .gateway
                .send_notice(self.config.general_channel, welcome)
                .await
            {
                warn!(error = %e, "Could not post welcome notice");
            }
        }

        // Declined/aborted sessions already produced their audit notice in
        // remove_applicant or note_departure; only cleanup remains.
        self.forget_thread_record(session).await;
        if let Err(e) = self.gateway.delete_thread(session.thread_id).await {
            warn!(thread = %session.thread_id, error = %e, "Could not delete scratch thread");
        }

        info!(
            applicant = %session.applicant_id,
            session = %session.id,
            %outcome,
            "Session closed"
        );
    }

    async fn post_mod_log(&self, notice: Notice) {
        if let Err(e) = self
            .gateway
            .send_notice(self.config.mod_log_channel, notice)
            .await
        {
            warn!(error = %e, "Could not post moderation-log notice");
        }
    }

    async fn forget_thread_record(&self, session: &Session) {
        if let Err(e) = self.store.forget_thread(session.thread_id).await {
            warn!(thread = %session.thread_id, error = %e, "Could not delete thread record");
        }
    }

    async fn reviewer_name(&self, reviewer: UserId) -> String {
        self.gateway
            .display_name(reviewer)
            .await
            .unwrap_or_else(|_| reviewer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ids::{ChannelId, ThreadId};
    use crate::testkit::{Call, MemoryStore, RecordingGateway, lang};

    fn fixture() -> (Arc<RecordingGateway>, Arc<MemoryStore>, SideEffectExecutor) {
        let gateway = Arc::new(RecordingGateway::new());
        let store = Arc::new(MemoryStore::new());
        let executor = SideEffectExecutor::new(
            gateway.clone(),
            store.clone(),
            OnboardConfig::default(),
        );
        (gateway, store, executor)
    }

    fn session_with_langs() -> Session {
        let mut session = Session::new(UserId(42), "newcomer", ThreadId(9));
        session.select_languages(vec![lang(1, "python"), lang(2, "rust")]);
        session.set_primary(RoleId(2));
        session.intake_text = "I build clan trackers.".to_string();
        session
    }

    #[tokio::test]
    async fn grant_membership_twice_yields_same_role_set() {
        let (gateway, _store, executor) = fixture();
        // Applicant currently holds only the temporary applicant role.
        gateway
            .roles
            .lock()
            .unwrap()
            .insert(UserId(42), vec![RoleId(100)]);

        let session = session_with_langs();
        let first = executor.grant_membership(&session).await;
        assert!(first.warnings.is_empty(), "{:?}", first.warnings);

        let after_first = {
            let mut roles = gateway.roles_of(UserId(42));
            roles.sort();
            roles
        };
        // python + rust + member role; applicant role revoked.
        assert_eq!(after_first, vec![RoleId(1), RoleId(2), RoleId(101)]);

        let second = executor.grant_membership(&session).await;
        assert!(second.warnings.is_empty(), "{:?}", second.warnings);
        let after_second = {
            let mut roles = gateway.roles_of(UserId(42));
            roles.sort();
            roles
        };
        assert_eq!(after_first, after_second, "second grant must change nothing");
    }

    #[tokio::test]
    async fn rename_failure_is_a_warning_not_an_error() {
        let (gateway, _store, executor) = fixture();
        gateway.fail_rename.store(true, std::sync::atomic::Ordering::SeqCst);

        let session = session_with_langs();
        let report = executor.grant_membership(&session).await;
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("Rename failed"));
        // Roles were still granted.
        assert!(gateway.roles_of(UserId(42)).contains(&RoleId(101)));
    }

    #[tokio::test]
    async fn no_primary_means_no_rename_attempt() {
        let (gateway, _store, executor) = fixture();
        let mut session = Session::new(UserId(42), "newcomer", ThreadId(9));
        session.select_languages(vec![]);
        executor.grant_membership(&session).await;
        assert!(
            !gateway
                .calls()
                .iter()
                .any(|c| matches!(c, Call::SetNickname(..))),
            "no primary language, no rename"
        );
    }

    #[tokio::test]
    async fn decline_without_ban_kicks_and_logs_once() {
        let (gateway, store, executor) = fixture();
        let session = session_with_langs();
        store
            .record_thread(session.thread_id, session.applicant_id, Utc::now())
            .await
            .unwrap();

        executor
            .remove_applicant(&session, "does not meet criteria", false)
            .await;

        assert_eq!(gateway.kicks(), vec![(UserId(42), "does not meet criteria".to_string())]);
        assert!(gateway.bans().is_empty());

        let notices = gateway.notices_to(ChannelId(202));
        assert_eq!(notices.len(), 1, "exactly one moderation-log entry");
        assert!(notices[0].title.contains("kicked"));
        assert_eq!(store.thread_count(), 0, "thread record deleted");
    }

    #[tokio::test]
    async fn decline_with_ban_bans_instead_of_kicking() {
        let (gateway, _store, executor) = fixture();
        let session = session_with_langs();
        executor.remove_applicant(&session, "spam account", true).await;
        assert!(gateway.kicks().is_empty());
        assert_eq!(gateway.bans(), vec![(UserId(42), "spam account".to_string())]);
        assert!(gateway.notices_to(ChannelId(202))[0].title.contains("banned"));
    }

    #[tokio::test]
    async fn departure_notice_never_kicks() {
        let (gateway, _store, executor) = fixture();
        let session = session_with_langs();
        executor.note_departure(&session).await;
        assert!(gateway.kicks().is_empty());
        assert!(gateway.bans().is_empty());
        let notices = gateway.notices_to(ChannelId(202));
        assert_eq!(notices.len(), 1);
        assert!(notices[0].title.contains("left during onboarding"));
    }

    #[tokio::test]
    async fn accepted_close_notifies_before_deleting_the_thread() {
        let (gateway, store, executor) = fixture();
        let mut session = session_with_langs();
        session.reviewer_id = Some(UserId(7));
        store
            .record_thread(session.thread_id, session.applicant_id, Utc::now())
            .await
            .unwrap();

        executor
            .close_session(&session, Outcome::Accepted, &GrantReport::default())
            .await;

        let calls = gateway.calls();
        let delete_pos = calls
            .iter()
            .position(|c| matches!(c, Call::DeleteThread(_)))
            .expect("thread deleted");
        let last_notice_pos = calls
            .iter()
            .rposition(|c| matches!(c, Call::SendNotice(..)))
            .expect("notices sent");
        assert!(
            last_notice_pos < delete_pos,
            "every notice must precede thread deletion"
        );
        // Mod-log summary and public welcome both went out.
        assert_eq!(gateway.notices_to(ChannelId(202)).len(), 1);
        assert_eq!(gateway.notices_to(ChannelId(201)).len(), 1);
        assert_eq!(store.thread_count(), 0);
    }

    #[tokio::test]
    async fn grant_warnings_surface_in_the_approval_notice() {
        let (gateway, _store, executor) = fixture();
        let mut session = session_with_langs();
        session.reviewer_id = Some(UserId(7));
        let report = GrantReport {
            warnings: vec!["Rename failed: too long".to_string()],
        };

        executor.close_session(&session, Outcome::Accepted, &report).await;

        let notices = gateway.notices_to(ChannelId(202));
        assert!(notices[0].body.contains("Needs attention"));
        assert!(notices[0].body.contains("Rename failed"));
        // The public welcome stays clean.
        assert!(!gateway.notices_to(ChannelId(201))[0].body.contains("Needs attention"));
    }

    #[tokio::test]
    async fn declined_close_posts_no_further_notices() {
        let (gateway, _store, executor) = fixture();
        let session = session_with_langs();
        executor
            .close_session(&session, Outcome::Declined, &GrantReport::default())
            .await;
        assert!(gateway.notices_to(ChannelId(202)).is_empty());
        assert!(gateway.notices_to(ChannelId(201)).is_empty());
        assert!(gateway.calls().iter().any(|c| matches!(c, Call::DeleteThread(_))));
    }
}
