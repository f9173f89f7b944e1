//! Shared test doubles: a call-recording gateway and an in-memory store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{DatabaseError, PlatformError};
use crate::ids::{ChannelId, MessageId, RoleId, ThreadId, UserId};
use crate::onboarding::model::{Language, ThreadRecord};
use crate::platform::{Gateway, Notice, Panel};
use crate::store::Database;

pub fn lang(id: u64, name: &str) -> Language {
    Language {
        role_id: RoleId(id),
        role_name: name.to_string(),
        emoji_repr: format!(":{name}:"),
    }
}

/// Every outbound platform call, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    OpenThread(ChannelId, String, UserId),
    SendPanel(ThreadId, Panel),
    EditPanel(ThreadId, MessageId, Panel),
    SendNotice(ChannelId, Notice),
    AddRoles(UserId, Vec<RoleId>),
    RemoveRole(UserId, RoleId),
    SetNickname(UserId, String),
    Kick(UserId, String),
    Ban(UserId, String),
    DeleteThread(ThreadId),
}

/// Gateway double that records calls and tracks role state so idempotency is
/// observable.
#[derive(Default)]
pub struct RecordingGateway {
    pub calls: Mutex<Vec<Call>>,
    pub roles: Mutex<HashMap<UserId, Vec<RoleId>>>,
    pub names: Mutex<HashMap<UserId, String>>,
    pub fail_rename: AtomicBool,
    next_id: AtomicU64,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn roles_of(&self, user: UserId) -> Vec<RoleId> {
        self.roles.lock().unwrap().get(&user).cloned().unwrap_or_default()
    }

    /// Notices sent to a given channel.
    pub fn notices_to(&self, channel: ChannelId) -> Vec<Notice> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendNotice(ch, notice) if ch == channel => Some(notice),
                _ => None,
            })
            .collect()
    }

    pub fn kicks(&self) -> Vec<(UserId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Kick(user, reason) => Some((user, reason)),
                _ => None,
            })
            .collect()
    }

    pub fn bans(&self) -> Vec<(UserId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Ban(user, reason) => Some((user, reason)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn open_thread(
        &self,
        channel: ChannelId,
        name: &str,
        user: UserId,
    ) -> Result<ThreadId, PlatformError> {
        self.record(Call::OpenThread(channel, name.to_string(), user));
        Ok(ThreadId(self.fresh_id()))
    }

    async fn send_panel(&self, thread: ThreadId, panel: Panel) -> Result<MessageId, PlatformError> {
        self.record(Call::SendPanel(thread, panel));
        Ok(MessageId(self.fresh_id()))
    }

    async fn edit_panel(
        &self,
        thread: ThreadId,
        message: MessageId,
        panel: Panel,
    ) -> Result<(), PlatformError> {
        self.record(Call::EditPanel(thread, message, panel));
        Ok(())
    }

    async fn send_notice(&self, channel: ChannelId, notice: Notice) -> Result<(), PlatformError> {
        self.record(Call::SendNotice(channel, notice));
        Ok(())
    }

    async fn member_roles(&self, user: UserId) -> Result<Vec<RoleId>, PlatformError> {
        Ok(self.roles_of(user))
    }

    async fn display_name(&self, user: UserId) -> Result<String, PlatformError> {
        Ok(self
            .names
            .lock()
            .unwrap()
            .get(&user)
            .cloned()
            .unwrap_or_else(|| format!("member-{user}")))
    }

    async fn add_roles(&self, user: UserId, roles: &[RoleId]) -> Result<(), PlatformError> {
        self.record(Call::AddRoles(user, roles.to_vec()));
        let mut all = self.roles.lock().unwrap();
        let held = all.entry(user).or_default();
        for role in roles {
            if held.contains(role) {
                return Err(PlatformError::RequestFailed(format!(
                    "duplicate role {role} for {user}"
                )));
            }
            held.push(*role);
        }
        Ok(())
    }

    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        self.record(Call::RemoveRole(user, role));
        if let Some(held) = self.roles.lock().unwrap().get_mut(&user) {
            held.retain(|r| *r != role);
        }
        Ok(())
    }

    async fn set_nickname(&self, user: UserId, nick: &str) -> Result<(), PlatformError> {
        self.record(Call::SetNickname(user, nick.to_string()));
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(PlatformError::RenameRejected {
                user,
                reason: "nickname too long".to_string(),
            });
        }
        self.names.lock().unwrap().insert(user, nick.to_string());
        Ok(())
    }

    async fn kick(&self, user: UserId, reason: &str) -> Result<(), PlatformError> {
        self.record(Call::Kick(user, reason.to_string()));
        Ok(())
    }

    async fn ban(&self, user: UserId, reason: &str) -> Result<(), PlatformError> {
        self.record(Call::Ban(user, reason.to_string()));
        Ok(())
    }

    async fn delete_thread(&self, thread: ThreadId) -> Result<(), PlatformError> {
        self.record(Call::DeleteThread(thread));
        Ok(())
    }
}

/// In-memory record store.
#[derive(Default)]
pub struct MemoryStore {
    pub languages: Mutex<Vec<Language>>,
    pub threads: Mutex<HashMap<ThreadId, ThreadRecord>>,
    /// When set, `get_languages` fails, simulating an unreachable store.
    pub fail_catalog: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_languages(languages: Vec<Language>) -> Self {
        Self {
            languages: Mutex::new(languages),
            ..Self::default()
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }
}

#[async_trait]
impl Database for MemoryStore {
    async fn get_languages(&self) -> Result<Vec<Language>, DatabaseError> {
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(DatabaseError::Connection("store unreachable".to_string()));
        }
        Ok(self.languages.lock().unwrap().clone())
    }

    async fn add_language(&self, language: &Language) -> Result<(), DatabaseError> {
        let mut languages = self.languages.lock().unwrap();
        if languages.iter().any(|l| l.role_id == language.role_id) {
            return Err(DatabaseError::Query("duplicate role id".to_string()));
        }
        languages.push(language.clone());
        Ok(())
    }

    async fn remove_language(&self, role_id: RoleId) -> Result<(), DatabaseError> {
        self.languages.lock().unwrap().retain(|l| l.role_id != role_id);
        Ok(())
    }

    async fn language_exists(&self, role_id: RoleId) -> Result<Option<Language>, DatabaseError> {
        Ok(self
            .languages
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.role_id == role_id)
            .cloned())
    }

    async fn record_thread(
        &self,
        thread_id: ThreadId,
        applicant_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.threads.lock().unwrap().insert(
            thread_id,
            ThreadRecord {
                thread_id,
                applicant_id,
                created_at,
            },
        );
        Ok(())
    }

    async fn get_thread(&self, thread_id: ThreadId) -> Result<Option<ThreadRecord>, DatabaseError> {
        Ok(self.threads.lock().unwrap().get(&thread_id).cloned())
    }

    async fn forget_thread(&self, thread_id: ThreadId) -> Result<(), DatabaseError> {
        self.threads.lock().unwrap().remove(&thread_id);
        Ok(())
    }
}
