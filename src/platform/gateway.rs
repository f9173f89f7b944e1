//! The `Gateway` trait: every outbound platform call the workflow makes.

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::ids::{ChannelId, MessageId, RoleId, ThreadId, UserId};

/// An interactive element attached to a panel message.
///
/// How these render (string select, button row, modal trigger) is the host's
/// concern; the workflow only cares about the custom id that comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// A multi- or single-select dropdown.
    Select {
        custom_id: String,
        placeholder: String,
        options: Vec<SelectOption>,
        max_values: usize,
    },
    /// A row of labelled buttons sharing a custom-id prefix.
    Buttons { custom_id: String, labels: Vec<String> },
}

/// One entry in a select dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    pub emoji: Option<String>,
}

/// A message with an optional interactive component, sent into a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    pub title: String,
    pub body: String,
    pub component: Option<Component>,
}

impl Panel {
    /// A plain text panel with no component.
    pub fn text(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            component: None,
        }
    }
}

/// Severity of an audit or summary notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeColor {
    Success,
    Error,
    Info,
}

/// A notice posted to a channel (moderation log, public welcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub color: NoticeColor,
}

/// Outbound platform calls.
///
/// Implementations may be slow network calls; the workflow never holds a
/// session lock across them. All calls should be safe to retry: the platform
/// is the source of truth for roles and membership, and the executor re-checks
/// state before mutating where duplicates would otherwise surface as errors.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open a private scratch thread in `channel` and add `user` to it.
    async fn open_thread(
        &self,
        channel: ChannelId,
        name: &str,
        user: UserId,
    ) -> Result<ThreadId, PlatformError>;

    /// Send a panel into a thread.
    async fn send_panel(&self, thread: ThreadId, panel: Panel) -> Result<MessageId, PlatformError>;

    /// Replace an existing panel message.
    async fn edit_panel(
        &self,
        thread: ThreadId,
        message: MessageId,
        panel: Panel,
    ) -> Result<(), PlatformError>;

    /// Post a notice to a channel.
    async fn send_notice(&self, channel: ChannelId, notice: Notice) -> Result<(), PlatformError>;

    /// Roles currently held by a member.
    async fn member_roles(&self, user: UserId) -> Result<Vec<RoleId>, PlatformError>;

    /// Current display name (nickname if set, else username).
    async fn display_name(&self, user: UserId) -> Result<String, PlatformError>;

    /// Grant roles to a member.
    async fn add_roles(&self, user: UserId, roles: &[RoleId]) -> Result<(), PlatformError>;

    /// Revoke a single role from a member.
    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError>;

    /// Set a member's nickname. May fail with [`PlatformError::RenameRejected`]
    /// (for example when the result exceeds the platform length cap).
    async fn set_nickname(&self, user: UserId, nick: &str) -> Result<(), PlatformError>;

    /// Kick a member from the guild.
    async fn kick(&self, user: UserId, reason: &str) -> Result<(), PlatformError>;

    /// Ban a member from the guild.
    async fn ban(&self, user: UserId, reason: &str) -> Result<(), PlatformError>;

    /// Delete a scratch thread.
    async fn delete_thread(&self, thread: ThreadId) -> Result<(), PlatformError>;
}
